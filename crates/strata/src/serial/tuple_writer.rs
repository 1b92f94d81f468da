//! Tree-writer target for projection rows.
//!
//! Configured with an ordered field list; replayed elements fill the
//! matching slots. Storage metadata elements that are not requested are
//! ignored; any other unrequested element is an error.

use strata_core::error::{CoreError, SerialError};
use strata_core::record::FieldValue;
use strata_core::value::Atom;
use strata_core::writer::{TreeWriter, WriterStack};

use super::is_meta_field;

pub struct TupleWriter {
    fields: Vec<String>,
    values: Vec<FieldValue>,
    stack: WriterStack,
    current: Option<usize>,
    in_array: bool,
    array_items: Vec<FieldValue>,
    skipping: usize,
}

impl TupleWriter {
    pub fn new(fields: Vec<String>) -> Self {
        let values = fields.iter().map(|_| FieldValue::Null).collect();
        Self {
            fields,
            values,
            stack: WriterStack::new(),
            current: None,
            in_array: false,
            array_items: Vec::new(),
            skipping: 0,
        }
    }

    /// Number of configured slots.
    pub fn arity(&self) -> usize {
        self.fields.len()
    }

    pub fn into_tuple(self) -> Vec<FieldValue> {
        self.values
    }

    fn slot(&mut self, value: FieldValue) {
        if let Some(index) = self.current {
            self.values[index] = value;
        }
    }
}

impl TreeWriter for TupleWriter {
    fn start_document(&mut self, name: &str) -> Result<(), CoreError> {
        self.stack.start_document(name)
    }

    fn end_document(&mut self, name: &str) -> Result<(), CoreError> {
        self.stack.end_document(name)
    }

    fn start_dict(&mut self, type_name: &str) -> Result<(), CoreError> {
        self.stack.start_dict(type_name)?;
        if self.skipping > 0 || self.current.is_some() {
            // Nested objects are not projectable; ignore their content.
            self.skipping += 1;
        }
        Ok(())
    }

    fn end_dict(&mut self, type_name: &str) -> Result<(), CoreError> {
        self.stack.end_dict(type_name)?;
        if self.skipping > 0 {
            self.skipping -= 1;
        }
        Ok(())
    }

    fn start_element(&mut self, name: &str) -> Result<(), CoreError> {
        self.stack.start_element(name)?;
        if self.skipping > 0 {
            self.skipping += 1;
            return Ok(());
        }
        match self.fields.iter().position(|field| field == name) {
            Some(index) => {
                self.current = Some(index);
                Ok(())
            }
            None if is_meta_field(name) => {
                self.skipping = 1;
                Ok(())
            }
            None => Err(SerialError::UnknownElement {
                type_name: "projection".to_string(),
                element: name.to_string(),
            }
            .into()),
        }
    }

    fn end_element(&mut self, name: &str) -> Result<(), CoreError> {
        self.stack.end_element(name)?;
        if self.skipping > 0 {
            self.skipping -= 1;
            return Ok(());
        }
        self.current = None;
        Ok(())
    }

    fn start_array(&mut self) -> Result<(), CoreError> {
        self.stack.start_array()?;
        if self.skipping > 0 {
            self.skipping += 1;
            return Ok(());
        }
        self.in_array = true;
        self.array_items.clear();
        Ok(())
    }

    fn end_array(&mut self) -> Result<(), CoreError> {
        self.stack.end_array()?;
        if self.skipping > 0 {
            self.skipping -= 1;
            return Ok(());
        }
        self.in_array = false;
        let items = std::mem::take(&mut self.array_items);
        self.slot(FieldValue::List(items));
        Ok(())
    }

    fn start_array_item(&mut self) -> Result<(), CoreError> {
        self.stack.start_array_item()?;
        if self.skipping > 0 {
            self.skipping += 1;
        }
        Ok(())
    }

    fn end_array_item(&mut self) -> Result<(), CoreError> {
        self.stack.end_array_item()?;
        if self.skipping > 0 {
            self.skipping -= 1;
        }
        Ok(())
    }

    fn write_value(&mut self, value: Atom) -> Result<(), CoreError> {
        self.stack.write_value()?;
        if self.skipping > 0 {
            return Ok(());
        }
        if self.in_array {
            self.array_items.push(FieldValue::Atom(value));
        } else {
            self.slot(FieldValue::Atom(value));
        }
        Ok(())
    }

    fn write_null(&mut self) -> Result<(), CoreError> {
        self.stack.write_null()?;
        if self.skipping > 0 {
            return Ok(());
        }
        if self.in_array {
            self.array_items.push(FieldValue::Null);
        }
        Ok(())
    }
}
