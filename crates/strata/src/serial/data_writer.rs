//! Tree-writer target that reconstructs typed objects.
//!
//! Inbound documents are replayed as writer events; each event resolves the
//! current field by name in the current object's metadata and writes through
//! `DataObject::set_field`. Storage metadata elements (`_id`, `_t`, `_d`,
//! `_dataset`, `_key`) are ignored; any other unknown element fails naming
//! the field.

use std::sync::Arc;

use strata_core::error::{CoreError, SerialError};
use strata_core::key::parse_key_string;
use strata_core::meta::{Attr, FieldInfo, FieldKind, Registry, TypeInfo};
use strata_core::record::{DataObject, FieldValue};
use strata_core::value::Atom;
use strata_core::writer::{TreeWriter, WriterStack};

use super::is_meta_field;

enum Frame {
    Document,
    Object {
        object: Box<dyn DataObject>,
        info: Arc<TypeInfo>,
    },
    Element {
        field: FieldInfo,
    },
    Array {
        element: FieldKind,
        items: Vec<FieldValue>,
    },
    Item,
}

pub struct DataWriter {
    registry: Arc<Registry>,
    stack: WriterStack,
    frames: Vec<Frame>,
    /// Depth of ignored structure under a skipped element.
    skipping: usize,
    result: Option<Box<dyn DataObject>>,
}

impl DataWriter {
    pub fn new(registry: Arc<Registry>) -> Self {
        Self {
            registry,
            stack: WriterStack::new(),
            frames: Vec::new(),
            skipping: 0,
            result: None,
        }
    }

    pub fn into_result(self) -> Result<Box<dyn DataObject>, CoreError> {
        self.result.ok_or_else(|| {
            SerialError::State {
                call: "into_result",
                state: "unfinished document".to_string(),
            }
            .into()
        })
    }

    fn object_mut(&mut self) -> Option<&mut Box<dyn DataObject>> {
        self.frames.iter_mut().rev().find_map(|frame| match frame {
            Frame::Object { object, .. } => Some(object),
            _ => None,
        })
    }

    fn set_field_value(&mut self, field: &FieldInfo, value: FieldValue) -> Result<(), CoreError> {
        let object = self.object_mut().ok_or(SerialError::State {
            call: "write_value",
            state: "no open object".to_string(),
        })?;
        object.set_field(field.name, value)
    }

    /// Convert an inbound atom for the declared kind. Key-typed targets parse
    /// the key string; everything else converts inside `set_field`.
    fn convert(&self, element: &str, kind: &FieldKind, atom: Atom) -> Result<FieldValue, CoreError> {
        match kind {
            FieldKind::Key(key_type) => match atom {
                Atom::String(text) => {
                    let info = self.registry.require(key_type)?;
                    let mut object = info.construct();
                    parse_key_string(object.as_mut(), &text, &self.registry)?;
                    Ok(FieldValue::Key(object))
                }
                other => Err(SerialError::ValueKind {
                    element: element.to_string(),
                    expected: "key string",
                    got: other.kind_name().to_string(),
                }
                .into()),
            },
            _ => Ok(FieldValue::Atom(atom)),
        }
    }

    fn has_custom_decoder(&self, info: &TypeInfo, name: &str) -> Result<bool, CoreError> {
        Ok(self
            .registry
            .attrs_of(info.full_name, true)?
            .iter()
            .any(|attr| matches!(attr, Attr::DeserializeField { field, .. } if *field == name)))
    }
}

impl TreeWriter for DataWriter {
    fn start_document(&mut self, name: &str) -> Result<(), CoreError> {
        self.stack.start_document(name)?;
        self.frames.push(Frame::Document);
        Ok(())
    }

    fn end_document(&mut self, name: &str) -> Result<(), CoreError> {
        self.stack.end_document(name)?;
        self.frames.pop();
        Ok(())
    }

    fn start_dict(&mut self, type_name: &str) -> Result<(), CoreError> {
        self.stack.start_dict(type_name)?;
        if self.skipping > 0 {
            self.skipping += 1;
            return Ok(());
        }
        let info = self.registry.require(type_name)?;
        let object = info.construct();
        self.frames.push(Frame::Object { object, info });
        Ok(())
    }

    fn end_dict(&mut self, type_name: &str) -> Result<(), CoreError> {
        self.stack.end_dict(type_name)?;
        if self.skipping > 0 {
            self.skipping -= 1;
            return Ok(());
        }
        let Some(Frame::Object { object, .. }) = self.frames.pop() else {
            return Err(SerialError::State {
                call: "end_dict",
                state: "no open object".to_string(),
            }
            .into());
        };
        match self.frames.last() {
            Some(Frame::Document) | None => {
                self.result = Some(object);
            }
            Some(Frame::Element { field }) => {
                let field = field.clone();
                self.set_field_value(&field, FieldValue::Data(object))?;
            }
            Some(Frame::Item) => {
                let n = self.frames.len();
                if let Some(Frame::Array { items, .. }) = self.frames.get_mut(n - 2) {
                    items.push(FieldValue::Data(object));
                }
            }
            _ => {}
        }
        Ok(())
    }

    fn start_element(&mut self, name: &str) -> Result<(), CoreError> {
        self.stack.start_element(name)?;
        if self.skipping > 0 {
            self.skipping += 1;
            return Ok(());
        }
        let Some(Frame::Object { info, .. }) = self
            .frames
            .iter()
            .rev()
            .find(|frame| matches!(frame, Frame::Object { .. }))
        else {
            return Err(SerialError::State {
                call: "start_element",
                state: "no open object".to_string(),
            }
            .into());
        };
        let info = info.clone();
        match self.registry.field_of(info.full_name, name)? {
            Some((_, field)) => {
                if self.has_custom_decoder(&info, name)? {
                    // Custom-decoded fields are applied from the raw document
                    // after replay.
                    self.skipping = 1;
                } else {
                    self.frames.push(Frame::Element { field });
                }
                Ok(())
            }
            None if is_meta_field(name) => {
                self.skipping = 1;
                Ok(())
            }
            None => Err(SerialError::UnknownElement {
                type_name: info.full_name.to_string(),
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
        self.frames.pop();
        Ok(())
    }

    fn start_array(&mut self) -> Result<(), CoreError> {
        self.stack.start_array()?;
        if self.skipping > 0 {
            self.skipping += 1;
            return Ok(());
        }
        let Some(Frame::Element { field }) = self.frames.last() else {
            return Err(SerialError::State {
                call: "start_array",
                state: "no open element".to_string(),
            }
            .into());
        };
        let FieldKind::List(element) = &field.kind else {
            return Err(SerialError::ValueKind {
                element: field.name.to_string(),
                expected: "array",
                got: field.kind.describe(),
            }
            .into());
        };
        let element = (**element).clone();
        self.frames.push(Frame::Array {
            element,
            items: Vec::new(),
        });
        Ok(())
    }

    fn end_array(&mut self) -> Result<(), CoreError> {
        self.stack.end_array()?;
        if self.skipping > 0 {
            self.skipping -= 1;
            return Ok(());
        }
        let Some(Frame::Array { items, .. }) = self.frames.pop() else {
            return Err(SerialError::State {
                call: "end_array",
                state: "no open array".to_string(),
            }
            .into());
        };
        let Some(Frame::Element { field }) = self.frames.last() else {
            return Err(SerialError::State {
                call: "end_array",
                state: "no open element".to_string(),
            }
            .into());
        };
        let field = field.clone();
        self.set_field_value(&field, FieldValue::List(items))
    }

    fn start_array_item(&mut self) -> Result<(), CoreError> {
        self.stack.start_array_item()?;
        if self.skipping > 0 {
            self.skipping += 1;
            return Ok(());
        }
        self.frames.push(Frame::Item);
        Ok(())
    }

    fn end_array_item(&mut self) -> Result<(), CoreError> {
        self.stack.end_array_item()?;
        if self.skipping > 0 {
            self.skipping -= 1;
            return Ok(());
        }
        self.frames.pop();
        Ok(())
    }

    fn write_value(&mut self, value: Atom) -> Result<(), CoreError> {
        self.stack.write_value()?;
        if self.skipping > 0 {
            return Ok(());
        }
        match self.frames.last() {
            Some(Frame::Element { field }) => {
                let field = field.clone();
                let converted = self.convert(field.name, &field.kind, value)?;
                self.set_field_value(&field, converted)
            }
            Some(Frame::Item) => {
                let n = self.frames.len();
                let element = match self.frames.get(n - 2) {
                    Some(Frame::Array { element, .. }) => element.clone(),
                    _ => {
                        return Err(SerialError::State {
                            call: "write_value",
                            state: "array item outside array".to_string(),
                        }
                        .into())
                    }
                };
                let converted = self.convert("", &element, value)?;
                if let Some(Frame::Array { items, .. }) = self.frames.get_mut(n - 2) {
                    items.push(converted);
                }
                Ok(())
            }
            _ => Err(SerialError::State {
                call: "write_value",
                state: "no open element".to_string(),
            }
            .into()),
        }
    }

    fn write_null(&mut self) -> Result<(), CoreError> {
        self.stack.write_null()?;
        if self.skipping > 0 {
            return Ok(());
        }
        let n = self.frames.len();
        if n >= 2 && matches!(self.frames.last(), Some(Frame::Item)) {
            if let Some(Frame::Array { items, .. }) = self.frames.get_mut(n - 2) {
                items.push(FieldValue::Null);
            }
        }
        Ok(())
    }
}
