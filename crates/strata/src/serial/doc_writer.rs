//! Tree-writer backend producing storage documents.

use std::sync::Arc;

use strata_core::error::{CoreError, SerialError};
use strata_core::meta::Registry;
use strata_core::value::{Atom, Doc, Value};
use strata_core::writer::{TreeWriter, WriterStack};

use super::DiscriminatorConvention;

enum Node {
    Document { root: Option<Value> },
    Dict(Doc),
    Element { name: String, value: Option<Value> },
    Array(Vec<Value>),
    Item { value: Option<Value> },
}

/// Builds a [`Doc`] tree. `start_dict` stamps the `_t` discriminator from
/// the registry's inheritance chain; null elements are omitted from
/// dictionaries while null array items are kept.
pub struct DocWriter {
    registry: Arc<Registry>,
    convention: DiscriminatorConvention,
    stack: WriterStack,
    nodes: Vec<Node>,
    result: Option<Value>,
}

impl DocWriter {
    pub fn new(registry: Arc<Registry>, convention: DiscriminatorConvention) -> Self {
        Self {
            registry,
            convention,
            stack: WriterStack::new(),
            nodes: Vec::new(),
            result: None,
        }
    }

    /// Consume the writer after `end_document`; the root must be a document.
    pub fn into_doc(self) -> Result<Doc, CoreError> {
        match self.result {
            Some(Value::Doc(doc)) => Ok(doc),
            _ => Err(SerialError::State {
                call: "into_doc",
                state: "unfinished document".to_string(),
            }
            .into()),
        }
    }

    fn attach(&mut self, value: Value) {
        match self.nodes.last_mut() {
            Some(Node::Element { value: slot, .. }) | Some(Node::Item { value: slot }) => {
                *slot = Some(value);
            }
            Some(Node::Document { root }) => *root = Some(value),
            _ => {}
        }
    }

    fn discriminator(&self, type_name: &str) -> Result<Value, CoreError> {
        let chain = self.registry.inheritance_chain(type_name)?;
        Ok(match self.convention {
            DiscriminatorConvention::Hierarchical => {
                Value::Array(chain.into_iter().map(Value::String).collect())
            }
            DiscriminatorConvention::Scalar => {
                Value::String(chain.into_iter().next_back().unwrap_or_default())
            }
        })
    }
}

impl TreeWriter for DocWriter {
    fn start_document(&mut self, name: &str) -> Result<(), CoreError> {
        self.stack.start_document(name)?;
        self.nodes.push(Node::Document { root: None });
        Ok(())
    }

    fn end_document(&mut self, name: &str) -> Result<(), CoreError> {
        self.stack.end_document(name)?;
        if let Some(Node::Document { root }) = self.nodes.pop() {
            self.result = Some(root.unwrap_or(Value::Null));
        }
        Ok(())
    }

    fn start_dict(&mut self, type_name: &str) -> Result<(), CoreError> {
        self.stack.start_dict(type_name)?;
        let mut doc = Doc::new();
        doc.push("_t", self.discriminator(type_name)?);
        self.nodes.push(Node::Dict(doc));
        Ok(())
    }

    fn end_dict(&mut self, type_name: &str) -> Result<(), CoreError> {
        self.stack.end_dict(type_name)?;
        if let Some(Node::Dict(doc)) = self.nodes.pop() {
            self.attach(Value::Doc(doc));
        }
        Ok(())
    }

    fn start_element(&mut self, name: &str) -> Result<(), CoreError> {
        self.stack.start_element(name)?;
        self.nodes.push(Node::Element {
            name: name.to_string(),
            value: None,
        });
        Ok(())
    }

    fn end_element(&mut self, name: &str) -> Result<(), CoreError> {
        self.stack.end_element(name)?;
        if let Some(Node::Element { name, value }) = self.nodes.pop() {
            match value {
                // Dictionaries drop null elements.
                None | Some(Value::Null) => {}
                Some(value) => {
                    if let Some(Node::Dict(doc)) = self.nodes.last_mut() {
                        doc.push(name, value);
                    }
                }
            }
        }
        Ok(())
    }

    fn start_array(&mut self) -> Result<(), CoreError> {
        self.stack.start_array()?;
        self.nodes.push(Node::Array(Vec::new()));
        Ok(())
    }

    fn end_array(&mut self) -> Result<(), CoreError> {
        self.stack.end_array()?;
        if let Some(Node::Array(items)) = self.nodes.pop() {
            self.attach(Value::Array(items));
        }
        Ok(())
    }

    fn start_array_item(&mut self) -> Result<(), CoreError> {
        self.stack.start_array_item()?;
        self.nodes.push(Node::Item { value: None });
        Ok(())
    }

    fn end_array_item(&mut self) -> Result<(), CoreError> {
        self.stack.end_array_item()?;
        if let Some(Node::Item { value }) = self.nodes.pop() {
            if let Some(Node::Array(items)) = self.nodes.last_mut() {
                // Arrays keep null items.
                items.push(value.unwrap_or(Value::Null));
            }
        }
        Ok(())
    }

    fn write_value(&mut self, value: Atom) -> Result<(), CoreError> {
        self.stack.write_value()?;
        self.attach(value.to_wire());
        Ok(())
    }

    fn write_null(&mut self) -> Result<(), CoreError> {
        self.stack.write_null()?;
        self.attach(Value::Null);
        Ok(())
    }
}
