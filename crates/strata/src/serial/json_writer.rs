//! Tree-writer backend producing JSON.
//!
//! The produced document's root key is the full type name. Numbers keep
//! their natural JSON type; dates and temporal ids become strings.

use std::sync::Arc;

use serde_json::{json, Map, Number};
use time::format_description::well_known::Rfc3339;

use strata_core::error::{CoreError, SerialError};
use strata_core::meta::Registry;
use strata_core::value::{date_to_iso_int, time_to_iso_int, Atom};
use strata_core::writer::{TreeWriter, WriterStack};

use super::DiscriminatorConvention;

enum Node {
    Document {
        name: String,
        root: Option<serde_json::Value>,
    },
    Dict(Map<String, serde_json::Value>),
    Element {
        name: String,
        value: Option<serde_json::Value>,
    },
    Array(Vec<serde_json::Value>),
    Item {
        value: Option<serde_json::Value>,
    },
}

pub struct JsonWriter {
    registry: Arc<Registry>,
    convention: DiscriminatorConvention,
    stack: WriterStack,
    nodes: Vec<Node>,
    result: Option<serde_json::Value>,
}

impl JsonWriter {
    pub fn new(registry: Arc<Registry>, convention: DiscriminatorConvention) -> Self {
        Self {
            registry,
            convention,
            stack: WriterStack::new(),
            nodes: Vec::new(),
            result: None,
        }
    }

    pub fn into_json(self) -> Result<serde_json::Value, CoreError> {
        self.result.ok_or_else(|| {
            SerialError::State {
                call: "into_json",
                state: "unfinished document".to_string(),
            }
            .into()
        })
    }

    fn attach(&mut self, value: serde_json::Value) {
        match self.nodes.last_mut() {
            Some(Node::Element { value: slot, .. }) | Some(Node::Item { value: slot }) => {
                *slot = Some(value);
            }
            Some(Node::Document { root, .. }) => *root = Some(value),
            _ => {}
        }
    }

    fn atom_to_json(&self, atom: &Atom) -> Result<serde_json::Value, CoreError> {
        Ok(match atom {
            Atom::String(s) => json!(s),
            Atom::Double(d) => Number::from_f64(*d)
                .map(serde_json::Value::Number)
                .ok_or(SerialError::ValueKind {
                    element: String::new(),
                    expected: "finite double",
                    got: d.to_string(),
                })?,
            Atom::Bool(b) => json!(b),
            Atom::Int(i) => json!(i),
            Atom::Long(l) => json!(l),
            Atom::Date(d) => json!(date_to_iso_int(*d)),
            Atom::Time(t) => json!(time_to_iso_int(*t)),
            Atom::Minute(m) => json!(m.to_iso_int()),
            Atom::DateTime(dt) => {
                let text = dt.format(&Rfc3339).map_err(|e| SerialError::ValueKind {
                    element: String::new(),
                    expected: "formattable datetime",
                    got: e.to_string(),
                })?;
                json!(text)
            }
            Atom::Enum { name, .. } => json!(name),
            Atom::Tid(t) => json!(t.to_string()),
            Atom::Bytes(b) => json!(hex::encode(b)),
        })
    }

    fn discriminator(&self, type_name: &str) -> Result<serde_json::Value, CoreError> {
        let chain = self.registry.inheritance_chain(type_name)?;
        Ok(match self.convention {
            DiscriminatorConvention::Hierarchical => json!(chain),
            DiscriminatorConvention::Scalar => json!(chain.last().cloned().unwrap_or_default()),
        })
    }
}

impl TreeWriter for JsonWriter {
    fn start_document(&mut self, name: &str) -> Result<(), CoreError> {
        self.stack.start_document(name)?;
        self.nodes.push(Node::Document {
            name: name.to_string(),
            root: None,
        });
        Ok(())
    }

    fn end_document(&mut self, name: &str) -> Result<(), CoreError> {
        self.stack.end_document(name)?;
        if let Some(Node::Document { name, root }) = self.nodes.pop() {
            let mut top = Map::new();
            top.insert(name, root.unwrap_or(serde_json::Value::Null));
            self.result = Some(serde_json::Value::Object(top));
        }
        Ok(())
    }

    fn start_dict(&mut self, type_name: &str) -> Result<(), CoreError> {
        self.stack.start_dict(type_name)?;
        let mut map = Map::new();
        map.insert("_t".to_string(), self.discriminator(type_name)?);
        self.nodes.push(Node::Dict(map));
        Ok(())
    }

    fn end_dict(&mut self, type_name: &str) -> Result<(), CoreError> {
        self.stack.end_dict(type_name)?;
        if let Some(Node::Dict(map)) = self.nodes.pop() {
            self.attach(serde_json::Value::Object(map));
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
                None | Some(serde_json::Value::Null) => {}
                Some(value) => {
                    if let Some(Node::Dict(map)) = self.nodes.last_mut() {
                        map.insert(name, value);
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
            self.attach(serde_json::Value::Array(items));
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
                items.push(value.unwrap_or(serde_json::Value::Null));
            }
        }
        Ok(())
    }

    fn write_value(&mut self, value: Atom) -> Result<(), CoreError> {
        self.stack.write_value()?;
        let json = self.atom_to_json(&value)?;
        self.attach(json);
        Ok(())
    }

    fn write_null(&mut self) -> Result<(), CoreError> {
        self.stack.write_null()?;
        self.attach(serde_json::Value::Null);
        Ok(())
    }
}
