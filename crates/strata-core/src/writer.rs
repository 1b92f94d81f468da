//! Tree-writer contract.
//!
//! A [`TreeWriter`] is a stateful streaming builder for one document. Calls
//! must follow the transition table below; anything else is a programming
//! error and fails loudly with [`SerialError::State`]. Names passed to the
//! matching `end_*` calls must equal the `start_*` name at the same depth.
//!
//! ```text
//! empty            --start_document(name)-->  document_started
//! document_started --start_dict(type)----->   dict_started
//! dict_started     --start_element(name)-->   element_started
//! element_started  --write_value / start_array / start_dict
//! array_started    --start_array_item----->   array_item_started
//! array_item_started --write_value / write_null / start_dict
//! ...matching end calls restore the previous state...
//! ```
//!
//! Backends implement the trait over their own output (document trees, JSON,
//! live objects); [`WriterStack`] does the shared transition bookkeeping.

use crate::error::{CoreError, SerialError};
use crate::value::Atom;

/// Streaming document builder.
pub trait TreeWriter {
    fn start_document(&mut self, name: &str) -> Result<(), CoreError>;
    fn end_document(&mut self, name: &str) -> Result<(), CoreError>;

    /// Open a dictionary for a value of the given type. Backends that store
    /// discriminators emit them here.
    fn start_dict(&mut self, type_name: &str) -> Result<(), CoreError>;
    fn end_dict(&mut self, type_name: &str) -> Result<(), CoreError>;

    fn start_element(&mut self, name: &str) -> Result<(), CoreError>;
    fn end_element(&mut self, name: &str) -> Result<(), CoreError>;

    fn start_array(&mut self) -> Result<(), CoreError>;
    fn end_array(&mut self) -> Result<(), CoreError>;
    fn start_array_item(&mut self) -> Result<(), CoreError>;
    fn end_array_item(&mut self) -> Result<(), CoreError>;

    /// Write an atomic value at the current element or array item.
    fn write_value(&mut self, value: Atom) -> Result<(), CoreError>;

    /// Write an explicit null array item. Null elements of dictionaries are
    /// omitted by callers instead.
    fn write_null(&mut self) -> Result<(), CoreError>;

    fn write_value_element(&mut self, name: &str, value: Atom) -> Result<(), CoreError> {
        self.start_element(name)?;
        self.write_value(value)?;
        self.end_element(name)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum FrameKind {
    Document,
    Dict,
    Element,
    Array,
    ArrayItem,
}

impl FrameKind {
    fn as_str(self) -> &'static str {
        match self {
            FrameKind::Document => "document_started",
            FrameKind::Dict => "dict_started",
            FrameKind::Element => "element_started",
            FrameKind::Array => "array_started",
            FrameKind::ArrayItem => "array_item_started",
        }
    }
}

#[derive(Clone, Debug)]
struct Frame {
    kind: FrameKind,
    name: String,
    /// Whether the frame has received its payload (value, dict, or array).
    filled: bool,
}

/// Shared transition bookkeeping for [`TreeWriter`] backends.
///
/// Backends call the mirror method before mutating their output; a returned
/// error means the output was not touched.
#[derive(Clone, Debug, Default)]
pub struct WriterStack {
    frames: Vec<Frame>,
    done: bool,
}

impl WriterStack {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_done(&self) -> bool {
        self.done
    }

    /// Depth of open frames, root document included.
    pub fn depth(&self) -> usize {
        self.frames.len()
    }

    fn state_name(&self) -> String {
        if self.done {
            return "done".to_string();
        }
        match self.frames.last() {
            None => "empty".to_string(),
            Some(frame) => frame.kind.as_str().to_string(),
        }
    }

    fn fail(&self, call: &'static str) -> CoreError {
        SerialError::State {
            call,
            state: self.state_name(),
        }
        .into()
    }

    fn top(&self) -> Option<&Frame> {
        self.frames.last()
    }

    fn push(&mut self, kind: FrameKind, name: &str) {
        self.frames.push(Frame {
            kind,
            name: name.to_string(),
            filled: false,
        });
    }

    fn pop(&mut self, call: &'static str, kind: FrameKind, name: Option<&str>) -> Result<(), CoreError> {
        match self.top() {
            Some(frame) if frame.kind == kind => {
                if let Some(name) = name {
                    if frame.name != name {
                        return Err(SerialError::NameMismatch {
                            call,
                            expected: frame.name.clone(),
                            got: name.to_string(),
                        }
                        .into());
                    }
                }
                self.frames.pop();
                if let Some(parent) = self.frames.last_mut() {
                    parent.filled = true;
                } else {
                    self.done = true;
                }
                Ok(())
            }
            _ => Err(self.fail(call)),
        }
    }

    pub fn start_document(&mut self, name: &str) -> Result<(), CoreError> {
        if self.done || !self.frames.is_empty() {
            return Err(self.fail("start_document"));
        }
        self.push(FrameKind::Document, name);
        Ok(())
    }

    pub fn end_document(&mut self, name: &str) -> Result<(), CoreError> {
        self.pop("end_document", FrameKind::Document, Some(name))
    }

    pub fn start_dict(&mut self, type_name: &str) -> Result<(), CoreError> {
        match self.top() {
            Some(frame)
                if !frame.filled
                    && matches!(
                        frame.kind,
                        FrameKind::Document | FrameKind::Element | FrameKind::ArrayItem
                    ) =>
            {
                self.push(FrameKind::Dict, type_name);
                Ok(())
            }
            _ => Err(self.fail("start_dict")),
        }
    }

    pub fn end_dict(&mut self, type_name: &str) -> Result<(), CoreError> {
        self.pop("end_dict", FrameKind::Dict, Some(type_name))
    }

    pub fn start_element(&mut self, name: &str) -> Result<(), CoreError> {
        match self.top() {
            Some(frame) if frame.kind == FrameKind::Dict => {
                self.push(FrameKind::Element, name);
                Ok(())
            }
            _ => Err(self.fail("start_element")),
        }
    }

    pub fn end_element(&mut self, name: &str) -> Result<(), CoreError> {
        self.pop("end_element", FrameKind::Element, Some(name))
    }

    pub fn start_array(&mut self) -> Result<(), CoreError> {
        match self.top() {
            Some(frame) if frame.kind == FrameKind::Element && !frame.filled => {
                self.push(FrameKind::Array, "");
                Ok(())
            }
            Some(frame) if frame.kind == FrameKind::ArrayItem => Err(SerialError::NestedList {
                element: self.element_name(),
            }
            .into()),
            _ => Err(self.fail("start_array")),
        }
    }

    pub fn end_array(&mut self) -> Result<(), CoreError> {
        self.pop("end_array", FrameKind::Array, None)
    }

    pub fn start_array_item(&mut self) -> Result<(), CoreError> {
        match self.top() {
            Some(frame) if frame.kind == FrameKind::Array => {
                self.push(FrameKind::ArrayItem, "");
                Ok(())
            }
            _ => Err(self.fail("start_array_item")),
        }
    }

    pub fn end_array_item(&mut self) -> Result<(), CoreError> {
        self.pop("end_array_item", FrameKind::ArrayItem, None)
    }

    pub fn write_value(&mut self) -> Result<(), CoreError> {
        match self.frames.last_mut() {
            Some(frame)
                if !frame.filled
                    && matches!(frame.kind, FrameKind::Element | FrameKind::ArrayItem) =>
            {
                frame.filled = true;
                Ok(())
            }
            _ => Err(self.fail("write_value")),
        }
    }

    pub fn write_null(&mut self) -> Result<(), CoreError> {
        match self.frames.last_mut() {
            Some(frame) if !frame.filled && frame.kind == FrameKind::ArrayItem => {
                frame.filled = true;
                Ok(())
            }
            _ => Err(self.fail("write_null")),
        }
    }

    /// Name of the nearest enclosing element, for error messages.
    fn element_name(&self) -> String {
        self.frames
            .iter()
            .rev()
            .find(|frame| frame.kind == FrameKind::Element)
            .map(|frame| frame.name.clone())
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn open_element(stack: &mut WriterStack) {
        stack.start_document("doc").unwrap();
        stack.start_dict("Sample").unwrap();
        stack.start_element("field").unwrap();
    }

    #[test]
    fn accepts_well_formed_sequence() {
        let mut stack = WriterStack::new();
        open_element(&mut stack);
        stack.write_value().unwrap();
        stack.end_element("field").unwrap();
        stack.start_element("list").unwrap();
        stack.start_array().unwrap();
        stack.start_array_item().unwrap();
        stack.write_null().unwrap();
        stack.end_array_item().unwrap();
        stack.end_array().unwrap();
        stack.end_element("list").unwrap();
        stack.end_dict("Sample").unwrap();
        stack.end_document("doc").unwrap();
        assert!(stack.is_done());
    }

    #[test]
    fn rejects_out_of_order_calls() {
        let mut stack = WriterStack::new();
        assert!(stack.start_element("field").is_err());
        stack.start_document("doc").unwrap();
        assert!(stack.start_element("field").is_err());
        assert!(stack.end_document("other").is_err());
    }

    #[test]
    fn rejects_mismatched_end_names() {
        let mut stack = WriterStack::new();
        open_element(&mut stack);
        stack.write_value().unwrap();
        let err = stack.end_element("wrong").unwrap_err();
        assert!(err.to_string().contains("wrong"));
    }

    #[test]
    fn rejects_array_inside_array() {
        let mut stack = WriterStack::new();
        open_element(&mut stack);
        stack.start_array().unwrap();
        stack.start_array_item().unwrap();
        assert!(stack.start_array().is_err());
    }

    #[test]
    fn rejects_double_value() {
        let mut stack = WriterStack::new();
        open_element(&mut stack);
        stack.write_value().unwrap();
        assert!(stack.write_value().is_err());
    }

    #[test]
    fn rejects_writes_after_done() {
        let mut stack = WriterStack::new();
        stack.start_document("doc").unwrap();
        stack.start_dict("Sample").unwrap();
        stack.end_dict("Sample").unwrap();
        stack.end_document("doc").unwrap();
        assert!(stack.start_document("doc").is_err());
    }
}
