/*
 * Copyright (c) 2025 Raphael Amorim
 *
 * This file is part of nesh, which is licensed
 * under GNU General Public License v3.0.
 */

//! Values exchanged with the live environment.
//!
//! These mirror what the environment sends over the wire, so every type
//! here is serde-friendly with camelCase field names.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::parser::{Node, NodeKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValueType {
    Object,
    Function,
    Undefined,
    String,
    Number,
    Boolean,
    Symbol,
    Bigint,
    #[serde(other)]
    Other,
}

/// Handle to a value living in the environment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteObject {
    #[serde(rename = "type")]
    pub kind: ValueType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subtype: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub class_name: Option<String>,
    /// Primitive values only
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Set for objects and functions; needed to list properties
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub object_id: Option<String>,
}

impl RemoteObject {
    fn primitive(kind: ValueType, value: Option<Value>) -> Self {
        Self {
            kind,
            subtype: None,
            class_name: None,
            value,
            description: None,
            object_id: None,
        }
    }

    pub fn undefined() -> Self {
        Self::primitive(ValueType::Undefined, None)
    }

    pub fn string(value: impl Into<String>) -> Self {
        Self::primitive(ValueType::String, Some(Value::String(value.into())))
    }

    pub fn number(value: f64) -> Self {
        let value = serde_json::Number::from_f64(value).map(Value::Number);
        Self::primitive(ValueType::Number, value)
    }

    pub fn boolean(value: bool) -> Self {
        Self::primitive(ValueType::Boolean, Some(Value::Bool(value)))
    }

    pub fn object(object_id: impl Into<String>, class_name: impl Into<String>) -> Self {
        let class_name = class_name.into();
        Self {
            kind: ValueType::Object,
            subtype: None,
            description: Some(class_name.clone()),
            class_name: Some(class_name),
            value: None,
            object_id: Some(object_id.into()),
        }
    }

    pub fn function(object_id: impl Into<String>, name: &str) -> Self {
        Self {
            kind: ValueType::Function,
            subtype: None,
            class_name: Some("Function".to_string()),
            value: None,
            description: Some(format!("function {name}()")),
            object_id: Some(object_id.into()),
        }
    }

    /// True for values reported with type `object`
    pub fn is_object(&self) -> bool {
        self.kind == ValueType::Object
    }

    /// The string payload of a string value
    pub fn as_str(&self) -> Option<&str> {
        match self.kind {
            ValueType::String => self.value.as_ref().and_then(Value::as_str),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExceptionDetails {
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exception: Option<RemoteObject>,
}

/// Outcome of evaluating an expression or loading a module
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Evaluation {
    pub result: RemoteObject,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exception_details: Option<ExceptionDetails>,
}

impl Evaluation {
    pub fn value(result: RemoteObject) -> Self {
        Self {
            result,
            exception_details: None,
        }
    }

    /// A thrown exception described by `text`, e.g. `ReferenceError: x is not defined`
    pub fn thrown(text: impl Into<String>) -> Self {
        let text = text.into();
        Self {
            result: RemoteObject::undefined(),
            exception_details: Some(ExceptionDetails {
                exception: Some(RemoteObject::string(text.clone())),
                text,
            }),
        }
    }

    pub fn threw(&self) -> bool {
        self.exception_details.is_some()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PropertyDescriptor {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<RemoteObject>,
    #[serde(default)]
    pub is_own: bool,
}

/// Where a call or construct expression sits in the line being completed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallSite {
    /// Source text of the callee
    pub callee: String,
    /// Source text of each argument typed so far
    pub arguments: Vec<String>,
    /// Index of the argument the cursor is in
    pub argument_index: usize,
    pub constructor: bool,
    pub start: usize,
    pub end: usize,
}

impl CallSite {
    /// Describes `node`, which must be a call or construct expression
    pub fn from_call(node: &Node, source: &str, cursor: usize) -> Option<Self> {
        let NodeKind::Call {
            callee,
            arguments,
            constructor,
        } = &node.kind
        else {
            return None;
        };

        let argument_index = arguments
            .iter()
            .filter(|argument| {
                argument.end() <= cursor
                    && source
                        .get(argument.end()..cursor)
                        .is_some_and(|gap| gap.trim_start().starts_with(','))
            })
            .count();

        Some(Self {
            callee: callee.source_text(source).to_string(),
            arguments: arguments
                .iter()
                .map(|argument| argument.source_text(source).to_string())
                .collect(),
            argument_index,
            constructor: *constructor,
            start: node.start(),
            end: node.end(),
        })
    }
}
