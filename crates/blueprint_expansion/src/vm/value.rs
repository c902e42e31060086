use serde::{Deserialize, Serialize};

use super::VmError;
use crate::graph::{ContainerType, PinCategory, PinType};

/// Runtime value flowing through data pins.
///
/// Maps are kept as ordered entry lists so iteration follows insertion order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    None,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    Name(String),
    Object(String),
    Array(Vec<Value>),
    Map(Vec<(Value, Value)>),
}

impl Value {
    fn type_name(&self) -> &'static str {
        match self {
            Value::None => "none",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::String(_) => "string",
            Value::Name(_) => "name",
            Value::Object(_) => "object",
            Value::Array(_) => "array",
            Value::Map(_) => "map",
        }
    }

    fn mismatch(&self, expected: &'static str) -> VmError {
        VmError::TypeMismatch {
            expected,
            found: self.type_name().to_string(),
        }
    }

    pub fn as_bool(&self) -> Result<bool, VmError> {
        match self {
            Value::Bool(b) => Ok(*b),
            other => Err(other.mismatch("bool")),
        }
    }

    pub fn as_int(&self) -> Result<i64, VmError> {
        match self {
            Value::Int(i) => Ok(*i),
            other => Err(other.mismatch("int")),
        }
    }

    pub fn as_array(&self) -> Result<&[Value], VmError> {
        match self {
            Value::Array(items) => Ok(items),
            other => Err(other.mismatch("array")),
        }
    }

    pub fn as_map(&self) -> Result<&[(Value, Value)], VmError> {
        match self {
            Value::Map(entries) => Ok(entries),
            other => Err(other.mismatch("map")),
        }
    }

    /// Object identity; `None` means no instance.
    pub fn as_object(&self) -> Result<Option<&str>, VmError> {
        match self {
            Value::Object(name) => Ok(Some(name)),
            Value::None => Ok(None),
            other => Err(other.mismatch("object")),
        }
    }

    /// Zero value for an unset pin or variable of the given type.
    pub fn default_for(pin_type: &PinType) -> Value {
        match pin_type.container {
            ContainerType::Array | ContainerType::Set => Value::Array(Vec::new()),
            ContainerType::Map => Value::Map(Vec::new()),
            ContainerType::None => match pin_type.category {
                PinCategory::Boolean => Value::Bool(false),
                PinCategory::Int => Value::Int(0),
                PinCategory::Float => Value::Float(0.0),
                PinCategory::String | PinCategory::Text => Value::String(String::new()),
                PinCategory::Name => Value::Name(String::new()),
                _ => Value::None,
            },
        }
    }

    /// Interpret a pin's literal default according to the pin type.
    ///
    /// Scalars use their plain text form (`true`, `42`, `1.5`). Arrays and
    /// sets are JSON arrays, maps are JSON arrays of `[key, value]` pairs.
    pub fn from_literal(pin_type: &PinType, literal: &str, default_object: Option<&str>) -> Result<Value, VmError> {
        let literal = literal.trim();
        let invalid = || VmError::InvalidLiteral {
            literal: literal.to_string(),
            pin_type: pin_type.to_string(),
        };

        if pin_type.is_container() {
            if literal.is_empty() {
                return Ok(Value::default_for(pin_type));
            }
            let json: serde_json::Value = serde_json::from_str(literal).map_err(|_| invalid())?;
            let serde_json::Value::Array(items) = json else {
                return Err(invalid());
            };

            return if pin_type.container == ContainerType::Map {
                let value_category = pin_type.value_terminal.clone().unwrap_or(PinCategory::Wildcard);
                items
                    .iter()
                    .map(|entry| match entry.as_array().map(Vec::as_slice) {
                        Some([key, value]) => Ok((
                            from_json(&pin_type.category, key).ok_or_else(invalid)?,
                            from_json(&value_category, value).ok_or_else(invalid)?,
                        )),
                        _ => Err(invalid()),
                    })
                    .collect::<Result<Vec<_>, _>>()
                    .map(Value::Map)
            } else {
                items
                    .iter()
                    .map(|item| from_json(&pin_type.category, item).ok_or_else(invalid))
                    .collect::<Result<Vec<_>, _>>()
                    .map(Value::Array)
            };
        }

        match &pin_type.category {
            PinCategory::Object(_) => Ok(default_object.map_or(Value::None, |o| Value::Object(o.to_string()))),
            _ if literal.is_empty() => Ok(Value::default_for(pin_type)),
            PinCategory::Boolean => match literal.to_ascii_lowercase().as_str() {
                "true" => Ok(Value::Bool(true)),
                "false" => Ok(Value::Bool(false)),
                _ => Err(invalid()),
            },
            PinCategory::Int => literal.parse().map(Value::Int).map_err(|_| invalid()),
            PinCategory::Float => literal.parse().map(Value::Float).map_err(|_| invalid()),
            PinCategory::String | PinCategory::Text => Ok(Value::String(literal.to_string())),
            PinCategory::Name => Ok(Value::Name(literal.to_string())),
            PinCategory::Wildcard => Ok(serde_json::from_str::<serde_json::Value>(literal)
                .ok()
                .and_then(|json| from_json(&PinCategory::Wildcard, &json))
                .unwrap_or_else(|| Value::String(literal.to_string()))),
            _ => Err(invalid()),
        }
    }
}

fn from_json(category: &PinCategory, json: &serde_json::Value) -> Option<Value> {
    use serde_json::Value as Json;

    match (category, json) {
        (PinCategory::Boolean, Json::Bool(b)) => Some(Value::Bool(*b)),
        (PinCategory::Int, Json::Number(n)) => n.as_i64().map(Value::Int),
        (PinCategory::Float, Json::Number(n)) => n.as_f64().map(Value::Float),
        (PinCategory::String | PinCategory::Text, Json::String(s)) => Some(Value::String(s.clone())),
        (PinCategory::Name, Json::String(s)) => Some(Value::Name(s.clone())),
        (PinCategory::Object(_), Json::String(s)) => Some(Value::Object(s.clone())),
        (PinCategory::Object(_), Json::Null) => Some(Value::None),
        (PinCategory::Wildcard, Json::Null) => Some(Value::None),
        (PinCategory::Wildcard, Json::Bool(b)) => Some(Value::Bool(*b)),
        (PinCategory::Wildcard, Json::Number(n)) => n
            .as_i64()
            .map(Value::Int)
            .or_else(|| n.as_f64().map(Value::Float)),
        (PinCategory::Wildcard, Json::String(s)) => Some(Value::String(s.clone())),
        (PinCategory::Wildcard, Json::Array(items)) => items
            .iter()
            .map(|item| from_json(&PinCategory::Wildcard, item))
            .collect::<Option<Vec<_>>>()
            .map(Value::Array),
        _ => None,
    }
}

impl std::fmt::Display for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Value::None => write!(f, "None"),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Int(i) => write!(f, "{}", i),
            Value::Float(x) => write!(f, "{}", x),
            Value::String(s) | Value::Name(s) => write!(f, "{}", s),
            Value::Object(o) => write!(f, "<{}>", o),
            Value::Array(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", item)?;
                }
                write!(f, "]")
            }
            Value::Map(entries) => {
                write!(f, "{{")?;
                for (i, (key, value)) in entries.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}: {}", key, value)?;
                }
                write!(f, "}}")
            }
        }
    }
}
