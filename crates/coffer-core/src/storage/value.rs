use std::{collections::BTreeSet, fmt};

use serde::{Deserialize, Serialize};

/// A single preference value. Writing a key replaces both its value and its kind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum PrefValue {
    String(String),
    Bool(bool),
    Int(i32),
    Long(i64),
    Float(#[serde(with = "f32_bits")] f32),
    StringSet(BTreeSet<String>),
}

/// JSON has no NaN or infinity, so floats are stored as their IEEE-754 bits.
mod f32_bits {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &f32, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u32(value.to_bits())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<f32, D::Error> {
        u32::deserialize(deserializer).map(f32::from_bits)
    }
}

/// Discriminant of [`PrefValue`], used for typed lookups and CLI parsing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PrefKind {
    String,
    Bool,
    Int,
    Long,
    Float,
    StringSet,
}

impl PrefValue {
    pub fn kind(&self) -> PrefKind {
        match self {
            PrefValue::String(_) => PrefKind::String,
            PrefValue::Bool(_) => PrefKind::Bool,
            PrefValue::Int(_) => PrefKind::Int,
            PrefValue::Long(_) => PrefKind::Long,
            PrefValue::Float(_) => PrefKind::Float,
            PrefValue::StringSet(_) => PrefKind::StringSet,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            PrefValue::String(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            PrefValue::Bool(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i32> {
        match self {
            PrefValue::Int(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_long(&self) -> Option<i64> {
        match self {
            PrefValue::Long(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_float(&self) -> Option<f32> {
        match self {
            PrefValue::Float(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_string_set(&self) -> Option<&BTreeSet<String>> {
        match self {
            PrefValue::StringSet(v) => Some(v),
            _ => None,
        }
    }

    pub fn into_string(self) -> Option<String> {
        match self {
            PrefValue::String(v) => Some(v),
            _ => None,
        }
    }

    pub fn into_string_set(self) -> Option<BTreeSet<String>> {
        match self {
            PrefValue::StringSet(v) => Some(v),
            _ => None,
        }
    }
}

impl fmt::Display for PrefValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PrefValue::String(v) => write!(f, "{v}"),
            PrefValue::Bool(v) => write!(f, "{v}"),
            PrefValue::Int(v) => write!(f, "{v}"),
            PrefValue::Long(v) => write!(f, "{v}"),
            PrefValue::Float(v) => write!(f, "{v}"),
            PrefValue::StringSet(v) => {
                let items: Vec<&str> = v.iter().map(String::as_str).collect();
                write!(f, "[{}]", items.join(", "))
            }
        }
    }
}

impl fmt::Display for PrefKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            PrefKind::String => "string",
            PrefKind::Bool => "bool",
            PrefKind::Int => "int",
            PrefKind::Long => "long",
            PrefKind::Float => "float",
            PrefKind::StringSet => "set",
        };
        f.write_str(label)
    }
}

impl From<String> for PrefValue {
    fn from(value: String) -> Self {
        PrefValue::String(value)
    }
}

impl From<&str> for PrefValue {
    fn from(value: &str) -> Self {
        PrefValue::String(value.to_string())
    }
}

impl From<bool> for PrefValue {
    fn from(value: bool) -> Self {
        PrefValue::Bool(value)
    }
}

impl From<i32> for PrefValue {
    fn from(value: i32) -> Self {
        PrefValue::Int(value)
    }
}

impl From<i64> for PrefValue {
    fn from(value: i64) -> Self {
        PrefValue::Long(value)
    }
}

impl From<f32> for PrefValue {
    fn from(value: f32) -> Self {
        PrefValue::Float(value)
    }
}

impl From<BTreeSet<String>> for PrefValue {
    fn from(value: BTreeSet<String>) -> Self {
        PrefValue::StringSet(value)
    }
}
