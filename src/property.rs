//! Property types and decoded property values.

use serde::Serialize;
use std::fmt;

/// Declared value type of a dataset property.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(u8)]
pub enum PropertyType {
    /// A single UTF-8 string
    #[default]
    Text = 0,
    /// A signed 32-bit integer
    Integer = 1,
    /// A boolean
    Boolean = 2,
    /// An ordered list of UTF-8 strings
    List = 3,
}

impl PropertyType {
    /// Convert from a format type tag.
    ///
    /// Returns `None` for unknown tags.
    pub fn from_tag(tag: u8) -> Option<Self> {
        match tag {
            0 => Some(PropertyType::Text),
            1 => Some(PropertyType::Integer),
            2 => Some(PropertyType::Boolean),
            3 => Some(PropertyType::List),
            _ => None,
        }
    }

    /// Convert to a format type tag.
    pub fn as_tag(self) -> u8 {
        self as u8
    }

    /// Get the string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            PropertyType::Text => "TEXT",
            PropertyType::Integer => "INTEGER",
            PropertyType::Boolean => "BOOLEAN",
            PropertyType::List => "LIST",
        }
    }
}

impl fmt::Display for PropertyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A property value decoded from the dataset value pool.
///
/// String data borrows directly from the loaded dataset; no copy is made
/// until the caller needs one.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Value<'a> {
    /// A single string
    Text(&'a str),
    /// A signed integer
    Integer(i32),
    /// A boolean
    Boolean(bool),
    /// An ordered list of strings
    List(Vec<&'a str>),
}

impl<'a> Value<'a> {
    /// The declared type of this value.
    pub fn property_type(&self) -> PropertyType {
        match self {
            Value::Text(_) => PropertyType::Text,
            Value::Integer(_) => PropertyType::Integer,
            Value::Boolean(_) => PropertyType::Boolean,
            Value::List(_) => PropertyType::List,
        }
    }

    /// The string content, if this is a text value.
    pub fn as_text(&self) -> Option<&'a str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }

    /// The integer content, if this is an integer value.
    pub fn as_integer(&self) -> Option<i32> {
        match self {
            Value::Integer(n) => Some(*n),
            _ => None,
        }
    }

    /// The boolean content, if this is a boolean value.
    pub fn as_boolean(&self) -> Option<bool> {
        match self {
            Value::Boolean(b) => Some(*b),
            _ => None,
        }
    }

    /// The list content, if this is a list value.
    pub fn as_list(&self) -> Option<&[&'a str]> {
        match self {
            Value::List(items) => Some(items),
            _ => None,
        }
    }
}

impl fmt::Display for Value<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Text(s) => write!(f, "{}", s),
            Value::Integer(n) => write!(f, "{}", n),
            Value::Boolean(b) => write!(f, "{}", if *b { "True" } else { "False" }),
            Value::List(items) => write!(f, "{}", items.join("|")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_property_type_tags() {
        assert_eq!(PropertyType::from_tag(0), Some(PropertyType::Text));
        assert_eq!(PropertyType::from_tag(1), Some(PropertyType::Integer));
        assert_eq!(PropertyType::from_tag(2), Some(PropertyType::Boolean));
        assert_eq!(PropertyType::from_tag(3), Some(PropertyType::List));
        assert_eq!(PropertyType::from_tag(4), None);

        assert_eq!(PropertyType::Text.as_tag(), 0);
        assert_eq!(PropertyType::List.as_tag(), 3);
    }

    #[test]
    fn test_value_display() {
        assert_eq!(Value::Text("iPhone").to_string(), "iPhone");
        assert_eq!(Value::Integer(320).to_string(), "320");
        assert_eq!(Value::Boolean(true).to_string(), "True");
        assert_eq!(Value::Boolean(false).to_string(), "False");
        assert_eq!(Value::List(vec!["gif", "png"]).to_string(), "gif|png");
    }

    #[test]
    fn test_value_accessors() {
        assert_eq!(Value::Text("x").as_text(), Some("x"));
        assert_eq!(Value::Text("x").as_integer(), None);
        assert_eq!(Value::Integer(-5).as_integer(), Some(-5));
        assert_eq!(Value::Boolean(true).as_boolean(), Some(true));
        assert_eq!(Value::List(vec!["a"]).as_list(), Some(&["a"][..]));
    }

    #[test]
    fn test_value_json() {
        assert_eq!(serde_json::to_string(&Value::Text("x")).unwrap(), "\"x\"");
        assert_eq!(serde_json::to_string(&Value::Integer(7)).unwrap(), "7");
        assert_eq!(serde_json::to_string(&Value::Boolean(true)).unwrap(), "true");
        assert_eq!(
            serde_json::to_string(&Value::List(vec!["a", "b"])).unwrap(),
            "[\"a\",\"b\"]"
        );
    }
}
