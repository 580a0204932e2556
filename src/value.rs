//! Reply values returned by the server.

/// A single decoded reply.
///
/// Server-side errors (`-ERR ...`) decode to [`Value::Error`] rather than
/// failing the request; whether an error reply is a failure is the
/// caller's decision.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// Null reply (`$-1`).
    Null,
    /// Simple string (status replies like "OK").
    String(String),
    /// Bulk string (actual data, arbitrary bytes).
    Bulk(Vec<u8>),
    /// Integer reply, surfaced as a double to match the consumer's
    /// numeric value model.
    Number(f64),
    /// Array of values.
    Array(Vec<Value>),
    /// Error reply from the server.
    Error(String),
}

impl Value {
    /// Try to get as string.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            Value::Bulk(b) => std::str::from_utf8(b).ok(),
            _ => None,
        }
    }

    /// Try to get as bytes.
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Value::Bulk(b) => Some(b),
            Value::String(s) => Some(s.as_bytes()),
            _ => None,
        }
    }

    /// Try to get as a number.
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            _ => None,
        }
    }

    /// Try to get as an integer.
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Number(n) => Some(*n as i64),
            _ => None,
        }
    }

    /// Try to get as an array of values.
    pub fn as_array(&self) -> Option<&[Value]> {
        match self {
            Value::Array(items) => Some(items),
            _ => None,
        }
    }

    /// The message of an error reply, if this is one.
    pub fn error_message(&self) -> Option<&str> {
        match self {
            Value::Error(message) => Some(message),
            _ => None,
        }
    }

    /// Check if null.
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Check if error.
    pub fn is_error(&self) -> bool {
        matches!(self, Value::Error(_))
    }
}
