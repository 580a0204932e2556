//! Query construction.
//!
//! A [`Query`] is the command name followed by its arguments, each an
//! opaque byte string. Payloads may contain NULs and CRLF; the wire
//! format is length-prefixed.
//!
//! # Example
//! ```
//! use pulse_redis::Query;
//!
//! let q = Query::cmd("SET").arg("session:123").arg(b"data".to_vec());
//! assert_eq!(q.len(), 3);
//! ```

/// A single Redis command, immutable once enqueued.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Query(Vec<Vec<u8>>);

impl Query {
    /// Start a query with the given command name.
    pub fn cmd(name: impl Into<Vec<u8>>) -> Self {
        Self(vec![name.into()])
    }

    /// Append one argument.
    pub fn arg(mut self, arg: impl Into<Vec<u8>>) -> Self {
        self.0.push(arg.into());
        self
    }

    /// Append several arguments.
    pub fn args<I, T>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<Vec<u8>>,
    {
        self.0.extend(args.into_iter().map(Into::into));
        self
    }

    /// Number of parts, command name included.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterate the parts in order.
    pub fn iter(&self) -> impl Iterator<Item = &[u8]> {
        self.0.iter().map(Vec::as_slice)
    }
}

impl<T: Into<Vec<u8>>> FromIterator<T> for Query {
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        Self(iter.into_iter().map(Into::into).collect())
    }
}

impl From<Vec<Vec<u8>>> for Query {
    fn from(parts: Vec<Vec<u8>>) -> Self {
        Self(parts)
    }
}
