//! Caller-defined key/value data attached to a connection.

use std::collections::HashMap;

use parking_lot::Mutex;

/// A typed metadata value.
#[derive(Debug, Clone, PartialEq)]
pub enum MetaValue {
    /// Boolean flag.
    Bool(bool),
    /// Signed integer.
    Int(i64),
    /// Floating point number.
    Float(f64),
    /// UTF-8 text.
    Text(String),
    /// Raw bytes.
    Bytes(Vec<u8>),
}

impl MetaValue {
    /// The text, if this is a `Text` value.
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            MetaValue::Text(s) => Some(s),
            _ => None,
        }
    }

    /// The integer, if this is an `Int` value.
    #[must_use]
    pub const fn as_int(&self) -> Option<i64> {
        match self {
            MetaValue::Int(v) => Some(*v),
            _ => None,
        }
    }

    /// The flag, if this is a `Bool` value.
    #[must_use]
    pub const fn as_bool(&self) -> Option<bool> {
        match self {
            MetaValue::Bool(v) => Some(*v),
            _ => None,
        }
    }
}

impl From<bool> for MetaValue {
    fn from(v: bool) -> Self {
        MetaValue::Bool(v)
    }
}

impl From<i64> for MetaValue {
    fn from(v: i64) -> Self {
        MetaValue::Int(v)
    }
}

impl From<f64> for MetaValue {
    fn from(v: f64) -> Self {
        MetaValue::Float(v)
    }
}

impl From<String> for MetaValue {
    fn from(v: String) -> Self {
        MetaValue::Text(v)
    }
}

impl From<&str> for MetaValue {
    fn from(v: &str) -> Self {
        MetaValue::Text(v.to_string())
    }
}

impl From<Vec<u8>> for MetaValue {
    fn from(v: Vec<u8>) -> Self {
        MetaValue::Bytes(v)
    }
}

/// Thread-safe metadata map.
#[derive(Debug, Default)]
pub struct Metadata {
    entries: Mutex<HashMap<String, MetaValue>>,
}

impl Metadata {
    /// Create an empty map.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set `key`, returning the previous value.
    pub fn insert(&self, key: impl Into<String>, value: impl Into<MetaValue>) -> Option<MetaValue> {
        self.entries.lock().insert(key.into(), value.into())
    }

    /// A copy of the value for `key`.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<MetaValue> {
        self.entries.lock().get(key).cloned()
    }

    /// Remove `key`, returning its value.
    pub fn remove(&self, key: &str) -> Option<MetaValue> {
        self.entries.lock().remove(key)
    }

    /// Whether `key` is set.
    #[must_use]
    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.lock().contains_key(key)
    }

    /// Number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// Whether the map is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    /// Snapshot of every entry.
    #[must_use]
    pub fn snapshot(&self) -> HashMap<String, MetaValue> {
        self.entries.lock().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_insert_get_remove() {
        let meta = Metadata::new();
        assert!(meta.is_empty());

        assert_eq!(meta.insert("user", "alice"), None);
        assert_eq!(meta.insert("retries", 3i64), None);
        assert_eq!(meta.insert("trusted", true), None);

        assert_eq!(meta.get("user").unwrap().as_str(), Some("alice"));
        assert_eq!(meta.get("retries").unwrap().as_int(), Some(3));
        assert_eq!(meta.get("trusted").unwrap().as_bool(), Some(true));
        assert_eq!(meta.get("user").unwrap().as_int(), None);

        assert_eq!(
            meta.insert("user", "bob"),
            Some(MetaValue::Text("alice".into()))
        );
        assert_eq!(meta.len(), 3);

        assert!(meta.remove("user").is_some());
        assert!(!meta.contains_key("user"));
        assert_eq!(meta.snapshot().len(), 2);
    }

    #[test]
    fn test_concurrent_access() {
        let meta = Arc::new(Metadata::new());
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let meta = meta.clone();
                std::thread::spawn(move || {
                    for j in 0..100 {
                        meta.insert(format!("k{}-{}", i, j), j as i64);
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(meta.len(), 800);
    }
}
