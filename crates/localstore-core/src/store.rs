use std::{collections::BTreeMap, fmt::Display, sync::Arc};

use dashmap::DashMap;

use crate::error::Result;

/// Contract for string-valued key/value stores. Typed getters parse the
/// stored string and fall back to the caller's default; they never fail.
pub trait Store: Send + Sync {
    /// Raw value for a key, if present.
    fn get_string(&self, key: &str) -> Option<String>;

    /// Stores a value, overwriting any existing entry.
    fn put_string(&self, key: &str, value: String) -> Result<()>;

    /// Removes a key (idempotent).
    fn remove(&self, key: &str) -> Result<()>;

    /// Removes every record.
    fn clear(&self) -> Result<()>;

    /// Sorted copy of all records.
    fn snapshot(&self) -> BTreeMap<String, String>;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Stores the `Display` form of any value.
    fn put(&self, key: &str, value: impl Display) -> Result<()>
    where
        Self: Sized,
    {
        self.put_string(key, value.to_string())
    }

    fn get_int(&self, key: &str, default: i32) -> i32 {
        parse_or(self.get_string(key), default)
    }

    fn get_long(&self, key: &str, default: i64) -> i64 {
        parse_or(self.get_string(key), default)
    }

    /// `true` only for a case-insensitive `"true"`; the default applies
    /// when the key is absent.
    fn get_bool(&self, key: &str, default: bool) -> bool {
        self.get_string(key)
            .map(|v| v.eq_ignore_ascii_case("true"))
            .unwrap_or(default)
    }

    fn get_byte(&self, key: &str, default: i8) -> i8 {
        parse_or(self.get_string(key), default)
    }

    fn get_short(&self, key: &str, default: i16) -> i16 {
        parse_or(self.get_string(key), default)
    }

    /// First character of the value.
    fn get_char(&self, key: &str, default: char) -> char {
        self.get_string(key)
            .and_then(|v| v.chars().next())
            .unwrap_or(default)
    }

    fn get_float(&self, key: &str, default: f32) -> f32 {
        parse_or(self.get_string(key), default)
    }

    fn get_double(&self, key: &str, default: f64) -> f64 {
        parse_or(self.get_string(key), default)
    }
}

fn parse_or<T: std::str::FromStr>(value: Option<String>, default: T) -> T {
    value.and_then(|v| v.parse().ok()).unwrap_or(default)
}

/// Store with no persistence, for tests and ephemeral sessions.
#[derive(Debug, Default, Clone)]
pub struct InMemoryStore {
    inner: Arc<DashMap<String, String>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Store for InMemoryStore {
    fn get_string(&self, key: &str) -> Option<String> {
        self.inner.get(key).map(|v| v.value().clone())
    }

    fn put_string(&self, key: &str, value: String) -> Result<()> {
        self.inner.insert(key.to_string(), value);
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        self.inner.remove(key);
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        self.inner.clear();
        Ok(())
    }

    fn snapshot(&self) -> BTreeMap<String, String> {
        self.inner
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect()
    }

    fn len(&self) -> usize {
        self.inner.len()
    }
}
