use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;

/// The reserved key under which the session id is stored in the session data.
pub const SESSION_ID_KEY: &str = "id";

/// The raw key-value data of a session.
pub type SessionData = HashMap<String, Value>;

/// The data of a session, with optional flash semantics.
///
/// If flash is enabled, reading a value through [`get`](FlashStore::get) or
/// [`get_as`](FlashStore::get_as) removes it from the store, so each value can be read exactly once.
/// The session id under [`SESSION_ID_KEY`] is exempt and survives any number of reads.
/// If flash is disabled, reads never modify the store.
///
/// Reads must go through the accessors to get flash semantics; there is no way to borrow a value
/// without removing it when flash is enabled.
///
/// # Example
///
/// ```rust
/// # use stateless_session::FlashStore;
/// # use serde_json::json;
/// let mut store = FlashStore::new(Default::default(), true);
/// store.insert("notice", json!("saved"));
/// assert_eq!(store.get("notice"), Some(json!("saved")));
/// assert_eq!(store.get("notice"), None);
/// ```
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FlashStore {
    data: SessionData,
    flash: bool,
}

impl FlashStore {
    /// Wrap the given data.
    pub fn new(data: SessionData, flash: bool) -> Self {
        Self { data, flash }
    }

    /// Returns true if values are removed after being read once.
    pub fn is_flash(&self) -> bool {
        self.flash
    }

    /// Read the value associated with `key`.
    ///
    /// With flash enabled, the entry is removed as part of this read, unless `key` is [`SESSION_ID_KEY`].
    pub fn get(&mut self, key: &str) -> Option<Value> {
        if self.flash && key != SESSION_ID_KEY {
            self.data.remove(key)
        } else {
            self.data.get(key).cloned()
        }
    }

    /// Read the value associated with `key` and deserialize it into `T`.
    ///
    /// This is a read like [`get`](FlashStore::get): with flash enabled the entry is removed,
    /// even if it fails to deserialize.
    pub fn get_as<T: DeserializeOwned>(&mut self, key: &str) -> Result<Option<T>, serde_json::Error> {
        self.get(key).map(serde_json::from_value).transpose()
    }

    /// Serialize `value` and store it under `key`.
    /// Returns the previous raw value, if any.
    pub fn set<T: Serialize>(
        &mut self,
        key: impl Into<String>,
        value: T,
    ) -> Result<Option<Value>, serde_json::Error> {
        let value = serde_json::to_value(value)?;
        Ok(self.insert(key, value))
    }

    /// Store a raw value under `key`.
    /// Returns the previous value, if any.
    pub fn insert(&mut self, key: impl Into<String>, value: Value) -> Option<Value> {
        self.data.insert(key.into(), value)
    }

    /// Remove the value associated with `key`, returning it.
    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.data.remove(key)
    }

    /// Returns true if a value is stored under `key`.
    /// This does not count as a read.
    pub fn contains_key(&self, key: &str) -> bool {
        self.data.contains_key(key)
    }

    /// The keys currently stored, in arbitrary order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.data.keys().map(String::as_str)
    }

    /// The number of stored entries, including the session id.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Returns true if nothing is stored, not even a session id.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Remove all entries, including the session id.
    /// A new id is generated the next time it is requested.
    pub fn clear(&mut self) {
        self.data.clear();
    }

    /// The unwrapped data, for serialization. Does not count as a read.
    pub(crate) fn raw(&self) -> &SessionData {
        &self.data
    }

    pub(crate) fn into_raw(self) -> SessionData {
        self.data
    }
}
