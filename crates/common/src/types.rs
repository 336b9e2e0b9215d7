use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// External commerce-platform order identifier.
///
/// Wraps the platform's opaque order id string. This is the idempotency
/// anchor for webhook deliveries: every processing record is keyed by it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OrderId(String);

impl OrderId {
    /// Creates an order id from any string-like value.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the id as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for OrderId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for OrderId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Platform variant identifier for a sellable graphic variant.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GraphicVariantId(String);

impl GraphicVariantId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for GraphicVariantId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for GraphicVariantId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Identifier for a blank garment style (e.g. a supplier style code).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BlankKey(String);

impl BlankKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for BlankKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for BlankKey {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Full key of a physically stocked blank variant: style plus size and color.
///
/// All graphic variants printed on the same blank/size/color share one
/// stock counter addressed by this key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BlankVariantKey {
    pub blank_key: BlankKey,
    pub size: String,
    pub color: String,
}

impl BlankVariantKey {
    pub fn new(blank_key: BlankKey, size: impl Into<String>, color: impl Into<String>) -> Self {
        Self {
            blank_key,
            size: size.into(),
            color: color.into(),
        }
    }
}

impl std::fmt::Display for BlankVariantKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}/{}", self.blank_key, self.size, self.color)
    }
}

/// Identity of a worker holding an advisory processing lock.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WorkerId(String);

impl WorkerId {
    /// Creates a fresh random worker identity.
    pub fn random() -> Self {
        Self(format!("worker-{}", Uuid::new_v4()))
    }

    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for WorkerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}
