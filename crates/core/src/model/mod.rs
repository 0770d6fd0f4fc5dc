//! Core data model for COM discovery.
//!
//! - `ComId`: canonical identifier text for classes and interfaces.
//! - `ClassRecord` / `InterfaceRecord`: what the identifier sources produce.
//! - `SupportSet`: the per-class probe result consumed by the graph projector.

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Raised when identifier text does not parse as a GUID.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("Malformed identifier: {0}")]
pub struct MalformedIdError(pub String);

/// Canonical identifier of a COM class (CLSID) or interface (IID).
///
/// Text that parses as a GUID is normalized to the uppercase braced form
/// `{XXXXXXXX-XXXX-XXXX-XXXX-XXXXXXXXXXXX}`. Anything else is kept as its
/// trimmed, uppercased text so it still has a place in the canonical order
/// and can be reported as malformed later.
///
/// `Ord` is byte-wise lexicographic over the canonical text. Resume
/// checkpoints depend on exactly this ordering.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub struct ComId(String);

impl ComId {
    /// Canonicalize raw identifier text (registry key name, CLI argument, ...).
    pub fn new(raw: impl AsRef<str>) -> Self {
        let trimmed = raw.as_ref().trim();
        match Uuid::parse_str(trimmed) {
            Ok(uuid) => Self::from_uuid(uuid),
            Err(_) => Self(trimmed.to_uppercase()),
        }
    }

    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(format!("{{{}}}", uuid.hyphenated()).to_uppercase())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Parse the canonical text as a 128-bit GUID.
    pub fn guid(&self) -> Result<Uuid, MalformedIdError> {
        Uuid::parse_str(&self.0).map_err(|_| MalformedIdError(self.0.clone()))
    }

    pub fn is_well_formed(&self) -> bool {
        self.guid().is_ok()
    }
}

impl fmt::Display for ComId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for ComId {
    fn from(raw: String) -> Self {
        ComId::new(raw)
    }
}

impl From<&str> for ComId {
    fn from(raw: &str) -> Self {
        ComId::new(raw)
    }
}

impl From<ComId> for String {
    fn from(id: ComId) -> Self {
        id.0
    }
}

/// Server/activation metadata registered under a class key.
///
/// Each field is the default value of the like-named subkey, when present.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassServerInfo {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inproc_server32: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prog_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inproc_handler32: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub local_server32: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
}

/// A registered COM class.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassRecord {
    pub id: ComId,
    /// Display name (the class key's default value).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(flatten)]
    pub server: ClassServerInfo,
}

impl ClassRecord {
    pub fn new(id: impl Into<ComId>) -> Self {
        Self { id: id.into(), name: None, server: ClassServerInfo::default() }
    }

    /// Builder-style helper to attach a display name.
    pub fn with_name(mut self, name: Option<String>) -> Self {
        self.name = name;
        self
    }

    pub fn with_server(mut self, server: ClassServerInfo) -> Self {
        self.server = server;
        self
    }
}

/// A registered COM interface.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InterfaceRecord {
    pub id: ComId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl InterfaceRecord {
    pub fn new(id: impl Into<ComId>) -> Self {
        Self { id: id.into(), name: None }
    }

    pub fn with_name(mut self, name: Option<String>) -> Self {
        self.name = name;
        self
    }
}

/// Interfaces a live class instance answered affirmatively, plus counters
/// describing how the negotiation went.
///
/// Membership is keyed by interface id: the same IID registered in two
/// scopes is only kept once (first occurrence wins).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SupportSet {
    supported: Vec<InterfaceRecord>,
    seen: BTreeSet<ComId>,
    /// Number of negotiation requests issued.
    pub tested: usize,
    /// Requests that failed with an error other than "not supported".
    pub failed_tests: usize,
    /// Candidate interface ids skipped because they do not parse as GUIDs.
    pub malformed: usize,
}

impl SupportSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an interface; returns `false` if its id was already present.
    pub fn insert(&mut self, iface: InterfaceRecord) -> bool {
        if !self.seen.insert(iface.id.clone()) {
            return false;
        }
        self.supported.push(iface);
        true
    }

    pub fn contains(&self, id: &ComId) -> bool {
        self.seen.contains(id)
    }

    pub fn is_empty(&self) -> bool {
        self.supported.is_empty()
    }

    pub fn len(&self) -> usize {
        self.supported.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &InterfaceRecord> {
        self.supported.iter()
    }

    pub fn ids(&self) -> Vec<ComId> {
        self.supported.iter().map(|i| i.id.clone()).collect()
    }
}

impl FromIterator<InterfaceRecord> for SupportSet {
    fn from_iter<T: IntoIterator<Item = InterfaceRecord>>(iter: T) -> Self {
        let mut set = SupportSet::new();
        for iface in iter {
            set.insert(iface);
        }
        set
    }
}

/// Treat blank registry values as absent.
pub fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}
