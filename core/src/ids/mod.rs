use uuid::Uuid;
use serde::{Deserialize, Serialize};
use std::fmt;

pub mod generator;
pub use generator::IdGenerator;

/// A universally unique identifier for a PV area or observation point.
/// Shapes, overlay elements and topography jobs refer to each other only
/// through these ids.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EntityId(pub Uuid);

impl EntityId {
    /// Generate a new random EntityId.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Create an ID from a specific UUID (useful for restoration).
    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Create a deterministic ID based on a string seed.
    pub fn new_deterministic(seed: &str) -> Self {
        let uuid = Uuid::new_v5(&Uuid::NAMESPACE_OID, seed.as_bytes());
        Self(uuid)
    }
}

impl Default for EntityId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier of a module type in the shared catalog.
/// Ids below [`ModuleTypeId::FIRST_CUSTOM`] belong to the built-in types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ModuleTypeId(pub u32);

impl ModuleTypeId {
    pub const FIRST_CUSTOM: u32 = 3;

    pub fn is_builtin(&self) -> bool {
        self.0 < Self::FIRST_CUSTOM
    }
}

impl fmt::Display for ModuleTypeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
