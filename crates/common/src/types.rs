use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Namespace for name-based aggregate ids.
const AGGREGATE_NAMESPACE: Uuid = Uuid::from_u128(0x5b1e_93c4_7d2a_4f6e_a18b_0c3d_9e47_f215);

/// Unique identifier for an aggregate instance (one event stream).
///
/// Ids are either random (`new`) or derived from a natural key (`derived`).
/// Derived ids let two services agree on a stream without a lookup, and make
/// a redelivered request land on the stream the first delivery created.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AggregateId(Uuid);

impl AggregateId {
    /// Creates a new random aggregate ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Derives a stable id from an aggregate kind and its natural key.
    ///
    /// The same `(kind, key)` pair always yields the same id.
    pub fn derived(kind: &str, key: &str) -> Self {
        let name = format!("{kind}:{key}");
        Self(Uuid::new_v5(&AGGREGATE_NAMESPACE, name.as_bytes()))
    }

    /// Creates an aggregate ID from an existing UUID.
    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Returns the underlying UUID.
    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for AggregateId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for AggregateId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<Uuid> for AggregateId {
    fn from(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

impl From<AggregateId> for Uuid {
    fn from(id: AggregateId) -> Self {
        id.0
    }
}
