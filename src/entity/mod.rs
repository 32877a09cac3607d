//! Entity references and typed relationships between them.
//!
//! Entities are identified by the composite key `entity_type:entity_id`, never
//! by pointer identity, so references can be rebuilt from links or storage and
//! still compare equal.

mod relationship;

pub use relationship::{
    EntityRelationship, RelationshipDirection, RelationshipStrength, RelationshipType,
};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::hash::{Hash, Hasher};

/// Build the identity key for an entity.
pub fn entity_key(entity_type: &str, entity_id: &str) -> String {
    format!("{}:{}", entity_type, entity_id)
}

/// Typed, stable reference to any domain object (incident, asset, service, ...).
///
/// Equality and hashing use only the identity key; display name, status and
/// metadata are presentation data.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntityReference {
    pub entity_type: String,
    pub entity_id: String,
    pub display_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Map<String, Value>>,
}

impl EntityReference {
    pub fn new(
        entity_type: impl Into<String>,
        entity_id: impl Into<String>,
        display_name: impl Into<String>,
    ) -> Self {
        Self {
            entity_type: entity_type.into(),
            entity_id: entity_id.into(),
            display_name: display_name.into(),
            status: None,
            metadata: None,
        }
    }

    pub fn with_status(mut self, status: impl Into<String>) -> Self {
        self.status = Some(status.into());
        self
    }

    pub fn with_metadata(mut self, metadata: Map<String, Value>) -> Self {
        self.metadata = Some(metadata);
        self
    }

    /// Identity key `entity_type:entity_id`.
    pub fn key(&self) -> String {
        entity_key(&self.entity_type, &self.entity_id)
    }

    /// Parse a `type:id` key into a bare reference (display name = id).
    ///
    /// Only the first `:` separates type from id, so ids may contain colons.
    pub fn from_key(key: &str) -> Option<Self> {
        let (entity_type, entity_id) = key.split_once(':')?;
        if entity_type.is_empty() || entity_id.is_empty() {
            return None;
        }
        Some(Self::new(entity_type, entity_id, entity_id))
    }

    /// Look up a field used by action conditions: `status`, `entityType`,
    /// `displayName` or a top-level metadata key.
    pub fn field(&self, name: &str) -> Option<Value> {
        match name {
            "status" => self.status.clone().map(Value::String),
            "entityType" => Some(Value::String(self.entity_type.clone())),
            "displayName" => Some(Value::String(self.display_name.clone())),
            other => self.metadata.as_ref().and_then(|m| m.get(other).cloned()),
        }
    }
}

impl PartialEq for EntityReference {
    fn eq(&self, other: &Self) -> bool {
        self.entity_type == other.entity_type && self.entity_id == other.entity_id
    }
}

impl Eq for EntityReference {}

impl Hash for EntityReference {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.entity_type.hash(state);
        self.entity_id.hash(state);
    }
}
