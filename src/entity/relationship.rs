//! Typed, directed relationship edges.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use super::EntityReference;
use crate::error::OpsgraphError;

/// Relationship tag between two entities.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RelationshipType {
    ParentChild,
    Dependency,
    Association,
    Impact,
    Ownership,
    Assignment,
    Reference,
    Trigger,
    Upstream,
    Downstream,
    Peer,
    Backup,
    Cluster,
    ServiceComponent,
    BusinessTechnical,
}

impl RelationshipType {
    pub const ALL: [RelationshipType; 15] = [
        RelationshipType::ParentChild,
        RelationshipType::Dependency,
        RelationshipType::Association,
        RelationshipType::Impact,
        RelationshipType::Ownership,
        RelationshipType::Assignment,
        RelationshipType::Reference,
        RelationshipType::Trigger,
        RelationshipType::Upstream,
        RelationshipType::Downstream,
        RelationshipType::Peer,
        RelationshipType::Backup,
        RelationshipType::Cluster,
        RelationshipType::ServiceComponent,
        RelationshipType::BusinessTechnical,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            RelationshipType::ParentChild => "parent-child",
            RelationshipType::Dependency => "dependency",
            RelationshipType::Association => "association",
            RelationshipType::Impact => "impact",
            RelationshipType::Ownership => "ownership",
            RelationshipType::Assignment => "assignment",
            RelationshipType::Reference => "reference",
            RelationshipType::Trigger => "trigger",
            RelationshipType::Upstream => "upstream",
            RelationshipType::Downstream => "downstream",
            RelationshipType::Peer => "peer",
            RelationshipType::Backup => "backup",
            RelationshipType::Cluster => "cluster",
            RelationshipType::ServiceComponent => "service-component",
            RelationshipType::BusinessTechnical => "business-technical",
        }
    }

    /// Edge types that carry cause/effect, used by causal path search.
    pub fn is_causal(&self) -> bool {
        matches!(
            self,
            RelationshipType::Dependency
                | RelationshipType::Impact
                | RelationshipType::Trigger
                | RelationshipType::Upstream
                | RelationshipType::Downstream
                | RelationshipType::ParentChild
        )
    }
}

impl fmt::Display for RelationshipType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RelationshipType {
    type Err = OpsgraphError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        RelationshipType::ALL
            .iter()
            .copied()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| OpsgraphError::InvalidInput(format!("unknown relationship type: {}", s)))
    }
}

/// Edge strength annotation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RelationshipStrength {
    Strong,
    Moderate,
    Weak,
}

impl RelationshipStrength {
    /// Scoring weight: strong=1.0, moderate=0.6, weak=0.3.
    pub fn weight(&self) -> f64 {
        match self {
            RelationshipStrength::Strong => 1.0,
            RelationshipStrength::Moderate => 0.6,
            RelationshipStrength::Weak => 0.3,
        }
    }

    /// Sort rank, higher is stronger.
    pub fn rank(&self) -> u8 {
        match self {
            RelationshipStrength::Strong => 3,
            RelationshipStrength::Moderate => 2,
            RelationshipStrength::Weak => 1,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RelationshipStrength::Strong => "strong",
            RelationshipStrength::Moderate => "moderate",
            RelationshipStrength::Weak => "weak",
        }
    }
}

impl FromStr for RelationshipStrength {
    type Err = OpsgraphError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "strong" => Ok(RelationshipStrength::Strong),
            "moderate" => Ok(RelationshipStrength::Moderate),
            "weak" => Ok(RelationshipStrength::Weak),
            other => Err(OpsgraphError::InvalidInput(format!(
                "unknown relationship strength: {}",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RelationshipDirection {
    #[default]
    Unidirectional,
    Bidirectional,
}

impl RelationshipDirection {
    pub fn as_str(&self) -> &'static str {
        match self {
            RelationshipDirection::Unidirectional => "unidirectional",
            RelationshipDirection::Bidirectional => "bidirectional",
        }
    }
}

impl FromStr for RelationshipDirection {
    type Err = OpsgraphError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "unidirectional" => Ok(RelationshipDirection::Unidirectional),
            "bidirectional" => Ok(RelationshipDirection::Bidirectional),
            other => Err(OpsgraphError::InvalidInput(format!(
                "unknown relationship direction: {}",
                other
            ))),
        }
    }
}

/// A directed edge `from_entity --relationship_type--> to_entity`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntityRelationship {
    pub id: String,
    pub from_entity: EntityReference,
    pub to_entity: EntityReference,
    pub relationship_type: RelationshipType,
    pub strength: RelationshipStrength,
    #[serde(default)]
    pub direction: RelationshipDirection,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Map<String, Value>>,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub valid_until: Option<DateTime<Utc>>,
}

impl EntityRelationship {
    /// New unidirectional edge with a generated id.
    pub fn new(
        from_entity: EntityReference,
        to_entity: EntityReference,
        relationship_type: RelationshipType,
        strength: RelationshipStrength,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            from_entity,
            to_entity,
            relationship_type,
            strength,
            direction: RelationshipDirection::Unidirectional,
            metadata: None,
            created_at: Utc::now(),
            valid_until: None,
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    pub fn bidirectional(mut self) -> Self {
        self.direction = RelationshipDirection::Bidirectional;
        self
    }

    pub fn with_valid_until(mut self, valid_until: DateTime<Utc>) -> Self {
        self.valid_until = Some(valid_until);
        self
    }

    pub fn with_metadata(mut self, metadata: Map<String, Value>) -> Self {
        self.metadata = Some(metadata);
        self
    }

    pub fn is_bidirectional(&self) -> bool {
        self.direction == RelationshipDirection::Bidirectional
    }

    /// False once `valid_until` has passed.
    pub fn is_active_at(&self, now: DateTime<Utc>) -> bool {
        self.valid_until.map_or(true, |until| until > now)
    }

    /// Entity-swapped copy used to store the reverse half of a bidirectional edge.
    pub fn mirrored(&self) -> Self {
        Self {
            id: format!("{}:reverse", self.id),
            from_entity: self.to_entity.clone(),
            to_entity: self.from_entity.clone(),
            ..self.clone()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn incident() -> EntityReference {
        EntityReference::new("incident", "I1", "Checkout outage")
    }

    fn service() -> EntityReference {
        EntityReference::new("service", "S1", "Payments")
    }

    #[test]
    fn test_relationship_type_wire_names() {
        let json = serde_json::to_string(&RelationshipType::ServiceComponent).unwrap();
        assert_eq!(json, "\"service-component\"");
        for t in RelationshipType::ALL {
            assert_eq!(t.as_str().parse::<RelationshipType>().unwrap(), t);
        }
        assert!("sibling".parse::<RelationshipType>().is_err());
    }

    #[test]
    fn test_strength_weights_and_rank() {
        assert_eq!(RelationshipStrength::Strong.weight(), 1.0);
        assert_eq!(RelationshipStrength::Moderate.weight(), 0.6);
        assert_eq!(RelationshipStrength::Weak.weight(), 0.3);
        assert!(RelationshipStrength::Strong.rank() > RelationshipStrength::Moderate.rank());
        assert!(RelationshipStrength::Moderate.rank() > RelationshipStrength::Weak.rank());
    }

    #[test]
    fn test_mirrored_swaps_endpoints() {
        let rel = EntityRelationship::new(
            incident(),
            service(),
            RelationshipType::Association,
            RelationshipStrength::Weak,
        )
        .with_id("r1")
        .bidirectional();

        let mirror = rel.mirrored();
        assert_eq!(mirror.id, "r1:reverse");
        assert_eq!(mirror.from_entity, service());
        assert_eq!(mirror.to_entity, incident());
        assert_eq!(mirror.relationship_type, RelationshipType::Association);
        assert!(mirror.is_bidirectional());
    }

    #[test]
    fn test_validity_window() {
        let now = Utc::now();
        let rel = EntityRelationship::new(
            incident(),
            service(),
            RelationshipType::Impact,
            RelationshipStrength::Strong,
        );
        assert!(rel.is_active_at(now));

        let expired = rel.clone().with_valid_until(now - Duration::hours(1));
        assert!(!expired.is_active_at(now));

        let future = rel.with_valid_until(now + Duration::hours(1));
        assert!(future.is_active_at(now));
    }

    #[test]
    fn test_deserialize_with_defaults() {
        let json = r#"{
            "id": "r9",
            "fromEntity": {"entityType": "asset", "entityId": "A1", "displayName": "db-01"},
            "toEntity": {"entityType": "service", "entityId": "S1", "displayName": "Payments"},
            "relationshipType": "dependency",
            "strength": "moderate"
        }"#;
        let rel: EntityRelationship = serde_json::from_str(json).unwrap();
        assert_eq!(rel.direction, RelationshipDirection::Unidirectional);
        assert_eq!(rel.relationship_type, RelationshipType::Dependency);
        assert!(rel.valid_until.is_none());
    }
}
