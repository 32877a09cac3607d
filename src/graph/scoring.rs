//! Impact and relevance heuristics.

use crate::entity::{RelationshipStrength, RelationshipType};

/// Relevance decay applied per hop of the source node's distance.
pub const DISTANCE_DECAY: f64 = 0.8;

/// Weight of a relationship type; types without an explicit weight get 0.5.
pub fn type_weight(relationship_type: RelationshipType) -> f64 {
    match relationship_type {
        RelationshipType::ParentChild => 0.9,
        RelationshipType::Dependency => 1.0,
        RelationshipType::Impact => 0.95,
        RelationshipType::Ownership => 0.8,
        RelationshipType::Association => 0.5,
        _ => 0.5,
    }
}

pub fn impact_score(strength: RelationshipStrength, relationship_type: RelationshipType) -> f64 {
    strength.weight() * type_weight(relationship_type)
}

/// `impact * 0.8^distance`, where `distance` is the hop count of the node the
/// edge leaves from.
pub fn relevance_score(impact: f64, source_distance: usize) -> f64 {
    impact * DISTANCE_DECAY.powi(source_distance as i32)
}
