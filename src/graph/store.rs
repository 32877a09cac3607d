//! In-memory adjacency list of relationship edges keyed by entity key.

use std::collections::HashMap;

use crate::entity::{EntityReference, EntityRelationship};

/// Adjacency store populated from the persistence collaborator.
///
/// Edges are never merged or removed: repeated inserts produce parallel
/// edges, and reconciliation happens only by building a fresh store.
#[derive(Debug, Clone, Default)]
pub struct RelationshipStore {
    adjacency: HashMap<String, Vec<EntityRelationship>>,
    entities: HashMap<String, EntityReference>,
    relationship_count: usize,
}

impl RelationshipStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_relationships<I>(relationships: I) -> Self
    where
        I: IntoIterator<Item = EntityRelationship>,
    {
        let mut store = Self::new();
        for rel in relationships {
            store.add_relationship(rel);
        }
        store
    }

    /// Insert an edge under its source key; bidirectional edges also insert
    /// the entity-swapped mirror under the target key.
    pub fn add_relationship(&mut self, rel: EntityRelationship) {
        let from_key = rel.from_entity.key();
        let to_key = rel.to_entity.key();

        self.entities
            .entry(from_key.clone())
            .or_insert_with(|| rel.from_entity.clone());
        self.entities
            .entry(to_key.clone())
            .or_insert_with(|| rel.to_entity.clone());

        if rel.is_bidirectional() {
            let mirror = rel.mirrored();
            self.adjacency.entry(to_key).or_default().push(mirror);
            self.relationship_count += 1;
        }

        self.adjacency.entry(from_key).or_default().push(rel);
        self.relationship_count += 1;
    }

    /// Outgoing edges of an entity, in insertion order.
    pub fn relationships_from(&self, key: &str) -> &[EntityRelationship] {
        self.adjacency.get(key).map(Vec::as_slice).unwrap_or(&[])
    }

    /// True if the entity appears as the source or target of any edge.
    pub fn contains(&self, key: &str) -> bool {
        self.entities.contains_key(key)
    }

    /// First-seen reference for a key.
    pub fn entity(&self, key: &str) -> Option<&EntityReference> {
        self.entities.get(key)
    }

    pub fn entity_count(&self) -> usize {
        self.entities.len()
    }

    /// Stored edges, including synthesized mirrors.
    pub fn relationship_count(&self) -> usize {
        self.relationship_count
    }

    pub fn is_empty(&self) -> bool {
        self.relationship_count == 0
    }

    pub fn clear(&mut self) {
        self.adjacency.clear();
        self.entities.clear();
        self.relationship_count = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::{RelationshipStrength, RelationshipType};

    fn entity(t: &str, id: &str) -> EntityReference {
        EntityReference::new(t, id, id)
    }

    #[test]
    fn test_add_unidirectional() {
        let mut store = RelationshipStore::new();
        store.add_relationship(EntityRelationship::new(
            entity("incident", "I1"),
            entity("service", "S1"),
            RelationshipType::Dependency,
            RelationshipStrength::Strong,
        ));

        assert_eq!(store.relationships_from("incident:I1").len(), 1);
        assert!(store.relationships_from("service:S1").is_empty());
        assert!(store.contains("service:S1"));
        assert_eq!(store.entity_count(), 2);
        assert_eq!(store.relationship_count(), 1);
    }

    #[test]
    fn test_bidirectional_synthesizes_mirror() {
        let mut store = RelationshipStore::new();
        store.add_relationship(
            EntityRelationship::new(
                entity("service", "S1"),
                entity("service", "S2"),
                RelationshipType::Peer,
                RelationshipStrength::Moderate,
            )
            .with_id("p1")
            .bidirectional(),
        );

        let reverse = store.relationships_from("service:S2");
        assert_eq!(reverse.len(), 1);
        assert_eq!(reverse[0].id, "p1:reverse");
        assert_eq!(reverse[0].to_entity.key(), "service:S1");
        assert_eq!(store.relationship_count(), 2);
    }

    #[test]
    fn test_duplicates_are_preserved() {
        let rel = EntityRelationship::new(
            entity("asset", "A1"),
            entity("service", "S1"),
            RelationshipType::ServiceComponent,
            RelationshipStrength::Weak,
        )
        .with_id("dup");
        let store = RelationshipStore::from_relationships(vec![rel.clone(), rel]);

        assert_eq!(store.relationships_from("asset:A1").len(), 2);
        assert_eq!(store.entity_count(), 2);
    }

    #[test]
    fn test_unknown_key_is_empty() {
        let store = RelationshipStore::new();
        assert!(store.relationships_from("incident:missing").is_empty());
        assert!(store.entity("incident:missing").is_none());
        assert!(store.is_empty());
    }

    #[test]
    fn test_clear() {
        let mut store = RelationshipStore::from_relationships(vec![EntityRelationship::new(
            entity("team", "T1"),
            entity("service", "S1"),
            RelationshipType::Ownership,
            RelationshipStrength::Strong,
        )]);
        store.clear();
        assert!(store.is_empty());
        assert_eq!(store.entity_count(), 0);
    }
}
