//! Ranked BFS traversal over the relationship store.

use std::collections::{HashSet, VecDeque};
use std::str::FromStr;

use chrono::Utc;
use serde::{Deserialize, Serialize};

use super::scoring::{impact_score, relevance_score};
use super::store::RelationshipStore;
use crate::entity::{EntityReference, RelationshipStrength, RelationshipType};
use crate::error::{OpsgraphError, Result};

/// Ordering applied to traversal results before truncation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortBy {
    #[default]
    Relevance,
    Impact,
    Distance,
    Strength,
}

impl FromStr for SortBy {
    type Err = OpsgraphError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "relevance" => Ok(SortBy::Relevance),
            "impact" => Ok(SortBy::Impact),
            "distance" => Ok(SortBy::Distance),
            "strength" => Ok(SortBy::Strength),
            other => Err(OpsgraphError::InvalidInput(format!("unknown sort order: {}", other))),
        }
    }
}

/// Options for [`get_related_entities`].
#[derive(Debug, Clone, PartialEq)]
pub struct TraversalOptions {
    /// Allow-list of edge types; `None` traverses every type.
    pub relationship_types: Option<Vec<RelationshipType>>,
    pub max_distance: usize,
    pub include_indirect: bool,
    pub sort_by: SortBy,
    pub limit: usize,
}

impl Default for TraversalOptions {
    fn default() -> Self {
        Self {
            relationship_types: None,
            max_distance: 3,
            include_indirect: true,
            sort_by: SortBy::Relevance,
            limit: 100,
        }
    }
}

impl TraversalOptions {
    pub fn with_types(mut self, types: Vec<RelationshipType>) -> Self {
        self.relationship_types = Some(types);
        self
    }

    pub fn with_max_distance(mut self, max_distance: usize) -> Self {
        self.max_distance = max_distance;
        self
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }

    pub fn with_sort(mut self, sort_by: SortBy) -> Self {
        self.sort_by = sort_by;
        self
    }

    pub fn direct_only(mut self) -> Self {
        self.include_indirect = false;
        self
    }

    /// Reject non-positive bounds before any traversal work.
    pub fn validate(&self) -> Result<()> {
        if self.max_distance == 0 {
            return Err(OpsgraphError::Config(
                "max_distance must be at least 1".to_string(),
            ));
        }
        if self.limit == 0 {
            return Err(OpsgraphError::Config("limit must be at least 1".to_string()));
        }
        Ok(())
    }

    fn allows(&self, relationship_type: RelationshipType) -> bool {
        self.relationship_types
            .as_ref()
            .map_or(true, |types| types.contains(&relationship_type))
    }
}

/// An entity reached from a traversal origin, with derived scores.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RelatedEntity {
    #[serde(flatten)]
    pub entity: EntityReference,
    pub relationship: RelationshipType,
    pub relationship_strength: RelationshipStrength,
    pub distance: usize,
    /// Hops from the origin up to, but excluding, this entity.
    pub path: Vec<EntityReference>,
    pub impact_score: f64,
    pub relevance_score: f64,
}

/// Find entities related to `origin` within `options.max_distance` hops.
///
/// Nodes are marked visited when dequeued, so the first path to reach a node
/// wins. The result-count check happens per dequeue, so the raw list may
/// overshoot `limit` by one node's edges before the final sort and truncate.
/// An origin missing from the store yields an empty list.
pub fn get_related_entities(
    store: &RelationshipStore,
    origin: &EntityReference,
    options: &TraversalOptions,
) -> Result<Vec<RelatedEntity>> {
    options.validate()?;

    let now = Utc::now();
    let origin_key = origin.key();
    let mut visited: HashSet<String> = HashSet::new();
    let mut recorded: HashSet<String> = HashSet::new();
    let mut queue: VecDeque<(EntityReference, usize, Vec<EntityReference>)> = VecDeque::new();
    let mut results: Vec<RelatedEntity> = Vec::new();

    queue.push_back((origin.clone(), 0, Vec::new()));

    while let Some((node, distance, path)) = queue.pop_front() {
        let node_key = node.key();
        if !visited.insert(node_key.clone()) {
            continue;
        }
        if distance >= options.max_distance || results.len() >= options.limit {
            continue;
        }

        for rel in store.relationships_from(&node_key) {
            if !options.allows(rel.relationship_type) || !rel.is_active_at(now) {
                continue;
            }

            let target_key = rel.to_entity.key();
            if target_key == origin_key || visited.contains(&target_key) {
                continue;
            }
            if !recorded.insert(target_key) {
                continue;
            }

            let impact = impact_score(rel.strength, rel.relationship_type);
            let mut hop_path = path.clone();
            hop_path.push(node.clone());

            results.push(RelatedEntity {
                entity: rel.to_entity.clone(),
                relationship: rel.relationship_type,
                relationship_strength: rel.strength,
                distance: distance + 1,
                path: hop_path.clone(),
                impact_score: impact,
                relevance_score: relevance_score(impact, distance),
            });

            if options.include_indirect {
                queue.push_back((rel.to_entity.clone(), distance + 1, hop_path));
            }
        }
    }

    log::debug!(
        "Traversal from {} visited {} nodes, {} raw results",
        origin_key,
        visited.len(),
        results.len()
    );

    sort_results(&mut results, options.sort_by);
    results.truncate(options.limit);
    Ok(results)
}

fn sort_results(results: &mut [RelatedEntity], sort_by: SortBy) {
    match sort_by {
        SortBy::Relevance => {
            results.sort_by(|a, b| b.relevance_score.total_cmp(&a.relevance_score))
        }
        SortBy::Impact => results.sort_by(|a, b| b.impact_score.total_cmp(&a.impact_score)),
        SortBy::Distance => results.sort_by_key(|r| r.distance),
        SortBy::Strength => {
            results.sort_by(|a, b| b.relationship_strength.rank().cmp(&a.relationship_strength.rank()))
        }
    }
}

/// Entities affected by `origin` over impact-bearing edges, most impacted first.
pub fn get_impact_analysis(
    store: &RelationshipStore,
    origin: &EntityReference,
    max_distance: usize,
) -> Result<Vec<RelatedEntity>> {
    let options = TraversalOptions::default()
        .with_types(vec![
            RelationshipType::Impact,
            RelationshipType::Dependency,
            RelationshipType::Downstream,
            RelationshipType::ParentChild,
            RelationshipType::Trigger,
        ])
        .with_max_distance(max_distance)
        .with_sort(SortBy::Impact);
    get_related_entities(store, origin, &options)
}

/// Entities `origin` depends on, nearest first.
pub fn get_dependencies(
    store: &RelationshipStore,
    origin: &EntityReference,
    max_distance: usize,
) -> Result<Vec<RelatedEntity>> {
    let options = TraversalOptions::default()
        .with_types(vec![
            RelationshipType::Dependency,
            RelationshipType::Upstream,
            RelationshipType::ServiceComponent,
        ])
        .with_max_distance(max_distance)
        .with_sort(SortBy::Distance);
    get_related_entities(store, origin, &options)
}
