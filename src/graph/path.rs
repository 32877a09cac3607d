//! Traceability paths between two entities.
//!
//! `shortest` is a plain BFS over hop count. The weighted strategies run
//! Dijkstra over negative-log edge weights, which turns "maximize the product
//! of edge weights" into "minimize the sum of costs":
//!
//! - `strongest`: `-ln(strength weight)`
//! - `impact`: `-ln(impact score)`
//! - `causal`: `-ln(impact score)`, restricted to causal edge types

use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap, HashSet, VecDeque};
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::scoring::impact_score;
use super::store::RelationshipStore;
use crate::cache::PathCache;
use crate::entity::{EntityReference, EntityRelationship};
use crate::error::{OpsgraphError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PathType {
    #[default]
    Shortest,
    Strongest,
    Impact,
    Causal,
}

impl PathType {
    pub fn as_str(&self) -> &'static str {
        match self {
            PathType::Shortest => "shortest",
            PathType::Strongest => "strongest",
            PathType::Impact => "impact",
            PathType::Causal => "causal",
        }
    }
}

impl fmt::Display for PathType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PathType {
    type Err = OpsgraphError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "shortest" => Ok(PathType::Shortest),
            "strongest" => Ok(PathType::Strongest),
            "impact" => Ok(PathType::Impact),
            "causal" => Ok(PathType::Causal),
            other => Err(OpsgraphError::InvalidInput(format!("unknown path type: {}", other))),
        }
    }
}

/// A resolved path between two entities, both endpoints included.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TracePath {
    pub id: String,
    pub from_entity: EntityReference,
    pub to_entity: EntityReference,
    pub path: Vec<EntityReference>,
    pub distance: usize,
    pub path_type: PathType,
    /// Product of per-edge impact scores.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_impact_score: Option<f64>,
    /// Product of per-edge strength weights.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,
}

/// Path finder with a session-lifetime memo of results.
pub struct PathFinder {
    cache: PathCache,
}

impl PathFinder {
    pub fn new(cache_capacity: usize) -> Self {
        Self {
            cache: PathCache::new(cache_capacity),
        }
    }

    /// Find a path from `from` to `to` under `path_type`.
    ///
    /// Returns a single-element list, or an empty list when no path exists.
    /// Results (including "no path") are memoized per `(from, to, path_type)`.
    pub fn find_path(
        &self,
        store: &RelationshipStore,
        from: &EntityReference,
        to: &EntityReference,
        path_type: PathType,
    ) -> Vec<TracePath> {
        let key = (from.key(), to.key(), path_type);
        if let Some(cached) = self.cache.get(&key) {
            log::debug!("Path cache hit: {} -> {} ({})", key.0, key.1, path_type);
            return cached;
        }

        let paths = compute_path(store, from, to, path_type, Utc::now())
            .into_iter()
            .collect::<Vec<_>>();
        self.cache.put(key, paths.clone());
        paths
    }

    pub fn cached_paths(&self) -> usize {
        self.cache.len()
    }

    pub fn clear_cache(&self) {
        self.cache.clear();
    }
}

fn compute_path(
    store: &RelationshipStore,
    from: &EntityReference,
    to: &EntityReference,
    path_type: PathType,
    now: DateTime<Utc>,
) -> Option<TracePath> {
    let from_key = from.key();
    let to_key = to.key();
    let start = store.entity(&from_key).cloned().unwrap_or_else(|| from.clone());

    if from_key == to_key {
        return Some(build_trace(start, &[], path_type));
    }

    let edges = match path_type {
        PathType::Shortest => bfs_edges(store, &from_key, &to_key, now)?,
        PathType::Strongest => dijkstra_edges(store, &from_key, &to_key, now, |rel| {
            Some(-rel.strength.weight().ln())
        })?,
        PathType::Impact => dijkstra_edges(store, &from_key, &to_key, now, |rel| {
            Some(-impact_score(rel.strength, rel.relationship_type).ln())
        })?,
        PathType::Causal => dijkstra_edges(store, &from_key, &to_key, now, |rel| {
            rel.relationship_type
                .is_causal()
                .then(|| -impact_score(rel.strength, rel.relationship_type).ln())
        })?,
    };

    Some(build_trace(start, &edges, path_type))
}

fn build_trace(start: EntityReference, edges: &[&EntityRelationship], path_type: PathType) -> TracePath {
    let mut path = Vec::with_capacity(edges.len() + 1);
    path.push(start);
    let mut total_impact = 1.0;
    let mut confidence = 1.0;
    for rel in edges {
        path.push(rel.to_entity.clone());
        total_impact *= impact_score(rel.strength, rel.relationship_type);
        confidence *= rel.strength.weight();
    }

    TracePath {
        id: Uuid::new_v4().to_string(),
        from_entity: path[0].clone(),
        to_entity: path[path.len() - 1].clone(),
        distance: path.len() - 1,
        path,
        path_type,
        total_impact_score: Some(total_impact),
        confidence: Some(confidence),
    }
}

/// Walk parent links back from `to_key` and return edges in path order.
fn reconstruct<'a>(
    parents: &HashMap<String, &'a EntityRelationship>,
    to_key: &str,
) -> Vec<&'a EntityRelationship> {
    let mut edges = Vec::new();
    let mut current = to_key.to_string();
    while let Some(rel) = parents.get(&current) {
        edges.push(*rel);
        current = rel.from_entity.key();
    }
    edges.reverse();
    edges
}

fn bfs_edges<'a>(
    store: &'a RelationshipStore,
    from_key: &str,
    to_key: &str,
    now: DateTime<Utc>,
) -> Option<Vec<&'a EntityRelationship>> {
    let mut visited: HashSet<String> = HashSet::new();
    let mut parents: HashMap<String, &EntityRelationship> = HashMap::new();
    let mut queue = VecDeque::new();

    visited.insert(from_key.to_string());
    queue.push_back(from_key.to_string());

    while let Some(current) = queue.pop_front() {
        for rel in store.relationships_from(&current) {
            if !rel.is_active_at(now) {
                continue;
            }
            let next = rel.to_entity.key();
            if !visited.insert(next.clone()) {
                continue;
            }
            parents.insert(next.clone(), rel);
            if next == to_key {
                return Some(reconstruct(&parents, to_key));
            }
            queue.push_back(next);
        }
    }

    None
}

/// State for Dijkstra priority queue
#[derive(Clone, PartialEq)]
struct State {
    cost: f64,
    key: String,
}

impl Eq for State {}

impl Ord for State {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reversed for a min-heap
        other.cost.total_cmp(&self.cost).then_with(|| other.key.cmp(&self.key))
    }
}

impl PartialOrd for State {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Dijkstra with a per-edge cost; edges for which `cost` returns `None` are
/// not traversable.
fn dijkstra_edges<'a, F>(
    store: &'a RelationshipStore,
    from_key: &str,
    to_key: &str,
    now: DateTime<Utc>,
    cost: F,
) -> Option<Vec<&'a EntityRelationship>>
where
    F: Fn(&EntityRelationship) -> Option<f64>,
{
    let mut dist: HashMap<String, f64> = HashMap::new();
    let mut parents: HashMap<String, &EntityRelationship> = HashMap::new();
    let mut heap = BinaryHeap::new();

    dist.insert(from_key.to_string(), 0.0);
    heap.push(State {
        cost: 0.0,
        key: from_key.to_string(),
    });

    while let Some(State { cost: current_cost, key }) = heap.pop() {
        if key == to_key {
            return Some(reconstruct(&parents, to_key));
        }
        if current_cost > *dist.get(&key).unwrap_or(&f64::INFINITY) {
            continue;
        }

        for rel in store.relationships_from(&key) {
            if !rel.is_active_at(now) {
                continue;
            }
            let Some(weight) = cost(rel) else {
                continue;
            };
            let next = rel.to_entity.key();
            if next == from_key {
                continue;
            }
            let next_cost = current_cost + weight;
            if next_cost < *dist.get(&next).unwrap_or(&f64::INFINITY) {
                dist.insert(next.clone(), next_cost);
                parents.insert(next.clone(), rel);
                heap.push(State {
                    cost: next_cost,
                    key: next,
                });
            }
        }
    }

    None
}
