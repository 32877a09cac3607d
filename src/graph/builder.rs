//! Bounded-depth visualization subgraphs with incremental expand/collapse.

use std::collections::{HashMap, HashSet, VecDeque};
use std::f64::consts::PI;

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::path::{PathFinder, PathType};
use super::store::RelationshipStore;
use crate::entity::{
    EntityReference, EntityRelationship, RelationshipStrength, RelationshipType,
};
use crate::error::{OpsgraphError, Result};

const BASE_NODE_SIZE: u32 = 30;
const NODE_SIZE_STEP: u32 = 5;
const MIN_NODE_SIZE: u32 = 10;
const RING_SPACING: f64 = 150.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EdgeStyle {
    Solid,
    Dashed,
    Dotted,
}

impl From<RelationshipStrength> for EdgeStyle {
    fn from(strength: RelationshipStrength) -> Self {
        match strength {
            RelationshipStrength::Strong => EdgeStyle::Solid,
            RelationshipStrength::Moderate => EdgeStyle::Dashed,
            RelationshipStrength::Weak => EdgeStyle::Dotted,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum GraphLayout {
    Force,
    Hierarchical,
    #[default]
    Radial,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphNode {
    /// Entity key; edges refer to nodes by this id.
    pub id: String,
    pub entity: EntityReference,
    pub x: f64,
    pub y: f64,
    pub group: String,
    pub size: u32,
    pub color: String,
    pub highlighted: bool,
    pub expanded: bool,
    /// Hop distance from the graph's center.
    pub level: usize,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphEdge {
    pub id: String,
    pub source: String,
    pub target: String,
    pub relationship_type: RelationshipType,
    pub strength: RelationshipStrength,
    pub style: EdgeStyle,
    pub animated: bool,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphMetadata {
    pub center: String,
    pub depth: usize,
    pub node_count: usize,
    pub edge_count: usize,
    pub generated_at: DateTime<Utc>,
}

/// Visualization graph: nodes unique by id, edges not deduplicated.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EntityGraph {
    pub nodes: Vec<GraphNode>,
    pub edges: Vec<GraphEdge>,
    pub layout: GraphLayout,
    pub metadata: GraphMetadata,
}

impl EntityGraph {
    pub fn node(&self, id: &str) -> Option<&GraphNode> {
        self.nodes.iter().find(|n| n.id == id)
    }

    fn node_mut(&mut self, id: &str) -> Option<&mut GraphNode> {
        self.nodes.iter_mut().find(|n| n.id == id)
    }

    pub fn contains_node(&self, id: &str) -> bool {
        self.node(id).is_some()
    }

    pub fn edges_from<'a>(&'a self, id: &'a str) -> impl Iterator<Item = &'a GraphEdge> + 'a {
        self.edges.iter().filter(move |e| e.source == id)
    }

    fn refresh_metadata(&mut self) {
        self.metadata.node_count = self.nodes.len();
        self.metadata.edge_count = self.edges.len();
    }
}

fn node_size(level: usize) -> u32 {
    let shrink = NODE_SIZE_STEP.saturating_mul(level as u32);
    BASE_NODE_SIZE.saturating_sub(shrink).max(MIN_NODE_SIZE)
}

fn node_color(entity_type: &str) -> &'static str {
    match entity_type {
        "incident" => "#ef4444",
        "problem" => "#f97316",
        "change" => "#8b5cf6",
        "asset" => "#3b82f6",
        "service" => "#10b981",
        "team" => "#f59e0b",
        "user" => "#6366f1",
        "risk" => "#dc2626",
        "customer" | "contract" | "vendor" => "#0ea5e9",
        _ => "#6b7280",
    }
}

fn make_node(entity: &EntityReference, level: usize, expanded: bool) -> GraphNode {
    GraphNode {
        id: entity.key(),
        entity: entity.clone(),
        x: 0.0,
        y: 0.0,
        group: entity.entity_type.clone(),
        size: node_size(level),
        color: node_color(&entity.entity_type).to_string(),
        highlighted: level == 0,
        expanded,
        level,
    }
}

fn make_edge(rel: &EntityRelationship) -> GraphEdge {
    GraphEdge {
        id: rel.id.clone(),
        source: rel.from_entity.key(),
        target: rel.to_entity.key(),
        relationship_type: rel.relationship_type,
        strength: rel.strength,
        style: EdgeStyle::from(rel.strength),
        animated: false,
    }
}

/// BFS `depth` hops out from `center`; `base_level` offsets node levels so an
/// expansion sizes its nodes relative to the whole graph.
fn bfs_subgraph(
    store: &RelationshipStore,
    center: &EntityReference,
    depth: usize,
    base_level: usize,
) -> (Vec<GraphNode>, Vec<GraphEdge>) {
    let now = Utc::now();
    let mut nodes = Vec::new();
    let mut seen: HashSet<String> = HashSet::new();
    let mut edges = Vec::new();
    let mut queue = VecDeque::new();

    seen.insert(center.key());
    nodes.push(make_node(center, base_level, depth > 0));
    queue.push_back((center.clone(), 0usize));

    while let Some((entity, hops)) = queue.pop_front() {
        if hops >= depth {
            continue;
        }
        for rel in store.relationships_from(&entity.key()) {
            if !rel.is_active_at(now) {
                continue;
            }
            edges.push(make_edge(rel));
            if seen.insert(rel.to_entity.key()) {
                let next_hops = hops + 1;
                nodes.push(make_node(&rel.to_entity, base_level + next_hops, next_hops < depth));
                queue.push_back((rel.to_entity.clone(), next_hops));
            }
        }
    }

    (nodes, edges)
}

/// Place nodes on concentric rings, one ring per level.
fn apply_radial_layout(nodes: &mut [GraphNode]) {
    let mut per_level: HashMap<usize, usize> = HashMap::new();
    for node in nodes.iter() {
        *per_level.entry(node.level).or_default() += 1;
    }

    let mut placed: HashMap<usize, usize> = HashMap::new();
    for node in nodes.iter_mut() {
        let count = per_level.get(&node.level).copied().unwrap_or(1).max(1);
        let index = placed.entry(node.level).or_default();
        let radius = node.level as f64 * RING_SPACING;
        let angle = 2.0 * PI * (*index as f64) / count as f64;
        node.x = radius * angle.cos();
        node.y = radius * angle.sin();
        *index += 1;
    }
}

/// Owns the graph currently shown for a session.
#[derive(Debug, Default)]
pub struct GraphBuilder {
    current: Option<EntityGraph>,
}

impl GraphBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current(&self) -> Option<&EntityGraph> {
        self.current.as_ref()
    }

    pub fn clear(&mut self) {
        self.current = None;
    }

    fn current_mut(&mut self) -> Result<&mut EntityGraph> {
        self.current
            .as_mut()
            .ok_or_else(|| OpsgraphError::NotFound("no graph has been built".to_string()))
    }

    /// Rebuild the graph around `center`, replacing any previous graph.
    pub fn build_graph(
        &mut self,
        store: &RelationshipStore,
        center: &EntityReference,
        depth: usize,
    ) -> &EntityGraph {
        let center = store.entity(&center.key()).cloned().unwrap_or_else(|| center.clone());
        let (mut nodes, edges) = bfs_subgraph(store, &center, depth, 0);
        apply_radial_layout(&mut nodes);

        let mut graph = EntityGraph {
            nodes,
            edges,
            layout: GraphLayout::Radial,
            metadata: GraphMetadata {
                center: center.key(),
                depth,
                node_count: 0,
                edge_count: 0,
                generated_at: Utc::now(),
            },
        };
        graph.refresh_metadata();
        log::debug!(
            "Built graph around {}: {} nodes, {} edges",
            graph.metadata.center,
            graph.metadata.node_count,
            graph.metadata.edge_count
        );

        self.current.insert(graph)
    }

    /// Merge the 1-hop neighbourhood of `node_id` into the current graph.
    pub fn expand_graph_node(
        &mut self,
        store: &RelationshipStore,
        node_id: &str,
    ) -> Result<&EntityGraph> {
        let graph = self.current_mut()?;
        let (entity, level) = graph
            .node(node_id)
            .map(|n| (n.entity.clone(), n.level))
            .ok_or_else(|| OpsgraphError::NotFound(format!("graph node {}", node_id)))?;

        let (nodes, edges) = bfs_subgraph(store, &entity, 1, level);

        let mut node_ids: HashSet<String> = graph.nodes.iter().map(|n| n.id.clone()).collect();
        for node in nodes {
            if node_ids.insert(node.id.clone()) {
                graph.nodes.push(node);
            }
        }
        let mut edge_ids: HashSet<String> = graph.edges.iter().map(|e| e.id.clone()).collect();
        for edge in edges {
            if edge_ids.insert(edge.id.clone()) {
                graph.edges.push(edge);
            }
        }

        if let Some(node) = graph.node_mut(node_id) {
            node.expanded = true;
        }
        apply_radial_layout(&mut graph.nodes);
        graph.refresh_metadata();
        Ok(graph)
    }

    /// Remove the direct outgoing targets of `node_id` and every edge touching
    /// them. Deeper descendants stay. The center and the node itself are kept.
    pub fn collapse_graph_node(&mut self, node_id: &str) -> Result<&EntityGraph> {
        let graph = self.current_mut()?;
        if !graph.contains_node(node_id) {
            return Err(OpsgraphError::NotFound(format!("graph node {}", node_id)));
        }

        let center = graph.metadata.center.clone();
        let removed: HashSet<String> = graph
            .edges_from(node_id)
            .map(|e| e.target.clone())
            .filter(|target| target != node_id && *target != center)
            .collect();

        graph.nodes.retain(|n| !removed.contains(&n.id));
        graph
            .edges
            .retain(|e| !removed.contains(&e.source) && !removed.contains(&e.target));

        if let Some(node) = graph.node_mut(node_id) {
            node.expanded = false;
        }
        apply_radial_layout(&mut graph.nodes);
        graph.refresh_metadata();
        Ok(graph)
    }

    /// Highlight the shortest path between two graph nodes.
    ///
    /// Previous path highlighting is cleared first (the center keeps its
    /// highlight). Returns `false` and leaves the graph untouched if no path
    /// exists.
    pub fn highlight_path(
        &mut self,
        store: &RelationshipStore,
        finder: &PathFinder,
        from_node_id: &str,
        to_node_id: &str,
    ) -> Result<bool> {
        let graph = self.current_mut()?;
        let from = graph
            .node(from_node_id)
            .map(|n| n.entity.clone())
            .ok_or_else(|| OpsgraphError::NotFound(format!("graph node {}", from_node_id)))?;
        let to = graph
            .node(to_node_id)
            .map(|n| n.entity.clone())
            .ok_or_else(|| OpsgraphError::NotFound(format!("graph node {}", to_node_id)))?;

        let paths = finder.find_path(store, &from, &to, PathType::Shortest);
        let Some(trace) = paths.first() else {
            return Ok(false);
        };

        let on_path: HashSet<String> = trace.path.iter().map(EntityReference::key).collect();
        let hops: HashSet<(String, String)> = trace
            .path
            .windows(2)
            .map(|pair| (pair[0].key(), pair[1].key()))
            .collect();

        let center = graph.metadata.center.clone();
        for node in graph.nodes.iter_mut() {
            node.highlighted = node.id == center || on_path.contains(&node.id);
        }
        for edge in graph.edges.iter_mut() {
            edge.animated = hops.contains(&(edge.source.clone(), edge.target.clone()));
        }
        Ok(true)
    }
}
