//! Entity relationship graph: adjacency store, ranked BFS traversal,
//! traceability path finding and visualization subgraphs.

mod builder;
mod path;
mod scoring;
mod store;
mod traversal;

pub use builder::{EdgeStyle, EntityGraph, GraphBuilder, GraphEdge, GraphLayout, GraphMetadata, GraphNode};
pub use path::{PathFinder, PathType, TracePath};
pub use scoring::{impact_score, relevance_score, type_weight, DISTANCE_DECAY};
pub use store::RelationshipStore;
pub use traversal::{
    get_dependencies, get_impact_analysis, get_related_entities, RelatedEntity, SortBy,
    TraversalOptions,
};
