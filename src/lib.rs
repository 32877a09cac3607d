pub mod actions;
pub mod api;
pub mod cache;
pub mod config;
pub mod db;
pub mod entity;
pub mod error;
pub mod graph;
pub mod links;
pub mod navigation;
pub mod session;

pub use config::Config;
pub use entity::{EntityReference, EntityRelationship, RelationshipStrength, RelationshipType};
pub use error::{OpsgraphError, Result};
pub use graph::{PathType, RelationshipStore, SortBy, TraversalOptions};
pub use session::{Session, SharedSession};
