//! One logical user session: the relationship store and everything derived
//! from it, plus navigation state, deep links and action dispatch.

use std::sync::Arc;

use crate::actions::{available_actions, ActionExecutor, ActionOutcome, ContextualAction};
use crate::config::Config;
use crate::db::{relationships, Db};
use crate::entity::{EntityReference, EntityRelationship};
use crate::error::Result;
use crate::graph::{
    get_dependencies, get_impact_analysis, get_related_entities, EntityGraph, GraphBuilder,
    PathFinder, PathType, RelatedEntity, RelationshipStore, TracePath, TraversalOptions,
};
use crate::links::DeepLinkCodec;
use crate::navigation::NavigationHistory;

/// Session shared by concurrent HTTP handlers.
pub type SharedSession = Arc<tokio::sync::Mutex<Session>>;

pub struct Session {
    config: Config,
    store: RelationshipStore,
    paths: PathFinder,
    graph: GraphBuilder,
    navigation: NavigationHistory,
    links: DeepLinkCodec,
    actions: ActionExecutor,
}

impl Session {
    pub fn new(config: Config) -> Result<Self> {
        let links = DeepLinkCodec::new(&config.links.base_url, config.cache.short_link_capacity)?;
        let actions = ActionExecutor::new(&config.actions, config.action_api_key())?;
        Ok(Self {
            store: RelationshipStore::new(),
            paths: PathFinder::new(config.cache.path_cache_capacity),
            graph: GraphBuilder::new(),
            navigation: NavigationHistory::new(),
            links,
            actions,
            config,
        })
    }

    pub fn into_shared(self) -> SharedSession {
        Arc::new(tokio::sync::Mutex::new(self))
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn store(&self) -> &RelationshipStore {
        &self.store
    }

    /// Replace the store contents. Memoized paths and the current graph
    /// describe the old store, so both are dropped.
    pub fn replace_relationships(&mut self, relationships: Vec<EntityRelationship>) {
        self.store = RelationshipStore::from_relationships(relationships);
        self.paths.clear_cache();
        self.graph.clear();
        log::info!(
            "Relationship store loaded: {} entities, {} relationships",
            self.store.entity_count(),
            self.store.relationship_count()
        );
    }

    /// Load the configured tenant's relationships. On failure the store is
    /// left empty, never partially filled.
    pub async fn load(&mut self, db: &Db) -> Result<usize> {
        let kind = self.config.opsgraph.relationship_kind.clone();
        let tenant = self.config.opsgraph.tenant.clone();
        match relationships::load_all(db, &kind, &tenant).await {
            Ok(rels) => {
                let count = rels.len();
                self.replace_relationships(rels);
                Ok(count)
            }
            Err(e) => {
                log::error!("Failed to load relationships for tenant {}: {}", tenant, e);
                self.replace_relationships(Vec::new());
                Err(e)
            }
        }
    }

    /// Reference for `entity_type:entity_id`, enriched from the store when known.
    pub fn resolve_entity(&self, entity_type: &str, entity_id: &str) -> EntityReference {
        let bare = EntityReference::new(entity_type, entity_id, entity_id);
        self.store.entity(&bare.key()).cloned().unwrap_or(bare)
    }

    /// Traversal options seeded from the `[traversal]` config section.
    pub fn default_options(&self) -> TraversalOptions {
        TraversalOptions::default()
            .with_max_distance(self.config.traversal.max_distance)
            .with_limit(self.config.traversal.limit)
            .with_sort(self.config.traversal.sort_by)
    }

    pub fn related_entities(
        &self,
        origin: &EntityReference,
        options: &TraversalOptions,
    ) -> Result<Vec<RelatedEntity>> {
        get_related_entities(&self.store, origin, options)
    }

    pub fn impact_analysis(&self, origin: &EntityReference, max_distance: usize) -> Result<Vec<RelatedEntity>> {
        get_impact_analysis(&self.store, origin, max_distance)
    }

    pub fn dependencies(&self, origin: &EntityReference, max_distance: usize) -> Result<Vec<RelatedEntity>> {
        get_dependencies(&self.store, origin, max_distance)
    }

    pub fn find_path(
        &self,
        from: &EntityReference,
        to: &EntityReference,
        path_type: PathType,
    ) -> Vec<TracePath> {
        self.paths.find_path(&self.store, from, to, path_type)
    }

    pub fn clear_path_cache(&self) {
        self.paths.clear_cache();
    }

    pub fn graph(&self) -> Option<&EntityGraph> {
        self.graph.current()
    }

    /// Build the graph around `center`; `depth` defaults to `traversal.graph_depth`.
    pub fn build_graph(&mut self, center: &EntityReference, depth: Option<usize>) -> &EntityGraph {
        let depth = depth.unwrap_or(self.config.traversal.graph_depth);
        self.graph.build_graph(&self.store, center, depth)
    }

    pub fn expand_graph_node(&mut self, node_id: &str) -> Result<&EntityGraph> {
        self.graph.expand_graph_node(&self.store, node_id)
    }

    pub fn collapse_graph_node(&mut self, node_id: &str) -> Result<&EntityGraph> {
        self.graph.collapse_graph_node(node_id)
    }

    pub fn highlight_path(&mut self, from_node_id: &str, to_node_id: &str) -> Result<bool> {
        self.graph
            .highlight_path(&self.store, &self.paths, from_node_id, to_node_id)
    }

    pub fn navigation(&self) -> &NavigationHistory {
        &self.navigation
    }

    pub fn navigation_mut(&mut self) -> &mut NavigationHistory {
        &mut self.navigation
    }

    pub fn links(&self) -> &DeepLinkCodec {
        &self.links
    }

    pub fn actions(&self) -> &ActionExecutor {
        &self.actions
    }

    pub fn actions_mut(&mut self) -> &mut ActionExecutor {
        &mut self.actions
    }

    pub fn contextual_actions(
        &self,
        entity: &EntityReference,
        permissions: &[String],
    ) -> Vec<ContextualAction> {
        available_actions(entity, permissions)
    }

    pub async fn execute_action(
        &self,
        action: &ContextualAction,
        entity: &EntityReference,
    ) -> Result<ActionOutcome> {
        self.actions.execute_contextual_action(action, entity).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::migrate::run_migrations;
    use crate::entity::{RelationshipStrength, RelationshipType};
    use std::path::Path;
    use tempfile::TempDir;

    fn entity(t: &str, id: &str) -> EntityReference {
        EntityReference::new(t, id, id)
    }

    fn scenario() -> Vec<EntityRelationship> {
        vec![
            EntityRelationship::new(
                entity("incident", "I1"),
                EntityReference::new("service", "S1", "Payments"),
                RelationshipType::Dependency,
                RelationshipStrength::Strong,
            )
            .with_id("e1"),
            EntityRelationship::new(
                entity("service", "S1"),
                entity("service", "S2"),
                RelationshipType::Impact,
                RelationshipStrength::Moderate,
            )
            .with_id("e2"),
        ]
    }

    async fn migrated_db(dir: &TempDir) -> Db {
        let db = Db::new(dir.path().join("session.db"));
        let migrations_dir = Path::new(env!("CARGO_MANIFEST_DIR")).join("migrations");
        db.with_connection(move |conn| run_migrations(conn, &migrations_dir))
            .await
            .unwrap();
        db
    }

    #[test]
    fn test_engine_operations_share_store() {
        let mut session = Session::new(Config::default()).unwrap();
        session.replace_relationships(scenario());

        let i1 = session.resolve_entity("incident", "I1");
        let related = session.related_entities(&i1, &session.default_options()).unwrap();
        assert_eq!(related.len(), 2);

        let path = session.find_path(&i1, &entity("service", "S2"), PathType::Shortest);
        assert_eq!(path[0].distance, 2);

        let graph = session.build_graph(&i1, Some(1));
        assert_eq!(graph.nodes.len(), 2);
        assert!(session.highlight_path("incident:I1", "service:S1").unwrap());
    }

    #[test]
    fn test_resolve_entity_prefers_store_data() {
        let mut session = Session::new(Config::default()).unwrap();
        session.replace_relationships(scenario());
        assert_eq!(session.resolve_entity("service", "S1").display_name, "Payments");
        assert_eq!(session.resolve_entity("service", "S9").display_name, "S9");
    }

    #[test]
    fn test_reload_clears_path_cache_and_graph() {
        let mut session = Session::new(Config::default()).unwrap();
        session.replace_relationships(scenario());
        let i1 = entity("incident", "I1");
        session.find_path(&i1, &entity("service", "S2"), PathType::Shortest);
        session.build_graph(&i1, None);

        session.replace_relationships(Vec::new());
        assert!(session.find_path(&i1, &entity("service", "S2"), PathType::Shortest).is_empty());
        assert!(session.graph().is_none());
    }

    #[tokio::test]
    async fn test_load_from_database() {
        let dir = TempDir::new().unwrap();
        let db = migrated_db(&dir).await;
        let config = Config::default();
        relationships::insert_relationships(
            &db,
            &config.opsgraph.relationship_kind,
            &config.opsgraph.tenant,
            scenario(),
        )
        .await
        .unwrap();

        let mut session = Session::new(config).unwrap();
        assert_eq!(session.load(&db).await.unwrap(), 2);
        assert_eq!(session.store().relationship_count(), 2);
    }

    #[tokio::test]
    async fn test_failed_load_leaves_store_empty() {
        let dir = TempDir::new().unwrap();
        let db = Db::new(dir.path().join("unmigrated.db"));
        let mut session = Session::new(Config::default()).unwrap();
        session.replace_relationships(scenario());

        assert!(session.load(&db).await.is_err());
        assert!(session.store().is_empty());
    }
}
