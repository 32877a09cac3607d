use serde_json::{Map, Value};
use std::collections::HashSet;
use tokio::sync::broadcast;

use super::{NavigationBreadcrumb, NavigationContext, NavigationDirection, NavigationEvent};
use crate::entity::EntityReference;

const EVENT_CHANNEL_CAPACITY: usize = 64;

/// Cursor-based navigation history plus the session's navigation context.
///
/// `history` and `context.navigation_stack` are separate: the first is the
/// back/forward list, the second a transient drill-down stack.
#[derive(Debug)]
pub struct NavigationHistory {
    history: Vec<NavigationBreadcrumb>,
    /// `None` means nothing has been visited yet.
    history_index: Option<usize>,
    context: NavigationContext,
    events: broadcast::Sender<NavigationEvent>,
}

impl Default for NavigationHistory {
    fn default() -> Self {
        Self::new()
    }
}

impl NavigationHistory {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            history: Vec::new(),
            history_index: None,
            context: NavigationContext::default(),
            events,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<NavigationEvent> {
        self.events.subscribe()
    }

    pub fn history(&self) -> &[NavigationBreadcrumb] {
        &self.history
    }

    pub fn history_index(&self) -> Option<usize> {
        self.history_index
    }

    pub fn context(&self) -> &NavigationContext {
        &self.context
    }

    pub fn current_entity(&self) -> Option<&EntityReference> {
        self.context.current_entity.as_ref()
    }

    pub fn can_go_back(&self) -> bool {
        matches!(self.history_index, Some(i) if i > 0)
    }

    pub fn can_go_forward(&self) -> bool {
        match self.history_index {
            Some(i) => i + 1 < self.history.len(),
            None => false,
        }
    }

    /// Visit `entity`. Entries after the cursor are discarded first, so
    /// navigating after going back starts a new branch.
    pub fn navigate_to_entity(
        &mut self,
        entity: EntityReference,
        context: Option<Map<String, Value>>,
    ) -> &NavigationBreadcrumb {
        let keep = self.history_index.map_or(0, |i| i + 1);
        if keep < self.history.len() {
            log::debug!(
                "Discarding {} forward history entries",
                self.history.len() - keep
            );
        }
        self.history.truncate(keep);

        let mut crumb = NavigationBreadcrumb::new(entity.clone()).with_action("navigate");
        if let Some(ctx) = context.clone() {
            crumb = crumb.with_context(ctx);
        }
        self.history.push(crumb);
        self.history_index = Some(self.history.len() - 1);
        self.move_to(entity.clone());

        self.emit(NavigationEvent {
            entity,
            context,
            direction: None,
        });

        &self.history[self.history.len() - 1]
    }

    /// Step back one entry. Returns the entity now current, or `None` when
    /// already at the start.
    pub fn go_back(&mut self) -> Option<EntityReference> {
        let index = self.history_index.filter(|i| *i > 0)? - 1;
        Some(self.step_to(index, NavigationDirection::Back))
    }

    /// Step forward one entry. Returns `None` when already at the end.
    pub fn go_forward(&mut self) -> Option<EntityReference> {
        let index = self
            .history_index
            .map(|i| i + 1)
            .filter(|i| *i < self.history.len())?;
        Some(self.step_to(index, NavigationDirection::Forward))
    }

    fn step_to(&mut self, index: usize, direction: NavigationDirection) -> EntityReference {
        self.history_index = Some(index);
        let crumb = &self.history[index];
        let entity = crumb.entity_ref.clone();
        let context = crumb.context.clone();
        self.move_to(entity.clone());

        self.emit(NavigationEvent {
            entity: entity.clone(),
            context,
            direction: Some(direction),
        });
        entity
    }

    fn move_to(&mut self, entity: EntityReference) {
        self.context.previous_entity = self.context.current_entity.replace(entity);
    }

    fn emit(&self, event: NavigationEvent) {
        // Having no subscribers is normal.
        if let Ok(receivers) = self.events.send(event) {
            log::debug!("Navigation event sent to {} receivers", receivers);
        }
    }

    pub fn push_breadcrumb(&mut self, entity: EntityReference, action: Option<String>) {
        let mut crumb = NavigationBreadcrumb::new(entity);
        if let Some(action) = action {
            crumb = crumb.with_action(action);
        }
        self.context.navigation_stack.push(crumb);
    }

    pub fn pop_breadcrumb(&mut self) -> Option<NavigationBreadcrumb> {
        self.context.navigation_stack.pop()
    }

    /// Clear current/previous pointers and the transient stack. History is kept.
    pub fn reset_navigation(&mut self) {
        self.context.current_entity = None;
        self.context.previous_entity = None;
        self.context.navigation_stack.clear();
    }

    pub fn clear_history(&mut self) {
        self.history.clear();
        self.history_index = None;
        self.reset_navigation();
    }

    /// Up to `n` distinct entities from history, most recent first.
    pub fn recent_entities(&self, n: usize) -> Vec<EntityReference> {
        let mut seen = HashSet::new();
        self.history
            .iter()
            .rev()
            .filter(|crumb| seen.insert(crumb.entity_ref.key()))
            .take(n)
            .map(|crumb| crumb.entity_ref.clone())
            .collect()
    }

    pub fn set_active_view(&mut self, view: impl Into<String>) {
        self.context.active_view = view.into();
    }

    pub fn set_filters(&mut self, filters: Option<Map<String, Value>>) {
        self.context.filters = filters;
    }

    pub fn set_search_query(&mut self, query: Option<String>) {
        self.context.search_query = query;
    }

    pub fn set_selected_items(&mut self, items: Option<Vec<String>>) {
        self.context.selected_items = items;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn entity(id: &str) -> EntityReference {
        EntityReference::new("incident", id, id)
    }

    fn history_ids(nav: &NavigationHistory) -> Vec<String> {
        nav.history()
            .iter()
            .map(|c| c.entity_ref.entity_id.clone())
            .collect()
    }

    #[test]
    fn test_navigate_updates_pointers() {
        let mut nav = NavigationHistory::new();
        nav.navigate_to_entity(entity("X"), None);
        nav.navigate_to_entity(entity("Y"), None);

        assert_eq!(nav.history_index(), Some(1));
        assert_eq!(nav.context().current_entity, Some(entity("Y")));
        assert_eq!(nav.context().previous_entity, Some(entity("X")));
    }

    #[test]
    fn test_branch_truncates_forward_history() {
        let mut nav = NavigationHistory::new();
        nav.navigate_to_entity(entity("X"), None);
        nav.navigate_to_entity(entity("Y"), None);
        assert_eq!(nav.go_back(), Some(entity("X")));
        nav.navigate_to_entity(entity("Z"), None);

        assert_eq!(history_ids(&nav), vec!["X", "Z"]);
        assert_eq!(nav.history_index(), Some(1));
        assert!(!nav.can_go_forward());
    }

    #[test]
    fn test_back_forward_bounds() {
        let mut nav = NavigationHistory::new();
        assert!(nav.go_back().is_none());
        assert!(nav.go_forward().is_none());

        nav.navigate_to_entity(entity("X"), None);
        assert!(nav.go_back().is_none());
        assert!(nav.go_forward().is_none());
        assert_eq!(nav.history_index(), Some(0));

        nav.navigate_to_entity(entity("Y"), None);
        assert!(nav.can_go_back());
        assert_eq!(nav.go_back(), Some(entity("X")));
        assert!(nav.go_back().is_none());
        assert_eq!(nav.go_forward(), Some(entity("Y")));
        assert!(nav.go_forward().is_none());
        assert_eq!(nav.context().previous_entity, Some(entity("X")));
    }

    #[test]
    fn test_transient_stack_is_independent() {
        let mut nav = NavigationHistory::new();
        nav.navigate_to_entity(entity("X"), None);
        nav.push_breadcrumb(entity("drill-1"), Some("drill-down".to_string()));
        nav.push_breadcrumb(entity("drill-2"), None);

        assert_eq!(nav.history().len(), 1);
        let popped = nav.pop_breadcrumb().unwrap();
        assert_eq!(popped.entity_ref, entity("drill-2"));
        assert_eq!(nav.context().navigation_stack.len(), 1);
    }

    #[test]
    fn test_reset_keeps_history_clear_drops_it() {
        let mut nav = NavigationHistory::new();
        nav.navigate_to_entity(entity("X"), None);
        nav.push_breadcrumb(entity("drill"), None);

        nav.reset_navigation();
        assert!(nav.current_entity().is_none());
        assert!(nav.context().navigation_stack.is_empty());
        assert_eq!(nav.history().len(), 1);
        assert_eq!(nav.history_index(), Some(0));

        nav.clear_history();
        assert!(nav.history().is_empty());
        assert!(nav.history_index().is_none());
        assert!(!nav.can_go_back());
    }

    #[test]
    fn test_recent_entities_distinct_newest_first() {
        let mut nav = NavigationHistory::new();
        for id in ["A", "B", "A", "C"] {
            nav.navigate_to_entity(entity(id), None);
        }
        let recent: Vec<String> = nav
            .recent_entities(5)
            .into_iter()
            .map(|e| e.entity_id)
            .collect();
        assert_eq!(recent, vec!["C", "A", "B"]);
        assert_eq!(nav.recent_entities(1).len(), 1);
    }

    #[test]
    fn test_context_setters() {
        let mut nav = NavigationHistory::new();
        nav.set_active_view("graph");
        nav.set_search_query(Some("db".to_string()));
        nav.set_selected_items(Some(vec!["incident:I1".to_string()]));
        let mut filters = Map::new();
        filters.insert("status".to_string(), json!("open"));
        nav.set_filters(Some(filters));

        let ctx = nav.context();
        assert_eq!(ctx.active_view, "graph");
        assert_eq!(ctx.search_query.as_deref(), Some("db"));
        assert_eq!(ctx.filters.as_ref().unwrap()["status"], "open");
        assert_eq!(ctx.selected_items.as_ref().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_events_emitted_with_direction() {
        let mut nav = NavigationHistory::new();
        let mut rx = nav.subscribe();

        let mut ctx = Map::new();
        ctx.insert("from".to_string(), json!("search"));
        nav.navigate_to_entity(entity("X"), Some(ctx));
        nav.navigate_to_entity(entity("Y"), None);
        nav.go_back();
        nav.go_forward();

        let first = rx.recv().await.unwrap();
        assert_eq!(first.entity, entity("X"));
        assert!(first.direction.is_none());
        assert_eq!(first.context.unwrap()["from"], "search");

        let second = rx.recv().await.unwrap();
        assert_eq!(second.entity, entity("Y"));

        let back = rx.recv().await.unwrap();
        assert_eq!(back.entity, entity("X"));
        assert_eq!(back.direction, Some(NavigationDirection::Back));
        assert_eq!(back.context.unwrap()["from"], "search");

        let forward = rx.recv().await.unwrap();
        assert_eq!(forward.direction, Some(NavigationDirection::Forward));
    }
}
