//! Browser-style navigation history and the session's navigation context.

mod history;

pub use history::NavigationHistory;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::entity::EntityReference;

/// Timestamped record of a past navigation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NavigationBreadcrumb {
    pub id: String,
    pub entity_ref: EntityReference,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<Map<String, Value>>,
}

impl NavigationBreadcrumb {
    pub fn new(entity_ref: EntityReference) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            entity_ref,
            timestamp: Utc::now(),
            action: None,
            context: None,
        }
    }

    pub fn with_action(mut self, action: impl Into<String>) -> Self {
        self.action = Some(action.into());
        self
    }

    pub fn with_context(mut self, context: Map<String, Value>) -> Self {
        self.context = Some(context);
        self
    }
}

impl PartialEq for NavigationBreadcrumb {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct NavigationContext {
    pub current_entity: Option<EntityReference>,
    pub previous_entity: Option<EntityReference>,
    /// Transient drill-down stack, independent of the cursor-based history.
    pub navigation_stack: Vec<NavigationBreadcrumb>,
    pub active_view: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filters: Option<Map<String, Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub search_query: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selected_items: Option<Vec<String>>,
}

pub const DEFAULT_VIEW: &str = "dashboard";

impl Default for NavigationContext {
    fn default() -> Self {
        Self {
            current_entity: None,
            previous_entity: None,
            navigation_stack: Vec::new(),
            active_view: DEFAULT_VIEW.to_string(),
            filters: None,
            search_query: None,
            selected_items: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NavigationDirection {
    Back,
    Forward,
}

/// Emitted on every navigate, back and forward for router/UI observers.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NavigationEvent {
    pub entity: EntityReference,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<Map<String, Value>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub direction: Option<NavigationDirection>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_breadcrumb_wire_format() {
        let crumb = NavigationBreadcrumb::new(EntityReference::new("incident", "I1", "Outage"))
            .with_action("open");
        let value = serde_json::to_value(&crumb).unwrap();
        assert_eq!(value["entityRef"]["entityId"], "I1");
        assert_eq!(value["action"], "open");
        assert!(value.get("context").is_none());
    }

    #[test]
    fn test_default_context() {
        let ctx = NavigationContext::default();
        assert!(ctx.current_entity.is_none());
        assert!(ctx.navigation_stack.is_empty());
        assert_eq!(ctx.active_view, DEFAULT_VIEW);
    }

    #[test]
    fn test_event_direction_serialization() {
        let event = NavigationEvent {
            entity: EntityReference::new("service", "S1", "Payments"),
            context: None,
            direction: Some(NavigationDirection::Back),
        };
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["direction"], "back");
        assert!(value.get("context").is_none());
    }
}
