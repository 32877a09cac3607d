//! Contextual actions offered for an entity, and their dispatch.

mod catalog;
mod executor;

pub use catalog::{available_actions, get_contextual_actions};
pub use executor::ActionExecutor;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::sync::Arc;

use crate::entity::EntityReference;
use crate::error::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActionCategory {
    Navigation,
    Analysis,
    Workflow,
    Communication,
    Automation,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    Get,
    #[default]
    Post,
    Put,
    Patch,
    Delete,
}

impl From<HttpMethod> for reqwest::Method {
    fn from(method: HttpMethod) -> Self {
        match method {
            HttpMethod::Get => reqwest::Method::GET,
            HttpMethod::Post => reqwest::Method::POST,
            HttpMethod::Put => reqwest::Method::PUT,
            HttpMethod::Patch => reqwest::Method::PATCH,
            HttpMethod::Delete => reqwest::Method::DELETE,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ConditionOperator {
    Equals,
    NotEquals,
    In,
    NotIn,
    Exists,
}

/// Predicate over an entity field (`status` or a metadata key).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionCondition {
    pub field: String,
    pub operator: ConditionOperator,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,
}

impl ActionCondition {
    pub fn new(field: impl Into<String>, operator: ConditionOperator, value: Option<Value>) -> Self {
        Self {
            field: field.into(),
            operator,
            value,
        }
    }

    pub fn evaluate(&self, entity: &EntityReference) -> bool {
        let actual = entity.field(&self.field).filter(|v| !v.is_null());
        let listed = |candidate: &Value| match &self.value {
            Some(Value::Array(items)) => items.contains(candidate),
            Some(other) => other == candidate,
            None => false,
        };

        match self.operator {
            ConditionOperator::Equals => actual.as_ref() == self.value.as_ref(),
            ConditionOperator::NotEquals => actual.as_ref() != self.value.as_ref(),
            ConditionOperator::In => actual.as_ref().is_some_and(listed),
            ConditionOperator::NotIn => !actual.as_ref().is_some_and(listed),
            ConditionOperator::Exists => actual.is_some(),
        }
    }
}

type HandlerFn = dyn Fn(&ContextualAction, &EntityReference) -> Result<()> + Send + Sync;

/// In-process action handler.
#[derive(Clone)]
pub struct ActionHandler(Arc<HandlerFn>);

impl ActionHandler {
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(&ContextualAction, &EntityReference) -> Result<()> + Send + Sync + 'static,
    {
        Self(Arc::new(f))
    }

    pub fn call(&self, action: &ContextualAction, entity: &EntityReference) -> Result<()> {
        (self.0)(action, entity)
    }
}

impl fmt::Debug for ActionHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ActionHandler(..)")
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContextualAction {
    pub id: String,
    pub action_type: String,
    pub label: String,
    pub category: ActionCategory,
    pub enabled: bool,
    pub visible: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub requires_confirmation: Option<bool>,
    #[serde(skip)]
    pub handler: Option<ActionHandler>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_endpoint: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_method: Option<HttpMethod>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub required_permissions: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conditions: Option<Vec<ActionCondition>>,
}

impl ContextualAction {
    pub fn new(
        id: impl Into<String>,
        action_type: impl Into<String>,
        label: impl Into<String>,
        category: ActionCategory,
    ) -> Self {
        Self {
            id: id.into(),
            action_type: action_type.into(),
            label: label.into(),
            category,
            enabled: true,
            visible: true,
            requires_confirmation: None,
            handler: None,
            api_endpoint: None,
            api_method: None,
            payload: None,
            required_permissions: None,
            conditions: None,
        }
    }

    pub fn with_handler(mut self, handler: ActionHandler) -> Self {
        self.handler = Some(handler);
        self
    }

    pub fn with_endpoint(mut self, method: HttpMethod, endpoint: impl Into<String>) -> Self {
        self.api_method = Some(method);
        self.api_endpoint = Some(endpoint.into());
        self
    }

    pub fn with_payload(mut self, payload: Value) -> Self {
        self.payload = Some(payload);
        self
    }

    pub fn is_permitted(&self, permissions: &[String]) -> bool {
        self.required_permissions
            .as_deref()
            .unwrap_or_default()
            .iter()
            .all(|p| permissions.contains(p))
    }

    pub fn conditions_met(&self, entity: &EntityReference) -> bool {
        self.conditions
            .as_deref()
            .unwrap_or_default()
            .iter()
            .all(|c| c.evaluate(entity))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ActionOutcome {
    CustomHandler,
    ActionHandler,
    Remote,
    NoOp,
}

/// Signal for the sync collaborator after a successful dispatch.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncSignal {
    pub entity: EntityReference,
    pub action_type: String,
    pub outcome: ActionOutcome,
}
