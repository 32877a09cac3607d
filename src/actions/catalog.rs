use serde_json::{json, Value};

use super::{ActionCategory, ActionCondition, ConditionOperator, ContextualAction, HttpMethod};
use crate::entity::EntityReference;

/// Static action descriptor; `{id}` in `endpoint` is replaced per entity.
struct ActionTemplate {
    action_type: &'static str,
    label: &'static str,
    category: ActionCategory,
    endpoint: Option<(HttpMethod, &'static str)>,
    confirm: bool,
    permissions: &'static [&'static str],
    condition: Option<(&'static str, ConditionOperator, &'static [&'static str])>,
}

const fn entry(
    action_type: &'static str,
    label: &'static str,
    category: ActionCategory,
) -> ActionTemplate {
    ActionTemplate {
        action_type,
        label,
        category,
        endpoint: None,
        confirm: false,
        permissions: &[],
        condition: None,
    }
}

impl ActionTemplate {
    const fn remote(mut self, method: HttpMethod, endpoint: &'static str) -> Self {
        self.endpoint = Some((method, endpoint));
        self
    }

    const fn confirm(mut self) -> Self {
        self.confirm = true;
        self
    }

    const fn permissions(mut self, permissions: &'static [&'static str]) -> Self {
        self.permissions = permissions;
        self
    }

    const fn when(
        mut self,
        field: &'static str,
        operator: ConditionOperator,
        values: &'static [&'static str],
    ) -> Self {
        self.condition = Some((field, operator, values));
        self
    }

    fn build(&self, entity_id: &str) -> ContextualAction {
        let mut action = ContextualAction::new(
            format!("{}-{}", self.action_type, entity_id),
            self.action_type,
            self.label,
            self.category,
        );
        if let Some((method, template)) = self.endpoint {
            action = action.with_endpoint(method, template.replace("{id}", entity_id));
        }
        if self.confirm {
            action.requires_confirmation = Some(true);
        }
        if !self.permissions.is_empty() {
            action.required_permissions =
                Some(self.permissions.iter().map(|p| p.to_string()).collect());
        }
        if let Some((field, operator, values)) = self.condition {
            let value = match (operator, values) {
                (ConditionOperator::Exists, _) => None,
                (ConditionOperator::In | ConditionOperator::NotIn, _) => Some(json!(values)),
                (_, [single]) => Some(Value::String(single.to_string())),
                (_, _) => Some(json!(values)),
            };
            action.conditions = Some(vec![ActionCondition::new(field, operator, value)]);
        }
        action
    }
}

use ActionCategory::{Analysis, Automation, Communication, Navigation, Workflow};
use ConditionOperator::{Equals, Exists, NotEquals, NotIn};
use HttpMethod::{Get, Post, Put};

const UNIVERSAL: &[ActionTemplate] = &[
    entry("view-details", "View details", Navigation),
    entry("view-relationships", "View relationships", Navigation),
    entry("impact-analysis", "Impact analysis", Analysis),
];

const CLOSED_STATES: &[&str] = &["resolved", "closed"];

const INCIDENT: &[ActionTemplate] = &[
    entry("escalate", "Escalate", Workflow)
        .remote(Post, "/api/incidents/{id}/escalate")
        .confirm()
        .permissions(&["incidents:write"])
        .when("status", NotIn, CLOSED_STATES),
    entry("assign", "Assign", Workflow)
        .remote(Post, "/api/incidents/{id}/assign")
        .permissions(&["incidents:write"]),
    entry("resolve", "Resolve", Workflow)
        .remote(Post, "/api/incidents/{id}/resolve")
        .confirm()
        .permissions(&["incidents:write"])
        .when("status", NotIn, CLOSED_STATES),
    entry("link-problem", "Link to problem", Workflow)
        .remote(Post, "/api/incidents/{id}/problems"),
];

const PROBLEM: &[ActionTemplate] = &[
    entry("create-known-error", "Create known error", Workflow)
        .remote(Post, "/api/problems/{id}/known-errors")
        .permissions(&["problems:write"]),
    entry("root-cause-analysis", "Root cause analysis", Analysis),
    entry("link-incidents", "Link incidents", Workflow).remote(Post, "/api/problems/{id}/incidents"),
];

const CHANGE: &[ActionTemplate] = &[
    entry("approve", "Approve", Workflow)
        .remote(Post, "/api/changes/{id}/approve")
        .confirm()
        .permissions(&["changes:approve"])
        .when("status", Equals, &["pending-approval"]),
    entry("reject", "Reject", Workflow)
        .remote(Post, "/api/changes/{id}/reject")
        .confirm()
        .permissions(&["changes:approve"])
        .when("status", Equals, &["pending-approval"]),
    entry("schedule", "Schedule", Workflow)
        .remote(Put, "/api/changes/{id}/schedule")
        .permissions(&["changes:write"]),
];

const ASSET: &[ActionTemplate] = &[
    entry("run-diagnostics", "Run diagnostics", Automation)
        .remote(Post, "/api/assets/{id}/diagnostics")
        .when("status", NotEquals, &["retired"]),
    entry("view-configuration", "View configuration", Navigation)
        .remote(Get, "/api/assets/{id}/configuration"),
];

const SERVICE: &[ActionTemplate] = &[
    entry("check-health", "Check health", Analysis).remote(Get, "/api/services/{id}/health"),
    entry("view-sla", "View SLA", Navigation),
    entry("failover", "Fail over", Automation)
        .remote(Post, "/api/services/{id}/failover")
        .confirm()
        .permissions(&["services:operate"]),
];

const TEAM: &[ActionTemplate] = &[
    entry("notify-team", "Notify team", Communication).remote(Post, "/api/teams/{id}/notify"),
    entry("view-on-call", "View on-call", Navigation).remote(Get, "/api/teams/{id}/on-call"),
];

const RISK: &[ActionTemplate] = &[
    entry("assess-risk", "Assess risk", Analysis).remote(Post, "/api/risks/{id}/assess"),
    entry("add-mitigation", "Add mitigation", Workflow)
        .remote(Post, "/api/risks/{id}/mitigations")
        .permissions(&["risks:write"]),
];

const CUSTOMER: &[ActionTemplate] = &[
    entry("contact-customer", "Contact customer", Communication)
        .remote(Post, "/api/customers/{id}/contact"),
    entry("view-contracts", "View contracts", Navigation),
];

const CONTRACT: &[ActionTemplate] = &[
    entry("renew-contract", "Renew contract", Workflow)
        .remote(Post, "/api/contracts/{id}/renew")
        .confirm()
        .permissions(&["contracts:write"])
        .when("expiresAt", Exists, &[]),
    entry("view-terms", "View terms", Navigation),
];

const VENDOR: &[ActionTemplate] = &[
    entry("contact-vendor", "Contact vendor", Communication).remote(Post, "/api/vendors/{id}/contact"),
    entry("review-performance", "Review performance", Analysis),
];

const AUTOMATION_RULE: &[ActionTemplate] = &[
    entry("run-now", "Run now", Automation)
        .remote(Post, "/api/automation-rules/{id}/run")
        .confirm()
        .permissions(&["automation:execute"])
        .when("status", Equals, &["active"]),
    entry("toggle-rule", "Enable/disable", Automation)
        .remote(Put, "/api/automation-rules/{id}/toggle")
        .permissions(&["automation:write"]),
];

fn type_specific(entity_type: &str) -> &'static [ActionTemplate] {
    match entity_type {
        "incident" => INCIDENT,
        "problem" => PROBLEM,
        "change" => CHANGE,
        "asset" => ASSET,
        "service" => SERVICE,
        "team" => TEAM,
        "risk" => RISK,
        "customer" => CUSTOMER,
        "contract" => CONTRACT,
        "vendor" => VENDOR,
        "automation-rule" => AUTOMATION_RULE,
        _ => &[],
    }
}

/// Universal actions followed by those specific to `entity_type`.
pub fn get_contextual_actions(entity_type: &str, entity_id: &str) -> Vec<ContextualAction> {
    UNIVERSAL
        .iter()
        .chain(type_specific(entity_type))
        .map(|t| t.build(entity_id))
        .collect()
}

/// Visible actions the caller holds permissions for, with `enabled` set from
/// each action's conditions against the entity.
pub fn available_actions(entity: &EntityReference, permissions: &[String]) -> Vec<ContextualAction> {
    get_contextual_actions(&entity.entity_type, &entity.entity_id)
        .into_iter()
        .filter(|action| action.visible && action.is_permitted(permissions))
        .map(|mut action| {
            action.enabled = action.conditions_met(entity);
            action
        })
        .collect()
}
