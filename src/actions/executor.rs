use reqwest::Client;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::broadcast;
use url::Url;

use super::{ActionHandler, ActionOutcome, ContextualAction, HttpMethod, SyncSignal};
use crate::config::ActionsConfig;
use crate::entity::EntityReference;
use crate::error::{OpsgraphError, Result};

const SYNC_CHANNEL_CAPACITY: usize = 64;

/// Dispatches contextual actions: registered custom handler, then the
/// action's own handler, then its remote endpoint, else nothing.
#[derive(Clone)]
pub struct ActionExecutor {
    client: Client,
    api_base_url: Option<Url>,
    api_key: Option<String>,
    custom_handlers: HashMap<String, ActionHandler>,
    sync: broadcast::Sender<SyncSignal>,
}

impl ActionExecutor {
    pub fn new(config: &ActionsConfig, api_key: Option<String>) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| OpsgraphError::Http(format!("Failed to build HTTP client: {}", e)))?;

        let api_base_url = config
            .api_base_url
            .as_deref()
            .map(|raw| {
                Url::parse(raw).map_err(|e| {
                    OpsgraphError::Config(format!("Invalid actions.api_base_url '{}': {}", raw, e))
                })
            })
            .transpose()?;

        let (sync, _) = broadcast::channel(SYNC_CHANNEL_CAPACITY);
        Ok(Self {
            client,
            api_base_url,
            api_key,
            custom_handlers: HashMap::new(),
            sync,
        })
    }

    /// Register a handler that takes precedence for every action of `action_type`.
    pub fn register_handler(&mut self, action_type: impl Into<String>, handler: ActionHandler) {
        self.custom_handlers.insert(action_type.into(), handler);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SyncSignal> {
        self.sync.subscribe()
    }

    pub async fn execute_contextual_action(
        &self,
        action: &ContextualAction,
        entity: &EntityReference,
    ) -> Result<ActionOutcome> {
        if !action.enabled {
            return Err(OpsgraphError::InvalidInput(format!(
                "action {} is disabled for {}",
                action.action_type,
                entity.key()
            )));
        }

        let outcome = if let Some(handler) = self.custom_handlers.get(&action.action_type) {
            handler.call(action, entity)?;
            ActionOutcome::CustomHandler
        } else if let Some(handler) = &action.handler {
            handler.call(action, entity)?;
            ActionOutcome::ActionHandler
        } else if let Some(endpoint) = &action.api_endpoint {
            self.call_remote(action, endpoint, entity).await?;
            ActionOutcome::Remote
        } else {
            ActionOutcome::NoOp
        };

        log::info!(
            "Executed action {} on {} ({:?})",
            action.action_type,
            entity.key(),
            outcome
        );

        if outcome != ActionOutcome::NoOp {
            let signal = SyncSignal {
                entity: entity.clone(),
                action_type: action.action_type.clone(),
                outcome,
            };
            if let Ok(receivers) = self.sync.send(signal) {
                log::debug!("Sync signal sent to {} receivers", receivers);
            }
        }
        Ok(outcome)
    }

    fn endpoint_url(&self, endpoint: &str) -> Result<Url> {
        match Url::parse(endpoint) {
            Ok(url) => Ok(url),
            Err(url::ParseError::RelativeUrlWithoutBase) => {
                let base = self.api_base_url.as_ref().ok_or_else(|| {
                    OpsgraphError::Config(format!(
                        "actions.api_base_url is required for relative endpoint {}",
                        endpoint
                    ))
                })?;
                base.join(endpoint).map_err(|e| {
                    OpsgraphError::InvalidInput(format!("Invalid endpoint {}: {}", endpoint, e))
                })
            }
            Err(e) => Err(OpsgraphError::InvalidInput(format!(
                "Invalid endpoint {}: {}",
                endpoint, e
            ))),
        }
    }

    async fn call_remote(
        &self,
        action: &ContextualAction,
        endpoint: &str,
        entity: &EntityReference,
    ) -> Result<()> {
        let url = self.endpoint_url(endpoint)?;
        let method = action.api_method.unwrap_or_default();
        log::debug!("Calling {:?} {} for {}", method, url, action.action_type);

        let mut request = self.client.request(method.into(), url.clone());
        if method == HttpMethod::Get {
            let mut query = vec![
                ("entityType", entity.entity_type.clone()),
                ("entityId", entity.entity_id.clone()),
                ("action", action.action_type.clone()),
            ];
            if let Some(payload) = &action.payload {
                query.push(("payload", serde_json::to_string(payload)?));
            }
            request = request.query(&query);
        } else {
            request = request.json(&json!({
                "entityType": entity.entity_type,
                "entityId": entity.entity_id,
                "action": action.action_type,
                "payload": action.payload.clone().unwrap_or(Value::Null),
            }));
        }
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request
            .send()
            .await
            .map_err(|e| OpsgraphError::Http(format!("Request to {} failed: {}", url, e)))?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            log::warn!("Action {} failed with {}: {}", action.action_type, status, message);
            return Err(OpsgraphError::ActionExecution {
                status: status.as_u16(),
                message,
            });
        }
        Ok(())
    }
}
