//! Shareable deep links to entities.
//!
//! Long form: `<base>/entity?type=<T>&id=<I>[&filters=<json>][&context=<json>]`.
//! Short form: `<base>/e/<id>` where `<id>` is the first 8 characters of the
//! URL-safe, unpadded base64 encoding of the entity key.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use url::Url;

use crate::cache::ShortLinkCache;
use crate::entity::EntityReference;
use crate::error::{OpsgraphError, Result};

pub const SHORT_ID_LEN: usize = 8;
const SHORT_PATH_SEGMENT: &str = "e";
const ENTITY_PATH_SEGMENT: &str = "entity";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeepLinkConfig {
    #[serde(default)]
    pub short_link: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filters: Option<Map<String, Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<Map<String, Value>>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeepLink {
    pub url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub short_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub short_id: Option<String>,
    pub entity: EntityReference,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolvedLink {
    pub entity: EntityReference,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filters: Option<Map<String, Value>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<Map<String, Value>>,
}

impl ResolvedLink {
    fn bare(entity: EntityReference) -> Self {
        Self {
            entity,
            filters: None,
            context: None,
        }
    }
}

/// Short identifier for an entity; may collide for keys sharing a prefix.
pub fn short_id(entity: &EntityReference) -> String {
    let mut encoded = URL_SAFE_NO_PAD.encode(entity.key());
    encoded.truncate(SHORT_ID_LEN);
    encoded
}

pub struct DeepLinkCodec {
    base_url: Url,
    short_id_pattern: Regex,
    cache: ShortLinkCache,
}

impl DeepLinkCodec {
    pub fn new(base_url: &str, short_link_capacity: usize) -> Result<Self> {
        let mut base_url = Url::parse(base_url)
            .map_err(|e| OpsgraphError::Config(format!("Invalid links.base_url '{}': {}", base_url, e)))?;
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }
        let short_id_pattern = Regex::new(&format!(r"^[A-Za-z0-9_-]{{1,{}}}$", SHORT_ID_LEN))
            .map_err(|e| OpsgraphError::Config(format!("Invalid short id pattern: {}", e)))?;

        Ok(Self {
            base_url,
            short_id_pattern,
            cache: ShortLinkCache::new(short_link_capacity),
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    pub fn cached_short_links(&self) -> usize {
        self.cache.len()
    }

    pub fn generate_deep_link(
        &self,
        entity: &EntityReference,
        config: &DeepLinkConfig,
    ) -> Result<DeepLink> {
        let mut url = self.join(ENTITY_PATH_SEGMENT)?;
        {
            let mut query = url.query_pairs_mut();
            query
                .append_pair("type", &entity.entity_type)
                .append_pair("id", &entity.entity_id);
            if let Some(filters) = &config.filters {
                query.append_pair("filters", &serde_json::to_string(filters)?);
            }
            if let Some(context) = &config.context {
                query.append_pair("context", &serde_json::to_string(context)?);
            }
        }

        let (short_url, short_id) = if config.short_link {
            let id = short_id(entity);
            if let Some(previous) = self.cache.insert(id.clone(), entity.clone()) {
                log::warn!(
                    "Short link {} collides: {} replaced by {}",
                    id,
                    previous.key(),
                    entity.key()
                );
            }
            let short_url = self.join(&format!("{}/{}", SHORT_PATH_SEGMENT, id))?;
            (Some(short_url.to_string()), Some(id))
        } else {
            (None, None)
        };

        Ok(DeepLink {
            url: url.to_string(),
            short_url,
            short_id,
            entity: entity.clone(),
            created_at: Utc::now(),
        })
    }

    /// Resolve an absolute, relative or bare short link. Unrecognized or
    /// incomplete links yield `None`.
    pub fn resolve_deep_link(&self, link: &str) -> Option<ResolvedLink> {
        match self.parse_link(link.trim()) {
            Ok(resolved) => Some(resolved),
            Err(e) => {
                log::warn!("{}", e);
                None
            }
        }
    }

    fn join(&self, path: &str) -> Result<Url> {
        self.base_url
            .join(path)
            .map_err(|e| OpsgraphError::InvalidInput(format!("cannot build link for '{}': {}", path, e)))
    }

    fn parse_link(&self, link: &str) -> Result<ResolvedLink> {
        if link.is_empty() {
            return Err(OpsgraphError::InvalidDeepLink("empty link".to_string()));
        }
        if self.short_id_pattern.is_match(link) {
            return self.resolve_short(link);
        }

        let url = match Url::parse(link) {
            Ok(url) => url,
            Err(url::ParseError::RelativeUrlWithoutBase) => self.join(link)?,
            Err(e) => return Err(OpsgraphError::InvalidDeepLink(format!("{}: {}", link, e))),
        };

        let segments: Vec<&str> = url
            .path_segments()
            .map(|s| s.filter(|seg| !seg.is_empty()).collect())
            .unwrap_or_default();

        match segments.as_slice() {
            // A base path ending in `/e` must not turn `entity` into a short id.
            [.., ENTITY_PATH_SEGMENT] if has_entity_query(&url) => Self::resolve_long(&url),
            [.., SHORT_PATH_SEGMENT, id] if self.short_id_pattern.is_match(id) => {
                self.resolve_short(id)
            }
            [.., ENTITY_PATH_SEGMENT] => Self::resolve_long(&url),
            _ => Err(OpsgraphError::InvalidDeepLink(format!(
                "unrecognized link shape: {}",
                link
            ))),
        }
    }

    fn resolve_short(&self, id: &str) -> Result<ResolvedLink> {
        if let Some(entity) = self.cache.get(id) {
            return Ok(ResolvedLink::bare(entity));
        }

        // A full-length id is usually a truncated encoding; only shorter
        // ids are guaranteed to decode to the original key.
        if id.len() >= SHORT_ID_LEN {
            return Err(OpsgraphError::InvalidDeepLink(format!("unknown short link {}", id)));
        }
        let entity = URL_SAFE_NO_PAD
            .decode(id)
            .ok()
            .and_then(|bytes| String::from_utf8(bytes).ok())
            .and_then(|key| EntityReference::from_key(&key))
            .ok_or_else(|| OpsgraphError::InvalidDeepLink(format!("unknown short link {}", id)))?;
        Ok(ResolvedLink::bare(entity))
    }

    fn resolve_long(url: &Url) -> Result<ResolvedLink> {
        let mut entity_type = None;
        let mut entity_id = None;
        let mut filters = None;
        let mut context = None;

        for (key, value) in url.query_pairs() {
            match key.as_ref() {
                "type" => entity_type = Some(value.into_owned()),
                "id" => entity_id = Some(value.into_owned()),
                "filters" => filters = Some(parse_json_object("filters", &value)?),
                "context" => context = Some(parse_json_object("context", &value)?),
                _ => {}
            }
        }

        match (entity_type, entity_id) {
            (Some(t), Some(id)) if !t.is_empty() && !id.is_empty() => Ok(ResolvedLink {
                entity: EntityReference::new(t, id.clone(), id),
                filters,
                context,
            }),
            _ => Err(OpsgraphError::InvalidDeepLink(format!(
                "missing type or id in {}",
                url
            ))),
        }
    }
}

fn has_entity_query(url: &Url) -> bool {
    url.query_pairs().any(|(key, _)| key == "type")
        && url.query_pairs().any(|(key, _)| key == "id")
}

fn parse_json_object(field: &str, raw: &str) -> Result<Map<String, Value>> {
    match serde_json::from_str::<Value>(raw) {
        Ok(Value::Object(map)) => Ok(map),
        _ => Err(OpsgraphError::InvalidDeepLink(format!(
            "{} is not a JSON object",
            field
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const BASE: &str = "http://localhost:3000";

    fn codec() -> DeepLinkCodec {
        DeepLinkCodec::new(BASE, 16).unwrap()
    }

    #[test]
    fn test_long_form_round_trip() {
        let codec = codec();
        let entity = EntityReference::new("asset", "host 42/a&b", "Host 42");
        let mut filters = Map::new();
        filters.insert("status".to_string(), json!("open"));
        let config = DeepLinkConfig {
            short_link: false,
            filters: Some(filters.clone()),
            context: None,
        };

        let link = codec.generate_deep_link(&entity, &config).unwrap();
        assert!(link.url.starts_with("http://localhost:3000/entity?type=asset&id="));
        assert!(link.short_url.is_none());

        let resolved = codec.resolve_deep_link(&link.url).unwrap();
        assert_eq!(resolved.entity, entity);
        assert_eq!(resolved.entity.entity_id, "host 42/a&b");
        assert_eq!(resolved.filters, Some(filters));
        assert!(resolved.context.is_none());
    }

    #[test]
    fn test_short_link_resolves_from_cache() {
        let codec = codec();
        let entity = EntityReference::new("incident", "INC-1001", "Checkout outage");
        let config = DeepLinkConfig {
            short_link: true,
            ..Default::default()
        };

        let link = codec.generate_deep_link(&entity, &config).unwrap();
        let id = link.short_id.clone().unwrap();
        assert_eq!(id, "aW5jaWRl");
        assert_eq!(link.short_url.as_deref(), Some("http://localhost:3000/e/aW5jaWRl"));

        assert_eq!(codec.resolve_deep_link(&id).unwrap().entity, entity);
        assert_eq!(
            codec.resolve_deep_link(link.short_url.as_deref().unwrap()).unwrap().entity,
            entity
        );
        assert_eq!(codec.resolve_deep_link("/e/aW5jaWRl").unwrap().entity, entity);
    }

    #[test]
    fn test_short_key_decodes_without_cache() {
        let generator = codec();
        let entity = EntityReference::new("a", "b", "b");
        let link = generator
            .generate_deep_link(&entity, &DeepLinkConfig { short_link: true, ..Default::default() })
            .unwrap();
        assert_eq!(link.short_id.as_deref(), Some("YTpi"));

        let fresh = codec();
        assert_eq!(fresh.resolve_deep_link("YTpi").unwrap().entity, entity);
    }

    #[test]
    fn test_truncated_id_is_not_decoded_without_cache() {
        let generator = codec();
        let entity = EntityReference::new("team", "T1", "SRE");
        let link = generator
            .generate_deep_link(&entity, &DeepLinkConfig { short_link: true, ..Default::default() })
            .unwrap();
        let id = link.short_id.unwrap();
        assert_eq!(id, "dGVhbTpU");
        assert_eq!(generator.resolve_deep_link(&id).unwrap().entity, entity);

        let fresh = codec();
        assert!(fresh.resolve_deep_link(&id).is_none());
        assert!(fresh.resolve_deep_link(&format!("{}/e/{}", BASE, id)).is_none());
    }

    #[test]
    fn test_long_form_round_trip_under_e_base_path() {
        let codec = DeepLinkCodec::new("https://ops.example.com/e", 16).unwrap();
        let entity = EntityReference::new("incident", "I1", "I1");

        let link = codec.generate_deep_link(&entity, &DeepLinkConfig::default()).unwrap();
        assert_eq!(link.url, "https://ops.example.com/e/entity?type=incident&id=I1");
        assert_eq!(codec.resolve_deep_link(&link.url).unwrap().entity, entity);

        let short = codec
            .generate_deep_link(&entity, &DeepLinkConfig { short_link: true, ..Default::default() })
            .unwrap();
        assert_eq!(
            codec.resolve_deep_link(short.short_url.as_deref().unwrap()).unwrap().entity,
            entity
        );
    }

    #[test]
    fn test_collision_newest_wins() {
        let codec = codec();
        let config = DeepLinkConfig { short_link: true, ..Default::default() };
        let first = EntityReference::new("incident", "I1", "first");
        let second = EntityReference::new("incident", "I2", "second");

        let a = codec.generate_deep_link(&first, &config).unwrap();
        let b = codec.generate_deep_link(&second, &config).unwrap();
        assert_eq!(a.short_id, b.short_id);
        assert_eq!(codec.cached_short_links(), 1);

        let resolved = codec.resolve_deep_link(b.short_id.as_deref().unwrap()).unwrap();
        assert_eq!(resolved.entity, second);
    }

    #[test]
    fn test_relative_long_link() {
        let codec = codec();
        let resolved = codec
            .resolve_deep_link("/entity?type=service&id=S1&context=%7B%22from%22%3A%22graph%22%7D")
            .unwrap();
        assert_eq!(resolved.entity, EntityReference::new("service", "S1", "S1"));
        assert_eq!(resolved.context.unwrap()["from"], "graph");
    }

    #[test]
    fn test_invalid_links_resolve_to_none() {
        let codec = codec();
        assert!(codec.resolve_deep_link("").is_none());
        assert!(codec.resolve_deep_link("http://localhost:3000/entity?type=incident").is_none());
        assert!(codec.resolve_deep_link("http://localhost:3000/entity?type=&id=1").is_none());
        assert!(codec.resolve_deep_link("http://localhost:3000/somewhere/else").is_none());
        assert!(codec.resolve_deep_link("http://localhost:3000/e/zzzzzzzz").is_none());
        assert!(codec
            .resolve_deep_link("http://localhost:3000/entity?type=a&id=b&filters=notjson")
            .is_none());
        assert!(codec.resolve_deep_link("toolongforashortid").is_none());
    }

    #[test]
    fn test_base_url_with_path() {
        let codec = DeepLinkCodec::new("https://ops.example.com/app", 4).unwrap();
        let entity = EntityReference::new("team", "T1", "SRE");
        let link = codec
            .generate_deep_link(&entity, &DeepLinkConfig { short_link: true, ..Default::default() })
            .unwrap();
        assert!(link.url.starts_with("https://ops.example.com/app/entity?"));
        assert!(link.short_url.unwrap().starts_with("https://ops.example.com/app/e/"));
    }

    #[test]
    fn test_invalid_base_url_rejected() {
        assert!(matches!(
            DeepLinkCodec::new("not a url", 4),
            Err(OpsgraphError::Config(_))
        ));
    }
}
