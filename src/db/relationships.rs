//! Relationship persistence: bulk load for a session, bulk insert for imports.

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, Row};
use serde_json::{Map, Value};

use crate::db::Db;
use crate::entity::{EntityReference, EntityRelationship};
use crate::error::{OpsgraphError, Result};

/// Columns as stored; converted to domain types after the query so a bad row
/// fails the whole load.
struct RelationshipRow {
    id: String,
    from_type: String,
    from_id: String,
    from_name: String,
    from_status: Option<String>,
    from_metadata_json: Option<String>,
    to_type: String,
    to_id: String,
    to_name: String,
    to_status: Option<String>,
    to_metadata_json: Option<String>,
    relationship_type: String,
    strength: String,
    direction: String,
    metadata_json: Option<String>,
    created_at: String,
    valid_until: Option<String>,
}

impl RelationshipRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            from_type: row.get(1)?,
            from_id: row.get(2)?,
            from_name: row.get(3)?,
            from_status: row.get(4)?,
            from_metadata_json: row.get(5)?,
            to_type: row.get(6)?,
            to_id: row.get(7)?,
            to_name: row.get(8)?,
            to_status: row.get(9)?,
            to_metadata_json: row.get(10)?,
            relationship_type: row.get(11)?,
            strength: row.get(12)?,
            direction: row.get(13)?,
            metadata_json: row.get(14)?,
            created_at: row.get(15)?,
            valid_until: row.get(16)?,
        })
    }

    fn into_relationship(self) -> Result<EntityRelationship> {
        let from_entity = build_entity(
            self.from_type,
            self.from_id,
            self.from_name,
            self.from_status,
            self.from_metadata_json.as_deref(),
        )?;
        let to_entity = build_entity(
            self.to_type,
            self.to_id,
            self.to_name,
            self.to_status,
            self.to_metadata_json.as_deref(),
        )?;

        Ok(EntityRelationship {
            id: self.id,
            from_entity,
            to_entity,
            relationship_type: self.relationship_type.parse()?,
            strength: self.strength.parse()?,
            direction: self.direction.parse()?,
            metadata: parse_metadata(self.metadata_json.as_deref())?,
            created_at: parse_timestamp(&self.created_at)?,
            valid_until: self.valid_until.as_deref().map(parse_timestamp).transpose()?,
        })
    }
}

fn build_entity(
    entity_type: String,
    entity_id: String,
    display_name: String,
    status: Option<String>,
    metadata_json: Option<&str>,
) -> Result<EntityReference> {
    let mut entity = EntityReference::new(entity_type, entity_id, display_name);
    entity.status = status;
    entity.metadata = parse_metadata(metadata_json)?;
    Ok(entity)
}

fn parse_metadata(raw: Option<&str>) -> Result<Option<Map<String, Value>>> {
    raw.map(|s| serde_json::from_str::<Map<String, Value>>(s))
        .transpose()
        .map_err(OpsgraphError::from)
}

fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| OpsgraphError::InvalidInput(format!("Invalid timestamp '{}': {}", raw, e)))
}

fn metadata_json(metadata: &Option<Map<String, Value>>) -> Result<Option<String>> {
    metadata
        .as_ref()
        .map(|m| serde_json::to_string(m))
        .transpose()
        .map_err(OpsgraphError::from)
}

/// All relationships of `kind` for `tenant`, in insertion order.
pub fn load_all_with(conn: &Connection, kind: &str, tenant: &str) -> Result<Vec<EntityRelationship>> {
    let mut stmt = conn.prepare(
        r#"
        SELECT id, from_type, from_id, from_name, from_status, from_metadata_json,
               to_type, to_id, to_name, to_status, to_metadata_json,
               relationship_type, strength, direction, metadata_json,
               created_at, valid_until
        FROM entity_relationships
        WHERE kind = ?1 AND tenant = ?2
        ORDER BY seq
        "#,
    )?;
    let rows = stmt
        .query_map(params![kind, tenant], RelationshipRow::from_row)?
        .collect::<std::result::Result<Vec<_>, rusqlite::Error>>()?;

    rows.into_iter()
        .map(RelationshipRow::into_relationship)
        .collect()
}

/// Insert relationships in one transaction. Returns the number of rows written.
pub fn insert_relationships_with(
    conn: &mut Connection,
    kind: &str,
    tenant: &str,
    relationships: &[EntityRelationship],
) -> Result<usize> {
    let tx = conn.transaction()?;
    {
        let mut stmt = tx.prepare(
            r#"
            INSERT INTO entity_relationships (
                id, tenant, kind,
                from_type, from_id, from_name, from_status, from_metadata_json,
                to_type, to_id, to_name, to_status, to_metadata_json,
                relationship_type, strength, direction, metadata_json,
                created_at, valid_until
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18, ?19)
            "#,
        )?;

        for rel in relationships {
            let from = &rel.from_entity;
            let to = &rel.to_entity;
            stmt.execute(params![
                rel.id,
                tenant,
                kind,
                from.entity_type,
                from.entity_id,
                from.display_name,
                from.status,
                metadata_json(&from.metadata)?,
                to.entity_type,
                to.entity_id,
                to.display_name,
                to.status,
                metadata_json(&to.metadata)?,
                rel.relationship_type.as_str(),
                rel.strength.as_str(),
                rel.direction.as_str(),
                metadata_json(&rel.metadata)?,
                rel.created_at.to_rfc3339(),
                rel.valid_until.map(|t| t.to_rfc3339()),
            ])?;
        }
    }
    tx.commit()?;
    Ok(relationships.len())
}

pub async fn load_all(db: &Db, kind: &str, tenant: &str) -> Result<Vec<EntityRelationship>> {
    let kind = kind.to_string();
    let tenant = tenant.to_string();
    db.with_connection(move |conn| load_all_with(conn, &kind, &tenant))
        .await
}

pub async fn insert_relationships(
    db: &Db,
    kind: &str,
    tenant: &str,
    relationships: Vec<EntityRelationship>,
) -> Result<usize> {
    let kind = kind.to_string();
    let tenant = tenant.to_string();
    let count = db
        .with_connection(move |conn| insert_relationships_with(conn, &kind, &tenant, &relationships))
        .await?;
    log::info!("Inserted {} relationships", count);
    Ok(count)
}
