use rusqlite::{params, Connection};
use std::fs;
use std::path::Path;
use crate::error::{OpsgraphError, Result};

/// One `NNN_name.sql` file from the migrations directory
#[derive(Debug)]
struct Migration {
    version: u32,
    name: String,
    sql: String,
}

fn ensure_migrations_table(conn: &Connection) -> Result<()> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS schema_migrations (
            version INTEGER PRIMARY KEY,
            name TEXT NOT NULL,
            applied_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP
        )",
        [],
    )?;
    Ok(())
}

/// Names of applied migrations, in version order
pub fn get_applied_migrations(conn: &Connection) -> Result<Vec<String>> {
    let mut stmt = conn.prepare("SELECT name FROM schema_migrations ORDER BY version")?;
    let names = stmt
        .query_map([], |row| row.get::<_, String>(0))?
        .collect::<std::result::Result<Vec<_>, rusqlite::Error>>()?;
    Ok(names)
}

/// Parse `001_entity_relationships.sql` into (1, "001_entity_relationships").
fn parse_migration_filename(filename: &str) -> Result<(u32, String)> {
    let stem = filename
        .strip_suffix(".sql")
        .ok_or_else(|| OpsgraphError::Config(format!("Not a migration file: {}", filename)))?;
    let (version, _) = stem
        .split_once('_')
        .ok_or_else(|| OpsgraphError::Config(format!("Invalid migration filename: {}", filename)))?;
    let version = version
        .parse()
        .map_err(|_| OpsgraphError::Config(format!("Invalid migration version: {}", version)))?;
    Ok((version, stem.to_string()))
}

fn load_migrations(migrations_dir: &Path) -> Result<Vec<Migration>> {
    let mut migrations = Vec::new();

    for entry in fs::read_dir(migrations_dir)? {
        let path = entry?.path();
        if path.extension().and_then(|s| s.to_str()) != Some("sql") {
            continue;
        }
        let filename = path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| OpsgraphError::Config("Invalid migration filename".to_string()))?;
        let (version, name) = parse_migration_filename(filename)?;
        let sql = fs::read_to_string(&path)?;
        migrations.push(Migration { version, name, sql });
    }

    migrations.sort_by_key(|m| m.version);
    Ok(migrations)
}

/// Apply every migration not yet recorded in `schema_migrations`, each in
/// its own transaction.
pub fn run_migrations(conn: &mut Connection, migrations_dir: &Path) -> Result<()> {
    ensure_migrations_table(conn)?;
    let applied = get_applied_migrations(conn)?;

    for migration in load_migrations(migrations_dir)? {
        if applied.contains(&migration.name) {
            log::debug!("Migration {} already applied, skipping", migration.name);
            continue;
        }

        log::info!("Applying migration: {} (version {})", migration.name, migration.version);
        let tx = conn.transaction()?;
        tx.execute_batch(&migration.sql).map_err(|e| {
            OpsgraphError::Config(format!("Failed to execute migration {}: {}", migration.name, e))
        })?;
        tx.execute(
            "INSERT INTO schema_migrations (version, name) VALUES (?1, ?2)",
            params![migration.version, migration.name],
        )?;
        tx.commit()?;
    }

    log::info!("All migrations completed");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_migration_tracking() {
        let temp_dir = TempDir::new().unwrap();
        let conn = Connection::open(temp_dir.path().join("test.db")).unwrap();

        ensure_migrations_table(&conn).unwrap();
        conn.execute(
            "INSERT INTO schema_migrations (version, name) VALUES (?1, ?2)",
            params![1, "001_test"],
        )
        .unwrap();

        let applied = get_applied_migrations(&conn).unwrap();
        assert_eq!(applied, vec!["001_test"]);
    }

    #[test]
    fn test_parse_migration_filename() {
        assert_eq!(
            parse_migration_filename("001_entity_relationships.sql").unwrap(),
            (1, "001_entity_relationships".to_string())
        );
        assert!(parse_migration_filename("entity.sql").is_err());
        assert!(parse_migration_filename("abc_entity.sql").is_err());
        assert!(parse_migration_filename("001_entity.txt").is_err());
    }

    #[test]
    fn test_load_migrations_sorted() {
        let temp_dir = TempDir::new().unwrap();
        let migrations_dir = temp_dir.path().join("migrations");
        fs::create_dir(&migrations_dir).unwrap();
        fs::write(migrations_dir.join("002_another.sql"), "CREATE TABLE another (id INTEGER);").unwrap();
        fs::write(migrations_dir.join("001_test.sql"), "CREATE TABLE test (id INTEGER);").unwrap();
        fs::write(migrations_dir.join("README.md"), "ignored").unwrap();

        let migrations = load_migrations(&migrations_dir).unwrap();
        assert_eq!(migrations.len(), 2);
        assert_eq!(migrations[0].version, 1);
        assert_eq!(migrations[1].name, "002_another");
    }

    #[test]
    fn test_failed_migration_is_not_recorded() {
        let temp_dir = TempDir::new().unwrap();
        let migrations_dir = temp_dir.path().join("migrations");
        fs::create_dir(&migrations_dir).unwrap();
        fs::write(migrations_dir.join("001_broken.sql"), "CREATE TABLE (;").unwrap();
        let mut conn = Connection::open(temp_dir.path().join("test.db")).unwrap();

        assert!(matches!(
            run_migrations(&mut conn, &migrations_dir),
            Err(OpsgraphError::Config(_))
        ));
        assert!(get_applied_migrations(&conn).unwrap().is_empty());
    }

    #[test]
    fn test_full_migration_schema() {
        let temp_dir = TempDir::new().unwrap();
        let mut conn = Connection::open(temp_dir.path().join("test.db")).unwrap();

        let migrations_dir = Path::new(env!("CARGO_MANIFEST_DIR")).join("migrations");
        run_migrations(&mut conn, &migrations_dir).unwrap();

        let tables: Vec<String> = conn
            .prepare("SELECT name FROM sqlite_master WHERE type='table' ORDER BY name")
            .unwrap()
            .query_map([], |row| row.get::<_, String>(0))
            .unwrap()
            .collect::<std::result::Result<Vec<_>, rusqlite::Error>>()
            .unwrap();
        assert!(tables.contains(&"entity_relationships".to_string()));
        assert!(tables.contains(&"schema_migrations".to_string()));

        let indexes: Vec<String> = conn
            .prepare("SELECT name FROM sqlite_master WHERE type='index' AND name LIKE 'idx_%'")
            .unwrap()
            .query_map([], |row| row.get::<_, String>(0))
            .unwrap()
            .collect::<std::result::Result<Vec<_>, rusqlite::Error>>()
            .unwrap();
        assert!(indexes.contains(&"idx_relationships_tenant_kind".to_string()));

        // Re-running is a no-op.
        run_migrations(&mut conn, &migrations_dir).unwrap();
        assert_eq!(get_applied_migrations(&conn).unwrap(), vec!["001_entity_relationships"]);
    }
}
