use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use opsgraph::db::{migrate, relationships, Db};
use opsgraph::entity::{EntityReference, EntityRelationship};
use opsgraph::graph::{PathType, SortBy};
use opsgraph::links::DeepLinkConfig;
use opsgraph::{api, Config, Session};
use serde::Serialize;
use std::path::{Path, PathBuf};

#[derive(Parser, Debug)]
#[command(name = "opsgraph")]
#[command(version, about = "Entity relationship graph, traceability and navigation engine")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Serve the JSON HTTP API
    Serve {
        /// Override http_server.port
        #[arg(short, long)]
        port: Option<u16>,
    },
    /// Import relationships from a JSON array file
    Import { file: PathBuf },
    /// Entities related to an entity (type:id)
    Related {
        entity: String,
        #[arg(long)]
        max_distance: Option<usize>,
        #[arg(long)]
        limit: Option<usize>,
        #[arg(long)]
        sort_by: Option<SortBy>,
    },
    /// Traceability path between two entities (type:id)
    Path {
        from: String,
        to: String,
        #[arg(long, default_value = "shortest")]
        path_type: PathType,
    },
    /// Visualization graph around an entity (type:id)
    Graph {
        entity: String,
        #[arg(long)]
        depth: Option<usize>,
    },
    /// Generate a deep link for an entity (type:id)
    Link {
        entity: String,
        #[arg(long)]
        short: bool,
    },
    /// Resolve a deep link
    Resolve { link: String },
    /// Run migrations and verify the database schema
    Verify,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = Config::load()?;

    // RUST_LOG wins over opsgraph.log_level
    env_logger::Builder::from_env(
        env_logger::Env::default().filter_or("RUST_LOG", config.opsgraph.log_level.as_str()),
    )
    .init();

    match cli.command.unwrap_or(Command::Verify) {
        Command::Serve { port } => run_server(config, port).await,
        Command::Import { file } => run_import(config, &file).await,
        Command::Related {
            entity,
            max_distance,
            limit,
            sort_by,
        } => {
            let session = load_session(config).await?;
            let origin = lookup(&session, &entity)?;
            let mut options = session.default_options();
            if let Some(max_distance) = max_distance {
                options = options.with_max_distance(max_distance);
            }
            if let Some(limit) = limit {
                options = options.with_limit(limit);
            }
            if let Some(sort_by) = sort_by {
                options = options.with_sort(sort_by);
            }
            print_json(&session.related_entities(&origin, &options)?)
        }
        Command::Path { from, to, path_type } => {
            let session = load_session(config).await?;
            let from = lookup(&session, &from)?;
            let to = lookup(&session, &to)?;
            print_json(&session.find_path(&from, &to, path_type))
        }
        Command::Graph { entity, depth } => {
            let mut session = load_session(config).await?;
            let center = lookup(&session, &entity)?;
            print_json(session.build_graph(&center, depth))
        }
        Command::Link { entity, short } => {
            let session = Session::new(config)?;
            let entity = parse_entity(&entity)?;
            let link_config = DeepLinkConfig {
                short_link: short,
                ..Default::default()
            };
            print_json(&session.links().generate_deep_link(&entity, &link_config)?)
        }
        Command::Resolve { link } => {
            let session = Session::new(config)?;
            let resolved = session
                .links()
                .resolve_deep_link(&link)
                .with_context(|| format!("Link could not be resolved: {}", link))?;
            print_json(&resolved)
        }
        Command::Verify => run_schema_verification(config).await,
    }
}

fn parse_entity(key: &str) -> Result<EntityReference> {
    EntityReference::from_key(key).with_context(|| format!("Expected type:id, got '{}'", key))
}

fn lookup(session: &Session, key: &str) -> Result<EntityReference> {
    let entity = parse_entity(key)?;
    Ok(session.resolve_entity(&entity.entity_type, &entity.entity_id))
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

async fn open_db(config: &Config) -> Result<Db> {
    let db = Db::new(config.db_path());
    let migrations_dir = Path::new("migrations");
    db.with_connection(|conn| migrate::run_migrations(conn, migrations_dir))
        .await
        .context("Failed to run migrations")?;
    Ok(db)
}

async fn load_session(config: Config) -> Result<Session> {
    let db = open_db(&config).await?;
    let mut session = Session::new(config)?;
    session.load(&db).await?;
    Ok(session)
}

async fn run_server(config: Config, port: Option<u16>) -> Result<()> {
    log::info!("Starting opsgraph v{}", env!("CARGO_PKG_VERSION"));
    let port = port.unwrap_or(config.http_server.port);
    let allowed_origins = config.http_server.allowed_origins.clone();

    let session = load_session(config).await?;
    api::serve(session.into_shared(), port, &allowed_origins).await?;
    Ok(())
}

async fn run_import(config: Config, file: &Path) -> Result<()> {
    let raw = std::fs::read_to_string(file)
        .with_context(|| format!("Failed to read {}", file.display()))?;
    let rels: Vec<EntityRelationship> = serde_json::from_str(&raw)
        .with_context(|| format!("Failed to parse relationships in {}", file.display()))?;

    let db = open_db(&config).await?;
    let count = relationships::insert_relationships(
        &db,
        &config.opsgraph.relationship_kind,
        &config.opsgraph.tenant,
        rels,
    )
    .await?;
    log::info!(
        "Imported {} relationships for tenant {}",
        count,
        config.opsgraph.tenant
    );
    Ok(())
}

/// Check tables, pragmas and integrity of the configured database
async fn run_schema_verification(config: Config) -> Result<()> {
    log::info!("Database path: {}", config.db_path().display());
    let db = open_db(&config).await?;

    let relationship_count = db
        .with_connection(|conn| {
            let tables: Vec<String> = conn
                .prepare("SELECT name FROM sqlite_master WHERE type='table' ORDER BY name")?
                .query_map([], |row| row.get::<_, String>(0))?
                .collect::<std::result::Result<Vec<_>, rusqlite::Error>>()?;
            for table in ["entity_relationships", "schema_migrations"] {
                if !tables.iter().any(|t| t == table) {
                    return Err(opsgraph::OpsgraphError::Config(format!("Missing table: {}", table)));
                }
                log::debug!("Table exists: {}", table);
            }

            let journal_mode: String = conn.query_row("PRAGMA journal_mode", [], |row| row.get(0))?;
            if !journal_mode.eq_ignore_ascii_case("wal") {
                return Err(opsgraph::OpsgraphError::Config(format!(
                    "Journal mode is not WAL: {}",
                    journal_mode
                )));
            }

            let integrity: String = conn.query_row("PRAGMA integrity_check", [], |row| row.get(0))?;
            if integrity != "ok" {
                return Err(opsgraph::OpsgraphError::Config(format!(
                    "Database integrity check failed: {}",
                    integrity
                )));
            }

            let count: i64 =
                conn.query_row("SELECT COUNT(*) FROM entity_relationships", [], |row| row.get(0))?;
            Ok(count)
        })
        .await?;

    log::info!(
        "Database schema verified: {} stored relationships",
        relationship_count
    );
    Ok(())
}
