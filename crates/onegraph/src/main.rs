//! OneGraph command line entry point.
//!
//! `worker` runs the dequeuing indexing worker, `upload` pushes local
//! files through the upload-session protocol, and `constraints` applies
//! the Cypher constraint migrations.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::Ordering;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing::info;

use onegraph_indexer::{
    EmbeddingBatcher, GraphWriter, IndexingPipeline, SchemaValidator, UploadSessionManager,
    UploadedFile, Worker,
};
use onegraph_infrastructure::{
    AppConfig, FlatIndexProvider, HttpEmbeddingProvider, Neo4jGraphStore, RedisJobQueue,
    RedisJobStore, connect_redis, init_logging,
};

#[derive(Parser)]
#[command(name = "onegraph", version, about = "GraphRAG indexing service for 1C Enterprise sources")]
struct Cli {
    /// Configuration file (defaults to ./onegraph.toml).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the indexing worker.
    Worker,
    /// Upload local files into a collection and enqueue an index job.
    Upload {
        /// Target collection name.
        #[arg(long)]
        collection: String,
        /// Root directory for relative paths inside the upload.
        #[arg(long)]
        root: Option<PathBuf>,
        /// Files to upload.
        paths: Vec<PathBuf>,
    },
    /// Apply Cypher constraint migrations.
    Constraints {
        /// Migration file with `;`-separated statements.
        #[arg(long, default_value = "migrations/001_constraints.cypher")]
        path: PathBuf,
        /// Log the statements without executing them.
        #[arg(long)]
        dry_run: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = match &cli.config {
        Some(path) => AppConfig::load_from(path)?,
        None => AppConfig::load()?,
    };
    init_logging(&config.log_level)?;

    match cli.command {
        Command::Worker => run_worker(config).await,
        Command::Upload {
            collection,
            root,
            paths,
        } => run_upload(&config, &collection, root.as_deref(), &paths).await,
        Command::Constraints { path, dry_run } => run_constraints(&config, &path, dry_run).await,
    }
}

async fn run_worker(config: AppConfig) -> anyhow::Result<()> {
    let redis = connect_redis(&config.redis_url).await?;
    let job_store = Arc::new(RedisJobStore::new(
        redis.clone(),
        config.job_state_prefix.clone(),
    ));
    let queue = Arc::new(RedisJobQueue::new(redis, config.index_queue_name.clone()));

    let graph_store = Arc::new(
        Neo4jGraphStore::connect(
            &config.neo4j_uri,
            &config.neo4j_username,
            &config.neo4j_password,
            &config.neo4j_database,
        )
        .await?,
    );
    let embeddings = Arc::new(HttpEmbeddingProvider::new(
        &config.embedding_api_base,
        config.openai_api_key.as_deref(),
        &config.embedding_model,
    )?);
    let vector_index = Arc::new(FlatIndexProvider::new(
        config.indexes_dir.clone(),
        &config.faiss_index_filename,
        &config.faiss_metadata_filename,
    ));
    let validator = SchemaValidator::from_config(
        config.graph_schema_config.as_deref(),
        config.graph_schema_path.as_deref(),
    )?;

    let pipeline = Arc::new(IndexingPipeline::new(
        job_store.clone(),
        GraphWriter::new(
            graph_store,
            config.neo4j_node_batch_size,
            config.neo4j_edge_batch_size,
            config.neo4j_write_max_attempts,
            config.neo4j_write_backoff_sec,
        ),
        EmbeddingBatcher::new(
            embeddings,
            config.max_embedding_batch,
            config.embedding_retry_attempts,
            config.embedding_retry_backoff,
        ),
        vector_index,
        validator,
    ));

    let worker = Worker::new(queue, job_store, pipeline, config.workspace_dir.clone());
    let stop = worker.stop_flag();

    let mut terminate = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())?;
    let mut interrupt = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::interrupt())?;
    tokio::spawn(async move {
        tokio::select! {
            _ = terminate.recv() => {}
            _ = interrupt.recv() => {}
        }
        info!(event = "signal_received", service = "indexer");
        stop.store(true, Ordering::Relaxed);
    });

    worker.run().await;
    Ok(())
}

async fn run_upload(
    config: &AppConfig,
    collection: &str,
    root: Option<&Path>,
    paths: &[PathBuf],
) -> anyhow::Result<()> {
    anyhow::ensure!(!paths.is_empty(), "no files given");

    let redis = connect_redis(&config.redis_url).await?;
    let job_store = Arc::new(RedisJobStore::new(
        redis.clone(),
        config.job_state_prefix.clone(),
    ));
    let queue = Arc::new(RedisJobQueue::new(redis, config.index_queue_name.clone()));
    let manager = UploadSessionManager::new(
        config.workspace_dir.clone(),
        &config.upload_session_dirname,
        config.upload_session_batch_size,
        job_store,
        queue,
    );

    let session = manager.init(collection).await?;
    for batch in paths.chunks(session.batch_size) {
        let mut files = Vec::with_capacity(batch.len());
        for path in batch {
            let name = upload_name(path, root);
            let content = std::fs::read(path)
                .with_context(|| format!("cannot read {}", path.display()))?;
            files.push(UploadedFile { name, content });
        }
        manager.append_part(&session.upload_id, files).await?;
    }
    let completion = manager.complete(&session.upload_id).await?;
    info!(
        event = "upload_finished",
        job_id = %completion.job_id,
        collection = %collection,
        total_files = completion.total_files,
    );
    Ok(())
}

/// Relative name of an uploaded file, preserving structure under `root`.
fn upload_name(path: &Path, root: Option<&Path>) -> String {
    root.and_then(|root| path.strip_prefix(root).ok())
        .unwrap_or_else(|| Path::new(path.file_name().unwrap_or(path.as_os_str())))
        .to_string_lossy()
        .into_owned()
}

async fn run_constraints(config: &AppConfig, path: &Path, dry_run: bool) -> anyhow::Result<()> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("cannot read migration file {}", path.display()))?;
    let statements = load_statements(&content);
    anyhow::ensure!(!statements.is_empty(), "no statements found in {}", path.display());

    if dry_run {
        for statement in &statements {
            info!(event = "migration_dry_run", statement = %statement.replace('\n', " "));
        }
        return Ok(());
    }

    let store = Neo4jGraphStore::connect(
        &config.neo4j_uri,
        &config.neo4j_username,
        &config.neo4j_password,
        &config.neo4j_database,
    )
    .await?;
    for statement in &statements {
        info!(
            event = "migration_apply",
            statement = %statement.lines().next().unwrap_or(""),
        );
        onegraph_domain::ports::GraphStore::run_statement(&store, statement).await?;
    }
    info!(event = "migration_completed", statements = statements.len());
    Ok(())
}

/// Split a Cypher file into statements, skipping `//` comment lines.
fn load_statements(content: &str) -> Vec<String> {
    let mut buffer: Vec<&str> = Vec::new();
    let mut statements = Vec::new();

    for raw_line in content.lines() {
        let line = raw_line.trim();
        if line.is_empty() || line.starts_with("//") {
            continue;
        }
        buffer.push(raw_line.trim_end());
        if line.ends_with(';') {
            let statement = buffer.join("\n");
            let statement = statement.trim_end().trim_end_matches(';').trim_end();
            if !statement.is_empty() {
                statements.push(statement.to_owned());
            }
            buffer.clear();
        }
    }
    if !buffer.is_empty() {
        let statement = buffer.join("\n");
        let statement = statement.trim();
        if !statement.is_empty() {
            statements.push(statement.to_owned());
        }
    }
    statements
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn statements_split_on_semicolons_and_skip_comments() {
        let content = "// header\nCREATE CONSTRAINT a IF NOT EXISTS\nFOR (n:Module) REQUIRE n.guid IS UNIQUE;\n\nCREATE CONSTRAINT b IF NOT EXISTS\nFOR (n:Role) REQUIRE n.name IS UNIQUE\n";
        let statements = load_statements(content);
        assert_eq!(statements.len(), 2);
        assert!(statements[0].starts_with("CREATE CONSTRAINT a"));
        assert!(!statements[0].ends_with(';'));
        assert!(statements[1].contains("Role"));
    }

    #[test]
    fn shipped_migration_file_parses() {
        let content = include_str!("../../../migrations/001_constraints.cypher");
        let statements = load_statements(content);
        assert_eq!(statements.len(), 14);
        assert!(statements.iter().all(|s| s.contains("IF NOT EXISTS")));
    }

    #[test]
    fn upload_name_prefers_root_relative_paths() {
        let root = Path::new("/srv/export");
        assert_eq!(
            upload_name(Path::new("/srv/export/Catalogs/C/Module.bsl"), Some(root)),
            "Catalogs/C/Module.bsl"
        );
        assert_eq!(upload_name(Path::new("/tmp/other.bsl"), Some(root)), "other.bsl");
        assert_eq!(upload_name(Path::new("plain.txt"), None), "plain.txt");
    }
}
