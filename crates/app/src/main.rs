use anyhow::Context;
use chrono::Utc;
use clap::{Args, Parser, Subcommand};
use memory_recall_core::{
    export_memories, import_memories, ingest_text, parse_export, project_name, render_context,
    HookInput, IngestRequest, MemoryStore, MemorySummary, RankingWeights, RecallConfig,
    SearchCoordinator, SearchOptions, SearchResult, SqliteMemoryStore, SynonymExpander,
};
use serde_json::json;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::AsyncReadExt;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "memory-recall", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// SQLite database file (defaults to ~/.memory-recall/memory.db)
    #[arg(long, env = "MEMORY_RECALL_DB", global = true)]
    db: Option<PathBuf>,

    /// Project label for ranking affinity and as the default memory source
    #[arg(long, env = "MEMORY_RECALL_PROJECT", global = true)]
    project: Option<String>,

    #[command(flatten)]
    weights: WeightArgs,
}

/// Overrides for the ranking weights.
#[derive(Args)]
struct WeightArgs {
    #[arg(long, global = true)]
    weight_lexical: Option<f64>,
    #[arg(long, global = true)]
    weight_recency: Option<f64>,
    #[arg(long, global = true)]
    weight_frequency: Option<f64>,
    #[arg(long, global = true)]
    weight_tags: Option<f64>,
    #[arg(long, global = true)]
    weight_project: Option<f64>,
}

impl WeightArgs {
    fn apply(&self, base: RankingWeights) -> RankingWeights {
        RankingWeights {
            lexical: self.weight_lexical.unwrap_or(base.lexical),
            recency: self.weight_recency.unwrap_or(base.recency),
            frequency: self.weight_frequency.unwrap_or(base.frequency),
            tags: self.weight_tags.unwrap_or(base.tags),
            project: self.weight_project.unwrap_or(base.project),
        }
    }
}

#[derive(Subcommand)]
enum Command {
    /// Create the database if needed and report how many memories it holds.
    Init,
    /// Chunk and store a piece of information.
    Store {
        /// The information to remember.
        #[arg(long)]
        content: String,
        /// Categorical tag; repeat for several.
        #[arg(long = "tag")]
        tags: Vec<String>,
        /// Origin label; defaults to the current project.
        #[arg(long)]
        source: Option<String>,
    },
    /// Search stored memories.
    Search {
        /// Natural language query.
        #[arg(long)]
        query: String,
        /// Tags that boost matching memories; repeat for several.
        #[arg(long = "tag")]
        tags: Vec<String>,
        /// Maximum number of results.
        #[arg(long)]
        limit: Option<usize>,
        /// Minimum final score a result must reach.
        #[arg(long)]
        min_score: Option<f64>,
        /// Print the per-signal score breakdown.
        #[arg(long, default_value_t = false)]
        explain: bool,
    },
    /// Delete a memory by id.
    Delete {
        #[arg(long)]
        id: i64,
    },
    /// List stored memories, newest first.
    List {
        /// Only memories carrying any of these tags.
        #[arg(long = "tag")]
        tags: Vec<String>,
        #[arg(long, default_value = "20")]
        limit: usize,
        #[arg(long, default_value = "0")]
        offset: usize,
    },
    /// Read a prompt-submit hook payload from stdin and print recalled context.
    Hook,
    /// Export all memories as JSON.
    Export {
        /// Output file; stdout when omitted.
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// Import memories from an export file, skipping exact duplicates.
    Import {
        #[arg(long)]
        file: PathBuf,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env())
        .with(fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    let db_path = resolve_db_path(cli.db.clone())?;
    let config = RecallConfig {
        weights: cli.weights.apply(RankingWeights::default()),
        ..RecallConfig::default()
    };

    info!(
        version = env!("CARGO_PKG_VERSION"),
        started_at = %Utc::now().to_rfc3339(),
        db = %db_path.display(),
        "memory-recall boot"
    );

    match cli.command {
        Command::Init => {
            let store = SqliteMemoryStore::open(&db_path)?;
            let count = store.count().await?;
            println!("database ready at {} ({count} memories)", db_path.display());
        }
        Command::Store {
            content,
            tags,
            source,
        } => {
            let store = SqliteMemoryStore::open(&db_path)?;
            let request = IngestRequest {
                tags,
                source: source.or_else(|| current_project(cli.project.clone())),
                ..IngestRequest::new(content)
            };
            let report = ingest_text(&store, request, config.chunking).await?;
            println!(
                "{}",
                serde_json::to_string(&json!({
                    "status": "stored",
                    "chunks": report.chunks.len(),
                    "details": report.chunks,
                }))?
            );
        }
        Command::Search {
            query,
            tags,
            limit,
            min_score,
            explain,
        } => {
            let coordinator = open_coordinator(&db_path, &config)?;
            let mut options = config.search_options(query);
            options.tags = tags;
            options.limit = limit.unwrap_or(options.limit);
            options.min_score = min_score.unwrap_or(options.min_score);
            options.project = current_project(cli.project.clone());

            if explain {
                run_explained_search(&coordinator, &options).await?;
            } else {
                print_results(&coordinator.search(&options).await.into_results())?;
            }
        }
        Command::Delete { id } => {
            let store = SqliteMemoryStore::open(&db_path)?;
            if store.delete(id).await? {
                println!("Memory #{id} deleted.");
            } else {
                println!("Memory #{id} not found.");
            }
        }
        Command::List {
            tags,
            limit,
            offset,
        } => {
            let store = SqliteMemoryStore::open(&db_path)?;
            let summaries: Vec<MemorySummary> = store
                .list(limit, offset, &tags)
                .await?
                .into_iter()
                .map(|memory| MemorySummary::from_memory(memory, config.list_preview_chars))
                .collect();

            if summaries.is_empty() {
                println!("No memories stored yet.");
            } else {
                println!("{}", serde_json::to_string_pretty(&summaries)?);
            }
        }
        Command::Hook => run_hook(&db_path, cli.project.clone(), &config).await?,
        Command::Export { out } => {
            let store = SqliteMemoryStore::open(&db_path)?;
            let document = export_memories(&store).await?;
            let rendered = serde_json::to_string_pretty(&document)? + "\n";
            match out {
                Some(path) => {
                    tokio::fs::write(&path, rendered)
                        .await
                        .with_context(|| format!("writing export to {}", path.display()))?;
                    eprintln!("exported {} memories to {}", document.count, path.display());
                }
                None => print!("{rendered}"),
            }
        }
        Command::Import { file } => {
            let raw = tokio::fs::read_to_string(&file)
                .await
                .with_context(|| format!("reading {}", file.display()))?;
            let document = parse_export(&raw)
                .with_context(|| format!("{} is not a valid export file", file.display()))?;
            let store = SqliteMemoryStore::open(&db_path)?;
            let report = import_memories(&store, document).await?;
            println!(
                "Import complete: {} added, {} duplicates skipped.",
                report.imported, report.skipped
            );
        }
    }

    Ok(())
}

fn resolve_db_path(explicit: Option<PathBuf>) -> anyhow::Result<PathBuf> {
    if let Some(path) = explicit {
        return Ok(path);
    }
    let home = dirs::home_dir().context("cannot determine home directory; pass --db")?;
    Ok(home.join(".memory-recall").join("memory.db"))
}

fn current_project(explicit: Option<String>) -> Option<String> {
    explicit.or_else(|| {
        let cwd = std::env::current_dir().ok()?;
        project_name(&cwd, dirs::home_dir().as_deref())
    })
}

fn open_coordinator(
    db_path: &Path,
    config: &RecallConfig,
) -> anyhow::Result<SearchCoordinator<SqliteMemoryStore>> {
    let store = SqliteMemoryStore::open(db_path)?;
    Ok(SearchCoordinator::with_config(
        store,
        Arc::new(SynonymExpander::curated()),
        config,
    ))
}

fn print_results(results: &[SearchResult]) -> anyhow::Result<()> {
    if results.is_empty() {
        println!("No relevant memories found.");
    } else {
        println!("{}", serde_json::to_string_pretty(results)?);
    }
    Ok(())
}

async fn run_explained_search(
    coordinator: &SearchCoordinator<SqliteMemoryStore>,
    options: &SearchOptions,
) -> anyhow::Result<()> {
    let scored = match coordinator.search_scored(options).await {
        Ok(scored) => scored,
        Err(error) => {
            warn!(%error, "memory retrieval failed");
            Vec::new()
        }
    };

    let explanations: Vec<String> = scored
        .iter()
        .map(|item| {
            let signals = item.signals;
            format!(
                "explain: id={} raw_lexical={:.4} lexical={:.3} recency={:.3} frequency={:.3} tags={:.3} project={:.1} final={:.3}",
                item.memory().id,
                item.candidate.lexical_score,
                signals.lexical,
                signals.recency,
                signals.frequency,
                signals.tags,
                signals.project,
                item.score,
            )
        })
        .collect();

    let results: Vec<SearchResult> = scored.into_iter().map(SearchResult::from).collect();
    print_results(&results)?;

    let weights = coordinator.weights();
    println!(
        "explain: weights lexical={:.2} recency={:.2} frequency={:.2} tags={:.2} project={:.2}",
        weights.lexical, weights.recency, weights.frequency, weights.tags, weights.project
    );
    for line in explanations {
        println!("{line}");
    }
    Ok(())
}

/// Prints nothing unless memories were recalled; the host injects stdout
/// verbatim into the conversation.
async fn run_hook(
    db_path: &Path,
    project: Option<String>,
    config: &RecallConfig,
) -> anyhow::Result<()> {
    let mut raw = String::new();
    tokio::io::stdin().read_to_string(&mut raw).await?;

    let input = HookInput::parse(&raw);
    if input.prompt.trim().is_empty() || !db_path.exists() {
        return Ok(());
    }

    let project = input
        .cwd
        .as_deref()
        .and_then(|cwd| project_name(Path::new(cwd), dirs::home_dir().as_deref()))
        .or(project);

    let coordinator = open_coordinator(db_path, config)?;
    let options = config.hook_options(input.prompt, project);
    let results = coordinator.search(&options).await.into_results();

    if let Some(context) = render_context(&results) {
        print!("{context}");
    }
    Ok(())
}
