use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use clap::{ArgAction, Parser, Subcommand};
use tokio::runtime::Runtime;
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::EnvFilter;

use decor_core::{
    format_rupiah, price_difference, AssistantTask, ConversationTurn, PriceItem, PricingCatalog,
};
use decor_llm::AttemptCounter;
use decor_rag::{seed_directory, Assistant, AssistantConfig, EmbeddingClient, VectorStore};

const VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Parser, Debug)]
#[command(name = "decor", version = VERSION, about = "Interior pricing assistant CLI")]
struct Cli {
    /// TOML configuration file (defaults to $DECOR_CONFIG, then decor.toml).
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Knowledge-base database; overrides the config file and $RAG_DB.
    #[arg(long = "rag-db", global = true)]
    rag_db: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Embed every .txt/.json file of a directory into the knowledge base.
    Seed {
        #[arg(default_value = "rag_data")]
        dir: PathBuf,
        #[arg(long, action = ArgAction::SetTrue)]
        reset: bool,
    },
    /// Nearest passages for a query, as JSON.
    Search {
        query: String,
        #[arg(long)]
        limit: Option<usize>,
    },
    /// The system context the model would receive for a query.
    Context {
        query: String,
        #[arg(long)]
        limit: Option<usize>,
    },
    /// One chat turn through the full pipeline.
    Ask {
        message: String,
        /// JSON array of {"role", "text"} turns.
        #[arg(long)]
        history: Option<PathBuf>,
    },
    /// Static price catalog with in-city/out-of-city differences.
    Catalog {
        #[arg(long, action = ArgAction::SetTrue)]
        json: bool,
    },
}

fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();
    let mut config = AssistantConfig::resolve(cli.config.as_deref())?;
    if let Some(db) = cli.rag_db {
        config.rag_db = db;
    }
    config.validate()?;

    match cli.command {
        Commands::Seed { dir, reset } => {
            let store = VectorStore::new(&config.rag_db);
            let embedder = EmbeddingClient::from_settings(&config.embedding)?;
            let report = seed_directory(&store, &embedder, &dir, reset)?;
            for file in &report.files {
                println!("{:<32} {:>5} chunks", file.file, file.chunks);
            }
            println!(
                "stored {} chunks in {}",
                report.total,
                config.rag_db.display()
            );
        }
        Commands::Search { query, limit } => {
            let assistant = Assistant::from_config(&config);
            let limit = limit.unwrap_or(config.retrieval_limit);
            let passages = runtime()?.block_on(async {
                assistant
                    .gateway()
                    .search(&query, limit, &CancellationToken::new())
                    .await
            });
            println!("{}", serde_json::to_string_pretty(&passages)?);
        }
        Commands::Context { query, limit } => {
            let assistant = Assistant::from_config(&config);
            let limit = limit.unwrap_or(config.retrieval_limit);
            let context = runtime()?.block_on(async {
                assistant
                    .context_for(&query, limit, &CancellationToken::new())
                    .await
            });
            println!("{}", context.as_str());
        }
        Commands::Ask { message, history } => {
            let history = match history {
                Some(path) => load_history(&path)?,
                None => Vec::new(),
            };
            let assistant = Assistant::from_config(&config);
            let counter = AttemptCounter::new();
            let task = AssistantTask::Chat { message };
            let reply = runtime()?.block_on(async {
                assistant
                    .respond(&task, &history, &counter, &CancellationToken::new())
                    .await
            })?;
            info!(model = %reply.model, attempts = reply.attempts, "answered");
            println!("{}", reply.text);
        }
        Commands::Catalog { json } => {
            let catalog = PricingCatalog::builtin();
            if json {
                println!("{}", serde_json::to_string_pretty(&catalog)?);
            } else {
                print_catalog(&catalog);
            }
        }
    }
    Ok(())
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

fn runtime() -> Result<Runtime> {
    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to start async runtime")
}

fn load_history(path: &Path) -> Result<Vec<ConversationTurn>> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("failed to read history {}", path.display()))?;
    serde_json::from_str(&raw).map_err(|e| anyhow!("invalid history {}: {e}", path.display()))
}

fn print_catalog(catalog: &PricingCatalog) {
    println!("Material");
    for item in catalog.all_materials() {
        println!("  {}", material_line(item));
    }
    println!("\nAturan");
    for rule in &catalog.rules {
        println!(
            "  {:<28} dalam {:>14}  luar {:>14}  {}",
            rule.title,
            format_rupiah(rule.cost_in as f64),
            format_rupiah(rule.cost_out as f64),
            rule.impact
        );
    }
}

fn material_line(item: &PriceItem) -> String {
    let diff = price_difference(item.price_in, item.price_out);
    let delta = if diff.is_same {
        "sama".to_string()
    } else {
        format!("+{} ({}%)", format_rupiah(diff.diff as f64), diff.percent)
    };
    format!(
        "{:<28} {:>14} {:>14} /{:<4} {}",
        item.item,
        format_rupiah(item.price_in as f64),
        format_rupiah(item.price_out as f64),
        item.unit,
        delta
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;
    use decor_core::Role;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn global_options_follow_subcommands() {
        let cli = Cli::try_parse_from([
            "decor",
            "search",
            "kitchen set",
            "--limit",
            "2",
            "--rag-db",
            "/tmp/kb.sqlite",
        ])
        .unwrap();
        assert_eq!(cli.rag_db, Some(PathBuf::from("/tmp/kb.sqlite")));
        match cli.command {
            Commands::Search { query, limit } => {
                assert_eq!(query, "kitchen set");
                assert_eq!(limit, Some(2));
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn material_lines_show_out_of_city_markup() {
        let catalog = PricingCatalog::builtin();
        let lines: Vec<String> = catalog.all_materials().into_iter().map(material_line).collect();
        assert_eq!(lines.len(), 7);
        assert!(lines[0].starts_with("Kitchen Set Aluminium"));
        assert!(lines.iter().any(|line| line.contains('%')));
    }

    #[test]
    fn history_file_normalises_roles() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("history.json");
        fs::write(
            &path,
            r#"[{"role":"user","text":"harga?"},{"role":"model","text":"Rp 3,5 juta"}]"#,
        )
        .unwrap();
        let history = load_history(&path).unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[1].role, Role::Assistant);
        assert!(load_history(&dir.path().join("missing.json")).is_err());
    }
}
