use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use insight_core::agent::QueryAgent;
use insight_core::data::loader::load_store;
use insight_core::data::TableStore;
use insight_core::llm::{LlamaStackClient, LlmBackend, LlmConfig};
use insight_core::util::default_data_dir;
use insight_core::viz::Chart;
use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser, Debug)]
#[command(version, about = "Executive analytics agent over retail datasets")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Override the dataset directory (default: INSIGHT_DATA_DIR or ./data/sales_data)
    #[arg(long)]
    data_dir: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Environment doctor checks
    Doctor,
    /// Ask a single question and exit
    Ask {
        #[arg(long)]
        question: String,
        /// Skip code generation and use the narrative path only
        #[arg(long, default_value_t = false)]
        no_codegen: bool,
        /// Write the selected chart's Vega-Lite spec here
        #[arg(long)]
        chart_out: Option<PathBuf>,
    },
    /// Interactive session (:clear, :undo, :summary, :quit)
    Chat,
}

#[tokio::main]
async fn main() -> Result<()> {
    install_tracing();
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let data_dir = match &cli.data_dir {
        Some(dir) => dir.clone(),
        None => default_data_dir()?,
    };

    match cli.command {
        Commands::Doctor => cmd_doctor(&data_dir).await,
        Commands::Ask { question, no_codegen, chart_out } => {
            cmd_ask(&data_dir, &question, no_codegen, chart_out).await
        }
        Commands::Chat => cmd_chat(&data_dir).await,
    }
}

fn install_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt().with_env_filter(filter).init();
}

/// Dataset load failure is fatal: no query runs without the store.
fn load_datasets(data_dir: &Path) -> Result<TableStore> {
    load_store(data_dir)
        .with_context(|| format!("failed to load datasets from {}", data_dir.display()))
}

async fn make_agent(data_dir: &Path) -> Result<QueryAgent> {
    let store = load_datasets(data_dir)?;
    let cfg = LlmConfig::from_env();
    let model = cfg.model.clone();
    let backend = Arc::new(LlamaStackClient::new(cfg)?);
    Ok(QueryAgent::new(store, backend, model).await)
}

async fn cmd_doctor(data_dir: &Path) -> Result<()> {
    println!("Insight doctor:");
    println!(" - data dir: {}", data_dir.display());
    let store = load_datasets(data_dir)?;
    let datasets = [
        ("store_transactions", &store.store_transactions),
        ("product_sales", &store.product_sales),
        ("inventory_data", &store.inventory_data),
        ("customer_data", &store.customer_data),
        ("online_orders", &store.online_orders),
    ];
    for (name, table) in datasets {
        match table {
            Some(t) => println!(
                "   {} -> {} rows, {} columns",
                name,
                t.row_count(),
                t.column_count()
            ),
            None => println!("   {} -> missing", name),
        }
    }
    let cfg = LlmConfig::from_env();
    let backend = LlamaStackClient::new(cfg.clone())?;
    let ok = backend.probe().await;
    println!(
        " - LLM backend {} ({}) -> {}",
        cfg.api_url,
        cfg.model,
        if ok { "ok" } else { "unreachable" }
    );
    Ok(())
}

async fn cmd_ask(
    data_dir: &Path,
    question: &str,
    no_codegen: bool,
    chart_out: Option<PathBuf>,
) -> Result<()> {
    let mut agent = make_agent(data_dir).await?;
    let use_code_gen = if no_codegen { Some(false) } else { None };
    let (answer, chart) = agent.query(question, use_code_gen).await;
    println!("{answer}");
    report_chart(chart.as_ref(), chart_out.as_deref())?;
    Ok(())
}

async fn cmd_chat(data_dir: &Path) -> Result<()> {
    let mut agent = make_agent(data_dir).await?;
    println!("Insight chat. Ask a question, or :clear, :undo, :summary, :quit.");
    let stdin = io::stdin();
    loop {
        print!("insight> ");
        io::stdout().flush()?;
        let mut line = String::new();
        if stdin.lock().read_line(&mut line)? == 0 {
            break;
        }
        let line = line.trim();
        match line {
            "" => continue,
            ":quit" | ":q" => break,
            ":clear" => {
                agent.clear_conversation();
                println!("Conversation cleared.");
            }
            ":undo" => {
                if agent.undo_last_query() {
                    println!("Last exchange removed.");
                } else {
                    println!("Nothing to undo.");
                }
            }
            ":summary" => match agent.conversation_summary() {
                Some(s) => println!(
                    "{} messages over {} (started {}, model {})",
                    s.message_count, s.session_duration, s.session_start, s.model
                ),
                None => println!("No session summary available."),
            },
            question => {
                let (answer, chart) = agent.query(question, None).await;
                println!("{answer}");
                report_chart(chart.as_ref(), None)?;
            }
        }
    }
    Ok(())
}

fn report_chart(chart: Option<&Chart>, out: Option<&Path>) -> Result<()> {
    let Some(chart) = chart else {
        return Ok(());
    };
    match out {
        Some(path) => {
            std::fs::write(path, serde_json::to_vec_pretty(&chart.spec)?)?;
            println!("Chart spec ({}) written to {}", chart.title, path.display());
        }
        None => println!(
            "[chart available: {}; pass --chart-out to save the Vega-Lite spec]",
            chart.title
        ),
    }
    Ok(())
}
