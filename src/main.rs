mod api;
mod config;
mod db;
mod error;
mod generation;
mod types;
mod velocity;

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

use chrono::Utc;
use clap::{Parser, Subcommand};
use tokio::io::BufReader;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use crate::api::health::HealthState;
use crate::api::routes::{router, ApiState};
use crate::config::{Config, LogFormat, ModelClientKind};
use crate::db::{ingest_lines, SampleStore};
use crate::error::Result;
use crate::generation::{create_ideas, ClaudeClient, IdeaModelClient, IdeaRequest, StubModelClient};
use crate::types::{AnalysisParams, TraceId};
use crate::velocity::VelocityAnalyzer;

#[derive(Parser)]
#[command(name = "velocity", version, about = "Trending video velocity analysis")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the periodic analyzer and the HTTP API
    Serve,

    /// Rank the fastest-growing videos in the recent window
    Analyze {
        /// Lookback window in hours
        #[arg(long)]
        window: Option<u32>,
        /// Number of videos to keep
        #[arg(long)]
        top_n: Option<usize>,
        /// Write the report here instead of stdout
        #[arg(long)]
        out_file: Option<PathBuf>,
    },

    /// Generate titles, tags and a script for trend keywords
    GenerateIdeas {
        #[arg(long, num_args = 1.., required = true)]
        keywords: Vec<String>,
        #[arg(long)]
        video_id: Option<String>,
        #[arg(long)]
        views_per_min: Option<f64>,
        #[arg(long, default_value = "info")]
        tone: String,
        #[arg(long)]
        output: Option<PathBuf>,
    },

    /// Load JSON-lines collector output and record a snapshot per video
    Ingest {
        /// Read from this file instead of stdin
        #[arg(long)]
        file: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let cfg = match Config::from_env() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Config error: {e}");
            std::process::exit(1);
        }
    };

    init_tracing(&cfg);

    if let Err(e) = run(cli.command, cfg).await {
        match e.trace_id() {
            Some(trace_id) => error!(trace_id, "Fatal error: {e}"),
            None => error!("Fatal error: {e}"),
        }
        std::process::exit(1);
    }
}

fn init_tracing(cfg: &Config) {
    let builder = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(&cfg.log_level))
        .with_writer(std::io::stderr);
    match cfg.log_format {
        LogFormat::Json => builder.json().init(),
        LogFormat::Text => builder.init(),
    }
}

async fn run(command: Command, cfg: Config) -> Result<()> {
    match command {
        Command::Serve => serve(cfg).await,
        Command::Analyze {
            window,
            top_n,
            out_file,
        } => {
            let params = AnalysisParams::new(window.unwrap_or(cfg.window_hours), top_n.unwrap_or(cfg.top_n))?;
            let store = SampleStore::connect(&cfg.db_path).await?;
            let report = VelocityAnalyzer::new(store).analyze(params).await?;
            emit_json(&serde_json::to_value(&report)?, out_file.as_deref(), "Results saved to").await
        }
        Command::GenerateIdeas {
            keywords,
            video_id,
            views_per_min,
            tone,
            output,
        } => {
            let mut request = IdeaRequest {
                video_id,
                keywords,
                ..Default::default()
            };
            if let Some(v) = views_per_min {
                request.signals.insert("views_per_min".to_string(), v);
            }
            request.style = BTreeMap::from([
                ("tone".to_string(), tone),
                ("language".to_string(), "ko".to_string()),
                ("length_sec".to_string(), "20".to_string()),
            ]);

            let client = model_client(&cfg)?;
            let trace_id = TraceId::new("generate_ideas");
            let response = create_ideas(&request, &trace_id, client.as_ref()).await?;

            let out = serde_json::json!({
                "timestamp": Utc::now(),
                "request": request,
                "response": response,
            });
            emit_json(&out, output.as_deref(), "Ideas saved to").await
        }
        Command::Ingest { file } => {
            let store = SampleStore::connect(&cfg.db_path).await?;
            let now = Utc::now();
            let trace_id = TraceId::at("ingest", now);
            let stats = match file {
                Some(path) => {
                    let f = tokio::fs::File::open(&path).await?;
                    ingest_lines(&store, BufReader::new(f), now, &trace_id).await?
                }
                None => ingest_lines(&store, BufReader::new(tokio::io::stdin()), now, &trace_id).await?,
            };
            println!(
                "Ingested {} videos, {} snapshots ({} lines rejected)",
                stats.videos_upserted, stats.snapshots_stored, stats.rejected
            );
            Ok(())
        }
    }
}

async fn serve(cfg: Config) -> Result<()> {
    // --- Database setup ---
    let store = SampleStore::connect(&cfg.db_path).await?;
    info!("Database ready at {}", cfg.db_path);

    let health = Arc::new(HealthState::new());
    let defaults = AnalysisParams::new(cfg.window_hours, cfg.top_n)?;

    // Velocity analyzer (background, every ANALYZER_INTERVAL_SECS)
    let analyzer = VelocityAnalyzer::new(store.clone()).with_health(Arc::clone(&health));
    tokio::spawn(async move { analyzer.run(defaults).await });

    // HTTP API server
    let api_state = ApiState {
        store,
        health,
        model_client: model_client(&cfg)?,
        defaults,
    };
    let app = router(api_state);
    let bind_addr = format!("0.0.0.0:{}", cfg.api_port);
    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    info!("HTTP API listening on {bind_addr}");

    axum::serve(listener, app).await?;

    Ok(())
}

fn model_client(cfg: &Config) -> Result<Arc<dyn IdeaModelClient>> {
    let client: Arc<dyn IdeaModelClient> = match cfg.model_client {
        ModelClientKind::Stub => Arc::new(StubModelClient::new()),
        ModelClientKind::Claude => Arc::new(ClaudeClient::from_config(cfg)?),
    };
    info!(model = client.model_name(), "Idea model client ready");
    Ok(client)
}

/// Pretty JSON to `path` (with a confirmation line on stdout) or to stdout.
async fn emit_json(value: &serde_json::Value, path: Option<&std::path::Path>, saved_msg: &str) -> Result<()> {
    let text = serde_json::to_string_pretty(value)?;
    match path {
        Some(p) => {
            tokio::fs::write(p, text).await?;
            println!("{saved_msg} {}", p.display());
        }
        None => println!("{text}"),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_parses_generate_ideas() {
        let cli = Cli::try_parse_from([
            "velocity",
            "generate-ideas",
            "--keywords",
            "아이폰",
            "애플",
            "--views-per-min",
            "150.5",
        ])
        .unwrap();
        match cli.command {
            Command::GenerateIdeas {
                keywords,
                views_per_min,
                tone,
                ..
            } => {
                assert_eq!(keywords, vec!["아이폰", "애플"]);
                assert_eq!(views_per_min, Some(150.5));
                assert_eq!(tone, "info");
            }
            _ => panic!("wrong subcommand"),
        }
    }

    #[test]
    fn generate_ideas_requires_keywords() {
        assert!(Cli::try_parse_from(["velocity", "generate-ideas"]).is_err());
    }

    #[test]
    fn cli_parses_analyze_flags() {
        let cli = Cli::try_parse_from(["velocity", "analyze", "--window", "6", "--top-n", "5"]).unwrap();
        assert!(matches!(
            cli.command,
            Command::Analyze {
                window: Some(6),
                top_n: Some(5),
                out_file: None
            }
        ));
    }

    #[tokio::test]
    async fn emit_json_writes_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("report.json");
        let value = serde_json::json!({"results": []});
        emit_json(&value, Some(&path), "Results saved to").await.unwrap();

        let written: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(written, value);
    }
}
