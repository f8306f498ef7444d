use anyhow::{Context, Result};
use clap::Parser;
use sec13f::{run_pipeline, Config};
use std::{env, path::PathBuf, process::ExitCode};
use tracing::{info, Level};
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser)]
#[command(
    name = "sec13f",
    about = "Download SEC Form 13F data sets and build per-year holdings CSVs"
)]
struct Cli {
    /// First calendar year to fetch.
    #[arg(long)]
    start_year: i32,

    /// Last calendar year to fetch (inclusive).
    #[arg(long)]
    end_year: i32,

    /// Where archives and per-archive CSVs go. Defaults to ./sec_13f_data.
    #[arg(long)]
    data_dir: Option<PathBuf>,

    /// Where 13F_<year>.csv files go. Defaults to ./sec_13f_annual.
    #[arg(long)]
    annual_dir: Option<PathBuf>,

    /// Print the run result as JSON instead of text.
    #[arg(long, default_value_t = false)]
    json: bool,
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    // ─── 1) init logging ─────────────────────────────────────────────
    let log_level = env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string());
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::default().add_directive(log_level.parse().unwrap_or(Level::INFO.into()))
    });
    fmt::Subscriber::builder()
        .with_env_filter(env_filter)
        .with_span_events(fmt::format::FmtSpan::CLOSE)
        .with_writer(std::io::stderr)
        .init();

    // ─── 2) configure ────────────────────────────────────────────────
    let cli = Cli::parse();
    let mut config = Config::from_env();
    if let Some(dir) = cli.data_dir {
        config.data_dir = dir;
    }
    if let Some(dir) = cli.annual_dir {
        config.annual_dir = dir;
    }
    info!(
        start_year = cli.start_year,
        end_year = cli.end_year,
        data_dir = %config.data_dir.display(),
        annual_dir = %config.annual_dir.display(),
        "startup"
    );

    // ─── 3) run ──────────────────────────────────────────────────────
    let response = run_pipeline(config, cli.start_year, cli.end_year).await;

    if cli.json {
        let body = serde_json::to_string_pretty(&response).context("serializing run result")?;
        println!("{body}");
    } else {
        println!("{}", response.captured_output);
    }

    Ok(if response.is_success() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}
