use anyhow::Result;
use clap::Parser;
use tracing_subscriber::{filter::LevelFilter, EnvFilter};

mod config;
mod events;
mod io;
mod orchestrator;
mod prompts;
mod providers;

use config::{Cli, PreflightError, DEFAULT_LOG_LEVEL};
use events::ProgressReporter;
use orchestrator::{run_batch, BatchParams};
use providers::OpenAIProvider;

fn init_tracing(level: LevelFilter) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::default().add_directive(level.into()));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let (api_key, file_cfg) = match cli.preflight() {
        Ok(v) => v,
        Err(e @ PreflightError::MissingCredential) => {
            init_tracing(cli.log_level.unwrap_or(DEFAULT_LOG_LEVEL));
            tracing::error!("{e}");
            std::process::exit(e.exit_code());
        }
        Err(e) => return Err(e.into()),
    };
    let cfg = cli.resolve(file_cfg)?;
    init_tracing(cfg.log_level);

    let prompts = prompts::build_prompt_list(&cfg.prompt, cfg.variants, cfg.seed)?;
    tracing::debug!(
        "{} prompt(s) from {} variant(s), size {}, quality {}",
        prompts.len(),
        cfg.variants,
        cfg.size,
        cfg.quality.as_str()
    );

    let provider = OpenAIProvider::new(api_key, cfg.api_base.clone());
    let params = BatchParams {
        out_dir: cfg.out_dir.clone(),
        model: cfg.model.clone(),
        size: cfg.size,
        quality: cfg.quality,
        open_url: cfg.open_url,
        download_timeout: io::DOWNLOAD_TIMEOUT,
    };
    let reporter = ProgressReporter::new();
    let http = reqwest::Client::new();

    let saved = run_batch(&provider, &http, &prompts, &params, &reporter).await?;

    println!("\nGenerated files:");
    for img in &saved {
        tracing::debug!("[{}] {}", img.index, img.prompt);
        println!("{}", img.path.display());
    }
    Ok(())
}
