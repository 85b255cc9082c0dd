use anyhow::{Context, Result};
use std::path::PathBuf;
use std::time::Duration;

use crate::config::{ImageSize, Quality};
use crate::events::{Reporter, RunEvent};
use crate::io::{fetch_and_save, synthesize_filename};
use crate::providers::{build_request, ImageProvider};

/// A prompt that made it all the way to disk.
#[derive(Debug, Clone, PartialEq)]
pub struct GeneratedImage {
    pub path: PathBuf,
    pub index: usize,
    pub prompt: String,
}

pub struct BatchParams {
    pub out_dir: PathBuf,
    pub model: String,
    pub size: ImageSize,
    pub quality: Quality,
    pub open_url: bool,
    pub download_timeout: Duration,
}

/// Submits `prompts` one at a time, in order, saving each image before the
/// next request. The first error stops the batch and is returned.
pub async fn run_batch(
    provider: &dyn ImageProvider,
    http: &reqwest::Client,
    prompts: &[String],
    params: &BatchParams,
    reporter: &dyn Reporter,
) -> Result<Vec<GeneratedImage>> {
    tokio::fs::create_dir_all(&params.out_dir)
        .await
        .with_context(|| format!("create output dir {}", params.out_dir.display()))?;

    tracing::debug!("provider {} -> {}", provider.name(), params.out_dir.display());
    reporter.emit(RunEvent::Started { total: prompts.len() });

    let mut saved = Vec::with_capacity(prompts.len());
    for (i, prompt) in prompts.iter().enumerate() {
        let index = i + 1;
        match generate_one(provider, http, prompt, index, params, reporter).await {
            Ok(img) => {
                reporter.emit(RunEvent::Saved { index, path: img.path.clone() });
                saved.push(img);
            }
            Err(e) => {
                reporter.emit(RunEvent::Failed { index, error: format!("{e:#}") });
                return Err(e);
            }
        }
    }

    reporter.emit(RunEvent::Finished { saved: saved.len() });
    Ok(saved)
}

async fn generate_one(
    provider: &dyn ImageProvider,
    http: &reqwest::Client,
    prompt: &str,
    index: usize,
    params: &BatchParams,
    reporter: &dyn Reporter,
) -> Result<GeneratedImage> {
    reporter.emit(RunEvent::Submitted { index, prompt: prompt.to_string() });

    let req = build_request(prompt, params.size, params.quality.as_str()).with_model(&params.model);
    let url = provider
        .generate(&req)
        .await
        .with_context(|| format!("prompt #{index} failed"))?;

    if params.open_url {
        if let Err(e) = webbrowser::open(&url) {
            tracing::warn!("could not open {url}: {e}");
        }
    }

    let target = params.out_dir.join(synthesize_filename(prompt, index));
    let path = fetch_and_save(http, &url, &target, params.download_timeout).await?;
    Ok(GeneratedImage { path, index, prompt: prompt.to_string() })
}
