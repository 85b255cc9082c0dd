use anyhow::{bail, Context, Result};
use clap::{Parser, ValueEnum};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing_subscriber::filter::LevelFilter;

pub const DEFAULT_MODEL: &str = "dall-e-3";
pub const DEFAULT_API_BASE: &str = "https://api.openai.com/v1";
pub const DEFAULT_VARIANTS: usize = 2;
pub const DEFAULT_QUALITY: &str = "hd";
pub const DEFAULT_LOG_LEVEL: LevelFilter = LevelFilter::DEBUG;
pub const DEFAULT_PROMPT: &str = "Ultra-detailed semi-realistic digital art, \
    soft natural lighting: a lighthouse on a rocky coast at dusk, waves breaking below, \
    vivid colors.";

/// Resolutions the image endpoint accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
pub enum ImageSize {
    #[serde(rename = "1024x1024")]
    #[value(name = "1024x1024")]
    Square,
    #[serde(rename = "1024x1792")]
    #[value(name = "1024x1792")]
    Portrait,
    #[serde(rename = "1792x1024")]
    #[value(name = "1792x1024")]
    Landscape,
}

impl ImageSize {
    pub fn as_str(self) -> &'static str {
        match self {
            ImageSize::Square => "1024x1024",
            ImageSize::Portrait => "1024x1792",
            ImageSize::Landscape => "1792x1024",
        }
    }
}

impl std::fmt::Display for ImageSize {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Quality {
    Standard,
    Hd,
}

impl Quality {
    /// `hd` / `high` in any case select the HD tier, anything else is standard.
    pub fn from_label(label: &str) -> Self {
        match label.to_ascii_lowercase().as_str() {
            "hd" | "high" => Quality::Hd,
            _ => Quality::Standard,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Quality::Standard => "standard",
            Quality::Hd => "hd",
        }
    }
}

/// Parses a log level name, accepting the Python-style `WARNING` and
/// `CRITICAL` spellings too. Anything else is an error.
pub fn parse_log_level(level: &str) -> Result<LevelFilter, String> {
    let name = match level.trim().to_ascii_lowercase().as_str() {
        "warning" => "warn".to_string(),
        "critical" | "fatal" => "error".to_string(),
        other => other.to_string(),
    };
    match name.as_str() {
        "trace" | "debug" | "info" | "warn" | "error" | "off" => {
            name.parse::<LevelFilter>().map_err(|e| e.to_string())
        }
        _ => Err(format!(
            "unknown log level `{level}` (expected trace, debug, info, warn, error or off)"
        )),
    }
}

#[derive(Debug, Parser)]
#[command(name = "promptvar")]
#[command(
    about = "Expand a prompt template into variants and render each with an image API",
    long_about = None
)]
pub struct Cli {
    /// API key for the image endpoint
    #[arg(short = 'k', long, env = "OPENAI_API_KEY", hide_env_values = true)]
    pub api_key: Option<String>,

    /// Prompt text; `a||b` lists explicit variants, `{x|y}` expands alternatives
    #[arg(short, long)]
    pub prompt: Option<String>,

    /// Directory images are written to (created if missing)
    #[arg(short, long)]
    pub output_dir: Option<PathBuf>,

    /// Image resolution
    #[arg(short, long, value_enum)]
    pub size: Option<ImageSize>,

    /// Quality label; `hd` or `high` select the HD tier
    #[arg(long)]
    pub quality: Option<String>,

    /// Number of base prompt variants
    #[arg(long, value_parser = clap::value_parser!(u64).range(1..))]
    pub variants: Option<u64>,

    /// Seed for style selection
    #[arg(long)]
    pub seed: Option<u64>,

    /// Open each generated image URL in the browser
    #[arg(long, overrides_with = "no_open_url")]
    pub open_url: bool,

    /// Do not open image URLs, even if the config file asks to
    #[arg(long, overrides_with = "open_url")]
    pub no_open_url: bool,

    /// Log verbosity (trace, debug, info, warn, error, off)
    #[arg(long, value_parser = parse_log_level)]
    pub log_level: Option<LevelFilter>,

    /// YAML file supplying defaults for any of the flags above
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Image model name
    #[arg(long, env = "OPENAI_MODEL")]
    pub model: Option<String>,

    /// Base URL of the image API
    #[arg(long, env = "OPENAI_BASE_URL")]
    pub api_base: Option<String>,
}

/// On-disk config file. Every key is optional; CLI flags take precedence.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FileCfg {
    pub prompt: Option<String>,
    pub output_dir: Option<PathBuf>,
    pub size: Option<ImageSize>,
    pub quality: Option<String>,
    pub variants: Option<usize>,
    pub seed: Option<u64>,
    pub open_url: Option<bool>,
    pub log_level: Option<String>,
    pub model: Option<String>,
    pub api_base: Option<String>,
}

impl FileCfg {
    pub fn load(path: &Path) -> Result<Self> {
        let txt = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        serde_yaml::from_str(&txt).context("Failed to parse config YAML")
    }
}

/// Why a run could not start. A missing key gets its own exit status and is
/// detected before the config file is read.
#[derive(Debug, thiserror::Error)]
pub enum PreflightError {
    #[error("OPENAI_API_KEY required")]
    MissingCredential,
    #[error(transparent)]
    Config(#[from] anyhow::Error),
}

impl PreflightError {
    pub fn exit_code(&self) -> i32 {
        match self {
            PreflightError::MissingCredential => 2,
            PreflightError::Config(_) => 1,
        }
    }
}

/// Fully resolved settings for one run.
#[derive(Debug, Clone)]
pub struct RunCfg {
    pub prompt: String,
    pub out_dir: PathBuf,
    pub size: ImageSize,
    pub quality: Quality,
    pub variants: usize,
    pub seed: Option<u64>,
    pub open_url: bool,
    pub log_level: LevelFilter,
    pub model: String,
    pub api_base: String,
}

impl Cli {
    pub fn file_cfg(&self) -> Result<FileCfg> {
        match &self.config {
            Some(path) => FileCfg::load(path),
            None => Ok(FileCfg::default()),
        }
    }

    /// Trimmed API key, `None` when absent or blank.
    pub fn credential(&self) -> Option<String> {
        self.api_key
            .as_deref()
            .map(str::trim)
            .filter(|k| !k.is_empty())
            .map(str::to_string)
    }

    /// Checks the key first, then loads the config file.
    pub fn preflight(&self) -> Result<(String, FileCfg), PreflightError> {
        let key = self.credential().ok_or(PreflightError::MissingCredential)?;
        let file = self.file_cfg()?;
        Ok((key, file))
    }

    /// `Some(true)` / `Some(false)` when either browser flag was given.
    fn open_url_flag(&self) -> Option<bool> {
        if self.open_url {
            Some(true)
        } else if self.no_open_url {
            Some(false)
        } else {
            None
        }
    }

    pub fn resolve(&self, file: FileCfg) -> Result<RunCfg> {
        let log_level = match (self.log_level, file.log_level.as_deref()) {
            (Some(level), _) => level,
            (None, Some(name)) => parse_log_level(name).map_err(anyhow::Error::msg)?,
            (None, None) => DEFAULT_LOG_LEVEL,
        };

        let prompt = self
            .prompt
            .clone()
            .or(file.prompt)
            .unwrap_or_else(|| DEFAULT_PROMPT.into());
        if prompt.trim().is_empty() {
            bail!("prompt must not be blank");
        }

        let variants = match self.variants {
            Some(n) => usize::try_from(n).context("--variants is too large")?,
            None => file.variants.unwrap_or(DEFAULT_VARIANTS),
        };
        if variants == 0 {
            bail!("variants must be at least 1");
        }

        let out_dir = match self.output_dir.clone().or(file.output_dir) {
            Some(d) => d,
            None => std::env::current_dir().context("Failed to read current directory")?,
        };

        let quality = self
            .quality
            .as_deref()
            .or(file.quality.as_deref())
            .unwrap_or(DEFAULT_QUALITY);

        Ok(RunCfg {
            prompt,
            out_dir,
            size: self.size.or(file.size).unwrap_or(ImageSize::Landscape),
            quality: Quality::from_label(quality),
            variants,
            seed: self.seed.or(file.seed),
            open_url: self.open_url_flag().or(file.open_url).unwrap_or(false),
            log_level,
            model: self.model.clone().or(file.model).unwrap_or_else(|| DEFAULT_MODEL.into()),
            api_base: self
                .api_base
                .clone()
                .or(file.api_base)
                .unwrap_or_else(|| DEFAULT_API_BASE.into()),
        })
    }
}
