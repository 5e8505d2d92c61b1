//! Worker configuration.
//!
//! `SiteGenConfig` is built once at startup and passed by reference to every
//! component. Values are layered: built-in defaults, then an optional TOML
//! file, then environment variables, then CLI flags (applied by the caller).
//!
//! ```toml
//! [model]
//! api_url = "https://api.openai.com/v1/chat/completions"
//! model = "gpt-4o-mini"
//! fallback_model = "gpt-4o"
//! timeout_ms = 300000
//!
//! [repair]
//! enabled = true
//! max_chars = 12000
//!
//! [storage]
//! bucket = "sites"
//! region = "eu-west-1"
//! public_base_url = "https://cdn.example.com"
//!
//! [worker]
//! concurrency = 2
//! db_path = ".sitegen/jobs.db"
//!
//! [build]
//! install_command = ["npm", "install", "--include=dev"]
//! build_command = ["npm", "run", "build"]
//! ```

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

pub const DEFAULT_API_URL: &str = "https://api.openai.com/v1/chat/completions";
pub const DEFAULT_CONFIG_FILE: &str = "sitegen.toml";

/// Language-model endpoint settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    pub api_url: String,
    #[serde(skip_serializing)]
    pub api_key: Option<String>,
    pub model: String,
    pub fallback_model: Option<String>,
    pub allow_fallback: bool,
    /// Wall-clock deadline per request. Zero disables the deadline.
    pub timeout_ms: u64,
    pub max_tokens: Option<u32>,
    pub use_max_completion_tokens: bool,
    pub temperature: Option<f64>,
    pub reasoning_effort: Option<String>,
    pub response_format: Option<String>,
    /// Log the whole response body when the model returns no content.
    pub log_response: bool,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_API_URL.to_string(),
            api_key: None,
            model: "gpt-4o-mini".to_string(),
            fallback_model: None,
            allow_fallback: true,
            timeout_ms: 300_000,
            max_tokens: None,
            use_max_completion_tokens: false,
            temperature: None,
            reasoning_effort: None,
            response_format: None,
            log_response: false,
        }
    }
}

impl ModelConfig {
    pub fn timeout(&self) -> Option<Duration> {
        (self.timeout_ms > 0).then(|| Duration::from_millis(self.timeout_ms))
    }
}

/// Settings for the single JSON-repair call.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RepairConfig {
    pub enabled: bool,
    /// Prefix of the raw text sent for repair. Zero sends everything.
    pub max_chars: usize,
    pub model: Option<String>,
    pub response_format: Option<String>,
}

impl Default for RepairConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_chars: 12_000,
            model: None,
            response_format: None,
        }
    }
}

/// Object-storage settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub bucket: Option<String>,
    pub region: String,
    /// Custom endpoint (MinIO, R2, ...). Enables path-style addressing.
    pub endpoint: Option<String>,
    pub public_base_url: Option<String>,
    pub acl: Option<String>,
    pub cache_control: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            bucket: None,
            region: "us-east-1".to_string(),
            endpoint: None,
            public_base_url: None,
            acl: None,
            cache_control: "public, max-age=300".to_string(),
        }
    }
}

/// Worker pool and job store settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    pub concurrency: usize,
    pub db_path: PathBuf,
    pub poll_interval_ms: u64,
    /// Keep job workspaces on disk for debugging.
    pub keep_workdir: bool,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            concurrency: 2,
            db_path: PathBuf::from(".sitegen/jobs.db"),
            poll_interval_ms: 1000,
            keep_workdir: false,
        }
    }
}

/// Scaffold and toolchain settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BuildConfig {
    /// On-disk scaffold replacing the embedded template.
    pub template_dir: Option<PathBuf>,
    pub install_command: Vec<String>,
    pub install_env: BTreeMap<String, String>,
    pub build_command: Vec<String>,
    /// Compiled output directory, relative to the project root.
    pub output_dir: String,
}

impl Default for BuildConfig {
    fn default() -> Self {
        let mut install_env = BTreeMap::new();
        install_env.insert("NODE_ENV".to_string(), "development".to_string());
        install_env.insert("npm_config_production".to_string(), "false".to_string());
        Self {
            template_dir: None,
            install_command: vec!["npm".into(), "install".into(), "--include=dev".into()],
            install_env,
            build_command: vec!["npm".into(), "run".into(), "build".into()],
            output_dir: "build".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SiteGenConfig {
    pub model: ModelConfig,
    pub repair: RepairConfig,
    pub storage: StorageConfig,
    pub worker: WorkerConfig,
    pub build: BuildConfig,
}

impl SiteGenConfig {
    /// Load defaults, the TOML file (explicit path, or `sitegen.toml` in the
    /// working directory when present) and the process environment.
    pub fn load(config_path: Option<&Path>) -> Result<Self> {
        let _ = dotenvy::dotenv();

        let mut config = match config_path {
            Some(path) => Self::from_file(path)?,
            None => {
                let default_path = Path::new(DEFAULT_CONFIG_FILE);
                if default_path.exists() {
                    Self::from_file(default_path)?
                } else {
                    Self::default()
                }
            }
        };
        config.apply_env(|key| std::env::var(key).ok());
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        toml::from_str(&content).with_context(|| format!("Failed to parse {}", path.display()))
    }

    /// Overlay environment values. `lookup` abstracts `std::env::var` so tests
    /// never mutate the process environment.
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let first = |keys: &[&str]| keys.iter().find_map(|k| get(k));

        let m = &mut self.model;
        if let Some(v) = get("OPENAI_API_URL") {
            m.api_url = v;
        }
        if let Some(v) = get("OPENAI_API_KEY") {
            m.api_key = Some(v);
        }
        if let Some(v) = get("OPENAI_MODEL") {
            m.model = v;
        }
        if let Some(v) = get("OPENAI_FALLBACK_MODEL") {
            m.fallback_model = Some(v);
        }
        if let Some(v) = get("OPENAI_ALLOW_FALLBACK") {
            m.allow_fallback = v != "false";
        }
        if let Some(v) = get("OPENAI_TIMEOUT_MS").and_then(|v| v.parse().ok()) {
            m.timeout_ms = v;
        }
        if let Some(v) = get("OPENAI_MAX_TOKENS").and_then(|v| v.parse::<u32>().ok()) {
            m.max_tokens = (v > 0).then_some(v);
        }
        if let Some(v) = get("OPENAI_USE_MAX_COMPLETION_TOKENS") {
            m.use_max_completion_tokens = v == "true";
        }
        if let Some(v) = get("OPENAI_TEMPERATURE").and_then(|v| v.parse::<f64>().ok()) {
            m.temperature = v.is_finite().then_some(v);
        }
        if let Some(v) = get("OPENAI_REASONING_EFFORT") {
            m.reasoning_effort = Some(v);
        }
        if let Some(v) = get("OPENAI_RESPONSE_FORMAT") {
            m.response_format = Some(v);
        }
        if let Some(v) = get("OPENAI_LOG_RESPONSE") {
            m.log_response = v == "true";
        }

        let r = &mut self.repair;
        if let Some(v) = get("OPENAI_ENABLE_JSON_REPAIR") {
            r.enabled = v != "false";
        }
        if let Some(v) = get("OPENAI_JSON_REPAIR_MAX_CHARS").and_then(|v| v.parse().ok()) {
            r.max_chars = v;
        }
        if let Some(v) = get("OPENAI_JSON_REPAIR_MODEL") {
            r.model = Some(v);
        }
        if let Some(v) = get("OPENAI_JSON_REPAIR_RESPONSE_FORMAT") {
            r.response_format = Some(v);
        }

        let s = &mut self.storage;
        if let Some(v) = get("S3_BUCKET") {
            s.bucket = Some(v);
        }
        if let Some(v) = first(&["AWS_REGION", "AWS_DEFAULT_REGION"]) {
            s.region = v;
        }
        if let Some(v) = first(&["S3_ENDPOINT", "AWS_ENDPOINT"]) {
            s.endpoint = Some(v);
        }
        if let Some(v) = get("S3_PUBLIC_BASE_URL") {
            s.public_base_url = Some(v);
        }
        if let Some(v) = get("S3_OBJECT_ACL") {
            s.acl = Some(v);
        }

        let w = &mut self.worker;
        if let Some(v) = get("WORKER_CONCURRENCY").and_then(|v| v.parse().ok()) {
            w.concurrency = v;
        }
        if let Some(v) = get("SITEGEN_DB_PATH") {
            w.db_path = PathBuf::from(v);
        }
        if let Some(v) = get("SITEGEN_POLL_INTERVAL_MS").and_then(|v| v.parse().ok()) {
            w.poll_interval_ms = v;
        }
        if let Some(v) = get("SITEGEN_KEEP_WORKDIR") {
            w.keep_workdir = v == "true";
        }

        if let Some(v) = get("SITEGEN_TEMPLATE_DIR") {
            self.build.template_dir = Some(PathBuf::from(v));
        }
    }

    /// Check the settings a worker cannot run without.
    pub fn validate_for_worker(&self) -> Result<()> {
        if self.model.api_key.is_none() {
            anyhow::bail!("Missing OPENAI_API_KEY");
        }
        if self.storage.bucket.is_none() {
            anyhow::bail!("Missing S3_BUCKET");
        }
        if self.worker.concurrency == 0 {
            anyhow::bail!("WORKER_CONCURRENCY must be at least 1");
        }
        if self.build.install_command.is_empty() || self.build.build_command.is_empty() {
            anyhow::bail!("install_command and build_command must not be empty");
        }
        Ok(())
    }

    /// Public URL of the published `index.html` under `build_prefix`.
    pub fn build_url(&self, bucket: &str, build_prefix: &str) -> String {
        match self
            .storage
            .public_base_url
            .as_deref()
            .map(|base| base.trim_end_matches('/'))
            .filter(|base| !base.is_empty())
        {
            Some(base) => format!("{}/{}/index.html", base, build_prefix),
            None => format!(
                "https://{}.s3.{}.amazonaws.com/{}/index.html",
                bucket, self.storage.region, build_prefix
            ),
        }
    }
}
