use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

use crate::types::Provider;

// Pipeline constants — shared defaults for every calibration profile.
pub const DEFAULT_MIN_STABLE_MS: u64 = 900; // stability window per readiness gate
pub const DEFAULT_MAX_STABILIZATION_WAIT_MS: u64 = 30_000; // churn cutoff
pub const DEFAULT_SAMPLE_TTL_MS: u64 = 600_000; // 10 min gate sample retention
pub const DEFAULT_MAX_SAMPLES: usize = 500; // gate sample cap
pub const DEFAULT_MIN_PRUNE_INTERVAL_MS: u64 = 1_000; // opportunistic prune spacing
pub const DEFAULT_PERSIST_DEBOUNCE_MS: u64 = 500; // hub write coalescing
pub const DEFAULT_RECORD_CAP: usize = 50; // hub cached records
pub const DEFAULT_DISPATCH_STATE_CAP: usize = 250; // hub dedup entries
pub const DEFAULT_TITLE_CACHE_CAP: usize = 50;
pub const DEFAULT_ACTIVE_CONVERSATION_CAP: usize = 50;
pub const DEFAULT_ATTEMPT_MAP_CAP: usize = 100; // runner attempt LRUs
pub const DEFAULT_LEASE_TTL_MS: u64 = 15_000;
pub const DEFAULT_WARM_FETCH_ATTEMPTS: u32 = 3;

/// Top-level config (scribe.toml + SCRIBE_* env overrides).
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ScribeConfig {
    #[serde(default)]
    pub gate: GateConfig,
    #[serde(default)]
    pub hub: HubConfig,
    #[serde(default)]
    pub lease: LeaseConfig,
    #[serde(default)]
    pub platforms: PlatformsConfig,
}

/// Readiness-gate timing profile.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GateConfig {
    #[serde(default = "default_min_stable_ms")]
    pub min_stable_ms: u64,
    #[serde(default = "default_max_stabilization_wait_ms")]
    pub max_stabilization_wait_ms: u64,
    #[serde(default = "default_sample_ttl_ms")]
    pub sample_ttl_ms: u64,
    #[serde(default = "default_max_samples")]
    pub max_samples: usize,
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            min_stable_ms: DEFAULT_MIN_STABLE_MS,
            max_stabilization_wait_ms: DEFAULT_MAX_STABILIZATION_WAIT_MS,
            sample_ttl_ms: DEFAULT_SAMPLE_TTL_MS,
            max_samples: DEFAULT_MAX_SAMPLES,
        }
    }
}

/// External event hub persistence and dedup caps.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HubConfig {
    #[serde(default = "default_record_cap")]
    pub record_cap: usize,
    #[serde(default = "default_dispatch_state_cap")]
    pub dispatch_state_cap: usize,
    #[serde(default = "default_persist_debounce_ms")]
    pub persist_debounce_ms: u64,
    #[serde(default = "default_db_path")]
    pub db_path: String,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            record_cap: DEFAULT_RECORD_CAP,
            dispatch_state_cap: DEFAULT_DISPATCH_STATE_CAP,
            persist_debounce_ms: DEFAULT_PERSIST_DEBOUNCE_MS,
            db_path: default_db_path(),
        }
    }
}

/// Probe-lease timing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LeaseConfig {
    #[serde(default = "default_lease_ttl_ms")]
    pub default_ttl_ms: u64,
    /// Client-side TTL assumed when a claim fails open on transport error.
    #[serde(default = "default_lease_ttl_ms")]
    pub fail_open_ttl_ms: u64,
}

impl Default for LeaseConfig {
    fn default() -> Self {
        Self {
            default_ttl_ms: DEFAULT_LEASE_TTL_MS,
            fail_open_ttl_ms: DEFAULT_LEASE_TTL_MS,
        }
    }
}

/// Per-platform calibration overrides.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct PlatformsConfig {
    #[serde(default)]
    pub chatgpt: PlatformTuning,
    #[serde(default)]
    pub gemini: PlatformTuning,
    #[serde(default)]
    pub grok: PlatformTuning,
}

impl PlatformsConfig {
    pub fn for_provider(&self, provider: Provider) -> &PlatformTuning {
        match provider {
            Provider::Chatgpt => &self.chatgpt,
            Provider::Gemini => &self.gemini,
            Provider::Grok | Provider::Unknown => &self.grok,
        }
    }
}

/// Tunables that differ between platforms.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlatformTuning {
    /// Signal sources to ignore for this platform (e.g. "dom-hints" on
    /// platforms whose DOM churns during streaming).
    #[serde(default)]
    pub disabled_sources: Vec<String>,
    /// Stability-window override; falls back to `gate.min_stable_ms`.
    pub min_stable_ms: Option<u64>,
    #[serde(default = "default_warm_fetch_attempts")]
    pub warm_fetch_attempts: u32,
}

impl Default for PlatformTuning {
    fn default() -> Self {
        Self {
            disabled_sources: Vec::new(),
            min_stable_ms: None,
            warm_fetch_attempts: DEFAULT_WARM_FETCH_ATTEMPTS,
        }
    }
}

impl PlatformTuning {
    pub fn source_enabled(&self, source: &str) -> bool {
        !self.disabled_sources.iter().any(|s| s == source)
    }
}

fn default_min_stable_ms() -> u64 {
    DEFAULT_MIN_STABLE_MS
}
fn default_max_stabilization_wait_ms() -> u64 {
    DEFAULT_MAX_STABILIZATION_WAIT_MS
}
fn default_sample_ttl_ms() -> u64 {
    DEFAULT_SAMPLE_TTL_MS
}
fn default_max_samples() -> usize {
    DEFAULT_MAX_SAMPLES
}
fn default_record_cap() -> usize {
    DEFAULT_RECORD_CAP
}
fn default_dispatch_state_cap() -> usize {
    DEFAULT_DISPATCH_STATE_CAP
}
fn default_persist_debounce_ms() -> u64 {
    DEFAULT_PERSIST_DEBOUNCE_MS
}
fn default_lease_ttl_ms() -> u64 {
    DEFAULT_LEASE_TTL_MS
}
fn default_warm_fetch_attempts() -> u32 {
    DEFAULT_WARM_FETCH_ATTEMPTS
}
fn default_db_path() -> String {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    format!("{}/.scribe/scribe.db", home)
}

impl ScribeConfig {
    /// Load config from a TOML file with SCRIBE_* env var overrides.
    pub fn load(config_path: Option<&str>) -> crate::error::Result<Self> {
        let path = config_path
            .map(String::from)
            .unwrap_or_else(default_config_path);

        let config: ScribeConfig = Figment::new()
            .merge(Toml::file(&path))
            .merge(Env::prefixed("SCRIBE_").split("_"))
            .extract()
            .map_err(|e| crate::error::ScribeError::Config(e.to_string()))?;

        Ok(config)
    }
}

fn default_config_path() -> String {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    format!("{}/.scribe/scribe.toml", home)
}
