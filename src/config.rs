/*!
 * Configuration types for az-failure
 *
 * Two layers live here: [`AppConfig`], the process-wide settings loaded from
 * TOML (provider, executor, retry, waiter, logging), and one target struct
 * per service describing a single `fail_az` invocation.
 */

use once_cell::sync::Lazy;
use regex::Regex;
use serde::de::{self, Deserializer};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::backend::{Filter, Tag};
use crate::error::{AzError, Result};

/// Tag applied to resources that opt in to failure injection
pub const DEFAULT_TAG_KEY: &str = "AZ_FAILURE";
pub const DEFAULT_TAG_VALUE: &str = "True";

static AZ_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[a-z]{2}(-[a-z]+)+-\d+(-[a-z]+-\d+)?[a-z]$").expect("static zone pattern")
});

/// Check the zone name shape before any provider call is made
pub fn validate_az_format(az: &str) -> Result<()> {
    if az.trim().is_empty() {
        return Err(AzError::Validation(
            "availability zone must not be empty".to_string(),
        ));
    }
    if !AZ_PATTERN.is_match(az) {
        return Err(AzError::Validation(format!(
            "'{az}' is not a valid availability zone name"
        )));
    }
    Ok(())
}

// ============================================================================
// Application settings
// ============================================================================

/// Process-wide settings, usually read from `az-failure.toml`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub provider: ProviderSettings,
    pub executor: ExecutorSettings,
    pub retry: RetrySettings,
    pub waiter: WaiterSettings,
    pub logging: LoggingSettings,

    /// Directory for default state file locations (defaults to the working directory)
    pub state_dir: Option<PathBuf>,
}

impl AppConfig {
    /// Load configuration from a TOML file
    pub fn from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| {
            AzError::Validation(format!("cannot read config {}: {e}", path.display()))
        })?;
        Self::from_toml(&contents)
    }

    pub fn from_toml(contents: &str) -> Result<Self> {
        let config: AppConfig = toml::from_str(contents)
            .map_err(|e| AzError::Validation(format!("invalid configuration: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.executor.max_concurrent == 0 {
            return Err(AzError::Validation(
                "executor.max_concurrent must be at least 1".to_string(),
            ));
        }
        if self.retry.max_attempts == 0 {
            return Err(AzError::Validation(
                "retry.max_attempts must be at least 1".to_string(),
            ));
        }
        if self.waiter.max_attempts == 0 {
            return Err(AzError::Validation(
                "waiter.max_attempts must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderSettings {
    /// Region override; falls back to AWS_REGION / AWS_DEFAULT_REGION
    pub region: Option<String>,

    /// Named profile from the shared credentials file
    pub profile: Option<String>,

    /// Custom endpoint (LocalStack and friends)
    pub endpoint_url: Option<String>,

    /// Per-call operation timeout in seconds
    pub timeout_secs: u64,
}

impl Default for ProviderSettings {
    fn default() -> Self {
        Self {
            region: None,
            profile: None,
            endpoint_url: None,
            timeout_secs: 30,
        }
    }
}

impl ProviderSettings {
    /// Region from settings, then the conventional environment variables
    pub fn resolved_region(&self) -> Option<String> {
        self.region
            .clone()
            .or_else(|| std::env::var("AWS_REGION").ok())
            .or_else(|| std::env::var("AWS_DEFAULT_REGION").ok())
            .filter(|r| !r.is_empty())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutorSettings {
    /// Upper bound on in-flight provider calls per batch
    pub max_concurrent: usize,
}

impl Default for ExecutorSettings {
    fn default() -> Self {
        Self { max_concurrent: 10 }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrySettings {
    pub max_attempts: u32,
    pub initial_delay_ms: u64,
    pub max_delay_ms: u64,
    pub jitter: bool,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            initial_delay_ms: 200,
            max_delay_ms: 20_000,
            jitter: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WaiterSettings {
    pub delay_secs: u64,
    pub max_attempts: u32,
}

impl Default for WaiterSettings {
    fn default() -> Self {
        Self {
            delay_secs: 30,
            max_attempts: 30,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    pub level: LogLevel,

    /// Write JSON logs to this file instead of stderr
    pub file: Option<PathBuf>,
}

/// Log level for diagnostic output
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Error,
    Warn,
    #[default]
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    /// Convert to tracing::Level
    pub fn to_tracing_level(&self) -> tracing::Level {
        match self {
            LogLevel::Error => tracing::Level::ERROR,
            LogLevel::Warn => tracing::Level::WARN,
            LogLevel::Info => tracing::Level::INFO,
            LogLevel::Debug => tracing::Level::DEBUG,
            LogLevel::Trace => tracing::Level::TRACE,
        }
    }
}

// ============================================================================
// Per-service targets
// ============================================================================

/// How EC2 and EKS failures are induced
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum FailureType {
    /// Swap subnet ACLs for a deny-all blackhole ACL
    #[default]
    Network,
    /// Stop or terminate running instances
    Instance,
}

impl std::fmt::Display for FailureType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FailureType::Network => write!(f, "network"),
            FailureType::Instance => write!(f, "instance"),
        }
    }
}

pub fn default_tags() -> Vec<Tag> {
    vec![Tag::new(DEFAULT_TAG_KEY, DEFAULT_TAG_VALUE)]
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AsgConfig {
    pub az: String,
    #[serde(deserialize_with = "flexible_bool")]
    pub dry_run: bool,
    #[serde(deserialize_with = "tag_list")]
    pub tags: Vec<Tag>,
    pub state_path: Option<PathBuf>,
    pub overwrite_state: bool,
}

impl Default for AsgConfig {
    fn default() -> Self {
        Self {
            az: String::new(),
            dry_run: default_true(),
            tags: default_tags(),
            state_path: None,
            overwrite_state: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Ec2Config {
    /// Target zone; may instead be given as an `availability-zone` filter
    pub az: Option<String>,
    #[serde(deserialize_with = "flexible_bool")]
    pub dry_run: bool,
    pub failure_type: FailureType,
    pub filters: Vec<Filter>,
    pub state_path: Option<PathBuf>,
    pub overwrite_state: bool,
}

impl Default for Ec2Config {
    fn default() -> Self {
        Self {
            az: None,
            dry_run: default_true(),
            failure_type: FailureType::default(),
            filters: Vec::new(),
            state_path: None,
            overwrite_state: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ElbConfig {
    pub az: String,
    #[serde(deserialize_with = "flexible_bool")]
    pub dry_run: bool,
    #[serde(deserialize_with = "tag_list")]
    pub tags: Vec<Tag>,
    /// Restrict discovery to these balancer names
    pub lb_names: Vec<String>,
    pub state_path: Option<PathBuf>,
    pub overwrite_state: bool,
}

impl Default for ElbConfig {
    fn default() -> Self {
        Self {
            az: String::new(),
            dry_run: default_true(),
            tags: default_tags(),
            lb_names: Vec::new(),
            state_path: None,
            overwrite_state: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ElbV2Config {
    pub az: String,
    #[serde(deserialize_with = "flexible_bool")]
    pub dry_run: bool,
    #[serde(deserialize_with = "tag_list")]
    pub tags: Vec<Tag>,
    pub state_path: Option<PathBuf>,
    pub overwrite_state: bool,
}

impl Default for ElbV2Config {
    fn default() -> Self {
        Self {
            az: String::new(),
            dry_run: default_true(),
            tags: default_tags(),
            state_path: None,
            overwrite_state: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RdsConfig {
    pub az: String,
    #[serde(deserialize_with = "flexible_bool")]
    pub dry_run: bool,
    #[serde(deserialize_with = "tag_list")]
    pub tags: Vec<Tag>,
}

impl Default for RdsConfig {
    fn default() -> Self {
        Self {
            az: String::new(),
            dry_run: default_true(),
            tags: default_tags(),
        }
    }
}

/// Explicit shard selection for cluster-mode enabled replication groups
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShardSelector {
    pub replication_group_id: String,
    pub cache_cluster_ids: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ElastiCacheConfig {
    pub az: String,
    #[serde(deserialize_with = "flexible_bool")]
    pub dry_run: bool,
    #[serde(deserialize_with = "tag_list")]
    pub tags: Vec<Tag>,
    /// Cluster-mode enabled groups to fail over; empty means cluster-mode disabled discovery
    pub replication_groups: Vec<ShardSelector>,
    /// Poll each group until it reports `available` again
    pub wait_for_recovery: bool,
}

impl Default for ElastiCacheConfig {
    fn default() -> Self {
        Self {
            az: String::new(),
            dry_run: default_true(),
            tags: default_tags(),
            replication_groups: Vec::new(),
            wait_for_recovery: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EksConfig {
    pub az: String,
    #[serde(deserialize_with = "flexible_bool")]
    pub dry_run: bool,
    pub failure_type: FailureType,
    #[serde(deserialize_with = "tag_list")]
    pub tags: Vec<Tag>,
    pub state_path: Option<PathBuf>,
    pub overwrite_state: bool,
}

impl Default for EksConfig {
    fn default() -> Self {
        Self {
            az: String::new(),
            dry_run: default_true(),
            failure_type: FailureType::default(),
            tags: default_tags(),
            state_path: None,
            overwrite_state: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MqConfig {
    pub az: String,
    #[serde(deserialize_with = "flexible_bool")]
    pub dry_run: bool,
    #[serde(deserialize_with = "tag_list")]
    pub tags: Vec<Tag>,
}

impl Default for MqConfig {
    fn default() -> Self {
        Self {
            az: String::new(),
            dry_run: default_true(),
            tags: default_tags(),
        }
    }
}

// ============================================================================
// Lenient deserializers
// ============================================================================

#[derive(Deserialize)]
#[serde(untagged)]
enum BoolRepr {
    Bool(bool),
    Text(String),
}

/// Accept `true`/`false` or their string forms, case-insensitive
fn flexible_bool<'de, D>(deserializer: D) -> std::result::Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    match BoolRepr::deserialize(deserializer)? {
        BoolRepr::Bool(b) => Ok(b),
        BoolRepr::Text(s) => match s.trim().to_ascii_lowercase().as_str() {
            "true" => Ok(true),
            "false" => Ok(false),
            other => Err(de::Error::custom(format!(
                "expected true or false, got '{other}'"
            ))),
        },
    }
}

#[derive(Deserialize)]
struct TagEntry {
    #[serde(alias = "key")]
    #[serde(rename = "Key")]
    key: String,
    #[serde(alias = "value")]
    #[serde(rename = "Value")]
    value: String,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum TagsRepr {
    List(Vec<TagEntry>),
    Map(BTreeMap<String, String>),
}

/// Accept `[{Key, Value}, ...]` or `{key: value, ...}`
fn tag_list<'de, D>(deserializer: D) -> std::result::Result<Vec<Tag>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match TagsRepr::deserialize(deserializer)? {
        TagsRepr::List(entries) => entries
            .into_iter()
            .map(|e| Tag::new(e.key, e.value))
            .collect(),
        TagsRepr::Map(map) => map.into_iter().map(|(k, v)| Tag::new(k, v)).collect(),
    })
}
