/*!
 * az-failure CLI
 *
 * `fail` induces a zone failure for one service, `recover` reverses it from
 * the recorded state, `discover` lists what every service accepts.
 */

use anyhow::Context;
use clap::{Args, Parser, Subcommand, ValueEnum};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::path::PathBuf;

use az_failure::{
    actions::{self, FailRequest, RecoverRequest},
    cli_style::{self, manifest_table, print_error},
    config::{AppConfig, LogLevel},
    discovery,
    error::{AzError, EXIT_FATAL, EXIT_PARTIAL, EXIT_SUCCESS},
    logging, ActionContext, Provider, RecoveryStatus, ServiceKind,
};

#[derive(Parser)]
#[command(name = "az-failure")]
#[command(version, about = "Simulate Availability Zone failures across AWS managed services", long_about = None)]
struct Cli {
    /// Settings file (TOML)
    #[arg(long, value_name = "PATH", global = true)]
    config: Option<PathBuf>,

    #[arg(long, value_enum, global = true)]
    log_level: Option<LogLevelArg>,

    /// Write JSON logs to this file instead of the terminal
    #[arg(long, value_name = "PATH", global = true)]
    log_file: Option<PathBuf>,

    /// Maximum concurrent provider calls per batch
    #[arg(long, global = true)]
    concurrency: Option<usize>,

    #[arg(long, global = true)]
    region: Option<String>,

    #[arg(long, global = true)]
    profile: Option<String>,

    /// Custom endpoint, e.g. LocalStack
    #[arg(long, value_name = "URL", global = true)]
    endpoint_url: Option<String>,

    /// Print machine-readable JSON instead of tables
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Induce an availability zone failure
    Fail(FailArgs),

    /// Reverse a previous failure from its state file
    Recover(RecoverArgs),

    /// List services, actions and their arguments
    Discover,
}

#[derive(Args)]
struct FailArgs {
    service: ServiceKind,

    /// Availability zone to fail
    #[arg(long)]
    az: Option<String>,

    /// JSON file with the target parameters; flags override its values
    #[arg(long, value_name = "PATH")]
    target: Option<PathBuf>,

    /// Required tag, KEY=VALUE (repeatable)
    #[arg(long = "tag", value_name = "KEY=VALUE")]
    tags: Vec<String>,

    /// EC2 filter, NAME=V1,V2 (repeatable)
    #[arg(long = "filter", value_name = "NAME=VALUES")]
    filters: Vec<String>,

    /// Apply the failure; without this flag nothing is mutated
    #[arg(long)]
    live: bool,

    #[arg(long, value_enum)]
    failure_type: Option<FailureTypeArg>,

    /// Classic load balancer name (repeatable)
    #[arg(long = "lb-name")]
    lb_names: Vec<String>,

    /// Cluster-mode shard selection, GROUP:CLUSTER1,CLUSTER2 (repeatable)
    #[arg(long = "shard", value_name = "GROUP:CLUSTERS")]
    shards: Vec<String>,

    /// Wait for ElastiCache groups to become available again
    #[arg(long)]
    wait: bool,

    #[arg(long, value_name = "PATH")]
    state_path: Option<PathBuf>,

    /// Replace an existing live state file
    #[arg(long)]
    overwrite_state: bool,
}

#[derive(Args)]
struct RecoverArgs {
    service: ServiceKind,

    #[arg(long, value_name = "PATH")]
    state_path: Option<PathBuf>,
}

#[derive(Copy, Clone, PartialEq, Eq, ValueEnum)]
enum LogLevelArg {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl From<LogLevelArg> for LogLevel {
    fn from(arg: LogLevelArg) -> Self {
        match arg {
            LogLevelArg::Error => LogLevel::Error,
            LogLevelArg::Warn => LogLevel::Warn,
            LogLevelArg::Info => LogLevel::Info,
            LogLevelArg::Debug => LogLevel::Debug,
            LogLevelArg::Trace => LogLevel::Trace,
        }
    }
}

#[derive(Copy, Clone, PartialEq, Eq, ValueEnum)]
enum FailureTypeArg {
    Network,
    Instance,
}

impl FailureTypeArg {
    fn as_str(&self) -> &'static str {
        match self {
            FailureTypeArg::Network => "network",
            FailureTypeArg::Instance => "instance",
        }
    }
}

fn main() {
    let code = match run() {
        Ok(code) => code,
        Err(e) => {
            let code = e
                .downcast_ref::<AzError>()
                .map_or(EXIT_FATAL, AzError::exit_code);
            print_error(&format!("{:#}", e), hint(&e));
            code
        }
    };
    std::process::exit(code);
}

fn hint(error: &anyhow::Error) -> Option<&'static str> {
    match error.downcast_ref::<AzError>()? {
        AzError::StateConflict { .. } => Some("run `recover` first, or pass --overwrite-state"),
        AzError::StateNotFound { .. } => Some("pass --state-path if the state was written elsewhere"),
        AzError::NoTargets { .. } => Some("check the tags and the zone; nothing was changed"),
        _ => None,
    }
}

fn run() -> anyhow::Result<i32> {
    let cli = Cli::parse();

    let mut config = match cli.config {
        Some(ref path) => AppConfig::from_file(path)
            .with_context(|| format!("loading settings from {}", path.display()))?,
        None => AppConfig::default(),
    };
    apply_overrides(&cli, &mut config)?;

    if let Err(e) = logging::init_logging(&config.logging) {
        cli_style::print_warning(&format!("Failed to initialize logging: {}", e));
    }

    match cli.command {
        Commands::Discover => {
            let manifest = discovery::manifest();
            if cli.json {
                println!("{}", serde_json::to_string_pretty(&manifest)?);
            } else {
                println!("{}", manifest_table(&manifest));
            }
            Ok(EXIT_SUCCESS)
        }
        Commands::Fail(ref args) => {
            let request = fail_request(args)?;
            let runtime = tokio::runtime::Runtime::new().context("starting async runtime")?;
            let report = runtime.block_on(async {
                let ctx = ActionContext::from_config(connect(&config).await?, &config);
                actions::fail_az(&ctx, request).await
            })?;

            if cli.json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                cli_style::print_failure_report(&report);
            }
            Ok(if report.summary.has_failures() {
                EXIT_PARTIAL
            } else {
                EXIT_SUCCESS
            })
        }
        Commands::Recover(ref args) => {
            let request = RecoverRequest {
                service: args.service,
                state_path: args.state_path.clone(),
            };
            let runtime = tokio::runtime::Runtime::new().context("starting async runtime")?;
            let result = runtime.block_on(async {
                let ctx = ActionContext::from_config(connect(&config).await?, &config);
                actions::recover_az(&ctx, request).await
            })?;

            if cli.json {
                println!("{}", serde_json::to_string_pretty(&result)?);
            } else {
                cli_style::print_recovery_report(&result);
            }
            Ok(match result.status {
                RecoveryStatus::Partial => EXIT_PARTIAL,
                _ => EXIT_SUCCESS,
            })
        }
    }
}

fn apply_overrides(cli: &Cli, config: &mut AppConfig) -> anyhow::Result<()> {
    if let Some(level) = cli.log_level {
        config.logging.level = level.into();
    }
    if let Some(ref file) = cli.log_file {
        config.logging.file = Some(file.clone());
    }
    if let Some(concurrency) = cli.concurrency {
        config.executor.max_concurrent = concurrency;
    }
    if let Some(ref region) = cli.region {
        config.provider.region = Some(region.clone());
    }
    if let Some(ref profile) = cli.profile {
        config.provider.profile = Some(profile.clone());
    }
    if let Some(ref url) = cli.endpoint_url {
        config.provider.endpoint_url = Some(url.clone());
    }
    config.validate()?;
    Ok(())
}

#[cfg(feature = "aws-native")]
async fn connect(config: &AppConfig) -> az_failure::Result<Provider> {
    az_failure::protocol::aws::connect(&config.provider).await
}

#[cfg(not(feature = "aws-native"))]
async fn connect(_config: &AppConfig) -> az_failure::Result<Provider> {
    Err(AzError::Validation(
        "this build has no cloud provider; rebuild with --features aws-native".to_string(),
    ))
}

/// Assemble the target object from `--target` and the flags, then let the
/// config types do the parsing so the CLI and JSON callers share one path
fn fail_request(args: &FailArgs) -> anyhow::Result<FailRequest> {
    let mut target = match args.target {
        Some(ref path) => {
            let text = std::fs::read_to_string(path)
                .with_context(|| format!("reading target {}", path.display()))?;
            match serde_json::from_str(&text)
                .with_context(|| format!("parsing target {}", path.display()))?
            {
                Value::Object(map) => map,
                _ => anyhow::bail!("target {} must be a JSON object", path.display()),
            }
        }
        None => Map::new(),
    };

    if let Some(ref az) = args.az {
        target.insert("az".into(), Value::from(az.as_str()));
    }
    if args.live {
        target.insert("dry_run".into(), Value::Bool(false));
    }
    if !args.tags.is_empty() {
        let tags = args
            .tags
            .iter()
            .map(|t| split_pair(t, '=', "--tag"))
            .collect::<anyhow::Result<BTreeMap<_, _>>>()?;
        target.insert("tags".into(), serde_json::to_value(tags)?);
    }
    if !args.filters.is_empty() {
        let filters = args
            .filters
            .iter()
            .map(|f| {
                let (name, values) = split_pair(f, '=', "--filter")?;
                Ok(serde_json::json!({ "Name": name, "Values": split_list(&values) }))
            })
            .collect::<anyhow::Result<Vec<_>>>()?;
        target.insert("filters".into(), Value::Array(filters));
    }
    if let Some(failure_type) = args.failure_type {
        target.insert("failure_type".into(), Value::from(failure_type.as_str()));
    }
    if !args.lb_names.is_empty() {
        target.insert("lb_names".into(), serde_json::to_value(&args.lb_names)?);
    }
    if !args.shards.is_empty() {
        let shards = args
            .shards
            .iter()
            .map(|s| {
                let (group, clusters) = split_pair(s, ':', "--shard")?;
                Ok(serde_json::json!({
                    "replication_group_id": group,
                    "cache_cluster_ids": split_list(&clusters),
                }))
            })
            .collect::<anyhow::Result<Vec<_>>>()?;
        target.insert("replication_groups".into(), Value::Array(shards));
    }
    if args.wait {
        target.insert("wait_for_recovery".into(), Value::Bool(true));
    }
    if let Some(ref path) = args.state_path {
        target.insert("state_path".into(), serde_json::to_value(path)?);
    }
    if args.overwrite_state {
        target.insert("overwrite_state".into(), Value::Bool(true));
    }

    let accepted: Vec<String> = discovery::fail_arguments(args.service)
        .into_iter()
        .map(|a| a.name)
        .collect();
    if let Some(key) = target.keys().find(|k| !accepted.contains(k)) {
        return Err(AzError::Validation(format!(
            "'{key}' does not apply to {}",
            args.service
        ))
        .into());
    }

    target.insert("service".into(), serde_json::to_value(args.service)?);
    let request = serde_json::from_value(Value::Object(target))
        .map_err(|e| AzError::Validation(format!("invalid target for {}: {e}", args.service)))?;
    Ok(request)
}

fn split_pair(raw: &str, separator: char, flag: &str) -> anyhow::Result<(String, String)> {
    match raw.split_once(separator) {
        Some((key, value)) if !key.trim().is_empty() => {
            Ok((key.trim().to_string(), value.trim().to_string()))
        }
        _ => Err(AzError::Validation(format!(
            "{flag} expects a value like KEY{separator}VALUE, got '{raw}'"
        ))
        .into()),
    }
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
        .collect()
}
