//! Configuration types for stat-harvest
//!
//! This module defines:
//! - CLI argument parsing using clap derive macros
//! - Runtime configuration with validation
//! - Variable configuration as read from JSON
//! - Regex expansion of variable names against scanned variables
//! - Worker pool settings

use crate::error::ConfigError;
use clap::Parser;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use std::time::Duration;
use tracing::{info, warn};

/// Maximum reasonable number of worker processes
pub const MAX_POOL_SIZE: usize = 256;

/// Maximum reasonable outer thread count
pub const MAX_WORKERS: usize = 1024;

/// Default number of worker processes
pub const DEFAULT_POOL_SIZE: usize = 4;

/// Default per-file request budget (seconds)
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 120;

/// Default budget for a worker to announce READY (seconds)
pub const DEFAULT_STARTUP_TIMEOUT_SECS: u64 = 30;

/// Default health monitor period (seconds)
pub const DEFAULT_HEALTH_INTERVAL_SECS: u64 = 30;

/// Cap on a single line read during a request
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(30);

/// Budget for a PING round trip
pub const DEFAULT_PING_TIMEOUT: Duration = Duration::from_secs(2);

/// Grace period after SHUTDOWN before the worker is killed
pub const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(2);

/// Name of the reference worker binary
pub const WORKER_BINARY: &str = "stat-worker";

/// Characters that turn a variable name into a regex
static PATTERN_CHARS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[*?+\[\]\\]").expect("Invalid pattern character regex"));

/// Batch extraction of metrics from simulator stats files
#[derive(Parser, Debug, Clone)]
#[command(
    name = "stat-harvest",
    version,
    about = "Extract metrics from simulator stats files into a CSV table",
    long_about = "Finds every stats file below STATS_PATH, asks a pool of persistent worker \
                  processes to extract the requested variables from each file, aggregates \
                  the readings per variable and writes one CSV row per file.",
    after_help = "EXAMPLES:\n    \
        stat-harvest runs/ --variables vars.json\n    \
        stat-harvest runs/ --variables vars.json --pattern 'stats*.txt' -o ipc.csv\n    \
        stat-harvest runs/ --variables vars.json --scanned scanned.json --pool-size 8\n    \
        stat-harvest runs/ --variables vars.json --worker-cmd ./my-worker --worker-arg --fast"
)]
pub struct CliArgs {
    /// Directory to search for stats files (or a single stats file)
    #[arg(value_name = "STATS_PATH")]
    pub stats_path: PathBuf,

    /// Variables to extract (JSON array of variable configurations)
    #[arg(long, value_name = "FILE")]
    pub variables: PathBuf,

    /// Scanned variables used to expand regex variable names (JSON array)
    #[arg(long, value_name = "FILE")]
    pub scanned: Option<PathBuf>,

    /// File name pattern matched at any depth below STATS_PATH
    #[arg(long, default_value = "stats.txt", value_name = "GLOB")]
    pub pattern: String,

    /// Output CSV file
    #[arg(short, long, default_value = "results.csv", value_name = "FILE")]
    pub output: PathBuf,

    /// Number of files processed concurrently
    #[arg(
        short = 'w',
        long,
        default_value_t = default_workers(),
        value_name = "NUM"
    )]
    pub workers: usize,

    /// Number of persistent worker processes
    #[arg(
        long,
        default_value_t = DEFAULT_POOL_SIZE,
        env = "STAT_HARVEST_POOL_SIZE",
        value_name = "NUM"
    )]
    pub pool_size: usize,

    /// Worker program (defaults to stat-worker next to this executable)
    #[arg(long, value_name = "PROGRAM")]
    pub worker_cmd: Option<PathBuf>,

    /// Extra argument passed to the worker program (can be repeated)
    #[arg(long = "worker-arg", value_name = "ARG", action = clap::ArgAction::Append, allow_hyphen_values = true)]
    pub worker_args: Vec<String>,

    /// Per-file request timeout in seconds
    #[arg(long, default_value_t = DEFAULT_REQUEST_TIMEOUT_SECS, value_name = "SECS")]
    pub timeout: u64,

    /// Seconds a worker may take to announce READY
    #[arg(long, default_value_t = DEFAULT_STARTUP_TIMEOUT_SECS, value_name = "SECS")]
    pub startup_timeout: u64,

    /// Seconds between worker health checks
    #[arg(long, default_value_t = DEFAULT_HEALTH_INTERVAL_SECS, value_name = "SECS")]
    pub health_interval: u64,

    /// Quiet mode - suppress progress output
    #[arg(short = 'q', long)]
    pub quiet: bool,

    /// Verbose output (debug logging)
    #[arg(short = 'v', long)]
    pub verbose: bool,
}

fn default_workers() -> usize {
    // Outer threads mostly wait on worker pipes
    num_cpus::get() * 2
}

/// Entry or statistic list, given either as a JSON list or a CSV string
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum EntryList {
    List(Vec<String>),
    Csv(String),
}

impl EntryList {
    /// Normalized list of names (CSV split on commas, blanks dropped)
    pub fn to_vec(&self) -> Vec<String> {
        match self {
            EntryList::List(items) => items
                .iter()
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect(),
            EntryList::Csv(csv) => csv
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect(),
        }
    }
}

impl From<Vec<String>> for EntryList {
    fn from(value: Vec<String>) -> Self {
        EntryList::List(value)
    }
}

impl From<&[&str]> for EntryList {
    fn from(value: &[&str]) -> Self {
        EntryList::List(value.iter().map(|s| s.to_string()).collect())
    }
}

/// Type-specific parameters of a variable
///
/// Several parameters have a legacy spelling; both are accepted.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VariableParams {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entries: Option<EntryList>,

    #[serde(
        default,
        rename = "vectorEntries",
        skip_serializing_if = "Option::is_none"
    )]
    pub vector_entries: Option<EntryList>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub statistics: Option<EntryList>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub statistics_only: Option<bool>,

    #[serde(
        default,
        rename = "statisticsOnly",
        skip_serializing_if = "Option::is_none"
    )]
    pub statistics_only_legacy: Option<bool>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub minimum: Option<i64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub maximum: Option<i64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bins: Option<usize>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_range: Option<f64>,

    #[serde(default, rename = "onEmpty", skip_serializing_if = "Option::is_none")]
    pub on_empty: Option<String>,

    /// Concrete ids that all feed this variable
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub parsed_ids: Vec<String>,
}

impl VariableParams {
    /// `statistics_only`, falling back to the legacy spelling
    pub fn statistics_only(&self) -> bool {
        self.statistics_only
            .or(self.statistics_only_legacy)
            .unwrap_or(false)
    }
}

fn default_repeat() -> usize {
    1
}

/// One requested variable
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VariableConfig {
    #[serde(default)]
    pub name: String,

    /// Type tag; validated by the variable factory
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,

    #[serde(default = "default_repeat")]
    pub repeat: usize,

    #[serde(flatten)]
    pub params: VariableParams,
}

impl VariableConfig {
    pub fn new(name: impl Into<String>, kind: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: Some(kind.into()),
            repeat: 1,
            params: VariableParams::default(),
        }
    }

    pub fn with_repeat(mut self, repeat: usize) -> Self {
        self.repeat = repeat;
        self
    }

    pub fn with_entries(mut self, entries: &[&str]) -> Self {
        self.params.entries = Some(entries.into());
        self
    }

    pub fn with_statistics(mut self, statistics: &[&str]) -> Self {
        self.params.statistics = Some(statistics.into());
        self
    }

    pub fn with_statistics_only(mut self, statistics_only: bool) -> Self {
        self.params.statistics_only = Some(statistics_only);
        self
    }

    pub fn with_range(mut self, minimum: i64, maximum: i64) -> Self {
        self.params.minimum = Some(minimum);
        self.params.maximum = Some(maximum);
        self
    }

    pub fn with_rebinning(mut self, bins: usize, max_range: f64) -> Self {
        self.params.bins = Some(bins);
        self.params.max_range = Some(max_range);
        self
    }

    pub fn with_on_empty(mut self, on_empty: impl Into<String>) -> Self {
        self.params.on_empty = Some(on_empty.into());
        self
    }

    pub fn with_parsed_ids(mut self, ids: &[&str]) -> Self {
        self.params.parsed_ids = ids.iter().map(|s| s.to_string()).collect();
        self
    }

    /// Readings expected per slot: one per aliased id, else `repeat`
    pub fn effective_repeat(&self) -> usize {
        if self.params.parsed_ids.is_empty() {
            self.repeat
        } else {
            self.params.parsed_ids.len()
        }
    }

    /// Whether the name is a regex to be expanded against scanned variables
    pub fn is_pattern(&self) -> bool {
        PATTERN_CHARS.is_match(&self.name)
    }
}

/// A variable discovered by a previous scan of the stats files
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScannedVariable {
    pub name: String,

    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub entries: Vec<String>,

    /// Constituent names when this entry is itself an aggregated pattern
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pattern_indices: Option<Vec<String>>,
}

impl ScannedVariable {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: None,
            entries: Vec::new(),
            pattern_indices: None,
        }
    }
}

/// Expand regex variable names into the concrete ids they match
///
/// A variable whose name contains a regex metacharacter is full-matched
/// against every scanned name. The matches (or the constituents of a matching
/// aggregated pattern) become its `parsed_ids`. A variable without matches,
/// or with an invalid regex, is kept unchanged.
pub fn expand_patterns(
    variables: Vec<VariableConfig>,
    scanned: &[ScannedVariable],
) -> Vec<VariableConfig> {
    if scanned.is_empty() {
        return variables;
    }

    variables
        .into_iter()
        .map(|mut config| {
            if !config.is_pattern() {
                return config;
            }

            let pattern = match Regex::new(&format!("^(?:{})$", config.name)) {
                Ok(re) => re,
                Err(e) => {
                    warn!(variable = %config.name, error = %e, "Invalid regex in variable name");
                    return config;
                }
            };

            let mut matched: Vec<String> = Vec::new();
            for sv in scanned {
                if sv.name != config.name && !pattern.is_match(&sv.name) {
                    continue;
                }
                match &sv.pattern_indices {
                    Some(indices) if !indices.is_empty() => matched.extend(indices.iter().cloned()),
                    _ => matched.push(sv.name.clone()),
                }
            }

            if matched.is_empty() {
                warn!(variable = %config.name, "No scanned variables match pattern");
            } else {
                info!(
                    variable = %config.name,
                    count = matched.len(),
                    "Expanded pattern variable"
                );
                config.params.parsed_ids = matched;
            }
            config
        })
        .collect()
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T, ConfigError> {
    let text = std::fs::read_to_string(path).map_err(|e| ConfigError::InvalidConfigFile {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;
    serde_json::from_str(&text).map_err(|e| ConfigError::InvalidConfigFile {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })
}

/// Load variable configurations from a JSON array
pub fn load_variables(path: &Path) -> Result<Vec<VariableConfig>, ConfigError> {
    read_json(path)
}

/// Load scanned variables from a JSON array
pub fn load_scanned(path: &Path) -> Result<Vec<ScannedVariable>, ConfigError> {
    read_json(path)
}

/// External worker program and its arguments
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerCommand {
    pub program: PathBuf,
    pub args: Vec<String>,
}

impl WorkerCommand {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    /// Append an argument
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Append several arguments
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// The reference worker: next to the current executable, else on `PATH`
    pub fn reference() -> Self {
        let name = format!("{}{}", WORKER_BINARY, std::env::consts::EXE_SUFFIX);
        let sibling = std::env::current_exe()
            .ok()
            .and_then(|exe| exe.parent().map(|dir| dir.join(&name)))
            .filter(|path| path.is_file());
        Self::new(sibling.unwrap_or_else(|| PathBuf::from(name)))
    }

    /// Human-readable command line
    pub fn display(&self) -> String {
        std::iter::once(self.program.display().to_string())
            .chain(self.args.iter().cloned())
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Worker pool tuning
#[derive(Debug, Clone)]
pub struct PoolSettings {
    pub pool_size: usize,
    pub command: WorkerCommand,
    pub startup_timeout: Duration,
    pub request_timeout: Duration,
    pub read_timeout: Duration,
    pub ping_timeout: Duration,
    pub shutdown_timeout: Duration,
    pub health_interval: Duration,
}

impl PoolSettings {
    pub fn new(command: WorkerCommand) -> Self {
        Self {
            pool_size: DEFAULT_POOL_SIZE,
            command,
            startup_timeout: Duration::from_secs(DEFAULT_STARTUP_TIMEOUT_SECS),
            request_timeout: Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS),
            read_timeout: DEFAULT_READ_TIMEOUT,
            ping_timeout: DEFAULT_PING_TIMEOUT,
            shutdown_timeout: DEFAULT_SHUTDOWN_TIMEOUT,
            health_interval: Duration::from_secs(DEFAULT_HEALTH_INTERVAL_SECS),
        }
    }

    pub fn pool_size(mut self, size: usize) -> Self {
        self.pool_size = size;
        self
    }

    pub fn startup_timeout(mut self, timeout: Duration) -> Self {
        self.startup_timeout = timeout;
        self
    }

    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = timeout;
        self
    }

    pub fn ping_timeout(mut self, timeout: Duration) -> Self {
        self.ping_timeout = timeout;
        self
    }

    pub fn shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout = timeout;
        self
    }

    pub fn health_interval(mut self, interval: Duration) -> Self {
        self.health_interval = interval;
        self
    }
}

impl Default for PoolSettings {
    fn default() -> Self {
        Self::new(WorkerCommand::reference())
    }
}

/// Validated runtime configuration
#[derive(Debug, Clone)]
pub struct HarvestConfig {
    /// Root directory (or single file) to search
    pub stats_path: PathBuf,

    /// File name glob matched at any depth
    pub pattern: String,

    /// Output CSV path
    pub output_path: PathBuf,

    /// Outer thread count
    pub worker_count: usize,

    /// Worker pool settings
    pub pool: PoolSettings,

    /// Requested variables, already pattern-expanded
    pub variables: Vec<VariableConfig>,

    /// Show progress indicator
    pub show_progress: bool,

    /// Verbose logging
    pub verbose: bool,
}

impl HarvestConfig {
    /// Create and validate configuration from CLI arguments
    pub fn from_args(args: CliArgs) -> Result<Self, ConfigError> {
        // Validate pool size
        if args.pool_size == 0 || args.pool_size > MAX_POOL_SIZE {
            return Err(ConfigError::InvalidPoolSize {
                size: args.pool_size,
                max: MAX_POOL_SIZE,
            });
        }

        // Validate outer worker count
        if args.workers == 0 || args.workers > MAX_WORKERS {
            return Err(ConfigError::InvalidWorkerCount {
                count: args.workers,
                max: MAX_WORKERS,
            });
        }

        for (name, value) in [
            ("timeout", args.timeout),
            ("startup-timeout", args.startup_timeout),
            ("health-interval", args.health_interval),
        ] {
            if value == 0 {
                return Err(ConfigError::InvalidTimeout {
                    name: name.to_string(),
                });
            }
        }

        if !args.stats_path.exists() {
            return Err(ConfigError::InvalidStatsPath {
                path: args.stats_path.clone(),
                reason: "Path does not exist".to_string(),
            });
        }

        let pattern = args.pattern.trim().to_string();
        if pattern.is_empty() || pattern.contains("..") {
            return Err(ConfigError::InvalidPattern {
                pattern: args.pattern.clone(),
                reason: "Pattern must be a non-empty file name glob".to_string(),
            });
        }
        glob::Pattern::new(&pattern).map_err(|e| ConfigError::InvalidPattern {
            pattern: pattern.clone(),
            reason: e.to_string(),
        })?;

        // Validate output path
        if let Some(parent) = args.output.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                return Err(ConfigError::InvalidOutputPath {
                    path: args.output.clone(),
                    reason: format!("Parent directory '{}' does not exist", parent.display()),
                });
            }
        }

        let mut variables = load_variables(&args.variables)?;
        if variables.is_empty() {
            return Err(ConfigError::NoVariables);
        }
        if let Some(scanned_path) = &args.scanned {
            let scanned = load_scanned(scanned_path)?;
            variables = expand_patterns(variables, &scanned);
        }

        let command = match &args.worker_cmd {
            Some(program) => WorkerCommand::new(program.clone()),
            None => WorkerCommand::reference(),
        }
        .args(args.worker_args.iter().cloned());

        let pool = PoolSettings::new(command)
            .pool_size(args.pool_size)
            .request_timeout(Duration::from_secs(args.timeout))
            .startup_timeout(Duration::from_secs(args.startup_timeout))
            .health_interval(Duration::from_secs(args.health_interval));

        Ok(Self {
            stats_path: args.stats_path,
            pattern,
            output_path: args.output,
            worker_count: args.workers,
            pool,
            variables,
            show_progress: !args.quiet,
            verbose: args.verbose,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn args_for(stats: &Path, variables: &Path) -> CliArgs {
        CliArgs::parse_from([
            "stat-harvest",
            stats.to_str().unwrap(),
            "--variables",
            variables.to_str().unwrap(),
        ])
    }

    fn write_file(dir: &Path, name: &str, content: &str) -> PathBuf {
        let path = dir.join(name);
        let mut file = std::fs::File::create(&path).unwrap();
        file.write_all(content.as_bytes()).unwrap();
        path
    }

    #[test]
    fn test_variable_config_spellings() {
        let json = r#"[
            {"name": "cacheMisses", "type": "vector", "vectorEntries": "cpu0, cpu1"},
            {"name": "lat", "type": "Distribution", "statisticsOnly": true, "statistics": ["mean"]},
            {"name": "hist", "type": "histogram", "bins": 3, "max_range": 30, "repeat": 2},
            {"name": "cpuType", "type": "configuration", "onEmpty": "unknown"}
        ]"#;
        let configs: Vec<VariableConfig> = serde_json::from_str(json).unwrap();

        assert_eq!(configs.len(), 4);
        assert_eq!(
            configs[0].params.vector_entries.as_ref().unwrap().to_vec(),
            vec!["cpu0", "cpu1"]
        );
        assert!(configs[1].params.statistics_only());
        assert_eq!(configs[2].params.max_range, Some(30.0));
        assert_eq!(configs[2].repeat, 2);
        assert_eq!(configs[3].params.on_empty.as_deref(), Some("unknown"));
        assert_eq!(configs[0].repeat, 1);
    }

    #[test]
    fn test_effective_repeat_follows_parsed_ids() {
        let config = VariableConfig::new("ctrl", "scalar")
            .with_repeat(5)
            .with_parsed_ids(&["ctrl0", "ctrl1"]);
        assert_eq!(config.effective_repeat(), 2);
        assert_eq!(VariableConfig::new("x", "scalar").effective_repeat(), 1);
    }

    #[test]
    fn test_is_pattern() {
        assert!(VariableConfig::new(r"system\.cpu\d+\.ipc", "scalar").is_pattern());
        assert!(VariableConfig::new("cpu[0-3]", "scalar").is_pattern());
        assert!(!VariableConfig::new("system.cpu.ipc", "scalar").is_pattern());
    }

    #[test]
    fn test_expand_patterns() {
        let scanned = vec![
            ScannedVariable::new("system.cpu0.ipc"),
            ScannedVariable::new("system.cpu1.ipc"),
            ScannedVariable::new("system.cpu0.ipc_total"),
            ScannedVariable::new("system.l2.misses"),
        ];
        let variables = vec![
            VariableConfig::new(r"system\.cpu\d+\.ipc", "scalar"),
            VariableConfig::new("system.l2.misses", "scalar"),
        ];

        let expanded = expand_patterns(variables, &scanned);
        assert_eq!(
            expanded[0].params.parsed_ids,
            vec!["system.cpu0.ipc", "system.cpu1.ipc"]
        );
        assert!(expanded[1].params.parsed_ids.is_empty());
    }

    #[test]
    fn test_expand_uses_pattern_indices() {
        let mut aggregated = ScannedVariable::new(r"ctrl\d+\.reads");
        aggregated.pattern_indices = Some(vec!["ctrl0.reads".into(), "ctrl1.reads".into()]);

        let expanded = expand_patterns(
            vec![VariableConfig::new(r"ctrl\d+\.reads", "vector")],
            &[aggregated],
        );
        assert_eq!(
            expanded[0].params.parsed_ids,
            vec!["ctrl0.reads", "ctrl1.reads"]
        );
    }

    #[test]
    fn test_expand_invalid_or_unmatched_unchanged() {
        let scanned = vec![ScannedVariable::new("a.b")];
        let variables = vec![
            VariableConfig::new("cpu[", "scalar"),
            VariableConfig::new("zzz.*", "scalar"),
        ];
        let expanded = expand_patterns(variables.clone(), &scanned);
        assert_eq!(expanded, variables);
    }

    #[test]
    fn test_from_args_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let vars = write_file(dir.path(), "vars.json", r#"[{"name": "ipc", "type": "scalar"}]"#);

        let config = HarvestConfig::from_args(args_for(dir.path(), &vars)).unwrap();
        assert_eq!(config.pattern, "stats.txt");
        assert_eq!(config.pool.pool_size, DEFAULT_POOL_SIZE);
        assert_eq!(config.pool.request_timeout, Duration::from_secs(120));
        assert_eq!(config.pool.read_timeout, Duration::from_secs(30));
        assert_eq!(config.variables.len(), 1);
        assert!(config.show_progress);
    }

    #[test]
    fn test_from_args_validation() {
        let dir = tempfile::tempdir().unwrap();
        let vars = write_file(dir.path(), "vars.json", r#"[{"name": "ipc", "type": "scalar"}]"#);

        let mut args = args_for(dir.path(), &vars);
        args.pool_size = 0;
        assert!(matches!(
            HarvestConfig::from_args(args),
            Err(ConfigError::InvalidPoolSize { .. })
        ));

        let mut args = args_for(dir.path(), &vars);
        args.timeout = 0;
        assert!(matches!(
            HarvestConfig::from_args(args),
            Err(ConfigError::InvalidTimeout { .. })
        ));

        let args = args_for(&dir.path().join("missing"), &vars);
        assert!(matches!(
            HarvestConfig::from_args(args),
            Err(ConfigError::InvalidStatsPath { .. })
        ));

        let empty = write_file(dir.path(), "empty.json", "[]");
        assert!(matches!(
            HarvestConfig::from_args(args_for(dir.path(), &empty)),
            Err(ConfigError::NoVariables)
        ));

        let broken = write_file(dir.path(), "broken.json", "{not json");
        assert!(matches!(
            HarvestConfig::from_args(args_for(dir.path(), &broken)),
            Err(ConfigError::InvalidConfigFile { .. })
        ));
    }

    #[test]
    fn test_worker_command() {
        let cmd = WorkerCommand::new("/usr/bin/perl")
            .arg("worker.pl")
            .args(["--quiet"]);
        assert_eq!(cmd.args, vec!["worker.pl", "--quiet"]);
        assert_eq!(cmd.display(), "/usr/bin/perl worker.pl --quiet");
    }
}
