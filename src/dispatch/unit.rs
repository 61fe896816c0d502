//! Per-file parse unit
//!
//! A [`ParseUnit`] sends one request for its file to the worker pool and
//! demultiplexes the returned data lines into freshly created statistics:
//!
//! - scalar and configuration lines are recorded immediately
//! - vector, distribution and histogram lines are buffered per id and entry
//!   and merged into their statistic once the whole reply has been read
//! - summary lines feed either an entry of an entry-bearing statistic or a
//!   standalone `<id>__get_summary` variable
//! - ids nobody asked for are skipped

use crate::config::VariableConfig;
use crate::error::{ConfigError, HarvestError, ParseError, Result};
use crate::stats::{self, EntryReadings, StatKind, StatVariable};
use crate::worker::protocol::{DataLine, RawKind};
use crate::worker::WorkerPool;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, warn};

/// Suffix of standalone summary variables
pub const SUMMARY_SUFFIX: &str = "__get_summary";

/// Statistics of one file, keyed by variable name
pub type VariableMap = BTreeMap<String, StatVariable>;

/// Validated set of requested variables, shared by every parse unit
#[derive(Debug, Clone)]
pub struct VariablePlan {
    configs: Vec<VariableConfig>,
    aliases: HashMap<String, String>,
    keys: Vec<String>,
}

impl VariablePlan {
    /// Validate configurations and build the id alias table
    pub fn new(configs: Vec<VariableConfig>) -> std::result::Result<Self, ConfigError> {
        if configs.is_empty() {
            return Err(ConfigError::NoVariables);
        }

        let mut seen = HashSet::new();
        let mut aliases: HashMap<String, String> = HashMap::new();
        let mut ids: Vec<String> = Vec::new();
        let mut planned = Vec::with_capacity(configs.len());

        for mut config in configs {
            config.name = config.name.trim().to_string();
            if config.name.is_empty() {
                return Err(ConfigError::MissingName);
            }
            if !seen.insert(config.name.clone()) {
                return Err(ConfigError::DuplicateVariable { name: config.name });
            }
            config.repeat = config.effective_repeat();

            // surface configuration errors before any file is touched
            stats::create(&config)?;

            let own = std::iter::once(config.name.clone());
            for id in own.chain(config.params.parsed_ids.iter().cloned()) {
                if let Some(owner) = aliases.get(&id) {
                    if owner != &config.name {
                        warn!(id = %id, owner = %owner, variable = %config.name, "Id already claimed by another variable");
                    }
                    continue;
                }
                aliases.insert(id.clone(), config.name.clone());
                ids.push(id);
            }
            planned.push(config);
        }

        let keys = request_keys(&ids);
        Ok(Self {
            configs: planned,
            aliases,
            keys,
        })
    }

    /// Variable names in configuration order
    pub fn names(&self) -> Vec<String> {
        self.configs.iter().map(|c| c.name.clone()).collect()
    }

    pub fn configs(&self) -> &[VariableConfig] {
        &self.configs
    }

    /// Keys sent to the worker
    pub fn keys(&self) -> &[String] {
        &self.keys
    }

    /// Variable fed by `id`, if any
    pub fn resolve(&self, id: &str) -> Option<&str> {
        self.aliases.get(id).map(String::as_str)
    }

    /// Fresh statistics for one file
    pub fn instantiate(&self) -> std::result::Result<VariableMap, ConfigError> {
        self.configs
            .iter()
            .map(|c| Ok((c.name.clone(), stats::create(c)?)))
            .collect()
    }
}

/// Safety-filtered request keys: cut at `__`, no leading `-`, no duplicates
fn request_keys(ids: &[String]) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut keys = Vec::new();
    for id in ids {
        let key = id.split("__").next().unwrap_or_default();
        if key.is_empty() {
            continue;
        }
        if key.starts_with('-') {
            warn!(key = %key, "Skipping potentially unsafe key");
            continue;
        }
        if seen.insert(key.to_string()) {
            keys.push(key.to_string());
        }
    }
    keys
}

/// Allowed reinterpretations of a worker type tag for a declared type
fn reconcile(raw: StatKind, declared: StatKind) -> StatKind {
    match (raw, declared) {
        (StatKind::Histogram, StatKind::Vector)
        | (StatKind::Histogram, StatKind::Distribution)
        | (StatKind::Vector, StatKind::Distribution)
        | (StatKind::Vector, StatKind::Histogram) => declared,
        _ => raw,
    }
}

/// Outcome of one successfully parsed file
#[derive(Debug, Clone)]
pub struct FileResult {
    pub path: PathBuf,
    pub variables: VariableMap,
    /// Size of the stats file
    pub bytes: u64,
}

/// Parse work for a single stats file
pub struct ParseUnit<'a> {
    file: PathBuf,
    plan: &'a VariablePlan,
}

impl<'a> ParseUnit<'a> {
    pub fn new(file: impl Into<PathBuf>, plan: &'a VariablePlan) -> Self {
        Self {
            file: file.into(),
            plan,
        }
    }

    pub fn file(&self) -> &Path {
        &self.file
    }

    /// Request the file from the pool and build its statistics
    pub fn run(&self, pool: &WorkerPool, timeout: Duration) -> Result<FileResult> {
        let metadata = std::fs::metadata(&self.file).map_err(|_| ParseError::FileNotFound {
            path: self.file.clone(),
        })?;
        if !metadata.is_file() {
            return Err(ParseError::FileNotFound {
                path: self.file.clone(),
            }
            .into());
        }

        let keys = self.plan.keys();
        let lines = if keys.is_empty() {
            warn!(file = %self.file.display(), "No safe keys to request");
            Vec::new()
        } else {
            pool.parse_file(&self.file, keys, timeout)?
        };
        debug!(file = %self.file.display(), lines = lines.len(), "Worker reply received");

        let variables = self.process_output(&lines)?;
        Ok(FileResult {
            path: self.file.clone(),
            variables,
            bytes: metadata.len(),
        })
    }

    /// Demultiplex worker data lines into statistics
    pub fn process_output<S: AsRef<str>>(&self, lines: &[S]) -> Result<VariableMap> {
        let mut variables = self.plan.instantiate()?;
        let mut buffer: BTreeMap<String, EntryReadings> = BTreeMap::new();

        for line in lines {
            let line = line.as_ref().trim();
            if line.is_empty() {
                continue;
            }
            let data = DataLine::decode(line)?;

            match data.kind {
                RawKind::Stat(raw) if raw.is_entry_type() => {
                    let base = data.base_id();
                    let Some(name) = self.plan.resolve(base) else {
                        continue;
                    };
                    let declared = declared_kind(&variables, name);
                    let resolved = reconcile(raw, declared);
                    if resolved != declared {
                        return Err(ParseError::TypeMismatch {
                            id: base.to_string(),
                            expected: declared.to_string(),
                            found: resolved.to_string(),
                        }
                        .into());
                    }
                    buffer_entry(&mut buffer, &data, line)?;
                }

                RawKind::Stat(_) => {
                    let Some(name) = self.plan.resolve(&data.id) else {
                        continue;
                    };
                    if let Some(var) = variables.get_mut(name) {
                        var.set_value(&data.value)?;
                    }
                }

                RawKind::Summary => {
                    let base = data.base_id();
                    let entry_target = data.entry_key().is_some()
                        && self
                            .plan
                            .resolve(base)
                            .is_some_and(|name| declared_kind(&variables, name).is_entry_type());
                    if entry_target {
                        buffer_entry(&mut buffer, &data, line)?;
                        continue;
                    }

                    let summary_id = format!("{}{}", base, SUMMARY_SUFFIX);
                    if let Some(var) = self
                        .plan
                        .resolve(&summary_id)
                        .and_then(|name| variables.get_mut(name))
                    {
                        var.set_value(&data.value)?;
                    }
                }
            }
        }

        for (base, entries) in &buffer {
            if let Some(var) = self
                .plan
                .resolve(base)
                .and_then(|name| variables.get_mut(name))
            {
                var.merge_entries(entries)?;
            }
        }

        for var in variables.values_mut() {
            var.apply_default()?;
        }
        Ok(variables)
    }
}

fn declared_kind(variables: &VariableMap, name: &str) -> StatKind {
    variables
        .get(name)
        .map(StatVariable::kind)
        .unwrap_or(StatKind::Scalar)
}

fn buffer_entry(
    buffer: &mut BTreeMap<String, EntryReadings>,
    data: &DataLine,
    line: &str,
) -> std::result::Result<(), HarvestError> {
    let Some(entry) = data.entry_key() else {
        return Err(ParseError::MalformedLine {
            line: line.to_string(),
        }
        .into());
    };
    buffer
        .entry(data.base_id().to_string())
        .or_default()
        .entry(entry.to_string())
        .or_default()
        .push(data.value.clone());
    Ok(())
}
