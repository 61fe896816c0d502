//! Variable factory
//!
//! Turns a [`VariableConfig`] into a fresh [`StatVariable`], resolving the
//! legacy parameter spellings and the per-type defaults.

use super::configuration::DEFAULT_ON_EMPTY;
use super::{Configuration, Distribution, Histogram, Scalar, StatKind, StatVariable, Vector};
use crate::config::VariableConfig;
use crate::error::ConfigError;

/// Default distribution range when none is configured
const DEFAULT_MINIMUM: i64 = 0;
const DEFAULT_MAXIMUM: i64 = 100;

/// Resolve the declared type of a configuration
pub fn kind_of(config: &VariableConfig) -> Result<StatKind, ConfigError> {
    let tag = config
        .kind
        .as_deref()
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .ok_or_else(|| ConfigError::MissingType {
            name: config.name.clone(),
        })?;

    StatKind::parse(tag).ok_or_else(|| ConfigError::UnknownType {
        name: config.name.clone(),
        kind: tag.to_string(),
    })
}

/// Create a statistic from its configuration
pub fn create(config: &VariableConfig) -> Result<StatVariable, ConfigError> {
    let kind = kind_of(config)?;
    let params = &config.params;
    let statistics_only = params.statistics_only();

    let repeat = config.effective_repeat();
    if repeat == 0 {
        return Err(ConfigError::InvalidParameter {
            name: config.name.clone(),
            param: "repeat".into(),
            reason: "must be at least 1".into(),
        });
    }

    let variable = match kind {
        StatKind::Scalar => Scalar::new(repeat).into(),

        StatKind::Vector => {
            let entries = if statistics_only {
                params
                    .statistics
                    .as_ref()
                    .map(|s| s.to_vec())
                    .unwrap_or_default()
            } else {
                params
                    .vector_entries
                    .as_ref()
                    .or(params.entries.as_ref())
                    .map(|e| e.to_vec())
                    .filter(|e| !e.is_empty())
                    .ok_or_else(|| ConfigError::MissingEntries {
                        name: config.name.clone(),
                    })?
            };
            Vector::new(repeat, entries).into()
        }

        StatKind::Distribution => {
            let (minimum, maximum) = if statistics_only {
                (0, 0)
            } else {
                (
                    params.minimum.unwrap_or(DEFAULT_MINIMUM),
                    params.maximum.unwrap_or(DEFAULT_MAXIMUM),
                )
            };
            if minimum > maximum {
                return Err(ConfigError::InvalidParameter {
                    name: config.name.clone(),
                    param: "minimum".into(),
                    reason: format!("minimum {} is greater than maximum {}", minimum, maximum),
                });
            }
            let statistics = params
                .vector_entries
                .as_ref()
                .or(params.statistics.as_ref())
                .map(|s| s.to_vec())
                .unwrap_or_default();
            Distribution::new(repeat, minimum, maximum, statistics, statistics_only).into()
        }

        StatKind::Histogram => {
            let statistics = params
                .statistics
                .as_ref()
                .or(params.vector_entries.as_ref())
                .map(|s| s.to_vec())
                .unwrap_or_default();
            if statistics_only {
                Histogram::new(repeat, 0, 0.0, None, statistics).into()
            } else {
                let max_range = params.max_range.unwrap_or(0.0);
                if !max_range.is_finite() || max_range < 0.0 {
                    return Err(ConfigError::InvalidParameter {
                        name: config.name.clone(),
                        param: "max_range".into(),
                        reason: "must be a non-negative number".into(),
                    });
                }
                let entries = params
                    .entries
                    .as_ref()
                    .map(|e| e.to_vec())
                    .filter(|e| !e.is_empty());
                Histogram::new(
                    repeat,
                    params.bins.unwrap_or(0),
                    max_range,
                    entries,
                    statistics,
                )
                .into()
            }
        }

        StatKind::Configuration => Configuration::new(
            params
                .on_empty
                .clone()
                .unwrap_or_else(|| DEFAULT_ON_EMPTY.to_string()),
        )
        .into(),
    };

    Ok(variable)
}
