//! Fixed-bucket integer distribution

use super::{
    is_standard_statistic, mean, pad_slot, parse_readings, sum_readings, EntryReadings, Lifecycle,
    StatKind,
};
use crate::error::{StatError, StatResult};
use std::collections::BTreeMap;
use tracing::{debug, warn};

/// Extra summary keys simulators print next to distribution buckets
const EXTRA_SUMMARY_KEYS: [&str; 2] = ["min_value", "max_value"];

fn is_summary_key(key: &str) -> bool {
    is_standard_statistic(key) || EXTRA_SUMMARY_KEYS.contains(&key)
}

/// Distribution over the closed integer range `[minimum, maximum]`
///
/// The bucket set is a closed contract: every assignment must carry the
/// `underflows`/`overflows` buckets and both boundary buckets, and an integer
/// bucket outside the range is an error. Underflow and overflow are stored
/// under `"<min>-"` and `"<max>+"`.
#[derive(Debug, Clone)]
pub struct Distribution {
    pub(crate) life: Lifecycle,
    minimum: i64,
    maximum: i64,
    statistics: Vec<String>,
    statistics_only: bool,
    content: BTreeMap<String, Vec<f64>>,
    reduced: Option<BTreeMap<String, f64>>,
}

impl Distribution {
    pub fn new(
        repeat: usize,
        minimum: i64,
        maximum: i64,
        statistics: Vec<String>,
        statistics_only: bool,
    ) -> Self {
        let mut dist = Self {
            life: Lifecycle::new(StatKind::Distribution, repeat),
            minimum,
            maximum,
            statistics,
            statistics_only,
            content: BTreeMap::new(),
            reduced: None,
        };
        dist.content = dist
            .entries()
            .into_iter()
            .map(|key| (key, Vec::new()))
            .collect();
        dist
    }

    pub fn minimum(&self) -> i64 {
        self.minimum
    }

    pub fn maximum(&self) -> i64 {
        self.maximum
    }

    pub fn statistics_only(&self) -> bool {
        self.statistics_only
    }

    /// Key the `underflows` bucket is stored under
    pub fn underflow_key(&self) -> String {
        format!("{}-", self.minimum)
    }

    /// Key the `overflows` bucket is stored under
    pub fn overflow_key(&self) -> String {
        format!("{}+", self.maximum)
    }

    /// Output keys: underflow, every integer bucket, overflow, then statistics
    pub fn entries(&self) -> Vec<String> {
        let mut keys = Vec::new();
        if !self.statistics_only {
            keys.push(self.underflow_key());
            keys.extend((self.minimum..=self.maximum).map(|b| b.to_string()));
            keys.push(self.overflow_key());
        }
        for stat in &self.statistics {
            if !keys.contains(stat) {
                keys.push(stat.clone());
            }
        }
        keys
    }

    pub fn content(&self) -> &BTreeMap<String, Vec<f64>> {
        &self.content
    }

    /// Append every supplied reading to its bucket
    pub fn set(&mut self, values: &EntryReadings) -> StatResult<()> {
        self.record(values, false)
    }

    /// Append one summed reading per bucket
    pub fn merge(&mut self, values: &EntryReadings) -> StatResult<()> {
        self.record(values, true)
    }

    fn record(&mut self, values: &EntryReadings, merge: bool) -> StatResult<()> {
        self.life.check_settable()?;

        if !self.statistics_only {
            self.check_mandatory_keys(values)?;
        }

        let mut accepted = Vec::with_capacity(values.len());
        for (key, readings) in values {
            let Some(target) = self.target_key(key)? else {
                debug!(bucket = %key, "Distribution key not tracked, skipping");
                continue;
            };
            let parsed = if merge {
                vec![sum_readings(self.life.label(), key, readings)?]
            } else {
                parse_readings(self.life.label(), key, readings)?
            };
            accepted.push((target, parsed));
        }

        for (target, parsed) in accepted {
            self.content.entry(target).or_default().extend(parsed);
        }
        Ok(())
    }

    fn check_mandatory_keys(&self, values: &EntryReadings) -> StatResult<()> {
        let found = || values.keys().cloned().collect::<Vec<_>>();

        if !values.contains_key("underflows") || !values.contains_key("overflows") {
            return Err(StatError::MissingOverflowBuckets { found: found() });
        }
        if !values.contains_key(&self.minimum.to_string())
            || !values.contains_key(&self.maximum.to_string())
        {
            return Err(StatError::MissingBoundaryBuckets {
                minimum: self.minimum,
                maximum: self.maximum,
                found: found(),
            });
        }
        Ok(())
    }

    /// Map an incoming key to its storage key; `None` means skip
    fn target_key(&self, key: &str) -> StatResult<Option<String>> {
        if self.statistics.iter().any(|s| s == key) {
            return Ok(Some(key.to_string()));
        }
        if self.statistics_only {
            return Ok(None);
        }

        match key {
            "underflows" => Ok(Some(self.underflow_key())),
            "overflows" => Ok(Some(self.overflow_key())),
            _ => match key.trim().parse::<i64>() {
                Ok(bucket) if (self.minimum..=self.maximum).contains(&bucket) => {
                    Ok(Some(bucket.to_string()))
                }
                Err(_) if is_summary_key(key) => Ok(None),
                Err(_) => {
                    warn!(bucket = %key, "Distribution bucket is not an integer, skipping");
                    Ok(None)
                }
                Ok(_) => Err(StatError::BucketOutOfRange {
                    bucket: key.to_string(),
                    minimum: self.minimum,
                    maximum: self.maximum,
                }),
            },
        }
    }

    pub fn balance(&mut self) -> StatResult<()> {
        if self.life.check_settable().is_ok() {
            let repeat = self.life.repeat();
            for (key, values) in self.content.iter_mut() {
                pad_slot(self.life.label(), key, values, repeat)?;
            }
            self.life.mark_balanced();
        }
        Ok(())
    }

    pub fn reduce(&mut self) -> StatResult<()> {
        self.life.check_reducible()?;
        let repeat = self.life.repeat();
        let reduced = self
            .content
            .iter()
            .map(|(key, values)| (key.clone(), mean(values, repeat)))
            .collect();
        self.reduced = Some(reduced);
        self.life.mark_reduced();
        Ok(())
    }

    pub fn reduced(&self) -> StatResult<&BTreeMap<String, f64>> {
        self.life.check_reduced()?;
        static EMPTY: BTreeMap<String, f64> = BTreeMap::new();
        Ok(self.reduced.as_ref().unwrap_or(&EMPTY))
    }
}
