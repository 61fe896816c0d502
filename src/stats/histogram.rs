//! Range-bucket histogram with optional rebinning
//!
//! Simulators print histogram buckets as `start-end` ranges whose boundaries
//! depend on the observed data, so two runs of the same benchmark rarely
//! agree on the layout. Rebinning maps every source bucket onto a fixed
//! target layout:
//!
//! ```text
//! bins = 3, max_range = 30  ->  num_std_bins = 2, bin_width = 15
//!
//!   source   [0 ─────────────── 30)              value 30
//!   target   [0 ──── 15)[15 ─── 30)[30+ ...      15 | 15 | 0
//! ```
//!
//! Mass is split proportionally to the overlap between the source range and
//! each target range. The part of a source bucket beyond `max_range` goes to
//! the `"<max_range>+"` bucket, or to the last bin when `bins == 1`.

use super::{mean, pad_slot, parse_readings, sum_readings, EntryReadings, Lifecycle, StatKind};
use crate::error::StatResult;
use regex::Regex;
use std::collections::BTreeMap;
use std::sync::LazyLock;

/// `start-end` bucket keys
static RANGE_KEY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\d+)-(\d+)").expect("Invalid range key regex"));

/// Parse a `start-end` key into its bounds
fn parse_range(key: &str) -> Option<(f64, f64)> {
    let caps = RANGE_KEY.captures(key)?;
    let start = caps.get(1)?.as_str().parse::<f64>().ok()?;
    let end = caps.get(2)?.as_str().parse::<f64>().ok()?;
    Some((start, end))
}

/// Target layout for rebinning
#[derive(Debug, Clone, PartialEq)]
struct RebinLayout {
    bin_width: f64,
    max_range: f64,
    keys: Vec<String>,
    overflow_key: Option<String>,
}

impl RebinLayout {
    fn new(bins: usize, max_range: f64) -> Self {
        let num_std_bins = if bins > 1 { bins - 1 } else { 1 };
        let bin_width = max_range / num_std_bins as f64;
        let keys = (0..num_std_bins)
            .map(|b| {
                let start = (b as f64 * bin_width) as i64;
                let end = ((b + 1) as f64 * bin_width) as i64;
                format!("{}-{}", start, end)
            })
            .collect();
        let overflow_key = (bins > 1).then(|| format!("{}+", max_range as i64));
        Self {
            bin_width,
            max_range,
            keys,
            overflow_key,
        }
    }

    /// Every output key in order
    fn all_keys(&self) -> Vec<String> {
        let mut keys = self.keys.clone();
        keys.extend(self.overflow_key.clone());
        keys
    }

    /// Redistribute one snapshot of source buckets into `target`
    fn redistribute<'a>(
        &self,
        source: impl Iterator<Item = (&'a String, f64)>,
        target: &mut BTreeMap<String, f64>,
    ) {
        for (key, value) in source {
            if value == 0.0 {
                continue;
            }
            let Some((start, end)) = parse_range(key) else {
                // statistics and other named keys pass through
                *target.entry(key.clone()).or_default() += value;
                continue;
            };
            let span = end - start;
            if span <= 0.0 {
                continue;
            }

            for (b, target_key) in self.keys.iter().enumerate() {
                let bin_start = b as f64 * self.bin_width;
                let bin_end = (b + 1) as f64 * self.bin_width;
                let overlap = end.min(bin_end) - start.max(bin_start);
                if overlap > 0.0 {
                    *target.entry(target_key.clone()).or_default() += value * overlap / span;
                }
            }

            let overflow = end - start.max(self.max_range);
            if overflow > 0.0 {
                let sink = self
                    .overflow_key
                    .as_ref()
                    .or_else(|| self.keys.last())
                    .cloned();
                if let Some(sink) = sink {
                    *target.entry(sink).or_default() += value * overflow / span;
                }
            }
        }
    }
}

/// Histogram over dynamically discovered `start-end` buckets
#[derive(Debug, Clone)]
pub struct Histogram {
    pub(crate) life: Lifecycle,
    layout: Option<RebinLayout>,
    explicit_entries: Option<Vec<String>>,
    statistics: Vec<String>,
    content: BTreeMap<String, Vec<f64>>,
    reduced: Option<BTreeMap<String, f64>>,
}

impl Histogram {
    /// Create a histogram; rebinning is active when both `bins` and `max_range` are positive
    pub fn new(
        repeat: usize,
        bins: usize,
        max_range: f64,
        entries: Option<Vec<String>>,
        statistics: Vec<String>,
    ) -> Self {
        let layout = (bins > 0 && max_range > 0.0).then(|| RebinLayout::new(bins, max_range));
        let content = statistics
            .iter()
            .chain(entries.iter().flatten())
            .map(|key| (key.clone(), Vec::new()))
            .collect();
        Self {
            life: Lifecycle::new(StatKind::Histogram, repeat),
            layout,
            explicit_entries: entries,
            statistics,
            content,
            reduced: None,
        }
    }

    pub fn is_rebinning(&self) -> bool {
        self.layout.is_some()
    }

    pub fn content(&self) -> &BTreeMap<String, Vec<f64>> {
        &self.content
    }

    /// Output keys
    ///
    /// Explicit entries win, then the rebinned layout, then the discovered
    /// buckets in sorted order. Statistics always come last.
    pub fn entries(&self) -> Vec<String> {
        let mut keys = if let Some(explicit) = &self.explicit_entries {
            explicit.clone()
        } else if let Some(layout) = &self.layout {
            layout.all_keys()
        } else {
            self.content
                .keys()
                .filter(|k| !self.statistics.contains(k))
                .cloned()
                .collect()
        };
        for stat in &self.statistics {
            if !keys.contains(stat) {
                keys.push(stat.clone());
            }
        }
        keys
    }

    /// Append every supplied reading, discovering new buckets on the way
    pub fn set(&mut self, values: &EntryReadings) -> StatResult<()> {
        self.record(values, false)
    }

    /// Append one summed reading per bucket
    pub fn merge(&mut self, values: &EntryReadings) -> StatResult<()> {
        self.record(values, true)
    }

    fn record(&mut self, values: &EntryReadings, merge: bool) -> StatResult<()> {
        self.life.check_settable()?;

        let mut accepted = Vec::with_capacity(values.len());
        for (key, readings) in values {
            let parsed = if merge {
                vec![sum_readings(self.life.label(), key, readings)?]
            } else {
                parse_readings(self.life.label(), key, readings)?
            };
            accepted.push((key, parsed));
        }

        for (key, parsed) in accepted {
            self.content.entry(key.clone()).or_default().extend(parsed);
        }
        Ok(())
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

        let reduced = match &self.layout {
            Some(layout) => {
                let mut target: BTreeMap<String, f64> = layout
                    .all_keys()
                    .into_iter()
                    .chain(self.entries())
                    .map(|k| (k, 0.0))
                    .collect();
                for index in 0..repeat {
                    let snapshot = self
                        .content
                        .iter()
                        .map(|(key, values)| (key, values.get(index).copied().unwrap_or(0.0)));
                    layout.redistribute(snapshot, &mut target);
                }
                for value in target.values_mut() {
                    *value /= repeat as f64;
                }
                target
            }
            None => self
                .content
                .iter()
                .map(|(key, values)| (key.clone(), mean(values, repeat)))
                .collect(),
        };

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
