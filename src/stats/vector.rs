//! Named-entry numeric statistic

use super::{
    is_standard_statistic, pad_slot, parse_readings, sum_readings, truncated_mean, EntryReadings,
    Lifecycle, StatKind,
};
use crate::error::StatResult;
use std::collections::BTreeMap;
use tracing::warn;

/// One number per configured entry (`cpu0`, `cpu1`, ...)
///
/// Keys outside the configured entry list are dropped. Summary statistics
/// (`total`, `mean`, ...) are dropped silently, anything else with a warning.
#[derive(Debug, Clone)]
pub struct Vector {
    pub(crate) life: Lifecycle,
    entries: Vec<String>,
    content: BTreeMap<String, Vec<f64>>,
    reduced: Option<BTreeMap<String, f64>>,
}

impl Vector {
    pub fn new(repeat: usize, entries: Vec<String>) -> Self {
        let content = entries.iter().map(|e| (e.clone(), Vec::new())).collect();
        Self {
            life: Lifecycle::new(StatKind::Vector, repeat),
            entries,
            content,
            reduced: None,
        }
    }

    pub fn entries(&self) -> &[String] {
        &self.entries
    }

    pub fn content(&self) -> &BTreeMap<String, Vec<f64>> {
        &self.content
    }

    /// Append every supplied reading to its entry
    pub fn set(&mut self, values: &EntryReadings) -> StatResult<()> {
        self.record(values, false)
    }

    /// Append one reading per entry, summing the readings supplied for it
    ///
    /// Used when several dumps or aliased ids collapse into one logical slot.
    pub fn merge(&mut self, values: &EntryReadings) -> StatResult<()> {
        self.record(values, true)
    }

    fn record(&mut self, values: &EntryReadings, merge: bool) -> StatResult<()> {
        self.life.check_settable()?;

        let mut accepted = Vec::with_capacity(values.len());
        for (key, readings) in values {
            if !self.content.contains_key(key) {
                if !is_standard_statistic(key) {
                    warn!(entry = %key, "Vector entry not configured, ignoring");
                }
                continue;
            }
            let parsed = if merge {
                vec![sum_readings(self.life.label(), key, readings)?]
            } else {
                parse_readings(self.life.label(), key, readings)?
            };
            accepted.push((key, parsed));
        }

        for (key, parsed) in accepted {
            if let Some(slot) = self.content.get_mut(key) {
                slot.extend(parsed);
            }
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
        let reduced = self
            .content
            .iter()
            .map(|(key, values)| (key.clone(), truncated_mean(values, repeat)))
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StatError;

    fn readings(pairs: &[(&str, &[&str])]) -> EntryReadings {
        pairs
            .iter()
            .map(|(k, vs)| (k.to_string(), vs.iter().map(|v| v.to_string()).collect()))
            .collect()
    }

    fn cpus() -> Vec<String> {
        vec!["cpu0".to_string(), "cpu1".to_string()]
    }

    #[test]
    fn test_per_entry_mean() {
        let mut vector = Vector::new(2, cpus());
        vector
            .set(&readings(&[("cpu0", &["10"]), ("cpu1", &["20"])]))
            .unwrap();
        vector
            .set(&readings(&[("cpu0", &["30"]), ("cpu1", &["40"])]))
            .unwrap();
        vector.balance().unwrap();
        vector.reduce().unwrap();

        let reduced = vector.reduced().unwrap();
        assert_eq!(reduced["cpu0"], 20.0);
        assert_eq!(reduced["cpu1"], 30.0);
    }

    #[test]
    fn test_repeated_assignments_append() {
        let mut vector = Vector::new(2, vec!["cpu0".to_string()]);
        vector.set(&readings(&[("cpu0", &["5"])])).unwrap();
        vector.set(&readings(&[("cpu0", &["7"])])).unwrap();
        assert_eq!(vector.content()["cpu0"], vec![5.0, 7.0]);

        vector.balance().unwrap();
        vector.reduce().unwrap();
        assert_eq!(vector.reduced().unwrap()["cpu0"], 6.0);
    }

    #[test]
    fn test_list_assignment_matches_repeated_assignment() {
        let mut once = Vector::new(2, vec!["cpu0".to_string()]);
        once.set(&readings(&[("cpu0", &["5", "7"])])).unwrap();
        assert_eq!(once.content()["cpu0"], vec![5.0, 7.0]);
    }

    #[test]
    fn test_merge_sums_readings() {
        let mut vector = Vector::new(1, vec!["cpu0".to_string()]);
        vector.merge(&readings(&[("cpu0", &["5", "7"])])).unwrap();
        assert_eq!(vector.content()["cpu0"], vec![12.0]);
    }

    #[test]
    fn test_unconfigured_keys_dropped() {
        let mut vector = Vector::new(1, cpus());
        vector
            .set(&readings(&[
                ("cpu0", &["1"]),
                ("cpu7", &["99"]),
                ("total", &["1"]),
            ]))
            .unwrap();
        vector.balance().unwrap();
        vector.reduce().unwrap();

        let reduced = vector.reduced().unwrap();
        assert_eq!(reduced.len(), 2);
        assert_eq!(reduced["cpu0"], 1.0);
        assert_eq!(reduced["cpu1"], 0.0);
    }

    #[test]
    fn test_non_numeric_leaves_content_untouched() {
        let mut vector = Vector::new(1, cpus());
        let err = vector
            .set(&readings(&[("cpu0", &["1"]), ("cpu1", &["n/a"])]))
            .unwrap_err();
        assert!(matches!(err, StatError::NotNumeric { .. }));
        assert!(vector.content()["cpu0"].is_empty());
    }

    #[test]
    fn test_entry_overflow() {
        let mut vector = Vector::new(1, cpus());
        vector.set(&readings(&[("cpu0", &["1"])])).unwrap();
        vector.set(&readings(&[("cpu0", &["2"])])).unwrap();
        assert!(matches!(
            vector.balance(),
            Err(StatError::TooManyValues { .. })
        ));
    }

    #[test]
    fn test_values_truncated_before_mean() {
        let mut vector = Vector::new(2, vec!["cpu0".to_string()]);
        vector.set(&readings(&[("cpu0", &["1.9"])])).unwrap();
        vector.set(&readings(&[("cpu0", &["2.9"])])).unwrap();
        vector.balance().unwrap();
        vector.reduce().unwrap();
        assert_eq!(vector.reduced().unwrap()["cpu0"], 1.5);
    }
}
