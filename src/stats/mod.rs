//! Typed statistic accumulators
//!
//! Every requested variable gets one [`StatVariable`] per stats file. A
//! variable collects raw readings while the worker output is demultiplexed,
//! is then padded to exactly `repeat` readings per slot ("balanced") and
//! finally collapsed into one canonical value per slot ("reduced").
//!
//! ```text
//!   set() ... set()        balance()           reduce()
//! ┌──────────────┐     ┌──────────────┐     ┌──────────────┐
//! │ Accumulating │ ──▶ │   Balanced   │ ──▶ │   Reduced    │ ──▶ reduced_content()
//! └──────────────┘     └──────────────┘     └──────────────┘
//! ```
//!
//! Reading the reduced content in any state other than `Reduced` is an error.

pub mod configuration;
pub mod distribution;
pub mod factory;
pub mod histogram;
pub mod scalar;
pub mod vector;

pub use configuration::Configuration;
pub use distribution::Distribution;
pub use factory::create;
pub use histogram::Histogram;
pub use scalar::Scalar;
pub use vector::Vector;

use crate::error::{StatError, StatResult};
use std::collections::BTreeMap;
use std::fmt;

/// Raw readings for entry-bearing variables: entry key -> readings from one assignment
pub type EntryReadings = BTreeMap<String, Vec<String>>;

/// Summary statistics that simulators append to entry-bearing stats
pub const STANDARD_STATISTICS: [&str; 5] = ["total", "mean", "samples", "stdev", "gmean"];

/// Check whether a key is one of the standard summary statistics
pub fn is_standard_statistic(key: &str) -> bool {
    STANDARD_STATISTICS.contains(&key)
}

/// The five statistic variants
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StatKind {
    Scalar,
    Vector,
    Distribution,
    Histogram,
    Configuration,
}

impl StatKind {
    /// Parse a type tag, ignoring case
    pub fn parse(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "scalar" => Some(StatKind::Scalar),
            "vector" => Some(StatKind::Vector),
            "distribution" => Some(StatKind::Distribution),
            "histogram" => Some(StatKind::Histogram),
            "configuration" => Some(StatKind::Configuration),
            _ => None,
        }
    }

    /// Lowercase tag as used on the worker protocol
    pub fn as_str(&self) -> &'static str {
        match self {
            StatKind::Scalar => "scalar",
            StatKind::Vector => "vector",
            StatKind::Distribution => "distribution",
            StatKind::Histogram => "histogram",
            StatKind::Configuration => "configuration",
        }
    }

    /// Uppercase label used in error messages
    pub fn label(&self) -> &'static str {
        match self {
            StatKind::Scalar => "SCALAR",
            StatKind::Vector => "VECTOR",
            StatKind::Distribution => "DISTRIBUTION",
            StatKind::Histogram => "HISTOGRAM",
            StatKind::Configuration => "CONFIGURATION",
        }
    }

    /// Vector, distribution and histogram values are keyed by entry
    pub fn is_entry_type(&self) -> bool {
        matches!(
            self,
            StatKind::Vector | StatKind::Distribution | StatKind::Histogram
        )
    }
}

impl fmt::Display for StatKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle state of a statistic
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatState {
    Accumulating,
    Balanced,
    Reduced,
}

impl StatState {
    fn as_str(&self) -> &'static str {
        match self {
            StatState::Accumulating => "accumulating",
            StatState::Balanced => "balanced",
            StatState::Reduced => "reduced",
        }
    }
}

/// State machine shared by every variant
#[derive(Debug, Clone)]
pub(crate) struct Lifecycle {
    kind: StatKind,
    repeat: usize,
    state: StatState,
}

impl Lifecycle {
    pub(crate) fn new(kind: StatKind, repeat: usize) -> Self {
        Self {
            kind,
            repeat: repeat.max(1),
            state: StatState::Accumulating,
        }
    }

    pub(crate) fn kind(&self) -> StatKind {
        self.kind
    }

    pub(crate) fn label(&self) -> &'static str {
        self.kind.label()
    }

    pub(crate) fn repeat(&self) -> usize {
        self.repeat
    }

    pub(crate) fn state(&self) -> StatState {
        self.state
    }

    fn invalid(&self, action: &'static str) -> StatError {
        StatError::InvalidState {
            kind: self.kind.label(),
            action,
            state: self.state.as_str(),
        }
    }

    pub(crate) fn check_settable(&self) -> StatResult<()> {
        match self.state {
            StatState::Accumulating => Ok(()),
            _ => Err(self.invalid("set content")),
        }
    }

    pub(crate) fn mark_balanced(&mut self) {
        if self.state == StatState::Accumulating {
            self.state = StatState::Balanced;
        }
    }

    pub(crate) fn check_reducible(&self) -> StatResult<()> {
        match self.state {
            StatState::Accumulating => Err(self.invalid("reduce before balancing")),
            _ => Ok(()),
        }
    }

    pub(crate) fn mark_reduced(&mut self) {
        self.state = StatState::Reduced;
    }

    pub(crate) fn check_reduced(&self) -> StatResult<()> {
        match self.state {
            StatState::Reduced => Ok(()),
            _ => Err(self.invalid("read reduced content before balance and reduce")),
        }
    }
}

/// Parse a raw reading as a number (integers and floats alike)
pub(crate) fn parse_number(kind: &'static str, key: &str, value: &str) -> StatResult<f64> {
    value
        .trim()
        .parse::<f64>()
        .map_err(|_| StatError::NotNumeric {
            kind,
            key: key.to_string(),
            value: value.to_string(),
        })
}

/// Parse every reading of one assignment
pub(crate) fn parse_readings(
    kind: &'static str,
    key: &str,
    values: &[String],
) -> StatResult<Vec<f64>> {
    values.iter().map(|v| parse_number(kind, key, v)).collect()
}

/// Sum a multi-reading assignment into one aggregated reading
pub(crate) fn sum_readings(kind: &'static str, key: &str, values: &[String]) -> StatResult<f64> {
    values
        .iter()
        .map(|v| parse_number(kind, key, v))
        .sum::<StatResult<f64>>()
}

/// Pad a slot to `repeat` readings, or fail if it already holds more
pub(crate) fn pad_slot(
    kind: &'static str,
    slot: &str,
    values: &mut Vec<f64>,
    repeat: usize,
) -> StatResult<()> {
    if values.len() > repeat {
        return Err(StatError::TooManyValues {
            kind,
            slot: slot.to_string(),
            found: values.len(),
            repeat,
        });
    }
    values.resize(repeat, 0.0);
    Ok(())
}

/// Mean of the first `repeat` readings, each truncated toward zero first
pub(crate) fn truncated_mean(values: &[f64], repeat: usize) -> f64 {
    let total: f64 = values.iter().take(repeat).map(|v| v.trunc()).sum();
    total / repeat as f64
}

/// Mean of the first `repeat` readings
pub(crate) fn mean(values: &[f64], repeat: usize) -> f64 {
    let total: f64 = values.iter().take(repeat).sum();
    total / repeat as f64
}

/// Canonical value of a reduced statistic
#[derive(Debug, Clone, PartialEq)]
pub enum ReducedValue {
    /// Scalar mean
    Number(f64),
    /// Configuration string
    Text(String),
    /// Per-entry means for vectors, distributions and histograms
    Entries(BTreeMap<String, f64>),
}

impl ReducedValue {
    /// Per-entry values, if this is an entry-bearing statistic
    pub fn as_entries(&self) -> Option<&BTreeMap<String, f64>> {
        match self {
            ReducedValue::Entries(e) => Some(e),
            _ => None,
        }
    }

    /// Render a single cell (entry types render one cell per entry instead)
    pub fn render(&self) -> String {
        match self {
            ReducedValue::Number(n) => format_number(*n),
            ReducedValue::Text(s) => s.clone(),
            ReducedValue::Entries(e) => e
                .iter()
                .map(|(k, v)| format!("{}={}", k, format_number(*v)))
                .collect::<Vec<_>>()
                .join(";"),
        }
    }
}

/// Format a number the way the CSV consumers expect (`20.0`, `1.5`, `nan`)
pub fn format_number(value: f64) -> String {
    if value.is_nan() {
        "nan".to_string()
    } else if value.is_infinite() {
        if value > 0.0 { "inf" } else { "-inf" }.to_string()
    } else if value.fract() == 0.0 && value.abs() < 1e16 {
        format!("{:.1}", value)
    } else {
        format!("{}", value)
    }
}

/// One statistic instance, owned by the parse unit of a single file
#[derive(Debug, Clone)]
pub enum StatVariable {
    Scalar(Scalar),
    Vector(Vector),
    Distribution(Distribution),
    Histogram(Histogram),
    Configuration(Configuration),
}

impl StatVariable {
    /// Variant tag
    pub fn kind(&self) -> StatKind {
        match self {
            StatVariable::Scalar(_) => StatKind::Scalar,
            StatVariable::Vector(_) => StatKind::Vector,
            StatVariable::Distribution(_) => StatKind::Distribution,
            StatVariable::Histogram(_) => StatKind::Histogram,
            StatVariable::Configuration(_) => StatKind::Configuration,
        }
    }

    fn lifecycle(&self) -> &Lifecycle {
        match self {
            StatVariable::Scalar(s) => &s.life,
            StatVariable::Vector(v) => &v.life,
            StatVariable::Distribution(d) => &d.life,
            StatVariable::Histogram(h) => &h.life,
            StatVariable::Configuration(c) => &c.life,
        }
    }

    /// Expected readings per slot
    pub fn repeat(&self) -> usize {
        self.lifecycle().repeat()
    }

    /// Current lifecycle state
    pub fn state(&self) -> StatState {
        self.lifecycle().state()
    }

    /// Record a single reading (scalar and configuration variables)
    pub fn set_value(&mut self, value: &str) -> StatResult<()> {
        match self {
            StatVariable::Scalar(s) => s.set(value),
            StatVariable::Configuration(c) => c.set(value),
            other => Err(StatError::WrongShape {
                kind: other.kind().label(),
                reason: format!("expected entry readings, got single value '{}'", value),
            }),
        }
    }

    /// Record entry-keyed readings, summing the readings given per key
    ///
    /// Readings collected for one key across the dumps of a single file
    /// collapse into one aggregated reading.
    pub fn merge_entries(&mut self, values: &EntryReadings) -> StatResult<()> {
        match self {
            StatVariable::Vector(v) => v.merge(values),
            StatVariable::Distribution(d) => d.merge(values),
            StatVariable::Histogram(h) => h.merge(values),
            other => Err(StatError::WrongShape {
                kind: other.kind().label(),
                reason: format!(
                    "expected a single value, got entries {:?}",
                    values.keys().collect::<Vec<_>>()
                ),
            }),
        }
    }

    /// Pad every slot to `repeat` readings
    pub fn balance(&mut self) -> StatResult<()> {
        match self {
            StatVariable::Scalar(s) => s.balance(),
            StatVariable::Vector(v) => v.balance(),
            StatVariable::Distribution(d) => d.balance(),
            StatVariable::Histogram(h) => h.balance(),
            StatVariable::Configuration(c) => c.balance(),
        }
    }

    /// Collapse balanced readings into one value per slot
    pub fn reduce(&mut self) -> StatResult<()> {
        match self {
            StatVariable::Scalar(s) => s.reduce(),
            StatVariable::Vector(v) => v.reduce(),
            StatVariable::Distribution(d) => d.reduce(),
            StatVariable::Histogram(h) => h.reduce(),
            StatVariable::Configuration(c) => c.reduce(),
        }
    }

    /// Balance then reduce
    pub fn finalize(&mut self) -> StatResult<()> {
        self.balance()?;
        self.reduce()
    }

    /// Reduced value; only available once balanced and reduced
    pub fn reduced_content(&self) -> StatResult<ReducedValue> {
        match self {
            StatVariable::Scalar(s) => s.reduced().map(ReducedValue::Number),
            StatVariable::Vector(v) => v.reduced().map(|r| ReducedValue::Entries(r.clone())),
            StatVariable::Distribution(d) => {
                d.reduced().map(|r| ReducedValue::Entries(r.clone()))
            }
            StatVariable::Histogram(h) => h.reduced().map(|r| ReducedValue::Entries(r.clone())),
            StatVariable::Configuration(c) => c.reduced().map(|r| ReducedValue::Text(r.to_string())),
        }
    }

    /// Output entry keys for entry-bearing variables, in column order
    pub fn entries(&self) -> Option<Vec<String>> {
        match self {
            StatVariable::Scalar(_) | StatVariable::Configuration(_) => None,
            StatVariable::Vector(v) => Some(v.entries().to_vec()),
            StatVariable::Distribution(d) => Some(d.entries()),
            StatVariable::Histogram(h) => Some(h.entries()),
        }
    }

    /// Whether any reading has been recorded
    pub fn has_content(&self) -> bool {
        match self {
            StatVariable::Scalar(s) => !s.content().is_empty(),
            StatVariable::Vector(v) => v.content().values().any(|r| !r.is_empty()),
            StatVariable::Distribution(d) => d.content().values().any(|r| !r.is_empty()),
            StatVariable::Histogram(h) => h.content().values().any(|r| !r.is_empty()),
            StatVariable::Configuration(c) => !c.content().is_empty(),
        }
    }

    /// Give a variable that saw no readings its default content
    ///
    /// Scalars get a single `0`, configurations their `onEmpty` value. Entry
    /// types are left alone; balancing zero-fills their slots.
    pub fn apply_default(&mut self) -> StatResult<()> {
        if self.has_content() {
            return Ok(());
        }
        match self {
            StatVariable::Scalar(s) => s.set("0"),
            StatVariable::Configuration(c) => {
                let fallback = c.on_empty().to_string();
                c.set(&fallback)
            }
            _ => Ok(()),
        }
    }
}

impl From<Scalar> for StatVariable {
    fn from(value: Scalar) -> Self {
        StatVariable::Scalar(value)
    }
}

impl From<Vector> for StatVariable {
    fn from(value: Vector) -> Self {
        StatVariable::Vector(value)
    }
}

impl From<Distribution> for StatVariable {
    fn from(value: Distribution) -> Self {
        StatVariable::Distribution(value)
    }
}

impl From<Histogram> for StatVariable {
    fn from(value: Histogram) -> Self {
        StatVariable::Histogram(value)
    }
}

impl From<Configuration> for StatVariable {
    fn from(value: Configuration) -> Self {
        StatVariable::Configuration(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn readings(pairs: &[(&str, &[&str])]) -> EntryReadings {
        pairs
            .iter()
            .map(|(k, vs)| (k.to_string(), vs.iter().map(|v| v.to_string()).collect()))
            .collect()
    }

    #[test]
    fn test_kind_parse_is_case_insensitive() {
        assert_eq!(StatKind::parse("Scalar"), Some(StatKind::Scalar));
        assert_eq!(StatKind::parse("HISTOGRAM"), Some(StatKind::Histogram));
        assert_eq!(StatKind::parse(" vector "), Some(StatKind::Vector));
        assert_eq!(StatKind::parse("summary"), None);
        assert!(StatKind::Distribution.is_entry_type());
        assert!(!StatKind::Configuration.is_entry_type());
    }

    #[test]
    fn test_format_number() {
        assert_eq!(format_number(20.0), "20.0");
        assert_eq!(format_number(1.5), "1.5");
        assert_eq!(format_number(0.0), "0.0");
        assert_eq!(format_number(-3.0), "-3.0");
        assert_eq!(format_number(f64::NAN), "nan");
    }

    #[test]
    fn test_reduced_access_requires_balance_and_reduce() {
        let mut variables: Vec<StatVariable> = vec![
            Scalar::new(1).into(),
            Vector::new(1, vec!["cpu0".into()]).into(),
            Distribution::new(1, 0, 2, Vec::new(), false).into(),
            Histogram::new(1, 0, 0.0, None, Vec::new()).into(),
            Configuration::new("None").into(),
        ];

        for var in variables.iter_mut() {
            assert!(matches!(
                var.reduced_content(),
                Err(StatError::InvalidState { .. })
            ));
            // reducing before balancing is refused as well
            assert!(var.reduce().is_err());
            var.balance().unwrap();
            assert!(var.reduced_content().is_err());
            var.reduce().unwrap();
            assert!(var.reduced_content().is_ok());
            assert_eq!(var.state(), StatState::Reduced);
        }
    }

    #[test]
    fn test_set_after_balance_is_refused() {
        let mut var: StatVariable = Scalar::new(2).into();
        var.set_value("1").unwrap();
        var.balance().unwrap();
        assert!(matches!(
            var.set_value("2"),
            Err(StatError::InvalidState { .. })
        ));
    }

    #[test]
    fn test_wrong_shape() {
        let mut scalar: StatVariable = Scalar::new(1).into();
        assert!(matches!(
            scalar.merge_entries(&readings(&[("a", &["1"])])),
            Err(StatError::WrongShape { .. })
        ));

        let mut vector: StatVariable = Vector::new(1, vec!["a".into()]).into();
        assert!(matches!(
            vector.set_value("1"),
            Err(StatError::WrongShape { .. })
        ));
    }

    #[test]
    fn test_apply_default() {
        let mut scalar: StatVariable = Scalar::new(2).into();
        scalar.apply_default().unwrap();
        scalar.finalize().unwrap();
        assert_eq!(scalar.reduced_content().unwrap(), ReducedValue::Number(0.0));

        let mut conf: StatVariable = Configuration::new("unknown").into();
        conf.apply_default().unwrap();
        conf.finalize().unwrap();
        assert_eq!(
            conf.reduced_content().unwrap(),
            ReducedValue::Text("unknown".into())
        );

        let mut vector: StatVariable = Vector::new(1, vec!["a".into()]).into();
        vector.apply_default().unwrap();
        assert!(!vector.has_content());
    }

    #[test]
    fn test_pad_slot_overflow() {
        let mut values = vec![1.0, 2.0, 3.0];
        let err = pad_slot("SCALAR", "value", &mut values, 2).unwrap_err();
        assert!(matches!(err, StatError::TooManyValues { found: 3, repeat: 2, .. }));

        let mut short = vec![1.0];
        pad_slot("SCALAR", "value", &mut short, 3).unwrap();
        assert_eq!(short, vec![1.0, 0.0, 0.0]);
    }
}
