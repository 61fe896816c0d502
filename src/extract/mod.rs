//! Reference extractor for simulator stats files
//!
//! Stats files hold one statistic per line:
//!
//! ```text
//! ---------- Begin Simulation Statistics ----------
//! system.cpu.ipc                      1.5        # Instructions per cycle
//! system.cpu.dcache.misses::cpu0      10         # Misses per core
//! system.mem.latency::0-4             3          30.00%   30.00%
//! system.mem.queue::underflows        0
//! ---------- End Simulation Statistics   ----------
//! ```
//!
//! The first token is the id (`base::entry` for entries and buckets), the
//! second the value. Anything after the value, and comments, is ignored.
//! A file may contain several dumps; every occurrence is reported.

pub mod server;

pub use server::{serve, ServeStats};

use crate::stats::{format_number, is_standard_statistic, StatKind};
use crate::worker::protocol::{split_entry, DataLine, RawKind};
use regex::Regex;
use std::collections::HashMap;
use std::io::{self, BufRead};
use std::sync::LazyLock;
use tracing::debug;

static RANGE_ENTRY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\d+(\.\d+)?-\d+(\.\d+)?$").expect("Invalid range entry regex"));

/// Request keys compiled for matching against stat base names
///
/// A key is a regex that must match the whole base name. Keys that do not
/// compile are compared literally.
#[derive(Debug)]
pub struct KeyMatcher {
    patterns: Vec<Regex>,
    literals: Vec<String>,
}

impl KeyMatcher {
    pub fn new(keys: &[String]) -> Self {
        let mut patterns = Vec::new();
        let mut literals = Vec::new();
        for key in keys {
            match Regex::new(&format!("^(?:{})$", key)) {
                Ok(re) => patterns.push(re),
                Err(_) => literals.push(key.clone()),
            }
        }
        Self { patterns, literals }
    }

    pub fn matches(&self, base: &str) -> bool {
        self.literals.iter().any(|l| l == base) || self.patterns.iter().any(|p| p.is_match(base))
    }
}

/// Split a stats line into id and value
///
/// Returns `None` for blank lines, comments, dump delimiters and lines
/// without a value.
pub fn parse_stat_line(line: &str) -> Option<(&str, &str)> {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') || line.starts_with("---") {
        return None;
    }
    let line = line.split('#').next().unwrap_or_default();
    let mut tokens = line.split_whitespace();
    let id = tokens.next()?;
    let value = tokens.next()?;
    Some((id, value))
}

struct Occurrence {
    base: String,
    entry: Option<String>,
    value: String,
}

/// Latest value per entry, used for the summary line
#[derive(Default)]
struct Group {
    entries: Vec<String>,
    latest: HashMap<String, String>,
    numeric: bool,
}

impl Group {
    fn kind(&self) -> StatKind {
        if self.entries.is_empty() {
            return if self.numeric {
                StatKind::Scalar
            } else {
                StatKind::Configuration
            };
        }
        if self
            .entries
            .iter()
            .any(|e| e == "underflows" || e == "overflows")
        {
            StatKind::Distribution
        } else if self.entries.iter().any(|e| RANGE_ENTRY.is_match(e)) {
            StatKind::Histogram
        } else {
            StatKind::Vector
        }
    }

    fn summary(&self) -> String {
        if let Some(total) = self.latest.get("total") {
            return total.clone();
        }
        let sum: f64 = self
            .latest
            .iter()
            .filter(|(entry, _)| {
                !is_standard_statistic(entry) && !matches!(entry.as_str(), "min_value" | "max_value")
            })
            .filter_map(|(_, value)| value.parse::<f64>().ok())
            .sum();
        format_number(sum)
    }
}

/// Extract the statistics whose base name matches one of `keys`
///
/// Each base name is classified over the whole file, then one data line is
/// produced per occurrence in file order, followed by one summary line per
/// entry-bearing statistic. Plain values of a statistic that also has
/// entries are dropped.
pub fn extract<R: BufRead>(mut reader: R, keys: &[String]) -> io::Result<Vec<DataLine>> {
    let matcher = KeyMatcher::new(keys);
    let mut decisions: HashMap<String, bool> = HashMap::new();
    let mut occurrences = Vec::new();
    let mut groups: HashMap<String, Group> = HashMap::new();
    let mut order: Vec<String> = Vec::new();

    let mut buf = Vec::new();
    loop {
        buf.clear();
        if reader.read_until(b'\n', &mut buf)? == 0 {
            break;
        }
        let line = String::from_utf8_lossy(&buf);
        let Some((id, value)) = parse_stat_line(&line) else {
            continue;
        };

        let (base, entry) = split_entry(id);
        let wanted = match decisions.get(base) {
            Some(&wanted) => wanted,
            None => {
                let wanted = matcher.matches(base);
                decisions.insert(base.to_string(), wanted);
                wanted
            }
        };
        if !wanted {
            continue;
        }

        let group = groups.entry(base.to_string()).or_insert_with(|| {
            order.push(base.to_string());
            Group {
                numeric: true,
                ..Group::default()
            }
        });
        match entry {
            Some(entry) => {
                if !group.latest.contains_key(entry) {
                    group.entries.push(entry.to_string());
                }
                group.latest.insert(entry.to_string(), value.to_string());
            }
            None => group.numeric &= value.parse::<f64>().is_ok(),
        }

        occurrences.push(Occurrence {
            base: base.to_string(),
            entry: entry.map(str::to_string),
            value: value.to_string(),
        });
    }

    let kinds: HashMap<&str, StatKind> = groups
        .iter()
        .map(|(base, group)| (base.as_str(), group.kind()))
        .collect();

    let mut lines = Vec::with_capacity(occurrences.len() + groups.len());
    for occ in &occurrences {
        let Some(&kind) = kinds.get(occ.base.as_str()) else {
            continue;
        };
        match (&occ.entry, kind.is_entry_type()) {
            (Some(entry), true) => lines.push(DataLine::new(
                RawKind::Stat(kind),
                format!("{}::{}", occ.base, entry),
                occ.value.as_str(),
            )),
            (None, false) => lines.push(DataLine::new(
                RawKind::Stat(kind),
                occ.base.as_str(),
                occ.value.as_str(),
            )),
            _ => {}
        }
    }

    for base in &order {
        if let Some(group) = groups.get(base) {
            if group.kind().is_entry_type() {
                lines.push(DataLine::new(RawKind::Summary, base.as_str(), group.summary()));
            }
        }
    }

    debug!(keys = keys.len(), stats = order.len(), lines = lines.len(), "Extraction finished");
    Ok(lines)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    const SAMPLE: &str = "\
---------- Begin Simulation Statistics ----------
system.cpu.ipc                      1.5        # Instructions per cycle
system.cpu.dcache.misses::cpu0      10         # Misses per core
system.cpu.dcache.misses::cpu1      20
system.cpu.dcache.misses::total     30
system.mem.latency::0-4             3          30.00%   30.00%
system.mem.latency::4-8             7          70.00%  100.00%
system.mem.queue::underflows        0
system.mem.queue::0                 2
system.mem.queue::1                 5
system.mem.queue::overflows         1
system.mem.queue::mean              0.7
system.cpu.isa                      riscv
---------- End Simulation Statistics   ----------
";

    fn keys(keys: &[&str]) -> Vec<String> {
        keys.iter().map(|k| k.to_string()).collect()
    }

    fn rendered(lines: &[DataLine]) -> Vec<String> {
        lines.iter().map(|l| l.to_string()).collect()
    }

    #[test]
    fn test_parse_stat_line() {
        assert_eq!(
            parse_stat_line("system.cpu.ipc   1.5  # IPC"),
            Some(("system.cpu.ipc", "1.5"))
        );
        assert_eq!(parse_stat_line("---------- Begin ----------"), None);
        assert_eq!(parse_stat_line("   "), None);
        assert_eq!(parse_stat_line("lonely"), None);
        assert_eq!(parse_stat_line("# comment 1"), None);
    }

    #[test]
    fn test_classification() {
        let lines = extract(
            Cursor::new(SAMPLE),
            &keys(&[
                "system.cpu.ipc",
                "system.cpu.dcache.misses",
                "system.mem.latency",
                "system.mem.queue",
                "system.cpu.isa",
            ]),
        )
        .unwrap();

        assert_eq!(
            rendered(&lines),
            vec![
                "scalar/system.cpu.ipc/1.5",
                "vector/system.cpu.dcache.misses::cpu0/10",
                "vector/system.cpu.dcache.misses::cpu1/20",
                "vector/system.cpu.dcache.misses::total/30",
                "histogram/system.mem.latency::0-4/3",
                "histogram/system.mem.latency::4-8/7",
                "distribution/system.mem.queue::underflows/0",
                "distribution/system.mem.queue::0/2",
                "distribution/system.mem.queue::1/5",
                "distribution/system.mem.queue::overflows/1",
                "distribution/system.mem.queue::mean/0.7",
                "configuration/system.cpu.isa/riscv",
                "summary/system.cpu.dcache.misses/30",
                "summary/system.mem.latency/10.0",
                "summary/system.mem.queue/8.0",
            ]
        );
    }

    #[test]
    fn test_regex_keys_match_whole_name_once() {
        let lines = extract(
            Cursor::new(SAMPLE),
            &keys(&[r"system\.cpu\..*", "system.cpu.ipc"]),
        )
        .unwrap();
        let ipc = lines.iter().filter(|l| l.id == "system.cpu.ipc").count();
        assert_eq!(ipc, 1);
        assert!(lines.iter().all(|l| l.base_id().starts_with("system.cpu.")));

        let partial = extract(Cursor::new(SAMPLE), &keys(&["cpu"])).unwrap();
        assert!(partial.is_empty());
    }

    #[test]
    fn test_invalid_regex_is_literal() {
        let matcher = KeyMatcher::new(&keys(&["weird[name"]));
        assert!(matcher.matches("weird[name"));
        assert!(!matcher.matches("weirdn"));
    }

    #[test]
    fn test_multiple_dumps() {
        let text = format!("{}{}", SAMPLE, SAMPLE.replace("1.5", "2.5"));
        let lines = extract(Cursor::new(text), &keys(&["system.cpu.ipc"])).unwrap();
        assert_eq!(
            rendered(&lines),
            vec!["scalar/system.cpu.ipc/1.5", "scalar/system.cpu.ipc/2.5"]
        );
    }
}
