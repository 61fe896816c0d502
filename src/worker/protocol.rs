//! Line protocol spoken between the pool and its worker processes
//!
//! ```text
//!   worker                      pool
//!     │ ── READY ──────────────▶ │   once, after start
//!     │ ◀── PARSE f||k1||k2 ──── │
//!     │ ── scalar/k1/1.5 ──────▶ │   zero or more data lines
//!     │ ── ERROR msg ──────────▶ │   non-terminal
//!     │ ── END_PARSE ──────────▶ │   terminator
//!     │ ◀── PING ─────────────── │
//!     │ ── PONG ───────────────▶ │
//!     │ ◀── SHUTDOWN ─────────── │
//! ```
//!
//! Data lines are `<type>/<id>/<value>`. The line is split on every `/` and
//! only the first three fields are used, so values must not contain `/`.

use crate::error::ParseError;
use crate::stats::StatKind;
use std::fmt;
use std::path::{Path, PathBuf};

pub const READY: &str = "READY";
pub const PONG: &str = "PONG";
pub const END_PARSE: &str = "END_PARSE";
pub const RESTART_NEEDED: &str = "RESTART_NEEDED";
pub const ERROR_PREFIX: &str = "ERROR";

pub const PING: &str = "PING";
pub const SHUTDOWN: &str = "SHUTDOWN";
pub const PARSE: &str = "PARSE";

/// Separator between the file path and the keys of a PARSE request
pub const FIELD_SEPARATOR: &str = "||";

/// Separator between an id and its entry key
pub const ENTRY_SEPARATOR: &str = "::";

/// Request sent to a worker
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request {
    Parse { file: PathBuf, keys: Vec<String> },
    Ping,
    Shutdown,
}

impl Request {
    pub fn parse(file: &Path, keys: &[String]) -> Self {
        Request::Parse {
            file: file.to_path_buf(),
            keys: keys.to_vec(),
        }
    }

    /// Encode as a single line, including the trailing newline
    pub fn encode(&self) -> String {
        format!("{}\n", self)
    }

    /// Decode a request line (worker side); `None` for anything unrecognized
    pub fn decode(line: &str) -> Option<Self> {
        let line = line.trim_end_matches(['\r', '\n']);
        match line.trim() {
            PING => return Some(Request::Ping),
            SHUTDOWN => return Some(Request::Shutdown),
            _ => {}
        }

        let rest = line.strip_prefix(PARSE)?.strip_prefix(' ')?;
        let mut fields = rest.split(FIELD_SEPARATOR);
        let file = fields.next().filter(|f| !f.is_empty())?;
        let keys = fields
            .filter(|k| !k.is_empty())
            .map(str::to_string)
            .collect();
        Some(Request::Parse {
            file: PathBuf::from(file),
            keys,
        })
    }
}

impl fmt::Display for Request {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Request::Parse { file, keys } => {
                write!(f, "{} {}", PARSE, file.display())?;
                for key in keys {
                    write!(f, "{}{}", FIELD_SEPARATOR, key)?;
                }
                Ok(())
            }
            Request::Ping => f.write_str(PING),
            Request::Shutdown => f.write_str(SHUTDOWN),
        }
    }
}

/// Classified line read from a worker
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    Ready,
    Pong,
    EndParse,
    RestartNeeded,
    Error(String),
    Data(String),
}

impl Reply {
    pub fn classify(line: &str) -> Self {
        let line = line.trim_end_matches(['\r', '\n']);
        match line {
            READY => Reply::Ready,
            PONG => Reply::Pong,
            END_PARSE => Reply::EndParse,
            RESTART_NEEDED => Reply::RestartNeeded,
            _ if line.starts_with(ERROR_PREFIX) => {
                Reply::Error(line[ERROR_PREFIX.len()..].trim().to_string())
            }
            _ => Reply::Data(line.to_string()),
        }
    }
}

/// Type tag of a data line
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RawKind {
    Stat(StatKind),
    Summary,
}

impl RawKind {
    pub fn parse(tag: &str) -> Option<Self> {
        if tag.trim().eq_ignore_ascii_case("summary") {
            Some(RawKind::Summary)
        } else {
            StatKind::parse(tag).map(RawKind::Stat)
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RawKind::Stat(kind) => kind.as_str(),
            RawKind::Summary => "summary",
        }
    }
}

/// A decoded `<type>/<id>/<value>` line
#[derive(Debug, Clone, PartialEq)]
pub struct DataLine {
    pub kind: RawKind,
    pub id: String,
    pub value: String,
}

impl DataLine {
    pub fn new(kind: RawKind, id: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            kind,
            id: id.into(),
            value: value.into(),
        }
    }

    /// Decode a data line
    pub fn decode(line: &str) -> Result<Self, ParseError> {
        let mut parts = line.split('/');
        let (Some(tag), Some(id), Some(value)) = (parts.next(), parts.next(), parts.next()) else {
            return Err(ParseError::MalformedLine {
                line: line.to_string(),
            });
        };
        let kind = RawKind::parse(tag).ok_or_else(|| ParseError::UnknownType {
            kind: tag.to_string(),
            line: line.to_string(),
        })?;
        Ok(Self::new(kind, id, value.trim()))
    }

    /// Base id, without the entry key
    pub fn base_id(&self) -> &str {
        split_entry(&self.id).0
    }

    /// Entry key, when the id carries one
    pub fn entry_key(&self) -> Option<&str> {
        split_entry(&self.id).1
    }
}

impl fmt::Display for DataLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.kind.as_str(), self.id, self.value)
    }
}

/// Split `base::entry` at the first separator
pub fn split_entry(id: &str) -> (&str, Option<&str>) {
    match id.split_once(ENTRY_SEPARATOR) {
        Some((base, entry)) => (base, Some(entry)),
        None => (id, None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_request_encoding() {
        let req = Request::parse(
            Path::new("/runs/a b/stats.txt"),
            &["cpuIpc".to_string(), "cacheMisses".to_string()],
        );
        assert_eq!(req.encode(), "PARSE /runs/a b/stats.txt||cpuIpc||cacheMisses\n");
        assert_eq!(Request::Ping.encode(), "PING\n");
        assert_eq!(Request::Shutdown.encode(), "SHUTDOWN\n");
    }

    #[test]
    fn test_request_decode() {
        let req = Request::decode("PARSE /runs/a b/stats.txt||x||y\n").unwrap();
        assert_eq!(
            req,
            Request::Parse {
                file: PathBuf::from("/runs/a b/stats.txt"),
                keys: vec!["x".into(), "y".into()],
            }
        );
        assert_eq!(Request::decode("PING"), Some(Request::Ping));
        assert_eq!(Request::decode("SHUTDOWN\r\n"), Some(Request::Shutdown));
        assert_eq!(Request::decode("PARSE "), None);
        assert_eq!(Request::decode("HELLO"), None);
    }

    #[test]
    fn test_reply_classification() {
        assert_eq!(Reply::classify("READY\n"), Reply::Ready);
        assert_eq!(Reply::classify("END_PARSE"), Reply::EndParse);
        assert_eq!(Reply::classify("RESTART_NEEDED"), Reply::RestartNeeded);
        assert_eq!(
            Reply::classify("ERROR cannot open file"),
            Reply::Error("cannot open file".into())
        );
        assert_eq!(
            Reply::classify("scalar/cpuIpc/1.5"),
            Reply::Data("scalar/cpuIpc/1.5".into())
        );
    }

    #[test]
    fn test_data_line_decode() {
        let line = DataLine::decode("vector/cacheMisses::cpu0/10").unwrap();
        assert_eq!(line.kind, RawKind::Stat(StatKind::Vector));
        assert_eq!(line.base_id(), "cacheMisses");
        assert_eq!(line.entry_key(), Some("cpu0"));
        assert_eq!(line.value, "10");

        let summary = DataLine::decode("summary/lat/42").unwrap();
        assert_eq!(summary.kind, RawKind::Summary);
        assert_eq!(summary.entry_key(), None);
    }

    #[test]
    fn test_data_line_extra_fields_ignored() {
        let line = DataLine::decode("configuration/binary//bin/mcf").unwrap();
        assert_eq!(line.value, "");
    }

    #[test]
    fn test_data_line_errors() {
        assert!(matches!(
            DataLine::decode("scalar/onlytwo"),
            Err(ParseError::MalformedLine { .. })
        ));
        assert!(matches!(
            DataLine::decode("matrix/x/1"),
            Err(ParseError::UnknownType { .. })
        ));
    }
}
