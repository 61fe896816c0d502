//! Worker side of the line protocol

use crate::extract::extract;
use crate::worker::protocol::{Request, END_PARSE, ERROR_PREFIX, PONG, READY};
use std::fs::File;
use std::io::{self, BufRead, BufReader, Write};
use tracing::{debug, warn};

/// Requests handled by one [`serve`] call
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ServeStats {
    pub requests: u64,
    pub errors: u64,
}

/// Answer protocol requests from `input` until SHUTDOWN or end of input
pub fn serve<R: BufRead, W: Write>(mut input: R, mut output: W) -> io::Result<ServeStats> {
    let mut stats = ServeStats::default();
    writeln!(output, "{}", READY)?;
    output.flush()?;

    let mut line = String::new();
    loop {
        line.clear();
        if input.read_line(&mut line)? == 0 {
            debug!("Input closed");
            break;
        }
        if line.trim().is_empty() {
            continue;
        }

        match Request::decode(&line) {
            Some(Request::Ping) => writeln!(output, "{}", PONG)?,
            Some(Request::Shutdown) => {
                debug!("Shutdown requested");
                break;
            }
            Some(Request::Parse { file, keys }) => {
                stats.requests += 1;
                let lines = File::open(&file).and_then(|f| extract(BufReader::new(f), &keys));
                match lines {
                    Ok(lines) => {
                        for data in lines {
                            writeln!(output, "{}", data)?;
                        }
                    }
                    Err(e) => {
                        stats.errors += 1;
                        warn!(file = %file.display(), error = %e, "Cannot read stats file");
                        writeln!(output, "{} cannot read '{}': {}", ERROR_PREFIX, file.display(), e)?;
                    }
                }
                writeln!(output, "{}", END_PARSE)?;
            }
            None => {
                stats.errors += 1;
                writeln!(output, "{} unknown command: {}", ERROR_PREFIX, line.trim())?;
            }
        }
        output.flush()?;
    }

    Ok(stats)
}
