//! Trace replay: a stepper over recorded commit logs.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::debug;

use crate::model::{EncodedInstruction, TraceAddress};
use crate::naming::base_name;
use crate::run::Session;
use crate::trace::Stepper;

/// Extensions probed (in order) when looking up a program's trace.
const TRACE_EXTENSIONS: [&str; 2] = ["trace", "log"];

#[derive(Debug, Error)]
pub enum TraceError {
    #[error("Failed to read trace {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("Malformed trace record on line {line}: {text}")]
    Parse { line: usize, text: String },
    #[error("Trace contains no retired instructions")]
    Empty,
    #[error("No trace {base}.trace or {base}.log under {}", .dir.display())]
    Missing { dir: PathBuf, base: String },
}

/// One retired instruction from a commit log.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Retired {
    pub pc: TraceAddress,
    pub insn: EncodedInstruction,
}

impl Retired {
    pub fn new(pc: TraceAddress, insn: u32) -> Self {
        Self { pc, insn: EncodedInstruction::new(insn) }
    }
}

/// Stepper replaying a recorded commit log.
///
/// Before any advance the last retired instruction is the first record.
/// Advancing past the final record parks the stepper there, like a halted core.
#[derive(Debug, Clone)]
pub struct TraceReplayStepper {
    records: Vec<Retired>,
    cursor: usize,
}

impl TraceReplayStepper {
    pub fn new(records: Vec<Retired>) -> Result<Self, TraceError> {
        if records.is_empty() {
            return Err(TraceError::Empty);
        }
        Ok(Self { records, cursor: 0 })
    }

    /// Parse a commit log.
    ///
    /// A record is a line whose first two `0x`-prefixed tokens are the PC and the
    /// instruction word (spike `--log-commits` lines qualify), or a line of exactly
    /// two bare hex tokens. Blank lines, `#` comments and lines without hex tokens
    /// are skipped.
    pub fn parse(text: &str) -> Result<Self, TraceError> {
        let mut records = Vec::new();
        for (idx, line) in text.lines().enumerate() {
            match parse_line(line) {
                Ok(Some(record)) => records.push(record),
                Ok(None) => {}
                Err(_) => {
                    return Err(TraceError::Parse { line: idx + 1, text: line.trim().to_string() })
                }
            }
        }
        Self::new(records)
    }

    pub fn open(path: &Path) -> Result<Self, TraceError> {
        let body = fs::read_to_string(path)
            .map_err(|source| TraceError::Read { path: path.to_path_buf(), source })?;
        let stepper = Self::parse(&body)?;
        debug!(trace = %path.display(), records = stepper.records.len(), "loaded trace");
        Ok(stepper)
    }

    /// Index of the record currently reported as last retired.
    pub fn position(&self) -> usize {
        self.cursor
    }

    pub fn record_count(&self) -> usize {
        self.records.len()
    }

    /// True once the final record has been reached.
    pub fn is_halted(&self) -> bool {
        self.cursor + 1 == self.records.len()
    }
}

impl Stepper for TraceReplayStepper {
    fn current_pc(&self) -> TraceAddress {
        self.records[self.cursor].pc
    }

    fn current_insn(&self) -> EncodedInstruction {
        self.records[self.cursor].insn
    }

    fn advance(&mut self, n: u64) {
        let n = usize::try_from(n).unwrap_or(usize::MAX);
        self.cursor = self.cursor.saturating_add(n).min(self.records.len() - 1);
    }
}

fn parse_line(line: &str) -> Result<Option<Retired>, String> {
    let body = line.trim();
    if body.is_empty() || body.starts_with('#') {
        return Ok(None);
    }

    let tokens: Vec<&str> = body
        .split_whitespace()
        .map(|t| t.trim_matches(|c: char| matches!(c, '(' | ')' | '[' | ']' | ',' | ':')))
        .collect();
    let prefixed: Vec<&str> = tokens
        .iter()
        .filter_map(|t| t.strip_prefix("0x").or_else(|| t.strip_prefix("0X")))
        .collect();

    let (pc_hex, insn_hex) = match prefixed.as_slice() {
        [pc, insn, ..] => (*pc, *insn),
        [_] => return Err("expected a pc and an instruction word".to_string()),
        [] if tokens.len() == 2 && tokens.iter().all(|t| is_bare_hex(t)) => (tokens[0], tokens[1]),
        [] => return Ok(None),
    };

    let pc = u64::from_str_radix(pc_hex, 16).map_err(|e| format!("pc: {e}"))?;
    let insn = u32::from_str_radix(insn_hex, 16).map_err(|e| format!("insn: {e}"))?;
    Ok(Some(Retired::new(pc, insn)))
}

fn is_bare_hex(token: &str) -> bool {
    !token.is_empty() && token.chars().all(|c| c.is_ascii_hexdigit())
}

/// Session that replays `<dir>/<base>.trace` (or `<base>.log`) for each program.
#[derive(Debug, Clone)]
pub struct TraceDirSession {
    dir: PathBuf,
}

impl TraceDirSession {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// First existing trace file for `program`, if any.
    pub fn trace_path(&self, program: &Path) -> Option<PathBuf> {
        let base = base_name(program);
        TRACE_EXTENSIONS
            .iter()
            .map(|ext| self.dir.join(format!("{base}.{ext}")))
            .find(|candidate| candidate.is_file())
    }
}

impl Session for TraceDirSession {
    type Stepper = TraceReplayStepper;
    type Error = TraceError;

    fn open(&mut self, program: &Path) -> Result<TraceReplayStepper, TraceError> {
        let path = self.trace_path(program).ok_or_else(|| TraceError::Missing {
            dir: self.dir.clone(),
            base: base_name(program),
        })?;
        TraceReplayStepper::open(&path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_spike_commit_lines() {
        let record =
            parse_line("core   0: 3 0x0000000080000000 (0x00000297) x5  0x0000000080000000")
                .unwrap()
                .unwrap();
        assert_eq!(record, Retired::new(0x8000_0000, 0x297));
    }

    #[test]
    fn parses_bare_pairs_and_skips_noise() {
        assert_eq!(parse_line("80000004 4501").unwrap(), Some(Retired::new(0x8000_0004, 0x4501)));
        assert_eq!(parse_line("  # comment 0x1 0x2").unwrap(), None);
        assert_eq!(parse_line("core   0: >>>>  _start").unwrap(), None);
        assert_eq!(parse_line("").unwrap(), None);
    }

    #[test]
    fn rejects_single_token_and_wide_words() {
        assert!(parse_line("0x80000000").is_err());
        assert!(parse_line("0x80000000 0x100000000").is_err());
    }
}
