//! Binary image writer.
//!
//! Serializes a [`SparseInstructionMap`] into a raw little-endian image anchored
//! at `base_pc`: the encoding for address `addr` lands at file offset
//! `addr - base_pc`. Gaps between non-contiguous addresses are never written
//! explicitly; seeking past them leaves them as holes.

use std::fmt;
use std::fs::{self, File};
use std::io::{self, BufWriter, Cursor, Seek, SeekFrom, Write};
use std::ops::Range;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};

use crate::model::{TraceAddress, DEFAULT_BASE_PC};
use crate::trace::SparseInstructionMap;

/// How the write cursor reacts to an address at or behind it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CursorPolicy {
    /// Seek only when the address is ahead of the cursor; otherwise keep writing
    /// at the cursor. Overlapping or backward entries shift onto the cursor.
    #[default]
    ForwardOnly,
    /// Always seek to `addr - base_pc`. Addresses below the base are skipped.
    AlwaysSeek,
    /// Like `ForwardOnly`, but an entry behind the cursor is an error.
    Strict,
}

impl CursorPolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            CursorPolicy::ForwardOnly => "forward-only",
            CursorPolicy::AlwaysSeek => "always-seek",
            CursorPolicy::Strict => "strict",
        }
    }
}

impl fmt::Display for CursorPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CursorPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "forward-only" => Ok(CursorPolicy::ForwardOnly),
            "always-seek" => Ok(CursorPolicy::AlwaysSeek),
            "strict" => Ok(CursorPolicy::Strict),
            other => Err(format!(
                "unknown cursor policy '{other}' (expected forward-only, always-seek or strict)"
            )),
        }
    }
}

#[derive(Debug, Error)]
pub enum ImageError {
    #[error("Failed to open {} for writing: {source}", .path.display())]
    Open {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("Failed to seek to offset {offset:#x}: {source}")]
    Seek {
        offset: u64,
        #[source]
        source: io::Error,
    },
    #[error("Failed to write encoding for {addr:#x}: {source}")]
    Write {
        addr: TraceAddress,
        #[source]
        source: io::Error,
    },
    #[error("Failed to flush image: {source}")]
    Flush {
        #[source]
        source: io::Error,
    },
    #[error("Address {addr:#x} is behind the write cursor at {cursor:#x}")]
    NonMonotonic { addr: TraceAddress, cursor: TraceAddress },
}

/// Byte layout produced by one serialization pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImageLayout {
    /// Image length: the highest offset written.
    pub len: u64,
    /// Coalesced byte ranges that were actually written.
    pub extents: Vec<Range<u64>>,
    /// Entries dropped because they had no file offset.
    pub skipped: usize,
}

impl ImageLayout {
    fn record(&mut self, start: u64, end: u64) {
        self.len = self.len.max(end);
        match self.extents.last_mut() {
            Some(last) if start >= last.start && start <= last.end => {
                last.end = last.end.max(end);
            }
            _ => self.extents.push(start..end),
        }
    }

    /// Total number of bytes covered by the written extents.
    pub fn written_bytes(&self) -> u64 {
        self.extents.iter().map(|r| r.end - r.start).sum()
    }
}

/// An image file produced by [`ImageWriter::write_file`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WrittenImage {
    pub path: PathBuf,
    pub entries: usize,
    pub layout: ImageLayout,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteOutcome {
    /// The map was empty; nothing was created.
    Empty,
    Written(WrittenImage),
}

/// Serializer for sparse instruction maps.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageWriter {
    base_pc: TraceAddress,
    policy: CursorPolicy,
}

impl Default for ImageWriter {
    fn default() -> Self {
        Self::new(DEFAULT_BASE_PC, CursorPolicy::default())
    }
}

impl ImageWriter {
    pub fn new(base_pc: TraceAddress, policy: CursorPolicy) -> Self {
        Self { base_pc, policy }
    }

    /// Serialize `map` into a seekable sink positioned at offset 0.
    pub fn write_to<W: Write + Seek>(
        &self,
        map: &SparseInstructionMap,
        out: &mut W,
    ) -> Result<ImageLayout, ImageError> {
        let mut layout = ImageLayout::default();
        let mut last_pc = self.base_pc;
        let mut pos = 0u64;

        for (addr, insn) in map.iter() {
            match self.policy {
                CursorPolicy::ForwardOnly => {
                    if addr > last_pc {
                        pos = seek(out, addr - self.base_pc)?;
                    }
                }
                CursorPolicy::AlwaysSeek => {
                    if addr < self.base_pc {
                        warn!("address {addr:#x} is below the image base; skipped");
                        layout.skipped += 1;
                        continue;
                    }
                    pos = seek(out, addr - self.base_pc)?;
                }
                CursorPolicy::Strict => {
                    if addr < last_pc {
                        return Err(ImageError::NonMonotonic { addr, cursor: last_pc });
                    }
                    if addr > last_pc {
                        pos = seek(out, addr - self.base_pc)?;
                    }
                }
            }

            let (bytes, len) = insn.le_bytes();
            out.write_all(&bytes[..len]).map_err(|source| ImageError::Write { addr, source })?;
            let width = len as u64;
            layout.record(pos, pos + width);
            pos += width;
            last_pc = addr.saturating_add(width);
        }

        Ok(layout)
    }

    /// Serialize `map` into memory.
    pub fn to_bytes(&self, map: &SparseInstructionMap) -> Result<Vec<u8>, ImageError> {
        let mut cursor = Cursor::new(Vec::new());
        self.write_to(map, &mut cursor)?;
        Ok(cursor.into_inner())
    }

    /// Serialize `map` to `path`.
    ///
    /// An empty map only logs a warning and creates nothing. A failed write
    /// removes the partial file.
    pub fn write_file(
        &self,
        map: &SparseInstructionMap,
        path: &Path,
    ) -> Result<WriteOutcome, ImageError> {
        if map.is_empty() {
            warn!(path = %path.display(), "No instructions captured; image not written");
            return Ok(WriteOutcome::Empty);
        }

        info!(path = %path.display(), policy = %self.policy, "Saving");
        let file = File::create(path)
            .map_err(|source| ImageError::Open { path: path.to_path_buf(), source })?;
        let mut out = BufWriter::new(file);

        let written = self.write_to(map, &mut out).and_then(|layout| {
            out.flush().map_err(|source| ImageError::Flush { source })?;
            Ok(layout)
        });

        match written {
            Ok(layout) => {
                info!(path = %path.display(), entries = map.len(), len = layout.len, "Saved");
                Ok(WriteOutcome::Written(WrittenImage {
                    path: path.to_path_buf(),
                    entries: map.len(),
                    layout,
                }))
            }
            Err(err) => {
                drop(out);
                let _ = fs::remove_file(path);
                Err(err)
            }
        }
    }
}

fn seek<W: Seek>(out: &mut W, offset: u64) -> Result<u64, ImageError> {
    out.seek(SeekFrom::Start(offset)).map_err(|source| ImageError::Seek { offset, source })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn layout_coalesces_adjacent_and_overlapping_writes() {
        let mut layout = ImageLayout::default();
        layout.record(0, 4);
        layout.record(4, 6);
        layout.record(4, 8);
        layout.record(16, 20);
        assert_eq!(layout.extents, vec![0..8, 16..20]);
        assert_eq!(layout.len, 20);
        assert_eq!(layout.written_bytes(), 12);
    }

    #[test]
    fn cursor_policy_round_trips_through_strings() {
        for policy in [CursorPolicy::ForwardOnly, CursorPolicy::AlwaysSeek, CursorPolicy::Strict] {
            assert_eq!(policy.to_string().parse::<CursorPolicy>().unwrap(), policy);
        }
        assert!("backwards".parse::<CursorPolicy>().is_err());
    }
}
