//! Core data model: trace addresses and variable-width instruction encodings.

use std::fmt;

/// Program-counter value used as the key of a captured trace.
///
/// No alignment is assumed; both 2-byte and 4-byte aligned addresses are valid.
pub type TraceAddress = u64;

/// Default load/boot address the binary images are anchored at.
pub const DEFAULT_BASE_PC: TraceAddress = 0x8000_0000;

/// Width class of an instruction encoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InsnWidth {
    /// 2-byte encoding.
    Compact,
    /// 4-byte encoding.
    Standard,
}

impl InsnWidth {
    /// Number of bytes the encoding occupies in an image.
    pub fn byte_len(self) -> usize {
        match self {
            InsnWidth::Compact => 2,
            InsnWidth::Standard => 4,
        }
    }
}

/// A 2-byte or 4-byte instruction encoding held in a 32-bit word.
///
/// An encoding is compact iff its two least-significant bits are not both set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EncodedInstruction(u32);

impl EncodedInstruction {
    pub const fn new(raw: u32) -> Self {
        Self(raw)
    }

    pub const fn raw(self) -> u32 {
        self.0
    }

    pub fn width(self) -> InsnWidth {
        if self.0 & 0b11 != 0b11 {
            InsnWidth::Compact
        } else {
            InsnWidth::Standard
        }
    }

    pub fn is_compact(self) -> bool {
        self.width() == InsnWidth::Compact
    }

    /// Little-endian bytes of the significant part of the encoding
    /// (low 16 bits for compact, all 32 bits for standard).
    pub fn le_bytes(self) -> ([u8; 4], usize) {
        (self.0.to_le_bytes(), self.width().byte_len())
    }
}

impl From<u32> for EncodedInstruction {
    fn from(raw: u32) -> Self {
        Self(raw)
    }
}

impl fmt::Display for EncodedInstruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.width() {
            InsnWidth::Compact => write!(f, "0x{:04x}", self.0 & 0xffff),
            InsnWidth::Standard => write!(f, "0x{:08x}", self.0),
        }
    }
}

/// Parse an address given either as `0x`-prefixed hex or as decimal.
pub fn parse_address(text: &str) -> Result<TraceAddress, String> {
    let text = text.trim();
    let parsed = match text.strip_prefix("0x").or_else(|| text.strip_prefix("0X")) {
        Some(hex) => u64::from_str_radix(&hex.replace('_', ""), 16),
        None => text.replace('_', "").parse::<u64>(),
    };
    parsed.map_err(|e| format!("invalid address '{text}': {e}"))
}
