//! Run configuration.
//!
//! Every field has a default, so a config file only needs the values it
//! changes. Loading files is left to frontends.

use std::env;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use anyhow::{bail, Result};
use serde::{Deserialize, Deserializer, Serialize};

use crate::image::CursorPolicy;
use crate::model::{parse_address, TraceAddress, DEFAULT_BASE_PC};
use crate::trace::MutatorConfig;

/// Converter used when neither the config nor the environment names one.
pub const DEFAULT_OBJCOPY: &str = "riscv64-unknown-elf-objcopy";

/// Environment variable overriding the default converter.
pub const OBJCOPY_ENV: &str = "MUTIMG_OBJCOPY";

/// Retired instructions captured per variant unless configured otherwise.
pub const DEFAULT_INSTRUCTION_BUDGET: u64 = 20_000;

/// Overlay implementation used by the patch merger.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum OverlayKind {
    #[default]
    Native,
    Dd,
}

impl fmt::Display for OverlayKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            OverlayKind::Native => "native",
            OverlayKind::Dd => "dd",
        })
    }
}

impl FromStr for OverlayKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "native" => Ok(OverlayKind::Native),
            "dd" => Ok(OverlayKind::Dd),
            other => Err(format!("unknown overlay '{other}' (expected native or dd)")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RunConfig {
    /// Load address the images are anchored at (number or `0x` string).
    #[serde(deserialize_with = "de_address")]
    pub base_pc: TraceAddress,
    /// Retired instructions captured per variant.
    pub instruction_budget: u64,
    pub cursor_policy: CursorPolicy,
    /// Explicit converter path; falls back to `MUTIMG_OBJCOPY`, then the default.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub objcopy: Option<String>,
    pub overlay: OverlayKind,
    /// Directory holding `<program>.trace` commit logs.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trace_dir: Option<PathBuf>,
    pub mutator: MutatorConfig,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            base_pc: DEFAULT_BASE_PC,
            instruction_budget: DEFAULT_INSTRUCTION_BUDGET,
            cursor_policy: CursorPolicy::default(),
            objcopy: None,
            overlay: OverlayKind::default(),
            trace_dir: None,
            mutator: MutatorConfig::default(),
        }
    }
}

impl RunConfig {
    /// Resolve the converter: config value, then `MUTIMG_OBJCOPY`, then the default.
    pub fn objcopy_path(&self) -> PathBuf {
        self.objcopy
            .as_ref()
            .map(PathBuf::from)
            .or_else(|| env::var_os(OBJCOPY_ENV).map(PathBuf::from))
            .unwrap_or_else(|| PathBuf::from(DEFAULT_OBJCOPY))
    }

    pub fn validate(&self) -> Result<()> {
        let rate = self.mutator.rate;
        if !(0.0..=1.0).contains(&rate) {
            bail!("mutation rate must be within 0.0..=1.0, got {rate}");
        }
        Ok(())
    }
}

fn de_address<'de, D: Deserializer<'de>>(deserializer: D) -> Result<TraceAddress, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Repr {
        Number(u64),
        Text(String),
    }

    match Repr::deserialize(deserializer)? {
        Repr::Number(n) => Ok(n),
        Repr::Text(text) => parse_address(&text).map_err(serde::de::Error::custom),
    }
}
