//! Patch merger: overlays a written image onto the raw image of the original program.
//!
//! The merge runs three capability steps, each a potential failure point:
//! 1. convert the original program into a raw image at a scratch location,
//! 2. overlay the written extents of the mutated image onto the scratch image,
//! 3. replace the mutated image with the patched scratch image.
//!
//! Any step failing is fatal to the whole run: a partially merged image cannot
//! be told apart from a valid one. Until step 3 succeeds neither the mutated
//! image nor the original program is modified, and the scratch image is removed.

use std::fmt;
use std::fs;
use std::io;
use std::ops::Range;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, error, info};

use crate::image::WrittenImage;

pub mod tools;

pub use tools::{check_tool, DdOverlay, FsRename, NativeOverlay, ObjcopyConverter, ToolError};

/// A failed external invocation, carrying the exact command that was run.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("`{command}` failed: {detail}")]
pub struct CommandFailure {
    pub command: String,
    pub detail: String,
}

impl CommandFailure {
    pub fn new(command: impl Into<String>, detail: impl Into<String>) -> Self {
        Self { command: command.into(), detail: detail.into() }
    }
}

/// Converts an executable into a raw image spanning its loadable contents.
pub trait ImageConverter {
    fn convert(&self, program: &Path, raw_out: &Path) -> Result<(), CommandFailure>;
}

/// Copies the given byte ranges of `patch` onto `target` at the same offsets,
/// without truncating `target`.
pub trait ByteOverlay {
    fn overlay(
        &self,
        patch: &Path,
        target: &Path,
        extents: &[Range<u64>],
    ) -> Result<(), CommandFailure>;
}

/// Replaces `to` with `from`.
pub trait Rename {
    fn replace(&self, from: &Path, to: &Path) -> Result<(), CommandFailure>;
}

/// Which of the three merge steps failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MergeStep {
    Convert,
    Overlay,
    Replace,
}

impl fmt::Display for MergeStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            MergeStep::Convert => "convert",
            MergeStep::Overlay => "overlay",
            MergeStep::Replace => "replace",
        })
    }
}

#[derive(Debug, Error)]
pub enum MergeError {
    #[error("Merge step '{step}' failed running `{command}`: {detail}")]
    Step { step: MergeStep, command: String, detail: String },
    #[error("Failed to create scratch image in {}: {source}", .dir.display())]
    Scratch {
        dir: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl MergeError {
    fn step(step: MergeStep, failure: CommandFailure) -> Self {
        error!(%step, command = %failure.command, detail = %failure.detail, "merge step failed");
        MergeError::Step { step, command: failure.command, detail: failure.detail }
    }

    /// The failing step, when the error came from one of the three steps.
    pub fn failed_step(&self) -> Option<MergeStep> {
        match self {
            MergeError::Step { step, .. } => Some(*step),
            MergeError::Scratch { .. } => None,
        }
    }
}

/// Runs the convert/overlay/replace sequence against injected capabilities.
pub struct PatchMerger<'a> {
    converter: &'a dyn ImageConverter,
    overlay: &'a dyn ByteOverlay,
    rename: &'a dyn Rename,
}

impl<'a> PatchMerger<'a> {
    pub fn new(
        converter: &'a dyn ImageConverter,
        overlay: &'a dyn ByteOverlay,
        rename: &'a dyn Rename,
    ) -> Self {
        Self { converter, overlay, rename }
    }

    /// Merge `image` over the raw image of `program`, in place at `image.path`.
    pub fn merge(&self, program: &Path, image: &WrittenImage) -> Result<(), MergeError> {
        let dir = scratch_dir(&image.path);
        // Same directory as the destination so the final replace stays on one filesystem.
        let scratch = tempfile::Builder::new()
            .prefix(".mutimg-")
            .suffix(".raw")
            .tempfile_in(dir)
            .map_err(|source| MergeError::Scratch { dir: dir.to_path_buf(), source })?
            .into_temp_path();

        debug!(program = %program.display(), scratch = %scratch.display(), "converting");
        self.converter
            .convert(program, &scratch)
            .map_err(|f| MergeError::step(MergeStep::Convert, f))?;

        debug!(extents = image.layout.extents.len(), "overlaying");
        self.overlay
            .overlay(&image.path, &scratch, &image.layout.extents)
            .map_err(|f| MergeError::step(MergeStep::Overlay, f))?;

        // The scratch file is created owner-only; the merged image keeps the image's mode.
        fs::metadata(&image.path)
            .and_then(|meta| fs::set_permissions(&scratch, meta.permissions()))
            .map_err(|e| {
                let command =
                    format!("chmod --reference={} {}", image.path.display(), scratch.display());
                MergeError::step(MergeStep::Replace, CommandFailure::new(command, e.to_string()))
            })?;

        self.rename
            .replace(&scratch, &image.path)
            .map_err(|f| MergeError::step(MergeStep::Replace, f))?;

        // Dropping `scratch` after a successful replace finds nothing left to remove.
        info!(image = %image.path.display(), program = %program.display(), "Merged");
        Ok(())
    }
}

fn scratch_dir(path: &Path) -> &Path {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    }
}
