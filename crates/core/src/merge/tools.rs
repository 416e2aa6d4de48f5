//! Real merge capabilities backed by external tools and the filesystem.

use std::fs::{self, File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::ops::Range;
use std::path::{Path, PathBuf};
use std::process::{Command, ExitStatus, Stdio};

use thiserror::Error;
use tracing::debug;

use crate::merge::{ByteOverlay, CommandFailure, ImageConverter, Rename};

/// Environment problems detected before any variant is processed.
#[derive(Debug, Error)]
pub enum ToolError {
    #[error("Failed to run {}: {source}", .tool.display())]
    Spawn {
        tool: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("{} -h exited with {status}", .tool.display())]
    Status { tool: PathBuf, status: ExitStatus },
}

/// Verify that `tool -h` runs and exits successfully.
pub fn check_tool(tool: &Path) -> Result<(), ToolError> {
    let status = Command::new(tool)
        .arg("-h")
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .map_err(|source| ToolError::Spawn { tool: tool.to_path_buf(), source })?;
    if !status.success() {
        return Err(ToolError::Status { tool: tool.to_path_buf(), status });
    }
    Ok(())
}

fn describe(cmd: &Command) -> String {
    std::iter::once(cmd.get_program())
        .chain(cmd.get_args())
        .map(|part| part.to_string_lossy())
        .collect::<Vec<_>>()
        .join(" ")
}

fn run(mut cmd: Command) -> Result<(), CommandFailure> {
    let command = describe(&cmd);
    debug!(%command, "running");
    let output = cmd
        .stdin(Stdio::null())
        .output()
        .map_err(|e| CommandFailure::new(command.clone(), format!("failed to spawn: {e}")))?;
    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
        let detail = if stderr.is_empty() {
            format!("exited with {}", output.status)
        } else {
            format!("exited with {}: {stderr}", output.status)
        };
        return Err(CommandFailure::new(command, detail));
    }
    Ok(())
}

/// `objcopy -O binary` based converter.
#[derive(Debug, Clone)]
pub struct ObjcopyConverter {
    tool: PathBuf,
}

impl ObjcopyConverter {
    pub fn new(tool: impl Into<PathBuf>) -> Self {
        Self { tool: tool.into() }
    }
}

impl ImageConverter for ObjcopyConverter {
    fn convert(&self, program: &Path, raw_out: &Path) -> Result<(), CommandFailure> {
        let mut cmd = Command::new(&self.tool);
        cmd.args(["-O", "binary"]).arg(program).arg(raw_out);
        run(cmd)
    }
}

/// In-process overlay: copies each extent with positioned reads and writes.
#[derive(Debug, Clone, Copy, Default)]
pub struct NativeOverlay;

impl ByteOverlay for NativeOverlay {
    fn overlay(
        &self,
        patch: &Path,
        target: &Path,
        extents: &[Range<u64>],
    ) -> Result<(), CommandFailure> {
        let command = format!("overlay {} onto {}", patch.display(), target.display());
        let fail = |e: io::Error| CommandFailure::new(command.clone(), e.to_string());

        let mut src = File::open(patch).map_err(fail)?;
        let mut dst = OpenOptions::new().write(true).open(target).map_err(fail)?;
        let mut buf = Vec::new();
        for extent in extents {
            let len = usize::try_from(extent.end - extent.start)
                .map_err(|e| CommandFailure::new(command.clone(), e.to_string()))?;
            buf.resize(len, 0);
            src.seek(SeekFrom::Start(extent.start)).map_err(fail)?;
            src.read_exact(&mut buf).map_err(fail)?;
            dst.seek(SeekFrom::Start(extent.start)).map_err(fail)?;
            dst.write_all(&buf).map_err(fail)?;
        }
        Ok(())
    }
}

/// Overlay through `dd ... conv=notrunc`, one invocation per extent.
#[derive(Debug, Clone)]
pub struct DdOverlay {
    tool: PathBuf,
}

impl Default for DdOverlay {
    fn default() -> Self {
        Self::new("dd")
    }
}

impl DdOverlay {
    pub fn new(tool: impl Into<PathBuf>) -> Self {
        Self { tool: tool.into() }
    }
}

impl ByteOverlay for DdOverlay {
    fn overlay(
        &self,
        patch: &Path,
        target: &Path,
        extents: &[Range<u64>],
    ) -> Result<(), CommandFailure> {
        for extent in extents {
            let mut cmd = Command::new(&self.tool);
            cmd.arg(format!("if={}", patch.display()))
                .arg(format!("of={}", target.display()))
                .arg("bs=1")
                .arg(format!("skip={}", extent.start))
                .arg(format!("seek={}", extent.start))
                .arg(format!("count={}", extent.end - extent.start))
                .arg("conv=notrunc");
            run(cmd)?;
        }
        Ok(())
    }
}

/// Replace via `std::fs::rename` (atomic within one filesystem).
#[derive(Debug, Clone, Copy, Default)]
pub struct FsRename;

impl Rename for FsRename {
    fn replace(&self, from: &Path, to: &Path) -> Result<(), CommandFailure> {
        fs::rename(from, to).map_err(|e| {
            CommandFailure::new(format!("mv {} {}", from.display(), to.display()), e.to_string())
        })
    }
}
