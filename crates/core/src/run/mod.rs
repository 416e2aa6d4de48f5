//! Run orchestration.
//!
//! For every input program and every variant index:
//! `Idle -> ResettingMutator -> Stepping -> Writing -> Merging -> Done`.
//! A write failure is logged and the variant ends without a merged image; a
//! merge failure aborts the whole run.
//!
//! The stepper is opened once per program and is never reset between its
//! variants: each variant continues execution where the previous one stopped.
//! Only the mutator's history is reset per variant.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use chrono::Utc;
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info, info_span, warn};

use crate::config::RunConfig;
use crate::elf;
use crate::image::{CursorPolicy, ImageWriter, WriteOutcome};
use crate::merge::{MergeError, PatchMerger, ToolError};
use crate::model::TraceAddress;
use crate::naming::gen_output_file_names;
use crate::trace::{capture, Mutator, Stepper};

/// Source of per-program steppers.
pub trait Session {
    type Stepper: Stepper;
    type Error: std::error::Error + Send + Sync + 'static;

    /// Start the processor model for `program`.
    fn open(&mut self, program: &Path) -> Result<Self::Stepper, Self::Error>;
}

#[derive(Debug, Error)]
pub enum RunError {
    #[error("Image converter unavailable: {0}")]
    Environment(#[from] ToolError),
    #[error("Failed to read input directory {}: {source}", .dir.display())]
    InputDir {
        dir: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("No input programs found in {}", .0.display())]
    NoInputs(PathBuf),
    #[error("Failed to start session for {}: {source}", .program.display())]
    Session {
        program: PathBuf,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
    #[error(transparent)]
    Merge(#[from] MergeError),
}

/// Regular files directly inside `dir`, as absolute paths sorted by name.
pub fn collect_programs(dir: &Path) -> Result<Vec<PathBuf>, RunError> {
    let read_err = |source| RunError::InputDir { dir: dir.to_path_buf(), source };
    let root = dir.canonicalize().map_err(read_err)?;

    let mut programs = Vec::new();
    for entry in fs::read_dir(&root).map_err(read_err)? {
        let entry = entry.map_err(read_err)?;
        if entry.file_type().map_err(read_err)?.is_file() {
            programs.push(entry.path());
        }
    }
    if programs.is_empty() {
        return Err(RunError::NoInputs(dir.to_path_buf()));
    }
    programs.sort();
    Ok(programs)
}

/// Phases a single variant moves through.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VariantPhase {
    Idle,
    ResettingMutator,
    Stepping,
    Writing,
    Merging,
    Done,
}

impl VariantPhase {
    fn enter(self, next: VariantPhase, variant: usize) -> VariantPhase {
        debug!(from = ?self, to = ?next, variant, "phase");
        next
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum VariantStatus {
    /// The image was written and merged in place.
    Merged { image_len: u64, written_bytes: u64 },
    /// Nothing was captured; no file was produced.
    Empty,
    /// The image could not be written; the variant was skipped.
    WriteFailed { error: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VariantReport {
    pub index: usize,
    pub output: PathBuf,
    pub entries: usize,
    #[serde(flatten)]
    pub status: VariantStatus,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProgramReport {
    pub program: PathBuf,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub load_base: Option<TraceAddress>,
    pub variants: Vec<VariantReport>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunReport {
    pub started_at: String,
    pub finished_at: String,
    pub programs: Vec<ProgramReport>,
}

impl RunReport {
    pub fn variants(&self) -> impl Iterator<Item = &VariantReport> {
        self.programs.iter().flat_map(|p| p.variants.iter())
    }

    pub fn merged_count(&self) -> usize {
        self.variants().filter(|v| matches!(v.status, VariantStatus::Merged { .. })).count()
    }
}

/// What to produce for each program.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunPlan {
    pub output_dir: PathBuf,
    pub variant_count: usize,
    pub instruction_budget: u64,
    pub base_pc: TraceAddress,
    pub cursor_policy: CursorPolicy,
}

impl RunPlan {
    pub fn from_config(
        config: &RunConfig,
        output_dir: impl Into<PathBuf>,
        variant_count: usize,
    ) -> Self {
        Self {
            output_dir: output_dir.into(),
            variant_count,
            instruction_budget: config.instruction_budget,
            base_pc: config.base_pc,
            cursor_policy: config.cursor_policy,
        }
    }
}

/// Drives capture, image writing and merging for a batch of programs.
pub struct Orchestrator<'a, S: Session, M: Mutator> {
    plan: RunPlan,
    session: S,
    mutator: M,
    merger: PatchMerger<'a>,
}

impl<'a, S: Session, M: Mutator> Orchestrator<'a, S, M> {
    pub fn new(plan: RunPlan, session: S, mutator: M, merger: PatchMerger<'a>) -> Self {
        Self { plan, session, mutator, merger }
    }

    pub fn mutator(&self) -> &M {
        &self.mutator
    }

    /// Process every program in order, all variants of one before the next.
    pub fn run(&mut self, programs: &[PathBuf]) -> Result<RunReport, RunError> {
        let started_at = Utc::now().to_rfc3339();
        let mut reports = Vec::with_capacity(programs.len());
        for program in programs {
            reports.push(self.run_program(program)?);
        }
        Ok(RunReport { started_at, finished_at: Utc::now().to_rfc3339(), programs: reports })
    }

    pub fn run_program(&mut self, program: &Path) -> Result<ProgramReport, RunError> {
        let _span = info_span!("program", path = %program.display()).entered();

        let load_base = match elf::load_base_of(program) {
            Ok(base) => base,
            Err(err) => {
                debug!(error = %err, "could not inspect program headers");
                None
            }
        };
        if let Some(base) = load_base.filter(|base| *base != self.plan.base_pc) {
            warn!(
                "program loads at {base:#x} but images are anchored at {:#x}",
                self.plan.base_pc
            );
        }

        let mut stepper = self.session.open(program).map_err(|err| RunError::Session {
            program: program.to_path_buf(),
            source: Box::new(err),
        })?;

        let outputs = gen_output_file_names(program, &self.plan.output_dir, self.plan.variant_count);
        let mut variants = Vec::with_capacity(outputs.len());
        for (index, output) in outputs.iter().enumerate() {
            variants.push(self.run_variant(&mut stepper, program, index, output)?);
        }

        Ok(ProgramReport { program: program.to_path_buf(), load_base, variants })
    }

    fn run_variant(
        &mut self,
        stepper: &mut S::Stepper,
        program: &Path,
        index: usize,
        output: &Path,
    ) -> Result<VariantReport, RunError> {
        info!(output = %output.display(), "Processing");

        let mut phase = VariantPhase::Idle.enter(VariantPhase::ResettingMutator, index);
        self.mutator.reset_history();

        phase = phase.enter(VariantPhase::Stepping, index);
        let map = capture(stepper, &mut self.mutator, self.plan.instruction_budget);

        phase = phase.enter(VariantPhase::Writing, index);
        let writer = ImageWriter::new(self.plan.base_pc, self.plan.cursor_policy);
        let status = match writer.write_file(&map, output) {
            Ok(WriteOutcome::Written(image)) => {
                phase = phase.enter(VariantPhase::Merging, index);
                self.merger.merge(program, &image)?;
                VariantStatus::Merged {
                    image_len: image.layout.len,
                    written_bytes: image.layout.written_bytes(),
                }
            }
            Ok(WriteOutcome::Empty) => VariantStatus::Empty,
            Err(err) => {
                warn!(
                    output = %output.display(),
                    error = %err,
                    "image not written; skipping variant"
                );
                VariantStatus::WriteFailed { error: err.to_string() }
            }
        };

        phase.enter(VariantPhase::Done, index);
        info!(output = %output.display(), "Processed");
        Ok(VariantReport { index, output: output.to_path_buf(), entries: map.len(), status })
    }
}
