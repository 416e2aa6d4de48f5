use std::fs;
use std::path::PathBuf;

use anyhow::{anyhow, Context, Result};
use mutimg_core::config::{OverlayKind, RunConfig};
use mutimg_core::image::CursorPolicy;
use mutimg_core::merge::{
    check_tool, ByteOverlay, DdOverlay, FsRename, NativeOverlay, ObjcopyConverter, PatchMerger,
};
use mutimg_core::model::TraceAddress;
use mutimg_core::run::{collect_programs, Orchestrator, RunPlan};
use mutimg_core::trace::{RandomBitMutator, TraceDirSession};
use tracing::info;

use crate::commands::{load_run_config, print_report};
use crate::resolve_dir;

/// Command-line overrides layered on top of the config file.
#[derive(Debug, Clone, Default)]
pub struct MutateOptions {
    pub config: Option<PathBuf>,
    pub instruction_budget: Option<u64>,
    pub objcopy: Option<String>,
    pub base_pc: Option<TraceAddress>,
    pub cursor_policy: Option<CursorPolicy>,
    pub trace_dir: Option<PathBuf>,
    pub seed: Option<u64>,
    pub rate: Option<f64>,
    pub overlay: Option<OverlayKind>,
    pub json: bool,
}

impl MutateOptions {
    /// Resolve the effective config: file (or defaults), then these overrides.
    pub fn resolve_config(&self) -> Result<RunConfig> {
        let mut config = load_run_config(self.config.as_deref())?;
        if let Some(budget) = self.instruction_budget {
            config.instruction_budget = budget;
        }
        if let Some(objcopy) = &self.objcopy {
            config.objcopy = Some(objcopy.clone());
        }
        if let Some(base_pc) = self.base_pc {
            config.base_pc = base_pc;
        }
        if let Some(policy) = self.cursor_policy {
            config.cursor_policy = policy;
        }
        if let Some(dir) = &self.trace_dir {
            config.trace_dir = Some(dir.clone());
        }
        if let Some(seed) = self.seed {
            config.mutator.seed = seed;
        }
        if let Some(rate) = self.rate {
            config.mutator.rate = rate;
        }
        if let Some(overlay) = self.overlay {
            config.overlay = overlay;
        }
        config.validate()?;
        Ok(config)
    }
}

/// Produce `variant_count` mutated images for every program in `input_dir`.
pub fn mutate_command(
    input_dir: &str,
    output_dir: &str,
    variant_count: usize,
    options: &MutateOptions,
) -> Result<()> {
    let config = options.resolve_config()?;

    let objcopy = config.objcopy_path();
    check_tool(&objcopy).with_context(|| format!("Check {} first", objcopy.display()))?;

    let input = resolve_dir(input_dir)?;
    let programs = collect_programs(&input)?;
    let trace_dir = config.trace_dir.clone().ok_or_else(|| {
        anyhow!("No trace directory configured; pass --trace-dir or set trace_dir in the config")
    })?;

    let output = resolve_dir(output_dir)?;
    fs::create_dir_all(&output)
        .with_context(|| format!("Failed to create output dir: {}", output.display()))?;

    info!(
        programs = programs.len(),
        variants = variant_count,
        budget = config.instruction_budget,
        base_pc = %format!("{:#x}", config.base_pc),
        policy = %config.cursor_policy,
        "starting run"
    );

    let converter = ObjcopyConverter::new(objcopy);
    let overlay: Box<dyn ByteOverlay> = match config.overlay {
        OverlayKind::Native => Box::new(NativeOverlay),
        OverlayKind::Dd => Box::new(DdOverlay::default()),
    };
    let merger = PatchMerger::new(&converter, overlay.as_ref(), &FsRename);
    let plan = RunPlan::from_config(&config, output, variant_count);
    let mut orchestrator = Orchestrator::new(
        plan,
        TraceDirSession::new(trace_dir),
        RandomBitMutator::new(&config.mutator),
        merger,
    );

    let report = orchestrator.run(&programs)?;
    print_report(&report, options.json)
}
