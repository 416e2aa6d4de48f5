use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use mutimg::commands::{init_logging, mutate_command, MutateOptions};
use mutimg_core::config::OverlayKind;
use mutimg_core::image::CursorPolicy;
use mutimg_core::model::parse_address;

/// Rebuild mutated executable test images from instruction traces.
///
/// For every program in INPUT_DIR, each variant replays the program's trace,
/// mutates the retired instructions, writes them as a sparse image anchored at
/// the base address and patches that image over the program's raw image.
///
/// This CLI is a thin wrapper around `mutimg-core`; all substantive logic lives
/// in the library.
#[derive(Parser, Debug)]
#[command(name = "mutimg", version, about = "Rebuild mutated test images from instruction traces")]
struct Cli {
    /// Directory containing the input programs (regular files only).
    input_dir: String,

    /// Directory the mutated images are written to. Created if missing.
    output_dir: String,

    /// Number of variants per program; variant 0 keeps the seed name.
    #[arg(value_parser = clap::value_parser!(u32).range(1..))]
    variant_count: u32,

    /// Retired instructions captured per variant (default 20000).
    instruction_budget: Option<u64>,

    /// JSON or YAML run config. Command-line options override its values.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Image converter executable (objcopy). Defaults to $MUTIMG_OBJCOPY or
    /// riscv64-unknown-elf-objcopy.
    #[arg(long)]
    objcopy: Option<String>,

    /// Load address the images are anchored at (hex or decimal).
    #[arg(long, value_parser = parse_address)]
    base_pc: Option<u64>,

    /// Write cursor behaviour: forward-only, always-seek or strict.
    #[arg(long)]
    cursor_policy: Option<CursorPolicy>,

    /// Directory holding `<program>.trace` (or `.log`) commit logs.
    #[arg(long)]
    trace_dir: Option<PathBuf>,

    /// Mutator RNG seed.
    #[arg(long)]
    seed: Option<u64>,

    /// Probability that a retired instruction is mutated (0.0..=1.0).
    #[arg(long)]
    rate: Option<f64>,

    /// Overlay implementation: native or dd.
    #[arg(long)]
    overlay: Option<OverlayKind>,

    /// Emit the run summary as JSON.
    #[arg(long, default_value_t = false)]
    json: bool,

    /// Enable debug logging (RUST_LOG takes precedence).
    #[arg(long, short, default_value_t = false)]
    verbose: bool,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let options = MutateOptions {
        config: cli.config,
        instruction_budget: cli.instruction_budget,
        objcopy: cli.objcopy,
        base_pc: cli.base_pc,
        cursor_policy: cli.cursor_policy,
        trace_dir: cli.trace_dir,
        seed: cli.seed,
        rate: cli.rate,
        overlay: cli.overlay,
        json: cli.json,
    };

    mutate_command(&cli.input_dir, &cli.output_dir, cli.variant_count as usize, &options)
}
