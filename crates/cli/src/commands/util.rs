use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use mutimg_core::config::RunConfig;
use tracing_subscriber::EnvFilter;

/// Install the stderr log subscriber. `RUST_LOG` takes precedence over `verbose`.
pub fn init_logging(verbose: bool) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(if verbose { "debug" } else { "info" }));
    // A subscriber may already be installed when commands run inside tests.
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

/// Load a run config from JSON or YAML (by extension); defaults when `path` is `None`.
///
/// A relative `trace_dir` is resolved against the config file's directory.
pub fn load_run_config(path: Option<&Path>) -> Result<RunConfig> {
    let Some(path) = path else {
        return Ok(RunConfig::default());
    };

    let body = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config at {}", path.display()))?;
    let ext = path.extension().and_then(|e| e.to_str()).unwrap_or_default();
    let mut config: RunConfig = if matches!(ext, "yaml" | "yml") {
        serde_yaml::from_str(&body).context("Failed to parse config YAML")?
    } else {
        serde_json::from_str(&body).context("Failed to parse config JSON")?
    };

    if let Some(base) = path.parent() {
        config.trace_dir =
            config.trace_dir.take().map(|dir| if dir.is_relative() { base.join(dir) } else { dir });
    }
    Ok(config)
}
