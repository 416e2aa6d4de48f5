use std::fs;
use std::path::PathBuf;

use mutimg::commands::{load_run_config, summarize, MutateOptions};
use mutimg_core::config::OverlayKind;
use mutimg_core::image::CursorPolicy;
use mutimg_core::run::{ProgramReport, RunReport, VariantReport, VariantStatus};
use tempfile::tempdir;

#[test]
fn missing_config_path_yields_defaults() {
    let config = load_run_config(None).unwrap();
    assert_eq!(config, mutimg_core::config::RunConfig::default());
}

#[test]
fn yaml_config_resolves_trace_dir_next_to_file() {
    let temp = tempdir().unwrap();
    let path = temp.path().join("run.yaml");
    fs::write(
        &path,
        "base_pc: \"0x1000\"\ninstruction_budget: 64\ncursor_policy: strict\ntrace_dir: traces\n",
    )
    .unwrap();

    let config = load_run_config(Some(&path)).unwrap();

    assert_eq!(config.base_pc, 0x1000);
    assert_eq!(config.instruction_budget, 64);
    assert_eq!(config.cursor_policy, CursorPolicy::Strict);
    assert_eq!(config.trace_dir, Some(temp.path().join("traces")));
}

#[test]
fn json_config_keeps_absolute_trace_dir() {
    let temp = tempdir().unwrap();
    let path = temp.path().join("run.json");
    fs::write(&path, r#"{"trace_dir":"/srv/traces","overlay":"dd"}"#).unwrap();

    let config = load_run_config(Some(&path)).unwrap();

    assert_eq!(config.trace_dir, Some(PathBuf::from("/srv/traces")));
    assert_eq!(config.overlay, OverlayKind::Dd);
}

#[test]
fn corrupt_config_reports_parse_error() {
    let temp = tempdir().unwrap();
    let path = temp.path().join("run.json");
    fs::write(&path, "not-json").unwrap();
    let err = load_run_config(Some(&path)).unwrap_err();
    assert!(err.to_string().contains("Failed to parse config JSON"));
}

#[test]
fn unreadable_config_reports_path() {
    let temp = tempdir().unwrap();
    let err = load_run_config(Some(&temp.path().join("missing.json"))).unwrap_err();
    assert!(err.to_string().contains("Failed to read config"));
}

#[test]
fn options_override_config_file() {
    let temp = tempdir().unwrap();
    let path = temp.path().join("run.json");
    fs::write(&path, r#"{"instruction_budget":10,"mutator":{"seed":1,"rate":0.5}}"#).unwrap();
    let options = MutateOptions {
        config: Some(path),
        instruction_budget: Some(99),
        seed: Some(42),
        cursor_policy: Some(CursorPolicy::AlwaysSeek),
        ..MutateOptions::default()
    };

    let config = options.resolve_config().unwrap();

    assert_eq!(config.instruction_budget, 99);
    assert_eq!(config.mutator.seed, 42);
    assert_eq!(config.mutator.rate, 0.5);
    assert_eq!(config.cursor_policy, CursorPolicy::AlwaysSeek);
}

#[test]
fn invalid_rate_is_rejected() {
    let options = MutateOptions { rate: Some(2.0), ..MutateOptions::default() };
    assert!(options.resolve_config().is_err());
}

#[test]
fn summary_hashes_only_merged_images() {
    let temp = tempdir().unwrap();
    let merged = temp.path().join("prog_inst_.bin");
    fs::write(&merged, b"abc").unwrap();
    let report = RunReport {
        started_at: "2026-01-01T00:00:00+00:00".into(),
        finished_at: "2026-01-01T00:00:01+00:00".into(),
        programs: vec![ProgramReport {
            program: temp.path().join("prog.elf"),
            load_base: None,
            variants: vec![
                VariantReport {
                    index: 0,
                    output: merged,
                    entries: 1,
                    status: VariantStatus::Merged { image_len: 3, written_bytes: 2 },
                },
                VariantReport {
                    index: 1,
                    output: temp.path().join("prog_inst_1M.bin"),
                    entries: 0,
                    status: VariantStatus::Empty,
                },
            ],
        }],
    };

    let summary = summarize(&report).unwrap();

    assert_eq!(summary.merged, 1);
    assert_eq!(
        summary.variants[0].sha256.as_deref(),
        Some("ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad")
    );
    assert!(summary.variants[1].sha256.is_none());

    let json = serde_json::to_value(&summary).unwrap();
    assert_eq!(json["variants"][0]["status"], "merged");
    assert_eq!(json["variants"][1]["status"], "empty");
}
