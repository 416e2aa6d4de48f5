use std::path::PathBuf;

use mutimg_core::config::{OverlayKind, RunConfig, DEFAULT_INSTRUCTION_BUDGET};
use mutimg_core::image::CursorPolicy;
use mutimg_core::model::DEFAULT_BASE_PC;

#[test]
fn defaults_match_deployment() {
    let config = RunConfig::default();
    assert_eq!(config.base_pc, DEFAULT_BASE_PC);
    assert_eq!(config.instruction_budget, DEFAULT_INSTRUCTION_BUDGET);
    assert_eq!(config.cursor_policy, CursorPolicy::ForwardOnly);
    assert_eq!(config.overlay, OverlayKind::Native);
    assert!(config.trace_dir.is_none());
    config.validate().unwrap();
}

#[test]
fn partial_json_fills_remaining_defaults() {
    let config: RunConfig = serde_json::from_str(
        r#"{"base_pc":"0x1000_0000","cursor_policy":"always-seek","mutator":{"seed":9}}"#,
    )
    .unwrap();
    assert_eq!(config.base_pc, 0x1000_0000);
    assert_eq!(config.cursor_policy, CursorPolicy::AlwaysSeek);
    assert_eq!(config.mutator.seed, 9);
    assert_eq!(config.mutator.rate, 0.1);
    assert_eq!(config.instruction_budget, DEFAULT_INSTRUCTION_BUDGET);
}

#[test]
fn numeric_base_pc_and_trace_dir_are_accepted() {
    let config: RunConfig =
        serde_json::from_str(r#"{"base_pc":4096,"trace_dir":"traces","overlay":"dd"}"#).unwrap();
    assert_eq!(config.base_pc, 4096);
    assert_eq!(config.trace_dir, Some(PathBuf::from("traces")));
    assert_eq!(config.overlay, OverlayKind::Dd);
}

#[test]
fn unknown_fields_and_bad_addresses_are_rejected() {
    assert!(serde_json::from_str::<RunConfig>(r#"{"bogus":1}"#).is_err());
    assert!(serde_json::from_str::<RunConfig>(r#"{"base_pc":"0xnope"}"#).is_err());
}

#[test]
fn explicit_objcopy_wins() {
    let config = RunConfig { objcopy: Some("/opt/rv/bin/objcopy".into()), ..RunConfig::default() };
    assert_eq!(config.objcopy_path(), PathBuf::from("/opt/rv/bin/objcopy"));
}

#[test]
fn out_of_range_rate_fails_validation() {
    let mut config = RunConfig::default();
    config.mutator.rate = 1.5;
    let err = config.validate().unwrap_err();
    assert!(err.to_string().contains("mutation rate"));
}
