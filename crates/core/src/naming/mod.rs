//! Output naming for mutated image variants.
//!
//! Every input program yields `N` output names inside the output directory,
//! derived from the program's base name (file name without extension):
//! - variant 0: `<base>_inst_.bin` (the seed variant keeps the bare name)
//! - variant i: `<base>_inst_<i>M.bin`
//!
//! No collision check is done here; callers keep names unique across inputs.

use std::path::{Path, PathBuf};

const INFIX: &str = "_inst_";
const EXTENSION: &str = "bin";

/// Base name of a program path (its file stem); empty when there is none.
pub fn base_name(input: &Path) -> String {
    input.file_stem().map(|s| s.to_string_lossy().to_string()).unwrap_or_default()
}

/// Output file name for a single variant index.
pub fn output_file_name(input: &Path, output_dir: &Path, index: usize) -> PathBuf {
    let base = base_name(input);
    let name = if index == 0 {
        format!("{base}{INFIX}.{EXTENSION}")
    } else {
        format!("{base}{INFIX}{index}M.{EXTENSION}")
    };
    output_dir.join(name)
}

/// Deterministic output names for `count` variants of `input`.
pub fn gen_output_file_names(input: &Path, output_dir: &Path, count: usize) -> Vec<PathBuf> {
    (0..count).map(|index| output_file_name(input, output_dir, index)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base_name_drops_only_last_extension() {
        assert_eq!(base_name(Path::new("/a/b/rv64ui-p-add.elf")), "rv64ui-p-add");
        assert_eq!(base_name(Path::new("test.tar.gz")), "test.tar");
        assert_eq!(base_name(Path::new("noext")), "noext");
        assert_eq!(base_name(Path::new("")), "");
    }
}
