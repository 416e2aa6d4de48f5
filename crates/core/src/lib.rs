//! mutimg-core
//!
//! Core library for rebuilding mutated executable test images from an
//! instruction trace.
//!
//! A stepper (instruction-set simulator) reports each retired instruction, a
//! mutator rewrites it, and the resulting address-indexed encodings are
//! serialized into a sparse binary image which is then patched over the raw
//! image of the original program.
//!
//! All substantive logic lives here so it is testable without the external
//! toolchain; the CLI only wires configuration and real tools together.

pub mod config;
pub mod elf;
pub mod image;
pub mod merge;
pub mod model;
pub mod naming;
pub mod run;
pub mod trace;

/// Returns the library version as encoded at compile time.
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
