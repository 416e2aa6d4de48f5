//! ELF inspection used to sanity-check the image base address.

use std::fs;
use std::io;
use std::path::Path;

use goblin::elf::program_header::PT_LOAD;
use goblin::elf::Elf;

use crate::model::TraceAddress;

/// Lowest physical address of a loadable segment with file contents.
///
/// This is where `objcopy -O binary` anchors the raw image. Returns `None`
/// for anything that is not an ELF file or has no such segment.
pub fn load_base(bytes: &[u8]) -> Option<TraceAddress> {
    let elf = Elf::parse(bytes).ok()?;
    elf.program_headers
        .iter()
        .filter(|ph| ph.p_type == PT_LOAD && ph.p_filesz > 0)
        .map(|ph| ph.p_paddr)
        .min()
}

/// [`load_base`] of the file at `path`.
pub fn load_base_of(path: &Path) -> io::Result<Option<TraceAddress>> {
    let bytes = fs::read(path)?;
    Ok(load_base(&bytes))
}
