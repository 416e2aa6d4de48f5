use std::fs;

use mutimg_core::image::{CursorPolicy, ImageError, ImageWriter, WriteOutcome};
use mutimg_core::model::{EncodedInstruction, TraceAddress, DEFAULT_BASE_PC};
use mutimg_core::trace::SparseInstructionMap;
use tempfile::tempdir;

const BASE: TraceAddress = DEFAULT_BASE_PC;

fn map_of(entries: &[(TraceAddress, u32)]) -> SparseInstructionMap {
    entries.iter().map(|(addr, raw)| (*addr, EncodedInstruction::new(*raw))).collect()
}

fn forward_only() -> ImageWriter {
    ImageWriter::new(BASE, CursorPolicy::ForwardOnly)
}

#[test]
fn contiguous_standard_entries_read_back_at_their_offsets() {
    let words: Vec<u32> = (0..8u32).map(|i| 0x0000_0013 | (i << 7)).collect();
    let map = map_of(
        &words.iter().enumerate().map(|(i, w)| (BASE + 4 * i as u64, *w)).collect::<Vec<_>>(),
    );

    let bytes = forward_only().to_bytes(&map).unwrap();

    let last = BASE + 4 * 7;
    assert_eq!(bytes.len() as u64, last - BASE + 4);
    for (i, word) in words.iter().enumerate() {
        let at = 4 * i;
        assert_eq!(&bytes[at..at + 4], &word.to_le_bytes());
    }
}

#[test]
fn contiguous_compact_entries_pack_two_bytes_each() {
    let map = map_of(&[(BASE, 0x4501), (BASE + 2, 0x4585), (BASE + 4, 0x0505)]);
    let bytes = forward_only().to_bytes(&map).unwrap();
    assert_eq!(bytes, vec![0x01, 0x45, 0x85, 0x45, 0x05, 0x05]);
}

#[test]
fn width_follows_low_two_bits() {
    let compact = forward_only().to_bytes(&map_of(&[(BASE, 0x0000_0001)])).unwrap();
    assert_eq!(compact, vec![0x01, 0x00]);

    let standard = forward_only().to_bytes(&map_of(&[(BASE, 0x0000_0003)])).unwrap();
    assert_eq!(standard, vec![0x03, 0x00, 0x00, 0x00]);
}

#[test]
fn gaps_are_left_implicit() {
    let map = map_of(&[(0x8000_0000, 0x1), (0x8000_0010, 0x3)]);
    let temp = tempdir().unwrap();
    let path = temp.path().join("gap.bin");

    let outcome = forward_only().write_file(&map, &path).unwrap();

    let bytes = fs::read(&path).unwrap();
    assert_eq!(bytes.len(), 20);
    assert_eq!(&bytes[0..2], &[0x01, 0x00]);
    assert!(bytes[2..16].iter().all(|b| *b == 0));
    assert_eq!(&bytes[16..20], &[0x03, 0x00, 0x00, 0x00]);

    match outcome {
        WriteOutcome::Written(image) => {
            assert_eq!(image.entries, 2);
            assert_eq!(image.layout.len, 20);
            assert_eq!(image.layout.extents, vec![0..2, 16..20]);
            assert_eq!(image.layout.written_bytes(), 6);
        }
        WriteOutcome::Empty => panic!("expected a written image"),
    }
}

#[test]
fn identical_maps_produce_identical_files() {
    let map = map_of(&[(BASE, 0x0000_0297), (BASE + 4, 0x4501), (BASE + 0x40, 0x00a0_0593)]);
    let temp = tempdir().unwrap();
    let a = temp.path().join("a.bin");
    let b = temp.path().join("b.bin");

    forward_only().write_file(&map, &a).unwrap();
    forward_only().write_file(&map, &b).unwrap();

    assert_eq!(fs::read(&a).unwrap(), fs::read(&b).unwrap());
}

#[test]
fn insertion_order_does_not_change_output() {
    let ascending = map_of(&[(BASE, 0x13), (BASE + 8, 0x4501), (BASE + 12, 0x93)]);
    let shuffled = map_of(&[(BASE + 12, 0x93), (BASE, 0x13), (BASE + 8, 0x4501)]);
    assert_eq!(
        forward_only().to_bytes(&ascending).unwrap(),
        forward_only().to_bytes(&shuffled).unwrap()
    );
}

/// A standard encoding at `BASE` followed by entries inside its extent.
fn overlapping_map() -> SparseInstructionMap {
    map_of(&[(BASE, 0x0000_0297), (BASE + 2, 0x4501), (BASE + 4, 0x0001)])
}

#[test]
fn forward_only_writes_overlapping_entries_at_the_cursor() {
    let bytes = forward_only().to_bytes(&overlapping_map()).unwrap();
    // BASE+2 lands at offset 4 and pushes BASE+4 to offset 6.
    assert_eq!(bytes, vec![0x97, 0x02, 0x00, 0x00, 0x01, 0x45, 0x01, 0x00]);
}

#[test]
fn always_seek_writes_every_entry_at_its_own_offset() {
    let writer = ImageWriter::new(BASE, CursorPolicy::AlwaysSeek);
    let bytes = writer.to_bytes(&overlapping_map()).unwrap();
    assert_eq!(bytes, vec![0x97, 0x02, 0x01, 0x45, 0x01, 0x00]);
}

#[test]
fn strict_rejects_entries_behind_the_cursor() {
    let writer = ImageWriter::new(BASE, CursorPolicy::Strict);
    match writer.to_bytes(&overlapping_map()) {
        Err(ImageError::NonMonotonic { addr, cursor }) => {
            assert_eq!(addr, BASE + 2);
            assert_eq!(cursor, BASE + 4);
        }
        other => panic!("expected NonMonotonic, got {other:?}"),
    }
}

#[test]
fn strict_accepts_contiguous_mixed_widths() {
    let writer = ImageWriter::new(BASE, CursorPolicy::Strict);
    let map = map_of(&[(BASE, 0x0000_0297), (BASE + 4, 0x4501), (BASE + 6, 0x00a0_0593)]);
    let bytes = writer.to_bytes(&map).unwrap();
    assert_eq!(bytes, vec![0x97, 0x02, 0x00, 0x00, 0x01, 0x45, 0x93, 0x05, 0xa0, 0x00]);
}

#[test]
fn strict_failure_leaves_no_partial_file() {
    let temp = tempdir().unwrap();
    let path = temp.path().join("strict.bin");
    let writer = ImageWriter::new(BASE, CursorPolicy::Strict);

    let err = writer.write_file(&overlapping_map(), &path).unwrap_err();

    assert!(err.to_string().contains("behind the write cursor"), "unexpected error: {err}");
    assert!(!path.exists());
}

#[test]
fn always_seek_skips_addresses_below_base() {
    let writer = ImageWriter::new(BASE, CursorPolicy::AlwaysSeek);
    let mut out = std::io::Cursor::new(Vec::new());
    let layout = writer.write_to(&map_of(&[(BASE - 4, 0x13), (BASE, 0x3)]), &mut out).unwrap();
    assert_eq!(layout.skipped, 1);
    assert_eq!(out.into_inner(), vec![0x03, 0x00, 0x00, 0x00]);
}

#[test]
fn empty_map_creates_nothing() {
    let temp = tempdir().unwrap();
    let path = temp.path().join("empty.bin");

    let outcome = forward_only().write_file(&SparseInstructionMap::new(), &path).unwrap();

    assert_eq!(outcome, WriteOutcome::Empty);
    assert!(!path.exists());
}

#[test]
fn unopenable_target_reports_open_error() {
    let temp = tempdir().unwrap();
    let path = temp.path().join("missing-dir").join("image.bin");

    let err = forward_only().write_file(&map_of(&[(BASE, 0x13)]), &path).unwrap_err();

    match err {
        ImageError::Open { path: reported, .. } => assert_eq!(reported, path),
        other => panic!("expected Open error, got {other:?}"),
    }
}
