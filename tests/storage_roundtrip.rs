//! # Storage Round-Trip Test Suite
//!
//! Drives the framed page stream with randomized payloads in both
//! compression modes and checks the invariants the storage layer promises:
//! decode(encode(x)) == x including the empty payload, every physical
//! write block-aligned, idempotent close, and corruption surfacing as
//! `CorruptedBuffer` rather than garbage data.

use opaldb::error::db_error;
use opaldb::storage::{
    CompressionKind, FileStore, PageReader, PageWriter, BLOCK_SIZE, FILE_HEADER_SIZE,
};
use opaldb::DbError;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tempfile::tempdir;

fn random_payloads(seed: u64, count: usize) -> Vec<Vec<u8>> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..count)
        .map(|_| {
            let len = rng.gen_range(0..4096);
            let mut buf = vec![0u8; len];
            if rng.gen_bool(0.5) {
                rng.fill(&mut buf[..]);
            } else {
                // compressible: long runs
                let b: u8 = rng.gen();
                buf.fill(b);
            }
            buf
        })
        .collect()
}

fn write_all(path: &std::path::Path, compression: CompressionKind, chunks: &[Vec<u8>]) {
    let store = FileStore::create(path, compression).unwrap();
    let mut writer = PageWriter::new(store, compression);
    for chunk in chunks {
        writer.write(chunk).unwrap();
    }
    writer.sync().unwrap();
    writer.close().unwrap();
}

fn read_all(path: &std::path::Path) -> Vec<Vec<u8>> {
    let (store, compression) = FileStore::open(path).unwrap();
    let mut reader = PageReader::new(store, compression);
    let mut out = Vec::new();
    while let Some(chunk) = reader.read_chunk().unwrap() {
        out.push(chunk);
    }
    reader.close().unwrap();
    out
}

#[test]
fn randomized_round_trip_uncompressed() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("raw.ost");
    let chunks = random_payloads(1, 200);
    write_all(&path, CompressionKind::None, &chunks);
    assert_eq!(read_all(&path), chunks);
}

#[test]
fn randomized_round_trip_compressed() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("lz4.ost");
    let chunks = random_payloads(2, 200);
    write_all(&path, CompressionKind::Lz4, &chunks);
    assert_eq!(read_all(&path), chunks);
}

#[test]
fn empty_payload_round_trips_in_both_modes() {
    for compression in [CompressionKind::None, CompressionKind::Lz4] {
        let dir = tempdir().unwrap();
        let path = dir.path().join("empty.ost");
        write_all(&path, compression, &[Vec::new()]);
        assert_eq!(read_all(&path), vec![Vec::<u8>::new()]);
    }
}

#[test]
fn file_grows_only_in_whole_blocks() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("aligned.ost");
    let store = FileStore::create(&path, CompressionKind::None).unwrap();
    let mut writer = PageWriter::new(store, CompressionKind::None);
    let mut rng = StdRng::seed_from_u64(3);
    for _ in 0..50 {
        let len = rng.gen_range(0..500);
        writer.write(&vec![0xAB; len]).unwrap();
        let file_len = std::fs::metadata(&path).unwrap().len();
        assert_eq!(file_len as usize % BLOCK_SIZE, 0);
        assert!(file_len as usize >= FILE_HEADER_SIZE);
    }
    writer.close().unwrap();
}

#[test]
fn double_close_of_reader_and_writer_is_harmless() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("close.ost");
    let store = FileStore::create(&path, CompressionKind::None).unwrap();
    let mut writer = PageWriter::new(store, CompressionKind::None);
    writer.write(b"once").unwrap();
    writer.close().unwrap();
    writer.close().unwrap();

    let (store, compression) = FileStore::open(&path).unwrap();
    let mut reader = PageReader::new(store, compression);
    assert_eq!(reader.read_chunk().unwrap().as_deref(), Some(&b"once"[..]));
    reader.close().unwrap();
    reader.close().unwrap();
}

#[test]
fn compression_mode_is_recorded_in_the_file_header() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("mode.ost");
    write_all(&path, CompressionKind::Lz4, &[b"payload".to_vec()]);
    let (_store, compression) = FileStore::open(&path).unwrap();
    assert_eq!(compression, CompressionKind::Lz4);
}

#[test]
fn flipped_payload_byte_surfaces_as_corruption_under_compression() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("flip.ost");
    write_all(
        &path,
        CompressionKind::Lz4,
        &[b"aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa".to_vec()],
    );
    let mut bytes = std::fs::read(&path).unwrap();
    // Declare a bogus compressed length in the first frame.
    let frame_start = FILE_HEADER_SIZE;
    bytes[frame_start..frame_start + 4].copy_from_slice(&(-9i32).to_be_bytes());
    std::fs::write(&path, &bytes).unwrap();

    let (store, compression) = FileStore::open(&path).unwrap();
    let mut reader = PageReader::new(store, compression);
    let err = reader.read_chunk().unwrap_err();
    assert!(matches!(
        db_error(&err),
        Some(DbError::CorruptedBuffer(_))
    ));
}
