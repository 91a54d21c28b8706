//! Vector index end-to-end scenarios: identity search and file persistence.

use std::fs::File;
use std::io::{BufReader, BufWriter};

use maia_core::{HnswConfig, HnswIndex, IndexError, VectorIndex};
use tokio_util::sync::CancellationToken;

fn cancel() -> CancellationToken {
    CancellationToken::new()
}

/// A dimension-4 index with alpha/beta/gamma returns alpha first for the
/// alpha query, at cosine ~1.0, with beta second.
#[test]
fn hnsw_identity_query() {
    let index = HnswIndex::new(HnswConfig::new(4));
    let token = cancel();
    index.add("alpha", &[1.0, 0.0, 0.0, 0.0], &token).unwrap();
    index.add("beta", &[0.9, 0.1, 0.0, 0.0], &token).unwrap();
    index.add("gamma", &[0.0, 1.0, 0.0, 0.0], &token).unwrap();

    let results = index.search(&[1.0, 0.0, 0.0, 0.0], 2, &token).unwrap();
    assert_eq!(results.len(), 2);
    assert_eq!(results[0].id, "alpha");
    assert!((results[0].score - 1.0).abs() < 1e-3);
    assert_eq!(results[1].id, "beta");
}

/// Ten vectors survive a save/load through a real file: size matches, every
/// vector comes back bit-identical, and the identity query still wins.
#[test]
fn hnsw_file_roundtrip() {
    let index = HnswIndex::new(HnswConfig::new(4));
    let token = cancel();
    index.add("alpha", &[1.0, 0.0, 0.0, 0.0], &token).unwrap();
    let mut originals = vec![("alpha".to_string(), vec![1.0, 0.0, 0.0, 0.0])];
    for i in 0..9 {
        let v = vec![
            0.1 * (i + 1) as f32,
            1.0 - 0.1 * (i + 1) as f32,
            0.05 * i as f32,
            0.01,
        ];
        let id = format!("mem-{i}");
        index.add(&id, &v, &token).unwrap();
        originals.push((id, v));
    }

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("vectors.maia");
    {
        let mut writer = BufWriter::new(File::create(&path).unwrap());
        index.save(&mut writer).unwrap();
    }
    let loaded = {
        let mut reader = BufReader::new(File::open(&path).unwrap());
        HnswIndex::load(&mut reader).unwrap()
    };

    assert_eq!(loaded.size().unwrap(), 10);
    for (id, vector) in &originals {
        assert_eq!(&loaded.get(id).unwrap(), vector);
    }
    let results = loaded.search(&[1.0, 0.0, 0.0, 0.0], 3, &token).unwrap();
    assert_eq!(results[0].id, "alpha");
}

/// The tagged-variant loader reopens files as the variant that wrote them,
/// and rejects corrupted headers.
#[test]
fn variant_dispatch_and_bad_files() {
    let token = cancel();
    let brute = VectorIndex::brute_force(3);
    brute.add("only", &[0.0, 1.0, 0.0], &token).unwrap();

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("brute.maia");
    {
        let mut writer = BufWriter::new(File::create(&path).unwrap());
        brute.save(&mut writer).unwrap();
    }
    let loaded = {
        let mut reader = BufReader::new(File::open(&path).unwrap());
        VectorIndex::load(&mut reader).unwrap()
    };
    assert!(matches!(loaded, VectorIndex::BruteForce(_)));
    assert_eq!(loaded.get("only").unwrap(), vec![0.0, 1.0, 0.0]);

    let garbage = b"not a maia file at all".to_vec();
    assert!(matches!(
        VectorIndex::load(&mut std::io::Cursor::new(&garbage)),
        Err(IndexError::InvalidFormat(_))
    ));
}

/// Close is terminal across the whole operation set.
#[test]
fn closed_index_rejects_everything() {
    let index = HnswIndex::new(HnswConfig::new(4));
    let token = cancel();
    index.add("a", &[1.0, 0.0, 0.0, 0.0], &token).unwrap();
    index.close();

    assert!(matches!(index.get("a"), Err(IndexError::Closed)));
    assert!(matches!(index.size(), Err(IndexError::Closed)));
    assert!(matches!(
        index.remove("a", &token),
        Err(IndexError::Closed)
    ));
    let mut sink = Vec::new();
    assert!(matches!(index.save(&mut sink), Err(IndexError::Closed)));
}
