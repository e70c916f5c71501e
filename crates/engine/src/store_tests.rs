#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

use super::*;

use std::sync::Arc;
use std::time::Duration;

use tempfile::tempdir;

use crate::cache::CacheConfig;
use crate::region::RegionKind;
use crate::regexp::ReFlags;

const PROBE_TIME: Duration = Duration::from_secs(1);

fn re(pattern: &str) -> Regexp {
    Regexp::new(pattern, ReFlags::default()).unwrap()
}

fn body_cache(patterns: &[&str], config: CacheConfig) -> (ReCache, Vec<Arc<Regexp>>) {
    let mut cache = ReCache::new();
    let handles = patterns
        .iter()
        .map(|p| cache.add(re(p), RegionKind::Body, b""))
        .collect();
    cache.finalize(config);
    (cache, handles)
}

fn body_class_file(cache: &ReCache, dir: &std::path::Path) -> std::path::PathBuf {
    let hash = cache.classes().next().unwrap().hash().unwrap();
    class_path(dir, hash)
}

#[test]
fn compile_writes_one_content_addressed_file() {
    let dir = tempdir().unwrap();
    let (cache, _) = body_cache(&["spam", "eggs", "^milk$"], CacheConfig::default());

    let total = compile_to_dir(&cache, dir.path(), PROBE_TIME, true).unwrap();
    assert_eq!(total, 3);

    let entries: Vec<_> = std::fs::read_dir(dir.path())
        .unwrap()
        .map(|e| e.unwrap().file_name().into_string().unwrap())
        .collect();
    assert_eq!(entries.len(), 1, "{entries:?}");
    assert!(entries[0].ends_with(".pf"));
    assert!(!entries[0].ends_with(".pf.new"));

    let path = body_class_file(&cache, dir.path());
    assert!(is_valid_file(&cache, &path, false, true));
}

#[test]
fn file_layout_matches_the_format() {
    let dir = tempdir().unwrap();
    let (cache, handles) = body_cache(&["spam", "eggs", "toast"], CacheConfig::default());
    compile_to_dir(&cache, dir.path(), PROBE_TIME, true).unwrap();

    let bytes = std::fs::read(body_class_file(&cache, dir.path())).unwrap();
    assert_eq!(&bytes[..8], b"repfblk1");
    assert_eq!(&bytes[8..24], &crate::prefilter::platform_tag());

    let n = u32::from_le_bytes(bytes[24..28].try_into().unwrap()) as usize;
    assert_eq!(n, 3);

    let mut ids: Vec<u32> = bytes[28..28 + 4 * n]
        .chunks_exact(4)
        .map(|c| u32::from_le_bytes(c.try_into().unwrap()))
        .collect();
    ids.sort_unstable();
    let mut expected: Vec<u32> = handles.iter().map(|h| h.cache_id()).collect();
    expected.sort_unstable();
    assert_eq!(ids, expected);
}

#[test]
fn recompile_skips_already_valid_class() {
    let dir = tempdir().unwrap();
    let (cache, _) = body_cache(&["spam"], CacheConfig::default());

    assert_eq!(compile_to_dir(&cache, dir.path(), PROBE_TIME, true).unwrap(), 1);
    // The file is content-addressed; a second sweep compiles nothing.
    assert_eq!(compile_to_dir(&cache, dir.path(), PROBE_TIME, false).unwrap(), 0);
    assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 1);
}

#[test]
fn load_round_trip_assigns_match_types() {
    let dir = tempdir().unwrap();
    let (cache, _) = body_cache(&["spam", "eggs", "^milk$"], CacheConfig::default());
    compile_to_dir(&cache, dir.path(), PROBE_TIME, true).unwrap();

    // A restart: a fresh cache over the same expression set.
    let (mut fresh, handles) = body_cache(&["spam", "eggs", "^milk$"], CacheConfig::default());
    let total = load_dir(&mut fresh, dir.path()).unwrap();
    assert_eq!(total, 3);
    assert!(fresh.is_prefilter_loaded());

    let class = fresh.classes().next().unwrap();
    assert!(class.has_db());
    assert_eq!(class.db_ids.len(), 3);

    assert_eq!(fresh.match_type(&handles[0]), Some(MatchType::Prefilter));
    assert_eq!(fresh.match_type(&handles[1]), Some(MatchType::Prefilter));
    assert_eq!(
        fresh.match_type(&handles[2]),
        Some(MatchType::PrefilterApprox)
    );
}

#[test]
fn changed_expression_set_rejects_the_cache_dir() {
    let dir = tempdir().unwrap();
    let (cache, _) = body_cache(&["spam", "eggs", "^milk$"], CacheConfig::default());
    compile_to_dir(&cache, dir.path(), PROBE_TIME, true).unwrap();

    // One pattern differs, so the class hash resolves to a missing file.
    let (mut changed, _) = body_cache(&["scam", "eggs", "^milk$"], CacheConfig::default());
    let err = load_dir(&mut changed, dir.path()).unwrap_err();
    assert!(matches!(err, Error::InvalidCacheFile { .. }));
    assert!(!changed.is_prefilter_loaded());
}

#[test]
fn every_corrupted_byte_fails_validation() {
    let dir = tempdir().unwrap();
    let (cache, _) = body_cache(&["spam", "eggs"], CacheConfig::default());
    compile_to_dir(&cache, dir.path(), PROBE_TIME, true).unwrap();

    let path = body_class_file(&cache, dir.path());
    let pristine = std::fs::read(&path).unwrap();
    assert!(is_valid_file(&cache, &path, true, true));

    for i in 0..pristine.len() {
        let mut corrupt = pristine.clone();
        corrupt[i] ^= 0xff;
        std::fs::write(&path, &corrupt).unwrap();
        assert!(
            !is_valid_file(&cache, &path, true, true),
            "flip of byte {i} went unnoticed"
        );
    }

    std::fs::write(&path, &pristine).unwrap();
    assert!(is_valid_file(&cache, &path, true, true));
}

#[test]
fn foreign_platform_tag_is_rejected() {
    let dir = tempdir().unwrap();
    let (cache, _) = body_cache(&["spam"], CacheConfig::default());
    compile_to_dir(&cache, dir.path(), PROBE_TIME, true).unwrap();

    let path = body_class_file(&cache, dir.path());
    let mut bytes = std::fs::read(&path).unwrap();
    bytes[8..24].copy_from_slice(&[0xAB; 16]);
    std::fs::write(&path, &bytes).unwrap();

    assert!(!is_valid_file(&cache, &path, true, false));
    let (mut fresh, _) = body_cache(&["spam"], CacheConfig::default());
    assert!(load_dir(&mut fresh, dir.path()).is_err());
}

#[test]
fn scan_mode_selects_the_magic() {
    let dir = tempdir().unwrap();
    let (block, _) = body_cache(&["spam"], CacheConfig::default());
    compile_to_dir(&block, dir.path(), PROBE_TIME, true).unwrap();

    // Same expressions, vectored configuration: same file name, wrong magic.
    let (vectored, _) = body_cache(
        &["spam"],
        CacheConfig {
            vectorized: true,
            ..CacheConfig::default()
        },
    );
    let path = body_class_file(&block, dir.path());
    assert!(is_valid_file(&block, &path, true, true));
    assert!(!is_valid_file(&vectored, &path, true, true));
}

#[test]
fn accurate_only_class_produces_empty_database() {
    let dir = tempdir().unwrap();
    let mut cache = ReCache::new();
    let flags = ReFlags {
        accurate_only: true,
        ..ReFlags::default()
    };
    cache.add(
        Regexp::new("secret", flags).unwrap(),
        RegionKind::Body,
        b"",
    );
    cache.finalize(CacheConfig::default());

    assert_eq!(compile_to_dir(&cache, dir.path(), PROBE_TIME, true).unwrap(), 0);

    let mut fresh = ReCache::new();
    let fresh_handle = fresh.add(Regexp::new("secret", flags).unwrap(), RegionKind::Body, b"");
    fresh.finalize(CacheConfig::default());

    assert_eq!(load_dir(&mut fresh, dir.path()).unwrap(), 0);
    assert!(fresh.is_prefilter_loaded());
    let class = fresh.classes().next().unwrap();
    assert!(class.has_db());
    assert!(class.db_ids.is_empty());
    assert_eq!(fresh.match_type(&fresh_handle), Some(MatchType::Accurate));
}

#[test]
fn unapproximable_pattern_is_left_to_the_accurate_engine() {
    let dir = tempdir().unwrap();
    let (cache, _) = body_cache(&["spam", ".*"], CacheConfig::default());

    // `.*` has no required literal: it is skipped, not an error.
    assert_eq!(compile_to_dir(&cache, dir.path(), PROBE_TIME, true).unwrap(), 1);

    let (mut fresh, handles) = body_cache(&["spam", ".*"], CacheConfig::default());
    load_dir(&mut fresh, dir.path()).unwrap();
    let spam = handles.iter().find(|h| h.pattern() == "spam").unwrap();
    let star = handles.iter().find(|h| h.pattern() == ".*").unwrap();
    assert_eq!(fresh.match_type(spam), Some(MatchType::Prefilter));
    assert_eq!(fresh.match_type(star), Some(MatchType::Accurate));
}

#[test]
fn unfinalized_cache_is_refused() {
    let dir = tempdir().unwrap();
    let mut cache = ReCache::new();
    cache.add(re("spam"), RegionKind::Body, b"");

    assert!(matches!(
        compile_to_dir(&cache, dir.path(), PROBE_TIME, true),
        Err(Error::NotFinalized)
    ));
    assert!(matches!(
        load_dir(&mut cache, dir.path()),
        Err(Error::NotFinalized)
    ));
}

#[test]
fn missing_file_aborts_the_load() {
    let dir = tempdir().unwrap();
    let (mut cache, _) = body_cache(&["spam"], CacheConfig::default());
    assert!(load_dir(&mut cache, dir.path()).is_err());
    assert!(!cache.is_prefilter_loaded());
}
