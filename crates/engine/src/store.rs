// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! On-disk prefilter cache.
//!
//! Each class serializes to one content-addressed file,
//! `<dir>/<class-hash>.pf`:
//!
//! ```text
//! magic       8 bytes   block or vectored literal
//! platform   16 bytes   target tag, must match byte-for-byte
//! n           4 bytes   embedded expression count, LE
//! ids       4*n bytes   cache ids in embedding order, LE
//! flags     4*n bytes   per-expression prefilter flags, LE
//! crc         8 bytes   seeded hash over ids | flags | blob, LE
//! blob       rest       serialized database
//! ```
//!
//! Writers fill `<class-hash>.pf.new` (create-new), fsync and rename, so
//! concurrent readers only ever observe complete files. Validation fails
//! closed on any mismatch.

use std::fs::{File, OpenOptions};
use std::hash::Hasher;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::cache::{MatchType, ReCache};
use crate::error::{Error, Result};
use crate::prefilter::{
    self, Database, FLAG_APPROXIMATE, FLAG_CASELESS, FLAG_DOTALL, FLAG_MULTILINE,
    FLAG_SINGLEMATCH, FLAG_UTF, ScanMode,
};
use crate::probe;
use crate::regexp::Regexp;

/// Extension of a finished class file; `.new` is appended while writing.
pub const CACHE_EXT: &str = "pf";

const MAGIC_BLOCK: [u8; 8] = *b"repfblk1";
const MAGIC_VECTOR: [u8; 8] = *b"repfvec1";
const MAGIC_LEN: usize = 8;
const PLATFORM_LEN: usize = 16;
const HEADER_LEN: usize = MAGIC_LEN + PLATFORM_LEN + 4;

const CRC_SEEDS: (u64, u64, u64, u64) = (
    0x71c0_2ab3_5e84_9df1,
    0x3fd6_10c7_a952_b36e,
    0xc48b_77e2_09d1_4f85,
    0x1e93_c5f8_62ba_07d4,
);

/// Translate an expression's accurate flags into prefilter flags.
fn prefilter_flags(re: &Regexp) -> u32 {
    let f = re.flags();
    let mut bits = 0;
    if f.utf {
        bits |= FLAG_UTF;
    }
    if f.caseless {
        bits |= FLAG_CASELESS;
    }
    if f.multiline {
        bits |= FLAG_MULTILINE;
    }
    if f.dotall {
        bits |= FLAG_DOTALL;
    }
    if re.max_hits() == 1 {
        bits |= FLAG_SINGLEMATCH;
    }
    bits
}

fn scan_mode(cache: &ReCache) -> ScanMode {
    if cache.config().vectorized {
        ScanMode::Vectored
    } else {
        ScanMode::Block
    }
}

fn magic_for(mode: ScanMode) -> [u8; 8] {
    match mode {
        ScanMode::Block => MAGIC_BLOCK,
        ScanMode::Vectored => MAGIC_VECTOR,
    }
}

fn file_crc(ids: &[u8], flags: &[u8], blob: &[u8]) -> u64 {
    let (k1, k2, k3, k4) = CRC_SEEDS;
    let mut h = seahash::SeaHasher::with_seeds(k1, k2, k3, k4);
    h.write(ids);
    h.write(flags);
    h.write(blob);
    h.finish()
}

/// Fields parsed out of a cache file image.
struct Parsed<'a> {
    n: usize,
    ids: Vec<u32>,
    flags: Vec<u32>,
    blob: &'a [u8],
}

/// Parse and fully validate a file image for the given mode.
fn parse_image<'a>(image: &'a [u8], mode: ScanMode) -> std::result::Result<Parsed<'a>, String> {
    if image.len() < HEADER_LEN + 8 {
        return Err(format!("file too short: {} bytes", image.len()));
    }
    if image[..MAGIC_LEN] != magic_for(mode) {
        return Err("bad magic".to_string());
    }
    if image[MAGIC_LEN..MAGIC_LEN + PLATFORM_LEN] != prefilter::platform_tag() {
        return Err("compiled for a different platform".to_string());
    }

    let mut n_bytes = [0u8; 4];
    n_bytes.copy_from_slice(&image[MAGIC_LEN + PLATFORM_LEN..HEADER_LEN]);
    let n = u32::from_le_bytes(n_bytes) as usize;

    let arrays_len = n.checked_mul(8).ok_or("bad expression count")?;
    let min_len = HEADER_LEN
        .checked_add(arrays_len)
        .and_then(|l| l.checked_add(8))
        .ok_or("bad expression count")?;
    if image.len() < min_len {
        return Err(format!("bad number of expressions: {n}"));
    }

    let ids_bytes = &image[HEADER_LEN..HEADER_LEN + 4 * n];
    let flags_bytes = &image[HEADER_LEN + 4 * n..HEADER_LEN + 8 * n];
    let mut crc_bytes = [0u8; 8];
    crc_bytes.copy_from_slice(&image[HEADER_LEN + 8 * n..HEADER_LEN + 8 * n + 8]);
    let blob = &image[HEADER_LEN + 8 * n + 8..];

    let stored_crc = u64::from_le_bytes(crc_bytes);
    let valid_crc = file_crc(ids_bytes, flags_bytes, blob);
    if stored_crc != valid_crc {
        return Err(format!(
            "crc mismatch: read {stored_crc:x}, expected {valid_crc:x}"
        ));
    }

    let decode = |chunk: &[u8]| {
        let mut v = [0u8; 4];
        v.copy_from_slice(chunk);
        u32::from_le_bytes(v)
    };
    Ok(Parsed {
        n,
        ids: ids_bytes.chunks_exact(4).map(decode).collect(),
        flags: flags_bytes.chunks_exact(4).map(decode).collect(),
        blob,
    })
}

/// Map a file read-only.
///
/// Safety of the mapping relies on the cache directory not being
/// truncated underneath running processes; writers only ever rename
/// complete files into place.
#[allow(unsafe_code)]
fn map_file(path: &Path) -> Result<memmap2::Mmap> {
    let file = File::open(path).map_err(|e| Error::io(path, e))?;
    unsafe { memmap2::Mmap::map(&file) }.map_err(|e| Error::io(path, e))
}

fn class_path(dir: &Path, hash: &str) -> PathBuf {
    dir.join(format!("{hash}.{CACHE_EXT}"))
}

/// Check whether `path` is a valid cache file for some class of `cache`.
///
/// Verifies, in order: the file name addresses a known class hash, the
/// magic matches the configured scan mode, the platform tag is identical,
/// the size bounds hold, and the CRC over ids, flags and blob matches.
/// With `deep`, additionally deserializes the blob. Fails closed.
pub fn is_valid_file(cache: &ReCache, path: &Path, silent: bool, deep: bool) -> bool {
    let warn = |reason: &str| {
        if !silent {
            tracing::warn!(path = %path.display(), reason, "invalid prefilter cache file");
        }
        false
    };

    let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
        return warn("unreadable file name");
    };
    if path.extension().and_then(|e| e.to_str()) != Some(CACHE_EXT) {
        return warn("wrong extension");
    }
    if !cache.classes().any(|c| c.hash() == Some(stem)) {
        return warn("no class with this hash");
    }

    let image = match map_file(path) {
        Ok(m) => m,
        Err(e) => return warn(&e.to_string()),
    };
    let parsed = match parse_image(&image, scan_mode(cache)) {
        Ok(p) => p,
        Err(reason) => return warn(&reason),
    };
    if deep && let Err(e) = Database::deserialize(parsed.blob) {
        return warn(&e.to_string());
    }
    true
}

/// Compile every class's prefilter database into `dir`.
///
/// Classes whose file already validates are skipped (content-addressed
/// hit). Expressions marked accurate-only are skipped; expressions that
/// fail the exact compile are retried in approximation mode behind the
/// bounded probe and skipped entirely when infeasible. A class whose
/// multi-pattern assembly fails is abandoned (temp file removed) and
/// compilation continues with the remaining classes; the first such error
/// is returned after the sweep. Returns the total number of embedded
/// expressions.
pub fn compile_to_dir(
    cache: &ReCache,
    dir: &Path,
    max_time: Duration,
    silent: bool,
) -> Result<usize> {
    if !cache.is_finalized() {
        return Err(Error::NotFinalized);
    }
    let mode = scan_mode(cache);
    let mut total = 0usize;
    let mut first_err = None;

    for class in cache.classes() {
        let hash = class.hash.as_deref().ok_or(Error::NotFinalized)?;
        let path = class_path(dir, hash);

        if is_valid_file(cache, &path, true, true) {
            if !silent {
                let n = map_file(&path)
                    .ok()
                    .and_then(|image| parse_image(&image, mode).ok().map(|p| p.n))
                    .unwrap_or(0);
                tracing::info!(
                    class = class.describe(),
                    hash = &hash[..6],
                    expressions = n,
                    "skip already valid class"
                );
            }
            continue;
        }

        match compile_class(class, hash, &path, mode, max_time, silent) {
            Ok(n) => total += n,
            Err(e) => {
                tracing::error!(class = class.describe(), error = %e, "class compile failed");
                first_err.get_or_insert(e);
            }
        }
    }

    match first_err {
        Some(e) => Err(e),
        None => Ok(total),
    }
}

fn compile_class(
    class: &crate::class::ReClass,
    hash: &str,
    path: &Path,
    mode: ScanMode,
    max_time: Duration,
    silent: bool,
) -> Result<usize> {
    let mut patterns: Vec<&str> = Vec::with_capacity(class.len());
    let mut flags: Vec<u32> = Vec::with_capacity(class.len());
    let mut ids: Vec<u32> = Vec::with_capacity(class.len());

    for re in class.re.values() {
        if re.flags().accurate_only {
            tracing::info!(
                pattern = re.pattern(),
                "pattern is accurate-only, not compiling to prefilter"
            );
            continue;
        }

        let mut f = prefilter_flags(re);
        match prefilter::compile(re.pattern(), f, mode) {
            Ok(_) => {}
            Err(_) => {
                tracing::info!(
                    pattern = re.pattern(),
                    "cannot compile pattern exactly, trying prefilter approximation"
                );
                // Approximation can be expensive; gate it on the probe.
                if !probe::approximation_feasible(re.pattern(), f, mode, max_time) {
                    continue;
                }
                f |= FLAG_APPROXIMATE;
            }
        }
        patterns.push(re.pattern());
        flags.push(f);
        ids.push(re.cache_id());
    }

    let db = prefilter::compile_multi(&patterns, &flags, &ids, mode).map_err(|e| {
        Error::ClassCompile {
            class: class.describe(),
            source: e,
        }
    })?;
    let blob = db.serialize().map_err(|e| Error::ClassCompile {
        class: class.describe(),
        source: e,
    })?;

    let tmp = path.with_extension(format!("{CACHE_EXT}.new"));
    let written = write_class_file(&tmp, mode, &ids, &flags, &blob);
    if let Err(e) = written {
        let _ = std::fs::remove_file(&tmp);
        return Err(e);
    }
    std::fs::rename(&tmp, path).map_err(|e| {
        let _ = std::fs::remove_file(&tmp);
        Error::io(path, e)
    })?;

    if !silent {
        tracing::info!(
            class = class.describe(),
            hash = &hash[..6],
            expressions = ids.len(),
            "compiled class to prefilter cache"
        );
    }
    Ok(ids.len())
}

fn write_class_file(
    tmp: &Path,
    mode: ScanMode,
    ids: &[u32],
    flags: &[u32],
    blob: &[u8],
) -> Result<()> {
    let mut ids_bytes = Vec::with_capacity(ids.len() * 4);
    for id in ids {
        ids_bytes.extend_from_slice(&id.to_le_bytes());
    }
    let mut flags_bytes = Vec::with_capacity(flags.len() * 4);
    for f in flags {
        flags_bytes.extend_from_slice(&f.to_le_bytes());
    }
    let crc = file_crc(&ids_bytes, &flags_bytes, blob);

    let mut file = OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(tmp)
        .map_err(|e| Error::io(tmp, e))?;

    let io = |e| Error::io(tmp, e);
    file.write_all(&magic_for(mode)).map_err(io)?;
    file.write_all(&prefilter::platform_tag()).map_err(io)?;
    file.write_all(&(ids.len() as u32).to_le_bytes()).map_err(io)?;
    file.write_all(&ids_bytes).map_err(io)?;
    file.write_all(&flags_bytes).map_err(io)?;
    file.write_all(&crc.to_le_bytes()).map_err(io)?;
    file.write_all(blob).map_err(io)?;
    file.sync_all().map_err(io)?;
    Ok(())
}

/// Load every class's database from `dir` and bind it to the cache.
///
/// Every listed expression's match type becomes prefilter-exact or
/// prefilter-approximate; unlisted expressions stay accurate-only. The
/// first invalid or unreadable file aborts the load with an error and
/// leaves the prefilter-loaded flag unset. Returns the total number of
/// expressions bound.
pub fn load_dir(cache: &mut ReCache, dir: &Path) -> Result<usize> {
    if !cache.is_finalized() {
        return Err(Error::NotFinalized);
    }
    let mode = scan_mode(cache);
    let nre = cache.len() as u32;
    let mut total = 0usize;
    // (class slot, db, ids, flags) bound after the whole sweep validates.
    let mut loads = Vec::with_capacity(cache.classes.len());

    for (slot, class) in cache.classes.iter().enumerate() {
        let hash = class.hash.as_deref().ok_or(Error::NotFinalized)?;
        let path = class_path(dir, hash);

        if !is_valid_file(cache, &path, false, false) {
            return Err(Error::InvalidCacheFile {
                path,
                reason: "validation failed".to_string(),
            });
        }

        let image = map_file(&path)?;
        let parsed = parse_image(&image, mode).map_err(|reason| Error::InvalidCacheFile {
            path: path.clone(),
            reason,
        })?;
        let db = Database::deserialize(parsed.blob).map_err(|e| Error::InvalidCacheFile {
            path: path.clone(),
            reason: e.to_string(),
        })?;

        if let Some(&bad) = parsed.ids.iter().find(|&&id| id >= nre) {
            return Err(Error::InvalidCacheFile {
                path,
                reason: format!("expression id {bad} out of range"),
            });
        }

        tracing::debug!(hash = &hash[..6], expressions = parsed.n, "loaded prefilter database");
        total += parsed.n;
        loads.push((slot, db, parsed.ids, parsed.flags));
    }

    for (slot, db, ids, flags) in loads {
        for (&id, &f) in ids.iter().zip(&flags) {
            cache.re[id as usize].match_type = if f & FLAG_APPROXIMATE != 0 {
                MatchType::PrefilterApprox
            } else {
                MatchType::Prefilter
            };
        }
        let class = &mut cache.classes[slot];
        class.db = Some(db);
        class.db_ids = ids;
    }

    cache.prefilter_loaded = true;
    tracing::info!(expressions = total, "prefilter databases loaded");
    Ok(total)
}

#[cfg(test)]
#[path = "store_tests.rs"]
mod tests;
