// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Multi-pattern prefilter engine.
//!
//! A prefilter database scans many patterns in one pass over a buffer and
//! reports match candidates through a callback. Patterns compiled without
//! the [`FLAG_APPROXIMATE`] bit are matched exactly (pure literals and
//! literal alternations); patterns compiled with it are reduced to
//! required literal factors, so the callback may see false positives but
//! never false negatives — callers re-check candidates with the accurate
//! engine.
//!
//! Databases serialize to a byte blob and rebuild their automaton on
//! deserialize, which keeps the on-disk format independent of the
//! automaton's in-memory layout.

mod db;
mod literal;

use std::sync::OnceLock;

pub use db::{Database, Scratch};

/// Pattern is matched without regard to ASCII case.
pub const FLAG_CASELESS: u32 = 1;
/// Pattern uses multiline anchors.
pub const FLAG_MULTILINE: u32 = 1 << 1;
/// Pattern's `.` matches newlines.
pub const FLAG_DOTALL: u32 = 1 << 2;
/// Pattern uses Unicode semantics.
pub const FLAG_UTF: u32 = 1 << 3;
/// Report at most one candidate per pattern per scan.
pub const FLAG_SINGLEMATCH: u32 = 1 << 4;
/// Approximate compilation: candidates require an accurate re-check.
pub const FLAG_APPROXIMATE: u32 = 1 << 5;

/// Version byte folded into the platform tag; bump on any change to the
/// serialized database representation.
const DB_FORMAT_VERSION: u32 = 1;

/// Shortest literal factor accepted by approximate compilation. Shorter
/// factors flood the callback with candidates.
pub(crate) const MIN_FACTOR_LEN: usize = 2;

/// Scan mode a database is compiled for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanMode {
    /// One buffer per scan call.
    Block,
    /// A vector of buffers per scan call, offsets cumulative.
    Vectored,
}

impl ScanMode {
    pub(crate) fn tag(self) -> u8 {
        match self {
            ScanMode::Block => 0,
            ScanMode::Vectored => 1,
        }
    }

    pub(crate) fn from_tag(tag: u8) -> Option<Self> {
        match tag {
            0 => Some(ScanMode::Block),
            1 => Some(ScanMode::Vectored),
            _ => None,
        }
    }
}

/// Prefilter compilation and deserialization errors.
#[derive(Debug, thiserror::Error)]
pub enum CompileError {
    /// Pattern is not a pure literal or literal alternation.
    #[error("pattern is not a literal alternation: {0}")]
    NotLiteral(String),

    /// No branch-covering required literal could be extracted.
    #[error("no required literal of length >= {min} in pattern: {pattern}")]
    NoRequiredLiteral { pattern: String, min: usize },

    /// Caseless matching is ASCII-only in the automaton.
    #[error("caseless literal is not ascii: {0}")]
    CaselessNotAscii(String),

    /// A pattern inside a multi-pattern compilation failed.
    #[error("pattern {index} ('{pattern}'): {source}")]
    Pattern {
        index: usize,
        pattern: String,
        #[source]
        source: Box<CompileError>,
    },

    /// Automaton construction failed.
    #[error("automaton build failed: {0}")]
    Automaton(String),

    /// Serialized database is malformed.
    #[error("corrupt prefilter database: {0}")]
    Corrupt(String),
}

/// Tag describing the platform a database was compiled for.
///
/// Byte-for-byte equality is required at load time: a database produced
/// for a different target or format version is rejected.
pub fn platform_tag() -> [u8; 16] {
    static TAG: OnceLock<[u8; 16]> = OnceLock::new();
    *TAG.get_or_init(|| {
        let mut desc = Vec::new();
        desc.extend_from_slice(std::env::consts::ARCH.as_bytes());
        desc.push(b'/');
        desc.extend_from_slice(std::env::consts::OS.as_bytes());
        desc.push(b'/');
        desc.extend_from_slice(if cfg!(target_endian = "little") {
            b"le"
        } else {
            b"be"
        });
        desc.push(b'/');
        desc.extend_from_slice(&(usize::BITS).to_le_bytes());

        let mut tag = [0u8; 16];
        tag[..8].copy_from_slice(&seahash::hash(&desc).to_le_bytes());
        tag[8..12].copy_from_slice(&DB_FORMAT_VERSION.to_le_bytes());
        tag
    })
}

/// Compile a single pattern into a one-entry database.
///
/// Used by the cache compiler as a feasibility trial before assembling a
/// whole class with [`compile_multi`].
pub fn compile(pattern: &str, flags: u32, mode: ScanMode) -> Result<Database, CompileError> {
    let literals = pattern_literals(pattern, flags)?;
    Database::build(mode, vec![(0, flags)], vec![(0, literals)])
}

/// Compile a set of patterns with per-pattern flags and external ids into
/// one database. Errors name the offending pattern.
pub fn compile_multi(
    patterns: &[&str],
    flags: &[u32],
    ids: &[u32],
    mode: ScanMode,
) -> Result<Database, CompileError> {
    debug_assert_eq!(patterns.len(), flags.len());
    debug_assert_eq!(patterns.len(), ids.len());

    let mut table = Vec::with_capacity(patterns.len());
    let mut literals = Vec::with_capacity(patterns.len());
    for (i, pattern) in patterns.iter().enumerate() {
        let lits = pattern_literals(pattern, flags[i]).map_err(|e| CompileError::Pattern {
            index: i,
            pattern: pattern.to_string(),
            source: Box::new(e),
        })?;
        table.push((ids[i], flags[i]));
        literals.push((i as u32, lits));
    }
    Database::build(mode, table, literals)
}

/// Reduce a pattern to the literal set the automaton will search for.
fn pattern_literals(pattern: &str, flags: u32) -> Result<Vec<Vec<u8>>, CompileError> {
    let literals = if flags & FLAG_APPROXIMATE != 0 {
        literal::required_factors(pattern, MIN_FACTOR_LEN).ok_or_else(|| {
            CompileError::NoRequiredLiteral {
                pattern: pattern.to_string(),
                min: MIN_FACTOR_LEN,
            }
        })?
    } else {
        literal::exact_literals(pattern)
            .ok_or_else(|| CompileError::NotLiteral(pattern.to_string()))?
    };

    if flags & FLAG_CASELESS != 0 && literals.iter().any(|l| !l.is_ascii()) {
        return Err(CompileError::CaselessNotAscii(pattern.to_string()));
    }
    Ok(literals)
}

#[cfg(test)]
#[path = "mod_tests.rs"]
mod tests;
