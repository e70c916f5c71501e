// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Compiled multi-pattern databases.

use aho_corasick::{AhoCorasick, AhoCorasickBuilder, MatchKind};
use memchr::memmem;
use serde::{Deserialize, Serialize};

use super::{CompileError, FLAG_CASELESS, FLAG_SINGLEMATCH, ScanMode};

/// One pattern embedded in a database: its external id (the expression's
/// cache id) and its prefilter flags.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
struct DbPattern {
    id: u32,
    flags: u32,
}

/// One literal the automaton searches for, and the pattern it belongs to.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct DbLiteral {
    bytes: Vec<u8>,
    owner: u32,
}

/// Serialized database representation. The automaton itself is rebuilt on
/// deserialize so the blob stays independent of its in-memory layout.
#[derive(Serialize, Deserialize)]
struct DbRepr {
    mode: u8,
    patterns: Vec<DbPattern>,
    literals: Vec<DbLiteral>,
}

#[derive(Debug)]
enum Engine {
    /// No literals: scans report nothing.
    Empty,
    /// Exactly one case-sensitive literal.
    Single(memmem::Finder<'static>),
    /// The general automaton, ASCII-caseless with per-hit verification.
    Multi(AhoCorasick),
}

/// A compiled multi-pattern prefilter database.
#[derive(Debug)]
pub struct Database {
    mode: ScanMode,
    patterns: Vec<DbPattern>,
    literals: Vec<DbLiteral>,
    engine: Engine,
}

/// Per-scan working memory: the reported-bitmap backing single-match
/// suppression. Scans over the same database from concurrent runtimes
/// each need their own scratch.
pub struct Scratch {
    reported: Vec<u8>,
}

impl Scratch {
    fn reset(&mut self) {
        self.reported.fill(0);
    }

    fn test_and_set(&mut self, pattern: usize) -> bool {
        let byte = pattern / 8;
        let bit = 1u8 << (pattern % 8);
        let was = self.reported[byte] & bit != 0;
        self.reported[byte] |= bit;
        was
    }
}

impl Database {
    /// Assemble a database from per-pattern tables. `literals` carries
    /// (pattern index, literal set) pairs.
    pub(crate) fn build(
        mode: ScanMode,
        patterns: Vec<(u32, u32)>,
        literals: Vec<(u32, Vec<Vec<u8>>)>,
    ) -> Result<Self, CompileError> {
        let patterns: Vec<DbPattern> = patterns
            .into_iter()
            .map(|(id, flags)| DbPattern { id, flags })
            .collect();
        let mut flat = Vec::new();
        for (owner, set) in literals {
            for bytes in set {
                flat.push(DbLiteral { bytes, owner });
            }
        }
        let engine = Self::build_engine(&patterns, &flat)?;
        Ok(Self {
            mode,
            patterns,
            literals: flat,
            engine,
        })
    }

    fn build_engine(patterns: &[DbPattern], flat: &[DbLiteral]) -> Result<Engine, CompileError> {
        if flat.is_empty() {
            return Ok(Engine::Empty);
        }
        if flat.len() == 1 {
            let lit = &flat[0];
            let owner = patterns
                .get(lit.owner as usize)
                .ok_or_else(|| CompileError::Corrupt("literal owner out of range".into()))?;
            if owner.flags & FLAG_CASELESS == 0 {
                let finder = memmem::Finder::new(&lit.bytes).into_owned();
                return Ok(Engine::Single(finder));
            }
        }
        let ac = AhoCorasickBuilder::new()
            .match_kind(MatchKind::Standard)
            .ascii_case_insensitive(true)
            .build(flat.iter().map(|l| &l.bytes))
            .map_err(|e| CompileError::Automaton(e.to_string()))?;
        Ok(Engine::Multi(ac))
    }

    pub fn mode(&self) -> ScanMode {
        self.mode
    }

    /// Number of patterns embedded in the database.
    pub fn len(&self) -> usize {
        self.patterns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }

    /// External ids in embedding order.
    pub fn ids(&self) -> impl Iterator<Item = u32> + '_ {
        self.patterns.iter().map(|p| p.id)
    }

    /// Per-pattern flags in embedding order.
    pub fn flags(&self) -> impl Iterator<Item = u32> + '_ {
        self.patterns.iter().map(|p| p.flags)
    }

    /// Serialize to a byte blob.
    pub fn serialize(&self) -> Result<Vec<u8>, CompileError> {
        let repr = DbRepr {
            mode: self.mode.tag(),
            patterns: self.patterns.clone(),
            literals: self.literals.clone(),
        };
        postcard::to_allocvec(&repr).map_err(|e| CompileError::Corrupt(e.to_string()))
    }

    /// Rebuild a database from a serialized blob.
    pub fn deserialize(bytes: &[u8]) -> Result<Self, CompileError> {
        let repr: DbRepr =
            postcard::from_bytes(bytes).map_err(|e| CompileError::Corrupt(e.to_string()))?;
        let mode = ScanMode::from_tag(repr.mode)
            .ok_or_else(|| CompileError::Corrupt(format!("unknown scan mode {}", repr.mode)))?;
        for lit in &repr.literals {
            if lit.owner as usize >= repr.patterns.len() {
                return Err(CompileError::Corrupt("literal owner out of range".into()));
            }
        }
        let engine = Self::build_engine(&repr.patterns, &repr.literals)?;
        Ok(Self {
            mode,
            patterns: repr.patterns,
            literals: repr.literals,
            engine,
        })
    }

    /// Allocate scratch for scans over this database.
    pub fn alloc_scratch(&self) -> Scratch {
        Scratch {
            reported: vec![0; self.patterns.len().div_ceil(8)],
        }
    }

    /// Scan one buffer. The callback receives (external id, from, to) for
    /// every reported candidate and cannot stop the scan.
    pub fn scan<F>(&self, data: &[u8], scratch: &mut Scratch, mut on_match: F)
    where
        F: FnMut(u32, u64, u64),
    {
        scratch.reset();
        self.run(data, 0, scratch, &mut on_match);
    }

    /// Scan a vector of buffers as one stream; offsets handed to the
    /// callback are cumulative over the vector.
    pub fn scan_vector<F>(&self, slices: &[&[u8]], scratch: &mut Scratch, mut on_match: F)
    where
        F: FnMut(u32, u64, u64),
    {
        scratch.reset();
        let mut base = 0u64;
        for data in slices {
            self.run(data, base, scratch, &mut on_match);
            base += data.len() as u64;
        }
    }

    fn run<F>(&self, data: &[u8], base: u64, scratch: &mut Scratch, on_match: &mut F)
    where
        F: FnMut(u32, u64, u64),
    {
        match &self.engine {
            Engine::Empty => {}
            Engine::Single(finder) => {
                let lit = &self.literals[0];
                let len = lit.bytes.len();
                for pos in finder.find_iter(data) {
                    self.report(lit, pos, pos + len, base, scratch, on_match);
                }
            }
            Engine::Multi(ac) => {
                for m in ac.find_overlapping_iter(data) {
                    let lit = &self.literals[m.pattern().as_usize()];
                    let owner = &self.patterns[lit.owner as usize];
                    // The automaton folds ASCII case for every literal;
                    // hits for case-sensitive patterns must match exactly.
                    if owner.flags & FLAG_CASELESS == 0 && data[m.start()..m.end()] != lit.bytes[..] {
                        continue;
                    }
                    self.report(lit, m.start(), m.end(), base, scratch, on_match);
                }
            }
        }
    }

    fn report<F>(
        &self,
        lit: &DbLiteral,
        start: usize,
        end: usize,
        base: u64,
        scratch: &mut Scratch,
        on_match: &mut F,
    ) where
        F: FnMut(u32, u64, u64),
    {
        let owner = &self.patterns[lit.owner as usize];
        if owner.flags & FLAG_SINGLEMATCH != 0 && scratch.test_and_set(lit.owner as usize) {
            return;
        }
        on_match(owner.id, base + start as u64, base + end as u64);
    }
}

#[cfg(test)]
#[path = "db_tests.rs"]
mod tests;
