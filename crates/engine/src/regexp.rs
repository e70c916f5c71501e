// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! The accurate expression primitive.
//!
//! A [`Regexp`] wraps a compiled byte regex together with the attributes
//! the cache needs: a stable content id (digest of pattern text and
//! semantic flags), the match-count limit, and the two slots assigned by
//! the registry — the dense cache id and the class back-reference, stored
//! as a class index resolved through the cache on demand.

use std::fmt;
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};

use sha2::{Digest, Sha256};

use crate::error::Error;

/// Number of bytes in an expression content id.
pub const CONTENT_ID_BYTES: usize = 32;

/// Cache id of an expression that was never registered or was replaced
/// out of the cache.
pub const INVALID_CACHE_ID: u32 = u32::MAX;

pub(crate) const INVALID_CLASS: usize = usize::MAX;

/// Semantic flags of an expression.
///
/// `caseless`, `multiline`, `dotall` and `utf` affect both the accurate
/// compilation and the content id; `accurate_only` marks patterns that
/// must never enter a prefilter database.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ReFlags {
    pub caseless: bool,
    pub multiline: bool,
    pub dotall: bool,
    pub utf: bool,
    pub accurate_only: bool,
}

impl ReFlags {
    /// Bits participating in the content id.
    pub(crate) fn semantic_bits(self) -> u32 {
        let mut bits = 0;
        if self.caseless {
            bits |= 1;
        }
        if self.multiline {
            bits |= 1 << 1;
        }
        if self.dotall {
            bits |= 1 << 2;
        }
        if self.utf {
            bits |= 1 << 3;
        }
        bits
    }

    /// Bits participating in the class hash only.
    pub(crate) fn engine_bits(self) -> u32 {
        u32::from(self.accurate_only)
    }
}

/// A compiled accurate regular expression with cache attributes.
pub struct Regexp {
    pattern: String,
    flags: ReFlags,
    max_hits: u32,
    id: [u8; CONTENT_ID_BYTES],
    re: regex::bytes::Regex,
    cache_id: AtomicU32,
    class_slot: AtomicUsize,
}

impl Regexp {
    /// Compile a pattern with the given flags.
    pub fn new(pattern: &str, flags: ReFlags) -> Result<Self, Error> {
        let re = regex::bytes::RegexBuilder::new(pattern)
            .case_insensitive(flags.caseless)
            .multi_line(flags.multiline)
            .dot_matches_new_line(flags.dotall)
            .unicode(flags.utf)
            .build()
            .map_err(|e| Error::Pattern {
                pattern: pattern.to_string(),
                source: Box::new(e),
            })?;

        let mut hasher = Sha256::new();
        hasher.update(pattern.as_bytes());
        hasher.update(flags.semantic_bits().to_le_bytes());
        let id = hasher.finalize().into();

        Ok(Self {
            pattern: pattern.to_string(),
            flags,
            max_hits: 0,
            id,
            re,
            cache_id: AtomicU32::new(INVALID_CACHE_ID),
            class_slot: AtomicUsize::new(INVALID_CLASS),
        })
    }

    /// Limit the match count reported for this expression (0 = unlimited).
    pub fn with_max_hits(mut self, max_hits: u32) -> Self {
        self.max_hits = max_hits;
        self
    }

    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    pub fn flags(&self) -> ReFlags {
        self.flags
    }

    pub fn max_hits(&self) -> u32 {
        self.max_hits
    }

    /// Stable content id: digest of pattern text and semantic flags.
    pub fn content_id(&self) -> &[u8; CONTENT_ID_BYTES] {
        &self.id
    }

    /// Dense index assigned by the registry, [`INVALID_CACHE_ID`] before
    /// registration and after replacement.
    pub fn cache_id(&self) -> u32 {
        self.cache_id.load(Ordering::Relaxed)
    }

    pub(crate) fn set_cache_id(&self, id: u32) {
        self.cache_id.store(id, Ordering::Relaxed);
    }

    pub(crate) fn class_slot(&self) -> usize {
        self.class_slot.load(Ordering::Relaxed)
    }

    pub(crate) fn set_class_slot(&self, slot: usize) {
        self.class_slot.store(slot, Ordering::Relaxed);
    }

    pub(crate) fn clear_registration(&self) {
        self.set_cache_id(INVALID_CACHE_ID);
        self.set_class_slot(INVALID_CLASS);
    }

    /// The compiled accurate engine.
    pub(crate) fn engine(&self) -> &regex::bytes::Regex {
        &self.re
    }
}

impl PartialEq for Regexp {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Regexp {}

impl fmt::Debug for Regexp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Regexp")
            .field("pattern", &self.pattern)
            .field("flags", &self.flags)
            .field("max_hits", &self.max_hits)
            .field("cache_id", &self.cache_id())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
#[path = "regexp_tests.rs"]
mod tests;
