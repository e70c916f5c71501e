// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! The expression registry.
//!
//! Expressions are registered into classes during configuration, then the
//! cache is finalized once: expressions are stable-sorted by content id,
//! dense cache ids are assigned, and every class hash (which names the
//! class's on-disk prefilter file) plus the global hash are computed.
//! After finalize the cache is immutable and can be shared freely between
//! concurrent [`Runtime`](crate::Runtime)s.

use std::collections::HashMap;
use std::sync::Arc;

use serde::Deserialize;
use sha2::{Digest, Sha256};

use crate::class::ReClass;
use crate::region::{self, RegionKind};
use crate::regexp::{INVALID_CACHE_ID, INVALID_CLASS, Regexp};

/// Configuration applied at finalize time.
#[derive(Debug, Clone, Copy, Default, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Force the accurate-only scan path even when databases are loaded.
    pub disable_prefilter: bool,
    /// Scan each class with one vectored call instead of a per-slice loop.
    /// Also selects the vectored on-disk magic.
    pub vectorized: bool,
    /// Clip every scanned slice to this many bytes (0 = unlimited).
    pub max_re_data: u64,
}

/// How a registered expression is evaluated at scan time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchType {
    /// Accurate engine only; not present in any prefilter database.
    Accurate,
    /// Prefilter reports are exact matches.
    Prefilter,
    /// Prefilter reports are candidates that need an accurate re-check.
    PrefilterApprox,
}

pub(crate) struct ReElt {
    pub(crate) re: Arc<Regexp>,
    pub(crate) match_type: MatchType,
}

/// The expression cache: all registered expressions and their classes.
pub struct ReCache {
    pub(crate) classes: Vec<ReClass>,
    class_index: HashMap<u64, usize>,
    pub(crate) re: Vec<ReElt>,
    hash: Option<String>,
    finalized: bool,
    pub(crate) prefilter_loaded: bool,
    pub(crate) config: CacheConfig,
}

impl Default for ReCache {
    fn default() -> Self {
        Self::new()
    }
}

impl ReCache {
    pub fn new() -> Self {
        Self {
            classes: Vec::new(),
            class_index: HashMap::new(),
            re: Vec::with_capacity(256),
            hash: None,
            finalized: false,
            prefilter_loaded: false,
            config: CacheConfig::default(),
        }
    }

    /// Number of registered expressions.
    pub fn len(&self) -> usize {
        self.re.len()
    }

    pub fn is_empty(&self) -> bool {
        self.re.is_empty()
    }

    pub fn is_finalized(&self) -> bool {
        self.finalized
    }

    /// Hex digest over all expressions, present after finalize.
    pub fn hash(&self) -> Option<&str> {
        self.hash.as_deref()
    }

    /// True when every class's prefilter database loaded successfully.
    pub fn is_prefilter_loaded(&self) -> bool {
        self.prefilter_loaded
    }

    pub fn config(&self) -> CacheConfig {
        self.config
    }

    /// Registered classes.
    pub fn classes(&self) -> impl Iterator<Item = &ReClass> {
        self.classes.iter()
    }

    /// Resolve an expression's class through its back-reference.
    pub fn class_of(&self, re: &Regexp) -> Option<&ReClass> {
        self.classes.get(re.class_slot())
    }

    /// How the expression is evaluated at scan time.
    pub fn match_type(&self, re: &Regexp) -> Option<MatchType> {
        self.re
            .get(re.cache_id() as usize)
            .map(|elt| elt.match_type)
    }

    pub(crate) fn elt(&self, id: u32) -> Option<&ReElt> {
        self.re.get(id as usize)
    }

    /// Register an expression for a region.
    ///
    /// Returns the canonical expression for this (class, content-id):
    /// registering the same pattern twice against the same region hands
    /// back the existing handle. The class is created on demand.
    pub fn add(&mut self, re: Regexp, kind: RegionKind, param: &[u8]) -> Arc<Regexp> {
        let class_id = region::class_id(kind, param);
        let slot = match self.class_index.get(&class_id) {
            Some(&slot) => slot,
            None => {
                let slot = self.classes.len();
                self.classes.push(ReClass::new(class_id, kind, param));
                self.class_index.insert(class_id, slot);
                slot
            }
        };

        let class = &mut self.classes[slot];
        if let Some(existing) = class.re.get(re.content_id()) {
            return Arc::clone(existing);
        }

        // Provisional id by registration order; finalize reassigns densely.
        re.set_cache_id(self.re.len() as u32);
        re.set_class_slot(slot);
        let re = Arc::new(re);
        class.re.insert(*re.content_id(), Arc::clone(&re));
        self.re.push(ReElt {
            re: Arc::clone(&re),
            match_type: MatchType::Accurate,
        });
        re
    }

    /// Substitute a registered expression in place.
    ///
    /// The replacement inherits the old expression's cache id and class
    /// membership; the old expression's registration is invalidated. The
    /// class map keeps its entry under the old content id, and the cache
    /// element's match type is left untouched.
    pub fn replace(&mut self, what: &Regexp, with: Regexp) -> Option<Arc<Regexp>> {
        let slot = what.class_slot();
        if slot == INVALID_CLASS {
            return None;
        }
        let cache_id = what.cache_id();
        debug_assert_ne!(cache_id, INVALID_CACHE_ID);
        let old_key = *what.content_id();

        with.set_cache_id(cache_id);
        with.set_class_slot(slot);
        what.clear_registration();

        let with = Arc::new(with);
        self.classes[slot].re.insert(old_key, Arc::clone(&with));
        self.re[cache_id as usize].re = Arc::clone(&with);
        Some(with)
    }

    /// Seal the cache: sort, assign dense ids, compute hashes.
    ///
    /// Each class hash covers the class id, every member's content id and
    /// flags in global sort order, and finally the total expression count
    /// of the cache, so that adding or removing any expression anywhere
    /// invalidates every class's on-disk file.
    pub fn finalize(&mut self, config: CacheConfig) {
        self.re
            .sort_by(|a, b| a.re.content_id().cmp(b.re.content_id()));

        let mut global = Sha256::new();
        let mut per_class: Vec<Option<Sha256>> = Vec::new();
        per_class.resize_with(self.classes.len(), || None);

        for (i, elt) in self.re.iter().enumerate() {
            let re = &elt.re;
            re.set_cache_id(i as u32);
            let slot = re.class_slot();
            debug_assert_ne!(slot, INVALID_CLASS);
            let class_id = self.classes[slot].id();
            let st = per_class[slot].get_or_insert_with(Sha256::new);

            for h in [&mut *st, &mut global] {
                h.update(class_id.to_le_bytes());
                h.update(re.content_id());
                h.update(re.flags().semantic_bits().to_le_bytes());
                h.update(re.flags().engine_bits().to_le_bytes());
                h.update(re.max_hits().to_le_bytes());
            }
        }

        self.hash = Some(hex::encode(global.finalize()));

        let total = self.re.len() as u64;
        for (slot, st) in per_class.into_iter().enumerate() {
            if let Some(mut st) = st {
                st.update(total.to_le_bytes());
                self.classes[slot].hash = Some(hex::encode(st.finalize()));
            }
        }

        self.config = config;
        self.finalized = true;

        tracing::info!(
            expressions = self.re.len(),
            classes = self.classes.len(),
            arch = std::env::consts::ARCH,
            vectorized = config.vectorized,
            "regexp cache finalized"
        );
    }

    /// Set the per-scan byte limit, returning the previous value.
    pub fn set_limit(&mut self, limit: u64) -> u64 {
        let old = self.config.max_re_data;
        self.config.max_re_data = limit;
        old
    }
}

#[cfg(test)]
#[path = "cache_tests.rs"]
mod tests;
