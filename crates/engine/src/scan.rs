// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! The scanner.
//!
//! [`Runtime::process`] answers "how many times does this expression
//! match this message". The first query for any expression of a class
//! scans the class's region exactly once — through the prefilter database
//! when one is bound, through the accurate engine otherwise — and settles
//! the checked bit and result count of every class member it can, so
//! subsequent queries are O(1) bitmap lookups.

use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::cache::{MatchType, ReCache};
use crate::region::RegionKind;
use crate::regexp::{INVALID_CLASS, Regexp};
use crate::runtime::Runtime;
use crate::task::Message;

/// Accurate runs taking longer than this are worth a log record.
const SLOW_SCAN: Duration = Duration::from_millis(100);

/// One in this many accurate runs is timed.
const TIMING_SAMPLE: u64 = 10;

impl Runtime {
    /// Evaluate an expression against the message, memoized.
    ///
    /// `kind` and `param` must name the region the expression was
    /// registered for; `strong` selects case-sensitive header lookup.
    /// Returns the clamped match count.
    pub fn process<M: Message>(
        &mut self,
        task: &M,
        re: &Regexp,
        kind: RegionKind,
        param: &[u8],
        strong: bool,
    ) -> u32 {
        let id = re.cache_id();
        if id as usize >= self.cache.len() {
            tracing::error!(pattern = re.pattern(), "expression has no valid cache id");
            return 0;
        }

        if self.is_checked(id) {
            self.stats.regexps_fast_cached += 1;
            return u32::from(self.results[id as usize]);
        }

        let slot = re.class_slot();
        if slot == INVALID_CLASS {
            tracing::error!(pattern = re.pattern(), "expression has no class");
            return 0;
        }
        debug_assert_eq!(
            self.cache.classes[slot].id(),
            crate::region::class_id(kind, param),
        );

        self.exec(task, re, slot, strong)
    }

    /// Slow path: assemble the class's region slices and scan.
    fn exec<M: Message>(&mut self, task: &M, re: &Regexp, slot: usize, strong: bool) -> u32 {
        let cache = Arc::clone(&self.cache);
        let class = &cache.classes[slot];
        tracing::debug!(
            region = class.kind().as_str(),
            pattern = re.pattern(),
            "slow path"
        );

        match class.kind() {
            RegionKind::Header | RegionKind::RawHeader | RegionKind::MimeHeader => {
                let name = std::str::from_utf8(class.param()).unwrap_or_default();
                let list = if class.kind() == RegionKind::MimeHeader {
                    task.mime_headers(name, strong)
                } else {
                    task.headers(name, strong)
                };
                if !list.is_empty() {
                    let raw = class.kind() == RegionKind::RawHeader;
                    let slices: Vec<&[u8]> = list
                        .iter()
                        .map(|h| {
                            if raw {
                                h.raw.as_slice()
                            } else {
                                decoded_or_empty(h.decoded.as_deref())
                            }
                        })
                        .collect();
                    self.process_data(re, &slices);
                }
            }
            RegionKind::AllHeaders => {
                self.process_data(re, &[task.raw_headers()]);
            }
            RegionKind::MimePart | RegionKind::RawMimePart => {
                let parts = task.text_parts();
                if !parts.is_empty() {
                    let raw = class.kind() == RegionKind::RawMimePart;
                    let slices: Vec<&[u8]> = parts
                        .iter()
                        .map(|p| {
                            if p.is_empty() {
                                &[][..]
                            } else if raw {
                                p.orig.as_slice()
                            } else {
                                p.content.as_slice()
                            }
                        })
                        .collect();
                    self.process_data(re, &slices);
                }
            }
            RegionKind::Url => {
                let slices: Vec<&[u8]> = task
                    .urls()
                    .iter()
                    .chain(task.emails())
                    .map(|u| u.as_slice())
                    .collect();
                if !slices.is_empty() {
                    self.process_data(re, &slices);
                }
            }
            RegionKind::Body => {
                self.process_data(re, &[task.raw_message()]);
            }
            RegionKind::SaBody => {
                // The Subject is the first paragraph of the body; text
                // parts follow HTML-stripped.
                let subject = task
                    .headers("Subject", false)
                    .first()
                    .map(|h| decoded_or_empty(h.decoded.as_deref()))
                    .unwrap_or_default();
                let mut slices: Vec<&[u8]> = vec![subject];
                for p in task.text_parts() {
                    slices.push(p.stripped.as_deref().unwrap_or_default());
                }
                self.process_data(re, &slices);
            }
            RegionKind::SaRawBody => {
                let parts = task.text_parts();
                if !parts.is_empty() {
                    let slices: Vec<&[u8]> = parts.iter().map(|p| p.orig.as_slice()).collect();
                    self.process_data(re, &slices);
                }
            }
        }

        if self.has_prefilter && !cache.config().disable_prefilter {
            self.finish_class(slot);
        }
        let id = re.cache_id();
        self.set_checked(id);
        u32::from(self.results[id as usize])
    }

    /// Scan the assembled slices for the queried expression, through the
    /// class's prefilter database when possible.
    fn process_data(&mut self, re: &Regexp, slices: &[&[u8]]) -> u32 {
        let id = re.cache_id();
        if slices.is_empty() {
            // Absence of the region settles the expression at zero.
            self.results[id as usize] = 0;
            self.set_checked(id);
            return 0;
        }

        let cache = Arc::clone(&self.cache);
        let accurate_only = cache
            .elt(id)
            .is_none_or(|elt| elt.match_type == MatchType::Accurate);
        let class = &cache.classes[re.class_slot()];

        if cache.config().disable_prefilter
            || !self.has_prefilter
            || accurate_only
            || class.db.is_none()
        {
            let mut ret = 0;
            for s in slices {
                ret = self.process_accurate(re, s);
                self.results[id as usize] = clamp_count(ret);
            }
            self.set_checked(id);
            return ret;
        }

        let Some(db) = class.db.as_ref() else {
            return 0;
        };
        let slot = re.class_slot();
        let cap = cache.config().max_re_data;
        let clipped: Vec<&[u8]> = slices.iter().map(|s| clip(s, cap)).collect();
        for s in &clipped {
            self.stats.bytes_scanned += s.len() as u64;
        }

        let mut scratch = self
            .scratch
            .remove(&slot)
            .unwrap_or_else(|| db.alloc_scratch());

        if cache.config().vectorized {
            let ctx: &[&[u8]] = &clipped;
            db.scan_vector(ctx, &mut scratch, |mid, _from, to| {
                self.prefilter_hit(&cache, ctx, mid, to);
            });
        } else {
            for s in &clipped {
                let ctx = std::slice::from_ref(s);
                db.scan(s, &mut scratch, |mid, _from, to| {
                    self.prefilter_hit(&cache, ctx, mid, to);
                });
            }
        }

        self.scratch.insert(slot, scratch);
        u32::from(self.results[id as usize])
    }

    /// Prefilter callback: record an exact hit or re-check a candidate.
    fn prefilter_hit(&mut self, cache: &ReCache, slices: &[&[u8]], id: u32, to: u64) {
        let Some(elt) = cache.elt(id) else {
            return;
        };
        let max_hits = elt.re.max_hits();

        if elt.match_type == MatchType::Prefilter {
            self.set_checked(id);
            let r = u32::from(self.results[id as usize]);
            if max_hits == 0 || r < max_hits {
                self.results[id as usize] = clamp_count(r + 1);
                self.stats.regexps_matched += 1;
            }
        } else if !self.is_checked(id) {
            // Candidate only: re-evaluate with the accurate engine over
            // the slices consumed so far.
            let mut processed = 0u64;
            for s in slices {
                let ret = self.process_accurate(&elt.re, s);
                self.results[id as usize] = clamp_count(ret);
                self.set_checked(id);
                processed += s.len() as u64;
                if processed >= to {
                    break;
                }
            }
        }
    }

    /// Count accurate matches of `re` over one slice, accumulating into
    /// the expression's stored result and clamping at max-hits.
    fn process_accurate(&mut self, re: &Regexp, data: &[u8]) -> u32 {
        let id = re.cache_id() as usize;
        let max_hits = re.max_hits();
        let data = clip(data, self.cache.config().max_re_data);

        let mut r = u32::from(self.results[id]);
        if max_hits != 0 && r >= max_hits {
            return r;
        }
        let before = r;

        self.accurate_runs += 1;
        let timed = (self.accurate_runs % TIMING_SAMPLE == 0).then(Instant::now);

        for _ in re.engine().find_iter(data) {
            r += 1;
            if max_hits > 0 && r >= max_hits {
                break;
            }
        }

        self.stats.regexps_checked += 1;
        self.stats.bytes_scanned_accurate += data.len() as u64;
        self.stats.bytes_scanned += data.len() as u64;
        self.stats.regexps_matched += r - before;

        if let Some(start) = timed {
            let elapsed = start.elapsed();
            if elapsed > SLOW_SCAN {
                tracing::info!(
                    pattern = re.pattern(),
                    elapsed_ms = elapsed.as_millis() as u64,
                    "slow regexp"
                );
            }
        }
        r
    }

    /// After a prefilter scan, every embedded expression that reported
    /// nothing conclusively does not match: settle it at zero.
    fn finish_class(&mut self, slot: usize) {
        let cache = Arc::clone(&self.cache);
        for &id in &cache.classes[slot].db_ids {
            if !self.is_checked(id) {
                self.results[id as usize] = 0;
                self.set_checked(id);
            }
        }
    }
}

fn clamp_count(r: u32) -> u8 {
    r.min(u32::from(u8::MAX)) as u8
}

fn decoded_or_empty(decoded: Option<&[u8]>) -> &[u8] {
    match decoded {
        Some(d) if std::str::from_utf8(d).is_ok() => d,
        _ => &[],
    }
}

fn clip<'a>(data: &'a [u8], cap: u64) -> &'a [u8] {
    if cap > 0 && data.len() as u64 > cap {
        &data[..cap as usize]
    } else {
        data
    }
}

#[cfg(test)]
#[path = "scan_tests.rs"]
mod tests;
