// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Message regions and class identity.
//!
//! A class groups every expression that scans the same region of a
//! message. The class id is a stable seeded 64-bit hash over the region
//! kind tag and the region parameter (a header name for header-like
//! regions, empty otherwise), so two registrations against the same
//! region always land in the same class.

use std::hash::Hasher;

/// Seed for the class-id hash. Stability matters only within a process,
/// but seahash is stable across builds, which keeps debug output
/// comparable between runs.
const CLASS_ID_SEEDS: (u64, u64, u64, u64) = (
    0x9ae1_6a3b_2f90_404f,
    0x24f4_8c1a_77d2_66e1,
    0x52c3_9f0d_8b64_1aa5,
    0x06b7_d2e9_31c8_59f3,
);

/// The closed set of message regions an expression can scan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RegionKind {
    /// A named header, decoded value.
    Header,
    /// A named header, raw value.
    RawHeader,
    /// A named MIME part header, decoded value.
    MimeHeader,
    /// The whole raw header block.
    AllHeaders,
    /// Decoded content of each text part.
    MimePart,
    /// Original (undecoded) bytes of each text part.
    RawMimePart,
    /// Every URL and email string found in the message.
    Url,
    /// The full raw message.
    Body,
    /// Subject plus HTML-stripped decoded text parts.
    SaBody,
    /// Original bytes of each text part.
    SaRawBody,
}

impl RegionKind {
    /// Stable one-byte tag used for class-id hashing.
    pub(crate) fn tag(self) -> u8 {
        match self {
            RegionKind::Header => 0,
            RegionKind::RawHeader => 1,
            RegionKind::MimeHeader => 2,
            RegionKind::AllHeaders => 3,
            RegionKind::MimePart => 4,
            RegionKind::RawMimePart => 5,
            RegionKind::Url => 6,
            RegionKind::Body => 7,
            RegionKind::SaBody => 8,
            RegionKind::SaRawBody => 9,
        }
    }

    /// Human-readable name used in log records.
    pub fn as_str(self) -> &'static str {
        match self {
            RegionKind::Header => "header",
            RegionKind::RawHeader => "raw header",
            RegionKind::MimeHeader => "mime header",
            RegionKind::AllHeaders => "all headers",
            RegionKind::MimePart => "part",
            RegionKind::RawMimePart => "raw part",
            RegionKind::Url => "url",
            RegionKind::Body => "rawbody",
            RegionKind::SaBody => "sa body",
            RegionKind::SaRawBody => "sa raw body",
        }
    }

    /// Parse a rule-config region token. Accepts the historical aliases
    /// `message` for the raw body and `uri` for the url region.
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "header" => Some(RegionKind::Header),
            "rawheader" => Some(RegionKind::RawHeader),
            "mimeheader" => Some(RegionKind::MimeHeader),
            "allheader" => Some(RegionKind::AllHeaders),
            "mime" => Some(RegionKind::MimePart),
            "rawmime" => Some(RegionKind::RawMimePart),
            "url" | "uri" => Some(RegionKind::Url),
            "body" | "message" => Some(RegionKind::Body),
            "sabody" => Some(RegionKind::SaBody),
            "sarawbody" => Some(RegionKind::SaRawBody),
            _ => None,
        }
    }
}

/// Compute the class id for a region kind and parameter.
///
/// The parameter is the header name for header-like regions and empty for
/// the rest; callers are expected to pass a canonical form.
pub fn class_id(kind: RegionKind, param: &[u8]) -> u64 {
    let (k1, k2, k3, k4) = CLASS_ID_SEEDS;
    let mut h = seahash::SeaHasher::with_seeds(k1, k2, k3, k4);
    h.write(&[kind.tag()]);
    if !param.is_empty() {
        h.write(param);
    }
    h.finish()
}

#[cfg(test)]
#[path = "region_tests.rs"]
mod tests;
