// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! The message model consumed by the scanner.
//!
//! Parsing, decoding, HTML stripping and URL extraction happen upstream;
//! the scanner only needs read access to the resulting views. [`Message`]
//! is the contract; [`SimpleMessage`] is an owned implementation for
//! tests and simple embedders.

/// One header instance.
#[derive(Debug, Clone, Default)]
pub struct Header {
    /// Raw value bytes as they appeared in the message.
    pub raw: Vec<u8>,
    /// MIME-decoded value, if decoding succeeded. The scanner validates
    /// UTF-8 before use.
    pub decoded: Option<Vec<u8>>,
}

impl Header {
    /// A header whose raw and decoded forms are the same text.
    pub fn text(value: &str) -> Self {
        Self {
            raw: value.as_bytes().to_vec(),
            decoded: Some(value.as_bytes().to_vec()),
        }
    }
}

/// One text part of a multipart message.
#[derive(Debug, Clone, Default)]
pub struct TextPart {
    /// Transfer-decoded content.
    pub content: Vec<u8>,
    /// Original undecoded bytes.
    pub orig: Vec<u8>,
    /// HTML-stripped content, when the part was HTML.
    pub stripped: Option<Vec<u8>>,
    /// Whether the decoded content is valid UTF-8.
    pub utf: bool,
}

impl TextPart {
    pub fn is_empty(&self) -> bool {
        self.content.is_empty()
    }
}

/// Read access to the regions of one message under scan.
///
/// `strong` selects case-sensitive header-name lookup.
pub trait Message {
    /// Instances of a named top-level header, in message order.
    fn headers(&self, name: &str, strong: bool) -> Vec<&Header>;

    /// Instances of a named MIME part header, in message order.
    fn mime_headers(&self, name: &str, strong: bool) -> Vec<&Header>;

    /// The undecoded header block.
    fn raw_headers(&self) -> &[u8];

    /// Text parts in message order.
    fn text_parts(&self) -> &[TextPart];

    /// Extracted URL strings.
    fn urls(&self) -> &[Vec<u8>];

    /// Extracted email address strings.
    fn emails(&self) -> &[Vec<u8>];

    /// The complete raw message.
    fn raw_message(&self) -> &[u8];
}

/// An owned [`Message`] built field by field.
#[derive(Debug, Clone, Default)]
pub struct SimpleMessage {
    pub headers: Vec<(String, Header)>,
    pub mime_headers: Vec<(String, Header)>,
    pub raw_headers: Vec<u8>,
    pub parts: Vec<TextPart>,
    pub urls: Vec<Vec<u8>>,
    pub emails: Vec<Vec<u8>>,
    pub raw: Vec<u8>,
}

impl SimpleMessage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a header whose decoded form equals its raw text.
    pub fn header(mut self, name: &str, value: &str) -> Self {
        self.headers.push((name.to_string(), Header::text(value)));
        self
    }

    /// Add a UTF-8 text part whose decoded content equals its raw bytes.
    pub fn text_part(mut self, content: &str) -> Self {
        self.parts.push(TextPart {
            content: content.as_bytes().to_vec(),
            orig: content.as_bytes().to_vec(),
            stripped: None,
            utf: true,
        });
        self
    }

    pub fn part(mut self, part: TextPart) -> Self {
        self.parts.push(part);
        self
    }

    pub fn url(mut self, url: &str) -> Self {
        self.urls.push(url.as_bytes().to_vec());
        self
    }

    pub fn email(mut self, email: &str) -> Self {
        self.emails.push(email.as_bytes().to_vec());
        self
    }

    pub fn with_raw(mut self, raw: &[u8]) -> Self {
        self.raw = raw.to_vec();
        self
    }

    fn select<'a>(list: &'a [(String, Header)], name: &str, strong: bool) -> Vec<&'a Header> {
        list.iter()
            .filter(|(n, _)| {
                if strong {
                    n == name
                } else {
                    n.eq_ignore_ascii_case(name)
                }
            })
            .map(|(_, h)| h)
            .collect()
    }
}

impl Message for SimpleMessage {
    fn headers(&self, name: &str, strong: bool) -> Vec<&Header> {
        Self::select(&self.headers, name, strong)
    }

    fn mime_headers(&self, name: &str, strong: bool) -> Vec<&Header> {
        Self::select(&self.mime_headers, name, strong)
    }

    fn raw_headers(&self) -> &[u8] {
        &self.raw_headers
    }

    fn text_parts(&self) -> &[TextPart] {
        &self.parts
    }

    fn urls(&self) -> &[Vec<u8>] {
        &self.urls
    }

    fn emails(&self) -> &[Vec<u8>] {
        &self.emails
    }

    fn raw_message(&self) -> &[u8] {
        &self.raw
    }
}

#[cfg(test)]
#[path = "task_tests.rs"]
mod tests;
