//! Content-type detection for bodies sent without a `Content-Type`.
//!
//! Follows the WHATWG MIME sniffing table for the signatures that matter to
//! an API: markup, a handful of binary formats, and a text-or-binary
//! fallback over the first 512 bytes.

const SNIFF_LEN: usize = 512;

const SIGNATURES: &[(&[u8], &str)] = &[
    (b"%PDF-", "application/pdf"),
    (b"\x89PNG\r\n\x1a\n", "image/png"),
    (b"\xff\xd8\xff", "image/jpeg"),
    (b"GIF87a", "image/gif"),
    (b"GIF89a", "image/gif"),
    (b"PK\x03\x04", "application/zip"),
    (b"\x1f\x8b\x08", "application/x-gzip"),
    (b"\xef\xbb\xbf", "text/plain; charset=utf-8"),
];

const MARKUP: &[(&str, &str)] = &[
    ("<?xml", "text/xml; charset=utf-8"),
    ("<!doctype html", "text/html; charset=utf-8"),
    ("<html", "text/html; charset=utf-8"),
    ("<head", "text/html; charset=utf-8"),
    ("<body", "text/html; charset=utf-8"),
];

fn is_binary_byte(b: u8) -> bool {
    matches!(b, 0x00..=0x08 | 0x0b | 0x0e..=0x1a | 0x1c..=0x1f)
}

/// Guess the media type of `body`.
pub fn sniff(body: &[u8]) -> &'static str {
    let head = &body[..body.len().min(SNIFF_LEN)];
    for (magic, media) in SIGNATURES {
        if head.starts_with(magic) {
            return media;
        }
    }
    let start = head
        .iter()
        .position(|b| !matches!(b, b'\t' | b'\n' | b'\x0c' | b'\r' | b' '))
        .unwrap_or(head.len());
    let trimmed = &head[start..];
    for (tag, media) in MARKUP {
        if trimmed.len() >= tag.len() && trimmed[..tag.len()].eq_ignore_ascii_case(tag.as_bytes()) {
            return media;
        }
    }
    if head.iter().copied().any(is_binary_byte) {
        "application/octet-stream"
    } else {
        "text/plain; charset=utf-8"
    }
}
