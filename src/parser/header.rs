//! RFC 5322 header blocks: reading, unfolding, parameter lookup and
//! encoded-word (RFC 2047) decoding.

use std::io;

use mail_parser::parsers::MessageStream;
use serde::Serialize;
use tracing::{trace, warn};

use crate::store::cursor::SourceCursor;

const UTF8_BOM: &[u8] = &[0xEF, 0xBB, 0xBF];

/// A single raw header field. `value` is unfolded but not decoded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Header {
    pub name: String,
    pub value: String,
}

/// Ordered header fields of one part.
///
/// Lookups are case-insensitive and return the first matching field.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct HeaderCollection {
    headers: Vec<Header>,
}

impl HeaderCollection {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a field, keeping any existing field of the same name.
    pub fn push(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.headers.push(Header {
            name: name.into(),
            value: value.into(),
        });
    }

    /// Replace the first field named `name`, or append one.
    pub fn set(&mut self, name: &str, value: impl Into<String>) {
        let value = value.into();
        match self
            .headers
            .iter_mut()
            .find(|h| h.name.eq_ignore_ascii_case(name))
        {
            Some(h) => h.value = value,
            None => self.push(name, value),
        }
    }

    /// Remove every field named `name`. Returns how many were removed.
    pub fn remove(&mut self, name: &str) -> usize {
        let before = self.headers.len();
        self.headers.retain(|h| !h.name.eq_ignore_ascii_case(name));
        before - self.headers.len()
    }

    /// Raw value of the first field named `name`.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|h| h.name.eq_ignore_ascii_case(name))
            .map(|h| h.value.as_str())
    }

    /// Raw values of every field named `name`, in order.
    pub fn get_all<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.headers
            .iter()
            .filter(move |h| h.name.eq_ignore_ascii_case(name))
            .map(|h| h.value.as_str())
    }

    /// Value of the first field named `name` with encoded-words decoded.
    pub fn get_decoded(&self, name: &str) -> Option<String> {
        self.get(name).map(decode_encoded_words)
    }

    /// Structured view of the first field named `name`.
    pub fn parsed(&self, name: &str) -> Option<ParsedHeader> {
        self.get(name).map(ParsedHeader::parse)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Header> {
        self.headers.iter()
    }

    pub fn len(&self) -> usize {
        self.headers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.headers.is_empty()
    }
}

/// A structured header value: the main value plus its parameters.
///
/// Built on mail-parser's Content-Type grammar, which also covers
/// Content-Disposition and single-token fields such as
/// Content-Transfer-Encoding. RFC 2231 continuations and extended
/// (`name*=charset''...`) values are resolved, so parameter values come back
/// decoded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedHeader {
    value: String,
    params: Vec<(String, String)>,
}

impl ParsedHeader {
    /// Parse a raw (unfolded) header value.
    pub fn parse(raw: &str) -> Self {
        let line = format!("{raw}\n");
        let parsed = MessageStream::new(line.as_bytes())
            .parse_content_type()
            .into_content_type();

        let Some(ct) = parsed else {
            trace!(value = raw, "Unstructured header value");
            let value = raw.split(';').next().unwrap_or_default();
            return Self {
                value: value.trim().to_string(),
                params: Vec::new(),
            };
        };

        let value = match ct.subtype() {
            Some(sub) => format!("{}/{sub}", ct.ctype()),
            None => ct.ctype().to_string(),
        };
        let params = ct
            .attributes()
            .unwrap_or_default()
            .iter()
            .map(|(name, value)| (name.to_ascii_lowercase(), value.to_string()))
            .collect();

        Self { value, params }
    }

    /// The main value (e.g. `multipart/mixed` for a Content-Type).
    pub fn value(&self) -> &str {
        &self.value
    }

    /// Value of the first parameter named `name` (case-insensitive).
    pub fn parameter(&self, name: &str) -> Option<&str> {
        self.params
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

// ── Header block reading ────────────────────────────────────────

/// Offsets and fields of one header block.
#[derive(Debug, Clone)]
pub struct HeaderBlock {
    pub headers: HeaderCollection,
    /// First byte of the first header line.
    pub start: u64,
    /// Start of the separating blank line (or of the first body line).
    pub end: u64,
    /// First byte of the content that follows the block.
    pub content_start: u64,
}

/// Read a header block at the cursor position.
///
/// The block ends at the first blank line, at EOF, or at the first line
/// that is neither a header field nor a folded continuation. In the last
/// case that line is left unread and becomes the first content line.
///
/// When `skip_envelope` is set, a leading mbox `From ` line (and a UTF-8
/// BOM) is treated as lying outside the block.
pub fn read_header_block(
    cursor: &mut SourceCursor,
    skip_envelope: bool,
) -> io::Result<HeaderBlock> {
    let mut start = cursor.position();
    let mut fields: Vec<(Vec<u8>, Vec<u8>)> = Vec::new();
    let mut first = true;

    let (end, content_start) = loop {
        let Some(line) = cursor.read_line()? else {
            let eof = cursor.position();
            break (eof, eof);
        };

        let mut text = line.text.as_slice();
        if first && skip_envelope {
            if let Some(rest) = text.strip_prefix(UTF8_BOM) {
                text = rest;
                start = line.start + UTF8_BOM.len() as u64;
            }
            if text.starts_with(b"From ") {
                trace!(offset = line.start, "Skipping mbox envelope line");
                start = line.end;
                first = false;
                continue;
            }
        }
        first = false;

        if line.is_empty() {
            break (line.start, line.end);
        }

        if matches!(text.first(), Some(b' ' | b'\t')) {
            if let Some((_, value)) = fields.last_mut() {
                let folded = text.trim_ascii();
                if !folded.is_empty() {
                    value.push(b' ');
                    value.extend_from_slice(folded);
                }
                continue;
            }
        } else if let Some(colon) = header_name_end(text) {
            fields.push((
                text[..colon].to_vec(),
                text[colon + 1..].trim_ascii().to_vec(),
            ));
            continue;
        }

        // Not a header line: the body starts here.
        cursor.rewind_to(line.start);
        break (line.start, line.start);
    };

    let mut headers = HeaderCollection::new();
    for (name, value) in fields {
        headers.push(
            decode_header_bytes(name.trim_ascii()),
            decode_header_bytes(&value),
        );
    }

    Ok(HeaderBlock {
        headers,
        start: start.min(end),
        end,
        content_start,
    })
}

/// Position of the `:` ending a valid field name, if the line is a field.
///
/// Field names are printable US-ASCII without spaces (RFC 5322 §2.2);
/// trailing whitespace before the colon is tolerated.
fn header_name_end(line: &[u8]) -> Option<usize> {
    let colon = line.iter().position(|&b| b == b':')?;
    let name = line[..colon].trim_ascii_end();
    if name.is_empty() || !name.iter().all(|&b| (33..=126).contains(&b)) {
        return None;
    }
    Some(colon)
}

/// Decode raw header bytes to a string.
///
/// Tries UTF-8 first, then falls back to Windows-1252 (which accepts every byte).
fn decode_header_bytes(bytes: &[u8]) -> String {
    match std::str::from_utf8(bytes) {
        Ok(s) => s.to_string(),
        Err(_) => {
            let (decoded, _, _) = encoding_rs::WINDOWS_1252.decode(bytes);
            decoded.into_owned()
        }
    }
}

// ── RFC 2047 ────────────────────────────────────────────────────

/// Decode RFC 2047 encoded-words in a header value.
///
/// Example: `"=?UTF-8?B?SG9sYQ==?= =?UTF-8?B?IG11bmRv?="` → `"Hola mundo"`
///
/// If decoding fails for any token, the original text is preserved.
pub fn decode_encoded_words(input: &str) -> String {
    let mut result = String::with_capacity(input.len());
    let mut remaining = input;
    let mut last_was_encoded = false;

    while let Some(start) = remaining.find("=?") {
        let before = &remaining[..start];
        // Whitespace between two encoded words is dropped (RFC 2047 §6.2)
        if !last_was_encoded || !before.trim().is_empty() {
            result.push_str(before);
        }

        let after_start = &remaining[start + 2..];
        match try_decode_one_word(after_start) {
            Some((text, consumed)) => {
                result.push_str(&text);
                remaining = &after_start[consumed..];
                last_was_encoded = true;
            }
            None => {
                result.push_str("=?");
                remaining = after_start;
                last_was_encoded = false;
            }
        }
    }

    result.push_str(remaining);
    result
}

/// Decode `charset?encoding?text?=`. Returns the text and the number of
/// bytes consumed after the opening `=?`.
fn try_decode_one_word(s: &str) -> Option<(String, usize)> {
    let (charset, rest) = s.split_once('?')?;
    let (encoding, rest) = rest.split_once('?')?;
    let end = rest.find("?=")?;
    let encoded_text = &rest[..end];
    let consumed = charset.len() + 1 + encoding.len() + 1 + end + 2;

    let bytes = match encoding.to_ascii_uppercase().as_str() {
        "B" => decode_base64(encoded_text.as_bytes())?,
        "Q" => decode_q_encoding(encoded_text),
        _ => return None,
    };

    // RFC 2231 language suffix: charset*lang
    let charset = charset.split('*').next().unwrap_or(charset);
    Some((decode_charset(charset, &bytes), consumed))
}

/// Minimal base64 decoder for encoded-words. Whitespace is ignored,
/// padding is optional.
fn decode_base64(input: &[u8]) -> Option<Vec<u8>> {
    fn b64val(c: u8) -> Option<u32> {
        match c {
            b'A'..=b'Z' => Some(u32::from(c - b'A')),
            b'a'..=b'z' => Some(u32::from(c - b'a') + 26),
            b'0'..=b'9' => Some(u32::from(c - b'0') + 52),
            b'+' => Some(62),
            b'/' => Some(63),
            _ => None,
        }
    }

    let mut out = Vec::with_capacity(input.len() * 3 / 4);
    let mut acc: u32 = 0;
    let mut bits = 0;
    for &c in input {
        if c == b'=' {
            break;
        }
        if c.is_ascii_whitespace() {
            continue;
        }
        acc = (acc << 6) | b64val(c)?;
        bits += 6;
        if bits >= 8 {
            bits -= 8;
            out.push((acc >> bits) as u8);
            acc &= (1 << bits) - 1;
        }
    }
    Some(out)
}

/// Decode Q-encoding (RFC 2047): underscores → spaces, `=XX` → byte.
fn decode_q_encoding(input: &str) -> Vec<u8> {
    let mut result = Vec::with_capacity(input.len());
    let bytes = input.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'_' => {
                result.push(b' ');
                i += 1;
            }
            b'=' if i + 2 < bytes.len() => {
                let hex = std::str::from_utf8(&bytes[i + 1..i + 3]).unwrap_or("");
                if let Ok(byte) = u8::from_str_radix(hex, 16) {
                    result.push(byte);
                    i += 3;
                } else {
                    result.push(b'=');
                    i += 1;
                }
            }
            b => {
                result.push(b);
                i += 1;
            }
        }
    }
    result
}

/// Decode bytes using a named charset.
fn decode_charset(charset: &str, bytes: &[u8]) -> String {
    match charset.to_ascii_lowercase().as_str() {
        "utf-8" | "utf8" => String::from_utf8_lossy(bytes).into_owned(),
        _ => {
            if let Some(encoding) = encoding_rs::Encoding::for_label(charset.as_bytes()) {
                let (decoded, _, _) = encoding.decode(bytes);
                decoded.into_owned()
            } else {
                warn!(
                    charset = charset,
                    "Unknown charset, falling back to UTF-8 lossy"
                );
                String::from_utf8_lossy(bytes).into_owned()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ParserConfig;
    use std::io::Cursor;

    fn cursor(data: &[u8]) -> SourceCursor {
        SourceCursor::new(Box::new(Cursor::new(data.to_vec())), &ParserConfig::default())
    }

    #[test]
    fn test_read_header_block_with_folding() {
        let mut c = cursor(b"Subject: This is a long\n\tsubject line\nFrom: a@b.com\n\nBody\n");
        let block = read_header_block(&mut c, true).unwrap();
        assert_eq!(block.headers.len(), 2);
        assert_eq!(
            block.headers.get("subject"),
            Some("This is a long subject line")
        );
        assert_eq!(block.start, 0);
        assert_eq!(block.end, 52);
        assert_eq!(block.content_start, 53);
        assert_eq!(c.position(), 53);
    }

    #[test]
    fn test_whitespace_only_line_is_a_continuation() {
        let mut c = cursor(b"Subject: a\n \t\nX-Other: b\n\nbody\n");
        let block = read_header_block(&mut c, false).unwrap();
        assert_eq!(block.headers.len(), 2);
        assert_eq!(block.headers.get("subject"), Some("a"));
        assert_eq!(block.headers.get("x-other"), Some("b"));
        assert_eq!(block.end, 25);
        assert_eq!(block.content_start, 26);
    }

    #[test]
    fn test_header_block_stops_at_non_header_line() {
        let mut c = cursor(b"begin 644 file.txt\nM86)C\nend\n");
        let block = read_header_block(&mut c, true).unwrap();
        assert!(block.headers.is_empty());
        assert_eq!(block.end, 0);
        assert_eq!(block.content_start, 0);
        assert_eq!(c.position(), 0);
    }

    #[test]
    fn test_header_block_skips_mbox_envelope() {
        let mut c = cursor(b"From user@example.com Thu Jan 01 00:00:00 2024\nSubject: Hi\n\nx");
        let block = read_header_block(&mut c, true).unwrap();
        assert_eq!(block.start, 47);
        assert_eq!(block.headers.get("Subject"), Some("Hi"));
    }

    #[test]
    fn test_header_block_at_eof() {
        let mut c = cursor(b"Subject: only headers");
        let block = read_header_block(&mut c, false).unwrap();
        assert_eq!(block.end, 21);
        assert_eq!(block.content_start, 21);
    }

    #[test]
    fn test_parsed_header_parameters() {
        let ct = ParsedHeader::parse("multipart/mixed; boundary=\"a;b\\\"c\"; charset=utf-8");
        assert_eq!(ct.value(), "multipart/mixed");
        assert_eq!(ct.parameter("BOUNDARY"), Some("a;b\"c"));
        assert_eq!(ct.parameter("charset"), Some("utf-8"));
        assert_eq!(ct.parameter("name"), None);
    }

    #[test]
    fn test_parsed_header_joins_continued_parameter() {
        let ct = ParsedHeader::parse("multipart/mixed; boundary*0=\"ab\"; boundary*1=\"cd\"");
        assert_eq!(ct.value(), "multipart/mixed");
        assert_eq!(ct.parameter("boundary"), Some("abcd"));
    }

    #[test]
    fn test_parsed_header_decodes_extended_parameter() {
        let cd = ParsedHeader::parse("attachment; filename*=UTF-8''caf%C3%A9.txt");
        assert_eq!(cd.value(), "attachment");
        assert_eq!(cd.parameter("filename"), Some("café.txt"));
    }

    #[test]
    fn test_parsed_header_single_token() {
        let cte = ParsedHeader::parse("Base64");
        assert!(cte.value().eq_ignore_ascii_case("base64"));
        assert_eq!(cte.parameter("charset"), None);
    }

    #[test]
    fn test_collection_set_and_remove() {
        let mut headers = HeaderCollection::new();
        headers.push("Received", "one");
        headers.push("Received", "two");
        headers.set("content-type", "text/plain");
        headers.set("Content-Type", "text/html");
        assert_eq!(headers.get("CONTENT-TYPE"), Some("text/html"));
        assert_eq!(headers.get_all("received").count(), 2);
        assert_eq!(headers.remove("received"), 2);
        assert_eq!(headers.len(), 1);
    }

    #[test]
    fn test_decode_base64_encoded_word() {
        let input = "=?UTF-8?B?SG9sYSBtdW5kbw==?=";
        assert_eq!(decode_encoded_words(input), "Hola mundo");
    }

    #[test]
    fn test_decode_q_encoded_word() {
        let input = "=?ISO-8859-1?Q?caf=E9?=";
        assert_eq!(decode_encoded_words(input), "café");
    }

    #[test]
    fn test_decode_multiple_encoded_words() {
        let input = "=?UTF-8?B?SG9sYQ==?= =?UTF-8?B?IG11bmRv?=";
        assert_eq!(decode_encoded_words(input), "Hola mundo");
    }

    #[test]
    fn test_decode_mixed_plain_and_encoded() {
        let input = "Re: =?UTF-8?B?SG9sYQ==?= there";
        assert_eq!(decode_encoded_words(input), "Re: Hola there");
    }

    #[test]
    fn test_get_decoded() {
        let mut headers = HeaderCollection::new();
        headers.push("Subject", "=?Windows-1252?Q?M=FCller?=");
        assert_eq!(headers.get_decoded("subject").as_deref(), Some("Müller"));
    }
}
