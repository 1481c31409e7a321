//! multipart/form-data decoding.
//!
//! The parser works on the complete request body. Delimiters are matched as
//! literal byte sequences so payloads may contain any bytes at all. Parsing
//! is best-effort: a malformed section is skipped, and input without a
//! usable boundary yields an empty list. Callers decide whether an empty
//! result is an error.

use std::collections::HashMap;

use bytes::Bytes;
use percent_encoding::percent_decode_str;

const CRLF: &[u8] = b"\r\n";
const HEADER_END: &[u8] = b"\r\n\r\n";
const DEFAULT_CONTENT_TYPE: &str = "text/plain";

/// Lower-cased header name to trimmed header value.
pub type HeaderMap = HashMap<String, String>;

/// One decoded section of a multipart body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawPart {
    pub field_name: String,
    pub file_name: Option<String>,
    /// `text/plain` when the section carries no `Content-Type`.
    pub content_type: String,
    pub payload: Bytes,
}

impl RawPart {
    /// Whether the section carried a filename (a file upload rather than a text field).
    pub fn is_file(&self) -> bool {
        self.file_name.is_some()
    }

    /// Payload decoded as UTF-8, replacing invalid sequences.
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.payload).into_owned()
    }
}

/// Extract the boundary parameter from a `Content-Type` header value.
///
/// Returns `None` unless the media type is `multipart/*` and a non-empty
/// boundary is present. Surrounding quotes are stripped and anything after
/// the next `;` is ignored.
pub fn extract_boundary(content_type: &str) -> Option<String> {
    let mut segments = content_type.split(';');
    let media_type = segments.next()?.trim().to_ascii_lowercase();
    if !media_type.starts_with("multipart/") {
        return None;
    }

    segments.find_map(|segment| {
        let (name, value) = segment.split_once('=')?;
        if !name.trim().eq_ignore_ascii_case("boundary") {
            return None;
        }
        let value = value.trim();
        let value = value
            .strip_prefix('"')
            .and_then(|v| v.strip_suffix('"'))
            .unwrap_or(value);
        if value.is_empty() {
            None
        } else {
            Some(value.to_string())
        }
    })
}

/// Parse a section's header block: one header per line, split on the first
/// colon, names lower-cased, values trimmed. Lines without a colon are ignored
/// and the first occurrence of a repeated header wins.
pub fn parse_header_block(block: &str) -> HeaderMap {
    let mut headers = HeaderMap::new();
    for line in block.lines() {
        let Some((name, value)) = line.split_once(':') else {
            continue;
        };
        let name = name.trim().to_ascii_lowercase();
        if name.is_empty() {
            continue;
        }
        headers
            .entry(name)
            .or_insert_with(|| value.trim().to_string());
    }
    headers
}

/// Split a header value such as `form-data; name="files"; filename="a.jpg"`
/// into its primary value and its parameters.
///
/// Parameter names are lower-cased; quoted values are unquoted and
/// backslash escapes inside them are resolved. Semicolons inside quotes do
/// not split.
pub fn parse_header_params(value: &str) -> (String, Vec<(String, String)>) {
    let segments = split_unquoted(value, ';');
    let mut iter = segments.into_iter();
    let primary = iter.next().unwrap_or_default().trim().to_string();

    let params = iter
        .filter_map(|segment| {
            let (name, raw) = segment.split_once('=')?;
            let name = name.trim().to_ascii_lowercase();
            if name.is_empty() {
                return None;
            }
            Some((name, unquote(raw.trim())))
        })
        .collect();

    (primary, params)
}

fn split_unquoted(value: &str, separator: char) -> Vec<String> {
    let mut segments = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    let mut escaped = false;

    for c in value.chars() {
        if escaped {
            current.push(c);
            escaped = false;
            continue;
        }
        match c {
            '\\' if in_quotes => {
                current.push(c);
                escaped = true;
            }
            '"' => {
                current.push(c);
                in_quotes = !in_quotes;
            }
            c if c == separator && !in_quotes => {
                segments.push(std::mem::take(&mut current));
            }
            c => current.push(c),
        }
    }
    segments.push(current);
    segments
}

fn unquote(raw: &str) -> String {
    let Some(inner) = raw.strip_prefix('"').and_then(|v| v.strip_suffix('"')) else {
        return raw.to_string();
    };

    let mut out = String::with_capacity(inner.len());
    let mut chars = inner.chars();
    while let Some(c) = chars.next() {
        if c == '\\' {
            if let Some(next) = chars.next() {
                out.push(next);
            }
        } else {
            out.push(c);
        }
    }
    out
}

/// Decode an RFC 5987 extended value (`UTF-8''na%C3%AFve.jpg`).
fn decode_ext_value(value: &str) -> Option<String> {
    let encoded = match value.splitn(3, '\'').collect::<Vec<_>>().as_slice() {
        [_charset, _language, encoded] => *encoded,
        _ => value,
    };
    let decoded = percent_decode_str(encoded).decode_utf8_lossy().into_owned();
    if decoded.is_empty() {
        None
    } else {
        Some(decoded)
    }
}

fn find(haystack: &[u8], needle: &[u8], from: usize) -> Option<usize> {
    if needle.is_empty() || from >= haystack.len() {
        return None;
    }
    haystack[from..]
        .windows(needle.len())
        .position(|window| window == needle)
        .map(|pos| pos + from)
}

/// Decode every well-formed section of `buffer` delimited by `boundary`.
///
/// Sections without a `Content-Disposition` name are skipped. A final
/// section that never reaches a closing delimiter is dropped, but earlier
/// complete sections are still returned. Payloads share memory with
/// `buffer`.
pub fn parse(buffer: &Bytes, boundary: &str) -> Vec<RawPart> {
    let mut parts = Vec::new();
    if boundary.is_empty() {
        return parts;
    }

    let delimiter = [b"--".as_slice(), boundary.as_bytes()].concat();
    let next_delimiter = [CRLF, delimiter.as_slice()].concat();
    let bytes = &buffer[..];

    // Anything before the first delimiter is preamble.
    let Some(mut cursor) = find(bytes, &delimiter, 0) else {
        return parts;
    };

    loop {
        let mut pos = cursor + delimiter.len();

        if bytes[pos..].starts_with(b"--") {
            break;
        }

        // Transport padding is allowed between the delimiter and its line break.
        while pos < bytes.len() && (bytes[pos] == b' ' || bytes[pos] == b'\t') {
            pos += 1;
        }
        if !bytes[pos..].starts_with(CRLF) {
            break;
        }
        let start = pos + CRLF.len();

        let Some(end) = find(bytes, &next_delimiter, start) else {
            // Truncated final section.
            break;
        };

        if let Some(part) = parse_section(buffer, start, end) {
            parts.push(part);
        }

        cursor = end + CRLF.len();
    }

    parts
}

fn parse_section(buffer: &Bytes, start: usize, end: usize) -> Option<RawPart> {
    let section = &buffer[start..end];

    // A section with no headers starts directly with the blank line.
    let (header_text, body_start) = if section.starts_with(CRLF) {
        (String::new(), start + CRLF.len())
    } else {
        let split = find(section, HEADER_END, 0)?;
        (
            String::from_utf8_lossy(&section[..split]).into_owned(),
            start + split + HEADER_END.len(),
        )
    };

    let headers = parse_header_block(&header_text);
    let disposition = headers.get("content-disposition")?;
    let (_, params) = parse_header_params(disposition);

    let param = |wanted: &str| {
        params
            .iter()
            .find(|(name, _)| name == wanted)
            .map(|(_, value)| value.as_str())
    };

    let field_name = param("name").filter(|name| !name.is_empty())?.to_string();
    let file_name = param("filename*")
        .and_then(decode_ext_value)
        .or_else(|| param("filename").map(str::to_string));

    let content_type = headers
        .get("content-type")
        .filter(|value| !value.is_empty())
        .cloned()
        .unwrap_or_else(|| DEFAULT_CONTENT_TYPE.to_string());

    Some(RawPart {
        field_name,
        file_name,
        content_type,
        payload: buffer.slice(body_start..end),
    })
}
