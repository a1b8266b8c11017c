//! Multipart bodies
//!
//! Calls with document parameters are sent as `multipart/form-data`, one part
//! per document, all parts of a multiple-valued field sharing the field name.
//! Multiple-valued responses come back as `multipart/mixed`, one part per
//! value.

use dataservices_core::{Error, Format, Result};
use uuid::Uuid;

use crate::request::{CallField, Document};

const CRLF: &[u8] = b"\r\n";

/// Generate a boundary that cannot collide with ordinary content.
pub fn new_boundary() -> String {
    format!("dataservices-{}", Uuid::new_v4().simple())
}

/// Encode request fields as a `multipart/form-data` body.
///
/// Empty fields are omitted. Returns the body; the matching content type is
/// `multipart/form-data; boundary={boundary}`.
pub fn encode_form_data(fields: &[CallField], boundary: &str) -> Vec<u8> {
    let mut body = Vec::new();
    for field in fields {
        for doc in field.value.documents() {
            body.extend_from_slice(b"--");
            body.extend_from_slice(boundary.as_bytes());
            body.extend_from_slice(CRLF);
            body.extend_from_slice(
                format!("Content-Disposition: form-data; name=\"{}\"", field.name).as_bytes(),
            );
            body.extend_from_slice(CRLF);
            body.extend_from_slice(format!("Content-Type: {}", doc.format.mime_type()).as_bytes());
            body.extend_from_slice(CRLF);
            body.extend_from_slice(CRLF);
            body.extend_from_slice(&doc.bytes);
            body.extend_from_slice(CRLF);
        }
    }
    body.extend_from_slice(b"--");
    body.extend_from_slice(boundary.as_bytes());
    body.extend_from_slice(b"--");
    body.extend_from_slice(CRLF);
    body
}

/// Extract the `boundary` parameter of a multipart content type.
pub fn boundary_of(content_type: &str) -> Option<&str> {
    content_type.split(';').skip(1).find_map(|param| {
        let (key, value) = param.split_once('=')?;
        if key.trim().eq_ignore_ascii_case("boundary") {
            Some(value.trim().trim_matches('"'))
        } else {
            None
        }
    })
}

/// Split a multipart body into its parts.
///
/// Each part's format comes from its `Content-Type` header, falling back to
/// `default_format` when the header is absent or unrecognised.
pub fn decode_parts(body: &[u8], boundary: &str, default_format: Format) -> Result<Vec<Document>> {
    let delimiter = format!("--{}", boundary).into_bytes();
    let mut parts = Vec::new();

    let mut pos = find(body, &delimiter, 0)
        .ok_or_else(|| Error::content("multipart body has no opening boundary"))?;
    loop {
        pos += delimiter.len();
        if body[pos..].starts_with(b"--") {
            break;
        }
        pos = skip_line_end(body, pos);

        let next = find(body, &delimiter, pos)
            .ok_or_else(|| Error::content("multipart body has no closing boundary"))?;
        let mut part = &body[pos..next];
        if part.ends_with(CRLF) {
            part = &part[..part.len() - CRLF.len()];
        }
        parts.push(decode_part(part, default_format)?);
        pos = next;
    }
    Ok(parts)
}

fn decode_part(part: &[u8], default_format: Format) -> Result<Document> {
    let (head, content) = match find(part, b"\r\n\r\n", 0) {
        Some(split) => (&part[..split], &part[split + 4..]),
        None if part.starts_with(CRLF) => (&part[..0], &part[2..]),
        None => return Err(Error::content("multipart part has no header separator")),
    };
    let head = String::from_utf8_lossy(head);
    let format = head
        .split("\r\n")
        .filter_map(|line| line.split_once(':'))
        .find(|(name, _)| name.trim().eq_ignore_ascii_case("content-type"))
        .map(|(_, value)| Format::from_mime_type(value))
        .filter(|format| *format != Format::Unknown)
        .unwrap_or(default_format);
    Ok(Document::new(format, content))
}

fn skip_line_end(body: &[u8], pos: usize) -> usize {
    let mut pos = pos;
    while pos < body.len() && (body[pos] == b' ' || body[pos] == b'\t') {
        pos += 1;
    }
    if body[pos..].starts_with(CRLF) {
        pos + 2
    } else if body[pos..].starts_with(b"\n") {
        pos + 1
    } else {
        pos
    }
}

fn find(haystack: &[u8], needle: &[u8], from: usize) -> Option<usize> {
    if needle.is_empty() || from > haystack.len() {
        return None;
    }
    haystack[from..]
        .windows(needle.len())
        .position(|window| window == needle)
        .map(|offset| from + offset)
}
