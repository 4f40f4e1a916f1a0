use bytes::Bytes;

use crate::http::headers::HeaderMap;
use crate::http::request::{Method, Request};

/// Largest header block accepted from a client.
pub const MAX_HEADER_BYTES: usize = 64 * 1024;

/// Body limit used by [`parse_http_request`].
pub const DEFAULT_MAX_BODY_BYTES: usize = 10 * 1024 * 1024;

#[derive(Debug, PartialEq, Eq)]
pub enum ParseError {
    InvalidRequest,
    InvalidMethod,
    InvalidHeader,
    InvalidContentLength,
    InvalidChunk,
    UnsupportedTransferEncoding,
    HeadersTooLarge,
    BodyTooLarge,
    Incomplete,
}

pub fn parse_http_request(buf: &[u8]) -> Result<(Request, usize), ParseError> {
    parse_http_request_with_limit(buf, DEFAULT_MAX_BODY_BYTES)
}

/// Parses one request from the front of `buf`, returning it together with
/// the number of bytes it occupied.
pub fn parse_http_request_with_limit(
    buf: &[u8],
    max_body: usize,
) -> Result<(Request, usize), ParseError> {
    // Look for header/body separator
    let headers_end = match find_headers_end(buf) {
        Some(end) => end,
        None if buf.len() > MAX_HEADER_BYTES => return Err(ParseError::HeadersTooLarge),
        None => return Err(ParseError::Incomplete),
    };
    if headers_end > MAX_HEADER_BYTES {
        return Err(ParseError::HeadersTooLarge);
    }

    let header_bytes = &buf[..headers_end];
    let body_bytes = &buf[headers_end + 4..];

    let headers_str = std::str::from_utf8(header_bytes).map_err(|_| ParseError::InvalidRequest)?;

    let mut lines = headers_str.split("\r\n");

    // Request line
    let request_line = lines.next().ok_or(ParseError::InvalidRequest)?;
    let mut parts = request_line.split_whitespace();

    let method_str = parts.next().ok_or(ParseError::InvalidRequest)?;
    let path = parts.next().ok_or(ParseError::InvalidRequest)?;
    let version = parts.next().ok_or(ParseError::InvalidRequest)?;

    let method = Method::from_str(method_str).ok_or(ParseError::InvalidMethod)?;

    // Headers
    let mut headers = HeaderMap::new();

    for line in lines {
        if line.is_empty() {
            continue;
        }

        let (key, value) = line.split_once(':').ok_or(ParseError::InvalidHeader)?;
        let key = key.trim();
        if key.is_empty() {
            return Err(ParseError::InvalidHeader);
        }

        headers.append(key, value.trim());
    }

    // Body
    let (body, body_consumed) = match headers.get("Transfer-Encoding") {
        Some(te) if te.trim().eq_ignore_ascii_case("chunked") => {
            decode_chunked(body_bytes, max_body)?
        }
        Some(_) => return Err(ParseError::UnsupportedTransferEncoding),
        None => {
            let content_length = headers
                .get("Content-Length")
                .map(|v| {
                    v.trim()
                        .parse::<usize>()
                        .map_err(|_| ParseError::InvalidContentLength)
                })
                .transpose()?
                .unwrap_or(0);

            if content_length > max_body {
                return Err(ParseError::BodyTooLarge);
            }
            if body_bytes.len() < content_length {
                return Err(ParseError::Incomplete);
            }

            (body_bytes[..content_length].to_vec(), content_length)
        }
    };

    let request = Request {
        method,
        path: path.to_string(),
        version: version.to_string(),
        headers,
        body: Bytes::from(body),
    };

    let total_consumed = headers_end + 4 + body_consumed;
    Ok((request, total_consumed))
}

fn find_headers_end(buf: &[u8]) -> Option<usize> {
    buf.windows(4).position(|w| w == b"\r\n\r\n")
}

/// Decodes a chunked body, returning the payload and the number of wire
/// bytes it occupied (trailers included).
fn decode_chunked(buf: &[u8], max_body: usize) -> Result<(Vec<u8>, usize), ParseError> {
    let mut body = Vec::new();
    let mut pos = 0;

    loop {
        let line_end = find_crlf(&buf[pos..]).ok_or(ParseError::Incomplete)?;
        let size_line =
            std::str::from_utf8(&buf[pos..pos + line_end]).map_err(|_| ParseError::InvalidChunk)?;
        // Chunk extensions after ';' are ignored.
        let size_str = size_line.split(';').next().unwrap_or("").trim();
        let size = usize::from_str_radix(size_str, 16).map_err(|_| ParseError::InvalidChunk)?;
        pos += line_end + 2;

        if size == 0 {
            // Skip optional trailers up to the terminating empty line.
            loop {
                let line_end = find_crlf(&buf[pos..]).ok_or(ParseError::Incomplete)?;
                pos += line_end + 2;
                if line_end == 0 {
                    return Ok((body, pos));
                }
            }
        }

        // `body` never exceeds `max_body`, so the subtraction holds.
        if size > max_body - body.len() {
            return Err(ParseError::BodyTooLarge);
        }
        let chunk_end = pos.checked_add(size).ok_or(ParseError::InvalidChunk)?;
        if buf.len() < chunk_end.saturating_add(2) {
            return Err(ParseError::Incomplete);
        }
        body.extend_from_slice(&buf[pos..chunk_end]);
        pos = chunk_end;

        if &buf[pos..pos + 2] != b"\r\n" {
            return Err(ParseError::InvalidChunk);
        }
        pos += 2;
    }
}

fn find_crlf(buf: &[u8]) -> Option<usize> {
    buf.windows(2).position(|w| w == b"\r\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_simple_get() {
        let req = b"GET / HTTP/1.1\r\nHost: example.com\r\n\r\n";

        let (parsed, consumed) = parse_http_request(req).unwrap();

        assert_eq!(parsed.path, "/");
        assert_eq!(parsed.headers.get("host").unwrap(), "example.com");
        assert_eq!(consumed, req.len());
    }

    #[test]
    fn chunked_body_with_extension_and_trailer() {
        let body = b"4;ext=1\r\nwiki\r\n0\r\nX-Trailer: yes\r\n\r\nrest";
        let (decoded, consumed) = decode_chunked(body, 1024).unwrap();

        assert_eq!(decoded, b"wiki");
        assert_eq!(&body[consumed..], b"rest");
    }

    #[test]
    fn huge_chunk_size_is_refused() {
        let body = b"4\r\nwiki\r\nfffffffffffffffc\r\nxx";

        assert_eq!(decode_chunked(body, 1024), Err(ParseError::BodyTooLarge));
        assert_eq!(
            decode_chunked(b"4\r\nwiki\r\nfffffffffffffffb\r\nxx", usize::MAX),
            Err(ParseError::InvalidChunk)
        );
    }
}
