//! MIME message structure and handling.

use crate::content_type::ContentType;
use crate::encoding::{decode_base64, decode_charset, decode_quoted_printable};
use crate::error::Result;
use crate::header::Headers;

/// Maximum multipart nesting depth that is expanded into child parts.
const MAX_DEPTH: usize = 16;

/// Transfer encoding types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferEncoding {
    /// 7-bit ASCII.
    SevenBit,
    /// 8-bit binary.
    EightBit,
    /// Base64 encoding.
    Base64,
    /// Quoted-Printable encoding.
    QuotedPrintable,
    /// Binary (no encoding).
    Binary,
}

impl TransferEncoding {
    /// Parses transfer encoding from string.
    #[must_use]
    pub fn parse(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "8bit" => Self::EightBit,
            "base64" => Self::Base64,
            "quoted-printable" => Self::QuotedPrintable,
            "binary" => Self::Binary,
            _ => Self::SevenBit, // Default (includes "7bit")
        }
    }
}

/// MIME entity: headers, raw body and, for multiparts, its children.
#[derive(Debug, Clone, Default)]
pub struct Part {
    /// Part headers.
    pub headers: Headers,
    /// Part body (raw bytes, still transfer-encoded).
    pub body: Vec<u8>,
    /// Child parts when this is a multipart entity with a usable boundary.
    pub parts: Vec<Part>,
}

impl Part {
    /// Parses a MIME entity from raw bytes.
    #[must_use]
    pub fn parse(raw: &[u8]) -> Self {
        Self::parse_at_depth(raw, 0)
    }

    fn parse_at_depth(raw: &[u8], depth: usize) -> Self {
        let (header_bytes, body) = split_header_body(raw);
        let headers = Headers::parse(&String::from_utf8_lossy(header_bytes));

        let mut part = Self {
            headers,
            body: body.to_vec(),
            parts: Vec::new(),
        };

        if depth < MAX_DEPTH {
            let content_type = part.content_type();
            if let (true, Some(boundary)) = (content_type.is_multipart(), content_type.boundary())
            {
                part.parts = split_multipart(body, boundary)
                    .into_iter()
                    .map(|child| Self::parse_at_depth(child, depth + 1))
                    .collect();
            }
        }

        part
    }

    /// Gets the content type, falling back to `text/plain` when absent or invalid.
    #[must_use]
    pub fn content_type(&self) -> ContentType {
        self.headers
            .get("content-type")
            .and_then(|v| ContentType::parse(v).ok())
            .unwrap_or_else(ContentType::text_plain)
    }

    /// Gets the transfer encoding.
    #[must_use]
    pub fn transfer_encoding(&self) -> TransferEncoding {
        self.headers
            .get("content-transfer-encoding")
            .map_or(TransferEncoding::SevenBit, TransferEncoding::parse)
    }

    /// Returns true if the part is marked as an attachment.
    #[must_use]
    pub fn is_attachment(&self) -> bool {
        self.headers
            .get("content-disposition")
            .is_some_and(|d| d.trim().to_lowercase().starts_with("attachment"))
    }

    /// Decodes the body according to the transfer encoding.
    ///
    /// # Errors
    ///
    /// Returns an error if a Base64 body is not valid Base64.
    pub fn decode_body(&self) -> Result<Vec<u8>> {
        match self.transfer_encoding() {
            TransferEncoding::Base64 => decode_base64(&String::from_utf8_lossy(&self.body)),
            TransferEncoding::QuotedPrintable => Ok(decode_quoted_printable(&self.body)),
            _ => Ok(self.body.clone()),
        }
    }

    /// Gets the decoded body as text in its declared charset.
    ///
    /// # Errors
    ///
    /// Returns an error if transfer decoding fails.
    pub fn decoded_text(&self) -> Result<String> {
        let decoded = self.decode_body()?;
        Ok(decode_charset(&decoded, self.content_type().charset()))
    }
}

/// Text extracted from a message body.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BodyText {
    /// Concatenated text content.
    pub text: String,
    /// Number of text parts whose content could not be decoded.
    pub undecodable_parts: usize,
}

/// Parsed email message.
#[derive(Debug, Clone, Default)]
pub struct Message {
    root: Part,
    headers_utf8: bool,
}

impl Message {
    /// Parses a raw RFC 5322 message. Never fails; malformed input yields
    /// fewer headers or parts.
    #[must_use]
    pub fn parse(raw: &[u8]) -> Self {
        let (header_bytes, _) = split_header_body(raw);
        Self {
            root: Part::parse(raw),
            headers_utf8: std::str::from_utf8(header_bytes).is_ok(),
        }
    }

    /// Returns the top-level headers.
    #[must_use]
    pub const fn headers(&self) -> &Headers {
        &self.root.headers
    }

    /// Returns the top-level MIME entity.
    #[must_use]
    pub const fn root(&self) -> &Part {
        &self.root
    }

    /// Returns false if the header block had to be decoded lossily.
    #[must_use]
    pub const fn headers_are_utf8(&self) -> bool {
        self.headers_utf8
    }

    /// Gets the raw From header.
    #[must_use]
    pub fn from(&self) -> Option<&str> {
        self.headers().get("from")
    }

    /// Gets the raw To header.
    #[must_use]
    pub fn to(&self) -> Option<&str> {
        self.headers().get("to")
    }

    /// Gets the raw Subject header.
    #[must_use]
    pub fn subject(&self) -> Option<&str> {
        self.headers().get("subject")
    }

    /// Gets the raw Date header.
    #[must_use]
    pub fn date(&self) -> Option<&str> {
        self.headers().get("date")
    }

    /// Gets the raw Message-ID header.
    #[must_use]
    pub fn message_id(&self) -> Option<&str> {
        self.headers().get("message-id")
    }

    /// Extracts the readable body text.
    ///
    /// All non-attachment `text/plain` parts are joined with newlines. When
    /// there are none, `text/html` parts are converted to text instead.
    #[must_use]
    pub fn body_text(&self) -> BodyText {
        let mut plain = Vec::new();
        let mut html = Vec::new();
        let mut undecodable_parts = 0;
        collect_text(&self.root, &mut plain, &mut html, &mut undecodable_parts);

        let text = if !plain.is_empty() {
            plain
                .iter()
                .map(|p| p.trim())
                .filter(|p| !p.is_empty())
                .collect::<Vec<_>>()
                .join("\n")
        } else if !html.is_empty() {
            html_to_text(&html.join("\n"))
        } else {
            String::new()
        };

        BodyText {
            text,
            undecodable_parts,
        }
    }
}

fn collect_text(
    part: &Part,
    plain: &mut Vec<String>,
    html: &mut Vec<String>,
    undecodable_parts: &mut usize,
) {
    if !part.parts.is_empty() {
        for child in &part.parts {
            collect_text(child, plain, html, undecodable_parts);
        }
        return;
    }

    if part.is_attachment() {
        return;
    }

    let content_type = part.content_type();
    let target = if content_type.is("text", "plain") {
        plain
    } else if content_type.is("text", "html") {
        html
    } else {
        return;
    };

    match part.decoded_text() {
        Ok(text) => target.push(text),
        Err(_) => *undecodable_parts += 1,
    }
}

fn html_to_text(html: &str) -> String {
    htmd::convert(html)
        .map(|text| text.trim().to_string())
        .unwrap_or_else(|_| strip_tags(html))
}

/// Crude tag removal used when the HTML converter gives up.
fn strip_tags(html: &str) -> String {
    let mut out = String::with_capacity(html.len());
    let mut in_tag = false;
    for ch in html.chars() {
        match ch {
            '<' => in_tag = true,
            '>' if in_tag => {
                in_tag = false;
                out.push(' ');
            }
            _ if !in_tag => out.push(ch),
            _ => {}
        }
    }
    out.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Splits an entity at the first empty line.
fn split_header_body(raw: &[u8]) -> (&[u8], &[u8]) {
    let mut line_start = 0;
    while line_start < raw.len() {
        let line_end = next_line_end(raw, line_start);
        let line = &raw[line_start..line_end];
        if line == b"\n" || line == b"\r\n" {
            return (&raw[..line_start], &raw[line_end..]);
        }
        line_start = line_end;
    }
    (raw, &[])
}

/// Splits a multipart body into its parts.
///
/// The preamble and epilogue are discarded. A missing close delimiter keeps
/// whatever followed the last delimiter as the final part.
fn split_multipart<'a>(body: &'a [u8], boundary: &str) -> Vec<&'a [u8]> {
    let delimiter = format!("--{boundary}");
    let delimiter = delimiter.as_bytes();
    let mut parts = Vec::new();
    let mut current_start: Option<usize> = None;
    let mut line_start = 0;

    while line_start < body.len() {
        let line_end = next_line_end(body, line_start);
        let line = trim_line_ending(&body[line_start..line_end]);

        if let Some(rest) = line.strip_prefix(delimiter) {
            let is_close = rest.starts_with(b"--");
            if is_close || rest.iter().all(u8::is_ascii_whitespace) {
                if let Some(start) = current_start.take() {
                    parts.push(trim_line_ending(&body[start..line_start]));
                }
                if is_close {
                    return parts;
                }
                current_start = Some(line_end);
            }
        }

        line_start = line_end;
    }

    if let Some(start) = current_start
        && start < body.len()
    {
        parts.push(&body[start..]);
    }

    parts
}

fn next_line_end(buf: &[u8], start: usize) -> usize {
    buf[start..]
        .iter()
        .position(|&b| b == b'\n')
        .map_or(buf.len(), |p| start + p + 1)
}

fn trim_line_ending(line: &[u8]) -> &[u8] {
    let line = line.strip_suffix(b"\n").unwrap_or(line);
    line.strip_suffix(b"\r").unwrap_or(line)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_transfer_encoding_parse() {
        assert_eq!(TransferEncoding::parse("7bit"), TransferEncoding::SevenBit);
        assert_eq!(TransferEncoding::parse(" Base64 "), TransferEncoding::Base64);
        assert_eq!(
            TransferEncoding::parse("quoted-printable"),
            TransferEncoding::QuotedPrintable
        );
    }

    #[test]
    fn test_single_part_message() {
        let raw = b"From: sender@example.com\r\nSubject: Test\r\n\r\nHello, World!\r\n";
        let message = Message::parse(raw);

        assert_eq!(message.from(), Some("sender@example.com"));
        assert_eq!(message.subject(), Some("Test"));
        assert_eq!(message.body_text().text, "Hello, World!");
        assert!(message.headers_are_utf8());
    }

    #[test]
    fn test_lf_only_line_endings() {
        let raw = b"Subject: Unix\n\nbody line\n";
        let message = Message::parse(raw);
        assert_eq!(message.subject(), Some("Unix"));
        assert_eq!(message.body_text().text, "body line");
    }

    #[test]
    fn test_headers_only_message() {
        let message = Message::parse(b"Subject: nothing else");
        assert_eq!(message.subject(), Some("nothing else"));
        assert_eq!(message.body_text().text, "");
    }

    #[test]
    fn test_multipart_alternative_prefers_plain() {
        let raw = concat!(
            "Content-Type: multipart/alternative; boundary=\"b1\"\r\n",
            "\r\n",
            "preamble\r\n",
            "--b1\r\n",
            "Content-Type: text/plain; charset=utf-8\r\n",
            "\r\n",
            "Plain version\r\n",
            "--b1\r\n",
            "Content-Type: text/html\r\n",
            "\r\n",
            "<p>HTML version</p>\r\n",
            "--b1--\r\n",
            "epilogue\r\n"
        );
        let message = Message::parse(raw.as_bytes());
        assert_eq!(message.root().parts.len(), 2);
        assert_eq!(message.body_text().text, "Plain version");
    }

    #[test]
    fn test_nested_multipart_with_attachment() {
        let raw = concat!(
            "Content-Type: multipart/mixed; boundary=outer\r\n",
            "\r\n",
            "--outer\r\n",
            "Content-Type: multipart/alternative; boundary=inner\r\n",
            "\r\n",
            "--inner\r\n",
            "Content-Type: text/plain; charset=iso-8859-1\r\n",
            "Content-Transfer-Encoding: quoted-printable\r\n",
            "\r\n",
            "Caf=E9 menu\r\n",
            "--inner--\r\n",
            "--outer\r\n",
            "Content-Type: text/plain\r\n",
            "Content-Disposition: attachment; filename=notes.txt\r\n",
            "\r\n",
            "attached notes\r\n",
            "--outer--\r\n"
        );
        let message = Message::parse(raw.as_bytes());
        let body = message.body_text();
        assert_eq!(body.text, "Café menu");
        assert_eq!(body.undecodable_parts, 0);
    }

    #[test]
    fn test_html_only_is_converted() {
        let raw = b"Content-Type: text/html\r\n\r\n<html><body><p>Quarterly <b>report</b></p></body></html>";
        let text = Message::parse(raw).body_text().text;
        assert!(text.contains("Quarterly"));
        assert!(text.contains("report"));
        assert!(!text.contains("<p>"));
    }

    #[test]
    fn test_base64_body_and_bad_base64() {
        let good = b"Content-Transfer-Encoding: base64\r\n\r\nSGVsbG8sIFdvcmxkIQ==\r\n";
        assert_eq!(Message::parse(good).body_text().text, "Hello, World!");

        let bad = b"Content-Transfer-Encoding: base64\r\n\r\n%%%%\r\n";
        let body = Message::parse(bad).body_text();
        assert_eq!(body.text, "");
        assert_eq!(body.undecodable_parts, 1);
    }

    #[test]
    fn test_unterminated_multipart_keeps_last_part() {
        let raw = b"Content-Type: multipart/mixed; boundary=x\r\n\r\n--x\r\n\r\nfirst\r\n--x\r\n\r\nsecond";
        let message = Message::parse(raw);
        assert_eq!(message.root().parts.len(), 2);
        assert_eq!(message.body_text().text, "first\nsecond");
    }

    #[test]
    fn test_multipart_without_boundary_is_not_split() {
        let raw = b"Content-Type: multipart/mixed\r\n\r\nno boundary here";
        let message = Message::parse(raw);
        assert!(message.root().parts.is_empty());
        assert_eq!(message.body_text().text, "");
    }

    #[test]
    fn test_non_utf8_headers_detected() {
        let raw = b"Subject: caf\xe9\r\n\r\nbody";
        let message = Message::parse(raw);
        assert!(!message.headers_are_utf8());
        assert!(message.subject().is_some());
    }

    #[test]
    fn test_strip_tags_fallback() {
        assert_eq!(strip_tags("<p>a</p><p>b  c</p>"), "a b c");
    }
}
