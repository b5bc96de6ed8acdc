//! Best-effort metadata extraction for archiving and indexing.
//!
//! [`parse_metadata`] never fails. Fields that are missing or malformed come
//! back as `None` and the problem is reported as a [`ParseWarning`], so the
//! caller can log it and keep archiving.

use std::fmt;

use chrono::{DateTime, Utc};

use crate::address::parse_mailbox;
use crate::date::parse_date;
use crate::message::Message;

/// Header and body fields stored alongside an archived message.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MessageMetadata {
    /// Message-ID header, trimmed.
    pub message_id: Option<String>,
    /// Parsed Date header in UTC.
    pub date: Option<DateTime<Utc>>,
    /// Decoded From header.
    pub from_display: Option<String>,
    /// Lowercased address of the first From mailbox.
    pub from_email: Option<String>,
    /// Decoded To header.
    pub to_display: Option<String>,
    /// Decoded Subject header.
    pub subject: Option<String>,
    /// Extracted body text, empty when nothing was readable.
    pub body_text: String,
}

/// Non-fatal problem found while extracting metadata.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParseWarning {
    /// Header block was not valid UTF-8 and was decoded lossily.
    HeadersNotUtf8,
    /// A header the index relies on is absent or blank.
    MissingHeader(&'static str),
    /// Date header present but unparsable.
    InvalidDate(String),
    /// From header present but no address could be extracted.
    InvalidAddress(String),
    /// Text parts whose transfer encoding could not be decoded.
    UndecodableBody {
        /// Number of affected parts.
        parts: usize,
    },
}

impl fmt::Display for ParseWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::HeadersNotUtf8 => write!(f, "header block is not valid UTF-8"),
            Self::MissingHeader(name) => write!(f, "missing {name} header"),
            Self::InvalidDate(value) => write!(f, "unparsable Date header: {value}"),
            Self::InvalidAddress(value) => write!(f, "no address in From header: {value}"),
            Self::UndecodableBody { parts } => write!(f, "{parts} undecodable body part(s)"),
        }
    }
}

/// Result of metadata extraction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParsedMetadata {
    /// Every field was extracted cleanly.
    Complete(MessageMetadata),
    /// Some fields degraded to empty values.
    PartialWithWarnings(MessageMetadata, Vec<ParseWarning>),
}

impl ParsedMetadata {
    /// Returns the extracted metadata.
    #[must_use]
    pub const fn metadata(&self) -> &MessageMetadata {
        match self {
            Self::Complete(metadata) | Self::PartialWithWarnings(metadata, _) => metadata,
        }
    }

    /// Returns the warnings, empty for [`ParsedMetadata::Complete`].
    #[must_use]
    pub fn warnings(&self) -> &[ParseWarning] {
        match self {
            Self::Complete(_) => &[],
            Self::PartialWithWarnings(_, warnings) => warnings,
        }
    }

    /// Splits into metadata and warnings.
    #[must_use]
    pub fn into_parts(self) -> (MessageMetadata, Vec<ParseWarning>) {
        match self {
            Self::Complete(metadata) => (metadata, Vec::new()),
            Self::PartialWithWarnings(metadata, warnings) => (metadata, warnings),
        }
    }
}

/// Extracts index metadata from a raw message.
#[must_use]
pub fn parse_metadata(raw: &[u8]) -> ParsedMetadata {
    let message = Message::parse(raw);
    let headers = message.headers();
    let mut warnings = Vec::new();

    if !message.headers_are_utf8() {
        warnings.push(ParseWarning::HeadersNotUtf8);
    }

    let message_id = headers
        .get("message-id")
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string);
    if message_id.is_none() {
        warnings.push(ParseWarning::MissingHeader("Message-ID"));
    }

    let date = match headers.get("date").map(str::trim).filter(|v| !v.is_empty()) {
        Some(value) => {
            let parsed = parse_date(value);
            if parsed.is_none() {
                warnings.push(ParseWarning::InvalidDate(value.to_string()));
            }
            parsed
        }
        None => {
            warnings.push(ParseWarning::MissingHeader("Date"));
            None
        }
    };

    let from_display = headers.get_decoded("from");
    let from_email = match headers.get("from").map(str::trim).filter(|v| !v.is_empty()) {
        Some(value) => {
            let email = parse_mailbox(value).map(|mailbox| mailbox.email);
            if email.is_none() {
                warnings.push(ParseWarning::InvalidAddress(value.to_string()));
            }
            email
        }
        None => {
            warnings.push(ParseWarning::MissingHeader("From"));
            None
        }
    };

    let subject = headers.get_decoded("subject");
    if subject.is_none() {
        warnings.push(ParseWarning::MissingHeader("Subject"));
    }

    let body = message.body_text();
    if body.undecodable_parts > 0 {
        warnings.push(ParseWarning::UndecodableBody {
            parts: body.undecodable_parts,
        });
    }

    let metadata = MessageMetadata {
        message_id,
        date,
        from_display,
        from_email,
        to_display: headers.get_decoded("to"),
        subject,
        body_text: body.text,
    };

    if warnings.is_empty() {
        ParsedMetadata::Complete(metadata)
    } else {
        ParsedMetadata::PartialWithWarnings(metadata, warnings)
    }
}
