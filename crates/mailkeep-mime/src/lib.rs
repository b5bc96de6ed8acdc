//! # mailkeep-mime
//!
//! Lenient MIME message parsing for the mailkeep archiver.
//!
//! ## Features
//!
//! - **Message parsing**: RFC 5322 headers and nested multipart bodies
//! - **Decoding**: Base64, Quoted-Printable, RFC 2047 encoded words, legacy charsets
//! - **Text extraction**: plain-text parts first, HTML converted to text otherwise
//! - **Metadata extraction**: a parse that never fails, reporting what it
//!   could not understand as warnings
//!
//! Archived messages come from arbitrary senders and are frequently malformed,
//! so nothing in this crate rejects a message outright. Parsing degrades to
//! empty values instead.
//!
//! ## Quick Start
//!
//! ```ignore
//! use mailkeep_mime::{ParsedMetadata, parse_metadata};
//!
//! let raw = b"From: Alice <alice@example.com>\r\n\
//!             Subject: =?utf-8?Q?Caf=C3=A9?=\r\n\
//!             \r\n\
//!             Hello!";
//!
//! match parse_metadata(raw) {
//!     ParsedMetadata::Complete(meta) => println!("{:?}", meta.subject),
//!     ParsedMetadata::PartialWithWarnings(meta, warnings) => {
//!         println!("{:?} ({} warnings)", meta.subject, warnings.len());
//!     }
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

mod address;
mod content_type;
mod date;
mod error;
mod header;
mod message;
mod metadata;

pub mod encoding;

pub use address::{Mailbox, parse_mailbox};
pub use content_type::ContentType;
pub use date::parse_date;
pub use error::{Error, Result};
pub use header::Headers;
pub use message::{BodyText, Message, Part, TransferEncoding};
pub use metadata::{MessageMetadata, ParseWarning, ParsedMetadata, parse_metadata};
