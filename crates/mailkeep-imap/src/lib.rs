//! # mailkeep-imap
//!
//! A small, read-only IMAP4rev1 client for mail archiving.
//!
//! ## Features
//!
//! - **Type-state connection**: `NotAuthenticated` → `Authenticated`
//! - **Read-only access**: EXAMINE and `BODY.PEEK[]`, so archiving never
//!   changes flags on the server
//! - **Incremental listing**: `UID SEARCH` above a known UID
//! - **TLS via rustls**: no OpenSSL dependency
//! - **Timeouts**: every command round trip is bounded
//!
//! ## Quick Start
//!
//! ```ignore
//! use mailkeep_imap::{Client, Config, connect};
//!
//! #[tokio::main]
//! async fn main() -> mailkeep_imap::Result<()> {
//!     let config = Config::new("imap.example.com");
//!     let stream = connect(&config).await?;
//!     let client = Client::from_stream(stream).await?;
//!     let mut client = client.login("user@example.com", "password").await?;
//!
//!     let status = client.examine("INBOX").await?;
//!     println!("UIDVALIDITY {:?}", status.uid_validity);
//!
//!     for uid in client.uid_search_since(0).await? {
//!         if let Some(raw) = client.uid_fetch_raw(uid).await? {
//!             println!("{uid}: {} bytes", raw.len());
//!         }
//!     }
//!
//!     client.logout().await
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

pub mod command;
pub mod connection;
mod error;
pub mod response;

pub use command::{Command, TagGenerator, encode_mailbox};
pub use connection::{
    Authenticated, Client, Config, FramedStream, ImapStream, MailboxStatus, NotAuthenticated,
    ResponseLine, Security, connect,
};
pub use error::{Error, Result};
pub use response::{Response, Status};
