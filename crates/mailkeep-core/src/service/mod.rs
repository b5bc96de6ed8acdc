//! Adapters that connect the sync engine to real mail servers.

pub mod imap;

pub use imap::{ImapAccount, ImapConnector, ImapSession};
