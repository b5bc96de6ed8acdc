//! Transport, framing and the type-state client.

mod client;
mod config;
mod framed;
mod stream;

pub use client::{Authenticated, Client, MailboxStatus, NotAuthenticated};
pub use config::{Config, Security};
pub use framed::{FramedStream, ResponseLine};
pub use stream::{ImapStream, connect};
