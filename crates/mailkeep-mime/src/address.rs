//! Mailbox (address) extraction from header values.

use crate::encoding::decode_rfc2047;

/// A single mailbox: optional display name plus address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mailbox {
    /// Display name, RFC 2047 decoded, without surrounding quotes.
    pub name: Option<String>,
    /// Address in lowercase.
    pub email: String,
}

/// Extracts the first mailbox from an address header value.
///
/// Accepts `Name <user@host>`, `"Quoted, Name" <user@host>`,
/// `user@host (Comment Name)` and bare `user@host`. Returns `None` when no
/// plausible address is present.
#[must_use]
pub fn parse_mailbox(value: &str) -> Option<Mailbox> {
    if let Some(open) = value.find('<') {
        let close = value[open..].find('>')? + open;
        let email = normalize_email(&value[open + 1..close])?;
        return Some(Mailbox {
            name: clean_name(&value[..open]),
            email,
        });
    }

    let first = value.split(',').map(str::trim).find(|s| !s.is_empty())?;
    let (addr, name) = match (first.find('('), first.rfind(')')) {
        (Some(open), Some(close)) if open < close => {
            (&first[..open], clean_name(&first[open + 1..close]))
        }
        _ => (first, None),
    };

    Some(Mailbox {
        name,
        email: normalize_email(addr)?,
    })
}

fn clean_name(raw: &str) -> Option<String> {
    let trimmed = raw.trim().trim_matches('"').trim();
    let decoded = decode_rfc2047(trimmed);
    let decoded = decoded.trim();
    (!decoded.is_empty()).then(|| decoded.to_string())
}

fn normalize_email(raw: &str) -> Option<String> {
    let email = raw.trim();
    let (local, domain) = email.split_once('@')?;
    if local.is_empty() || domain.is_empty() || email.contains(char::is_whitespace) {
        return None;
    }
    Some(email.to_lowercase())
}
