//! IMAP command construction.
//!
//! Only the commands a read-only archiver needs: LOGIN, EXAMINE,
//! UID SEARCH, UID FETCH and LOGOUT.

use base64::Engine;
use base64::alphabet::IMAP_MUTF7;
use base64::engine::general_purpose::{GeneralPurpose, NO_PAD};
use bytes::{BufMut, Bytes, BytesMut};

/// Modified base64 used inside `&...-` runs of mailbox names (RFC 3501 §5.1.3).
const MUTF7: GeneralPurpose = GeneralPurpose::new(&IMAP_MUTF7, NO_PAD);

/// IMAP commands sent by the client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// LOGIN with plaintext credentials.
    Login {
        /// Username.
        username: String,
        /// Password.
        password: String,
    },
    /// EXAMINE (read-only SELECT).
    Examine {
        /// Mailbox name in UTF-8.
        mailbox: String,
    },
    /// `UID SEARCH UID <from>:*`.
    UidSearchFrom {
        /// First UID of the range.
        from: u32,
    },
    /// `UID FETCH <uid> (UID BODY.PEEK[])`.
    UidFetchBody {
        /// Message UID.
        uid: u32,
    },
    /// LOGOUT.
    Logout,
}

impl Command {
    /// Serializes the command with the given tag, CRLF included.
    ///
    /// The command is split after each synchronizing literal announcement:
    /// every part but the last ends in `{n}\r\n`, and the next part may only
    /// be sent once the server answers with a `+` continuation.
    #[must_use]
    pub fn serialize(&self, tag: &str) -> Vec<Bytes> {
        let mut parts = Vec::new();
        let mut buf = BytesMut::with_capacity(64);
        buf.put_slice(tag.as_bytes());
        buf.put_u8(b' ');

        match self {
            Self::Login { username, password } => {
                buf.put_slice(b"LOGIN ");
                write_astring(&mut parts, &mut buf, username);
                buf.put_u8(b' ');
                write_astring(&mut parts, &mut buf, password);
            }
            Self::Examine { mailbox } => {
                buf.put_slice(b"EXAMINE ");
                write_astring(&mut parts, &mut buf, &encode_mailbox(mailbox));
            }
            Self::UidSearchFrom { from } => {
                buf.put_slice(format!("UID SEARCH UID {from}:*").as_bytes());
            }
            Self::UidFetchBody { uid } => {
                buf.put_slice(format!("UID FETCH {uid} (UID BODY.PEEK[])").as_bytes());
            }
            Self::Logout => buf.put_slice(b"LOGOUT"),
        }

        buf.put_slice(b"\r\n");
        parts.push(buf.freeze());
        parts
    }

    /// Returns a loggable form with credentials redacted.
    #[must_use]
    pub fn redacted(&self) -> String {
        match self {
            Self::Login { username, .. } => format!("LOGIN {username} <redacted>"),
            Self::Examine { mailbox } => format!("EXAMINE {mailbox}"),
            Self::UidSearchFrom { from } => format!("UID SEARCH UID {from}:*"),
            Self::UidFetchBody { uid } => format!("UID FETCH {uid}"),
            Self::Logout => "LOGOUT".to_string(),
        }
    }
}

/// Generates sequential command tags ("A0000", "A0001", ...).
#[derive(Debug, Clone)]
pub struct TagGenerator {
    counter: u32,
    prefix: char,
}

impl TagGenerator {
    /// Creates a new tag generator with the given prefix.
    #[must_use]
    pub const fn new(prefix: char) -> Self {
        Self { counter: 0, prefix }
    }

    /// Generates the next tag. The counter wraps rather than panicking.
    pub fn next_tag(&mut self) -> String {
        let n = self.counter;
        self.counter = self.counter.wrapping_add(1);
        format!("{}{n:04}", self.prefix)
    }
}

impl Default for TagGenerator {
    fn default() -> Self {
        Self::new('A')
    }
}

/// Writes an astring: a bare atom when safe, a quoted string when only
/// specials are involved, and a literal for 8-bit text or line breaks.
fn write_astring(parts: &mut Vec<Bytes>, buf: &mut BytesMut, s: &str) {
    if s.bytes().any(|b| b >= 0x80 || b == b'\r' || b == b'\n') {
        buf.put_slice(format!("{{{}}}\r\n", s.len()).as_bytes());
        parts.push(buf.split().freeze());
        buf.put_slice(s.as_bytes());
    } else if s.is_empty() || s.bytes().any(needs_quoting) {
        buf.put_u8(b'"');
        for b in s.bytes() {
            if b == b'"' || b == b'\\' {
                buf.put_u8(b'\\');
            }
            buf.put_u8(b);
        }
        buf.put_u8(b'"');
    } else {
        buf.put_slice(s.as_bytes());
    }
}

const fn needs_quoting(b: u8) -> bool {
    matches!(
        b,
        b' ' | b'"' | b'\\' | b'(' | b')' | b'{' | b'%' | b'*' | b']'
    ) || b < 0x20
        || b == 0x7F
}

/// Encodes a UTF-8 mailbox name as modified UTF-7.
///
/// Printable ASCII passes through, `&` becomes `&-`, and every other run is
/// UTF-16BE in modified base64 between `&` and `-`.
#[must_use]
pub fn encode_mailbox(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut pending: Vec<u16> = Vec::new();

    let flush = |pending: &mut Vec<u16>, out: &mut String| {
        if pending.is_empty() {
            return;
        }
        let bytes: Vec<u8> = pending.iter().flat_map(|u| u.to_be_bytes()).collect();
        out.push('&');
        out.push_str(&MUTF7.encode(bytes));
        out.push('-');
        pending.clear();
    };

    for ch in name.chars() {
        if matches!(ch, '\u{20}'..='\u{7e}') {
            flush(&mut pending, &mut out);
            if ch == '&' {
                out.push_str("&-");
            } else {
                out.push(ch);
            }
        } else {
            let mut units = [0u16; 2];
            pending.extend_from_slice(ch.encode_utf16(&mut units));
        }
    }
    flush(&mut pending, &mut out);

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tag_generation() {
        let mut tags = TagGenerator::default();
        assert_eq!(tags.next_tag(), "A0000");
        assert_eq!(tags.next_tag(), "A0001");

        let mut custom = TagGenerator::new('T');
        assert_eq!(custom.next_tag(), "T0000");
    }

    #[test]
    fn test_login_quotes_credentials() {
        let cmd = Command::Login {
            username: "user@example.com".into(),
            password: "p\"ss word".into(),
        };
        assert_eq!(
            cmd.serialize("A0001"),
            vec![Bytes::from_static(
                b"A0001 LOGIN user@example.com \"p\\\"ss word\"\r\n"
            )]
        );
        assert!(!cmd.redacted().contains("ss word"));
    }

    #[test]
    fn test_login_sends_non_ascii_as_literal() {
        let cmd = Command::Login {
            username: "jürgen".into(),
            password: "pässword".into(),
        };
        let parts = cmd.serialize("A0001");
        assert_eq!(parts.len(), 3);
        assert_eq!(&parts[0][..], b"A0001 LOGIN {7}\r\n");
        assert_eq!(&parts[1][..], "jürgen {9}\r\n".as_bytes());
        assert_eq!(&parts[2][..], "pässword\r\n".as_bytes());
    }

    #[test]
    fn test_examine_and_uid_commands() {
        let examine = Command::Examine {
            mailbox: "Sent Items".into(),
        };
        assert_eq!(
            examine.serialize("A1").concat(),
            b"A1 EXAMINE \"Sent Items\"\r\n"
        );

        let search = Command::UidSearchFrom { from: 51 };
        assert_eq!(
            search.serialize("A2").concat(),
            b"A2 UID SEARCH UID 51:*\r\n"
        );

        let fetch = Command::UidFetchBody { uid: 7 };
        assert_eq!(
            fetch.serialize("A3").concat(),
            b"A3 UID FETCH 7 (UID BODY.PEEK[])\r\n"
        );

        let nonlatin = Command::Examine {
            mailbox: "Entwürfe".into(),
        };
        assert_eq!(nonlatin.serialize("A4").len(), 1);
    }

    #[test]
    fn test_encode_mailbox() {
        assert_eq!(encode_mailbox("INBOX"), "INBOX");
        assert_eq!(encode_mailbox("Tom & Jerry"), "Tom &- Jerry");
        assert_eq!(encode_mailbox("Entwürfe"), "Entw&APw-rfe");
        assert_eq!(encode_mailbox("日本語"), "&ZeVnLIqe-");
    }
}
