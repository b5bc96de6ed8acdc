//! Response interpretation for the commands this client sends.
//!
//! Parsing is deliberately narrow: only the untagged data EXAMINE, UID SEARCH
//! and UID FETCH produce is understood. Anything else becomes
//! [`Response::Other`] and is ignored by the client.

use crate::connection::ResponseLine;

/// Completion status of a tagged response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    /// Command succeeded.
    Ok,
    /// Command failed.
    No,
    /// Command was rejected as invalid.
    Bad,
}

/// A classified server response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Response {
    /// Command completion.
    Tagged {
        /// Command tag.
        tag: String,
        /// Completion status.
        status: Status,
        /// Human-readable text (response code included).
        text: String,
    },
    /// `* OK` or `* PREAUTH`, optionally carrying a response code.
    Ok {
        /// Text following the status.
        text: String,
    },
    /// `* BYE`.
    Bye(String),
    /// `* n EXISTS`.
    Exists(u32),
    /// `* SEARCH ...`.
    Search(Vec<u32>),
    /// `* n FETCH (...)`.
    Fetch {
        /// UID item, if present.
        uid: Option<u32>,
        /// `BODY[]` contents, `None` for NIL or absent.
        body: Option<Vec<u8>>,
    },
    /// Anything else.
    Other,
}

impl Response {
    /// Classifies a framed response line.
    #[must_use]
    pub fn parse(line: &ResponseLine) -> Self {
        let text = line.text.as_str();

        if let Some(rest) = text.strip_prefix("* ") {
            return parse_untagged(rest, &line.literals);
        }

        if let Some(tag) = line.tag() {
            let rest = text[tag.len()..].trim_start();
            let (word, tail) = rest.split_once(' ').unwrap_or((rest, ""));
            let status = match word.to_ascii_uppercase().as_str() {
                "OK" => Status::Ok,
                "NO" => Status::No,
                "BAD" => Status::Bad,
                _ => return Self::Other,
            };
            return Self::Tagged {
                tag: tag.to_string(),
                status,
                text: tail.to_string(),
            };
        }

        Self::Other
    }
}

fn parse_untagged(rest: &str, literals: &[Vec<u8>]) -> Response {
    let (first, tail) = rest.split_once(' ').unwrap_or((rest, ""));

    match first.to_ascii_uppercase().as_str() {
        "OK" | "PREAUTH" => {
            return Response::Ok {
                text: tail.to_string(),
            };
        }
        "BYE" => return Response::Bye(tail.to_string()),
        "SEARCH" => {
            return Response::Search(
                tail.split_ascii_whitespace()
                    .filter_map(|n| n.parse().ok())
                    .collect(),
            );
        }
        _ => {}
    }

    let Ok(number) = first.parse::<u32>() else {
        return Response::Other;
    };
    let (kind, data) = tail.split_once(' ').unwrap_or((tail, ""));

    match kind.to_ascii_uppercase().as_str() {
        "EXISTS" => Response::Exists(number),
        "FETCH" => parse_fetch(data, literals),
        _ => Response::Other,
    }
}

/// Extracts UID and `BODY[]` from a FETCH data list.
fn parse_fetch(data: &str, literals: &[Vec<u8>]) -> Response {
    let inner = data
        .trim()
        .trim_start_matches('(')
        .trim_end_matches(')');
    let tokens: Vec<&str> = inner.split_ascii_whitespace().collect();

    let uid = tokens
        .windows(2)
        .find(|pair| pair[0].eq_ignore_ascii_case("UID"))
        .and_then(|pair| pair[1].trim_end_matches(')').parse().ok());

    let body = tokens
        .iter()
        .position(|t| t.eq_ignore_ascii_case("BODY[]") || t.eq_ignore_ascii_case("RFC822"))
        .and_then(|i| tokens.get(i + 1))
        .and_then(|value| body_value(value, literals, inner));

    Response::Fetch { uid, body }
}

fn body_value(value: &str, literals: &[Vec<u8>], inner: &str) -> Option<Vec<u8>> {
    if value.eq_ignore_ascii_case("NIL") {
        return None;
    }
    if value.starts_with('{') {
        // BODY[] is the only literal we request, so it is the first one.
        return literals.first().cloned();
    }
    if value.starts_with('"') {
        let start = inner.find(value)? + 1;
        let end = inner[start..].find('"')? + start;
        return Some(inner[start..end].as_bytes().to_vec());
    }
    None
}

/// Extracts a numeric response code value, e.g. `[UIDVALIDITY 3857529045]`.
#[must_use]
pub fn response_code_value(text: &str, code: &str) -> Option<u32> {
    let inner = text.trim_start().strip_prefix('[')?;
    let end = inner.find(']')?;
    let (name, value) = inner[..end].split_once(' ')?;
    name.eq_ignore_ascii_case(code)
        .then(|| value.trim().parse().ok())
        .flatten()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn line(text: &str) -> ResponseLine {
        ResponseLine {
            text: text.to_string(),
            literals: Vec::new(),
        }
    }

    #[test]
    fn test_tagged() {
        assert_eq!(
            Response::parse(&line("A0003 NO [NONEXISTENT] Unknown mailbox")),
            Response::Tagged {
                tag: "A0003".into(),
                status: Status::No,
                text: "[NONEXISTENT] Unknown mailbox".into(),
            }
        );
        assert!(matches!(
            Response::parse(&line("a1 ok done")),
            Response::Tagged {
                status: Status::Ok,
                ..
            }
        ));
    }

    #[test]
    fn test_exists_and_search() {
        assert_eq!(Response::parse(&line("* 23 EXISTS")), Response::Exists(23));
        assert_eq!(
            Response::parse(&line("* SEARCH 4 5 12")),
            Response::Search(vec![4, 5, 12])
        );
        assert_eq!(Response::parse(&line("* SEARCH")), Response::Search(vec![]));
    }

    #[test]
    fn test_ok_with_code() {
        let Response::Ok { text } = Response::parse(&line("* OK [UIDVALIDITY 42] UIDs valid"))
        else {
            panic!("expected untagged OK");
        };
        assert_eq!(response_code_value(&text, "UIDVALIDITY"), Some(42));
        assert_eq!(response_code_value(&text, "UIDNEXT"), None);
        assert_eq!(response_code_value("no code here", "UIDNEXT"), None);
    }

    #[test]
    fn test_fetch_with_literal() {
        let response = ResponseLine {
            text: "* 2 FETCH (UID 17 BODY[] {5})".into(),
            literals: vec![b"hello".to_vec()],
        };
        assert_eq!(
            Response::parse(&response),
            Response::Fetch {
                uid: Some(17),
                body: Some(b"hello".to_vec()),
            }
        );
    }

    #[test]
    fn test_fetch_uid_after_body() {
        let response = ResponseLine {
            text: "* 2 FETCH (BODY[] {3} UID 9)".into(),
            literals: vec![b"abc".to_vec()],
        };
        assert_eq!(
            Response::parse(&response),
            Response::Fetch {
                uid: Some(9),
                body: Some(b"abc".to_vec()),
            }
        );
    }

    #[test]
    fn test_fetch_nil_and_flags_only() {
        assert_eq!(
            Response::parse(&line("* 2 FETCH (UID 9 BODY[] NIL)")),
            Response::Fetch {
                uid: Some(9),
                body: None,
            }
        );
        assert_eq!(
            Response::parse(&line("* 2 FETCH (FLAGS (\\Seen) UID 9)")),
            Response::Fetch {
                uid: Some(9),
                body: None,
            }
        );
    }

    #[test]
    fn test_bye_and_other() {
        assert_eq!(
            Response::parse(&line("* BYE server shutting down")),
            Response::Bye("server shutting down".into())
        );
        assert_eq!(Response::parse(&line("* 3 RECENT")), Response::Other);
        assert_eq!(Response::parse(&line("+ go ahead")), Response::Other);
    }
}
