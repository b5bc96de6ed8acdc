//! Header block parsing.

use crate::encoding::decode_rfc2047;

/// Header fields of one MIME entity, in message order.
///
/// Field names compare case-insensitively. Repeated fields are all kept;
/// lookups return the first.
#[derive(Debug, Clone, Default)]
pub struct Headers {
    fields: Vec<(String, String)>,
}

impl Headers {
    /// Parses an unfolded header block.
    ///
    /// Continuation lines (leading space or tab) are joined to the previous
    /// field with one space. Stops at the first empty line. Lines that are
    /// not `name: value` are dropped.
    #[must_use]
    pub fn parse(text: &str) -> Self {
        let mut fields: Vec<(String, String)> = Vec::new();
        // False after a dropped line, so its continuations are dropped too.
        let mut open = false;

        for line in text.lines() {
            if line.is_empty() {
                break;
            }

            if line.starts_with([' ', '\t']) {
                if open && let Some((_, value)) = fields.last_mut() {
                    if !value.is_empty() {
                        value.push(' ');
                    }
                    value.push_str(line.trim());
                }
                continue;
            }

            open = match line.split_once(':') {
                Some((name, value)) if is_field_name(name.trim()) => {
                    fields.push((name.trim().to_ascii_lowercase(), value.trim().to_string()));
                    true
                }
                _ => false,
            };
        }

        Self { fields }
    }

    /// First value of `name`, raw.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(field, _)| field.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    /// First value of `name` with encoded words decoded. Blank values count
    /// as absent.
    #[must_use]
    pub fn get_decoded(&self, name: &str) -> Option<String> {
        let decoded = decode_rfc2047(self.get(name)?);
        let trimmed = decoded.trim();
        (!trimmed.is_empty()).then(|| trimmed.to_string())
    }

    /// Iterates `(lowercased name, raw value)` pairs in message order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.fields.iter().map(|(n, v)| (n.as_str(), v.as_str()))
    }

    /// Number of fields, counting repeats.
    #[must_use]
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// True if the block held no fields.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

/// RFC 5322 field names: printable ASCII without space or colon.
fn is_field_name(name: &str) -> bool {
    !name.is_empty() && name.bytes().all(|b| (33..=126).contains(&b) && b != b':')
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_folded_field_is_joined() {
        let headers = Headers::parse(
            "Subject: Quarterly\r\n  numbers\r\nContent-Type: text/plain;\r\n\tcharset=utf-8\r\n\r\nX-Body: no\r\n",
        );
        assert_eq!(headers.get("subject"), Some("Quarterly numbers"));
        assert_eq!(headers.get("CONTENT-TYPE"), Some("text/plain; charset=utf-8"));
        assert!(headers.get("x-body").is_none());
    }

    #[test]
    fn test_junk_lines_and_their_continuations_dropped() {
        let headers = Headers::parse("no colon here\n still junk\nbad name: x\nFrom: a@b.c\n");
        assert_eq!(headers.len(), 1);
        assert_eq!(headers.get("from"), Some("a@b.c"));
    }

    #[test]
    fn test_repeats_kept_in_order() {
        let headers = Headers::parse("Received: one\nTo: x@y.z\nReceived: two\n");
        let received: Vec<_> = headers
            .iter()
            .filter(|(name, _)| *name == "received")
            .map(|(_, value)| value)
            .collect();
        assert_eq!(received, vec!["one", "two"]);
        assert_eq!(headers.get("received"), Some("one"));
    }

    #[test]
    fn test_decoded_blank_is_absent() {
        let headers = Headers::parse("Subject: \t\nFrom: =?utf-8?B?SMOpbGxv?=\n");
        assert!(headers.get_decoded("subject").is_none());
        assert_eq!(headers.get_decoded("from").unwrap(), "Héllo");
    }
}
