//! `Content-Type` values.

use crate::error::{Error, Result};

/// A parsed `Content-Type`: lowercased `type/subtype` and parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentType {
    /// Top-level media type, such as `text` or `multipart`.
    pub main_type: String,
    /// Subtype, such as `plain` or `alternative`.
    pub sub_type: String,
    /// Parameters with lowercased names, in order of appearance.
    pub parameters: Vec<(String, String)>,
}

impl ContentType {
    /// `text/plain; charset=us-ascii`, assumed when a part declares nothing
    /// usable.
    #[must_use]
    pub fn text_plain() -> Self {
        Self {
            main_type: "text".into(),
            sub_type: "plain".into(),
            parameters: vec![("charset".into(), "us-ascii".into())],
        }
    }

    /// Value of parameter `name`; the first one wins on repeats.
    #[must_use]
    pub fn param(&self, name: &str) -> Option<&str> {
        self.parameters
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    /// The `charset` parameter.
    #[must_use]
    pub fn charset(&self) -> Option<&str> {
        self.param("charset")
    }

    /// The `boundary` parameter, if non-empty.
    #[must_use]
    pub fn boundary(&self) -> Option<&str> {
        self.param("boundary").filter(|b| !b.is_empty())
    }

    /// True for `multipart/*`.
    #[must_use]
    pub fn is_multipart(&self) -> bool {
        self.main_type == "multipart"
    }

    /// True if this is exactly `main_type/sub_type`.
    #[must_use]
    pub fn is(&self, main_type: &str, sub_type: &str) -> bool {
        self.main_type == main_type && self.sub_type == sub_type
    }

    /// Parses `type/subtype; name=value; name="quoted; value"`.
    ///
    /// Parameters without `=` are skipped.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MalformedContentType`] if `type/subtype` is missing.
    pub fn parse(value: &str) -> Result<Self> {
        let mut segments = split_unquoted(value, ';');
        let media = segments.next().unwrap_or_default();
        let Some((main_type, sub_type)) = media
            .split_once('/')
            .map(|(m, s)| (m.trim().to_ascii_lowercase(), s.trim().to_ascii_lowercase()))
            .filter(|(m, s)| !m.is_empty() && !s.is_empty())
        else {
            return Err(Error::MalformedContentType(value.to_string()));
        };

        let parameters = segments
            .filter_map(|segment| {
                let (name, raw) = segment.split_once('=')?;
                let raw = raw.trim();
                let unquoted = raw
                    .strip_prefix('"')
                    .map_or(raw, |r| r.strip_suffix('"').unwrap_or(r));
                Some((name.trim().to_ascii_lowercase(), unquoted.to_string()))
            })
            .collect();

        Ok(Self {
            main_type,
            sub_type,
            parameters,
        })
    }
}

/// Splits on `sep` where it is not inside double quotes.
fn split_unquoted(value: &str, sep: char) -> impl Iterator<Item = &str> {
    let mut quoted = false;
    value.split(move |c: char| {
        if c == '"' {
            quoted = !quoted;
        }
        c == sep && !quoted
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_names_lowercased() {
        let ct = ContentType::parse("Text/HTML; Charset=ISO-8859-1").unwrap();
        assert!(ct.is("text", "html"));
        assert_eq!(ct.charset(), Some("ISO-8859-1"));
    }

    #[test]
    fn test_boundary_with_semicolon() {
        let ct = ContentType::parse("multipart/alternative; boundary=\"=_b;1\"; x=y").unwrap();
        assert!(ct.is_multipart());
        assert_eq!(ct.boundary(), Some("=_b;1"));
        assert_eq!(ct.param("x"), Some("y"));
    }

    #[test]
    fn test_empty_boundary_ignored() {
        let ct = ContentType::parse("multipart/mixed; boundary=\"\"").unwrap();
        assert!(ct.boundary().is_none());
    }

    #[test]
    fn test_missing_media_type() {
        assert!(ContentType::parse("text").is_err());
        assert!(ContentType::parse("/plain").is_err());
        assert!(ContentType::parse("").is_err());
    }
}
