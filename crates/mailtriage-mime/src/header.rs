//! Header block handling.

/// Header fields of one message, in the order they appeared.
///
/// Lookups ignore case. Repeated fields such as `Received` or
/// `Delivered-To` keep every occurrence.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Headers {
    // (lowercased name, unfolded value)
    fields: Vec<(String, String)>,
}

impl Headers {
    /// Creates an empty header block.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a field.
    pub fn add(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let mut name = name.into();
        name.make_ascii_lowercase();
        self.fields.push((name, value.into()));
    }

    fn values<'a>(&'a self, name: &str) -> impl Iterator<Item = &'a str> {
        self.fields
            .iter()
            .filter(move |(field, _)| field.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    /// First value of `name`, if present.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&str> {
        self.values(name).next()
    }

    /// Every value of `name`, in header order.
    #[must_use]
    pub fn get_all(&self, name: &str) -> Vec<&str> {
        self.values(name).collect()
    }

    /// Whether `name` occurs at all.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// `(name, value)` pairs in header order. Names are lowercase.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.fields.iter().map(|(n, v)| (n.as_str(), v.as_str()))
    }

    /// Number of fields, counting repeats.
    #[must_use]
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// True when the block had no usable field.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Parses a raw block as returned by `RFC822.HEADER`, replacing
    /// invalid UTF-8.
    #[must_use]
    pub fn parse_bytes(raw: &[u8]) -> Self {
        Self::parse(&String::from_utf8_lossy(raw))
    }

    /// Parses an RFC 5322 header block.
    ///
    /// Folded lines are joined with a single space. The block ends at the
    /// first blank line. Lines without a colon, names containing
    /// whitespace, and continuations before any field are dropped.
    #[must_use]
    pub fn parse(text: &str) -> Self {
        let mut out = Self::new();
        let mut pending: Option<(String, String)> = None;

        for line in text.lines().take_while(|l| !l.is_empty()) {
            if line.starts_with([' ', '\t']) {
                if let Some((_, value)) = pending.as_mut() {
                    value.push(' ');
                    value.push_str(line.trim());
                }
                continue;
            }

            if let Some((name, value)) = pending.take() {
                out.add(name, value.trim_end());
            }
            pending = line.split_once(':').and_then(|(name, value)| {
                let name = name.trim();
                let valid = !name.is_empty() && !name.contains(char::is_whitespace);
                valid.then(|| (name.to_string(), value.trim().to_string()))
            });
        }

        if let Some((name, value)) = pending {
            out.add(name, value.trim_end());
        }
        out
    }
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::redundant_clone,
    clippy::manual_string_new,
    clippy::needless_collect,
    clippy::unreadable_literal,
    clippy::used_underscore_items,
    clippy::similar_names
)]
mod tests {
    use super::*;

    #[test]
    fn test_headers_add_get() {
        let mut headers = Headers::new();
        headers.add("List-Id", "<repo.github.com>");
        assert_eq!(headers.get("List-Id"), Some("<repo.github.com>"));
        assert_eq!(headers.get("list-id"), Some("<repo.github.com>")); // Case insensitive
        assert!(headers.contains("LIST-ID"));
        assert!(!headers.contains("X-Priority"));
    }

    #[test]
    fn test_headers_multiple_values() {
        let mut headers = Headers::new();
        headers.add("Delivered-To", "alice@example.com");
        headers.add("Delivered-To", "bob@example.com");
        assert_eq!(headers.get_all("delivered-to").len(), 2);
        assert_eq!(headers.get("Delivered-To"), Some("alice@example.com"));
        assert_eq!(headers.len(), 2);
    }

    #[test]
    fn test_headers_parse() {
        let text = concat!(
            "From: sender@example.com\r\n",
            "To: recipient@example.com\r\n",
            "Subject: Test Message\r\n",
            "References: <a@example.com>\r\n",
            "\t<b@example.com>\r\n",
            "\r\n",
            "Body: not a header\r\n"
        );

        let headers = Headers::parse(text);
        assert_eq!(headers.get("From"), Some("sender@example.com"));
        assert_eq!(headers.get("To"), Some("recipient@example.com"));
        assert_eq!(headers.get("Subject"), Some("Test Message"));
        assert_eq!(
            headers.get("References"),
            Some("<a@example.com> <b@example.com>")
        );
        assert!(!headers.contains("Body"));
    }

    #[test]
    fn test_headers_parse_skips_garbage() {
        let text = "  orphan continuation\r\nnot a header line\r\nX-Ok: yes\r\n";
        let headers = Headers::parse(text);
        assert_eq!(headers.len(), 1);
        assert_eq!(headers.get("x-ok"), Some("yes"));
    }

    #[test]
    fn test_headers_parse_bytes_lossy() {
        let raw = b"Subject: caf\xe9\r\n\r\n";
        let headers = Headers::parse_bytes(raw);
        assert!(headers.get("subject").unwrap().starts_with("caf"));
    }

    #[test]
    fn test_headers_iter_keeps_order() {
        let headers = Headers::parse("To: b@example.com\r\nFrom: a@example.com\r\nTo: c@example.com\r\n");
        let pairs: Vec<_> = headers.iter().collect();
        assert_eq!(
            pairs,
            vec![
                ("to", "b@example.com"),
                ("from", "a@example.com"),
                ("to", "c@example.com"),
            ]
        );
    }
}
