//! Address list and message identifier parsing.

use crate::encoding::decode_header_value;

/// A single mailbox from an address header.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Address {
    /// Display name, empty when the header carried none.
    pub name: String,
    /// The `local@domain` part.
    pub email: String,
}

impl Address {
    /// Creates an address without a display name.
    #[must_use]
    pub fn new(email: impl Into<String>) -> Self {
        Self {
            name: String::new(),
            email: email.into(),
        }
    }

    /// Creates an address with a display name.
    #[must_use]
    pub fn with_name(name: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            email: email.into(),
        }
    }

    /// Display name if present, otherwise the address itself.
    #[must_use]
    pub fn display(&self) -> &str {
        if self.name.is_empty() {
            &self.email
        } else {
            &self.name
        }
    }
}

impl std::fmt::Display for Address {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.name.is_empty() {
            write!(f, "{}", self.email)
        } else {
            write!(f, "{} <{}>", self.name, self.email)
        }
    }
}

/// Parses an address-list header value.
///
/// Accepts bare addresses, `Name <addr>`, quoted display names containing
/// commas, parenthesized comments and RFC 5322 groups
/// (`team: a@x, b@x;`). Entries without an `@` are dropped.
#[must_use]
pub fn parse_address_list(value: &str) -> Vec<Address> {
    split_top_level(value)
        .into_iter()
        .filter_map(|item| parse_mailbox(&item))
        .collect()
}

/// Splits on commas that are outside quotes, angle brackets and comments.
/// Group prefixes (`name:`) and terminators (`;`) act as separators too.
fn split_top_level(value: &str) -> Vec<String> {
    let mut items = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    let mut in_angle = false;
    let mut comment_depth = 0usize;
    let mut escaped = false;

    for ch in value.chars() {
        if escaped {
            current.push(ch);
            escaped = false;
            continue;
        }
        match ch {
            '\\' if in_quotes => {
                escaped = true;
            }
            '"' if comment_depth == 0 => {
                in_quotes = !in_quotes;
                current.push(ch);
            }
            '(' if !in_quotes => {
                comment_depth += 1;
            }
            ')' if !in_quotes && comment_depth > 0 => {
                comment_depth -= 1;
            }
            _ if comment_depth > 0 => {}
            '<' if !in_quotes => {
                in_angle = true;
                current.push(ch);
            }
            '>' if !in_quotes => {
                in_angle = false;
                current.push(ch);
            }
            ',' | ';' if !in_quotes && !in_angle => {
                items.push(std::mem::take(&mut current));
            }
            // group display name, e.g. `undisclosed-recipients:`
            ':' if !in_quotes && !in_angle => {
                current.clear();
            }
            _ => current.push(ch),
        }
    }
    items.push(current);

    items
        .into_iter()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

fn parse_mailbox(item: &str) -> Option<Address> {
    if let Some(open) = item.rfind('<') {
        let close = item[open..].find('>')? + open;
        let email = item[open + 1..close].trim();
        if !email.contains('@') {
            return None;
        }
        let name = item[..open].trim().trim_matches('"').trim();
        let name = decode_header_value(name);
        return Some(Address::with_name(name, email));
    }

    let email = item.trim_matches('"').trim();
    if email.contains('@') && !email.contains(char::is_whitespace) {
        Some(Address::new(email))
    } else {
        None
    }
}

/// Extracts message identifiers from `Message-ID`, `In-Reply-To` or
/// `References` values.
///
/// Identifiers are returned with their angle brackets. When a value
/// contains no bracketed identifier at all, whitespace-separated tokens
/// containing an `@` are accepted instead. Unterminated identifiers are
/// dropped.
#[must_use]
pub fn parse_message_ids(value: &str) -> Vec<String> {
    let mut ids = Vec::new();
    let mut rest = value;

    while let Some(open) = rest.find('<') {
        let after = &rest[open + 1..];
        let Some(close) = after.find('>') else {
            break;
        };
        let inner = after[..close].trim();
        if !inner.is_empty() && !inner.contains(char::is_whitespace) {
            ids.push(format!("<{inner}>"));
        }
        rest = &after[close + 1..];
    }

    if ids.is_empty() && !value.contains('<') {
        ids = value
            .split_whitespace()
            .filter(|token| token.contains('@'))
            .map(|token| format!("<{token}>"))
            .collect();
    }

    ids
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
    use proptest::prelude::*;

    #[test]
    fn test_parse_bare_address() {
        let addrs = parse_address_list("recipient@example.com");
        assert_eq!(addrs, vec![Address::new("recipient@example.com")]);
    }

    #[test]
    fn test_parse_named_addresses() {
        let addrs = parse_address_list(
            "Test User <test@example.com>, \"Doe, John\" <john@example.com>, cc@example.com",
        );
        assert_eq!(addrs.len(), 3);
        assert_eq!(addrs[0], Address::with_name("Test User", "test@example.com"));
        assert_eq!(addrs[1], Address::with_name("Doe, John", "john@example.com"));
        assert_eq!(addrs[2], Address::new("cc@example.com"));
    }

    #[test]
    fn test_parse_group_and_comments() {
        let addrs = parse_address_list("team: a@example.com (Alice), b@example.com;");
        assert_eq!(
            addrs,
            vec![Address::new("a@example.com"), Address::new("b@example.com")]
        );

        assert!(parse_address_list("undisclosed-recipients:;").is_empty());
    }

    #[test]
    fn test_parse_drops_garbage() {
        assert!(parse_address_list("").is_empty());
        assert!(parse_address_list("not an address").is_empty());
        assert!(parse_address_list("Broken <no-at-sign>").is_empty());
    }

    #[test]
    fn test_encoded_display_name() {
        let addrs = parse_address_list("=?utf-8?B?SMOpbGxv?= <h@example.com>");
        assert_eq!(addrs[0].name, "Héllo");
        assert_eq!(addrs[0].display(), "Héllo");
    }

    #[test]
    fn test_address_display() {
        assert_eq!(Address::new("a@example.com").display(), "a@example.com");
        assert_eq!(
            Address::with_name("Alice", "a@example.com").to_string(),
            "Alice <a@example.com>"
        );
    }

    #[test]
    fn test_parse_message_ids() {
        assert_eq!(parse_message_ids("<123@example.com>"), vec!["<123@example.com>"]);
        assert_eq!(
            parse_message_ids("<root@example.com>\r\n <parent@example.com>"),
            vec!["<root@example.com>", "<parent@example.com>"]
        );
        assert_eq!(parse_message_ids("bare@example.com"), vec!["<bare@example.com>"]);
        assert!(parse_message_ids("<unterminated@example.com").is_empty());
        assert!(parse_message_ids("").is_empty());
    }

    proptest! {
        #[test]
        fn prop_simple_address_roundtrips(local in "[a-z][a-z0-9.]{0,12}", domain in "[a-z]{1,10}\\.[a-z]{2,4}") {
            let email = format!("{local}@{domain}");
            let parsed = parse_address_list(&format!("Someone <{email}>"));
            prop_assert_eq!(parsed.len(), 1);
            prop_assert_eq!(&parsed[0].email, &email);
        }

        #[test]
        fn prop_address_parser_never_panics(input in "\\PC{0,64}") {
            let _ = parse_address_list(&input);
            let _ = parse_message_ids(&input);
        }
    }
}
