// SPDX-FileCopyrightText: 2026 Keyenv Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Plaintext format of the credential set.
//!
//! ```text
//! # keyenv credential store
//! # Managed by keyenv. Edit with `keyenv add` and `keyenv remove`.
//! OPENAI_API_KEY="sk-test-1"
//! MULTILINE="line one\nline \"two\""
//! ```
//!
//! Writing is strict: names are validated and values are escaped (`\\`,
//! `\"`, `\n`, `\r`). Reading is permissive: malformed lines are skipped,
//! and bare or single-quoted values are taken literally.

use keyenv_core::{KeyenvError, Result};
use tracing::debug;
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::scratch::ScratchBuffer;

/// Banner written when a set carries no header of its own.
pub const DEFAULT_HEADER: &[&str] = &[
    "# keyenv credential store",
    "# Managed by keyenv. Edit with `keyenv add` and `keyenv remove`.",
];

/// One named credential.
#[derive(Clone, PartialEq, Eq, Zeroize)]
pub struct CredentialRecord {
    pub name: String,
    pub value: String,
}

impl std::fmt::Debug for CredentialRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialRecord")
            .field("name", &self.name)
            .field("value", &"[REDACTED]")
            .finish()
    }
}

/// Whether an upsert created a record or replaced one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Upsert {
    Inserted,
    Updated,
}

/// Every credential in the store, in insertion order, plus header comments.
///
/// Wiped on drop: this is the decrypted working copy.
#[derive(Default, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct CredentialSet {
    header: Vec<String>,
    records: Vec<CredentialRecord>,
}

impl std::fmt::Debug for CredentialSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialSet")
            .field("header", &self.header)
            .field("names", &self.names().collect::<Vec<_>>())
            .finish()
    }
}

impl CredentialSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn header(&self) -> &[String] {
        &self.header
    }

    pub fn records(&self) -> &[CredentialRecord] {
        &self.records
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.records.iter().map(|r| r.name.as_str())
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn find(&self, name: &str) -> Option<&CredentialRecord> {
        self.records.iter().find(|r| r.name == name)
    }

    /// Replace the value in place if `name` exists, otherwise append.
    pub fn upsert(&mut self, name: &str, value: &str) -> Upsert {
        match self.records.iter_mut().find(|r| r.name == name) {
            Some(record) => {
                record.value.zeroize();
                record.value.push_str(value);
                Upsert::Updated
            }
            None => {
                self.records.push(CredentialRecord {
                    name: name.to_string(),
                    value: value.to_string(),
                });
                Upsert::Inserted
            }
        }
    }

    /// Remove `name`. Returns `false` if it was not present.
    pub fn delete(&mut self, name: &str) -> bool {
        match self.records.iter().position(|r| r.name == name) {
            Some(idx) => {
                let mut removed = self.records.remove(idx);
                removed.zeroize();
                true
            }
            None => false,
        }
    }
}

/// Check a credential name: ASCII letters, digits and `_`, not starting
/// with a digit, so it is always usable as an environment variable.
pub fn validate_name(name: &str) -> Result<()> {
    let mut chars = name.chars();
    match chars.next() {
        None => Err(KeyenvError::Validation("name must not be empty".into())),
        Some(c) if c.is_ascii_digit() => Err(KeyenvError::Validation(format!(
            "name `{name}` must not start with a digit"
        ))),
        Some(_) => match name.chars().find(|c| !(c.is_ascii_alphanumeric() || *c == '_')) {
            Some(bad) => Err(KeyenvError::Validation(format!(
                "name `{name}` contains `{}`; use letters, digits and underscores",
                bad.escape_default()
            ))),
            None => Ok(()),
        },
    }
}

/// Check a credential value: non-empty and free of NUL bytes (which no
/// process environment can carry).
pub fn validate_value(value: &str) -> Result<()> {
    if value.is_empty() {
        return Err(KeyenvError::Validation("value must not be empty".into()));
    }
    if value.contains('\0') {
        return Err(KeyenvError::Validation("value must not contain NUL bytes".into()));
    }
    Ok(())
}

/// Serialize `set` into a scratch buffer.
pub fn serialize(set: &CredentialSet) -> Result<ScratchBuffer> {
    for record in &set.records {
        validate_name(&record.name)?;
    }

    let header: Vec<&str> = if set.header.is_empty() {
        DEFAULT_HEADER.to_vec()
    } else {
        set.header.iter().map(String::as_str).collect()
    };

    // Worst case every value byte is escaped; sizing up front keeps the
    // buffer from reallocating and leaving plaintext behind.
    let capacity = header.iter().map(|h| h.len() + 1).sum::<usize>()
        + set
            .records
            .iter()
            .map(|r| r.name.len() + 2 * r.value.len() + 4)
            .sum::<usize>();
    let mut out = ScratchBuffer::with_capacity(capacity);

    for line in header {
        out.extend_from_slice(line.as_bytes());
        out.extend_from_slice(b"\n");
    }
    for record in &set.records {
        out.extend_from_slice(record.name.as_bytes());
        out.extend_from_slice(b"=\"");
        escape_into(&record.value, &mut out);
        out.extend_from_slice(b"\"\n");
    }
    Ok(out)
}

fn escape_into(value: &str, out: &mut ScratchBuffer) {
    let bytes = value.as_bytes();
    let mut start = 0;
    for (i, b) in bytes.iter().enumerate() {
        let escaped: &[u8] = match *b {
            b'\\' => b"\\\\",
            b'"' => b"\\\"",
            b'\n' => b"\\n",
            b'\r' => b"\\r",
            _ => continue,
        };
        out.extend_from_slice(&bytes[start..i]);
        out.extend_from_slice(escaped);
        start = i + 1;
    }
    out.extend_from_slice(&bytes[start..]);
}

/// Parse plaintext back into a set.
///
/// Only non-UTF-8 input is an error. Leading `#` lines become the header;
/// later comments, blank lines and malformed lines are dropped.
pub fn parse(bytes: &[u8]) -> Result<CredentialSet> {
    let text = std::str::from_utf8(bytes)
        .map_err(|_| KeyenvError::Validation("credential plaintext is not UTF-8".into()))?;

    let mut set = CredentialSet::new();
    let mut in_header = true;

    for (lineno, raw) in text.lines().enumerate() {
        let line = raw.trim();
        if line.is_empty() {
            continue;
        }
        if line.starts_with('#') {
            if in_header {
                set.header.push(line.to_string());
            }
            continue;
        }
        in_header = false;

        let line = line.strip_prefix("export ").unwrap_or(line);
        let Some((name, value)) = line.split_once('=') else {
            debug!(line = lineno + 1, "skipping line without `=`");
            continue;
        };
        let name = name.trim();
        if validate_name(name).is_err() {
            debug!(line = lineno + 1, "skipping line with invalid name");
            continue;
        }

        let mut value = decode_value(value.trim());
        set.upsert(name, &value);
        value.zeroize();
    }
    Ok(set)
}

fn decode_value(raw: &str) -> String {
    if raw.len() >= 2 && raw.starts_with('"') && raw.ends_with('"') {
        return unescape(&raw[1..raw.len() - 1]);
    }
    if raw.len() >= 2 && raw.starts_with('\'') && raw.ends_with('\'') {
        return raw[1..raw.len() - 1].to_string();
    }
    raw.to_string()
}

fn unescape(inner: &str) -> String {
    let mut out = String::with_capacity(inner.len());
    let mut chars = inner.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('r') => out.push('\r'),
            Some('"') => out.push('"'),
            Some('\\') => out.push('\\'),
            // Unknown escapes are kept verbatim.
            Some(other) => {
                out.push('\\');
                out.push(other);
            }
            None => out.push('\\'),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn set_of(pairs: &[(&str, &str)]) -> CredentialSet {
        let mut set = CredentialSet::new();
        for (name, value) in pairs {
            set.upsert(name, value);
        }
        set
    }

    fn text(set: &CredentialSet) -> String {
        String::from_utf8(serialize(set).unwrap().to_vec()).unwrap()
    }

    #[test]
    fn serialize_writes_banner_then_records_in_order() {
        let set = set_of(&[("B_KEY", "2"), ("A_KEY", "1")]);
        let out = text(&set);
        let lines: Vec<&str> = out.lines().collect();
        assert_eq!(lines[..2], DEFAULT_HEADER[..]);
        assert_eq!(lines[2..], ["B_KEY=\"2\"", "A_KEY=\"1\""]);
    }

    #[test]
    fn serialize_escapes_quotes_newlines_and_backslashes() {
        let set = set_of(&[("TRICKY", "a\"b\\c\nd\re")]);
        assert!(text(&set).ends_with("TRICKY=\"a\\\"b\\\\c\\nd\\re\"\n"));
    }

    #[test]
    fn serialize_rejects_invalid_names() {
        let mut set = CredentialSet::new();
        set.records.push(CredentialRecord {
            name: "BAD NAME".into(),
            value: "v".into(),
        });
        assert!(matches!(serialize(&set), Err(KeyenvError::Validation(_))));
    }

    #[test]
    fn parse_keeps_leading_comments_as_header() {
        let set = parse(b"# one\n# two\n\nA=\"1\"\n# dropped\nB=2\n").unwrap();
        assert_eq!(set.header(), ["# one", "# two"]);
        assert_eq!(set.names().collect::<Vec<_>>(), ["A", "B"]);
    }

    #[test]
    fn parse_skips_malformed_lines() {
        let set = parse(b"no equals here\n=value\n9LIVES=\"x\"\nGOOD=\"ok\"\nBAD-NAME=1\n").unwrap();
        assert_eq!(set.len(), 1);
        assert_eq!(set.find("GOOD").unwrap().value, "ok");
    }

    #[test]
    fn parse_splits_on_first_equals_only() {
        let set = parse(b"URL=\"https://x.test/?a=b=c\"\n").unwrap();
        assert_eq!(set.find("URL").unwrap().value, "https://x.test/?a=b=c");
    }

    #[test]
    fn parse_accepts_bare_single_quoted_and_exported_values() {
        let set = parse(b"A=bare\nB='single \"q\"'\nexport C=\"exported\"\n").unwrap();
        assert_eq!(set.find("A").unwrap().value, "bare");
        assert_eq!(set.find("B").unwrap().value, "single \"q\"");
        assert_eq!(set.find("C").unwrap().value, "exported");
    }

    #[test]
    fn parse_duplicate_names_last_value_first_position() {
        let set = parse(b"X=\"1\"\nY=\"2\"\nX=\"3\"\n").unwrap();
        assert_eq!(set.names().collect::<Vec<_>>(), ["X", "Y"]);
        assert_eq!(set.find("X").unwrap().value, "3");
    }

    #[test]
    fn parse_keeps_unknown_escapes() {
        let set = parse(b"W=\"C:\\tmp\"\n").unwrap();
        assert_eq!(set.find("W").unwrap().value, "C:\\tmp");
    }

    #[test]
    fn parse_rejects_non_utf8() {
        assert!(matches!(parse(&[0xff, 0xfe]), Err(KeyenvError::Validation(_))));
    }

    #[test]
    fn parse_empty_input_is_empty_set() {
        let set = parse(b"").unwrap();
        assert!(set.is_empty());
        assert!(set.header().is_empty());
    }

    #[test]
    fn upsert_updates_in_place() {
        let mut set = set_of(&[("A", "1"), ("B", "2")]);
        assert_eq!(set.upsert("A", "10"), Upsert::Updated);
        assert_eq!(set.upsert("C", "3"), Upsert::Inserted);
        assert_eq!(set.names().collect::<Vec<_>>(), ["A", "B", "C"]);
        assert_eq!(set.find("A").unwrap().value, "10");
    }

    #[test]
    fn delete_reports_presence() {
        let mut set = set_of(&[("A", "1")]);
        assert!(set.delete("A"));
        assert!(!set.delete("A"));
        assert!(set.find("A").is_none());
    }

    #[test]
    fn name_validation() {
        assert!(validate_name("OPENAI_API_KEY").is_ok());
        assert!(validate_name("_private2").is_ok());
        assert!(validate_name("").is_err());
        assert!(validate_name("2FA").is_err());
        assert!(validate_name("api/openai").is_err());
        assert!(validate_name("KEY=V").is_err());
    }

    #[test]
    fn value_validation() {
        assert!(validate_value("sk-test-1").is_ok());
        assert!(validate_value("").is_err());
        assert!(validate_value("a\0b").is_err());
    }

    #[test]
    fn debug_does_not_print_values() {
        let set = set_of(&[("TOKEN", "super-secret")]);
        let rendered = format!("{set:?}");
        assert!(rendered.contains("TOKEN"));
        assert!(!rendered.contains("super-secret"));

        let record = format!("{:?}", set.find("TOKEN").unwrap());
        assert!(record.contains("TOKEN"));
        assert!(!record.contains("super-secret"));
    }

    proptest! {
        #[test]
        fn serialize_parse_roundtrip(
            pairs in prop::collection::vec(("[A-Za-z_][A-Za-z0-9_]{0,15}", any::<String>()), 0..12)
        ) {
            let mut set = CredentialSet::new();
            for (name, value) in &pairs {
                set.upsert(name, value);
            }
            let parsed = parse(&serialize(&set).unwrap()).unwrap();
            prop_assert_eq!(parsed.records(), set.records());
            prop_assert_eq!(parsed.header(), DEFAULT_HEADER);
        }
    }
}
