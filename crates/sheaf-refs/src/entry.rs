//! One branch log revision and its text layout.
//!
//! ```text
//! {revision} {commit_id_hex} {message}
//! {changed_count}
//! {changed_hash_hex}
//! ...
//! ```

use std::fmt::Write as _;

use sheaf_types::Hash;

use crate::error::{RefError, RefResult};

/// A single revision of a branch.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BranchLogEntry {
    /// Monotonic per branch, starting at 0.
    pub revision: u64,
    pub commit_id: Hash,
    /// Single line; newlines are replaced by spaces on construction.
    pub message: String,
    /// Every object hash newly written by the commit.
    pub changed: Vec<Hash>,
}

impl BranchLogEntry {
    pub fn new(revision: u64, commit_id: Hash, message: &str, changed: Vec<Hash>) -> Self {
        Self {
            revision,
            commit_id,
            message: single_line(message),
            changed,
        }
    }

    /// Append the text form of this entry to `out`.
    pub fn encode_into(&self, out: &mut String) {
        // Writing into a String cannot fail.
        let _ = writeln!(out, "{} {} {}", self.revision, self.commit_id.to_hex(), self.message);
        let _ = writeln!(out, "{}", self.changed.len());
        for hash in &self.changed {
            let _ = writeln!(out, "{}", hash.to_hex());
        }
    }

    pub fn encode(&self) -> String {
        let mut out = String::new();
        self.encode_into(&mut out);
        out
    }
}

fn single_line(message: &str) -> String {
    message.replace(['\r', '\n'], " ")
}

fn malformed(line: usize, reason: impl Into<String>) -> RefError {
    RefError::Malformed {
        line,
        reason: reason.into(),
    }
}

fn parse_hash(text: &str, line: usize) -> RefResult<Hash> {
    Hash::from_hex(text).map_err(|e| malformed(line, e.to_string()))
}

/// Parse a whole log. Line numbers in errors are 1-based.
pub fn parse_log(text: &str) -> RefResult<Vec<BranchLogEntry>> {
    let mut entries = Vec::new();
    let mut lines = text.lines().enumerate().map(|(i, l)| (i + 1, l));

    while let Some((number, header)) = lines.next() {
        if header.is_empty() {
            continue;
        }
        let mut parts = header.splitn(3, ' ');
        let revision = parts
            .next()
            .and_then(|r| r.parse::<u64>().ok())
            .ok_or_else(|| malformed(number, "expected revision number"))?;
        let commit_id = match parts.next() {
            Some(hex) => parse_hash(hex, number)?,
            None => return Err(malformed(number, "expected commit id")),
        };
        let message = parts.next().unwrap_or_default().to_string();

        let (count_line, count) = lines
            .next()
            .ok_or_else(|| malformed(number + 1, "missing change count"))?;
        let count: usize = count
            .trim()
            .parse()
            .map_err(|_| malformed(count_line, "expected change count"))?;

        let mut changed = Vec::with_capacity(count);
        for _ in 0..count {
            let (line, hex) = lines
                .next()
                .ok_or_else(|| malformed(count_line + changed.len() + 1, "missing changed hash"))?;
            changed.push(parse_hash(hex.trim(), line)?);
        }

        entries.push(BranchLogEntry {
            revision,
            commit_id,
            message,
            changed,
        });
    }
    Ok(entries)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn h(b: u8) -> Hash {
        Hash::from_hash([b; 32])
    }

    #[test]
    fn text_layout() {
        let entry = BranchLogEntry::new(3, h(1), "abc init", vec![h(2), h(3)]);
        let text = entry.encode();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 4);
        assert_eq!(lines[0], format!("3 {} abc init", h(1).to_hex()));
        assert_eq!(lines[1], "2");
        assert_eq!(lines[2], h(2).to_hex());
        assert_eq!(lines[3], h(3).to_hex());
    }

    #[test]
    fn newlines_flattened() {
        let entry = BranchLogEntry::new(0, h(1), "first\nsecond\r\nthird", Vec::new());
        assert_eq!(entry.message, "first second  third");
        assert_eq!(parse_log(&entry.encode()).unwrap(), vec![entry]);
    }

    #[test]
    fn parses_several_entries() {
        let mut text = String::new();
        let a = BranchLogEntry::new(0, h(1), "", Vec::new());
        let b = BranchLogEntry::new(1, h(4), "merge  two spaces", vec![h(5)]);
        a.encode_into(&mut text);
        b.encode_into(&mut text);
        assert_eq!(parse_log(&text).unwrap(), vec![a, b]);
    }

    #[test]
    fn empty_text_is_empty_log() {
        assert!(parse_log("").unwrap().is_empty());
    }

    #[test]
    fn truncated_entry_is_malformed() {
        let mut text = BranchLogEntry::new(0, h(1), "m", vec![h(2), h(3)]).encode();
        text.truncate(text.len() - 65);
        match parse_log(&text) {
            Err(RefError::Malformed { line, .. }) => assert_eq!(line, 4),
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn bad_header_is_malformed() {
        assert!(matches!(parse_log("x abc\n0\n"), Err(RefError::Malformed { line: 1, .. })));
        assert!(matches!(parse_log("1 nothex m\n0\n"), Err(RefError::Malformed { line: 1, .. })));
        let bad_count = format!("1 {} m\nmany\n", h(1).to_hex());
        assert!(matches!(parse_log(&bad_count), Err(RefError::Malformed { line: 2, .. })));
    }

    proptest! {
        #[test]
        fn encoded_logs_parse_back(
            entries in proptest::collection::vec(
                ("[a-zA-Z0-9 .:/_-]{0,40}", any::<[u8; 32]>(), proptest::collection::vec(any::<u8>(), 0..4)),
                0..8,
            )
        ) {
            let mut text = String::new();
            let mut expected = Vec::new();
            for (revision, (message, id, changed)) in entries.into_iter().enumerate() {
                let changed = changed.into_iter().map(h).collect();
                let entry = BranchLogEntry::new(revision as u64, Hash::from_hash(id), &message, changed);
                entry.encode_into(&mut text);
                expected.push(entry);
            }
            prop_assert_eq!(parse_log(&text).unwrap(), expected);
        }
    }
}
