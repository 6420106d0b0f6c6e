//! Content fingerprints used as row identity and deduplication key.
//!
//! A fingerprint is the SHA-256 digest of a canonical JSON object built from
//! `(column, value)` pairs sorted by column name, with `null` standing for the
//! NULL sentinel. Insertion order never affects the result. The hex rendering
//! is 64 printable characters and is written verbatim as key values.

use std::{collections::BTreeMap, fmt};

use sha2::{Digest, Sha256};

use crate::value::CanonicalValue;

pub const FINGERPRINT_HEX_LEN: usize = 64;

#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Fingerprint([u8; 32]);

impl Fingerprint {
    /// Digest of an arbitrary content mapping.
    pub fn of_content<'a, I>(content: I) -> Self
    where
        I: IntoIterator<Item = (&'a str, Option<&'a str>)>,
    {
        let canonical: BTreeMap<&str, Option<&str>> = content.into_iter().collect();
        fingerprint(&canonical)
    }

    /// Digest of a projected row: `columns[i]` holds `values[i]`.
    pub fn of_row(columns: &[String], values: &[CanonicalValue]) -> Self {
        Self::of_content(
            columns
                .iter()
                .map(String::as_str)
                .zip(values.iter().map(Option::as_deref)),
        )
    }

    /// Digest of a row's content together with its foreign-key context.
    pub fn of_row_with_context(
        columns: &[String],
        values: &[CanonicalValue],
        fk_columns: &[String],
        fk_values: &[Fingerprint],
    ) -> Self {
        let hex = fk_values.iter().map(Fingerprint::to_hex).collect::<Vec<_>>();
        Self::of_content(
            columns
                .iter()
                .map(String::as_str)
                .zip(values.iter().map(Option::as_deref))
                .chain(
                    fk_columns
                        .iter()
                        .map(String::as_str)
                        .zip(hex.iter().map(|h| Some(h.as_str()))),
                ),
        )
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

/// Hashes a canonical content mapping.
pub fn fingerprint(content: &BTreeMap<&str, Option<&str>>) -> Fingerprint {
    // serializing a string-keyed map of optional strings cannot fail
    let payload = serde_json::to_vec(content).unwrap_or_default();
    let digest = Sha256::digest(&payload);
    Fingerprint(digest.into())
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Fingerprint({})", &self.to_hex()[..12])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insertion_order_does_not_matter() {
        let a = Fingerprint::of_content([("x", Some("1")), ("y", Some("2"))]);
        let b = Fingerprint::of_content([("y", Some("2")), ("x", Some("1"))]);
        assert_eq!(a, b);
    }

    #[test]
    fn null_differs_from_literal_text() {
        let null = Fingerprint::of_content([("x", None)]);
        let text = Fingerprint::of_content([("x", Some("NULL"))]);
        assert_ne!(null, text);
    }

    #[test]
    fn context_changes_the_digest() {
        let columns = vec!["c".to_string()];
        let values = vec![Some("a".to_string())];
        let plain = Fingerprint::of_row(&columns, &values);
        let parent = Fingerprint::of_content([("p", Some("x"))]);
        let with_context =
            Fingerprint::of_row_with_context(&columns, &values, &["parent_id".into()], &[parent]);
        assert_ne!(plain, with_context);
    }

    #[test]
    fn hex_is_fixed_width_lowercase_sha256() {
        let fp = Fingerprint::of_content([("k", Some("v"))]);
        let hex = fp.to_hex();
        assert_eq!(hex.len(), FINGERPRINT_HEX_LEN);
        assert!(hex.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
        let expected = Sha256::digest(br#"{"k":"v"}"#);
        assert_eq!(hex, format!("{expected:x}"));
        assert_eq!(fp.to_string(), hex);
    }
}
