//! Record and Attribute data model.
//!
//! An [`Attribute`] is the complete set of named [`Record`]s attached to one
//! file. It is serialized as a single JSON object with compact field tags:
//!
//! ```text
//! {"backup-2024":{"c":"e3b0c442...","h":"SHA256","t":1686676137,"v":true}}
//! ```

use std::collections::btree_map::{self, BTreeMap};

use serde::{Deserialize, Serialize};

use crate::hashing::Algorithm;

/// Reasons a record or record name is rejected.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("expected a checksum of {expected} characters for {algorithm}, got {actual}")]
    ChecksumLength {
        algorithm: Algorithm,
        expected: usize,
        actual: usize,
    },

    #[error("checksum has illegal character at index {index}")]
    ChecksumCharacter { index: usize },

    #[error("name cannot be empty")]
    EmptyName,

    #[error("name cannot have leading or trailing whitespace")]
    NameWhitespace,

    #[error("character at index {index} of name is not printable")]
    NameNotPrintable { index: usize },
}

/// A single named integrity entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    /// Lowercase hex digest of the file content.
    #[serde(rename = "c")]
    pub checksum: String,
    /// Algorithm that produced `checksum`.
    #[serde(rename = "h")]
    pub algorithm: Algorithm,
    /// Unix timestamp of the record's creation.
    #[serde(rename = "t")]
    pub created_at: i64,
    /// Whether the content still matched `checksum` when last checked.
    #[serde(rename = "v")]
    pub valid: bool,
}

impl Record {
    /// Create a valid record stamped with the current time.
    pub fn new(checksum: String, algorithm: Algorithm) -> Self {
        Self {
            checksum,
            algorithm,
            created_at: chrono::Utc::now().timestamp(),
            valid: true,
        }
    }

    /// Check the checksum against the algorithm's digest length and charset.
    pub fn validate(&self) -> Result<(), ValidationError> {
        let expected = self.algorithm.hex_len();
        if self.checksum.len() != expected {
            return Err(ValidationError::ChecksumLength {
                algorithm: self.algorithm,
                expected,
                actual: self.checksum.len(),
            });
        }
        if let Some(index) = self
            .checksum
            .chars()
            .position(|ch| !matches!(ch, '0'..='9' | 'a'..='f'))
        {
            return Err(ValidationError::ChecksumCharacter { index });
        }
        Ok(())
    }
}

/// Check a record name: non-empty, no surrounding whitespace, printable.
pub fn validate_name(name: &str) -> Result<(), ValidationError> {
    if name.is_empty() {
        return Err(ValidationError::EmptyName);
    }
    if name.trim() != name {
        return Err(ValidationError::NameWhitespace);
    }
    if let Some(index) = name.chars().position(|ch| !is_printable(ch)) {
        return Err(ValidationError::NameNotPrintable { index });
    }
    Ok(())
}

/// Letters, marks, numbers, punctuation, symbols and the ASCII space.
fn is_printable(ch: char) -> bool {
    use unicode_general_category::{get_general_category, GeneralCategory as C};

    ch == ' '
        || !matches!(
            get_general_category(ch),
            C::Control
                | C::Format
                | C::Surrogate
                | C::PrivateUse
                | C::Unassigned
                | C::SpaceSeparator
                | C::LineSeparator
                | C::ParagraphSeparator
        )
}

/// All records of one file, unique by name.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Attribute(BTreeMap<String, Record>);

impl Attribute {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.0.contains_key(name)
    }

    pub fn get(&self, name: &str) -> Option<&Record> {
        self.0.get(name)
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut Record> {
        self.0.get_mut(name)
    }

    /// Insert or replace the record stored under `name`.
    pub fn insert(&mut self, name: impl Into<String>, record: Record) -> Option<Record> {
        self.0.insert(name.into(), record)
    }

    pub fn remove(&mut self, name: &str) -> Option<Record> {
        self.0.remove(name)
    }

    /// Keep only the records for which `keep` returns true.
    pub fn retain<F>(&mut self, mut keep: F)
    where
        F: FnMut(&str, &Record) -> bool,
    {
        self.0.retain(|name, rec| keep(name, rec));
    }

    pub fn iter(&self) -> btree_map::Iter<'_, String, Record> {
        self.0.iter()
    }

    pub fn iter_mut(&mut self) -> btree_map::IterMut<'_, String, Record> {
        self.0.iter_mut()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    /// Subset of records whose names appear in `names`.
    ///
    /// Names without a matching record are silently dropped.
    pub fn filter_by_name<S: AsRef<str>>(&self, names: &[S]) -> Attribute {
        let mut filtered = Attribute::new();
        for name in names {
            if let Some(rec) = self.0.get(name.as_ref()) {
                filtered.insert(name.as_ref(), rec.clone());
            }
        }
        filtered
    }

    /// True if at least one record is currently valid.
    pub fn has_valid(&self) -> bool {
        self.0.values().any(|rec| rec.valid)
    }

    /// True if every record is valid (vacuously true when empty).
    pub fn all_valid(&self) -> bool {
        self.0.values().all(|rec| rec.valid)
    }

    /// True if every record is invalid (vacuously true when empty).
    pub fn all_invalid(&self) -> bool {
        self.0.values().all(|rec| !rec.valid)
    }

    /// The newest record, if any.
    pub fn most_recent(&self) -> Option<(&str, &Record)> {
        self.0
            .iter()
            .max_by_key(|(_, rec)| rec.created_at)
            .map(|(name, rec)| (name.as_str(), rec))
    }

    /// Validate every name and record, reporting the first offender.
    pub fn validate(&self) -> Result<(), (String, ValidationError)> {
        for (name, rec) in &self.0 {
            validate_name(name).map_err(|e| (name.clone(), e))?;
            rec.validate().map_err(|e| (name.clone(), e))?;
        }
        Ok(())
    }
}

impl<'a> IntoIterator for &'a Attribute {
    type Item = (&'a String, &'a Record);
    type IntoIter = btree_map::Iter<'a, String, Record>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

impl FromIterator<(String, Record)> for Attribute {
    fn from_iter<I: IntoIterator<Item = (String, Record)>>(iter: I) -> Self {
        Attribute(iter.into_iter().collect())
    }
}
