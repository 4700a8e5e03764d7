//! Typed content digests used for identity and rename detection.

use serde::{Deserialize, Serialize};
use std::fmt;

/// The family a fingerprint value belongs to.
///
/// A file carries at most one value per kind. Perceptual kinds beyond
/// [`FingerprintKind::Phash`] can be introduced by collaborators through
/// [`FingerprintKind::Other`] without a schema change.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FingerprintKind {
    Oshash,
    Md5,
    Phash,
    Other(String),
}

impl FingerprintKind {
    pub fn as_str(&self) -> &str {
        match self {
            FingerprintKind::Oshash => "oshash",
            FingerprintKind::Md5 => "md5",
            FingerprintKind::Phash => "phash",
            FingerprintKind::Other(name) => name,
        }
    }

    pub fn from_db(name: &str) -> Self {
        match name {
            "oshash" => FingerprintKind::Oshash,
            "md5" => FingerprintKind::Md5,
            "phash" => FingerprintKind::Phash,
            other => FingerprintKind::Other(other.to_string()),
        }
    }
}

impl fmt::Display for FingerprintKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single typed digest. The value is opaque to the catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fingerprint {
    pub kind: FingerprintKind,
    pub value: String,
}

impl Fingerprint {
    pub fn new(kind: FingerprintKind, value: impl Into<String>) -> Self {
        Self {
            kind,
            value: value.into(),
        }
    }
}

/// A set of fingerprints keyed by kind.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fingerprints(Vec<Fingerprint>);

impl Fingerprints {
    pub fn new(fingerprints: Vec<Fingerprint>) -> Self {
        let mut set = Fingerprints::default();
        for fp in fingerprints {
            set.set(fp);
        }
        set
    }

    pub fn get(&self, kind: &FingerprintKind) -> Option<&str> {
        self.0
            .iter()
            .find(|fp| &fp.kind == kind)
            .map(|fp| fp.value.as_str())
    }

    /// Inserts or replaces the value for the fingerprint's kind.
    pub fn set(&mut self, fingerprint: Fingerprint) {
        match self.0.iter_mut().find(|fp| fp.kind == fingerprint.kind) {
            Some(existing) => existing.value = fingerprint.value,
            None => self.0.push(fingerprint),
        }
    }

    /// Applies every fingerprint in `other` on top of this set, keeping kinds
    /// that `other` does not mention.
    pub fn merge(&mut self, other: &Fingerprints) {
        for fp in &other.0 {
            self.set(fp.clone());
        }
    }

    pub fn remove(&mut self, kind: &FingerprintKind) {
        self.0.retain(|fp| &fp.kind != kind);
    }

    /// True if any fingerprint in this set is absent from `existing` or has a
    /// different value there.
    pub fn contents_changed(&self, existing: &Fingerprints) -> bool {
        self.0
            .iter()
            .any(|fp| existing.get(&fp.kind) != Some(fp.value.as_str()))
    }

    pub fn iter(&self) -> impl Iterator<Item = &Fingerprint> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl FromIterator<Fingerprint> for Fingerprints {
    fn from_iter<I: IntoIterator<Item = Fingerprint>>(iter: I) -> Self {
        Fingerprints::new(iter.into_iter().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn oshash(value: &str) -> Fingerprint {
        Fingerprint::new(FingerprintKind::Oshash, value)
    }

    fn md5(value: &str) -> Fingerprint {
        Fingerprint::new(FingerprintKind::Md5, value)
    }

    #[test]
    fn set_replaces_same_kind() {
        let mut set = Fingerprints::default();
        set.set(oshash("aa"));
        set.set(oshash("bb"));
        assert_eq!(set.len(), 1);
        assert_eq!(set.get(&FingerprintKind::Oshash), Some("bb"));
    }

    #[test]
    fn merge_keeps_unmentioned_kinds() {
        let mut stored = Fingerprints::new(vec![oshash("aa"), md5("cc")]);
        stored.merge(&Fingerprints::new(vec![oshash("bb")]));
        assert_eq!(stored.get(&FingerprintKind::Oshash), Some("bb"));
        assert_eq!(stored.get(&FingerprintKind::Md5), Some("cc"));
    }

    #[test]
    fn contents_changed_ignores_extra_existing_kinds() {
        let fresh = Fingerprints::new(vec![oshash("aa")]);
        let stored = Fingerprints::new(vec![oshash("aa"), md5("cc")]);
        assert!(!fresh.contents_changed(&stored));
        assert!(stored.contents_changed(&fresh));
    }

    #[test]
    fn kind_round_trips_through_db_names() {
        for kind in [
            FingerprintKind::Oshash,
            FingerprintKind::Md5,
            FingerprintKind::Phash,
            FingerprintKind::Other("blockhash".to_string()),
        ] {
            assert_eq!(FingerprintKind::from_db(kind.as_str()), kind);
        }
    }
}
