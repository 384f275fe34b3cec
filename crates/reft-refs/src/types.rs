//! The reference update stored by each reftable record.

use std::borrow::Cow;

use reft_types::ObjectId;
use serde::{Deserialize, Serialize};

/// The new state of one reference.
///
/// `new_oid` is `None` for a deletion. `peeled` is only meaningful for
/// annotated tags: a reader fills it in from a two-id record; a writer
/// ignores it and asks its peeler instead.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReferenceUpdate {
    /// Full reference name, compared byte-wise.
    pub name: Vec<u8>,
    /// Object the reference now points at.
    pub new_oid: Option<ObjectId>,
    /// Non-tag object an annotated tag resolves to.
    pub peeled: Option<ObjectId>,
    /// Caller-assigned, monotonically increasing version number.
    pub update_index: u64,
}

impl ReferenceUpdate {
    /// A reference pointing at `oid`.
    pub fn new(name: impl Into<Vec<u8>>, oid: ObjectId) -> Self {
        Self {
            name: name.into(),
            new_oid: Some(oid),
            peeled: None,
            update_index: 0,
        }
    }

    /// A deletion of `name`.
    pub fn deletion(name: impl Into<Vec<u8>>) -> Self {
        Self {
            name: name.into(),
            new_oid: None,
            peeled: None,
            update_index: 0,
        }
    }

    pub fn with_update_index(mut self, update_index: u64) -> Self {
        self.update_index = update_index;
        self
    }

    pub fn with_peeled(mut self, peeled: ObjectId) -> Self {
        self.peeled = Some(peeled);
        self
    }

    /// Whether the update carries a new value (false for deletions).
    pub fn has_new(&self) -> bool {
        self.new_oid.is_some()
    }

    /// Whether the peeled target of an annotated tag is known.
    pub fn knows_peeled(&self) -> bool {
        self.peeled.is_some()
    }

    pub fn is_deletion(&self) -> bool {
        self.new_oid.is_none()
    }

    /// The name as text, replacing invalid UTF-8.
    pub fn name_lossy(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reft_types::HashAlgorithm;

    #[test]
    fn new_has_value() {
        let oid = ObjectId::hash(HashAlgorithm::Sha1, b"c");
        let update = ReferenceUpdate::new("refs/heads/main", oid).with_update_index(7);
        assert!(update.has_new());
        assert!(!update.knows_peeled());
        assert!(!update.is_deletion());
        assert_eq!(update.update_index, 7);
        assert_eq!(update.name_lossy(), "refs/heads/main");
    }

    #[test]
    fn deletion_has_no_value() {
        let update = ReferenceUpdate::deletion("refs/heads/gone");
        assert!(!update.has_new());
        assert!(update.is_deletion());
        assert_eq!(update.new_oid, None);
    }

    #[test]
    fn peeled_is_recorded() {
        let tag = ObjectId::hash(HashAlgorithm::Sha1, b"tag");
        let commit = ObjectId::hash(HashAlgorithm::Sha1, b"commit");
        let update = ReferenceUpdate::new("refs/tags/v1", tag).with_peeled(commit);
        assert!(update.knows_peeled());
        assert_eq!(update.peeled, Some(commit));
    }

    #[test]
    fn serde_roundtrip() {
        let id = ObjectId::hash(HashAlgorithm::Sha256, b"t");
        let update = ReferenceUpdate::new("refs/tags/v1", id).with_update_index(3);
        let json = serde_json::to_string(&update).unwrap();
        let parsed: ReferenceUpdate = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, update);
    }
}
