//! In-memory object database for tests and tools.
//!
//! [`InMemoryObjectDatabase`] records the kind of each known object and, for
//! annotated tags, the object the tag points at. It holds no content.

use std::collections::HashMap;
use std::sync::RwLock;

use reft_types::ObjectId;

use crate::error::{OdbError, OdbResult};
use crate::object::ObjectKind;
use crate::traits::{PeelOutcome, Peeler};

/// Tags nested deeper than this are reported as broken.
const MAX_TAG_DEPTH: usize = 64;

#[derive(Clone, Copy, Debug)]
struct Entry {
    kind: ObjectKind,
    target: Option<ObjectId>,
}

/// In-memory, HashMap-based object kind registry.
///
/// Entries sit behind a `RwLock` so one database can serve several readers.
#[derive(Debug)]
pub struct InMemoryObjectDatabase {
    objects: RwLock<HashMap<ObjectId, Entry>>,
}

impl InMemoryObjectDatabase {
    /// Create a new empty database.
    pub fn new() -> Self {
        Self {
            objects: RwLock::new(HashMap::new()),
        }
    }

    /// Record a non-tag object.
    ///
    /// Recording a [`ObjectKind::Tag`] through this method stores a tag with
    /// no target, which peels as broken.
    pub fn insert(&self, id: ObjectId, kind: ObjectKind) -> OdbResult<()> {
        if id.is_null() {
            return Err(OdbError::NullObjectId);
        }
        self.objects
            .write()
            .expect("lock poisoned")
            .insert(id, Entry { kind, target: None });
        Ok(())
    }

    /// Record an annotated tag pointing at `target`.
    ///
    /// The target does not need to be known yet; peeling fails as broken
    /// until it is.
    pub fn insert_tag(&self, tag: ObjectId, target: ObjectId) -> OdbResult<()> {
        if tag.is_null() || target.is_null() {
            return Err(OdbError::NullObjectId);
        }
        if tag == target {
            return Err(OdbError::SelfReferentialTag(tag));
        }
        if tag.algorithm() != target.algorithm() {
            return Err(OdbError::AlgorithmMismatch {
                tag,
                tag_algo: tag.algorithm(),
                target,
                target_algo: target.algorithm(),
            });
        }
        self.objects.write().expect("lock poisoned").insert(
            tag,
            Entry {
                kind: ObjectKind::Tag,
                target: Some(target),
            },
        );
        Ok(())
    }

    /// Kind of a known object.
    pub fn kind(&self, id: &ObjectId) -> Option<ObjectKind> {
        self.objects
            .read()
            .expect("lock poisoned")
            .get(id)
            .map(|e| e.kind)
    }

    /// Number of objects currently recorded.
    pub fn len(&self) -> usize {
        self.objects.read().expect("lock poisoned").len()
    }

    /// Returns `true` if nothing is recorded.
    pub fn is_empty(&self) -> bool {
        self.objects.read().expect("lock poisoned").is_empty()
    }
}

impl Default for InMemoryObjectDatabase {
    fn default() -> Self {
        Self::new()
    }
}

impl Peeler for InMemoryObjectDatabase {
    fn peel(&self, id: &ObjectId) -> PeelOutcome {
        let objects = self.objects.read().expect("lock poisoned");

        let Some(first) = objects.get(id) else {
            return PeelOutcome::Invalid;
        };
        if !first.kind.is_tag() {
            return PeelOutcome::NonTag;
        }

        let mut current = *first;
        for _ in 0..MAX_TAG_DEPTH {
            let Some(target) = current.target else {
                return PeelOutcome::Broken;
            };
            match objects.get(&target) {
                None => return PeelOutcome::Broken,
                Some(next) if next.kind.is_tag() => current = *next,
                Some(_) => return PeelOutcome::Peeled(target),
            }
        }
        tracing::debug!(%id, "tag chain exceeds {MAX_TAG_DEPTH} levels");
        PeelOutcome::Broken
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reft_types::HashAlgorithm;

    fn oid(name: &str) -> ObjectId {
        ObjectId::hash(HashAlgorithm::Sha1, name.as_bytes())
    }

    #[test]
    fn unknown_object_is_invalid() {
        let db = InMemoryObjectDatabase::new();
        assert_eq!(db.peel(&oid("missing")), PeelOutcome::Invalid);
    }

    #[test]
    fn commit_is_non_tag() {
        let db = InMemoryObjectDatabase::new();
        db.insert(oid("c1"), ObjectKind::Commit).unwrap();
        assert_eq!(db.peel(&oid("c1")), PeelOutcome::NonTag);
        assert_eq!(db.kind(&oid("c1")), Some(ObjectKind::Commit));
    }

    #[test]
    fn tag_peels_to_target() {
        let db = InMemoryObjectDatabase::new();
        db.insert(oid("c1"), ObjectKind::Commit).unwrap();
        db.insert_tag(oid("t1"), oid("c1")).unwrap();
        assert_eq!(db.peel(&oid("t1")), PeelOutcome::Peeled(oid("c1")));
    }

    #[test]
    fn nested_tags_peel_to_innermost_non_tag() {
        let db = InMemoryObjectDatabase::new();
        db.insert(oid("tree"), ObjectKind::Tree).unwrap();
        db.insert_tag(oid("inner"), oid("tree")).unwrap();
        db.insert_tag(oid("outer"), oid("inner")).unwrap();
        assert_eq!(db.peel(&oid("outer")), PeelOutcome::Peeled(oid("tree")));
        assert_eq!(db.len(), 3);
    }

    #[test]
    fn dangling_tag_is_broken() {
        let db = InMemoryObjectDatabase::new();
        db.insert_tag(oid("t1"), oid("gone")).unwrap();
        assert_eq!(db.peel(&oid("t1")), PeelOutcome::Broken);
    }

    #[test]
    fn tag_cycle_is_broken() {
        let db = InMemoryObjectDatabase::new();
        db.insert_tag(oid("a"), oid("b")).unwrap();
        db.insert_tag(oid("b"), oid("a")).unwrap();
        assert_eq!(db.peel(&oid("a")), PeelOutcome::Broken);
    }

    #[test]
    fn rejects_null_and_mixed_algorithms() {
        let db = InMemoryObjectDatabase::new();
        assert!(matches!(
            db.insert(ObjectId::null(HashAlgorithm::Sha1), ObjectKind::Blob),
            Err(OdbError::NullObjectId)
        ));
        let tag = oid("t");
        let target = ObjectId::hash(HashAlgorithm::Sha256, b"c");
        assert!(matches!(
            db.insert_tag(tag, target),
            Err(OdbError::AlgorithmMismatch { .. })
        ));
        assert!(matches!(
            db.insert_tag(tag, tag),
            Err(OdbError::SelfReferentialTag(_))
        ));
        assert!(db.is_empty());
    }
}
