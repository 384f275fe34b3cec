use reft_types::ObjectId;
use serde::{Deserialize, Serialize};

/// Result of peeling an object id.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum PeelOutcome {
    /// The object is an annotated tag; carries the non-tag object it
    /// resolves to.
    Peeled(ObjectId),
    /// The object exists and is not a tag.
    NonTag,
    /// The reference is symbolic and has no object to peel.
    IsSymref,
    /// The object does not exist.
    Invalid,
    /// The object is a tag whose chain cannot be followed to a non-tag.
    Broken,
}

/// Resolves annotated tags to the object they point at.
///
/// Implementations must be deterministic for the lifetime of a write: the
/// same id must always peel to the same outcome.
pub trait Peeler {
    /// Peel `id`, reporting whether it is a tag and what it resolves to.
    fn peel(&self, id: &ObjectId) -> PeelOutcome;
}

impl<F> Peeler for F
where
    F: Fn(&ObjectId) -> PeelOutcome,
{
    fn peel(&self, id: &ObjectId) -> PeelOutcome {
        self(id)
    }
}

/// A peeler that reports every object as a non-tag.
///
/// Handy when the caller knows its refs point at commits only.
#[derive(Clone, Copy, Debug, Default)]
pub struct NonTagPeeler;

impl Peeler for NonTagPeeler {
    fn peel(&self, _id: &ObjectId) -> PeelOutcome {
        PeelOutcome::NonTag
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reft_types::HashAlgorithm;

    #[test]
    fn closures_are_peelers() {
        let target = ObjectId::hash(HashAlgorithm::Sha1, b"commit");
        let peeler = move |_: &ObjectId| PeelOutcome::Peeled(target);
        let id = ObjectId::hash(HashAlgorithm::Sha1, b"tag");
        assert_eq!(peeler.peel(&id), PeelOutcome::Peeled(target));
    }

    #[test]
    fn non_tag_peeler_never_peels() {
        let id = ObjectId::hash(HashAlgorithm::Sha256, b"anything");
        assert_eq!(NonTagPeeler.peel(&id), PeelOutcome::NonTag);
    }
}
