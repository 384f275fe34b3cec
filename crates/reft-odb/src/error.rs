use reft_types::{HashAlgorithm, ObjectId};

/// Errors from object database operations.
#[derive(Debug, thiserror::Error)]
pub enum OdbError {
    /// Attempted to record the null object id.
    #[error("cannot store object with null ID")]
    NullObjectId,

    /// A tag and its target were named with different hash algorithms.
    #[error("tag {tag} uses {tag_algo} but its target {target} uses {target_algo}")]
    AlgorithmMismatch {
        tag: ObjectId,
        tag_algo: HashAlgorithm,
        target: ObjectId,
        target_algo: HashAlgorithm,
    },

    /// A tag cannot point at itself.
    #[error("tag {0} points at itself")]
    SelfReferentialTag(ObjectId),
}

/// Result alias for object database operations.
pub type OdbResult<T> = Result<T, OdbError>;
