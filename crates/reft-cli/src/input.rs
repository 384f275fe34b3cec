//! Packed-refs style ref listings.
//!
//! ```text
//! # comment
//! <hex-oid> <refname>
//! ^<hex-oid>            peeled target of the ref above, which is a tag
//! ```
//!
//! A null object id marks a deletion.

use anyhow::{bail, Context};
use reft_odb::{InMemoryObjectDatabase, ObjectKind};
use reft_refs::{validate_ref_name, ReferenceUpdate};
use reft_types::{HashAlgorithm, ObjectId};

/// Updates parsed from a listing, sorted by name, plus the object kinds the
/// listing implies.
#[derive(Debug)]
pub struct ParsedRefs {
    pub updates: Vec<ReferenceUpdate>,
    pub objects: InMemoryObjectDatabase,
    /// Hash of the listed ids, if any id was listed.
    pub hash: Option<HashAlgorithm>,
}

pub fn parse_packed_refs(text: &str, update_index: u64) -> anyhow::Result<ParsedRefs> {
    let objects = InMemoryObjectDatabase::new();
    let mut updates: Vec<ReferenceUpdate> = Vec::new();
    let mut hash = None;

    for (number, line) in text.lines().enumerate() {
        let number = number + 1;
        let line = line.trim_end();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        if let Some(peeled_hex) = line.strip_prefix('^') {
            let peeled = parse_id(peeled_hex, &mut hash)
                .with_context(|| format!("line {number}: bad peeled id"))?;
            let Some(tag) = updates.last().and_then(|u| u.new_oid) else {
                bail!("line {number}: peeled id without a preceding ref");
            };
            if objects.kind(&peeled).is_none() {
                objects.insert(peeled, ObjectKind::Commit)?;
            }
            objects
                .insert_tag(tag, peeled)
                .with_context(|| format!("line {number}"))?;
            continue;
        }

        let Some((oid_hex, name)) = line.split_once(' ') else {
            bail!("line {number}: expected '<oid> <refname>'");
        };
        validate_ref_name(name.as_bytes()).with_context(|| format!("line {number}"))?;
        let oid = parse_id(oid_hex, &mut hash).with_context(|| format!("line {number}: bad id"))?;

        let update = if oid.is_null() {
            ReferenceUpdate::deletion(name)
        } else {
            if objects.kind(&oid).is_none() {
                objects.insert(oid, ObjectKind::Commit)?;
            }
            ReferenceUpdate::new(name, oid)
        };
        updates.push(update.with_update_index(update_index));
    }

    updates.sort_by(|a, b| a.name.cmp(&b.name));
    if let Some(pair) = updates.windows(2).find(|pair| pair[0].name == pair[1].name) {
        bail!("ref {} listed more than once", pair[0].name_lossy());
    }

    Ok(ParsedRefs {
        updates,
        objects,
        hash,
    })
}

/// Parse an id, requiring every id in the listing to use the same hash.
fn parse_id(hex: &str, hash: &mut Option<HashAlgorithm>) -> anyhow::Result<ObjectId> {
    let hex = hex.trim();
    match *hash {
        Some(expected) => ObjectId::from_hex_with(expected, hex)
            .with_context(|| format!("expected a {expected} id in this listing")),
        None => {
            let id = ObjectId::from_hex(hex)?;
            *hash = Some(id.algorithm());
            Ok(id)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reft_odb::{PeelOutcome, Peeler};

    const COMMIT: &str = "1111111111111111111111111111111111111111";
    const TAG: &str = "2222222222222222222222222222222222222222";
    const NULL: &str = "0000000000000000000000000000000000000000";

    #[test]
    fn parses_and_sorts_refs() {
        let text = format!(
            "# pack-refs\n{COMMIT} refs/heads/topic\n{COMMIT} refs/heads/main\n\n\
             {NULL} refs/heads/old\n"
        );
        let parsed = parse_packed_refs(&text, 7).unwrap();
        let names: Vec<_> = parsed.updates.iter().map(|u| u.name_lossy().into_owned()).collect();
        assert_eq!(names, ["refs/heads/main", "refs/heads/old", "refs/heads/topic"]);
        assert!(parsed.updates[1].is_deletion());
        assert!(parsed.updates.iter().all(|u| u.update_index == 7));
        assert_eq!(parsed.hash, Some(HashAlgorithm::Sha1));
    }

    #[test]
    fn peeled_line_marks_tag() {
        let text = format!("{TAG} refs/tags/v1\n^{COMMIT}\n");
        let parsed = parse_packed_refs(&text, 1).unwrap();
        let tag = ObjectId::from_hex(TAG).unwrap();
        let commit = ObjectId::from_hex(COMMIT).unwrap();
        assert_eq!(parsed.objects.kind(&tag), Some(ObjectKind::Tag));
        assert_eq!(parsed.objects.peel(&tag), PeelOutcome::Peeled(commit));
    }

    #[test]
    fn peeled_line_needs_a_ref() {
        let err = parse_packed_refs(&format!("^{COMMIT}\n"), 1).unwrap_err();
        assert!(err.to_string().contains("line 1"));
        let err = parse_packed_refs(&format!("{NULL} refs/heads/x\n^{COMMIT}\n"), 1).unwrap_err();
        assert!(err.to_string().contains("line 2"));
    }

    #[test]
    fn rejects_bad_lines() {
        assert!(parse_packed_refs("not-a-ref-line\n", 1).is_err());
        assert!(parse_packed_refs(&format!("{COMMIT} refs/heads/bad..name\n"), 1).is_err());
        assert!(parse_packed_refs("zz refs/heads/main\n", 1).is_err());
    }

    #[test]
    fn rejects_duplicates() {
        let text = format!("{COMMIT} refs/heads/main\n{TAG} refs/heads/main\n");
        let err = parse_packed_refs(&text, 1).unwrap_err();
        assert!(err.to_string().contains("more than once"));
    }

    #[test]
    fn rejects_mixed_hashes() {
        let sha256 = "3".repeat(64);
        let text = format!("{COMMIT} refs/heads/a\n{sha256} refs/heads/b\n");
        assert!(parse_packed_refs(&text, 1).is_err());
    }

    #[test]
    fn empty_listing_has_no_hash() {
        let parsed = parse_packed_refs("# nothing\n", 1).unwrap();
        assert!(parsed.updates.is_empty());
        assert_eq!(parsed.hash, None);
    }
}
