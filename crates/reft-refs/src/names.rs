//! Reference name validation following git-style conventions.
//!
//! Valid reference names:
//! - Must be non-empty
//! - Must not contain control characters, whitespace, `~`, `^`, `:`, `?`, `*`, `[`, `\`
//! - Must not contain `..` (double dot) or `@{`, and must not be `@`
//! - Must not start or end with `/`, nor end with `.`
//! - Must not contain consecutive slashes (`//`)
//! - Components must not start with `.` or end with `.lock`
//!
//! Reftable itself stores arbitrary byte strings; these rules are applied
//! by callers that accept names from users.

use crate::error::{RefError, Result};
use crate::types::ReferenceUpdate;

/// Bytes that are forbidden anywhere in a reference name.
const FORBIDDEN_BYTES: &[u8] = b" ~^:?*[\\";

fn invalid(name: &[u8], reason: impl Into<String>) -> RefError {
    RefError::InvalidName {
        name: String::from_utf8_lossy(name).into_owned(),
        reason: reason.into(),
    }
}

/// Validate a full reference name such as `refs/heads/main`.
///
/// # Examples
///
/// ```
/// use reft_refs::names::validate_ref_name;
///
/// assert!(validate_ref_name(b"refs/heads/main").is_ok());
/// assert!(validate_ref_name(b"refs/tags/v1.0").is_ok());
/// assert!(validate_ref_name(b"").is_err());
/// assert!(validate_ref_name(b"refs/heads/bad..name").is_err());
/// ```
pub fn validate_ref_name(name: &[u8]) -> Result<()> {
    if name.is_empty() {
        return Err(invalid(name, "ref name must not be empty"));
    }

    if let Some(&b) = name.iter().find(|&&b| b < 0x20 || b == 0x7f) {
        return Err(invalid(name, format!("contains control character 0x{b:02x}")));
    }
    if let Some(&b) = name.iter().find(|&&b| FORBIDDEN_BYTES.contains(&b)) {
        return Err(invalid(
            name,
            format!("contains forbidden character: {:?}", b as char),
        ));
    }

    if contains(name, b"..") {
        return Err(invalid(name, "must not contain '..'"));
    }
    if contains(name, b"@{") {
        return Err(invalid(name, "must not contain '@{'"));
    }
    if name == b"@" {
        return Err(invalid(name, "must not be '@'"));
    }

    if name.starts_with(b"/") || name.ends_with(b"/") {
        return Err(invalid(name, "must not start or end with '/'"));
    }
    if name.ends_with(b".") {
        return Err(invalid(name, "must not end with '.'"));
    }
    if contains(name, b"//") {
        return Err(invalid(name, "must not contain consecutive slashes '//'"));
    }

    for component in name.split(|&b| b == b'/') {
        if component.starts_with(b".") {
            return Err(invalid(
                name,
                format!(
                    "component must not start with '.': {:?}",
                    String::from_utf8_lossy(component)
                ),
            ));
        }
        if component.ends_with(b".lock") {
            return Err(invalid(name, "component must not end with '.lock'"));
        }
    }

    Ok(())
}

/// Check that updates are sorted by name, strictly ascending.
///
/// Duplicate names are reported as out of order.
pub fn check_sorted(updates: &[ReferenceUpdate]) -> Result<()> {
    for pair in updates.windows(2) {
        if pair[0].name >= pair[1].name {
            return Err(RefError::Unsorted {
                previous: pair[0].name_lossy().into_owned(),
                name: pair[1].name_lossy().into_owned(),
            });
        }
    }
    Ok(())
}

fn contains(haystack: &[u8], needle: &[u8]) -> bool {
    haystack.windows(needle.len()).any(|w| w == needle)
}
