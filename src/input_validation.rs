//! Input validation for names typed by the user
//!
//! Category, subfolder and file names end up as single path segments on the
//! server, so anything that could escape that segment is rejected here.

use anyhow::{bail, Result};

use crate::mirror::types::UNSORTED_SENTINEL;

const MAX_NAME_LENGTH: usize = 255;

/// Shared rules for every name that becomes one path segment.
fn validate_segment(kind: &str, name: &str) -> Result<()> {
    let trimmed = name.trim();

    if trimmed.is_empty() {
        bail!("{} cannot be empty", kind);
    }

    if trimmed.len() > MAX_NAME_LENGTH {
        bail!(
            "{} too long: {} bytes (max: {})",
            kind,
            trimmed.len(),
            MAX_NAME_LENGTH
        );
    }

    if trimmed.contains('/') || trimmed.contains('\\') {
        bail!("{} cannot contain path separators: '{}'", kind, trimmed);
    }

    if trimmed == "." || trimmed.contains("..") {
        bail!("{} contains path traversal: '{}'", kind, trimmed);
    }

    if trimmed.chars().any(char::is_control) {
        bail!("{} contains control characters", kind);
    }

    Ok(())
}

/// Validate a category name. `download` names the unsorted area on the wire.
pub fn validate_category_name(name: &str) -> Result<()> {
    validate_segment("Category name", name)?;
    if name.trim().eq_ignore_ascii_case(UNSORTED_SENTINEL) {
        bail!("'{}' is reserved for the unsorted area", name.trim());
    }
    Ok(())
}

pub fn validate_subfolder_name(name: &str) -> Result<()> {
    validate_segment("Folder name", name)
}

pub fn validate_file_name(name: &str) -> Result<()> {
    validate_segment("File name", name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_category_name() {
        assert!(validate_category_name("Trips").is_ok());
        assert!(validate_category_name("  Family 2024 ").is_ok());
        assert!(validate_category_name("게임").is_ok());

        assert!(validate_category_name("").is_err());
        assert!(validate_category_name("   ").is_err());
        assert!(validate_category_name("a/b").is_err());
        assert!(validate_category_name("..").is_err());
        assert!(validate_category_name("bad\0name").is_err());
        assert!(validate_category_name(&"x".repeat(256)).is_err());
    }

    #[test]
    fn test_unsorted_sentinel_is_reserved() {
        assert!(validate_category_name("download").is_err());
        assert!(validate_category_name("Download").is_err());
        assert!(validate_file_name("download").is_ok());
    }

    #[test]
    fn test_validate_file_name() {
        assert!(validate_file_name("beach.jpg").is_ok());
        assert!(validate_file_name("sunset").is_ok());
        assert!(validate_file_name("..\\evil.jpg").is_err());
        assert!(validate_file_name("line\nbreak.jpg").is_err());
        assert!(validate_subfolder_name("2024").is_ok());
    }
}
