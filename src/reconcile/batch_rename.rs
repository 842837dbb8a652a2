use serde::{Deserialize, Serialize};

/// How a batch rename derives each new name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", tag = "kind")]
pub enum RenamePattern {
    Prefix { text: String },
    /// Inserted before the extension.
    Suffix { text: String },
    /// Every occurrence of `from` becomes `to`.
    Replace { from: String, to: String },
}

impl RenamePattern {
    pub fn apply(&self, file_name: &str) -> String {
        match self {
            RenamePattern::Prefix { text } => format!("{}{file_name}", text.trim()),
            RenamePattern::Suffix { text } => {
                let (stem, ext) = split_extension(file_name);
                format!("{stem}{}{ext}", text.trim())
            }
            RenamePattern::Replace { from, to } => {
                let from = from.trim();
                if from.is_empty() {
                    file_name.to_string()
                } else {
                    file_name.replace(from, to.trim())
                }
            }
        }
    }

    /// Patterns with no text would leave every name unchanged.
    pub fn is_empty(&self) -> bool {
        match self {
            RenamePattern::Prefix { text } | RenamePattern::Suffix { text } => text.trim().is_empty(),
            RenamePattern::Replace { from, .. } => from.trim().is_empty(),
        }
    }
}

/// Splits `name` into stem and `.ext`; names without a usable dot have no extension.
fn split_extension(name: &str) -> (&str, &str) {
    match name.rfind('.') {
        Some(index) if index > 0 && index + 1 < name.len() && !name[index + 1..].contains('/') => {
            name.split_at(index)
        }
        _ => (name, ""),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_patterns() {
        let prefix = RenamePattern::Prefix { text: "2024_".into() };
        assert_eq!(prefix.apply("beach.jpg"), "2024_beach.jpg");

        let suffix = RenamePattern::Suffix { text: "_edit".into() };
        assert_eq!(suffix.apply("beach.jpg"), "beach_edit.jpg");
        assert_eq!(suffix.apply("noext"), "noext_edit");

        let replace = RenamePattern::Replace {
            from: "IMG".into(),
            to: "trip".into(),
        };
        assert_eq!(replace.apply("IMG_1_IMG.jpg"), "trip_1_trip.jpg");
    }

    #[test]
    fn test_empty_patterns() {
        let replace = RenamePattern::Replace {
            from: " ".into(),
            to: "x".into(),
        };
        assert!(replace.is_empty());
        assert_eq!(replace.apply("a.jpg"), "a.jpg");
        assert!(RenamePattern::Prefix { text: "".into() }.is_empty());
    }
}
