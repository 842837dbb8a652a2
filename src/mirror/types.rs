use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Wire name of the unsorted (download) area.
pub const UNSORTED_SENTINEL: &str = "download";

const IMAGE_EXTENSIONS: [&str; 5] = ["jpg", "jpeg", "png", "gif", "webp"];
const VIDEO_EXTENSIONS: [&str; 4] = ["mp4", "webm", "mov", "avi"];

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum MediaType {
    Image,
    Video,
}

impl MediaType {
    /// Classifies a file by extension. Anything that is neither a known image
    /// nor a known video extension is not media and yields `None`.
    pub fn from_file_name(name: &str) -> Option<Self> {
        let (_, ext) = name.rsplit_once('.')?;
        let ext = ext.to_ascii_lowercase();
        if IMAGE_EXTENSIONS.contains(&ext.as_str()) {
            Some(MediaType::Image)
        } else if VIDEO_EXTENSIONS.contains(&ext.as_str()) {
            Some(MediaType::Video)
        } else {
            None
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Category {
    pub name: String,
    pub file_count: u64,
}

/// Which of the server's media folders exist on disk.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default, rename_all = "camelCase")]
pub struct FolderStatus {
    pub base_folder: bool,
    /// The unsorted (download) folder.
    pub download_folder: bool,
    pub categories_folder: bool,
    pub categories: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FileEntry {
    pub name: String,
    pub size: u64,
    #[serde(rename = "modified")]
    pub modified_at: DateTime<Utc>,
    #[serde(rename = "type")]
    pub media_type: MediaType,
}

impl FileEntry {
    /// Builds an entry for a file known only by name and stat data, such as a
    /// freshly detected arrival. Non-media names fall back to `Image`.
    pub fn detected(name: impl Into<String>, size: u64, modified_at: DateTime<Utc>) -> Self {
        let name = name.into();
        let media_type = MediaType::from_file_name(&name).unwrap_or(MediaType::Image);
        Self {
            name,
            size,
            modified_at,
            media_type,
        }
    }

    pub fn with_name(&self, name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..self.clone()
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Subfolder {
    pub name: String,
    #[serde(default)]
    pub file_count: u64,
}

/// Files and subfolders directly inside one category.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct CategoryContents {
    #[serde(default)]
    pub files: Vec<FileEntry>,
    #[serde(default)]
    pub subfolders: Vec<Subfolder>,
}

impl CategoryContents {
    /// The figure the server reports as a category's `fileCount`: every
    /// directory entry, subfolders included.
    pub fn entry_count(&self) -> u64 {
        (self.files.len() + self.subfolders.len()) as u64
    }
}

/// Where a file lives. Every file maps to exactly one location.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Location {
    Unsorted,
    Category(String),
    Subfolder(String, String),
}

impl Location {
    pub fn category(name: impl Into<String>) -> Self {
        Location::Category(name.into())
    }

    pub fn subfolder(category: impl Into<String>, name: impl Into<String>) -> Self {
        Location::Subfolder(category.into(), name.into())
    }

    /// Category whose `file_count` this location contributes to directly.
    pub fn counted_category(&self) -> Option<&str> {
        match self {
            Location::Category(name) => Some(name),
            _ => None,
        }
    }

    /// Category this location belongs to, subfolders included.
    pub fn owning_category(&self) -> Option<&str> {
        match self {
            Location::Unsorted => None,
            Location::Category(name) | Location::Subfolder(name, _) => Some(name),
        }
    }

    /// Rewrites a reference to `old` category into `new`.
    pub fn retarget(&mut self, old: &str, new: &str) {
        match self {
            Location::Category(name) | Location::Subfolder(name, _) if name == old => {
                *name = new.to_string();
            }
            _ => {}
        }
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Location::Unsorted => f.write_str(UNSORTED_SENTINEL),
            Location::Category(name) => f.write_str(name),
            Location::Subfolder(category, name) => write!(f, "{category}/{name}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid location '{0}'")]
pub struct LocationParseError(pub String);

impl FromStr for Location {
    type Err = LocationParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if trimmed.is_empty() {
            return Err(LocationParseError(s.to_string()));
        }
        if trimmed == UNSORTED_SENTINEL || trimmed == "unsorted" {
            return Ok(Location::Unsorted);
        }
        match trimmed.split_once('/') {
            Some((category, sub)) if !category.is_empty() && !sub.is_empty() && !sub.contains('/') => {
                Ok(Location::subfolder(category, sub))
            }
            Some(_) => Err(LocationParseError(s.to_string())),
            None => Ok(Location::category(trimmed)),
        }
    }
}

impl TryFrom<String> for Location {
    type Error = LocationParseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Location> for String {
    fn from(value: Location) -> Self {
        value.to_string()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PendingKind {
    /// A user-visible move; its confirmation drives the structural change.
    Move,
    /// An internal hop of a rename; its confirmation is consumed silently.
    RenameStep,
}

/// An in-flight action awaiting its confirming notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingMove {
    pub file_name: String,
    pub from: Location,
    pub to: Location,
    pub issued_at: DateTime<Utc>,
    pub kind: PendingKind,
}

impl PendingMove {
    pub fn new(file_name: impl Into<String>, from: Location, to: Location, kind: PendingKind) -> Self {
        Self {
            file_name: file_name.into(),
            from,
            to,
            issued_at: Utc::now(),
            kind,
        }
    }

    /// Whether a confirmed move of `file_name` into `to` confirms this action.
    pub fn is_confirmed_by(&self, file_name: &str, to: &Location) -> bool {
        self.file_name == file_name && &self.to == to
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_media_type_from_extension() {
        assert_eq!(MediaType::from_file_name("a.JPG"), Some(MediaType::Image));
        assert_eq!(MediaType::from_file_name("clip.webm"), Some(MediaType::Video));
        assert_eq!(MediaType::from_file_name("notes.txt"), None);
        assert_eq!(MediaType::from_file_name("noext"), None);
    }

    #[test]
    fn test_location_parse_and_display() {
        assert_eq!("download".parse::<Location>().unwrap(), Location::Unsorted);
        assert_eq!("unsorted".parse::<Location>().unwrap(), Location::Unsorted);
        assert_eq!("Trips".parse::<Location>().unwrap(), Location::category("Trips"));
        assert_eq!(
            "Trips/2024".parse::<Location>().unwrap(),
            Location::subfolder("Trips", "2024")
        );
        assert!("".parse::<Location>().is_err());
        assert!("Trips/".parse::<Location>().is_err());
        assert!("a/b/c".parse::<Location>().is_err());

        assert_eq!(Location::Unsorted.to_string(), "download");
        assert_eq!(Location::subfolder("Trips", "2024").to_string(), "Trips/2024");
    }

    #[test]
    fn test_location_retarget() {
        let mut loc = Location::subfolder("Old", "x");
        loc.retarget("Old", "New");
        assert_eq!(loc, Location::subfolder("New", "x"));

        let mut other = Location::category("Keep");
        other.retarget("Old", "New");
        assert_eq!(other, Location::category("Keep"));
    }

    #[test]
    fn test_file_entry_wire_format() {
        let json = r#"{"name":"a.jpg","type":"image","size":12,"modified":"2025-08-28T10:00:00.000Z","path":"/media/a.jpg"}"#;
        let entry: FileEntry = serde_json::from_str(json).unwrap();
        assert_eq!(entry.name, "a.jpg");
        assert_eq!(entry.media_type, MediaType::Image);
        assert_eq!(entry.size, 12);
    }

    #[test]
    fn test_folder_status_wire_format() {
        let json = r#"{"baseFolder":true,"downloadFolder":false,"categoriesFolder":true,"categories":["Trips"]}"#;
        let status: FolderStatus = serde_json::from_str(json).unwrap();
        assert!(!status.download_folder);
        assert_eq!(status.categories, vec!["Trips"]);
    }

    #[test]
    fn test_pending_move_confirmation() {
        let pending = PendingMove::new("a.jpg", Location::Unsorted, Location::category("Trips"), PendingKind::Move);
        assert!(pending.is_confirmed_by("a.jpg", &Location::category("Trips")));
        assert!(!pending.is_confirmed_by("a.jpg", &Location::category("Work")));
        assert!(!pending.is_confirmed_by("b.jpg", &Location::category("Trips")));
    }
}
