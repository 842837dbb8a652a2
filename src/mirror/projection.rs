//! Filtered and sorted view over a file listing.
//!
//! The projection is recomputed from its source on every read so it can never
//! drift from the Mirror.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::str::FromStr;

use super::types::{FileEntry, MediaType};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TypeFilter {
    #[default]
    All,
    Image,
    Video,
}

impl TypeFilter {
    fn accepts(self, media_type: MediaType) -> bool {
        match self {
            TypeFilter::All => true,
            TypeFilter::Image => media_type == MediaType::Image,
            TypeFilter::Video => media_type == MediaType::Video,
        }
    }
}

impl FromStr for TypeFilter {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "all" => Ok(TypeFilter::All),
            "image" => Ok(TypeFilter::Image),
            "video" => Ok(TypeFilter::Video),
            other => Err(format!("unknown type filter '{other}' (expected all, image or video)")),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SortKey {
    #[default]
    Name,
    DateDesc,
    DateAsc,
    SizeDesc,
}

impl FromStr for SortKey {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "name" => Ok(SortKey::Name),
            "date-desc" | "date" => Ok(SortKey::DateDesc),
            "date-asc" | "date-old" => Ok(SortKey::DateAsc),
            "size-desc" | "size" => Ok(SortKey::SizeDesc),
            other => Err(format!(
                "unknown sort key '{other}' (expected name, date-desc, date-asc or size-desc)"
            )),
        }
    }
}

/// Filter text, type filter and sort key applied to the unsorted listing.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ViewQuery {
    #[serde(default)]
    pub filter_text: String,
    #[serde(default)]
    pub filter_type: TypeFilter,
    #[serde(default)]
    pub sort_key: SortKey,
}

impl ViewQuery {
    pub fn is_filtered(&self) -> bool {
        !self.filter_text.trim().is_empty() || self.filter_type != TypeFilter::All
    }
}

fn compare_names(a: &str, b: &str) -> Ordering {
    alphanumeric_sort::compare_str(a.to_lowercase(), b.to_lowercase())
}

/// Applies `query` to `files` and returns the visible entries in display order.
pub fn project<'a, I>(files: I, query: &ViewQuery) -> Vec<FileEntry>
where
    I: IntoIterator<Item = &'a FileEntry>,
{
    let needle = query.filter_text.trim().to_lowercase();

    let mut visible: Vec<FileEntry> = files
        .into_iter()
        .filter(|file| needle.is_empty() || file.name.to_lowercase().contains(&needle))
        .filter(|file| query.filter_type.accepts(file.media_type))
        .cloned()
        .collect();

    visible.sort_by(|a, b| {
        let primary = match query.sort_key {
            SortKey::Name => Ordering::Equal,
            SortKey::DateDesc => b.modified_at.cmp(&a.modified_at),
            SortKey::DateAsc => a.modified_at.cmp(&b.modified_at),
            SortKey::SizeDesc => b.size.cmp(&a.size),
        };
        primary.then_with(|| compare_names(&a.name, &b.name))
    });

    visible
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn entry(name: &str, size: u64, day: u32) -> FileEntry {
        FileEntry::detected(name, size, Utc.with_ymd_and_hms(2025, 8, day, 12, 0, 0).unwrap())
    }

    fn names(files: &[FileEntry]) -> Vec<&str> {
        files.iter().map(|f| f.name.as_str()).collect()
    }

    fn sample() -> Vec<FileEntry> {
        vec![
            entry("img_10.jpg", 300, 3),
            entry("IMG_2.jpg", 100, 1),
            entry("beach.mp4", 900, 2),
            entry("Alpha.png", 50, 4),
        ]
    }

    #[test]
    fn test_name_sort_is_natural_and_case_insensitive() {
        let files = sample();
        let out = project(&files, &ViewQuery::default());
        assert_eq!(names(&out), vec!["Alpha.png", "beach.mp4", "IMG_2.jpg", "img_10.jpg"]);
    }

    #[test]
    fn test_date_and_size_sorts() {
        let files = sample();
        let mut query = ViewQuery {
            sort_key: SortKey::DateDesc,
            ..Default::default()
        };
        assert_eq!(names(&project(&files, &query)).first(), Some(&"Alpha.png"));

        query.sort_key = SortKey::DateAsc;
        assert_eq!(names(&project(&files, &query)).first(), Some(&"IMG_2.jpg"));

        query.sort_key = SortKey::SizeDesc;
        assert_eq!(names(&project(&files, &query)).first(), Some(&"beach.mp4"));
    }

    #[test]
    fn test_text_and_type_filters() {
        let files = sample();
        let query = ViewQuery {
            filter_text: "IMG".into(),
            filter_type: TypeFilter::Image,
            sort_key: SortKey::Name,
        };
        assert_eq!(names(&project(&files, &query)), vec!["IMG_2.jpg", "img_10.jpg"]);

        let videos = ViewQuery {
            filter_type: TypeFilter::Video,
            ..Default::default()
        };
        assert_eq!(names(&project(&files, &videos)), vec!["beach.mp4"]);
        assert!(videos.is_filtered());
    }

    #[test]
    fn test_parse_keys() {
        assert_eq!("date-desc".parse::<SortKey>(), Ok(SortKey::DateDesc));
        assert_eq!("size".parse::<SortKey>(), Ok(SortKey::SizeDesc));
        assert!("bogus".parse::<SortKey>().is_err());
        assert_eq!("video".parse::<TypeFilter>(), Ok(TypeFilter::Video));
    }
}
