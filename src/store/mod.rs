//! Remote store client
//!
//! The server owns the file system. Every mutation here may or may not be
//! followed by a notification; callers must not assume the Mirror changed.

pub mod http;
#[cfg(any(test, feature = "memory-store"))]
pub mod memory;

use std::future::Future;
use std::sync::Arc;

use crate::error_codes;
use crate::mirror::types::{Category, CategoryContents, FileEntry, FolderStatus};

pub use http::HttpStore;
#[cfg(any(test, feature = "memory-store"))]
pub use memory::MemoryStore;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    #[error("not found: {0}")]
    NotFound(String),
    #[error("target category was deleted: {0}")]
    TargetDeleted(String),
    #[error("name already exists: {0}")]
    Conflict(String),
    #[error("request rejected: {0}")]
    InvalidRequest(String),
    #[error("server error: {0}")]
    ServerError(String),
}

impl StoreError {
    pub fn code(&self) -> &'static str {
        match self {
            StoreError::NotFound(_) => error_codes::ERR_NOT_FOUND,
            StoreError::TargetDeleted(_) => error_codes::ERR_TARGET_DELETED,
            StoreError::Conflict(_) => error_codes::ERR_CONFLICT,
            StoreError::InvalidRequest(_) => error_codes::ERR_INVALID_REQUEST,
            StoreError::ServerError(_) => error_codes::ERR_SERVER,
        }
    }
}

pub type StoreResult<T> = Result<T, StoreError>;

/// One async call per server operation.
pub trait RemoteStore: Send + Sync + 'static {
    fn list_categories(&self) -> impl Future<Output = StoreResult<Vec<Category>>> + Send;

    fn list_unsorted(&self) -> impl Future<Output = StoreResult<Vec<FileEntry>>> + Send;

    fn list_category_contents(&self, category: &str) -> impl Future<Output = StoreResult<CategoryContents>> + Send;

    fn list_subfolder_contents(
        &self,
        category: &str,
        subfolder: &str,
    ) -> impl Future<Output = StoreResult<Vec<FileEntry>>> + Send;

    fn move_to_category(&self, file: &str, category: &str) -> impl Future<Output = StoreResult<()>> + Send;

    fn move_to_unsorted(&self, file: &str, from_category: &str) -> impl Future<Output = StoreResult<()>> + Send;

    fn move_between_categories(
        &self,
        file: &str,
        from: &str,
        to: &str,
    ) -> impl Future<Output = StoreResult<()>> + Send;

    fn create_category(&self, name: &str) -> impl Future<Output = StoreResult<()>> + Send;

    fn delete_category(&self, name: &str) -> impl Future<Output = StoreResult<()>> + Send;

    fn rename_category(&self, old: &str, new: &str) -> impl Future<Output = StoreResult<()>> + Send;

    /// Renames a file in the unsorted area. Returns the final name; see
    /// [`final_file_name`].
    fn rename_file(&self, old: &str, new: &str) -> impl Future<Output = StoreResult<String>> + Send;

    fn rename_subfolder(
        &self,
        category: &str,
        old: &str,
        new: &str,
    ) -> impl Future<Output = StoreResult<()>> + Send;

    /// Recreates the unsorted folder on the server.
    fn create_unsorted_folder(&self) -> impl Future<Output = StoreResult<()>> + Send;

    fn folder_status(&self) -> impl Future<Output = StoreResult<FolderStatus>> + Send;
}

/// Shared stores, so tests can keep a handle on the authority a session uses.
impl<S: RemoteStore> RemoteStore for Arc<S> {
    fn list_categories(&self) -> impl Future<Output = StoreResult<Vec<Category>>> + Send {
        (**self).list_categories()
    }

    fn list_unsorted(&self) -> impl Future<Output = StoreResult<Vec<FileEntry>>> + Send {
        (**self).list_unsorted()
    }

    fn list_category_contents(&self, category: &str) -> impl Future<Output = StoreResult<CategoryContents>> + Send {
        (**self).list_category_contents(category)
    }

    fn list_subfolder_contents(
        &self,
        category: &str,
        subfolder: &str,
    ) -> impl Future<Output = StoreResult<Vec<FileEntry>>> + Send {
        (**self).list_subfolder_contents(category, subfolder)
    }

    fn move_to_category(&self, file: &str, category: &str) -> impl Future<Output = StoreResult<()>> + Send {
        (**self).move_to_category(file, category)
    }

    fn move_to_unsorted(&self, file: &str, from_category: &str) -> impl Future<Output = StoreResult<()>> + Send {
        (**self).move_to_unsorted(file, from_category)
    }

    fn move_between_categories(
        &self,
        file: &str,
        from: &str,
        to: &str,
    ) -> impl Future<Output = StoreResult<()>> + Send {
        (**self).move_between_categories(file, from, to)
    }

    fn create_category(&self, name: &str) -> impl Future<Output = StoreResult<()>> + Send {
        (**self).create_category(name)
    }

    fn delete_category(&self, name: &str) -> impl Future<Output = StoreResult<()>> + Send {
        (**self).delete_category(name)
    }

    fn rename_category(&self, old: &str, new: &str) -> impl Future<Output = StoreResult<()>> + Send {
        (**self).rename_category(old, new)
    }

    fn rename_file(&self, old: &str, new: &str) -> impl Future<Output = StoreResult<String>> + Send {
        (**self).rename_file(old, new)
    }

    fn rename_subfolder(
        &self,
        category: &str,
        old: &str,
        new: &str,
    ) -> impl Future<Output = StoreResult<()>> + Send {
        (**self).rename_subfolder(category, old, new)
    }

    fn create_unsorted_folder(&self) -> impl Future<Output = StoreResult<()>> + Send {
        (**self).create_unsorted_folder()
    }

    fn folder_status(&self) -> impl Future<Output = StoreResult<FolderStatus>> + Send {
        (**self).folder_status()
    }
}

/// Final file name after a rename: the original extension is appended unless
/// the requested name already ends with it.
pub fn final_file_name(old: &str, new: &str) -> String {
    let new = new.trim();
    let ext = match old.rfind('.') {
        Some(index) if index > 0 => &old[index..],
        _ => "",
    };
    if new.ends_with(ext) {
        new.to_string()
    } else {
        format!("{new}{ext}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_final_file_name_keeps_extension() {
        assert_eq!(final_file_name("beach.jpg", "sunset"), "sunset.jpg");
        assert_eq!(final_file_name("beach.jpg", "sunset.jpg"), "sunset.jpg");
        assert_eq!(final_file_name("beach.jpg", "sunset.png"), "sunset.png.jpg");
        assert_eq!(final_file_name("README", "notes"), "notes");
    }

    #[test]
    fn test_error_codes() {
        assert_eq!(StoreError::NotFound("a".into()).code(), error_codes::ERR_NOT_FOUND);
        assert_eq!(
            StoreError::TargetDeleted("Work".into()).code(),
            error_codes::ERR_TARGET_DELETED
        );
    }
}
