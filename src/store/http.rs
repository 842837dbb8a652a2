//! HTTP binding of the remote store (`{server_url}/api/...`).

use reqwest::{Method, Response, StatusCode, Url};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::json;

use super::{RemoteStore, StoreError, StoreResult};
use crate::mirror::types::{Category, CategoryContents, FileEntry, FolderStatus};

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ErrorBody {
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    is_deleted_category: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RenameResponse {
    new_name: String,
}

#[derive(Debug, Clone)]
pub struct HttpStore {
    client: reqwest::Client,
    base: Url,
}

impl HttpStore {
    pub fn new(server_url: &str) -> StoreResult<Self> {
        let base = Url::parse(server_url)
            .map_err(|e| StoreError::InvalidRequest(format!("invalid server URL '{server_url}': {e}")))?;
        if base.cannot_be_a_base() {
            return Err(StoreError::InvalidRequest(format!(
                "server URL '{server_url}' cannot carry a path"
            )));
        }
        Ok(Self {
            client: reqwest::Client::new(),
            base,
        })
    }

    /// Builds `{base}/api/{segments...}` with each segment percent-encoded.
    fn endpoint(&self, segments: &[&str]) -> StoreResult<Url> {
        let mut url = self.base.clone();
        {
            let mut path = url
                .path_segments_mut()
                .map_err(|_| StoreError::InvalidRequest(format!("server URL '{}' cannot carry a path", self.base)))?;
            path.pop_if_empty().push("api").extend(segments);
        }
        Ok(url)
    }

    async fn request<B: Serialize>(&self, method: Method, segments: &[&str], body: Option<&B>) -> StoreResult<Response> {
        let url = self.endpoint(segments)?;
        tracing::debug!(%method, %url, "store request");
        let mut builder = self.client.request(method, url).header("Accept", "application/json");
        if let Some(body) = body {
            builder = builder.json(body);
        }
        let response = builder
            .send()
            .await
            .map_err(|e| StoreError::ServerError(format!("network error: {e}")))?;
        check_status(response).await
    }

    async fn get_json<T: DeserializeOwned>(&self, segments: &[&str]) -> StoreResult<T> {
        let response = self.request::<()>(Method::GET, segments, None).await?;
        response
            .json()
            .await
            .map_err(|e| StoreError::ServerError(format!("failed to parse response: {e}")))
    }

    async fn send(&self, method: Method, segments: &[&str], body: serde_json::Value) -> StoreResult<Response> {
        self.request(method, segments, Some(&body)).await
    }
}

/// Maps a non-success response onto the store's error kinds.
async fn check_status(response: Response) -> StoreResult<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body: ErrorBody = response.json().await.unwrap_or_default();
    let message = body.error.unwrap_or_else(|| status.to_string());
    Err(match status {
        StatusCode::NOT_FOUND => StoreError::NotFound(message),
        StatusCode::CONFLICT => StoreError::Conflict(message),
        StatusCode::BAD_REQUEST if body.is_deleted_category => StoreError::TargetDeleted(message),
        StatusCode::BAD_REQUEST => StoreError::InvalidRequest(message),
        _ => StoreError::ServerError(message),
    })
}

impl RemoteStore for HttpStore {
    async fn list_categories(&self) -> StoreResult<Vec<Category>> {
        self.get_json(&["categories"]).await
    }

    async fn list_unsorted(&self) -> StoreResult<Vec<FileEntry>> {
        self.get_json(&["downloads"]).await
    }

    async fn list_category_contents(&self, category: &str) -> StoreResult<CategoryContents> {
        self.get_json(&["categories", category, "files"]).await
    }

    async fn list_subfolder_contents(&self, category: &str, subfolder: &str) -> StoreResult<Vec<FileEntry>> {
        self.get_json(&["categories", category, "subfolders", subfolder, "files"])
            .await
    }

    async fn move_to_category(&self, file: &str, category: &str) -> StoreResult<()> {
        self.send(
            Method::POST,
            &["move-file"],
            json!({ "fileName": file, "category": category }),
        )
        .await?;
        Ok(())
    }

    async fn move_to_unsorted(&self, file: &str, from_category: &str) -> StoreResult<()> {
        self.send(
            Method::POST,
            &["move-to-download"],
            json!({ "fileName": file, "sourceCategory": from_category }),
        )
        .await?;
        Ok(())
    }

    async fn move_between_categories(&self, file: &str, from: &str, to: &str) -> StoreResult<()> {
        self.send(
            Method::POST,
            &["move-category-file"],
            json!({ "fileName": file, "sourceCategory": from, "targetCategory": to }),
        )
        .await?;
        Ok(())
    }

    async fn create_category(&self, name: &str) -> StoreResult<()> {
        self.send(Method::POST, &["categories"], json!({ "name": name }))
            .await?;
        Ok(())
    }

    async fn delete_category(&self, name: &str) -> StoreResult<()> {
        self.request::<()>(Method::DELETE, &["categories", name], None)
            .await?;
        Ok(())
    }

    async fn rename_category(&self, old: &str, new: &str) -> StoreResult<()> {
        self.send(Method::PUT, &["categories", old, "rename"], json!({ "newName": new }))
            .await?;
        Ok(())
    }

    async fn rename_file(&self, old: &str, new: &str) -> StoreResult<String> {
        let response = self
            .send(Method::PUT, &["downloads", old, "rename"], json!({ "newName": new }))
            .await?;
        match response.json::<RenameResponse>().await {
            Ok(body) => Ok(body.new_name),
            Err(e) => {
                tracing::warn!(error = %e, "rename response without newName, deriving it locally");
                Ok(super::final_file_name(old, new))
            }
        }
    }

    async fn rename_subfolder(&self, category: &str, old: &str, new: &str) -> StoreResult<()> {
        self.send(
            Method::PUT,
            &["categories", category, "subfolders", old, "rename"],
            json!({ "newName": new }),
        )
        .await?;
        Ok(())
    }

    async fn create_unsorted_folder(&self) -> StoreResult<()> {
        self.request::<()>(Method::POST, &["create-download-folder"], None)
            .await?;
        Ok(())
    }

    async fn folder_status(&self) -> StoreResult<FolderStatus> {
        self.get_json(&["folder-status"]).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_encodes_segments() {
        let store = HttpStore::new("http://localhost:3000").unwrap();
        let url = store.endpoint(&["categories", "My Trips/2024", "files"]).unwrap();
        assert_eq!(url.as_str(), "http://localhost:3000/api/categories/My%20Trips%2F2024/files");
    }

    #[test]
    fn test_endpoint_keeps_base_path() {
        let store = HttpStore::new("http://example.com/sorter/").unwrap();
        let url = store.endpoint(&["downloads"]).unwrap();
        assert_eq!(url.as_str(), "http://example.com/sorter/api/downloads");
    }

    #[test]
    fn test_rejects_bad_url() {
        assert!(matches!(
            HttpStore::new("not a url"),
            Err(StoreError::InvalidRequest(_))
        ));
        assert!(HttpStore::new("mailto:someone@example.com").is_err());
    }

    #[test]
    fn test_error_body_shape() {
        let body: ErrorBody =
            serde_json::from_str(r#"{"error":"deleted","isDeletedCategory":true}"#).unwrap();
        assert!(body.is_deleted_category);
        assert_eq!(body.error.as_deref(), Some("deleted"));
    }
}
