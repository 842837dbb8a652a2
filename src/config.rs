//! 설정 파일과 사용자 환경설정
//!
//! `SorterConfig`는 YAML 파일에서 읽고, 파일이 없으면 기본값을 씁니다.
//! 자동 분류 규칙과 보기 설정은 `Preferences`로 JSON에 저장됩니다.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tokio::time::Duration;

use crate::mirror::projection::ViewQuery;
use crate::reconcile::autosort::AutoSortRule;
use crate::reconcile::coordinator::CoordinatorSettings;

pub const DEFAULT_SERVER_URL: &str = "http://localhost:3000";
pub const DEFAULT_EVENTS_ADDR: &str = "127.0.0.1:3001";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid config {path}: {source}")]
    Yaml {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },
    #[error("invalid preferences {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("invalid config: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SorterConfig {
    pub server_url: String,
    /// Line-delimited JSON notification stream.
    pub events_addr: String,
    pub safety_net_delay_ms: u64,
    pub max_reconcile_retries: u32,
    /// How long a name that left the unsorted area stays suspect when it
    /// shows up there again.
    pub arrival_echo_window_ms: u64,
    pub log_capacity: usize,
    pub preferences_path: Option<PathBuf>,
}

impl Default for SorterConfig {
    fn default() -> Self {
        Self {
            server_url: DEFAULT_SERVER_URL.to_string(),
            events_addr: DEFAULT_EVENTS_ADDR.to_string(),
            safety_net_delay_ms: 500,
            max_reconcile_retries: 3,
            arrival_echo_window_ms: 5000,
            log_capacity: crate::logging::DEFAULT_MAX_LOG_LINES,
            preferences_path: None,
        }
    }
}

impl SorterConfig {
    /// 설정 파일을 읽습니다. 파일이 없으면 기본값을 반환합니다.
    pub async fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = match tokio::fs::read_to_string(path).await {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "no config file, using defaults");
                return Ok(Self::default());
            }
            Err(source) => {
                return Err(ConfigError::Io {
                    path: path.to_path_buf(),
                    source,
                })
            }
        };
        Self::from_yaml(&text).map_err(|e| match e {
            ConfigError::Yaml { source, .. } => ConfigError::Yaml {
                path: path.to_path_buf(),
                source,
            },
            other => other,
        })
    }

    pub fn from_yaml(text: &str) -> Result<Self, ConfigError> {
        // 빈 파일은 기본값
        if text.trim().is_empty() {
            return Ok(Self::default());
        }
        let config: Self = serde_yaml::from_str(text).map_err(|source| ConfigError::Yaml {
            path: PathBuf::new(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.server_url.trim().is_empty() {
            return Err(ConfigError::Invalid("server_url cannot be empty".into()));
        }
        if self.safety_net_delay_ms == 0 {
            return Err(ConfigError::Invalid("safety_net_delay_ms must be positive".into()));
        }
        // 이동 확인보다 늦게 도착하는 알림도 걸러야 함
        if self.arrival_echo_window_ms < self.safety_net_delay_ms {
            return Err(ConfigError::Invalid(
                "arrival_echo_window_ms cannot be shorter than safety_net_delay_ms".into(),
            ));
        }
        Ok(())
    }

    pub fn coordinator_settings(&self) -> CoordinatorSettings {
        CoordinatorSettings {
            safety_net_delay: Duration::from_millis(self.safety_net_delay_ms),
            max_reconcile_retries: self.max_reconcile_retries,
            arrival_echo_window: Duration::from_millis(self.arrival_echo_window_ms),
        }
    }
}

/// Client-local state that survives restarts.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Preferences {
    pub auto_sort_rules: Vec<AutoSortRule>,
    pub view_query: ViewQuery,
}

impl Preferences {
    /// A missing file yields empty preferences.
    pub async fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = match tokio::fs::read_to_string(path).await {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Self::default()),
            Err(source) => {
                return Err(ConfigError::Io {
                    path: path.to_path_buf(),
                    source,
                })
            }
        };
        serde_json::from_str(&text).map_err(|source| ConfigError::Json {
            path: path.to_path_buf(),
            source,
        })
    }

    pub async fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let io_error = |source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        };
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await.map_err(io_error)?;
        }
        let json = serde_json::to_string_pretty(self).map_err(|source| ConfigError::Json {
            path: path.to_path_buf(),
            source,
        })?;
        tokio::fs::write(path, json).await.map_err(io_error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mirror::projection::{SortKey, TypeFilter};
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_missing_config_uses_defaults() {
        let dir = TempDir::new().unwrap();
        let config = SorterConfig::load(&dir.path().join("sorter.yaml")).await.unwrap();
        assert_eq!(config, SorterConfig::default());
        assert_eq!(config.coordinator_settings().safety_net_delay, Duration::from_millis(500));
        assert_eq!(config.coordinator_settings().arrival_echo_window, Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_partial_yaml_keeps_other_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("sorter.yaml");
        tokio::fs::write(&path, "server_url: http://media.local:8080\nmax_reconcile_retries: 5\n")
            .await
            .unwrap();

        let config = SorterConfig::load(&path).await.unwrap();
        assert_eq!(config.server_url, "http://media.local:8080");
        assert_eq!(config.max_reconcile_retries, 5);
        assert_eq!(config.safety_net_delay_ms, 500);
        assert_eq!(config.events_addr, DEFAULT_EVENTS_ADDR);
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        assert!(matches!(
            SorterConfig::from_yaml("safety_net_delay_ms: 0"),
            Err(ConfigError::Invalid(_))
        ));
        assert!(matches!(
            SorterConfig::from_yaml("arrival_echo_window_ms: 100"),
            Err(ConfigError::Invalid(_))
        ));
        assert!(matches!(
            SorterConfig::from_yaml("log_capacity: [1, 2]"),
            Err(ConfigError::Yaml { .. })
        ));
        assert_eq!(SorterConfig::from_yaml("").unwrap(), SorterConfig::default());
    }

    #[tokio::test]
    async fn test_preferences_roundtrip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("prefs.json");

        assert_eq!(Preferences::load(&path).await.unwrap(), Preferences::default());

        let prefs = Preferences {
            auto_sort_rules: vec![AutoSortRule::new("game", "Games")],
            view_query: ViewQuery {
                filter_text: "beach".into(),
                filter_type: TypeFilter::Video,
                sort_key: SortKey::SizeDesc,
            },
        };
        prefs.save(&path).await.unwrap();
        assert_eq!(Preferences::load(&path).await.unwrap(), prefs);

        let text = tokio::fs::read_to_string(&path).await.unwrap();
        assert!(text.contains("autoSortRules"));
    }

    #[tokio::test]
    async fn test_corrupt_preferences_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("prefs.json");
        tokio::fs::write(&path, "{not json").await.unwrap();
        assert!(matches!(Preferences::load(&path).await, Err(ConfigError::Json { .. })));
    }
}
