//! 서버 푸시 알림 채널
//!
//! 서버가 보내는 이벤트를 타입이 있는 `Notification`으로 변환하여
//! 세션 하나의 핸들러에게 도착 순서대로 전달합니다.

use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_stream::wrappers::LinesStream;
use tokio_stream::StreamExt;
use tokio_util::sync::CancellationToken;

use crate::mirror::types::{Location, LocationParseError, UNSORTED_SENTINEL};

/// A file appeared in the unsorted area.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileAdded {
    pub name: String,
    pub size: u64,
    pub modified_at: DateTime<Utc>,
}

/// A file changed location. Only `confirmed` events may change the Mirror.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileMoved {
    pub name: String,
    pub from: Location,
    pub to: Location,
    pub confirmed: bool,
}

impl FileMoved {
    pub fn confirmed(name: impl Into<String>, from: Location, to: Location) -> Self {
        Self {
            name: name.into(),
            from,
            to,
            confirmed: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notification {
    FileAdded(FileAdded),
    FileMoved(FileMoved),
    FolderRecreated { message: String },
    FolderCreated { message: String },
}

#[derive(Debug, thiserror::Error)]
pub enum NotificationError {
    #[error("malformed notification frame: {0}")]
    Malformed(#[from] serde_json::Error),
    #[error("notification names an invalid location: {0}")]
    BadLocation(#[from] LocationParseError),
}

#[derive(Debug, Deserialize)]
#[serde(tag = "event", content = "data")]
enum WireEvent {
    #[serde(rename = "newFileDetected")]
    NewFileDetected(WireNewFile),
    #[serde(rename = "fileMoved")]
    FileMoved(WireFileMoved),
    #[serde(rename = "downloadFolderRecreated")]
    DownloadFolderRecreated(WireFolderMessage),
    #[serde(rename = "downloadFolderCreated")]
    DownloadFolderCreated(WireFolderMessage),
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireNewFile {
    file_name: String,
    #[serde(default)]
    size: Option<u64>,
    #[serde(default)]
    modified: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireFileMoved {
    file_name: String,
    #[serde(default)]
    from: Option<String>,
    category: String,
    #[serde(default)]
    success: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct WireFolderMessage {
    #[serde(default)]
    message: String,
}

impl Notification {
    /// Parses one `{"event": ..., "data": ...}` frame.
    ///
    /// `fileMoved` without `from` originates in the unsorted area. Anything
    /// other than a literal `success: true` is unconfirmed.
    pub fn from_frame(frame: &str) -> Result<Self, NotificationError> {
        let event: WireEvent = serde_json::from_str(frame)?;
        let notification = match event {
            WireEvent::NewFileDetected(data) => Notification::FileAdded(FileAdded {
                name: data.file_name,
                size: data.size.unwrap_or(0),
                modified_at: data.modified.unwrap_or_else(Utc::now),
            }),
            WireEvent::FileMoved(data) => {
                let from = data.from.as_deref().unwrap_or(UNSORTED_SENTINEL).parse::<Location>()?;
                let to = data.category.parse::<Location>()?;
                Notification::FileMoved(FileMoved {
                    name: data.file_name,
                    from,
                    to,
                    confirmed: matches!(data.success, Some(Value::Bool(true))),
                })
            }
            WireEvent::DownloadFolderRecreated(data) => Notification::FolderRecreated { message: data.message },
            WireEvent::DownloadFolderCreated(data) => Notification::FolderCreated { message: data.message },
        };
        Ok(notification)
    }
}

/// Producer half, held by transports (and by the in-memory store).
#[derive(Debug, Clone)]
pub struct NotificationSender {
    tx: mpsc::UnboundedSender<Notification>,
}

impl NotificationSender {
    /// Returns false once the session side has gone away.
    pub fn send(&self, notification: Notification) -> bool {
        self.tx.send(notification).is_ok()
    }

    pub fn send_frame(&self, frame: &str) -> Result<bool, NotificationError> {
        Ok(self.send(Notification::from_frame(frame)?))
    }
}

/// Consumer half, owned by exactly one session.
#[derive(Debug)]
pub struct NotificationChannel {
    rx: mpsc::UnboundedReceiver<Notification>,
}

impl NotificationChannel {
    pub async fn recv(&mut self) -> Option<Notification> {
        self.rx.recv().await
    }

    pub fn try_recv(&mut self) -> Option<Notification> {
        self.rx.try_recv().ok()
    }
}

pub fn channel() -> (NotificationSender, NotificationChannel) {
    let (tx, rx) = mpsc::unbounded_channel();
    (NotificationSender { tx }, NotificationChannel { rx })
}

/// Reads newline-delimited frames from `reader` until EOF, cancellation, or the
/// session dropping its channel. Malformed frames are logged and skipped.
pub fn spawn_line_reader<R>(reader: R, sender: NotificationSender, token: CancellationToken) -> JoinHandle<()>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut lines = LinesStream::new(BufReader::new(reader).lines());
        loop {
            let line = tokio::select! {
                _ = token.cancelled() => break,
                line = lines.next() => line,
            };

            match line {
                Some(Ok(line)) => {
                    let frame = line.trim();
                    if frame.is_empty() {
                        continue;
                    }
                    match sender.send_frame(frame) {
                        Ok(true) => {}
                        Ok(false) => break,
                        Err(e) => tracing::warn!(error = %e, "dropping notification frame"),
                    }
                }
                Some(Err(e)) => {
                    tracing::warn!(error = %e, "notification stream failed");
                    break;
                }
                None => {
                    tracing::info!("notification stream closed");
                    break;
                }
            }
        }
    })
}

/// Connects to a newline-delimited JSON relay over TCP.
pub async fn connect_tcp(
    addr: &str,
    sender: NotificationSender,
    token: CancellationToken,
) -> std::io::Result<JoinHandle<()>> {
    let stream = tokio::net::TcpStream::connect(addr).await?;
    tracing::info!(%addr, "notification stream connected");
    Ok(spawn_line_reader(stream, sender, token))
}
