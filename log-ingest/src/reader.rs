//! Log reader (C5): tails a rolling log file, locally or over FTP/SFTP,
//! resumable from a byte offset. All three backends share the same
//! `LogSource` surface; the difference is entirely in how bytes are
//! fetched.

use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use domain::error::{ErrorContext, SupervisorError};
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tokio::sync::mpsc;
use tokio::time;

/// Sink the reader pushes complete, newline-terminated (CR stripped)
/// lines into.
pub type LineSink = mpsc::Sender<String>;

#[async_trait]
pub trait LogSource: Send + Sync {
    async fn watch(&mut self, sink: LineSink) -> Result<(), SupervisorError>;
    async fn unwatch(&mut self) -> Result<(), SupervisorError>;
    fn is_watching(&self) -> bool;
}

fn already_watching() -> SupervisorError {
    SupervisorError::AlreadyWatching {
        source: "log reader".to_string(),
        context: ErrorContext::new(),
    }
}

fn not_watching() -> SupervisorError {
    SupervisorError::NotWatching {
        source: "log reader".to_string(),
        context: ErrorContext::new(),
    }
}

/// Splits a freshly-read chunk into complete lines plus a leftover
/// partial-line remainder, the way every backend below needs to.
fn split_lines(carry: &mut String, chunk: &str, sink: &LineSink) {
    carry.push_str(chunk);
    loop {
        let Some(pos) = carry.find('\n') else { break };
        let line: String = carry.drain(..=pos).collect();
        let line = line.trim_end_matches(['\n', '\r']);
        let _ = sink.try_send(line.to_string());
    }
}

const RETRY_BASE: Duration = Duration::from_millis(500);
const RETRY_MAX: Duration = Duration::from_secs(30);

fn next_retry_delay(attempt: u32) -> Duration {
    let scaled = RETRY_BASE.saturating_mul(1u32.checked_shl(attempt).unwrap_or(u32::MAX).max(1));
    scaled.min(RETRY_MAX)
}

/// Tails a file on the local filesystem. Detects rotation by inode
/// change or the file shrinking, and reopens from byte 0 when that
/// happens.
pub struct LocalTail {
    path: PathBuf,
    poll_interval: Duration,
    offset: u64,
    inode: Option<u64>,
    task: Option<tokio::task::JoinHandle<()>>,
}

impl LocalTail {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            poll_interval: Duration::from_millis(250),
            offset: 0,
            inode: None,
            task: None,
        }
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Resumes from a previously persisted `(inode, offset)` pair rather
    /// than starting at end-of-file.
    pub fn resume_from(mut self, inode: u64, offset: u64) -> Self {
        self.inode = Some(inode);
        self.offset = offset;
        self
    }
}

#[cfg(unix)]
fn file_inode(meta: &std::fs::Metadata) -> u64 {
    use std::os::unix::fs::MetadataExt;
    meta.ino()
}

#[cfg(not(unix))]
fn file_inode(_meta: &std::fs::Metadata) -> u64 {
    0
}

#[async_trait]
impl LogSource for LocalTail {
    async fn watch(&mut self, sink: LineSink) -> Result<(), SupervisorError> {
        if self.task.is_some() {
            return Err(already_watching());
        }
        let path = self.path.clone();
        let poll_interval = self.poll_interval;
        let mut offset = self.offset;
        let mut inode = self.inode;

        let handle = tokio::spawn(async move {
            let mut carry = String::new();
            let mut attempt = 0u32;
            loop {
                match tokio::fs::metadata(&path).await {
                    Ok(meta) => {
                        let current_inode = file_inode(&meta);
                        let rotated = inode.is_some_and(|i| i != current_inode) || meta.len() < offset;
                        if rotated {
                            tracing::info!(path = %path.display(), "log rotation detected, reopening from 0");
                            offset = 0;
                            carry.clear();
                        }
                        inode = Some(current_inode);

                        if meta.len() > offset {
                            match read_suffix(&path, offset).await {
                                Ok(bytes) => {
                                    offset += bytes.len() as u64;
                                    attempt = 0;
                                    split_lines(&mut carry, &String::from_utf8_lossy(&bytes), &sink);
                                }
                                Err(e) => {
                                    tracing::warn!(error = %e, "local log read failed, retrying");
                                    attempt += 1;
                                    time::sleep(next_retry_delay(attempt)).await;
                                    continue;
                                }
                            }
                        }
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, path = %path.display(), "local log stat failed, retrying");
                        attempt += 1;
                        time::sleep(next_retry_delay(attempt)).await;
                        continue;
                    }
                }
                time::sleep(poll_interval).await;
            }
        });
        self.task = Some(handle);
        Ok(())
    }

    async fn unwatch(&mut self) -> Result<(), SupervisorError> {
        match self.task.take() {
            Some(handle) => {
                handle.abort();
                Ok(())
            }
            None => Err(not_watching()),
        }
    }

    fn is_watching(&self) -> bool {
        self.task.is_some()
    }
}

async fn read_suffix(path: &PathBuf, offset: u64) -> std::io::Result<Vec<u8>> {
    let mut file = tokio::fs::File::open(path).await?;
    file.seek(std::io::SeekFrom::Start(offset)).await?;
    let mut buf = Vec::new();
    file.read_to_end(&mut buf).await?;
    Ok(buf)
}

/// Polls a remote file's size over FTP and downloads the suffix when it
/// grows; a shrink is treated as rotation (§4.5).
pub struct FtpTail {
    host: String,
    port: u16,
    username: String,
    password: String,
    remote_path: String,
    poll_interval: Duration,
    offset: u64,
    task: Option<tokio::task::JoinHandle<()>>,
}

impl FtpTail {
    pub fn new(host: impl Into<String>, port: u16, username: impl Into<String>, password: impl Into<String>, remote_path: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port,
            username: username.into(),
            password: password.into(),
            remote_path: remote_path.into(),
            poll_interval: Duration::from_secs(1),
            offset: 0,
            task: None,
        }
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }
}

#[async_trait]
impl LogSource for FtpTail {
    async fn watch(&mut self, sink: LineSink) -> Result<(), SupervisorError> {
        if self.task.is_some() {
            return Err(already_watching());
        }
        let host = self.host.clone();
        let port = self.port;
        let username = self.username.clone();
        let password = self.password.clone();
        let remote_path = self.remote_path.clone();
        let poll_interval = self.poll_interval;
        let mut offset = self.offset;

        let handle = tokio::spawn(async move {
            let mut carry = String::new();
            let mut attempt = 0u32;
            loop {
                match poll_ftp_once(&host, port, &username, &password, &remote_path, &mut offset, &mut carry, &sink).await {
                    Ok(()) => attempt = 0,
                    Err(e) => {
                        tracing::warn!(error = %e, host = %host, "ftp tail failed, retrying");
                        attempt += 1;
                        time::sleep(next_retry_delay(attempt)).await;
                        continue;
                    }
                }
                time::sleep(poll_interval).await;
            }
        });
        self.task = Some(handle);
        Ok(())
    }

    async fn unwatch(&mut self) -> Result<(), SupervisorError> {
        match self.task.take() {
            Some(handle) => {
                handle.abort();
                Ok(())
            }
            None => Err(not_watching()),
        }
    }

    fn is_watching(&self) -> bool {
        self.task.is_some()
    }
}

async fn poll_ftp_once(
    host: &str,
    port: u16,
    username: &str,
    password: &str,
    remote_path: &str,
    offset: &mut u64,
    carry: &mut String,
    sink: &LineSink,
) -> Result<(), SupervisorError> {
    use suppaftp::AsyncFtpStream;

    let mut ftp = AsyncFtpStream::connect((host, port))
        .await
        .map_err(|e| ftp_error(SupervisorError::ConnectionRefused { message: e.to_string(), context: ErrorContext::new() }))?;
    ftp.login(username, password)
        .await
        .map_err(|e| SupervisorError::AuthFailed { message: e.to_string(), context: ErrorContext::new() })?;

    let size = ftp.size(remote_path).await.map_err(|e| SupervisorError::ReadFailed {
        message: e.to_string(),
        context: ErrorContext::new(),
    })? as u64;

    if size < *offset {
        *offset = 0;
        carry.clear();
    }
    if size > *offset {
        let mut stream = ftp
            .retr_as_stream(remote_path)
            .await
            .map_err(|e| SupervisorError::ReadFailed { message: e.to_string(), context: ErrorContext::new() })?;
        let mut buf = Vec::new();
        stream
            .read_to_end(&mut buf)
            .await
            .map_err(|e| SupervisorError::ReadFailed { message: e.to_string(), context: ErrorContext::new() })?;
        let _ = ftp.finalize_retr_stream(stream).await;

        if (*offset as usize) < buf.len() {
            let suffix = &buf[*offset as usize..];
            split_lines(carry, &String::from_utf8_lossy(suffix), sink);
        }
        *offset = size;
    }
    let _ = ftp.quit().await;
    Ok(())
}

fn ftp_error(err: SupervisorError) -> SupervisorError {
    err
}

/// Tails a remote file over SFTP, identical in shape to [`FtpTail`] but
/// speaking SSH.
pub struct SftpTail {
    host: String,
    port: u16,
    username: String,
    password: String,
    remote_path: String,
    poll_interval: Duration,
    offset: u64,
    task: Option<tokio::task::JoinHandle<()>>,
}

impl SftpTail {
    pub fn new(host: impl Into<String>, port: u16, username: impl Into<String>, password: impl Into<String>, remote_path: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port,
            username: username.into(),
            password: password.into(),
            remote_path: remote_path.into(),
            poll_interval: Duration::from_secs(1),
            offset: 0,
            task: None,
        }
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }
}

struct SftpClientHandler;

#[async_trait]
impl russh::client::Handler for SftpClientHandler {
    type Error = russh::Error;

    async fn check_server_key(&mut self, _key: &russh::keys::PublicKey) -> Result<bool, Self::Error> {
        // The core only specifies the collaborator contract (§6); host-key
        // pinning is a configuration-loader concern out of scope here.
        Ok(true)
    }
}

#[async_trait]
impl LogSource for SftpTail {
    async fn watch(&mut self, sink: LineSink) -> Result<(), SupervisorError> {
        if self.task.is_some() {
            return Err(already_watching());
        }
        let host = self.host.clone();
        let port = self.port;
        let username = self.username.clone();
        let password = self.password.clone();
        let remote_path = self.remote_path.clone();
        let poll_interval = self.poll_interval;
        let mut offset = self.offset;

        let handle = tokio::spawn(async move {
            let mut carry = String::new();
            let mut attempt = 0u32;
            loop {
                match poll_sftp_once(&host, port, &username, &password, &remote_path, &mut offset, &mut carry, &sink).await {
                    Ok(()) => attempt = 0,
                    Err(e) => {
                        tracing::warn!(error = %e, host = %host, "sftp tail failed, retrying");
                        attempt += 1;
                        time::sleep(next_retry_delay(attempt)).await;
                        continue;
                    }
                }
                time::sleep(poll_interval).await;
            }
        });
        self.task = Some(handle);
        Ok(())
    }

    async fn unwatch(&mut self) -> Result<(), SupervisorError> {
        match self.task.take() {
            Some(handle) => {
                handle.abort();
                Ok(())
            }
            None => Err(not_watching()),
        }
    }

    fn is_watching(&self) -> bool {
        self.task.is_some()
    }
}

async fn poll_sftp_once(
    host: &str,
    port: u16,
    username: &str,
    password: &str,
    remote_path: &str,
    offset: &mut u64,
    carry: &mut String,
    sink: &LineSink,
) -> Result<(), SupervisorError> {
    use russh::client::{self, Config};
    use russh_sftp::client::SftpSession;

    let config = std::sync::Arc::new(Config::default());
    let mut session = client::connect(config, (host, port), SftpClientHandler)
        .await
        .map_err(|e| SupervisorError::ConnectionRefused { message: e.to_string(), context: ErrorContext::new() })?;

    let authenticated = session
        .authenticate_password(username, password)
        .await
        .map_err(|e| SupervisorError::AuthFailed { message: e.to_string(), context: ErrorContext::new() })?;
    if !authenticated {
        return Err(SupervisorError::AuthFailed {
            message: "sftp password rejected".to_string(),
            context: ErrorContext::new(),
        });
    }

    let channel = session
        .channel_open_session()
        .await
        .map_err(|e| SupervisorError::ConnectionReset { message: e.to_string(), context: ErrorContext::new() })?;
    channel
        .request_subsystem(true, "sftp")
        .await
        .map_err(|e| SupervisorError::ConnectionReset { message: e.to_string(), context: ErrorContext::new() })?;
    let sftp = SftpSession::new(channel.into_stream())
        .await
        .map_err(|e| SupervisorError::ConnectionReset { message: e.to_string(), context: ErrorContext::new() })?;

    let metadata = sftp
        .metadata(remote_path)
        .await
        .map_err(|e| SupervisorError::ReadFailed { message: e.to_string(), context: ErrorContext::new() })?;
    let size = metadata.size.unwrap_or(0);

    if size < *offset {
        *offset = 0;
        carry.clear();
    }
    if size > *offset {
        use russh_sftp::protocol::OpenFlags;
        use tokio::io::AsyncReadExt as _;

        let mut file = sftp
            .open_with_flags(remote_path, OpenFlags::READ)
            .await
            .map_err(|e| SupervisorError::ReadFailed { message: e.to_string(), context: ErrorContext::new() })?;
        file.seek(std::io::SeekFrom::Start(*offset))
            .await
            .map_err(|e| SupervisorError::ReadFailed { message: e.to_string(), context: ErrorContext::new() })?;
        let mut buf = Vec::new();
        file.read_to_end(&mut buf)
            .await
            .map_err(|e| SupervisorError::ReadFailed { message: e.to_string(), context: ErrorContext::new() })?;
        *offset += buf.len() as u64;
        split_lines(carry, &String::from_utf8_lossy(&buf), sink);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tokio::sync::mpsc;

    #[tokio::test]
    async fn local_tail_emits_lines_written_after_watch_starts() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("server.log");
        std::fs::write(&path, "").unwrap();

        let (tx, mut rx) = mpsc::channel(16);
        let mut tail = LocalTail::new(&path).with_poll_interval(Duration::from_millis(20));
        tail.watch(tx).await.unwrap();

        {
            let mut file = std::fs::OpenOptions::new().append(true).open(&path).unwrap();
            writeln!(file, "hello").unwrap();
            writeln!(file, "world").unwrap();
        }

        let first = time::timeout(Duration::from_secs(2), rx.recv()).await.unwrap().unwrap();
        let second = time::timeout(Duration::from_secs(2), rx.recv()).await.unwrap().unwrap();
        assert_eq!(first, "hello");
        assert_eq!(second, "world");

        tail.unwatch().await.unwrap();
    }

    #[tokio::test]
    async fn double_watch_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("server.log");
        std::fs::write(&path, "").unwrap();
        let (tx, _rx) = mpsc::channel(16);
        let mut tail = LocalTail::new(&path);
        tail.watch(tx.clone()).await.unwrap();
        assert!(matches!(tail.watch(tx).await, Err(SupervisorError::AlreadyWatching { .. })));
        tail.unwatch().await.unwrap();
    }

    #[tokio::test]
    async fn unwatch_without_watch_is_rejected() {
        let mut tail = LocalTail::new("/nonexistent");
        assert!(matches!(tail.unwatch().await, Err(SupervisorError::NotWatching { .. })));
    }
}
