//! Binary log delivery channel.
//!
//! Connects to a local pump over a Unix stream socket and ships frames of
//! `u32` big-endian length followed by the payload.

use std::path::{Path, PathBuf};

use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tokio::net::UnixStream;
use tokio::sync::Mutex;

#[derive(Debug, Error)]
pub enum BinlogError {
    #[error("failed to connect binlog socket {}", path.display())]
    Connect {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to write binlog frame")]
    Write(#[source] std::io::Error),

    #[error("binlog frame of {0} bytes exceeds the frame limit")]
    TooLarge(usize),
}

/// Client side of the binlog socket.
#[derive(Debug)]
pub struct BinlogClient {
    path: PathBuf,
    stream: Mutex<UnixStream>,
}

impl BinlogClient {
    /// Connect to the pump listening at `path`.
    pub async fn connect(path: &Path) -> Result<Self, BinlogError> {
        let stream = UnixStream::connect(path)
            .await
            .map_err(|source| BinlogError::Connect {
                path: path.to_path_buf(),
                source,
            })?;
        tracing::info!(socket = %path.display(), "Binlog channel connected");
        Ok(Self {
            path: path.to_path_buf(),
            stream: Mutex::new(stream),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Write one frame. Concurrent writers never interleave.
    pub async fn write_binlog(&self, payload: &[u8]) -> Result<(), BinlogError> {
        let len = u32::try_from(payload.len()).map_err(|_| BinlogError::TooLarge(payload.len()))?;

        let mut stream = self.stream.lock().await;
        stream
            .write_all(&len.to_be_bytes())
            .await
            .map_err(BinlogError::Write)?;
        stream.write_all(payload).await.map_err(BinlogError::Write)?;
        stream.flush().await.map_err(BinlogError::Write)
    }
}

#[cfg(test)]
mod tests {
    use tokio::io::AsyncReadExt;
    use tokio::net::UnixListener;

    use super::*;

    #[tokio::test]
    async fn frames_are_length_prefixed() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pump.sock");
        let listener = UnixListener::bind(&path).unwrap();

        let client = BinlogClient::connect(&path).await.unwrap();
        assert_eq!(client.path(), path.as_path());
        let (mut server, _) = listener.accept().await.unwrap();

        client.write_binlog(b"commit 42").await.unwrap();
        client.write_binlog(b"").await.unwrap();

        let mut buf = vec![0u8; 4 + 9 + 4];
        server.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf[..4], &9u32.to_be_bytes());
        assert_eq!(&buf[4..13], b"commit 42");
        assert_eq!(&buf[13..], &0u32.to_be_bytes());
    }

    #[tokio::test]
    async fn missing_socket_fails_to_connect() {
        let dir = tempfile::tempdir().unwrap();
        let err = BinlogClient::connect(&dir.path().join("absent.sock"))
            .await
            .unwrap_err();
        assert!(matches!(err, BinlogError::Connect { .. }));
    }
}
