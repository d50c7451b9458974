use crate::domain::ports::BusAdapter;
use crate::error::{BridgeError, Result};
use crate::interfaces::bus::frame;
use async_trait::async_trait;
use std::path::Path;
use tokio::fs::OpenOptions;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::process::Command;
use tokio::sync::Mutex;
use tracing::{debug, info, trace};

type BoxedReader = Box<dyn AsyncRead + Send + Unpin>;
type BoxedWriter = Box<dyn AsyncWrite + Send + Unpin>;

/// A newline-delimited bus over any byte stream, e.g. the Qibixx MDB USB interface.
///
/// Reads and writes are each serialized behind their own lock, so the read loop and command
/// writers can share one adapter.
pub struct LineAdapter {
    reader: Mutex<BufReader<BoxedReader>>,
    writer: Mutex<BoxedWriter>,
}

impl LineAdapter {
    pub fn new<R, W>(reader: R, writer: W) -> Self
    where
        R: AsyncRead + Send + Unpin + 'static,
        W: AsyncWrite + Send + Unpin + 'static,
    {
        let reader: BoxedReader = Box::new(reader);
        Self {
            reader: Mutex::new(BufReader::new(reader)),
            writer: Mutex::new(Box::new(writer)),
        }
    }

    /// Opens a serial device and puts the line into raw mode at `baud_rate`.
    pub async fn open(path: &Path, baud_rate: u32) -> Result<Self> {
        configure_line(path, baud_rate).await?;

        let device = OpenOptions::new()
            .read(true)
            .write(true)
            .open(path)
            .await
            .map_err(|e| BridgeError::TransportError(format!("{}: {e}", path.display())))?;
        let writer = device.try_clone().await?;
        info!(path = %path.display(), baud_rate, "bus device opened");
        Ok(Self::new(device, writer))
    }
}

async fn configure_line(path: &Path, baud_rate: u32) -> Result<()> {
    let status = Command::new("stty")
        .arg("-F")
        .arg(path)
        .arg(baud_rate.to_string())
        .args(["raw", "-echo"])
        .status()
        .await?;
    if !status.success() {
        return Err(BridgeError::TransportError(format!(
            "failed to configure {} at {baud_rate} baud",
            path.display()
        )));
    }
    Ok(())
}

#[async_trait]
impl BusAdapter for LineAdapter {
    async fn read(&self) -> Result<Option<Vec<String>>> {
        let mut reader = self.reader.lock().await;
        let mut buf = Vec::new();
        loop {
            buf.clear();
            if reader.read_until(b'\n', &mut buf).await? == 0 {
                return Ok(None);
            }
            // line noise must not take the bus down
            let line = String::from_utf8_lossy(&buf);
            debug!(line = %line.trim_end(), "read");
            match frame::decode(&line) {
                Some(tokens) => return Ok(Some(tokens)),
                None => trace!("skipping line from other sender"),
            }
        }
    }

    async fn write(&self, payload: &str) -> Result<()> {
        let mut writer = self.writer.lock().await;
        writer
            .write_all(frame::encode(payload).as_bytes())
            .await
            .map_err(|e| BridgeError::TransportError(e.to_string()))?;
        writer
            .flush()
            .await
            .map_err(|e| BridgeError::TransportError(e.to_string()))
    }
}
