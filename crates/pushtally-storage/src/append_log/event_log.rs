//! File-backed event log implementation

use std::collections::BTreeMap;
use std::io::SeekFrom;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::fs::{File, OpenOptions};
use tokio::io::{AsyncReadExt, AsyncSeekExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::RwLock;
use tracing::{debug, info, instrument, warn};

use pushtally_core::{Event, EventLog, LogError, NewEvent, StreamPos};

/// Largest frame accepted during replay
const MAX_FRAME_LEN: usize = 1024 * 1024;

/// Configuration for the event log
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EventLogConfig {
    /// Directory holding the log file
    pub base_dir: PathBuf,
    /// Whether to sync writes to disk immediately
    pub sync_on_write: bool,
}

impl Default for EventLogConfig {
    fn default() -> Self {
        Self {
            base_dir: PathBuf::from("./data/logs"),
            sync_on_write: true,
        }
    }
}

impl EventLogConfig {
    /// Configuration rooted at `base_dir`
    pub fn with_base_dir(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
            ..Default::default()
        }
    }

    /// Path of the log file
    pub fn log_path(&self) -> PathBuf {
        self.base_dir.join("events.log")
    }
}

/// Append-only event log stored in a single file
pub struct FileEventLog {
    /// Configuration
    config: EventLogConfig,
    /// Path to the log file
    log_path: PathBuf,
    /// Write side; `None` once closed
    log_file: RwLock<Option<LogWriter>>,
    /// In-memory index: position -> file offset
    index: RwLock<BTreeMap<StreamPos, u64>>,
}

impl FileEventLog {
    /// Open the log, creating it if needed, and replay it to build the index
    #[instrument(skip_all, fields(base_dir = %config.base_dir.display()))]
    pub async fn open(config: EventLogConfig) -> Result<Self, LogError> {
        tokio::fs::create_dir_all(&config.base_dir).await?;
        let log_path = config.log_path();

        info!(path = %log_path.display(), "Opening event log");

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&log_path)
            .await?;

        let file_size = file.metadata().await?.len();
        let (index, valid_len) = replay(&log_path, file_size).await?;

        if valid_len < file_size {
            warn!(
                valid_len,
                file_size, "Discarding torn tail of event log"
            );
            file.set_len(valid_len).await?;
        }

        debug!(entries = index.len(), offset = valid_len, "Event log opened");

        Ok(Self {
            config,
            log_path,
            log_file: RwLock::new(Some(LogWriter {
                file,
                end: valid_len,
                torn: false,
            })),
            index: RwLock::new(index),
        })
    }

    /// Get the configuration
    pub fn config(&self) -> &EventLogConfig {
        &self.config
    }

    /// Number of events in the log
    pub async fn event_count(&self) -> usize {
        self.index.read().await.len()
    }

    /// Sync and close the log file
    ///
    /// Every later operation fails with [`LogError::Closed`].
    pub async fn close(&self) -> Result<(), LogError> {
        let mut file_guard = self.log_file.write().await;
        if let Some(writer) = file_guard.take() {
            writer.file.sync_all().await?;
        }
        Ok(())
    }

    /// Read the event stored at `offset`
    async fn read_at_offset(&self, offset: u64) -> Result<Event, LogError> {
        if self.log_file.read().await.is_none() {
            return Err(LogError::Closed);
        }

        // A separate handle keeps readers from moving the writer's cursor
        let mut file = File::open(&self.log_path).await?;
        file.seek(SeekFrom::Start(offset)).await?;

        let mut len_buf = [0u8; 4];
        file.read_exact(&mut len_buf).await?;
        let mut frame = vec![0u8; u32::from_be_bytes(len_buf) as usize];
        file.read_exact(&mut frame).await?;

        postcard::from_bytes(&frame).map_err(|e| LogError::Codec(e.to_string()))
    }

    async fn read_all_at(&self, offsets: Vec<u64>) -> Result<Vec<Event>, LogError> {
        let mut events = Vec::with_capacity(offsets.len());
        for offset in offsets {
            events.push(self.read_at_offset(offset).await?);
        }
        Ok(events)
    }
}

#[async_trait]
impl EventLog for FileEventLog {
    #[instrument(skip_all, fields(event_id = %event.event_id, room = %event.room))]
    async fn append(&self, event: NewEvent) -> Result<Event, LogError> {
        // Holding the write handle serialises appends
        let mut file_guard = self.log_file.write().await;
        let writer = file_guard.as_mut().ok_or(LogError::Closed)?;

        let position = self
            .index
            .read()
            .await
            .last_key_value()
            .map(|(&head, _)| head.next())
            .unwrap_or(StreamPos::new(1));
        let event = event.committed_at(position);

        let frame = postcard::to_allocvec(&event).map_err(|e| LogError::Codec(e.to_string()))?;
        let offset = writer.append_frame(&frame, self.config.sync_on_write).await?;

        self.index.write().await.insert(position, offset);
        debug!(position = %position, offset, "Appended event");
        Ok(event)
    }

    async fn range_scan(&self, from: StreamPos, to: StreamPos) -> Result<Vec<Event>, LogError> {
        if from > to {
            return Ok(Vec::new());
        }
        let offsets: Vec<u64> = self
            .index
            .read()
            .await
            .range(from..=to)
            .map(|(_, &offset)| offset)
            .collect();
        self.read_all_at(offsets).await
    }

    async fn min_position(&self) -> Result<Option<StreamPos>, LogError> {
        Ok(self.index.read().await.first_key_value().map(|(&p, _)| p))
    }

    async fn max_position(&self) -> Result<Option<StreamPos>, LogError> {
        Ok(self.index.read().await.last_key_value().map(|(&p, _)| p))
    }

    async fn last_at_or_before(&self, position: StreamPos) -> Result<Option<Event>, LogError> {
        let offset = self
            .index
            .read()
            .await
            .range(..=position)
            .next_back()
            .map(|(_, &offset)| offset);
        match offset {
            Some(offset) => self.read_at_offset(offset).await.map(Some),
            None => Ok(None),
        }
    }
}

/// Write side of the log
struct LogWriter {
    file: File,
    /// Length of the valid prefix; the next frame starts here
    end: u64,
    /// A failed append may have left bytes past `end`
    torn: bool,
}

impl LogWriter {
    /// Write one frame at the end of the valid prefix, returning its offset
    ///
    /// A failed write is cut back off the file so that later frames stay
    /// reachable on replay.
    async fn append_frame(&mut self, frame: &[u8], sync: bool) -> Result<u64, LogError> {
        self.discard_torn_tail().await?;

        let offset = self.end;
        self.file.seek(SeekFrom::Start(offset)).await?;
        let mut written = write_frame(&mut self.file, frame).await;
        if written.is_ok() && sync {
            written = self.file.sync_data().await;
        }

        if let Err(e) = written {
            self.torn = true;
            if let Err(truncate_err) = self.discard_torn_tail().await {
                warn!(
                    offset,
                    error = %truncate_err,
                    "Could not discard partial frame, retrying on next append"
                );
            }
            return Err(e.into());
        }

        self.end = offset + 4 + frame.len() as u64;
        Ok(offset)
    }

    async fn discard_torn_tail(&mut self) -> Result<(), LogError> {
        if self.torn {
            self.file.set_len(self.end).await?;
            self.torn = false;
            debug!(offset = self.end, "Discarded partial frame");
        }
        Ok(())
    }
}

/// Write a length-prefixed frame
async fn write_frame<W>(writer: &mut W, frame: &[u8]) -> std::io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    writer.write_all(&(frame.len() as u32).to_be_bytes()).await?;
    writer.write_all(frame).await
}

/// Replay the log file, returning the index and the length of its valid prefix
async fn replay(path: &Path, file_size: u64) -> Result<(BTreeMap<StreamPos, u64>, u64), LogError> {
    let mut index = BTreeMap::new();
    if file_size == 0 {
        return Ok((index, 0));
    }

    let mut reader = BufReader::new(File::open(path).await?);
    let mut offset = 0u64;

    while offset < file_size {
        let mut len_buf = [0u8; 4];
        if reader.read_exact(&mut len_buf).await.is_err() {
            warn!(offset, "Truncated frame header, stopping replay");
            break;
        }

        let frame_len = u32::from_be_bytes(len_buf) as usize;
        if frame_len == 0 || frame_len > MAX_FRAME_LEN {
            warn!(offset, len = frame_len, "Invalid frame length, stopping replay");
            break;
        }

        let mut frame = vec![0u8; frame_len];
        if reader.read_exact(&mut frame).await.is_err() {
            warn!(offset, "Truncated frame, stopping replay");
            break;
        }

        match postcard::from_bytes::<Event>(&frame) {
            Ok(event) => {
                index.insert(event.position, offset);
            }
            Err(e) => {
                warn!(offset, error = %e, "Undecodable frame, stopping replay");
                break;
            }
        }

        offset += 4 + frame_len as u64;
    }

    info!(entries = index.len(), "Replayed event log");
    Ok((index, offset))
}
