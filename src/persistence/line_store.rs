//! Line-oriented file store
//!
//! One JSON record per line. Reads stream the file from the start and may
//! stop early; updates regenerate the whole file into a uniquely named
//! sibling and rename it over the original, so a reader or a crash only ever
//! sees the old file or the new one.

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};
use std::io;
use std::ops::ControlFlow;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::fs::{self, File, OpenOptions};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, BufWriter};
use tracing::{debug, warn};
use uuid::Uuid;

/// Field merged one level deep instead of being replaced
const DATA_FIELD: &str = "data";

/// Storage errors
#[derive(Error, Debug)]
pub enum StorageError {
    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// A line could not be parsed as a record
    #[error("Corrupt record at line {line}: {source}")]
    CorruptRecord {
        line: usize,
        #[source]
        source: serde_json::Error,
    },

    /// A record could not be serialized
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type StorageResult<T> = Result<T, StorageError>;

/// What a rewrite pass does with one record
#[derive(Debug, Clone, PartialEq)]
pub enum Rewrite {
    /// Copy the original line verbatim
    Keep,
    /// Count as changed, copy the original line verbatim
    Touch,
    /// Merge these fields onto the record
    Merge(Map<String, Value>),
    /// Leave the record out of the new file
    Delete,
}

/// Newline-delimited JSON file with scan and rewrite primitives
#[derive(Debug, Clone)]
pub struct LineStore {
    path: PathBuf,
    /// fsync after appends and before the rewrite rename
    sync_writes: bool,
}

impl LineStore {
    pub fn new(path: impl Into<PathBuf>, sync_writes: bool) -> Self {
        Self {
            path: path.into(),
            sync_writes,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Create parent directories and an empty file if they are missing
    pub async fn ensure_exists(&self) -> StorageResult<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).await?;
            }
        }
        OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;
        Ok(())
    }

    /// Append records with a single write
    ///
    /// Every record is encoded before the file is opened, so a serialization
    /// failure leaves the file untouched. A failed write is truncated back to
    /// the previous length, so the batch lands whole or not at all.
    pub async fn append<R: Serialize>(&self, records: &[R]) -> StorageResult<()> {
        if records.is_empty() {
            return Ok(());
        }
        let buf = encode_lines(records)?;

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;
        let original_len = file.metadata().await?.len();

        if let Err(e) = self.write_batch(&mut file, buf.as_bytes()).await {
            self.roll_back(&mut file, original_len).await;
            return Err(e.into());
        }

        debug!("Appended {} record(s) to {:?}", records.len(), self.path);
        Ok(())
    }

    async fn write_batch(&self, file: &mut File, buf: &[u8]) -> io::Result<()> {
        file.write_all(buf).await?;
        file.flush().await?;
        if self.sync_writes {
            file.sync_data().await?;
        }
        Ok(())
    }

    /// Cut a partially written batch off the end of the file
    async fn roll_back(&self, file: &mut File, len: u64) {
        let restored = match file.set_len(len).await {
            Ok(()) if self.sync_writes => file.sync_data().await,
            other => other,
        };
        match restored {
            Ok(()) => debug!("Rolled {:?} back to {} bytes after a failed append", self.path, len),
            Err(e) => warn!("Failed to roll back {:?} to {} bytes: {}", self.path, len, e),
        }
    }

    /// Return the first record matching `predicate`, reading no further
    pub async fn scan_find<R, P>(&self, mut predicate: P) -> StorageResult<Option<R>>
    where
        R: DeserializeOwned,
        P: FnMut(&R) -> bool,
    {
        let mut found = None;
        self.scan_collect(|record: R| {
            if predicate(&record) {
                found = Some(record);
                ControlFlow::Break(())
            } else {
                ControlFlow::Continue(())
            }
        })
        .await?;
        Ok(found)
    }

    /// Visit every record in file order until `visit` breaks
    ///
    /// A missing file is treated as empty.
    pub async fn scan_collect<R, F>(&self, mut visit: F) -> StorageResult<()>
    where
        R: DeserializeOwned,
        F: FnMut(R) -> ControlFlow<()>,
    {
        let Some(file) = self.open_for_read().await? else {
            return Ok(());
        };

        let mut lines = RawLines::new(file);
        while let Some((line_no, line)) = lines.next_line().await? {
            let record = parse_line(line, line_no)?;
            if visit(record).is_break() {
                break;
            }
        }
        Ok(())
    }

    /// Regenerate the file, applying `updater` to every record
    ///
    /// Returns whether any record was merged, touched or deleted. On error
    /// the temporary file is removed and the original is left as it was.
    pub async fn rewrite_all<F, E>(&self, mut updater: F) -> Result<bool, E>
    where
        F: FnMut(&Value) -> Result<Rewrite, E>,
        E: From<StorageError>,
    {
        let Some(source) = self.open_for_read().await.map_err(E::from)? else {
            return Ok(false);
        };

        let permissions = source.metadata().await.map_err(io_err)?.permissions();

        let temp_path = self.temp_path();
        let temp = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&temp_path)
            .await
            .map_err(io_err)?;

        // The rename must not reset the mode of the file it replaces
        let outcome = match temp.set_permissions(permissions).await {
            Ok(()) => self.write_rewrite(source, temp, &mut updater).await,
            Err(e) => Err(io_err(e)),
        };
        let outcome = match outcome {
            Ok(changed) => fs::rename(&temp_path, &self.path)
                .await
                .map(|_| changed)
                .map_err(io_err),
            Err(e) => Err(e),
        };

        if outcome.is_err() {
            if let Err(cleanup) = fs::remove_file(&temp_path).await {
                warn!("Failed to remove temporary file {:?}: {}", temp_path, cleanup);
            }
        }
        outcome
    }

    async fn write_rewrite<F, E>(&self, source: File, temp: File, updater: &mut F) -> Result<bool, E>
    where
        F: FnMut(&Value) -> Result<Rewrite, E>,
        E: From<StorageError>,
    {
        let mut writer = BufWriter::new(temp);
        let mut lines = RawLines::new(source);
        let mut changed = 0usize;
        let mut removed = 0usize;

        while let Some((line_no, line)) = lines.next_line().await.map_err(io_err)? {
            let mut record: Value = parse_line(line, line_no).map_err(E::from)?;

            let merged;
            let output = match updater(&record)? {
                Rewrite::Keep => Some(line),
                Rewrite::Touch => {
                    changed += 1;
                    Some(line)
                }
                Rewrite::Merge(fields) => {
                    changed += 1;
                    merge_record(&mut record, fields);
                    merged = serde_json::to_vec(&record)
                        .map_err(|e| E::from(StorageError::Serialization(e)))?;
                    Some(merged.as_slice())
                }
                Rewrite::Delete => {
                    removed += 1;
                    None
                }
            };

            if let Some(output) = output {
                writer.write_all(output).await.map_err(io_err)?;
                writer.write_all(b"\n").await.map_err(io_err)?;
            }
        }

        writer.flush().await.map_err(io_err)?;
        if self.sync_writes {
            writer
                .get_mut()
                .sync_all()
                .await
                .map_err(io_err)?;
        }

        debug!(
            "Rewrote {:?}: {} record(s) changed, {} removed",
            self.path, changed, removed
        );
        Ok(changed + removed > 0)
    }

    async fn open_for_read(&self) -> StorageResult<Option<File>> {
        match File::open(&self.path).await {
            Ok(file) => Ok(Some(file)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Unique sibling path so concurrent rewrites never share a temp file
    fn temp_path(&self) -> PathBuf {
        let name = self
            .path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "graph".to_string());
        self.path
            .with_file_name(format!(".{}.{}.tmp", name, Uuid::new_v4().simple()))
    }
}

/// Raw line reader over the backing file
///
/// Lines are handed out as bytes so that invalid UTF-8 fails JSON parsing
/// with a line number instead of surfacing as an I/O error. Blank lines are
/// skipped but still counted.
struct RawLines {
    reader: BufReader<File>,
    buf: Vec<u8>,
    line_no: usize,
}

impl RawLines {
    fn new(file: File) -> Self {
        Self {
            reader: BufReader::new(file),
            buf: Vec::new(),
            line_no: 0,
        }
    }

    /// Next non-blank line and its 1-based number, without the terminator
    async fn next_line(&mut self) -> io::Result<Option<(usize, &[u8])>> {
        loop {
            self.buf.clear();
            if self.reader.read_until(b'\n', &mut self.buf).await? == 0 {
                return Ok(None);
            }
            self.line_no += 1;

            let mut end = self.buf.len();
            if self.buf[..end].ends_with(b"\n") {
                end -= 1;
            }
            if self.buf[..end].ends_with(b"\r") {
                end -= 1;
            }
            if self.buf[..end].iter().all(u8::is_ascii_whitespace) {
                continue;
            }
            return Ok(Some((self.line_no, &self.buf[..end])));
        }
    }
}

fn encode_lines<R: Serialize>(records: &[R]) -> StorageResult<String> {
    let mut buf = String::new();
    for record in records {
        buf.push_str(&serde_json::to_string(record)?);
        buf.push('\n');
    }
    Ok(buf)
}

fn io_err<E: From<StorageError>>(e: io::Error) -> E {
    E::from(StorageError::Io(e))
}

fn parse_line<R: DeserializeOwned>(line: &[u8], line_no: usize) -> StorageResult<R> {
    serde_json::from_slice(line).map_err(|source| StorageError::CorruptRecord {
        line: line_no,
        source,
    })
}

/// Shallow merge, except `data` objects which merge one level deep
fn merge_record(record: &mut Value, fields: Map<String, Value>) {
    let Value::Object(target) = record else {
        *record = Value::Object(fields);
        return;
    };

    for (key, value) in fields {
        match (target.get_mut(&key), value) {
            (Some(Value::Object(existing)), Value::Object(patch)) if key == DATA_FIELD => {
                existing.extend(patch);
            }
            (_, value) => {
                target.insert(key, value);
            }
        }
    }
}
