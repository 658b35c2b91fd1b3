//! TFRecord container reader and writer.
//!
//! Each record on disk is framed as:
//!
//! ```text
//! u64  length        (little endian)
//! u32  masked_crc32c(length bytes)
//! [u8] data
//! u32  masked_crc32c(data)
//! ```

use std::fs::File;
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use prost::Message;

use super::example::Example;
use super::TrainingRecord;
use crate::error::RecordprepError;

const MASK_DELTA: u32 = 0xa282_ead8;

/// Destination for finished training records.
pub trait RecordSink {
    fn write_record(&mut self, record: &TrainingRecord) -> Result<(), RecordprepError>;
}

/// In-memory sink, mostly useful in tests.
impl RecordSink for Vec<TrainingRecord> {
    fn write_record(&mut self, record: &TrainingRecord) -> Result<(), RecordprepError> {
        self.push(record.clone());
        Ok(())
    }
}

fn masked_crc32c(data: &[u8]) -> u32 {
    crc32c::crc32c(data).rotate_right(15).wrapping_add(MASK_DELTA)
}

/// Writes `tf.train.Example` payloads in TFRecord framing.
pub struct TfRecordWriter<W: Write> {
    writer: W,
    path: PathBuf,
    count: usize,
}

impl TfRecordWriter<BufWriter<File>> {
    /// Creates (or truncates) a TFRecord file.
    pub fn create(path: &Path) -> Result<Self, RecordprepError> {
        let file = File::create(path).map_err(RecordprepError::Io)?;
        Ok(Self::new(BufWriter::new(file), path))
    }
}

impl<W: Write> TfRecordWriter<W> {
    /// Wraps an existing writer. `path` is only used in error messages.
    pub fn new(writer: W, path: impl Into<PathBuf>) -> Self {
        Self {
            writer,
            path: path.into(),
            count: 0,
        }
    }

    /// Number of records written so far.
    pub fn count(&self) -> usize {
        self.count
    }

    /// Frames and writes one raw payload.
    pub fn write_payload(&mut self, data: &[u8]) -> Result<(), RecordprepError> {
        let len = (data.len() as u64).to_le_bytes();
        self.write_frame(&len, data).map_err(|source| RecordprepError::RecordWrite {
            path: self.path.clone(),
            message: source.to_string(),
        })?;
        self.count += 1;
        Ok(())
    }

    /// Flushes and returns the inner writer.
    pub fn finish(mut self) -> Result<W, RecordprepError> {
        self.writer.flush().map_err(|source| RecordprepError::RecordWrite {
            path: self.path.clone(),
            message: source.to_string(),
        })?;
        Ok(self.writer)
    }

    fn write_frame(&mut self, len: &[u8; 8], data: &[u8]) -> io::Result<()> {
        self.writer.write_all(len)?;
        self.writer.write_all(&masked_crc32c(len).to_le_bytes())?;
        self.writer.write_all(data)?;
        self.writer.write_all(&masked_crc32c(data).to_le_bytes())
    }
}

impl<W: Write> RecordSink for TfRecordWriter<W> {
    fn write_record(&mut self, record: &TrainingRecord) -> Result<(), RecordprepError> {
        let payload = record.to_example().encode_to_vec();
        self.write_payload(&payload)
    }
}

/// Iterates over the payloads of a TFRecord stream, checking both CRCs.
pub struct TfRecordReader<R: Read> {
    reader: R,
    path: PathBuf,
    done: bool,
}

impl TfRecordReader<BufReader<File>> {
    pub fn open(path: &Path) -> Result<Self, RecordprepError> {
        let file = File::open(path).map_err(RecordprepError::Io)?;
        Ok(Self::new(BufReader::new(file), path))
    }
}

impl<R: Read> TfRecordReader<R> {
    pub fn new(reader: R, path: impl Into<PathBuf>) -> Self {
        Self {
            reader,
            path: path.into(),
            done: false,
        }
    }

    fn error(&self, message: impl Into<String>) -> RecordprepError {
        RecordprepError::RecordRead {
            path: self.path.clone(),
            message: message.into(),
        }
    }

    fn read_next(&mut self) -> Result<Option<Vec<u8>>, RecordprepError> {
        let mut len = [0u8; 8];
        match read_exact_or_eof(&mut self.reader, &mut len) {
            Ok(false) => return Ok(None),
            Ok(true) => {}
            Err(source) => return Err(self.error(source.to_string())),
        }

        let mut crc = [0u8; 4];
        self.reader
            .read_exact(&mut crc)
            .map_err(|source| self.error(format!("truncated length header: {source}")))?;
        if u32::from_le_bytes(crc) != masked_crc32c(&len) {
            return Err(self.error("length checksum mismatch"));
        }

        // A corrupt length must not allocate up front.
        let len = u64::from_le_bytes(len);
        let mut data = Vec::new();
        let read = (&mut self.reader).take(len).read_to_end(&mut data);
        read.map_err(|source| self.error(source.to_string()))?;
        if data.len() as u64 != len {
            return Err(self.error(format!(
                "truncated record body: expected {len} bytes, found {}",
                data.len()
            )));
        }

        self.reader
            .read_exact(&mut crc)
            .map_err(|source| self.error(format!("truncated record footer: {source}")))?;
        if u32::from_le_bytes(crc) != masked_crc32c(&data) {
            return Err(self.error("data checksum mismatch"));
        }

        Ok(Some(data))
    }
}

impl<R: Read> Iterator for TfRecordReader<R> {
    type Item = Result<Vec<u8>, RecordprepError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        let next = self.read_next();
        if !matches!(next, Ok(Some(_))) {
            self.done = true;
        }
        next.transpose()
    }
}

/// Reads and decodes every `tf.train.Example` in a TFRecord file.
pub fn read_tfrecord_examples(path: &Path) -> Result<Vec<Example>, RecordprepError> {
    let mut examples = Vec::new();
    for payload in TfRecordReader::open(path)? {
        let payload = payload?;
        let example =
            Example::decode(payload.as_slice()).map_err(|source| RecordprepError::RecordRead {
                path: path.to_path_buf(),
                message: format!("invalid tf.train.Example: {source}"),
            })?;
        examples.push(example);
    }
    Ok(examples)
}

/// Fills `buf`, or returns `Ok(false)` on a clean end of stream before the
/// first byte.
fn read_exact_or_eof<R: Read>(reader: &mut R, buf: &mut [u8]) -> io::Result<bool> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) if filled == 0 => return Ok(false),
            Ok(0) => {
                return Err(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    "truncated record length",
                ))
            }
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => return Err(e),
        }
    }
    Ok(true)
}
