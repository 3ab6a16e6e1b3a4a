use crate::errors::RecordStreamError;
use crate::storage::Storage;
use crate::types::{Mode, TransportKind};
use flate2::read::MultiGzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use std::io::{self, BufRead, BufReader, Read, Write};
use std::path::Path;
use std::sync::Arc;

pub const DEFAULT_COMPRESSION_LEVEL: u32 = 6;

/// An open resource owned by exactly one session.
pub trait StreamHandle: Send {
    /// Reads up to `n` bytes, stopping early only at end of stream.
    fn read(&mut self, n: usize) -> Result<Vec<u8>, RecordStreamError>;
    fn write(&mut self, bytes: &[u8]) -> Result<usize, RecordStreamError>;
    fn close(self: Box<Self>) -> Result<(), RecordStreamError>;
}

/// Opens handles for one encoding of the byte stream.
pub trait Transport: Send + Sync {
    fn kind(&self) -> TransportKind;
    fn open(&self, target: &Path, mode: Mode) -> Result<Box<dyn StreamHandle>, RecordStreamError>;
}

pub struct RawTransport {
    storage: Arc<dyn Storage>,
}

impl RawTransport {
    pub fn new(storage: Arc<dyn Storage>) -> Self {
        Self { storage }
    }
}

impl Transport for RawTransport {
    fn kind(&self) -> TransportKind {
        TransportKind::Raw
    }

    fn open(&self, target: &Path, mode: Mode) -> Result<Box<dyn StreamHandle>, RecordStreamError> {
        match mode {
            Mode::Read => {
                let reader = self
                    .storage
                    .open_read(target)
                    .map_err(|e| open_failed(target, e))?;
                Ok(Box::new(ReadHandle::new(target, reader)))
            }
            Mode::Write | Mode::Append => {
                let writer = self
                    .storage
                    .open_write(target, mode == Mode::Append)
                    .map_err(|e| open_failed(target, e))?;
                Ok(Box::new(RawWriteHandle {
                    target: target.display().to_string(),
                    writer,
                }))
            }
        }
    }
}

pub struct CompressedTransport {
    storage: Arc<dyn Storage>,
    level: u32,
}

impl CompressedTransport {
    pub fn new(storage: Arc<dyn Storage>) -> Self {
        Self::with_level(storage, DEFAULT_COMPRESSION_LEVEL)
    }

    pub fn with_level(storage: Arc<dyn Storage>, level: u32) -> Self {
        Self { storage, level }
    }
}

impl Transport for CompressedTransport {
    fn kind(&self) -> TransportKind {
        TransportKind::Compressed
    }

    fn open(&self, target: &Path, mode: Mode) -> Result<Box<dyn StreamHandle>, RecordStreamError> {
        match mode {
            Mode::Read => {
                let reader = self
                    .storage
                    .open_read(target)
                    .map_err(|e| open_failed(target, e))?;
                let mut reader = BufReader::new(reader);
                let is_empty = reader
                    .fill_buf()
                    .map_err(|e| open_failed(target, RecordStreamError::Io(e.to_string())))?
                    .is_empty();
                // a zero-byte target holds no gzip member, only a clean end of stream
                if is_empty {
                    return Ok(Box::new(ReadHandle::new(target, io::empty())));
                }
                // appended sessions leave one gzip member each
                Ok(Box::new(ReadHandle::new(target, MultiGzDecoder::new(reader))))
            }
            Mode::Write | Mode::Append => {
                let writer = self
                    .storage
                    .open_write(target, mode == Mode::Append)
                    .map_err(|e| open_failed(target, e))?;
                Ok(Box::new(GzWriteHandle {
                    target: target.display().to_string(),
                    encoder: GzEncoder::new(writer, Compression::new(self.level)),
                }))
            }
        }
    }
}

fn open_failed(target: &Path, error: RecordStreamError) -> RecordStreamError {
    let reason = match error {
        RecordStreamError::Io(reason) => reason,
        other => other.to_string(),
    };
    RecordStreamError::HandlerOpenFailed {
        target: target.display().to_string(),
        reason,
    }
}

struct ReadHandle<R> {
    target: String,
    reader: R,
}

impl<R: Read + Send> ReadHandle<R> {
    fn new(target: &Path, reader: R) -> Self {
        Self {
            target: target.display().to_string(),
            reader,
        }
    }
}

impl<R: Read + Send> StreamHandle for ReadHandle<R> {
    fn read(&mut self, n: usize) -> Result<Vec<u8>, RecordStreamError> {
        let mut buf = Vec::new();
        (&mut self.reader)
            .take(n as u64)
            .read_to_end(&mut buf)
            .map_err(|e| read_failed(&self.target, e))?;
        Ok(buf)
    }

    fn write(&mut self, _bytes: &[u8]) -> Result<usize, RecordStreamError> {
        Err(RecordStreamError::WrongMode(format!(
            "{} was opened for reading",
            self.target
        )))
    }

    fn close(self: Box<Self>) -> Result<(), RecordStreamError> {
        Ok(())
    }
}

fn read_failed(target: &str, error: io::Error) -> RecordStreamError {
    match error.kind() {
        io::ErrorKind::InvalidData | io::ErrorKind::InvalidInput | io::ErrorKind::UnexpectedEof => {
            RecordStreamError::CorruptData {
                target: target.to_string(),
                reason: error.to_string(),
            }
        }
        _ => RecordStreamError::Io(format!("reading {target}: {error}")),
    }
}

struct RawWriteHandle {
    target: String,
    writer: Box<dyn Write + Send>,
}

impl StreamHandle for RawWriteHandle {
    fn read(&mut self, _n: usize) -> Result<Vec<u8>, RecordStreamError> {
        Err(write_only(&self.target))
    }

    fn write(&mut self, bytes: &[u8]) -> Result<usize, RecordStreamError> {
        self.writer
            .write_all(bytes)
            .map_err(|e| RecordStreamError::Io(format!("writing {}: {e}", self.target)))?;
        Ok(bytes.len())
    }

    fn close(mut self: Box<Self>) -> Result<(), RecordStreamError> {
        self.writer
            .flush()
            .map_err(|e| RecordStreamError::CloseFailed {
                target: self.target.clone(),
                reason: e.to_string(),
            })
    }
}

struct GzWriteHandle {
    target: String,
    encoder: GzEncoder<Box<dyn Write + Send>>,
}

impl StreamHandle for GzWriteHandle {
    fn read(&mut self, _n: usize) -> Result<Vec<u8>, RecordStreamError> {
        Err(write_only(&self.target))
    }

    fn write(&mut self, bytes: &[u8]) -> Result<usize, RecordStreamError> {
        self.encoder
            .write_all(bytes)
            .map_err(|e| RecordStreamError::Io(format!("writing {}: {e}", self.target)))?;
        Ok(bytes.len())
    }

    fn close(self: Box<Self>) -> Result<(), RecordStreamError> {
        let GzWriteHandle { target, encoder } = *self;
        let mut inner = encoder
            .finish()
            .map_err(|e| RecordStreamError::CloseFailed {
                target: target.clone(),
                reason: e.to_string(),
            })?;
        inner.flush().map_err(|e| RecordStreamError::CloseFailed {
            target,
            reason: e.to_string(),
        })
    }
}

fn write_only(target: &str) -> RecordStreamError {
    RecordStreamError::WrongMode(format!("{target} was opened for writing"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::FakeStorage;
    use flate2::read::GzDecoder;

    fn storage() -> (FakeStorage, Arc<dyn Storage>) {
        let fake = FakeStorage::default();
        let shared: Arc<dyn Storage> = Arc::new(fake.clone());
        (fake, shared)
    }

    #[test]
    fn raw_transport_passes_bytes_through() {
        let (fake, shared) = storage();
        let transport = RawTransport::new(shared);
        let path = Path::new("/raw.bin");

        let mut handle = transport.open(path, Mode::Write).expect("open");
        assert_eq!(handle.write(b"hello").expect("write"), 5);
        handle.close().expect("close");
        assert_eq!(fake.contents(path), Some(b"hello".to_vec()));

        let mut handle = transport.open(path, Mode::Read).expect("open");
        assert_eq!(handle.read(3).expect("read"), b"hel");
        assert_eq!(handle.read(10).expect("read"), b"lo");
        assert!(handle.read(4).expect("read").is_empty());
    }

    #[test]
    fn compressed_transport_writes_gzip() {
        let (fake, shared) = storage();
        let transport = CompressedTransport::new(shared);
        let path = Path::new("/data.gz");

        let mut handle = transport.open(path, Mode::Write).expect("open");
        handle.write(b"payload payload payload").expect("write");
        handle.close().expect("close");

        let bytes = fake.contents(path).expect("written");
        assert_eq!(&bytes[..2], &[0x1f, 0x8b]);
        let mut text = String::new();
        GzDecoder::new(bytes.as_slice())
            .read_to_string(&mut text)
            .expect("gunzip");
        assert_eq!(text, "payload payload payload");
    }

    #[test]
    fn compressed_append_reads_back_across_members() {
        let (_fake, shared) = storage();
        let transport = CompressedTransport::with_level(shared, 1);
        let path = Path::new("/append.gz");

        for (mode, chunk) in [(Mode::Write, b"abc"), (Mode::Append, b"def")] {
            let mut handle = transport.open(path, mode).expect("open");
            handle.write(chunk).expect("write");
            handle.close().expect("close");
        }

        let mut handle = transport.open(path, Mode::Read).expect("open");
        assert_eq!(handle.read(16).expect("read"), b"abcdef");
    }

    #[test]
    fn open_failures_name_the_target() {
        let (fake, shared) = storage();
        fake.set_fail_next("permission denied");
        let err = RawTransport::new(shared)
            .open(Path::new("/locked.bin"), Mode::Write)
            .err()
            .expect("must fail");
        assert!(matches!(
            err,
            RecordStreamError::HandlerOpenFailed { ref target, ref reason }
                if target == "/locked.bin" && reason == "permission denied"
        ));
    }

    #[test]
    fn compressed_read_of_empty_target_is_clean_eof() {
        let fake = FakeStorage::with_file("/empty.gz", Vec::new());
        let transport = CompressedTransport::new(Arc::new(fake));
        let mut handle = transport
            .open(Path::new("/empty.gz"), Mode::Read)
            .expect("open");
        assert!(handle.read(4).expect("read").is_empty());
        handle.close().expect("close");
    }

    #[test]
    fn gzip_read_of_plain_bytes_is_corrupt() {
        let fake = FakeStorage::with_file("/plain.bin", b"definitely not gzip".to_vec());
        let transport = CompressedTransport::new(Arc::new(fake));
        let mut handle = transport
            .open(Path::new("/plain.bin"), Mode::Read)
            .expect("open");
        let err = handle.read(4).expect_err("not gzip");
        assert!(matches!(err, RecordStreamError::CorruptData { .. }));
    }

    #[test]
    fn handles_reject_the_other_direction() {
        let (_fake, shared) = storage();
        let transport = RawTransport::new(shared);
        let mut writer = transport.open(Path::new("/x.bin"), Mode::Write).expect("open");
        assert!(matches!(
            writer.read(4),
            Err(RecordStreamError::WrongMode(_))
        ));
        writer.close().expect("close");

        let mut reader = transport.open(Path::new("/x.bin"), Mode::Read).expect("open");
        assert!(matches!(
            reader.write(b"x"),
            Err(RecordStreamError::WrongMode(_))
        ));
    }
}
