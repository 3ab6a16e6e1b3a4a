use crate::errors::RecordStreamError;
use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::io::{self, BufReader, Cursor, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

/// Byte-level access to the resource behind a record stream.
pub trait Storage: Send + Sync {
    fn open_read(&self, path: &Path) -> Result<Box<dyn Read + Send>, RecordStreamError>;
    /// Opens for writing; `append` extends an existing resource instead of truncating it.
    fn open_write(
        &self,
        path: &Path,
        append: bool,
    ) -> Result<Box<dyn Write + Send>, RecordStreamError>;
}

pub struct ProductionStorage;

impl Storage for ProductionStorage {
    fn open_read(&self, path: &Path) -> Result<Box<dyn Read + Send>, RecordStreamError> {
        let file = File::open(path).map_err(|e| RecordStreamError::Io(e.to_string()))?;
        Ok(Box::new(BufReader::new(file)))
    }

    fn open_write(
        &self,
        path: &Path,
        append: bool,
    ) -> Result<Box<dyn Write + Send>, RecordStreamError> {
        let mut options = OpenOptions::new();
        options.create(true);
        if append {
            options.append(true);
        } else {
            options.write(true).truncate(true);
        }
        let file = options
            .open(path)
            .map_err(|e| RecordStreamError::Io(e.to_string()))?;
        Ok(Box::new(file))
    }
}

type SharedFiles = Arc<Mutex<HashMap<PathBuf, Vec<u8>>>>;

/// In-memory storage whose buffers stay observable after a session ends.
#[derive(Default, Clone)]
pub struct FakeStorage {
    files: SharedFiles,
    fail_next: Arc<Mutex<Option<String>>>,
    opens: Arc<Mutex<Vec<PathBuf>>>,
}

impl FakeStorage {
    pub fn with_file(path: impl Into<PathBuf>, contents: impl Into<Vec<u8>>) -> Self {
        let storage = Self::default();
        storage
            .files
            .lock()
            .expect("files lock")
            .insert(path.into(), contents.into());
        storage
    }

    pub fn contents(&self, path: &Path) -> Option<Vec<u8>> {
        self.files.lock().expect("files lock").get(path).cloned()
    }

    pub fn set_contents(&self, path: impl Into<PathBuf>, contents: impl Into<Vec<u8>>) {
        self.files
            .lock()
            .expect("files lock")
            .insert(path.into(), contents.into());
    }

    /// Makes the next open fail with `reason`.
    pub fn set_fail_next(&self, reason: impl Into<String>) {
        *self.fail_next.lock().expect("fail lock") = Some(reason.into());
    }

    pub fn opens(&self) -> Vec<PathBuf> {
        self.opens.lock().expect("opens lock").clone()
    }

    fn maybe_fail(&self, path: &Path) -> Result<(), RecordStreamError> {
        self.opens
            .lock()
            .expect("opens lock")
            .push(path.to_path_buf());
        if let Some(reason) = self.fail_next.lock().expect("fail lock").take() {
            return Err(RecordStreamError::Io(reason));
        }
        Ok(())
    }
}

impl Storage for FakeStorage {
    fn open_read(&self, path: &Path) -> Result<Box<dyn Read + Send>, RecordStreamError> {
        self.maybe_fail(path)?;
        let bytes = self
            .files
            .lock()
            .expect("files lock")
            .get(path)
            .cloned()
            .ok_or_else(|| RecordStreamError::Io(format!("missing file {}", path.display())))?;
        Ok(Box::new(Cursor::new(bytes)))
    }

    fn open_write(
        &self,
        path: &Path,
        append: bool,
    ) -> Result<Box<dyn Write + Send>, RecordStreamError> {
        self.maybe_fail(path)?;
        {
            let mut files = self.files.lock().expect("files lock");
            let entry = files.entry(path.to_path_buf()).or_default();
            if !append {
                entry.clear();
            }
        }
        Ok(Box::new(FakeWriter {
            files: Arc::clone(&self.files),
            path: path.to_path_buf(),
        }))
    }
}

struct FakeWriter {
    files: SharedFiles,
    path: PathBuf,
}

impl Write for FakeWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut files = self
            .files
            .lock()
            .map_err(|_| io::Error::other("files lock poisoned"))?;
        files
            .entry(self.path.clone())
            .or_default()
            .extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
