//! Length-prefixed record sessions over a raw or gzip transport.
//!
//! A `RecordStream` is idle until `start` opens a target, and returns to idle
//! on `finish`. Exactly one session is open at a time, and its mode and
//! transport never change while it is open.

use crate::config::AppConfig;
use crate::errors::RecordStreamError;
use crate::framing::{decode_prefix, encode_record, PREFIX_LEN};
use crate::logging::{JsonlLogger, LogEvent};
use crate::storage::{ProductionStorage, Storage};
use crate::transport::{CompressedTransport, RawTransport, StreamHandle, Transport};
use crate::types::{ByteOrder, DropPolicy, Mode, TransportKind};
use serde_json::{json, Value};
use std::path::{Path, PathBuf};
use std::sync::Arc;

struct Session {
    target: PathBuf,
    mode: Mode,
    transport: TransportKind,
    handle: Box<dyn StreamHandle>,
}

pub struct RecordStream {
    raw: Arc<dyn Transport>,
    compressed: Arc<dyn Transport>,
    byte_order: ByteOrder,
    max_record_bytes: u64,
    drop_policy: DropPolicy,
    logger: Option<JsonlLogger>,
    session: Option<Session>,
}

impl RecordStream {
    pub fn new() -> Self {
        Self::with_storage(Arc::new(ProductionStorage), &AppConfig::default())
    }

    pub fn from_config(cfg: &AppConfig) -> Self {
        Self::with_storage(Arc::new(ProductionStorage), cfg)
    }

    pub fn with_storage(storage: Arc<dyn Storage>, cfg: &AppConfig) -> Self {
        let raw = Arc::new(RawTransport::new(Arc::clone(&storage)));
        let compressed = Arc::new(CompressedTransport::with_level(
            storage,
            cfg.compression.level,
        ));
        Self::with_transports(raw, compressed, cfg)
    }

    pub fn with_transports(
        raw: Arc<dyn Transport>,
        compressed: Arc<dyn Transport>,
        cfg: &AppConfig,
    ) -> Self {
        let logger = cfg.logging.event_log.as_ref().map(|path| {
            JsonlLogger::new(path).with_max_payload_bytes(cfg.logging.max_payload_bytes)
        });
        Self {
            raw,
            compressed,
            byte_order: cfg.framing.byte_order,
            max_record_bytes: cfg.framing.max_record_bytes,
            drop_policy: cfg.session.on_unfinished_drop,
            logger,
            session: None,
        }
    }

    pub fn is_active(&self) -> bool {
        self.session.is_some()
    }

    pub fn target(&self) -> Option<&Path> {
        self.session.as_ref().map(|s| s.target.as_path())
    }

    pub fn mode(&self) -> Option<Mode> {
        self.session.as_ref().map(|s| s.mode)
    }

    pub fn transport(&self) -> Option<TransportKind> {
        self.session.as_ref().map(|s| s.transport)
    }

    pub fn start(
        &mut self,
        target: impl AsRef<Path>,
        mode: Mode,
        compression: bool,
    ) -> Result<(), RecordStreamError> {
        let target = target.as_ref();
        if let Some(active) = &self.session {
            return Err(RecordStreamError::HandlerAlreadyActive(
                active.target.display().to_string(),
            ));
        }

        let transport = match TransportKind::from_compression(compression) {
            TransportKind::Raw => &self.raw,
            TransportKind::Compressed => &self.compressed,
        };
        let kind = transport.kind();
        let handle = transport.open(target, mode)?;

        self.session = Some(Session {
            target: target.to_path_buf(),
            mode,
            transport: kind,
            handle,
        });
        self.log(
            "info",
            "session_started",
            json!({
                "target": target.display().to_string(),
                "mode": mode.as_str(),
                "transport": kind.as_str(),
            }),
        );
        Ok(())
    }

    /// Closes the active session, if any. The session is released even when
    /// closing the resource fails, so a repeated `finish` is always `Ok`.
    pub fn finish(&mut self) -> Result<(), RecordStreamError> {
        let Some(session) = self.session.take() else {
            return Ok(());
        };
        let Session {
            target,
            mode,
            transport,
            handle,
        } = session;
        let payload = json!({
            "target": target.display().to_string(),
            "mode": mode.as_str(),
            "transport": transport.as_str(),
        });

        match handle.close() {
            Ok(()) => {
                self.log("info", "session_finished", payload);
                Ok(())
            }
            Err(error) => {
                self.log("error", "close_failed", payload);
                Err(error)
            }
        }
    }

    /// Writes `payload` as one record and returns the bytes written,
    /// length prefix included.
    pub fn write_data(&mut self, payload: &[u8]) -> Result<usize, RecordStreamError> {
        let byte_order = self.byte_order;
        let max_record_bytes = self.max_record_bytes;
        let session = self.session.as_mut().ok_or_else(|| {
            RecordStreamError::NoActiveHandle(
                "unable to write data, no resource is available".to_string(),
            )
        })?;

        if session.mode.is_read() {
            return Err(RecordStreamError::WrongMode(format!(
                "unable to write data into {}, read mode is set",
                session.target.display()
            )));
        }

        if payload.len() as u64 > max_record_bytes {
            return Err(RecordStreamError::RecordTooLarge(format!(
                "payload of {} bytes exceeds the {max_record_bytes} byte limit",
                payload.len()
            )));
        }

        let record = encode_record(payload, byte_order)?;
        session.handle.write(&record)
    }

    /// Reads the next record. `Ok(None)` marks a clean end of stream.
    pub fn read_data(&mut self) -> Result<Option<Vec<u8>>, RecordStreamError> {
        let result = self.read_record();
        if let Err(RecordStreamError::CorruptData { target, reason }) = &result {
            self.log(
                "error",
                "corrupt_data",
                json!({ "target": target, "reason": reason }),
            );
        }
        result
    }

    fn read_record(&mut self) -> Result<Option<Vec<u8>>, RecordStreamError> {
        let byte_order = self.byte_order;
        let max_record_bytes = self.max_record_bytes;
        let session = self.session.as_mut().ok_or_else(|| {
            RecordStreamError::NoActiveHandle(
                "unable to read data, no resource is available".to_string(),
            )
        })?;

        if session.mode.is_write() {
            return Err(RecordStreamError::WrongMode(format!(
                "unable to read data from {}, {} mode is set",
                session.target.display(),
                session.mode.as_str()
            )));
        }

        let prefix = session.handle.read(PREFIX_LEN)?;
        if prefix.is_empty() {
            return Ok(None);
        }
        let prefix = <[u8; PREFIX_LEN]>::try_from(prefix.as_slice()).map_err(|_| {
            corrupt(
                &session.target,
                format!("truncated length prefix of {} bytes", prefix.len()),
            )
        })?;

        let len = decode_prefix(prefix, byte_order);
        if u64::from(len) > max_record_bytes {
            return Err(corrupt(
                &session.target,
                format!("record length {len} exceeds the {max_record_bytes} byte limit"),
            ));
        }

        let payload = session.handle.read(len as usize)?;
        if payload.len() != len as usize {
            return Err(corrupt(
                &session.target,
                format!(
                    "record declares {len} bytes but only {} remain",
                    payload.len()
                ),
            ));
        }
        Ok(Some(payload))
    }

    /// Iterates the remaining records of a read session.
    pub fn records(&mut self) -> Records<'_> {
        Records {
            stream: self,
            done: false,
        }
    }

    /// Runs `f` inside a session that is finished on every exit path.
    /// An error from `f` wins over an error from closing.
    pub fn scoped<T>(
        &mut self,
        target: impl AsRef<Path>,
        mode: Mode,
        compression: bool,
        f: impl FnOnce(&mut Self) -> Result<T, RecordStreamError>,
    ) -> Result<T, RecordStreamError> {
        self.start(target, mode, compression)?;
        let outcome = f(self);
        let finished = self.finish();
        let value = outcome?;
        finished?;
        Ok(value)
    }

    fn log(&self, level: &str, event_type: &str, payload: Value) {
        if let Some(logger) = &self.logger {
            let _ = logger.append(&LogEvent {
                level,
                event_type,
                payload,
            });
        }
    }
}

impl Default for RecordStream {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for RecordStream {
    fn drop(&mut self) {
        let Some(session) = &self.session else {
            return;
        };
        let target = session.target.display().to_string();
        let mode = session.mode;
        self.log(
            "error",
            "session_leaked",
            json!({ "target": target, "mode": mode.as_str() }),
        );
        if self.drop_policy == DropPolicy::Panic && !std::thread::panicking() {
            panic!("{}", RecordStreamError::MisuseOnTeardown(target));
        }
    }
}

fn corrupt(target: &Path, reason: String) -> RecordStreamError {
    RecordStreamError::CorruptData {
        target: target.display().to_string(),
        reason,
    }
}

pub struct Records<'a> {
    stream: &'a mut RecordStream,
    done: bool,
}

impl Iterator for Records<'_> {
    type Item = Result<Vec<u8>, RecordStreamError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self.stream.read_data() {
            Ok(Some(record)) => Some(Ok(record)),
            Ok(None) => {
                self.done = true;
                None
            }
            Err(error) => {
                self.done = true;
                Some(Err(error))
            }
        }
    }
}
