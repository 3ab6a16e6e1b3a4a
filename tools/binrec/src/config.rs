use crate::errors::RecordStreamError;
use crate::transport::DEFAULT_COMPRESSION_LEVEL;
use crate::types::{ByteOrder, DropPolicy};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Default)]
pub struct CliOverrides {
    pub config_path: Option<PathBuf>,
    pub event_log: Option<PathBuf>,
    pub compression_level: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AppConfig {
    pub framing: FramingConfig,
    pub compression: CompressionConfig,
    pub session: SessionConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FramingConfig {
    pub byte_order: ByteOrder,
    pub max_record_bytes: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CompressionConfig {
    pub level: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SessionConfig {
    pub on_unfinished_drop: DropPolicy,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LoggingConfig {
    pub event_log: Option<PathBuf>,
    pub max_payload_bytes: usize,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            framing: FramingConfig {
                byte_order: ByteOrder::Native,
                max_record_bytes: u64::from(u32::MAX),
            },
            compression: CompressionConfig {
                level: DEFAULT_COMPRESSION_LEVEL,
            },
            session: SessionConfig {
                on_unfinished_drop: DropPolicy::Panic,
            },
            logging: LoggingConfig {
                event_log: None,
                max_payload_bytes: 4096,
            },
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
struct PartialAppConfig {
    framing: Option<PartialFramingConfig>,
    compression: Option<PartialCompressionConfig>,
    session: Option<PartialSessionConfig>,
    logging: Option<PartialLoggingConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
struct PartialFramingConfig {
    byte_order: Option<ByteOrder>,
    max_record_bytes: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
struct PartialCompressionConfig {
    level: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
struct PartialSessionConfig {
    on_unfinished_drop: Option<DropPolicy>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
struct PartialLoggingConfig {
    event_log: Option<PathBuf>,
    max_payload_bytes: Option<usize>,
}

pub fn load_config(overrides: &CliOverrides) -> Result<AppConfig, RecordStreamError> {
    let mut cfg = AppConfig::default();

    if let Some(path) = &overrides.config_path {
        let file_contents = read_config_file(path)?;
        merge_config_str(&mut cfg, &file_contents)?;
    }

    apply_cli_overrides(&mut cfg, overrides);
    validate_config(&cfg)?;
    Ok(cfg)
}

fn read_config_file(path: &Path) -> Result<String, RecordStreamError> {
    std::fs::read_to_string(path)
        .map_err(|e| RecordStreamError::Io(format!("reading {}: {e}", path.display())))
}

pub fn parse_config(text: &str) -> Result<AppConfig, RecordStreamError> {
    let mut cfg = AppConfig::default();
    merge_config_str(&mut cfg, text)?;
    validate_config(&cfg)?;
    Ok(cfg)
}

fn merge_config_str(cfg: &mut AppConfig, text: &str) -> Result<(), RecordStreamError> {
    let partial: PartialAppConfig =
        toml::from_str(text).map_err(|e| RecordStreamError::ConfigParse(e.to_string()))?;
    merge_partial_config(cfg, partial);
    Ok(())
}

fn merge_partial_config(cfg: &mut AppConfig, partial: PartialAppConfig) {
    if let Some(framing) = partial.framing {
        if let Some(value) = framing.byte_order {
            cfg.framing.byte_order = value;
        }
        if let Some(value) = framing.max_record_bytes {
            cfg.framing.max_record_bytes = value;
        }
    }

    if let Some(compression) = partial.compression {
        if let Some(level) = compression.level {
            cfg.compression.level = level;
        }
    }

    if let Some(session) = partial.session {
        if let Some(policy) = session.on_unfinished_drop {
            cfg.session.on_unfinished_drop = policy;
        }
    }

    if let Some(logging) = partial.logging {
        if let Some(path) = logging.event_log {
            cfg.logging.event_log = Some(path);
        }
        if let Some(value) = logging.max_payload_bytes {
            cfg.logging.max_payload_bytes = value;
        }
    }
}

fn apply_cli_overrides(cfg: &mut AppConfig, overrides: &CliOverrides) {
    if let Some(path) = &overrides.event_log {
        cfg.logging.event_log = Some(path.clone());
    }
    if let Some(level) = overrides.compression_level {
        cfg.compression.level = level;
    }
}

fn validate_config(cfg: &AppConfig) -> Result<(), RecordStreamError> {
    if cfg.compression.level > 9 {
        return Err(RecordStreamError::InvalidConfig(format!(
            "compression.level must be between 0 and 9, got {}",
            cfg.compression.level
        )));
    }

    if cfg.framing.max_record_bytes == 0 || cfg.framing.max_record_bytes > u64::from(u32::MAX) {
        return Err(RecordStreamError::InvalidConfig(
            "framing.max_record_bytes must be between 1 and 4294967295".to_string(),
        ));
    }

    if cfg.logging.max_payload_bytes == 0 {
        return Err(RecordStreamError::InvalidConfig(
            "logging.max_payload_bytes must be greater than zero".to_string(),
        ));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_file_overrides_only_named_keys() {
        let cfg = parse_config(
            r#"
[framing]
byte_order = "big"

[session]
on_unfinished_drop = "log"
"#,
        )
        .expect("parse");

        assert_eq!(cfg.framing.byte_order, ByteOrder::Big);
        assert_eq!(cfg.framing.max_record_bytes, u64::from(u32::MAX));
        assert_eq!(cfg.session.on_unfinished_drop, DropPolicy::Log);
        assert_eq!(cfg.compression.level, DEFAULT_COMPRESSION_LEVEL);
    }

    #[test]
    fn empty_file_yields_defaults() {
        assert_eq!(parse_config("").expect("parse"), AppConfig::default());
    }

    #[test]
    fn invalid_values_are_rejected() {
        let err = parse_config("[compression]\nlevel = 12\n").expect_err("level");
        assert!(matches!(err, RecordStreamError::InvalidConfig(message) if message.contains("compression.level")));

        let err = parse_config("[framing]\nmax_record_bytes = 0\n").expect_err("zero");
        assert!(matches!(err, RecordStreamError::InvalidConfig(_)));

        let err = parse_config("[framing]\nbyte_order = \"middle\"\n").expect_err("order");
        assert!(matches!(err, RecordStreamError::ConfigParse(_)));
    }

    #[test]
    fn cli_overrides_win_over_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("binrec.toml");
        std::fs::write(
            &path,
            "[compression]\nlevel = 1\n[logging]\nevent_log = \"file.jsonl\"\n",
        )
        .expect("write config");

        let cfg = load_config(&CliOverrides {
            config_path: Some(path),
            event_log: Some(PathBuf::from("cli.jsonl")),
            compression_level: Some(9),
        })
        .expect("load");
        assert_eq!(cfg.compression.level, 9);
        assert_eq!(cfg.logging.event_log, Some(PathBuf::from("cli.jsonl")));
    }

    #[test]
    fn missing_config_file_is_an_io_error() {
        let err = load_config(&CliOverrides {
            config_path: Some(PathBuf::from("/definitely/missing/binrec.toml")),
            ..CliOverrides::default()
        })
        .expect_err("missing");
        assert!(matches!(err, RecordStreamError::Io(_)));
    }
}
