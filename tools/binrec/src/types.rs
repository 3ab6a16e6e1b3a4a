use serde::{Deserialize, Serialize};

/// How a session opens its target. Fixed for the lifetime of the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    Read,
    Write,
    Append,
}

impl Mode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Read => "read",
            Self::Write => "write",
            Self::Append => "append",
        }
    }

    pub fn is_read(self) -> bool {
        match self {
            Self::Read => true,
            Self::Write | Self::Append => false,
        }
    }

    pub fn is_write(self) -> bool {
        !self.is_read()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportKind {
    Raw,
    Compressed,
}

impl TransportKind {
    pub fn from_compression(compression: bool) -> Self {
        if compression {
            Self::Compressed
        } else {
            Self::Raw
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Raw => "raw",
            Self::Compressed => "compressed",
        }
    }
}

/// Byte order of the 4-byte length prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ByteOrder {
    #[default]
    Native,
    Little,
    Big,
}

/// What happens when a `RecordStream` is dropped with a session still open.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DropPolicy {
    #[default]
    Panic,
    Log,
}
