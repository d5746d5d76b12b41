//! Error types for unit serialization and loading.

use crate::kernel::error::TcError;
use crate::kernel::name::Name;

/// Errors during serialization/deserialization.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SerializeError {
  /// Unexpected end of buffer
  UnexpectedEof { expected: &'static str },
  /// Input does not start with the unit magic
  InvalidMagic,
  UnsupportedVersion { version: u8 },
  /// Invalid flag in tag
  InvalidFlag { flag: u8, context: &'static str },
  InvalidBool { value: u8 },
  InvalidUtf8,
  /// Structurally impossible input
  Malformed { context: &'static str },
  /// Bytes left over after the last declaration
  TrailingBytes { count: usize },
  /// Body does not hash to the recorded digest
  DigestMismatch { expected: String, found: String },
}

impl std::fmt::Display for SerializeError {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    match self {
      Self::UnexpectedEof { expected } => {
        write!(f, "unexpected EOF, expected {expected}")
      },
      Self::InvalidMagic => write!(f, "not a compiled unit"),
      Self::UnsupportedVersion { version } => {
        write!(f, "unsupported unit version {version}")
      },
      Self::InvalidFlag { flag, context } => {
        write!(f, "invalid flag {flag} in {context}")
      },
      Self::InvalidBool { value } => write!(f, "invalid bool value {value}"),
      Self::InvalidUtf8 => write!(f, "name segment is not valid UTF-8"),
      Self::Malformed { context } => write!(f, "malformed input: {context}"),
      Self::TrailingBytes { count } => {
        write!(f, "{count} trailing byte(s) after unit")
      },
      Self::DigestMismatch { expected, found } => {
        write!(f, "unit digest mismatch: recorded {expected}, computed {found}")
      },
    }
  }
}

impl std::error::Error for SerializeError {}

/// Errors while loading a unit into an environment.
#[derive(Debug)]
pub enum UnitError {
  Serialize(SerializeError),
  Io(std::io::Error),
  /// A declaration clashes with a different one already present.
  Conflict(TcError),
  /// Declarations that failed re-verification.
  Verification(Vec<(Name, TcError)>),
}

impl std::fmt::Display for UnitError {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    match self {
      Self::Serialize(e) => write!(f, "unit decoding failed: {e}"),
      Self::Io(e) => write!(f, "unit i/o failed: {e}"),
      Self::Conflict(e) => write!(f, "unit conflicts with environment: {e}"),
      Self::Verification(failures) => {
        write!(f, "{} declaration(s) failed verification", failures.len())?;
        if let Some((name, err)) = failures.first() {
          write!(f, ", first {}: {err}", name.pretty())?;
        }
        Ok(())
      },
    }
  }
}

impl std::error::Error for UnitError {
  fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
    match self {
      Self::Serialize(e) => Some(e),
      Self::Io(e) => Some(e),
      Self::Conflict(e) => Some(e),
      Self::Verification(_) => None,
    }
  }
}

impl From<SerializeError> for UnitError {
  fn from(e: SerializeError) -> Self {
    UnitError::Serialize(e)
  }
}

impl From<std::io::Error> for UnitError {
  fn from(e: std::io::Error) -> Self {
    UnitError::Io(e)
  }
}
