//! Error types for the control path.
//!
//! The render path never returns errors; everything here comes from loading
//! configuration, (de)serialising parameter trees, addressing parameters by
//! key or starting the dispatcher thread.

use std::path::PathBuf;

use cadenza_synth::MidiEvent;
use thiserror::Error;

/// Errors raised by engine control operations.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Failed to read a file
    #[error("failed to read file '{path}': {source}")]
    ReadFile {
        /// Path of the file that could not be read.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// Failed to write a file
    #[error("failed to write file '{path}': {source}")]
    WriteFile {
        /// Path of the file that could not be written.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// Failed to create directory
    #[error("failed to create directory '{path}': {source}")]
    CreateDir {
        /// Path of the directory that could not be created.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// Failed to parse TOML
    #[error("failed to parse TOML: {0}")]
    TomlParse(#[from] toml::de::Error),

    /// Failed to serialize TOML
    #[error("failed to serialize TOML: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    /// Parameter key not known to the mix graph
    #[error("unknown parameter: {0}")]
    UnknownParam(String),

    /// Parameter value outside what the key accepts
    #[error("invalid value {value} for parameter '{key}'")]
    InvalidValue {
        /// Dotted parameter key.
        key: String,
        /// Rejected value.
        value: i32,
    },

    /// Engine configuration rejected
    #[error("invalid configuration: {0}")]
    Config(String),

    /// Dispatcher thread could not be started
    #[error("failed to spawn dispatcher thread: {0}")]
    ThreadSpawn(#[source] std::io::Error),
}

impl EngineError {
    /// Create a read file error.
    pub fn read_file(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        EngineError::ReadFile {
            path: path.into(),
            source,
        }
    }

    /// Create a write file error.
    pub fn write_file(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        EngineError::WriteFile {
            path: path.into(),
            source,
        }
    }

    /// Create a create directory error.
    pub fn create_dir(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        EngineError::CreateDir {
            path: path.into(),
            source,
        }
    }

    /// Create an invalid value error.
    pub fn invalid_value(key: impl Into<String>, value: i32) -> Self {
        EngineError::InvalidValue {
            key: key.into(),
            value,
        }
    }
}

/// The event queue was full; the rejected event is handed back.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("event queue full, dropped {0}")]
pub struct QueueFull(pub MidiEvent);

/// Result type for engine control operations.
pub type Result<T> = std::result::Result<T, EngineError>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error;

    fn mock_io_err() -> std::io::Error {
        std::io::Error::new(std::io::ErrorKind::NotFound, "mock")
    }

    #[test]
    fn read_file_factory_produces_correct_variant() {
        let err = EngineError::read_file("/some/path", mock_io_err());
        assert!(
            matches!(err, EngineError::ReadFile { ref path, .. } if path == std::path::Path::new("/some/path"))
        );
    }

    #[test]
    fn write_file_factory_produces_correct_variant() {
        let err = EngineError::write_file("/out/path", mock_io_err());
        assert!(
            matches!(err, EngineError::WriteFile { ref path, .. } if path == std::path::Path::new("/out/path"))
        );
    }

    #[test]
    fn read_file_display() {
        let err = EngineError::read_file("/a/engine.toml", mock_io_err());
        let msg = err.to_string();
        assert!(msg.contains("failed to read file"), "got: {msg}");
        assert!(msg.contains("/a/engine.toml"), "got: {msg}");
    }

    #[test]
    fn invalid_value_display() {
        let err = EngineError::invalid_value("part.3.volume", 300);
        let msg = err.to_string();
        assert!(msg.contains("part.3.volume"), "got: {msg}");
        assert!(msg.contains("300"), "got: {msg}");
    }

    #[test]
    fn unknown_param_display() {
        let err = EngineError::UnknownParam("master.tempo".to_string());
        assert_eq!(err.to_string(), "unknown parameter: master.tempo");
    }

    #[test]
    fn io_variants_expose_source() {
        let err = EngineError::read_file("/x", mock_io_err());
        assert!(err.source().is_some());
        let err = EngineError::ThreadSpawn(mock_io_err());
        assert!(err.source().is_some());
    }

    #[test]
    fn toml_parse_from_conversion() {
        let toml_err = toml::from_str::<toml::Value>("not = [valid").unwrap_err();
        let err: EngineError = toml_err.into();
        assert!(matches!(err, EngineError::TomlParse(_)));
    }

    #[test]
    fn queue_full_carries_event() {
        let ev = MidiEvent::note(2, 60, 100);
        let err = QueueFull(ev);
        assert_eq!(err.0, ev);
        assert!(err.to_string().contains("event queue full"));
    }
}
