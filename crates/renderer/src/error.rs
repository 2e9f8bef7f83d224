use std::io;
use std::path::PathBuf;

use crate::types::{ShaderKey, StageKind};

/// Coarse classification of [`SessionError`] used by schedulers to decide
/// whether a failure stops rendering, skips a frame, or is the caller's to fix.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Initialization,
    Resolution,
    Compile,
    Link,
    Selection,
    ShouldClose,
    Driver,
}

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("failed to initialise {component}: {message}")]
    Initialization {
        component: &'static str,
        message: String,
    },
    #[error("{stage} shader not found at {}", path.display())]
    SourceNotFound { stage: StageKind, path: PathBuf },
    #[error("failed to read shader source {}: {source}", path.display())]
    SourceRead {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("{stage} shader {} failed to compile: {log}", path.display())]
    Compile {
        stage: StageKind,
        path: PathBuf,
        log: String,
    },
    #[error("shader program {} failed to link: {log}", path.display())]
    Link { path: PathBuf, log: String },
    #[error("shader with key '{0}' already exists")]
    DuplicateKey(ShaderKey),
    #[error("shader key must not be empty")]
    InvalidKey,
    #[error("couldn't find shader with key '{0}'")]
    UnknownShader(ShaderKey),
    #[error("nothing to reload: no shader selected")]
    NothingSelected,
    #[error("shader program {} has no linked pipeline", path.display())]
    NotLinked { path: PathBuf },
    #[error("render surface was asked to close")]
    ShouldClose,
    #[error("graphics driver error: {0}")]
    Driver(String),
}

impl SessionError {
    pub(crate) fn init(component: &'static str, message: impl ToString) -> Self {
        SessionError::Initialization {
            component,
            message: message.to_string(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            SessionError::Initialization { .. } => ErrorKind::Initialization,
            SessionError::SourceNotFound { .. } | SessionError::SourceRead { .. } => {
                ErrorKind::Resolution
            }
            SessionError::Compile { .. } => ErrorKind::Compile,
            SessionError::Link { .. } => ErrorKind::Link,
            SessionError::DuplicateKey(_)
            | SessionError::InvalidKey
            | SessionError::UnknownShader(_)
            | SessionError::NothingSelected => ErrorKind::Selection,
            SessionError::ShouldClose => ErrorKind::ShouldClose,
            SessionError::NotLinked { .. } | SessionError::Driver(_) => ErrorKind::Driver,
        }
    }

    /// True for failures caused by shader source edits, which hot reload is
    /// expected to run into while someone is working on a shader.
    pub fn is_shader_fault(&self) -> bool {
        matches!(
            self.kind(),
            ErrorKind::Compile | ErrorKind::Link | ErrorKind::Resolution
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_fragment_message_names_stage() {
        let err = SessionError::SourceNotFound {
            stage: StageKind::Fragment,
            path: PathBuf::from("/shaders/basic.frag"),
        };
        assert!(err.to_string().contains("fragment shader not found"));
        assert_eq!(err.kind(), ErrorKind::Resolution);
    }

    #[test]
    fn compile_errors_are_shader_faults() {
        let err = SessionError::Compile {
            stage: StageKind::Vertex,
            path: PathBuf::from("basic.vert"),
            log: "0:1: syntax error".into(),
        };
        assert!(err.is_shader_fault());
        assert!(err.to_string().contains("basic.vert"));
        assert!(err.to_string().contains("syntax error"));
        assert!(!SessionError::ShouldClose.is_shader_fault());
        assert!(!SessionError::NothingSelected.is_shader_fault());
    }
}
