//! Shader source lookup.
//!
//! A shader variant `name` lives on disk as two sibling files,
//! `<root>/<name>.vert` and `<root>/<name>.frag`. Resolution only checks that
//! both exist; the contents are read again on every (re)build so edits are
//! picked up by hot reload.
use std::fs;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::error::SessionError;
use crate::types::StageKind;

/// Verified base path of a vertex/fragment pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShaderSource {
    base: PathBuf,
}

impl ShaderSource {
    /// Resolves `name` under `root`, failing with the stage whose file is
    /// missing. The fragment file is checked first.
    pub fn resolve(root: &Path, name: &str) -> Result<Self, SessionError> {
        let base = root.join(name);
        for stage in [StageKind::Fragment, StageKind::Vertex] {
            let path = stage_path(&base, stage);
            if !path.is_file() {
                return Err(SessionError::SourceNotFound { stage, path });
            }
        }
        debug!(base = %base.display(), "resolved shader source");
        Ok(Self { base })
    }

    pub fn base(&self) -> &Path {
        &self.base
    }

    pub fn stage_path(&self, stage: StageKind) -> PathBuf {
        stage_path(&self.base, stage)
    }

    /// Reads the current text of one stage from disk.
    pub fn read_stage(&self, stage: StageKind) -> Result<String, SessionError> {
        let path = self.stage_path(stage);
        fs::read_to_string(&path).map_err(|source| SessionError::SourceRead { path, source })
    }
}

fn stage_path(base: &Path, stage: StageKind) -> PathBuf {
    let mut raw = base.as_os_str().to_owned();
    raw.push(".");
    raw.push(stage.extension());
    PathBuf::from(raw)
}
