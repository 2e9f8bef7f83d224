use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

/// Shader pairs bundled into the binary, written to the default shader root
/// on first run so the built-in configuration has something to draw.
const STOCK_SHADERS: &[(&str, &str)] = &[
    ("basic.vert", include_str!("../shaders/basic.vert")),
    ("basic.frag", include_str!("../shaders/basic.frag")),
    ("slate-1.vert", include_str!("../shaders/slate-1.vert")),
    ("slate-1.frag", include_str!("../shaders/slate-1.frag")),
];

/// Writes any stock shader missing from `dir`. Existing files are left alone
/// so local edits survive restarts. Returns the files that were written.
pub fn install_stock_shaders(dir: &Path) -> Result<Vec<PathBuf>> {
    fs::create_dir_all(dir)
        .with_context(|| format!("failed to create shader directory {}", dir.display()))?;

    let mut written = Vec::new();
    for (name, body) in STOCK_SHADERS {
        let target = dir.join(name);
        if target.exists() {
            continue;
        }
        fs::write(&target, body)
            .with_context(|| format!("failed to write stock shader {}", target.display()))?;
        written.push(target);
    }
    Ok(written)
}
