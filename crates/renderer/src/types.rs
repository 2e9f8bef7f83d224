use std::borrow::Borrow;
use std::fmt;
use std::path::PathBuf;

/// Opaque name for one shader variant registered with a session.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ShaderKey(String);

impl ShaderKey {
    /// Wraps the provided name as a shader key.
    pub fn new(name: impl Into<String>) -> Self {
        ShaderKey(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for ShaderKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ShaderKey {
    fn from(value: &str) -> Self {
        ShaderKey::new(value)
    }
}

impl From<String> for ShaderKey {
    fn from(value: String) -> Self {
        ShaderKey(value)
    }
}

impl Borrow<str> for ShaderKey {
    fn borrow(&self) -> &str {
        &self.0
    }
}

/// One of the two programmable stages a shader variant is built from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StageKind {
    Vertex,
    Fragment,
}

impl StageKind {
    /// File extension the stage source is stored under.
    pub fn extension(self) -> &'static str {
        match self {
            StageKind::Vertex => "vert",
            StageKind::Fragment => "frag",
        }
    }
}

impl fmt::Display for StageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StageKind::Vertex => f.write_str("vertex"),
            StageKind::Fragment => f.write_str("fragment"),
        }
    }
}

/// Fixed surface dimensions in physical pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Viewport {
    pub width: u32,
    pub height: u32,
}

impl Viewport {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Value pushed to the `resolution` uniform every frame.
    pub fn resolution(&self) -> [f32; 2] {
        [self.width as f32, self.height as f32]
    }
}

/// Which flavour of the GL API the context is created for.
///
/// Desktop targets get an OpenGL 3.3 core context; embedded boards (the
/// Raspberry Pi class of hardware) get OpenGL ES 3.0. The issued calls are the
/// same, only the context request differs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GlApi {
    Desktop,
    Embedded,
}

impl Default for GlApi {
    fn default() -> Self {
        if cfg!(feature = "gles") {
            GlApi::Embedded
        } else {
            GlApi::Desktop
        }
    }
}

impl fmt::Display for GlApi {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GlApi::Desktop => f.write_str("opengl"),
            GlApi::Embedded => f.write_str("gles"),
        }
    }
}

/// Pairs a registry key with the shader file stem it should be built from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShaderEntry {
    pub key: ShaderKey,
    pub file: String,
}

impl ShaderEntry {
    pub fn new(key: impl Into<ShaderKey>, file: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            file: file.into(),
        }
    }
}

/// Immutable configuration passed to [`crate::RenderSession`] at start-up.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Directory holding `<name>.vert` / `<name>.frag` pairs.
    pub shader_root: PathBuf,
    /// Surface size in physical pixels.
    pub viewport: Viewport,
    /// Window title.
    pub title: String,
    /// Desktop GL or GLES context.
    pub api: GlApi,
    /// Colour the frame buffer is cleared to before each draw.
    pub clear_color: [f32; 4],
}

impl Default for SessionConfig {
    /// 800x600 window reading shaders from the working directory.
    fn default() -> Self {
        Self {
            shader_root: PathBuf::from("."),
            viewport: Viewport::new(800, 600),
            title: "quadloop".to_string(),
            api: GlApi::default(),
            clear_color: [0.2, 0.2, 0.2, 1.0],
        }
    }
}
