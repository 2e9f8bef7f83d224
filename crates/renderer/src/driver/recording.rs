use std::collections::{HashMap, HashSet};
use std::num::NonZeroU32;
use std::sync::Arc;

use parking_lot::{Mutex, MutexGuard};

use crate::error::SessionError;
use crate::types::{StageKind, Viewport};

use super::{GraphicsDriver, ProgramHandle, QuadHandle, StageHandle};

/// Marker that makes the recording driver reject a stage at compile time.
pub const COMPILE_ERROR_MARKER: &str = "#error";
/// Marker that makes the recording driver reject a program at link time.
pub const LINK_ERROR_MARKER: &str = "// link-error";

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum UniformValue {
    Float(f32),
    Vec2([f32; 2]),
}

/// One `draw_quad` call and the uniforms pushed since the previous one.
#[derive(Debug, Clone, PartialEq)]
pub struct DrawCall {
    pub program: u32,
    pub index_count: i32,
    pub uniforms: Vec<(String, UniformValue)>,
}

impl DrawCall {
    pub fn uniform(&self, name: &str) -> Option<UniformValue> {
        self.uniforms
            .iter()
            .rev()
            .find(|(uniform, _)| uniform == name)
            .map(|(_, value)| *value)
    }
}

/// Everything the recording driver has been asked to do.
#[derive(Debug, Default)]
pub struct DriverLog {
    next_name: u32,
    pub stages_created: usize,
    pub stages_deleted: usize,
    pub programs_created: usize,
    pub programs_deleted: usize,
    pub quads_created: usize,
    pub quads_deleted: usize,
    pub compiles: usize,
    pub clears: usize,
    pub viewport: Option<Viewport>,
    pub draws: Vec<DrawCall>,
    /// Makes `read_pixels` fail while set.
    pub fail_read_back: bool,
    stage_sources: HashMap<u32, String>,
    program_stages: HashMap<u32, Vec<u32>>,
    linked: HashSet<u32>,
    bound: Option<u32>,
    pending_uniforms: Vec<(String, UniformValue)>,
}

impl DriverLog {
    fn allocate(&mut self) -> NonZeroU32 {
        self.next_name += 1;
        NonZeroU32::new(self.next_name).unwrap_or(NonZeroU32::MIN)
    }

    pub fn live_stages(&self) -> usize {
        self.stages_created - self.stages_deleted
    }

    pub fn live_programs(&self) -> usize {
        self.programs_created - self.programs_deleted
    }

    pub fn last_draw(&self) -> Option<&DrawCall> {
        self.draws.last()
    }

    fn declares(&self, program: u32, name: &str) -> bool {
        if !self.linked.contains(&program) {
            return false;
        }
        self.program_stages
            .get(&program)
            .into_iter()
            .flatten()
            .filter_map(|stage| self.stage_sources.get(stage))
            .any(|source| declares_uniform(source, name))
    }

    fn push_uniform(&mut self, program: ProgramHandle, name: &str, value: UniformValue) -> bool {
        if !self.declares(program.raw(), name) {
            return false;
        }
        self.pending_uniforms.push((name.to_string(), value));
        true
    }
}

fn declares_uniform(source: &str, name: &str) -> bool {
    source.lines().any(|line| {
        let line = line.trim();
        if !line.starts_with("uniform ") {
            return false;
        }
        let declaration = line.trim_end_matches(';');
        declaration
            .split_whitespace()
            .last()
            .map(|ident| ident.split('[').next().unwrap_or(ident) == name)
            .unwrap_or(false)
    })
}

/// [`GraphicsDriver`] that needs no GPU.
///
/// Stage sources containing [`COMPILE_ERROR_MARKER`] fail to compile, and
/// programs with a stage containing [`LINK_ERROR_MARKER`] fail to link. A
/// uniform counts as active when one of the program's stages declares it with
/// a `uniform <type> <name>;` line. Clones share the same log.
#[derive(Debug, Clone, Default)]
pub struct RecordingDriver {
    log: Arc<Mutex<DriverLog>>,
}

impl RecordingDriver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn log(&self) -> MutexGuard<'_, DriverLog> {
        self.log.lock()
    }
}

impl GraphicsDriver for RecordingDriver {
    fn create_stage(&self, _stage: StageKind) -> Result<StageHandle, SessionError> {
        let mut log = self.log.lock();
        log.stages_created += 1;
        Ok(StageHandle(log.allocate()))
    }

    fn compile_stage(&self, stage: StageHandle, source: &str) -> Result<(), String> {
        let mut log = self.log.lock();
        log.compiles += 1;
        if let Some(position) = source.find(COMPILE_ERROR_MARKER) {
            let line = source[..position].matches('\n').count() + 1;
            return Err(format!("0:{line}: '#error' : directive encountered"));
        }
        log.stage_sources.insert(stage.raw(), source.to_string());
        Ok(())
    }

    fn delete_stage(&self, stage: StageHandle) {
        let mut log = self.log.lock();
        log.stages_deleted += 1;
        log.stage_sources.remove(&stage.raw());
    }

    fn create_program(&self) -> Result<ProgramHandle, SessionError> {
        let mut log = self.log.lock();
        log.programs_created += 1;
        let name = log.allocate();
        log.program_stages.insert(name.get(), Vec::new());
        Ok(ProgramHandle(name))
    }

    fn attach_stage(&self, program: ProgramHandle, stage: StageHandle) {
        let mut log = self.log.lock();
        log.program_stages
            .entry(program.raw())
            .or_default()
            .push(stage.raw());
    }

    fn link_program(&self, program: ProgramHandle) -> Result<(), String> {
        let mut log = self.log.lock();
        let broken = log
            .program_stages
            .get(&program.raw())
            .into_iter()
            .flatten()
            .filter_map(|stage| log.stage_sources.get(stage))
            .any(|source| source.contains(LINK_ERROR_MARKER));
        if broken {
            return Err("error: linking failed, unresolved varying".to_string());
        }
        log.linked.insert(program.raw());
        Ok(())
    }

    fn delete_program(&self, program: ProgramHandle) {
        let mut log = self.log.lock();
        log.programs_deleted += 1;
        log.program_stages.remove(&program.raw());
        log.linked.remove(&program.raw());
    }

    fn use_program(&self, program: Option<ProgramHandle>) {
        let mut log = self.log.lock();
        log.bound = program.map(ProgramHandle::raw);
        log.pending_uniforms.clear();
    }

    fn set_uniform_f32(&self, program: ProgramHandle, name: &str, value: f32) -> bool {
        self.log
            .lock()
            .push_uniform(program, name, UniformValue::Float(value))
    }

    fn set_uniform_vec2(&self, program: ProgramHandle, name: &str, value: [f32; 2]) -> bool {
        self.log
            .lock()
            .push_uniform(program, name, UniformValue::Vec2(value))
    }

    fn create_quad(&self, _vertices: &[f32], _indices: &[u32]) -> Result<QuadHandle, SessionError> {
        let mut log = self.log.lock();
        log.quads_created += 1;
        Ok(QuadHandle {
            vertex_array: log.allocate(),
            vertex_buffer: log.allocate(),
            index_buffer: log.allocate(),
        })
    }

    fn draw_quad(&self, _quad: &QuadHandle, index_count: i32) {
        let mut log = self.log.lock();
        let program = log.bound.unwrap_or(0);
        let uniforms = std::mem::take(&mut log.pending_uniforms);
        log.draws.push(DrawCall {
            program,
            index_count,
            uniforms,
        });
    }

    fn delete_quad(&self, _quad: QuadHandle) {
        self.log.lock().quads_deleted += 1;
    }

    fn set_viewport(&self, viewport: Viewport) {
        self.log.lock().viewport = Some(viewport);
    }

    fn clear(&self, _color: [f32; 4]) {
        self.log.lock().clears += 1;
    }

    fn read_pixels(&self, viewport: Viewport) -> Result<Vec<u8>, SessionError> {
        if self.log.lock().fail_read_back {
            return Err(SessionError::Driver("read-back failed".into()));
        }
        // each row is filled with its own index so orientation can be checked
        let row_bytes = viewport.width as usize * 4;
        let mut pixels = Vec::with_capacity(row_bytes * viewport.height as usize);
        for row in 0..viewport.height {
            pixels.extend(std::iter::repeat(row as u8).take(row_bytes));
        }
        Ok(pixels)
    }

    fn last_error(&self) -> Option<u32> {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uniform_declarations_are_detected() {
        let source = "uniform float time;\nuniform vec2 resolution;\nuniform float bands[4];";
        assert!(declares_uniform(source, "time"));
        assert!(declares_uniform(source, "resolution"));
        assert!(declares_uniform(source, "bands"));
        assert!(!declares_uniform(source, "speed"));
    }

    #[test]
    fn compile_marker_reports_line() {
        let driver = RecordingDriver::new();
        let stage = driver.create_stage(StageKind::Fragment).unwrap();
        let err = driver
            .compile_stage(stage, "void main() {}\n#error broken\n")
            .unwrap_err();
        assert!(err.starts_with("0:2:"));
    }
}
