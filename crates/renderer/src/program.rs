use std::path::Path;

use tracing::{debug, trace};

use crate::driver::{GraphicsDriver, ProgramHandle, QuadHandle, StageHandle, QUAD_INDICES};
use crate::error::SessionError;
use crate::source::ShaderSource;
use crate::state::UniformSet;
use crate::types::StageKind;

/// Name of the vec2 uniform carrying the viewport size in pixels.
pub const RESOLUTION_UNIFORM: &str = "resolution";

/// A linked program and the stages it owns.
#[derive(Debug)]
struct LinkedPipeline {
    program: ProgramHandle,
    stages: Vec<StageHandle>,
}

impl LinkedPipeline {
    fn release<D: GraphicsDriver>(self, driver: &D) {
        for stage in self.stages {
            driver.delete_stage(stage);
        }
        driver.delete_program(self.program);
    }
}

/// One shader variant: a vertex/fragment pair compiled and linked from disk.
///
/// The pipeline is only ever replaced by a fully linked one, so whatever is
/// visible to the renderer can always be drawn.
#[derive(Debug)]
pub struct ShaderProgram {
    source: ShaderSource,
    pipeline: Option<LinkedPipeline>,
}

impl ShaderProgram {
    /// Compiles both stages of `source` and links them.
    pub fn build<D: GraphicsDriver>(driver: &D, source: ShaderSource) -> Result<Self, SessionError> {
        let pipeline = build_pipeline(driver, &source)?;
        debug!(
            base = %source.base().display(),
            program = pipeline.program.raw(),
            "linked shader program"
        );
        Ok(Self {
            source,
            pipeline: Some(pipeline),
        })
    }

    pub fn source(&self) -> &ShaderSource {
        &self.source
    }

    pub fn path(&self) -> &Path {
        self.source.base()
    }

    pub fn is_linked(&self) -> bool {
        self.pipeline.is_some()
    }

    pub fn handle(&self) -> Option<ProgramHandle> {
        self.pipeline.as_ref().map(|pipeline| pipeline.program)
    }

    /// Rebuilds the program from the current contents of its source files.
    ///
    /// The replacement is compiled and linked first; the previous pipeline is
    /// released only once that succeeds. On failure the previous pipeline is
    /// left in place and the error is returned.
    pub fn reload<D: GraphicsDriver>(&mut self, driver: &D) -> Result<(), SessionError> {
        let replacement = build_pipeline(driver, &self.source)?;
        trace!(
            base = %self.source.base().display(),
            program = replacement.program.raw(),
            "reloaded shader program"
        );
        if let Some(previous) = self.pipeline.replace(replacement) {
            previous.release(driver);
        }
        Ok(())
    }

    /// Binds the program, pushes `resolution` and every uniform in
    /// `uniforms`, and draws the quad.
    ///
    /// Uniforms the program does not declare are skipped.
    pub fn run<D: GraphicsDriver>(
        &self,
        driver: &D,
        quad: &QuadHandle,
        resolution: [f32; 2],
        uniforms: &UniformSet,
    ) -> Result<(), SessionError> {
        let pipeline = self
            .pipeline
            .as_ref()
            .ok_or_else(|| SessionError::NotLinked {
                path: self.source.base().to_path_buf(),
            })?;

        driver.use_program(Some(pipeline.program));
        driver.set_uniform_vec2(pipeline.program, RESOLUTION_UNIFORM, resolution);
        for (name, value) in uniforms {
            if !driver.set_uniform_f32(pipeline.program, name, *value) {
                trace!(uniform = %name, "uniform not declared by program; skipped");
            }
        }
        driver.draw_quad(quad, QUAD_INDICES.len() as i32);
        driver.use_program(None);

        // glGetError queues one flag per error class, so a handful drains it
        for code in std::iter::from_fn(|| driver.last_error()).take(8) {
            debug!(
                base = %self.source.base().display(),
                "driver reported error 0x{code:04x} while drawing"
            );
        }
        Ok(())
    }

    /// Releases the pipeline and its stages. Safe to call more than once.
    pub fn delete<D: GraphicsDriver>(&mut self, driver: &D) {
        if let Some(pipeline) = self.pipeline.take() {
            pipeline.release(driver);
        }
    }
}

fn build_pipeline<D: GraphicsDriver>(
    driver: &D,
    source: &ShaderSource,
) -> Result<LinkedPipeline, SessionError> {
    let stages = compile(driver, source)?;
    link(driver, source, stages)
}

/// Compiles the vertex then the fragment stage. A failing stage releases
/// whatever was compiled before it.
fn compile<D: GraphicsDriver>(
    driver: &D,
    source: &ShaderSource,
) -> Result<Vec<StageHandle>, SessionError> {
    let vertex = compile_stage(driver, source, StageKind::Vertex)?;
    match compile_stage(driver, source, StageKind::Fragment) {
        Ok(fragment) => Ok(vec![vertex, fragment]),
        Err(err) => {
            driver.delete_stage(vertex);
            Err(err)
        }
    }
}

fn compile_stage<D: GraphicsDriver>(
    driver: &D,
    source: &ShaderSource,
    stage: StageKind,
) -> Result<StageHandle, SessionError> {
    let text = source.read_stage(stage)?;
    let handle = driver.create_stage(stage)?;
    if let Err(log) = driver.compile_stage(handle, &text) {
        driver.delete_stage(handle);
        return Err(SessionError::Compile {
            stage,
            path: source.stage_path(stage),
            log: log.trim_end().to_string(),
        });
    }
    Ok(handle)
}

fn link<D: GraphicsDriver>(
    driver: &D,
    source: &ShaderSource,
    stages: Vec<StageHandle>,
) -> Result<LinkedPipeline, SessionError> {
    let program = match driver.create_program() {
        Ok(program) => program,
        Err(err) => {
            for stage in stages {
                driver.delete_stage(stage);
            }
            return Err(err);
        }
    };
    for stage in &stages {
        driver.attach_stage(program, *stage);
    }

    let pipeline = LinkedPipeline { program, stages };
    if let Err(log) = driver.link_program(program) {
        pipeline.release(driver);
        return Err(SessionError::Link {
            path: source.base().to_path_buf(),
            log: log.trim_end().to_string(),
        });
    }
    Ok(pipeline)
}
