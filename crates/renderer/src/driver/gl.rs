use std::ffi::c_void;

use glow::HasContext;

use crate::error::SessionError;
use crate::types::{GlApi, StageKind, Viewport};

use super::{GraphicsDriver, ProgramHandle, QuadHandle, StageHandle, VERTEX_STRIDE};

/// [`GraphicsDriver`] backed by a `glow` context.
///
/// The same calls serve desktop GL 3.3 core and GLES 3.0; `api` only records
/// which one the context was created for.
pub struct GlowDriver {
    gl: glow::Context,
    api: GlApi,
}

impl GlowDriver {
    /// Loads GL entry points through `loader`.
    ///
    /// # Safety
    ///
    /// The context `loader` resolves against must be current on the calling
    /// thread, and the returned driver must only be used on that thread.
    pub unsafe fn from_loader<F>(api: GlApi, loader: F) -> Self
    where
        F: FnMut(&str) -> *const c_void,
    {
        let gl = glow::Context::from_loader_function(loader);
        Self { gl, api }
    }

    pub fn api(&self) -> GlApi {
        self.api
    }

    /// Human readable `GL_VERSION` string for start-up logging.
    pub fn version_string(&self) -> String {
        unsafe { self.gl.get_parameter_string(glow::VERSION) }
    }
}

fn native_shader(stage: StageHandle) -> glow::NativeShader {
    glow::NativeShader(stage.0)
}

fn native_program(program: ProgramHandle) -> glow::NativeProgram {
    glow::NativeProgram(program.0)
}

impl GraphicsDriver for GlowDriver {
    fn create_stage(&self, stage: StageKind) -> Result<StageHandle, SessionError> {
        let kind = match stage {
            StageKind::Vertex => glow::VERTEX_SHADER,
            StageKind::Fragment => glow::FRAGMENT_SHADER,
        };
        let shader = unsafe { self.gl.create_shader(kind) }.map_err(SessionError::Driver)?;
        Ok(StageHandle(shader.0))
    }

    fn compile_stage(&self, stage: StageHandle, source: &str) -> Result<(), String> {
        let shader = native_shader(stage);
        unsafe {
            self.gl.shader_source(shader, source);
            self.gl.compile_shader(shader);
            if self.gl.get_shader_compile_status(shader) {
                Ok(())
            } else {
                Err(self.gl.get_shader_info_log(shader))
            }
        }
    }

    fn delete_stage(&self, stage: StageHandle) {
        unsafe { self.gl.delete_shader(native_shader(stage)) }
    }

    fn create_program(&self) -> Result<ProgramHandle, SessionError> {
        let program = unsafe { self.gl.create_program() }.map_err(SessionError::Driver)?;
        Ok(ProgramHandle(program.0))
    }

    fn attach_stage(&self, program: ProgramHandle, stage: StageHandle) {
        unsafe {
            self.gl
                .attach_shader(native_program(program), native_shader(stage))
        }
    }

    fn link_program(&self, program: ProgramHandle) -> Result<(), String> {
        let program = native_program(program);
        unsafe {
            self.gl.link_program(program);
            if self.gl.get_program_link_status(program) {
                Ok(())
            } else {
                Err(self.gl.get_program_info_log(program))
            }
        }
    }

    fn delete_program(&self, program: ProgramHandle) {
        unsafe { self.gl.delete_program(native_program(program)) }
    }

    fn use_program(&self, program: Option<ProgramHandle>) {
        unsafe { self.gl.use_program(program.map(native_program)) }
    }

    fn set_uniform_f32(&self, program: ProgramHandle, name: &str, value: f32) -> bool {
        unsafe {
            match self.gl.get_uniform_location(native_program(program), name) {
                Some(location) => {
                    self.gl.uniform_1_f32(Some(&location), value);
                    true
                }
                None => false,
            }
        }
    }

    fn set_uniform_vec2(&self, program: ProgramHandle, name: &str, value: [f32; 2]) -> bool {
        unsafe {
            match self.gl.get_uniform_location(native_program(program), name) {
                Some(location) => {
                    self.gl.uniform_2_f32(Some(&location), value[0], value[1]);
                    true
                }
                None => false,
            }
        }
    }

    fn create_quad(&self, vertices: &[f32], indices: &[u32]) -> Result<QuadHandle, SessionError> {
        let gl = &self.gl;
        unsafe {
            let vertex_array = gl.create_vertex_array().map_err(SessionError::Driver)?;
            let vertex_buffer = match gl.create_buffer() {
                Ok(buffer) => buffer,
                Err(err) => {
                    gl.delete_vertex_array(vertex_array);
                    return Err(SessionError::Driver(err));
                }
            };
            let index_buffer = match gl.create_buffer() {
                Ok(buffer) => buffer,
                Err(err) => {
                    gl.delete_buffer(vertex_buffer);
                    gl.delete_vertex_array(vertex_array);
                    return Err(SessionError::Driver(err));
                }
            };

            gl.bind_vertex_array(Some(vertex_array));

            gl.bind_buffer(glow::ARRAY_BUFFER, Some(vertex_buffer));
            gl.buffer_data_u8_slice(
                glow::ARRAY_BUFFER,
                bytemuck::cast_slice(vertices),
                glow::STATIC_DRAW,
            );

            gl.bind_buffer(glow::ELEMENT_ARRAY_BUFFER, Some(index_buffer));
            gl.buffer_data_u8_slice(
                glow::ELEMENT_ARRAY_BUFFER,
                bytemuck::cast_slice(indices),
                glow::STATIC_DRAW,
            );

            // position only; the colour triple is skipped by the stride
            gl.vertex_attrib_pointer_f32(0, 3, glow::FLOAT, false, VERTEX_STRIDE, 0);
            gl.enable_vertex_attrib_array(0);

            gl.bind_vertex_array(None);

            Ok(QuadHandle {
                vertex_array: vertex_array.0,
                vertex_buffer: vertex_buffer.0,
                index_buffer: index_buffer.0,
            })
        }
    }

    fn draw_quad(&self, quad: &QuadHandle, index_count: i32) {
        unsafe {
            self.gl
                .bind_vertex_array(Some(glow::NativeVertexArray(quad.vertex_array)));
            self.gl
                .draw_elements(glow::TRIANGLE_FAN, index_count, glow::UNSIGNED_INT, 0);
            self.gl.bind_vertex_array(None);
        }
    }

    fn delete_quad(&self, quad: QuadHandle) {
        unsafe {
            self.gl
                .delete_buffer(glow::NativeBuffer(quad.index_buffer));
            self.gl
                .delete_buffer(glow::NativeBuffer(quad.vertex_buffer));
            self.gl
                .delete_vertex_array(glow::NativeVertexArray(quad.vertex_array));
        }
    }

    fn set_viewport(&self, viewport: Viewport) {
        unsafe {
            self.gl
                .viewport(0, 0, viewport.width as i32, viewport.height as i32)
        }
    }

    fn clear(&self, color: [f32; 4]) {
        unsafe {
            self.gl.clear_color(color[0], color[1], color[2], color[3]);
            self.gl.clear(glow::COLOR_BUFFER_BIT);
        }
    }

    fn read_pixels(&self, viewport: Viewport) -> Result<Vec<u8>, SessionError> {
        let mut pixels = vec![0u8; viewport.width as usize * viewport.height as usize * 4];
        unsafe {
            self.gl.pixel_store_i32(glow::PACK_ALIGNMENT, 1);
            self.gl.read_pixels(
                0,
                0,
                viewport.width as i32,
                viewport.height as i32,
                glow::RGBA,
                glow::UNSIGNED_BYTE,
                glow::PixelPackData::Slice(&mut pixels),
            );
        }
        match self.last_error() {
            Some(code) => Err(SessionError::Driver(format!(
                "glReadPixels failed with error 0x{code:04x}"
            ))),
            None => Ok(pixels),
        }
    }

    fn last_error(&self) -> Option<u32> {
        let code = unsafe { self.gl.get_error() };
        (code != glow::NO_ERROR).then_some(code)
    }
}
