//! The seam between the render pipeline and a GPU.
//!
//! [`GraphicsBackend`] is shaped like a classic bind-before-use context: a
//! program is made current, uniforms are set by name on the current program,
//! textures are bound to numbered units, a mesh is bound, then a draw is
//! issued. Nothing carries over implicitly between components; whoever draws
//! rebinds everything it needs first.
//!
//! Two implementations exist:
//! - [`RecordingBackend`] (feature `mock`) keeps the bound state in memory and
//!   records every call, which is what the tests inspect.
//! - [`WgpuBackend`] (feature `gpu`) drives a real device through `wgpu`.

use std::fmt;
use std::path::PathBuf;

use crate::error::Result;
use crate::geometry::Topology;
use crate::texture::TextureImage;
use crate::uniform::UniformValue;

#[cfg(feature = "mock")]
mod recording;
#[cfg(feature = "gpu")]
mod wgpu_backend;

#[cfg(feature = "mock")]
pub use recording::{GpuCommand, RecordedDraw, RecordingBackend};
#[cfg(feature = "gpu")]
pub use wgpu_backend::WgpuBackend;

macro_rules! gpu_handle {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name(pub(crate) u32);

        impl $name {
            /// Raw backend id. Never zero for a handle handed out by a backend.
            #[must_use]
            pub const fn raw(self) -> u32 {
                self.0
            }
        }
    };
}

gpu_handle!(
    /// A linked GPU program.
    ProgramHandle
);
gpu_handle!(
    /// Vertex (and optional index) buffers of one mesh.
    MeshHandle
);
gpu_handle!(
    /// A 2D texture object.
    TextureHandle
);

/// Location of a uniform inside a linked program.
///
/// Locations are assigned in name order, so two programs linked from the same
/// sources agree on every location.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct UniformLocation(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ShaderStage {
    Vertex,
    Fragment,
}

impl ShaderStage {
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            ShaderStage::Vertex => "vertex",
            ShaderStage::Fragment => "fragment",
        }
    }
}

impl fmt::Display for ShaderStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Source text of one shader stage together with the file it came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageSource {
    pub stage: ShaderStage,
    pub path: PathBuf,
    pub code: String,
}

impl StageSource {
    pub fn new(stage: ShaderStage, path: impl Into<PathBuf>, code: impl Into<String>) -> Self {
        Self {
            stage,
            path: path.into(),
            code: code.into(),
        }
    }
}

/// Vertex positions and optional indices to upload as one mesh.
#[derive(Debug, Clone, Copy)]
pub struct MeshUpload<'a> {
    pub vertices: &'a [[f32; 3]],
    pub indices: Option<&'a [u32]>,
}

/// One draw of the currently bound mesh with the current program.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DrawCall {
    pub topology: Topology,
    pub count: u32,
    pub indexed: bool,
}

/// GPU operations the render pipeline needs.
///
/// Implementations are used from a single thread; every call completes before
/// it returns.
pub trait GraphicsBackend {
    /// Allocates and fills the buffers of a mesh.
    fn create_mesh(&mut self, upload: &MeshUpload<'_>) -> MeshHandle;

    /// Makes `mesh` the source of vertices and indices for following draws.
    fn bind_mesh(&mut self, mesh: MeshHandle);

    fn destroy_mesh(&mut self, mesh: MeshHandle);

    /// Compiles both stages and links them into a program.
    ///
    /// # Errors
    ///
    /// Returns [`crate::RenderError::ShaderCompileFailed`] naming the stage
    /// that failed, or [`crate::RenderError::ShaderLinkFailed`] when the stages
    /// compile but do not fit together. Nothing is allocated on failure.
    fn link_program(&mut self, vertex: &StageSource, fragment: &StageSource) -> Result<ProgramHandle>;

    /// Makes `program` current for uniform updates and draws.
    fn use_program(&mut self, program: ProgramHandle);

    fn destroy_program(&mut self, program: ProgramHandle);

    /// Looks up a settable uniform. `None` if the program does not declare it.
    fn uniform_location(&self, program: ProgramHandle, name: &str) -> Option<UniformLocation>;

    /// Sets a uniform on the current program.
    ///
    /// Unknown names are ignored. A value whose type differs from the declared
    /// one is rejected and logged.
    fn set_uniform(&mut self, name: &str, value: &UniformValue);

    /// Points the texture called `name` in the current program at `unit`.
    fn set_sampler_unit(&mut self, name: &str, unit: u32);

    /// Zeroes every uniform of the current program and unpoints all its
    /// textures, so nothing set for an earlier draw reaches the next one.
    fn reset_program_state(&mut self);

    /// Creates a texture, filled from `image` when one is given.
    ///
    /// A texture created from `None` is still valid to bind and sample.
    fn create_texture(&mut self, image: Option<&TextureImage>) -> TextureHandle;

    fn bind_texture(&mut self, unit: u32, texture: TextureHandle);

    fn destroy_texture(&mut self, texture: TextureHandle);

    /// Resizes the render target.
    fn set_viewport(&mut self, width: u32, height: u32);

    /// Starts a frame, clearing colour and depth.
    ///
    /// # Errors
    ///
    /// Returns [`crate::RenderError::Surface`] when no frame can be acquired.
    fn begin_frame(&mut self, clear_color: [f32; 4]) -> Result<()>;

    /// Draws the bound mesh with the current program, uniforms and textures.
    fn draw(&mut self, call: DrawCall);

    /// Submits everything drawn since [`GraphicsBackend::begin_frame`].
    ///
    /// # Errors
    ///
    /// Returns [`crate::RenderError::Surface`] if presenting fails.
    fn end_frame(&mut self) -> Result<()>;
}
