//! Shader programs loaded from a vertex and a fragment file.
//!
//! A [`ShaderProgram`] is either unlinked or holds one live program. Reloading
//! re-reads both files and links a fresh program; the old one is only released
//! once the new one has linked, so a broken edit never takes a working shader
//! away.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::{error, info};

use crate::backend::{GraphicsBackend, ProgramHandle, ShaderStage, StageSource, UniformLocation};
use crate::error::{RenderError, Result};

#[derive(Debug)]
pub struct ShaderProgram {
    vertex_path: PathBuf,
    fragment_path: PathBuf,
    program: Option<ProgramHandle>,
}

fn read_stage(stage: ShaderStage, path: &Path) -> Result<StageSource> {
    let code = fs::read_to_string(path).map_err(|e| RenderError::ShaderCompileFailed {
        stage,
        path: path.to_path_buf(),
        log: format!("failed to read shader source: {e}"),
    })?;
    Ok(StageSource::new(stage, path, code))
}

impl ShaderProgram {
    /// An unlinked program. Nothing is read until [`Self::reload`].
    pub fn new(vertex_path: impl Into<PathBuf>, fragment_path: impl Into<PathBuf>) -> Self {
        Self {
            vertex_path: vertex_path.into(),
            fragment_path: fragment_path.into(),
            program: None,
        }
    }

    /// Reads, compiles and links both stages.
    ///
    /// # Errors
    ///
    /// See [`Self::reload`].
    pub fn load<B: GraphicsBackend + ?Sized>(
        backend: &mut B,
        vertex_path: impl Into<PathBuf>,
        fragment_path: impl Into<PathBuf>,
    ) -> Result<Self> {
        let mut shader = Self::new(vertex_path, fragment_path);
        shader.reload(backend)?;
        Ok(shader)
    }

    /// Re-reads both source files and relinks.
    ///
    /// On success the previous program is destroyed and replaced. On failure
    /// the previous program, if any, stays current and the diagnostic is both
    /// logged and returned.
    ///
    /// # Errors
    ///
    /// [`RenderError::ShaderCompileFailed`] when a file cannot be read or a
    /// stage does not compile, [`RenderError::ShaderLinkFailed`] when the
    /// stages do not link.
    pub fn reload<B: GraphicsBackend + ?Sized>(&mut self, backend: &mut B) -> Result<()> {
        let linked = read_stage(ShaderStage::Vertex, &self.vertex_path)
            .and_then(|vertex| Ok((vertex, read_stage(ShaderStage::Fragment, &self.fragment_path)?)))
            .and_then(|(vertex, fragment)| backend.link_program(&vertex, &fragment));

        match linked {
            Ok(program) => {
                if let Some(old) = self.program.replace(program) {
                    backend.destroy_program(old);
                }
                info!(
                    vertex = %self.vertex_path.display(),
                    fragment = %self.fragment_path.display(),
                    ?program,
                    "shader program linked"
                );
                Ok(())
            }
            Err(e) => {
                if self.program.is_some() {
                    error!("{e}\nkeeping the previous program");
                } else {
                    error!("{e}");
                }
                Err(e)
            }
        }
    }

    /// Makes the program current. Returns false, and does nothing, while
    /// unlinked.
    pub fn use_program<B: GraphicsBackend + ?Sized>(&self, backend: &mut B) -> bool {
        match self.program {
            Some(program) => {
                backend.use_program(program);
                true
            }
            None => false,
        }
    }

    #[must_use]
    pub fn uniform_location<B: GraphicsBackend + ?Sized>(&self, backend: &B, name: &str) -> Option<UniformLocation> {
        backend.uniform_location(self.program?, name)
    }

    #[must_use]
    pub fn handle(&self) -> Option<ProgramHandle> {
        self.program
    }

    #[must_use]
    pub fn is_linked(&self) -> bool {
        self.program.is_some()
    }

    /// `(vertex, fragment)` source paths.
    #[must_use]
    pub fn paths(&self) -> (&Path, &Path) {
        (&self.vertex_path, &self.fragment_path)
    }

    /// Destroys the program, leaving this shader unlinked.
    pub fn release<B: GraphicsBackend + ?Sized>(&mut self, backend: &mut B) {
        if let Some(program) = self.program.take() {
            backend.destroy_program(program);
        }
    }
}
