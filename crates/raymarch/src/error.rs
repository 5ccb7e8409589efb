//! Error kinds reported by the render pipeline.
//!
//! Every failure is reported where it happens. Shader and texture failures are
//! recoverable: the caller keeps the last good program or gets a blank texture
//! back, and the frame loop carries on.

use std::path::PathBuf;

use thiserror::Error;

use crate::backend::ShaderStage;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RenderError {
    #[error("failed to create window: {0}")]
    WindowCreationFailed(String),
    #[error("failed to initialise graphics device: {0}")]
    GraphicsLoaderFailed(String),
    #[error("{stage} shader `{}` failed to compile:\n{log}", path.display())]
    ShaderCompileFailed {
        stage: ShaderStage,
        path: PathBuf,
        log: String,
    },
    #[error("shader program failed to link:\n{log}")]
    ShaderLinkFailed { log: String },
    #[error("failed to load texture `{}`: {reason}", path.display())]
    TextureLoadFailed { path: PathBuf, reason: String },
    #[error("unsupported texture channel layout: {channels} channel(s)")]
    UnsupportedChannelLayout { channels: u8 },
    #[error("geometry has no vertices or no indices to draw")]
    EmptyGeometry,
    #[error("geometry with {len} elements exceeds the 32-bit draw range")]
    GeometryTooLarge { len: usize },
    #[error("index {index} out of range for geometry with {vertex_count} vertices")]
    IndexOutOfRange { index: u32, vertex_count: u32 },
    #[error("no camera set on the raymarcher")]
    NoCamera,
    #[error("stale {0} handle")]
    StaleHandle(&'static str),
    #[error("surface error: {0}")]
    Surface(String),
}

impl RenderError {
    /// True for the failures after which the process cannot continue.
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            RenderError::WindowCreationFailed(_) | RenderError::GraphicsLoaderFailed(_)
        )
    }
}

pub type Result<T, E = RenderError> = std::result::Result<T, E>;
