#![warn(clippy::all, clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

//! SDF raymarching render pipeline.
//!
//! Geometries, shader programs, materials, cameras and render objects live in
//! a [`Scene`]; each frame the [`RayMarcher`] draws the registered objects in
//! order through a [`GraphicsBackend`].

pub mod backend;
pub mod camera;
pub mod config;
pub mod error;
pub mod events;
pub mod geometry;
pub mod material;
pub mod object;
pub mod raymarcher;
pub mod reflect;
pub mod scene;
pub mod shader;
pub mod texture;
pub mod uniform;

pub use backend::{GraphicsBackend, ProgramHandle, ShaderStage, TextureHandle};
#[cfg(feature = "mock")]
pub use backend::{GpuCommand, RecordingBackend};
#[cfg(feature = "gpu")]
pub use backend::WgpuBackend;
pub use camera::Camera;
pub use config::RendererConfig;
pub use error::{RenderError, Result};
pub use events::{FrameControl, FrameEvent, Key};
pub use geometry::{Geometry, GeometryDesc, Topology};
pub use material::Material;
pub use object::RenderObject;
pub use raymarcher::{RayMarcher, ReloadReport, RenderStats};
pub use scene::{Assets, CameraId, GeometryId, MaterialId, ObjectId, Scene, ShaderId};
pub use shader::ShaderProgram;
pub use texture::{TextureFormat, TextureImage};
pub use uniform::{UniformType, UniformValue};
