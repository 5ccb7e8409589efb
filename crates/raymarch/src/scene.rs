//! The scene context: every GPU resource, the raymarcher and the backend.
//!
//! Resources live in [`Assets`] arenas and refer to each other by id. The
//! scene only hands out shared access to the arenas; removal goes through
//! [`Scene::remove_geometry`] and friends, which free the GPU side and drop
//! the objects left without a part. [`Scene::init`] and [`Scene::shutdown`]
//! bracket the frame loop.

use std::path::Path;

use slotmap::{new_key_type, SlotMap};
use tracing::{debug, info, warn};

use crate::backend::{GraphicsBackend, TextureHandle};
use crate::camera::Camera;
use crate::config::RendererConfig;
use crate::error::{RenderError, Result};
use crate::events::{FrameControl, FrameEvent, Key};
use crate::geometry::{Geometry, GeometryDesc};
use crate::material::Material;
use crate::object::RenderObject;
use crate::raymarcher::{RayMarcher, ReloadReport, RenderStats};
use crate::shader::ShaderProgram;
use crate::texture;

new_key_type! {
    pub struct GeometryId;
    pub struct ShaderId;
    pub struct MaterialId;
    pub struct ObjectId;
    pub struct CameraId;
}

/// Owning storage for everything a frame draws with.
#[derive(Debug, Default)]
pub struct Assets {
    pub geometries: SlotMap<GeometryId, Geometry>,
    pub shaders: SlotMap<ShaderId, ShaderProgram>,
    pub materials: SlotMap<MaterialId, Material>,
    pub objects: SlotMap<ObjectId, RenderObject>,
    pub cameras: SlotMap<CameraId, Camera>,
    pub textures: Vec<TextureHandle>,
}

impl Assets {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Frees every GPU resource and empties all arenas.
    pub fn release<B: GraphicsBackend + ?Sized>(&mut self, backend: &mut B) {
        self.objects.clear();
        self.materials.clear();
        for (_, geometry) in self.geometries.drain() {
            geometry.release(backend);
        }
        for (_, mut shader) in self.shaders.drain() {
            shader.release(backend);
        }
        for texture in self.textures.drain(..) {
            backend.destroy_texture(texture);
        }
        self.cameras.clear();
    }
}

pub struct Scene<B: GraphicsBackend> {
    config: RendererConfig,
    assets: Assets,
    raymarcher: RayMarcher,
    quad: GeometryId,
    cube: GeometryId,
    camera: CameraId,
    backend: B,
    shut_down: bool,
}

impl<B: GraphicsBackend> Scene<B> {
    /// Creates the quad and cube proxies and a camera matching the configured
    /// size, and points the raymarcher at that camera.
    ///
    /// # Errors
    ///
    /// Propagates geometry upload failures.
    pub fn init(mut backend: B, config: RendererConfig) -> Result<Self> {
        let mut assets = Assets::new();
        let quad = assets.geometries.insert(Geometry::quad(&mut backend)?);
        let cube = assets.geometries.insert(Geometry::cube(&mut backend)?);
        let camera = assets.cameras.insert(Camera::new(config.aspect()));

        let mut raymarcher = RayMarcher::new();
        raymarcher.set_camera(camera);
        backend.set_viewport(config.width, config.height);

        info!(width = config.width, height = config.height, "scene initialised");
        Ok(Self {
            config,
            assets,
            raymarcher,
            quad,
            cube,
            camera,
            backend,
            shut_down: false,
        })
    }

    #[must_use]
    pub fn config(&self) -> &RendererConfig {
        &self.config
    }

    #[must_use]
    pub fn assets(&self) -> &Assets {
        &self.assets
    }

    #[must_use]
    pub fn raymarcher(&self) -> &RayMarcher {
        &self.raymarcher
    }

    pub fn raymarcher_mut(&mut self) -> &mut RayMarcher {
        &mut self.raymarcher
    }

    #[must_use]
    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }

    #[must_use]
    pub fn quad(&self) -> GeometryId {
        self.quad
    }

    #[must_use]
    pub fn cube(&self) -> GeometryId {
        self.cube
    }

    #[must_use]
    pub fn camera_id(&self) -> CameraId {
        self.camera
    }

    /// The camera created by [`Self::init`].
    ///
    /// # Errors
    ///
    /// [`RenderError::StaleHandle`] after [`Self::shutdown`].
    pub fn camera(&self) -> Result<&Camera> {
        self.assets.cameras.get(self.camera).ok_or(RenderError::StaleHandle("camera"))
    }

    /// # Errors
    ///
    /// [`RenderError::StaleHandle`] after [`Self::shutdown`].
    pub fn camera_mut(&mut self) -> Result<&mut Camera> {
        self.assets.cameras.get_mut(self.camera).ok_or(RenderError::StaleHandle("camera"))
    }

    /// Uploads a custom mesh.
    ///
    /// # Errors
    ///
    /// See [`Geometry::new`].
    pub fn add_geometry(&mut self, desc: &GeometryDesc<'_>) -> Result<GeometryId> {
        let geometry = Geometry::new(&mut self.backend, desc)?;
        Ok(self.assets.geometries.insert(geometry))
    }

    /// Loads a program from two files under the shader root.
    ///
    /// # Errors
    ///
    /// See [`ShaderProgram::reload`]. Nothing is stored on failure.
    pub fn add_shader(&mut self, vertex: impl AsRef<Path>, fragment: impl AsRef<Path>) -> Result<ShaderId> {
        let shader = ShaderProgram::load(
            &mut self.backend,
            self.config.shader_path(vertex),
            self.config.shader_path(fragment),
        )?;
        Ok(self.assets.shaders.insert(shader))
    }

    /// Stores a program as is, linked or not.
    pub fn insert_shader(&mut self, shader: ShaderProgram) -> ShaderId {
        self.assets.shaders.insert(shader)
    }

    /// # Errors
    ///
    /// [`RenderError::StaleHandle`] if `shader` does not exist.
    pub fn add_material(&mut self, shader: ShaderId) -> Result<MaterialId> {
        if !self.assets.shaders.contains_key(shader) {
            return Err(RenderError::StaleHandle("shader"));
        }
        Ok(self.assets.materials.insert(Material::new(shader)))
    }

    #[must_use]
    pub fn material(&self, id: MaterialId) -> Option<&Material> {
        self.assets.materials.get(id)
    }

    pub fn material_mut(&mut self, id: MaterialId) -> Option<&mut Material> {
        self.assets.materials.get_mut(id)
    }

    /// Creates an object and appends it to the draw list.
    ///
    /// # Errors
    ///
    /// [`RenderError::StaleHandle`] if either id does not exist.
    pub fn add_object(&mut self, geometry: GeometryId, material: MaterialId) -> Result<ObjectId> {
        if !self.assets.geometries.contains_key(geometry) {
            return Err(RenderError::StaleHandle("geometry"));
        }
        if !self.assets.materials.contains_key(material) {
            return Err(RenderError::StaleHandle("material"));
        }
        let id = self.assets.objects.insert(RenderObject::new(geometry, material));
        self.raymarcher.add_object(id);
        Ok(id)
    }

    pub fn object_mut(&mut self, id: ObjectId) -> Option<&mut RenderObject> {
        self.assets.objects.get_mut(id)
    }

    /// Deletes an object and takes it off the draw list. False for an unknown
    /// id.
    pub fn remove_object(&mut self, id: ObjectId) -> bool {
        if self.assets.objects.remove(id).is_none() {
            return false;
        }
        self.raymarcher.remove_object(id);
        true
    }

    /// Frees a geometry's buffers and removes every object drawn with it.
    pub fn remove_geometry(&mut self, id: GeometryId) -> bool {
        let Some(geometry) = self.assets.geometries.remove(id) else {
            return false;
        };
        geometry.release(&mut self.backend);
        self.remove_objects_where(|object| object.geometry() == id);
        true
    }

    /// Removes a material and every object drawn with it.
    pub fn remove_material(&mut self, id: MaterialId) -> bool {
        if self.assets.materials.remove(id).is_none() {
            return false;
        }
        self.remove_objects_where(|object| object.material() == id);
        true
    }

    /// Destroys a shader's program and removes the materials built on it,
    /// along with their objects.
    pub fn remove_shader(&mut self, id: ShaderId) -> bool {
        let Some(mut shader) = self.assets.shaders.remove(id) else {
            return false;
        };
        shader.release(&mut self.backend);
        let orphaned: Vec<MaterialId> = self
            .assets
            .materials
            .iter()
            .filter(|(_, material)| material.shader() == id)
            .map(|(material, _)| material)
            .collect();
        for material in orphaned {
            self.remove_material(material);
        }
        true
    }

    fn remove_objects_where(&mut self, mut doomed: impl FnMut(&RenderObject) -> bool) {
        let ids: Vec<ObjectId> = self
            .assets
            .objects
            .iter()
            .filter(|(_, object)| doomed(object))
            .map(|(id, _)| id)
            .collect();
        for id in ids {
            self.remove_object(id);
        }
        debug!(objects = self.assets.objects.len(), "removed dependent objects");
    }

    /// Loads a texture from under the texture root. Always returns a usable
    /// handle; see [`texture::load_texture`].
    pub fn load_texture(&mut self, name: impl AsRef<Path>, gamma: bool) -> TextureHandle {
        let path = self.config.texture_path(name);
        let handle = texture::load_texture(&mut self.backend, &path, gamma);
        self.assets.textures.push(handle);
        handle
    }

    /// Applies a frame's events in order.
    pub fn process_events(&mut self, events: impl IntoIterator<Item = FrameEvent>) -> FrameControl {
        let mut control = FrameControl::default();
        for event in events {
            match event {
                FrameEvent::Resized { width, height } => self.resize(width, height),
                FrameEvent::KeyPressed(Key::R) => {
                    self.reload_shaders();
                    control.reloaded = true;
                }
                FrameEvent::KeyPressed(Key::Space) => control.toggle_overlay = !control.toggle_overlay,
                FrameEvent::KeyPressed(Key::Escape) | FrameEvent::CloseRequested => control.should_close = true,
                FrameEvent::KeyPressed(Key::Other) => {}
            }
        }
        control
    }

    fn resize(&mut self, width: u32, height: u32) {
        if width == 0 || height == 0 {
            debug!(width, height, "ignoring resize to an empty framebuffer");
            return;
        }
        self.config.width = width;
        self.config.height = height;
        let aspect = self.config.aspect();
        if let Some(camera) = self.assets.cameras.get_mut(self.camera) {
            camera.set_aspect(aspect);
        }
        self.backend.set_viewport(width, height);
    }

    /// Clears, draws every registered object and presents.
    ///
    /// # Errors
    ///
    /// Surface errors from the backend, and [`RenderError::NoCamera`] /
    /// [`RenderError::StaleHandle`] when there is no camera to render with.
    /// The frame is still presented in the latter case.
    pub fn render_frame(&mut self) -> Result<RenderStats> {
        self.backend.begin_frame(self.config.clear_color)?;
        let rendered = self.raymarcher.render(&self.assets, &mut self.backend);
        self.backend.end_frame()?;
        rendered
    }

    pub fn reload_shaders(&mut self) -> ReloadReport {
        let report = self.raymarcher.reload_shaders(&mut self.assets, &mut self.backend);
        if report.is_clean() {
            info!(reloaded = report.reloaded, "shaders reloaded");
        } else {
            warn!(
                reloaded = report.reloaded,
                failed = report.failed.len(),
                "some shaders failed to reload and keep their previous program"
            );
        }
        report
    }

    /// Releases every GPU resource. Later calls do nothing.
    pub fn shutdown(&mut self) {
        if self.shut_down {
            return;
        }
        self.shut_down = true;
        self.raymarcher.clear_objects();
        self.assets.release(&mut self.backend);
        info!("scene shut down");
    }
}

impl<B: GraphicsBackend> Drop for Scene<B> {
    fn drop(&mut self) {
        self.shutdown();
    }
}
