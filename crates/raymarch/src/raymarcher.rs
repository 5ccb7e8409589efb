//! Draws registered objects in registration order.
//!
//! The raymarcher owns nothing but ids. Each frame it resolves them against
//! the [`Assets`], binds the material (program, properties, textures), adds
//! the per-object matrices, binds the geometry and issues one draw. There is
//! no sorting, batching or culling.

use std::collections::HashSet;

use glam::Mat4;
use tracing::{debug, warn};

use crate::backend::{DrawCall, GraphicsBackend};
use crate::error::{RenderError, Result};
use crate::scene::{Assets, CameraId, ObjectId, ShaderId};
use crate::uniform::UniformValue;

/// Names of the uniforms set for every object after its material's own.
pub const MODEL_MATRIX: &str = "model_matrix";
pub const VIEW_MATRIX: &str = "view_matrix";
pub const PROJECTION_MATRIX: &str = "projection_matrix";
pub const INV_PROJECTION_MATRIX: &str = "inv_projection_matrix";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RenderStats {
    pub draws: usize,
    /// Objects not drawn because a handle was stale or the shader unlinked.
    pub skipped: usize,
}

#[derive(Debug, Default)]
pub struct ReloadReport {
    pub reloaded: usize,
    pub failed: Vec<(ShaderId, RenderError)>,
}

impl ReloadReport {
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }
}

#[derive(Debug, Default)]
pub struct RayMarcher {
    camera: Option<CameraId>,
    objects: Vec<ObjectId>,
}

impl RayMarcher {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_camera(&mut self, camera: CameraId) {
        self.camera = Some(camera);
    }

    #[must_use]
    pub fn camera(&self) -> Option<CameraId> {
        self.camera
    }

    /// Appends to the draw list. Adding an object twice draws it twice.
    pub fn add_object(&mut self, object: ObjectId) {
        self.objects.push(object);
    }

    #[must_use]
    pub fn objects(&self) -> &[ObjectId] {
        &self.objects
    }

    /// Takes every registration of `object` off the draw list.
    pub fn remove_object(&mut self, object: ObjectId) {
        self.objects.retain(|&id| id != object);
    }

    pub fn clear_objects(&mut self) {
        self.objects.clear();
    }

    /// Draws every registered object once.
    ///
    /// # Errors
    ///
    /// [`RenderError::NoCamera`] if no camera is set,
    /// [`RenderError::StaleHandle`] if the camera no longer exists. Nothing is
    /// drawn in either case. Problems with single objects are logged and
    /// counted instead.
    pub fn render<B: GraphicsBackend + ?Sized>(&self, assets: &Assets, backend: &mut B) -> Result<RenderStats> {
        let camera_id = self.camera.ok_or(RenderError::NoCamera)?;
        let camera = assets.cameras.get(camera_id).ok_or(RenderError::StaleHandle("camera"))?;
        let view = UniformValue::Mat4(camera.view_matrix());
        let projection_matrix = camera.projection_matrix();
        let projection = UniformValue::Mat4(projection_matrix);
        let inv_projection = UniformValue::Mat4(projection_matrix.inverse());

        let mut stats = RenderStats::default();
        for &id in &self.objects {
            let Some(object) = assets.objects.get(id) else {
                warn!(?id, "object no longer exists, skipped");
                stats.skipped += 1;
                continue;
            };
            let resolved = assets.materials.get(object.material()).and_then(|material| {
                let shader = assets.shaders.get(material.shader())?;
                let geometry = assets.geometries.get(object.geometry())?;
                Some((material, shader, geometry))
            });
            let Some((material, shader, geometry)) = resolved else {
                warn!(?id, "object refers to a removed material, shader or geometry, skipped");
                stats.skipped += 1;
                continue;
            };
            if !material.bind(shader, backend) {
                warn!(?id, "shader {:?} is not linked, skipped", shader.paths().1);
                stats.skipped += 1;
                continue;
            }

            backend.set_uniform(MODEL_MATRIX, &UniformValue::Mat4(object.model_matrix()));
            backend.set_uniform(VIEW_MATRIX, &view);
            backend.set_uniform(PROJECTION_MATRIX, &projection);
            backend.set_uniform(INV_PROJECTION_MATRIX, &inv_projection);

            geometry.bind(backend);
            backend.draw(DrawCall {
                topology: geometry.topology(),
                count: geometry.draw_count(),
                indexed: geometry.is_indexed(),
            });
            stats.draws += 1;
        }
        debug!(draws = stats.draws, skipped = stats.skipped, "frame rendered");
        Ok(stats)
    }

    /// Distinct shaders used by the registered objects, first use first.
    #[must_use]
    pub fn shaders_in_use(&self, assets: &Assets) -> Vec<ShaderId> {
        let mut seen = HashSet::new();
        self.objects
            .iter()
            .filter_map(|&id| assets.objects.get(id))
            .filter_map(|object| assets.materials.get(object.material()))
            .map(|material| material.shader())
            .filter(|shader| seen.insert(*shader))
            .collect()
    }

    /// Reloads every distinct shader in use exactly once.
    ///
    /// Failures leave the affected shader on its previous program and are
    /// collected in the report.
    pub fn reload_shaders<B: GraphicsBackend + ?Sized>(&self, assets: &mut Assets, backend: &mut B) -> ReloadReport {
        let mut report = ReloadReport::default();
        for id in self.shaders_in_use(assets) {
            let Some(shader) = assets.shaders.get_mut(id) else {
                continue;
            };
            match shader.reload(backend) {
                Ok(()) => report.reloaded += 1,
                Err(e) => report.failed.push((id, e)),
            }
        }
        report
    }
}

/// Model matrix placing the `[-1, 1]` cube proxy around a box of half extents
/// `half_size` centred on `center`.
#[must_use]
pub fn proxy_model_matrix(center: glam::Vec3, half_size: glam::Vec3) -> Mat4 {
    Mat4::from_translation(center) * Mat4::from_scale(half_size)
}
