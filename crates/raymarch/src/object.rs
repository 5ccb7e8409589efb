use glam::Mat4;

use crate::scene::{GeometryId, MaterialId};

/// One drawable: a geometry drawn with a material under a model transform.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RenderObject {
    geometry: GeometryId,
    material: MaterialId,
    model: Mat4,
}

impl RenderObject {
    #[must_use]
    pub fn new(geometry: GeometryId, material: MaterialId) -> Self {
        Self {
            geometry,
            material,
            model: Mat4::IDENTITY,
        }
    }

    pub fn set_model_matrix(&mut self, model: Mat4) {
        self.model = model;
    }

    #[must_use]
    pub fn model_matrix(&self) -> Mat4 {
        self.model
    }

    #[must_use]
    pub fn geometry(&self) -> GeometryId {
        self.geometry
    }

    #[must_use]
    pub fn material(&self) -> MaterialId {
        self.material
    }
}
