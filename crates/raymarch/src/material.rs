//! Materials: a shader plus the uniform values and textures it is drawn with.

use std::collections::BTreeMap;

use tracing::trace;

use crate::backend::{GraphicsBackend, TextureHandle};
use crate::scene::ShaderId;
use crate::shader::ShaderProgram;
use crate::uniform::UniformValue;

#[derive(Debug, Clone)]
pub struct Material {
    shader: ShaderId,
    properties: BTreeMap<String, UniformValue>,
    /// Sampler name and texture, in the order they were added. The position
    /// is the texture unit.
    textures: Vec<(String, TextureHandle)>,
}

impl Material {
    #[must_use]
    pub fn new(shader: ShaderId) -> Self {
        Self {
            shader,
            properties: BTreeMap::new(),
            textures: Vec::new(),
        }
    }

    #[must_use]
    pub fn shader(&self) -> ShaderId {
        self.shader
    }

    /// Stores `value` under `name`, replacing any earlier value of any type.
    pub fn set_property(&mut self, name: impl Into<String>, value: impl Into<UniformValue>) {
        self.properties.insert(name.into(), value.into());
    }

    #[must_use]
    pub fn property(&self, name: &str) -> Option<UniformValue> {
        self.properties.get(name).copied()
    }

    pub fn properties(&self) -> impl Iterator<Item = (&str, &UniformValue)> {
        self.properties.iter().map(|(name, value)| (name.as_str(), value))
    }

    /// Samples `texture` through the shader texture called `sampler`.
    ///
    /// A sampler name added twice keeps its unit and takes the new texture.
    pub fn add_texture(&mut self, sampler: impl Into<String>, texture: TextureHandle) {
        let sampler = sampler.into();
        match self.textures.iter_mut().find(|(name, _)| *name == sampler) {
            Some(entry) => entry.1 = texture,
            None => self.textures.push((sampler, texture)),
        }
    }

    /// `(sampler name, texture)` pairs; the index of a pair is its unit.
    #[must_use]
    pub fn textures(&self) -> &[(String, TextureHandle)] {
        &self.textures
    }

    /// Makes `shader` current and uploads every property and texture.
    ///
    /// The program's previous uniforms and sampler units are reset first, so
    /// materials sharing a shader never see each other's values. `shader`
    /// must be the program this material was created with. Returns false
    /// without touching the backend if it is not linked.
    pub fn bind<B: GraphicsBackend + ?Sized>(&self, shader: &ShaderProgram, backend: &mut B) -> bool {
        if !shader.use_program(backend) {
            return false;
        }
        backend.reset_program_state();
        for (name, value) in &self.properties {
            backend.set_uniform(name, value);
        }
        for (unit, (sampler, texture)) in (0u32..).zip(&self.textures) {
            backend.bind_texture(unit, *texture);
            backend.set_sampler_unit(sampler, unit);
        }
        trace!(
            properties = self.properties.len(),
            textures = self.textures.len(),
            "material bound"
        );
        true
    }
}
