//! Renderer configuration

use std::path::{Path, PathBuf};

/// Settings for a [`crate::Scene`]
#[derive(Clone, Debug, PartialEq)]
pub struct RendererConfig {
    /// Window title
    pub title: String,
    /// Initial framebuffer width in pixels
    pub width: u32,
    /// Initial framebuffer height in pixels
    pub height: u32,
    /// Directory shader file names are resolved against
    pub shader_root: PathBuf,
    /// Directory texture file names are resolved against
    pub texture_root: PathBuf,
    /// Colour the frame is cleared to
    pub clear_color: [f32; 4],
    /// Reload shaders when files under `shader_root` change
    pub watch_shaders: bool,
}

impl Default for RendererConfig {
    fn default() -> Self {
        Self {
            title: "SDF raymarcher".to_owned(),
            width: 1280,
            height: 720,
            shader_root: PathBuf::from("shaders"),
            texture_root: PathBuf::from("textures"),
            clear_color: [0.0, 0.0, 0.0, 1.0],
            watch_shaders: true,
        }
    }
}

impl RendererConfig {
    pub fn shader_path(&self, name: impl AsRef<Path>) -> PathBuf {
        self.shader_root.join(name)
    }

    pub fn texture_path(&self, name: impl AsRef<Path>) -> PathBuf {
        self.texture_root.join(name)
    }

    /// Width over height, 1.0 for a degenerate size
    pub fn aspect(&self) -> f32 {
        if self.width == 0 || self.height == 0 {
            1.0
        } else {
            self.width as f32 / self.height as f32
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn paths_resolve_against_roots() {
        let config = RendererConfig {
            shader_root: PathBuf::from("/data/shaders"),
            ..Default::default()
        };
        assert_eq!(config.shader_path("a.frag.wgsl"), Path::new("/data/shaders/a.frag.wgsl"));
        assert_eq!(config.texture_path("test.png"), Path::new("textures/test.png"));
    }

    #[test]
    fn aspect_handles_zero_height() {
        let mut config = RendererConfig::default();
        assert!((config.aspect() - 16.0 / 9.0).abs() < 1e-6);
        config.height = 0;
        assert_eq!(config.aspect(), 1.0);
    }
}
