//! GPU meshes used as raymarching proxies.
//!
//! Raymarching only needs something to rasterise so the fragment stage runs:
//! a full-screen quad for whole-scene marching, or a cube around a single
//! object. A [`Geometry`] is immutable once uploaded.

use tracing::debug;

use crate::backend::{GraphicsBackend, MeshHandle, MeshUpload};
use crate::error::{RenderError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Topology {
    Points,
    Lines,
    LineStrip,
    Triangles,
    TriangleStrip,
}

impl Topology {
    #[must_use]
    pub const fn is_strip(self) -> bool {
        matches!(self, Topology::LineStrip | Topology::TriangleStrip)
    }
}

/// Vertex positions and optional indices describing a mesh.
#[derive(Debug, Clone, Copy)]
pub struct GeometryDesc<'a> {
    pub topology: Topology,
    pub vertices: &'a [[f32; 3]],
    pub indices: Option<&'a [u32]>,
}

/// Full-screen quad, drawn as a four vertex triangle strip.
pub const QUAD_VERTICES: [[f32; 3]; 4] = [
    [-1.0, 1.0, 0.0],
    [-1.0, -1.0, 0.0],
    [1.0, 1.0, 0.0],
    [1.0, -1.0, 0.0],
];

pub const CUBE_VERTICES: [[f32; 3]; 8] = [
    [-1.0, -1.0, -1.0],
    [1.0, -1.0, -1.0],
    [-1.0, 1.0, -1.0],
    [1.0, 1.0, -1.0],
    [-1.0, -1.0, 1.0],
    [1.0, -1.0, 1.0],
    [-1.0, 1.0, 1.0],
    [1.0, 1.0, 1.0],
];

/// Two counter-clockwise triangles per face.
pub const CUBE_INDICES: [u32; 36] = [
    1, 0, 2, 1, 2, 3, // back
    0, 4, 6, 0, 6, 2, // left
    4, 5, 7, 4, 7, 6, // front
    5, 1, 3, 5, 3, 7, // right
    7, 3, 2, 7, 2, 6, // top
    1, 5, 4, 1, 4, 0, // bottom
];

/// An uploaded mesh.
#[derive(Debug)]
pub struct Geometry {
    mesh: MeshHandle,
    topology: Topology,
    vertex_count: u32,
    index_count: Option<u32>,
}

fn count(len: usize) -> Result<u32> {
    u32::try_from(len).map_err(|_| RenderError::GeometryTooLarge { len })
}

impl Geometry {
    /// Validates `desc` and uploads it.
    ///
    /// # Errors
    ///
    /// [`RenderError::EmptyGeometry`] when there are no vertices, or the mesh
    /// is indexed with an empty index list. [`RenderError::IndexOutOfRange`]
    /// when an index does not name a vertex. [`RenderError::GeometryTooLarge`]
    /// when a count does not fit a draw call.
    pub fn new<B: GraphicsBackend + ?Sized>(backend: &mut B, desc: &GeometryDesc<'_>) -> Result<Self> {
        if desc.vertices.is_empty() {
            return Err(RenderError::EmptyGeometry);
        }
        let vertex_count = count(desc.vertices.len())?;

        let index_count = match desc.indices {
            None => None,
            Some([]) => return Err(RenderError::EmptyGeometry),
            Some(indices) => {
                if let Some(&index) = indices.iter().find(|&&i| i >= vertex_count) {
                    return Err(RenderError::IndexOutOfRange { index, vertex_count });
                }
                Some(count(indices.len())?)
            }
        };

        let mesh = backend.create_mesh(&MeshUpload {
            vertices: desc.vertices,
            indices: desc.indices,
        });
        debug!(
            ?mesh,
            vertex_count,
            ?index_count,
            topology = ?desc.topology,
            "uploaded geometry"
        );

        Ok(Self {
            mesh,
            topology: desc.topology,
            vertex_count,
            index_count,
        })
    }

    /// The full-screen quad proxy.
    ///
    /// # Errors
    ///
    /// Never fails in practice; the data is constant and valid.
    pub fn quad<B: GraphicsBackend + ?Sized>(backend: &mut B) -> Result<Self> {
        Self::new(
            backend,
            &GeometryDesc {
                topology: Topology::TriangleStrip,
                vertices: &QUAD_VERTICES,
                indices: None,
            },
        )
    }

    /// The unit cube proxy spanning `[-1, 1]` on every axis.
    ///
    /// # Errors
    ///
    /// Never fails in practice; the data is constant and valid.
    pub fn cube<B: GraphicsBackend + ?Sized>(backend: &mut B) -> Result<Self> {
        Self::new(
            backend,
            &GeometryDesc {
                topology: Topology::Triangles,
                vertices: &CUBE_VERTICES,
                indices: Some(&CUBE_INDICES),
            },
        )
    }

    pub fn bind<B: GraphicsBackend + ?Sized>(&self, backend: &mut B) {
        backend.bind_mesh(self.mesh);
    }

    /// Number of indices to draw if indexed, otherwise number of vertices.
    #[must_use]
    pub fn draw_count(&self) -> u32 {
        self.index_count.unwrap_or(self.vertex_count)
    }

    #[must_use]
    pub fn is_indexed(&self) -> bool {
        self.index_count.is_some()
    }

    #[must_use]
    pub fn topology(&self) -> Topology {
        self.topology
    }

    #[must_use]
    pub fn vertex_count(&self) -> u32 {
        self.vertex_count
    }

    #[must_use]
    pub fn mesh(&self) -> MeshHandle {
        self.mesh
    }

    /// Frees the GPU buffers.
    pub fn release<B: GraphicsBackend + ?Sized>(self, backend: &mut B) {
        debug!(mesh = ?self.mesh, "releasing geometry");
        backend.destroy_mesh(self.mesh);
    }
}

#[cfg(all(test, feature = "mock"))]
mod tests {
    use super::*;
    use crate::backend::{GpuCommand, RecordingBackend};

    #[test]
    fn quad_draws_four_vertices() {
        let mut gpu = RecordingBackend::new();
        let quad = Geometry::quad(&mut gpu).unwrap();
        assert_eq!(quad.draw_count(), 4);
        assert!(!quad.is_indexed());
        assert_eq!(quad.topology(), Topology::TriangleStrip);
    }

    #[test]
    fn cube_draws_its_indices() {
        let mut gpu = RecordingBackend::new();
        let cube = Geometry::cube(&mut gpu).unwrap();
        assert_eq!(cube.draw_count(), 36);
        assert_eq!(cube.vertex_count(), 8);
        assert!(cube.is_indexed());
    }

    #[test]
    fn draw_count_matches_descriptor() {
        let mut gpu = RecordingBackend::new();
        let vertices = [[0.0f32; 3]; 5];
        for n in 1..=vertices.len() {
            let plain = Geometry::new(
                &mut gpu,
                &GeometryDesc {
                    topology: Topology::Points,
                    vertices: &vertices[..n],
                    indices: None,
                },
            )
            .unwrap();
            assert_eq!(plain.draw_count() as usize, n);

            let indices: Vec<u32> = (0..n as u32).cycle().take(n * 3).collect();
            let indexed = Geometry::new(
                &mut gpu,
                &GeometryDesc {
                    topology: Topology::Triangles,
                    vertices: &vertices[..n],
                    indices: Some(&indices),
                },
            )
            .unwrap();
            assert_eq!(indexed.draw_count() as usize, n * 3);
        }
    }

    #[test]
    fn empty_vertices_are_rejected_before_upload() {
        let mut gpu = RecordingBackend::new();
        let err = Geometry::new(
            &mut gpu,
            &GeometryDesc {
                topology: Topology::Triangles,
                vertices: &[],
                indices: None,
            },
        )
        .unwrap_err();
        assert_eq!(err, RenderError::EmptyGeometry);
        assert!(gpu.commands().is_empty());
    }

    #[test]
    fn indexed_without_indices_is_empty() {
        let mut gpu = RecordingBackend::new();
        let err = Geometry::new(
            &mut gpu,
            &GeometryDesc {
                topology: Topology::Triangles,
                vertices: &QUAD_VERTICES,
                indices: Some(&[]),
            },
        )
        .unwrap_err();
        assert_eq!(err, RenderError::EmptyGeometry);
    }

    #[test]
    fn out_of_range_index_is_rejected() {
        let mut gpu = RecordingBackend::new();
        let err = Geometry::new(
            &mut gpu,
            &GeometryDesc {
                topology: Topology::Triangles,
                vertices: &QUAD_VERTICES,
                indices: Some(&[0, 1, 4]),
            },
        )
        .unwrap_err();
        assert_eq!(err, RenderError::IndexOutOfRange { index: 4, vertex_count: 4 });
    }

    #[cfg(target_pointer_width = "64")]
    #[test]
    fn counts_past_u32_are_too_large_not_empty() {
        let len = u32::MAX as usize + 1;
        assert_eq!(count(len), Err(RenderError::GeometryTooLarge { len }));
        assert_eq!(count(3), Ok(3));
    }

    #[test]
    fn release_frees_the_mesh() {
        let mut gpu = RecordingBackend::new();
        let quad = Geometry::quad(&mut gpu).unwrap();
        let mesh = quad.mesh();
        quad.release(&mut gpu);
        assert!(gpu.commands().contains(&GpuCommand::DestroyMesh(mesh)));
        assert_eq!(gpu.live_meshes(), 0);
    }
}
