//! Tagged uniform values.
//!
//! A material stores its properties as [`UniformValue`]s. The tag decides how
//! the value is written into a uniform block, so one map can hold floats,
//! vectors, matrices and integers side by side.

use glam::{Mat4, Vec2, Vec3, Vec4};

/// Type tag of a settable uniform, as declared in WGSL.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UniformType {
    Float,
    Vec2,
    Vec3,
    Vec4,
    Mat4,
    Int,
}

impl UniformType {
    /// Number of bytes the value occupies inside a uniform block.
    #[must_use]
    pub const fn size(self) -> u32 {
        match self {
            UniformType::Float | UniformType::Int => 4,
            UniformType::Vec2 => 8,
            UniformType::Vec3 => 12,
            UniformType::Vec4 => 16,
            UniformType::Mat4 => 64,
        }
    }

    #[must_use]
    pub const fn wgsl_name(self) -> &'static str {
        match self {
            UniformType::Float => "f32",
            UniformType::Vec2 => "vec2<f32>",
            UniformType::Vec3 => "vec3<f32>",
            UniformType::Vec4 => "vec4<f32>",
            UniformType::Mat4 => "mat4x4<f32>",
            UniformType::Int => "i32",
        }
    }
}

impl std::fmt::Display for UniformType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.wgsl_name())
    }
}

/// A uniform value together with its type.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum UniformValue {
    Float(f32),
    Vec2(Vec2),
    Vec3(Vec3),
    Vec4(Vec4),
    Mat4(Mat4),
    Int(i32),
}

impl UniformValue {
    #[must_use]
    pub const fn ty(&self) -> UniformType {
        match self {
            UniformValue::Float(_) => UniformType::Float,
            UniformValue::Vec2(_) => UniformType::Vec2,
            UniformValue::Vec3(_) => UniformType::Vec3,
            UniformValue::Vec4(_) => UniformType::Vec4,
            UniformValue::Mat4(_) => UniformType::Mat4,
            UniformValue::Int(_) => UniformType::Int,
        }
    }

    /// Writes the value at the start of `dst`.
    ///
    /// `dst` must be at least [`UniformType::size`] bytes long. Matrices are
    /// written column-major, which is what WGSL expects.
    pub fn write_bytes(&self, dst: &mut [u8]) {
        let len = self.ty().size() as usize;
        let dst = &mut dst[..len];
        match self {
            UniformValue::Float(v) => dst.copy_from_slice(bytemuck::bytes_of(v)),
            UniformValue::Int(v) => dst.copy_from_slice(bytemuck::bytes_of(v)),
            UniformValue::Vec2(v) => dst.copy_from_slice(bytemuck::cast_slice(&v.to_array())),
            UniformValue::Vec3(v) => dst.copy_from_slice(bytemuck::cast_slice(&v.to_array())),
            UniformValue::Vec4(v) => dst.copy_from_slice(bytemuck::cast_slice(&v.to_array())),
            UniformValue::Mat4(m) => dst.copy_from_slice(bytemuck::cast_slice(&m.to_cols_array())),
        }
    }
}

impl From<f32> for UniformValue {
    fn from(v: f32) -> Self {
        UniformValue::Float(v)
    }
}

impl From<i32> for UniformValue {
    fn from(v: i32) -> Self {
        UniformValue::Int(v)
    }
}

impl From<Vec2> for UniformValue {
    fn from(v: Vec2) -> Self {
        UniformValue::Vec2(v)
    }
}

impl From<Vec3> for UniformValue {
    fn from(v: Vec3) -> Self {
        UniformValue::Vec3(v)
    }
}

impl From<Vec4> for UniformValue {
    fn from(v: Vec4) -> Self {
        UniformValue::Vec4(v)
    }
}

impl From<Mat4> for UniformValue {
    fn from(v: Mat4) -> Self {
        UniformValue::Mat4(v)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn floats(bytes: &[u8]) -> Vec<f32> {
        bytes
            .chunks_exact(4)
            .map(|c| f32::from_ne_bytes([c[0], c[1], c[2], c[3]]))
            .collect()
    }

    #[test]
    fn conversions_pick_the_matching_tag() {
        assert_eq!(UniformValue::from(1.5f32).ty(), UniformType::Float);
        assert_eq!(UniformValue::from(3i32).ty(), UniformType::Int);
        assert_eq!(UniformValue::from(Vec3::ONE).ty(), UniformType::Vec3);
        assert_eq!(UniformValue::from(Mat4::IDENTITY).ty(), UniformType::Mat4);
    }

    #[test]
    fn vec3_writes_twelve_bytes_and_leaves_padding_alone() {
        let mut buf = [0xAAu8; 16];
        UniformValue::Vec3(Vec3::new(1.0, 2.0, 3.0)).write_bytes(&mut buf);
        assert_eq!(floats(&buf[..12]), vec![1.0, 2.0, 3.0]);
        assert_eq!(&buf[12..], &[0xAA; 4]);
    }

    #[test]
    fn matrices_are_column_major() {
        let m = Mat4::from_translation(Vec3::new(4.0, 5.0, 6.0));
        let mut buf = [0u8; 64];
        UniformValue::Mat4(m).write_bytes(&mut buf);
        // Translation lives in the fourth column.
        assert_eq!(floats(&buf)[12..15], [4.0, 5.0, 6.0]);
    }
}
