#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};

use raymarch::{RecordingBackend, RendererConfig, Scene};

pub const VERT: &str = r"
struct Transforms {
    model_matrix: mat4x4<f32>,
    view_matrix: mat4x4<f32>,
    projection_matrix: mat4x4<f32>,
    inv_projection_matrix: mat4x4<f32>,
}
@group(0) @binding(0) var<uniform> transforms: Transforms;

struct VertexOutput {
    @builtin(position) clip_position: vec4<f32>,
    @location(0) view_pos: vec3<f32>,
}

@vertex
fn vs_main(@location(0) position: vec3<f32>) -> VertexOutput {
    var out: VertexOutput;
    let view_pos = transforms.view_matrix * transforms.model_matrix * vec4<f32>(position, 1.0);
    out.clip_position = transforms.projection_matrix * view_pos;
    out.view_pos = view_pos.xyz;
    return out;
}
";

pub const FRAG: &str = r"
struct Params {
    color: vec3<f32>,
    radius: f32,
    steps: i32,
}
@group(1) @binding(0) var<uniform> params: Params;
@group(1) @binding(1) var albedo: texture_2d<f32>;
@group(1) @binding(2) var detail: texture_2d<f32>;
@group(1) @binding(3) var linear_sampler: sampler;

@fragment
fn fs_main(@location(0) view_pos: vec3<f32>) -> @location(0) vec4<f32> {
    let a = textureSampleLevel(albedo, linear_sampler, view_pos.xy, 0.0);
    let d = textureSampleLevel(detail, linear_sampler, view_pos.xy, 0.0);
    return vec4<f32>(params.color * params.radius, 1.0) * a * d;
}
";

/// Same interface as [`FRAG`], different body.
pub const FRAG_EDITED: &str = r"
struct Params {
    color: vec3<f32>,
    radius: f32,
    steps: i32,
}
@group(1) @binding(0) var<uniform> params: Params;
@group(1) @binding(1) var albedo: texture_2d<f32>;
@group(1) @binding(2) var detail: texture_2d<f32>;
@group(1) @binding(3) var linear_sampler: sampler;

@fragment
fn fs_main(@location(0) view_pos: vec3<f32>) -> @location(0) vec4<f32> {
    let a = textureSampleLevel(albedo, linear_sampler, view_pos.xy, 0.0);
    return vec4<f32>(params.color, params.radius) * a;
}
";

pub const FRAG_BROKEN: &str = r"
@fragment
fn fs_main(@location(0) view_pos: vec3<f32>) -> @location(0) vec4<f32> {
    return vec4<f32>(view_pos, 1.0)
}
";

/// Compiles on its own but reads a varying [`VERT`] never writes.
pub const FRAG_UNLINKABLE: &str = r"
@fragment
fn fs_main(@location(1) uv: vec2<f32>) -> @location(0) vec4<f32> {
    return vec4<f32>(uv, 0.0, 1.0);
}
";

pub const VERT_NAME: &str = "object.vert.wgsl";
pub const FRAG_NAME: &str = "object.frag.wgsl";

/// Writes [`VERT`] and [`FRAG`] into `dir`.
pub fn write_shaders(dir: &Path) {
    fs::write(dir.join(VERT_NAME), VERT).unwrap();
    fs::write(dir.join(FRAG_NAME), FRAG).unwrap();
}

pub fn shipped_shaders() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("../../shaders")
}

pub fn scene_in(shader_root: &Path) -> Scene<RecordingBackend> {
    let config = RendererConfig {
        shader_root: shader_root.to_path_buf(),
        texture_root: shader_root.to_path_buf(),
        ..Default::default()
    };
    Scene::init(RecordingBackend::new(), config).unwrap()
}
