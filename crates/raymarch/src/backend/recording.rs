//! In-memory [`GraphicsBackend`] that records every call.
//!
//! Programs are linked through [`crate::reflect`], so compile and link errors
//! are the real ones. Bound state (current program, mesh, texture units) is
//! tracked the way a GL context tracks it, and uniforms set on a program stay
//! on that program until overwritten or reset. Tests inspect the recorded
//! [`GpuCommand`] stream and the per-program state.

use std::collections::{BTreeMap, HashMap};

use tracing::{debug, trace, warn};

use super::{
    DrawCall, GraphicsBackend, MeshHandle, MeshUpload, ProgramHandle, StageSource, TextureHandle,
    UniformLocation,
};
use crate::error::Result;
use crate::reflect::{self, ProgramLayout, UniformWrite};
use crate::texture::{TextureFormat, TextureImage};
use crate::uniform::UniformValue;

/// Size and format of an uploaded texture.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TextureInfo {
    pub width: u32,
    pub height: u32,
    pub format: TextureFormat,
    pub srgb: bool,
    pub mip_levels: u32,
}

/// A draw that reached the backend with everything it needed bound.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedDraw {
    pub program: ProgramHandle,
    pub mesh: MeshHandle,
    pub call: DrawCall,
    /// `(unit, texture)` for every unit a sampler of the program points at.
    pub textures: Vec<(u32, TextureHandle)>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum GpuCommand {
    CreateMesh {
        mesh: MeshHandle,
        vertices: usize,
        indices: Option<usize>,
    },
    BindMesh(MeshHandle),
    DestroyMesh(MeshHandle),
    LinkProgram(ProgramHandle),
    UseProgram(ProgramHandle),
    DestroyProgram(ProgramHandle),
    ResetProgram(ProgramHandle),
    SetUniform {
        program: ProgramHandle,
        name: String,
        value: UniformValue,
    },
    SetSamplerUnit {
        program: ProgramHandle,
        name: String,
        unit: u32,
    },
    CreateTexture {
        texture: TextureHandle,
        info: Option<TextureInfo>,
    },
    BindTexture {
        unit: u32,
        texture: TextureHandle,
    },
    DestroyTexture(TextureHandle),
    SetViewport {
        width: u32,
        height: u32,
    },
    BeginFrame {
        clear_color: [f32; 4],
    },
    Draw(RecordedDraw),
    EndFrame,
}

#[derive(Debug)]
struct MeshState {
    vertex_count: usize,
    index_count: Option<usize>,
}

#[derive(Debug)]
struct ProgramState {
    layout: ProgramLayout,
    storage: Vec<Vec<u8>>,
    values: BTreeMap<String, UniformValue>,
    sampler_units: BTreeMap<String, u32>,
}

/// See the module documentation.
#[derive(Debug, Default)]
pub struct RecordingBackend {
    next_id: u32,
    meshes: HashMap<MeshHandle, MeshState>,
    programs: HashMap<ProgramHandle, ProgramState>,
    textures: HashMap<TextureHandle, Option<TextureInfo>>,
    current_program: Option<ProgramHandle>,
    current_mesh: Option<MeshHandle>,
    texture_units: BTreeMap<u32, TextureHandle>,
    viewport: (u32, u32),
    link_attempts: usize,
    commands: Vec<GpuCommand>,
}

impl RecordingBackend {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn next(&mut self) -> u32 {
        self.next_id += 1;
        self.next_id
    }

    #[must_use]
    pub fn commands(&self) -> &[GpuCommand] {
        &self.commands
    }

    /// Forgets the recorded commands, keeping all GPU state.
    pub fn clear_commands(&mut self) {
        self.commands.clear();
    }

    #[must_use]
    pub fn draw_calls(&self) -> Vec<&RecordedDraw> {
        self.commands
            .iter()
            .filter_map(|c| match c {
                GpuCommand::Draw(draw) => Some(draw),
                _ => None,
            })
            .collect()
    }

    /// Every `link_program` call, successful or not.
    #[must_use]
    pub fn link_attempts(&self) -> usize {
        self.link_attempts
    }

    #[must_use]
    pub fn bound_program(&self) -> Option<ProgramHandle> {
        self.current_program
    }

    /// Last value accepted for `name` on `program`.
    #[must_use]
    pub fn uniform_value(&self, program: ProgramHandle, name: &str) -> Option<UniformValue> {
        self.programs.get(&program)?.values.get(name).copied()
    }

    /// Encoded uniform block `block` of `program`.
    #[must_use]
    pub fn uniform_block(&self, program: ProgramHandle, block: usize) -> Option<&[u8]> {
        self.programs.get(&program)?.storage.get(block).map(Vec::as_slice)
    }

    #[must_use]
    pub fn sampler_unit(&self, program: ProgramHandle, name: &str) -> Option<u32> {
        self.programs.get(&program)?.sampler_units.get(name).copied()
    }

    #[must_use]
    pub fn program_layout(&self, program: ProgramHandle) -> Option<&ProgramLayout> {
        self.programs.get(&program).map(|p| &p.layout)
    }

    /// `None` for unknown handles, `Some(None)` for blank textures.
    #[must_use]
    pub fn texture_info(&self, texture: TextureHandle) -> Option<Option<TextureInfo>> {
        self.textures.get(&texture).copied()
    }

    #[must_use]
    pub fn live_meshes(&self) -> usize {
        self.meshes.len()
    }

    #[must_use]
    pub fn live_programs(&self) -> usize {
        self.programs.len()
    }

    #[must_use]
    pub fn live_textures(&self) -> usize {
        self.textures.len()
    }

    #[must_use]
    pub fn viewport(&self) -> (u32, u32) {
        self.viewport
    }
}

impl GraphicsBackend for RecordingBackend {
    fn create_mesh(&mut self, upload: &MeshUpload<'_>) -> MeshHandle {
        let mesh = MeshHandle(self.next());
        let state = MeshState {
            vertex_count: upload.vertices.len(),
            index_count: upload.indices.map(<[u32]>::len),
        };
        self.commands.push(GpuCommand::CreateMesh {
            mesh,
            vertices: state.vertex_count,
            indices: state.index_count,
        });
        self.meshes.insert(mesh, state);
        mesh
    }

    fn bind_mesh(&mut self, mesh: MeshHandle) {
        if !self.meshes.contains_key(&mesh) {
            warn!(?mesh, "bind of unknown mesh ignored");
            return;
        }
        self.current_mesh = Some(mesh);
        self.commands.push(GpuCommand::BindMesh(mesh));
    }

    fn destroy_mesh(&mut self, mesh: MeshHandle) {
        if self.meshes.remove(&mesh).is_some() {
            if self.current_mesh == Some(mesh) {
                self.current_mesh = None;
            }
            self.commands.push(GpuCommand::DestroyMesh(mesh));
        }
    }

    fn link_program(&mut self, vertex: &StageSource, fragment: &StageSource) -> Result<ProgramHandle> {
        self.link_attempts += 1;
        let layout = reflect::link_program(vertex, fragment)?;
        let program = ProgramHandle(self.next());
        debug!(?program, uniforms = layout.uniforms.len(), "linked program");
        self.programs.insert(
            program,
            ProgramState {
                storage: layout.block_storage(),
                layout,
                values: BTreeMap::new(),
                sampler_units: BTreeMap::new(),
            },
        );
        self.commands.push(GpuCommand::LinkProgram(program));
        Ok(program)
    }

    fn use_program(&mut self, program: ProgramHandle) {
        if !self.programs.contains_key(&program) {
            warn!(?program, "use of unknown program ignored");
            return;
        }
        self.current_program = Some(program);
        self.commands.push(GpuCommand::UseProgram(program));
    }

    fn destroy_program(&mut self, program: ProgramHandle) {
        if self.programs.remove(&program).is_some() {
            if self.current_program == Some(program) {
                self.current_program = None;
            }
            self.commands.push(GpuCommand::DestroyProgram(program));
        }
    }

    fn uniform_location(&self, program: ProgramHandle, name: &str) -> Option<UniformLocation> {
        self.programs.get(&program)?.layout.location(name)
    }

    fn set_uniform(&mut self, name: &str, value: &UniformValue) {
        let Some(program) = self.current_program else {
            warn!(name, "uniform set with no program in use");
            return;
        };
        let Some(state) = self.programs.get_mut(&program) else {
            return;
        };
        match state.layout.write_uniform(&mut state.storage, name, value) {
            UniformWrite::Written => {
                state.values.insert(name.to_owned(), *value);
                self.commands.push(GpuCommand::SetUniform {
                    program,
                    name: name.to_owned(),
                    value: *value,
                });
            }
            UniformWrite::UnknownName => trace!(name, ?program, "program has no such uniform"),
            UniformWrite::TypeMismatch { declared } => warn!(
                name,
                %declared,
                given = %value.ty(),
                "uniform type mismatch, value ignored"
            ),
        }
    }

    fn set_sampler_unit(&mut self, name: &str, unit: u32) {
        let Some(program) = self.current_program else {
            warn!(name, "sampler set with no program in use");
            return;
        };
        let Some(state) = self.programs.get_mut(&program) else {
            return;
        };
        if !state.layout.textures.contains_key(name) {
            trace!(name, ?program, "program has no such texture");
            return;
        }
        state.sampler_units.insert(name.to_owned(), unit);
        self.commands.push(GpuCommand::SetSamplerUnit {
            program,
            name: name.to_owned(),
            unit,
        });
    }

    fn reset_program_state(&mut self) {
        let Some(program) = self.current_program else {
            warn!("program state reset with no program in use");
            return;
        };
        let Some(state) = self.programs.get_mut(&program) else {
            return;
        };
        state.storage = state.layout.block_storage();
        state.values.clear();
        state.sampler_units.clear();
        self.commands.push(GpuCommand::ResetProgram(program));
    }

    fn create_texture(&mut self, image: Option<&TextureImage>) -> TextureHandle {
        let texture = TextureHandle(self.next());
        let info = image.map(|image| TextureInfo {
            width: image.width,
            height: image.height,
            format: image.format,
            srgb: image.srgb,
            mip_levels: image.mip_level_count(),
        });
        self.textures.insert(texture, info);
        self.commands.push(GpuCommand::CreateTexture { texture, info });
        texture
    }

    fn bind_texture(&mut self, unit: u32, texture: TextureHandle) {
        if !self.textures.contains_key(&texture) {
            warn!(?texture, unit, "bind of unknown texture ignored");
            return;
        }
        self.texture_units.insert(unit, texture);
        self.commands.push(GpuCommand::BindTexture { unit, texture });
    }

    fn destroy_texture(&mut self, texture: TextureHandle) {
        if self.textures.remove(&texture).is_some() {
            self.texture_units.retain(|_, bound| *bound != texture);
            self.commands.push(GpuCommand::DestroyTexture(texture));
        }
    }

    fn set_viewport(&mut self, width: u32, height: u32) {
        self.viewport = (width, height);
        self.commands.push(GpuCommand::SetViewport { width, height });
    }

    fn begin_frame(&mut self, clear_color: [f32; 4]) -> Result<()> {
        self.commands.push(GpuCommand::BeginFrame { clear_color });
        Ok(())
    }

    fn draw(&mut self, call: DrawCall) {
        let (Some(program), Some(mesh)) = (self.current_program, self.current_mesh) else {
            warn!(?call, "draw without a program and mesh bound dropped");
            return;
        };
        let Some(mesh_state) = self.meshes.get(&mesh) else {
            return;
        };
        let available = if call.indexed {
            mesh_state.index_count.unwrap_or(0)
        } else {
            mesh_state.vertex_count
        };
        if call.count as usize > available {
            warn!(?call, available, "draw past the end of the bound mesh dropped");
            return;
        }
        let textures = self.programs.get(&program).map_or_else(Vec::new, |state| {
            state
                .sampler_units
                .values()
                .filter_map(|unit| self.texture_units.get(unit).map(|t| (*unit, *t)))
                .collect()
        });
        self.commands.push(GpuCommand::Draw(RecordedDraw {
            program,
            mesh,
            call,
            textures,
        }));
    }

    fn end_frame(&mut self) -> Result<()> {
        self.commands.push(GpuCommand::EndFrame);
        Ok(())
    }
}
