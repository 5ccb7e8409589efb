//! WGSL compilation, linking and uniform reflection.
//!
//! Both backends link through this module, so a program that links on the
//! recording backend links with the same diagnostics on the GPU backend. The
//! rules follow what a GL driver checks at link time:
//!
//! - each stage parses and validates on its own (compile errors carry the
//!   stage and naga's rendered diagnostic);
//! - every fragment input location is written by the vertex stage;
//! - a uniform block seen by both stages is declared identically in both;
//! - uniform names are unique across blocks, and a binding slot holds one
//!   resource.
//!
//! The resulting [`ProgramLayout`] maps uniform names to byte offsets inside
//! their blocks, which is how a name-based `set_uniform` becomes a buffer
//! write.

use std::collections::{BTreeMap, BTreeSet};

use naga::valid::{Capabilities, ValidationFlags, Validator};
use naga::{AddressSpace, Binding, ImageClass, ImageDimension, Module, ScalarKind, TypeInner, VectorSize};

use crate::backend::{ShaderStage, StageSource, UniformLocation};
use crate::error::{RenderError, Result};
use crate::uniform::{UniformType, UniformValue};

/// `(group, binding)` of a shader resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ResourceSlot {
    pub group: u32,
    pub binding: u32,
}

impl std::fmt::Display for ResourceSlot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "@group({}) @binding({})", self.group, self.binding)
    }
}

/// A `var<uniform>` buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UniformBlock {
    pub slot: ResourceSlot,
    pub size: u32,
}

/// Where a settable uniform lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UniformSlot {
    /// Index into [`ProgramLayout::blocks`].
    pub block: usize,
    pub offset: u32,
    pub ty: UniformType,
}

/// Kind of resource bound at a slot, as needed to build bind group layouts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceKind {
    UniformBlock { size: u32 },
    Texture,
    Sampler,
}

/// Outcome of writing a uniform into block storage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UniformWrite {
    Written,
    UnknownName,
    TypeMismatch { declared: UniformType },
}

/// Everything a backend needs to know about a linked program.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ProgramLayout {
    pub vertex_entry: String,
    pub fragment_entry: String,
    pub blocks: Vec<UniformBlock>,
    pub uniforms: BTreeMap<String, UniformSlot>,
    pub textures: BTreeMap<String, ResourceSlot>,
    pub samplers: BTreeMap<String, ResourceSlot>,
}

impl ProgramLayout {
    #[must_use]
    pub fn location(&self, name: &str) -> Option<UniformLocation> {
        self.uniforms
            .keys()
            .position(|key| key == name)
            .and_then(|index| u32::try_from(index).ok())
            .map(UniformLocation)
    }

    #[must_use]
    pub fn uniform_type(&self, name: &str) -> Option<UniformType> {
        self.uniforms.get(name).map(|slot| slot.ty)
    }

    /// Zeroed storage for every uniform block, indexed like [`Self::blocks`].
    #[must_use]
    pub fn block_storage(&self) -> Vec<Vec<u8>> {
        self.blocks.iter().map(|b| vec![0u8; b.size as usize]).collect()
    }

    /// Encodes `value` into `storage` at the offset reflected for `name`.
    pub fn write_uniform(&self, storage: &mut [Vec<u8>], name: &str, value: &UniformValue) -> UniformWrite {
        let Some(slot) = self.uniforms.get(name) else {
            return UniformWrite::UnknownName;
        };
        if slot.ty != value.ty() {
            return UniformWrite::TypeMismatch { declared: slot.ty };
        }
        let offset = slot.offset as usize;
        value.write_bytes(&mut storage[slot.block][offset..]);
        UniformWrite::Written
    }

    /// All bound resources ordered by group then binding.
    #[must_use]
    pub fn resources(&self) -> Vec<(ResourceSlot, ResourceKind)> {
        let mut all: Vec<_> = self
            .blocks
            .iter()
            .map(|b| (b.slot, ResourceKind::UniformBlock { size: b.size }))
            .chain(self.textures.values().map(|s| (*s, ResourceKind::Texture)))
            .chain(self.samplers.values().map(|s| (*s, ResourceKind::Sampler)))
            .collect();
        all.sort_by_key(|(slot, _)| *slot);
        all
    }

    /// Number of bind groups the pipeline layout needs.
    #[must_use]
    pub fn group_count(&self) -> u32 {
        self.resources().last().map_or(0, |(slot, _)| slot.group + 1)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct MemberDecl {
    name: String,
    offset: u32,
    ty: Option<UniformType>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Resource {
    Uniform {
        slot: ResourceSlot,
        size: u32,
        members: Vec<MemberDecl>,
    },
    Texture {
        name: String,
        slot: ResourceSlot,
    },
    Sampler {
        name: String,
        slot: ResourceSlot,
    },
}

/// A stage that parsed and validated.
pub struct CompiledStage {
    pub stage: ShaderStage,
    pub entry_point: String,
    module: Module,
}

impl std::fmt::Debug for CompiledStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompiledStage")
            .field("stage", &self.stage)
            .field("entry_point", &self.entry_point)
            .finish_non_exhaustive()
    }
}

fn compile_error(source: &StageSource, log: String) -> RenderError {
    RenderError::ShaderCompileFailed {
        stage: source.stage,
        path: source.path.clone(),
        log,
    }
}

fn link_error(log: impl Into<String>) -> RenderError {
    RenderError::ShaderLinkFailed { log: log.into() }
}

/// Parses and validates one stage.
///
/// # Errors
///
/// [`RenderError::ShaderCompileFailed`] with naga's diagnostic, or when the
/// module has no entry point for its stage.
pub fn compile_stage(source: &StageSource) -> Result<CompiledStage> {
    let module = naga::front::wgsl::parse_str(&source.code)
        .map_err(|e| compile_error(source, e.emit_to_string(&source.code)))?;

    let mut validator = Validator::new(ValidationFlags::all(), Capabilities::all());
    validator
        .validate(&module)
        .map_err(|e| compile_error(source, e.emit_to_string(&source.code)))?;

    let wanted = match source.stage {
        ShaderStage::Vertex => naga::ShaderStage::Vertex,
        ShaderStage::Fragment => naga::ShaderStage::Fragment,
    };
    let entry_point = module
        .entry_points
        .iter()
        .find(|ep| ep.stage == wanted)
        .map(|ep| ep.name.clone())
        .ok_or_else(|| compile_error(source, format!("no @{} entry point", source.stage)))?;

    Ok(CompiledStage {
        stage: source.stage,
        entry_point,
        module,
    })
}

fn uniform_type(inner: &TypeInner) -> Option<UniformType> {
    match *inner {
        TypeInner::Scalar(naga::Scalar { kind: ScalarKind::Float, width: 4 }) => Some(UniformType::Float),
        TypeInner::Scalar(naga::Scalar { kind: ScalarKind::Sint, width: 4 }) => Some(UniformType::Int),
        TypeInner::Vector {
            size,
            scalar: naga::Scalar { kind: ScalarKind::Float, width: 4 },
        } => Some(match size {
            VectorSize::Bi => UniformType::Vec2,
            VectorSize::Tri => UniformType::Vec3,
            VectorSize::Quad => UniformType::Vec4,
        }),
        TypeInner::Matrix {
            columns: VectorSize::Quad,
            rows: VectorSize::Quad,
            scalar: naga::Scalar { kind: ScalarKind::Float, width: 4 },
        } => Some(UniformType::Mat4),
        _ => None,
    }
}

impl CompiledStage {
    fn entry(&self) -> Option<&naga::EntryPoint> {
        self.module.entry_points.iter().find(|ep| ep.name == self.entry_point)
    }

    fn collect_locations(&self, ty: naga::Handle<naga::Type>, binding: Option<&Binding>, out: &mut BTreeSet<u32>) {
        match binding {
            Some(Binding::Location { location, .. }) => {
                out.insert(*location);
            }
            Some(Binding::BuiltIn(_)) => {}
            None => {
                if let TypeInner::Struct { members, .. } = &self.module.types[ty].inner {
                    for member in members {
                        if let Some(Binding::Location { location, .. }) = &member.binding {
                            out.insert(*location);
                        }
                    }
                }
            }
        }
    }

    /// Locations written by the entry point's result.
    fn output_locations(&self) -> BTreeSet<u32> {
        let mut out = BTreeSet::new();
        if let Some(result) = self.entry().and_then(|ep| ep.function.result.as_ref()) {
            self.collect_locations(result.ty, result.binding.as_ref(), &mut out);
        }
        out
    }

    /// Locations read by the entry point's arguments.
    fn input_locations(&self) -> BTreeSet<u32> {
        let mut out = BTreeSet::new();
        if let Some(ep) = self.entry() {
            for arg in &ep.function.arguments {
                self.collect_locations(arg.ty, arg.binding.as_ref(), &mut out);
            }
        }
        out
    }

    fn resources(&self) -> Result<Vec<Resource>> {
        let mut found = Vec::new();
        for (_, var) in self.module.global_variables.iter() {
            let name = var.name.clone().unwrap_or_default();
            let Some(binding) = &var.binding else {
                continue;
            };
            let slot = ResourceSlot {
                group: binding.group,
                binding: binding.binding,
            };
            let inner = &self.module.types[var.ty].inner;
            match var.space {
                AddressSpace::Uniform => {
                    let members = match inner {
                        TypeInner::Struct { members, .. } => members
                            .iter()
                            .map(|m| MemberDecl {
                                name: m.name.clone().unwrap_or_default(),
                                offset: m.offset,
                                ty: uniform_type(&self.module.types[m.ty].inner),
                            })
                            .collect(),
                        other => vec![MemberDecl {
                            name: name.clone(),
                            offset: 0,
                            ty: uniform_type(other),
                        }],
                    };
                    let size = inner.size(self.module.to_ctx());
                    found.push(Resource::Uniform { slot, size, members });
                }
                AddressSpace::Handle => match *inner {
                    TypeInner::Image {
                        dim: ImageDimension::D2,
                        arrayed: false,
                        class: ImageClass::Sampled { kind: ScalarKind::Float, multi: false },
                    } => found.push(Resource::Texture { name, slot }),
                    TypeInner::Sampler { comparison: false } => found.push(Resource::Sampler { name, slot }),
                    _ => {
                        return Err(link_error(format!(
                            "{} shader: `{name}` at {slot} is not a texture_2d<f32> or a filtering sampler",
                            self.stage
                        )))
                    }
                },
                _ => {
                    return Err(link_error(format!(
                        "{} shader: `{name}` at {slot} uses an unsupported address space",
                        self.stage
                    )))
                }
            }
        }
        Ok(found)
    }
}

#[derive(Default)]
struct Linker {
    layout: ProgramLayout,
    block_members: Vec<Vec<MemberDecl>>,
    occupied: BTreeMap<ResourceSlot, String>,
}

impl Linker {
    fn claim(&mut self, slot: ResourceSlot, what: String) -> Result<bool> {
        match self.occupied.get(&slot) {
            Some(existing) if *existing == what => Ok(false),
            Some(existing) => Err(link_error(format!(
                "{slot} is bound to both {existing} and {what}"
            ))),
            None => {
                self.occupied.insert(slot, what);
                Ok(true)
            }
        }
    }

    fn add(&mut self, resource: Resource) -> Result<()> {
        match resource {
            Resource::Uniform { slot, size, members } => {
                if let Some(index) = self.layout.blocks.iter().position(|b| b.slot == slot) {
                    if self.layout.blocks[index].size != size || self.block_members[index] != members {
                        return Err(link_error(format!(
                            "uniform block at {slot} is declared differently in the vertex and fragment stages"
                        )));
                    }
                    return Ok(());
                }
                self.claim(slot, format!("uniform block at {slot}"))?;
                let block = self.layout.blocks.len();
                for member in &members {
                    let Some(ty) = member.ty else {
                        continue;
                    };
                    if self.layout.uniforms.contains_key(&member.name) {
                        return Err(link_error(format!(
                            "uniform `{}` is declared in more than one block",
                            member.name
                        )));
                    }
                    self.layout.uniforms.insert(
                        member.name.clone(),
                        UniformSlot {
                            block,
                            offset: member.offset,
                            ty,
                        },
                    );
                }
                self.layout.blocks.push(UniformBlock { slot, size });
                self.block_members.push(members);
            }
            Resource::Texture { name, slot } => {
                if let Some(existing) = self.layout.textures.get(&name) {
                    if *existing != slot {
                        return Err(link_error(format!(
                            "texture `{name}` is bound at {existing} and {slot}"
                        )));
                    }
                }
                if self.claim(slot, format!("texture `{name}`"))? {
                    self.layout.textures.insert(name, slot);
                }
            }
            Resource::Sampler { name, slot } => {
                if self.claim(slot, format!("sampler `{name}`"))? {
                    self.layout.samplers.insert(name, slot);
                }
            }
        }
        Ok(())
    }
}

/// Compiles both stages and links them into a [`ProgramLayout`].
///
/// # Errors
///
/// [`RenderError::ShaderCompileFailed`] for the first stage that does not
/// compile, [`RenderError::ShaderLinkFailed`] if the stages do not fit
/// together.
pub fn link_program(vertex: &StageSource, fragment: &StageSource) -> Result<ProgramLayout> {
    let vs = compile_stage(vertex)?;
    let fs = compile_stage(fragment)?;

    let written = vs.output_locations();
    for location in fs.input_locations() {
        if !written.contains(&location) {
            return Err(link_error(format!(
                "fragment input @location({location}) is not written by the vertex stage"
            )));
        }
    }

    let mut linker = Linker::default();
    linker.layout.vertex_entry = vs.entry_point.clone();
    linker.layout.fragment_entry = fs.entry_point.clone();
    for stage in [&vs, &fs] {
        for resource in stage.resources()? {
            linker.add(resource)?;
        }
    }
    Ok(linker.layout)
}
