//! [`GraphicsBackend`] on a real device through `wgpu`.
//!
//! The bind-before-use calls only touch CPU-side state. Every `draw` takes a
//! snapshot of the current program's uniform blocks and of the textures its
//! samplers point at; `end_frame` writes the snapshots into uniform buffers
//! and encodes all draws into one render pass, in call order.
//!
//! The n-th draw of a program in a frame always reuses the program's n-th
//! [`DrawSlot`]: its buffers are updated with `write_buffer`, and its bind
//! groups are only rebuilt when the draw samples different textures.

use std::collections::{BTreeMap, HashMap};

use tracing::{debug, error, info, trace, warn};
use wgpu::util::DeviceExt;

use super::{
    DrawCall, GraphicsBackend, MeshHandle, MeshUpload, ProgramHandle, StageSource, TextureHandle,
    UniformLocation,
};
use crate::error::{RenderError, Result};
use crate::geometry::Topology;
use crate::reflect::{self, ProgramLayout, ResourceKind, ResourceSlot, UniformWrite};
use crate::texture::{TextureFormat, TextureImage};
use crate::uniform::UniformValue;

const DEPTH_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Depth32Float;

const TOPOLOGIES: [Topology; 5] = [
    Topology::Points,
    Topology::Lines,
    Topology::LineStrip,
    Topology::Triangles,
    Topology::TriangleStrip,
];

fn primitive_topology(topology: Topology) -> wgpu::PrimitiveTopology {
    match topology {
        Topology::Points => wgpu::PrimitiveTopology::PointList,
        Topology::Lines => wgpu::PrimitiveTopology::LineList,
        Topology::LineStrip => wgpu::PrimitiveTopology::LineStrip,
        Topology::Triangles => wgpu::PrimitiveTopology::TriangleList,
        Topology::TriangleStrip => wgpu::PrimitiveTopology::TriangleStrip,
    }
}

struct GpuMesh {
    vertices: wgpu::Buffer,
    indices: Option<wgpu::Buffer>,
}

struct GpuProgram {
    layout: ProgramLayout,
    bind_group_layouts: Vec<wgpu::BindGroupLayout>,
    pipelines: HashMap<Topology, wgpu::RenderPipeline>,
    storage: Vec<Vec<u8>>,
    sampler_units: BTreeMap<String, u32>,
    draw_slots: Vec<DrawSlot>,
}

/// GPU resources for one draw of a program, kept across frames.
struct DrawSlot {
    /// One buffer per uniform block, in layout order.
    buffers: Vec<(ResourceSlot, wgpu::Buffer)>,
    /// Textures the bind groups were built with. `None` once one of them has
    /// been destroyed.
    textures: Option<BTreeMap<ResourceSlot, TextureHandle>>,
    bind_groups: Vec<wgpu::BindGroup>,
}

/// Device objects needed to fill a [`DrawSlot`], borrowed apart from the
/// program table.
struct SlotBuilder<'a> {
    device: &'a wgpu::Device,
    queue: &'a wgpu::Queue,
    textures: &'a HashMap<TextureHandle, GpuTexture>,
    fallback: &'a wgpu::TextureView,
    sampler: &'a wgpu::Sampler,
}

struct GpuTexture {
    // Kept so the texture outlives its view.
    _texture: wgpu::Texture,
    view: wgpu::TextureView,
}

struct PendingDraw {
    program: ProgramHandle,
    mesh: MeshHandle,
    call: DrawCall,
    blocks: Vec<Vec<u8>>,
    textures: BTreeMap<ResourceSlot, TextureHandle>,
}

pub struct WgpuBackend {
    surface: wgpu::Surface<'static>,
    device: wgpu::Device,
    queue: wgpu::Queue,
    config: wgpu::SurfaceConfiguration,
    depth_view: wgpu::TextureView,
    sampler: wgpu::Sampler,
    fallback_texture: GpuTexture,
    next_id: u32,
    meshes: HashMap<MeshHandle, GpuMesh>,
    programs: HashMap<ProgramHandle, GpuProgram>,
    textures: HashMap<TextureHandle, GpuTexture>,
    current_program: Option<ProgramHandle>,
    current_mesh: Option<MeshHandle>,
    texture_units: BTreeMap<u32, TextureHandle>,
    frame: Option<(wgpu::SurfaceTexture, wgpu::Color)>,
    pending: Vec<PendingDraw>,
}

// Uniform bindings are sized in 16 byte steps.
fn uniform_buffer_size(len: usize) -> wgpu::BufferAddress {
    len.max(16).next_multiple_of(16) as wgpu::BufferAddress
}

fn create_depth_view(device: &wgpu::Device, config: &wgpu::SurfaceConfiguration) -> wgpu::TextureView {
    device
        .create_texture(&wgpu::TextureDescriptor {
            label: Some("depth"),
            size: wgpu::Extent3d {
                width: config.width.max(1),
                height: config.height.max(1),
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: DEPTH_FORMAT,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            view_formats: &[],
        })
        .create_view(&wgpu::TextureViewDescriptor::default())
}

fn upload_texture(device: &wgpu::Device, queue: &wgpu::Queue, image: &TextureImage) -> GpuTexture {
    let (format, bytes_per_pixel) = match (image.format, image.srgb) {
        (TextureFormat::R8, _) => (wgpu::TextureFormat::R8Unorm, 1),
        (_, true) => (wgpu::TextureFormat::Rgba8UnormSrgb, 4),
        (_, false) => (wgpu::TextureFormat::Rgba8Unorm, 4),
    };
    let levels = image.mip_chain();
    let texture = device.create_texture(&wgpu::TextureDescriptor {
        label: Some("material texture"),
        size: wgpu::Extent3d {
            width: image.width,
            height: image.height,
            depth_or_array_layers: 1,
        },
        mip_level_count: image.mip_level_count(),
        sample_count: 1,
        dimension: wgpu::TextureDimension::D2,
        format,
        usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
        view_formats: &[],
    });
    for (mip_level, level) in (0u32..).zip(&levels) {
        let data = if image.format == TextureFormat::R8 {
            level.pixels.clone()
        } else {
            level.to_rgba()
        };
        queue.write_texture(
            wgpu::ImageCopyTexture {
                texture: &texture,
                mip_level,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            &data,
            wgpu::ImageDataLayout {
                offset: 0,
                bytes_per_row: Some(level.width * bytes_per_pixel),
                rows_per_image: Some(level.height),
            },
            wgpu::Extent3d {
                width: level.width,
                height: level.height,
                depth_or_array_layers: 1,
            },
        );
    }
    let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
    GpuTexture { _texture: texture, view }
}

fn blank_texture(device: &wgpu::Device, queue: &wgpu::Queue) -> GpuTexture {
    let image = TextureImage {
        width: 1,
        height: 1,
        format: TextureFormat::Rgba8,
        srgb: false,
        pixels: vec![0; 4],
    };
    upload_texture(device, queue, &image)
}

impl WgpuBackend {
    /// Opens a device that can present to `target`.
    ///
    /// # Errors
    ///
    /// [`RenderError::GraphicsLoaderFailed`] when no surface, adapter or
    /// device can be created.
    pub fn new(target: impl Into<wgpu::SurfaceTarget<'static>>, width: u32, height: u32) -> Result<Self> {
        let loader = |what: &str, e: &dyn std::fmt::Display| RenderError::GraphicsLoaderFailed(format!("{what}: {e}"));

        let instance = wgpu::Instance::default();
        let surface = instance
            .create_surface(target)
            .map_err(|e| loader("failed to create surface", &e))?;
        let adapter = pollster::block_on(instance.request_adapter(&wgpu::RequestAdapterOptions {
            power_preference: wgpu::PowerPreference::HighPerformance,
            compatible_surface: Some(&surface),
            force_fallback_adapter: false,
        }))
        .ok_or_else(|| RenderError::GraphicsLoaderFailed("failed to get adapter".to_owned()))?;
        info!(adapter = ?adapter.get_info().name, "using adapter");

        let (device, queue) = pollster::block_on(adapter.request_device(
            &wgpu::DeviceDescriptor {
                label: Some("Raymarcher Device"),
                required_features: wgpu::Features::empty(),
                required_limits: wgpu::Limits::default(),
            },
            None,
        ))
        .map_err(|e| loader("failed to request device", &e))?;
        device.on_uncaptured_error(Box::new(|e| error!("wgpu: {e}")));

        let caps = surface.get_capabilities(&adapter);
        let format = caps
            .formats
            .iter()
            .copied()
            .find(wgpu::TextureFormat::is_srgb)
            .or_else(|| caps.formats.first().copied())
            .ok_or_else(|| RenderError::GraphicsLoaderFailed("surface reports no formats".to_owned()))?;
        let alpha_mode = caps
            .alpha_modes
            .first()
            .copied()
            .unwrap_or(wgpu::CompositeAlphaMode::Auto);
        let config = wgpu::SurfaceConfiguration {
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            format,
            width: width.max(1),
            height: height.max(1),
            desired_maximum_frame_latency: 2,
            present_mode: wgpu::PresentMode::Fifo,
            alpha_mode,
            view_formats: vec![],
        };
        surface.configure(&device, &config);

        let depth_view = create_depth_view(&device, &config);
        let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("standard sampler"),
            address_mode_u: wgpu::AddressMode::Repeat,
            address_mode_v: wgpu::AddressMode::Repeat,
            address_mode_w: wgpu::AddressMode::Repeat,
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            mipmap_filter: wgpu::FilterMode::Linear,
            ..Default::default()
        });
        let fallback_texture = blank_texture(&device, &queue);

        Ok(Self {
            surface,
            device,
            queue,
            config,
            depth_view,
            sampler,
            fallback_texture,
            next_id: 0,
            meshes: HashMap::new(),
            programs: HashMap::new(),
            textures: HashMap::new(),
            current_program: None,
            current_mesh: None,
            texture_units: BTreeMap::new(),
            frame: None,
            pending: Vec::new(),
        })
    }

    fn next(&mut self) -> u32 {
        self.next_id += 1;
        self.next_id
    }

    fn reconfigure(&mut self) {
        self.surface.configure(&self.device, &self.config);
        self.depth_view = create_depth_view(&self.device, &self.config);
    }

    fn build_program(&self, vertex: &StageSource, fragment: &StageSource, layout: &ProgramLayout) -> (Vec<wgpu::BindGroupLayout>, HashMap<Topology, wgpu::RenderPipeline>) {
        let vs = self.device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: vertex.path.to_str(),
            source: wgpu::ShaderSource::Wgsl(vertex.code.as_str().into()),
        });
        let fs = self.device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: fragment.path.to_str(),
            source: wgpu::ShaderSource::Wgsl(fragment.code.as_str().into()),
        });

        let resources = layout.resources();
        let bind_group_layouts: Vec<_> = (0..layout.group_count())
            .map(|group| {
                let entries: Vec<_> = resources
                    .iter()
                    .filter(|(slot, _)| slot.group == group)
                    .map(|(slot, kind)| wgpu::BindGroupLayoutEntry {
                        binding: slot.binding,
                        visibility: wgpu::ShaderStages::VERTEX_FRAGMENT,
                        ty: match kind {
                            ResourceKind::UniformBlock { .. } => wgpu::BindingType::Buffer {
                                ty: wgpu::BufferBindingType::Uniform,
                                has_dynamic_offset: false,
                                min_binding_size: None,
                            },
                            ResourceKind::Texture => wgpu::BindingType::Texture {
                                sample_type: wgpu::TextureSampleType::Float { filterable: true },
                                view_dimension: wgpu::TextureViewDimension::D2,
                                multisampled: false,
                            },
                            ResourceKind::Sampler => wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                        },
                        count: None,
                    })
                    .collect();
                self.device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                    label: Some("program bind group layout"),
                    entries: &entries,
                })
            })
            .collect();

        let layout_refs: Vec<&wgpu::BindGroupLayout> = bind_group_layouts.iter().collect();
        let pipeline_layout = self.device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("program pipeline layout"),
            bind_group_layouts: &layout_refs,
            push_constant_ranges: &[],
        });

        let pipelines = TOPOLOGIES
            .iter()
            .map(|&topology| {
                let pipeline = self.device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
                    label: Some("raymarch pipeline"),
                    layout: Some(&pipeline_layout),
                    vertex: wgpu::VertexState {
                        module: &vs,
                        entry_point: &layout.vertex_entry,
                        buffers: &[wgpu::VertexBufferLayout {
                            array_stride: (3 * std::mem::size_of::<f32>()) as wgpu::BufferAddress,
                            step_mode: wgpu::VertexStepMode::Vertex,
                            attributes: &wgpu::vertex_attr_array![0 => Float32x3],
                        }],
                    },
                    fragment: Some(wgpu::FragmentState {
                        module: &fs,
                        entry_point: &layout.fragment_entry,
                        targets: &[Some(wgpu::ColorTargetState {
                            format: self.config.format,
                            blend: Some(wgpu::BlendState::REPLACE),
                            write_mask: wgpu::ColorWrites::ALL,
                        })],
                    }),
                    primitive: wgpu::PrimitiveState {
                        topology: primitive_topology(topology),
                        strip_index_format: topology.is_strip().then_some(wgpu::IndexFormat::Uint32),
                        front_face: wgpu::FrontFace::Ccw,
                        cull_mode: Some(wgpu::Face::Back),
                        ..Default::default()
                    },
                    depth_stencil: Some(wgpu::DepthStencilState {
                        format: DEPTH_FORMAT,
                        depth_write_enabled: true,
                        depth_compare: wgpu::CompareFunction::Less,
                        stencil: wgpu::StencilState::default(),
                        bias: wgpu::DepthBiasState::default(),
                    }),
                    multisample: wgpu::MultisampleState::default(),
                    multiview: None,
                });
                (topology, pipeline)
            })
            .collect();

        (bind_group_layouts, pipelines)
    }
}

impl SlotBuilder<'_> {
    /// Brings the `index`-th slot of `program` up to date with `draw`,
    /// creating it when this is the most draws the program has seen in a
    /// frame.
    fn prepare(&self, program: &mut GpuProgram, index: usize, draw: &PendingDraw) {
        let GpuProgram {
            layout,
            bind_group_layouts,
            draw_slots,
            ..
        } = program;
        if index == draw_slots.len() {
            let buffers = layout
                .blocks
                .iter()
                .zip(&draw.blocks)
                .map(|(block, bytes)| {
                    let buffer = self.device.create_buffer(&wgpu::BufferDescriptor {
                        label: Some("uniform block"),
                        size: uniform_buffer_size(bytes.len()),
                        usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
                        mapped_at_creation: false,
                    });
                    (block.slot, buffer)
                })
                .collect();
            draw_slots.push(DrawSlot {
                buffers,
                textures: None,
                bind_groups: Vec::new(),
            });
            trace!(slots = draw_slots.len(), "grew draw slot pool");
        }
        let Some(slot) = draw_slots.get_mut(index) else {
            return;
        };

        for ((_, buffer), bytes) in slot.buffers.iter().zip(&draw.blocks) {
            if !bytes.is_empty() {
                self.queue.write_buffer(buffer, 0, bytes);
            }
        }
        if slot.textures.as_ref() != Some(&draw.textures) {
            slot.bind_groups = self.bind_groups(layout, bind_group_layouts, &slot.buffers, &draw.textures);
            slot.textures = Some(draw.textures.clone());
        }
    }

    fn bind_groups(
        &self,
        layout: &ProgramLayout,
        group_layouts: &[wgpu::BindGroupLayout],
        buffers: &[(ResourceSlot, wgpu::Buffer)],
        textures: &BTreeMap<ResourceSlot, TextureHandle>,
    ) -> Vec<wgpu::BindGroup> {
        let resources = layout.resources();
        group_layouts
            .iter()
            .zip(0u32..)
            .map(|(group_layout, group)| {
                let entries: Vec<_> = resources
                    .iter()
                    .filter(|(slot, _)| slot.group == group)
                    .filter_map(|(slot, kind)| {
                        let resource = match kind {
                            ResourceKind::UniformBlock { .. } => buffers
                                .iter()
                                .find(|(block, _)| block == slot)
                                .map(|(_, buffer)| buffer.as_entire_binding())?,
                            ResourceKind::Texture => {
                                let view = textures
                                    .get(slot)
                                    .and_then(|t| self.textures.get(t))
                                    .map_or(self.fallback, |t| &t.view);
                                wgpu::BindingResource::TextureView(view)
                            }
                            ResourceKind::Sampler => wgpu::BindingResource::Sampler(self.sampler),
                        };
                        Some(wgpu::BindGroupEntry {
                            binding: slot.binding,
                            resource,
                        })
                    })
                    .collect();
                self.device.create_bind_group(&wgpu::BindGroupDescriptor {
                    label: Some("draw bind group"),
                    layout: group_layout,
                    entries: &entries,
                })
            })
            .collect()
    }
}

impl GraphicsBackend for WgpuBackend {
    fn create_mesh(&mut self, upload: &MeshUpload<'_>) -> MeshHandle {
        let vertices = self.device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("mesh vertices"),
            contents: bytemuck::cast_slice(upload.vertices),
            usage: wgpu::BufferUsages::VERTEX,
        });
        let indices = upload.indices.map(|indices| {
            self.device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some("mesh indices"),
                contents: bytemuck::cast_slice(indices),
                usage: wgpu::BufferUsages::INDEX,
            })
        });
        let mesh = MeshHandle(self.next());
        self.meshes.insert(mesh, GpuMesh { vertices, indices });
        mesh
    }

    fn bind_mesh(&mut self, mesh: MeshHandle) {
        if self.meshes.contains_key(&mesh) {
            self.current_mesh = Some(mesh);
        } else {
            warn!(?mesh, "bind of unknown mesh ignored");
        }
    }

    fn destroy_mesh(&mut self, mesh: MeshHandle) {
        if let Some(gpu) = self.meshes.remove(&mesh) {
            gpu.vertices.destroy();
            if let Some(indices) = gpu.indices {
                indices.destroy();
            }
            if self.current_mesh == Some(mesh) {
                self.current_mesh = None;
            }
        }
    }

    fn link_program(&mut self, vertex: &StageSource, fragment: &StageSource) -> Result<ProgramHandle> {
        let layout = reflect::link_program(vertex, fragment)?;

        self.device.push_error_scope(wgpu::ErrorFilter::Validation);
        let (bind_group_layouts, pipelines) = self.build_program(vertex, fragment, &layout);
        if let Some(e) = pollster::block_on(self.device.pop_error_scope()) {
            return Err(RenderError::ShaderLinkFailed { log: e.to_string() });
        }

        let program = ProgramHandle(self.next());
        debug!(?program, groups = bind_group_layouts.len(), "created pipelines");
        self.programs.insert(
            program,
            GpuProgram {
                storage: layout.block_storage(),
                layout,
                bind_group_layouts,
                pipelines,
                sampler_units: BTreeMap::new(),
                draw_slots: Vec::new(),
            },
        );
        Ok(program)
    }

    fn use_program(&mut self, program: ProgramHandle) {
        if self.programs.contains_key(&program) {
            self.current_program = Some(program);
        } else {
            warn!(?program, "use of unknown program ignored");
        }
    }

    fn destroy_program(&mut self, program: ProgramHandle) {
        if self.programs.remove(&program).is_some() && self.current_program == Some(program) {
            self.current_program = None;
        }
    }

    fn uniform_location(&self, program: ProgramHandle, name: &str) -> Option<UniformLocation> {
        self.programs.get(&program)?.layout.location(name)
    }

    fn set_uniform(&mut self, name: &str, value: &UniformValue) {
        let Some(program) = self.current_program.and_then(|p| self.programs.get_mut(&p)) else {
            warn!(name, "uniform set with no program in use");
            return;
        };
        match program.layout.write_uniform(&mut program.storage, name, value) {
            UniformWrite::Written => {}
            UniformWrite::UnknownName => trace!(name, "program has no such uniform"),
            UniformWrite::TypeMismatch { declared } => warn!(
                name,
                %declared,
                given = %value.ty(),
                "uniform type mismatch, value ignored"
            ),
        }
    }

    fn set_sampler_unit(&mut self, name: &str, unit: u32) {
        let Some(program) = self.current_program.and_then(|p| self.programs.get_mut(&p)) else {
            warn!(name, "sampler set with no program in use");
            return;
        };
        if program.layout.textures.contains_key(name) {
            program.sampler_units.insert(name.to_owned(), unit);
        } else {
            trace!(name, "program has no such texture");
        }
    }

    fn reset_program_state(&mut self) {
        let Some(program) = self.current_program.and_then(|p| self.programs.get_mut(&p)) else {
            warn!("program state reset with no program in use");
            return;
        };
        program.storage = program.layout.block_storage();
        program.sampler_units.clear();
    }

    fn create_texture(&mut self, image: Option<&TextureImage>) -> TextureHandle {
        let gpu = match image {
            Some(image) => upload_texture(&self.device, &self.queue, image),
            None => blank_texture(&self.device, &self.queue),
        };
        let texture = TextureHandle(self.next());
        self.textures.insert(texture, gpu);
        texture
    }

    fn bind_texture(&mut self, unit: u32, texture: TextureHandle) {
        if self.textures.contains_key(&texture) {
            self.texture_units.insert(unit, texture);
        } else {
            warn!(?texture, unit, "bind of unknown texture ignored");
        }
    }

    fn destroy_texture(&mut self, texture: TextureHandle) {
        if self.textures.remove(&texture).is_some() {
            self.texture_units.retain(|_, bound| *bound != texture);
            for slot in self.programs.values_mut().flat_map(|p| &mut p.draw_slots) {
                if slot.textures.as_ref().is_some_and(|t| t.values().any(|bound| *bound == texture)) {
                    slot.textures = None;
                }
            }
        }
    }

    fn set_viewport(&mut self, width: u32, height: u32) {
        if width == 0 || height == 0 {
            return;
        }
        self.config.width = width;
        self.config.height = height;
        self.reconfigure();
    }

    fn begin_frame(&mut self, clear_color: [f32; 4]) -> Result<()> {
        self.pending.clear();
        let output = match self.surface.get_current_texture() {
            Ok(output) => output,
            Err(e @ (wgpu::SurfaceError::Lost | wgpu::SurfaceError::Outdated)) => {
                self.reconfigure();
                return Err(RenderError::Surface(e.to_string()));
            }
            Err(e) => return Err(RenderError::Surface(e.to_string())),
        };
        let [r, g, b, a] = clear_color.map(f64::from);
        self.frame = Some((output, wgpu::Color { r, g, b, a }));
        Ok(())
    }

    fn draw(&mut self, call: DrawCall) {
        let (Some(program), Some(mesh)) = (self.current_program, self.current_mesh) else {
            warn!(?call, "draw without a program and mesh bound dropped");
            return;
        };
        let Some(state) = self.programs.get(&program) else {
            return;
        };
        let textures = state
            .layout
            .textures
            .iter()
            .filter_map(|(name, slot)| {
                let unit = state.sampler_units.get(name)?;
                Some((*slot, *self.texture_units.get(unit)?))
            })
            .collect();
        self.pending.push(PendingDraw {
            program,
            mesh,
            call,
            blocks: state.storage.clone(),
            textures,
        });
    }

    fn end_frame(&mut self) -> Result<()> {
        let Some((output, clear)) = self.frame.take() else {
            return Ok(());
        };
        let draws = std::mem::take(&mut self.pending);

        let builder = SlotBuilder {
            device: &self.device,
            queue: &self.queue,
            textures: &self.textures,
            fallback: &self.fallback_texture.view,
            sampler: &self.sampler,
        };
        let mut uses: HashMap<ProgramHandle, usize> = HashMap::new();
        let slots: Vec<Option<usize>> = draws
            .iter()
            .map(|draw| {
                let program = self.programs.get_mut(&draw.program)?;
                let index = uses.entry(draw.program).or_default();
                builder.prepare(program, *index, draw);
                *index += 1;
                Some(*index - 1)
            })
            .collect();

        let prepared: Vec<_> = draws
            .iter()
            .zip(slots)
            .filter_map(|(draw, slot)| {
                let program = self.programs.get(&draw.program)?;
                let slot = program.draw_slots.get(slot?)?;
                let mesh = self.meshes.get(&draw.mesh)?;
                let pipeline = program.pipelines.get(&draw.call.topology)?;
                Some((pipeline, mesh, &slot.bind_groups, draw.call))
            })
            .collect();

        let view = output.texture.create_view(&wgpu::TextureViewDescriptor::default());
        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor { label: Some("frame") });
        {
            let mut rpass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("raymarch pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &view,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(clear),
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                    view: &self.depth_view,
                    depth_ops: Some(wgpu::Operations {
                        load: wgpu::LoadOp::Clear(1.0),
                        store: wgpu::StoreOp::Store,
                    }),
                    stencil_ops: None,
                }),
                timestamp_writes: None,
                occlusion_query_set: None,
            });
            for (pipeline, mesh, bind_groups, call) in &prepared {
                rpass.set_pipeline(pipeline);
                for (group, bind_group) in (0u32..).zip(bind_groups.iter()) {
                    rpass.set_bind_group(group, bind_group, &[]);
                }
                rpass.set_vertex_buffer(0, mesh.vertices.slice(..));
                match (&mesh.indices, call.indexed) {
                    (Some(indices), true) => {
                        rpass.set_index_buffer(indices.slice(..), wgpu::IndexFormat::Uint32);
                        rpass.draw_indexed(0..call.count, 0, 0..1);
                    }
                    _ => rpass.draw(0..call.count, 0..1),
                }
            }
        }
        self.queue.submit(Some(encoder.finish()));
        output.present();
        trace!(draws = prepared.len(), "frame submitted");
        Ok(())
    }
}
