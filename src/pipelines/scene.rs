use crate::{
    data_structures::{material::Material, texture::Texture},
    pipelines::{PipelineState, mk_render_pipeline},
};

/// Vertex as uploaded to the GPU.
#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct GpuVertex {
    pub position: [f32; 3],
    pub normal: [f32; 3],
    pub uv: [f32; 2],
}

impl GpuVertex {
    const ATTRIBUTES: [wgpu::VertexAttribute; 3] =
        wgpu::vertex_attr_array![0 => Float32x3, 1 => Float32x3, 2 => Float32x2];

    pub fn desc() -> wgpu::VertexBufferLayout<'static> {
        wgpu::VertexBufferLayout {
            array_stride: std::mem::size_of::<GpuVertex>() as wgpu::BufferAddress,
            step_mode: wgpu::VertexStepMode::Vertex,
            attributes: &Self::ATTRIBUTES,
        }
    }
}

/// Per-draw uniform: model matrix plus the material parameters.
#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct MaterialUniform {
    pub model: [[f32; 4]; 4],
    /// rgb + opacity
    pub base_color: [f32; 4],
    /// rgb already multiplied by the intensity
    pub emissive: [f32; 4],
    /// roughness, metalness, unlit, textured
    pub params: [f32; 4],
    /// scale.xy, offset.xy of the sampled region
    pub uv_transform: [f32; 4],
}

impl MaterialUniform {
    pub fn new(material: &Material, model: cgmath::Matrix4<f32>) -> Self {
        let [r, g, b] = material.base_color;
        let emissive = material
            .emissive
            .map(|e| e.map(|c| c * material.emissive_intensity))
            .unwrap_or([0.0; 3]);
        let (scale, offset) = material
            .texture
            .as_ref()
            .map_or(([1.0, 1.0], [0.0, 0.0]), |t| (t.scale, t.offset));
        Self {
            model: model.into(),
            base_color: [r, g, b, material.opacity],
            emissive: [emissive[0], emissive[1], emissive[2], 0.0],
            params: [
                material.roughness,
                material.metalness,
                if material.unlit { 1.0 } else { 0.0 },
                if material.texture.is_some() { 1.0 } else { 0.0 },
            ],
            uv_transform: [scale[0], scale[1], offset[0], offset[1]],
        }
    }
}

pub fn material_layout(device: &wgpu::Device) -> wgpu::BindGroupLayout {
    device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
        entries: &[
            wgpu::BindGroupLayoutEntry {
                binding: 0,
                visibility: wgpu::ShaderStages::VERTEX | wgpu::ShaderStages::FRAGMENT,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Uniform,
                    has_dynamic_offset: false,
                    min_binding_size: None,
                },
                count: None,
            },
            wgpu::BindGroupLayoutEntry {
                binding: 1,
                visibility: wgpu::ShaderStages::FRAGMENT,
                ty: wgpu::BindingType::Texture {
                    multisampled: false,
                    view_dimension: wgpu::TextureViewDimension::D2,
                    sample_type: wgpu::TextureSampleType::Float { filterable: true },
                },
                count: None,
            },
            wgpu::BindGroupLayoutEntry {
                binding: 2,
                visibility: wgpu::ShaderStages::FRAGMENT,
                ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                count: None,
            },
        ],
        label: Some("material_bind_group_layout"),
    })
}

/// Reflection source shared by every draw. `params.x` is 1 when a sky was
/// loaded and 0 when the white fallback is bound.
#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct EnvironmentUniform {
    pub params: [f32; 4],
}

impl EnvironmentUniform {
    pub fn new(enabled: bool) -> Self {
        Self {
            params: [if enabled { 1.0 } else { 0.0 }, 0.0, 0.0, 0.0],
        }
    }
}

pub fn environment_layout(device: &wgpu::Device) -> wgpu::BindGroupLayout {
    device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
        entries: &[
            wgpu::BindGroupLayoutEntry {
                binding: 0,
                visibility: wgpu::ShaderStages::FRAGMENT,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Uniform,
                    has_dynamic_offset: false,
                    min_binding_size: None,
                },
                count: None,
            },
            wgpu::BindGroupLayoutEntry {
                binding: 1,
                visibility: wgpu::ShaderStages::FRAGMENT,
                ty: wgpu::BindingType::Texture {
                    multisampled: false,
                    view_dimension: wgpu::TextureViewDimension::D2,
                    sample_type: wgpu::TextureSampleType::Float { filterable: true },
                },
                count: None,
            },
            wgpu::BindGroupLayoutEntry {
                binding: 2,
                visibility: wgpu::ShaderStages::FRAGMENT,
                ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                count: None,
            },
        ],
        label: Some("environment_bind_group_layout"),
    })
}

pub fn material_bind_group(
    device: &wgpu::Device,
    layout: &wgpu::BindGroupLayout,
    uniform: &wgpu::Buffer,
    texture: &Texture,
    label: Option<&str>,
) -> wgpu::BindGroup {
    device.create_bind_group(&wgpu::BindGroupDescriptor {
        layout,
        entries: &[
            wgpu::BindGroupEntry {
                binding: 0,
                resource: uniform.as_entire_binding(),
            },
            wgpu::BindGroupEntry {
                binding: 1,
                resource: wgpu::BindingResource::TextureView(&texture.view),
            },
            wgpu::BindGroupEntry {
                binding: 2,
                resource: wgpu::BindingResource::Sampler(&texture.sampler),
            },
        ],
        label,
    })
}

#[derive(Debug)]
pub struct ScenePipelines {
    pub material_layout: wgpu::BindGroupLayout,
    pub environment_layout: wgpu::BindGroupLayout,
    pub opaque: wgpu::RenderPipeline,
    pub double_sided: wgpu::RenderPipeline,
    pub transparent: wgpu::RenderPipeline,
    /// Drawn first, never writes depth.
    pub sky: wgpu::RenderPipeline,
}

impl ScenePipelines {
    pub fn new(
        device: &wgpu::Device,
        config: &wgpu::SurfaceConfiguration,
        camera_bind_group_layout: &wgpu::BindGroupLayout,
    ) -> Self {
        let material_layout = material_layout(device);
        let environment_layout = environment_layout(device);
        let layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("Scene Pipeline Layout"),
            bind_group_layouts: &[camera_bind_group_layout, &material_layout, &environment_layout],
            push_constant_ranges: &[],
        });
        let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("Scene Shader"),
            source: wgpu::ShaderSource::Wgsl(include_str!("scene.wgsl").into()),
        });

        let build = |state: PipelineState, label: &str| {
            mk_render_pipeline(
                device,
                &layout,
                config.format,
                state,
                Some(Texture::DEPTH_FORMAT),
                &[GpuVertex::desc()],
                &shader,
                label,
            )
        };
        let replace = Some(wgpu::BlendState::REPLACE);

        Self {
            opaque: build(
                PipelineState {
                    blend: replace,
                    cull_mode: Some(wgpu::Face::Back),
                    depth_write: true,
                },
                "Opaque Pipeline",
            ),
            double_sided: build(
                PipelineState {
                    blend: replace,
                    cull_mode: None,
                    depth_write: true,
                },
                "Double Sided Pipeline",
            ),
            transparent: build(
                PipelineState {
                    blend: Some(wgpu::BlendState::ALPHA_BLENDING),
                    cull_mode: None,
                    depth_write: false,
                },
                "Transparent Pipeline",
            ),
            sky: build(
                PipelineState {
                    blend: replace,
                    cull_mode: Some(wgpu::Face::Back),
                    depth_write: false,
                },
                "Sky Pipeline",
            ),
            material_layout,
            environment_layout,
        }
    }
}
