//! GPU side of the composed scene.
//!
//! [`GpuScene`] mirrors what a [`SceneEngine`] currently shows: one vertex
//! and index buffer plus a material bind group per decoded mesh, and the sky
//! sphere. It is rebuilt whenever the engine's revision moves on. Uploaded
//! images are kept by texture key, so atlas regions and re-applied countertop
//! textures don't upload the same image twice.
//!
//! Draw order is sky, opaque, double-sided, then transparent. Lit materials
//! reflect the backdrop's environment map when the scene has one.

use std::collections::{HashMap, HashSet};

use cgmath::{Matrix4, SquareMatrix};
use wgpu::util::DeviceExt;

use crate::{
    context::Context,
    data_structures::{
        material::{Material, TextureHandle},
        mesh::DecodedMesh,
        texture::Texture,
    },
    engine::SceneEngine,
    pipelines::scene::{EnvironmentUniform, GpuVertex, MaterialUniform, material_bind_group},
    resources::{AssetSource, sky::Backdrop},
};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DrawKind {
    Opaque,
    DoubleSided,
    Transparent,
}

impl DrawKind {
    pub fn of(material: &Material) -> Self {
        if material.transparent {
            DrawKind::Transparent
        } else if material.double_sided {
            DrawKind::DoubleSided
        } else {
            DrawKind::Opaque
        }
    }
}

pub struct GpuMesh {
    pub vertex: wgpu::Buffer,
    pub index: wgpu::Buffer,
    pub amount: u32,
    pub uniform: wgpu::Buffer,
    pub group: wgpu::BindGroup,
    pub kind: DrawKind,
}

pub struct GpuSky {
    pub mesh: GpuMesh,
    pub material: MaterialUniform,
}

pub struct GpuScene {
    revision: Option<u64>,
    meshes: Vec<GpuMesh>,
    sky: Option<GpuSky>,
    environment: wgpu::BindGroup,
    textures: HashMap<String, Texture>,
    white: Texture,
}

/// Interleaves the mesh attributes. Meshes without UVs sample at the origin.
pub fn interleave(mesh: &DecodedMesh) -> Vec<GpuVertex> {
    mesh.positions
        .iter()
        .enumerate()
        .map(|(i, position)| GpuVertex {
            position: *position,
            normal: mesh.normals.get(i).copied().unwrap_or([0.0, 0.0, 1.0]),
            uv: mesh
                .uvs
                .as_ref()
                .and_then(|uvs| uvs.get(i).copied())
                .unwrap_or([0.0, 0.0]),
        })
        .collect()
}

fn sky_material(backdrop: &Backdrop) -> Material {
    Material {
        name: "sky".to_string(),
        texture: Some(backdrop.texture.clone()),
        unlit: true,
        ..Default::default()
    }
}

fn environment_bind_group(ctx: &Context, texture: &Texture, enabled: bool) -> wgpu::BindGroup {
    let uniform = ctx
        .device
        .create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("environment"),
            contents: bytemuck::cast_slice(&[EnvironmentUniform::new(enabled)]),
            usage: wgpu::BufferUsages::UNIFORM,
        });
    ctx.device.create_bind_group(&wgpu::BindGroupDescriptor {
        layout: &ctx.pipelines.environment_layout,
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
        label: Some("environment_bind_group"),
    })
}

impl GpuScene {
    pub fn new(ctx: &Context) -> Self {
        let white = Texture::create_white(&ctx.device, &ctx.queue);
        Self {
            revision: None,
            meshes: Vec::new(),
            sky: None,
            environment: environment_bind_group(ctx, &white, false),
            textures: HashMap::new(),
            white,
        }
    }

    pub fn revision(&self) -> Option<u64> {
        self.revision
    }

    fn texture(&mut self, ctx: &Context, handle: Option<&TextureHandle>) -> &Texture {
        match handle {
            Some(handle) => self
                .textures
                .entry(handle.key.clone())
                .or_insert_with(|| Texture::from_handle(&ctx.device, &ctx.queue, handle)),
            None => &self.white,
        }
    }

    fn upload(
        &mut self,
        ctx: &Context,
        label: &str,
        vertices: &[GpuVertex],
        indices: &[u32],
        material: &Material,
        model: Matrix4<f32>,
    ) -> GpuMesh {
        let vertex = ctx
            .device
            .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some(label),
                contents: bytemuck::cast_slice(vertices),
                usage: wgpu::BufferUsages::VERTEX,
            });
        let index = ctx
            .device
            .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some(label),
                contents: bytemuck::cast_slice(indices),
                usage: wgpu::BufferUsages::INDEX,
            });
        let uniform = ctx
            .device
            .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some(label),
                contents: bytemuck::cast_slice(&[MaterialUniform::new(material, model)]),
                usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            });
        let texture = self.texture(ctx, material.texture.as_ref());
        let group = material_bind_group(
            &ctx.device,
            &ctx.pipelines.material_layout,
            &uniform,
            texture,
            Some(label),
        );
        GpuMesh {
            vertex,
            index,
            amount: indices.len() as u32,
            uniform,
            group,
            kind: DrawKind::of(material),
        }
    }

    /// Re-uploads the scene if the engine changed since the last call.
    pub fn sync<S: AssetSource + 'static>(&mut self, ctx: &Context, engine: &SceneEngine<S>) -> bool {
        if self.revision == Some(engine.revision()) {
            return false;
        }
        self.revision = Some(engine.revision());
        self.meshes.clear();
        self.sky = None;
        self.environment = environment_bind_group(ctx, &self.white, false);

        let Some(scene) = engine.scene() else {
            self.textures.clear();
            return true;
        };

        let fallback = Material::default();
        let mut used = HashSet::new();
        for (i, mesh) in scene.meshes.iter().enumerate() {
            if mesh.indices.is_empty() {
                continue;
            }
            let material = engine.material_for(i).unwrap_or(&fallback);
            if let Some(texture) = &material.texture {
                used.insert(texture.key.clone());
            }
            let gpu = self.upload(
                ctx,
                &format!("mesh {}", mesh.node_id),
                &interleave(mesh),
                &mesh.indices,
                material,
                Matrix4::identity(),
            );
            self.meshes.push(gpu);
        }

        if let Some(backdrop) = &scene.backdrop {
            let material = sky_material(backdrop);
            used.insert(backdrop.texture.key.clone());
            let vertices: Vec<GpuVertex> = backdrop
                .sphere
                .positions
                .iter()
                .zip(&backdrop.sphere.uvs)
                .map(|(p, uv)| GpuVertex {
                    position: *p,
                    normal: p.map(|c| -c),
                    uv: *uv,
                })
                .collect();
            let model = backdrop.model_matrix([0.0; 3]);
            let mesh = self.upload(
                ctx,
                "sky",
                &vertices,
                &backdrop.sphere.indices,
                &material,
                model,
            );
            self.sky = Some(GpuSky {
                mesh,
                material: MaterialUniform::new(&material, model),
            });

            used.insert(backdrop.environment.key.clone());
            let environment = {
                let texture = self.texture(ctx, Some(&backdrop.environment));
                environment_bind_group(ctx, texture, true)
            };
            self.environment = environment;
        }

        self.textures.retain(|key, _| used.contains(key));
        log::debug!(
            "uploaded {} meshes and {} textures (revision {})",
            self.meshes.len(),
            self.textures.len(),
            engine.revision()
        );
        true
    }

    /// Moves the sky sphere to the model matrix computed for this frame.
    pub fn update_backdrop(&mut self, ctx: &Context, model: Matrix4<f32>) {
        if let Some(sky) = self.sky.as_mut() {
            sky.material.model = model.into();
            ctx.queue
                .write_buffer(&sky.mesh.uniform, 0, bytemuck::cast_slice(&[sky.material]));
        }
    }

    pub fn draw<'pass>(&self, ctx: &Context, render_pass: &mut wgpu::RenderPass<'pass>) {
        render_pass.set_bind_group(0, &ctx.camera.bind_group, &[]);
        render_pass.set_bind_group(2, &self.environment, &[]);
        if let Some(sky) = &self.sky {
            render_pass.set_pipeline(&ctx.pipelines.sky);
            draw_mesh(render_pass, &sky.mesh);
        }
        for (kind, pipeline) in [
            (DrawKind::Opaque, &ctx.pipelines.opaque),
            (DrawKind::DoubleSided, &ctx.pipelines.double_sided),
            (DrawKind::Transparent, &ctx.pipelines.transparent),
        ] {
            render_pass.set_pipeline(pipeline);
            for mesh in self.meshes.iter().filter(|m| m.kind == kind) {
                draw_mesh(render_pass, mesh);
            }
        }
    }
}

fn draw_mesh(render_pass: &mut wgpu::RenderPass<'_>, mesh: &GpuMesh) {
    if mesh.amount == 0 {
        return;
    }
    render_pass.set_bind_group(1, &mesh.group, &[]);
    render_pass.set_vertex_buffer(0, mesh.vertex.slice(..));
    render_pass.set_index_buffer(mesh.index.slice(..), wgpu::IndexFormat::Uint32);
    render_pass.draw_indexed(0..mesh.amount, 0, 0..1);
}
