// scene.rs — GPU resources for one city's panorama

use crate::asset::prepare_panorama;
use crate::error::ViewerError;
use crate::frame_loop::RenderSurface;
use crate::lifecycle::SurfaceFactory;
use crate::mesh::build_sphere;
use crate::orientation::LOOK_AT_RADIUS;
use crate::particles::{ParticleField, DEFAULT_HALF_EXTENT};
use crate::renderer::{GpuContext, DEPTH_FORMAT, SCENE_FORMAT};
use glam::{Mat4, Vec3};
use image::RgbaImage;
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::rc::Rc;
use wgpu::util::DeviceExt;

pub const SPHERE_WIDTH_SEGMENTS: usize = 60;
pub const SPHERE_HEIGHT_SEGMENTS: usize = 40;
pub const NEAR_PLANE: f32 = 1.0;
pub const FAR_PLANE: f32 = 1100.0;

#[repr(C)]
#[derive(Debug, Copy, Clone, bytemuck::Pod, bytemuck::Zeroable)]
struct CameraUniform {
    view_proj: [[f32; 4]; 4],
    particle_model: [[f32; 4]; 4],
}

/// Colour + depth target the scene renders into; composited onto the window.
struct SceneTarget {
    color: wgpu::Texture,
    depth: wgpu::Texture,
    color_view: wgpu::TextureView,
    depth_view: wgpu::TextureView,
    composite_bind_group: wgpu::BindGroup,
}

impl SceneTarget {
    fn new(gpu: &GpuContext, width: u32, height: u32) -> Self {
        let size = wgpu::Extent3d {
            width: width.max(1),
            height: height.max(1),
            depth_or_array_layers: 1,
        };
        let color = gpu.device.create_texture(&wgpu::TextureDescriptor {
            label: Some("scene_color"),
            size,
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: SCENE_FORMAT,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::TEXTURE_BINDING,
            view_formats: &[],
        });
        let depth = gpu.device.create_texture(&wgpu::TextureDescriptor {
            label: Some("scene_depth"),
            size,
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: DEPTH_FORMAT,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            view_formats: &[],
        });
        let color_view = color.create_view(&wgpu::TextureViewDescriptor::default());
        let depth_view = depth.create_view(&wgpu::TextureViewDescriptor::default());

        let composite_bind_group = gpu.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("composite_bind_group"),
            layout: &gpu.composite_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: wgpu::BindingResource::TextureView(&color_view),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::Sampler(&gpu.composite_sampler),
                },
            ],
        });

        Self {
            color,
            depth,
            color_view,
            depth_view,
            composite_bind_group,
        }
    }

    fn destroy(&self) {
        self.color.destroy();
        self.depth.destroy();
    }
}

pub struct PanoramaScene {
    gpu: Rc<GpuContext>,
    panorama: wgpu::Texture,
    camera_buffer: wgpu::Buffer,
    bind_group: wgpu::BindGroup,
    sphere_vertices: wgpu::Buffer,
    sphere_indices: wgpu::Buffer,
    sphere_index_count: u32,
    particle_buffer: wgpu::Buffer,
    particles: ParticleField,
    target: SceneTarget,
    look_at: Vec3,
    fov_deg: f32,
    size: (u32, u32),
    disposed: bool,
}

impl PanoramaScene {
    pub fn composite_bind_group(&self) -> &wgpu::BindGroup {
        &self.target.composite_bind_group
    }

    fn aspect(&self) -> f32 {
        self.size.0.max(1) as f32 / self.size.1.max(1) as f32
    }

    fn camera_uniform(&self) -> CameraUniform {
        let view = Mat4::look_at_rh(Vec3::ZERO, self.look_at, Vec3::Y);
        let proj = Mat4::perspective_rh(
            self.fov_deg.to_radians(),
            self.aspect(),
            NEAR_PLANE,
            FAR_PLANE,
        );
        CameraUniform {
            view_proj: (proj * view).to_cols_array_2d(),
            particle_model: self.particles.model_matrix().to_cols_array_2d(),
        }
    }
}

impl RenderSurface for PanoramaScene {
    fn set_look_at(&mut self, target: Vec3) {
        self.look_at = target;
    }

    fn set_field_of_view(&mut self, fov_deg: f32) {
        self.fov_deg = fov_deg;
    }

    fn advance_particles(&mut self) {
        self.particles.advance();
    }

    fn resize(&mut self, width: u32, height: u32) {
        if self.disposed || (width, height) == self.size {
            return;
        }
        self.size = (width, height);
        self.target.destroy();
        self.target = SceneTarget::new(&self.gpu, width, height);
    }

    fn render_frame(&mut self) {
        if self.disposed {
            return;
        }
        let gpu = &self.gpu;
        gpu.queue
            .write_buffer(&self.camera_buffer, 0, bytemuck::cast_slice(&[self.camera_uniform()]));

        let mut encoder = gpu.device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("Scene Encoder"),
        });
        {
            let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("Scene Pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &self.target.color_view,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(wgpu::Color::BLACK),
                        store: true,
                    },
                })],
                depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                    view: &self.target.depth_view,
                    depth_ops: Some(wgpu::Operations {
                        load: wgpu::LoadOp::Clear(1.0),
                        store: true,
                    }),
                    stencil_ops: None,
                }),
            });

            pass.set_bind_group(0, &self.bind_group, &[]);

            pass.set_pipeline(&gpu.sphere_pipeline);
            pass.set_vertex_buffer(0, self.sphere_vertices.slice(..));
            pass.set_index_buffer(self.sphere_indices.slice(..), wgpu::IndexFormat::Uint32);
            pass.draw_indexed(0..self.sphere_index_count, 0, 0..1);

            if !self.particles.is_empty() {
                pass.set_pipeline(&gpu.particle_pipeline);
                pass.set_vertex_buffer(0, self.particle_buffer.slice(..));
                pass.draw(0..self.particles.len() as u32, 0..1);
            }
        }
        gpu.queue.submit(std::iter::once(encoder.finish()));
    }

    fn dispose(&mut self) {
        if self.disposed {
            return;
        }
        self.disposed = true;
        self.target.destroy();
        self.panorama.destroy();
        self.camera_buffer.destroy();
        self.sphere_vertices.destroy();
        self.sphere_indices.destroy();
        self.particle_buffer.destroy();
        log::debug!("panorama scene disposed");
    }
}

/// Builds a [`PanoramaScene`] on the shared device for each city that loads.
pub struct WgpuSceneFactory {
    gpu: Rc<GpuContext>,
    particle_count: usize,
    rng: StdRng,
}

impl WgpuSceneFactory {
    pub fn new(gpu: Rc<GpuContext>, particle_count: usize) -> Self {
        Self {
            gpu,
            particle_count,
            rng: StdRng::from_entropy(),
        }
    }

    fn build(&mut self, panorama: RgbaImage, fov_deg: f32, size: (u32, u32)) -> PanoramaScene {
        let gpu = Rc::clone(&self.gpu);
        let device = &gpu.device;

        let img = prepare_panorama(panorama, gpu.max_texture_dimension());
        let (width, height) = img.dimensions();
        let texture_size = wgpu::Extent3d {
            width,
            height,
            depth_or_array_layers: 1,
        };
        let texture = device.create_texture(&wgpu::TextureDescriptor {
            size: texture_size,
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: wgpu::TextureFormat::Rgba8UnormSrgb,
            usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
            label: Some("panorama_texture"),
            view_formats: &[],
        });
        gpu.queue.write_texture(
            wgpu::ImageCopyTexture {
                texture: &texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            &img,
            wgpu::ImageDataLayout {
                offset: 0,
                bytes_per_row: Some(4 * width),
                rows_per_image: Some(height),
            },
            texture_size,
        );
        let texture_view = texture.create_view(&wgpu::TextureViewDescriptor::default());

        let camera_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Camera Buffer"),
            size: std::mem::size_of::<CameraUniform>() as wgpu::BufferAddress,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            layout: &gpu.scene_layout,
            entries: &[
                wgpu::BindGroupEntry { binding: 0, resource: camera_buffer.as_entire_binding() },
                wgpu::BindGroupEntry { binding: 1, resource: wgpu::BindingResource::TextureView(&texture_view) },
                wgpu::BindGroupEntry { binding: 2, resource: wgpu::BindingResource::Sampler(&gpu.panorama_sampler) },
            ],
            label: Some("scene_bind_group"),
        });

        let mesh = build_sphere(
            LOOK_AT_RADIUS,
            SPHERE_WIDTH_SEGMENTS,
            SPHERE_HEIGHT_SEGMENTS,
            true,
        );
        let sphere_vertices = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Sphere Vertices"),
            contents: bytemuck::cast_slice(&mesh.vertices),
            usage: wgpu::BufferUsages::VERTEX,
        });
        let sphere_indices = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Sphere Indices"),
            contents: bytemuck::cast_slice(&mesh.indices),
            usage: wgpu::BufferUsages::INDEX,
        });

        let particles = ParticleField::random(self.particle_count, DEFAULT_HALF_EXTENT, &mut self.rng);
        // Zero-sized buffers are invalid, keep one slot even with no particles.
        let particle_bytes: Vec<[f32; 3]> = if particles.is_empty() {
            vec![[0.0; 3]]
        } else {
            particles.positions().to_vec()
        };
        let particle_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Particles"),
            contents: bytemuck::cast_slice(&particle_bytes),
            usage: wgpu::BufferUsages::VERTEX,
        });

        let target = SceneTarget::new(&gpu, size.0, size.1);

        PanoramaScene {
            gpu: Rc::clone(&gpu),
            panorama: texture,
            camera_buffer,
            bind_group,
            sphere_vertices,
            sphere_indices,
            sphere_index_count: mesh.indices.len() as u32,
            particle_buffer,
            particles,
            target,
            look_at: Vec3::X * LOOK_AT_RADIUS,
            fov_deg,
            size,
            disposed: false,
        }
    }
}

impl SurfaceFactory for WgpuSceneFactory {
    type Surface = PanoramaScene;

    fn create(
        &mut self,
        panorama: RgbaImage,
        fov_deg: f32,
        size: (u32, u32),
    ) -> Result<PanoramaScene, ViewerError> {
        let device = &self.gpu.device;
        device.push_error_scope(wgpu::ErrorFilter::OutOfMemory);
        device.push_error_scope(wgpu::ErrorFilter::Validation);

        let scene = self.build(panorama, fov_deg, size);

        let device = &self.gpu.device;
        let validation = pollster::block_on(device.pop_error_scope());
        let oom = pollster::block_on(device.pop_error_scope());
        match validation.or(oom) {
            None => Ok(scene),
            Some(err) => {
                let mut scene = scene;
                scene.dispose();
                Err(ViewerError::RenderSurfaceUnavailable(err.to_string()))
            }
        }
    }
}
