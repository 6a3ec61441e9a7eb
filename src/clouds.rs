use bytemuck::{Pod, Zeroable};

use crate::bake::VolumeTexture;
use crate::detail_noise::DetailTexture;

const RENDER_BUFFER_GROUP_ID: u32 = 0;
const RADIANCE_BUFFER_IDX: u32 = 0;

const SCENE_GROUP_ID: u32 = 1;
const VOLUME_TEXTURE_IDX: u32 = 0;
const VOLUME_SAMPLER_IDX: u32 = 1;
const DETAIL_TEXTURE_IDX: u32 = 2;
const DETAIL_SAMPLER_IDX: u32 = 3;
const STEP_LUT_IDX: u32 = 4;

const FRAME_GROUP_ID: u32 = 2;
const CAMERA_PARAMS_IDX: u32 = 0;
const CAMERA_FORWARD_IDX: u32 = 1;
const SHADING_IDX: u32 = 2;
const SCREEN_IDX: u32 = 3;

/// Camera position plus near clip distance, rewritten every frame.
#[repr(C)]
#[derive(Default, Copy, Clone, Debug, Pod, Zeroable)]
pub struct CameraParamsUniform {
    pub position: [f32; 3],
    pub near_clip: f32,
}

#[repr(C)]
#[derive(Default, Copy, Clone, Debug, Pod, Zeroable)]
pub struct CameraForwardUniform {
    pub forward: [f32; 3],
    pub _pad: f32,
}

#[repr(C)]
#[derive(Default, Copy, Clone, Debug, Pod, Zeroable)]
pub struct ScreenUniform {
    pub width: u32,
    pub height: u32,
    pub _pad0: u32,
    pub _pad1: u32,
}

/// Shading parameters plus the cloud-volume box used for ray clipping.
#[repr(C)]
#[derive(Copy, Clone, Debug, Pod, Zeroable)]
pub struct CloudShadingUniform {
    pub light_color: [f32; 4],
    pub scattering_albedo: [f32; 4],
    pub light_direction: [f32; 3],
    pub noise_amplitude: f32,
    pub box_center: [f32; 3],
    pub noise_scale: f32,
    pub box_extents: [f32; 3],
    pub noise_2d_scale: f32,
    pub asymmetry: f32,
    pub multiple_scattering: f32,
    pub min_step_size: f32,
    pub max_step_size: f32,
    pub density_threshold: f32,
    pub shadow_step_count: u32,
    pub _pad0: u32,
    pub _pad1: u32,
}

impl Default for CloudShadingUniform {
    fn default() -> Self {
        Self {
            light_color: [1.0, 1.0, 1.0, 1.0],
            scattering_albedo: [1.0, 1.0, 1.0, 1.0],
            light_direction: [0.3, 0.8, 0.2],
            noise_amplitude: 10.0,
            box_center: [0.0, 12.0, 0.0],
            noise_scale: 1.0,
            box_extents: [20.0, 4.0, 20.0],
            noise_2d_scale: 1.0,
            asymmetry: 0.0,
            multiple_scattering: 0.5,
            min_step_size: 0.1,
            max_step_size: 1.0,
            density_threshold: 0.01,
            shadow_step_count: 10,
            _pad0: 0,
            _pad1: 0,
        }
    }
}

/// Persistent radiance target: one vec4 per viewport pixel, written by the
/// raymarch pass and consumed by the composite pass.
pub fn create_radiance_buffer(device: &wgpu::Device, width: u32, height: u32) -> wgpu::Buffer {
    let size = 16 * width as u64 * height as u64;
    device.create_buffer(&wgpu::BufferDescriptor {
        label: Some("Cloud Radiance Buffer"),
        size,
        usage: wgpu::BufferUsages::STORAGE,
        mapped_at_creation: false,
    })
}

pub struct CloudPipelines {
    raymarch_pipeline: wgpu::ComputePipeline,
}

impl CloudPipelines {
    pub fn new(device: &wgpu::Device) -> Self {
        let render_buffer_bind_group_layout =
            device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                label: Some("Clouds: Render Buffer Bind Group Layout"),
                entries: &[wgpu::BindGroupLayoutEntry {
                    binding: RADIANCE_BUFFER_IDX,
                    visibility: wgpu::ShaderStages::COMPUTE,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Storage { read_only: false },
                        has_dynamic_offset: false,
                        min_binding_size: None,
                    },
                    count: None,
                }],
            });
        let scene_bind_group_layout =
            device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                label: Some("Clouds: Scene Bind Group Layout"),
                entries: &[
                wgpu::BindGroupLayoutEntry { // Baked density volume
                    binding: VOLUME_TEXTURE_IDX,
                    visibility: wgpu::ShaderStages::COMPUTE,
                    ty: wgpu::BindingType::Texture {
                        sample_type: wgpu::TextureSampleType::Float { filterable: true },
                        view_dimension: wgpu::TextureViewDimension::D3,
                        multisampled: false,
                    },
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: VOLUME_SAMPLER_IDX,
                    visibility: wgpu::ShaderStages::COMPUTE,
                    ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                    count: None,
                },
                wgpu::BindGroupLayoutEntry { // 2D detail layer
                    binding: DETAIL_TEXTURE_IDX,
                    visibility: wgpu::ShaderStages::COMPUTE,
                    ty: wgpu::BindingType::Texture {
                        sample_type: wgpu::TextureSampleType::Float { filterable: true },
                        view_dimension: wgpu::TextureViewDimension::D2,
                        multisampled: false,
                    },
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: DETAIL_SAMPLER_IDX,
                    visibility: wgpu::ShaderStages::COMPUTE,
                    ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                    count: None,
                },
                wgpu::BindGroupLayoutEntry { // Step-size coefficient LUT
                    binding: STEP_LUT_IDX,
                    visibility: wgpu::ShaderStages::COMPUTE,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Storage { read_only: true },
                        has_dynamic_offset: false,
                        min_binding_size: None,
                    },
                    count: None,
                }],
            });
        let frame_bind_group_layout =
            device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                label: Some("Clouds: Frame Bind Group Layout"),
                entries: &[
                wgpu::BindGroupLayoutEntry { // Camera position + near clip
                    binding: CAMERA_PARAMS_IDX,
                    visibility: wgpu::ShaderStages::COMPUTE,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Uniform,
                        has_dynamic_offset: false,
                        min_binding_size: None,
                    },
                    count: None,
                },
                wgpu::BindGroupLayoutEntry { // Camera forward
                    binding: CAMERA_FORWARD_IDX,
                    visibility: wgpu::ShaderStages::COMPUTE,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Uniform,
                        has_dynamic_offset: false,
                        min_binding_size: None,
                    },
                    count: None,
                },
                wgpu::BindGroupLayoutEntry { // Shading parameters
                    binding: SHADING_IDX,
                    visibility: wgpu::ShaderStages::COMPUTE,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Uniform,
                        has_dynamic_offset: false,
                        min_binding_size: None,
                    },
                    count: None,
                },
                wgpu::BindGroupLayoutEntry { // Viewport size
                    binding: SCREEN_IDX,
                    visibility: wgpu::ShaderStages::COMPUTE,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Uniform,
                        has_dynamic_offset: false,
                        min_binding_size: None,
                    },
                    count: None,
                }],
            });

        let layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("Clouds Pipeline Layout"),
            bind_group_layouts: &[
                &render_buffer_bind_group_layout,
                &scene_bind_group_layout,
                &frame_bind_group_layout,
            ],
            push_constant_ranges: &[],
        });
        let shader = device.create_shader_module(wgpu::include_wgsl!("clouds.wgsl"));
        let raymarch_pipeline = device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
            label: Some("Cloud Raymarch Pipeline"),
            layout: Some(&layout),
            module: &shader,
            entry_point: Some("cs_main"),
            compilation_options: Default::default(),
            cache: None,
        });
        Self { raymarch_pipeline }
    }
}

pub struct CloudBindings {
    render_bind_group: wgpu::BindGroup,
    scene_bind_group: wgpu::BindGroup,
    frame_bind_group: wgpu::BindGroup,
}

impl CloudBindings {
    pub fn new(
        device: &wgpu::Device,
        pipelines: &CloudPipelines,
        radiance_buffer: &wgpu::Buffer,
        volume: &VolumeTexture,
        detail: &DetailTexture,
        step_lut_buffer: &wgpu::Buffer,
        camera_params_uniform: &wgpu::Buffer,
        camera_forward_uniform: &wgpu::Buffer,
        shading_uniform: &wgpu::Buffer,
        screen_uniform: &wgpu::Buffer,
    ) -> Self {
        let render_bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Clouds: Render Buffer Bind Group"),
            layout: &pipelines
                .raymarch_pipeline
                .get_bind_group_layout(RENDER_BUFFER_GROUP_ID),
            entries: &[wgpu::BindGroupEntry {
                binding: RADIANCE_BUFFER_IDX,
                resource: radiance_buffer.as_entire_binding(),
            }],
        });
        let scene_bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Clouds: Scene Bind Group"),
            layout: &pipelines
                .raymarch_pipeline
                .get_bind_group_layout(SCENE_GROUP_ID),
            entries: &[
            wgpu::BindGroupEntry {
                binding: VOLUME_TEXTURE_IDX,
                resource: wgpu::BindingResource::TextureView(&volume.view),
            },
            wgpu::BindGroupEntry {
                binding: VOLUME_SAMPLER_IDX,
                resource: wgpu::BindingResource::Sampler(&volume.sampler),
            },
            wgpu::BindGroupEntry {
                binding: DETAIL_TEXTURE_IDX,
                resource: wgpu::BindingResource::TextureView(&detail.view),
            },
            wgpu::BindGroupEntry {
                binding: DETAIL_SAMPLER_IDX,
                resource: wgpu::BindingResource::Sampler(&detail.sampler),
            },
            wgpu::BindGroupEntry {
                binding: STEP_LUT_IDX,
                resource: step_lut_buffer.as_entire_binding(),
            }],
        });
        let frame_bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Clouds: Frame Bind Group"),
            layout: &pipelines
                .raymarch_pipeline
                .get_bind_group_layout(FRAME_GROUP_ID),
            entries: &[
            wgpu::BindGroupEntry {
                binding: CAMERA_PARAMS_IDX,
                resource: camera_params_uniform.as_entire_binding(),
            },
            wgpu::BindGroupEntry {
                binding: CAMERA_FORWARD_IDX,
                resource: camera_forward_uniform.as_entire_binding(),
            },
            wgpu::BindGroupEntry {
                binding: SHADING_IDX,
                resource: shading_uniform.as_entire_binding(),
            },
            wgpu::BindGroupEntry {
                binding: SCREEN_IDX,
                resource: screen_uniform.as_entire_binding(),
            }],
        });

        Self {
            render_bind_group,
            scene_bind_group,
            frame_bind_group,
        }
    }

    pub fn update_render_buffer(
        &mut self,
        device: &wgpu::Device,
        pipelines: &CloudPipelines,
        radiance_buffer: &wgpu::Buffer,
    ) {
        self.render_bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Clouds: Render Buffer Bind Group"),
            layout: &pipelines
                .raymarch_pipeline
                .get_bind_group_layout(RENDER_BUFFER_GROUP_ID),
            entries: &[wgpu::BindGroupEntry {
                binding: RADIANCE_BUFFER_IDX,
                resource: radiance_buffer.as_entire_binding(),
            }],
        });
    }
}

impl<'a> CloudPipelines {
    pub fn record<'pass>(
        &'a self,
        cpass: &mut wgpu::ComputePass<'pass>,
        bindings: &'a CloudBindings,
        width: u32,
        height: u32,
    ) where
        'a: 'pass,
    {
        let group_edge = 8;
        cpass.set_pipeline(&self.raymarch_pipeline);
        cpass.set_bind_group(RENDER_BUFFER_GROUP_ID, &bindings.render_bind_group, &[]);
        cpass.set_bind_group(SCENE_GROUP_ID, &bindings.scene_bind_group, &[]);
        cpass.set_bind_group(FRAME_GROUP_ID, &bindings.frame_bind_group, &[]);
        cpass.dispatch_workgroups(
            width.div_ceil(group_edge),
            height.div_ceil(group_edge),
            1,
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uniform_layouts_match_wgsl_alignment() {
        // Uniform-address-space structs must be 16-byte aligned in size.
        assert_eq!(std::mem::size_of::<CameraParamsUniform>(), 16);
        assert_eq!(std::mem::size_of::<CameraForwardUniform>(), 16);
        assert_eq!(std::mem::size_of::<ScreenUniform>(), 16);
        assert_eq!(std::mem::size_of::<CloudShadingUniform>() % 16, 0);
    }

    #[test]
    fn shading_defaults_are_usable() {
        let shading = CloudShadingUniform::default();
        assert!(shading.min_step_size > 0.0);
        assert!(shading.max_step_size >= shading.min_step_size);
        assert!(shading.shadow_step_count > 0);
        assert!((0.0..1.0).contains(&shading.density_threshold));
        for axis in shading.box_extents {
            assert!(axis > 0.0);
        }
    }
}
