use std::sync::{mpsc, Arc};

use anyhow::{anyhow, bail, Context};
use bytemuck::{Pod, Zeroable};
use wgpu::util::DeviceExt;

use crate::curve::Curve;
use crate::noise_config::{NoiseConfig, MAX_OCTAVES};

const WORKGROUP_EDGE: u32 = 8;

const OUTPUT_GROUP_ID: u32 = 0;
const RESULT_IDX: u32 = 0;

const INPUT_GROUP_ID: u32 = 1;
const HEIGHT_PROFILE_IDX: u32 = 0;
const FREQUENCIES_IDX: u32 = 1;
const AMPLITUDES_IDX: u32 = 2;
const OFFSETS_IDX: u32 = 3;
const PARAMS_IDX: u32 = 4;

#[repr(C)]
#[derive(Default, Copy, Clone, Debug, Pod, Zeroable)]
struct BakeParamsUniform {
    num_octaves: u32,
    size_xz: u32,
    size_y: u32,
    density_threshold: f32,
}

/// Bake inputs. Resolution ranges (32..=1024 horizontal, 16..=512 vertical)
/// are the caller's contract; the baker does not revalidate them.
#[derive(Copy, Clone, Debug)]
pub struct BakeParams {
    pub size_xz: u32,
    pub size_y: u32,
    pub octaves: u32,
    pub base_frequency: f32,
    pub density_threshold: f32,
}

impl Default for BakeParams {
    fn default() -> Self {
        Self {
            size_xz: 64,
            size_y: 32,
            octaves: 4,
            base_frequency: 0.8,
            density_threshold: 0.4,
        }
    }
}

/// frequency[i] = base * 2^i, isotropic across all three axes. Entries past
/// the requested octave count stay zero and are never read by the kernel.
/// The fourth component is padding for the WGSL vec3 array stride.
pub fn calculate_frequencies(base_frequency: f32, octaves: u32) -> [[f32; 4]; MAX_OCTAVES] {
    let mut frequencies = [[0.0; 4]; MAX_OCTAVES];
    for (i, entry) in frequencies.iter_mut().enumerate().take(octaves as usize) {
        let freq = base_frequency * (1u32 << i) as f32;
        *entry = [freq, freq, freq, 0.0];
    }
    frequencies
}

pub fn workgroup_count(size: u32) -> u32 {
    size.div_ceil(WORKGROUP_EDGE)
}

/// Readback rows are padded to the wgpu copy alignment.
pub fn padded_bytes_per_row(size_xz: u32) -> u32 {
    let unpadded = size_xz * 4;
    unpadded.div_ceil(wgpu::COPY_BYTES_PER_ROW_ALIGNMENT) * wgpu::COPY_BYTES_PER_ROW_ALIGNMENT
}

/// Take the first channel of every RGBA texel, dropping row padding, into a
/// tightly packed single-channel volume of size_xz * size_y * size_xz bytes.
pub fn extract_red_channel(data: &[u8], size_xz: u32, size_y: u32) -> Vec<u8> {
    let padded = padded_bytes_per_row(size_xz) as usize;
    let mut out = Vec::with_capacity((size_xz * size_y * size_xz) as usize);
    for z in 0..size_xz {
        for y in 0..size_y {
            let row = ((z * size_y + y) as usize) * padded;
            for x in 0..size_xz as usize {
                out.push(data[row + x * 4]);
            }
        }
    }
    out
}

/// Finalized single-channel density volume: repeat wrap, linear filter,
/// immutable after upload.
pub struct VolumeTexture {
    pub texture: wgpu::Texture,
    pub view: wgpu::TextureView,
    pub sampler: wgpu::Sampler,
    pub size_xz: u32,
    pub size_y: u32,
}

impl VolumeTexture {
    pub fn from_data(
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        size_xz: u32,
        size_y: u32,
        data: &[u8],
    ) -> Self {
        let extent = wgpu::Extent3d {
            width: size_xz,
            height: size_y,
            depth_or_array_layers: size_xz,
        };
        let texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some("Cloud Density Volume"),
            size: extent,
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D3,
            format: wgpu::TextureFormat::R8Unorm,
            usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
            view_formats: &[],
        });
        queue.write_texture(
            wgpu::ImageCopyTexture {
                texture: &texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            data,
            wgpu::ImageDataLayout {
                offset: 0,
                bytes_per_row: Some(size_xz),
                rows_per_image: Some(size_y),
            },
            extent,
        );
        let view = texture.create_view(&wgpu::TextureViewDescriptor {
            dimension: Some(wgpu::TextureViewDimension::D3),
            ..Default::default()
        });
        let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("Cloud Density Sampler"),
            address_mode_u: wgpu::AddressMode::Repeat,
            address_mode_v: wgpu::AddressMode::Repeat,
            address_mode_w: wgpu::AddressMode::Repeat,
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            mipmap_filter: wgpu::FilterMode::Nearest,
            ..Default::default()
        });
        Self {
            texture,
            view,
            sampler,
            size_xz,
            size_y,
        }
    }
}

/// Readback result before the final texture is built.
pub struct BakedVolume {
    pub data: Vec<u8>,
    pub size_xz: u32,
    pub size_y: u32,
}

impl BakedVolume {
    pub fn into_texture(self, device: &wgpu::Device, queue: &wgpu::Queue) -> VolumeTexture {
        VolumeTexture::from_data(device, queue, self.size_xz, self.size_y, &self.data)
    }
}

pub struct NoiseBakePipeline {
    pipeline: wgpu::ComputePipeline,
}

impl NoiseBakePipeline {
    pub fn new(device: &wgpu::Device) -> Self {
        let output_bind_group_layout =
            device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                label: Some("Bake: Output Bind Group Layout"),
                entries: &[wgpu::BindGroupLayoutEntry {
                    binding: RESULT_IDX,
                    visibility: wgpu::ShaderStages::COMPUTE,
                    ty: wgpu::BindingType::StorageTexture {
                        access: wgpu::StorageTextureAccess::WriteOnly,
                        format: wgpu::TextureFormat::Rgba8Unorm,
                        view_dimension: wgpu::TextureViewDimension::D3,
                    },
                    count: None,
                }],
            });
        let input_bind_group_layout =
            device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                label: Some("Bake: Input Bind Group Layout"),
                entries: &[
                wgpu::BindGroupLayoutEntry { // Height profile LUT
                    binding: HEIGHT_PROFILE_IDX,
                    visibility: wgpu::ShaderStages::COMPUTE,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Storage { read_only: true },
                        has_dynamic_offset: false,
                        min_binding_size: None,
                    },
                    count: None,
                },
                wgpu::BindGroupLayoutEntry { // Per-octave frequencies
                    binding: FREQUENCIES_IDX,
                    visibility: wgpu::ShaderStages::COMPUTE,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Storage { read_only: true },
                        has_dynamic_offset: false,
                        min_binding_size: None,
                    },
                    count: None,
                },
                wgpu::BindGroupLayoutEntry { // Per-octave amplitudes
                    binding: AMPLITUDES_IDX,
                    visibility: wgpu::ShaderStages::COMPUTE,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Storage { read_only: true },
                        has_dynamic_offset: false,
                        min_binding_size: None,
                    },
                    count: None,
                },
                wgpu::BindGroupLayoutEntry { // Per-octave offsets
                    binding: OFFSETS_IDX,
                    visibility: wgpu::ShaderStages::COMPUTE,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Storage { read_only: true },
                        has_dynamic_offset: false,
                        min_binding_size: None,
                    },
                    count: None,
                },
                wgpu::BindGroupLayoutEntry { // Bake params
                    binding: PARAMS_IDX,
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
            label: Some("Bake Pipeline Layout"),
            bind_group_layouts: &[&output_bind_group_layout, &input_bind_group_layout],
            push_constant_ranges: &[],
        });
        let shader = device.create_shader_module(wgpu::include_wgsl!("noise_bake.wgsl"));
        let pipeline = device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
            label: Some("Noise Bake Pipeline"),
            layout: Some(&layout),
            module: &shader,
            entry_point: Some("generate_noise_3d"),
            compilation_options: Default::default(),
            cache: None,
        });
        Self { pipeline }
    }
}

/// Transient GPU bundle for one bake. Moved into the readback closure, so a
/// superseding bake can never release these while the copy is in flight.
struct BakeResources {
    _render_target: wgpu::Texture,
    readback: Arc<wgpu::Buffer>,
}

/// Receiving side of the single-use bake completion channel.
pub struct PendingVolume {
    receiver: mpsc::Receiver<anyhow::Result<BakedVolume>>,
}

impl PendingVolume {
    /// Non-blocking poll for the viewer's frame loop. Returns `Some` exactly
    /// once: either the finished volume or the failure that ended the bake.
    pub fn try_take(&self) -> Option<anyhow::Result<BakedVolume>> {
        match self.receiver.try_recv() {
            Ok(result) => Some(result),
            Err(mpsc::TryRecvError::Empty) => None,
            Err(mpsc::TryRecvError::Disconnected) => {
                Some(Err(anyhow!("volume bake dropped without delivering a result")))
            }
        }
    }

    /// Drive the device until the readback completes.
    pub fn block_on(self, device: &wgpu::Device) -> anyhow::Result<BakedVolume> {
        loop {
            match self.receiver.try_recv() {
                Ok(result) => return result,
                Err(mpsc::TryRecvError::Empty) => {
                    device.poll(wgpu::Maintain::Wait);
                }
                Err(mpsc::TryRecvError::Disconnected) => {
                    bail!("volume bake dropped without delivering a result")
                }
            }
        }
    }
}

pub struct VolumeBaker {
    pipeline: NoiseBakePipeline,
}

impl VolumeBaker {
    pub fn new(device: &wgpu::Device) -> Self {
        Self {
            pipeline: NoiseBakePipeline::new(device),
        }
    }

    /// Dispatch a bake and return its completion handle. Each call owns an
    /// independent resource bundle; issuing another bake before this one
    /// completes supersedes it without touching its in-flight readback.
    pub fn generate(
        &self,
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        params: &BakeParams,
        density_profile: &Curve,
        config: &NoiseConfig,
    ) -> anyhow::Result<PendingVolume> {
        if let Err(err) = config.validate() {
            log::warn!("skipping bake: {err}");
            return Err(err);
        }
        let octaves = params.octaves.clamp(1, MAX_OCTAVES as u32);
        if (octaves as usize) > config.octaves.len() {
            log::warn!(
                "skipping bake: {} octaves requested but only {} configured",
                octaves,
                config.octaves.len()
            );
            bail!("octave count exceeds configured octaves");
        }

        let size_xz = params.size_xz;
        let size_y = params.size_y;

        let render_target = device.create_texture(&wgpu::TextureDescriptor {
            label: Some("Bake Render Target"),
            size: wgpu::Extent3d {
                width: size_xz,
                height: size_y,
                depth_or_array_layers: size_xz,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D3,
            format: wgpu::TextureFormat::Rgba8Unorm,
            usage: wgpu::TextureUsages::STORAGE_BINDING | wgpu::TextureUsages::COPY_SRC,
            view_formats: &[],
        });
        let render_target_view = render_target.create_view(&wgpu::TextureViewDescriptor {
            dimension: Some(wgpu::TextureViewDimension::D3),
            ..Default::default()
        });

        let frequencies = calculate_frequencies(params.base_frequency, octaves);
        let height_profile = density_profile.sample(size_y as usize);

        let mut offsets = [[0.0f32; 4]; MAX_OCTAVES];
        for (entry, offset) in offsets.iter_mut().zip(config.offsets()) {
            *entry = [offset[0], offset[1], offset[2], 0.0];
        }
        let mut amplitudes = [0.0f32; MAX_OCTAVES];
        for (entry, amplitude) in amplitudes.iter_mut().zip(config.amplitudes()) {
            *entry = amplitude;
        }

        let height_profile_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Bake Height Profile Buffer"),
            contents: bytemuck::cast_slice(&height_profile),
            usage: wgpu::BufferUsages::STORAGE,
        });
        let frequencies_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Bake Frequencies Buffer"),
            contents: bytemuck::cast_slice(&frequencies),
            usage: wgpu::BufferUsages::STORAGE,
        });
        let amplitudes_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Bake Amplitudes Buffer"),
            contents: bytemuck::cast_slice(&amplitudes),
            usage: wgpu::BufferUsages::STORAGE,
        });
        let offsets_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Bake Offsets Buffer"),
            contents: bytemuck::cast_slice(&offsets),
            usage: wgpu::BufferUsages::STORAGE,
        });
        let params_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Bake Params Buffer"),
            contents: bytemuck::cast_slice(&[BakeParamsUniform {
                num_octaves: octaves,
                size_xz,
                size_y,
                density_threshold: params.density_threshold,
            }]),
            usage: wgpu::BufferUsages::UNIFORM,
        });

        let output_bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Bake: Output Bind Group"),
            layout: &self.pipeline.pipeline.get_bind_group_layout(OUTPUT_GROUP_ID),
            entries: &[wgpu::BindGroupEntry {
                binding: RESULT_IDX,
                resource: wgpu::BindingResource::TextureView(&render_target_view),
            }],
        });
        let input_bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Bake: Input Bind Group"),
            layout: &self.pipeline.pipeline.get_bind_group_layout(INPUT_GROUP_ID),
            entries: &[
            wgpu::BindGroupEntry {
                binding: HEIGHT_PROFILE_IDX,
                resource: height_profile_buffer.as_entire_binding(),
            },
            wgpu::BindGroupEntry {
                binding: FREQUENCIES_IDX,
                resource: frequencies_buffer.as_entire_binding(),
            },
            wgpu::BindGroupEntry {
                binding: AMPLITUDES_IDX,
                resource: amplitudes_buffer.as_entire_binding(),
            },
            wgpu::BindGroupEntry {
                binding: OFFSETS_IDX,
                resource: offsets_buffer.as_entire_binding(),
            },
            wgpu::BindGroupEntry {
                binding: PARAMS_IDX,
                resource: params_buffer.as_entire_binding(),
            }],
        });

        let padded_row = padded_bytes_per_row(size_xz);
        let readback = Arc::new(device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Bake Readback Buffer"),
            size: padded_row as u64 * size_y as u64 * size_xz as u64,
            usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ,
            mapped_at_creation: false,
        }));

        let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("Bake Encoder"),
        });
        {
            let mut cpass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                label: Some("Bake Pass"),
                timestamp_writes: None,
            });
            cpass.set_pipeline(&self.pipeline.pipeline);
            cpass.set_bind_group(OUTPUT_GROUP_ID, &output_bind_group, &[]);
            cpass.set_bind_group(INPUT_GROUP_ID, &input_bind_group, &[]);
            cpass.dispatch_workgroups(
                workgroup_count(size_xz),
                workgroup_count(size_y),
                workgroup_count(size_xz),
            );
        }
        encoder.copy_texture_to_buffer(
            wgpu::ImageCopyTexture {
                texture: &render_target,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            wgpu::ImageCopyBuffer {
                buffer: readback.as_ref(),
                layout: wgpu::ImageDataLayout {
                    offset: 0,
                    bytes_per_row: Some(padded_row),
                    rows_per_image: Some(size_y),
                },
            },
            wgpu::Extent3d {
                width: size_xz,
                height: size_y,
                depth_or_array_layers: size_xz,
            },
        );
        queue.submit(Some(encoder.finish()));

        let resources = BakeResources {
            _render_target: render_target,
            readback,
        };
        let (sender, receiver) = mpsc::channel();
        let readback = resources.readback.clone();
        // The closure owns this bake's bundle; it is released only after the
        // readback has been consumed.
        readback
            .slice(..)
            .map_async(wgpu::MapMode::Read, move |map_result| {
                let result = map_result
                    .context("mapping bake readback buffer")
                    .map(|()| {
                        let mapped = resources.readback.slice(..).get_mapped_range();
                        let data = extract_red_channel(&mapped, size_xz, size_y);
                        drop(mapped);
                        resources.readback.unmap();
                        BakedVolume {
                            data,
                            size_xz,
                            size_y,
                        }
                    });
                let _ = sender.send(result);
            });

        Ok(PendingVolume { receiver })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::curve::Curve;

    #[test]
    fn frequencies_form_geometric_progression() {
        for octaves in 1..=MAX_OCTAVES as u32 {
            let frequencies = calculate_frequencies(0.8, octaves);
            for i in 0..octaves as usize {
                let expected = 0.8 * (1u32 << i) as f32;
                assert_eq!(frequencies[i], [expected, expected, expected, 0.0]);
            }
            for entry in frequencies.iter().skip(octaves as usize) {
                assert_eq!(*entry, [0.0; 4]);
            }
        }
    }

    #[test]
    fn frequencies_are_isotropic() {
        let frequencies = calculate_frequencies(1.3, 8);
        for entry in &frequencies {
            assert_eq!(entry[0], entry[1]);
            assert_eq!(entry[1], entry[2]);
        }
    }

    #[test]
    fn workgroups_cover_the_full_extent() {
        for size in [1, 7, 8, 9, 63, 64, 65, 1024] {
            let groups = workgroup_count(size);
            assert!(groups * WORKGROUP_EDGE >= size);
            assert!(groups.saturating_sub(1) * WORKGROUP_EDGE < size);
        }
    }

    #[test]
    fn row_padding_respects_copy_alignment() {
        for size_xz in [32, 64, 63, 100, 1024] {
            let padded = padded_bytes_per_row(size_xz);
            assert_eq!(padded % wgpu::COPY_BYTES_PER_ROW_ALIGNMENT, 0);
            assert!(padded >= size_xz * 4);
            assert!(padded - size_xz * 4 < wgpu::COPY_BYTES_PER_ROW_ALIGNMENT);
        }
    }

    #[test]
    fn red_channel_extraction_drops_padding_and_other_channels() {
        let size_xz = 3u32;
        let size_y = 2u32;
        let padded = padded_bytes_per_row(size_xz) as usize;
        let mut data = vec![0xEEu8; padded * (size_y * size_xz) as usize];
        for z in 0..size_xz {
            for y in 0..size_y {
                let row = ((z * size_y + y) as usize) * padded;
                for x in 0..size_xz as usize {
                    data[row + x * 4] = (z * 100 + y * 10 + x as u32) as u8;
                    data[row + x * 4 + 1] = 0xAA;
                    data[row + x * 4 + 2] = 0xBB;
                    data[row + x * 4 + 3] = 0xCC;
                }
            }
        }
        let out = extract_red_channel(&data, size_xz, size_y);
        assert_eq!(out.len(), (size_xz * size_y * size_xz) as usize);
        let mut i = 0;
        for z in 0..size_xz {
            for y in 0..size_y {
                for x in 0..size_xz {
                    assert_eq!(out[i], (z * 100 + y * 10 + x) as u8);
                    i += 1;
                }
            }
        }
    }

    #[test]
    fn extraction_output_matches_volume_voxel_count() {
        let size_xz = 64u32;
        let size_y = 32u32;
        let padded = padded_bytes_per_row(size_xz) as usize;
        let data = vec![0u8; padded * (size_y * size_xz) as usize];
        let out = extract_red_channel(&data, size_xz, size_y);
        assert_eq!(out.len(), 64 * 32 * 64);
    }

    #[test]
    fn bake_input_preparation_is_deterministic() {
        let profile = Curve::new(vec![
            crate::curve::Keyframe::new(0.0, 0.7, 0.3),
            crate::curve::Keyframe::new(1.0, 0.0, -0.2),
        ]);
        let a = (calculate_frequencies(0.8, 4), profile.sample(32));
        let b = (calculate_frequencies(0.8, 4), profile.sample(32));
        assert_eq!(a.0, b.0);
        assert_eq!(a.1, b.1);
    }

    #[test]
    fn params_uniform_layout_is_16_bytes() {
        assert_eq!(std::mem::size_of::<BakeParamsUniform>(), 16);
    }
}
