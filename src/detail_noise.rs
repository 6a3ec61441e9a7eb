use std::f32::consts::TAU;

/// Edge length of the generated detail texture, in texels.
pub const DETAIL_TEXTURE_SIZE: u32 = 512;

/// Seed grid for the Worley pass: one jittered point per cell of a
/// GRID_SIZE x GRID_SIZE lattice over the unit square.
pub const GRID_SIZE: usize = 10;

pub const DEFAULT_SEED: u64 = 0x49AC_9E14;

fn splitmix64(mut x: u64) -> u64 {
    x = x.wrapping_add(0x9E3779B97F4A7C15);
    x = (x ^ (x >> 30)).wrapping_mul(0xBF58476D1CE4E5B9);
    x = (x ^ (x >> 27)).wrapping_mul(0x94D049BB133111EB);
    x ^ (x >> 31)
}

/// Sequential deterministic generator for point jitter and configuration
/// randomization. Lattice hashing below stays stateless.
pub struct Rng {
    state: u64,
}

impl Rng {
    pub fn new(seed: u64) -> Self {
        Self { state: seed }
    }

    pub fn next_u32(&mut self) -> u32 {
        self.state = splitmix64(self.state);
        (self.state >> 32) as u32
    }

    pub fn next_f32(&mut self) -> f32 {
        (self.next_u32() >> 8) as f32 / (1 << 24) as f32
    }

    pub fn range_f32(&mut self, lo: f32, hi: f32) -> f32 {
        lo + self.next_f32() * (hi - lo)
    }
}

fn hash_lattice(ix: u32, iy: u32, seed: u64) -> u32 {
    let packed = ((ix as u64) << 32) | iy as u64;
    (splitmix64(packed ^ splitmix64(seed)) >> 32) as u32
}

fn smootherstep(t: f32) -> f32 {
    t * t * t * (t * (t * 6.0 - 15.0) + 10.0)
}

fn lerp(a: f32, b: f32, t: f32) -> f32 {
    a + (b - a) * t
}

/// Gradient noise with lattice coordinates wrapped to `period`, so the
/// result tiles over [0, period) in both axes. Output roughly in [-1, 1].
pub fn periodic_gradient_noise(x: f32, y: f32, period: u32, seed: u64) -> f32 {
    let ix = x.floor() as i64;
    let iy = y.floor() as i64;
    let fx = x - ix as f32;
    let fy = y - iy as f32;

    let wrap = |v: i64| v.rem_euclid(period as i64) as u32;
    let grad = |cx: i64, cy: i64, dx: f32, dy: f32| {
        let h = hash_lattice(wrap(cx), wrap(cy), seed);
        let angle = h as f32 / u32::MAX as f32 * TAU;
        angle.cos() * dx + angle.sin() * dy
    };

    let v00 = grad(ix, iy, fx, fy);
    let v10 = grad(ix + 1, iy, fx - 1.0, fy);
    let v01 = grad(ix, iy + 1, fx, fy - 1.0);
    let v11 = grad(ix + 1, iy + 1, fx - 1.0, fy - 1.0);

    let sx = smootherstep(fx);
    let sy = smootherstep(fy);
    let a = lerp(v00, v10, sx);
    let b = lerp(v01, v11, sx);
    // Raw lattice-gradient range is about [-0.7, 0.7].
    lerp(a, b, sy) * 1.414
}

/// One random point per grid cell, jittered inside the cell.
pub fn generate_cell_points(rng: &mut Rng) -> Vec<[f32; 2]> {
    let cell_size = 1.0 / GRID_SIZE as f32;
    let mut points = Vec::with_capacity(GRID_SIZE * GRID_SIZE);
    for y in 0..GRID_SIZE {
        for x in 0..GRID_SIZE {
            points.push([
                x as f32 * cell_size + rng.next_f32() * cell_size,
                y as f32 * cell_size + rng.next_f32() * cell_size,
            ]);
        }
    }
    points
}

/// Distance to the nearest and second-nearest seed point, searching the
/// full point set in the home tile and its eight wraparound neighbors.
pub fn worley_distances(uv: [f32; 2], points: &[[f32; 2]]) -> (f32, f32) {
    let mut f1 = f32::MAX;
    let mut f2 = f32::MAX;
    for tile_y in -1i32..=1 {
        for tile_x in -1i32..=1 {
            for point in points {
                let dx = point[0] + tile_x as f32 - uv[0];
                let dy = point[1] + tile_y as f32 - uv[1];
                let dist = (dx * dx + dy * dy).sqrt();
                if dist < f1 {
                    f2 = f1;
                    f1 = dist;
                } else if dist < f2 {
                    f2 = dist;
                }
            }
        }
    }
    (f1, f2)
}

/// RGBA8 texel data: inverted F1, inverted F2, periodic gradient noise.
pub fn generate_detail_texture_data(size: u32, seed: u64) -> Vec<u8> {
    let mut rng = Rng::new(seed);
    let points = generate_cell_points(&mut rng);
    let perlin_period = GRID_SIZE as u32;

    let mut data = Vec::with_capacity((size * size * 4) as usize);
    for y in 0..size {
        for x in 0..size {
            let uv = [x as f32 / size as f32, y as f32 / size as f32];
            let (f1, f2) = worley_distances(uv, &points);
            let worley1 = 1.0 - (f1 * GRID_SIZE as f32).clamp(0.0, 1.0);
            let worley2 = 1.0 - (f2 * GRID_SIZE as f32).clamp(0.0, 1.0);
            let perlin = periodic_gradient_noise(
                uv[0] * perlin_period as f32,
                uv[1] * perlin_period as f32,
                perlin_period,
                seed,
            ) * 0.5
                + 0.5;
            data.push((worley1 * 255.0) as u8);
            data.push((worley2 * 255.0) as u8);
            data.push((perlin.clamp(0.0, 1.0) * 255.0) as u8);
            data.push(255);
        }
    }
    data
}

/// The secondary 2D noise layer sampled by the cloud raymarcher.
pub struct DetailTexture {
    pub texture: wgpu::Texture,
    pub view: wgpu::TextureView,
    pub sampler: wgpu::Sampler,
}

impl DetailTexture {
    pub fn new(device: &wgpu::Device, queue: &wgpu::Queue, seed: u64) -> Self {
        let data = generate_detail_texture_data(DETAIL_TEXTURE_SIZE, seed);

        let texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some("Detail Noise Texture"),
            size: wgpu::Extent3d {
                width: DETAIL_TEXTURE_SIZE,
                height: DETAIL_TEXTURE_SIZE,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: wgpu::TextureFormat::Rgba8Unorm,
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
            &data,
            wgpu::ImageDataLayout {
                offset: 0,
                bytes_per_row: Some(DETAIL_TEXTURE_SIZE * 4),
                rows_per_image: Some(DETAIL_TEXTURE_SIZE),
            },
            wgpu::Extent3d {
                width: DETAIL_TEXTURE_SIZE,
                height: DETAIL_TEXTURE_SIZE,
                depth_or_array_layers: 1,
            },
        );

        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("Detail Noise Sampler"),
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
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cell_points_land_inside_their_cells() {
        let mut rng = Rng::new(DEFAULT_SEED);
        let points = generate_cell_points(&mut rng);
        assert_eq!(points.len(), GRID_SIZE * GRID_SIZE);
        let cell_size = 1.0 / GRID_SIZE as f32;
        for (i, point) in points.iter().enumerate() {
            let cx = (i % GRID_SIZE) as f32 * cell_size;
            let cy = (i / GRID_SIZE) as f32 * cell_size;
            assert!(point[0] >= cx && point[0] <= cx + cell_size);
            assert!(point[1] >= cy && point[1] <= cy + cell_size);
        }
    }

    #[test]
    fn worley_reports_true_nearest_and_second_nearest() {
        let mut rng = Rng::new(1);
        let points = generate_cell_points(&mut rng);
        for uv in [[0.0, 0.0], [0.013, 0.87], [0.5, 0.5], [0.999, 0.001]] {
            let (f1, f2) = worley_distances(uv, &points);
            assert!(f1 <= f2);
            // Exhaustive check against all 9 * 100 candidates.
            for tile_y in -1i32..=1 {
                for tile_x in -1i32..=1 {
                    for point in &points {
                        let dx = point[0] + tile_x as f32 - uv[0];
                        let dy = point[1] + tile_y as f32 - uv[1];
                        let dist = (dx * dx + dy * dy).sqrt();
                        assert!(f1 <= dist + 1e-6);
                        if dist > f1 + 1e-6 {
                            assert!(f2 <= dist + 1e-6);
                        }
                    }
                }
            }
        }
    }

    #[test]
    fn worley_nearest_is_a_real_candidate() {
        let mut rng = Rng::new(2);
        let points = generate_cell_points(&mut rng);
        let uv = [0.25, 0.75];
        let (f1, _) = worley_distances(uv, &points);
        let mut best = f32::MAX;
        for tile_y in -1i32..=1 {
            for tile_x in -1i32..=1 {
                for point in &points {
                    let dx = point[0] + tile_x as f32 - uv[0];
                    let dy = point[1] + tile_y as f32 - uv[1];
                    best = best.min((dx * dx + dy * dy).sqrt());
                }
            }
        }
        assert!((f1 - best).abs() < 1e-6);
    }

    #[test]
    fn periodic_noise_tiles_at_domain_boundary() {
        let period = GRID_SIZE as u32;
        for offset in [0.17, 1.4, 3.99, 7.5] {
            let a = periodic_gradient_noise(offset, 0.33, period, 5);
            let b = periodic_gradient_noise(offset + period as f32, 0.33, period, 5);
            let c = periodic_gradient_noise(offset, 0.33 + period as f32, period, 5);
            assert!((a - b).abs() < 1e-4);
            assert!((a - c).abs() < 1e-4);
        }
    }

    #[test]
    fn texture_data_is_deterministic_per_seed() {
        let a = generate_detail_texture_data(32, 77);
        let b = generate_detail_texture_data(32, 77);
        assert_eq!(a, b);
        let c = generate_detail_texture_data(32, 78);
        assert_ne!(a, c);
    }

    #[test]
    fn texture_data_has_expected_layout() {
        let data = generate_detail_texture_data(16, DEFAULT_SEED);
        assert_eq!(data.len(), 16 * 16 * 4);
        for texel in data.chunks_exact(4) {
            assert_eq!(texel[3], 255);
        }
    }
}
