/// Resolution of the step-size coefficient lookup table.
pub const STEP_LUT_RESOLUTION: usize = 16;

#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Keyframe {
    pub time: f32,
    pub value: f32,
    pub in_tangent: f32,
    pub out_tangent: f32,
}

impl Keyframe {
    pub fn new(time: f32, value: f32, tangent: f32) -> Self {
        Self {
            time,
            value,
            in_tangent: tangent,
            out_tangent: tangent,
        }
    }
}

/// Piecewise cubic Hermite curve over normalized height [0, 1].
/// Evaluation clamps to the end values outside the key range.
#[derive(Clone, Debug)]
pub struct Curve {
    keys: Vec<Keyframe>,
}

impl Curve {
    /// Keys must be non-empty; they are sorted by time on construction.
    pub fn new(mut keys: Vec<Keyframe>) -> Self {
        assert!(!keys.is_empty(), "curve needs at least one keyframe");
        keys.sort_by(|a, b| a.time.total_cmp(&b.time));
        Self { keys }
    }

    pub fn constant(value: f32) -> Self {
        Self::new(vec![Keyframe::new(0.0, value, 0.0)])
    }

    pub fn evaluate(&self, t: f32) -> f32 {
        let first = self.keys.first().unwrap();
        let last = self.keys.last().unwrap();
        if t <= first.time {
            return first.value;
        }
        if t >= last.time {
            return last.value;
        }

        let next = self
            .keys
            .iter()
            .position(|k| k.time > t)
            .unwrap_or(self.keys.len() - 1);
        let k0 = &self.keys[next - 1];
        let k1 = &self.keys[next];

        let dt = k1.time - k0.time;
        if dt <= f32::EPSILON {
            return k1.value;
        }
        let s = (t - k0.time) / dt;
        let s2 = s * s;
        let s3 = s2 * s;

        let h00 = 2.0 * s3 - 3.0 * s2 + 1.0;
        let h10 = s3 - 2.0 * s2 + s;
        let h01 = -2.0 * s3 + 3.0 * s2;
        let h11 = s3 - s2;

        h00 * k0.value + h10 * dt * k0.out_tangent + h01 * k1.value + h11 * dt * k1.in_tangent
    }

    /// Sample the curve at `resolution` evenly spaced heights over [0, 1]
    /// inclusive (resolution - 1 subdivisions). The GPU side interpolates
    /// between entries; no filtering happens here.
    pub fn sample(&self, resolution: usize) -> Vec<f32> {
        assert!(resolution >= 1, "lookup table needs at least one entry");
        (0..resolution)
            .map(|i| {
                let height = if resolution == 1 {
                    0.0
                } else {
                    i as f32 / (resolution - 1) as f32
                };
                self.evaluate(height)
            })
            .collect()
    }
}

/// Vertical density shaping used when no profile is configured: dense lower
/// clouds thinning out toward the top.
pub fn default_density_profile() -> Curve {
    Curve::new(vec![
        Keyframe::new(0.0, 0.7, 0.3),
        Keyframe::new(0.3, 1.0, 0.1),
        Keyframe::new(0.6, 0.4, -0.5),
        Keyframe::new(1.0, 0.0, -0.2),
    ])
}

/// Step-size coefficient over height: large steps in the lower cloud band,
/// tightening toward the cloud tops.
pub fn default_step_size_profile() -> Curve {
    Curve::new(vec![
        Keyframe::new(0.0, 0.7, 0.3),
        Keyframe::new(0.3, 1.0, 0.1),
        Keyframe::new(0.6, 0.4, -0.5),
        Keyframe::new(1.0, 0.0, -0.2),
    ])
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_close(a: f32, b: f32) {
        assert!((a - b).abs() < 1e-5, "{a} != {b}");
    }

    #[test]
    fn constant_curve_samples_flat() {
        let curve = Curve::constant(0.42);
        for resolution in [1, 2, 3, 16, 257] {
            let lut = curve.sample(resolution);
            assert_eq!(lut.len(), resolution);
            for entry in lut {
                assert_close(entry, 0.42);
            }
        }
    }

    #[test]
    fn single_entry_lut_samples_height_zero() {
        let curve = Curve::new(vec![
            Keyframe::new(0.0, 1.0, 0.0),
            Keyframe::new(1.0, 0.0, 0.0),
        ]);
        let lut = curve.sample(1);
        assert_eq!(lut, vec![1.0]);
    }

    #[test]
    fn sampling_hits_keyframes_exactly() {
        let curve = default_density_profile();
        // 11 samples put entries exactly on the 0.0, 0.3 (index 3), 0.6
        // (index 6) and 1.0 keys.
        let lut = curve.sample(11);
        assert_close(lut[0], 0.7);
        assert_close(lut[3], 1.0);
        assert_close(lut[6], 0.4);
        assert_close(lut[10], 0.0);
    }

    #[test]
    fn evaluation_clamps_outside_range() {
        let curve = default_density_profile();
        assert_close(curve.evaluate(-1.0), 0.7);
        assert_close(curve.evaluate(2.0), 0.0);
    }

    #[test]
    fn hermite_segment_with_zero_tangents_is_smoothstep() {
        let curve = Curve::new(vec![
            Keyframe::new(0.0, 0.0, 0.0),
            Keyframe::new(1.0, 1.0, 0.0),
        ]);
        // Midpoint of a zero-tangent Hermite segment is the average.
        assert_close(curve.evaluate(0.5), 0.5);
        // Smoothstep shape: slow start.
        assert!(curve.evaluate(0.25) < 0.25);
        assert!(curve.evaluate(0.75) > 0.75);
    }

    #[test]
    fn keys_are_sorted_on_construction() {
        let curve = Curve::new(vec![
            Keyframe::new(1.0, 0.0, 0.0),
            Keyframe::new(0.0, 1.0, 0.0),
        ]);
        assert_close(curve.evaluate(0.0), 1.0);
        assert_close(curve.evaluate(1.0), 0.0);
    }
}
