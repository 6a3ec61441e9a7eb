use std::path::Path;

use anyhow::{bail, Context};
use serde::{Deserialize, Serialize};

use crate::detail_noise::Rng;

/// Upper bound on layered octaves; the bake kernel reserves buffer space for
/// exactly this many.
pub const MAX_OCTAVES: usize = 8;

/// One noise layer: a phase offset into the noise domain and a weight.
/// Frequency is not stored; it is derived from the layer's position in the
/// sequence (base * 2^index).
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct OctaveSettings {
    pub offset: [f32; 3],
    pub amplitude: f32,
}

/// Ordered octave list. Order is significant: it defines the layering index
/// and therefore each layer's frequency.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct NoiseConfig {
    pub octaves: Vec<OctaveSettings>,
}

impl Default for NoiseConfig {
    fn default() -> Self {
        let offsets = [
            [15.73, 63.91, 27.39],
            [87.23, 34.57, 76.92],
            [45.32, 96.15, 12.48],
            [71.84, 23.69, 89.32],
            [33.54, 78.41, 55.91],
            [67.24, 12.85, 43.28],
            [89.47, 45.32, 91.76],
            [23.67, 89.14, 34.52],
        ];
        let octaves = offsets
            .iter()
            .enumerate()
            .map(|(i, &offset)| OctaveSettings {
                offset,
                amplitude: 1.0 / (1 << i) as f32,
            })
            .collect();
        Self { octaves }
    }
}

impl NoiseConfig {
    /// Octave count 1..=MAX_OCTAVES, amplitudes in [0, 1]. Offsets are
    /// free-form phase shifts and are not constrained.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.octaves.is_empty() {
            bail!("noise configuration has no octaves");
        }
        if self.octaves.len() > MAX_OCTAVES {
            bail!(
                "noise configuration has {} octaves, maximum is {}",
                self.octaves.len(),
                MAX_OCTAVES
            );
        }
        for (i, octave) in self.octaves.iter().enumerate() {
            if !(0.0..=1.0).contains(&octave.amplitude) || !octave.amplitude.is_finite() {
                bail!(
                    "octave {} amplitude {} is outside [0, 1]",
                    i,
                    octave.amplitude
                );
            }
        }
        Ok(())
    }

    pub fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading noise configuration {}", path.display()))?;
        let config: Self = serde_json::from_str(&text)
            .with_context(|| format!("parsing noise configuration {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn save(&self, path: impl AsRef<Path>) -> anyhow::Result<()> {
        let path = path.as_ref();
        let text = serde_json::to_string_pretty(self)?;
        std::fs::write(path, text)
            .with_context(|| format!("writing noise configuration {}", path.display()))
    }

    /// Re-draw every offset from [0, 100) on each axis. Amplitudes keep
    /// their configured falloff.
    pub fn randomize(&mut self, rng: &mut Rng) {
        for octave in &mut self.octaves {
            octave.offset = [
                rng.range_f32(0.0, 100.0),
                rng.range_f32(0.0, 100.0),
                rng.range_f32(0.0, 100.0),
            ];
        }
    }

    pub fn offsets(&self) -> Vec<[f32; 3]> {
        self.octaves.iter().map(|o| o.offset).collect()
    }

    pub fn amplitudes(&self) -> Vec<f32> {
        self.octaves.iter().map(|o| o.amplitude).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let config = NoiseConfig::default();
        assert_eq!(config.octaves.len(), MAX_OCTAVES);
        config.validate().unwrap();
    }

    #[test]
    fn default_amplitudes_halve_per_octave() {
        let amplitudes = NoiseConfig::default().amplitudes();
        for pair in amplitudes.windows(2) {
            assert!((pair[1] - pair[0] * 0.5).abs() < 1e-6);
        }
    }

    #[test]
    fn validation_rejects_empty_and_oversized() {
        let empty = NoiseConfig { octaves: vec![] };
        assert!(empty.validate().is_err());

        let oversized = NoiseConfig {
            octaves: vec![
                OctaveSettings {
                    offset: [0.0; 3],
                    amplitude: 0.5
                };
                MAX_OCTAVES + 1
            ],
        };
        assert!(oversized.validate().is_err());
    }

    #[test]
    fn validation_rejects_amplitude_out_of_range() {
        let config = NoiseConfig {
            octaves: vec![OctaveSettings {
                offset: [1.0, 2.0, 3.0],
                amplitude: 1.5,
            }],
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn randomize_is_deterministic_per_seed() {
        let mut a = NoiseConfig::default();
        let mut b = NoiseConfig::default();
        a.randomize(&mut Rng::new(7));
        b.randomize(&mut Rng::new(7));
        assert_eq!(a.offsets(), b.offsets());

        let mut c = NoiseConfig::default();
        c.randomize(&mut Rng::new(8));
        assert_ne!(a.offsets(), c.offsets());
    }

    #[test]
    fn randomized_offsets_stay_in_range() {
        let mut config = NoiseConfig::default();
        config.randomize(&mut Rng::new(99));
        for offset in config.offsets() {
            for component in offset {
                assert!((0.0..100.0).contains(&component));
            }
        }
    }
}
