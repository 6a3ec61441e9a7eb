//! Headless bake tool: generates the cloud density volume on the GPU and
//! writes it to disk as a raw single-channel blob with a JSON sidecar, plus
//! the step-size lookup table used by the raymarcher.

use std::path::PathBuf;

use anyhow::{bail, Context};
use cloud_playground::{
    default_density_profile, default_step_size_profile, required_device_limits, BakeParams,
    NoiseConfig, VolumeBaker, STEP_LUT_RESOLUTION,
};

struct CliArgs {
    params: BakeParams,
    config_path: Option<PathBuf>,
    out_path: PathBuf,
}

fn parse_args() -> anyhow::Result<CliArgs> {
    let mut params = BakeParams::default();
    let mut config_path = None;
    let mut out_path = PathBuf::from("cloud_volume.r8");

    let mut args = std::env::args().skip(1);
    while let Some(flag) = args.next() {
        let mut value = || {
            args.next()
                .with_context(|| format!("missing value for {flag}"))
        };
        match flag.as_str() {
            "--size-xz" => params.size_xz = value()?.parse()?,
            "--size-y" => params.size_y = value()?.parse()?,
            "--octaves" => params.octaves = value()?.parse()?,
            "--base-frequency" => params.base_frequency = value()?.parse()?,
            "--threshold" => params.density_threshold = value()?.parse()?,
            "--config" => config_path = Some(PathBuf::from(value()?)),
            "--out" => out_path = PathBuf::from(value()?),
            "--help" | "-h" => {
                eprintln!(
                    "usage: bake [--size-xz N] [--size-y N] [--octaves N] \
                     [--base-frequency F] [--threshold F] [--config PATH] [--out PATH]"
                );
                std::process::exit(0);
            }
            other => bail!("unknown argument {other}"),
        }
    }

    // The baker trusts pre-clamped resolutions; the clamping lives here.
    params.size_xz = params.size_xz.clamp(32, 1024);
    params.size_y = params.size_y.clamp(16, 512);
    params.octaves = params.octaves.clamp(1, 8);

    Ok(CliArgs {
        params,
        config_path,
        out_path,
    })
}

async fn bake(args: CliArgs) -> anyhow::Result<()> {
    let instance = wgpu::Instance::default();
    let adapter = instance
        .request_adapter(&wgpu::RequestAdapterOptions {
            power_preference: wgpu::PowerPreference::HighPerformance,
            force_fallback_adapter: false,
            compatible_surface: None,
        })
        .await
        .context("no suitable GPU adapter")?;
    let (device, queue) = adapter
        .request_device(
            &wgpu::DeviceDescriptor {
                label: None,
                required_features: wgpu::Features::empty(),
                required_limits: required_device_limits(),
                memory_hints: wgpu::MemoryHints::MemoryUsage,
            },
            None,
        )
        .await
        .context("creating device")?;

    let config = match &args.config_path {
        Some(path) => NoiseConfig::load(path)?,
        None => NoiseConfig::default(),
    };

    let baker = VolumeBaker::new(&device);
    let pending = baker.generate(
        &device,
        &queue,
        &args.params,
        &default_density_profile(),
        &config,
    )?;
    let baked = pending.block_on(&device)?;

    std::fs::write(&args.out_path, &baked.data)
        .with_context(|| format!("writing volume to {}", args.out_path.display()))?;

    let sidecar_path = args.out_path.with_extension("json");
    let sidecar = serde_json::json!({
        "format": "r8",
        "size_xz": baked.size_xz,
        "size_y": baked.size_y,
        "octaves": args.params.octaves,
        "base_frequency": args.params.base_frequency,
        "density_threshold": args.params.density_threshold,
    });
    std::fs::write(&sidecar_path, serde_json::to_string_pretty(&sidecar)?)
        .with_context(|| format!("writing sidecar to {}", sidecar_path.display()))?;

    let lut = default_step_size_profile().sample(STEP_LUT_RESOLUTION);
    let lut_path = args
        .out_path
        .with_file_name("step_size_lut.json");
    std::fs::write(&lut_path, serde_json::to_string_pretty(&lut)?)
        .with_context(|| format!("writing step-size LUT to {}", lut_path.display()))?;

    log::info!(
        "baked {}x{}x{} volume ({} bytes) to {}",
        baked.size_xz,
        baked.size_y,
        baked.size_xz,
        baked.data.len(),
        args.out_path.display()
    );
    Ok(())
}

fn main() -> anyhow::Result<()> {
    env_logger::init();
    let args = parse_args()?;
    pollster::block_on(bake(args))
}
