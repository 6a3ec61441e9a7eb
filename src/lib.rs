pub mod bake;
pub mod clouds;
pub mod composite;
pub mod curve;
pub mod detail_noise;
pub mod noise_config;
pub mod raybox;

#[cfg(target_arch = "wasm32")]
use wasm_bindgen::prelude::*;

use cgmath::{InnerSpace, Point3, Vector3};
use web_time::Instant;
use wgpu::util::DeviceExt;
use winit::{
    event::{ElementState, Event, MouseButton, WindowEvent},
    event_loop::EventLoop,
};
use winit::window::WindowBuilder;

pub use crate::bake::{BakeParams, BakedVolume, PendingVolume, VolumeBaker, VolumeTexture};
pub use crate::clouds::{
    create_radiance_buffer, CameraForwardUniform, CameraParamsUniform, CloudBindings,
    CloudPipelines, CloudShadingUniform, ScreenUniform,
};
pub use crate::composite::{CompositeBindings, CompositePass};
pub use crate::curve::{
    default_density_profile, default_step_size_profile, Curve, Keyframe, STEP_LUT_RESOLUTION,
};
pub use crate::detail_noise::{DetailTexture, Rng, DEFAULT_SEED};
pub use crate::noise_config::{NoiseConfig, OctaveSettings, MAX_OCTAVES};
pub use crate::raybox::{resize_by_drag, OrientedBox, Ray, MIN_BOX_DIMENSION};

/// Matches the field of view baked into the raymarch kernel.
const TAN_HALF_FOV: f32 = 0.5774;
const NEAR_CLIP: f32 = 0.1;
const CAMERA_ORBIT_RADIUS: f32 = 45.0;
const CAMERA_HEIGHT: f32 = 5.0;
const NOISE_CONFIG_PATH: &str = "noise_config.json";

/// Device limits the bake kernel needs beyond the defaults: an 8x8x8
/// workgroup is 512 invocations.
pub fn required_device_limits() -> wgpu::Limits {
    wgpu::Limits {
        max_compute_invocations_per_workgroup: 512,
        max_compute_workgroup_size_x: 512,
        max_compute_workgroup_size_y: 512,
        max_compute_workgroup_size_z: 64,
        ..wgpu::Limits::default()
    }
}

/// Pick ray for a cursor position, mirroring the kernel's camera model.
fn pick_ray(
    cursor: (f32, f32),
    width: f32,
    height: f32,
    position: Point3<f32>,
    forward: Vector3<f32>,
) -> Ray {
    let ndc_x = cursor.0 / width * 2.0 - 1.0;
    let ndc_y = cursor.1 / height * 2.0 - 1.0;
    let aspect = width / height;
    let forward = forward.normalize();
    let right = forward.cross(Vector3::unit_y()).normalize();
    let up = right.cross(forward);
    let dir = (forward + right * (ndc_x * aspect * TAN_HALF_FOV) - up * (ndc_y * TAN_HALF_FOV))
        .normalize();
    Ray::new(position, dir)
}

async fn arun() {
    cfg_if::cfg_if! {
        if #[cfg(target_arch = "wasm32")] {
            std::panic::set_hook(Box::new(console_error_panic_hook::hook));
            console_log::init_with_level(log::Level::Debug).expect("Couldn't initialize logger");
        } else {
            env_logger::init();
        }
    }

    let event_loop = EventLoop::new().unwrap();
    let window = WindowBuilder::new().build(&event_loop).unwrap();

    #[cfg(target_arch = "wasm32")]
    {
        // Winit prevents sizing with CSS, so we have to set
        // the size manually when on web.
        use winit::dpi::PhysicalSize;
        let _ = window.request_inner_size(PhysicalSize::new(450, 400));

        use winit::platform::web::WindowExtWebSys;
        web_sys::window()
            .and_then(|win| win.document())
            .and_then(|doc| {
                let dst = doc.get_element_by_id("wasm-example")?;
                let canvas = web_sys::Element::from(window.canvas()?);
                dst.append_child(&canvas).ok()?;
                Some(())
            })
            .expect("Couldn't append canvas to document body.");
    }

    let size = window.inner_size();

    let instance = wgpu::Instance::default();

    let surface = instance.create_surface(&window).unwrap();
    let adapter = instance
        .request_adapter(&wgpu::RequestAdapterOptions {
            power_preference: wgpu::PowerPreference::HighPerformance,
            force_fallback_adapter: false,
            // Request an adapter which can render to our surface
            compatible_surface: Some(&surface),
        })
        .await
        .expect("Failed to find an appropriate adapter");

    // Create the logical device and command queue
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
        .expect("Failed to create device");

    let noise_config = match NoiseConfig::load(NOISE_CONFIG_PATH) {
        Ok(config) => config,
        Err(err) => {
            log::info!("using default noise configuration ({err})");
            NoiseConfig::default()
        }
    };

    let detail_texture = DetailTexture::new(&device, &queue, DEFAULT_SEED);

    let baker = VolumeBaker::new(&device);
    let bake_params = BakeParams::default();
    let density_profile = default_density_profile();
    let mut pending_volume = baker
        .generate(&device, &queue, &bake_params, &density_profile, &noise_config)
        .map_err(|err| log::error!("initial bake failed to start: {err}"))
        .ok();
    let mut volume: Option<VolumeTexture> = None;

    let step_lut = default_step_size_profile().sample(STEP_LUT_RESOLUTION);
    let step_lut_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
        label: Some("Step Size LUT Buffer"),
        contents: bytemuck::cast_slice(&step_lut),
        usage: wgpu::BufferUsages::STORAGE,
    });

    let camera_params_uniform = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
        label: Some("Camera Params Uniform Buffer"),
        contents: bytemuck::cast_slice(&[CameraParamsUniform::default()]),
        usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
    });
    let camera_forward_uniform = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
        label: Some("Camera Forward Uniform Buffer"),
        contents: bytemuck::cast_slice(&[CameraForwardUniform::default()]),
        usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
    });
    let shading_uniform = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
        label: Some("Cloud Shading Uniform Buffer"),
        contents: bytemuck::cast_slice(&[CloudShadingUniform::default()]),
        usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
    });
    let screen_uniform = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
        label: Some("Screen Uniform Buffer"),
        contents: bytemuck::cast_slice(&[ScreenUniform {
            width: size.width.max(1),
            height: size.height.max(1),
            _pad0: 0,
            _pad1: 0,
        }]),
        usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
    });

    let mut radiance_buffer =
        create_radiance_buffer(&device, size.width.max(1), size.height.max(1));

    let swapchain_capabilities = surface.get_capabilities(&adapter);
    let swapchain_format = swapchain_capabilities.formats[0];

    let composite_pass = CompositePass::new(&device, swapchain_format);
    let mut composite_bindings =
        CompositeBindings::new(&device, &composite_pass, &radiance_buffer, &screen_uniform);

    let cloud_pipelines = CloudPipelines::new(&device);
    // Created once the first baked volume arrives.
    let mut cloud_bindings: Option<CloudBindings> = None;

    let mut config = surface
        .get_default_config(&adapter, size.width.max(1), size.height.max(1))
        .unwrap();
    surface.configure(&device, &config);

    let mut shading = CloudShadingUniform::default();
    let box_center = Point3::new(
        shading.box_center[0],
        shading.box_center[1],
        shading.box_center[2],
    );
    let mut box_dimensions = Vector3::new(
        shading.box_extents[0] * 2.0,
        shading.box_extents[1] * 2.0,
        shading.box_extents[2] * 2.0,
    );

    let mut camera_position = Point3::new(CAMERA_ORBIT_RADIUS, CAMERA_HEIGHT, 0.0);
    let mut camera_forward = (box_center - camera_position).normalize();
    let mut cursor_position = (0.0f32, 0.0f32);
    let mut drag_anchor: Option<Point3<f32>> = None;

    let start_time = Instant::now();

    let window = &window;

    event_loop
        .run(move |event, target| {
            // Have the closure take ownership of the resources.
            // `event_loop.run` never returns, therefore we must do this to ensure
            // the resources are properly cleaned up.
            let _ = (&instance, &adapter, &composite_pass, &detail_texture, &volume);

            if let Event::AboutToWait = event {
                // The readback completion is the only point where GPU-produced
                // density data becomes readable; adopt the volume when it lands.
                let bake_result = pending_volume.as_ref().and_then(|pending| pending.try_take());
                if let Some(result) = bake_result {
                    pending_volume = None;
                    match result {
                        Ok(baked) => {
                            let new_volume = baked.into_texture(&device, &queue);
                            cloud_bindings = Some(CloudBindings::new(
                                &device,
                                &cloud_pipelines,
                                &radiance_buffer,
                                &new_volume,
                                &detail_texture,
                                &step_lut_buffer,
                                &camera_params_uniform,
                                &camera_forward_uniform,
                                &shading_uniform,
                                &screen_uniform,
                            ));
                            // Replacing the handle drops any prior volume.
                            volume = Some(new_volume);
                        }
                        Err(err) => log::error!("volume bake failed: {err:#}"),
                    }
                }

                let frame = surface
                    .get_current_texture()
                    .expect("Failed to acquire next swap chain texture");
                let view = frame
                    .texture
                    .create_view(&wgpu::TextureViewDescriptor::default());
                let mut encoder =
                    device.create_command_encoder(&wgpu::CommandEncoderDescriptor { label: None });

                let time_elapsed = start_time.elapsed().as_secs_f32();
                let orbit = time_elapsed * 0.05;
                camera_position = Point3::new(
                    orbit.cos() * CAMERA_ORBIT_RADIUS,
                    CAMERA_HEIGHT,
                    orbit.sin() * CAMERA_ORBIT_RADIUS,
                );
                camera_forward = (box_center - camera_position).normalize();

                shading.box_center = [box_center.x, box_center.y, box_center.z];
                shading.box_extents = [
                    box_dimensions.x * 0.5,
                    box_dimensions.y * 0.5,
                    box_dimensions.z * 0.5,
                ];

                queue.write_buffer(
                    &camera_params_uniform,
                    0,
                    bytemuck::cast_slice(&[CameraParamsUniform {
                        position: [camera_position.x, camera_position.y, camera_position.z],
                        near_clip: NEAR_CLIP,
                    }]),
                );
                queue.write_buffer(
                    &camera_forward_uniform,
                    0,
                    bytemuck::cast_slice(&[CameraForwardUniform {
                        forward: [camera_forward.x, camera_forward.y, camera_forward.z],
                        _pad: 0.0,
                    }]),
                );
                queue.write_buffer(&shading_uniform, 0, bytemuck::cast_slice(&[shading]));
                queue.write_buffer(
                    &screen_uniform,
                    0,
                    bytemuck::cast_slice(&[ScreenUniform {
                        width: config.width,
                        height: config.height,
                        _pad0: 0,
                        _pad1: 0,
                    }]),
                );

                if let Some(bindings) = &cloud_bindings {
                    let mut cpass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                        label: None,
                        timestamp_writes: None,
                    });
                    cloud_pipelines.record(&mut cpass, bindings, config.width, config.height);
                }

                {
                    let mut rpass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                        label: None,
                        color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                            view: &view,
                            resolve_target: None,
                            ops: wgpu::Operations {
                                load: wgpu::LoadOp::Clear(wgpu::Color::BLACK),
                                store: wgpu::StoreOp::Store,
                            },
                        })],
                        depth_stencil_attachment: None,
                        timestamp_writes: None,
                        occlusion_query_set: None,
                    });
                    composite_pass.record(&mut rpass, &composite_bindings);
                }
                queue.submit(Some(encoder.finish()));
                frame.present();

                window.request_redraw();
            };

            if let Event::WindowEvent {
                window_id: _,
                event,
            } = event
            {
                match event {
                    WindowEvent::Resized(new_size) => {
                        // Reconfigure the surface with the new size
                        config.width = new_size.width.max(1);
                        config.height = new_size.height.max(1);
                        surface.configure(&device, &config);
                        radiance_buffer =
                            create_radiance_buffer(&device, config.width, config.height);
                        composite_bindings.update_radiance_buffer(
                            &device,
                            &composite_pass,
                            &radiance_buffer,
                        );
                        if let Some(bindings) = &mut cloud_bindings {
                            bindings.update_render_buffer(
                                &device,
                                &cloud_pipelines,
                                &radiance_buffer,
                            );
                        }
                        // On macos the window needs to be redrawn manually after resizing
                        window.request_redraw();
                    }
                    WindowEvent::CursorMoved { position, .. } => {
                        cursor_position = (position.x as f32, position.y as f32);
                        if let Some(anchor) = drag_anchor {
                            let ray = pick_ray(
                                cursor_position,
                                config.width as f32,
                                config.height as f32,
                                camera_position,
                                camera_forward,
                            );
                            let cloud_box = OrientedBox::axis_aligned(
                                box_center,
                                Vector3::new(
                                    box_dimensions.x * 0.5,
                                    box_dimensions.y * 0.5,
                                    box_dimensions.z * 0.5,
                                ),
                            );
                            if let Some(hit) = cloud_box.intersect(&ray) {
                                box_dimensions = resize_by_drag(box_dimensions, hit - anchor);
                                drag_anchor = Some(hit);
                            }
                        }
                    }
                    WindowEvent::MouseInput {
                        state,
                        button: MouseButton::Left,
                        ..
                    } => match state {
                        ElementState::Pressed => {
                            let ray = pick_ray(
                                cursor_position,
                                config.width as f32,
                                config.height as f32,
                                camera_position,
                                camera_forward,
                            );
                            let cloud_box = OrientedBox::axis_aligned(
                                box_center,
                                Vector3::new(
                                    box_dimensions.x * 0.5,
                                    box_dimensions.y * 0.5,
                                    box_dimensions.z * 0.5,
                                ),
                            );
                            drag_anchor = cloud_box.intersect(&ray);
                        }
                        ElementState::Released => {
                            drag_anchor = None;
                        }
                    },
                    WindowEvent::RedrawRequested => {}
                    WindowEvent::CloseRequested => target.exit(),
                    _ => {}
                };
            }
        })
        .unwrap();
}

#[cfg_attr(target_arch = "wasm32", wasm_bindgen(start))]
pub fn run() {
    #[cfg(not(target_arch = "wasm32"))]
    {
        pollster::block_on(arun());
    }
    #[cfg(target_arch = "wasm32")]
    {
        wasm_bindgen_futures::spawn_local(arun());
    }
}
