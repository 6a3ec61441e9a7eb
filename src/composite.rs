/// Fullscreen pass compositing the cloud radiance buffer over a procedural
/// sky gradient into the swapchain.
pub struct CompositePass {
    pipeline: wgpu::RenderPipeline,
}

impl CompositePass {
    pub fn new(device: &wgpu::Device, format: wgpu::TextureFormat) -> Self {
        let radiance_bind_group_layout =
            device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                label: Some("Composite: Radiance Buffer Bind Group Layout"),
                entries: &[wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Storage { read_only: true },
                        has_dynamic_offset: false,
                        min_binding_size: None,
                    },
                    count: None,
                }],
            });
        let screen_bind_group_layout =
            device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                label: Some("Composite: Screen Uniform Bind Group Layout"),
                entries: &[wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Uniform,
                        has_dynamic_offset: false,
                        min_binding_size: None,
                    },
                    count: None,
                }],
            });
        let layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("Composite Pipeline Layout"),
            bind_group_layouts: &[&radiance_bind_group_layout, &screen_bind_group_layout],
            push_constant_ranges: &[],
        });
        let shader = device.create_shader_module(wgpu::include_wgsl!("composite.wgsl"));
        let pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some("Composite Pipeline"),
            layout: Some(&layout),
            vertex: wgpu::VertexState {
                module: &shader,
                entry_point: Some("vs_fullscreen"),
                compilation_options: Default::default(),
                buffers: &[],
            },
            fragment: Some(wgpu::FragmentState {
                module: &shader,
                entry_point: Some("fs_composite"),
                compilation_options: Default::default(),
                targets: &[Some(format.into())],
            }),
            primitive: wgpu::PrimitiveState::default(),
            depth_stencil: None,
            multisample: wgpu::MultisampleState::default(),
            multiview: None,
            cache: None,
        });

        Self { pipeline }
    }
}

pub struct CompositeBindings {
    radiance_buffer: wgpu::BindGroup,
    screen_uniform: wgpu::BindGroup,
}

impl CompositeBindings {
    pub fn new(
        device: &wgpu::Device,
        CompositePass { pipeline }: &CompositePass,
        radiance_buffer: &wgpu::Buffer,
        screen_uniform: &wgpu::Buffer,
    ) -> Self {
        let radiance_buffer = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Composite: Radiance Buffer Bind Group"),
            layout: &pipeline.get_bind_group_layout(0),
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: radiance_buffer.as_entire_binding(),
            }],
        });
        let screen_uniform = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Composite: Screen Uniform Bind Group"),
            layout: &pipeline.get_bind_group_layout(1),
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: screen_uniform.as_entire_binding(),
            }],
        });
        Self {
            radiance_buffer,
            screen_uniform,
        }
    }

    pub fn update_radiance_buffer(
        &mut self,
        device: &wgpu::Device,
        CompositePass { pipeline }: &CompositePass,
        radiance_buffer: &wgpu::Buffer,
    ) {
        self.radiance_buffer = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Composite: Radiance Buffer Bind Group"),
            layout: &pipeline.get_bind_group_layout(0),
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: radiance_buffer.as_entire_binding(),
            }],
        });
    }
}

impl<'a> CompositePass {
    pub fn record<'pass>(
        &'a self,
        rpass: &mut wgpu::RenderPass<'pass>,
        bindings: &'a CompositeBindings,
    ) where
        'a: 'pass,
    {
        rpass.set_pipeline(&self.pipeline);
        rpass.set_bind_group(0, &bindings.radiance_buffer, &[]);
        rpass.set_bind_group(1, &bindings.screen_uniform, &[]);
        rpass.draw(0..6, 0..1);
    }
}
