use std::rc::Rc;
use std::time::Instant;

use glam::Mat4;
use kiln_backend::backend::RenderBackend;
use kiln_backend::pipeline_registry::PipelineId;
use kiln_gfx::fatal::{FatalError, handle_unrecoverable_error};
use kiln_render_interface::config::BackendConfig;
use kiln_render_interface::pipeline_desc::{
    GraphicsPipelineDesc, PrimitiveType, StateDescription, VertexAttribute, VertexAttributeType, VertexBufferLayout,
};
use kiln_render_interface::shader_loader::DirShaderLoader;
use winit::application::ApplicationHandler;
use winit::event::{ElementState, KeyEvent, WindowEvent};
use winit::event_loop::ActiveEventLoop;
use winit::keyboard::Key;
use winit::window::{Window, WindowId};

use crate::platform::WinitPlatform;

#[repr(C)]
#[derive(Clone, Copy, bytemuck::Pod, bytemuck::Zeroable)]
struct Vertex {
    pos: [f32; 2],
    color: [f32; 4],
}

/// 使用 streamed vertex 以及 uniform 绘制一个旋转的三角形
struct TriangleDemo {
    pipeline: PipelineId,
}

impl TriangleDemo {
    fn new(backend: &mut RenderBackend) -> Option<Self> {
        let desc = GraphicsPipelineDesc {
            state: StateDescription {
                color_write: true,
                ..Default::default()
            },
            vertex_shader: "triangle.vert".to_string(),
            fragment_shader: "triangle.frag".to_string(),
            primitive: PrimitiveType::Triangles,
            textures: vec![],
            vertex_buffers: vec![VertexBufferLayout {
                stride: size_of::<Vertex>() as u32,
                attributes: vec![
                    VertexAttribute {
                        location: 0,
                        ty: VertexAttributeType::Float2,
                        offset: 0,
                    },
                    VertexAttribute {
                        location: 1,
                        ty: VertexAttributeType::Float4,
                        offset: size_of::<[f32; 2]>() as u32,
                    },
                ],
            }],
        };

        match backend.build_pipeline(&desc) {
            Ok(pipeline) => Some(Self { pipeline }),
            Err(e) => {
                log::warn!("triangle pipeline unavailable, only clearing: {e}");
                None
            }
        }
    }

    fn draw(&self, backend: &mut RenderBackend, seconds: f32) {
        let vertices = [
            Vertex {
                pos: [0.0, -0.5],
                color: [1.0, 0.0, 0.0, 1.0],
            },
            Vertex {
                pos: [0.5, 0.5],
                color: [0.0, 1.0, 0.0, 1.0],
            },
            Vertex {
                pos: [-0.5, 0.5],
                color: [0.0, 0.0, 1.0, 1.0],
            },
        ];

        backend.bind_pipeline(self.pipeline);
        backend.set_constants_pod(&Mat4::from_rotation_z(seconds));
        backend.bind_streamed_vertex_buffers(0, bytemuck::cast_slice(&vertices));
        backend.draw(vertices.len() as u32, 0);
    }
}

pub struct KilnApp {
    config: BackendConfig,
    start: Instant,

    backend: Option<RenderBackend>,
    demo: Option<TriangleDemo>,

    /// 最后销毁
    window: Option<Rc<Window>>,
}

// new & init
impl KilnApp {
    pub fn new(config: BackendConfig) -> Self {
        Self {
            config,
            start: Instant::now(),
            backend: None,
            demo: None,
            window: None,
        }
    }

    fn init_after_window(&mut self, window: Rc<Window>) {
        let platform = Rc::new(WinitPlatform::new(window.clone()));
        let shader_loader = Box::new(DirShaderLoader::new(&self.config.shader_dir));
        let mut backend = match RenderBackend::new(&self.config, platform, shader_loader) {
            Ok(backend) => backend,
            Err(e) => handle_unrecoverable_error(FatalError::from_gfx("RenderBackend::new", e)),
        };
        log::info!("swap interval: {}", backend.swap_interval());

        self.demo = TriangleDemo::new(&mut backend);
        self.backend = Some(backend);
        self.window = Some(window);
    }
}

// update
impl KilnApp {
    fn redraw(&mut self) {
        let _span = tracy_client::span!("KilnApp::redraw");
        let Some(backend) = self.backend.as_mut() else {
            return;
        };

        if backend.begin_render_pass() {
            if let Some(demo) = &self.demo {
                demo.draw(backend, self.start.elapsed().as_secs_f32());
            }
        }
        backend.end_render_pass();
        tracy_client::frame_mark();
    }

    fn cycle_swap_interval(&mut self) {
        let Some(backend) = self.backend.as_mut() else {
            return;
        };
        let requested = backend.swap_interval().next();
        if backend.set_swap_interval(requested) {
            log::info!("swap interval: {}", backend.swap_interval());
        } else {
            log::warn!("swap interval `{requested}` is not available");
        }
    }
}

// destroy
impl KilnApp {
    pub fn destroy(mut self) {
        self.demo = None;
        if let Some(backend) = self.backend.take() {
            backend.destroy();
        }
        self.window = None;
    }
}

impl ApplicationHandler for KilnApp {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        log::info!("winit event: resumed");
        if self.window.is_some() {
            return;
        }

        let attributes = Window::default_attributes()
            .with_title(self.config.app_name.clone())
            .with_inner_size(winit::dpi::LogicalSize::new(1200.0, 800.0));
        match event_loop.create_window(attributes) {
            Ok(window) => self.init_after_window(Rc::new(window)),
            Err(e) => {
                log::error!("failed to create window: {e}");
                event_loop.exit();
            }
        }
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, _window_id: WindowId, event: WindowEvent) {
        match event {
            WindowEvent::CloseRequested => event_loop.exit(),
            WindowEvent::Resized(size) => {
                if let Some(backend) = &self.backend {
                    backend.handle_window_size_change(size.width, size.height);
                }
            }
            WindowEvent::KeyboardInput {
                event:
                    KeyEvent {
                        logical_key: Key::Character(c),
                        state: ElementState::Pressed,
                        repeat: false,
                        ..
                    },
                ..
            } if c.eq_ignore_ascii_case("v") => self.cycle_swap_interval(),
            WindowEvent::RedrawRequested => self.redraw(),
            _ => {}
        }
    }

    fn about_to_wait(&mut self, _event_loop: &ActiveEventLoop) {
        if let Some(window) = &self.window {
            window.request_redraw();
        }
    }

    fn suspended(&mut self, _event_loop: &ActiveEventLoop) {
        log::warn!("winit event: suspended");
    }

    fn exiting(&mut self, _event_loop: &ActiveEventLoop) {
        log::info!("loop exiting");
    }
}
