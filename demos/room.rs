use anyhow::{ensure, Result};
use diopter::mock::MockCompositor;
use diopter::runtime::{launch_headless, launch_windowed, App};
use diopter::{
    Actor, Controller, EyeRenderContext, HapticsBuffer, PropKey, PropValue, RendererOptions,
    StereoRenderer,
};
use log::info;
use nalgebra::{Matrix4, Vector3};

/// Cube spinning two meters in front of the start pose. Stands in for real
/// draw calls: it builds its per-eye MVP the way a GL actor would feed its
/// shader.
struct SpinningCube;

impl Actor for SpinningCube {
    fn render_eye(&mut self, ctx: &EyeRenderContext) -> Result<()> {
        let angle = 0.5 * ctx.display_time as f32;
        let model = Matrix4::new_translation(&Vector3::new(0.0, 1.6, -2.0))
            * Matrix4::from_euler_angles(0.0, angle, 0.0);
        let _mvp = ctx.projection * ctx.view * model;
        Ok(())
    }
}

/// Ground grid at y = 0.
#[derive(Default)]
struct FloorGrid {
    uploaded: bool,
}

impl Actor for FloorGrid {
    fn init_gpu(&mut self) -> Result<()> {
        self.uploaded = true;
        info!("grid mesh uploaded");
        Ok(())
    }

    fn render_eye(&mut self, ctx: &EyeRenderContext) -> Result<()> {
        ensure!(self.uploaded, "grid rendered before its mesh was uploaded");
        let _view_projection = ctx.projection * ctx.view;
        Ok(())
    }

    fn dispose_gpu(&mut self) {
        self.uploaded = false;
    }
}

struct RoomApp {
    last_pulse: u64,
}

impl App<MockCompositor> for RoomApp {
    const NAME: &'static str = "Diopter room";

    fn new(renderer: &mut StereoRenderer<MockCompositor>) -> Result<Self> {
        renderer.set_property(PropKey::PlayerHeight, PropValue::Float(1.83))?;
        renderer.add_actor(Box::new(FloorGrid::default()))?;
        renderer.add_actor(Box::new(SpinningCube))?;
        renderer.recenter();
        Ok(Self { last_pulse: 0 })
    }

    fn update(&mut self, renderer: &mut StereoRenderer<MockCompositor>) -> Result<()> {
        // Short controller pulse once a second
        let frame = renderer.frame_index();
        let refresh = renderer.hmd().refresh_rate as u64;
        if frame > 0 && frame % refresh == 0 && frame != self.last_pulse {
            self.last_pulse = frame;
            let outcome = renderer.submit_haptics(
                Controller::RightTouch,
                &HapticsBuffer {
                    samples: vec![200; 16],
                },
            )?;
            info!("haptic pulse at frame {} ({:?})", frame, outcome);
        }
        Ok(())
    }
}

fn main() -> Result<()> {
    simple_logger::init().expect("failed to initialise logger");
    let windowed = std::env::args()
        .skip(1)
        .next()
        .map_or(false, |arg| arg == "--window");

    let mut compositor = MockCompositor::new();
    compositor.set_paced(true);

    if windowed {
        launch_windowed::<_, RoomApp>(compositor, RendererOptions::default())
    } else {
        launch_headless::<_, RoomApp>(compositor, RendererOptions::default(), Some(450))
    }
}
