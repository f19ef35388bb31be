use crate::compositor::RawTexture;
use crate::layer::Viewport;
use crate::Eye;
use anyhow::Result;
use nalgebra::Matrix4;

/// Everything an actor needs to draw one eye's view: the target textures,
/// where on them to draw, and the camera for this eye.
#[derive(Debug, Clone)]
pub struct EyeRenderContext {
    pub eye: Eye,
    pub frame_index: u64,
    /// Absolute display time the frame is predicted for.
    pub display_time: f64,
    pub viewport: Viewport,
    pub view: Matrix4<f32>,
    pub projection: Matrix4<f32>,
    pub color_target: RawTexture,
    pub depth_target: Option<RawTexture>,
}

/// A renderable object in the scene. Actors are invoked once per eye per
/// frame, in insertion order; the list does no reordering, filtering or
/// culling of its own.
pub trait Actor {
    /// Called once after the session's chains exist, before the first frame.
    fn init_gpu(&mut self) -> Result<()> {
        Ok(())
    }

    /// Draw this eye's view into `ctx.color_target` at `ctx.viewport`.
    fn render_eye(&mut self, ctx: &EyeRenderContext) -> Result<()>;

    /// The mirror window changed size.
    fn resize(&mut self, _width: u32, _height: u32) {}

    /// Release GPU resources. Called before session teardown and before a
    /// session rebuild; `init_gpu` runs again afterwards.
    fn dispose_gpu(&mut self) {}
}
