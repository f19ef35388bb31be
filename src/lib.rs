//! Diopter stereo frame pipeline. Drives a compositor-backed stereo renderer:
//! swap-chain rotation, pose prediction, per-eye layer construction and frame
//! submission/pacing against an external compositor runtime. The compositor
//! itself (tracking fusion, distortion, timewarp) is reached only through the
//! [`Compositor`] trait; a scriptable mock backend is included for tests and
//! headless runs.
pub mod actor;
pub mod compositor;
pub mod frame;
pub mod layer;
pub mod mock;
pub mod pose;
pub mod properties;
pub mod renderer;
pub mod runtime;
pub mod swapchain;

pub use actor::{Actor, EyeRenderContext};
pub use compositor::{
    ChainKey, Compositor, CompositorError, Controller, HapticsBuffer, HapticsPlayback, HmdInfo,
    RawTexture, SessionId, SubmitOutcome, TextureBindFlags, TextureDescriptor, TextureFormat,
};
pub use layer::{Fov, Layer, ViewScale, Viewport, ViewportSplit};
pub use pose::PredictedPose;
pub use properties::{PropKey, PropValue};
pub use renderer::{FrameReport, RendererOptions, StereoRenderer};
pub use swapchain::ChainId;

/// Left or right display panel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Eye {
    Left,
    Right,
}

impl Eye {
    pub const BOTH: [Eye; 2] = [Eye::Left, Eye::Right];

    pub fn index(self) -> usize {
        match self {
            Eye::Left => 0,
            Eye::Right => 1,
        }
    }
}
