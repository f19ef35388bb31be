use crate::layer::{Fov, Layer, ViewScale};
use crate::pose::TrackingSample;
use crate::properties::{PropKey, PropValue, PropertyError};
use nalgebra::Isometry3;
use std::fmt;

/// Native GPU texture name. Opaque to the pipeline; only actors and the
/// compositor runtime know how to interpret it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RawTexture(pub u64);

/// Handle to a live connection with the compositor runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionId(pub u64);

/// Compositor-side swap chain identifier. Layers reference chains by this key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ChainKey(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextureFormat {
    Rgba8Srgb,
    Rgba16F,
    Depth32F,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TextureBindFlags {
    pub render_target: bool,
    pub sampled: bool,
}

/// Format/size/usage request for one swap chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextureDescriptor {
    pub format: TextureFormat,
    pub width: u32,
    pub height: u32,
    pub mip_levels: u32,
    pub sample_count: u32,
    pub chain_length: u32,
    pub bind: TextureBindFlags,
}

/// Per-eye rendering parameters reported by the runtime.
#[derive(Debug, Clone)]
pub struct EyeRenderInfo {
    pub fov: Fov,
    /// Head-to-eye rigid offset, applied after head orientation.
    pub offset: Isometry3<f32>,
    pub texel_width: u32,
    pub texel_height: u32,
}

#[derive(Debug, Clone)]
pub struct HmdInfo {
    pub name: String,
    pub eyes: [EyeRenderInfo; 2],
    pub refresh_rate: f32,
}

/// Non-fatal submit results. `NotVisible` means the compositor accepted the
/// frame but is not presenting it; keep pacing, skip expensive work.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitOutcome {
    Visible,
    NotVisible,
}

/// Errors surfaced by the compositor runtime.
///
/// Fatal variants invalidate the session and every resource created under it;
/// the only recovery is full teardown and session recreation. The remaining
/// variants are setup or chain-usage failures that propagate to the caller at
/// the point of the offending call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CompositorError {
    /// Device reset or removed. Unrecoverable within the session.
    DisplayLost,
    InvalidSession,
    ServiceConnection(String),
    /// The runtime rejected a resource descriptor.
    AllocationFailed(String),
    InsufficientArraySize,
    /// Committed more times than the chain depth without consumption.
    ChainExhausted,
    /// The chain was destroyed or invalidated by a fatal session error.
    ChainInvalid,
}

impl CompositorError {
    /// True for errors that require destroying the session and everything
    /// created under it before trying again.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            CompositorError::DisplayLost
                | CompositorError::InvalidSession
                | CompositorError::ServiceConnection(_)
        )
    }
}

impl fmt::Display for CompositorError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            CompositorError::DisplayLost => {
                f.write_str("display lost; session must be destroyed and recreated")
            }
            CompositorError::InvalidSession => f.write_str("operation on an invalid session"),
            CompositorError::ServiceConnection(reason) => {
                write!(f, "compositor service connection failed: {}", reason)
            }
            CompositorError::AllocationFailed(reason) => {
                write!(f, "compositor rejected allocation: {}", reason)
            }
            CompositorError::InsufficientArraySize => f.write_str("output array too small"),
            CompositorError::ChainExhausted => {
                f.write_str("swap chain committed past its depth without consumption")
            }
            CompositorError::ChainInvalid => f.write_str("swap chain is invalid or destroyed"),
        }
    }
}

impl std::error::Error for CompositorError {}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Controller {
    LeftTouch,
    RightTouch,
}

/// Amplitude samples queued for controller vibration.
#[derive(Debug, Clone)]
pub struct HapticsBuffer {
    pub samples: Vec<u8>,
}

/// Playback state of a controller's haptics queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HapticsPlayback {
    pub remaining_queue_space: usize,
    pub samples_queued: usize,
}

/// Contract with the external compositor runtime.
///
/// Everything the pipeline needs from the vendor side goes through here:
/// session lifecycle, swap chains, tracking prediction, the frame pacing
/// triple, haptics and tunables. Implementations own the real exclusion
/// guarantees at their ABI boundary; the pipeline only promises single-writer
/// discipline from one render thread.
pub trait Compositor {
    fn create_session(&mut self, adapter: &str) -> Result<SessionId, CompositorError>;
    fn destroy_session(&mut self, session: SessionId);

    fn hmd_info(&mut self, session: SessionId) -> HmdInfo;

    /// Allocates a ring of textures matching the descriptor. Returns the
    /// chain key plus the backing texture names in ring order.
    fn create_swap_chain(
        &mut self,
        session: SessionId,
        desc: &TextureDescriptor,
    ) -> Result<(ChainKey, Vec<RawTexture>), CompositorError>;
    /// Index of the texture to render into this frame. Rotates on commit.
    fn chain_current_index(
        &mut self,
        session: SessionId,
        chain: ChainKey,
    ) -> Result<usize, CompositorError>;
    fn commit_swap_chain(
        &mut self,
        session: SessionId,
        chain: ChainKey,
    ) -> Result<(), CompositorError>;
    fn destroy_swap_chain(&mut self, session: SessionId, chain: ChainKey);

    fn create_mirror_texture(
        &mut self,
        session: SessionId,
        width: u32,
        height: u32,
    ) -> Result<RawTexture, CompositorError>;
    fn destroy_mirror_texture(&mut self, session: SessionId);

    /// Estimated midpoint display time for a future frame, in seconds.
    /// Monotonic across calls with increasing `frame_index`.
    fn predicted_display_time(&mut self, session: SessionId, frame_index: u64) -> f64;
    /// Best-effort pose prediction for an absolute time. Loss of tracking is
    /// reported through the sample's status bits, never as an error.
    fn tracking_state(
        &mut self,
        session: SessionId,
        abs_time: f64,
        latency_marker: bool,
    ) -> TrackingSample;
    fn recenter_pose(&mut self, session: SessionId);

    /// Blocks until the compositor is ready for the frame to be rendered.
    fn wait_to_begin_frame(
        &mut self,
        session: SessionId,
        frame_index: u64,
    ) -> Result<(), CompositorError>;
    fn begin_frame(&mut self, session: SessionId, frame_index: u64)
        -> Result<(), CompositorError>;
    /// Hands the completed layer list to the compositor. The slice is the
    /// whole picture for this frame; omitted layers disappear.
    fn end_frame(
        &mut self,
        session: SessionId,
        frame_index: u64,
        view_scale: &ViewScale,
        layers: &[Layer],
    ) -> Result<SubmitOutcome, CompositorError>;

    fn submit_haptics(
        &mut self,
        session: SessionId,
        controller: Controller,
        buffer: &HapticsBuffer,
    ) -> Result<SubmitOutcome, CompositorError>;
    fn haptics_state(&mut self, session: SessionId, controller: Controller) -> HapticsPlayback;

    fn set_property(
        &mut self,
        session: SessionId,
        key: PropKey,
        value: PropValue,
    ) -> Result<(), PropertyError>;
    fn get_property(&mut self, session: SessionId, key: PropKey)
        -> Result<PropValue, PropertyError>;
}
