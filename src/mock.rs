//! Scriptable in-process stand-in for a real compositor runtime. Simulates a
//! fixed HMD with an orbiting head pose, enforces the frame-index and swap
//! chain contracts loudly, and injects faults (tracking loss, invisible
//! frames, display loss) at chosen frame indices. Used by the test suite and
//! the headless demo.
use crate::compositor::{
    ChainKey, Compositor, CompositorError, Controller, EyeRenderInfo, HapticsBuffer,
    HapticsPlayback, HmdInfo, RawTexture, SessionId, SubmitOutcome, TextureDescriptor,
};
use crate::layer::{Fov, Layer, ViewScale};
use crate::pose::{PredictedPose, TrackingSample, TrackingStatus};
use crate::properties::{Properties, PropKey, PropValue, PropertyError};
use nalgebra::{Isometry3, Translation3, UnitQuaternion, Vector3};
use std::collections::{HashMap, HashSet};
use std::time::Duration;

const REFRESH_RATE: f32 = 90.0;
const EYE_WIDTH: u32 = 1344;
const EYE_HEIGHT: u32 = 1512;
const HAPTICS_QUEUE: usize = 256;
const HAPTICS_SAMPLE_RATE: f32 = 320.0;

/// Ledger entry for one observed call, in call order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MockCall {
    SessionCreated(u64),
    SessionDestroyed(u64),
    ChainCreated(ChainKey),
    ChainDestroyed(ChainKey),
    Commit(ChainKey),
    WaitFrame(u64),
    BeginFrame(u64),
    /// Frame index and submitted layer count.
    EndFrame(u64, usize),
    MirrorCreated,
    MirrorDestroyed,
}

struct MockChain {
    textures: Vec<RawTexture>,
    cursor: usize,
    pending: usize,
    commits: u64,
}

pub struct MockCompositor {
    next_session: u64,
    live_session: Option<u64>,
    lost: bool,

    next_name: u64,
    next_chain: u64,
    chains: HashMap<u64, MockChain>,
    mirror: Option<RawTexture>,

    epoch: f64,
    time: f64,
    waited: Option<u64>,
    begun: Option<u64>,
    frames_finished: u64,
    paced: bool,

    lose_tracking: HashSet<u64>,
    not_visible: HashSet<u64>,
    display_lost_at: Option<u64>,
    reject_next_alloc: bool,
    haptics_unavailable: bool,

    latency_origin: Option<f64>,
    properties: Properties,
    haptics_queued: HashMap<Controller, usize>,
    calls: Vec<MockCall>,
}

impl MockCompositor {
    pub fn new() -> Self {
        Self {
            next_session: 1,
            live_session: None,
            lost: false,
            next_name: 1,
            next_chain: 1,
            chains: HashMap::new(),
            mirror: None,
            epoch: 0.0,
            time: 0.0,
            waited: None,
            begun: None,
            frames_finished: 0,
            paced: false,
            lose_tracking: HashSet::new(),
            not_visible: HashSet::new(),
            display_lost_at: None,
            reject_next_alloc: false,
            haptics_unavailable: false,
            latency_origin: None,
            properties: Properties::new(),
            haptics_queued: HashMap::new(),
            calls: Vec::new(),
        }
    }

    /// Sleep to a ~90 Hz cadence inside `wait_to_begin_frame`. Off by
    /// default so tests run at full speed.
    pub fn set_paced(&mut self, paced: bool) {
        self.paced = paced;
    }

    /// Report tracking as lost for these frame indices.
    pub fn lose_tracking_on(&mut self, frames: &[u64]) {
        self.lose_tracking.extend(frames.iter().copied());
    }

    /// Return `NotVisible` from submission of these frame indices.
    pub fn not_visible_on(&mut self, frames: &[u64]) {
        self.not_visible.extend(frames.iter().copied());
    }

    /// Fail the given frame's submission with `DisplayLost` and invalidate
    /// the session from then on.
    pub fn display_lost_on(&mut self, frame: u64) {
        self.display_lost_at = Some(frame);
    }

    /// Reject the next swap chain allocation.
    pub fn reject_next_allocation(&mut self) {
        self.reject_next_alloc = true;
    }

    pub fn set_haptics_unavailable(&mut self, unavailable: bool) {
        self.haptics_unavailable = unavailable;
    }

    pub fn calls(&self) -> &[MockCall] {
        &self.calls
    }

    pub fn chain_cursor(&self, chain: ChainKey) -> usize {
        self.chains[&chain.0].cursor
    }

    pub fn chain_commits(&self, chain: ChainKey) -> u64 {
        self.chains[&chain.0].commits
    }

    pub fn frames_finished(&self) -> u64 {
        self.frames_finished
    }

    /// Timestamp of the last latency-marked tracking query, if any.
    pub fn latency_origin(&self) -> Option<f64> {
        self.latency_origin
    }

    fn guard(&self, session: SessionId) -> Result<(), CompositorError> {
        if self.live_session != Some(session.0) {
            return Err(CompositorError::InvalidSession);
        }
        if self.lost {
            return Err(CompositorError::DisplayLost);
        }
        Ok(())
    }

    fn alloc_name(&mut self) -> RawTexture {
        let name = RawTexture(self.next_name);
        self.next_name += 1;
        name
    }

    fn current_frame(&self) -> u64 {
        self.begun.or(self.waited).unwrap_or(self.frames_finished)
    }

    fn head_at(&self, abs_time: f64) -> PredictedPose {
        let t = (abs_time - self.epoch) as f32;
        let yaw = 0.2 * t;
        let sway = 0.05 * (0.5 * t).sin();
        PredictedPose {
            pose: Isometry3::from_parts(
                Translation3::new(sway, 1.6, 0.0),
                UnitQuaternion::from_euler_angles(0.0, yaw, 0.0),
            ),
            linear_velocity: Vector3::new(0.025 * (0.5 * t).cos(), 0.0, 0.0),
            angular_velocity: Vector3::new(0.0, 0.2, 0.0),
        }
    }
}

impl Default for MockCompositor {
    fn default() -> Self {
        Self::new()
    }
}

impl Compositor for MockCompositor {
    fn create_session(&mut self, adapter: &str) -> Result<SessionId, CompositorError> {
        assert!(
            self.live_session.is_none(),
            "create_session while a session is live"
        );
        if adapter == "disconnected" {
            return Err(CompositorError::ServiceConnection(
                "no compositor service on adapter".into(),
            ));
        }
        let id = self.next_session;
        self.next_session += 1;
        self.live_session = Some(id);
        self.lost = false;
        self.waited = None;
        self.begun = None;
        self.frames_finished = 0;
        self.calls.push(MockCall::SessionCreated(id));
        Ok(SessionId(id))
    }

    fn destroy_session(&mut self, session: SessionId) {
        assert_eq!(
            self.live_session,
            Some(session.0),
            "destroy_session on a session that is not live"
        );
        assert!(
            self.chains.is_empty(),
            "session destroyed with live swap chains"
        );
        self.live_session = None;
        self.calls.push(MockCall::SessionDestroyed(session.0));
    }

    fn hmd_info(&mut self, session: SessionId) -> HmdInfo {
        assert_eq!(self.live_session, Some(session.0));
        let left_fov = Fov {
            tan_left: 1.058,
            tan_right: 1.092,
            tan_up: 1.329,
            tan_down: 1.329,
        };
        let right_fov = Fov {
            tan_left: 1.092,
            tan_right: 1.058,
            tan_up: 1.329,
            tan_down: 1.329,
        };
        HmdInfo {
            name: "Mock HMD".into(),
            eyes: [
                EyeRenderInfo {
                    fov: left_fov,
                    offset: Isometry3::from_parts(
                        Translation3::new(-0.032, 0.0, 0.0),
                        UnitQuaternion::identity(),
                    ),
                    texel_width: EYE_WIDTH,
                    texel_height: EYE_HEIGHT,
                },
                EyeRenderInfo {
                    fov: right_fov,
                    offset: Isometry3::from_parts(
                        Translation3::new(0.032, 0.0, 0.0),
                        UnitQuaternion::identity(),
                    ),
                    texel_width: EYE_WIDTH,
                    texel_height: EYE_HEIGHT,
                },
            ],
            refresh_rate: REFRESH_RATE,
        }
    }

    fn create_swap_chain(
        &mut self,
        session: SessionId,
        desc: &TextureDescriptor,
    ) -> Result<(ChainKey, Vec<RawTexture>), CompositorError> {
        self.guard(session)?;
        if self.reject_next_alloc {
            self.reject_next_alloc = false;
            return Err(CompositorError::AllocationFailed("scripted rejection".into()));
        }
        if desc.width == 0 || desc.height == 0 {
            return Err(CompositorError::AllocationFailed("zero-sized texture".into()));
        }
        if desc.chain_length == 0 || desc.mip_levels == 0 || desc.sample_count == 0 {
            return Err(CompositorError::AllocationFailed(
                "chain length, mip levels and sample count must be at least 1".into(),
            ));
        }
        let textures: Vec<RawTexture> = (0..desc.chain_length).map(|_| self.alloc_name()).collect();
        let key = ChainKey(self.next_chain);
        self.next_chain += 1;
        self.chains.insert(
            key.0,
            MockChain {
                textures: textures.clone(),
                cursor: 0,
                pending: 0,
                commits: 0,
            },
        );
        self.calls.push(MockCall::ChainCreated(key));
        Ok((key, textures))
    }

    fn chain_current_index(
        &mut self,
        session: SessionId,
        chain: ChainKey,
    ) -> Result<usize, CompositorError> {
        self.guard(session)?;
        let chain = self
            .chains
            .get(&chain.0)
            .ok_or(CompositorError::ChainInvalid)?;
        Ok(chain.cursor)
    }

    fn commit_swap_chain(
        &mut self,
        session: SessionId,
        chain: ChainKey,
    ) -> Result<(), CompositorError> {
        self.guard(session)?;
        let entry = self
            .chains
            .get_mut(&chain.0)
            .ok_or(CompositorError::ChainInvalid)?;
        if entry.pending == entry.textures.len() {
            return Err(CompositorError::ChainExhausted);
        }
        entry.pending += 1;
        entry.commits += 1;
        entry.cursor = (entry.cursor + 1) % entry.textures.len();
        self.calls.push(MockCall::Commit(chain));
        Ok(())
    }

    fn destroy_swap_chain(&mut self, _session: SessionId, chain: ChainKey) {
        let removed = self.chains.remove(&chain.0);
        assert!(removed.is_some(), "double destroy of swap chain {:?}", chain);
        self.calls.push(MockCall::ChainDestroyed(chain));
    }

    fn create_mirror_texture(
        &mut self,
        session: SessionId,
        width: u32,
        height: u32,
    ) -> Result<RawTexture, CompositorError> {
        self.guard(session)?;
        if width == 0 || height == 0 {
            return Err(CompositorError::AllocationFailed("zero-sized mirror".into()));
        }
        assert!(self.mirror.is_none(), "mirror texture already exists");
        let texture = self.alloc_name();
        self.mirror = Some(texture);
        self.calls.push(MockCall::MirrorCreated);
        Ok(texture)
    }

    fn destroy_mirror_texture(&mut self, _session: SessionId) {
        assert!(self.mirror.take().is_some(), "no mirror texture to destroy");
        self.calls.push(MockCall::MirrorDestroyed);
    }

    fn predicted_display_time(&mut self, session: SessionId, frame_index: u64) -> f64 {
        assert_eq!(self.live_session, Some(session.0));
        // Frame 0 has no pacing history; the compositor clock's "now" stands
        // in for the first midpoint.
        if frame_index == 0 {
            self.time
        } else {
            self.epoch + (frame_index as f64 + 0.5) / f64::from(REFRESH_RATE)
        }
    }

    fn tracking_state(
        &mut self,
        session: SessionId,
        abs_time: f64,
        latency_marker: bool,
    ) -> TrackingSample {
        assert_eq!(self.live_session, Some(session.0));
        if latency_marker {
            self.latency_origin = Some(abs_time);
        }
        if self.lose_tracking.contains(&self.current_frame()) {
            return TrackingSample {
                head: PredictedPose::default(),
                status: TrackingStatus::default(),
                sample_time: abs_time,
            };
        }
        TrackingSample {
            head: self.head_at(abs_time),
            status: TrackingStatus {
                orientation_tracked: true,
                position_tracked: true,
            },
            sample_time: abs_time,
        }
    }

    fn recenter_pose(&mut self, session: SessionId) {
        assert_eq!(self.live_session, Some(session.0));
        self.epoch = self.time;
    }

    fn wait_to_begin_frame(
        &mut self,
        session: SessionId,
        frame_index: u64,
    ) -> Result<(), CompositorError> {
        self.guard(session)?;
        assert_eq!(
            frame_index, self.frames_finished,
            "wait_to_begin_frame index out of order"
        );
        assert!(
            self.waited.is_none() && self.begun.is_none(),
            "wait_to_begin_frame while a frame is open"
        );
        if self.paced {
            std::thread::sleep(Duration::from_secs_f32(1.0 / REFRESH_RATE));
        }
        self.waited = Some(frame_index);
        self.calls.push(MockCall::WaitFrame(frame_index));
        Ok(())
    }

    fn begin_frame(
        &mut self,
        session: SessionId,
        frame_index: u64,
    ) -> Result<(), CompositorError> {
        self.guard(session)?;
        assert_eq!(
            self.waited,
            Some(frame_index),
            "begin_frame without a matching wait"
        );
        assert!(self.begun.is_none(), "begin_frame called twice");
        self.begun = Some(frame_index);
        self.calls.push(MockCall::BeginFrame(frame_index));
        Ok(())
    }

    fn end_frame(
        &mut self,
        session: SessionId,
        frame_index: u64,
        _view_scale: &ViewScale,
        layers: &[Layer],
    ) -> Result<SubmitOutcome, CompositorError> {
        self.guard(session)?;
        assert_eq!(
            self.begun,
            Some(frame_index),
            "end_frame without a matching begin"
        );
        for layer in layers {
            let referenced = match layer {
                Layer::EyeFov(eye_fov) => {
                    let mut keys = vec![eye_fov.color];
                    keys.extend(eye_fov.depth);
                    keys
                }
                Layer::Quad(quad) => vec![quad.color],
                Layer::Matrix(matrix) => vec![matrix.color],
            };
            for key in referenced {
                assert!(
                    self.chains.contains_key(&key.0),
                    "layer references unknown chain {:?}",
                    key
                );
            }
        }
        self.calls.push(MockCall::EndFrame(frame_index, layers.len()));
        self.waited = None;
        self.begun = None;

        if self.display_lost_at == Some(frame_index) {
            self.lost = true;
            return Err(CompositorError::DisplayLost);
        }

        // The compositor consumes everything committed for this frame.
        for chain in self.chains.values_mut() {
            chain.pending = 0;
        }
        let per_frame = (HAPTICS_SAMPLE_RATE / REFRESH_RATE).ceil() as usize;
        for queued in self.haptics_queued.values_mut() {
            *queued = queued.saturating_sub(per_frame);
        }
        self.frames_finished = frame_index + 1;
        self.time += 1.0 / f64::from(REFRESH_RATE);

        if self.not_visible.contains(&frame_index) {
            Ok(SubmitOutcome::NotVisible)
        } else {
            Ok(SubmitOutcome::Visible)
        }
    }

    fn submit_haptics(
        &mut self,
        session: SessionId,
        controller: Controller,
        buffer: &HapticsBuffer,
    ) -> Result<SubmitOutcome, CompositorError> {
        self.guard(session)?;
        if self.haptics_unavailable {
            return Ok(SubmitOutcome::NotVisible);
        }
        let queued = self.haptics_queued.entry(controller).or_insert(0);
        let space = HAPTICS_QUEUE - *queued;
        *queued += buffer.samples.len().min(space);
        Ok(SubmitOutcome::Visible)
    }

    fn haptics_state(&mut self, session: SessionId, controller: Controller) -> HapticsPlayback {
        assert_eq!(self.live_session, Some(session.0));
        let queued = self.haptics_queued.get(&controller).copied().unwrap_or(0);
        HapticsPlayback {
            remaining_queue_space: HAPTICS_QUEUE - queued,
            samples_queued: queued,
        }
    }

    fn set_property(
        &mut self,
        session: SessionId,
        key: PropKey,
        value: PropValue,
    ) -> Result<(), PropertyError> {
        assert_eq!(self.live_session, Some(session.0));
        self.properties.set(key, value)
    }

    fn get_property(
        &mut self,
        session: SessionId,
        key: PropKey,
    ) -> Result<PropValue, PropertyError> {
        assert_eq!(self.live_session, Some(session.0));
        Ok(self.properties.get(key))
    }
}
