use crate::actor::{Actor, EyeRenderContext};
use crate::compositor::{
    ChainKey, Compositor, CompositorError, HapticsBuffer, HapticsPlayback, HmdInfo, RawTexture,
    SessionId, SubmitOutcome, TextureBindFlags, TextureDescriptor, TextureFormat,
};
use crate::frame::FramePacer;
use crate::layer::{Layer, LayerBuilder, ViewportSplit};
use crate::pose::{projection_from_fov, view_from_pose, PosePredictor};
use crate::properties::{PropKey, PropValue};
use crate::swapchain::{ChainId, SwapChains};
use crate::{Controller, Eye};
use anyhow::{ensure, Context, Result};
use log::{debug, error, info, warn};

/// Tunables for a renderer instance.
#[derive(Debug, Clone)]
pub struct RendererOptions {
    /// Graphics adapter identifier handed to the compositor at session
    /// creation.
    pub adapter: String,
    /// Ring depth for the color and depth chains.
    pub chain_length: u32,
    pub split: ViewportSplit,
    pub near: f32,
    pub far: f32,
    /// World units per meter, submitted with every frame's view scale.
    pub world_scale: f32,
    /// Allocate a depth chain and submit it with the eye layer.
    pub depth_layer: bool,
}

impl Default for RendererOptions {
    fn default() -> Self {
        Self {
            adapter: "default".into(),
            chain_length: 3,
            split: ViewportSplit::SharedHorizontal,
            near: 0.2,
            far: 100.0,
            world_scale: 1.0,
            depth_layer: true,
        }
    }
}

/// What one `render_frame` call produced.
#[derive(Debug, Clone, Copy)]
pub struct FrameReport {
    pub frame_index: u64,
    pub outcome: SubmitOutcome,
    /// The frame rendered from the last tracked pose instead of a live one.
    pub tracking_degraded: bool,
}

/// Compositor-backed stereo renderer.
///
/// Owns the session and everything under it: the color/depth swap chains, the
/// mirror texture, the per-frame eye layer and the actor list. One
/// `render_frame` runs the whole protocol: wait/begin, pose prediction, layer
/// construction, per-eye actor rendering, chain commit, submission.
pub struct StereoRenderer<C: Compositor> {
    compositor: C,
    session: SessionId,
    hmd: HmdInfo,
    chains: SwapChains,
    color: Option<ChainId>,
    depth: Option<ChainId>,
    mirror: Option<RawTexture>,
    mirror_size: (u32, u32),
    builder: Option<LayerBuilder>,
    overlays: Vec<Layer>,
    pacer: FramePacer,
    predictor: PosePredictor,
    actors: Vec<Box<dyn Actor>>,
    visible: bool,
    options: RendererOptions,
    disposed: bool,
}

impl<C: Compositor> StereoRenderer<C> {
    /// Opens a session on the compositor. Swap chains and the mirror are not
    /// created until `init`.
    pub fn new(mut compositor: C, options: RendererOptions) -> Result<Self> {
        let session = compositor
            .create_session(&options.adapter)
            .context("opening compositor session")?;
        let hmd = compositor.hmd_info(session);
        info!(
            "compositor session open: {} @ {} Hz",
            hmd.name, hmd.refresh_rate
        );
        Ok(Self {
            compositor,
            session,
            hmd,
            chains: SwapChains::new(),
            color: None,
            depth: None,
            mirror: None,
            mirror_size: (0, 0),
            builder: None,
            overlays: Vec::new(),
            pacer: FramePacer::new(),
            predictor: PosePredictor::new(),
            actors: Vec::new(),
            visible: true,
            options,
            disposed: false,
        })
    }

    /// Creates the swap chains and mirror texture and readies the actors.
    /// Both eyes share one texture sized to the sum of the per-eye widths and
    /// the larger of the heights.
    pub fn init(&mut self, window_size: (u32, u32)) -> Result<()> {
        ensure!(self.builder.is_none(), "init called twice");
        let shared_width = self.hmd.eyes[0].texel_width + self.hmd.eyes[1].texel_width;
        let shared_height = self.hmd.eyes[0]
            .texel_height
            .max(self.hmd.eyes[1].texel_height);

        let color_desc = TextureDescriptor {
            format: TextureFormat::Rgba8Srgb,
            width: shared_width,
            height: shared_height,
            mip_levels: 1,
            sample_count: 1,
            chain_length: self.options.chain_length,
            bind: TextureBindFlags {
                render_target: true,
                sampled: true,
            },
        };
        let color = self
            .chains
            .create(&mut self.compositor, self.session, &color_desc)
            .context("allocating color chain")?;

        let depth = if self.options.depth_layer {
            let depth_desc = TextureDescriptor {
                format: TextureFormat::Depth32F,
                bind: TextureBindFlags {
                    render_target: true,
                    sampled: false,
                },
                ..color_desc
            };
            Some(
                self.chains
                    .create(&mut self.compositor, self.session, &depth_desc)
                    .context("allocating depth chain")?,
            )
        } else {
            None
        };

        let mirror = self
            .compositor
            .create_mirror_texture(self.session, window_size.0, window_size.1)
            .context("allocating mirror texture")?;
        self.mirror = Some(mirror);
        self.mirror_size = window_size;

        let color_key = self.chains.key(color).expect("chain just created");
        let depth_key = depth.map(|id| self.chains.key(id).expect("chain just created"));
        self.builder = Some(LayerBuilder::new(
            &self.hmd.eyes,
            self.options.split,
            (shared_width, shared_height),
            color_key,
            depth_key,
            self.options.world_scale,
        ));
        self.color = Some(color);
        self.depth = depth;

        for actor in &mut self.actors {
            actor.init_gpu()?;
        }
        info!(
            "renderer ready: shared target {}x{}, chain depth {}",
            shared_width, shared_height, self.options.chain_length
        );
        Ok(())
    }

    /// Appends an actor at the end of the render order. Initialised
    /// immediately if the renderer already is.
    pub fn add_actor(&mut self, mut actor: Box<dyn Actor>) -> Result<()> {
        if self.builder.is_some() {
            actor.init_gpu()?;
        }
        self.actors.push(actor);
        Ok(())
    }

    /// Auxiliary layers submitted after the eye layer every frame, until
    /// replaced. The compositor forgets layers that stop being submitted.
    pub fn set_overlay_layers(&mut self, layers: Vec<Layer>) {
        self.overlays = layers;
    }

    /// Runs one full frame of the pipeline. Transient conditions (not
    /// visible, tracking loss) are reported, not errors; a fatal compositor
    /// error invalidates all chains and propagates for session recreation.
    pub fn render_frame(&mut self, width: u32, height: u32) -> Result<FrameReport> {
        ensure!(self.builder.is_some(), "render_frame called before init");
        if (width, height) != self.mirror_size {
            self.resize(width, height)?;
        }
        match self.frame_inner() {
            Ok(report) => Ok(report),
            Err(err) => {
                self.pacer.abandon();
                if let Some(compositor_err) = err.downcast_ref::<CompositorError>() {
                    if compositor_err.is_fatal() {
                        error!("fatal compositor error: {}", compositor_err);
                        self.chains.invalidate_all();
                    }
                }
                Err(err)
            }
        }
    }

    fn frame_inner(&mut self) -> Result<FrameReport> {
        self.pacer.wait_begin(&mut self.compositor, self.session)?;
        let frame_index = self.pacer.frame_index();

        let head = self
            .predictor
            .sample(&mut self.compositor, self.session, frame_index, true);
        {
            let builder = self.builder.as_mut().expect("checked in render_frame");
            builder.begin_frame();
            builder.update(&head.head.pose, head.sample_time);
        }

        let color = self.color.expect("chains exist after init");
        if self.visible {
            let color_target = self
                .chains
                .current_texture(&mut self.compositor, self.session, color)?;
            let depth_target = match self.depth {
                Some(id) => Some(self.chains.current_texture(
                    &mut self.compositor,
                    self.session,
                    id,
                )?),
                None => None,
            };
            let builder = self.builder.as_ref().expect("checked in render_frame");
            for &eye in Eye::BOTH.iter() {
                let ctx = EyeRenderContext {
                    eye,
                    frame_index,
                    display_time: head.sample_time,
                    viewport: builder.viewport(eye),
                    view: view_from_pose(&builder.render_pose(eye)),
                    projection: projection_from_fov(
                        &builder.fov(eye),
                        self.options.near,
                        self.options.far,
                    ),
                    color_target,
                    depth_target,
                };
                for actor in &mut self.actors {
                    actor.render_eye(&ctx)?;
                }
            }
        } else {
            debug!("frame {}: not visible, skipping scene render", frame_index);
        }

        self.chains
            .commit(&mut self.compositor, self.session, color)?;
        if let Some(depth) = self.depth {
            self.chains
                .commit(&mut self.compositor, self.session, depth)?;
        }
        self.pacer.mark_committed();

        let (view_scale, mut layers) = {
            let builder = self.builder.as_ref().expect("checked in render_frame");
            (builder.view_scale(), vec![builder.layer()])
        };
        layers.extend(self.overlays.iter().cloned());

        let outcome = self
            .pacer
            .submit(&mut self.compositor, self.session, &view_scale, &layers)?;
        let was_visible = self.visible;
        self.visible = outcome == SubmitOutcome::Visible;
        if was_visible && !self.visible {
            warn!("compositor stopped presenting our frames; pausing scene work");
        } else if !was_visible && self.visible {
            info!("compositor resumed presenting; scene work restarts");
        }

        Ok(FrameReport {
            frame_index,
            outcome,
            tracking_degraded: head.degraded,
        })
    }

    /// Resizes the mirror target. Chain sizes are fixed by the HMD and do not
    /// change here.
    pub fn resize(&mut self, width: u32, height: u32) -> Result<()> {
        if width == 0 || height == 0 {
            // Minimised window; keep the old mirror
            return Ok(());
        }
        if self.mirror_size == (width, height) {
            return Ok(());
        }
        self.mirror_size = (width, height);
        if self.mirror.take().is_some() {
            self.compositor.destroy_mirror_texture(self.session);
            let mirror = self
                .compositor
                .create_mirror_texture(self.session, width, height)
                .context("reallocating mirror texture")?;
            self.mirror = Some(mirror);
        }
        for actor in &mut self.actors {
            actor.resize(width, height);
        }
        debug!("mirror resized to {}x{}", width, height);
        Ok(())
    }

    /// Releases everything owned by the session, then the session itself.
    /// Safe to call after a fatal error and idempotent.
    pub fn dispose(&mut self) -> Result<()> {
        if self.disposed {
            return Ok(());
        }
        for actor in &mut self.actors {
            actor.dispose_gpu();
        }
        self.chains.destroy_all(&mut self.compositor, self.session);
        self.color = None;
        self.depth = None;
        self.builder = None;
        if self.mirror.take().is_some() {
            self.compositor.destroy_mirror_texture(self.session);
        }
        self.compositor.destroy_session(self.session);
        self.disposed = true;
        info!("session closed");
        Ok(())
    }

    /// Full teardown and session rebuild after a fatal compositor error.
    pub fn recreate(&mut self, window_size: (u32, u32)) -> Result<()> {
        warn!("recreating compositor session");
        self.dispose()?;
        self.session = self
            .compositor
            .create_session(&self.options.adapter)
            .context("reopening compositor session")?;
        self.hmd = self.compositor.hmd_info(self.session);
        self.disposed = false;
        self.pacer = FramePacer::new();
        self.predictor = PosePredictor::new();
        self.visible = true;
        self.init(window_size)
    }

    /// Re-zeroes the tracking origin at the current head pose.
    pub fn recenter(&mut self) {
        self.compositor.recenter_pose(self.session);
    }

    pub fn submit_haptics(
        &mut self,
        controller: Controller,
        buffer: &HapticsBuffer,
    ) -> Result<SubmitOutcome> {
        Ok(self
            .compositor
            .submit_haptics(self.session, controller, buffer)?)
    }

    pub fn haptics_state(&mut self, controller: Controller) -> HapticsPlayback {
        self.compositor.haptics_state(self.session, controller)
    }

    pub fn set_property(&mut self, key: PropKey, value: PropValue) -> Result<()> {
        Ok(self.compositor.set_property(self.session, key, value)?)
    }

    pub fn get_property(&mut self, key: PropKey) -> Result<PropValue> {
        Ok(self.compositor.get_property(self.session, key)?)
    }

    pub fn hmd(&self) -> &HmdInfo {
        &self.hmd
    }

    pub fn compositor(&self) -> &C {
        &self.compositor
    }

    pub fn compositor_mut(&mut self) -> &mut C {
        &mut self.compositor
    }

    /// Index of the next frame to be produced.
    pub fn frame_index(&self) -> u64 {
        self.pacer.frame_index()
    }

    pub fn frames_not_visible(&self) -> u64 {
        self.pacer.frames_not_visible()
    }

    pub fn tracking_dropouts(&self) -> u64 {
        self.predictor.dropouts()
    }

    /// Mirror texture for the windowing layer to blit on screen.
    pub fn mirror_texture(&self) -> Option<RawTexture> {
        self.mirror
    }

    pub fn color_chain(&self) -> Option<ChainKey> {
        self.color.and_then(|id| self.chains.key(id))
    }

    pub fn depth_chain(&self) -> Option<ChainKey> {
        self.depth.and_then(|id| self.chains.key(id))
    }
}
