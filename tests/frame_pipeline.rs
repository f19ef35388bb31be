use anyhow::Result;
use diopter::layer::QuadLayer;
use diopter::mock::{MockCall, MockCompositor};
use diopter::{
    Actor, CompositorError, Eye, EyeRenderContext, Layer, RendererOptions, StereoRenderer,
    SubmitOutcome, Viewport,
};
use nalgebra::{Isometry3, Matrix4};
use std::sync::{Arc, Mutex};

/// Records the left-eye view matrix per frame so tests can compare poses.
struct RecordingActor {
    views: Arc<Mutex<Vec<(u64, Matrix4<f32>)>>>,
}

impl Actor for RecordingActor {
    fn render_eye(&mut self, ctx: &EyeRenderContext) -> Result<()> {
        if ctx.eye == Eye::Left {
            self.views.lock().unwrap().push((ctx.frame_index, ctx.view));
        }
        Ok(())
    }
}

/// Counts every per-eye render call.
struct CountingActor {
    calls: Arc<Mutex<u64>>,
}

impl Actor for CountingActor {
    fn render_eye(&mut self, _ctx: &EyeRenderContext) -> Result<()> {
        *self.calls.lock().unwrap() += 1;
        Ok(())
    }
}

#[test]
fn ten_frames_advance_index_and_wrap_chains() {
    let mut renderer =
        StereoRenderer::new(MockCompositor::new(), RendererOptions::default()).unwrap();
    renderer.init((1280, 720)).unwrap();

    for _ in 0..10 {
        renderer.render_frame(1280, 720).unwrap();
    }
    assert_eq!(renderer.frame_index(), 10);

    let color = renderer.color_chain().unwrap();
    let depth = renderer.depth_chain().unwrap();
    let mock = renderer.compositor();
    // Depth-3 chains committed once per frame: the cursor has wrapped
    // 10 mod 3 past its start
    assert_eq!(mock.chain_commits(color), 10);
    assert_eq!(mock.chain_cursor(color), 1);
    assert_eq!(mock.chain_commits(depth), 10);
    assert_eq!(mock.chain_cursor(depth), 1);

    // wait/begin/submit observe each index exactly once, in order
    let mut expected = Vec::new();
    for i in 0..10u64 {
        expected.push(MockCall::WaitFrame(i));
        expected.push(MockCall::BeginFrame(i));
        expected.push(MockCall::EndFrame(i, 1));
    }
    let observed: Vec<_> = mock
        .calls()
        .iter()
        .filter(|call| {
            matches!(
                call,
                MockCall::WaitFrame(_) | MockCall::BeginFrame(_) | MockCall::EndFrame(_, _)
            )
        })
        .cloned()
        .collect();
    assert_eq!(observed, expected);

    renderer.dispose().unwrap();
}

#[test]
fn tracking_loss_reuses_last_pose() {
    let views = Arc::new(Mutex::new(Vec::new()));
    let mut mock = MockCompositor::new();
    mock.lose_tracking_on(&[5]);
    let mut renderer = StereoRenderer::new(mock, RendererOptions::default()).unwrap();
    renderer.init((1280, 720)).unwrap();
    renderer
        .add_actor(Box::new(RecordingActor {
            views: views.clone(),
        }))
        .unwrap();

    let mut degraded_frames = Vec::new();
    for _ in 0..8 {
        let report = renderer.render_frame(1280, 720).unwrap();
        if report.tracking_degraded {
            degraded_frames.push(report.frame_index);
        }
    }
    assert_eq!(degraded_frames, vec![5]);
    assert_eq!(renderer.tracking_dropouts(), 1);

    let views = views.lock().unwrap();
    let view = |frame: u64| {
        views
            .iter()
            .find(|(recorded, _)| *recorded == frame)
            .map(|(_, matrix)| *matrix)
            .unwrap()
    };
    // The dropout frame renders from the previous frame's pose, then live
    // tracking resumes
    assert_eq!(view(5), view(4));
    assert_ne!(view(6), view(5));
    drop(views);

    renderer.dispose().unwrap();
}

#[test]
fn display_lost_invalidates_until_recreate() {
    let mut mock = MockCompositor::new();
    mock.display_lost_on(3);
    let mut renderer = StereoRenderer::new(mock, RendererOptions::default()).unwrap();
    renderer.init((1280, 720)).unwrap();

    for _ in 0..3 {
        renderer.render_frame(1280, 720).unwrap();
    }
    let err = renderer.render_frame(1280, 720).unwrap_err();
    let compositor_err = err.downcast_ref::<CompositorError>().cloned().unwrap();
    assert_eq!(compositor_err, CompositorError::DisplayLost);
    assert!(compositor_err.is_fatal());

    // Everything under the dead session refuses further work, and the frame
    // index does not advance
    let err = renderer.render_frame(1280, 720).unwrap_err();
    assert!(err.downcast_ref::<CompositorError>().is_some());
    assert_eq!(renderer.frame_index(), 3);

    // Full rebuild brings the pipeline back from frame zero
    renderer.recreate((1280, 720)).unwrap();
    let report = renderer.render_frame(1280, 720).unwrap();
    assert_eq!(report.frame_index, 0);
    assert_eq!(report.outcome, SubmitOutcome::Visible);

    renderer.dispose().unwrap();
}

#[test]
fn not_visible_pauses_scene_rendering_but_keeps_pacing() {
    let calls = Arc::new(Mutex::new(0u64));
    let mut mock = MockCompositor::new();
    mock.not_visible_on(&[2, 3]);
    let mut renderer = StereoRenderer::new(mock, RendererOptions::default()).unwrap();
    renderer.init((1280, 720)).unwrap();
    renderer
        .add_actor(Box::new(CountingActor {
            calls: calls.clone(),
        }))
        .unwrap();

    for _ in 0..6 {
        renderer.render_frame(1280, 720).unwrap();
    }
    // Visibility is only known after submit: frames 0-2 render, 3 and 4 are
    // skipped, 5 renders again. Two eyes per rendered frame.
    assert_eq!(*calls.lock().unwrap(), 8);
    assert_eq!(renderer.frames_not_visible(), 2);
    assert_eq!(renderer.frame_index(), 6);

    renderer.dispose().unwrap();
}

#[test]
fn rejected_allocation_aborts_init() {
    let mut mock = MockCompositor::new();
    mock.reject_next_allocation();
    let mut renderer = StereoRenderer::new(mock, RendererOptions::default()).unwrap();
    let err = renderer.init((1280, 720)).unwrap_err();
    assert!(matches!(
        err.downcast_ref::<CompositorError>(),
        Some(CompositorError::AllocationFailed(_))
    ));
    // The session itself is still healthy enough for a clean teardown
    renderer.dispose().unwrap();
}

#[test]
fn overlay_layers_ride_along_with_the_eye_layer() {
    let mut renderer =
        StereoRenderer::new(MockCompositor::new(), RendererOptions::default()).unwrap();
    renderer.init((1280, 720)).unwrap();

    renderer.render_frame(1280, 720).unwrap();
    let color = renderer.color_chain().unwrap();
    renderer.set_overlay_layers(vec![Layer::Quad(QuadLayer {
        color,
        pose: Isometry3::identity(),
        size_meters: [1.0, 0.5],
        viewport: Viewport {
            x: 0,
            y: 0,
            width: 256,
            height: 128,
        },
    })]);
    renderer.render_frame(1280, 720).unwrap();
    renderer.set_overlay_layers(Vec::new());
    renderer.render_frame(1280, 720).unwrap();

    let layer_counts: Vec<_> = renderer
        .compositor()
        .calls()
        .iter()
        .filter_map(|call| match call {
            MockCall::EndFrame(_, layers) => Some(*layers),
            _ => None,
        })
        .collect();
    // The submitted list is the whole picture each frame; dropping the
    // overlay removes it
    assert_eq!(layer_counts, vec![1, 2, 1]);

    renderer.dispose().unwrap();
}
