//! Loop drivers: a winit-backed mirrored window and a ctrlc-interruptible
//! headless runner. Both own the renderer, forward lifecycle events, and
//! rebuild the session once after a fatal compositor error.
use crate::compositor::{Compositor, CompositorError};
use crate::renderer::{RendererOptions, StereoRenderer};
use anyhow::{Context, Result};
use log::{error, info};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use winit::{
    event::{ElementState, Event, KeyboardInput, StartCause, VirtualKeyCode, WindowEvent},
    event_loop::{ControlFlow, EventLoop},
    window::WindowBuilder,
};

/// An application driven by one of the launchers.
pub trait App<C: Compositor>: Sized {
    const NAME: &'static str;
    fn new(renderer: &mut StereoRenderer<C>) -> Result<Self>;
    /// Called once per frame, before the pipeline runs.
    fn update(&mut self, renderer: &mut StereoRenderer<C>) -> Result<()>;
}

fn is_fatal(err: &anyhow::Error) -> bool {
    err.downcast_ref::<CompositorError>()
        .map_or(false, CompositorError::is_fatal)
}

/// Runs the app under a winit event loop with a mirror window. Escape or
/// closing the window quits.
pub fn launch_windowed<C, A>(compositor: C, options: RendererOptions) -> Result<()>
where
    C: Compositor + 'static,
    A: App<C> + 'static,
{
    let event_loop = EventLoop::new();
    let window = WindowBuilder::new()
        .with_title(A::NAME)
        .build(&event_loop)?;
    let size = window.inner_size();

    let mut renderer = StereoRenderer::new(compositor, options)?;
    renderer.init((size.width, size.height))?;
    let mut app = A::new(&mut renderer)?;
    let mut recreated = false;

    event_loop.run(move |event, _, control_flow| match event {
        Event::NewEvents(StartCause::Init) => {
            *control_flow = ControlFlow::Poll;
        }
        Event::WindowEvent { event, .. } => match event {
            WindowEvent::CloseRequested => *control_flow = ControlFlow::Exit,
            WindowEvent::KeyboardInput {
                input:
                    KeyboardInput {
                        virtual_keycode: Some(VirtualKeyCode::Escape),
                        state: ElementState::Pressed,
                        ..
                    },
                ..
            } => *control_flow = ControlFlow::Exit,
            WindowEvent::Resized(new_size) => {
                if let Err(err) = renderer.resize(new_size.width, new_size.height) {
                    error!("resize failed: {:#}", err);
                    *control_flow = ControlFlow::Exit;
                }
            }
            _ => {}
        },
        Event::MainEventsCleared => {
            let size = window.inner_size();
            let result = app
                .update(&mut renderer)
                .and_then(|_| renderer.render_frame(size.width, size.height).map(|_| ()));
            if let Err(err) = result {
                if is_fatal(&err) && !recreated {
                    error!("{:#}; rebuilding session", err);
                    recreated = true;
                    if let Err(rebuild_err) = renderer.recreate((size.width, size.height)) {
                        error!("session rebuild failed: {:#}", rebuild_err);
                        *control_flow = ControlFlow::Exit;
                    }
                } else {
                    error!("render loop stopped: {:#}", err);
                    *control_flow = ControlFlow::Exit;
                }
            }
        }
        Event::LoopDestroyed => {
            if let Err(err) = renderer.dispose() {
                error!("dispose failed: {:#}", err);
            }
        }
        _ => (),
    })
}

/// Runs the app without a window until Ctrl-C or `max_frames`. The mirror
/// target defaults to a nominal 1280x720.
pub fn launch_headless<C, A>(
    compositor: C,
    options: RendererOptions,
    max_frames: Option<u64>,
) -> Result<()>
where
    C: Compositor,
    A: App<C>,
{
    // Handle interrupts gracefully
    let running = Arc::new(AtomicBool::new(true));
    let r = running.clone();
    ctrlc::set_handler(move || {
        r.store(false, Ordering::Relaxed);
    })
    .context("setting Ctrl-C handler")?;

    const MIRROR_SIZE: (u32, u32) = (1280, 720);
    let mut renderer = StereoRenderer::new(compositor, options)?;
    renderer.init(MIRROR_SIZE)?;
    let mut app = A::new(&mut renderer)?;
    let mut recreated = false;

    while running.load(Ordering::Relaxed) {
        if let Some(limit) = max_frames {
            if renderer.frame_index() >= limit {
                break;
            }
        }
        app.update(&mut renderer)?;
        if let Err(err) = renderer.render_frame(MIRROR_SIZE.0, MIRROR_SIZE.1) {
            if is_fatal(&err) && !recreated {
                error!("{:#}; rebuilding session", err);
                recreated = true;
                renderer.recreate(MIRROR_SIZE)?;
            } else {
                renderer.dispose()?;
                return Err(err);
            }
        }
    }

    info!(
        "loop finished after {} frames ({} not visible, {} tracking dropouts)",
        renderer.frame_index(),
        renderer.frames_not_visible(),
        renderer.tracking_dropouts()
    );
    renderer.dispose()
}
