use crate::compositor::{Compositor, CompositorError, SessionId, SubmitOutcome};
use crate::layer::{Layer, ViewScale};
use log::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Idle,
    Rendering,
    Committed,
}

/// Drives the strictly ordered per-frame protocol
/// `Idle -> WaitBegin(i) -> Rendering(i) -> Committed(i) -> Submitted(i) ->
/// Idle(i+1)` with a monotonically increasing frame index.
///
/// Frames never overlap: frame `i` completes its whole sequence before
/// `i+1`'s wait may start. Calling the steps out of order is a contract
/// violation and panics.
pub struct FramePacer {
    frame_index: u64,
    phase: Phase,
    frames_not_visible: u64,
}

impl FramePacer {
    pub fn new() -> Self {
        Self {
            frame_index: 0,
            phase: Phase::Idle,
            frames_not_visible: 0,
        }
    }

    /// Blocks until the compositor is ready, then opens the frame. On success
    /// the pacer is in the rendering phase for the current index.
    pub fn wait_begin<C: Compositor>(
        &mut self,
        compositor: &mut C,
        session: SessionId,
    ) -> Result<(), CompositorError> {
        assert!(
            self.phase == Phase::Idle,
            "wait_begin called while frame {} is still open",
            self.frame_index
        );
        compositor.wait_to_begin_frame(session, self.frame_index)?;
        compositor.begin_frame(session, self.frame_index)?;
        self.phase = Phase::Rendering;
        Ok(())
    }

    /// Records that all chains for this frame were committed. Must follow
    /// `wait_begin` and precede `submit`.
    pub fn mark_committed(&mut self) {
        assert!(
            self.phase == Phase::Rendering,
            "mark_committed outside the rendering phase of frame {}",
            self.frame_index
        );
        self.phase = Phase::Committed;
    }

    /// Hands the layer list to the compositor and closes the frame. The index
    /// increments only on success; on an error the frame is abandoned without
    /// advancing.
    pub fn submit<C: Compositor>(
        &mut self,
        compositor: &mut C,
        session: SessionId,
        view_scale: &ViewScale,
        layers: &[Layer],
    ) -> Result<SubmitOutcome, CompositorError> {
        assert!(
            self.phase == Phase::Committed,
            "submit before commit on frame {}",
            self.frame_index
        );
        match compositor.end_frame(session, self.frame_index, view_scale, layers) {
            Ok(outcome) => {
                if outcome == SubmitOutcome::NotVisible {
                    debug!("frame {} submitted but not visible", self.frame_index);
                    self.frames_not_visible += 1;
                }
                self.frame_index += 1;
                self.phase = Phase::Idle;
                Ok(outcome)
            }
            Err(err) => {
                self.phase = Phase::Idle;
                Err(err)
            }
        }
    }

    /// Drops any half-finished frame after an error. The index does not
    /// advance; the next `wait_begin` retries the same frame.
    pub fn abandon(&mut self) {
        self.phase = Phase::Idle;
    }

    /// Index of the frame currently being produced.
    pub fn frame_index(&self) -> u64 {
        self.frame_index
    }

    pub fn frames_not_visible(&self) -> u64 {
        self.frames_not_visible
    }
}

impl Default for FramePacer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{MockCall, MockCompositor};

    fn view_scale() -> ViewScale {
        ViewScale {
            meters_per_unit: 1.0,
            eye_offsets: [nalgebra::Isometry3::identity(); 2],
        }
    }

    #[test]
    fn indices_advance_in_strict_order() {
        let mut mock = MockCompositor::new();
        let session = mock.create_session("default").unwrap();
        let mut pacer = FramePacer::new();

        for expected in 0..3u64 {
            assert_eq!(pacer.frame_index(), expected);
            pacer.wait_begin(&mut mock, session).unwrap();
            pacer.mark_committed();
            pacer.submit(&mut mock, session, &view_scale(), &[]).unwrap();
        }
        assert_eq!(pacer.frame_index(), 3);

        let calls: Vec<_> = mock
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
        assert_eq!(
            calls,
            vec![
                MockCall::WaitFrame(0),
                MockCall::BeginFrame(0),
                MockCall::EndFrame(0, 0),
                MockCall::WaitFrame(1),
                MockCall::BeginFrame(1),
                MockCall::EndFrame(1, 0),
                MockCall::WaitFrame(2),
                MockCall::BeginFrame(2),
                MockCall::EndFrame(2, 0),
            ]
        );
        mock.destroy_session(session);
    }

    #[test]
    #[should_panic(expected = "mark_committed outside the rendering phase")]
    fn commit_before_wait_panics() {
        let mut pacer = FramePacer::new();
        pacer.mark_committed();
    }

    #[test]
    #[should_panic(expected = "submit before commit")]
    fn submit_before_commit_panics() {
        let mut mock = MockCompositor::new();
        let session = mock.create_session("default").unwrap();
        let mut pacer = FramePacer::new();
        pacer.wait_begin(&mut mock, session).unwrap();
        let _ = pacer.submit(&mut mock, session, &view_scale(), &[]);
    }

    #[test]
    fn not_visible_outcomes_are_counted() {
        let mut mock = MockCompositor::new();
        mock.not_visible_on(&[1, 2]);
        let session = mock.create_session("default").unwrap();
        let mut pacer = FramePacer::new();

        let mut outcomes = Vec::new();
        for _ in 0..4 {
            pacer.wait_begin(&mut mock, session).unwrap();
            pacer.mark_committed();
            outcomes.push(pacer.submit(&mut mock, session, &view_scale(), &[]).unwrap());
        }
        assert_eq!(
            outcomes,
            vec![
                SubmitOutcome::Visible,
                SubmitOutcome::NotVisible,
                SubmitOutcome::NotVisible,
                SubmitOutcome::Visible,
            ]
        );
        assert_eq!(pacer.frames_not_visible(), 2);
        mock.destroy_session(session);
    }
}
