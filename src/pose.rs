use crate::compositor::{Compositor, SessionId};
use crate::layer::Fov;
use log::debug;
use nalgebra::{Isometry3, Matrix4, Vector3};

/// Which tracking channels were live when a sample was taken. A fully
/// untracked sample is still a valid result, never an error.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TrackingStatus {
    pub orientation_tracked: bool,
    pub position_tracked: bool,
}

impl TrackingStatus {
    pub fn fully_tracked(&self) -> bool {
        self.orientation_tracked && self.position_tracked
    }
}

/// Head pose predicted for a requested display time, with first derivatives.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PredictedPose {
    pub pose: Isometry3<f32>,
    pub linear_velocity: Vector3<f32>,
    pub angular_velocity: Vector3<f32>,
}

impl Default for PredictedPose {
    fn default() -> Self {
        Self {
            pose: Isometry3::identity(),
            linear_velocity: Vector3::zeros(),
            angular_velocity: Vector3::zeros(),
        }
    }
}

/// One tracking query result from the compositor.
#[derive(Debug, Clone, Copy)]
pub struct TrackingSample {
    pub head: PredictedPose,
    pub status: TrackingStatus,
    /// Absolute time the sample was predicted for.
    pub sample_time: f64,
}

/// Head pose handed to the layer builder for one frame.
#[derive(Debug, Clone, Copy)]
pub struct HeadSample {
    pub head: PredictedPose,
    pub sample_time: f64,
    /// True when this frame fell back to the last fully tracked pose.
    pub degraded: bool,
}

/// Wraps the compositor tracking query. Keeps the last fully tracked pose so
/// a dropout renders from a sane pose instead of snapping to the origin.
pub struct PosePredictor {
    last_tracked: PredictedPose,
    dropouts: u64,
}

impl PosePredictor {
    pub fn new() -> Self {
        Self {
            last_tracked: PredictedPose::default(),
            dropouts: 0,
        }
    }

    /// Predicted head pose for `frame_index`'s display time. `latency_marker`
    /// marks this query as the start of motion-to-photon measurement.
    pub fn sample<C: Compositor>(
        &mut self,
        compositor: &mut C,
        session: SessionId,
        frame_index: u64,
        latency_marker: bool,
    ) -> HeadSample {
        let display_time = compositor.predicted_display_time(session, frame_index);
        let sample = compositor.tracking_state(session, display_time, latency_marker);
        if sample.status.orientation_tracked {
            self.last_tracked = sample.head;
            HeadSample {
                head: sample.head,
                sample_time: sample.sample_time,
                degraded: false,
            }
        } else {
            debug!(
                "tracking lost at frame {}; reusing last tracked pose",
                frame_index
            );
            self.dropouts += 1;
            HeadSample {
                head: self.last_tracked,
                sample_time: sample.sample_time,
                degraded: true,
            }
        }
    }

    pub fn dropouts(&self) -> u64 {
        self.dropouts
    }
}

impl Default for PosePredictor {
    fn default() -> Self {
        Self::new()
    }
}

/// Per-eye render pose: the fixed head-to-eye offset applied after the head
/// transform.
pub fn eye_pose(head: &Isometry3<f32>, offset: &Isometry3<f32>) -> Isometry3<f32> {
    head * offset
}

/// View matrix for a render pose.
pub fn view_from_pose(pose: &Isometry3<f32>) -> Matrix4<f32> {
    pose.inverse().to_homogeneous()
}

/// Off-center perspective projection from tan-angle fov extents, OpenGL
/// clip-space conventions.
pub fn projection_from_fov(fov: &Fov, near: f32, far: f32) -> Matrix4<f32> {
    let tan_width = fov.tan_left + fov.tan_right;
    let tan_height = fov.tan_up + fov.tan_down;

    let a11 = 2.0 / tan_width;
    let a22 = 2.0 / tan_height;

    let a31 = (fov.tan_right - fov.tan_left) / tan_width;
    let a32 = (fov.tan_up - fov.tan_down) / tan_height;
    let a33 = -(far + near) / (far - near);
    let a43 = -(2.0 * far * near) / (far - near);

    Matrix4::new(
        a11, 0.0, a31, 0.0, //
        0.0, a22, a32, 0.0, //
        0.0, 0.0, a33, a43, //
        0.0, 0.0, -1.0, 0.0, //
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::{Translation3, UnitQuaternion};

    fn iso(x: f32, y: f32, z: f32, yaw: f32) -> Isometry3<f32> {
        Isometry3::from_parts(
            Translation3::new(x, y, z),
            UnitQuaternion::from_euler_angles(0.0, yaw, 0.0),
        )
    }

    #[test]
    fn eye_pose_is_deterministic() {
        let head = iso(0.1, 1.6, -0.2, 0.4);
        let offset = iso(-0.032, 0.0, 0.0, 0.0);
        let a = eye_pose(&head, &offset);
        let b = eye_pose(&head, &offset);
        assert_eq!(a, b);
    }

    #[test]
    fn eye_poses_are_independent_per_eye() {
        let head = iso(0.0, 1.6, 0.0, 0.5);
        let left = eye_pose(&head, &iso(-0.032, 0.0, 0.0, 0.0));
        let right = eye_pose(&head, &iso(0.032, 0.0, 0.0, 0.0));
        assert_ne!(left, right);
        // Offsets are local: a yawed head separates the eyes along its own
        // x axis, not the world's
        let separation = right.translation.vector - left.translation.vector;
        assert!((separation.norm() - 0.064).abs() < 1e-6);
        assert!(separation.z.abs() > 1e-4);
    }

    #[test]
    fn view_inverts_pose() {
        let pose = iso(1.0, 2.0, 3.0, 0.7);
        let view = view_from_pose(&pose);
        let roundtrip = view * pose.to_homogeneous();
        assert!((roundtrip - Matrix4::identity()).norm() < 1e-4);
    }

    #[test]
    fn symmetric_projection_spot_values() {
        // 90 degree symmetric frustum: unit tangents everywhere
        let fov = Fov {
            tan_left: 1.0,
            tan_right: 1.0,
            tan_up: 1.0,
            tan_down: 1.0,
        };
        let proj = projection_from_fov(&fov, 0.1, 100.0);
        assert!((proj[(0, 0)] - 1.0).abs() < 1e-6);
        assert!((proj[(1, 1)] - 1.0).abs() < 1e-6);
        assert!(proj[(0, 2)].abs() < 1e-6);
        assert!((proj[(3, 2)] - -1.0).abs() < 1e-6);
    }

    #[test]
    fn asymmetric_projection_shears() {
        let fov = Fov {
            tan_left: 1.2,
            tan_right: 0.8,
            tan_up: 1.0,
            tan_down: 1.0,
        };
        let proj = projection_from_fov(&fov, 0.1, 100.0);
        assert!((proj[(0, 2)] - (0.8 - 1.2) / 2.0).abs() < 1e-6);
    }
}
