use crate::compositor::{ChainKey, EyeRenderInfo};
use crate::pose::eye_pose;
use crate::Eye;
use nalgebra::{Isometry3, Matrix3};

/// Field of view as tan-angle extents from the view axis. All four values are
/// positive magnitudes.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Fov {
    pub tan_left: f32,
    pub tan_right: f32,
    pub tan_up: f32,
    pub tan_down: f32,
}

impl Fov {
    pub fn symmetric(horizontal_radians: f32, vertical_radians: f32) -> Self {
        let tan_h = (horizontal_radians / 2.0).tan();
        let tan_v = (vertical_radians / 2.0).tan();
        Self {
            tan_left: tan_h,
            tan_right: tan_h,
            tan_up: tan_v,
            tan_down: tan_v,
        }
    }

    fn zeroed() -> Self {
        Self {
            tan_left: 0.0,
            tan_right: 0.0,
            tan_up: 0.0,
            tan_down: 0.0,
        }
    }
}

/// Texel rectangle within a chain texture.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Viewport {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
}

/// How the two eyes are placed on chain textures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViewportSplit {
    /// One shared texture: left eye on the left half-width, right eye on the
    /// right, full height.
    SharedHorizontal,
    /// Each eye has the full texture to itself.
    PerEye,
}

/// Left/right viewports for a shared texture of the given size. The halves
/// sum exactly to the full width, with no gap or overlap.
pub fn shared_split(width: u32, height: u32) -> [Viewport; 2] {
    let half = width / 2;
    [
        Viewport {
            x: 0,
            y: 0,
            width: half,
            height,
        },
        Viewport {
            x: half as i32,
            y: 0,
            width: width - half,
            height,
        },
    ]
}

/// Stereo eye layer with optional depth, the workhorse submitted every frame.
#[derive(Debug, Clone, PartialEq)]
pub struct EyeFovLayer {
    pub color: ChainKey,
    pub depth: Option<ChainKey>,
    pub viewport: [Viewport; 2],
    pub fov: [Fov; 2],
    pub render_pose: [Isometry3<f32>; 2],
    pub sensor_sample_time: f64,
}

impl EyeFovLayer {
    /// Known zero state. The outgoing descriptor is rebuilt from this every
    /// frame so no stale field crosses the compositor boundary.
    pub fn zeroed(color: ChainKey, depth: Option<ChainKey>) -> Self {
        Self {
            color,
            depth,
            viewport: [Viewport::default(); 2],
            fov: [Fov::zeroed(); 2],
            render_pose: [Isometry3::identity(); 2],
            sensor_sample_time: 0.0,
        }
    }
}

/// Flat quad positioned in world space.
#[derive(Debug, Clone, PartialEq)]
pub struct QuadLayer {
    pub color: ChainKey,
    pub pose: Isometry3<f32>,
    pub size_meters: [f32; 2],
    pub viewport: Viewport,
}

/// Screen-space layer warped by a 2D matrix.
#[derive(Debug, Clone, PartialEq)]
pub struct MatrixLayer {
    pub color: ChainKey,
    pub matrix: Matrix3<f32>,
    pub viewport: Viewport,
}

/// One composited surface. The compositor keeps no layer state between
/// frames; each submission describes the entire picture.
#[derive(Debug, Clone, PartialEq)]
pub enum Layer {
    EyeFov(EyeFovLayer),
    Quad(QuadLayer),
    Matrix(MatrixLayer),
}

/// World scaling and eye offsets submitted alongside every frame.
#[derive(Debug, Clone, PartialEq)]
pub struct ViewScale {
    pub meters_per_unit: f32,
    pub eye_offsets: [Isometry3<f32>; 2],
}

/// Assembles the per-frame eye layer from the HMD's render parameters and a
/// predicted head pose.
pub struct LayerBuilder {
    fovs: [Fov; 2],
    offsets: [Isometry3<f32>; 2],
    viewports: [Viewport; 2],
    color: ChainKey,
    depth: Option<ChainKey>,
    meters_per_unit: f32,
    layer: EyeFovLayer,
}

impl LayerBuilder {
    pub fn new(
        eyes: &[EyeRenderInfo; 2],
        split: ViewportSplit,
        shared_size: (u32, u32),
        color: ChainKey,
        depth: Option<ChainKey>,
        meters_per_unit: f32,
    ) -> Self {
        let viewports = match split {
            ViewportSplit::SharedHorizontal => shared_split(shared_size.0, shared_size.1),
            ViewportSplit::PerEye => [
                Viewport {
                    x: 0,
                    y: 0,
                    width: eyes[0].texel_width,
                    height: eyes[0].texel_height,
                },
                Viewport {
                    x: 0,
                    y: 0,
                    width: eyes[1].texel_width,
                    height: eyes[1].texel_height,
                },
            ],
        };
        Self {
            fovs: [eyes[0].fov, eyes[1].fov],
            offsets: [eyes[0].offset, eyes[1].offset],
            viewports,
            color,
            depth,
            meters_per_unit,
            layer: EyeFovLayer::zeroed(color, depth),
        }
    }

    /// Resets the outgoing layer to its zero state.
    pub fn begin_frame(&mut self) {
        self.layer = EyeFovLayer::zeroed(self.color, self.depth);
    }

    /// Fills viewports, fovs and per-eye render poses for this frame.
    pub fn update(&mut self, head: &Isometry3<f32>, sensor_sample_time: f64) {
        for eye in Eye::BOTH.iter() {
            let i = eye.index();
            self.layer.render_pose[i] = eye_pose(head, &self.offsets[i]);
        }
        self.layer.viewport = self.viewports;
        self.layer.fov = self.fovs;
        self.layer.sensor_sample_time = sensor_sample_time;
    }

    pub fn render_pose(&self, eye: Eye) -> Isometry3<f32> {
        self.layer.render_pose[eye.index()]
    }

    pub fn viewport(&self, eye: Eye) -> Viewport {
        self.viewports[eye.index()]
    }

    pub fn fov(&self, eye: Eye) -> Fov {
        self.fovs[eye.index()]
    }

    pub fn layer(&self) -> Layer {
        Layer::EyeFov(self.layer.clone())
    }

    pub fn view_scale(&self) -> ViewScale {
        ViewScale {
            meters_per_unit: self.meters_per_unit,
            eye_offsets: self.offsets,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::{Translation3, UnitQuaternion};

    fn eye_infos() -> [EyeRenderInfo; 2] {
        let fov = Fov::symmetric(1.9, 2.0);
        [
            EyeRenderInfo {
                fov,
                offset: Isometry3::from_parts(
                    Translation3::new(-0.032, 0.0, 0.0),
                    UnitQuaternion::identity(),
                ),
                texel_width: 1344,
                texel_height: 1512,
            },
            EyeRenderInfo {
                fov,
                offset: Isometry3::from_parts(
                    Translation3::new(0.032, 0.0, 0.0),
                    UnitQuaternion::identity(),
                ),
                texel_width: 1344,
                texel_height: 1512,
            },
        ]
    }

    #[test]
    fn shared_split_covers_exactly() {
        let [left, right] = shared_split(2688, 1512);
        assert_eq!(left, Viewport { x: 0, y: 0, width: 1344, height: 1512 });
        assert_eq!(right, Viewport { x: 1344, y: 0, width: 1344, height: 1512 });
        assert_eq!(left.width + right.width, 2688);
        assert_eq!(left.x as u32 + left.width, right.x as u32);
    }

    #[test]
    fn shared_split_odd_width_has_no_gap() {
        let [left, right] = shared_split(101, 50);
        assert_eq!(left.width + right.width, 101);
        assert_eq!(left.x as u32 + left.width, right.x as u32);
    }

    #[test]
    fn begin_frame_resets_to_zero_state() {
        let mut builder = LayerBuilder::new(
            &eye_infos(),
            ViewportSplit::SharedHorizontal,
            (2688, 1512),
            ChainKey(1),
            Some(ChainKey(2)),
            1.0,
        );
        let head = Isometry3::from_parts(
            Translation3::new(0.0, 1.6, 0.0),
            UnitQuaternion::from_euler_angles(0.0, 0.3, 0.0),
        );
        builder.update(&head, 12.5);
        builder.begin_frame();
        match builder.layer() {
            Layer::EyeFov(layer) => {
                assert_eq!(layer, EyeFovLayer::zeroed(ChainKey(1), Some(ChainKey(2))));
            }
            other => panic!("unexpected layer variant: {:?}", other),
        }
    }

    #[test]
    fn update_fills_both_eyes() {
        let mut builder = LayerBuilder::new(
            &eye_infos(),
            ViewportSplit::SharedHorizontal,
            (2688, 1512),
            ChainKey(1),
            None,
            1.0,
        );
        let head = Isometry3::from_parts(
            Translation3::new(0.0, 1.6, 0.0),
            UnitQuaternion::identity(),
        );
        builder.begin_frame();
        builder.update(&head, 3.25);
        match builder.layer() {
            Layer::EyeFov(layer) => {
                assert_eq!(layer.render_pose[0].translation.vector.x, -0.032);
                assert_eq!(layer.render_pose[1].translation.vector.x, 0.032);
                assert_eq!(layer.sensor_sample_time, 3.25);
                assert_eq!(layer.viewport, shared_split(2688, 1512));
            }
            other => panic!("unexpected layer variant: {:?}", other),
        }
    }
}
