use crate::job::model::{LensGuard, LensPosition, StreamLocator};

/// Nominal field of view of each consumer dual-fisheye lens.
pub const DUAL_FISHEYE_FOV_DEG: f64 = 200.0;

/// Calibration of a single equidistant fisheye lens.
///
/// Orientation angles are in degrees in the canvas frame (x right, y up, z forward, longitude 0 at
/// the canvas centre): `yaw` turns the optical axis toward +x, `pitch` tilts it up, `roll` turns
/// the image clockwise around the axis as seen from behind the lens.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct LensGeometry {
    /// Optical axis longitude.
    pub yaw_deg: f64,
    /// Optical axis latitude.
    #[serde(default)]
    pub pitch_deg: f64,
    /// Rotation around the optical axis.
    #[serde(default)]
    pub roll_deg: f64,
    /// Full field of view of the image circle.
    pub fov_deg: f64,
    /// Image-circle centre as a fraction of frame width.
    #[serde(default = "half")]
    pub center_x: f64,
    /// Image-circle centre as a fraction of frame height.
    #[serde(default = "half")]
    pub center_y: f64,
    /// Image-circle radius as a fraction of half the shorter frame side.
    #[serde(default = "one")]
    pub radius: f64,
}

fn half() -> f64 {
    0.5
}

fn one() -> f64 {
    1.0
}

impl LensGeometry {
    /// Centred lens looking along `yaw_deg` with the given field of view.
    pub fn centered(yaw_deg: f64, fov_deg: f64) -> Self {
        Self {
            yaw_deg,
            pitch_deg: 0.0,
            roll_deg: 0.0,
            fov_deg,
            center_x: 0.5,
            center_y: 0.5,
            radius: 1.0,
        }
    }

    /// Canvas → lens rotation (transpose of the lens orientation).
    pub fn world_to_lens(&self) -> Mat3 {
        let r = Mat3::rot_y(self.yaw_deg.to_radians())
            .mul(&Mat3::rot_x(self.pitch_deg.to_radians()))
            .mul(&Mat3::rot_z(self.roll_deg.to_radians()));
        r.transpose()
    }
}

/// Lenses of a rig, one per input stream in job order.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct RigGeometry {
    /// Per-stream lens calibration.
    pub lenses: Vec<LensGeometry>,
}

impl RigGeometry {
    /// Back-to-back dual-fisheye rig: front lens at longitude 0, back lens at 180 degrees.
    pub fn dual_fisheye(inputs: &[StreamLocator]) -> Self {
        let lenses = inputs
            .iter()
            .map(|loc| {
                let yaw = match loc.position {
                    LensPosition::Front => 0.0,
                    LensPosition::Back => 180.0,
                };
                LensGeometry::centered(yaw, DUAL_FISHEYE_FOV_DEG)
            })
            .collect();
        Self { lenses }
    }

    /// Number of lenses.
    pub fn len(&self) -> usize {
        self.lenses.len()
    }

    /// `true` when the rig has no lenses.
    pub fn is_empty(&self) -> bool {
        self.lenses.is_empty()
    }
}

/// Known optical change introduced by a lens guard.
///
/// Guards add a thin dome in front of each lens: the image circle shrinks slightly and the outer
/// rim of the field of view becomes unusable.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct AccessoryProfile {
    /// Multiplier on the image-circle radius.
    pub radial_scale: f64,
    /// Degrees trimmed from the usable field of view.
    pub fov_trim_deg: f64,
}

impl AccessoryProfile {
    /// No accessory fitted.
    pub const NONE: Self = Self {
        radial_scale: 1.0,
        fov_trim_deg: 0.0,
    };

    /// Profile for an optional guard.
    pub fn for_guard(guard: Option<LensGuard>) -> Self {
        match guard {
            None => Self::NONE,
            Some(LensGuard::Standard) => Self {
                radial_scale: 0.985,
                fov_trim_deg: 4.0,
            },
            Some(LensGuard::Premium) => Self {
                radial_scale: 0.995,
                fov_trim_deg: 1.5,
            },
        }
    }
}

/// Row-major 3x3 rotation matrix.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Mat3(pub [[f64; 3]; 3]);

impl Mat3 {
    /// Identity.
    pub const IDENTITY: Self = Self([[1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0]]);

    /// Rotation about +y taking +z toward +x.
    pub fn rot_y(a: f64) -> Self {
        let (s, c) = a.sin_cos();
        Self([[c, 0.0, s], [0.0, 1.0, 0.0], [-s, 0.0, c]])
    }

    /// Rotation about +x taking +z toward +y.
    pub fn rot_x(a: f64) -> Self {
        let (s, c) = a.sin_cos();
        Self([[1.0, 0.0, 0.0], [0.0, c, s], [0.0, -s, c]])
    }

    /// Rotation about +z.
    pub fn rot_z(a: f64) -> Self {
        let (s, c) = a.sin_cos();
        Self([[c, -s, 0.0], [s, c, 0.0], [0.0, 0.0, 1.0]])
    }

    /// Matrix product `self * rhs`.
    pub fn mul(&self, rhs: &Self) -> Self {
        let mut out = [[0.0; 3]; 3];
        for (i, row) in out.iter_mut().enumerate() {
            for (j, v) in row.iter_mut().enumerate() {
                *v = (0..3).map(|k| self.0[i][k] * rhs.0[k][j]).sum();
            }
        }
        Self(out)
    }

    /// Transpose (inverse for rotations).
    pub fn transpose(&self) -> Self {
        let m = &self.0;
        Self([
            [m[0][0], m[1][0], m[2][0]],
            [m[0][1], m[1][1], m[2][1]],
            [m[0][2], m[1][2], m[2][2]],
        ])
    }

    /// Matrix-vector product.
    pub fn apply(&self, v: [f64; 3]) -> [f64; 3] {
        let m = &self.0;
        [
            m[0][0] * v[0] + m[0][1] * v[1] + m[0][2] * v[2],
            m[1][0] * v[0] + m[1][1] * v[1] + m[1][2] * v[2],
            m[2][0] * v[0] + m[2][1] * v[1] + m[2][2] * v[2],
        ]
    }
}

#[cfg(test)]
#[path = "../../tests/unit/geometry/lens.rs"]
mod tests;
