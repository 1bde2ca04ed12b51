//! Pure 3-D rigid transform algebra.
//!
//! Everything here is side-effect free: no method mutates its receiver or
//! its arguments. The instantiator and scheduler convert to `nalgebra`
//! types at the `rapier3d` boundary; this module is the engine-agnostic
//! layer the morphology math is specified against.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Vec3 {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Vec3 {
    pub const ZERO: Vec3 = Vec3 { x: 0.0, y: 0.0, z: 0.0 };

    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Vec3 { x, y, z }
    }

    pub fn axis(index: usize) -> Vec3 {
        match index {
            0 => Vec3::new(1.0, 0.0, 0.0),
            1 => Vec3::new(0.0, 1.0, 0.0),
            2 => Vec3::new(0.0, 0.0, 1.0),
            _ => panic!("axis index out of range: {index}"),
        }
    }

    pub fn component(&self, index: usize) -> f64 {
        match index {
            0 => self.x,
            1 => self.y,
            2 => self.z,
            _ => panic!("component index out of range: {index}"),
        }
    }

    pub fn add(&self, other: &Vec3) -> Vec3 {
        Vec3::new(self.x + other.x, self.y + other.y, self.z + other.z)
    }

    pub fn sub(&self, other: &Vec3) -> Vec3 {
        Vec3::new(self.x - other.x, self.y - other.y, self.z - other.z)
    }

    pub fn scale(&self, s: f64) -> Vec3 {
        Vec3::new(self.x * s, self.y * s, self.z * s)
    }

    pub fn dot(&self, other: &Vec3) -> f64 {
        self.x * other.x + self.y * other.y + self.z * other.z
    }

    pub fn length(&self) -> f64 {
        self.dot(self).sqrt()
    }

    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite() && self.z.is_finite()
    }
}

/// Unit quaternion `(x, y, z, w)`. Values returned by this module's
/// constructors are normalized; [`Quat::mul`] and [`Quat::rotate_vector`]
/// preserve that as long as their inputs are unit quaternions.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Quat {
    pub x: f64,
    pub y: f64,
    pub z: f64,
    pub w: f64,
}

impl Quat {
    pub const IDENTITY: Quat = Quat { x: 0.0, y: 0.0, z: 0.0, w: 1.0 };

    pub fn new(x: f64, y: f64, z: f64, w: f64) -> Self {
        Quat { x, y, z, w }
    }

    fn axis_angle(axis: Vec3, angle_rad: f64) -> Quat {
        let half = angle_rad * 0.5;
        let s = half.sin();
        Quat::new(axis.x * s, axis.y * s, axis.z * s, half.cos())
    }

    /// Intrinsic X-then-Y-then-Z Euler rotation, angles in degrees.
    ///
    /// "Intrinsic X-then-Y-then-Z" means each subsequent rotation is applied
    /// about the axis of the *already-rotated* frame, which is equivalent to
    /// composing quaternions as `qx * qy * qz` (rightmost applied first to a
    /// vector).
    pub fn from_euler_xyz_degrees(rx: f64, ry: f64, rz: f64) -> Quat {
        let qx = Quat::axis_angle(Vec3::axis(0), rx.to_radians());
        let qy = Quat::axis_angle(Vec3::axis(1), ry.to_radians());
        let qz = Quat::axis_angle(Vec3::axis(2), rz.to_radians());
        qx.mul(&qy).mul(&qz)
    }

    pub fn mul(&self, other: &Quat) -> Quat {
        Quat::new(
            self.w * other.x + self.x * other.w + self.y * other.z - self.z * other.y,
            self.w * other.y - self.x * other.z + self.y * other.w + self.z * other.x,
            self.w * other.z + self.x * other.y - self.y * other.x + self.z * other.w,
            self.w * other.w - self.x * other.x - self.y * other.y - self.z * other.z,
        )
    }

    pub fn conjugate(&self) -> Quat {
        Quat::new(-self.x, -self.y, -self.z, self.w)
    }

    fn norm_sq(&self) -> f64 {
        self.x * self.x + self.y * self.y + self.z * self.z + self.w * self.w
    }

    /// Inverse quaternion, or identity if the input's norm is near zero
    /// (a degenerate, non-invertible quaternion should never silently
    /// propagate NaNs through a transform chain).
    pub fn invert(&self) -> Quat {
        let n2 = self.norm_sq();
        if n2 < 1e-12 {
            return Quat::IDENTITY;
        }
        let inv_n2 = 1.0 / n2;
        Quat::new(
            -self.x * inv_n2,
            -self.y * inv_n2,
            -self.z * inv_n2,
            self.w * inv_n2,
        )
    }

    /// Rotate a vector by this quaternion: `q * (v, 0) * q_conj`, restricted
    /// to the vector part.
    pub fn rotate_vector(&self, v: &Vec3) -> Vec3 {
        let qv = Quat::new(v.x, v.y, v.z, 0.0);
        let rotated = self.mul(&qv).mul(&self.conjugate());
        Vec3::new(rotated.x, rotated.y, rotated.z)
    }

    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite() && self.z.is_finite() && self.w.is_finite()
    }
}
