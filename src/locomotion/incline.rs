//! Tilting planar velocity onto inclined surfaces.
//!
//! All vectors are in the character's local frame (`z` = up).

use bevy::prelude::*;

const DEGENERATE: f32 = 1e-6;

/// Tilt a local XY vector into the plane whose normal is `new_direction`.
///
/// The X and Y basis vectors are each rotated onto the plane about an axis
/// orthogonal to `new_direction`, then recombined. There is no rotation about
/// `new_direction` itself, so heading is never coupled into the result. The
/// returned vector has the same length as `v`.
pub fn tilt_xy(v: Vec2, new_direction: Vec3) -> Vec3 {
    let Some((x_axis, y_axis)) = tilted_basis(new_direction) else {
        return v.extend(0.0);
    };

    let tilted = x_axis * v.x + y_axis * v.y;
    tilted.normalize_or_zero() * v.length()
}

/// Recover the local XY vector whose tilt onto `new_direction` points along `w`.
///
/// Any component of `w` along `new_direction` is ignored. The result has the
/// length of the in-plane part of `w`.
pub fn untilt_xy(w: Vec3, new_direction: Vec3) -> Vec2 {
    let Some((x_axis, y_axis)) = tilted_basis(new_direction) else {
        return w.truncate();
    };

    let normal = new_direction.normalize();
    let in_plane = w - normal * w.dot(normal);

    // Solve in_plane = a * x_axis + b * y_axis through the Gram matrix.
    let xx = x_axis.dot(x_axis);
    let xy = x_axis.dot(y_axis);
    let yy = y_axis.dot(y_axis);
    let det = xx * yy - xy * xy;
    if det.abs() < DEGENERATE {
        return w.truncate();
    }
    let px = in_plane.dot(x_axis);
    let py = in_plane.dot(y_axis);
    let direction = Vec2::new(yy * px - xy * py, xx * py - xy * px) / det;

    direction.normalize_or_zero() * in_plane.length()
}

fn tilted_basis(new_direction: Vec3) -> Option<(Vec3, Vec3)> {
    let normal = new_direction.normalize_or_zero();
    if normal == Vec3::ZERO || normal.z >= 1.0 - DEGENERATE {
        return None;
    }

    let project = |axis: Vec3| {
        let projected = (axis - normal * axis.dot(normal)).normalize_or_zero();
        if projected == Vec3::ZERO {
            axis
        } else {
            projected
        }
    };

    Some((project(Vec3::X), project(Vec3::Y)))
}
