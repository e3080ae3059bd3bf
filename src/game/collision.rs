//! Collision primitives: circle tests, wrap-aware variants, and the
//! triangle hitbox used by the Dreadnought capital ship.
//!
//! All functions are pure; the shape of an entity is resolved once at
//! construction into a [`Hitbox`] variant rather than re-dispatched on a
//! ship-type integer per query.

use crate::util::vec2::Vec2;

/// Check if two circles overlap (closed boundary: touching counts)
#[inline]
pub fn circles_collide(x1: f32, y1: f32, r1: f32, x2: f32, y2: f32, r2: f32) -> bool {
    let dx = x2 - x1;
    let dy = y2 - y1;
    let rad_sum = r1 + r2;
    dx * dx + dy * dy <= rad_sum * rad_sum
}

/// Shortest signed delta between two coordinates on a wrapping axis
#[inline]
pub fn wrap_delta(d: f32, size: f32) -> f32 {
    if d > size / 2.0 {
        d - size
    } else if d < -size / 2.0 {
        d + size
    } else {
        d
    }
}

/// Circle overlap test on a toroidal world: also catches pairs that sit on
/// opposite edges of the arena
#[inline]
pub fn circles_collide_wrapped(
    x1: f32,
    y1: f32,
    r1: f32,
    x2: f32,
    y2: f32,
    r2: f32,
    world_w: f32,
    world_h: f32,
) -> bool {
    let dx = wrap_delta(x2 - x1, world_w);
    let dy = wrap_delta(y2 - y1, world_h);
    let rad_sum = r1 + r2;
    dx * dx + dy * dy <= rad_sum * rad_sum
}

/// Point-in-triangle test via three same-sign cross products
pub fn point_in_triangle(p: Vec2, a: Vec2, b: Vec2, c: Vec2) -> bool {
    let d1 = (b - a).cross(p - a);
    let d2 = (c - b).cross(p - b);
    let d3 = (a - c).cross(p - c);

    let has_neg = d1 < 0.0 || d2 < 0.0 || d3 < 0.0;
    let has_pos = d1 > 0.0 || d2 > 0.0 || d3 > 0.0;
    !(has_neg && has_pos)
}

/// Segment-circle intersection: solves the quadratic in the parametric line
/// equation and reports a hit when a root lies in [0,1] or the roots
/// straddle the segment
pub fn segment_circle_intersect(a: Vec2, b: Vec2, center: Vec2, radius: f32) -> bool {
    let d = b - a;
    let f = a - center;

    let qa = d.dot(d);
    if qa <= f32::EPSILON {
        // Degenerate segment: plain point-in-circle
        return f.length_sq() <= radius * radius;
    }
    let qb = 2.0 * f.dot(d);
    let qc = f.dot(f) - radius * radius;

    let discriminant = qb * qb - 4.0 * qa * qc;
    if discriminant < 0.0 {
        return false;
    }

    let sqrt_d = discriminant.sqrt();
    let t1 = (-qb - sqrt_d) / (2.0 * qa);
    let t2 = (-qb + sqrt_d) / (2.0 * qa);

    (0.0..=1.0).contains(&t1) || (0.0..=1.0).contains(&t2) || (t1 < 0.0 && t2 > 1.0)
}

/// Entity hitbox, resolved once at construction
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Hitbox {
    Circle {
        radius: f32,
    },
    /// Fixed 3-vertex polygon in local space, transformed by the entity's
    /// position/rotation at query time
    Triangle {
        verts: [Vec2; 3],
    },
}

impl Hitbox {
    pub fn circle(radius: f32) -> Self {
        Hitbox::Circle { radius }
    }

    pub fn triangle(verts: [Vec2; 3]) -> Self {
        Hitbox::Triangle { verts }
    }

    /// Broad-phase bounding radius
    pub fn bounding_radius(&self) -> f32 {
        match self {
            Hitbox::Circle { radius } => *radius,
            Hitbox::Triangle { verts } => verts
                .iter()
                .map(|v| v.length())
                .fold(0.0f32, f32::max),
        }
    }

    /// Exact test against a circle, with this hitbox placed at `pos` with
    /// heading `rotation`
    pub fn hits_circle(&self, pos: Vec2, rotation: f32, center: Vec2, radius: f32) -> bool {
        match self {
            Hitbox::Circle { radius: own } => {
                circles_collide(pos.x, pos.y, *own, center.x, center.y, radius)
            }
            Hitbox::Triangle { verts } => {
                let world: [Vec2; 3] = [
                    pos + verts[0].rotate(rotation),
                    pos + verts[1].rotate(rotation),
                    pos + verts[2].rotate(rotation),
                ];
                if point_in_triangle(center, world[0], world[1], world[2]) {
                    return true;
                }
                segment_circle_intersect(world[0], world[1], center, radius)
                    || segment_circle_intersect(world[1], world[2], center, radius)
                    || segment_circle_intersect(world[2], world[0], center, radius)
            }
        }
    }
}
