// Copyright 2017 Matthew Plant. This file is part of Kinetic.
//
// Kinetic is free software: you can redistribute it and/or modify
// it under the terms of the GNU Lesser General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// Kinetic is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU Lesser General Public License for more details.
//
// You should have received a copy of the GNU Lesser General Public License
// along with Kinetic. If not, see <http://www.gnu.org/licenses/>.

use cgmath::{EuclideanSpace, Point3, Vector3};
use serde::{Deserialize, Serialize};

/// Maximum tolerence for error, i.e. what we consider the x86 floating
/// point epsilon.
pub const COLLISION_EPSILON: f32 = 0.000001;

/// Direction components with a smaller magnitude are treated as parallel to
/// the slab they would otherwise divide by.
pub const RAY_PARALLEL_EPSILON: f32 = 1.0e-8;

/// A type that can overlap another.
pub trait Overlaps<RHS> {
    /// Returns true if the two objects overlap and false otherwise.
    fn overlaps(&self, rhs: &RHS) -> bool;
}

/// A type that can completely subsume another.
pub trait Contains<RHS> {
    /// Returns true if the current object contains the argument.
    fn contains(&self, rhs: &RHS) -> bool;
}

/// Axis Aligned Bounding Boxes are closed boxes aligned to the axes of the
/// coordinate system, described by their minimum and maximum corners.
///
/// `min <= max` holds componentwise for every box built through `new`,
/// `from_center_extents` or `combine`.
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Aabb {
    pub min: Point3<f32>,
    pub max: Point3<f32>,
}

impl Aabb {
    /// Construct a box from two opposite corners in any order.
    pub fn new(a: Point3<f32>, b: Point3<f32>) -> Self {
        Aabb {
            min: Point3::new(a.x.min(b.x), a.y.min(b.y), a.z.min(b.z)),
            max: Point3::new(a.x.max(b.x), a.y.max(b.y), a.z.max(b.z)),
        }
    }

    /// Construct a box from its center and half widths.
    pub fn from_center_extents(c: Point3<f32>, r: Vector3<f32>) -> Self {
        let r = Vector3::new(r.x.abs(), r.y.abs(), r.z.abs());
        Aabb {
            min: c - r,
            max: c + r,
        }
    }

    /// The smallest box that encloses both arguments.
    pub fn combine(a: &Aabb, b: &Aabb) -> Aabb {
        Aabb {
            min: Point3::new(
                a.min.x.min(b.min.x),
                a.min.y.min(b.min.y),
                a.min.z.min(b.min.z),
            ),
            max: Point3::new(
                a.max.x.max(b.max.x),
                a.max.y.max(b.max.y),
                a.max.z.max(b.max.z),
            ),
        }
    }

    pub fn center(&self) -> Point3<f32> {
        Point3::from_vec((self.min.to_vec() + self.max.to_vec()) * 0.5)
    }

    pub fn half_extents(&self) -> Vector3<f32> {
        (self.max - self.min) * 0.5
    }

    /// Total area of the six faces.
    pub fn surface_area(&self) -> f32 {
        let d = self.max - self.min;
        2.0 * (d.x * d.y + d.y * d.z + d.z * d.x)
    }

    /// Surface area of the union of this box and `other`, without building it.
    pub fn combined_area(&self, other: &Aabb) -> f32 {
        Aabb::combine(self, other).surface_area()
    }

    /// Grow the box by `amount` along every axis in both directions.
    pub fn expand(self, amount: f32) -> Aabb {
        let v = Vector3::new(amount, amount, amount);
        Aabb::new(self.min - v, self.max + v)
    }

    /// Grow this box in place until it also encloses `other`.
    pub fn encapsulate(&mut self, other: &Aabb) {
        *self = Aabb::combine(self, other);
    }

    /// Clips the segment `origin + t * dir, t in [0, max_distance]` against
    /// the box with the slab method and returns the entry and exit parameters.
    ///
    /// An axis whose direction component is numerically zero never divides:
    /// the origin must lie within the slab on that axis or the segment misses.
    pub fn ray_interval(
        &self,
        origin: Point3<f32>,
        dir: Vector3<f32>,
        max_distance: f32
    ) -> Option<(f32, f32)> {
        let mut t_min = 0.0f32;
        let mut t_max = max_distance;
        if t_max < t_min {
            return None;
        }
        for i in 0..3 {
            if dir[i].abs() < RAY_PARALLEL_EPSILON {
                if origin[i] < self.min[i] || origin[i] > self.max[i] {
                    return None;
                }
                continue;
            }
            let inv_d = 1.0 / dir[i];
            let mut t1 = (self.min[i] - origin[i]) * inv_d;
            let mut t2 = (self.max[i] - origin[i]) * inv_d;
            if t1 > t2 {
                std::mem::swap(&mut t1, &mut t2);
            }
            t_min = t_min.max(t1);
            t_max = t_max.min(t2);
            if t_min > t_max {
                return None;
            }
        }
        Some((t_min, t_max))
    }

    /// Returns true if the segment touches the box.
    pub fn intersects_segment(
        &self,
        origin: Point3<f32>,
        dir: Vector3<f32>,
        max_distance: f32
    ) -> bool {
        self.ray_interval(origin, dir, max_distance).is_some()
    }
}

impl Overlaps<Aabb> for Aabb {
    fn overlaps(&self, rhs: &Aabb) -> bool {
        !(self.max.x < rhs.min.x || self.min.x > rhs.max.x
          || self.max.y < rhs.min.y || self.min.y > rhs.max.y
          || self.max.z < rhs.min.z || self.min.z > rhs.max.z)
    }
}

impl Contains<Point3<f32>> for Aabb {
    fn contains(&self, p: &Point3<f32>) -> bool {
        p.x >= self.min.x && p.x <= self.max.x
            && p.y >= self.min.y && p.y <= self.max.y
            && p.z >= self.min.z && p.z <= self.max.z
    }
}

impl Contains<Aabb> for Aabb {
    fn contains(&self, rhs: &Aabb) -> bool {
        self.contains(&rhs.min) && self.contains(&rhs.max)
    }
}
