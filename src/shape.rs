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

use std::f32;

use cgmath::prelude::*;
use cgmath::{Matrix3, Point3, Vector3};
use serde::{Deserialize, Serialize};

use crate::bounds::COLLISION_EPSILON;

/// Smallest extent any shape dimension is allowed to have.
pub const MIN_DIMENSION: f32 = 1e-4;

/// Surface properties shared by everything a body touches.
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Material {
    pub friction: f32,
    pub restitution: f32,
    pub density: f32,
}

impl Default for Material {
    fn default() -> Self {
        Material {
            friction: 0.5,
            restitution: 0.2,
            density: 1000.0,
        }
    }
}

/// Discriminant of a `Shape`, for matching on pairs of shapes without
/// borrowing their data.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum ShapeKind {
    Sphere,
    Box,
    Capsule,
    Cylinder,
    ConvexHull,
}

/// A convex collision shape in its local frame.
///
/// Capsules and cylinders are aligned with the local Y axis and centered on
/// the origin. Every shape is described to the narrowphase by its support
/// function.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum Shape {
    Sphere { radius: f32 },
    Box { half_extents: Vector3<f32> },
    Capsule { radius: f32, half_height: f32 },
    Cylinder { radius: f32, half_height: f32 },
    ConvexHull { points: Vec<Point3<f32>> },
}

impl Shape {
    pub fn sphere(radius: f32) -> Self {
        Shape::Sphere { radius: radius.max(MIN_DIMENSION) }
    }

    pub fn cuboid(half_extents: Vector3<f32>) -> Self {
        Shape::Box {
            half_extents: Vector3::new(
                half_extents.x.max(MIN_DIMENSION),
                half_extents.y.max(MIN_DIMENSION),
                half_extents.z.max(MIN_DIMENSION),
            ),
        }
    }

    pub fn capsule(radius: f32, half_height: f32) -> Self {
        Shape::Capsule {
            radius: radius.max(MIN_DIMENSION),
            half_height: half_height.max(MIN_DIMENSION),
        }
    }

    pub fn cylinder(radius: f32, half_height: f32) -> Self {
        Shape::Cylinder {
            radius: radius.max(MIN_DIMENSION),
            half_height: half_height.max(MIN_DIMENSION),
        }
    }

    /// Creates the convex hull of a point cloud. The points are used as given;
    /// interior points are harmless. An empty cloud becomes a single point.
    pub fn convex_hull(mut points: Vec<Point3<f32>>) -> Self {
        if points.is_empty() {
            points.push(Point3::origin());
        }
        Shape::ConvexHull { points }
    }

    pub fn kind(&self) -> ShapeKind {
        match self {
            Shape::Sphere { .. } => ShapeKind::Sphere,
            Shape::Box { .. } => ShapeKind::Box,
            Shape::Capsule { .. } => ShapeKind::Capsule,
            Shape::Cylinder { .. } => ShapeKind::Cylinder,
            Shape::ConvexHull { .. } => ShapeKind::ConvexHull,
        }
    }

    /// Returns the point of the shape furthest along `dir`, in local space.
    /// `dir` does not need to be normalized.
    pub fn support(&self, dir: Vector3<f32>) -> Point3<f32> {
        match *self {
            Shape::Sphere { radius } => {
                Point3::from_vec(unit_or_x(dir) * radius)
            },
            Shape::Box { half_extents: h } => {
                Point3::new(
                    if dir.x >= 0.0 { h.x } else { -h.x },
                    if dir.y >= 0.0 { h.y } else { -h.y },
                    if dir.z >= 0.0 { h.z } else { -h.z },
                )
            },
            Shape::Capsule { radius, half_height } => {
                let n = unit_or_x(dir);
                let cap = if dir.y >= 0.0 { half_height } else { -half_height };
                Point3::new(n.x * radius, cap + n.y * radius, n.z * radius)
            },
            Shape::Cylinder { radius, half_height } => {
                let radial = (dir.x * dir.x + dir.z * dir.z).sqrt();
                let (x, z) = if radial > COLLISION_EPSILON {
                    (dir.x / radial * radius, dir.z / radial * radius)
                } else {
                    (radius, 0.0)
                };
                let y = if dir.y >= 0.0 { half_height } else { -half_height };
                Point3::new(x, y, z)
            },
            Shape::ConvexHull { ref points } => {
                let mut best = Point3::origin();
                let mut best_dot = f32::NEG_INFINITY;
                for p in points.iter() {
                    let d = p.to_vec().dot(dir);
                    if d > best_dot {
                        best_dot = d;
                        best = *p;
                    }
                }
                best
            },
        }
    }

    /// Returns the local space corners of the tightest box around the shape.
    pub fn local_bounds(&self) -> (Point3<f32>, Point3<f32>) {
        let half = match *self {
            Shape::Sphere { radius } => Vector3::new(radius, radius, radius),
            Shape::Box { half_extents } => half_extents,
            Shape::Capsule { radius, half_height } => {
                Vector3::new(radius, half_height + radius, radius)
            },
            Shape::Cylinder { radius, half_height } => Vector3::new(radius, half_height, radius),
            Shape::ConvexHull { ref points } => {
                let first = points.first().cloned().unwrap_or_else(Point3::origin);
                let (mut min, mut max) = (first, first);
                for p in points.iter() {
                    min = Point3::new(min.x.min(p.x), min.y.min(p.y), min.z.min(p.z));
                    max = Point3::new(max.x.max(p.x), max.y.max(p.y), max.z.max(p.z));
                }
                return (min, max);
            },
        };
        (Point3::from_vec(-half), Point3::from_vec(half))
    }

    pub fn volume(&self) -> f32 {
        use std::f32::consts::PI;
        match *self {
            Shape::Sphere { radius } => 4.0 / 3.0 * PI * radius * radius * radius,
            Shape::Box { half_extents: h } => 8.0 * h.x * h.y * h.z,
            Shape::Capsule { radius, half_height } => {
                PI * radius * radius * (2.0 * half_height + 4.0 / 3.0 * radius)
            },
            Shape::Cylinder { radius, half_height } => PI * radius * radius * 2.0 * half_height,
            Shape::ConvexHull { .. } => {
                let (min, max) = self.local_bounds();
                let d = max - min;
                (d.x * d.y * d.z).max(MIN_DIMENSION * MIN_DIMENSION * MIN_DIMENSION)
            },
        }
    }

    /// Computes the inertia tensor of the shape about its center of mass for
    /// the given mass, along with the local center of mass.
    pub fn compute_inertia(&self, mass: f32) -> (Matrix3<f32>, Point3<f32>) {
        match *self {
            Shape::Sphere { radius } => {
                let i = 0.4 * mass * radius * radius;
                (diagonal(i, i, i), Point3::origin())
            },
            Shape::Box { half_extents: h } => {
                let (x2, y2, z2) = (4.0 * h.x * h.x, 4.0 * h.y * h.y, 4.0 * h.z * h.z);
                let k = mass / 12.0;
                (diagonal(k * (y2 + z2), k * (x2 + z2), k * (x2 + y2)), Point3::origin())
            },
            Shape::Capsule { radius: r, half_height } => {
                let h = 2.0 * half_height;
                // Distribute the mass between the hemispheres and cylinder by volume.
                let cylinder_volume = h;
                let sphere_volume = 4.0 / 3.0 * r;
                let mc = mass * cylinder_volume / (cylinder_volume + sphere_volume);
                let ms = mass - mc;
                let ic_x = mc * (h * h / 12.0 + r * r / 4.0);
                let ic_y = 0.5 * mc * r * r;
                // Both hemispheres, shifted out to the ends of the cylinder.
                let is_x = ms * (0.4 * r * r + h * h / 4.0 + 3.0 * h * r / 8.0);
                let is_y = 0.4 * ms * r * r;
                let i_x = ic_x + is_x;
                (diagonal(i_x, ic_y + is_y, i_x), Point3::origin())
            },
            Shape::Cylinder { radius: r, half_height } => {
                let h = 2.0 * half_height;
                let i_x = 0.25 * mass * r * r + mass * h * h / 12.0;
                (diagonal(i_x, 0.5 * mass * r * r, i_x), Point3::origin())
            },
            Shape::ConvexHull { ref points } => {
                let n = points.len().max(1) as f32;
                let centroid = Point3::from_vec(
                    points.iter().fold(Vector3::zero(), |sum, p| sum + p.to_vec()) / n
                );
                let m = mass / n;
                let tensor = points.iter().fold(Matrix3::zero(), |tensor_sum, p| {
                    let disp = *p - centroid;
                    let outer_prod = Matrix3::from_cols(
                        disp * disp.x,
                        disp * disp.y,
                        disp * disp.z
                    );
                    tensor_sum + (Matrix3::identity() * disp.magnitude2() - outer_prod) * m
                });
                // Keep flat or single point hulls invertible.
                let floor = 0.4 * mass * MIN_DIMENSION * MIN_DIMENSION;
                (tensor + Matrix3::identity() * floor, centroid)
            },
        }
    }
}

fn unit_or_x(dir: Vector3<f32>) -> Vector3<f32> {
    let len2 = dir.magnitude2();
    if len2 > COLLISION_EPSILON * COLLISION_EPSILON {
        dir / len2.sqrt()
    } else {
        Vector3::unit_x()
    }
}

fn diagonal(x: f32, y: f32, z: f32) -> Matrix3<f32> {
    Matrix3::new(x, 0.0, 0.0, 0.0, y, 0.0, 0.0, 0.0, z)
}
