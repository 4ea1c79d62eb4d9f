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

use cgmath::prelude::*;
use cgmath::{Point3, Vector3};

use crate::bounds::COLLISION_EPSILON;
use crate::gjk;
use crate::manifold::{ContactManifold, ContactPoint};
use crate::shape::Shape;
use crate::transform::Transform;

/// Computes the contact manifold between two placed shapes, or `None` if they
/// do not touch. The manifold normal points from A to B.
///
/// Sphere-sphere, sphere-box and sphere-capsule pairs (in either order) are
/// solved in closed form. Every other pair goes through GJK and EPA and yields
/// a single contact at the deepest point.
pub fn collide(
    shape_a: &Shape,
    transform_a: &Transform,
    shape_b: &Shape,
    transform_b: &Transform,
) -> Option<ContactManifold> {
    let contact = match (shape_a, shape_b) {
        (&Shape::Sphere { radius: ra }, &Shape::Sphere { radius: rb }) => {
            sphere_sphere(transform_a.position, ra, transform_b.position, rb)
        },
        (&Shape::Sphere { radius }, &Shape::Box { half_extents }) => {
            sphere_box(transform_a.position, radius, half_extents, transform_b)
        },
        (&Shape::Box { half_extents }, &Shape::Sphere { radius }) => {
            sphere_box(transform_b.position, radius, half_extents, transform_a)
                .map(ContactPoint::flipped)
        },
        (&Shape::Sphere { radius }, &Shape::Capsule { radius: cap_radius, half_height }) => {
            sphere_capsule(transform_a.position, radius, cap_radius, half_height, transform_b)
        },
        (&Shape::Capsule { radius: cap_radius, half_height }, &Shape::Sphere { radius }) => {
            sphere_capsule(transform_b.position, radius, cap_radius, half_height, transform_a)
                .map(ContactPoint::flipped)
        },
        _ => {
            gjk::intersect(shape_a, transform_a, shape_b, transform_b).map(|p| {
                ContactPoint::new(p.point_a.midpoint(p.point_b), p.normal, p.depth)
            })
        },
    }?;
    let mut manifold = ContactManifold::new();
    manifold.push(contact);
    Some(manifold)
}

/// Contact between two spheres. Coincident centers separate along +Y.
pub fn sphere_sphere(
    center_a: Point3<f32>,
    radius_a: f32,
    center_b: Point3<f32>,
    radius_b: f32,
) -> Option<ContactPoint> {
    let d = center_b - center_a;
    let dist_sq = d.magnitude2();
    let sum = radius_a + radius_b;
    if dist_sq > sum * sum {
        return None;
    }
    let dist = dist_sq.sqrt();
    let normal = if dist > COLLISION_EPSILON {
        d / dist
    } else {
        Vector3::unit_y()
    };
    let surface_a = center_a + normal * radius_a;
    let surface_b = center_b - normal * radius_b;
    Some(ContactPoint::new(surface_a.midpoint(surface_b), normal, sum - dist))
}

/// Contact between a sphere (A) and an oriented box (B).
pub fn sphere_box(
    center: Point3<f32>,
    radius: f32,
    half_extents: Vector3<f32>,
    box_transform: &Transform,
) -> Option<ContactPoint> {
    let p = box_transform.inverse_transform_point(center);
    let closest = Point3::new(
        p.x.max(-half_extents.x).min(half_extents.x),
        p.y.max(-half_extents.y).min(half_extents.y),
        p.z.max(-half_extents.z).min(half_extents.z),
    );
    let d = p - closest;
    let dist_sq = d.magnitude2();

    // Normal from the box out towards the sphere, in box space.
    let (local_normal, box_point, depth) = if dist_sq > COLLISION_EPSILON * COLLISION_EPSILON {
        if dist_sq > radius * radius {
            return None;
        }
        let dist = dist_sq.sqrt();
        (d / dist, closest, radius - dist)
    } else {
        // The center is inside the box: push out through the nearest face.
        let gaps = [
            half_extents.x - p.x.abs(),
            half_extents.y - p.y.abs(),
            half_extents.z - p.z.abs(),
        ];
        let mut axis = 0;
        for i in 1..3 {
            if gaps[i] < gaps[axis] {
                axis = i;
            }
        }
        let sign = if p[axis] >= 0.0 { 1.0 } else { -1.0 };
        let mut normal = Vector3::zero();
        normal[axis] = sign;
        let mut face_point = p;
        face_point[axis] = sign * half_extents[axis];
        (normal, face_point, radius + gaps[axis])
    };

    let normal = box_transform.transform_vector(local_normal);
    let box_point = box_transform.transform_point(box_point);
    let sphere_point = center - normal * radius;
    // A to B runs from the sphere into the box.
    Some(ContactPoint::new(sphere_point.midpoint(box_point), -normal, depth))
}

/// Contact between a sphere (A) and a Y-aligned capsule (B).
pub fn sphere_capsule(
    center: Point3<f32>,
    radius: f32,
    capsule_radius: f32,
    half_height: f32,
    capsule_transform: &Transform,
) -> Option<ContactPoint> {
    let axis = capsule_transform.transform_vector(Vector3::new(0.0, half_height, 0.0));
    let top = capsule_transform.position + axis;
    let bottom = capsule_transform.position - axis;
    let segment = top - bottom;
    let t = ((center - bottom).dot(segment) / segment.magnitude2()).max(0.0).min(1.0);
    let on_axis = bottom + segment * t;
    sphere_sphere(center, radius, on_axis, capsule_radius)
}
