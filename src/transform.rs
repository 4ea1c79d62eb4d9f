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
use cgmath::{Matrix3, Point3, Quaternion, Vector3};
use serde::{Deserialize, Serialize};

use crate::bounds::COLLISION_EPSILON;

/// A rigid transformation: a rotation about the local origin followed by a
/// translation.
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Transform {
    pub position: Point3<f32>,
    pub rotation: Quaternion<f32>,
}

impl Default for Transform {
    fn default() -> Self {
        Transform::identity()
    }
}

impl Transform {
    /// Creates a transform, normalizing the rotation. A rotation too close to
    /// zero to normalize is replaced by the identity.
    pub fn new(position: Point3<f32>, rotation: Quaternion<f32>) -> Self {
        let rotation = if rotation.magnitude2() < COLLISION_EPSILON {
            Quaternion::one()
        } else {
            rotation.normalize()
        };
        Transform { position, rotation }
    }

    pub fn identity() -> Self {
        Transform {
            position: Point3::origin(),
            rotation: Quaternion::one(),
        }
    }

    pub fn from_position(position: Point3<f32>) -> Self {
        Transform {
            position,
            rotation: Quaternion::one(),
        }
    }

    /// Maps a point from local space into world space.
    pub fn transform_point(&self, p: Point3<f32>) -> Point3<f32> {
        self.position + self.rotation.rotate_vector(p.to_vec())
    }

    /// Rotates a direction from local space into world space.
    pub fn transform_vector(&self, v: Vector3<f32>) -> Vector3<f32> {
        self.rotation.rotate_vector(v)
    }

    /// Maps a point from world space into local space.
    pub fn inverse_transform_point(&self, p: Point3<f32>) -> Point3<f32> {
        Point3::from_vec(self.inverse_transform_vector(p - self.position))
    }

    /// Rotates a direction from world space into local space.
    pub fn inverse_transform_vector(&self, v: Vector3<f32>) -> Vector3<f32> {
        self.rotation.conjugate().rotate_vector(v)
    }

    pub fn rotation_matrix(&self) -> Matrix3<f32> {
        Matrix3::from(self.rotation)
    }
}
