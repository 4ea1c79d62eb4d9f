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
use cgmath::{Matrix3, Point3, Quaternion, Rad, Vector3};
use serde::{Deserialize, Serialize};

use crate::bitset::FixedSizeBitSet;
use crate::bounds::Aabb;
use crate::shape::{Material, Shape};
use crate::transform::Transform;

/// Smallest determinant magnitude allowed when inverting an inertia tensor.
pub const MIN_INERTIA_DETERMINANT: f32 = 1e-8;

/// Angular speeds at or below this do not rotate a body.
pub const MIN_ANGULAR_SPEED: f32 = 1e-6;

/// A stable identifier for a body owned by a `World`.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BodyHandle(pub usize);

/// How a body responds to forces and contacts.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum MotionType {
    /// Never moves.
    Static,
    /// Moves with the velocity it is given but is unaffected by contacts and
    /// gravity.
    Kinematic,
    /// Fully simulated.
    Dynamic,
}

/// Collision filtering bits. Two bodies may collide only if each one's group
/// shares a bit with the other's mask.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CollisionGroups {
    pub group: u32,
    pub mask: u32,
}

impl CollisionGroups {
    pub const NONE: u32 = 0;
    pub const DEFAULT: u32 = 1 << 0;
    pub const STATIC: u32 = 1 << 1;
    pub const DYNAMIC: u32 = 1 << 2;
    pub const ALL: u32 = !0;

    pub fn new(group: u32, mask: u32) -> Self {
        CollisionGroups { group, mask }
    }

    /// The groups a freshly created body of the given motion type starts with.
    pub fn for_motion(motion_type: MotionType) -> Self {
        let group = match motion_type {
            MotionType::Static => CollisionGroups::STATIC,
            MotionType::Kinematic | MotionType::Dynamic => CollisionGroups::DYNAMIC,
        };
        CollisionGroups { group, mask: CollisionGroups::ALL }
    }

    /// Adds the body to a numbered layer.
    pub fn with_layer(mut self, layer: usize) -> Self {
        self.group.insert(layer);
        self
    }

    /// Stops the body from colliding with a numbered layer.
    pub fn without_mask_layer(mut self, layer: usize) -> Self {
        self.mask.remove(layer);
        self
    }

    pub fn interacts_with(&self, other: &CollisionGroups) -> bool {
        self.group.intersects(&other.mask) && other.group.intersects(&self.mask)
    }
}

impl Default for CollisionGroups {
    fn default() -> Self {
        CollisionGroups::for_motion(MotionType::Dynamic)
    }
}

/// Linear and angular velocity of a body.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Velocity {
    pub linear: Vector3<f32>,
    pub angular: Vector3<f32>,
}

/// A convex shape with mass, moving under gravity and contact impulses.
///
/// Bodies that are not dynamic, or that have been given a non-positive mass,
/// have zero inverse mass and inertia and are never moved by contacts.
#[derive(Clone, Debug)]
pub struct RigidBody {
    pub shape: Shape,
    pub material: Material,
    pub transform: Transform,
    pub linear_velocity: Vector3<f32>,
    pub angular_velocity: Vector3<f32>,
    pub linear_damping: f32,
    pub angular_damping: f32,
    pub awake: bool,
    pub groups: CollisionGroups,
    motion_type: MotionType,
    requested_mass: f32,
    mass: f32,
    inv_mass: f32,
    inertia_local: Matrix3<f32>,
    inv_inertia_world: Matrix3<f32>,
    center_of_mass_local: Point3<f32>,
    pub(crate) proxy: Option<usize>,
}

impl RigidBody {
    /// Creates a dynamic body.
    pub fn new(shape: Shape, mass: f32, transform: Transform) -> Self {
        RigidBody::with_motion(shape, mass, transform, MotionType::Dynamic)
    }

    pub fn with_motion(shape: Shape, mass: f32, transform: Transform, motion_type: MotionType) -> Self {
        let mut body = RigidBody {
            shape,
            material: Material::default(),
            transform,
            linear_velocity: Vector3::zero(),
            angular_velocity: Vector3::zero(),
            linear_damping: 0.01,
            angular_damping: 0.05,
            awake: true,
            groups: CollisionGroups::for_motion(motion_type),
            motion_type,
            requested_mass: mass,
            mass: 0.0,
            inv_mass: 0.0,
            inertia_local: Matrix3::zero(),
            inv_inertia_world: Matrix3::zero(),
            center_of_mass_local: Point3::origin(),
            proxy: None,
        };
        body.set_mass(mass);
        body
    }

    /// Creates a dynamic body whose mass follows from the material density.
    pub fn from_material(shape: Shape, material: Material, transform: Transform) -> Self {
        let mass = material.density * shape.volume();
        let mut body = RigidBody::new(shape, mass, transform);
        body.material = material;
        body
    }

    pub fn dynamic_sphere(radius: f32, mass: f32, transform: Transform) -> Self {
        RigidBody::new(Shape::sphere(radius), mass, transform)
    }

    pub fn static_box(half_extents: Vector3<f32>, transform: Transform) -> Self {
        RigidBody::with_motion(Shape::cuboid(half_extents), 0.0, transform, MotionType::Static)
    }

    pub fn motion_type(&self) -> MotionType {
        self.motion_type
    }

    pub fn is_dynamic(&self) -> bool {
        self.motion_type == MotionType::Dynamic
    }

    pub fn is_static(&self) -> bool {
        self.motion_type == MotionType::Static
    }

    pub fn mass(&self) -> f32 {
        self.mass
    }

    pub fn inverse_mass(&self) -> f32 {
        self.inv_mass
    }

    pub fn inertia_local(&self) -> Matrix3<f32> {
        self.inertia_local
    }

    pub fn inverse_inertia_world(&self) -> Matrix3<f32> {
        self.inv_inertia_world
    }

    pub fn center_of_mass_local(&self) -> Point3<f32> {
        self.center_of_mass_local
    }

    pub fn world_center_of_mass(&self) -> Point3<f32> {
        self.transform.transform_point(self.center_of_mass_local)
    }

    pub fn velocity(&self) -> Velocity {
        Velocity {
            linear: self.linear_velocity,
            angular: self.angular_velocity,
        }
    }

    /// Sets the mass and recomputes the inertia tensor from the shape. Bodies
    /// that are not dynamic, or masses that are not positive, yield a body
    /// with zero inverse mass.
    pub fn set_mass(&mut self, mass: f32) {
        self.requested_mass = mass;
        if self.motion_type != MotionType::Dynamic || !(mass > 0.0) {
            self.mass = 0.0;
            self.inv_mass = 0.0;
            self.inertia_local = Matrix3::zero();
            self.center_of_mass_local = Point3::origin();
        } else {
            let (inertia, com) = self.shape.compute_inertia(mass);
            self.mass = mass;
            self.inv_mass = 1.0 / mass;
            self.inertia_local = inertia;
            self.center_of_mass_local = com;
        }
        self.update_inertia_world();
    }

    /// Changes the motion type, rederiving mass properties from the last mass
    /// requested. Collision groups still at the old type's defaults follow the
    /// new type.
    pub fn set_motion_type(&mut self, motion_type: MotionType) {
        if self.groups == CollisionGroups::for_motion(self.motion_type) {
            self.groups = CollisionGroups::for_motion(motion_type);
        }
        self.motion_type = motion_type;
        if motion_type == MotionType::Static {
            self.linear_velocity = Vector3::zero();
            self.angular_velocity = Vector3::zero();
        }
        let mass = self.requested_mass;
        self.set_mass(mass);
    }

    /// Rotates the local inertia tensor into world space and inverts it.
    pub fn update_inertia_world(&mut self) {
        if self.inv_mass == 0.0 {
            self.inv_inertia_world = Matrix3::zero();
            return;
        }
        let r = self.transform.rotation_matrix();
        let world = r * self.inertia_local * r.transpose();
        self.inv_inertia_world = clamped_inverse(&world);
    }

    /// Applies an impulse at a world space point. Only dynamic bodies respond,
    /// and doing so wakes them.
    pub fn apply_impulse(&mut self, impulse: Vector3<f32>, point: Point3<f32>) {
        if !self.is_dynamic() {
            return;
        }
        let r = point - self.world_center_of_mass();
        self.linear_velocity += impulse * self.inv_mass;
        self.angular_velocity += self.inv_inertia_world * r.cross(impulse);
        self.awake = true;
    }

    /// Applies gravity and damping to the velocities of an awake dynamic body.
    pub fn integrate_velocities(&mut self, dt: f32, gravity: Vector3<f32>) {
        if !self.is_dynamic() || !self.awake {
            return;
        }
        self.linear_velocity += gravity * dt;
        self.linear_velocity *= (1.0 - self.linear_damping * dt).max(0.0);
        self.angular_velocity *= (1.0 - self.angular_damping * dt).max(0.0);
    }

    /// Advances the position and orientation by the current velocities.
    pub fn integrate_transform(&mut self, dt: f32) {
        if self.is_static() {
            return;
        }
        self.transform.position += self.linear_velocity * dt;
        let speed = self.angular_velocity.magnitude();
        if speed > MIN_ANGULAR_SPEED {
            let axis = self.angular_velocity / speed;
            let dq = Quaternion::from_axis_angle(axis, Rad(speed * dt));
            self.transform.rotation = (dq * self.transform.rotation).normalize();
            self.update_inertia_world();
        }
    }

    /// Returns the world space box around the body at its current transform.
    pub fn world_aabb(&self) -> Aabb {
        let (min, max) = self.shape.local_bounds();
        let center = self.transform.transform_point(min.midpoint(max));
        let half = (max - min) * 0.5;
        let r = self.transform.rotation_matrix();
        let abs = Matrix3::from_cols(abs_vec(r.x), abs_vec(r.y), abs_vec(r.z));
        Aabb::from_center_extents(center, abs * half)
    }
}

fn abs_vec(v: Vector3<f32>) -> Vector3<f32> {
    Vector3::new(v.x.abs(), v.y.abs(), v.z.abs())
}

/// Inverts a 3x3 matrix, clamping the determinant away from zero so the
/// result is always finite.
pub fn clamped_inverse(m: &Matrix3<f32>) -> Matrix3<f32> {
    let (c0, c1, c2) = (m.x, m.y, m.z);
    let r0 = c1.cross(c2);
    let r1 = c2.cross(c0);
    let r2 = c0.cross(c1);
    let mut det = c0.dot(r0);
    if det.abs() < MIN_INERTIA_DETERMINANT {
        det = if det < 0.0 { -MIN_INERTIA_DETERMINANT } else { MIN_INERTIA_DETERMINANT };
    }
    // The rows of the inverse are the cross products of the columns.
    Matrix3::from_cols(r0, r1, r2).transpose() / det
}

#[cfg(test)]
mod tests {
    mod body {
        use approx::assert_relative_eq;
        use cgmath::{Deg, Matrix3, Point3, Quaternion, Rotation3, SquareMatrix, Vector3, Zero};

        use crate::body::*;
        use crate::shape::Shape;
        use crate::transform::Transform;

        #[test]
        fn test_groups() {
            let a = CollisionGroups::default();
            let b = CollisionGroups::for_motion(MotionType::Static);
            assert!(a.interacts_with(&b));
            let blocked = CollisionGroups::new(CollisionGroups::DYNAMIC, CollisionGroups::NONE);
            assert!(!blocked.interacts_with(&a));
            assert!(!a.interacts_with(&blocked));
            let layered = CollisionGroups::new(0, CollisionGroups::ALL).with_layer(5);
            assert_eq!(layered.group, 1 << 5);
            let picky = CollisionGroups::default().without_mask_layer(5);
            assert!(!picky.interacts_with(&layered));
            assert!(picky.interacts_with(&a));
        }

        #[test]
        fn test_mass_properties() {
            let body = RigidBody::dynamic_sphere(1.0, 2.0, Transform::identity());
            assert_relative_eq!(body.inverse_mass(), 0.5);
            assert_relative_eq!(body.inverse_inertia_world(), Matrix3::from_value(1.25));

            let ground = RigidBody::static_box(Vector3::new(10.0, 1.0, 10.0), Transform::identity());
            assert_eq!(ground.inverse_mass(), 0.0);
            assert_eq!(ground.inverse_inertia_world(), Matrix3::zero());
            assert_eq!(ground.groups.group, CollisionGroups::STATIC);

            let massless = RigidBody::new(Shape::sphere(1.0), 0.0, Transform::identity());
            assert_eq!(massless.inverse_mass(), 0.0);
        }

        #[test]
        fn test_motion_type_round_trip() {
            let mut body = RigidBody::dynamic_sphere(1.0, 4.0, Transform::identity());
            body.linear_velocity = Vector3::new(1.0, 0.0, 0.0);
            body.set_motion_type(MotionType::Static);
            assert_eq!(body.inverse_mass(), 0.0);
            assert_eq!(body.linear_velocity, Vector3::zero());
            assert_eq!(body.groups, CollisionGroups::for_motion(MotionType::Static));
            body.set_motion_type(MotionType::Dynamic);
            assert_relative_eq!(body.mass(), 4.0);
            assert_eq!(body.groups, CollisionGroups::default());
        }

        #[test]
        fn test_apply_impulse() {
            let mut body = RigidBody::dynamic_sphere(1.0, 1.0, Transform::identity());
            body.apply_impulse(Vector3::new(1.0, 0.0, 0.0), body.transform.position);
            assert!(body.linear_velocity.x > 0.0);
            assert_eq!(body.angular_velocity, Vector3::zero());

            // Off center impulses spin the body.
            body.apply_impulse(Vector3::new(1.0, 0.0, 0.0), Point3::new(0.0, 1.0, 0.0));
            assert!(body.angular_velocity.z < 0.0);

            let mut ground = RigidBody::static_box(Vector3::new(1.0, 1.0, 1.0), Transform::identity());
            ground.apply_impulse(Vector3::new(1.0, 0.0, 0.0), Point3::new(0.0, 0.0, 0.0));
            assert_eq!(ground.linear_velocity, Vector3::zero());
        }

        #[test]
        fn test_integration() {
            let mut body = RigidBody::dynamic_sphere(1.0, 1.0, Transform::identity());
            body.linear_velocity = Vector3::new(1.0, 0.0, 0.0);
            body.integrate_transform(1.0);
            assert!(body.transform.position.x > 0.5);

            let mut body = RigidBody::dynamic_sphere(1.0, 1.0, Transform::identity());
            body.integrate_velocities(0.5, Vector3::new(0.0, -10.0, 0.0));
            assert_relative_eq!(body.linear_velocity.y, -5.0 * (1.0 - 0.005));

            let mut ground = RigidBody::static_box(Vector3::new(1.0, 1.0, 1.0), Transform::identity());
            ground.integrate_velocities(0.5, Vector3::new(0.0, -10.0, 0.0));
            ground.integrate_transform(0.5);
            assert_eq!(ground.transform, Transform::identity());

            let mut spinner = RigidBody::dynamic_sphere(1.0, 1.0, Transform::identity());
            spinner.angular_velocity = Vector3::new(0.0, std::f32::consts::PI, 0.0);
            spinner.integrate_transform(0.5);
            assert_relative_eq!(spinner.transform.rotation, Quaternion::from_angle_y(Deg(90.0)),
                                epsilon = 1e-5);
        }

        #[test]
        fn test_world_aabb() {
            let body = RigidBody::static_box(
                Vector3::new(2.0, 1.0, 1.0),
                Transform::new(Point3::new(1.0, 0.0, 0.0), Quaternion::from_angle_z(Deg(90.0))),
            );
            let aabb = body.world_aabb();
            assert_relative_eq!(aabb.min, Point3::new(0.0, -2.0, -1.0), epsilon = 1e-5);
            assert_relative_eq!(aabb.max, Point3::new(2.0, 2.0, 1.0), epsilon = 1e-5);
        }

        #[test]
        fn test_clamped_inverse() {
            let m = Matrix3::new(2.0, 0.0, 0.0, 0.0, 4.0, 0.0, 0.0, 0.0, 8.0);
            assert_relative_eq!(clamped_inverse(&m), m.invert().unwrap());
            let singular = Matrix3::zero();
            let inv = clamped_inverse(&singular);
            assert!(inv.x.x.is_finite() && inv.y.y.is_finite());
        }
    }
}
