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
use cgmath::{Matrix3, Point3, Vector3};
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use tracing::debug;

use crate::body::{BodyHandle, RigidBody, Velocity};
use crate::manifold::{ContactManifold, PairKey, MAX_CONTACT_POINTS};
use crate::pool::Pool;

/// Relative normal speed below which restitution adds a bounce target.
/// Slower impacts come to rest instead of jittering.
pub const RESTITUTION_VELOCITY_THRESHOLD: f32 = 1.0;

/// How two per-body material coefficients are mixed into one per contact.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum CombineMode {
    Max,
    Min,
    Multiply,
    Average,
}

impl CombineMode {
    pub fn combine(self, a: f32, b: f32) -> f32 {
        match self {
            CombineMode::Max => a.max(b),
            CombineMode::Min => a.min(b),
            CombineMode::Multiply => a * b,
            CombineMode::Average => (a + b) * 0.5,
        }
    }
}

/// Tuning parameters of the contact solver.
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SolverSettings {
    /// Number of Gauss-Seidel passes per step.
    pub iterations: usize,
    /// Penetration tolerated before the bias pushes bodies apart.
    pub penetration_slop: f32,
    /// Fraction of the excess penetration removed per step.
    pub baumgarte: f32,
    pub friction_combine: CombineMode,
    pub restitution_combine: CombineMode,
}

impl Default for SolverSettings {
    fn default() -> Self {
        SolverSettings {
            iterations: 10,
            penetration_slop: 0.01,
            baumgarte: 0.2,
            friction_combine: CombineMode::Multiply,
            restitution_combine: CombineMode::Max,
        }
    }
}

/// The parts of a body the solver reads but never writes.
#[derive(Copy, Clone, Debug)]
pub struct BodyInfo {
    /// World space center of mass.
    pub center: Point3<f32>,
    pub inv_mass: f32,
    /// World space inverse inertia tensor.
    pub inv_inertia: Matrix3<f32>,
    pub friction: f32,
    pub restitution: f32,
}

impl<'a> From<&'a RigidBody> for BodyInfo {
    fn from(body: &'a RigidBody) -> Self {
        BodyInfo {
            center: body.world_center_of_mass(),
            inv_mass: body.inverse_mass(),
            inv_inertia: body.inverse_inertia_world(),
            friction: body.material.friction,
            restitution: body.material.restitution,
        }
    }
}

/// A collection of bodies the solver can read and write velocities on.
pub trait BodySet {
    /// Returns the velocity and the constant data of a body, or `None` if the
    /// handle is not in the set.
    fn get(&self, body: BodyHandle) -> Option<(Velocity, BodyInfo)>;

    /// Overwrites the velocity of a body. Unknown handles are ignored.
    fn set(&mut self, body: BodyHandle, velocity: Velocity);
}

fn set_body_velocity(body: &mut RigidBody, velocity: Velocity) {
    if body.inverse_mass() > 0.0 {
        body.linear_velocity = velocity.linear;
        body.angular_velocity = velocity.angular;
    }
}

impl BodySet for Vec<RigidBody> {
    fn get(&self, body: BodyHandle) -> Option<(Velocity, BodyInfo)> {
        self.as_slice().get(body.0).map(|b| (b.velocity(), BodyInfo::from(b)))
    }

    fn set(&mut self, body: BodyHandle, velocity: Velocity) {
        if let Some(b) = self.as_mut_slice().get_mut(body.0) {
            set_body_velocity(b, velocity);
        }
    }
}

impl BodySet for Pool<RigidBody> {
    fn get(&self, body: BodyHandle) -> Option<(Velocity, BodyInfo)> {
        Pool::get(self, body.0).map(|b| (b.velocity(), BodyInfo::from(b)))
    }

    fn set(&mut self, body: BodyHandle, velocity: Velocity) {
        if let Some(b) = self.get_mut(body.0) {
            set_body_velocity(b, velocity);
        }
    }
}

/// Computes two unit tangents that form an orthonormal basis with `normal`.
pub fn compute_basis(normal: Vector3<f32>) -> [Vector3<f32>; 2] {
    let b = if normal.x.abs() >= 0.57735 {
        Vector3::new(normal.y, -normal.x, 0.0)
    } else {
        Vector3::new(0.0, normal.z, -normal.y)
    };
    let b = if b.magnitude2() > 0.0 {
        b.normalize()
    } else {
        Vector3::unit_x()
    };
    [b, normal.cross(b)]
}

#[derive(Copy, Clone, Debug)]
struct ContactState {
    ra: Vector3<f32>,
    rb: Vector3<f32>,
    normal: Vector3<f32>,
    tangents: [Vector3<f32>; 2],
    bias: f32,
    normal_mass: f32,
    tangent_mass: [f32; 2],
    normal_impulse: f32,
    tangent_impulse: [f32; 2],
}

#[derive(Clone, Debug)]
struct ContactConstraint {
    body_a: BodyHandle,
    body_b: BodyHandle,
    manifold: usize,
    friction: f32,
    inv_mass_a: f32,
    inv_mass_b: f32,
    inv_inertia_a: Matrix3<f32>,
    inv_inertia_b: Matrix3<f32>,
    states: SmallVec<[ContactState; MAX_CONTACT_POINTS]>,
}

impl ContactConstraint {
    /// Applies `impulse` at the given contact, pushing B along it and A
    /// against it.
    fn apply(&self, state: &ContactState, impulse: Vector3<f32>, va: &mut Velocity, vb: &mut Velocity) {
        va.linear -= impulse * self.inv_mass_a;
        va.angular -= self.inv_inertia_a * state.ra.cross(impulse);
        vb.linear += impulse * self.inv_mass_b;
        vb.angular += self.inv_inertia_b * state.rb.cross(impulse);
    }
}

fn relative_velocity(state: &ContactState, va: &Velocity, vb: &Velocity) -> Vector3<f32> {
    vb.linear + vb.angular.cross(state.rb) - va.linear - va.angular.cross(state.ra)
}

fn effective_mass(
    inv_mass_a: f32,
    inv_inertia_a: &Matrix3<f32>,
    ra: Vector3<f32>,
    inv_mass_b: f32,
    inv_inertia_b: &Matrix3<f32>,
    rb: Vector3<f32>,
    dir: Vector3<f32>,
) -> f32 {
    let ra_cd = ra.cross(dir);
    let rb_cd = rb.cross(dir);
    let k = inv_mass_a + inv_mass_b
        + ra_cd.dot(*inv_inertia_a * ra_cd)
        + rb_cd.dot(*inv_inertia_b * rb_cd);
    if k > 0.0 {
        1.0 / k
    } else {
        0.0
    }
}

/// Sequential impulse solver for contact constraints.
///
/// A step runs `build`, `warm_start` and `solve` in that order, then hands the
/// accumulated impulses back to the manifolds with `store_impulses` so the
/// next step can warm start from them.
#[derive(Clone, Debug, Default)]
pub struct ContactSolver {
    settings: SolverSettings,
    constraints: Vec<ContactConstraint>,
}

impl ContactSolver {
    pub fn new(settings: SolverSettings) -> Self {
        ContactSolver {
            settings,
            constraints: Vec::new(),
        }
    }

    pub fn configure(&mut self, settings: SolverSettings) {
        if settings != self.settings {
            debug!(?settings, "solver reconfigured");
            self.settings = settings;
        }
    }

    pub fn settings(&self) -> &SolverSettings {
        &self.settings
    }

    /// Number of contact points currently held.
    pub fn num_contacts(&self) -> usize {
        self.constraints.iter().map(|c| c.states.len()).sum()
    }

    /// Prepares one constraint per manifold. Accumulated impulses already in
    /// the manifold points are kept as the starting guess. Pairs naming a
    /// body missing from `bodies` are skipped.
    pub fn build<B: BodySet>(&mut self, bodies: &B, manifolds: &[(PairKey, ContactManifold)], inv_dt: f32) {
        self.constraints.clear();
        for (index, (key, manifold)) in manifolds.iter().enumerate() {
            let (va, a) = match bodies.get(key.a) {
                Some(body) => body,
                None => continue,
            };
            let (vb, b) = match bodies.get(key.b) {
                Some(body) => body,
                None => continue,
            };
            let friction = self.settings.friction_combine.combine(a.friction, b.friction);
            let restitution = self.settings.restitution_combine.combine(a.restitution, b.restitution);

            let mut states = SmallVec::new();
            for point in manifold.points() {
                let normal = point.normal;
                let ra = point.position - a.center;
                let rb = point.position - b.center;
                let tangents = compute_basis(normal);
                let mut state = ContactState {
                    ra,
                    rb,
                    normal,
                    tangents,
                    bias: 0.0,
                    normal_mass: effective_mass(a.inv_mass, &a.inv_inertia, ra, b.inv_mass, &b.inv_inertia, rb, normal),
                    tangent_mass: [
                        effective_mass(a.inv_mass, &a.inv_inertia, ra, b.inv_mass, &b.inv_inertia, rb, tangents[0]),
                        effective_mass(a.inv_mass, &a.inv_inertia, ra, b.inv_mass, &b.inv_inertia, rb, tangents[1]),
                    ],
                    normal_impulse: point.normal_impulse,
                    tangent_impulse: point.tangent_impulse,
                };
                let vn = relative_velocity(&state, &va, &vb).dot(normal);
                state.bias = self.settings.baumgarte
                    * inv_dt
                    * (point.penetration - self.settings.penetration_slop).max(0.0);
                // A bouncing contact already separates faster than the
                // positional correction asks for.
                if vn < -RESTITUTION_VELOCITY_THRESHOLD {
                    state.bias = state.bias.max(-restitution * vn);
                }
                states.push(state);
            }

            self.constraints.push(ContactConstraint {
                body_a: key.a,
                body_b: key.b,
                manifold: index,
                friction,
                inv_mass_a: a.inv_mass,
                inv_mass_b: b.inv_mass,
                inv_inertia_a: a.inv_inertia,
                inv_inertia_b: b.inv_inertia,
                states,
            });
        }
    }

    /// Applies the carried over impulses of every contact.
    pub fn warm_start<B: BodySet>(&mut self, bodies: &mut B) {
        for constraint in self.constraints.iter() {
            let (mut va, mut vb) = match (bodies.get(constraint.body_a), bodies.get(constraint.body_b)) {
                (Some((va, _)), Some((vb, _))) => (va, vb),
                _ => continue,
            };
            for state in constraint.states.iter() {
                let impulse = state.normal * state.normal_impulse
                    + state.tangents[0] * state.tangent_impulse[0]
                    + state.tangents[1] * state.tangent_impulse[1];
                constraint.apply(state, impulse, &mut va, &mut vb);
            }
            bodies.set(constraint.body_a, va);
            bodies.set(constraint.body_b, vb);
        }
    }

    /// Runs `iterations` Gauss-Seidel passes over every contact.
    pub fn solve<B: BodySet>(&mut self, bodies: &mut B, iterations: usize) {
        for _ in 0..iterations {
            for constraint in self.constraints.iter_mut() {
                let (mut va, mut vb) = match (bodies.get(constraint.body_a), bodies.get(constraint.body_b)) {
                    (Some((va, _)), Some((vb, _))) => (va, vb),
                    _ => continue,
                };
                let mut states = constraint.states.clone();
                for state in states.iter_mut() {
                    // Normal impulse, never pulling the bodies together.
                    let vn = relative_velocity(state, &va, &vb).dot(state.normal);
                    let lambda = state.normal_mass * (-vn + state.bias);
                    let prev = state.normal_impulse;
                    state.normal_impulse = (prev + lambda).max(0.0);
                    let impulse = state.normal * (state.normal_impulse - prev);
                    constraint.apply(state, impulse, &mut va, &mut vb);

                    // Friction, bounded by the current normal impulse.
                    let max_lambda = constraint.friction * state.normal_impulse;
                    for i in 0..2 {
                        let dv = relative_velocity(state, &va, &vb);
                        let lambda = -dv.dot(state.tangents[i]) * state.tangent_mass[i];
                        let prev = state.tangent_impulse[i];
                        state.tangent_impulse[i] = (prev + lambda).max(-max_lambda).min(max_lambda);
                        let impulse = state.tangents[i] * (state.tangent_impulse[i] - prev);
                        constraint.apply(state, impulse, &mut va, &mut vb);
                    }
                }
                constraint.states = states;
                bodies.set(constraint.body_a, va);
                bodies.set(constraint.body_b, vb);
            }
        }
    }

    /// Writes the accumulated impulses back into the manifolds the solver was
    /// built from.
    pub fn store_impulses(&self, manifolds: &mut [(PairKey, ContactManifold)]) {
        for constraint in self.constraints.iter() {
            let manifold = match manifolds.get_mut(constraint.manifold) {
                Some((_, manifold)) => manifold,
                None => continue,
            };
            for (point, state) in manifold.points_mut().iter_mut().zip(constraint.states.iter()) {
                point.normal_impulse = state.normal_impulse;
                point.tangent_impulse = state.tangent_impulse;
            }
        }
    }
}
