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

use cgmath::{Point3, Vector3};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, trace, warn};

use crate::body::{BodyHandle, RigidBody};
use crate::bounds::Aabb;
use crate::bvh::{BroadphaseError, DynamicTree};
use crate::manifold::{ContactCache, ContactManifold, PairKey};
use crate::narrowphase::collide;
use crate::pairs::PairGenerator;
use crate::pool::Pool;
use crate::solver::{ContactSolver, SolverSettings};

/// Errors returned by the world API.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum WorldError {
    #[error(transparent)]
    Broadphase(#[from] BroadphaseError),
    #[error("no body with handle {0:?}")]
    UnknownBody(BodyHandle),
}

/// Global simulation parameters.
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorldConfig {
    pub gravity: Vector3<f32>,
    pub solver: SolverSettings,
    /// When set to a positive count, replaces `solver.iterations`.
    pub solver_iterations: Option<usize>,
}

impl Default for WorldConfig {
    fn default() -> Self {
        WorldConfig {
            gravity: Vector3::new(0.0, -9.81, 0.0),
            solver: SolverSettings::default(),
            solver_iterations: None,
        }
    }
}

impl WorldConfig {
    /// The solver settings with the iteration override applied.
    pub fn effective_solver_settings(&self) -> SolverSettings {
        let mut settings = self.solver;
        match self.solver_iterations {
            Some(n) if n > 0 => settings.iterations = n,
            _ => {},
        }
        settings
    }
}

/// The closest body hit by `World::ray_cast`.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct RayHit {
    pub body: BodyHandle,
    /// Segment parameter at which the ray enters the body's box.
    pub distance: f32,
    pub point: Point3<f32>,
}

/// Owns the bodies and advances them through time.
#[derive(Clone, Debug)]
pub struct World {
    config: WorldConfig,
    bodies: Pool<RigidBody>,
    broadphase: DynamicTree<BodyHandle>,
    pairs: PairGenerator<BodyHandle>,
    solver: ContactSolver,
    cache: ContactCache,
    manifolds: Vec<(PairKey, ContactManifold)>,
}

impl Default for World {
    fn default() -> Self {
        World::new(WorldConfig::default())
    }
}

impl World {
    pub fn new(config: WorldConfig) -> Self {
        World {
            config,
            bodies: Pool::new(),
            broadphase: DynamicTree::new(),
            pairs: PairGenerator::new(),
            solver: ContactSolver::new(config.effective_solver_settings()),
            cache: ContactCache::new(),
            manifolds: Vec::new(),
        }
    }

    pub fn config(&self) -> &WorldConfig {
        &self.config
    }

    pub fn config_mut(&mut self) -> &mut WorldConfig {
        &mut self.config
    }

    pub fn set_gravity(&mut self, gravity: Vector3<f32>) {
        self.config.gravity = gravity;
    }

    pub fn len(&self) -> usize {
        self.bodies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bodies.is_empty()
    }

    /// Adds a body and returns its handle. Handles of removed bodies may be
    /// reused.
    pub fn add_body(&mut self, body: RigidBody) -> BodyHandle {
        let bounds = body.world_aabb();
        let handle = BodyHandle(self.bodies.push(body));
        let proxy = self.broadphase.insert(bounds, handle);
        self.bodies[handle.0].proxy = Some(proxy);
        debug!(?handle, proxy, "body added");
        handle
    }

    pub fn remove_body(&mut self, handle: BodyHandle) -> Result<RigidBody, WorldError> {
        let mut body = match self.bodies.remove(handle.0) {
            Some(body) => body,
            None => {
                warn!(?handle, "remove_body: unknown body");
                return Err(WorldError::UnknownBody(handle));
            },
        };
        if let Some(proxy) = body.proxy.take() {
            self.broadphase.remove(proxy)?;
        }
        self.cache.remove_body(handle);
        self.manifolds.retain(|(key, _)| !key.involves(handle));
        debug!(?handle, "body removed");
        Ok(body)
    }

    pub fn body(&self, handle: BodyHandle) -> Result<&RigidBody, WorldError> {
        self.bodies.get(handle.0).ok_or_else(|| {
            warn!(?handle, "body: unknown body");
            WorldError::UnknownBody(handle)
        })
    }

    /// Mutable access to a body. A moved body's box is refreshed on the
    /// next step.
    pub fn body_mut(&mut self, handle: BodyHandle) -> Result<&mut RigidBody, WorldError> {
        self.bodies.get_mut(handle.0).ok_or_else(|| {
            warn!(?handle, "body_mut: unknown body");
            WorldError::UnknownBody(handle)
        })
    }

    pub fn bodies(&self) -> impl Iterator<Item = (BodyHandle, &RigidBody)> {
        self.bodies.enumerate().map(|(i, body)| (BodyHandle(i), body))
    }

    /// Manifolds solved by the last step, with accumulated impulses.
    pub fn manifolds(&self) -> &[(PairKey, ContactManifold)] {
        &self.manifolds
    }

    /// Every body whose box overlaps `bounds`.
    pub fn query_aabb(&self, bounds: &Aabb) -> Vec<BodyHandle> {
        let mut found = Vec::new();
        self.broadphase.query(bounds, |_, &handle| found.push(handle));
        found
    }

    /// Casts the segment `origin + t * dir, t in [0, max_distance]` and returns
    /// the body whose box it enters first.
    pub fn ray_cast(&self, origin: Point3<f32>, dir: Vector3<f32>, max_distance: f32) -> Option<RayHit> {
        let mut best: Option<(BodyHandle, f32)> = None;
        self.broadphase.ray_cast(origin, dir, max_distance, |&handle, bounds| {
            let limit = best.map_or(max_distance, |(_, t)| t);
            if let Some((t, _)) = bounds.ray_interval(origin, dir, limit) {
                match best {
                    Some((_, best_t)) if best_t <= t => {},
                    _ => best = Some((handle, t)),
                }
            }
            true
        });
        best.map(|(body, distance)| RayHit {
            body,
            distance,
            point: origin + dir * distance,
        })
    }

    /// Advances the simulation by `dt` seconds. Non-positive steps do nothing.
    pub fn step(&mut self, dt: f32) {
        if !(dt > 0.0) {
            return;
        }

        let gravity = self.config.gravity;
        for body in self.bodies.iter_mut() {
            body.integrate_velocities(dt, gravity);
        }

        for body in self.bodies.iter() {
            if let Some(proxy) = body.proxy {
                if let Err(err) = self.broadphase.set_leaf_box(proxy, body.world_aabb()) {
                    warn!(%err, "stale broadphase proxy");
                }
            }
        }

        self.manifolds.clear();
        let pairs = self.pairs.generate(&self.broadphase);
        let num_pairs = pairs.len();
        for &(a, b) in pairs {
            let (body_a, body_b) = match (self.bodies.get(a.0), self.bodies.get(b.0)) {
                (Some(body_a), Some(body_b)) => (body_a, body_b),
                _ => continue,
            };
            if !body_a.is_dynamic() && !body_b.is_dynamic() {
                continue;
            }
            if !body_a.groups.interacts_with(&body_b.groups) {
                continue;
            }
            if let Some(mut manifold) = collide(&body_a.shape, &body_a.transform, &body_b.shape, &body_b.transform) {
                let key = PairKey::new(a, b);
                self.cache.warm_start(&key, &mut manifold);
                self.manifolds.push((key, manifold));
            }
        }

        let settings = self.config.effective_solver_settings();
        self.solver.configure(settings);
        self.solver.build(&self.bodies, &self.manifolds, 1.0 / dt);
        self.solver.warm_start(&mut self.bodies);
        self.solver.solve(&mut self.bodies, settings.iterations);
        self.solver.store_impulses(&mut self.manifolds);
        self.cache.update(&self.manifolds);

        for body in self.bodies.iter_mut() {
            body.integrate_transform(dt);
        }

        trace!(
            bodies = self.bodies.len(),
            pairs = num_pairs,
            manifolds = self.manifolds.len(),
            contacts = self.solver.num_contacts(),
            "step"
        );
    }
}
