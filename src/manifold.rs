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

use std::collections::HashMap;

use cgmath::prelude::*;
use cgmath::{Point3, Vector3};
use smallvec::SmallVec;

use crate::body::BodyHandle;

/// Maximum number of points a manifold holds.
pub const MAX_CONTACT_POINTS: usize = 4;

/// Maximum distance between a new contact point and one from the previous
/// step for the new point to inherit its impulses.
pub const WARM_START_DISTANCE: f32 = 0.1;

/// A single point of contact between two bodies.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct ContactPoint {
    /// World space position of the contact.
    pub position: Point3<f32>,
    /// Unit normal pointing from the first body to the second.
    pub normal: Vector3<f32>,
    /// Non-negative penetration depth along the normal.
    pub penetration: f32,
    /// Accumulated normal impulse.
    pub normal_impulse: f32,
    /// Accumulated friction impulses along the two tangent directions.
    pub tangent_impulse: [f32; 2],
}

impl ContactPoint {
    pub fn new(position: Point3<f32>, normal: Vector3<f32>, penetration: f32) -> Self {
        ContactPoint {
            position,
            normal,
            penetration: penetration.max(0.0),
            normal_impulse: 0.0,
            tangent_impulse: [0.0, 0.0],
        }
    }

    /// Returns the same contact seen from the other body.
    pub fn flipped(self) -> Self {
        ContactPoint {
            normal: -self.normal,
            ..self
        }
    }
}

/// The contact points between one ordered pair of bodies, sharing an
/// averaged normal.
#[derive(Clone, Debug, PartialEq)]
pub struct ContactManifold {
    points: SmallVec<[ContactPoint; MAX_CONTACT_POINTS]>,
    normal: Vector3<f32>,
}

impl Default for ContactManifold {
    fn default() -> Self {
        ContactManifold::new()
    }
}

impl ContactManifold {
    pub fn new() -> Self {
        ContactManifold {
            points: SmallVec::new(),
            normal: Vector3::unit_y(),
        }
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn points(&self) -> &[ContactPoint] {
        &self.points
    }

    pub fn points_mut(&mut self) -> &mut [ContactPoint] {
        &mut self.points
    }

    /// The average of the point normals, or +Y for an empty manifold.
    pub fn normal(&self) -> Vector3<f32> {
        self.normal
    }

    /// Adds a point if there is room for it. Returns whether it was added.
    pub fn push(&mut self, point: ContactPoint) -> bool {
        if self.points.len() >= MAX_CONTACT_POINTS {
            return false;
        }
        self.points.push(point);
        let sum = self.points.iter().fold(Vector3::zero(), |sum, p| sum + p.normal);
        self.normal = if sum.magnitude2() > 0.0 {
            sum.normalize()
        } else {
            self.points[0].normal
        };
        true
    }

    /// Returns the same manifold seen from the other body.
    pub fn flipped(mut self) -> Self {
        for p in self.points.iter_mut() {
            *p = p.flipped();
        }
        self.normal = -self.normal;
        self
    }

    /// Carries the accumulated impulses of `previous` over to the points of
    /// this manifold. Each new point takes the impulses of the nearest old
    /// point within `WARM_START_DISTANCE`; no old point is used twice.
    pub fn inherit_impulses(&mut self, previous: &ContactManifold) {
        let max_dist_sq = WARM_START_DISTANCE * WARM_START_DISTANCE;
        let mut claimed = [false; MAX_CONTACT_POINTS];
        for point in self.points.iter_mut() {
            let mut best: Option<(usize, f32)> = None;
            for (j, old) in previous.points.iter().enumerate() {
                if claimed[j] {
                    continue;
                }
                let dist_sq = (old.position - point.position).magnitude2();
                if dist_sq > max_dist_sq {
                    continue;
                }
                match best {
                    Some((_, best_sq)) if best_sq <= dist_sq => {},
                    _ => best = Some((j, dist_sq)),
                }
            }
            if let Some((j, _)) = best {
                claimed[j] = true;
                let old = &previous.points[j];
                point.normal_impulse = old.normal_impulse;
                point.tangent_impulse = old.tangent_impulse;
            }
        }
    }
}

/// Identifies the manifold of one ordered pair of bodies.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PairKey {
    pub a: BodyHandle,
    pub b: BodyHandle,
}

impl PairKey {
    pub fn new(a: BodyHandle, b: BodyHandle) -> Self {
        PairKey { a, b }
    }

    pub fn involves(&self, body: BodyHandle) -> bool {
        self.a == body || self.b == body
    }
}

/// Manifolds from the previous step, kept so their accumulated impulses can
/// warm start the solver.
#[derive(Clone, Debug, Default)]
pub struct ContactCache {
    entries: HashMap<PairKey, ContactManifold>,
}

impl ContactCache {
    pub fn new() -> Self {
        ContactCache::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, key: &PairKey) -> Option<&ContactManifold> {
        self.entries.get(key)
    }

    /// Seeds `manifold` with the impulses cached for its pair. Returns true if
    /// the pair was in contact on the previous step.
    pub fn warm_start(&self, key: &PairKey, manifold: &mut ContactManifold) -> bool {
        match self.entries.get(key) {
            Some(previous) => {
                manifold.inherit_impulses(previous);
                true
            },
            None => false,
        }
    }

    /// Replaces the cache with this step's manifolds. Pairs that are no
    /// longer touching are dropped.
    pub fn update(&mut self, manifolds: &[(PairKey, ContactManifold)]) {
        self.entries.clear();
        for (key, manifold) in manifolds {
            self.entries.insert(*key, manifold.clone());
        }
    }

    /// Drops every entry involving the body.
    pub fn remove_body(&mut self, body: BodyHandle) {
        self.entries.retain(|key, _| !key.involves(body));
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

#[cfg(test)]
mod tests {
    mod manifold {
        use approx::assert_relative_eq;
        use cgmath::{InnerSpace, Point3, Vector3};

        use crate::body::BodyHandle;
        use crate::manifold::*;

        fn contact(x: f32, normal_impulse: f32) -> ContactPoint {
            let mut c = ContactPoint::new(Point3::new(x, 0.0, 0.0), Vector3::new(0.0, 1.0, 0.0), 0.1);
            c.normal_impulse = normal_impulse;
            c.tangent_impulse = [normal_impulse * 0.5, 0.0];
            c
        }

        #[test]
        fn test_capacity() {
            let mut m = ContactManifold::new();
            for i in 0..MAX_CONTACT_POINTS {
                assert!(m.push(contact(i as f32, 0.0)));
            }
            assert!(!m.push(contact(10.0, 0.0)));
            assert_eq!(m.len(), MAX_CONTACT_POINTS);
        }

        #[test]
        fn test_averaged_normal() {
            let mut m = ContactManifold::new();
            assert_eq!(m.normal(), Vector3::new(0.0, 1.0, 0.0));
            m.push(ContactPoint::new(Point3::new(0.0, 0.0, 0.0), Vector3::new(1.0, 0.0, 0.0), 0.0));
            m.push(ContactPoint::new(Point3::new(1.0, 0.0, 0.0), Vector3::new(0.0, 1.0, 0.0), 0.0));
            assert_relative_eq!(m.normal(), Vector3::new(1.0, 1.0, 0.0).normalize());
            let flipped = m.flipped();
            assert_relative_eq!(flipped.normal(), -Vector3::new(1.0, 1.0, 0.0).normalize());
            assert_eq!(flipped.points()[0].normal, Vector3::new(-1.0, 0.0, 0.0));
        }

        #[test]
        fn test_negative_penetration_clamped() {
            let c = ContactPoint::new(Point3::new(0.0, 0.0, 0.0), Vector3::new(0.0, 1.0, 0.0), -1.0);
            assert_eq!(c.penetration, 0.0);
        }

        #[test]
        fn test_inherit_nearest() {
            let mut old = ContactManifold::new();
            old.push(contact(0.0, 1.0));
            old.push(contact(1.0, 2.0));

            let mut new = ContactManifold::new();
            new.push(contact(1.05, 0.0));
            new.push(contact(0.02, 0.0));
            new.push(contact(5.0, 0.0));
            new.inherit_impulses(&old);

            assert_eq!(new.points()[0].normal_impulse, 2.0);
            assert_eq!(new.points()[0].tangent_impulse, [1.0, 0.0]);
            assert_eq!(new.points()[1].normal_impulse, 1.0);
            // Too far from anything to inherit.
            assert_eq!(new.points()[2].normal_impulse, 0.0);
        }

        #[test]
        fn test_old_points_claimed_once() {
            let mut old = ContactManifold::new();
            old.push(contact(0.0, 3.0));

            let mut new = ContactManifold::new();
            new.push(contact(0.01, 0.0));
            new.push(contact(0.02, 0.0));
            new.inherit_impulses(&old);
            assert_eq!(new.points()[0].normal_impulse, 3.0);
            assert_eq!(new.points()[1].normal_impulse, 0.0);
        }

        #[test]
        fn test_cache() {
            let key = PairKey::new(BodyHandle(0), BodyHandle(1));
            let other = PairKey::new(BodyHandle(2), BodyHandle(3));
            let mut solved = ContactManifold::new();
            solved.push(contact(0.0, 4.0));

            let mut cache = ContactCache::new();
            cache.update(&[(key, solved.clone()), (other, solved.clone())]);
            assert_eq!(cache.len(), 2);

            let mut fresh = ContactManifold::new();
            fresh.push(contact(0.0, 0.0));
            assert!(cache.warm_start(&key, &mut fresh));
            assert_eq!(fresh.points()[0].normal_impulse, 4.0);

            cache.remove_body(BodyHandle(3));
            assert!(cache.get(&other).is_none());
            // Pairs missing from a step are evicted.
            cache.update(&[]);
            assert!(cache.is_empty());
            let mut fresh = ContactManifold::new();
            fresh.push(contact(0.0, 0.0));
            assert!(!cache.warm_start(&key, &mut fresh));
            assert_eq!(fresh.points()[0].normal_impulse, 0.0);
        }
    }
}
