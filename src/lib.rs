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


//! A real-time 3D rigid body physics core.
//!
//! # Overview
//!
//! A `World` owns a set of `RigidBody`s and advances them with `World::step`.
//! Each step runs the same pipeline:
//!
//! - Gravity and damping are applied to the velocities of dynamic bodies.
//! - Every body's world space `Aabb` is refreshed in a `DynamicTree`, a
//!   height balanced bounding volume hierarchy.
//! - A `PairGenerator` reads the unique overlapping pairs out of the tree.
//!   Pairs without a dynamic body, or rejected by `CollisionGroups`, are
//!   dropped.
//! - `collide` produces a `ContactManifold` per touching pair. Sphere pairs
//!   are solved in closed form; everything else goes through GJK and EPA.
//! - The `ContactSolver` resolves the contacts with sequential impulses,
//!   warm started from the impulses the `ContactCache` kept from the last
//!   step.
//! - Positions and orientations are integrated.
//!
//! The pieces are usable on their own: the tree, the narrowphase and the
//! solver do not depend on `World`.

pub extern crate cgmath;
extern crate smallvec;

mod bvh;
pub use bvh::*;

mod bounds;
pub use bounds::*;

pub mod bitset;

mod body;
pub use body::*;

mod gjk;
pub use gjk::*;

mod manifold;
pub use manifold::*;

mod narrowphase;
pub use narrowphase::*;

mod pairs;
pub use pairs::*;

mod pool;
pub use pool::*;

mod shape;
pub use shape::*;

mod simplex;
pub use simplex::*;

mod solver;
pub use solver::*;

mod transform;
pub use transform::*;

mod world;
pub use world::*;
