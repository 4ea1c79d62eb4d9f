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

use std::fmt;

use cgmath::prelude::*;
use cgmath::{Point3, Vector3};

/// Squared lengths below this are treated as degenerate by the simplex.
pub const SIMPLEX_EPSILON: f32 = 1e-12;

/// A vertex of the Minkowski difference `A - B`, remembering the points on
/// each shape that produced it.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct SupportPoint {
    /// The point of the Minkowski difference, `a - b`.
    pub v: Vector3<f32>,
    /// The support point on shape A in world space.
    pub a: Point3<f32>,
    /// The support point on shape B in world space.
    pub b: Point3<f32>,
}

impl SupportPoint {
    pub fn new(a: Point3<f32>, b: Point3<f32>) -> Self {
        SupportPoint { v: a - b, a, b }
    }
}

/// Any convex set that can be queried for its furthest point along a
/// direction.
pub trait SupportMap {
    fn support(&self, dir: Vector3<f32>) -> SupportPoint;
}

/// The working set of GJK: up to four support points and the barycentric
/// weights of the point closest to the origin.
#[derive(Copy, Clone)]
pub struct Simplex {
    points: [SupportPoint; 4],
    weights: [f32; 4],
    len: usize,
}

impl fmt::Debug for Simplex {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        #[derive(Debug)]
        enum StateName {
            Empty,
            Vertex,
            Edge,
            Face,
            Volume,
        }
        let state = match self.len {
            0 => StateName::Empty,
            1 => StateName::Vertex,
            2 => StateName::Edge,
            3 => StateName::Face,
            _ => StateName::Volume,
        };
        write!(f, "Simplex {{ state: {:?}, points: {:?} }}", state, self.points())
    }
}

impl Default for Simplex {
    fn default() -> Self {
        Simplex::new()
    }
}

impl From<SupportPoint> for Simplex {
    fn from(p: SupportPoint) -> Self {
        let mut simplex = Simplex::new();
        simplex.add_point(p);
        simplex
    }
}

impl Simplex {
    pub fn new() -> Self {
        let zero = SupportPoint::new(Point3::origin(), Point3::origin());
        Simplex {
            points: [zero; 4],
            weights: [0.0; 4],
            len: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn points(&self) -> &[SupportPoint] {
        &self.points[..self.len]
    }

    /// Appends a point. A full simplex is left unchanged.
    pub fn add_point(&mut self, p: SupportPoint) {
        if self.len < 4 {
            self.points[self.len] = p;
            self.weights[self.len] = 0.0;
            self.len += 1;
        }
    }

    /// Returns true if a point of the simplex coincides with `v`.
    pub fn contains_point(&self, v: Vector3<f32>) -> bool {
        self.points().iter().any(|p| (p.v - v).magnitude2() < SIMPLEX_EPSILON)
    }

    /// Returns the world space points on A and B corresponding to the closest
    /// point found by the last call to `min_norm`.
    pub fn witness_points(&self) -> (Point3<f32>, Point3<f32>) {
        let mut a = Vector3::zero();
        let mut b = Vector3::zero();
        for (p, w) in self.points().iter().zip(self.weights.iter()) {
            a += p.a.to_vec() * *w;
            b += p.b.to_vec() * *w;
        }
        (Point3::from_vec(a), Point3::from_vec(b))
    }

    /// Finds the point of the simplex closest to the origin and reduces the
    /// simplex to the smallest feature containing it. A tetrahedron is kept
    /// whole only when it contains the origin, in which case the zero vector
    /// is returned.
    pub fn min_norm(&mut self) -> Vector3<f32> {
        match self.len {
            0 => Vector3::zero(),
            1 => {
                self.weights[0] = 1.0;
                self.points[0].v
            },
            2 => self.reduce_edge(),
            3 => self.reduce_face(),
            _ => self.reduce_volume(),
        }
    }

    fn set(&mut self, features: &[(SupportPoint, f32)]) {
        for (i, &(p, w)) in features.iter().enumerate() {
            self.points[i] = p;
            self.weights[i] = w;
        }
        self.len = features.len();
    }

    fn reduce_edge(&mut self) -> Vector3<f32> {
        let (a, b) = (self.points[0], self.points[1]);
        let ab = b.v - a.v;
        let t = ab.dot(-a.v);
        if t <= 0.0 {
            self.set(&[(a, 1.0)]);
            return a.v;
        }
        let denom = ab.dot(ab);
        if t >= denom {
            self.set(&[(b, 1.0)]);
            return b.v;
        }
        let s = t / denom;
        self.set(&[(a, 1.0 - s), (b, s)]);
        a.v + ab * s
    }

    fn reduce_face(&mut self) -> Vector3<f32> {
        let (a, b, c) = (self.points[0], self.points[1], self.points[2]);
        let ab = b.v - a.v;
        let ac = c.v - a.v;
        let ap = -a.v;
        let d1 = ab.dot(ap);
        let d2 = ac.dot(ap);

        // Vertex region A
        if d1 <= 0.0 && d2 <= 0.0 {
            self.set(&[(a, 1.0)]);
            return a.v;
        }

        // Vertex region B
        let bp = -b.v;
        let d3 = ab.dot(bp);
        let d4 = ac.dot(bp);
        if d3 >= 0.0 && d4 <= d3 {
            self.set(&[(b, 1.0)]);
            return b.v;
        }

        // Edge region AB
        let vc = d1 * d4 - d3 * d2;
        if vc <= 0.0 && d1 >= 0.0 && d3 <= 0.0 {
            let v = d1 / (d1 - d3);
            self.set(&[(a, 1.0 - v), (b, v)]);
            return a.v + ab * v;
        }

        // Vertex region C
        let cp = -c.v;
        let d5 = ab.dot(cp);
        let d6 = ac.dot(cp);
        if d6 >= 0.0 && d5 <= d6 {
            self.set(&[(c, 1.0)]);
            return c.v;
        }

        // Edge region AC
        let vb = d5 * d2 - d1 * d6;
        if vb <= 0.0 && d2 >= 0.0 && d6 <= 0.0 {
            let w = d2 / (d2 - d6);
            self.set(&[(a, 1.0 - w), (c, w)]);
            return a.v + ac * w;
        }

        // Edge region BC
        let va = d3 * d6 - d5 * d4;
        if va <= 0.0 && (d4 - d3) >= 0.0 && (d5 - d6) >= 0.0 {
            let w = (d4 - d3) / ((d4 - d3) + (d5 - d6));
            self.set(&[(b, 1.0 - w), (c, w)]);
            return b.v + (c.v - b.v) * w;
        }

        let sum = va + vb + vc;
        if sum.abs() < SIMPLEX_EPSILON {
            // Collinear points: the closest edge wins.
            return self.best_edge(&[(a, b), (a, c), (b, c)]);
        }
        let denom = 1.0 / sum;
        let v = vb * denom;
        let w = vc * denom;
        self.set(&[(a, 1.0 - v - w), (b, v), (c, w)]);
        a.v + ab * v + ac * w
    }

    fn best_edge(&mut self, edges: &[(SupportPoint, SupportPoint)]) -> Vector3<f32> {
        let mut best: Option<(Simplex, Vector3<f32>)> = None;
        for &(p, q) in edges {
            let mut edge = Simplex::new();
            edge.add_point(p);
            edge.add_point(q);
            let closest = edge.reduce_edge();
            let better = match best {
                Some((_, prev)) => closest.magnitude2() < prev.magnitude2(),
                None => true,
            };
            if better {
                best = Some((edge, closest));
            }
        }
        match best {
            Some((edge, closest)) => {
                *self = edge;
                closest
            },
            None => Vector3::zero(),
        }
    }

    fn reduce_volume(&mut self) -> Vector3<f32> {
        let (a, b, c, d) = (self.points[0], self.points[1], self.points[2], self.points[3]);
        let volume = (b.v - a.v).dot((c.v - a.v).cross(d.v - a.v));
        let degenerate = volume.abs() < SIMPLEX_EPSILON;

        let faces = [
            (a, b, c, d),
            (a, c, d, b),
            (a, d, b, c),
            (b, d, c, a),
        ];
        let mut best: Option<(Simplex, Vector3<f32>)> = None;
        for &(p, q, r, opposite) in faces.iter() {
            if !degenerate && !origin_outside_plane(p.v, q.v, r.v, opposite.v) {
                continue;
            }
            let mut face = Simplex::new();
            face.add_point(p);
            face.add_point(q);
            face.add_point(r);
            let closest = face.reduce_face();
            let better = match best {
                Some((_, prev)) => closest.magnitude2() < prev.magnitude2(),
                None => true,
            };
            if better {
                best = Some((face, closest));
            }
        }

        match best {
            Some((face, closest)) => {
                *self = face;
                closest
            },
            None => {
                // The origin is inside; weights are ratios of sub-volumes.
                let ao = -a.v;
                let wb = ao.dot((c.v - a.v).cross(d.v - a.v)) / volume;
                let wc = (b.v - a.v).dot(ao.cross(d.v - a.v)) / volume;
                let wd = (b.v - a.v).dot((c.v - a.v).cross(ao)) / volume;
                self.weights = [1.0 - wb - wc - wd, wb, wc, wd];
                Vector3::zero()
            },
        }
    }
}

/// Returns true if the origin and `d` lie strictly on opposite sides of the
/// plane through `a`, `b` and `c`.
fn origin_outside_plane(
    a: Vector3<f32>, b: Vector3<f32>, c: Vector3<f32>, d: Vector3<f32>
) -> bool {
    let ab_x_ac = (b - a).cross(c - a);
    let sign_p = (-a).dot(ab_x_ac);
    let sign_d = (d - a).dot(ab_x_ac);
    sign_p * sign_d < 0.0
}

#[cfg(test)]
mod tests {
    mod simplex {
        use approx::assert_relative_eq;
        use cgmath::{Point3, Vector3, Zero};

        use crate::simplex::*;

        fn pt(x: f32, y: f32, z: f32) -> SupportPoint {
            // B is pinned at the origin so that v == a.
            SupportPoint::new(Point3::new(x, y, z), Point3::new(0.0, 0.0, 0.0))
        }

        #[test]
        fn test_edge() {
            let mut s = Simplex::from(pt(-1.0, 1.0, 0.0));
            s.add_point(pt(1.0, 1.0, 0.0));
            assert_relative_eq!(s.min_norm(), Vector3::new(0.0, 1.0, 0.0));
            assert_eq!(s.len(), 2);
            let (a, _) = s.witness_points();
            assert_relative_eq!(a, Point3::new(0.0, 1.0, 0.0));

            let mut s = Simplex::from(pt(1.0, 1.0, 0.0));
            s.add_point(pt(2.0, 1.0, 0.0));
            assert_relative_eq!(s.min_norm(), Vector3::new(1.0, 1.0, 0.0));
            assert_eq!(s.points(), &[pt(1.0, 1.0, 0.0)]);
        }

        #[test]
        fn test_face() {
            let mut s = Simplex::from(pt(-1.0, -1.0, 1.0));
            s.add_point(pt(1.0, -1.0, 1.0));
            s.add_point(pt(0.0, 1.0, 1.0));
            assert_relative_eq!(s.min_norm(), Vector3::new(0.0, 0.0, 1.0));
            assert_eq!(s.len(), 3);

            // Closest to a vertex.
            let mut s = Simplex::from(pt(1.0, 1.0, 0.0));
            s.add_point(pt(2.0, 1.0, 0.0));
            s.add_point(pt(1.0, 2.0, 0.0));
            assert_relative_eq!(s.min_norm(), Vector3::new(1.0, 1.0, 0.0));
            assert_eq!(s.len(), 1);

            // Collinear points do not divide by zero.
            let mut s = Simplex::from(pt(-1.0, 1.0, 0.0));
            s.add_point(pt(0.0, 1.0, 0.0));
            s.add_point(pt(1.0, 1.0, 0.0));
            let v = s.min_norm();
            assert_relative_eq!(v, Vector3::new(0.0, 1.0, 0.0));
        }

        #[test]
        fn test_volume() {
            let mut s = Simplex::from(pt(1.0, 0.0, -1.0));
            s.add_point(pt(-1.0, 1.0, -1.0));
            s.add_point(pt(-1.0, -1.0, -1.0));
            s.add_point(pt(0.0, 0.0, 1.0));
            assert_eq!(s.min_norm(), Vector3::zero());
            assert_eq!(s.len(), 4);
            let (a, _) = s.witness_points();
            assert_relative_eq!(a, Point3::new(0.0, 0.0, 0.0), epsilon = 1e-6);

            // Same tetrahedron lifted above the origin.
            let mut s = Simplex::from(pt(1.0, 0.0, 1.0));
            s.add_point(pt(-1.0, 1.0, 1.0));
            s.add_point(pt(-1.0, -1.0, 1.0));
            s.add_point(pt(0.0, 0.0, 3.0));
            assert_relative_eq!(s.min_norm(), Vector3::new(0.0, 0.0, 1.0));
            assert_eq!(s.len(), 3);
        }

        #[test]
        fn test_flat_volume() {
            let mut s = Simplex::from(pt(1.0, 0.0, 1.0));
            s.add_point(pt(-1.0, 1.0, 1.0));
            s.add_point(pt(-1.0, -1.0, 1.0));
            s.add_point(pt(0.0, 0.0, 1.0));
            assert_relative_eq!(s.min_norm(), Vector3::new(0.0, 0.0, 1.0));
            assert!(s.len() < 4);
        }
    }
}
