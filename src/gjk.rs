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
use smallvec::SmallVec;
use tracing::debug;

use crate::shape::Shape;
use crate::simplex::{Simplex, SupportMap, SupportPoint, SIMPLEX_EPSILON};
use crate::transform::Transform;

/// Maximum number of support evaluations GJK performs.
pub const GJK_MAX_ITERATIONS: usize = 64;

/// Squared distance of the simplex to the origin below which the origin is
/// considered to be touched.
pub const GJK_TOLERANCE: f32 = 1e-8;

/// Maximum number of polytope expansions EPA performs.
pub const EPA_MAX_ITERATIONS: usize = 64;

/// EPA stops once a new support point improves the face distance by less
/// than this.
pub const EPA_TOLERANCE: f32 = 1e-4;

/// EPA stops expanding once the polytope has this many faces.
pub const EPA_MAX_FACES: usize = 128;

/// Two shapes placed in the world, seen as their Minkowski difference.
pub struct MinkowskiDifference<'a> {
    pub shape_a: &'a Shape,
    pub transform_a: &'a Transform,
    pub shape_b: &'a Shape,
    pub transform_b: &'a Transform,
}

impl<'a> SupportMap for MinkowskiDifference<'a> {
    fn support(&self, dir: Vector3<f32>) -> SupportPoint {
        let local_a = self.shape_a.support(self.transform_a.inverse_transform_vector(dir));
        let local_b = self.shape_b.support(self.transform_b.inverse_transform_vector(-dir));
        SupportPoint::new(
            self.transform_a.transform_point(local_a),
            self.transform_b.transform_point(local_b),
        )
    }
}

/// The minimum translation separating two intersecting shapes.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Penetration {
    /// Unit normal pointing from A to B.
    pub normal: Vector3<f32>,
    /// Non-negative penetration depth along the normal.
    pub depth: f32,
    /// Deepest point of A inside B, in world space.
    pub point_a: Point3<f32>,
    /// Deepest point of B inside A, in world space.
    pub point_b: Point3<f32>,
}

/// Outcome of the GJK boolean query.
#[derive(Copy, Clone, Debug)]
pub enum GjkResult {
    /// The origin lies inside or on the simplex. `direction` is the last
    /// usable search direction.
    Intersecting { simplex: Simplex, direction: Vector3<f32> },
    /// A support point failed to pass the origin along `axis`.
    Separated { axis: Vector3<f32> },
}

/// Determines whether the origin is contained in the convex set, starting the
/// search along `initial_dir`.
pub fn gjk<S: SupportMap>(shape: &S, initial_dir: Vector3<f32>) -> GjkResult {
    let mut direction = if initial_dir.magnitude2() > SIMPLEX_EPSILON {
        initial_dir
    } else {
        Vector3::unit_x()
    };
    let mut simplex = Simplex::from(shape.support(direction));
    let mut v = simplex.min_norm();

    for _ in 0..GJK_MAX_ITERATIONS {
        if v.magnitude2() <= GJK_TOLERANCE {
            return GjkResult::Intersecting { simplex, direction };
        }
        direction = -v;
        let w = shape.support(direction);
        if w.v.dot(direction) < 0.0 {
            return GjkResult::Separated { axis: direction };
        }
        if simplex.contains_point(w.v) {
            // No progress is possible. The origin sits on the boundary to
            // within the precision of the support function.
            debug!(distance = v.magnitude(), "gjk stalled on a repeated support point");
            return GjkResult::Intersecting { simplex, direction };
        }
        simplex.add_point(w);
        v = simplex.min_norm();
        if simplex.len() == 4 {
            return GjkResult::Intersecting { simplex, direction };
        }
    }

    debug!(distance = v.magnitude(), "gjk reached its iteration cap");
    exhausted(simplex, direction, v)
}

/// Result of a search that ran out of iterations with `v` as the closest
/// point found. Only a simplex that reached the origin counts as touching.
fn exhausted(simplex: Simplex, direction: Vector3<f32>, v: Vector3<f32>) -> GjkResult {
    if v.magnitude2() <= GJK_TOLERANCE {
        GjkResult::Intersecting { simplex, direction }
    } else {
        GjkResult::Separated { axis: -v }
    }
}

#[derive(Copy, Clone, Debug)]
struct Face {
    indices: [usize; 3],
    normal: Vector3<f32>,
    distance: f32,
}

fn create_face(vertices: &[SupportPoint], indices: [usize; 3], interior: Vector3<f32>) -> Option<Face> {
    let a = vertices[indices[0]].v;
    let b = vertices[indices[1]].v;
    let c = vertices[indices[2]].v;
    let n = (b - a).cross(c - a);
    let len = n.magnitude();
    if len < 1e-10 {
        return None;
    }
    let mut face = Face {
        indices,
        normal: n / len,
        distance: 0.0,
    };
    // Face the normal away from a point known to be inside the polytope.
    if face.normal.dot(a - interior) < 0.0 {
        face.normal = -face.normal;
        face.indices.swap(0, 1);
    }
    face.distance = face.normal.dot(a);
    Some(face)
}

/// Records a horizon edge, or cancels it if the opposite half edge was
/// already recorded by a neighbouring face.
fn add_or_remove_edge(edges: &mut Vec<(usize, usize)>, edge: (usize, usize)) {
    let reverse = (edge.1, edge.0);
    if let Some(pos) = edges.iter().position(|e| *e == reverse || *e == edge) {
        edges.remove(pos);
    } else {
        edges.push(edge);
    }
}

fn closest_face(faces: &[Face]) -> Option<usize> {
    let mut best: Option<usize> = None;
    for (i, face) in faces.iter().enumerate() {
        match best {
            Some(j) if faces[j].distance <= face.distance => {},
            _ => best = Some(i),
        }
    }
    best
}

/// Grows a simplex that touches the origin into a tetrahedron with positive
/// volume, as EPA requires. Returns `None` when the Minkowski difference is
/// too flat to enclose any volume.
fn blow_up<S: SupportMap>(shape: &S, simplex: &Simplex) -> Option<[SupportPoint; 4]> {
    let mut points: SmallVec<[SupportPoint; 4]> = simplex.points().iter().cloned().collect();
    let axes = [
        Vector3::unit_x(), -Vector3::unit_x(),
        Vector3::unit_y(), -Vector3::unit_y(),
        Vector3::unit_z(), -Vector3::unit_z(),
    ];

    if points.is_empty() {
        points.push(shape.support(Vector3::unit_x()));
    }

    if points.len() == 1 {
        let a = points[0].v;
        let w = axes.iter()
            .map(|d| shape.support(*d))
            .find(|w| (w.v - a).magnitude2() > SIMPLEX_EPSILON)?;
        points.push(w);
    }

    if points.len() == 2 {
        let (a, b) = (points[0].v, points[1].v);
        let ab = b - a;
        // Pick the coordinate axis least aligned with the edge.
        let e = if ab.x.abs() <= ab.y.abs() && ab.x.abs() <= ab.z.abs() {
            Vector3::unit_x()
        } else if ab.y.abs() <= ab.z.abs() {
            Vector3::unit_y()
        } else {
            Vector3::unit_z()
        };
        let d1 = ab.cross(e);
        let d2 = ab.cross(d1);
        let w = [d1, -d1, d2, -d2].iter()
            .map(|d| shape.support(*d))
            .find(|w| (w.v - a).cross(ab).magnitude2() > SIMPLEX_EPSILON)?;
        points.push(w);
    }

    if points.len() == 3 {
        let (a, b, c) = (points[0].v, points[1].v, points[2].v);
        let n = (b - a).cross(c - a);
        let w = [n, -n].iter()
            .map(|d| shape.support(*d))
            .find(|w| (w.v - a).dot(n).abs() > SIMPLEX_EPSILON)?;
        points.push(w);
    }

    let (a, b, c, d) = (points[0], points[1], points[2], points[3]);
    let volume = (b.v - a.v).dot((c.v - a.v).cross(d.v - a.v));
    if volume.abs() <= SIMPLEX_EPSILON {
        return None;
    }
    Some([a, b, c, d])
}

fn compute_contact(vertices: &[SupportPoint], face: &Face) -> Penetration {
    let (pa, pb, pc) = (vertices[face.indices[0]], vertices[face.indices[1]], vertices[face.indices[2]]);
    let (u, v, w) = barycentric(face.normal * face.distance, pa.v, pb.v, pc.v);
    let point_a = Point3::from_vec(pa.a.to_vec() * u + pb.a.to_vec() * v + pc.a.to_vec() * w);
    let point_b = Point3::from_vec(pa.b.to_vec() * u + pb.b.to_vec() * v + pc.b.to_vec() * w);
    Penetration {
        normal: face.normal,
        depth: face.distance.max(0.0),
        point_a,
        point_b,
    }
}

fn barycentric(p: Vector3<f32>, a: Vector3<f32>, b: Vector3<f32>, c: Vector3<f32>) -> (f32, f32, f32) {
    let v0 = b - a;
    let v1 = c - a;
    let v2 = p - a;
    let d00 = v0.dot(v0);
    let d01 = v0.dot(v1);
    let d11 = v1.dot(v1);
    let d20 = v2.dot(v0);
    let d21 = v2.dot(v1);
    let denom = d00 * d11 - d01 * d01;
    if denom.abs() < 1e-10 {
        return (1.0 / 3.0, 1.0 / 3.0, 1.0 / 3.0);
    }
    let v = (d11 * d20 - d01 * d21) / denom;
    let w = (d00 * d21 - d01 * d20) / denom;
    (1.0 - v - w, v, w)
}

/// Expands the simplex GJK ended with into a polytope and returns the face of
/// the Minkowski difference closest to the origin. Degenerate input falls
/// back to `fallback_dir` with zero depth.
pub fn epa<S: SupportMap>(shape: &S, simplex: &Simplex, fallback_dir: Vector3<f32>) -> Penetration {
    let fallback = || {
        let normal = if fallback_dir.magnitude2() > SIMPLEX_EPSILON {
            fallback_dir.normalize()
        } else {
            Vector3::unit_x()
        };
        let (point_a, point_b) = simplex.witness_points();
        Penetration { normal, depth: 0.0, point_a, point_b }
    };

    let tetrahedron = match blow_up(shape, simplex) {
        Some(tetrahedron) => tetrahedron,
        None => {
            debug!("epa could not build a tetrahedron; using the fallback axis");
            return fallback();
        }
    };

    let mut vertices: Vec<SupportPoint> = tetrahedron.to_vec();
    let interior = vertices.iter().fold(Vector3::zero(), |sum, p| sum + p.v) / 4.0;
    let mut faces: Vec<Face> = [[0, 1, 2], [0, 3, 1], [0, 2, 3], [1, 3, 2]]
        .iter()
        .filter_map(|indices| create_face(&vertices, *indices, interior))
        .collect();

    let mut best = match closest_face(&faces) {
        Some(i) => faces[i],
        None => return fallback(),
    };

    for _ in 0..EPA_MAX_ITERATIONS {
        let closest = match closest_face(&faces) {
            Some(i) => faces[i],
            None => break,
        };
        best = closest;

        let w = shape.support(closest.normal);
        if w.v.dot(closest.normal) - closest.distance < EPA_TOLERANCE {
            return compute_contact(&vertices, &closest);
        }
        if vertices.iter().any(|p| (p.v - w.v).magnitude2() < SIMPLEX_EPSILON) {
            return compute_contact(&vertices, &closest);
        }

        let new_index = vertices.len();
        vertices.push(w);

        // Remove every face the new point can see, keeping the horizon.
        let mut horizon: Vec<(usize, usize)> = Vec::new();
        faces.retain(|face| {
            let visible = face.normal.dot(w.v - vertices[face.indices[0]].v) > 0.0;
            if visible {
                for j in 0..3 {
                    let edge = (face.indices[j], face.indices[(j + 1) % 3]);
                    add_or_remove_edge(&mut horizon, edge);
                }
            }
            !visible
        });

        for (a, b) in horizon {
            if let Some(face) = create_face(&vertices, [a, b, new_index], interior) {
                faces.push(face);
            }
        }

        if faces.len() > EPA_MAX_FACES {
            debug!(faces = faces.len(), "epa reached its face cap");
            break;
        }
    }

    match closest_face(&faces) {
        Some(i) => {
            debug!(depth = faces[i].distance, "epa stopped before converging");
            compute_contact(&vertices, &faces[i])
        },
        None => compute_contact(&vertices, &best),
    }
}

/// Tests two placed shapes for intersection, returning the penetration normal
/// (from A to B) and depth when they overlap.
pub fn intersect(
    shape_a: &Shape,
    transform_a: &Transform,
    shape_b: &Shape,
    transform_b: &Transform,
) -> Option<Penetration> {
    let md = MinkowskiDifference {
        shape_a,
        transform_a,
        shape_b,
        transform_b,
    };
    let initial_dir = transform_b.position - transform_a.position;
    match gjk(&md, initial_dir) {
        GjkResult::Separated { .. } => None,
        GjkResult::Intersecting { simplex, direction } => {
            let fallback = if initial_dir.magnitude2() > SIMPLEX_EPSILON {
                initial_dir
            } else {
                direction
            };
            Some(epa(&md, &simplex, fallback))
        },
    }
}

#[cfg(test)]
mod tests {
    mod gjk {
        use approx::assert_relative_eq;
        use cgmath::{Deg, InnerSpace, Point3, Quaternion, Rotation3, Vector3};
        use proptest::prelude::*;

        use crate::gjk::*;
        use crate::shape::Shape;
        use crate::simplex::{Simplex, SupportPoint};
        use crate::transform::Transform;

        fn at(x: f32, y: f32, z: f32) -> Transform {
            Transform::from_position(Point3::new(x, y, z))
        }

        #[test]
        fn test_separated_boxes() {
            let b = Shape::cuboid(Vector3::new(1.0, 1.0, 1.0));
            assert_eq!(intersect(&b, &at(0.0, 0.0, 0.0), &b, &at(10.0, 0.0, 0.0)), None);
            assert_eq!(intersect(&b, &at(0.0, 0.0, 0.0), &b, &at(2.5, 0.0, 0.0)), None);
        }

        #[test]
        fn test_sphere_penetration() {
            let s = Shape::sphere(1.0);
            let p = intersect(&s, &at(0.0, 0.0, 0.0), &s, &at(1.5, 0.0, 0.0)).unwrap();
            assert!((p.depth - 0.5).abs() < 0.1, "depth {}", p.depth);
            assert!(p.normal.x > 0.9);
            assert_relative_eq!(p.normal.magnitude(), 1.0, epsilon = 1e-4);
        }

        #[test]
        fn test_box_penetration() {
            let b = Shape::cuboid(Vector3::new(1.0, 1.0, 1.0));
            let p = intersect(&b, &at(0.0, 0.0, 0.0), &b, &at(0.0, 1.5, 0.2)).unwrap();
            assert_relative_eq!(p.depth, 0.5, epsilon = 1e-3);
            assert_relative_eq!(p.normal, Vector3::new(0.0, 1.0, 0.0), epsilon = 1e-3);
            // Witness points straddle the overlap along the normal.
            assert_relative_eq!((p.point_a - p.point_b).dot(p.normal), p.depth, epsilon = 1e-3);
        }

        #[test]
        fn test_rotated_box_on_box() {
            let b = Shape::cuboid(Vector3::new(1.0, 1.0, 1.0));
            let tilted = Transform::new(Point3::new(0.0, 2.3, 0.0), Quaternion::from_angle_z(Deg(45.0)));
            // The corner of the tilted box reaches down to y = 2.3 - sqrt(2).
            let p = intersect(&b, &at(0.0, 0.0, 0.0), &b, &tilted).unwrap();
            assert_relative_eq!(p.depth, 1.0 - (2.3 - 2.0f32.sqrt()), epsilon = 1e-3);
            assert!(p.normal.y > 0.99);
        }

        #[test]
        fn test_touching() {
            let b = Shape::cuboid(Vector3::new(1.0, 1.0, 1.0));
            match intersect(&b, &at(0.0, 0.0, 0.0), &b, &at(2.0, 0.0, 0.0)) {
                None => {},
                Some(p) => assert!(p.depth < 1e-3, "depth {}", p.depth),
            }
            let s = Shape::sphere(0.5);
            match intersect(&s, &at(0.0, 0.0, 0.0), &s, &at(0.0, 0.0, 1.0)) {
                None => {},
                Some(p) => assert!(p.depth < 1e-2, "depth {}", p.depth),
            }
        }

        #[test]
        fn test_concentric() {
            // Identical centers are a degenerate start for GJK.
            let s = Shape::sphere(1.0);
            let p = intersect(&s, &at(0.0, 0.0, 0.0), &s, &at(0.0, 0.0, 0.0)).unwrap();
            assert!(p.depth > 1.5 && p.depth <= 2.0 + 1e-3, "depth {}", p.depth);
            assert_relative_eq!(p.normal.magnitude(), 1.0, epsilon = 1e-4);
        }

        #[test]
        fn test_exhausted_search() {
            let a = Point3::new(0.005, 0.0, 0.0);
            let simplex = Simplex::from(SupportPoint::new(a, Point3::new(0.0, 0.0, 0.0)));
            let dir = Vector3::new(1.0, 0.0, 0.0);

            // A centimetre short of the origin is a miss.
            match exhausted(simplex, dir, Vector3::new(0.005, 0.0, 0.0)) {
                GjkResult::Separated { axis } => assert_relative_eq!(axis, Vector3::new(-0.005, 0.0, 0.0)),
                GjkResult::Intersecting { .. } => panic!("5 mm gap reported as touching"),
            }
            match exhausted(simplex, dir, Vector3::new(1e-5, 0.0, 0.0)) {
                GjkResult::Intersecting { .. } => {},
                GjkResult::Separated { .. } => panic!("origin on the simplex reported as separated"),
            }
        }

        #[test]
        fn test_flat_hull() {
            // A hull with no volume still produces a finite answer.
            let flat = Shape::convex_hull(vec![
                Point3::new(-1.0, 0.0, -1.0),
                Point3::new(1.0, 0.0, -1.0),
                Point3::new(0.0, 0.0, 1.0),
            ]);
            let b = Shape::cuboid(Vector3::new(1.0, 1.0, 1.0));
            let p = intersect(&flat, &at(0.0, 0.5, 0.0), &b, &at(0.0, 0.0, 0.0)).unwrap();
            assert!(p.depth.is_finite() && p.depth >= 0.0);
            assert!(p.normal.magnitude().is_finite());
        }

        fn arb_shape() -> impl Strategy<Value = Shape> {
            prop_oneof![
                (0.05f32..2.0).prop_map(Shape::sphere),
                (0.05f32..2.0, 0.05f32..2.0, 0.05f32..2.0)
                    .prop_map(|(x, y, z)| Shape::cuboid(Vector3::new(x, y, z))),
                (0.05f32..1.0, 0.05f32..1.0).prop_map(|(r, h)| Shape::capsule(r, h)),
                (0.05f32..1.0, 0.05f32..1.0).prop_map(|(r, h)| Shape::cylinder(r, h)),
            ]
        }

        fn arb_transform() -> impl Strategy<Value = Transform> {
            (-3.0f32..3.0, -3.0f32..3.0, -3.0f32..3.0, -180.0f32..180.0, -1.0f32..1.0, 0.1f32..1.0)
                .prop_map(|(x, y, z, angle, ax, ay)| {
                    let axis = Vector3::new(ax, ay, 0.3).normalize();
                    Transform::new(Point3::new(x, y, z), Quaternion::from_axis_angle(axis, Deg(angle)))
                })
        }

        proptest! {
            #[test]
            fn penetration_is_finite(
                a in arb_shape(), ta in arb_transform(),
                b in arb_shape(), tb in arb_transform(),
            ) {
                if let Some(p) = intersect(&a, &ta, &b, &tb) {
                    prop_assert!(p.depth.is_finite() && p.depth >= 0.0);
                    prop_assert!(p.normal.x.is_finite() && p.normal.y.is_finite() && p.normal.z.is_finite());
                    prop_assert!((p.normal.magnitude() - 1.0).abs() < 1e-3);
                }
            }

            #[test]
            fn far_apart_never_intersect(
                a in arb_shape(), b in arb_shape(), ta in arb_transform(),
                dir in (-1.0f32..1.0, -1.0f32..1.0, -1.0f32..1.0),
            ) {
                let d = Vector3::new(dir.0, dir.1, dir.2);
                prop_assume!(d.magnitude2() > 1e-3);
                let tb = Transform::new(ta.position + d.normalize() * 20.0, ta.rotation);
                prop_assert!(intersect(&a, &ta, &b, &tb).is_none());
            }
        }
    }
}
