//! Narrow-phase collision detection.
//!
//! Given a candidate body pair from the broad-phase, every ordered shape pair
//! (one shape from each body) is tested and produces at most one manifold of
//! 1-2 world-space contact points. Normals always point from body A toward
//! body B; depths are strictly non-negative. Feature ids are deterministic
//! for identical geometry so the warm-start cache can match points across
//! frames.

use crate::math::{EPSILON, Scalar, Vector2};
use crate::types::{ContactManifold, FeatureId, ManifoldPoint, Polygon, RigidBody, Shape};

/// Body pose applied to shape-local geometry.
#[derive(Clone, Copy)]
struct Transform {
    pos: Vector2,
    rot: Vector2,
}

impl Transform {
    fn of(body: &RigidBody) -> Self {
        Self { pos: body.position, rot: Vector2::from_angle(body.angle) }
    }

    fn point(&self, p: Vector2) -> Vector2 {
        self.pos + self.rot.rotate(p)
    }

    fn direction(&self, d: Vector2) -> Vector2 {
        self.rot.rotate(d)
    }
}

/// Test every shape pair of two bodies, appending the resulting manifolds.
/// The caller passes bodies with `a.id < b.id`.
pub fn collide_bodies(a: &RigidBody, b: &RigidBody, out: &mut Vec<ContactManifold>) {
    for (ai, shape_a) in a.shapes.iter().enumerate() {
        for (bi, shape_b) in b.shapes.iter().enumerate() {
            if let Some(manifold) = collide_shapes(a, ai as u16, shape_a, b, bi as u16, shape_b) {
                out.push(manifold);
            }
        }
    }
}

/// Manifold for a single shape pair, or `None` when separated.
pub fn collide_shapes(
    a: &RigidBody,
    shape_a: u16,
    sa: &Shape,
    b: &RigidBody,
    shape_b: u16,
    sb: &Shape,
) -> Option<ContactManifold> {
    let ta = Transform::of(a);
    let tb = Transform::of(b);
    match (sa, sb) {
        (Shape::Circle { radius: ra, offset: oa }, Shape::Circle { radius: rb, offset: ob }) => {
            circle_circle(a, shape_a, ta.point(*oa), *ra, b, shape_b, tb.point(*ob), *rb)
        }
        (Shape::Circle { radius, offset }, Shape::Polygon(poly)) => circle_polygon(
            a, shape_a, ta.point(*offset), *radius, b, shape_b, poly, tb, true,
        ),
        (Shape::Polygon(poly), Shape::Circle { radius, offset }) => circle_polygon(
            b, shape_b, tb.point(*offset), *radius, a, shape_a, poly, ta, false,
        ),
        (Shape::Polygon(pa), Shape::Polygon(pb)) => {
            polygon_polygon(a, shape_a, pa, ta, b, shape_b, pb, tb)
        }
    }
}

fn circle_circle(
    a: &RigidBody,
    shape_a: u16,
    center_a: Vector2,
    radius_a: Scalar,
    b: &RigidBody,
    shape_b: u16,
    center_b: Vector2,
    radius_b: Scalar,
) -> Option<ContactManifold> {
    let delta = center_b - center_a;
    let dist_sq = delta.length_squared();
    let sum_r = radius_a + radius_b;
    if dist_sq >= sum_r * sum_r {
        return None;
    }

    let dist = dist_sq.sqrt();
    // Concentric circles still report a contact along an arbitrary axis.
    let normal = if dist > EPSILON { delta / dist } else { Vector2::X };
    let depth = sum_r - dist;
    let point = center_a + normal * (radius_a - depth * 0.5);

    let mut manifold = ContactManifold::new(a.id, b.id, shape_a, shape_b, normal);
    manifold.points.push(ManifoldPoint::new(point, depth, FeatureId::CIRCLE));
    Some(manifold)
}

/// Circle against a convex polygon. `circle_is_a` records which argument of
/// the original shape pair the circle was, so the manifold keeps the caller's
/// body order and an A-to-B normal.
#[allow(clippy::too_many_arguments)]
fn circle_polygon(
    circle_body: &RigidBody,
    circle_shape: u16,
    center: Vector2,
    radius: Scalar,
    poly_body: &RigidBody,
    poly_shape: u16,
    poly: &Polygon,
    poly_transform: Transform,
    circle_is_a: bool,
) -> Option<ContactManifold> {
    let n = poly.vertices().len();

    // Face whose outward normal maximizes the signed distance to the center.
    let mut separation = Scalar::MIN;
    let mut best = 0;
    for i in 0..n {
        let v = poly_transform.point(poly.vertices()[i]);
        let normal = poly_transform.direction(poly.normals()[i]);
        let d = normal.dot(center - v);
        if d > separation {
            separation = d;
            best = i;
        }
    }
    if separation > radius {
        return None;
    }

    let v0 = poly_transform.point(poly.vertices()[best]);
    let v1 = poly_transform.point(poly.vertices()[(best + 1) % n]);
    let face_normal = poly_transform.direction(poly.normals()[best]);

    // Normal from the polygon toward the circle, plus contact point and depth.
    let (normal, depth, point, feature) = if separation < EPSILON {
        // Center at or below the face: deep face contact.
        (face_normal, radius - separation, center - face_normal * radius, FeatureId::face(best))
    } else {
        let u0 = (center - v0).dot(v1 - v0);
        let u1 = (center - v1).dot(v0 - v1);
        if u0 <= 0.0 {
            vertex_contact(center, radius, v0, best)?
        } else if u1 <= 0.0 {
            vertex_contact(center, radius, v1, (best + 1) % n)?
        } else {
            // Projection lies inside the face segment.
            (face_normal, radius - separation, center - face_normal * separation, FeatureId::face(best))
        }
    };

    let (body_a, body_b, shape_a, shape_b, normal) = if circle_is_a {
        (circle_body, poly_body, circle_shape, poly_shape, -normal)
    } else {
        (poly_body, circle_body, poly_shape, circle_shape, normal)
    };

    let mut manifold = ContactManifold::new(body_a.id, body_b.id, shape_a, shape_b, normal);
    manifold.points.push(ManifoldPoint::new(point, depth, feature));
    Some(manifold)
}

fn vertex_contact(
    center: Vector2,
    radius: Scalar,
    vertex: Vector2,
    index: usize,
) -> Option<(Vector2, Scalar, Vector2, FeatureId)> {
    let delta = center - vertex;
    let dist_sq = delta.length_squared();
    if dist_sq >= radius * radius {
        return None;
    }
    let dist = dist_sq.sqrt();
    let normal = if dist > EPSILON { delta / dist } else { Vector2::X };
    Some((normal, radius - dist, vertex, FeatureId::vertex(index)))
}

/// World-space vertices and face normals for one polygon.
struct WorldPoly {
    verts: Vec<Vector2>,
    normals: Vec<Vector2>,
}

impl WorldPoly {
    fn new(poly: &Polygon, transform: Transform) -> Self {
        Self {
            verts: poly.vertices().iter().map(|&v| transform.point(v)).collect(),
            normals: poly.normals().iter().map(|&n| transform.direction(n)).collect(),
        }
    }
}

/// Largest signed face separation of `other` from `poly` over `poly`'s face
/// normals, with the face index attaining it. Positive means separated.
fn max_separation(poly: &WorldPoly, other: &WorldPoly) -> (Scalar, usize) {
    let mut best_sep = Scalar::MIN;
    let mut best_face = 0;
    for (i, (&v, &normal)) in poly.verts.iter().zip(&poly.normals).enumerate() {
        let mut min_proj = Scalar::MAX;
        for &w in &other.verts {
            min_proj = min_proj.min(normal.dot(w - v));
        }
        if min_proj > best_sep {
            best_sep = min_proj;
            best_face = i;
        }
    }
    (best_sep, best_face)
}

/// Incident edge: the face of `poly` most anti-parallel to the reference
/// normal.
fn incident_edge(poly: &WorldPoly, reference_normal: Vector2) -> usize {
    let mut min_dot = Scalar::MAX;
    let mut best = 0;
    for (i, &normal) in poly.normals.iter().enumerate() {
        let d = normal.dot(reference_normal);
        if d < min_dot {
            min_dot = d;
            best = i;
        }
    }
    best
}

/// Contact point being clipped, remembering which incident vertex spawned it.
#[derive(Clone, Copy)]
struct ClipPoint {
    p: Vector2,
    incident_vertex: usize,
}

/// Sutherland-Hodgman clip of a two-point segment against the half-plane
/// `dot(normal, x - origin) >= 0`. Returns fewer than two points when the
/// segment is (almost) entirely outside.
fn clip_segment(
    points: [ClipPoint; 2],
    origin: Vector2,
    normal: Vector2,
) -> arrayvec::ArrayVec<ClipPoint, 2> {
    let mut out = arrayvec::ArrayVec::new();
    let d0 = normal.dot(points[0].p - origin);
    let d1 = normal.dot(points[1].p - origin);

    if d0 >= 0.0 {
        out.push(points[0]);
    }
    if d1 >= 0.0 {
        out.push(points[1]);
    }

    if d0 * d1 < 0.0 && out.len() < 2 {
        let t = d0 / (d0 - d1);
        // The interpolated point replaces the vertex that fell outside.
        let outside = if d0 < 0.0 { points[0] } else { points[1] };
        out.push(ClipPoint {
            p: points[0].p + (points[1].p - points[0].p) * t,
            incident_vertex: outside.incident_vertex,
        });
    }
    out
}

#[allow(clippy::too_many_arguments)]
fn polygon_polygon(
    a: &RigidBody,
    shape_a: u16,
    pa: &Polygon,
    ta: Transform,
    b: &RigidBody,
    shape_b: u16,
    pb: &Polygon,
    tb: Transform,
) -> Option<ContactManifold> {
    let wa = WorldPoly::new(pa, ta);
    let wb = WorldPoly::new(pb, tb);

    let (sep_a, face_a) = max_separation(&wa, &wb);
    if sep_a > 0.0 {
        return None;
    }
    let (sep_b, face_b) = max_separation(&wb, &wa);
    if sep_b > 0.0 {
        return None;
    }

    // Reference face: the axis of least penetration, with a small bias
    // toward A so grazing configurations don't flip-flop between frames.
    let a_is_reference = sep_a >= sep_b - 1e-3;
    let (reference, incident, ref_face) = if a_is_reference {
        (&wa, &wb, face_a)
    } else {
        (&wb, &wa, face_b)
    };

    let n_ref = reference.verts.len();
    let ref_v0 = reference.verts[ref_face];
    let ref_v1 = reference.verts[(ref_face + 1) % n_ref];
    let ref_normal = reference.normals[ref_face];
    let ref_tangent = (ref_v1 - ref_v0).normalize();

    let inc_face = incident_edge(incident, ref_normal);
    let n_inc = incident.verts.len();
    let incident_points = [
        ClipPoint { p: incident.verts[inc_face], incident_vertex: inc_face },
        ClipPoint { p: incident.verts[(inc_face + 1) % n_inc], incident_vertex: (inc_face + 1) % n_inc },
    ];

    // Clip the incident edge between the reference face's two side planes.
    let clipped = clip_segment(incident_points, ref_v0, ref_tangent);
    if clipped.len() < 2 {
        return None;
    }
    let clipped = clip_segment([clipped[0], clipped[1]], ref_v1, -ref_tangent);
    if clipped.len() < 2 {
        return None;
    }

    // The manifold normal must point from A toward B. The reference normal
    // points away from the reference polygon, i.e. toward the incident one.
    let normal = if a_is_reference { ref_normal } else { -ref_normal };
    let mut manifold = ContactManifold::new(a.id, b.id, shape_a, shape_b, normal);

    for cp in &clipped {
        let sep = ref_normal.dot(cp.p - ref_v0);
        // Points clipped to the outside of the reference face carry no
        // penetration and are discarded.
        if sep <= 0.0 {
            let feature = FeatureId::clip(ref_face, cp.incident_vertex);
            manifold.points.push(ManifoldPoint::new(cp.p, -sep, feature));
        }
    }

    if manifold.points.is_empty() { None } else { Some(manifold) }
}
