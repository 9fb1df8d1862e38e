//! Core data model: ids, materials, shapes, rigid bodies, and contact types.

use arrayvec::ArrayVec;

use crate::error::BodyError;
use crate::math::{Aabb, EPSILON, Scalar, Vector2, cross_sv};

pub type BodyId = u32;
pub type ConstraintId = u32;

const PI: Scalar = core::f64::consts::PI as Scalar;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BodyType {
    /// Never moves; infinite mass and inertia.
    Static,
    /// Fully simulated.
    Dynamic,
    /// Moves along its user-set velocity but is unaffected by forces and
    /// impulses (infinite mass as far as the solver is concerned).
    Kinematic,
}

/// Surface and bulk properties of a body.
///
/// Restitution between two touching materials combines as the **minimum** of
/// the two coefficients; friction combines as **sqrt(friction_a *
/// friction_b)**. Both rules are fixed.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Material {
    /// Mass per unit area; body mass is derived from shape areas.
    pub density: Scalar,
    /// Coefficient of restitution in `[0, 1]`.
    pub restitution: Scalar,
    /// Coulomb friction coefficient, `>= 0`.
    pub friction: Scalar,
}

impl Default for Material {
    fn default() -> Self {
        Self {
            density: 1.0,
            restitution: 0.3,
            friction: 0.5,
        }
    }
}

impl Material {
    pub const STEEL: Material = Material { density: 7.8, restitution: 0.43, friction: 0.45 };
    pub const WOOD: Material = Material { density: 1.5, restitution: 0.37, friction: 0.52 };
    pub const GLASS: Material = Material { density: 2.5, restitution: 0.55, friction: 0.19 };
    pub const ICE: Material = Material { density: 0.92, restitution: 0.05, friction: 0.02 };
    pub const CONCRETE: Material = Material { density: 3.6, restitution: 0.2, friction: 0.73 };
    pub const RUBBER: Material = Material { density: 1.4, restitution: 0.89, friction: 0.92 };
    pub const GOLD: Material = Material { density: 19.3, restitution: 0.4, friction: 0.35 };
    pub const CARDBOARD: Material = Material { density: 0.6, restitution: 0.02, friction: 0.2 };

    pub fn combined_restitution(a: &Material, b: &Material) -> Scalar {
        a.restitution.min(b.restitution)
    }

    pub fn combined_friction(a: &Material, b: &Material) -> Scalar {
        (a.friction * b.friction).sqrt()
    }
}

/// Convex polygon in body space.
///
/// Vertices are stored already translated by the shape offset, so the body
/// transform is the only transform left to apply. Face normals and the
/// centroid are precomputed at validation; the loop is never mutated after
/// registration.
#[derive(Debug, Clone, PartialEq)]
pub struct Polygon {
    vertices: Vec<Vector2>,
    normals: Vec<Vector2>,
    centroid: Vector2,
}

impl Polygon {
    /// Validate a counter-clockwise strictly convex loop and precompute its
    /// derived data. `offset` attaches the shape to the body frame.
    pub fn new(vertices: &[Vector2], offset: Vector2) -> Result<Self, BodyError> {
        if vertices.len() < 3 {
            return Err(BodyError::TooFewVertices { count: vertices.len() });
        }
        if !offset.is_finite() || vertices.iter().any(|v| !v.is_finite()) {
            return Err(BodyError::NonFinite { what: "polygon vertices" });
        }

        let vertices: Vec<Vector2> = vertices.iter().map(|v| *v + offset).collect();
        let n = vertices.len();

        // Every turn must be a strict left turn (counter-clockwise, convex,
        // no collinear triples).
        for i in 0..n {
            let e0 = vertices[(i + 1) % n] - vertices[i];
            let e1 = vertices[(i + 2) % n] - vertices[(i + 1) % n];
            if e0.perp_dot(e1) <= 0.0 {
                return Err(BodyError::NotConvex);
            }
        }

        let mut normals = Vec::with_capacity(n);
        for i in 0..n {
            let e = vertices[(i + 1) % n] - vertices[i];
            let len = e.length();
            if len < EPSILON {
                return Err(BodyError::NotConvex);
            }
            // Outward normal of a counter-clockwise edge.
            normals.push(Vector2::new(e.y, -e.x) / len);
        }

        // Area-weighted centroid.
        let mut area2 = 0.0;
        let mut centroid = Vector2::ZERO;
        for i in 0..n {
            let a = vertices[i];
            let b = vertices[(i + 1) % n];
            let c = a.perp_dot(b);
            area2 += c;
            centroid += (a + b) * c;
        }
        let centroid = centroid / (3.0 * area2);

        Ok(Self { vertices, normals, centroid })
    }

    /// Body-frame vertices, counter-clockwise.
    pub fn vertices(&self) -> &[Vector2] {
        &self.vertices
    }

    /// Outward face normals; `normals()[i]` belongs to the edge from vertex
    /// `i` to vertex `i + 1`.
    pub fn normals(&self) -> &[Vector2] {
        &self.normals
    }

    pub fn centroid(&self) -> Vector2 {
        self.centroid
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Shape {
    Circle { radius: Scalar, offset: Vector2 },
    Polygon(Polygon),
}

impl Shape {
    pub fn circle(radius: Scalar, offset: Vector2) -> Result<Shape, BodyError> {
        if !radius.is_finite() || !offset.is_finite() {
            return Err(BodyError::NonFinite { what: "circle definition" });
        }
        if radius <= 0.0 {
            return Err(BodyError::InvalidRadius { radius });
        }
        Ok(Shape::Circle { radius, offset })
    }

    pub fn polygon(vertices: &[Vector2], offset: Vector2) -> Result<Shape, BodyError> {
        Polygon::new(vertices, offset).map(Shape::Polygon)
    }

    /// Axis-aligned box of the given full extents, centered on `offset`.
    pub fn rect(width: Scalar, height: Scalar, offset: Vector2) -> Result<Shape, BodyError> {
        let hw = width * 0.5;
        let hh = height * 0.5;
        Self::polygon(
            &[
                Vector2::new(-hw, -hh),
                Vector2::new(hw, -hh),
                Vector2::new(hw, hh),
                Vector2::new(-hw, hh),
            ],
            offset,
        )
    }

    /// World AABB of the shape under a body transform.
    pub fn aabb(&self, position: Vector2, angle: Scalar) -> Aabb {
        let rot = Vector2::from_angle(angle);
        match self {
            Shape::Circle { radius, offset } => {
                let center = position + rot.rotate(*offset);
                let r = Vector2::splat(*radius);
                Aabb::new(center - r, center + r)
            }
            Shape::Polygon(poly) => {
                let mut min = Vector2::splat(Scalar::MAX);
                let mut max = Vector2::splat(Scalar::MIN);
                for &v in poly.vertices() {
                    let w = position + rot.rotate(v);
                    min = min.min(w);
                    max = max.max(w);
                }
                Aabb::new(min, max)
            }
        }
    }

    /// Mass and moment of inertia about the body origin for a given density.
    pub(crate) fn mass_properties(&self, density: Scalar) -> (Scalar, Scalar) {
        match self {
            Shape::Circle { radius, offset } => {
                let mass = density * PI * radius * radius;
                // Disc inertia about its center, shifted to the body origin.
                let inertia = mass * (0.5 * radius * radius + offset.length_squared());
                (mass, inertia)
            }
            Shape::Polygon(poly) => {
                let verts = poly.vertices();
                let n = verts.len();
                let mut area2 = 0.0;
                let mut second_moment = 0.0;
                for i in 0..n {
                    let a = verts[i];
                    let b = verts[(i + 1) % n];
                    let c = a.perp_dot(b);
                    area2 += c;
                    second_moment += c * (a.dot(a) + a.dot(b) + b.dot(b));
                }
                let mass = density * area2 * 0.5;
                let inertia = density * second_moment / 12.0;
                (mass, inertia)
            }
        }
    }
}

/// Everything needed to register a body with the world.
#[derive(Debug, Clone)]
pub struct RigidBodyDef {
    pub body_type: BodyType,
    pub position: Vector2,
    pub angle: Scalar,
    pub linear_velocity: Vector2,
    pub angular_velocity: Scalar,
    pub shapes: Vec<Shape>,
    pub material: Material,
    pub linear_damping: Scalar,
    pub angular_damping: Scalar,
    /// Bodies sharing a non-zero group never collide with each other.
    pub group: u32,
    /// Category bits this body belongs to.
    pub category: u32,
    /// Categories this body collides with.
    pub mask: u32,
    /// Attractors exert Newtonian gravity on every dynamic body.
    pub is_attractor: bool,
}

impl Default for RigidBodyDef {
    fn default() -> Self {
        Self {
            body_type: BodyType::Dynamic,
            position: Vector2::ZERO,
            angle: 0.0,
            linear_velocity: Vector2::ZERO,
            angular_velocity: 0.0,
            shapes: Vec::new(),
            material: Material::default(),
            linear_damping: 0.0,
            angular_damping: 0.0,
            group: 0,
            category: 1,
            mask: u32::MAX,
            is_attractor: false,
        }
    }
}

#[derive(Debug, Clone)]
pub struct RigidBody {
    pub id: BodyId,
    pub body_type: BodyType,
    pub shapes: Vec<Shape>,
    pub material: Material,
    pub position: Vector2,
    pub angle: Scalar,
    pub linear_velocity: Vector2,
    pub angular_velocity: Scalar,
    /// Accumulated force, cleared at the end of every full step.
    pub force: Vector2,
    pub torque: Scalar,
    pub mass: Scalar,
    pub inv_mass: Scalar,
    pub inertia: Scalar,
    pub inv_inertia: Scalar,
    pub linear_damping: Scalar,
    pub angular_damping: Scalar,
    pub group: u32,
    pub category: u32,
    pub mask: u32,
    pub is_attractor: bool,
    pub sleeping: bool,
    /// Consecutive steps below the sleep thresholds.
    pub(crate) quiet_frames: u32,
    /// Set when a step detected a non-finite state on this body.
    pub poisoned: bool,
}

impl RigidBody {
    pub(crate) fn from_def(id: BodyId, def: RigidBodyDef) -> Result<Self, BodyError> {
        if def.shapes.is_empty() {
            return Err(BodyError::NoShapes);
        }
        if !def.position.is_finite()
            || !def.angle.is_finite()
            || !def.linear_velocity.is_finite()
            || !def.angular_velocity.is_finite()
            || !def.linear_damping.is_finite()
            || !def.angular_damping.is_finite()
        {
            return Err(BodyError::NonFinite { what: "body definition" });
        }

        let mut body = Self {
            id,
            body_type: def.body_type,
            shapes: def.shapes,
            material: def.material,
            position: def.position,
            angle: def.angle,
            linear_velocity: def.linear_velocity,
            angular_velocity: def.angular_velocity,
            force: Vector2::ZERO,
            torque: 0.0,
            mass: 0.0,
            inv_mass: 0.0,
            inertia: 0.0,
            inv_inertia: 0.0,
            linear_damping: def.linear_damping,
            angular_damping: def.angular_damping,
            group: def.group,
            category: def.category,
            mask: def.mask,
            is_attractor: def.is_attractor,
            sleeping: false,
            quiet_frames: 0,
            poisoned: false,
        };
        body.compute_mass();
        Ok(body)
    }

    /// Derive mass and inertia from the shape list and material density.
    /// Non-dynamic bodies keep zero inverses (infinite mass).
    pub(crate) fn compute_mass(&mut self) {
        let mut mass = 0.0;
        let mut inertia = 0.0;
        for shape in &self.shapes {
            let (m, i) = shape.mass_properties(self.material.density);
            mass += m;
            inertia += i;
        }
        self.mass = mass;
        self.inertia = inertia;

        if self.body_type == BodyType::Dynamic && mass > 0.0 {
            self.inv_mass = 1.0 / mass;
            self.inv_inertia = if inertia > 0.0 { 1.0 / inertia } else { 0.0 };
        } else {
            self.inv_mass = 0.0;
            self.inv_inertia = 0.0;
        }
    }

    /// World AABB: union of the transformed shape AABBs. This is the key the
    /// spatial index uses.
    pub fn aabb(&self) -> Aabb {
        let mut out: Option<Aabb> = None;
        for shape in &self.shapes {
            let aabb = shape.aabb(self.position, self.angle);
            out = Some(match out {
                Some(acc) => acc.union(&aabb),
                None => aabb,
            });
        }
        out.unwrap_or(Aabb::new(self.position, self.position))
    }

    /// Group/category/mask filter. Bodies sharing a non-zero group are
    /// mutually exempt; otherwise both category-mask directions must match.
    pub fn should_collide(&self, other: &RigidBody) -> bool {
        if self.group != 0 && self.group == other.group {
            return false;
        }
        (self.category & other.mask) != 0 && (other.category & self.mask) != 0
    }

    /// Velocity of the body material at a world point.
    pub fn velocity_at(&self, world_point: Vector2) -> Vector2 {
        self.linear_velocity + cross_sv(self.angular_velocity, world_point - self.position)
    }

    /// Apply an impulse at lever arm `r` from the center. A no-op for bodies
    /// with infinite mass.
    #[inline]
    pub(crate) fn impulse_at(&mut self, impulse: Vector2, r: Vector2) {
        self.linear_velocity += impulse * self.inv_mass;
        self.angular_velocity += r.perp_dot(impulse) * self.inv_inertia;
    }

    pub(crate) fn wake(&mut self) {
        self.sleeping = false;
        self.quiet_frames = 0;
    }

    pub(crate) fn state_is_finite(&self) -> bool {
        self.position.is_finite()
            && self.angle.is_finite()
            && self.linear_velocity.is_finite()
            && self.angular_velocity.is_finite()
    }
}

/// Stable label for the geometric feature pair that produced a contact.
/// Deterministic for identical geometry, so warm-start lookups survive
/// across frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FeatureId(u32);

impl FeatureId {
    /// Circle contacts have a single undifferentiated feature.
    pub const CIRCLE: FeatureId = FeatureId(u32::MAX);

    /// Clipped polygon-polygon contact: reference edge index + incident
    /// vertex index.
    pub fn clip(reference_edge: usize, incident_vertex: usize) -> Self {
        FeatureId(((reference_edge as u32 & 0x3fff) << 16) | (incident_vertex as u32 & 0xffff))
    }

    /// Circle resting against a polygon face.
    pub fn face(edge: usize) -> Self {
        FeatureId(0x4000_0000 | (edge as u32 & 0xffff))
    }

    /// Circle against a polygon corner.
    pub fn vertex(vertex: usize) -> Self {
        FeatureId(0x8000_0000 | (vertex as u32 & 0xffff))
    }
}

/// One touching point between two shapes.
#[derive(Debug, Clone, Copy)]
pub struct ManifoldPoint {
    /// World-space contact point.
    pub point: Vector2,
    /// Penetration depth, `>= 0`.
    pub depth: Scalar,
    pub feature: FeatureId,
    /// Accumulated impulses, seeded from the warm-start cache.
    pub normal_impulse: Scalar,
    pub tangent_impulse: Scalar,
    // Solver scratch, populated by presolve.
    pub(crate) r_a: Vector2,
    pub(crate) r_b: Vector2,
    pub(crate) normal_mass: Scalar,
    pub(crate) tangent_mass: Scalar,
    pub(crate) restitution_bias: Scalar,
}

impl ManifoldPoint {
    pub(crate) fn new(point: Vector2, depth: Scalar, feature: FeatureId) -> Self {
        Self {
            point,
            depth,
            feature,
            normal_impulse: 0.0,
            tangent_impulse: 0.0,
            r_a: Vector2::ZERO,
            r_b: Vector2::ZERO,
            normal_mass: 0.0,
            tangent_mass: 0.0,
            restitution_bias: 0.0,
        }
    }
}

/// 1-2 contact points for one shape pair in one step. The normal is a unit
/// vector pointing from body A toward body B; the tangent is its
/// counter-clockwise perpendicular.
#[derive(Debug, Clone)]
pub struct ContactManifold {
    pub body_a: BodyId,
    pub body_b: BodyId,
    pub shape_a: u16,
    pub shape_b: u16,
    pub normal: Vector2,
    pub tangent: Vector2,
    /// Combined friction/restitution, fixed by presolve for the whole solve.
    pub friction: Scalar,
    pub restitution: Scalar,
    pub points: ArrayVec<ManifoldPoint, 2>,
}

impl ContactManifold {
    pub(crate) fn new(
        body_a: BodyId,
        body_b: BodyId,
        shape_a: u16,
        shape_b: u16,
        normal: Vector2,
    ) -> Self {
        Self {
            body_a,
            body_b,
            shape_a,
            shape_b,
            normal,
            tangent: normal.perp(),
            friction: 0.0,
            restitution: 0.0,
            points: ArrayVec::new(),
        }
    }

    /// Warm-start cache key for one of this manifold's points.
    pub fn key(&self, point: &ManifoldPoint) -> ContactKey {
        ContactKey {
            body_a: self.body_a,
            body_b: self.body_b,
            shape_a: self.shape_a,
            shape_b: self.shape_b,
            feature: point.feature,
        }
    }
}

/// Key of the persistent contact cache: body pair + shape pair + feature.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ContactKey {
    pub body_a: BodyId,
    pub body_b: BodyId,
    pub shape_a: u16,
    pub shape_b: u16,
    pub feature: FeatureId,
}
