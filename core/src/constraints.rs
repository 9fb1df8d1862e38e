//! User joint constraints.
//!
//! Two kinds cover the representative joints: a distance joint (rigid rod,
//! or soft spring when [`SpringParams`] are attached) and a revolute joint
//! (pin/hinge). Every kind implements the same solver protocol as contacts:
//! `presolve`, `warm_start`, `solve_velocity`, `solve_position`, and the
//! world interleaves them with the contact passes.

use crate::math::{EPSILON, Scalar, Vector2, cross_sv};
use crate::resolve::{SolverParams, two_mut};
use crate::types::{BodyId, BodyType, ConstraintId, RigidBody};

const TAU: Scalar = core::f64::consts::TAU as Scalar;

/// Soft-spring behavior for a distance joint. The spring is mass-normalized:
/// `frequency_hz` is the oscillation frequency of the anchor pair,
/// `damping_ratio` is 1.0 at critical damping.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SpringParams {
    pub frequency_hz: Scalar,
    pub damping_ratio: Scalar,
}

/// Keeps the anchors of two bodies at a fixed distance (or pulls them toward
/// it when sprung). Anchors are body-local.
#[derive(Debug, Clone)]
pub struct DistanceConstraint {
    pub id: ConstraintId,
    pub body_a: BodyId,
    pub body_b: BodyId,
    pub anchor_a: Vector2,
    pub anchor_b: Vector2,
    pub rest_length: Scalar,
    pub spring: Option<SpringParams>,
    /// Accumulated impulse along the constraint axis.
    pub impulse: Scalar,
    // Presolve scratch.
    normal: Vector2,
    r_a: Vector2,
    r_b: Vector2,
    mass: Scalar,
    spring_pending: bool,
}

impl DistanceConstraint {
    pub fn new(
        body_a: BodyId,
        body_b: BodyId,
        anchor_a: Vector2,
        anchor_b: Vector2,
        rest_length: Scalar,
    ) -> Self {
        Self {
            id: 0,
            body_a,
            body_b,
            anchor_a,
            anchor_b,
            rest_length,
            spring: None,
            impulse: 0.0,
            normal: Vector2::X,
            r_a: Vector2::ZERO,
            r_b: Vector2::ZERO,
            mass: 0.0,
            spring_pending: false,
        }
    }

    pub fn with_spring(mut self, spring: SpringParams) -> Self {
        self.spring = Some(spring);
        self
    }
}

/// Pins the anchors of two bodies to the same world point while leaving
/// relative rotation free.
#[derive(Debug, Clone)]
pub struct RevoluteConstraint {
    pub id: ConstraintId,
    pub body_a: BodyId,
    pub body_b: BodyId,
    pub anchor_a: Vector2,
    pub anchor_b: Vector2,
    /// Accumulated impulse on the anchor pair.
    pub impulse: Vector2,
    // Presolve scratch: lever arms and the 2x2 effective-mass matrix.
    r_a: Vector2,
    r_b: Vector2,
    k11: Scalar,
    k12: Scalar,
    k22: Scalar,
}

impl RevoluteConstraint {
    pub fn new(body_a: BodyId, body_b: BodyId, anchor_a: Vector2, anchor_b: Vector2) -> Self {
        Self {
            id: 0,
            body_a,
            body_b,
            anchor_a,
            anchor_b,
            impulse: Vector2::ZERO,
            r_a: Vector2::ZERO,
            r_b: Vector2::ZERO,
            k11: 0.0,
            k12: 0.0,
            k22: 0.0,
        }
    }
}

#[derive(Debug, Clone)]
pub enum Constraint {
    Distance(DistanceConstraint),
    Revolute(RevoluteConstraint),
}

impl Constraint {
    pub fn id(&self) -> ConstraintId {
        match self {
            Constraint::Distance(c) => c.id,
            Constraint::Revolute(c) => c.id,
        }
    }

    pub(crate) fn set_id(&mut self, id: ConstraintId) {
        match self {
            Constraint::Distance(c) => c.id = id,
            Constraint::Revolute(c) => c.id = id,
        }
    }

    pub fn bodies(&self) -> (BodyId, BodyId) {
        match self {
            Constraint::Distance(c) => (c.body_a, c.body_b),
            Constraint::Revolute(c) => (c.body_a, c.body_b),
        }
    }

    pub(crate) fn reset_impulse(&mut self) {
        match self {
            Constraint::Distance(c) => c.impulse = 0.0,
            Constraint::Revolute(c) => c.impulse = Vector2::ZERO,
        }
    }

    pub(crate) fn presolve(&mut self, bodies: &mut [Option<RigidBody>], _dt: Scalar) {
        match self {
            Constraint::Distance(c) => {
                let Some((a, b)) = two_mut(bodies, c.body_a, c.body_b) else { return };
                let world_a = a.position + Vector2::from_angle(a.angle).rotate(c.anchor_a);
                let world_b = b.position + Vector2::from_angle(b.angle).rotate(c.anchor_b);

                let delta = world_b - world_a;
                let length = delta.length();
                c.normal = if length > EPSILON { delta / length } else { Vector2::X };
                c.r_a = world_a - a.position;
                c.r_b = world_b - b.position;

                let rn_a = c.r_a.perp_dot(c.normal);
                let rn_b = c.r_b.perp_dot(c.normal);
                let k = a.inv_mass
                    + b.inv_mass
                    + rn_a * rn_a * a.inv_inertia
                    + rn_b * rn_b * b.inv_inertia;
                c.mass = if k > EPSILON { 1.0 / k } else { 0.0 };
                c.spring_pending = c.spring.is_some();
                // A spring's impulse is not a constraint residual; re-applying
                // it next substep would double the force.
                if c.spring.is_some() {
                    c.impulse = 0.0;
                }
            }
            Constraint::Revolute(c) => {
                let Some((a, b)) = two_mut(bodies, c.body_a, c.body_b) else { return };
                let world_a = a.position + Vector2::from_angle(a.angle).rotate(c.anchor_a);
                let world_b = b.position + Vector2::from_angle(b.angle).rotate(c.anchor_b);
                c.r_a = world_a - a.position;
                c.r_b = world_b - b.position;

                c.k11 = a.inv_mass
                    + b.inv_mass
                    + c.r_a.y * c.r_a.y * a.inv_inertia
                    + c.r_b.y * c.r_b.y * b.inv_inertia;
                c.k12 = -c.r_a.x * c.r_a.y * a.inv_inertia - c.r_b.x * c.r_b.y * b.inv_inertia;
                c.k22 = a.inv_mass
                    + b.inv_mass
                    + c.r_a.x * c.r_a.x * a.inv_inertia
                    + c.r_b.x * c.r_b.x * b.inv_inertia;
            }
        }
    }

    pub(crate) fn warm_start(&mut self, bodies: &mut [Option<RigidBody>]) {
        match self {
            Constraint::Distance(c) => {
                if c.impulse == 0.0 || c.spring.is_some() {
                    return;
                }
                let Some((a, b)) = two_mut(bodies, c.body_a, c.body_b) else { return };
                let impulse = c.normal * c.impulse;
                a.impulse_at(-impulse, c.r_a);
                b.impulse_at(impulse, c.r_b);
            }
            Constraint::Revolute(c) => {
                if c.impulse == Vector2::ZERO {
                    return;
                }
                let Some((a, b)) = two_mut(bodies, c.body_a, c.body_b) else { return };
                a.impulse_at(-c.impulse, c.r_a);
                b.impulse_at(c.impulse, c.r_b);
            }
        }
    }

    pub(crate) fn solve_velocity(&mut self, bodies: &mut [Option<RigidBody>], dt: Scalar) {
        match self {
            Constraint::Distance(c) => {
                let Some((a, b)) = two_mut(bodies, c.body_a, c.body_b) else { return };
                if a.body_type != BodyType::Dynamic && b.body_type != BodyType::Dynamic {
                    return;
                }

                let v_rel = b.linear_velocity + cross_sv(b.angular_velocity, c.r_b)
                    - a.linear_velocity
                    - cross_sv(a.angular_velocity, c.r_a);
                let vn = v_rel.dot(c.normal);

                let lambda = match c.spring {
                    Some(spring) if dt > 0.0 => {
                        // Spring-damper impulse applied once per substep; the
                        // remaining iterations leave the axis free.
                        if !c.spring_pending {
                            return;
                        }
                        c.spring_pending = false;
                        let world_a =
                            a.position + Vector2::from_angle(a.angle).rotate(c.anchor_a);
                        let world_b =
                            b.position + Vector2::from_angle(b.angle).rotate(c.anchor_b);
                        let stretch = (world_b - world_a).length() - c.rest_length;

                        let omega = TAU * spring.frequency_hz;
                        let stiffness = omega * omega;
                        let damping = 2.0 * spring.damping_ratio * omega;
                        -(stiffness * stretch + damping * vn) * dt * c.mass
                    }
                    _ => -vn * c.mass,
                };

                c.impulse += lambda;
                let impulse = c.normal * lambda;
                a.impulse_at(-impulse, c.r_a);
                b.impulse_at(impulse, c.r_b);
            }
            Constraint::Revolute(c) => {
                let Some((a, b)) = two_mut(bodies, c.body_a, c.body_b) else { return };
                if a.body_type != BodyType::Dynamic && b.body_type != BodyType::Dynamic {
                    return;
                }

                let v_rel = b.linear_velocity + cross_sv(b.angular_velocity, c.r_b)
                    - a.linear_velocity
                    - cross_sv(a.angular_velocity, c.r_a);

                let det = c.k11 * c.k22 - c.k12 * c.k12;
                if det.abs() < EPSILON {
                    return;
                }
                let inv_det = 1.0 / det;
                let lambda = Vector2::new(
                    -inv_det * (c.k22 * v_rel.x - c.k12 * v_rel.y),
                    -inv_det * (c.k11 * v_rel.y - c.k12 * v_rel.x),
                );

                c.impulse += lambda;
                a.impulse_at(-lambda, c.r_a);
                b.impulse_at(lambda, c.r_b);
            }
        }
    }

    /// Baumgarte-style position correction. Spring joints skip it: their
    /// stretch is the feature, not an error.
    pub(crate) fn solve_position(
        &mut self,
        bodies: &mut [Option<RigidBody>],
        params: &SolverParams,
    ) {
        match self {
            Constraint::Distance(c) => {
                if c.spring.is_some() {
                    return;
                }
                let Some((a, b)) = two_mut(bodies, c.body_a, c.body_b) else { return };
                if a.body_type != BodyType::Dynamic && b.body_type != BodyType::Dynamic {
                    return;
                }

                let world_a = a.position + Vector2::from_angle(a.angle).rotate(c.anchor_a);
                let world_b = b.position + Vector2::from_angle(b.angle).rotate(c.anchor_b);
                let delta = world_b - world_a;
                let length = delta.length();
                if length < EPSILON {
                    return;
                }
                let normal = delta / length;
                let error = length - c.rest_length;

                let r_a = world_a - a.position;
                let r_b = world_b - b.position;
                let rn_a = r_a.perp_dot(normal);
                let rn_b = r_b.perp_dot(normal);
                let k = a.inv_mass
                    + b.inv_mass
                    + rn_a * rn_a * a.inv_inertia
                    + rn_b * rn_b * b.inv_inertia;
                if k <= EPSILON {
                    return;
                }

                let correction = (error * params.correction_bias)
                    .clamp(-params.max_correction, params.max_correction);
                let impulse = normal * (correction / k);

                a.position += impulse * a.inv_mass;
                a.angle += r_a.perp_dot(impulse) * a.inv_inertia;
                b.position -= impulse * b.inv_mass;
                b.angle -= r_b.perp_dot(impulse) * b.inv_inertia;
            }
            Constraint::Revolute(c) => {
                let Some((a, b)) = two_mut(bodies, c.body_a, c.body_b) else { return };
                if a.body_type != BodyType::Dynamic && b.body_type != BodyType::Dynamic {
                    return;
                }

                let world_a = a.position + Vector2::from_angle(a.angle).rotate(c.anchor_a);
                let world_b = b.position + Vector2::from_angle(b.angle).rotate(c.anchor_b);
                let error = world_b - world_a;

                let r_a = world_a - a.position;
                let r_b = world_b - b.position;
                let k11 = a.inv_mass
                    + b.inv_mass
                    + r_a.y * r_a.y * a.inv_inertia
                    + r_b.y * r_b.y * b.inv_inertia;
                let k12 = -r_a.x * r_a.y * a.inv_inertia - r_b.x * r_b.y * b.inv_inertia;
                let k22 = a.inv_mass
                    + b.inv_mass
                    + r_a.x * r_a.x * a.inv_inertia
                    + r_b.x * r_b.x * b.inv_inertia;
                let det = k11 * k22 - k12 * k12;
                if det.abs() < EPSILON {
                    return;
                }
                let inv_det = 1.0 / det;

                let target = error * params.correction_bias;
                let target = if target.length() > params.max_correction {
                    target.normalize() * params.max_correction
                } else {
                    target
                };
                let impulse = Vector2::new(
                    inv_det * (k22 * target.x - k12 * target.y),
                    inv_det * (k11 * target.y - k12 * target.x),
                );

                a.position += impulse * a.inv_mass;
                a.angle += r_a.perp_dot(impulse) * a.inv_inertia;
                b.position -= impulse * b.inv_mass;
                b.angle -= r_b.perp_dot(impulse) * b.inv_inertia;
            }
        }
    }
}
