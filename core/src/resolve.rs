//! Contact solver.
//!
//! Sequential impulses in the Box2D lineage: presolve computes effective
//! masses and the restitution bias once per substep, warm starting re-applies
//! the impulses cached at the same contact features last step, the velocity
//! iterations clamp *accumulated* impulses (normal to non-negative, tangent
//! to the Coulomb cone), and penetration left over after integration is
//! removed by a non-linear Gauss-Seidel position pass that works directly on
//! positions and angles.

use crate::math::{EPSILON, Scalar, cross_sv};
use crate::narrowphase;
use crate::types::{BodyId, BodyType, ContactManifold, Material, RigidBody};

/// Solver tunables, copied out of the world configuration each step.
#[derive(Clone, Copy)]
pub(crate) struct SolverParams {
    pub correction_bias: Scalar,
    pub slop: Scalar,
    pub max_correction: Scalar,
    pub restitution_threshold: Scalar,
}

/// Distinct mutable borrows of two bodies in the arena. Returns `None` if
/// either slot is vacant.
pub(crate) fn two_mut(
    bodies: &mut [Option<RigidBody>],
    a: BodyId,
    b: BodyId,
) -> Option<(&mut RigidBody, &mut RigidBody)> {
    let (ai, bi) = (a as usize, b as usize);
    debug_assert_ne!(ai, bi);
    if ai < bi {
        let (left, right) = bodies.split_at_mut(bi);
        match (left[ai].as_mut(), right[0].as_mut()) {
            (Some(x), Some(y)) => Some((x, y)),
            _ => None,
        }
    } else {
        let (left, right) = bodies.split_at_mut(ai);
        match (right[0].as_mut(), left[bi].as_mut()) {
            (Some(x), Some(y)) => Some((x, y)),
            _ => None,
        }
    }
}

/// Per-substep contact preparation: combined material coefficients, lever
/// arms, effective masses along normal and tangent, and the restitution
/// bias. Bias and tangent stay fixed for the whole solve.
pub(crate) fn presolve(
    bodies: &mut [Option<RigidBody>],
    manifolds: &mut [ContactManifold],
    restitution_threshold: Scalar,
) {
    for manifold in manifolds.iter_mut() {
        let Some((a, b)) = two_mut(bodies, manifold.body_a, manifold.body_b) else {
            continue;
        };

        manifold.friction = Material::combined_friction(&a.material, &b.material);
        manifold.restitution = Material::combined_restitution(&a.material, &b.material);

        let normal = manifold.normal;
        let tangent = manifold.tangent;

        for point in &mut manifold.points {
            point.r_a = point.point - a.position;
            point.r_b = point.point - b.position;

            let rn_a = point.r_a.perp_dot(normal);
            let rn_b = point.r_b.perp_dot(normal);
            let k_n = a.inv_mass
                + b.inv_mass
                + rn_a * rn_a * a.inv_inertia
                + rn_b * rn_b * b.inv_inertia;
            point.normal_mass = if k_n > EPSILON { 1.0 / k_n } else { 0.0 };

            let rt_a = point.r_a.perp_dot(tangent);
            let rt_b = point.r_b.perp_dot(tangent);
            let k_t = a.inv_mass
                + b.inv_mass
                + rt_a * rt_a * a.inv_inertia
                + rt_b * rt_b * b.inv_inertia;
            point.tangent_mass = if k_t > EPSILON { 1.0 / k_t } else { 0.0 };

            // Bounce only above the threshold approach speed, so resting
            // contacts don't jitter from gravity-scale velocities.
            let v_rel = b.linear_velocity + cross_sv(b.angular_velocity, point.r_b)
                - a.linear_velocity
                - cross_sv(a.angular_velocity, point.r_a);
            let vn = v_rel.dot(normal);
            point.restitution_bias = if vn < -restitution_threshold {
                -manifold.restitution * vn
            } else {
                0.0
            };
        }
    }
}

/// Re-apply the accumulated impulses seeded from the contact cache, giving
/// the iterative solver a head start. Dramatically improves stack stability.
pub(crate) fn warm_start(bodies: &mut [Option<RigidBody>], manifolds: &[ContactManifold]) {
    for manifold in manifolds {
        let Some((a, b)) = two_mut(bodies, manifold.body_a, manifold.body_b) else {
            continue;
        };
        for point in &manifold.points {
            if point.normal_impulse == 0.0 && point.tangent_impulse == 0.0 {
                continue;
            }
            let impulse =
                manifold.normal * point.normal_impulse + manifold.tangent * point.tangent_impulse;
            a.impulse_at(-impulse, point.r_a);
            b.impulse_at(impulse, point.r_b);
        }
    }
}

/// One Gauss-Seidel sweep over all manifolds at the velocity level.
pub(crate) fn solve_velocity(bodies: &mut [Option<RigidBody>], manifolds: &mut [ContactManifold]) {
    for manifold in manifolds.iter_mut() {
        let Some((a, b)) = two_mut(bodies, manifold.body_a, manifold.body_b) else {
            continue;
        };
        if a.body_type != BodyType::Dynamic && b.body_type != BodyType::Dynamic {
            continue;
        }

        let normal = manifold.normal;
        let tangent = manifold.tangent;

        for point in &mut manifold.points {
            // Normal impulse; the accumulated value is clamped non-negative
            // (contacts push, never pull) and only the delta is applied.
            let v_rel = b.linear_velocity + cross_sv(b.angular_velocity, point.r_b)
                - a.linear_velocity
                - cross_sv(a.angular_velocity, point.r_a);
            let vn = v_rel.dot(normal);
            let delta = -(vn - point.restitution_bias) * point.normal_mass;

            let old = point.normal_impulse;
            point.normal_impulse = (old + delta).max(0.0);
            let applied = point.normal_impulse - old;

            let impulse = normal * applied;
            a.impulse_at(-impulse, point.r_a);
            b.impulse_at(impulse, point.r_b);

            // Friction against the updated velocities, accumulated impulse
            // clamped to the cone |jt| <= mu * jn.
            let v_rel = b.linear_velocity + cross_sv(b.angular_velocity, point.r_b)
                - a.linear_velocity
                - cross_sv(a.angular_velocity, point.r_a);
            let vt = v_rel.dot(tangent);
            let delta_t = -vt * point.tangent_mass;

            let max_friction = manifold.friction * point.normal_impulse;
            let old_t = point.tangent_impulse;
            point.tangent_impulse = (old_t + delta_t).clamp(-max_friction, max_friction);
            let applied_t = point.tangent_impulse - old_t;

            let impulse = tangent * applied_t;
            a.impulse_at(-impulse, point.r_a);
            b.impulse_at(impulse, point.r_b);
        }
    }
}

/// One non-linear Gauss-Seidel position sweep. Penetration is re-measured
/// from the *current* poses (the narrow-phase runs again for the shape pair)
/// and a pseudo-impulse is applied straight to positions and angles, so each
/// contact converges monotonically regardless of what earlier corrections
/// moved.
pub(crate) fn solve_position(
    bodies: &mut [Option<RigidBody>],
    manifolds: &[ContactManifold],
    params: &SolverParams,
) {
    for manifold in manifolds {
        let fresh = {
            let (Some(a), Some(b)) = (
                bodies.get(manifold.body_a as usize).and_then(Option::as_ref),
                bodies.get(manifold.body_b as usize).and_then(Option::as_ref),
            ) else {
                continue;
            };
            if a.body_type != BodyType::Dynamic && b.body_type != BodyType::Dynamic {
                continue;
            }
            narrowphase::collide_shapes(
                a,
                manifold.shape_a,
                &a.shapes[manifold.shape_a as usize],
                b,
                manifold.shape_b,
                &b.shapes[manifold.shape_b as usize],
            )
        };
        let Some(fresh) = fresh else { continue };

        let normal = fresh.normal;
        for point in &fresh.points {
            let depth = point.depth;
            if depth <= params.slop {
                continue;
            }

            let Some((a, b)) = two_mut(bodies, manifold.body_a, manifold.body_b) else {
                continue;
            };

            let r_a = point.point - a.position;
            let r_b = point.point - b.position;
            let rn_a = r_a.perp_dot(normal);
            let rn_b = r_b.perp_dot(normal);
            let k = a.inv_mass
                + b.inv_mass
                + rn_a * rn_a * a.inv_inertia
                + rn_b * rn_b * b.inv_inertia;
            if k <= EPSILON {
                continue;
            }

            let correction =
                (params.correction_bias * (depth - params.slop)).min(params.max_correction);
            let impulse = normal * (correction / k);

            a.position -= impulse * a.inv_mass;
            a.angle -= r_a.perp_dot(impulse) * a.inv_inertia;
            b.position += impulse * b.inv_mass;
            b.angle += r_b.perp_dot(impulse) * b.inv_inertia;
        }
    }
}

/// Refresh stored depths and points from the final poses so the manifold
/// list handed to callers reflects what the position solver achieved.
/// Features that no longer touch drop to zero depth.
pub(crate) fn refresh_depths(bodies: &[Option<RigidBody>], manifolds: &mut [ContactManifold]) {
    for manifold in manifolds.iter_mut() {
        let (Some(a), Some(b)) = (
            bodies.get(manifold.body_a as usize).and_then(Option::as_ref),
            bodies.get(manifold.body_b as usize).and_then(Option::as_ref),
        ) else {
            continue;
        };
        let fresh = narrowphase::collide_shapes(
            a,
            manifold.shape_a,
            &a.shapes[manifold.shape_a as usize],
            b,
            manifold.shape_b,
            &b.shapes[manifold.shape_b as usize],
        );
        for point in &mut manifold.points {
            let refreshed = fresh
                .as_ref()
                .and_then(|m| m.points.iter().find(|p| p.feature == point.feature));
            match refreshed {
                Some(p) => {
                    point.point = p.point;
                    point.depth = p.depth;
                }
                None => point.depth = 0.0,
            }
        }
    }
}
