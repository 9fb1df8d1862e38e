//! Semi-implicit Euler integration.

use crate::math::{Scalar, Vector2};
use crate::types::{BodyType, RigidBody};

/// Accelerations into velocities: accumulated force, gravity, and the
/// attractor acceleration the world computed for this body, followed by
/// damping. Forces are deliberately not cleared here; the world clears them
/// once at the end of the full step so every substep sees the same input.
pub(crate) fn integrate_forces(
    body: &mut RigidBody,
    gravity: Vector2,
    attractor_accel: Vector2,
    dt: Scalar,
) {
    if body.body_type != BodyType::Dynamic || body.sleeping {
        return;
    }

    body.linear_velocity += (body.force * body.inv_mass + gravity + attractor_accel) * dt;
    body.angular_velocity += body.torque * body.inv_inertia * dt;

    if body.linear_damping != 0.0 {
        body.linear_velocity *= 1.0 / (1.0 + body.linear_damping * dt);
    }
    if body.angular_damping != 0.0 {
        body.angular_velocity *= 1.0 / (1.0 + body.angular_damping * dt);
    }
}

/// Velocities into poses. Kinematic bodies move here on their user-set
/// velocities; static bodies never move.
pub(crate) fn integrate_velocities(body: &mut RigidBody, dt: Scalar) {
    if body.body_type == BodyType::Static || body.sleeping {
        return;
    }
    body.position += body.linear_velocity * dt;
    body.angle += body.angular_velocity * dt;
}
