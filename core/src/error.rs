//! Typed errors for the public world API.
//!
//! The engine never panics across the public surface: invalid input and
//! stale ids come back on the originating call, and per-step numerical
//! failures come back from [`crate::world::PhysicsWorld::step`].

use thiserror::Error;

use crate::math::Scalar;
use crate::types::{BodyId, ConstraintId};

/// Rejected shape or body definitions.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum BodyError {
    #[error("non-finite value in {what}")]
    NonFinite { what: &'static str },

    #[error("circle radius must be positive, got {radius}")]
    InvalidRadius { radius: Scalar },

    #[error("polygon needs at least 3 vertices, got {count}")]
    TooFewVertices { count: usize },

    #[error("polygon vertices must form a convex counter-clockwise loop")]
    NotConvex,

    #[error("body definition has no shapes")]
    NoShapes,
}

/// State errors: the entity a call names does not exist (never did, or was
/// removed).
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorldError {
    #[error("no body with id {0}")]
    UnknownBody(BodyId),

    #[error("no constraint with id {0}")]
    UnknownConstraint(ConstraintId),

    #[error("non-finite value passed to a world call")]
    NonFiniteArgument,
}

/// Pipeline errors surfaced as the result of a `step` call.
#[derive(Error, Debug, Clone, Copy, PartialEq)]
pub enum StepError {
    #[error("step timestep must be positive and finite, got {dt}")]
    InvalidTimestep { dt: Scalar },

    #[error("step requires at least one substep")]
    ZeroSubsteps,

    #[error("body {body} reached a non-finite position or velocity; step aborted")]
    NonFiniteState { body: BodyId },
}
