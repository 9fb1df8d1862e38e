//! Tumble core: an impulse-based 2D rigid-body physics engine.
//!
//! A [`world::PhysicsWorld`] owns bodies (circles and convex polygons,
//! static, dynamic, or kinematic), user joints, a pluggable spatial index,
//! and the warm-started sequential-impulse solver. One
//! [`world::PhysicsWorld::step`] call runs the full pipeline: force and
//! attractor integration, broad-phase pair pruning, narrow-phase manifold
//! generation, the velocity solver, integration, position correction, and
//! sleeping.
//!
//! Scalars are `f32` by default; enable the `f64` feature for
//! double-precision worlds. The `parallel` feature moves narrow-phase
//! manifold generation onto the rayon thread pool.

pub mod broadphase;
pub mod constraints;
pub mod error;
pub mod math;
pub mod narrowphase;
pub mod types;
pub mod world;

mod integrate;
mod resolve;
mod sleep;

pub use broadphase::BroadphaseKind;
pub use constraints::{Constraint, DistanceConstraint, RevoluteConstraint, SpringParams};
pub use error::{BodyError, StepError, WorldError};
pub use math::{Aabb, Scalar, Vector2};
pub use types::{
    BodyId, BodyType, ConstraintId, ContactKey, ContactManifold, FeatureId, ManifoldPoint,
    Material, Polygon, RigidBody, RigidBodyDef, Shape,
};
pub use world::{PhysicsWorld, RayHit, WorldConfig};
