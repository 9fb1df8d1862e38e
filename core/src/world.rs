//! The world: entity arena, configuration, and the per-step pipeline.
//!
//! A [`PhysicsWorld`] owns every body, constraint, the spatial index, and the
//! warm-start contact cache. Bodies and constraints are referenced by stable
//! integer ids; nothing outside the world holds references into its storage.
//! `step` drives one frame through the fixed stage order: integrate
//! accelerations, broad-phase, narrow-phase, presolve, velocity iterations,
//! integrate velocities, position iterations, then sleeping and cleanup.
//! `step` blocks the caller and the world must not be touched from another
//! thread while it runs; between steps it may be mutated freely.

use rustc_hash::FxHashMap;

use crate::broadphase::{Broadphase, BroadphaseKind, Bvh, SpatialHashGrid};
use crate::constraints::Constraint;
use crate::error::{BodyError, StepError, WorldError};
use crate::integrate::{integrate_forces, integrate_velocities};
use crate::math::{Aabb, EPSILON, Scalar, Vector2};
use crate::narrowphase;
use crate::resolve::{self, SolverParams};
use crate::sleep::{self, SleepParams};
use crate::types::{
    BodyId, BodyType, ContactKey, ContactManifold, ConstraintId, Material, RigidBody,
    RigidBodyDef, Shape,
};

/// Tunables shared by every step. Individual setters exist for the common
/// ones; the struct can also be swapped wholesale with
/// [`PhysicsWorld::set_config`].
#[derive(Debug, Clone)]
pub struct WorldConfig {
    pub broadphase: BroadphaseKind,
    /// Coverage rectangle of the spatial hash grid. Bodies outside are
    /// clamped to edge cells (a warning, not an error).
    pub grid_bounds: Aabb,
    pub grid_cell_width: Scalar,
    pub grid_cell_height: Scalar,
    pub allow_sleeping: bool,
    /// Seed contact impulses from the previous step's cache.
    pub warm_starting: bool,
    /// Fraction of the remaining penetration removed per position iteration,
    /// in `(0, 1]`.
    pub correction_bias: Scalar,
    /// Penetration below this depth is left alone.
    pub penetration_slop: Scalar,
    /// Per-iteration cap on positional correction distance.
    pub max_position_correction: Scalar,
    /// Approach speeds below this produce no restitution bounce.
    pub restitution_velocity_threshold: Scalar,
    pub linear_sleep_threshold: Scalar,
    pub angular_sleep_threshold: Scalar,
    /// Consecutive quiet steps before a body may sleep.
    pub sleep_frames: u32,
    /// Newtonian constant used by attractor bodies.
    pub gravitational_constant: Scalar,
    /// Detect NaN/Inf body state after each substep and abort the step.
    /// Defaults to on in debug builds.
    pub validate_finite: bool,
}

impl Default for WorldConfig {
    fn default() -> Self {
        Self {
            broadphase: BroadphaseKind::default(),
            grid_bounds: Aabb::new(Vector2::new(-128.0, -128.0), Vector2::new(128.0, 128.0)),
            grid_cell_width: 4.0,
            grid_cell_height: 4.0,
            allow_sleeping: true,
            warm_starting: true,
            correction_bias: 0.2,
            penetration_slop: 0.005,
            max_position_correction: 0.2,
            restitution_velocity_threshold: 1.0,
            linear_sleep_threshold: 0.1,
            angular_sleep_threshold: 0.1,
            sleep_frames: 30,
            gravitational_constant: 6.674e-11,
            validate_finite: cfg!(debug_assertions),
        }
    }
}

/// Nearest body hit by a ray.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RayHit {
    pub body: BodyId,
    pub point: Vector2,
    pub distance: Scalar,
}

#[derive(Debug, Clone, Copy)]
struct CachedImpulse {
    normal: Scalar,
    tangent: Scalar,
    step: u64,
}

pub struct PhysicsWorld {
    bodies: Vec<Option<RigidBody>>,
    free_ids: Vec<BodyId>,
    constraints: Vec<Constraint>,
    next_constraint_id: ConstraintId,
    gravity: Vector2,
    config: WorldConfig,
    broadphase: Broadphase,
    /// Warm-start cache: contact feature -> accumulated impulses, stamped
    /// with the step that last refreshed them.
    warm_cache: FxHashMap<ContactKey, CachedImpulse>,
    step_index: u64,
    contact_handler: Option<Box<dyn FnMut(&[ContactManifold])>>,
    // Per-step buffers, reused so the hot path does not reallocate.
    manifolds: Vec<ContactManifold>,
    pairs: Vec<(BodyId, BodyId)>,
    aabbs: Vec<(BodyId, Aabb)>,
    /// Whether the spatial index still reflects current body poses; setters
    /// that move bodies clear it and queries fall back to a linear scan.
    index_in_sync: bool,
}

impl PhysicsWorld {
    pub fn new(gravity: Vector2) -> Self {
        Self::with_config(gravity, WorldConfig::default())
    }

    pub fn with_config(gravity: Vector2, config: WorldConfig) -> Self {
        let broadphase = make_broadphase(&config);
        Self {
            bodies: Vec::new(),
            free_ids: Vec::new(),
            constraints: Vec::new(),
            next_constraint_id: 0,
            gravity,
            config,
            broadphase,
            warm_cache: FxHashMap::default(),
            step_index: 0,
            contact_handler: None,
            manifolds: Vec::new(),
            pairs: Vec::new(),
            aabbs: Vec::new(),
            index_in_sync: false,
        }
    }

    // ------------------------------------------------------------------
    // Configuration
    // ------------------------------------------------------------------

    pub fn gravity(&self) -> Vector2 {
        self.gravity
    }

    pub fn set_gravity(&mut self, gravity: Vector2) {
        self.gravity = gravity;
    }

    pub fn config(&self) -> &WorldConfig {
        &self.config
    }

    /// Replace the whole configuration; the broad-phase structure is rebuilt
    /// on the next step.
    pub fn set_config(&mut self, config: WorldConfig) {
        self.broadphase = make_broadphase(&config);
        self.config = config;
        self.index_in_sync = false;
    }

    pub fn set_broadphase(&mut self, kind: BroadphaseKind) {
        if self.broadphase.kind() != kind {
            self.config.broadphase = kind;
            self.broadphase = make_broadphase(&self.config);
            self.index_in_sync = false;
        }
    }

    /// Bounds and cell size of the spatial hash grid.
    pub fn set_spatial_params(&mut self, bounds: Aabb, cell_width: Scalar, cell_height: Scalar) {
        self.config.grid_bounds = bounds;
        self.config.grid_cell_width = cell_width;
        self.config.grid_cell_height = cell_height;
        if self.config.broadphase == BroadphaseKind::SpatialHashGrid {
            self.broadphase = make_broadphase(&self.config);
            self.index_in_sync = false;
        }
    }

    pub fn set_allow_sleeping(&mut self, allow: bool) {
        self.config.allow_sleeping = allow;
        if !allow {
            for body in self.bodies.iter_mut().flatten() {
                body.wake();
            }
        }
    }

    pub fn set_warm_starting(&mut self, warm: bool) {
        self.config.warm_starting = warm;
        if !warm {
            self.warm_cache.clear();
        }
    }

    pub fn set_correction_bias(&mut self, bias: Scalar) {
        self.config.correction_bias = bias;
    }

    pub fn set_penetration_slop(&mut self, slop: Scalar) {
        self.config.penetration_slop = slop;
    }

    /// Handler invoked once per `step`, after the pipeline, with the final
    /// manifold list. The handler cannot reach the world; buffer any changes
    /// and apply them after `step` returns.
    pub fn set_contact_handler(&mut self, handler: impl FnMut(&[ContactManifold]) + 'static) {
        self.contact_handler = Some(Box::new(handler));
    }

    pub fn clear_contact_handler(&mut self) {
        self.contact_handler = None;
    }

    // ------------------------------------------------------------------
    // Entity management
    // ------------------------------------------------------------------

    /// Register a body, taking ownership and deriving mass and inertia from
    /// its shapes and material density.
    pub fn add_body(&mut self, def: RigidBodyDef) -> Result<BodyId, BodyError> {
        let recycled = self.free_ids.pop();
        let id = recycled.unwrap_or(self.bodies.len() as BodyId);
        let body = match RigidBody::from_def(id, def) {
            Ok(body) => body,
            Err(err) => {
                if let Some(recycled) = recycled {
                    self.free_ids.push(recycled);
                }
                return Err(err);
            }
        };

        let idx = id as usize;
        if idx >= self.bodies.len() {
            self.bodies.resize_with(idx + 1, || None);
        }
        self.bodies[idx] = Some(body);
        self.index_in_sync = false;
        Ok(id)
    }

    /// Retire a body. Constraints referencing it are dropped, as are its
    /// cached contact impulses.
    pub fn remove_body(&mut self, id: BodyId) -> Result<(), WorldError> {
        let slot = self
            .bodies
            .get_mut(id as usize)
            .ok_or(WorldError::UnknownBody(id))?;
        if slot.take().is_none() {
            return Err(WorldError::UnknownBody(id));
        }
        self.free_ids.push(id);
        self.constraints.retain(|c| {
            let (a, b) = c.bodies();
            a != id && b != id
        });
        self.warm_cache.retain(|key, _| key.body_a != id && key.body_b != id);
        self.index_in_sync = false;
        Ok(())
    }

    pub fn body(&self, id: BodyId) -> Result<&RigidBody, WorldError> {
        self.bodies
            .get(id as usize)
            .and_then(Option::as_ref)
            .ok_or(WorldError::UnknownBody(id))
    }

    /// Low-level mutable access. Does not wake the body or refresh the
    /// spatial index; prefer the setters for routine mutation.
    pub fn body_mut(&mut self, id: BodyId) -> Result<&mut RigidBody, WorldError> {
        self.index_in_sync = false;
        self.bodies
            .get_mut(id as usize)
            .and_then(Option::as_mut)
            .ok_or(WorldError::UnknownBody(id))
    }

    pub fn bodies(&self) -> impl Iterator<Item = &RigidBody> {
        self.bodies.iter().flatten()
    }

    pub fn body_count(&self) -> usize {
        self.bodies.iter().flatten().count()
    }

    /// Register a constraint; both bodies wake.
    pub fn add_constraint(&mut self, mut constraint: Constraint) -> ConstraintId {
        let id = self.next_constraint_id;
        self.next_constraint_id += 1;
        constraint.set_id(id);

        let (a, b) = constraint.bodies();
        for body_id in [a, b] {
            if let Some(body) = self.bodies.get_mut(body_id as usize).and_then(Option::as_mut) {
                body.wake();
            }
        }
        self.constraints.push(constraint);
        id
    }

    pub fn remove_constraint(&mut self, id: ConstraintId) -> Result<(), WorldError> {
        let before = self.constraints.len();
        self.constraints.retain(|c| c.id() != id);
        if self.constraints.len() == before {
            return Err(WorldError::UnknownConstraint(id));
        }
        Ok(())
    }

    pub fn constraint(&self, id: ConstraintId) -> Result<&Constraint, WorldError> {
        self.constraints
            .iter()
            .find(|c| c.id() == id)
            .ok_or(WorldError::UnknownConstraint(id))
    }

    /// Drop every body and constraint but keep the configuration.
    pub fn clear(&mut self) {
        self.bodies.clear();
        self.free_ids.clear();
        self.constraints.clear();
        self.next_constraint_id = 0;
        self.warm_cache.clear();
        self.manifolds.clear();
        self.pairs.clear();
        self.aabbs.clear();
        self.index_in_sync = false;
    }

    // ------------------------------------------------------------------
    // Per-body I/O
    // ------------------------------------------------------------------

    pub fn set_position(&mut self, id: BodyId, position: Vector2) -> Result<(), WorldError> {
        if !position.is_finite() {
            return Err(WorldError::NonFiniteArgument);
        }
        let body = self.body_mut(id)?;
        body.position = position;
        body.wake();
        Ok(())
    }

    pub fn set_angle(&mut self, id: BodyId, angle: Scalar) -> Result<(), WorldError> {
        if !angle.is_finite() {
            return Err(WorldError::NonFiniteArgument);
        }
        let body = self.body_mut(id)?;
        body.angle = angle;
        body.wake();
        Ok(())
    }

    pub fn set_linear_velocity(&mut self, id: BodyId, velocity: Vector2) -> Result<(), WorldError> {
        if !velocity.is_finite() {
            return Err(WorldError::NonFiniteArgument);
        }
        let body = self.body_mut(id)?;
        body.linear_velocity = velocity;
        body.wake();
        Ok(())
    }

    pub fn set_angular_velocity(&mut self, id: BodyId, velocity: Scalar) -> Result<(), WorldError> {
        if !velocity.is_finite() {
            return Err(WorldError::NonFiniteArgument);
        }
        let body = self.body_mut(id)?;
        body.angular_velocity = velocity;
        body.wake();
        Ok(())
    }

    /// Accumulate a force through the center of mass. Silently ignored on
    /// non-dynamic bodies.
    pub fn apply_force(&mut self, id: BodyId, force: Vector2) -> Result<(), WorldError> {
        if !force.is_finite() {
            return Err(WorldError::NonFiniteArgument);
        }
        let body = self.body_mut(id)?;
        if body.body_type == BodyType::Dynamic {
            body.force += force;
            if force != Vector2::ZERO {
                body.wake();
            }
        }
        Ok(())
    }

    /// Accumulate a force applied at a world point, adding the induced
    /// torque.
    pub fn apply_force_at(
        &mut self,
        id: BodyId,
        force: Vector2,
        world_point: Vector2,
    ) -> Result<(), WorldError> {
        if !force.is_finite() || !world_point.is_finite() {
            return Err(WorldError::NonFiniteArgument);
        }
        let body = self.body_mut(id)?;
        if body.body_type == BodyType::Dynamic {
            body.force += force;
            body.torque += (world_point - body.position).perp_dot(force);
            if force != Vector2::ZERO {
                body.wake();
            }
        }
        Ok(())
    }

    pub fn apply_torque(&mut self, id: BodyId, torque: Scalar) -> Result<(), WorldError> {
        if !torque.is_finite() {
            return Err(WorldError::NonFiniteArgument);
        }
        let body = self.body_mut(id)?;
        if body.body_type == BodyType::Dynamic {
            body.torque += torque;
            if torque != 0.0 {
                body.wake();
            }
        }
        Ok(())
    }

    /// Immediate velocity change through the center of mass.
    pub fn apply_impulse(&mut self, id: BodyId, impulse: Vector2) -> Result<(), WorldError> {
        if !impulse.is_finite() {
            return Err(WorldError::NonFiniteArgument);
        }
        let body = self.body_mut(id)?;
        if body.body_type == BodyType::Dynamic {
            body.linear_velocity += impulse * body.inv_mass;
            if impulse != Vector2::ZERO {
                body.wake();
            }
        }
        Ok(())
    }

    /// Immediate velocity change applied at a world point.
    pub fn apply_impulse_at(
        &mut self,
        id: BodyId,
        impulse: Vector2,
        world_point: Vector2,
    ) -> Result<(), WorldError> {
        if !impulse.is_finite() || !world_point.is_finite() {
            return Err(WorldError::NonFiniteArgument);
        }
        let body = self.body_mut(id)?;
        if body.body_type == BodyType::Dynamic {
            let r = world_point - body.position;
            body.impulse_at(impulse, r);
            if impulse != Vector2::ZERO {
                body.wake();
            }
        }
        Ok(())
    }

    /// Swap the material and re-derive mass and inertia.
    pub fn set_material(&mut self, id: BodyId, material: Material) -> Result<(), WorldError> {
        let body = self.body_mut(id)?;
        body.material = material;
        body.compute_mass();
        body.wake();
        Ok(())
    }

    pub fn set_collision_filter(
        &mut self,
        id: BodyId,
        group: u32,
        category: u32,
        mask: u32,
    ) -> Result<(), WorldError> {
        let body = self.body_mut(id)?;
        body.group = group;
        body.category = category;
        body.mask = mask;
        Ok(())
    }

    pub fn set_attractor(&mut self, id: BodyId, is_attractor: bool) -> Result<(), WorldError> {
        let body = self.body_mut(id)?;
        body.is_attractor = is_attractor;
        Ok(())
    }

    /// Append a shape to a compound body and re-derive mass and inertia.
    pub fn add_shape(&mut self, id: BodyId, shape: Shape) -> Result<(), WorldError> {
        let body = self.body_mut(id)?;
        body.shapes.push(shape);
        body.compute_mass();
        body.wake();
        Ok(())
    }

    /// Current world AABB of the body (union of its shape AABBs).
    pub fn body_aabb(&self, id: BodyId) -> Result<Aabb, WorldError> {
        self.body(id).map(RigidBody::aabb)
    }

    /// Manifolds produced by the most recent step.
    pub fn contacts(&self) -> &[ContactManifold] {
        &self.manifolds
    }

    // ------------------------------------------------------------------
    // Queries
    // ------------------------------------------------------------------

    /// Ids of bodies whose AABB overlaps the query rectangle, ascending.
    pub fn query_aabb(&self, aabb: &Aabb) -> Vec<BodyId> {
        let mut candidates = Vec::new();
        self.query_candidates(aabb, &mut candidates);
        candidates.retain(|&id| {
            self.bodies[id as usize]
                .as_ref()
                .is_some_and(|b| b.aabb().overlaps(aabb))
        });
        candidates.sort_unstable();
        candidates
    }

    /// Ids of bodies containing the point, ascending.
    pub fn query_point(&self, point: Vector2) -> Vec<BodyId> {
        let probe = Aabb::new(point, point);
        let mut candidates = Vec::new();
        self.query_candidates(&probe, &mut candidates);
        candidates.retain(|&id| {
            self.bodies[id as usize]
                .as_ref()
                .is_some_and(|b| body_contains_point(b, point))
        });
        candidates.sort_unstable();
        candidates
    }

    /// Nearest body surface along `origin + t * direction` for
    /// `t in [0, max_distance]`.
    pub fn raycast(
        &self,
        origin: Vector2,
        direction: Vector2,
        max_distance: Scalar,
    ) -> Option<RayHit> {
        let length = direction.length();
        if length < EPSILON || !max_distance.is_finite() || max_distance <= 0.0 {
            return None;
        }
        let dir = direction / length;

        // Conservative candidate pruning with the segment's AABB.
        let end = origin + dir * max_distance;
        let probe = Aabb::new(origin.min(end), origin.max(end));
        let mut candidates = Vec::new();
        self.query_candidates(&probe, &mut candidates);
        candidates.sort_unstable();

        let mut closest: Option<RayHit> = None;
        for id in candidates {
            let Some(body) = self.bodies[id as usize].as_ref() else { continue };
            if let Some(t) = ray_body(body, origin, dir) {
                if t <= max_distance && closest.is_none_or(|hit| t < hit.distance) {
                    closest = Some(RayHit { body: id, point: origin + dir * t, distance: t });
                }
            }
        }
        closest
    }

    /// Candidate ids from the spatial index when it is current, otherwise
    /// from a linear scan. Either way a superset of the exact answer.
    fn query_candidates(&self, aabb: &Aabb, out: &mut Vec<BodyId>) {
        if self.index_in_sync {
            self.broadphase.query(aabb, &self.aabbs, out);
        } else {
            for body in self.bodies.iter().flatten() {
                if body.aabb().overlaps(aabb) {
                    out.push(body.id);
                }
            }
        }
    }

    // ------------------------------------------------------------------
    // Stepping
    // ------------------------------------------------------------------

    /// Advance the world by `dt`, split into `substeps` equal substeps.
    ///
    /// On success all dynamic bodies have positions and velocities
    /// consistent with the applied forces, constraints are satisfied to
    /// within the iteration budget, contact impulses are cached for
    /// warm-starting, sleep state is updated, and accumulated forces are
    /// cleared.
    pub fn step(
        &mut self,
        dt: Scalar,
        velocity_iterations: u32,
        position_iterations: u32,
        constraint_iterations: u32,
        substeps: u32,
    ) -> Result<(), StepError> {
        if !dt.is_finite() || dt <= 0.0 {
            return Err(StepError::InvalidTimestep { dt });
        }
        if substeps == 0 {
            return Err(StepError::ZeroSubsteps);
        }

        let sub_dt = dt / substeps as Scalar;
        let params = SolverParams {
            correction_bias: self.config.correction_bias,
            slop: self.config.penetration_slop,
            max_correction: self.config.max_position_correction,
            restitution_threshold: self.config.restitution_velocity_threshold,
        };

        for _ in 0..substeps {
            self.substep(
                sub_dt,
                velocity_iterations,
                position_iterations,
                constraint_iterations,
                &params,
            )?;
        }

        // Cache write-back: this step's accumulated impulses overwrite the
        // cache, and entries not refreshed this step are dropped.
        if self.config.warm_starting {
            let current = self.step_index;
            for manifold in &self.manifolds {
                for point in &manifold.points {
                    self.warm_cache.insert(
                        manifold.key(point),
                        CachedImpulse {
                            normal: point.normal_impulse,
                            tangent: point.tangent_impulse,
                            step: current,
                        },
                    );
                }
            }
            self.warm_cache.retain(|_, cached| cached.step == current);
        }

        for body in self.bodies.iter_mut().flatten() {
            body.force = Vector2::ZERO;
            body.torque = 0.0;
        }

        if self.config.allow_sleeping {
            let sleep_params = SleepParams {
                linear_threshold: self.config.linear_sleep_threshold,
                angular_threshold: self.config.angular_sleep_threshold,
                sleep_frames: self.config.sleep_frames,
            };
            sleep::update_sleep(&mut self.bodies, &self.manifolds, &self.constraints, &sleep_params);
        }

        // Leave the index matching final poses so queries can use it.
        self.rebuild_index();

        self.step_index += 1;

        if let Some(handler) = self.contact_handler.as_mut() {
            handler(&self.manifolds);
        }
        Ok(())
    }

    fn substep(
        &mut self,
        dt: Scalar,
        velocity_iterations: u32,
        position_iterations: u32,
        constraint_iterations: u32,
        params: &SolverParams,
    ) -> Result<(), StepError> {
        // Stage 1: accelerations into velocities. Attractors pull every
        // dynamic body toward themselves, O(attractors * bodies).
        let attractors: Vec<(BodyId, Vector2, Scalar)> = self
            .bodies
            .iter()
            .flatten()
            .filter(|b| b.is_attractor)
            .map(|b| (b.id, b.position, b.mass))
            .collect();
        let g = self.config.gravitational_constant;
        let gravity = self.gravity;
        for body in self.bodies.iter_mut().flatten() {
            let mut attractor_accel = Vector2::ZERO;
            for &(id, position, mass) in &attractors {
                if id == body.id {
                    continue;
                }
                let delta = position - body.position;
                let dist_sq = delta.length_squared();
                if dist_sq > EPSILON {
                    attractor_accel += delta * (g * mass / (dist_sq * dist_sq.sqrt()));
                }
            }
            integrate_forces(body, gravity, attractor_accel, dt);
        }

        // Stage 2: broad-phase.
        self.rebuild_index();
        self.pairs.clear();
        self.broadphase.pairs(&self.aabbs, &mut self.pairs);

        let bodies = &self.bodies;
        let aabbs = &self.aabbs;
        self.pairs.retain(|&(a, b)| {
            let (Some(body_a), Some(body_b)) = (
                bodies.get(a as usize).and_then(Option::as_ref),
                bodies.get(b as usize).and_then(Option::as_ref),
            ) else {
                return false;
            };
            if body_a.body_type != BodyType::Dynamic && body_b.body_type != BodyType::Dynamic {
                return false;
            }
            if body_a.sleeping && body_b.sleeping {
                return false;
            }
            if !body_a.should_collide(body_b) {
                return false;
            }
            aabb_of(aabbs, a).overlaps(&aabb_of(aabbs, b))
        });
        // Fixed solve order: id-sorted pairs make the whole pipeline
        // deterministic for identical worlds.
        self.pairs.sort_unstable();

        // Stage 3: narrow-phase.
        self.manifolds.clear();
        collide_pairs(&self.bodies, &self.pairs, &mut self.manifolds);

        // Stage 4: presolve and warm start.
        if self.config.warm_starting {
            for manifold in &mut self.manifolds {
                let (body_a, body_b, shape_a, shape_b) =
                    (manifold.body_a, manifold.body_b, manifold.shape_a, manifold.shape_b);
                for point in &mut manifold.points {
                    let key = ContactKey {
                        body_a,
                        body_b,
                        shape_a,
                        shape_b,
                        feature: point.feature,
                    };
                    if let Some(cached) = self.warm_cache.get(&key) {
                        point.normal_impulse = cached.normal;
                        point.tangent_impulse = cached.tangent;
                    }
                }
            }
        }
        resolve::presolve(&mut self.bodies, &mut self.manifolds, params.restitution_threshold);
        for constraint in &mut self.constraints {
            constraint.presolve(&mut self.bodies, dt);
        }
        if self.config.warm_starting {
            resolve::warm_start(&mut self.bodies, &self.manifolds);
            for constraint in &mut self.constraints {
                constraint.warm_start(&mut self.bodies);
            }
        } else {
            for constraint in &mut self.constraints {
                constraint.reset_impulse();
            }
        }

        // Stage 5: velocity iterations, constraints interleaved.
        for i in 0..velocity_iterations.max(constraint_iterations) {
            if i < velocity_iterations {
                resolve::solve_velocity(&mut self.bodies, &mut self.manifolds);
            }
            if i < constraint_iterations {
                for constraint in &mut self.constraints {
                    constraint.solve_velocity(&mut self.bodies, dt);
                }
            }
        }

        // Stage 6: velocities into poses.
        for body in self.bodies.iter_mut().flatten() {
            integrate_velocities(body, dt);
        }

        // Stage 7: position iterations, constraints interleaved.
        for i in 0..position_iterations.max(constraint_iterations) {
            if i < position_iterations {
                resolve::solve_position(&mut self.bodies, &self.manifolds, params);
            }
            if i < constraint_iterations {
                for constraint in &mut self.constraints {
                    constraint.solve_position(&mut self.bodies, params);
                }
            }
        }
        resolve::refresh_depths(&self.bodies, &mut self.manifolds);

        // Bodies moved during the solve; queries must not trust the index
        // until the end-of-step rebuild.
        self.index_in_sync = false;

        if self.config.validate_finite {
            for body in self.bodies.iter_mut().flatten() {
                if body.body_type != BodyType::Static && !body.state_is_finite() {
                    body.poisoned = true;
                    log::warn!("body {} reached non-finite state; aborting step", body.id);
                    return Err(StepError::NonFiniteState { body: body.id });
                }
            }
        }
        Ok(())
    }

    fn rebuild_index(&mut self) {
        self.aabbs.clear();
        for body in self.bodies.iter().flatten() {
            if !body.poisoned {
                self.aabbs.push((body.id, body.aabb()));
            }
        }
        self.broadphase.rebuild(&self.aabbs);
        self.index_in_sync = true;
    }
}

fn make_broadphase(config: &WorldConfig) -> Broadphase {
    match config.broadphase {
        BroadphaseKind::BruteForce => Broadphase::BruteForce,
        BroadphaseKind::SpatialHashGrid => Broadphase::Grid(SpatialHashGrid::new(
            config.grid_bounds,
            config.grid_cell_width,
            config.grid_cell_height,
        )),
        BroadphaseKind::BoundingVolumeHierarchy => Broadphase::Bvh(Bvh::new()),
    }
}

/// AABB of a body in the sorted per-step list. The list is built in
/// ascending id order, so binary search works.
fn aabb_of(aabbs: &[(BodyId, Aabb)], id: BodyId) -> Aabb {
    match aabbs.binary_search_by_key(&id, |(body_id, _)| *body_id) {
        Ok(i) => aabbs[i].1,
        Err(_) => Aabb::new(Vector2::ZERO, Vector2::ZERO),
    }
}

/// Narrow-phase over the filtered pair list. With the `parallel` feature the
/// pairs are chunked onto the rayon pool and per-worker manifold buffers are
/// merged back in pair order, so the result is identical to the serial path.
#[cfg(not(feature = "parallel"))]
fn collide_pairs(
    bodies: &[Option<RigidBody>],
    pairs: &[(BodyId, BodyId)],
    out: &mut Vec<ContactManifold>,
) {
    for &(a, b) in pairs {
        let (Some(body_a), Some(body_b)) =
            (bodies[a as usize].as_ref(), bodies[b as usize].as_ref())
        else {
            continue;
        };
        narrowphase::collide_bodies(body_a, body_b, out);
    }
}

#[cfg(feature = "parallel")]
fn collide_pairs(
    bodies: &[Option<RigidBody>],
    pairs: &[(BodyId, BodyId)],
    out: &mut Vec<ContactManifold>,
) {
    use rayon::prelude::*;

    const CHUNK: usize = 64;
    let buffers: Vec<Vec<ContactManifold>> = pairs
        .par_chunks(CHUNK)
        .map(|chunk| {
            let mut local = Vec::new();
            for &(a, b) in chunk {
                let (Some(body_a), Some(body_b)) =
                    (bodies[a as usize].as_ref(), bodies[b as usize].as_ref())
                else {
                    continue;
                };
                narrowphase::collide_bodies(body_a, body_b, &mut local);
            }
            local
        })
        .collect();
    for buffer in buffers {
        out.extend(buffer);
    }
}

fn body_contains_point(body: &RigidBody, point: Vector2) -> bool {
    let rot = Vector2::from_angle(body.angle);
    for shape in &body.shapes {
        match shape {
            Shape::Circle { radius, offset } => {
                let center = body.position + rot.rotate(*offset);
                if (point - center).length_squared() <= radius * radius {
                    return true;
                }
            }
            Shape::Polygon(poly) => {
                let inside = poly.vertices().iter().zip(poly.normals()).all(|(&v, &n)| {
                    let world_v = body.position + rot.rotate(v);
                    let world_n = rot.rotate(n);
                    world_n.dot(point - world_v) <= 0.0
                });
                if inside {
                    return true;
                }
            }
        }
    }
    false
}

/// Nearest ray parameter hitting any of the body's shapes.
fn ray_body(body: &RigidBody, origin: Vector2, dir: Vector2) -> Option<Scalar> {
    let rot = Vector2::from_angle(body.angle);
    let mut closest: Option<Scalar> = None;
    for shape in &body.shapes {
        let t = match shape {
            Shape::Circle { radius, offset } => {
                ray_circle(origin, dir, body.position + rot.rotate(*offset), *radius)
            }
            Shape::Polygon(poly) => {
                let n = poly.vertices().len();
                let mut best: Option<Scalar> = None;
                for i in 0..n {
                    let a = body.position + rot.rotate(poly.vertices()[i]);
                    let b = body.position + rot.rotate(poly.vertices()[(i + 1) % n]);
                    if let Some(t) = ray_segment(origin, dir, a, b) {
                        if best.is_none_or(|cur| t < cur) {
                            best = Some(t);
                        }
                    }
                }
                best
            }
        };
        if let Some(t) = t {
            if closest.is_none_or(|cur| t < cur) {
                closest = Some(t);
            }
        }
    }
    closest
}

fn ray_circle(origin: Vector2, dir: Vector2, center: Vector2, radius: Scalar) -> Option<Scalar> {
    let f = origin - center;
    let b = 2.0 * f.dot(dir);
    let c = f.length_squared() - radius * radius;
    let discriminant = b * b - 4.0 * c;
    if discriminant < 0.0 {
        return None;
    }
    let sqrt_d = discriminant.sqrt();
    let t0 = (-b - sqrt_d) * 0.5;
    let t1 = (-b + sqrt_d) * 0.5;
    if t0 >= 0.0 {
        Some(t0)
    } else if t1 >= 0.0 {
        Some(t1)
    } else {
        None
    }
}

fn ray_segment(origin: Vector2, dir: Vector2, a: Vector2, b: Vector2) -> Option<Scalar> {
    let edge = b - a;
    let denom = dir.perp_dot(edge);
    if denom.abs() < EPSILON {
        return None;
    }
    let delta = a - origin;
    let t = delta.perp_dot(edge) / denom;
    let u = delta.perp_dot(dir) / denom;
    if t >= 0.0 && (0.0..=1.0).contains(&u) { Some(t) } else { None }
}
