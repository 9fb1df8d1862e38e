//! Sleeping and island bookkeeping.
//!
//! Dynamic bodies below the velocity thresholds for enough consecutive steps
//! are put to sleep and excluded from integration and narrow-phase. Sleeping
//! is decided per *island*: the connected components of the graph whose edges
//! are this step's contacts and the user constraints. An island sleeps only
//! when every dynamic member qualifies, and any active member keeps the
//! whole island awake, so a stack never half-sleeps on top of a moving body.

use rustc_hash::FxHashSet;

use crate::constraints::Constraint;
use crate::math::Scalar;
use crate::types::{BodyId, BodyType, ContactManifold, RigidBody};

pub(crate) struct SleepParams {
    pub linear_threshold: Scalar,
    pub angular_threshold: Scalar,
    pub sleep_frames: u32,
}

/// Union-find over arena indices.
struct Islands {
    parent: Vec<u32>,
}

impl Islands {
    fn new(len: usize) -> Self {
        Self { parent: (0..len as u32).collect() }
    }

    fn find(&mut self, i: u32) -> u32 {
        let mut root = i;
        while self.parent[root as usize] != root {
            root = self.parent[root as usize];
        }
        // Path compression.
        let mut cur = i;
        while self.parent[cur as usize] != root {
            let next = self.parent[cur as usize];
            self.parent[cur as usize] = root;
            cur = next;
        }
        root
    }

    fn union(&mut self, a: u32, b: u32) {
        let ra = self.find(a);
        let rb = self.find(b);
        if ra != rb {
            self.parent[rb as usize] = ra;
        }
    }
}

pub(crate) fn update_sleep(
    bodies: &mut [Option<RigidBody>],
    manifolds: &[ContactManifold],
    constraints: &[Constraint],
    params: &SleepParams,
) {
    let len = bodies.len();

    // Per-body quiet counters.
    let linear_sq = params.linear_threshold * params.linear_threshold;
    for body in bodies.iter_mut().flatten() {
        if body.body_type != BodyType::Dynamic {
            continue;
        }
        let quiet = body.linear_velocity.length_squared() < linear_sq
            && body.angular_velocity.abs() < params.angular_threshold;
        if quiet {
            body.quiet_frames = body.quiet_frames.saturating_add(1);
        } else {
            body.quiet_frames = 0;
            body.sleeping = false;
        }
    }

    // Build islands over dynamic bodies. Static bodies don't transmit
    // wakefulness, so they never join an island.
    let mut islands = Islands::new(len);
    let is_dynamic = |bodies: &[Option<RigidBody>], id: BodyId| {
        bodies
            .get(id as usize)
            .and_then(Option::as_ref)
            .is_some_and(|b| b.body_type == BodyType::Dynamic)
    };

    // Kinematic bodies in motion keep their dynamic contact partners awake
    // even though they are not island members themselves.
    let mut forced_awake: FxHashSet<u32> = FxHashSet::default();

    let mut link = |islands: &mut Islands,
                    forced_awake: &mut FxHashSet<u32>,
                    bodies: &[Option<RigidBody>],
                    a: BodyId,
                    b: BodyId| {
        match (is_dynamic(bodies, a), is_dynamic(bodies, b)) {
            (true, true) => islands.union(a, b),
            (true, false) | (false, true) => {
                let (dynamic, other) = if is_dynamic(bodies, a) { (a, b) } else { (b, a) };
                let moving_kinematic = bodies
                    .get(other as usize)
                    .and_then(Option::as_ref)
                    .is_some_and(|o| {
                        o.body_type == BodyType::Kinematic
                            && (o.linear_velocity.length_squared() >= linear_sq
                                || o.angular_velocity.abs() >= params.angular_threshold)
                    });
                if moving_kinematic {
                    forced_awake.insert(dynamic);
                }
            }
            (false, false) => {}
        }
    };

    for manifold in manifolds {
        link(&mut islands, &mut forced_awake, bodies, manifold.body_a, manifold.body_b);
    }
    for constraint in constraints {
        let (a, b) = constraint.bodies();
        link(&mut islands, &mut forced_awake, bodies, a, b);
    }

    // An island may sleep only when all its dynamic members are quiet.
    let mut active_roots: FxHashSet<u32> = FxHashSet::default();
    for i in 0..len {
        let Some(body) = &bodies[i] else { continue };
        if body.body_type != BodyType::Dynamic {
            continue;
        }
        if body.quiet_frames < params.sleep_frames || forced_awake.contains(&(i as u32)) {
            let root = islands.find(i as u32);
            active_roots.insert(root);
        }
    }

    for i in 0..len {
        let root = {
            let Some(body) = &bodies[i] else { continue };
            if body.body_type != BodyType::Dynamic {
                continue;
            }
            islands.find(i as u32)
        };
        let body = bodies[i].as_mut().unwrap();
        if active_roots.contains(&root) {
            body.sleeping = false;
        } else if !body.sleeping {
            body.sleeping = true;
            body.linear_velocity = crate::math::Vector2::ZERO;
            body.angular_velocity = 0.0;
        }
    }
}
