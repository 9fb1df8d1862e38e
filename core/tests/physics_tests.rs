//! Integration tests for the physics engine.

use tumble_core::{
    Aabb, BodyError, BodyId, BodyType, BroadphaseKind, Constraint, DistanceConstraint, Material,
    PhysicsWorld, RigidBodyDef, Scalar, Shape, StepError, Vector2, WorldConfig, narrowphase,
};

const DT: Scalar = 1.0 / 60.0;
const PI: Scalar = core::f64::consts::PI as Scalar;

fn material(density: Scalar, restitution: Scalar, friction: Scalar) -> Material {
    Material { density, restitution, friction }
}

/// Circle body with an exact mass (density derived from the area).
fn circle_def(position: Vector2, radius: Scalar, mass: Scalar) -> RigidBodyDef {
    RigidBodyDef {
        position,
        shapes: vec![Shape::circle(radius, Vector2::ZERO).unwrap()],
        material: Material {
            density: mass / (PI * radius * radius),
            restitution: 0.0,
            friction: 0.0,
        },
        ..Default::default()
    }
}

/// Axis-aligned unit-density box.
fn box_def(position: Vector2, width: Scalar, height: Scalar) -> RigidBodyDef {
    RigidBodyDef {
        position,
        shapes: vec![Shape::rect(width, height, Vector2::ZERO).unwrap()],
        material: material(1.0, 0.0, 0.5),
        ..Default::default()
    }
}

fn static_box_def(position: Vector2, width: Scalar, height: Scalar) -> RigidBodyDef {
    RigidBodyDef { body_type: BodyType::Static, ..box_def(position, width, height) }
}

fn step(world: &mut PhysicsWorld, steps: usize) {
    for _ in 0..steps {
        world.step(DT, 8, 4, 8, 1).unwrap();
    }
}

/// Route engine warnings to the test output for RUST_LOG debugging.
fn init_logs() {
    let _ = env_logger::builder().is_test(true).try_init();
}

// =========================================================================
// Body registration & mass properties
// =========================================================================

#[test]
fn test_add_body_assigns_stable_ids() {
    let mut world = PhysicsWorld::new(Vector2::ZERO);
    let a = world.add_body(circle_def(Vector2::ZERO, 1.0, 1.0)).unwrap();
    let b = world.add_body(circle_def(Vector2::new(5.0, 0.0), 1.0, 1.0)).unwrap();
    assert_ne!(a, b);
    assert_eq!(world.body(a).unwrap().id, a);
    assert_eq!(world.body_count(), 2);
}

#[test]
fn test_remove_body_drops_it_and_its_constraints() {
    let mut world = PhysicsWorld::new(Vector2::ZERO);
    let a = world.add_body(circle_def(Vector2::ZERO, 1.0, 1.0)).unwrap();
    let b = world.add_body(circle_def(Vector2::new(2.0, 0.0), 1.0, 1.0)).unwrap();
    let joint = world.add_constraint(Constraint::Distance(DistanceConstraint::new(
        a,
        b,
        Vector2::ZERO,
        Vector2::ZERO,
        2.0,
    )));

    world.remove_body(a).unwrap();
    assert!(world.body(a).is_err());
    assert!(world.constraint(joint).is_err());
    // Removing again reports the stale id.
    assert!(world.remove_body(a).is_err());
    // The world still steps fine with the survivor.
    step(&mut world, 5);
    assert!(world.body(b).is_ok());
}

#[test]
fn test_body_ids_are_recycled() {
    let mut world = PhysicsWorld::new(Vector2::ZERO);
    let a = world.add_body(circle_def(Vector2::ZERO, 1.0, 1.0)).unwrap();
    world.remove_body(a).unwrap();
    let b = world.add_body(circle_def(Vector2::new(3.0, 0.0), 1.0, 1.0)).unwrap();
    assert_eq!(a, b);
}

#[test]
fn test_mass_derived_from_density_and_shapes() {
    let mut world = PhysicsWorld::new(Vector2::ZERO);
    let id = world.add_body(box_def(Vector2::ZERO, 2.0, 3.0)).unwrap();
    let body = world.body(id).unwrap();
    assert!((body.mass - 6.0).abs() < 1e-4);
    assert!((body.inv_mass - 1.0 / 6.0).abs() < 1e-5);
}

#[test]
fn test_set_material_recomputes_mass() {
    let mut world = PhysicsWorld::new(Vector2::ZERO);
    let id = world.add_body(box_def(Vector2::ZERO, 1.0, 1.0)).unwrap();
    world.set_material(id, material(4.0, 0.0, 0.5)).unwrap();
    assert!((world.body(id).unwrap().mass - 4.0).abs() < 1e-4);
}

#[test]
fn test_add_shape_recomputes_mass() {
    let mut world = PhysicsWorld::new(Vector2::ZERO);
    let id = world.add_body(box_def(Vector2::ZERO, 1.0, 1.0)).unwrap();
    world
        .add_shape(id, Shape::rect(1.0, 1.0, Vector2::new(1.0, 0.0)).unwrap())
        .unwrap();
    assert!((world.body(id).unwrap().mass - 2.0).abs() < 1e-4);
    assert_eq!(world.body(id).unwrap().shapes.len(), 2);
}

// =========================================================================
// Error paths
// =========================================================================

#[test]
fn test_invalid_shapes_are_rejected() {
    assert!(matches!(
        Shape::circle(-1.0, Vector2::ZERO),
        Err(BodyError::InvalidRadius { .. })
    ));
    assert!(matches!(
        Shape::polygon(&[Vector2::ZERO, Vector2::X], Vector2::ZERO),
        Err(BodyError::TooFewVertices { count: 2 })
    ));
    assert!(matches!(
        Shape::circle(Scalar::NAN, Vector2::ZERO),
        Err(BodyError::NonFinite { .. })
    ));
}

#[test]
fn test_unknown_ids_error() {
    let mut world = PhysicsWorld::new(Vector2::ZERO);
    assert!(world.body(42).is_err());
    assert!(world.set_position(42, Vector2::ZERO).is_err());
    assert!(world.remove_constraint(9).is_err());
}

#[test]
fn test_step_rejects_bad_parameters() {
    let mut world = PhysicsWorld::new(Vector2::ZERO);
    assert_eq!(
        world.step(0.0, 8, 3, 8, 1),
        Err(StepError::InvalidTimestep { dt: 0.0 })
    );
    assert!(matches!(
        world.step(Scalar::NAN, 8, 3, 8, 1),
        Err(StepError::InvalidTimestep { .. })
    ));
    assert_eq!(world.step(DT, 8, 3, 8, 0), Err(StepError::ZeroSubsteps));
}

#[test]
fn test_non_finite_state_aborts_step_and_marks_body() {
    init_logs();
    let mut config = WorldConfig::default();
    config.validate_finite = true;
    let mut world = PhysicsWorld::with_config(Vector2::ZERO, config);
    let id = world.add_body(circle_def(Vector2::ZERO, 1.0, 1.0)).unwrap();
    // The checked setter rejects the bad value outright.
    assert_eq!(
        world.set_linear_velocity(id, Vector2::new(Scalar::INFINITY, 0.0)),
        Err(tumble_core::WorldError::NonFiniteArgument)
    );
    // Inject it through the unchecked accessor; the step must catch it.
    world.body_mut(id).unwrap().linear_velocity = Vector2::new(Scalar::INFINITY, 0.0);

    assert_eq!(world.step(DT, 8, 3, 8, 1), Err(StepError::NonFiniteState { body: id }));
    assert!(world.body(id).unwrap().poisoned);
}

// =========================================================================
// Integration & forces
// =========================================================================

#[test]
fn test_gravity_accelerates_dynamic_bodies() {
    let mut world = PhysicsWorld::new(Vector2::new(0.0, -10.0));
    let id = world.add_body(circle_def(Vector2::ZERO, 1.0, 1.0)).unwrap();
    step(&mut world, 1);
    let body = world.body(id).unwrap();
    assert!(body.linear_velocity.y < 0.0);
    assert!(body.position.y < 0.0);
}

#[test]
fn test_static_bodies_never_move() {
    let mut world = PhysicsWorld::new(Vector2::new(0.0, -10.0));
    let id = world.add_body(static_box_def(Vector2::new(1.0, 2.0), 1.0, 1.0)).unwrap();
    world.apply_force(id, Vector2::new(1e6, 1e6)).unwrap();
    step(&mut world, 30);
    let body = world.body(id).unwrap();
    assert_eq!(body.position, Vector2::new(1.0, 2.0));
    assert_eq!(body.linear_velocity, Vector2::ZERO);
    assert_eq!(body.angular_velocity, 0.0);
}

#[test]
fn test_force_and_torque_accumulate_and_clear() {
    let mut world = PhysicsWorld::new(Vector2::ZERO);
    let id = world.add_body(circle_def(Vector2::ZERO, 1.0, 2.0)).unwrap();
    world.apply_force(id, Vector2::new(10.0, 0.0)).unwrap();
    world.apply_force(id, Vector2::new(10.0, 0.0)).unwrap();
    world.step(1.0, 1, 1, 1, 1).unwrap();
    // a = F / m = 20 / 2 = 10 over one second.
    let body = world.body(id).unwrap();
    assert!((body.linear_velocity.x - 10.0).abs() < 1e-3);
    // Forces are cleared at the end of the step.
    assert_eq!(body.force, Vector2::ZERO);
    world.step(1.0, 1, 1, 1, 1).unwrap();
    assert!((world.body(id).unwrap().linear_velocity.x - 10.0).abs() < 1e-3);
}

#[test]
fn test_substeps_see_the_same_forces() {
    // The same force stepped with 1 or 4 substeps produces the same impulse.
    let mut single = PhysicsWorld::new(Vector2::ZERO);
    let mut quad = PhysicsWorld::new(Vector2::ZERO);
    let a = single.add_body(circle_def(Vector2::ZERO, 1.0, 1.0)).unwrap();
    let b = quad.add_body(circle_def(Vector2::ZERO, 1.0, 1.0)).unwrap();
    single.apply_force(a, Vector2::new(6.0, 0.0)).unwrap();
    quad.apply_force(b, Vector2::new(6.0, 0.0)).unwrap();
    single.step(1.0, 1, 1, 1, 1).unwrap();
    quad.step(1.0, 1, 1, 1, 4).unwrap();
    let va = single.body(a).unwrap().linear_velocity.x;
    let vb = quad.body(b).unwrap().linear_velocity.x;
    assert!((va - vb).abs() < 1e-3);
}

#[test]
fn test_apply_impulse_changes_velocity_immediately() {
    let mut world = PhysicsWorld::new(Vector2::ZERO);
    let id = world.add_body(circle_def(Vector2::ZERO, 1.0, 2.0)).unwrap();
    world.apply_impulse(id, Vector2::new(4.0, 0.0)).unwrap();
    assert!((world.body(id).unwrap().linear_velocity.x - 2.0).abs() < 1e-5);
}

#[test]
fn test_apply_impulse_at_point_spins_body() {
    let mut world = PhysicsWorld::new(Vector2::ZERO);
    let id = world.add_body(box_def(Vector2::ZERO, 2.0, 2.0)).unwrap();
    world
        .apply_impulse_at(id, Vector2::new(0.0, 1.0), Vector2::new(1.0, 0.0))
        .unwrap();
    assert!(world.body(id).unwrap().angular_velocity > 0.0);
}

#[test]
fn test_forces_ignored_on_static_and_kinematic() {
    let mut world = PhysicsWorld::new(Vector2::ZERO);
    let s = world.add_body(static_box_def(Vector2::ZERO, 1.0, 1.0)).unwrap();
    let k = world
        .add_body(RigidBodyDef {
            body_type: BodyType::Kinematic,
            ..circle_def(Vector2::new(5.0, 0.0), 1.0, 1.0)
        })
        .unwrap();
    world.apply_force(s, Vector2::new(100.0, 0.0)).unwrap();
    world.apply_impulse(k, Vector2::new(100.0, 0.0)).unwrap();
    assert_eq!(world.body(s).unwrap().force, Vector2::ZERO);
    assert_eq!(world.body(k).unwrap().linear_velocity, Vector2::ZERO);
}

#[test]
fn test_kinematic_bodies_move_on_their_velocity() {
    let mut world = PhysicsWorld::new(Vector2::new(0.0, -10.0));
    let id = world
        .add_body(RigidBodyDef {
            body_type: BodyType::Kinematic,
            linear_velocity: Vector2::new(1.0, 0.0),
            ..circle_def(Vector2::ZERO, 1.0, 1.0)
        })
        .unwrap();
    world.step(1.0, 1, 1, 1, 1).unwrap();
    let body = world.body(id).unwrap();
    // Moved along x, untouched by gravity.
    assert!((body.position.x - 1.0).abs() < 1e-4);
    assert_eq!(body.position.y, 0.0);
}

#[test]
fn test_linear_damping_decays_velocity() {
    let mut world = PhysicsWorld::new(Vector2::ZERO);
    let id = world
        .add_body(RigidBodyDef {
            linear_velocity: Vector2::new(10.0, 0.0),
            linear_damping: 1.0,
            ..circle_def(Vector2::ZERO, 1.0, 1.0)
        })
        .unwrap();
    step(&mut world, 60);
    let v = world.body(id).unwrap().linear_velocity.x;
    assert!(v > 0.0 && v < 6.0, "damping should roughly halve v in 1s, got {v}");
}

// =========================================================================
// Broad-phase
// =========================================================================

fn stack_world(kind: BroadphaseKind) -> PhysicsWorld {
    let mut config = WorldConfig::default();
    config.broadphase = kind;
    let mut world = PhysicsWorld::with_config(Vector2::new(0.0, -10.0), config);
    world.add_body(static_box_def(Vector2::new(0.0, -0.5), 40.0, 1.0)).unwrap();
    for i in 0..8 {
        world
            .add_body(box_def(
                Vector2::new(0.02 * (i % 2) as Scalar, 0.51 + 1.02 * i as Scalar),
                1.0,
                1.0,
            ))
            .unwrap();
    }
    world
}

#[test]
fn test_broadphase_variants_agree() {
    let mut grid = stack_world(BroadphaseKind::SpatialHashGrid);
    let mut bvh = stack_world(BroadphaseKind::BoundingVolumeHierarchy);
    let mut brute = stack_world(BroadphaseKind::BruteForce);

    step(&mut grid, 120);
    step(&mut bvh, 120);
    step(&mut brute, 120);

    let positions =
        |world: &PhysicsWorld| -> Vec<Vector2> { world.bodies().map(|b| b.position).collect() };
    assert_eq!(positions(&grid), positions(&bvh));
    assert_eq!(positions(&grid), positions(&brute));
}

#[test]
fn test_bodies_outside_grid_bounds_still_collide() {
    init_logs();
    let mut config = WorldConfig::default();
    config.grid_bounds = Aabb::new(Vector2::new(-10.0, -10.0), Vector2::new(10.0, 10.0));
    let mut world = PhysicsWorld::with_config(Vector2::ZERO, config);

    // Head-on pair far outside the configured bounds.
    let a = world
        .add_body(RigidBodyDef {
            linear_velocity: Vector2::new(2.0, 0.0),
            ..circle_def(Vector2::new(95.0, 50.0), 1.0, 1.0)
        })
        .unwrap();
    world
        .add_body(RigidBodyDef {
            linear_velocity: Vector2::new(-2.0, 0.0),
            ..circle_def(Vector2::new(100.0, 50.0), 1.0, 1.0)
        })
        .unwrap();

    step(&mut world, 120);
    // They must have collided (clamped into edge cells), not passed through.
    assert!(world.body(a).unwrap().position.x < 98.0);
    assert!(world.body(a).unwrap().linear_velocity.x < 0.5);
}

#[test]
fn test_collision_filtering() {
    let mut world = PhysicsWorld::new(Vector2::ZERO);
    // Same non-zero group: pass through each other.
    let a = world
        .add_body(RigidBodyDef {
            group: 3,
            linear_velocity: Vector2::new(2.0, 0.0),
            ..circle_def(Vector2::new(-2.0, 0.0), 1.0, 1.0)
        })
        .unwrap();
    world
        .add_body(RigidBodyDef {
            group: 3,
            linear_velocity: Vector2::new(-2.0, 0.0),
            ..circle_def(Vector2::new(2.0, 0.0), 1.0, 1.0)
        })
        .unwrap();
    step(&mut world, 120);
    assert!(world.body(a).unwrap().position.x > 1.0, "same-group bodies must not collide");

    // Mismatched category/mask: also pass through.
    let mut world = PhysicsWorld::new(Vector2::ZERO);
    let a = world
        .add_body(RigidBodyDef {
            category: 0b01,
            mask: 0b01,
            linear_velocity: Vector2::new(2.0, 0.0),
            ..circle_def(Vector2::new(-2.0, 0.0), 1.0, 1.0)
        })
        .unwrap();
    world
        .add_body(RigidBodyDef {
            category: 0b10,
            mask: 0b10,
            linear_velocity: Vector2::new(-2.0, 0.0),
            ..circle_def(Vector2::new(2.0, 0.0), 1.0, 1.0)
        })
        .unwrap();
    step(&mut world, 120);
    assert!(world.body(a).unwrap().position.x > 1.0);
}

// =========================================================================
// Narrow-phase
// =========================================================================

#[test]
fn test_circle_circle_manifold() {
    let mut world = PhysicsWorld::new(Vector2::ZERO);
    let a = world.add_body(circle_def(Vector2::ZERO, 1.0, 1.0)).unwrap();
    let b = world.add_body(circle_def(Vector2::new(1.5, 0.0), 1.0, 1.0)).unwrap();

    let body_a = world.body(a).unwrap();
    let body_b = world.body(b).unwrap();
    let manifold =
        narrowphase::collide_shapes(body_a, 0, &body_a.shapes[0], body_b, 0, &body_b.shapes[0])
            .unwrap();

    assert_eq!(manifold.points.len(), 1);
    assert!((manifold.normal - Vector2::X).length() < 1e-5);
    assert!((manifold.points[0].depth - 0.5).abs() < 1e-5);
}

#[test]
fn test_concentric_circles_still_collide() {
    let mut world = PhysicsWorld::new(Vector2::ZERO);
    let a = world.add_body(circle_def(Vector2::ZERO, 1.0, 1.0)).unwrap();
    let b = world.add_body(circle_def(Vector2::ZERO, 1.0, 1.0)).unwrap();
    let body_a = world.body(a).unwrap();
    let body_b = world.body(b).unwrap();
    let manifold =
        narrowphase::collide_shapes(body_a, 0, &body_a.shapes[0], body_b, 0, &body_b.shapes[0])
            .unwrap();
    assert_eq!(manifold.points.len(), 1);
    assert!((manifold.normal.length() - 1.0).abs() < 1e-5);
    assert!((manifold.points[0].depth - 2.0).abs() < 1e-5);
}

#[test]
fn test_box_box_face_contact_has_two_points() {
    let mut world = PhysicsWorld::new(Vector2::ZERO);
    let a = world.add_body(box_def(Vector2::ZERO, 2.0, 2.0)).unwrap();
    let b = world.add_body(box_def(Vector2::new(0.0, 1.9), 2.0, 2.0)).unwrap();
    let body_a = world.body(a).unwrap();
    let body_b = world.body(b).unwrap();
    let manifold =
        narrowphase::collide_shapes(body_a, 0, &body_a.shapes[0], body_b, 0, &body_b.shapes[0])
            .unwrap();

    assert_eq!(manifold.points.len(), 2);
    assert!((manifold.normal - Vector2::Y).length() < 1e-5);
    for point in &manifold.points {
        assert!((point.depth - 0.1).abs() < 1e-4);
        assert!(point.depth >= 0.0);
    }
    // The two points carry distinct features for the warm-start cache.
    assert_ne!(manifold.points[0].feature, manifold.points[1].feature);
}

#[test]
fn test_tilted_corner_touch_is_single_point() {
    // A box balancing on its corner over a flat box: a near-tangent
    // configuration must yield 0 or 1 contact, never a spurious 2.
    let mut world = PhysicsWorld::new(Vector2::ZERO);
    let a = world.add_body(box_def(Vector2::ZERO, 2.0, 2.0)).unwrap();
    let b = world
        .add_body(RigidBodyDef { angle: PI / 4.0, ..box_def(Vector2::new(0.0, 2.4), 2.0, 2.0) })
        .unwrap();
    let body_a = world.body(a).unwrap();
    let body_b = world.body(b).unwrap();
    let manifold =
        narrowphase::collide_shapes(body_a, 0, &body_a.shapes[0], body_b, 0, &body_b.shapes[0])
            .unwrap();
    assert_eq!(manifold.points.len(), 1);
}

#[test]
fn test_separated_boxes_produce_no_manifold() {
    let mut world = PhysicsWorld::new(Vector2::ZERO);
    let a = world.add_body(box_def(Vector2::ZERO, 2.0, 2.0)).unwrap();
    let b = world.add_body(box_def(Vector2::new(2.1, 0.0), 2.0, 2.0)).unwrap();
    let body_a = world.body(a).unwrap();
    let body_b = world.body(b).unwrap();
    assert!(
        narrowphase::collide_shapes(body_a, 0, &body_a.shapes[0], body_b, 0, &body_b.shapes[0])
            .is_none()
    );
}

#[test]
fn test_circle_polygon_face_and_vertex_contacts() {
    let mut world = PhysicsWorld::new(Vector2::ZERO);
    let poly = world.add_body(box_def(Vector2::ZERO, 2.0, 2.0)).unwrap();
    // Face contact above the top edge.
    let face = world.add_body(circle_def(Vector2::new(0.0, 1.8), 1.0, 1.0)).unwrap();
    // Vertex contact off the top-right corner.
    let corner = world.add_body(circle_def(Vector2::new(1.6, 1.6), 1.0, 1.0)).unwrap();

    let poly_body = world.body(poly).unwrap();

    let face_body = world.body(face).unwrap();
    let m = narrowphase::collide_shapes(
        poly_body,
        0,
        &poly_body.shapes[0],
        face_body,
        0,
        &face_body.shapes[0],
    )
    .unwrap();
    assert_eq!(m.points.len(), 1);
    assert!((m.normal - Vector2::Y).length() < 1e-5);
    assert!((m.points[0].depth - 0.2).abs() < 1e-4);

    let corner_body = world.body(corner).unwrap();
    let m = narrowphase::collide_shapes(
        poly_body,
        0,
        &poly_body.shapes[0],
        corner_body,
        0,
        &corner_body.shapes[0],
    )
    .unwrap();
    assert_eq!(m.points.len(), 1);
    // Radial normal through the corner (1,1).
    let expected = Vector2::new(1.0, 1.0).normalize();
    assert!((m.normal - expected).length() < 1e-4);
}

#[test]
fn test_compound_body_collides_on_every_shape() {
    let mut world = PhysicsWorld::new(Vector2::ZERO);
    // A dumbbell: two circles on a shared body.
    let dumbbell = world
        .add_body(RigidBodyDef {
            shapes: vec![
                Shape::circle(0.5, Vector2::new(-2.0, 0.0)).unwrap(),
                Shape::circle(0.5, Vector2::new(2.0, 0.0)).unwrap(),
            ],
            material: material(1.0, 0.0, 0.5),
            ..Default::default()
        })
        .unwrap();
    let left = world.add_body(circle_def(Vector2::new(-2.0, 0.8), 0.5, 1.0)).unwrap();

    let a = world.body(dumbbell).unwrap();
    let b = world.body(left).unwrap();
    let mut manifolds = Vec::new();
    narrowphase::collide_bodies(a, b, &mut manifolds);
    assert_eq!(manifolds.len(), 1);
    // Only the left shape collides, and the manifold is tagged with it.
    assert_eq!(manifolds[0].shape_a, 0);
}

// =========================================================================
// Solver behavior
// =========================================================================

#[test]
fn test_resting_box_stays_on_ground() {
    let mut world = PhysicsWorld::new(Vector2::new(0.0, -10.0));
    world.add_body(static_box_def(Vector2::new(0.0, -0.5), 40.0, 1.0)).unwrap();
    let id = world.add_body(box_def(Vector2::new(0.0, 0.51), 1.0, 1.0)).unwrap();
    step(&mut world, 180);
    let body = world.body(id).unwrap();
    assert!(
        (body.position.y - 0.5).abs() < 0.02,
        "box should rest at 0.5, got {}",
        body.position.y
    );
    assert!(body.linear_velocity.length() < 0.05);
}

#[test]
fn test_friction_cone_limits_tangent_impulse() {
    let mut world = PhysicsWorld::new(Vector2::new(0.0, -10.0));
    world.add_body(static_box_def(Vector2::new(0.0, -0.5), 40.0, 1.0)).unwrap();
    let slider = world
        .add_body(RigidBodyDef {
            linear_velocity: Vector2::new(5.0, 0.0),
            ..box_def(Vector2::new(-10.0, 0.51), 1.0, 1.0)
        })
        .unwrap();
    for _ in 0..60 {
        world.step(DT, 8, 4, 8, 1).unwrap();
        for manifold in world.contacts() {
            for point in &manifold.points {
                assert!(
                    point.tangent_impulse.abs() <= manifold.friction * point.normal_impulse + 1e-4,
                    "tangent impulse escaped the friction cone"
                );
            }
        }
    }
    // Friction must be slowing the slider down.
    let v = world.body(slider).unwrap().linear_velocity.x;
    assert!(v < 5.0);
}

#[test]
fn test_frictionless_slider_keeps_its_speed() {
    let mut world = PhysicsWorld::new(Vector2::new(0.0, -10.0));
    world
        .add_body(RigidBodyDef {
            body_type: BodyType::Static,
            material: material(1.0, 0.0, 0.0),
            ..box_def(Vector2::new(0.0, -0.5), 400.0, 1.0)
        })
        .unwrap();
    let slider = world
        .add_body(RigidBodyDef {
            linear_velocity: Vector2::new(5.0, 0.0),
            material: material(1.0, 0.0, 0.0),
            ..box_def(Vector2::new(-100.0, 0.51), 1.0, 1.0)
        })
        .unwrap();
    step(&mut world, 120);
    let v = world.body(slider).unwrap().linear_velocity.x;
    assert!((v - 5.0).abs() < 0.05, "frictionless contact changed tangential speed: {v}");
}

#[test]
fn test_momentum_conserved_in_pair_collision() {
    let mut world = PhysicsWorld::new(Vector2::ZERO);
    let a = world
        .add_body(RigidBodyDef {
            linear_velocity: Vector2::new(3.0, 0.0),
            ..circle_def(Vector2::new(-3.0, 0.0), 1.0, 2.0)
        })
        .unwrap();
    let b = world.add_body(circle_def(Vector2::new(3.0, 0.0), 1.0, 1.0)).unwrap();

    let momentum = |world: &PhysicsWorld| {
        let ba = world.body(a).unwrap();
        let bb = world.body(b).unwrap();
        ba.mass * ba.linear_velocity.x + bb.mass * bb.linear_velocity.x
    };
    let before = momentum(&world);
    step(&mut world, 240);
    let after = momentum(&world);
    assert!((before - after).abs() < 1e-3, "momentum drifted: {before} -> {after}");
}

#[test]
fn test_restitution_ordering() {
    // Bouncier materials rebound faster off the same floor.
    let mut rebound = Vec::new();
    for restitution in [0.2, 0.5, 0.9] {
        let mut world = PhysicsWorld::new(Vector2::new(0.0, -10.0));
        world
            .add_body(RigidBodyDef {
                body_type: BodyType::Static,
                material: material(1.0, 1.0, 0.2),
                ..box_def(Vector2::new(0.0, -0.5), 40.0, 1.0)
            })
            .unwrap();
        let ball = world
            .add_body(RigidBodyDef {
                material: Material { density: 1.0, restitution, friction: 0.2 },
                ..circle_def(Vector2::new(0.0, 5.0), 0.5, 1.0)
            })
            .unwrap();
        let mut max_up: Scalar = 0.0;
        for _ in 0..240 {
            world.step(DT, 8, 4, 8, 1).unwrap();
            max_up = world.body(ball).unwrap().linear_velocity.y.max(max_up);
        }
        rebound.push(max_up);
    }
    assert!(rebound[0] < rebound[1] && rebound[1] < rebound[2], "rebound speeds {rebound:?}");
}

#[test]
fn test_warm_starting_caches_impulses() {
    // Sleeping would zero the resting impulse, so keep the body awake.
    let mut config = WorldConfig::default();
    config.allow_sleeping = false;
    let mut world = PhysicsWorld::with_config(Vector2::new(0.0, -10.0), config);
    world.add_body(static_box_def(Vector2::new(0.0, -0.5), 40.0, 1.0)).unwrap();
    world.add_body(box_def(Vector2::new(0.0, 0.51), 1.0, 1.0)).unwrap();
    step(&mut world, 120);

    // Settled resting contact: the accumulated normal impulse carries the
    // weight, mass * g * dt = 1 * 10 / 60.
    let total: Scalar = world
        .contacts()
        .iter()
        .flat_map(|m| m.points.iter())
        .map(|p| p.normal_impulse)
        .sum();
    assert!((total - 10.0 * DT).abs() < 0.03, "resting impulse {total}");
}

#[test]
fn test_disabling_warm_starting_still_settles() {
    let mut config = WorldConfig::default();
    config.warm_starting = false;
    let mut world = PhysicsWorld::with_config(Vector2::new(0.0, -10.0), config);
    world.add_body(static_box_def(Vector2::new(0.0, -0.5), 40.0, 1.0)).unwrap();
    let id = world.add_body(box_def(Vector2::new(0.0, 0.51), 1.0, 1.0)).unwrap();
    step(&mut world, 240);
    assert!((world.body(id).unwrap().position.y - 0.5).abs() < 0.03);
}

#[test]
fn test_determinism_identical_worlds_identical_states() {
    let build = || {
        let mut world = stack_world(BroadphaseKind::SpatialHashGrid);
        world.add_body(circle_def(Vector2::new(0.3, 12.0), 0.5, 2.0)).unwrap();
        world
    };
    let mut first = build();
    let mut second = build();
    step(&mut first, 180);
    step(&mut second, 180);

    for (a, b) in first.bodies().zip(second.bodies()) {
        assert_eq!(a.position, b.position);
        assert_eq!(a.angle, b.angle);
        assert_eq!(a.linear_velocity, b.linear_velocity);
        assert_eq!(a.angular_velocity, b.angular_velocity);
    }
}

// =========================================================================
// Constraints
// =========================================================================

#[test]
fn test_distance_joint_holds_length() {
    let mut world = PhysicsWorld::new(Vector2::new(0.0, -10.0));
    let anchor = world.add_body(static_box_def(Vector2::ZERO, 0.5, 0.5)).unwrap();
    let bob = world.add_body(circle_def(Vector2::new(2.0, 0.0), 0.3, 1.0)).unwrap();
    world.add_constraint(Constraint::Distance(DistanceConstraint::new(
        anchor,
        bob,
        Vector2::ZERO,
        Vector2::ZERO,
        2.0,
    )));

    let mut lowest: Scalar = 0.0;
    for _ in 0..300 {
        world.step(DT, 8, 4, 8, 2).unwrap();
        let body = world.body(bob).unwrap();
        let d = body.position.length();
        assert!((d - 2.0).abs() < 0.1, "pendulum rod stretched to {d}");
        lowest = lowest.min(body.position.y);
    }
    // The pendulum swung below the anchor at some point.
    assert!(lowest < -1.0, "pendulum never swung down, lowest y {lowest}");
}

#[test]
fn test_spring_joint_oscillates_and_settles() {
    let mut world = PhysicsWorld::new(Vector2::ZERO);
    let anchor = world.add_body(static_box_def(Vector2::ZERO, 0.5, 0.5)).unwrap();
    let bob = world.add_body(circle_def(Vector2::new(3.0, 0.0), 0.3, 1.0)).unwrap();
    world.add_constraint(Constraint::Distance(
        DistanceConstraint::new(anchor, bob, Vector2::ZERO, Vector2::ZERO, 2.0).with_spring(
            tumble_core::SpringParams { frequency_hz: 2.0, damping_ratio: 0.7 },
        ),
    ));

    // Stretched by 1 initially; the spring should pull the bob inward.
    step(&mut world, 30);
    let early = world.body(bob).unwrap().position.length();
    assert!(early < 3.0);

    step(&mut world, 600);
    let settled = world.body(bob).unwrap().position.length();
    assert!((settled - 2.0).abs() < 0.2, "spring settled at {settled}");
}

#[test]
fn test_revolute_joint_pins_bodies_together() {
    let mut world = PhysicsWorld::new(Vector2::new(0.0, -10.0));
    let anchor = world.add_body(static_box_def(Vector2::ZERO, 0.5, 0.5)).unwrap();
    // Horizontal plank hinged at its left end to the anchor center.
    let plank = world.add_body(box_def(Vector2::new(1.0, 0.0), 2.0, 0.2)).unwrap();
    world.add_constraint(Constraint::Revolute(tumble_core::RevoluteConstraint::new(
        anchor,
        plank,
        Vector2::ZERO,
        Vector2::new(-1.0, 0.0),
    )));

    let mut max_swing: Scalar = 0.0;
    for _ in 0..300 {
        world.step(DT, 8, 4, 8, 2).unwrap();
        let body = world.body(plank).unwrap();
        let pivot =
            body.position + Vector2::from_angle(body.angle).rotate(Vector2::new(-1.0, 0.0));
        assert!(pivot.length() < 0.1, "hinge pivot drifted to {pivot:?}");
        max_swing = max_swing.max(body.angle.abs());
    }
    // The plank swung down under gravity at some point.
    assert!(max_swing > 0.5, "plank never swung, max angle {max_swing}");
}

#[test]
fn test_remove_constraint_frees_bodies() {
    let mut world = PhysicsWorld::new(Vector2::new(0.0, -10.0));
    let anchor = world.add_body(static_box_def(Vector2::ZERO, 0.5, 0.5)).unwrap();
    let bob = world.add_body(circle_def(Vector2::new(2.0, 0.0), 0.3, 1.0)).unwrap();
    let joint = world.add_constraint(Constraint::Distance(DistanceConstraint::new(
        anchor,
        bob,
        Vector2::ZERO,
        Vector2::ZERO,
        2.0,
    )));
    step(&mut world, 30);
    world.remove_constraint(joint).unwrap();
    step(&mut world, 120);
    // Free fall after release: well below the rod circle.
    assert!(world.body(bob).unwrap().position.y < -2.5);
}

// =========================================================================
// Queries
// =========================================================================

#[test]
fn test_query_aabb_and_point() {
    let mut world = PhysicsWorld::new(Vector2::ZERO);
    let a = world.add_body(box_def(Vector2::ZERO, 2.0, 2.0)).unwrap();
    let b = world.add_body(circle_def(Vector2::new(10.0, 0.0), 1.0, 1.0)).unwrap();

    let hits = world.query_aabb(&Aabb::new(Vector2::new(-0.5, -0.5), Vector2::new(0.5, 0.5)));
    assert_eq!(hits, vec![a]);

    let hits = world.query_aabb(&Aabb::new(Vector2::new(-20.0, -5.0), Vector2::new(20.0, 5.0)));
    assert_eq!(hits, vec![a, b]);

    assert_eq!(world.query_point(Vector2::new(0.9, 0.9)), vec![a]);
    assert_eq!(world.query_point(Vector2::new(10.5, 0.0)), vec![b]);
    assert!(world.query_point(Vector2::new(5.0, 5.0)).is_empty());
}

#[test]
fn test_queries_track_stepped_positions() {
    let mut world = PhysicsWorld::new(Vector2::ZERO);
    let id = world
        .add_body(RigidBodyDef {
            linear_velocity: Vector2::new(10.0, 0.0),
            ..circle_def(Vector2::ZERO, 1.0, 1.0)
        })
        .unwrap();
    step(&mut world, 60);
    // Body moved to roughly x = 10; queries reflect the new pose.
    assert!(world.query_point(Vector2::new(10.0, 0.0)).contains(&id));
    assert!(world.query_point(Vector2::ZERO).is_empty());
}

#[test]
fn test_raycast_hits_nearest_body() {
    let mut world = PhysicsWorld::new(Vector2::ZERO);
    let near = world.add_body(circle_def(Vector2::new(5.0, 0.0), 1.0, 1.0)).unwrap();
    world.add_body(circle_def(Vector2::new(12.0, 0.0), 1.0, 1.0)).unwrap();
    world.add_body(box_def(Vector2::new(5.0, 10.0), 2.0, 2.0)).unwrap();

    let hit = world.raycast(Vector2::ZERO, Vector2::X, 100.0).unwrap();
    assert_eq!(hit.body, near);
    assert!((hit.distance - 4.0).abs() < 1e-3);
    assert!((hit.point - Vector2::new(4.0, 0.0)).length() < 1e-3);

    // Limited range stops short of everything.
    assert!(world.raycast(Vector2::ZERO, Vector2::X, 3.0).is_none());
    // Ray away from the bodies misses.
    assert!(world.raycast(Vector2::ZERO, -Vector2::X, 100.0).is_none());
}

#[test]
fn test_raycast_hits_polygon_edge() {
    let mut world = PhysicsWorld::new(Vector2::ZERO);
    let id = world.add_body(box_def(Vector2::new(0.0, 5.0), 2.0, 2.0)).unwrap();
    let hit = world.raycast(Vector2::ZERO, Vector2::Y, 100.0).unwrap();
    assert_eq!(hit.body, id);
    assert!((hit.distance - 4.0).abs() < 1e-3);
}

// =========================================================================
// Sleeping
// =========================================================================

fn sleepy_world() -> (PhysicsWorld, BodyId) {
    let mut config = WorldConfig::default();
    config.sleep_frames = 20;
    let mut world = PhysicsWorld::with_config(Vector2::new(0.0, -10.0), config);
    world.add_body(static_box_def(Vector2::new(0.0, -0.5), 40.0, 1.0)).unwrap();
    let id = world.add_body(box_def(Vector2::new(0.0, 0.51), 1.0, 1.0)).unwrap();
    (world, id)
}

#[test]
fn test_resting_body_falls_asleep() {
    let (mut world, id) = sleepy_world();
    step(&mut world, 240);
    assert!(world.body(id).unwrap().sleeping);
    // Asleep means no further integration: the pose is frozen.
    let before = world.body(id).unwrap().position;
    step(&mut world, 60);
    assert_eq!(world.body(id).unwrap().position, before);
}

#[test]
fn test_force_wakes_sleeping_body() {
    let (mut world, id) = sleepy_world();
    step(&mut world, 240);
    assert!(world.body(id).unwrap().sleeping);
    world.apply_impulse(id, Vector2::new(3.0, 0.0)).unwrap();
    assert!(!world.body(id).unwrap().sleeping);
    step(&mut world, 5);
    assert!(world.body(id).unwrap().position.x > 0.0);
}

#[test]
fn test_sleeping_disabled_keeps_bodies_awake() {
    let mut config = WorldConfig::default();
    config.allow_sleeping = false;
    let mut world = PhysicsWorld::with_config(Vector2::new(0.0, -10.0), config);
    world.add_body(static_box_def(Vector2::new(0.0, -0.5), 40.0, 1.0)).unwrap();
    let id = world.add_body(box_def(Vector2::new(0.0, 0.51), 1.0, 1.0)).unwrap();
    step(&mut world, 300);
    assert!(!world.body(id).unwrap().sleeping);
}

#[test]
fn test_stack_sleeps_as_an_island() {
    let mut config = WorldConfig::default();
    config.sleep_frames = 20;
    let mut world = PhysicsWorld::with_config(Vector2::new(0.0, -10.0), config);
    world.add_body(static_box_def(Vector2::new(0.0, -0.5), 40.0, 1.0)).unwrap();
    let bottom = world.add_body(box_def(Vector2::new(0.0, 0.51), 1.0, 1.0)).unwrap();
    let top = world.add_body(box_def(Vector2::new(0.0, 1.53), 1.0, 1.0)).unwrap();
    step(&mut world, 300);
    assert!(world.body(bottom).unwrap().sleeping);
    assert!(world.body(top).unwrap().sleeping);

    // Waking the top wakes the island partner underneath.
    world.apply_impulse(top, Vector2::new(2.0, 0.0)).unwrap();
    step(&mut world, 2);
    assert!(!world.body(bottom).unwrap().sleeping);
}

// =========================================================================
// Friction & materials
// =========================================================================

#[test]
fn test_higher_friction_stops_a_slider_sooner() {
    let mut world = PhysicsWorld::new(Vector2::new(0.0, -10.0));
    world
        .add_body(RigidBodyDef {
            body_type: BodyType::Static,
            material: material(1.0, 0.0, 0.5),
            ..box_def(Vector2::new(0.0, -0.5), 400.0, 1.0)
        })
        .unwrap();

    // Same launch speed, different friction; a shared group keeps the two
    // sliders from colliding with each other.
    let slippery = world
        .add_body(RigidBodyDef {
            linear_velocity: Vector2::new(5.0, 0.0),
            material: material(1.0, 0.0, 0.05),
            group: 9,
            ..box_def(Vector2::new(-60.0, 0.51), 1.0, 1.0)
        })
        .unwrap();
    let grippy = world
        .add_body(RigidBodyDef {
            linear_velocity: Vector2::new(5.0, 0.0),
            material: material(1.0, 0.0, 0.9),
            group: 9,
            ..box_def(Vector2::new(-50.0, 0.51), 1.0, 1.0)
        })
        .unwrap();

    step(&mut world, 300);
    let slid = world.body(slippery).unwrap().position.x - -60.0;
    let gripped = world.body(grippy).unwrap().position.x - -50.0;
    assert!(
        slid > gripped + 1.0,
        "low friction should slide farther: {slid} vs {gripped}"
    );
}

#[test]
fn test_angular_damping_decays_spin() {
    let mut world = PhysicsWorld::new(Vector2::ZERO);
    let id = world
        .add_body(RigidBodyDef {
            angular_velocity: 10.0,
            angular_damping: 1.0,
            ..box_def(Vector2::ZERO, 1.0, 1.0)
        })
        .unwrap();
    step(&mut world, 60);
    let w = world.body(id).unwrap().angular_velocity;
    assert!(w > 0.0 && w < 6.0, "angular damping should roughly halve spin in 1s, got {w}");
}

#[test]
fn test_impulse_travels_down_a_row_of_circles() {
    let mut config = WorldConfig::default();
    config.allow_sleeping = false;
    let mut world = PhysicsWorld::with_config(Vector2::ZERO, config);

    let bouncy = Material { density: 1.0 / PI * 4.0, restitution: 0.9, friction: 0.0 };
    let mut row = Vec::new();
    for i in 0..3 {
        row.push(
            world
                .add_body(RigidBodyDef {
                    position: Vector2::new(i as Scalar * 1.01, 0.0),
                    shapes: vec![Shape::circle(0.5, Vector2::ZERO).unwrap()],
                    material: bouncy,
                    ..Default::default()
                })
                .unwrap(),
        );
    }
    let striker = world
        .add_body(RigidBodyDef {
            linear_velocity: Vector2::new(4.0, 0.0),
            material: bouncy,
            position: Vector2::new(-3.0, 0.0),
            shapes: vec![Shape::circle(0.5, Vector2::ZERO).unwrap()],
            ..Default::default()
        })
        .unwrap();

    let momentum = |world: &PhysicsWorld| -> Scalar {
        world.bodies().map(|b| b.mass * b.linear_velocity.x).sum()
    };
    let before = momentum(&world);
    step(&mut world, 240);
    let after = momentum(&world);

    assert!((before - after).abs() < 1e-2, "momentum drifted: {before} -> {after}");
    // The impulse reached the far end of the row.
    assert!(
        world.body(*row.last().unwrap()).unwrap().linear_velocity.x > 0.5,
        "last circle never moved"
    );
    // The striker does not pass through the row.
    assert!(world.body(striker).unwrap().position.x < 1.0);
}

// =========================================================================
// Kinematic interaction
// =========================================================================

#[test]
fn test_kinematic_platform_drags_resting_box() {
    let mut world = PhysicsWorld::new(Vector2::new(0.0, -10.0));
    let platform = world
        .add_body(RigidBodyDef {
            body_type: BodyType::Kinematic,
            linear_velocity: Vector2::new(1.0, 0.0),
            material: material(1.0, 0.0, 0.9),
            ..box_def(Vector2::new(0.0, -0.5), 20.0, 1.0)
        })
        .unwrap();
    let rider = world
        .add_body(RigidBodyDef {
            material: material(1.0, 0.0, 0.9),
            ..box_def(Vector2::new(0.0, 0.51), 1.0, 1.0)
        })
        .unwrap();

    step(&mut world, 120);
    let rider_v = world.body(rider).unwrap().linear_velocity.x;
    assert!(rider_v > 0.3, "friction should drag the rider along, got vx = {rider_v}");
    // A moving kinematic partner must also keep the rider awake.
    assert!(!world.body(rider).unwrap().sleeping);
    // The platform itself is unaffected by the contact.
    assert!((world.body(platform).unwrap().linear_velocity.x - 1.0).abs() < 1e-6);
}

// =========================================================================
// Warm-start cache keys
// =========================================================================

#[test]
fn test_contact_features_stable_across_steps() {
    let mut config = WorldConfig::default();
    config.allow_sleeping = false;
    let mut world = PhysicsWorld::with_config(Vector2::new(0.0, -10.0), config);
    world.add_body(static_box_def(Vector2::new(0.0, -0.5), 40.0, 1.0)).unwrap();
    world.add_body(box_def(Vector2::new(0.0, 0.51), 1.0, 1.0)).unwrap();

    step(&mut world, 60);
    let keys = |world: &PhysicsWorld| {
        let mut keys: Vec<_> = world
            .contacts()
            .iter()
            .flat_map(|m| m.points.iter().map(|p| m.key(p)))
            .collect();
        keys.sort_by_key(|k| (k.body_a, k.body_b, k.shape_a, k.shape_b, k.feature));
        keys
    };
    let first = keys(&world);
    assert!(!first.is_empty());
    step(&mut world, 1);
    // Identical geometry, identical features: the cache can always match.
    assert_eq!(first, keys(&world));
}

#[test]
fn test_grid_cell_size_does_not_change_results() {
    let build = |cell: Scalar| {
        let mut config = WorldConfig::default();
        config.grid_cell_width = cell;
        config.grid_cell_height = cell;
        let mut world = PhysicsWorld::with_config(Vector2::new(0.0, -10.0), config);
        world.add_body(static_box_def(Vector2::new(0.0, -0.5), 40.0, 1.0)).unwrap();
        for i in 0..6 {
            world
                .add_body(box_def(
                    Vector2::new(0.03 * (i % 3) as Scalar, 0.51 + 1.02 * i as Scalar),
                    1.0,
                    1.0,
                ))
                .unwrap();
        }
        world
    };
    let mut fine = build(1.0);
    let mut coarse = build(16.0);
    step(&mut fine, 150);
    step(&mut coarse, 150);
    for (a, b) in fine.bodies().zip(coarse.bodies()) {
        assert_eq!(a.position, b.position, "cell size leaked into the simulation");
    }
}

// =========================================================================
// Stacks & platform edges
// =========================================================================

#[test]
fn test_stack_keeps_its_order() {
    let mut world = PhysicsWorld::new(Vector2::new(0.0, -10.0));
    world.add_body(static_box_def(Vector2::new(0.0, -0.5), 40.0, 1.0)).unwrap();
    let mut stack = Vec::new();
    for i in 0..5 {
        stack.push(
            world
                .add_body(box_def(Vector2::new(0.0, 0.51 + 1.02 * i as Scalar), 1.0, 1.0))
                .unwrap(),
        );
    }
    step(&mut world, 300);

    let ys: Vec<Scalar> = stack.iter().map(|&id| world.body(id).unwrap().position.y).collect();
    for pair in ys.windows(2) {
        let gap = pair[1] - pair[0];
        assert!(
            (0.9..=1.1).contains(&gap),
            "stack lost its shape, gaps {ys:?}"
        );
    }
}

#[test]
fn test_box_on_platform_edge_does_not_clip_through() {
    let mut world = PhysicsWorld::new(Vector2::new(0.0, -10.0));
    world.add_body(static_box_def(Vector2::new(0.0, -0.5), 10.0, 1.0)).unwrap();
    // Most of the box hangs over the right edge of the platform; it may tip
    // and roll off, but it must never sink through the surface.
    world.add_body(box_def(Vector2::new(4.8, 0.8), 1.0, 1.0)).unwrap();

    for _ in 0..300 {
        world.step(DT, 8, 4, 8, 1).unwrap();
        for manifold in world.contacts() {
            for point in &manifold.points {
                assert!(
                    point.depth < 0.1,
                    "edge contact penetrated by {}",
                    point.depth
                );
            }
        }
    }
}

#[test]
fn test_worlds_are_independent() {
    let mut first = PhysicsWorld::new(Vector2::new(0.0, -10.0));
    let mut second = PhysicsWorld::new(Vector2::ZERO);
    let a = first.add_body(circle_def(Vector2::ZERO, 1.0, 1.0)).unwrap();
    let b = second.add_body(circle_def(Vector2::ZERO, 1.0, 1.0)).unwrap();

    step(&mut first, 60);
    // Stepping one world leaves the other untouched.
    assert_eq!(second.body(b).unwrap().position, Vector2::ZERO);
    assert!(first.body(a).unwrap().position.y < -1.0);
}

// =========================================================================
// World lifecycle & callbacks
// =========================================================================

#[test]
fn test_clear_keeps_configuration() {
    let mut config = WorldConfig::default();
    config.penetration_slop = 0.02;
    let mut world = PhysicsWorld::with_config(Vector2::new(0.0, -10.0), config);
    world.add_body(box_def(Vector2::ZERO, 1.0, 1.0)).unwrap();
    world.clear();
    assert_eq!(world.body_count(), 0);
    assert_eq!(world.config().penetration_slop, 0.02);
}

#[test]
fn test_contact_handler_sees_manifolds() {
    use std::cell::RefCell;
    use std::rc::Rc;

    let mut world = PhysicsWorld::new(Vector2::new(0.0, -10.0));
    world.add_body(static_box_def(Vector2::new(0.0, -0.5), 40.0, 1.0)).unwrap();
    world.add_body(box_def(Vector2::new(0.0, 0.4), 1.0, 1.0)).unwrap();

    let seen = Rc::new(RefCell::new(0usize));
    let sink = Rc::clone(&seen);
    world.set_contact_handler(move |manifolds| {
        *sink.borrow_mut() += manifolds.len();
    });
    step(&mut world, 10);
    assert!(*seen.borrow() > 0, "handler never saw a manifold");

    world.clear_contact_handler();
    let count = *seen.borrow();
    step(&mut world, 10);
    assert_eq!(*seen.borrow(), count);
}

#[test]
fn test_attractor_pulls_dynamic_bodies() {
    let mut config = WorldConfig::default();
    config.gravitational_constant = 10.0;
    let mut world = PhysicsWorld::with_config(Vector2::ZERO, config);
    let star = world
        .add_body(RigidBodyDef {
            body_type: BodyType::Static,
            is_attractor: true,
            ..circle_def(Vector2::ZERO, 0.5, 5.0)
        })
        .unwrap();
    let satellite = world.add_body(circle_def(Vector2::new(8.0, 0.0), 0.2, 1.0)).unwrap();

    step(&mut world, 30);
    let body = world.body(satellite).unwrap();
    assert!(body.linear_velocity.x < 0.0, "satellite should accelerate toward the attractor");
    assert!(body.position.x < 8.0);
    // The attractor itself stayed put.
    assert_eq!(world.body(star).unwrap().position, Vector2::ZERO);
}
