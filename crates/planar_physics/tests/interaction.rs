//! Queries, events, filtering and joints through the public world API

use approx::assert_relative_eq;
use planar_physics::prelude::*;

const DT: f32 = 1.0 / 60.0;

fn world(gravity: Vec2) -> PhysicsWorld {
    let _ = env_logger::builder().is_test(true).try_init();
    PhysicsWorld::new(WorldConfig::default().with_gravity(gravity.x, gravity.y)).unwrap()
}

fn ground(world: &mut PhysicsWorld) -> BodyHandle {
    let ground = world.create_body(&BodyDef::fixed().with_position(0.0, -1.0)).unwrap();
    world
        .create_shape(ground, Polygon::make_box(20.0, 1.0), &ShapeDef::default())
        .unwrap();
    ground
}

fn ball(world: &mut PhysicsWorld, body: BodyDef, def: &ShapeDef) -> (BodyHandle, ShapeHandle) {
    let body = world.create_body(&body).unwrap();
    let shape = world.create_shape(body, Circle::new(Vec2::ZERO, 0.5), def).unwrap();
    (body, shape)
}

fn run(world: &mut PhysicsWorld, steps: usize) {
    for _ in 0..steps {
        world.step(DT).unwrap();
    }
}

// ==================== Queries ====================

fn query_scene() -> (PhysicsWorld, ShapeHandle, ShapeHandle) {
    let mut world = world(Vec2::ZERO);
    let (_, near) = ball(&mut world, BodyDef::fixed(), &ShapeDef::default().with_user_data(11));
    let (_, far) = ball(
        &mut world,
        BodyDef::fixed().with_position(3.0, 0.0),
        &ShapeDef::default().with_filter(Filter::new(0x0002, 0xFFFF)),
    );
    (world, near, far)
}

#[test]
fn test_ray_cast_returns_closest_hit() {
    let (world, near, _) = query_scene();
    let input = RayCastInput::new(Vec2::new(-5.0, 0.0), Vec2::new(5.0, 0.0));

    let hit = world.query().ray_cast(&input, QueryFilter::default()).unwrap();
    assert_eq!(hit.shape, near);
    assert_eq!(hit.user_data, 11);
    assert_relative_eq!(hit.fraction, 0.45, epsilon = 1e-5);
    assert_relative_eq!(hit.point.x, -0.5, epsilon = 1e-5);
    assert_relative_eq!(hit.normal.x, -1.0, epsilon = 1e-5);
}

#[test]
fn test_ray_cast_all_is_sorted() {
    let (world, near, far) = query_scene();
    let input = RayCastInput::new(Vec2::new(10.0, 0.0), Vec2::new(-10.0, 0.0));

    let hits = world.query().ray_cast_all(&input, QueryFilter::default());
    assert_eq!(hits.len(), 2);
    assert_eq!(hits[0].shape, far);
    assert_eq!(hits[1].shape, near);
    assert!(hits[0].fraction < hits[1].fraction);
}

#[test]
fn test_ray_cast_respects_filter_and_length() {
    let (world, _, far) = query_scene();
    let input = RayCastInput::new(Vec2::new(-5.0, 0.0), Vec2::new(5.0, 0.0));

    let only_second = QueryFilter { category_bits: 0x0001, mask_bits: 0x0002 };
    let hit = world.query().ray_cast(&input, only_second).unwrap();
    assert_eq!(hit.shape, far);

    let short = input.with_max_fraction(0.4);
    assert!(world.query().ray_cast(&short, QueryFilter::default()).is_none());

    let invalid = RayCastInput::new(Vec2::new(f32::NAN, 0.0), Vec2::X);
    assert!(world.query().ray_cast(&invalid, QueryFilter::default()).is_none());
}

#[test]
fn test_ray_cast_skips_sensors() {
    let mut world = world(Vec2::ZERO);
    ball(&mut world, BodyDef::fixed(), &ShapeDef::default().sensor());
    let input = RayCastInput::new(Vec2::new(-5.0, 0.0), Vec2::new(5.0, 0.0));
    assert!(world.query().ray_cast(&input, QueryFilter::default()).is_none());
}

#[test]
fn test_overlap_and_point_queries() {
    let (world, near, far) = query_scene();
    let query = world.query();

    let around_near = AABB::from_center_half_extents(Vec2::new(-0.5, 0.0), Vec2::new(0.25, 0.25));
    assert_eq!(query.overlap_aabb(&around_near, QueryFilter::default()), vec![near]);

    let everything = AABB::from_center_half_extents(Vec2::new(1.5, 0.0), Vec2::new(5.0, 5.0));
    let found = query.overlap_aabb(&everything, QueryFilter::default());
    assert_eq!(found.len(), 2);
    assert!(found.contains(&near) && found.contains(&far));

    let mut visited = 0;
    query.query_aabb(&everything, |_| {
        visited += 1;
        false
    });
    assert_eq!(visited, 1);

    assert_eq!(query.point_inside(Vec2::new(3.2, 0.1), QueryFilter::default()), Some(far));
    assert_eq!(query.point_inside(Vec2::new(1.5, 0.0), QueryFilter::default()), None);
    assert!(world.shape_test_point(near, Vec2::new(0.1, 0.1)).unwrap());
}

// ==================== Events ====================

#[test]
fn test_begin_and_end_touch_events() {
    let mut world = world(Vec2::new(0.0, -10.0));
    ground(&mut world);
    let (body, shape) = ball(
        &mut world,
        BodyDef::dynamic().with_position(0.0, 2.0),
        &ShapeDef::default().with_density(1.0).with_user_data(42),
    );

    let mut started = Vec::new();
    for _ in 0..120 {
        world.step(DT).unwrap();
        started.extend(world.collision_started().cloned());
    }
    assert_eq!(started.len(), 1);
    let event = &started[0];
    assert!(event.involves(shape));
    assert!(!event.is_sensor);
    assert!(event.user_data1 == 42 || event.user_data2 == 42);
    assert!(!event.contacts.is_empty());
    let normal = event.average_normal().unwrap();
    assert_relative_eq!(normal.y.abs(), 1.0, epsilon = 1e-3);

    // Lift the ball clear of the ground
    world.set_body_transform(body, Vec2::new(0.0, 10.0), 0.0).unwrap();
    world.step(DT).unwrap();
    let stopped: Vec<_> = world.collision_stopped().collect();
    assert_eq!(stopped.len(), 1);
    assert!(stopped[0].involves(shape));
    assert!(stopped[0].contacts.is_empty());
}

#[test]
fn test_sensor_reports_enter_and_exit() {
    let mut world = world(Vec2::ZERO);
    let zone = world.create_body(&BodyDef::fixed()).unwrap();
    let sensor = world
        .create_shape(zone, Polygon::make_box(1.0, 1.0), &ShapeDef::default().sensor())
        .unwrap();
    let (body, _) = ball(
        &mut world,
        BodyDef::dynamic().with_position(0.0, 3.0).with_linear_velocity(0.0, -6.0),
        &ShapeDef::default().with_density(1.0),
    );

    let (mut enters, mut exits) = (0, 0);
    for _ in 0..120 {
        world.step(DT).unwrap();
        enters += world.sensor_enters().filter(|e| e.involves(sensor)).count();
        exits += world.sensor_exits().filter(|e| e.involves(sensor)).count();
        assert_eq!(world.collision_started().count(), 0);
    }
    assert_eq!(enters, 1);
    assert_eq!(exits, 1);

    // The sensor never pushed back
    assert_relative_eq!(world.body_linear_velocity(body).unwrap().y, -6.0, epsilon = 1e-4);
}

#[test]
fn test_pre_solve_can_disable_contacts() {
    let mut world = world(Vec2::new(0.0, -10.0));
    ground(&mut world);
    let (body, _) = ball(
        &mut world,
        BodyDef::dynamic().with_position(0.0, 1.0),
        &ShapeDef::default().with_density(1.0),
    );

    world.set_pre_solve(|_: ShapeHandle, _: ShapeHandle, manifold: &Manifold| manifold.point_count == 0);
    run(&mut world, 60);
    // Began touching but passed through
    assert!(world.body_position(body).unwrap().y < 0.0);

    world.clear_pre_solve();
    world.set_body_transform(body, Vec2::new(0.0, 1.0), 0.0).unwrap();
    world.set_body_linear_velocity(body, Vec2::ZERO).unwrap();
    run(&mut world, 60);
    assert!(world.body_position(body).unwrap().y > 0.45);
}

// ==================== Filtering ====================

#[test]
fn test_masks_keep_shapes_apart() {
    let mut world = world(Vec2::new(0.0, -10.0));
    let ground = ground(&mut world);
    let (scenery, movers, loose) = (CollisionLayer::custom(1), CollisionLayer::custom(2), CollisionLayer::custom(3));
    let ground_shape = world.body_shapes(ground).unwrap()[0];
    world
        .set_shape_filter(ground_shape, Filter::from_layer(scenery, &[movers]))
        .unwrap();

    let debris = Filter::from_layer(loose, &[loose]);
    let (fallen, _) = ball(
        &mut world,
        BodyDef::dynamic().with_position(-2.0, 1.0),
        &ShapeDef::default().with_density(1.0).with_filter(debris),
    );
    let player = Filter::from_layer(movers, &[scenery]);
    let (kept, _) = ball(
        &mut world,
        BodyDef::dynamic().with_position(2.0, 1.0),
        &ShapeDef::default().with_density(1.0).with_filter(player),
    );

    run(&mut world, 60);
    assert!(world.body_position(fallen).unwrap().y < -1.0);
    assert!(world.body_position(kept).unwrap().y > 0.45);
}

#[test]
fn test_negative_group_never_collides() {
    let mut world = world(Vec2::ZERO);
    let group = ShapeDef::default().with_density(1.0).with_filter(Filter::DEFAULT.with_group(-3));
    ball(&mut world, BodyDef::dynamic(), &group);
    ball(&mut world, BodyDef::dynamic().with_position(0.5, 0.0), &group);
    let (_, other) = ball(&mut world, BodyDef::dynamic().with_position(0.0, 0.8), &ShapeDef::default().with_density(1.0));

    world.step(DT).unwrap();
    // Only the ungrouped ball gets contacts, one with each grouped ball
    assert_eq!(world.contact_count(), 2);
    assert!(world.collision_started().all(|e| e.involves(other)));
}

#[test]
fn test_filter_change_removes_contact() {
    let mut world = world(Vec2::new(0.0, -10.0));
    ground(&mut world);
    let (body, shape) = ball(
        &mut world,
        BodyDef::dynamic().with_position(0.0, 0.5),
        &ShapeDef::default().with_density(1.0),
    );
    run(&mut world, 2);
    assert_eq!(world.contact_count(), 1);

    world.set_shape_filter(shape, Filter::new(0x0001, 0)).unwrap();
    world.step(DT).unwrap();
    assert_eq!(world.contact_count(), 0);
    assert_eq!(world.collision_stopped().count(), 1);

    run(&mut world, 30);
    assert!(world.body_position(body).unwrap().y < 0.0);
}

// ==================== Shapes and mass ====================

#[test]
fn test_shape_density_drives_mass() {
    let mut world = world(Vec2::ZERO);
    let body = world.create_body(&BodyDef::dynamic()).unwrap();
    let shape = world
        .create_shape(body, Polygon::make_box(1.0, 0.5), &ShapeDef::default().with_density(2.0))
        .unwrap();
    assert_relative_eq!(world.body_mass(body).unwrap(), 4.0, epsilon = 1e-5);

    world.set_shape_density(shape, 1.0).unwrap();
    assert_relative_eq!(world.body_mass(body).unwrap(), 2.0, epsilon = 1e-5);

    let offset = world
        .create_shape(
            body,
            Polygon::make_offset_box(0.5, 0.5, Vec2::new(2.0, 0.0), 0.0),
            &ShapeDef::default().with_density(2.0),
        )
        .unwrap();
    let mass = world.body_mass_data(body).unwrap();
    assert_relative_eq!(mass.mass, 4.0, epsilon = 1e-5);
    assert_relative_eq!(mass.center.x, 1.0, epsilon = 1e-5);
    assert_eq!(world.body_shapes(body).unwrap().len(), 2);

    world.destroy_shape(offset).unwrap();
    assert_relative_eq!(world.body_mass(body).unwrap(), 2.0, epsilon = 1e-5);
    assert!(world.shape_density(offset).is_err());
}

#[test]
fn test_shape_accessors() {
    let mut world = world(Vec2::ZERO);
    let body = world.create_body(&BodyDef::fixed().with_user_data(5)).unwrap();
    let shape = world
        .create_shape(body, Capsule::new(Vec2::new(-1.0, 0.0), Vec2::new(1.0, 0.0), 0.25), &ShapeDef::default())
        .unwrap();

    assert_eq!(world.shape_body(shape).unwrap(), body);
    assert_eq!(world.shape_type(shape).unwrap(), ShapeType::Capsule);
    assert_eq!(world.body_user_data(body).unwrap(), 5);

    world.set_shape_friction(shape, 0.2).unwrap();
    world.set_shape_restitution(shape, 0.7).unwrap();
    world.set_shape_user_data(shape, 99).unwrap();
    assert_relative_eq!(world.shape_friction(shape).unwrap(), 0.2);
    assert_relative_eq!(world.shape_restitution(shape).unwrap(), 0.7);
    assert_eq!(world.shape_user_data(shape).unwrap(), 99);
    assert!(world.set_shape_friction(shape, -1.0).is_err());

    let aabb = world.shape_aabb(shape).unwrap();
    assert_relative_eq!(aabb.min.x, -1.25, epsilon = 1e-5);
    assert_relative_eq!(aabb.max.y, 0.25, epsilon = 1e-5);
}

// ==================== Joints ====================

#[test]
fn test_distance_joint_keeps_length() {
    let mut world = world(Vec2::new(0.0, -10.0));
    let anchor = world.create_body(&BodyDef::fixed().with_position(0.0, 5.0)).unwrap();
    let (bob, _) = ball(
        &mut world,
        BodyDef::dynamic().with_position(2.0, 5.0),
        &ShapeDef::default().with_density(1.0),
    );
    let joint = world.create_joint(DistanceJointDef::new(anchor, bob, 2.0)).unwrap();
    assert_eq!(world.joint_type(joint).unwrap(), JointType::Distance);
    assert_eq!(world.joint_bodies(joint).unwrap(), (anchor, bob));

    for _ in 0..120 {
        world.step(DT).unwrap();
        let length = (world.body_position(bob).unwrap() - Vec2::new(0.0, 5.0)).length();
        assert!((length - 2.0).abs() < 0.1, "rod stretched to {length}");
    }
    // The bob swung down
    assert!(world.body_position(bob).unwrap().y < 5.0);
}

#[test]
fn test_revolute_joint_pins_anchor() {
    let mut world = world(Vec2::new(0.0, -10.0));
    let anchor = world.create_body(&BodyDef::fixed().with_position(0.0, 5.0)).unwrap();
    let arm = world.create_body(&BodyDef::dynamic().with_position(1.0, 5.0)).unwrap();
    world
        .create_shape(arm, Polygon::make_box(1.0, 0.1), &ShapeDef::default().with_density(1.0))
        .unwrap();
    world
        .create_joint(RevoluteJointDef::new(anchor, arm, Vec2::ZERO, Vec2::new(-1.0, 0.0)))
        .unwrap();

    for step in 0..120 {
        world.step(DT).unwrap();
        let pin = world.body_world_point(arm, Vec2::new(-1.0, 0.0)).unwrap();
        assert!((pin - Vec2::new(0.0, 5.0)).length() < 0.05, "pin drifted to {pin:?}");
        if step == 30 {
            // A quarter swing in, the arm hangs well below horizontal
            assert!(world.body_angle(arm).unwrap() < -0.1);
        }
    }
}

#[test]
fn test_revolute_motor_spins_body() {
    let mut world = world(Vec2::ZERO);
    let anchor = world.create_body(&BodyDef::fixed()).unwrap();
    let wheel = world.create_body(&BodyDef::dynamic()).unwrap();
    world
        .create_shape(wheel, Circle::new(Vec2::ZERO, 0.5), &ShapeDef::default().with_density(1.0))
        .unwrap();
    world
        .create_joint(RevoluteJointDef::new(anchor, wheel, Vec2::ZERO, Vec2::ZERO).with_motor(2.0, 1000.0))
        .unwrap();

    run(&mut world, 30);
    assert_relative_eq!(world.body_angular_velocity(wheel).unwrap(), 2.0, epsilon = 1e-2);
}

#[test]
fn test_mouse_joint_drags_to_target() {
    let mut world = world(Vec2::ZERO);
    let anchor = world.create_body(&BodyDef::fixed()).unwrap();
    let (body, _) = ball(&mut world, BodyDef::dynamic(), &ShapeDef::default().with_density(1.0));
    let mouse = world.create_joint(MouseJointDef::new(anchor, body, Vec2::ZERO)).unwrap();

    world.set_mouse_target(mouse, Vec2::new(3.0, 1.0)).unwrap();
    run(&mut world, 180);

    let position = world.body_position(body).unwrap();
    assert!((position - Vec2::new(3.0, 1.0)).length() < 0.05, "stopped at {position:?}");

    let other = world.create_joint(DistanceJointDef::new(anchor, body, 1.0)).unwrap();
    assert!(world.set_mouse_target(other, Vec2::ZERO).is_err());
}

#[test]
fn test_joint_suppresses_contacts_unless_collide_connected() {
    let mut world = world(Vec2::ZERO);
    let def = ShapeDef::default().with_density(1.0);
    let (a, _) = ball(&mut world, BodyDef::dynamic(), &def);
    let (b, _) = ball(&mut world, BodyDef::dynamic().with_position(0.8, 0.0), &def);

    world.step(DT).unwrap();
    assert_eq!(world.contact_count(), 1);

    // Creating the joint removes the existing contact
    let joint = world.create_joint(DistanceJointDef::new(a, b, 0.8)).unwrap();
    assert_eq!(world.contact_count(), 0);
    world.step(DT).unwrap();
    assert_eq!(world.contact_count(), 0);
    assert_eq!(world.body_joints(a).unwrap(), vec![joint]);

    world.destroy_joint(joint).unwrap();
    assert_eq!(world.joint_count(), 0);
    world.step(DT).unwrap();
    assert_eq!(world.contact_count(), 1);

    world
        .create_joint(DistanceJointDef::new(a, b, 0.8).with_collide_connected(true))
        .unwrap();
    world.step(DT).unwrap();
    assert_eq!(world.contact_count(), 1);
}

#[test]
fn test_invalid_joints_are_rejected() {
    let mut world = world(Vec2::ZERO);
    let a = world.create_body(&BodyDef::dynamic()).unwrap();
    let b = world.create_body(&BodyDef::dynamic()).unwrap();

    assert!(matches!(
        world.create_joint(DistanceJointDef::new(a, a, 1.0)),
        Err(PhysicsError::InvalidDefinition(_))
    ));
    assert!(matches!(
        world.create_joint(DistanceJointDef::new(a, b, f32::NAN)),
        Err(PhysicsError::InvalidDefinition(_))
    ));
    world.destroy_body(b).unwrap();
    assert!(matches!(
        world.create_joint(DistanceJointDef::new(a, b, 1.0)),
        Err(PhysicsError::BodyNotFound(_))
    ));
    assert_eq!(world.joint_count(), 0);
}

#[test]
fn test_destroying_body_removes_its_joints() {
    let mut world = world(Vec2::new(0.0, -10.0));
    let anchor = world.create_body(&BodyDef::fixed().with_position(0.0, 5.0)).unwrap();
    let (bob, _) = ball(
        &mut world,
        BodyDef::dynamic().with_position(0.0, 3.0),
        &ShapeDef::default().with_density(1.0),
    );
    let joint = world.create_joint(DistanceJointDef::new(anchor, bob, 2.0)).unwrap();
    run(&mut world, 10);

    world.destroy_body(bob).unwrap();
    assert_eq!(world.joint_count(), 0);
    assert!(matches!(world.joint_type(joint), Err(PhysicsError::JointNotFound(_))));
    assert!(world.body_joints(anchor).unwrap().is_empty());
    run(&mut world, 10);
}
