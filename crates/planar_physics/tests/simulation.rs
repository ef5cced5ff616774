//! End-to-end stepping behaviour

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use approx::assert_relative_eq;
use planar_physics::prelude::*;

const DT: f32 = 1.0 / 60.0;

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// World with a wide static ground whose top face is at y = 0
fn world_with_ground(config: WorldConfig) -> (PhysicsWorld, BodyHandle) {
    init_logging();
    let mut world = PhysicsWorld::new(config).unwrap();
    let ground = world.create_body(&BodyDef::fixed().with_position(0.0, -1.0)).unwrap();
    world
        .create_shape(ground, Polygon::make_box(20.0, 1.0), &ShapeDef::default())
        .unwrap();
    (world, ground)
}

fn add_box(world: &mut PhysicsWorld, x: f32, y: f32, half: f32) -> BodyHandle {
    let body = world.create_body(&BodyDef::dynamic().with_position(x, y)).unwrap();
    world
        .create_shape(body, Polygon::make_square(half), &ShapeDef::default().with_density(1.0))
        .unwrap();
    body
}

fn add_ball(world: &mut PhysicsWorld, x: f32, y: f32, radius: f32, def: &ShapeDef) -> BodyHandle {
    let body = world.create_body(&BodyDef::dynamic().with_position(x, y)).unwrap();
    world.create_shape(body, Circle::new(Vec2::ZERO, radius), def).unwrap();
    body
}

fn run(world: &mut PhysicsWorld, steps: usize) {
    for _ in 0..steps {
        world.step(DT).unwrap();
    }
}

#[test]
fn test_free_fall_matches_semi_implicit_euler() {
    init_logging();
    let mut world = PhysicsWorld::new(WorldConfig::default()).unwrap();
    let ball = add_ball(&mut world, 0.0, 10.0, 0.5, &ShapeDef::default().with_density(1.0));

    run(&mut world, 60);

    // v_n = -g n dt, y_n = y_0 - g dt^2 n(n+1)/2
    let velocity = world.body_linear_velocity(ball).unwrap();
    assert_relative_eq!(velocity.y, -10.0, epsilon = 1e-3);
    assert_relative_eq!(velocity.x, 0.0);
    let expected_y = 10.0 - 10.0 * DT * DT * (60.0 * 61.0 / 2.0);
    assert_relative_eq!(world.body_position(ball).unwrap().y, expected_y, epsilon = 1e-2);
}

#[test]
fn test_gravity_scale_zero_floats() {
    init_logging();
    let mut world = PhysicsWorld::new(WorldConfig::default()).unwrap();
    let body = world
        .create_body(&BodyDef::dynamic().with_position(1.0, 2.0).with_gravity_scale(0.0))
        .unwrap();
    world
        .create_shape(body, Circle::new(Vec2::ZERO, 0.25), &ShapeDef::default().with_density(1.0))
        .unwrap();

    run(&mut world, 30);
    assert_eq!(world.body_position(body).unwrap(), Vec2::new(1.0, 2.0));
}

#[test]
fn test_static_body_never_moves() {
    let (mut world, ground) = world_with_ground(WorldConfig::default());
    add_box(&mut world, 0.0, 2.0, 0.5);

    world.set_body_linear_velocity(ground, Vec2::new(5.0, 0.0)).unwrap();
    world.apply_force_to_center(ground, Vec2::new(100.0, 100.0)).unwrap();
    run(&mut world, 120);

    assert_eq!(world.body_position(ground).unwrap(), Vec2::new(0.0, -1.0));
    assert_eq!(world.body_angle(ground).unwrap(), 0.0);
    assert_eq!(world.body_linear_velocity(ground).unwrap(), Vec2::ZERO);
    assert_eq!(world.body_mass(ground).unwrap(), 0.0);
}

#[test]
fn test_box_rests_on_ground() {
    let (mut world, _) = world_with_ground(WorldConfig::default().with_sleeping(false));
    let body = add_box(&mut world, 0.0, 2.0, 0.5);

    run(&mut world, 180);

    let position = world.body_position(body).unwrap();
    assert_relative_eq!(position.x, 0.0, epsilon = 0.01);
    // Resting overlap stays within a few linear slops
    assert!(position.y > 0.5 - 4.0 * constants::LINEAR_SLOP, "sank to {}", position.y);
    assert!(position.y < 0.5 + 0.01, "hovering at {}", position.y);
    assert!(world.body_angle(body).unwrap().abs() < 0.01);
    assert!(world.body_linear_velocity(body).unwrap().length() < 0.05);
    assert_eq!(world.contact_count(), 1);
}

#[test]
fn test_stack_stays_upright() {
    let (mut world, _) = world_with_ground(WorldConfig::default());
    let boxes: Vec<BodyHandle> = (0..5).map(|i| add_box(&mut world, 0.0, 0.5 + i as f32, 0.5)).collect();

    run(&mut world, 240);

    for (i, &body) in boxes.iter().enumerate() {
        let position = world.body_position(body).unwrap();
        assert!(position.x.abs() < 0.05, "box {i} drifted to {}", position.x);
        assert!((position.y - (0.5 + i as f32)).abs() < 0.05, "box {i} at height {}", position.y);
    }
}

#[test]
fn test_slow_impact_does_not_bounce() {
    let config = WorldConfig::default().with_gravity(0.0, 0.0).with_sleeping(false);
    let (mut world, _) = world_with_ground(config);
    let ball = add_ball(&mut world, 0.0, 0.7, 0.5, &ShapeDef::default().with_density(1.0).with_restitution(1.0));
    world.set_body_linear_velocity(ball, Vec2::new(0.0, -0.5)).unwrap();

    run(&mut world, 120);

    let velocity = world.body_linear_velocity(ball).unwrap();
    assert!(velocity.y.abs() < 0.05, "slow ball bounced with {}", velocity.y);
    assert!(world.body_position(ball).unwrap().y > 0.45);
}

#[test]
fn test_fast_impact_bounces() {
    let config = WorldConfig::default().with_gravity(0.0, 0.0).with_sleeping(false);
    let (mut world, _) = world_with_ground(config);
    let ball = add_ball(&mut world, 0.0, 1.0, 0.5, &ShapeDef::default().with_density(1.0).with_restitution(1.0));
    world.set_body_linear_velocity(ball, Vec2::new(0.0, -5.0)).unwrap();

    run(&mut world, 60);

    let velocity = world.body_linear_velocity(ball).unwrap();
    assert!(velocity.y > 3.0, "fast ball rebounded with {}", velocity.y);
}

#[test]
fn test_resting_body_falls_asleep_and_wakes() {
    let (mut world, _) = world_with_ground(WorldConfig::default());
    let body = add_box(&mut world, 0.0, 0.5, 0.5);

    run(&mut world, 120);
    assert!(!world.is_body_awake(body).unwrap());
    assert_eq!(world.awake_body_count(), 0);

    // Sleeping bodies stay put
    let resting = world.body_position(body).unwrap();
    run(&mut world, 10);
    assert_eq!(world.body_position(body).unwrap(), resting);

    world.apply_linear_impulse_to_center(body, Vec2::new(0.0, 2.0)).unwrap();
    assert!(world.is_body_awake(body).unwrap());
    run(&mut world, 1);
    assert!(world.body_position(body).unwrap().y > resting.y);
}

#[test]
fn test_disabling_sleep_wakes_everything() {
    let (mut world, _) = world_with_ground(WorldConfig::default());
    let a = add_box(&mut world, -2.0, 0.5, 0.5);
    let b = add_box(&mut world, 2.0, 0.5, 0.5);
    run(&mut world, 120);
    assert_eq!(world.awake_body_count(), 0);

    world.enable_sleeping(false);
    assert!(!world.is_sleeping_enabled());
    assert!(world.is_body_awake(a).unwrap());
    assert!(world.is_body_awake(b).unwrap());

    run(&mut world, 120);
    assert_eq!(world.awake_body_count(), 2);
}

#[test]
fn test_body_with_sleep_disabled_stays_awake() {
    let (mut world, _) = world_with_ground(WorldConfig::default());
    let body = world
        .create_body(&BodyDef::dynamic().with_position(0.0, 0.5).with_sleep(false))
        .unwrap();
    world
        .create_shape(body, Polygon::make_square(0.5), &ShapeDef::default().with_density(1.0))
        .unwrap();

    run(&mut world, 120);
    assert!(world.is_body_awake(body).unwrap());
}

#[test]
fn test_kinematic_body_moves_at_its_velocity() {
    init_logging();
    let mut world = PhysicsWorld::new(WorldConfig::default()).unwrap();
    let platform = world
        .create_body(&BodyDef::kinematic().with_position(0.0, 0.0).with_linear_velocity(2.0, 0.0))
        .unwrap();
    world
        .create_shape(platform, Polygon::make_box(1.0, 0.1), &ShapeDef::default())
        .unwrap();

    run(&mut world, 60);

    let position = world.body_position(platform).unwrap();
    assert_relative_eq!(position.x, 2.0, epsilon = 1e-3);
    assert_relative_eq!(position.y, 0.0);
    assert_eq!(world.body_mass(platform).unwrap(), 0.0);
}

#[test]
fn test_moving_platform_wakes_and_carries_sleeping_box() {
    init_logging();
    let mut world = PhysicsWorld::new(WorldConfig::default()).unwrap();
    let platform = world.create_body(&BodyDef::kinematic()).unwrap();
    world
        .create_shape(platform, Polygon::make_box(2.0, 0.5), &ShapeDef::default())
        .unwrap();
    let cargo = add_box(&mut world, 0.0, 1.0, 0.5);

    run(&mut world, 120);
    assert!(!world.is_body_awake(cargo).unwrap());
    assert!(!world.is_body_awake(platform).unwrap());
    assert_eq!(world.awake_body_count(), 0);

    // A still platform leaves the island asleep
    let resting = world.body_position(cargo).unwrap();
    run(&mut world, 30);
    assert!(!world.is_body_awake(cargo).unwrap());
    assert_eq!(world.body_position(cargo).unwrap(), resting);

    world.set_body_linear_velocity(platform, Vec2::new(0.0, 1.0)).unwrap();
    run(&mut world, 60);

    let platform_y = world.body_position(platform).unwrap().y;
    let cargo_y = world.body_position(cargo).unwrap().y;
    assert_relative_eq!(platform_y, 1.0, epsilon = 1e-3);
    assert!(world.is_body_awake(cargo).unwrap());
    assert!(cargo_y > platform_y + 0.9, "platform at {platform_y}, cargo at {cargo_y}");
}

#[test]
fn test_stopped_kinematic_body_falls_asleep() {
    init_logging();
    let mut world = PhysicsWorld::new(WorldConfig::default()).unwrap();
    let platform = world
        .create_body(&BodyDef::kinematic().with_linear_velocity(1.0, 0.0))
        .unwrap();
    world
        .create_shape(platform, Polygon::make_box(1.0, 0.1), &ShapeDef::default())
        .unwrap();

    run(&mut world, 60);
    assert!(world.is_body_awake(platform).unwrap());
    assert_eq!(world.statistics().awake_body_count, 1);

    world.set_body_linear_velocity(platform, Vec2::ZERO).unwrap();
    run(&mut world, 20);
    assert!(world.is_body_awake(platform).unwrap());
    run(&mut world, 20);
    assert!(!world.is_body_awake(platform).unwrap());
    assert_eq!(world.statistics().awake_body_count, 0);

    // Sleeping is off: still kinematic bodies stay awake
    world.enable_sleeping(false);
    world.set_body_awake(platform, true).unwrap();
    run(&mut world, 60);
    assert!(world.is_body_awake(platform).unwrap());
}

#[test]
fn test_disabled_body_is_left_out() {
    let (mut world, _) = world_with_ground(WorldConfig::default());
    let body = add_box(&mut world, 0.0, 3.0, 0.5);
    world.set_body_enabled(body, false).unwrap();

    run(&mut world, 30);
    assert_eq!(world.body_position(body).unwrap(), Vec2::new(0.0, 3.0));
    let around = AABB::from_center_half_extents(Vec2::new(0.0, 3.0), Vec2::ONE);
    assert!(world.query().overlap_aabb(&around, QueryFilter::default()).is_empty());

    world.set_body_enabled(body, true).unwrap();
    run(&mut world, 30);
    assert!(world.body_position(body).unwrap().y < 3.0);
}

#[test]
fn test_set_transform_teleports() {
    let (mut world, _) = world_with_ground(WorldConfig::default());
    let body = add_box(&mut world, 0.0, 0.5, 0.5);
    run(&mut world, 10);

    world.set_body_transform(body, Vec2::new(5.0, 8.0), 0.5).unwrap();
    assert_eq!(world.body_position(body).unwrap(), Vec2::new(5.0, 8.0));
    assert_relative_eq!(world.body_angle(body).unwrap(), 0.5, epsilon = 1e-6);

    let aabb = world.shape_aabb(world.body_shapes(body).unwrap()[0]).unwrap();
    assert!(aabb.contains_aabb(&AABB::from_center_half_extents(Vec2::new(5.0, 8.0), Vec2::new(0.1, 0.1))));
}

#[test]
fn test_destroy_body_removes_everything() {
    let (mut world, _) = world_with_ground(WorldConfig::default());
    let body = add_box(&mut world, 0.0, 0.5, 0.5);
    run(&mut world, 2);
    assert_eq!(world.contact_count(), 1);

    world.destroy_body(body).unwrap();
    assert_eq!(world.body_count(), 1);
    assert_eq!(world.shape_count(), 1);
    assert_eq!(world.contact_count(), 0);
    assert!(matches!(world.body_position(body), Err(PhysicsError::BodyNotFound(_))));

    // The slot is reused, the stale handle still fails
    let replacement = add_box(&mut world, 0.0, 3.0, 0.5);
    assert_eq!(replacement.index(), body.index());
    assert!(world.body_position(body).is_err());
    assert!(world.body_position(replacement).is_ok());
}

#[test]
fn test_body_capacity() {
    init_logging();
    let config = WorldConfig::default().with_capacities(2, 8, 64, 2);
    let mut world = PhysicsWorld::new(config).unwrap();
    world.create_body(&BodyDef::dynamic()).unwrap();
    world.create_body(&BodyDef::dynamic()).unwrap();

    let err = world.create_body(&BodyDef::dynamic()).unwrap_err();
    assert!(matches!(err, PhysicsError::CapacityExceeded { kind: EntityKind::Body, capacity: 2 }));
    assert_eq!(world.body_count(), 2);
}

#[test]
fn test_contact_capacity_leaves_world_unchanged() {
    init_logging();
    let config = WorldConfig::default().with_gravity(0.0, 0.0).with_capacities(8, 8, 1, 2);
    let mut world = PhysicsWorld::new(config).unwrap();
    let def = ShapeDef::default().with_density(1.0);
    add_ball(&mut world, 0.0, 0.0, 0.5, &def);
    add_ball(&mut world, 0.3, 0.0, 0.5, &def);
    add_ball(&mut world, 0.0, 0.3, 0.5, &def);

    let err = world.step(DT).unwrap_err();
    assert!(matches!(err, PhysicsError::CapacityExceeded { kind: EntityKind::Contact, capacity: 1 }));
    assert_eq!(world.contact_count(), 0);
}

#[test]
fn test_small_scratch_budget_reports_error() {
    let config = WorldConfig::default().with_scratch_capacity(64);
    let (mut world, _) = world_with_ground(config);
    for i in 0..4 {
        add_box(&mut world, i as f32 * 2.0, 0.5, 0.5);
    }

    assert!(matches!(world.step(DT), Err(PhysicsError::ScratchExhausted(_))));
}

#[test]
fn test_invalid_definitions_are_rejected() {
    init_logging();
    let mut world = PhysicsWorld::new(WorldConfig::default()).unwrap();
    let body = world.create_body(&BodyDef::dynamic()).unwrap();

    assert!(matches!(
        world.create_shape(body, Circle::new(Vec2::ZERO, -1.0), &ShapeDef::default()),
        Err(PhysicsError::InvalidDefinition(_))
    ));
    assert!(matches!(
        world.create_shape(body, Circle::new(Vec2::ZERO, 1.0), &ShapeDef::default().with_friction(-1.0)),
        Err(PhysicsError::InvalidDefinition(_))
    ));
    assert!(matches!(
        world.create_shape(body, Segment::new(Vec2::ZERO, Vec2::X), &ShapeDef::default()),
        Err(PhysicsError::UnsupportedShapePair(ShapeType::Segment, ShapeType::Segment))
    ));
    assert_eq!(world.shape_count(), 0);

    assert!(matches!(
        PhysicsWorld::new(WorldConfig::default().with_timestep(0.0)),
        Err(PhysicsError::InvalidConfig(_))
    ));
}

#[test]
fn test_non_positive_step_is_a_no_op() {
    let (mut world, _) = world_with_ground(WorldConfig::default());
    let body = add_box(&mut world, 0.0, 3.0, 0.5);

    world.step(0.0).unwrap();
    world.step(-1.0).unwrap();
    world.step(f32::NAN).unwrap();
    assert_eq!(world.step_count(), 0);
    assert_eq!(world.body_position(body).unwrap(), Vec2::new(0.0, 3.0));
}

#[test]
fn test_update_runs_fixed_steps() {
    init_logging();
    let mut world = PhysicsWorld::new(WorldConfig::default()).unwrap();
    let timestep = world.config().timestep;

    assert_eq!(world.update(0.5 * timestep).unwrap(), 0);
    assert_relative_eq!(world.interpolation_alpha(), 0.5, epsilon = 1e-4);

    assert_eq!(world.update(2.0 * timestep).unwrap(), 2);
    assert_eq!(world.step_count(), 2);
    assert!(world.interpolation_alpha() < 1.0);
}

#[test]
fn test_update_caps_substeps() {
    init_logging();
    let mut world = PhysicsWorld::new(WorldConfig::default()).unwrap();
    let max = world.config().max_substeps;

    assert_eq!(world.update(10.0).unwrap(), max);
    assert_eq!(world.step_count(), max as u64);
    // The backlog beyond the cap is dropped
    assert!(world.interpolation_alpha() < 1.0);
    assert_eq!(world.update(0.0).unwrap(), 0);
}

#[test]
fn test_statistics_track_world() {
    let (mut world, _) = world_with_ground(WorldConfig::default());
    add_box(&mut world, 0.0, 0.5, 0.5);
    add_box(&mut world, 3.0, 0.5, 0.5);
    run(&mut world, 1);

    let stats = world.statistics();
    assert_eq!(stats.body_count, 3);
    assert_eq!(stats.shape_count, 3);
    assert_eq!(stats.proxy_count, 3);
    assert_eq!(stats.contact_count, 2);
    assert_eq!(stats.touching_contact_count, 2);
    assert_eq!(stats.island_count, 2);
    assert_eq!(stats.awake_body_count, 2);
    assert_eq!(stats.scratch_used, 0);
    assert!(stats.scratch_max_used > 0);
    assert!(stats.tree_height >= 1);
    assert!(world.profile().step >= 0.0);
}

#[test]
fn test_config_serde_round_trip() {
    let config = WorldConfig::high_precision().with_gravity(0.0, -9.81).with_sleeping(false);
    let json = serde_json::to_string(&config).unwrap();
    let back: WorldConfig = serde_json::from_str(&json).unwrap();
    assert_eq!(back.gravity, config.gravity);
    assert_eq!(back.velocity_iterations, 16);
    assert!(!back.sleeping_enabled);

    // Missing fields fall back to defaults
    let partial: WorldConfig = serde_json::from_str(r#"{ "max_substeps": 3 }"#).unwrap();
    assert_eq!(partial.max_substeps, 3);
    assert_eq!(partial.body_capacity, WorldConfig::default().body_capacity);
}

/// Splits every task over scoped threads, one range per worker
struct ThreadedTasks {
    workers: usize,
    enqueued: AtomicU64,
}

impl TaskSystem for ThreadedTasks {
    fn worker_count(&self) -> usize {
        self.workers
    }

    fn enqueue(&self, task: &dyn TaskCallback, item_count: usize, min_range: usize) -> Option<TaskHandle> {
        let chunk = item_count.div_ceil(self.workers).max(min_range).max(1);
        std::thread::scope(|s| {
            for (worker, start) in (0..item_count).step_by(chunk).enumerate() {
                let end = (start + chunk).min(item_count);
                s.spawn(move || task.execute(start, end, worker));
            }
        });
        Some(TaskHandle(self.enqueued.fetch_add(1, Ordering::Relaxed)))
    }

    fn finish(&self, _handle: TaskHandle) {}
}

fn build_pile(world: &mut PhysicsWorld) -> Vec<BodyHandle> {
    let ground = world.create_body(&BodyDef::fixed()).unwrap();
    world
        .create_shape(ground, Segment::new(Vec2::new(-20.0, 0.0), Vec2::new(20.0, 0.0)), &ShapeDef::default())
        .unwrap();

    let mut bodies = Vec::new();
    for row in 0..8 {
        for col in 0..8 {
            let x = col as f32 * 1.1 - 4.0 + (row % 2) as f32 * 0.3;
            let y = 1.0 + row as f32 * 1.2;
            let body = world.create_body(&BodyDef::dynamic().with_position(x, y).with_angle(0.1 * col as f32)).unwrap();
            let def = ShapeDef::default().with_density(1.0).with_friction(0.4);
            if (row + col) % 3 == 0 {
                world.create_shape(body, Circle::new(Vec2::ZERO, 0.45), &def).unwrap();
            } else if (row + col) % 3 == 1 {
                world.create_shape(body, Capsule::new(Vec2::new(-0.3, 0.0), Vec2::new(0.3, 0.0), 0.2), &def).unwrap();
            } else {
                world.create_shape(body, Polygon::make_box(0.45, 0.3), &def).unwrap();
            }
            bodies.push(body);
        }
    }
    bodies
}

fn snapshot(world: &PhysicsWorld, bodies: &[BodyHandle]) -> Vec<(u32, u32, u32)> {
    bodies
        .iter()
        .map(|&b| {
            let p = world.body_position(b).unwrap();
            let angle = world.body_angle(b).unwrap();
            (p.x.to_bits(), p.y.to_bits(), angle.to_bits())
        })
        .collect()
}

#[test]
fn test_repeated_runs_are_bit_identical() {
    init_logging();
    let mut first = PhysicsWorld::new(WorldConfig::default()).unwrap();
    let mut second = PhysicsWorld::new(WorldConfig::default()).unwrap();
    let bodies_first = build_pile(&mut first);
    let bodies_second = build_pile(&mut second);

    run(&mut first, 120);
    run(&mut second, 120);
    assert_eq!(snapshot(&first, &bodies_first), snapshot(&second, &bodies_second));
}

#[test]
fn test_threaded_host_matches_serial() {
    init_logging();
    let mut serial = PhysicsWorld::new(WorldConfig::default()).unwrap();
    let tasks = Arc::new(ThreadedTasks { workers: 4, enqueued: AtomicU64::new(0) });
    let mut threaded = PhysicsWorld::with_task_system(WorldConfig::default(), tasks.clone()).unwrap();
    let bodies_serial = build_pile(&mut serial);
    let bodies_threaded = build_pile(&mut threaded);

    for _ in 0..120 {
        serial.step(DT).unwrap();
        threaded.step(DT).unwrap();
        assert_eq!(serial.collision_events().len(), threaded.collision_events().len());
    }

    assert_eq!(snapshot(&serial, &bodies_serial), snapshot(&threaded, &bodies_threaded));
    assert!(threaded.tasks_enqueued() > 0);
    assert_eq!(tasks.enqueued.load(Ordering::Relaxed) as usize, threaded.tasks_enqueued());
    assert_eq!(serial.tasks_enqueued(), threaded.tasks_enqueued());
}

#[cfg(feature = "parallel")]
#[test]
fn test_rayon_host_matches_serial() {
    init_logging();
    let mut serial = PhysicsWorld::new(WorldConfig::default()).unwrap();
    let pool = Arc::new(RayonTaskSystem::new(3).unwrap());
    let mut parallel = PhysicsWorld::with_task_system(WorldConfig::default(), pool).unwrap();
    let bodies_serial = build_pile(&mut serial);
    let bodies_parallel = build_pile(&mut parallel);

    run(&mut serial, 90);
    run(&mut parallel, 90);
    assert_eq!(snapshot(&serial, &bodies_serial), snapshot(&parallel, &bodies_parallel));
}
