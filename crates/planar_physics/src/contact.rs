//! Persistent contacts between pairs of shapes
//!
//! A contact is created when the broad phase first reports a filtered pair and
//! lives until the fat bounds separate or either shape goes away. In between it
//! flips between touching and not touching as the manifold fills and empties.

use planar_math::Transform;
use planar_structures::ArenaKey;

use crate::body::BodyKey;
use crate::manifold::{collide, Manifold};
use crate::material::{mix_friction, mix_restitution};
use crate::shape::{Shape, ShapeKey};

pub(crate) type ContactKey = ArenaKey<Contact>;

/// Manifolds whose normal turned further than this (cosine) drop their cached impulses
const NORMAL_PERSIST_COS: f32 = 0.9;

/// Order-independent key for a pair of shape slots
#[inline]
pub(crate) fn pair_key(a: ShapeKey, b: ShapeKey) -> u64 {
    let (lo, hi) = if a.index() < b.index() {
        (a.index(), b.index())
    } else {
        (b.index(), a.index())
    };
    (u64::from(lo) << 32) | u64::from(hi)
}

#[derive(Debug, Clone)]
pub(crate) struct Contact {
    pub shape_a: ShapeKey,
    pub shape_b: ShapeKey,
    pub body_a: BodyKey,
    pub body_b: BodyKey,
    pub manifold: Manifold,
    pub friction: f32,
    pub restitution: f32,
    /// The manifold has points (or, for sensors, the shapes overlap)
    pub touching: bool,
    /// Cleared by the pre-solve callback for the current step
    pub enabled: bool,
    pub sensor: bool,
    /// A shape filter changed; the pair is tested again before the next update
    pub refilter: bool,
}

impl Contact {
    /// Shapes are ordered so that A has the higher shape type, matching the
    /// narrow-phase dispatch.
    pub fn new(key_a: ShapeKey, shape_a: &Shape, key_b: ShapeKey, shape_b: &Shape) -> Self {
        let ((key_a, shape_a), (key_b, shape_b)) = if shape_a.shape_type() >= shape_b.shape_type() {
            ((key_a, shape_a), (key_b, shape_b))
        } else {
            ((key_b, shape_b), (key_a, shape_a))
        };

        Self {
            shape_a: key_a,
            shape_b: key_b,
            body_a: shape_a.body,
            body_b: shape_b.body,
            manifold: Manifold::default(),
            friction: mix_friction(shape_a.friction, shape_b.friction),
            restitution: mix_restitution(shape_a.restitution, shape_b.restitution),
            touching: false,
            enabled: true,
            sensor: shape_a.is_sensor || shape_b.is_sensor,
            refilter: false,
        }
    }

    pub fn involves(&self, shape: ShapeKey) -> bool {
        self.shape_a == shape || self.shape_b == shape
    }

    /// The body on the other side of the contact
    pub fn other_body(&self, body: BodyKey) -> BodyKey {
        if self.body_a == body {
            self.body_b
        } else {
            self.body_a
        }
    }

    /// Recompute the manifold and carry impulses over for matching point ids.
    /// Returns whether the shapes are touching.
    pub fn update(&mut self, shape_a: &Shape, xf_a: &Transform, shape_b: &Shape, xf_b: &Transform) -> bool {
        let old = self.manifold;
        let mut manifold = collide(&shape_a.geometry, xf_a, &shape_b.geometry, xf_b);

        // Material edits take effect on the next update
        self.friction = mix_friction(shape_a.friction, shape_b.friction);
        self.restitution = mix_restitution(shape_a.restitution, shape_b.restitution);
        self.sensor = shape_a.is_sensor || shape_b.is_sensor;

        if self.sensor {
            // Sensors only care about actual overlap and keep no points
            self.touching = manifold.points().iter().any(|mp| mp.separation < 0.0);
            self.manifold = Manifold::default();
            return self.touching;
        }

        let keep_cache = old.point_count > 0 && old.normal.dot(manifold.normal) >= NORMAL_PERSIST_COS;
        for mp in manifold.points_mut() {
            mp.normal_impulse = 0.0;
            mp.tangent_impulse = 0.0;
            mp.max_normal_impulse = 0.0;
            mp.persisted = false;

            if !keep_cache {
                continue;
            }
            if let Some(prev) = old.points().iter().find(|prev| prev.id == mp.id) {
                mp.normal_impulse = prev.normal_impulse;
                mp.tangent_impulse = prev.tangent_impulse;
                mp.persisted = true;
            }
        }

        self.manifold = manifold;
        self.touching = manifold.point_count > 0;
        self.touching
    }
}
