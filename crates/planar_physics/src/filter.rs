//! Collision filtering by category, mask and group

use serde::{Deserialize, Serialize};

/// A collision category identifier, one bit of a `Filter`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CollisionLayer(pub u32);

impl CollisionLayer {
    /// Default layer, bit 0
    pub const DEFAULT: Self = Self(0);

    /// Layer on bit `id`, which must be below 32
    pub const fn custom(id: u32) -> Self {
        Self(id)
    }

    /// Get the layer as a bitmask
    pub const fn as_mask(&self) -> u32 {
        1 << self.0
    }
}

impl Default for CollisionLayer {
    fn default() -> Self {
        Self::DEFAULT
    }
}

/// Per-shape collision filter.
///
/// Two shapes collide when each one's category is in the other's mask. A shared
/// non-zero group index overrides that test: positive always collides, negative never.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Filter {
    /// The categories this shape belongs to
    pub category_bits: u32,
    /// The categories this shape accepts collisions with
    pub mask_bits: u32,
    /// Shapes sharing a non-zero group always (positive) or never (negative) collide
    pub group_index: i32,
}

impl Default for Filter {
    fn default() -> Self {
        Self::DEFAULT
    }
}

impl Filter {
    /// Category 1, collides with everything, no group
    pub const DEFAULT: Self = Self {
        category_bits: 0x0000_0001,
        mask_bits: 0xFFFF_FFFF,
        group_index: 0,
    };

    pub fn new(category_bits: u32, mask_bits: u32) -> Self {
        Self {
            category_bits,
            mask_bits,
            group_index: 0,
        }
    }

    /// Build from a single layer that collides with specific layers
    pub fn from_layer(layer: CollisionLayer, collides_with: &[CollisionLayer]) -> Self {
        let mask_bits = collides_with.iter().fold(0u32, |acc, l| acc | l.as_mask());
        Self::new(layer.as_mask(), mask_bits)
    }

    pub fn with_group(mut self, group_index: i32) -> Self {
        self.group_index = group_index;
        self
    }

    /// Decide whether two filters allow a contact
    #[inline]
    pub fn should_collide(&self, other: &Filter) -> bool {
        if self.group_index == other.group_index && self.group_index != 0 {
            return self.group_index > 0;
        }
        (self.mask_bits & other.category_bits) != 0 && (self.category_bits & other.mask_bits) != 0
    }
}

/// Filter applied to world queries such as ray casts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryFilter {
    /// The categories the query belongs to
    pub category_bits: u32,
    /// The shape categories the query accepts
    pub mask_bits: u32,
}

impl Default for QueryFilter {
    fn default() -> Self {
        Self {
            category_bits: 0x0000_0001,
            mask_bits: 0xFFFF_FFFF,
        }
    }
}

impl QueryFilter {
    #[inline]
    pub fn accepts(&self, filter: &Filter) -> bool {
        (self.mask_bits & filter.category_bits) != 0 && (self.category_bits & filter.mask_bits) != 0
    }
}
