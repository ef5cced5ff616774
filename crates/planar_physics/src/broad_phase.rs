//! Broad phase
//!
//! Wraps the dynamic tree with a move buffer. Proxies that were created or whose
//! fat bounds had to grow since the last step are queried against the tree to
//! find new candidate pairs; everything else is already covered by an existing
//! contact or still too far apart.

use planar_math::{RayCastInput, AABB};
use planar_structures::BitSet;

use crate::dynamic_tree::{DynamicTree, ProxyId};
use crate::shape::ShapeKey;

#[derive(Debug, Default)]
pub(crate) struct BroadPhase {
    tree: DynamicTree<ShapeKey>,
    move_buffer: Vec<ProxyId>,
    /// Proxy indices currently in the move buffer
    moved: BitSet,
}

impl BroadPhase {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a shape's tight bounds. The new proxy looks for pairs on the next step.
    pub fn create_proxy(&mut self, aabb: AABB, shape: ShapeKey) -> ProxyId {
        let proxy = self.tree.create_proxy(aabb, shape);
        self.buffer_move(proxy);
        proxy
    }

    pub fn destroy_proxy(&mut self, proxy: ProxyId) {
        self.unbuffer_move(proxy);
        self.tree.destroy_proxy(proxy);
    }

    /// Returns true when the fat bounds had to be rebuilt
    pub fn move_proxy(&mut self, proxy: ProxyId, aabb: AABB) -> bool {
        if self.tree.move_proxy(proxy, aabb) {
            self.buffer_move(proxy);
            true
        } else {
            false
        }
    }

    /// Force a pair search for this proxy on the next step
    pub fn touch_proxy(&mut self, proxy: ProxyId) {
        self.buffer_move(proxy);
    }

    pub fn fat_aabb(&self, proxy: ProxyId) -> Option<AABB> {
        self.tree.fat_aabb(proxy)
    }

    pub fn move_count(&self) -> usize {
        self.move_buffer.len()
    }

    pub fn proxy_count(&self) -> usize {
        self.tree.proxy_count()
    }

    pub fn tree_height(&self) -> i32 {
        self.tree.height()
    }

    /// Whether the fat bounds of two proxies overlap
    pub fn test_overlap(&self, a: ProxyId, b: ProxyId) -> bool {
        match (self.tree.fat_aabb(a), self.tree.fat_aabb(b)) {
            (Some(a), Some(b)) => a.intersects(&b),
            _ => false,
        }
    }

    /// Report candidate partners for the moved proxy at `move_index`.
    ///
    /// A pair of two moved proxies is only reported from the lower proxy index, so
    /// running this over every move index yields each pair once.
    pub fn query_move<F>(&self, move_index: usize, mut callback: F)
    where
        F: FnMut(ShapeKey, ShapeKey),
    {
        let Some(&proxy) = self.move_buffer.get(move_index) else { return };
        let (Some(fat), Some(query_shape)) = (self.tree.fat_aabb(proxy), self.tree.data(proxy)) else {
            return;
        };

        self.tree.query(&fat, |other, shape| {
            if other == proxy {
                return true;
            }
            if other.index() < proxy.index() && self.moved.get(other.index() as usize) {
                return true;
            }
            callback(query_shape, shape);
            true
        });
    }

    pub fn clear_moves(&mut self) {
        for proxy in self.move_buffer.drain(..) {
            self.moved.clear(proxy.index() as usize);
        }
    }

    /// Visit shapes whose fat bounds overlap `aabb`
    pub fn query<F>(&self, aabb: &AABB, mut callback: F)
    where
        F: FnMut(ShapeKey) -> bool,
    {
        self.tree.query(aabb, |_, shape| callback(shape));
    }

    pub fn ray_cast<F>(&self, input: &RayCastInput, mut callback: F)
    where
        F: FnMut(&RayCastInput, ShapeKey) -> f32,
    {
        self.tree.ray_cast(input, |sub_input, _, shape| callback(sub_input, shape));
    }

    fn buffer_move(&mut self, proxy: ProxyId) {
        let index = proxy.index() as usize;
        if !self.moved.get(index) {
            self.moved.set_grow(index);
            self.move_buffer.push(proxy);
        }
    }

    fn unbuffer_move(&mut self, proxy: ProxyId) {
        let index = proxy.index() as usize;
        if self.moved.get(index) {
            self.moved.clear(index);
            self.move_buffer.retain(|&p| p != proxy);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use planar_math::Vec2;

    fn boxed(x: f32, y: f32) -> AABB {
        AABB::from_center_half_extents(Vec2::new(x, y), Vec2::splat(0.5))
    }

    fn pairs(bp: &BroadPhase) -> Vec<(u32, u32)> {
        let mut out = Vec::new();
        for i in 0..bp.move_count() {
            bp.query_move(i, |a, b| {
                let (lo, hi) = if a.index() < b.index() { (a, b) } else { (b, a) };
                out.push((lo.index(), hi.index()));
            });
        }
        out.sort_unstable();
        out
    }

    #[test]
    fn test_new_proxies_report_each_pair_once() {
        let mut bp = BroadPhase::new();
        bp.create_proxy(boxed(0.0, 0.0), ShapeKey::new(0, 0));
        bp.create_proxy(boxed(0.8, 0.0), ShapeKey::new(1, 0));
        bp.create_proxy(boxed(10.0, 0.0), ShapeKey::new(2, 0));

        assert_eq!(bp.move_count(), 3);
        assert_eq!(pairs(&bp), vec![(0, 1)]);

        bp.clear_moves();
        assert_eq!(bp.move_count(), 0);
        assert!(pairs(&bp).is_empty());
    }

    #[test]
    fn test_small_moves_stay_in_fat_bounds() {
        let mut bp = BroadPhase::new();
        let p = bp.create_proxy(boxed(0.0, 0.0), ShapeKey::new(0, 0));
        bp.clear_moves();

        assert!(!bp.move_proxy(p, boxed(0.05, 0.0)));
        assert_eq!(bp.move_count(), 0);

        assert!(bp.move_proxy(p, boxed(2.0, 0.0)));
        assert_eq!(bp.move_count(), 1);
        let fat = bp.fat_aabb(p).unwrap();
        assert!(fat.contains_aabb(&boxed(2.0, 0.0)));
    }

    #[test]
    fn test_moved_against_resting_proxy() {
        let mut bp = BroadPhase::new();
        let a = bp.create_proxy(boxed(0.0, 0.0), ShapeKey::new(0, 0));
        let b = bp.create_proxy(boxed(3.0, 0.0), ShapeKey::new(1, 0));
        bp.clear_moves();
        assert!(!bp.test_overlap(a, b));

        bp.move_proxy(b, boxed(0.9, 0.0));
        assert!(bp.test_overlap(a, b));
        assert_eq!(pairs(&bp), vec![(0, 1)]);
    }

    #[test]
    fn test_destroyed_proxy_leaves_move_buffer() {
        let mut bp = BroadPhase::new();
        let a = bp.create_proxy(boxed(0.0, 0.0), ShapeKey::new(0, 0));
        bp.create_proxy(boxed(0.5, 0.0), ShapeKey::new(1, 0));
        bp.destroy_proxy(a);
        assert_eq!(bp.move_count(), 1);
        assert_eq!(bp.proxy_count(), 1);
        assert!(pairs(&bp).is_empty());
    }

    #[test]
    fn test_ray_cast_visits_shapes_on_path() {
        let mut bp = BroadPhase::new();
        bp.create_proxy(boxed(5.0, 0.0), ShapeKey::new(0, 0));
        bp.create_proxy(boxed(5.0, 5.0), ShapeKey::new(1, 0));

        let mut hits = Vec::new();
        let input = RayCastInput::new(Vec2::ZERO, Vec2::new(10.0, 0.0));
        bp.ray_cast(&input, |sub, shape| {
            hits.push(shape.index());
            sub.max_fraction
        });
        assert_eq!(hits, vec![0]);
    }
}
