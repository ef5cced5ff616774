//! Dynamic AABB tree
//!
//! A height-balanced binary tree of fat AABBs used by the broad phase and by
//! world queries. Supports O(log n) insert, remove, and move.
//!
//! - **Fat AABBs**: leaves store bounds enlarged by a margin, so small motions
//!   never touch the tree
//! - **Surface heuristic**: new leaves go where the perimeter grows least
//! - **Rotations**: AVL-style balancing after every structural change

use planar_math::{RayCastInput, Vec2, AABB};

const NULL_NODE: u32 = u32::MAX;

/// Identifier of a leaf in the tree
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ProxyId(u32);

impl ProxyId {
    #[inline]
    pub fn index(self) -> u32 {
        self.0
    }
}

#[derive(Debug, Clone)]
struct TreeNode<T> {
    /// Fat AABB for leaves, union of children otherwise
    aabb: AABB,
    parent: u32,
    child1: u32,
    child2: u32,
    /// Leaf = 0, free = -1
    height: i32,
    /// Set for leaves only
    data: Option<T>,
}

impl<T> TreeNode<T> {
    fn free() -> Self {
        Self {
            aabb: AABB::EMPTY,
            parent: NULL_NODE,
            child1: NULL_NODE,
            child2: NULL_NODE,
            height: -1,
            data: None,
        }
    }

    #[inline]
    fn is_leaf(&self) -> bool {
        self.child1 == NULL_NODE
    }
}

/// Dynamic AABB tree carrying a `Copy` payload per leaf
#[derive(Debug, Clone)]
pub struct DynamicTree<T> {
    /// Node pool
    nodes: Vec<TreeNode<T>>,
    /// Free list (indices of unused nodes)
    free_list: Vec<u32>,
    root: u32,
    proxy_count: usize,
    /// AABB fattening margin
    margin: f32,
}

impl<T: Copy> Default for DynamicTree<T> {
    fn default() -> Self {
        Self::new(crate::config::constants::AABB_MARGIN)
    }
}

impl<T: Copy> DynamicTree<T> {
    /// Create an empty tree that fattens leaves by `margin`
    pub fn new(margin: f32) -> Self {
        Self {
            nodes: Vec::new(),
            free_list: Vec::new(),
            root: NULL_NODE,
            proxy_count: 0,
            margin,
        }
    }

    /// Insert a tight AABB; the tree stores it fattened by the margin
    pub fn create_proxy(&mut self, aabb: AABB, data: T) -> ProxyId {
        let id = self.alloc_node();
        let node = &mut self.nodes[id as usize];
        node.aabb = aabb.expand(self.margin);
        node.height = 0;
        node.data = Some(data);
        self.insert_leaf(id);
        self.proxy_count += 1;
        ProxyId(id)
    }

    /// Remove a leaf. Unknown ids are ignored.
    pub fn destroy_proxy(&mut self, proxy: ProxyId) {
        if !self.is_proxy(proxy) {
            return;
        }
        self.remove_leaf(proxy.0);
        self.free_node(proxy.0);
        self.proxy_count -= 1;
    }

    /// Update a leaf for a new tight AABB.
    ///
    /// Does nothing while the AABB stays inside the stored fat bounds and returns
    /// false; otherwise re-inserts with fresh fat bounds and returns true.
    pub fn move_proxy(&mut self, proxy: ProxyId, aabb: AABB) -> bool {
        if !self.is_proxy(proxy) {
            return false;
        }
        if self.nodes[proxy.0 as usize].aabb.contains_aabb(&aabb) {
            return false;
        }
        self.remove_leaf(proxy.0);
        self.nodes[proxy.0 as usize].aabb = aabb.expand(self.margin);
        self.insert_leaf(proxy.0);
        true
    }

    /// Payload of a leaf
    pub fn data(&self, proxy: ProxyId) -> Option<T> {
        self.nodes.get(proxy.0 as usize).and_then(|n| n.data)
    }

    /// Fat AABB of a leaf
    pub fn fat_aabb(&self, proxy: ProxyId) -> Option<AABB> {
        self.nodes
            .get(proxy.0 as usize)
            .filter(|n| n.height == 0)
            .map(|n| n.aabb)
    }

    /// Number of leaves
    #[inline]
    pub fn proxy_count(&self) -> usize {
        self.proxy_count
    }

    /// Height of the root, zero for an empty tree or a single leaf
    pub fn height(&self) -> i32 {
        if self.root == NULL_NODE {
            0
        } else {
            self.nodes[self.root as usize].height
        }
    }

    /// Visit every leaf whose fat AABB overlaps `aabb`. Return false from the callback to stop.
    pub fn query<F>(&self, aabb: &AABB, mut callback: F)
    where
        F: FnMut(ProxyId, T) -> bool,
    {
        if self.root == NULL_NODE {
            return;
        }

        let mut stack = Vec::with_capacity(64);
        stack.push(self.root);

        while let Some(node_id) = stack.pop() {
            let node = &self.nodes[node_id as usize];
            if !node.aabb.intersects(aabb) {
                continue;
            }

            if node.is_leaf() {
                if let Some(data) = node.data {
                    if !callback(ProxyId(node_id), data) {
                        return;
                    }
                }
            } else {
                stack.push(node.child1);
                stack.push(node.child2);
            }
        }
    }

    /// Walk the leaves a ray may hit.
    ///
    /// The callback receives the input clipped to the current closest fraction and
    /// returns the new limit: `0` stops, a negative value ignores the leaf, a value
    /// in (0, max) clips the ray, and anything larger continues unchanged.
    pub fn ray_cast<F>(&self, input: &RayCastInput, mut callback: F)
    where
        F: FnMut(&RayCastInput, ProxyId, T) -> f32,
    {
        if self.root == NULL_NODE {
            return;
        }

        let p1 = input.p1;
        let d = input.translation();
        let r = d.normalize();
        if r == Vec2::ZERO {
            return;
        }

        // Separating axis for the segment
        let v = r.left_perp();
        let abs_v = v.abs();
        let extension = Vec2::splat(input.radius);

        let mut max_fraction = input.max_fraction;
        let segment_aabb = |fraction: f32| {
            let t = p1.mul_add(fraction, d);
            AABB::new(p1.min(t) - extension, p1.max(t) + extension)
        };
        let mut bounds = segment_aabb(max_fraction);

        let mut stack = Vec::with_capacity(64);
        stack.push(self.root);

        while let Some(node_id) = stack.pop() {
            let node = &self.nodes[node_id as usize];
            if !node.aabb.intersects(&bounds) {
                continue;
            }

            // |dot(v, p1 - c)| > dot(|v|, h) + radius
            let c = node.aabb.center();
            let h = node.aabb.half_extents();
            let separation = v.dot(p1 - c).abs() - abs_v.dot(h) - input.radius;
            if separation > 0.0 {
                continue;
            }

            if node.is_leaf() {
                let Some(data) = node.data else { continue };
                let sub_input = RayCastInput { max_fraction, ..*input };
                let value = callback(&sub_input, ProxyId(node_id), data);
                if value == 0.0 {
                    return;
                }
                if value > 0.0 && value < max_fraction {
                    max_fraction = value;
                    bounds = segment_aabb(max_fraction);
                }
            } else {
                stack.push(node.child1);
                stack.push(node.child2);
            }
        }
    }

    /// Check parent links, heights and bounds of the whole tree
    pub fn validate(&self) -> bool {
        if self.root == NULL_NODE {
            return self.proxy_count == 0;
        }
        if self.nodes[self.root as usize].parent != NULL_NODE {
            return false;
        }
        let mut leaves = 0;
        let ok = self.validate_node(self.root, &mut leaves);
        ok && leaves == self.proxy_count
    }

    fn validate_node(&self, index: u32, leaves: &mut usize) -> bool {
        let node = &self.nodes[index as usize];
        if node.is_leaf() {
            *leaves += 1;
            return node.height == 0 && node.data.is_some();
        }

        let (c1, c2) = (node.child1, node.child2);
        let (n1, n2) = (&self.nodes[c1 as usize], &self.nodes[c2 as usize]);
        if n1.parent != index || n2.parent != index {
            return false;
        }
        if node.height != 1 + n1.height.max(n2.height) {
            return false;
        }
        if !node.aabb.contains_aabb(&n1.aabb) || !node.aabb.contains_aabb(&n2.aabb) {
            return false;
        }
        self.validate_node(c1, leaves) && self.validate_node(c2, leaves)
    }

    // =========== Internal methods ===========

    fn is_proxy(&self, proxy: ProxyId) -> bool {
        self.nodes
            .get(proxy.0 as usize)
            .is_some_and(|n| n.height == 0 && n.data.is_some())
    }

    fn alloc_node(&mut self) -> u32 {
        if let Some(id) = self.free_list.pop() {
            self.nodes[id as usize] = TreeNode::free();
            id
        } else {
            let id = self.nodes.len() as u32;
            self.nodes.push(TreeNode::free());
            id
        }
    }

    fn free_node(&mut self, node_id: u32) {
        self.nodes[node_id as usize] = TreeNode::free();
        self.free_list.push(node_id);
    }

    fn insert_leaf(&mut self, leaf: u32) {
        if self.root == NULL_NODE {
            self.root = leaf;
            self.nodes[leaf as usize].parent = NULL_NODE;
            return;
        }

        // Find the best sibling
        let leaf_aabb = self.nodes[leaf as usize].aabb;
        let mut index = self.root;
        while !self.nodes[index as usize].is_leaf() {
            let node = &self.nodes[index as usize];
            let (child1, child2) = (node.child1, node.child2);

            let area = node.aabb.perimeter();
            let combined_area = node.aabb.union(&leaf_aabb).perimeter();

            // Cost of creating a new parent for this node and the new leaf
            let cost = 2.0 * combined_area;
            // Minimum cost of pushing the leaf further down the tree
            let inheritance_cost = 2.0 * (combined_area - area);

            let cost1 = self.descend_cost(child1, &leaf_aabb) + inheritance_cost;
            let cost2 = self.descend_cost(child2, &leaf_aabb) + inheritance_cost;

            if cost < cost1 && cost < cost2 {
                break;
            }
            index = if cost1 < cost2 { child1 } else { child2 };
        }
        let sibling = index;

        // Create a new parent
        let old_parent = self.nodes[sibling as usize].parent;
        let new_parent = self.alloc_node();
        {
            let sibling_node = &self.nodes[sibling as usize];
            let aabb = leaf_aabb.union(&sibling_node.aabb);
            let height = sibling_node.height + 1;
            let node = &mut self.nodes[new_parent as usize];
            node.parent = old_parent;
            node.aabb = aabb;
            node.height = height;
            node.child1 = sibling;
            node.child2 = leaf;
        }

        if old_parent != NULL_NODE {
            self.replace_child(old_parent, sibling, new_parent);
        } else {
            self.root = new_parent;
        }
        self.nodes[sibling as usize].parent = new_parent;
        self.nodes[leaf as usize].parent = new_parent;

        // Walk back up fixing heights and bounds
        self.fix_upwards(self.nodes[leaf as usize].parent);
    }

    fn descend_cost(&self, child: u32, leaf_aabb: &AABB) -> f32 {
        let node = &self.nodes[child as usize];
        let combined = leaf_aabb.union(&node.aabb).perimeter();
        if node.is_leaf() {
            combined
        } else {
            combined - node.aabb.perimeter()
        }
    }

    fn remove_leaf(&mut self, leaf: u32) {
        if leaf == self.root {
            self.root = NULL_NODE;
            return;
        }

        let parent = self.nodes[leaf as usize].parent;
        let grand_parent = self.nodes[parent as usize].parent;
        let sibling = if self.nodes[parent as usize].child1 == leaf {
            self.nodes[parent as usize].child2
        } else {
            self.nodes[parent as usize].child1
        };

        if grand_parent != NULL_NODE {
            // Destroy the parent and connect the sibling to the grandparent
            self.replace_child(grand_parent, parent, sibling);
            self.nodes[sibling as usize].parent = grand_parent;
            self.free_node(parent);
            self.fix_upwards(grand_parent);
        } else {
            self.root = sibling;
            self.nodes[sibling as usize].parent = NULL_NODE;
            self.free_node(parent);
        }
        self.nodes[leaf as usize].parent = NULL_NODE;
    }

    fn replace_child(&mut self, parent: u32, old: u32, new: u32) {
        let node = &mut self.nodes[parent as usize];
        if node.child1 == old {
            node.child1 = new;
        } else {
            node.child2 = new;
        }
    }

    fn fix_upwards(&mut self, start: u32) {
        let mut index = start;
        while index != NULL_NODE {
            index = self.balance(index);
            self.refit(index);
            index = self.nodes[index as usize].parent;
        }
    }

    fn refit(&mut self, index: u32) {
        let (c1, c2) = (self.nodes[index as usize].child1, self.nodes[index as usize].child2);
        let height = 1 + self.nodes[c1 as usize].height.max(self.nodes[c2 as usize].height);
        let aabb = self.nodes[c1 as usize].aabb.union(&self.nodes[c2 as usize].aabb);
        let node = &mut self.nodes[index as usize];
        node.height = height;
        node.aabb = aabb;
    }

    /// Rotate the taller child up when `a` is out of balance. Returns the new subtree root.
    fn balance(&mut self, a: u32) -> u32 {
        let node = &self.nodes[a as usize];
        if node.is_leaf() || node.height < 2 {
            return a;
        }

        let (b, c) = (node.child1, node.child2);
        let balance = self.nodes[c as usize].height - self.nodes[b as usize].height;

        if balance > 1 {
            self.rotate_up(a, c, false)
        } else if balance < -1 {
            self.rotate_up(a, b, true)
        } else {
            a
        }
    }

    /// Make `up` (a child of `a`) the parent of `a`.
    ///
    /// `up_is_child1` says which side of `a` it came from; `a` keeps its other child
    /// and takes the shorter grandchild, `up` keeps the taller one.
    fn rotate_up(&mut self, a: u32, up: u32, up_is_child1: bool) -> u32 {
        let (g1, g2) = (self.nodes[up as usize].child1, self.nodes[up as usize].child2);
        let a_parent = self.nodes[a as usize].parent;

        // Swap a and up
        self.nodes[up as usize].child1 = a;
        self.nodes[up as usize].parent = a_parent;
        self.nodes[a as usize].parent = up;

        if a_parent != NULL_NODE {
            self.replace_child(a_parent, a, up);
        } else {
            self.root = up;
        }

        let (tall, short) = if self.nodes[g1 as usize].height > self.nodes[g2 as usize].height {
            (g1, g2)
        } else {
            (g2, g1)
        };

        self.nodes[up as usize].child2 = tall;
        if up_is_child1 {
            self.nodes[a as usize].child1 = short;
        } else {
            self.nodes[a as usize].child2 = short;
        }
        self.nodes[short as usize].parent = a;

        self.refit(a);
        self.refit(up);
        up
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn square(x: f32, y: f32, h: f32) -> AABB {
        AABB::from_center_half_extents(Vec2::new(x, y), Vec2::splat(h))
    }

    #[test]
    fn test_insert_query_remove() {
        let mut tree = DynamicTree::new(0.1);
        let a = tree.create_proxy(square(0.0, 0.0, 1.0), 1u32);
        let b = tree.create_proxy(square(5.0, 0.0, 1.0), 2u32);
        let _c = tree.create_proxy(square(0.5, 0.5, 1.0), 3u32);
        assert_eq!(tree.proxy_count(), 3);
        assert!(tree.validate());

        let mut hits = Vec::new();
        tree.query(&square(0.0, 0.0, 0.5), |_, d| {
            hits.push(d);
            true
        });
        hits.sort_unstable();
        assert_eq!(hits, vec![1, 3]);

        tree.destroy_proxy(a);
        tree.destroy_proxy(b);
        assert_eq!(tree.proxy_count(), 1);
        assert!(tree.validate());
        assert_eq!(tree.data(a), None);
    }

    #[test]
    fn test_move_inside_fat_bounds_is_noop() {
        let mut tree = DynamicTree::new(0.5);
        let p = tree.create_proxy(square(0.0, 0.0, 1.0), 7u32);
        let fat = tree.fat_aabb(p).unwrap();
        assert!(!tree.move_proxy(p, square(0.2, 0.0, 1.0)));
        assert_eq!(tree.fat_aabb(p), Some(fat));
        assert!(tree.move_proxy(p, square(3.0, 0.0, 1.0)));
        assert!(tree.fat_aabb(p).unwrap().contains_aabb(&square(3.0, 0.0, 1.0)));
        assert_eq!(tree.data(p), Some(7));
    }

    #[test]
    fn test_balanced_height_for_a_row() {
        let mut tree = DynamicTree::new(0.0);
        for i in 0..256 {
            tree.create_proxy(square(i as f32 * 3.0, 0.0, 1.0), i as u32);
        }
        assert!(tree.validate());
        // Far from the 255 of a degenerate list
        assert!(tree.height() < 20, "height {}", tree.height());

        let mut proxies = Vec::new();
        tree.query(&square(0.0, 0.0, 1000.0), |p, _| {
            proxies.push(p);
            true
        });
        assert_eq!(proxies.len(), 256);
        for p in proxies.iter().step_by(2) {
            tree.destroy_proxy(*p);
        }
        assert!(tree.validate());
        assert_eq!(tree.proxy_count(), 128);
    }

    #[test]
    fn test_ray_cast_clips_to_closest() {
        let mut tree = DynamicTree::new(0.0);
        for i in 0..10 {
            tree.create_proxy(square(i as f32 * 3.0 + 3.0, 0.0, 1.0), i as u32);
        }
        tree.create_proxy(square(0.0, 10.0, 1.0), 100u32);

        let input = RayCastInput::new(Vec2::new(0.0, 0.0), Vec2::new(40.0, 0.0));
        let mut visited = Vec::new();
        tree.ray_cast(&input, |sub, proxy, data| {
            visited.push(data);
            let aabb = tree.fat_aabb(proxy).unwrap();
            match aabb.ray_cast(sub.p1, sub.p2) {
                Some(t) if t <= sub.max_fraction => t,
                _ => -1.0,
            }
        });
        assert!(visited.contains(&0));
        assert!(!visited.contains(&100));
    }

    #[test]
    fn test_query_early_exit() {
        let mut tree = DynamicTree::new(0.0);
        for i in 0..8 {
            tree.create_proxy(square(0.0, 0.0, 1.0 + i as f32), i as u32);
        }
        let mut count = 0;
        tree.query(&square(0.0, 0.0, 1.0), |_, _| {
            count += 1;
            count < 3
        });
        assert_eq!(count, 3);
    }
}
