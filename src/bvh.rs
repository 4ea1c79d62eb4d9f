// Copyright 2017 Matthew Plant. This file is part of Kinetic.
//
// Kinetic is free software: you can redistribute it and/or modify
// it under the terms of the GNU Lesser General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// Kinetic is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU Lesser General Public License for more details.
//
// You should have received a copy of the GNU Lesser General Public License
// along with Kinetic. If not, see <http://www.gnu.org/licenses/>.

use std::cmp;

use cgmath::{Point3, Vector3};
use smallvec::SmallVec;
use thiserror::Error;

use crate::bounds::{Aabb, Overlaps};
use crate::pool::Pool;

/// Caller misuse of a tree handle. The tree is left untouched whenever one of
/// these is returned.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Error)]
pub enum BroadphaseError {
    #[error("handle {0} does not refer to a live node")]
    UnknownHandle(usize),
    #[error("handle {0} refers to an internal node, not a leaf")]
    NotALeaf(usize),
}

/// A dynamic bounding volume hierarchy over axis aligned boxes.
///
/// Leaves store the exact box they were given, with no fattening, so queries
/// have no false positives. Nodes live in a `Pool`; the integer returned by
/// `insert` stays valid until the leaf is removed, including across
/// `set_leaf_box`. The tree is kept height balanced: sibling subtree heights
/// never differ by more than one after a mutation.
#[derive(Clone, Debug)]
pub struct DynamicTree<V> {
    root: Option<usize>,
    num_leaves: usize,
    pool: Pool<TreeNode<V>>,
}

#[derive(Clone, Debug)]
struct TreeNode<V> {
    height: i32,
    parent: Option<usize>,
    bounds: Aabb,
    node_type: TreeNodeType<V>,
}

#[derive(Clone, Debug)]
enum TreeNodeType<V> {
    Leaf(V),
    Parent(usize, usize),
}

impl<V> Default for DynamicTree<V> {
    fn default() -> Self {
        DynamicTree::new()
    }
}

impl<V> DynamicTree<V> {
    pub fn new() -> Self {
        DynamicTree {
            root: None,
            num_leaves: 0,
            pool: Pool::new(),
        }
    }

    pub fn with_capacity(cap: usize) -> Self {
        DynamicTree {
            root: None,
            num_leaves: 0,
            // A tree with n leaves has n - 1 internal nodes.
            pool: Pool::with_capacity(cap * 2),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.num_leaves == 0
    }

    /// Returns the number of leaves in the tree.
    pub fn len(&self) -> usize {
        self.num_leaves
    }

    /// Height of the root node; zero for an empty tree or a single leaf.
    pub fn height(&self) -> i32 {
        self.root.map_or(0, |r| self.pool[r].height)
    }

    /// Returns the handle of the root node.
    pub fn root(&self) -> Option<usize> {
        self.root
    }

    /// Inserts an item into the tree, rebalancing if necessary. All handles
    /// returned prior to insert remain valid afterward.
    pub fn insert(&mut self, bounds: Aabb, val: V) -> usize {
        let leaf = self.pool.push(TreeNode {
            height: 0,
            parent: None,
            bounds,
            node_type: TreeNodeType::Leaf(val),
        });
        self.num_leaves += 1;
        self.attach_leaf(leaf);
        leaf
    }

    /// Removes a leaf from the tree and returns its item.
    pub fn remove(&mut self, leaf: usize) -> Result<V, BroadphaseError> {
        self.check_leaf(leaf)?;
        self.detach_leaf(leaf);
        self.num_leaves -= 1;
        match self.pool.remove(leaf) {
            Some(TreeNode { node_type: TreeNodeType::Leaf(val), .. }) => Ok(val),
            _ => Err(BroadphaseError::UnknownHandle(leaf)),
        }
    }

    /// Replaces the box stored at a leaf. The result is indistinguishable from
    /// removing and reinserting the item, except that the handle is kept.
    pub fn set_leaf_box(&mut self, leaf: usize, bounds: Aabb) -> Result<(), BroadphaseError> {
        self.check_leaf(leaf)?;
        if self.pool[leaf].bounds == bounds {
            return Ok(());
        }
        self.detach_leaf(leaf);
        self.pool[leaf].bounds = bounds;
        self.attach_leaf(leaf);
        Ok(())
    }

    /// Returns the box and item stored at a leaf.
    pub fn get_leaf(&self, leaf: usize) -> Result<(&Aabb, &V), BroadphaseError> {
        match self.pool.get(leaf) {
            Some(TreeNode { bounds, node_type: TreeNodeType::Leaf(val), .. }) => Ok((bounds, val)),
            Some(_) => Err(BroadphaseError::NotALeaf(leaf)),
            None => Err(BroadphaseError::UnknownHandle(leaf)),
        }
    }

    /// Calls the closure with the handle and item of every leaf whose box
    /// overlaps `bounds`. Returns true if any leaf was found.
    pub fn query<F: FnMut(usize, &V)>(&self, bounds: &Aabb, mut callback: F) -> bool {
        let root = match self.root {
            Some(root) => root,
            None => return false,
        };
        let mut stack = SmallVec::<[usize; 64]>::new();
        stack.push(root);
        let mut found = false;
        while let Some(top) = stack.pop() {
            let node = &self.pool[top];
            if !node.bounds.overlaps(bounds) {
                continue;
            }
            match node.node_type {
                TreeNodeType::Leaf(ref val) => {
                    found = true;
                    callback(top, val);
                },
                TreeNodeType::Parent(lchild, rchild) => {
                    stack.push(lchild);
                    stack.push(rchild);
                },
            }
        }
        found
    }

    /// Appends the handle of every leaf whose box overlaps `bounds` to `out`.
    pub fn query_leaves(&self, bounds: &Aabb, out: &mut Vec<usize>) {
        self.query(bounds, |leaf, _| out.push(leaf));
    }

    /// Visits every leaf whose box is touched by the segment
    /// `origin + t * dir, t in [0, max_distance]`. The visitor returns false
    /// to stop the traversal immediately. Visit order depends only on the
    /// current shape of the tree.
    pub fn ray_cast<F>(&self, origin: Point3<f32>, dir: Vector3<f32>, max_distance: f32, mut visit: F)
    where
        F: FnMut(&V, &Aabb) -> bool
    {
        let root = match self.root {
            Some(root) => root,
            None => return,
        };
        let mut stack = SmallVec::<[usize; 64]>::new();
        stack.push(root);
        while let Some(top) = stack.pop() {
            let node = &self.pool[top];
            if !node.bounds.intersects_segment(origin, dir, max_distance) {
                continue;
            }
            match node.node_type {
                TreeNodeType::Leaf(ref val) => {
                    if !visit(val, &node.bounds) {
                        return;
                    }
                },
                TreeNodeType::Parent(lchild, rchild) => {
                    stack.push(lchild);
                    stack.push(rchild);
                },
            }
        }
    }

    /// Iterates over every leaf as `(handle, box, item)`.
    pub fn leaves(&self) -> impl Iterator<Item = (usize, &Aabb, &V)> {
        self.pool.enumerate().filter_map(|(i, node)| match node.node_type {
            TreeNodeType::Leaf(ref val) => Some((i, &node.bounds, val)),
            TreeNodeType::Parent(..) => None,
        })
    }

    fn check_leaf(&self, leaf: usize) -> Result<(), BroadphaseError> {
        self.get_leaf(leaf).map(|_| ())
    }

    fn children(&self, i: usize) -> Option<(usize, usize)> {
        match self.pool[i].node_type {
            TreeNodeType::Parent(c1, c2) => Some((c1, c2)),
            TreeNodeType::Leaf(_) => None,
        }
    }

    /// Points `parent` at `new` wherever it pointed at `old`.
    fn replace_child(&mut self, parent: usize, old: usize, new: usize) {
        if let TreeNodeType::Parent(c1, c2) = self.pool[parent].node_type {
            self.pool[parent].node_type = if c1 == old {
                TreeNodeType::Parent(new, c2)
            } else {
                TreeNodeType::Parent(c1, new)
            };
        }
    }

    /// Recomputes the box and height of an internal node from its children.
    fn refit(&mut self, i: usize) {
        if let Some((c1, c2)) = self.children(i) {
            self.pool[i].bounds = Aabb::combine(&self.pool[c1].bounds, &self.pool[c2].bounds);
            self.pool[i].height = 1 + cmp::max(self.pool[c1].height, self.pool[c2].height);
        }
    }

    /// Links an unattached leaf node into the tree.
    fn attach_leaf(&mut self, leaf: usize) {
        let root = match self.root {
            Some(root) => root,
            None => {
                self.pool[leaf].parent = None;
                self.root = Some(leaf);
                return;
            }
        };
        let bounds = self.pool[leaf].bounds;

        // Descend to the leaf whose enlargement is cheapest. Each level pays
        // for the growth of every ancestor above it.
        let mut best = root;
        while let Some((child1, child2)) = self.children(best) {
            let area = self.pool[best].bounds.surface_area();
            let combined_area = self.pool[best].bounds.combined_area(&bounds);
            let inheritance_cost = combined_area - area;

            let child_cost = |child: usize| -> f32 {
                let child_bounds = &self.pool[child].bounds;
                let new_area = child_bounds.combined_area(&bounds);
                match self.pool[child].node_type {
                    TreeNodeType::Leaf(_) => new_area + inheritance_cost,
                    TreeNodeType::Parent(..) => {
                        new_area - child_bounds.surface_area() + inheritance_cost
                    },
                }
            };

            best = if child_cost(child1) <= child_cost(child2) {
                child1
            } else {
                child2
            };
        }

        // Pair the leaf we reached with the new one under a fresh parent.
        let old_parent = self.pool[best].parent;
        let best_bounds = self.pool[best].bounds;
        let new_parent = self.pool.push(TreeNode {
            height: 1,
            parent: old_parent,
            bounds: Aabb::combine(&bounds, &best_bounds),
            node_type: TreeNodeType::Parent(best, leaf),
        });
        match old_parent {
            Some(p) => self.replace_child(p, best, new_parent),
            None => self.root = Some(new_parent),
        }
        self.pool[best].parent = Some(new_parent);
        self.pool[leaf].parent = Some(new_parent);

        self.fix_upwards(old_parent);
    }

    /// Unlinks a leaf from the tree without freeing it. Its parent collapses
    /// into the leaf's sibling.
    fn detach_leaf(&mut self, leaf: usize) {
        let parent = match self.pool[leaf].parent {
            Some(parent) => parent,
            None => {
                self.root = None;
                return;
            }
        };
        let sibling = match self.children(parent) {
            Some((c1, c2)) => if c1 == leaf { c2 } else { c1 },
            None => unreachable!(),
        };
        let grand_parent = self.pool[parent].parent;
        match grand_parent {
            Some(g) => self.replace_child(g, parent, sibling),
            None => self.root = Some(sibling),
        }
        self.pool[sibling].parent = grand_parent;
        self.pool[leaf].parent = None;
        self.pool.remove(parent);

        self.fix_upwards(grand_parent);
    }

    /// Walks from `start` to the root refitting boxes and heights and
    /// rotating wherever siblings became unbalanced.
    fn fix_upwards(&mut self, start: Option<usize>) {
        let mut i = start;
        while let Some(idx) = i {
            self.refit(idx);
            let idx = self.balance(idx);
            i = self.pool[idx].parent;
        }
    }

    /// Performs a rotation at `a` if its children's heights differ by more
    /// than one and returns the root of the subtree afterward.
    fn balance(&mut self, a: usize) -> usize {
        let (b, c) = match self.children(a) {
            Some(children) => children,
            None => return a,
        };
        if self.pool[c].height > self.pool[b].height + 1 {
            return self.rotate(a, b, c);
        }
        if self.pool[b].height > self.pool[c].height + 1 {
            return self.rotate(a, c, b);
        }
        a
    }

    /// Promotes `up`, the taller child of `a`, into `a`'s place. `a` keeps
    /// `keep` and adopts the shorter of `up`'s children.
    fn rotate(&mut self, a: usize, keep: usize, up: usize) -> usize {
        let (f, g) = match self.children(up) {
            Some(children) => children,
            None => return a,
        };

        // Swap A and UP
        let a_parent = self.pool[a].parent;
        self.pool[up].parent = a_parent;
        self.pool[a].parent = Some(up);
        match a_parent {
            Some(p) => self.replace_child(p, a, up),
            None => self.root = Some(up),
        }

        // Rotate and readjust
        let (stay, moved) = if self.pool[f].height > self.pool[g].height {
            (f, g)
        } else {
            (g, f)
        };
        self.pool[up].node_type = TreeNodeType::Parent(a, stay);
        self.pool[a].node_type = TreeNodeType::Parent(keep, moved);
        self.pool[moved].parent = Some(a);
        self.refit(a);
        self.refit(up);
        up
    }
}

#[cfg(test)]
mod tests {
    mod bvh {
        use std::collections::{BTreeSet, HashMap};

        use cgmath::{InnerSpace, Point3, Vector3};
        use proptest::prelude::*;

        use crate::bounds::{Aabb, Contains, Overlaps};
        use crate::bvh::*;

        fn unit_at(x: f32, y: f32, z: f32) -> Aabb {
            Aabb::new(Point3::new(x, y, z), Point3::new(x + 1.0, y + 1.0, z + 1.0))
        }

        /// Checks parent links, tight boxes, heights and the balance bound.
        fn validate<V>(tree: &DynamicTree<V>) {
            let root = match tree.root {
                Some(root) => root,
                None => {
                    assert_eq!(tree.len(), 0);
                    return;
                }
            };
            assert_eq!(tree.pool[root].parent, None);
            let mut leaves = 0;
            let mut stack = vec![root];
            while let Some(i) = stack.pop() {
                let node = &tree.pool[i];
                match node.node_type {
                    TreeNodeType::Leaf(_) => {
                        assert_eq!(node.height, 0);
                        leaves += 1;
                    },
                    TreeNodeType::Parent(c1, c2) => {
                        let (n1, n2) = (&tree.pool[c1], &tree.pool[c2]);
                        assert_eq!(n1.parent, Some(i));
                        assert_eq!(n2.parent, Some(i));
                        assert_eq!(node.bounds, Aabb::combine(&n1.bounds, &n2.bounds));
                        assert_eq!(node.height, 1 + n1.height.max(n2.height));
                        assert!((n1.height - n2.height).abs() <= 1,
                                "unbalanced node {}: {} vs {}", i, n1.height, n2.height);
                        stack.push(c1);
                        stack.push(c2);
                    },
                }
            }
            assert_eq!(leaves, tree.len());
            assert_eq!(tree.pool.len(), if leaves == 0 { 0 } else { 2 * leaves - 1 });
        }

        #[test]
        fn test_insert_query() {
            let mut tree: DynamicTree<usize> = DynamicTree::new();
            tree.insert(unit_at(0.0, 0.0, 0.0), 0);
            tree.insert(Aabb::new(Point3::new(0.5, 0.5, 0.5), Point3::new(1.5, 1.5, 1.5)), 1);
            tree.insert(Aabb::new(Point3::new(3.0, 3.0, 3.0), Point3::new(4.0, 4.0, 4.0)), 2);
            validate(&tree);

            let query = Aabb::new(Point3::new(0.25, 0.25, 0.25), Point3::new(1.25, 1.25, 1.25));
            let mut leaves = Vec::new();
            tree.query_leaves(&query, &mut leaves);
            let items: BTreeSet<usize> = leaves
                .iter()
                .map(|&leaf| *tree.get_leaf(leaf).unwrap().1)
                .collect();
            assert!(items.contains(&0));
            assert!(items.contains(&1));
            assert!(!items.contains(&2));
            assert!(!tree.query(&unit_at(10.0, 10.0, 10.0), |_, _| {}));
        }

        #[test]
        fn test_unknown_handles() {
            let mut tree: DynamicTree<usize> = DynamicTree::new();
            let a = tree.insert(unit_at(0.0, 0.0, 0.0), 0);
            let b = tree.insert(unit_at(2.0, 0.0, 0.0), 1);
            // Two leaves share one parent, which is not a leaf.
            let parent = tree.root().unwrap();
            assert_eq!(tree.remove(parent), Err(BroadphaseError::NotALeaf(parent)));
            assert_eq!(tree.set_leaf_box(99, unit_at(0.0, 0.0, 0.0)),
                       Err(BroadphaseError::UnknownHandle(99)));
            assert_eq!(tree.remove(a), Ok(0));
            assert_eq!(tree.remove(a), Err(BroadphaseError::UnknownHandle(a)));
            assert!(tree.get_leaf(a).is_err());
            validate(&tree);
            assert_eq!(tree.get_leaf(b).map(|(_, v)| *v), Ok(1));
            assert_eq!(tree.remove(b), Ok(1));
            assert!(tree.is_empty());
            assert_eq!(tree.root(), None);
        }

        #[test]
        fn test_set_leaf_box_keeps_handle() {
            let mut tree: DynamicTree<usize> = DynamicTree::new();
            let handles: Vec<usize> = (0..16)
                .map(|i| tree.insert(unit_at(i as f32 * 2.0, 0.0, 0.0), i))
                .collect();
            tree.set_leaf_box(handles[3], unit_at(100.0, 0.0, 0.0)).unwrap();
            validate(&tree);
            let (bounds, item) = tree.get_leaf(handles[3]).unwrap();
            assert_eq!(*item, 3);
            assert_eq!(*bounds, unit_at(100.0, 0.0, 0.0));
            let mut hits = Vec::new();
            tree.query_leaves(&unit_at(100.5, 0.5, 0.5), &mut hits);
            assert_eq!(hits, vec![handles[3]]);
            hits.clear();
            tree.query_leaves(&unit_at(6.0, 0.0, 0.0), &mut hits);
            assert!(!hits.contains(&handles[3]));
        }

        #[test]
        fn test_stays_balanced() {
            let mut tree: DynamicTree<usize> = DynamicTree::new();
            // Sorted insertion is the worst case for an unbalanced tree.
            for i in 0..256 {
                tree.insert(unit_at(i as f32, 0.0, 0.0), i);
                validate(&tree);
            }
            assert!(tree.height() <= 12, "height {}", tree.height());
        }

        #[test]
        fn test_ray_cast() {
            let mut tree: DynamicTree<usize> = DynamicTree::new();
            tree.insert(unit_at(0.0, 0.0, 0.0), 0);
            tree.insert(unit_at(5.0, 5.0, 5.0), 1);

            let mut count = 0;
            tree.ray_cast(Point3::new(0.0, 0.0, 0.0), Vector3::new(1.0, 1.0, 1.0).normalize(), 10.0,
                          |_, _| { count += 1; true });
            assert_eq!(count, 2);

            // Only the first box is hit since the ray stays on the y = 0 plane.
            let mut hit = Vec::new();
            tree.ray_cast(Point3::new(0.0, 0.0, 0.0), Vector3::new(1.0, 0.0, 1.0), 10.0,
                          |&item, _| { hit.push(item); true });
            assert_eq!(hit, vec![0]);

            // Returning false stops the traversal after the first visit.
            let mut count = 0;
            tree.ray_cast(Point3::new(0.0, 0.0, 0.0), Vector3::new(1.0, 1.0, 1.0).normalize(), 10.0,
                          |_, _| { count += 1; false });
            assert_eq!(count, 1);

            // Too short to reach the far box.
            let mut count = 0;
            tree.ray_cast(Point3::new(0.0, 0.0, 0.0), Vector3::new(1.0, 1.0, 1.0).normalize(), 2.0,
                          |_, _| { count += 1; true });
            assert_eq!(count, 1);
        }

        #[derive(Clone, Debug)]
        enum Op {
            Insert(Aabb),
            Remove(usize),
            Move(usize, Aabb),
        }

        fn arb_aabb() -> impl Strategy<Value = Aabb> {
            (-20.0f32..20.0, -20.0f32..20.0, -20.0f32..20.0,
             0.0f32..6.0, 0.0f32..6.0, 0.0f32..6.0)
                .prop_map(|(x, y, z, w, h, d)| {
                    Aabb::new(Point3::new(x, y, z), Point3::new(x + w, y + h, z + d))
                })
        }

        fn arb_op() -> impl Strategy<Value = Op> {
            prop_oneof![
                3 => arb_aabb().prop_map(Op::Insert),
                1 => any::<usize>().prop_map(Op::Remove),
                2 => (any::<usize>(), arb_aabb()).prop_map(|(i, b)| Op::Move(i, b)),
            ]
        }

        proptest! {
            #[test]
            fn query_matches_linear_scan(
                ops in prop::collection::vec(arb_op(), 1..120),
                probes in prop::collection::vec(arb_aabb(), 1..8),
            ) {
                let mut tree: DynamicTree<u32> = DynamicTree::new();
                // item -> (handle, box)
                let mut oracle: HashMap<u32, (usize, Aabb)> = HashMap::new();
                let mut next_item = 0u32;
                for op in ops {
                    match op {
                        Op::Insert(b) => {
                            let handle = tree.insert(b, next_item);
                            oracle.insert(next_item, (handle, b));
                            next_item += 1;
                        },
                        Op::Remove(pick) => {
                            if oracle.is_empty() { continue; }
                            let mut keys: Vec<u32> = oracle.keys().cloned().collect();
                            keys.sort();
                            let item = keys[pick % keys.len()];
                            let (handle, _) = oracle.remove(&item).unwrap();
                            prop_assert_eq!(tree.remove(handle), Ok(item));
                        },
                        Op::Move(pick, b) => {
                            if oracle.is_empty() { continue; }
                            let mut keys: Vec<u32> = oracle.keys().cloned().collect();
                            keys.sort();
                            let item = keys[pick % keys.len()];
                            let entry = oracle.get_mut(&item).unwrap();
                            prop_assert_eq!(tree.set_leaf_box(entry.0, b), Ok(()));
                            entry.1 = b;
                        },
                    }
                    validate(&tree);
                }
                prop_assert_eq!(tree.len(), oracle.len());
                for probe in probes {
                    let mut found = BTreeSet::new();
                    tree.query(&probe, |_, &item| { found.insert(item); });
                    let expected: BTreeSet<u32> = oracle
                        .iter()
                        .filter(|(_, (_, b))| b.overlaps(&probe))
                        .map(|(&item, _)| item)
                        .collect();
                    prop_assert_eq!(found, expected);
                }
            }

            #[test]
            fn ray_cast_matches_linear_scan(
                boxes in prop::collection::vec(arb_aabb(), 1..40),
                ox in -25.0f32..25.0, oy in -25.0f32..25.0, oz in -25.0f32..25.0,
                dx in prop_oneof![Just(0.0f32), -1.0f32..1.0],
                dy in prop_oneof![Just(0.0f32), -1.0f32..1.0],
                dz in prop_oneof![Just(0.0f32), -1.0f32..1.0],
                max_distance in 0.0f32..60.0,
            ) {
                let mut tree: DynamicTree<usize> = DynamicTree::new();
                for (i, b) in boxes.iter().enumerate() {
                    tree.insert(*b, i);
                }
                let origin = Point3::new(ox, oy, oz);
                let dir = Vector3::new(dx, dy, dz);
                let mut visited = BTreeSet::new();
                tree.ray_cast(origin, dir, max_distance, |&i, b| {
                    assert!(boxes[i] == *b);
                    visited.insert(i);
                    true
                });
                let expected: BTreeSet<usize> = boxes
                    .iter()
                    .enumerate()
                    .filter(|(_, b)| b.intersects_segment(origin, dir, max_distance))
                    .map(|(i, _)| i)
                    .collect();
                prop_assert_eq!(visited, expected);
                // Every internal box contains its leaves, so nothing is pruned
                // that a leaf test would accept.
                for (_, b, _) in tree.leaves() {
                    prop_assert!(tree.pool[tree.root.unwrap()].bounds.contains(b));
                }
            }
        }
    }
}
