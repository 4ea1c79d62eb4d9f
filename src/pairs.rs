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

use crate::bvh::DynamicTree;

/// Produces the unique overlapping pairs of a broadphase tree.
///
/// The buffers are kept between calls so a step reuses their allocations.
#[derive(Clone, Debug, Default)]
pub struct PairGenerator<V> {
    pairs: Vec<(V, V)>,
    scratch: Vec<usize>,
}

impl<V: Copy + Ord> PairGenerator<V> {
    pub fn new() -> Self {
        PairGenerator {
            pairs: Vec::new(),
            scratch: Vec::new(),
        }
    }

    /// Returns every pair of leaves whose boxes overlap, each pair exactly
    /// once with its smaller item first, sorted.
    pub fn generate(&mut self, tree: &DynamicTree<V>) -> &[(V, V)] {
        self.pairs.clear();
        for (leaf, bounds, &item) in tree.leaves() {
            self.scratch.clear();
            tree.query_leaves(bounds, &mut self.scratch);
            for &other in self.scratch.iter() {
                if other <= leaf {
                    continue;
                }
                if let Ok((_, &other_item)) = tree.get_leaf(other) {
                    if item < other_item {
                        self.pairs.push((item, other_item));
                    } else {
                        self.pairs.push((other_item, item));
                    }
                }
            }
        }
        self.pairs.sort();
        &self.pairs
    }

    /// The pairs found by the last call to `generate`.
    pub fn pairs(&self) -> &[(V, V)] {
        &self.pairs
    }
}
