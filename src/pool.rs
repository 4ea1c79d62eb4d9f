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

use std::iter::FilterMap;
use std::iter::Enumerate;
use std::mem;
use std::ops::{Index, IndexMut};
use std::slice;

/// Internal storage type used by Pool.
#[derive(Clone, Debug)]
pub enum PoolEntry<T> {
    FreeListEnd,
    FreeListPtr {
        next_free: usize,
    },
    Occupied(T),
}

/// Growable arena that hands out stable integer handles. Removing an item
/// never moves the others; its slot is threaded onto a free list and reused
/// by the next push.
#[derive(Clone, Debug)]
pub struct Pool<T> {
    len: usize,
    free_list: Option<usize>,
    entries: Vec<PoolEntry<T>>,
}

impl<T> Default for Pool<T> {
    fn default() -> Self {
        Pool::new()
    }
}

impl<T> Pool<T> {
    /// Create an empty Pool.
    pub fn new() -> Self {
        Pool {
            len: 0,
            free_list: None,
            entries: Vec::new(),
        }
    }

    /// Create an empty Pool large enough to fit cap items.
    pub fn with_capacity(cap: usize) -> Self {
        Pool {
            len: 0,
            free_list: None,
            entries: Vec::with_capacity(cap),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Number of occupied slots.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Push a new item to the Pool. Reclaims the most recently freed slot
    /// before growing the backing storage.
    pub fn push(&mut self, item: T) -> usize {
        self.len += 1;
        if let Some(free_item) = self.free_list {
            self.free_list = match self.entries[free_item] {
                PoolEntry::FreeListEnd => None,
                PoolEntry::FreeListPtr { next_free } => Some(next_free),
                PoolEntry::Occupied(_) => unreachable!(),
            };
            self.entries[free_item] = PoolEntry::Occupied(item);
            free_item
        } else {
            let i = self.entries.len();
            self.entries.push(PoolEntry::Occupied(item));
            i
        }
    }

    /// Frees the slot at `i` and returns its item. Returns None and leaves the
    /// pool untouched if the slot is not occupied.
    pub fn remove(&mut self, i: usize) -> Option<T> {
        if !self.contains(i) {
            return None;
        }
        let new_entry = match self.free_list {
            Some(next_free) => PoolEntry::FreeListPtr { next_free },
            None => PoolEntry::FreeListEnd,
        };
        self.free_list = Some(i);
        self.len -= 1;
        match mem::replace(&mut self.entries[i], new_entry) {
            PoolEntry::Occupied(item) => Some(item),
            _ => unreachable!(),
        }
    }

    /// Returns true if `i` refers to a live item.
    pub fn contains(&self, i: usize) -> bool {
        match self.entries.get(i) {
            Some(PoolEntry::Occupied(_)) => true,
            _ => false,
        }
    }

    pub fn get(&self, i: usize) -> Option<&T> {
        match self.entries.get(i) {
            Some(PoolEntry::Occupied(item)) => Some(item),
            _ => None,
        }
    }

    pub fn get_mut(&mut self, i: usize) -> Option<&mut T> {
        match self.entries.get_mut(i) {
            Some(PoolEntry::Occupied(item)) => Some(item),
            _ => None,
        }
    }

    /// Iterates over live items in slot order.
    pub fn iter(&self) -> FilterMap<slice::Iter<'_, PoolEntry<T>>, fn(&PoolEntry<T>) -> Option<&T>> {
        self.into_iter()
    }

    pub fn iter_mut(&mut self) -> FilterMap<slice::IterMut<'_, PoolEntry<T>>, fn(&mut PoolEntry<T>) -> Option<&mut T>> {
        self.into_iter()
    }

    /// Iterates over `(handle, item)` pairs in slot order.
    pub fn enumerate(&self) -> FilterMap<Enumerate<slice::Iter<'_, PoolEntry<T>>>, fn((usize, &PoolEntry<T>)) -> Option<(usize, &T)>> {
        self.entries.iter().enumerate().filter_map(filter_pool_indexed)
    }
}

impl<T> Index<usize> for Pool<T> {
    type Output = T;

    fn index(&self, i: usize) -> &T {
        if let PoolEntry::Occupied(ref item) = self.entries[i] {
            item
        } else {
            panic!("index {} is not occupied", i)
        }
    }
}

impl<T> IndexMut<usize> for Pool<T> {
    fn index_mut(&mut self, i: usize) -> &mut T {
        if let PoolEntry::Occupied(ref mut item) = self.entries[i] {
            item
        } else {
            panic!("index {} is not occupied", i)
        }
    }
}

#[inline(always)]
fn filter_pool<T>(item: &PoolEntry<T>) -> Option<&T> {
    if let PoolEntry::Occupied(item) = item {
        Some(item)
    } else {
        None
    }
}

#[inline(always)]
fn filter_pool_indexed<T>((i, item): (usize, &PoolEntry<T>)) -> Option<(usize, &T)> {
    filter_pool(item).map(|item| (i, item))
}

impl<'a, T> IntoIterator for &'a Pool<T> {
    type Item = &'a T;
    type IntoIter = FilterMap<slice::Iter<'a, PoolEntry<T>>, fn(&PoolEntry<T>) -> Option<&T>>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter().filter_map(filter_pool)
    }
}

#[inline(always)]
fn filter_pool_mut<T>(item: &mut PoolEntry<T>) -> Option<&mut T> {
    if let PoolEntry::Occupied(item) = item {
        Some(item)
    } else {
        None
    }
}

impl<'a, T> IntoIterator for &'a mut Pool<T> {
    type Item = &'a mut T;
    type IntoIter = FilterMap<slice::IterMut<'a, PoolEntry<T>>, fn(&mut PoolEntry<T>) -> Option<&mut T>>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter_mut().filter_map(filter_pool_mut)
    }
}
