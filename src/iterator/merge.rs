//! K-way merge over internal iterators
//!
//! A binary heap holds the current key of every valid child. Children
//! earlier in the list are newer sources and win ties. Changing direction
//! re-seeks every child around the current key.

use std::cmp::Ordering;
use std::collections::BinaryHeap;

use super::{BoxedIterator, InternalIterator};
use crate::error::Result;
use crate::key::compare_internal;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Direction {
    Forward,
    Reverse,
}

struct HeapEntry {
    key: Vec<u8>,
    index: usize,
    direction: Direction,
}

impl Ord for HeapEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        // BinaryHeap pops the greatest entry: invert key order going forward
        let by_key = match self.direction {
            Direction::Forward => compare_internal(&other.key, &self.key),
            Direction::Reverse => compare_internal(&self.key, &other.key),
        };
        by_key.then_with(|| other.index.cmp(&self.index))
    }
}

impl PartialOrd for HeapEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for HeapEntry {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for HeapEntry {}

pub struct MergingIterator {
    children: Vec<BoxedIterator>,
    heap: BinaryHeap<HeapEntry>,
    direction: Direction,
}

impl MergingIterator {
    /// `children` are ordered newest source first
    pub fn new(children: Vec<BoxedIterator>) -> Self {
        Self {
            heap: BinaryHeap::with_capacity(children.len()),
            children,
            direction: Direction::Forward,
        }
    }

    pub fn num_children(&self) -> usize {
        self.children.len()
    }

    fn push(&mut self, index: usize) {
        let child = &self.children[index];
        if child.valid() {
            self.heap.push(HeapEntry {
                key: child.key().to_vec(),
                index,
                direction: self.direction,
            });
        }
    }

    fn rebuild(&mut self, direction: Direction) {
        self.direction = direction;
        self.heap.clear();
        for index in 0..self.children.len() {
            self.push(index);
        }
    }

    /// Reposition every child other than the current one on the far side
    /// of the current key, then continue in `direction`
    fn switch_direction(&mut self, direction: Direction) -> Result<()> {
        let Some(top) = self.heap.peek() else {
            return Ok(());
        };
        let key = top.key.clone();
        let current = top.index;

        for (index, child) in self.children.iter_mut().enumerate() {
            if index == current {
                continue;
            }
            match direction {
                Direction::Forward => {
                    child.seek(&key)?;
                    if child.valid() && compare_internal(child.key(), &key) == Ordering::Equal {
                        child.next()?;
                    }
                }
                Direction::Reverse => {
                    child.seek_for_prev(&key)?;
                    if child.valid() && compare_internal(child.key(), &key) == Ordering::Equal {
                        child.prev()?;
                    }
                }
            }
        }

        self.rebuild(direction);
        Ok(())
    }

    fn step(&mut self, direction: Direction) -> Result<()> {
        if self.heap.is_empty() {
            return Ok(());
        }
        if self.direction != direction {
            self.switch_direction(direction)?;
        }

        if let Some(top) = self.heap.pop() {
            let child = &mut self.children[top.index];
            match direction {
                Direction::Forward => child.next()?,
                Direction::Reverse => child.prev()?,
            }
            self.push(top.index);
        }
        Ok(())
    }
}

impl InternalIterator for MergingIterator {
    fn valid(&self) -> bool {
        !self.heap.is_empty()
    }

    fn seek_to_first(&mut self) -> Result<()> {
        for child in &mut self.children {
            child.seek_to_first()?;
        }
        self.rebuild(Direction::Forward);
        Ok(())
    }

    fn seek_to_last(&mut self) -> Result<()> {
        for child in &mut self.children {
            child.seek_to_last()?;
        }
        self.rebuild(Direction::Reverse);
        Ok(())
    }

    fn seek(&mut self, target: &[u8]) -> Result<()> {
        for child in &mut self.children {
            child.seek(target)?;
        }
        self.rebuild(Direction::Forward);
        Ok(())
    }

    fn seek_for_prev(&mut self, target: &[u8]) -> Result<()> {
        for child in &mut self.children {
            child.seek_for_prev(target)?;
        }
        self.rebuild(Direction::Reverse);
        Ok(())
    }

    fn next(&mut self) -> Result<()> {
        self.step(Direction::Forward)
    }

    fn prev(&mut self) -> Result<()> {
        self.step(Direction::Reverse)
    }

    fn key(&self) -> &[u8] {
        self.heap.peek().map(|top| top.key.as_slice()).unwrap_or(&[])
    }

    fn value(&self) -> &[u8] {
        match self.heap.peek() {
            Some(top) => self.children[top.index].value(),
            None => &[],
        }
    }
}
