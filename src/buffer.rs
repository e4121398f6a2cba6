// Copyright (c) 2026, Chad Hogan
// All rights reserved.
//
// This source code is licensed under the BSD-3-Clause license found in the
// LICENSE file in the root directory of this source tree.

/// How a kernel's writes relate to its reads within one round.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BufferPolicy {
    /// Read and write the same array; later blocks in a round may observe
    /// earlier blocks' writes.
    #[default]
    InPlace,
    /// Read `current`, write `next`, swap after the round.
    Strict,
}

/// A ping-pong pair of same-shape arrays.
///
/// Under [`BufferPolicy::InPlace`] there is no second array and [`swap`](Self::swap)
/// is a no-op.
#[derive(Debug, Clone)]
pub struct DoubleBuffer<T> {
    current: Vec<T>,
    next: Option<Vec<T>>,
}

impl<T: Clone> DoubleBuffer<T> {
    /// Wrap `initial` as the current array; under the strict policy `next` starts as a copy.
    pub fn new(initial: Vec<T>, policy: BufferPolicy) -> Self {
        let next = match policy {
            BufferPolicy::InPlace => None,
            BufferPolicy::Strict => Some(initial.clone()),
        };
        DoubleBuffer {
            current: initial,
            next,
        }
    }

    /// The policy this buffer was created with.
    pub fn policy(&self) -> BufferPolicy {
        if self.next.is_some() {
            BufferPolicy::Strict
        } else {
            BufferPolicy::InPlace
        }
    }

    /// Number of elements in each array.
    pub fn len(&self) -> usize {
        self.current.len()
    }

    /// Whether the arrays are empty.
    pub fn is_empty(&self) -> bool {
        self.current.is_empty()
    }

    /// This round's authoritative values.
    pub fn current(&self) -> &[T] {
        &self.current
    }

    /// Mutable access to the authoritative values (in-place updates).
    pub fn current_mut(&mut self) -> &mut [T] {
        &mut self.current
    }

    /// The scratch array, if strict.
    pub fn next(&self) -> Option<&[T]> {
        self.next.as_deref()
    }

    /// Read `current` while writing `next`. `None` under the in-place policy.
    pub fn split(&mut self) -> Option<(&[T], &mut [T])> {
        match &mut self.next {
            Some(next) => Some((&self.current[..], &mut next[..])),
            None => None,
        }
    }

    /// Mutable access to both arrays. `None` under the in-place policy.
    pub fn pair_mut(&mut self) -> Option<(&mut [T], &mut [T])> {
        match &mut self.next {
            Some(next) => Some((&mut self.current[..], &mut next[..])),
            None => None,
        }
    }

    /// Exchange the `current` and `next` labels in O(1).
    pub fn swap(&mut self) {
        if let Some(next) = &mut self.next {
            std::mem::swap(&mut self.current, next);
        }
    }

    /// Overwrite every element of `next` with `value`.
    pub fn fill_next(&mut self, value: T) {
        if let Some(next) = &mut self.next {
            next.fill(value);
        }
    }

    /// Copy the listed chunks of `current` into `next`, restoring `next == current`
    /// after a swap that followed a partial write.
    pub fn resync(&mut self, chunk: usize, ids: &[usize]) {
        if let Some(next) = &mut self.next {
            for &id in ids {
                let range = id * chunk..(id + 1) * chunk;
                next[range.clone()].clone_from_slice(&self.current[range]);
            }
        }
    }

    /// Consume the buffer, keeping the authoritative values.
    pub fn into_current(self) -> Vec<T> {
        self.current
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn in_place_has_no_scratch() {
        let mut buf = DoubleBuffer::new(vec![1, 2, 3], BufferPolicy::InPlace);
        assert_eq!(buf.policy(), BufferPolicy::InPlace);
        assert!(buf.split().is_none());
        buf.current_mut()[0] = 9;
        buf.swap();
        assert_eq!(buf.current(), &[9, 2, 3]);
    }

    #[test]
    fn strict_swap_exchanges_labels() {
        let mut buf = DoubleBuffer::new(vec![1.0, 2.0], BufferPolicy::Strict);
        {
            let (cur, next) = buf.split().unwrap();
            next[0] = cur[0] + 10.0;
        }
        assert_eq!(buf.current(), &[1.0, 2.0]);
        buf.swap();
        assert_eq!(buf.current(), &[11.0, 2.0]);
        assert_eq!(buf.next().unwrap(), &[1.0, 2.0]);
    }

    #[test]
    fn resync_copies_only_listed_chunks() {
        let mut buf = DoubleBuffer::new(vec![0u8; 6], BufferPolicy::Strict);
        {
            let (_, next) = buf.split().unwrap();
            next[0] = 1;
            next[1] = 1;
            next[4] = 3;
        }
        buf.swap();
        buf.resync(2, &[0]);
        assert_eq!(buf.next().unwrap(), &[1, 1, 0, 0, 0, 0]);
        assert_eq!(buf.current(), &[1, 1, 0, 0, 3, 0]);
    }

    #[test]
    fn fill_next_leaves_current() {
        let mut buf = DoubleBuffer::new(vec![f32::INFINITY; 3], BufferPolicy::Strict);
        buf.fill_next(0.5);
        assert_eq!(buf.next().unwrap(), &[0.5, 0.5, 0.5]);
        assert!(buf.current().iter().all(|v| v.is_infinite()));
    }
}
