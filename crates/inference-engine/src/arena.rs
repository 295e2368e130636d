//! Fixed-capacity tensor arena

use tracing::debug;

use crate::InferenceError;

/// Alignment of every tensor placed in the arena
pub const ARENA_ALIGNMENT: usize = 16;

/// Round `value` up to the arena alignment
pub(crate) fn align_up(value: usize) -> usize {
    (value + ARENA_ALIGNMENT - 1) & !(ARENA_ALIGNMENT - 1)
}

/// A single byte region allocated once and never resized.
///
/// Backed by 64-bit words so that float tensors at aligned offsets can be
/// viewed in place.
pub struct Arena {
    words: Box<[u64]>,
    capacity: usize,
    used: usize,
}

impl Arena {
    /// Allocate a zeroed arena of `capacity` bytes
    pub fn new(capacity: usize) -> Result<Self, InferenceError> {
        let word_count = capacity.div_ceil(8);
        let mut words: Vec<u64> = Vec::new();
        words
            .try_reserve_exact(word_count)
            .map_err(|_| InferenceError::ArenaAllocation { capacity })?;
        words.resize(word_count, 0);

        debug!("Allocated tensor arena of {} bytes", capacity);
        Ok(Self {
            words: words.into_boxed_slice(),
            capacity,
            used: 0,
        })
    }

    /// Total capacity in bytes
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Bytes claimed by the current tensor plan
    pub fn used(&self) -> usize {
        self.used
    }

    /// Claim the first `required` bytes for planned tensors
    pub(crate) fn commit(&mut self, required: usize) -> Result<(), InferenceError> {
        if required > self.capacity {
            return Err(InferenceError::ArenaExhausted {
                required,
                capacity: self.capacity,
            });
        }
        self.used = required;
        Ok(())
    }

    pub fn bytes(&self) -> &[u8] {
        &bytemuck::cast_slice::<u64, u8>(&self.words)[..self.capacity]
    }

    pub fn bytes_mut(&mut self) -> &mut [u8] {
        let capacity = self.capacity;
        &mut bytemuck::cast_slice_mut::<u64, u8>(&mut self.words)[..capacity]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_align_up() {
        assert_eq!(align_up(0), 0);
        assert_eq!(align_up(1), 16);
        assert_eq!(align_up(16), 16);
        assert_eq!(align_up(17), 32);
    }

    #[test]
    fn test_capacity_is_exact() {
        let mut arena = Arena::new(37).unwrap();
        assert_eq!(arena.capacity(), 37);
        assert_eq!(arena.bytes().len(), 37);
        assert_eq!(arena.bytes_mut().len(), 37);
        assert!(arena.bytes().iter().all(|&b| b == 0));
    }

    #[test]
    fn test_commit_checks_capacity() {
        let mut arena = Arena::new(64).unwrap();
        assert!(arena.commit(64).is_ok());
        assert_eq!(arena.used(), 64);
        assert!(matches!(
            arena.commit(65),
            Err(InferenceError::ArenaExhausted { required: 65, capacity: 64 })
        ));
    }

    #[test]
    fn test_base_is_word_aligned() {
        let arena = Arena::new(128).unwrap();
        assert_eq!(arena.bytes().as_ptr() as usize % 8, 0);
    }
}
