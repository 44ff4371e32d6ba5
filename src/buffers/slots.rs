use std::ops::Range;

use crate::concealment::{Concealment, ConcealmentSlot};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotState {
    Empty,
    Filled,
    Concealed,
}

#[derive(Debug, Clone, Copy)]
struct SlotTag {
    sequence_number: u64,
    state: SlotState,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    Inserted,
    /// Real data took the place of a concealment that was not played yet.
    Replaced,
    /// The position already holds real data, which is kept.
    Duplicate,
}

/// Fixed set of element slots addressed by `sequence_number % capacity`.
///
/// A slot answers for a sequence number only while its tag matches it, so a
/// slot left behind by the read cursor reads as empty for any later position
/// mapping onto it. Nothing has to be cleared on eviction.
pub struct SlotArena {
    element_size: usize,
    tags: Vec<SlotTag>,
    data: Vec<u8>,
}

impl SlotArena {
    pub fn new(capacity: usize, element_size: usize) -> Self {
        SlotArena {
            element_size,
            tags: vec![
                SlotTag {
                    sequence_number: 0,
                    state: SlotState::Empty,
                };
                capacity
            ],
            data: vec![0; capacity * element_size],
        }
    }

    pub fn capacity(&self) -> usize {
        self.tags.len()
    }

    fn index(&self, sequence_number: u64) -> usize {
        (sequence_number % self.tags.len() as u64) as usize
    }

    /// Slot index ranges covering `count` positions from `start`. The second
    /// range is non-empty only when the run wraps around the end of the arena.
    fn segments(&self, start: u64, count: usize) -> (Range<usize>, Range<usize>) {
        let first_index = self.index(start);
        let first_len = count.min(self.capacity() - first_index);
        (
            first_index..first_index + first_len,
            0..count - first_len,
        )
    }

    pub fn state(&self, sequence_number: u64) -> SlotState {
        let tag = &self.tags[self.index(sequence_number)];
        if tag.sequence_number == sequence_number {
            tag.state
        } else {
            SlotState::Empty
        }
    }

    #[cfg(test)]
    pub fn get(&self, sequence_number: u64) -> Option<&[u8]> {
        if self.state(sequence_number) == SlotState::Empty {
            return None;
        }
        let start = self.index(sequence_number) * self.element_size;
        Some(&self.data[start..start + self.element_size])
    }

    pub fn write(&mut self, sequence_number: u64, element: &[u8]) -> WriteOutcome {
        let index = self.index(sequence_number);
        let tag = &mut self.tags[index];
        let outcome = if tag.sequence_number == sequence_number {
            match tag.state {
                SlotState::Filled => return WriteOutcome::Duplicate,
                SlotState::Concealed => WriteOutcome::Replaced,
                SlotState::Empty => WriteOutcome::Inserted,
            }
        } else {
            WriteOutcome::Inserted
        };
        *tag = SlotTag {
            sequence_number,
            state: SlotState::Filled,
        };
        let start = index * self.element_size;
        self.data[start..start + self.element_size].copy_from_slice(element);
        outcome
    }

    /// Zeroes `count` positions from `start`, lets `handler` write their
    /// content in place and only then marks them concealed, so a panicking
    /// handler leaves them empty. `count` must not exceed the capacity.
    pub fn conceal(&mut self, start: u64, count: usize, handler: &dyn Concealment) {
        debug_assert!(count <= self.capacity());
        let element_size = self.element_size;
        let (first, second) = self.segments(start, count);
        let (head, tail) = self.data.split_at_mut(first.start * element_size);
        let tail = &mut tail[..first.len() * element_size];
        let head = &mut head[..second.len() * element_size];
        tail.fill(0);
        head.fill(0);

        let mut slots: Vec<ConcealmentSlot<'_>> = tail
            .chunks_exact_mut(element_size)
            .chain(head.chunks_exact_mut(element_size))
            .zip((0..count as u64).map(|offset| start.wrapping_add(offset)))
            .map(|(data, sequence_number)| ConcealmentSlot {
                sequence_number,
                data,
            })
            .collect();
        handler.conceal(&mut slots);

        for offset in 0..count as u64 {
            let sequence_number = start.wrapping_add(offset);
            let index = self.index(sequence_number);
            self.tags[index] = SlotTag {
                sequence_number,
                state: SlotState::Concealed,
            };
        }
    }

    /// Copies `count` positions from `start` into the front of `destination`,
    /// whatever their state.
    pub fn copy_out(&self, start: u64, count: usize, destination: &mut [u8]) {
        let element_size = self.element_size;
        let (first, second) = self.segments(start, count);
        let split = first.len() * element_size;
        destination[..split]
            .copy_from_slice(&self.data[first.start * element_size..first.end * element_size]);
        destination[split..split + second.len() * element_size]
            .copy_from_slice(&self.data[..second.end * element_size]);
    }

    /// Number of consecutive non-empty positions from `start`, up to `limit`.
    pub fn occupied_run(&self, start: u64, limit: usize) -> usize {
        (0..limit as u64)
            .take_while(|offset| self.state(start.wrapping_add(*offset)) != SlotState::Empty)
            .count()
    }
}

#[cfg(test)]
mod slot_arena_tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_arena_starts_empty() {
        let arena = SlotArena::new(8, 2);
        assert_eq!(arena.capacity(), 8);
        for i in 0..16 {
            assert_eq!(arena.state(i), SlotState::Empty);
            assert!(arena.get(i).is_none());
        }
        assert_eq!(arena.occupied_run(0, 8), 0);
    }

    #[test]
    fn test_arena_write_then_get_returns_data() {
        let mut arena = SlotArena::new(8, 2);
        assert_eq!(arena.write(3, &[1, 2]), WriteOutcome::Inserted);
        assert_eq!(arena.state(3), SlotState::Filled);
        assert_eq!(arena.get(3).unwrap(), &[1, 2]);
    }

    #[test]
    fn test_arena_duplicate_write_keeps_first_data() {
        let mut arena = SlotArena::new(8, 2);
        arena.write(3, &[1, 2]);
        assert_eq!(arena.write(3, &[9, 9]), WriteOutcome::Duplicate);
        assert_eq!(arena.get(3).unwrap(), &[1, 2]);
    }

    #[test]
    fn test_arena_aliased_position_reads_empty() {
        let mut arena = SlotArena::new(8, 2);
        arena.write(3, &[1, 2]);
        assert_eq!(arena.state(11), SlotState::Empty);
        assert_eq!(arena.write(11, &[5, 6]), WriteOutcome::Inserted);
        assert_eq!(arena.state(3), SlotState::Empty);
        assert_eq!(arena.get(11).unwrap(), &[5, 6]);
    }

    #[test]
    fn test_arena_conceal_wraps_around_and_copies_out() {
        let mut arena = SlotArena::new(4, 1);
        let calls = AtomicUsize::new(0);
        let handler = |slots: &mut [ConcealmentSlot<'_>]| {
            calls.fetch_add(1, Ordering::SeqCst);
            for slot in slots.iter_mut() {
                slot.data[0] = 100 + slot.sequence_number as u8;
            }
        };
        arena.write(6, &[6]);
        // Positions 2..=5 map onto indices 2, 3, 0, 1.
        arena.conceal(2, 4, &handler);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        for position in 2..6 {
            assert_eq!(arena.state(position), SlotState::Concealed);
        }
        let mut destination = [0u8; 4];
        arena.copy_out(2, 4, &mut destination);
        assert_eq!(destination, [102, 103, 104, 105]);
    }

    #[test]
    fn test_arena_conceal_zeroes_previous_content() {
        let mut arena = SlotArena::new(4, 2);
        arena.write(0, &[7, 7]);
        arena.conceal(4, 1, &|_: &mut [ConcealmentSlot<'_>]| {});
        assert_eq!(arena.get(4).unwrap(), &[0, 0]);
    }

    #[test]
    fn test_arena_panicking_handler_leaves_positions_empty() {
        let mut arena = SlotArena::new(4, 1);
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            arena.conceal(1, 2, &|_: &mut [ConcealmentSlot<'_>]| panic!("handler failed"));
        }));
        assert!(result.is_err());
        assert_eq!(arena.state(1), SlotState::Empty);
        assert_eq!(arena.state(2), SlotState::Empty);
        assert_eq!(arena.write(1, &[1]), WriteOutcome::Inserted);
    }

    #[test]
    fn test_arena_real_data_replaces_concealment() {
        let mut arena = SlotArena::new(4, 1);
        arena.conceal(0, 2, &|slots: &mut [ConcealmentSlot<'_>]| {
            for slot in slots.iter_mut() {
                slot.data[0] = 0xFF;
            }
        });
        assert_eq!(arena.write(1, &[1]), WriteOutcome::Replaced);
        assert_eq!(arena.state(1), SlotState::Filled);
        assert_eq!(arena.get(0).unwrap(), &[0xFF]);
        assert_eq!(arena.get(1).unwrap(), &[1]);
    }

    #[test]
    fn test_arena_occupied_run_stops_at_gap() {
        let mut arena = SlotArena::new(8, 1);
        for position in [10, 11, 12, 14] {
            arena.write(position, &[position as u8]);
        }
        assert_eq!(arena.occupied_run(10, 8), 3);
        assert_eq!(arena.occupied_run(10, 2), 2);
        assert_eq!(arena.occupied_run(13, 8), 0);
    }
}
