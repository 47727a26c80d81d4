// src/pool/capacity.rs
//! Capacity accounting for admission control
//!
//! A slot is reserved with a single compare-and-swap before any slow work
//! (robot compilation) starts, so concurrent allocations can never push the
//! pool past its bound.

use std::sync::atomic::{AtomicUsize, Ordering};

/// Fixed-size budget of worker slots
#[derive(Debug)]
pub struct SlotBudget {
    capacity: usize,
    in_use: AtomicUsize,
}

impl SlotBudget {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            in_use: AtomicUsize::new(0),
        }
    }

    /// Maximum number of slots
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Slots currently reserved or held by live workers
    pub fn in_use(&self) -> usize {
        self.in_use.load(Ordering::Acquire)
    }

    /// Reserve one slot, or `None` if the budget is exhausted
    ///
    /// The slot is returned when the reservation drops, unless it is
    /// [committed](SlotReservation::commit) to a live worker.
    pub fn try_reserve(&self) -> Option<SlotReservation<'_>> {
        let mut current = self.in_use.load(Ordering::Acquire);
        loop {
            if current >= self.capacity {
                return None;
            }
            match self.in_use.compare_exchange_weak(
                current,
                current + 1,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => {
                    return Some(SlotReservation {
                        budget: self,
                        committed: false,
                    })
                }
                Err(actual) => current = actual,
            }
        }
    }

    /// Return a committed slot
    pub fn release(&self) {
        let previous = self
            .in_use
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| n.checked_sub(1));
        debug_assert!(previous.is_ok(), "released more slots than were reserved");
    }
}

/// A reserved slot; returned to the budget on drop unless committed
#[derive(Debug)]
pub struct SlotReservation<'a> {
    budget: &'a SlotBudget,
    committed: bool,
}

impl SlotReservation<'_> {
    /// Hand the slot over to a live worker; it is now freed with
    /// [`SlotBudget::release`]
    pub fn commit(mut self) {
        self.committed = true;
    }
}

impl Drop for SlotReservation<'_> {
    fn drop(&mut self) {
        if !self.committed {
            self.budget.release();
        }
    }
}
