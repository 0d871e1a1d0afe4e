//! An explicit, bounded-wait rendezvous barrier for the per-cycle
//! core/uncore handoff (§5, §9: "replace the spin/yield loop with a
//! barrier ... so that the rendezvous is explicit and bounded-wait;
//! deactivation decrements the barrier parties").

use std::sync::{Condvar, Mutex, PoisonError};

struct State {
    /// Core threads still expected to arrive each generation.
    parties: usize,
    /// Core ids that have arrived for the current generation.
    arrived: Vec<usize>,
    generation: u64,
    /// Winner of the just-completed generation: the lowest core id
    /// present, which must advance the uncore before the next cycle.
    master: Option<usize>,
}

/// Synchronizes every still-active core thread at the end of a cycle.
/// Exactly one caller per generation — the lowest `core_id` present —
/// is elected master and must perform the shared uncore tick before any
/// core starts its next cycle.
pub struct Rendezvous {
    state: Mutex<State>,
    cv: Condvar,
}

impl Rendezvous {
    /// Creates a barrier for `parties` initially active cores.
    #[must_use]
    pub fn new(parties: usize) -> Self {
        Self {
            state: Mutex::new(State { parties, arrived: Vec::new(), generation: 0, master: None }),
            cv: Condvar::new(),
        }
    }

    /// Arrives at the barrier as `core_id` and blocks until every
    /// still-active party has arrived this generation. Returns `true`
    /// for exactly one caller: the elected master for this round.
    pub fn arrive_and_wait(&self, core_id: usize) -> bool {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        let my_generation = state.generation;
        state.arrived.push(core_id);
        if state.arrived.len() >= state.parties.max(1) {
            Self::release(&mut state);
            self.cv.notify_all();
        } else {
            while state.generation == my_generation {
                state = self.cv.wait(state).unwrap_or_else(PoisonError::into_inner);
            }
        }
        state.master == Some(core_id)
    }

    /// Leaves the rendezvous permanently: the calling core has halted
    /// and will never call [`Self::arrive_and_wait`] again. Decrements
    /// the party count and releases any waiters that now satisfy the
    /// (lower) threshold.
    pub fn leave(&self) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        state.parties = state.parties.saturating_sub(1);
        if !state.arrived.is_empty() && state.arrived.len() >= state.parties.max(1) {
            Self::release(&mut state);
            self.cv.notify_all();
        }
    }

    fn release(state: &mut State) {
        state.master = state.arrived.iter().copied().min();
        state.arrived.clear();
        state.generation += 1;
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::Rendezvous;

    #[test]
    fn lowest_core_id_is_elected_master() {
        let rendezvous = Arc::new(Rendezvous::new(3));
        std::thread::scope(|scope| {
            let mut handles = Vec::new();
            for core_id in [2usize, 0, 1] {
                let rendezvous = Arc::clone(&rendezvous);
                handles.push(scope.spawn(move || rendezvous.arrive_and_wait(core_id)));
            }
            let results: Vec<bool> = handles.into_iter().map(|h| h.join().unwrap()).collect();
            assert_eq!(results.iter().filter(|&&won| won).count(), 1);
            let masters: Vec<usize> = [2usize, 0, 1]
                .into_iter()
                .zip(results)
                .filter_map(|(id, won)| won.then_some(id))
                .collect();
            assert_eq!(masters, vec![0]);
        });
    }

    #[test]
    fn leave_shrinks_threshold_for_remaining_party() {
        let rendezvous = Rendezvous::new(2);
        rendezvous.leave();
        assert!(rendezvous.arrive_and_wait(7));
    }
}
