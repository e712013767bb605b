use tracing::{Level, debug, error, info, trace, warn};

use crease_core::Observer;

use crate::traits::{HasIteration, HasObjective, HasViolation};

/// Logs solver progress through `tracing`.
///
/// Emits one event per `every` iterations (the first iteration is always
/// logged) and never acts on the solver.
#[derive(Debug, Clone, Copy)]
pub struct Log {
    level: Level,
    every: usize,
}

impl Default for Log {
    fn default() -> Self {
        Self::new(Level::DEBUG)
    }
}

impl Log {
    /// Logs every iteration at `level`.
    #[must_use]
    pub fn new(level: Level) -> Self {
        Self { level, every: 1 }
    }

    /// Logs only every `k`-th iteration. Zero is treated as one.
    #[must_use]
    pub fn every(mut self, k: usize) -> Self {
        self.every = k.max(1);
        self
    }

    fn should_log(&self, iter: usize) -> bool {
        iter <= 1 || iter % self.every == 0
    }
}

impl<E, A> Observer<E, A> for Log
where
    E: HasIteration + HasObjective + HasViolation,
{
    fn observe(&mut self, event: &E) -> Option<A> {
        let iter = event.iteration();
        if !self.should_log(iter) {
            return None;
        }

        let (objective, violation) = (event.objective(), event.violation());
        match self.level {
            Level::ERROR => error!(iter, objective, violation, "solver progress"),
            Level::WARN => warn!(iter, objective, violation, "solver progress"),
            Level::INFO => info!(iter, objective, violation, "solver progress"),
            Level::DEBUG => debug!(iter, objective, violation, "solver progress"),
            Level::TRACE => trace!(iter, objective, violation, "solver progress"),
        }
        None
    }
}
