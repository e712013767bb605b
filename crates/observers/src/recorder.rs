use crease_core::Observer;

use crate::traits::{HasIteration, HasObjective, HasViolation};

/// One recorded solver iteration.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Record {
    pub iter: usize,
    pub objective: f64,
    pub violation: f64,
}

/// Keeps the objective and violation history of a run for later reporting.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Recorder {
    records: Vec<Record>,
}

impl Recorder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn records(&self) -> &[Record] {
        &self.records
    }

    #[must_use]
    pub fn last(&self) -> Option<&Record> {
        self.records.last()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Returns the record with the lowest objective among those whose
    /// violation is within `tol`.
    #[must_use]
    pub fn best_feasible(&self, tol: f64) -> Option<&Record> {
        self.records
            .iter()
            .filter(|r| r.violation <= tol)
            .min_by(|a, b| a.objective.total_cmp(&b.objective))
    }

    pub fn clear(&mut self) {
        self.records.clear();
    }
}

impl<E, A> Observer<E, A> for Recorder
where
    E: HasIteration + HasObjective + HasViolation,
{
    fn observe(&mut self, event: &E) -> Option<A> {
        self.records.push(Record {
            iter: event.iteration(),
            objective: event.objective(),
            violation: event.violation(),
        });
        None
    }
}
