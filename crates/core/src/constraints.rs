use crate::{CallCounts, Counted};

/// The four constraint groups a problem distinguishes.
///
/// Inequalities follow the convention `c(x) ≤ 0`; equalities mean `c(x) = 0`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ConstraintKind {
    LinearEquality,
    LinearInequality,
    NonlinearEquality,
    NonlinearInequality,
}

impl ConstraintKind {
    /// All kinds, in the order [`ConstraintSet::iter`] visits them.
    pub const ALL: [Self; 4] = [
        Self::LinearEquality,
        Self::LinearInequality,
        Self::NonlinearEquality,
        Self::NonlinearInequality,
    ];

    #[must_use]
    pub fn is_equality(self) -> bool {
        matches!(self, Self::LinearEquality | Self::NonlinearEquality)
    }

    #[must_use]
    pub fn is_linear(self) -> bool {
        matches!(self, Self::LinearEquality | Self::LinearInequality)
    }
}

/// Ordered collections of constraint functions, one per [`ConstraintKind`].
///
/// Order within a group is insertion order. It does not affect correctness,
/// but deterministic backends evaluate constraints in this order, which keeps
/// runs reproducible.
#[derive(Debug, Default)]
pub struct ConstraintSet {
    linear_equalities: Vec<Counted>,
    linear_inequalities: Vec<Counted>,
    nonlinear_equalities: Vec<Counted>,
    nonlinear_inequalities: Vec<Counted>,
}

impl ConstraintSet {
    /// Creates an empty constraint set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a constraint to the group for `kind`.
    pub fn push(&mut self, kind: ConstraintKind, f: Counted) {
        self.group_mut(kind).push(f);
    }

    /// Returns the constraints of one group.
    #[must_use]
    pub fn group(&self, kind: ConstraintKind) -> &[Counted] {
        match kind {
            ConstraintKind::LinearEquality => &self.linear_equalities,
            ConstraintKind::LinearInequality => &self.linear_inequalities,
            ConstraintKind::NonlinearEquality => &self.nonlinear_equalities,
            ConstraintKind::NonlinearInequality => &self.nonlinear_inequalities,
        }
    }

    fn group_mut(&mut self, kind: ConstraintKind) -> &mut Vec<Counted> {
        match kind {
            ConstraintKind::LinearEquality => &mut self.linear_equalities,
            ConstraintKind::LinearInequality => &mut self.linear_inequalities,
            ConstraintKind::NonlinearEquality => &mut self.nonlinear_equalities,
            ConstraintKind::NonlinearInequality => &mut self.nonlinear_inequalities,
        }
    }

    /// Iterates over equality constraints, linear ones first.
    pub fn equalities(&self) -> impl Iterator<Item = &Counted> {
        self.linear_equalities
            .iter()
            .chain(&self.nonlinear_equalities)
    }

    /// Iterates over inequality constraints, linear ones first.
    pub fn inequalities(&self) -> impl Iterator<Item = &Counted> {
        self.linear_inequalities
            .iter()
            .chain(&self.nonlinear_inequalities)
    }

    /// Iterates over every constraint with its kind.
    pub fn iter(&self) -> impl Iterator<Item = (ConstraintKind, &Counted)> {
        ConstraintKind::ALL
            .into_iter()
            .flat_map(move |kind| self.group(kind).iter().map(move |f| (kind, f)))
    }

    /// Returns the number of equality constraints.
    #[must_use]
    pub fn num_equalities(&self) -> usize {
        self.linear_equalities.len() + self.nonlinear_equalities.len()
    }

    /// Returns the number of inequality constraints.
    #[must_use]
    pub fn num_inequalities(&self) -> usize {
        self.linear_inequalities.len() + self.nonlinear_inequalities.len()
    }

    /// Returns the total number of constraints.
    #[must_use]
    pub fn len(&self) -> usize {
        self.num_equalities() + self.num_inequalities()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns the summed call counts over every constraint.
    #[must_use]
    pub fn call_counts(&self) -> CallCounts {
        self.iter().map(|(_, f)| f.calls()).sum()
    }

    /// Removes every constraint.
    pub fn clear(&mut self) {
        for kind in ConstraintKind::ALL {
            self.group_mut(kind).clear();
        }
    }
}
