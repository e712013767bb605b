//! Shared test problems for exercising optimizer backends end to end.

pub mod problems;

use crease_solvers::{Backend, BackendKind};

/// Builds a fresh backend for one run.
pub type BackendFactory<'a> = &'a dyn Fn() -> Box<dyn Backend>;

/// Calls `test` once per available backend.
pub fn for_each_backend(test: impl Fn(BackendKind, BackendFactory<'_>)) {
    for kind in BackendKind::ALL {
        test(kind, &|| kind.build());
    }
}
