/// Watches a minimization iterate by iterate.
///
/// A backend hands every accepted iterate `E` to the observer, which may
/// answer with an action `A`. Returning the backend's stop action ends the run
/// at the current iterate; `None` lets the backend continue.
///
/// Closures `FnMut(&E) -> Option<A>` are observers, and `()` is the observer
/// that never intervenes.
pub trait Observer<E, A> {
    fn observe(&mut self, event: &E) -> Option<A>;
}

impl<E, A, F> Observer<E, A> for F
where
    F: FnMut(&E) -> Option<A>,
{
    fn observe(&mut self, event: &E) -> Option<A> {
        self(event)
    }
}

impl<E, A> Observer<E, A> for () {
    fn observe(&mut self, _event: &E) -> Option<A> {
        None
    }
}
