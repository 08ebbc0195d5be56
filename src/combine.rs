//! Fan-in combinators deriving one cell's settlement from many inputs.

use crate::cell::Promise;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

impl<T, E> Promise<T, E>
where
    T: Clone + Send + 'static,
    E: Clone + Send + 'static,
{
    /// Resolves with every input's value, in input order, once all inputs
    /// have resolved; rejects with the first rejection among the inputs.
    /// Later settlements of the remaining inputs are no-ops.
    ///
    /// An empty input list resolves immediately with an empty `Vec`. The
    /// same cell handle may appear more than once; each occurrence is an
    /// independent slot in the output.
    ///
    /// Completion is detected by counting slot fills, so exactly the
    /// transition from n-1 to n filled slots resolves the combined cell,
    /// no matter how the inputs' settlements interleave.
    ///
    /// # Examples
    ///
    /// ```
    /// use promise_cell::Promise;
    /// use futures::executor::block_on;
    ///
    /// let cells = vec![Promise::<i32, String>::resolved(1), Promise::resolved(2)];
    /// assert_eq!(block_on(Promise::all(cells)), Ok(vec![1, 2]));
    /// ```
    pub fn all(cells: Vec<Promise<T, E>>) -> Promise<Vec<T>, E> {
        let total = cells.len();
        if total == 0 {
            return Promise::resolved(Vec::new());
        }
        let combined = Promise::pending();
        let slots: Arc<Mutex<Vec<Option<T>>>> = Arc::new(Mutex::new(vec![None; total]));
        let filled = Arc::new(AtomicUsize::new(0));
        for (index, cell) in cells.iter().enumerate() {
            let on_value_cell = combined.clone();
            let on_error_cell = combined.clone();
            let slots = Arc::clone(&slots);
            let filled = Arc::clone(&filled);
            cell.on_settle(
                move |value| {
                    slots.lock()[index] = Some(value);
                    if filled.fetch_add(1, Ordering::AcqRel) + 1 == total {
                        let values = slots
                            .lock()
                            .iter_mut()
                            .map(|slot| slot.take().expect("every slot filled at completion"))
                            .collect();
                        on_value_cell.complete(Ok(values));
                    }
                },
                move |error| on_error_cell.complete(Err(error)),
            );
        }
        combined
    }

    /// Settles with the outcome of whichever input settles first, value or
    /// error; everything after the first settlement is a no-op.
    ///
    /// An empty input list yields a cell that stays pending forever.
    pub fn race(cells: Vec<Promise<T, E>>) -> Promise<T, E> {
        let combined = Promise::pending();
        for cell in &cells {
            let on_value_cell = combined.clone();
            let on_error_cell = combined.clone();
            cell.on_settle(
                move |value| on_value_cell.complete(Ok(value)),
                move |error| on_error_cell.complete(Err(error)),
            );
        }
        combined
    }
}

#[cfg(test)]
mod tests {
    use crate::{Promise, State};
    use futures::executor::block_on;
    use std::thread;
    use std::time::Duration;

    fn resolve_after(delay_ms: u64, value: i32) -> Promise<i32, String> {
        Promise::new(move |resolver, _rejector| {
            thread::sleep(Duration::from_millis(delay_ms));
            resolver.resolve(value);
        })
    }

    fn reject_after(delay_ms: u64, error: &str) -> Promise<i32, String> {
        let error = error.to_string();
        Promise::new(move |_resolver, rejector| {
            thread::sleep(Duration::from_millis(delay_ms));
            rejector.reject(error);
        })
    }

    #[test]
    fn all_preserves_input_order() {
        let combined = Promise::all(vec![
            resolve_after(60, 1),
            resolve_after(0, 2),
            resolve_after(20, 3),
        ]);
        assert_eq!(block_on(combined), Ok(vec![1, 2, 3]));
    }

    #[test]
    fn all_rejects_with_first_failure() {
        let combined = Promise::all(vec![resolve_after(120, 1), reject_after(20, "bad")]);
        assert_eq!(block_on(combined), Err("bad".to_string()));
    }

    #[test]
    fn all_of_nothing_resolves_immediately() {
        let combined = Promise::<i32, String>::all(Vec::new());
        assert_eq!(combined.state(), State::Resolved);
        assert_eq!(block_on(combined), Ok(Vec::new()));
    }

    #[test]
    fn all_of_settled_inputs_resolves_immediately() {
        let combined = Promise::all(vec![
            Promise::<i32, String>::resolved(1),
            Promise::resolved(2),
            Promise::resolved(3),
        ]);
        assert_eq!(combined.state(), State::Resolved);
        assert_eq!(block_on(combined), Ok(vec![1, 2, 3]));
    }

    #[test]
    fn duplicate_inputs_fill_independent_slots() {
        let cell = Promise::<i32, String>::resolved(7);
        let combined = Promise::all(vec![cell.clone(), cell.clone(), cell]);
        assert_eq!(block_on(combined), Ok(vec![7, 7, 7]));
    }

    #[test]
    fn race_settles_with_fastest() {
        let combined = Promise::race(vec![resolve_after(80, 2), resolve_after(10, 1)]);
        assert_eq!(block_on(combined), Ok(1));
    }

    #[test]
    fn race_adopts_fastest_rejection() {
        let combined = Promise::race(vec![resolve_after(80, 5), reject_after(10, "lost")]);
        assert_eq!(block_on(combined), Err("lost".to_string()));
    }

    #[test]
    fn race_ignores_later_settlements() {
        let combined = Promise::race(vec![resolve_after(10, 1), resolve_after(40, 2)]);
        assert_eq!(block_on(combined.clone()), Ok(1));
        thread::sleep(Duration::from_millis(60));
        assert_eq!(block_on(combined), Ok(1));
    }

    #[test]
    fn race_of_nothing_stays_pending() {
        let combined = Promise::<i32, String>::race(Vec::new());
        thread::sleep(Duration::from_millis(30));
        assert_eq!(combined.state(), State::Pending);
    }
}
