#[cfg(test)]
mod tests {
    use futures::executor::block_on;
    use promise_cell::{Promise, State};
    use std::sync::{Arc, Mutex};
    use std::{thread, time::Duration};

    #[test]
    fn producer_on_worker_pool_settles_consumer() {
        let cell: Promise<i32, String> = Promise::new(|resolver, _rejector| {
            thread::sleep(Duration::from_millis(50));
            resolver.resolve(42);
        });
        assert_eq!(cell.state(), State::Pending);
        let settled = Promise::mirror(&cell);
        assert_eq!(settled.state(), State::Resolved);
        assert_eq!(block_on(settled), Ok(42));
    }

    #[test]
    fn pipeline_observes_and_propagates_failure() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let log = Arc::clone(&seen);
        let cell: Promise<i32, String> = Promise::new(|_resolver, rejector| {
            thread::sleep(Duration::from_millis(10));
            rejector.reject("upstream offline".into());
        });
        let tail = cell
            .then(|n| n * 10)
            .catch_error(move |e| log.lock().unwrap().push(e));
        assert_eq!(block_on(tail), Err("upstream offline".to_string()));
        assert_eq!(seen.lock().unwrap().as_slice(), ["upstream offline"]);
    }

    #[test]
    fn combinators_compose_with_chaining() {
        let parts = vec![
            Promise::<i32, String>::new(|resolver, _rejector| {
                thread::sleep(Duration::from_millis(30));
                resolver.resolve(1);
            }),
            Promise::resolved(2),
        ];
        let sum = Promise::all(parts).then(|values| values.iter().sum::<i32>());
        assert_eq!(block_on(sum), Ok(3));
    }
}
