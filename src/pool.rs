//! The shared worker pool that runs producer executors.

use parking_lot::Mutex;
use std::sync::mpsc::{channel, Receiver, Sender};
use std::sync::{Arc, OnceLock};
use std::thread;

type Job = Box<dyn FnOnce() + Send + 'static>;

struct Pool {
    sender: Mutex<Sender<Job>>,
}

static POOL: OnceLock<Pool> = OnceLock::new();

/// Queues `job` for one of the pool's worker threads. The pool is started
/// lazily on first use and sized by `available_parallelism`.
pub(crate) fn spawn<F>(job: F)
where
    F: FnOnce() + Send + 'static,
{
    let pool = POOL.get_or_init(Pool::start);
    // Workers outlive the process, so the receiving side never disconnects.
    let _ = pool.sender.lock().send(Box::new(job));
}

impl Pool {
    fn start() -> Pool {
        let (sender, receiver) = channel::<Job>();
        let receiver = Arc::new(Mutex::new(receiver));
        // At least two workers, so one blocked executor cannot stall the
        // whole pool.
        let workers = thread::available_parallelism()
            .map(usize::from)
            .unwrap_or(4)
            .max(2);
        for id in 0..workers {
            let receiver = Arc::clone(&receiver);
            thread::Builder::new()
                .name(format!("promise-worker-{id}"))
                .spawn(move || worker_loop(&receiver))
                .expect("failed to spawn promise worker thread");
        }
        Pool {
            sender: Mutex::new(sender),
        }
    }
}

fn worker_loop(receiver: &Mutex<Receiver<Job>>) {
    loop {
        // The lock is released as soon as a job is taken; jobs themselves
        // run unlocked and in parallel across workers.
        let job = receiver.lock().recv();
        match job {
            Ok(job) => job(),
            Err(_) => break,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::mpsc;

    #[test]
    fn jobs_run_and_complete() {
        let counter = Arc::new(AtomicUsize::new(0));
        let (tx, rx) = mpsc::channel();
        for _ in 0..16 {
            let counter = Arc::clone(&counter);
            let tx = tx.clone();
            spawn(move || {
                counter.fetch_add(1, Ordering::SeqCst);
                tx.send(()).unwrap();
            });
        }
        for _ in 0..16 {
            rx.recv_timeout(std::time::Duration::from_secs(5)).unwrap();
        }
        assert_eq!(counter.load(Ordering::SeqCst), 16);
    }

    #[test]
    fn jobs_on_different_workers_run_concurrently() {
        // Two jobs that each wait for the other can only both finish if the
        // pool runs more than one job at a time.
        let (tx_a, rx_a) = mpsc::channel::<()>();
        let (tx_b, rx_b) = mpsc::channel::<()>();
        let (done_tx, done_rx) = mpsc::channel();
        let done_tx2 = done_tx.clone();
        spawn(move || {
            tx_a.send(()).unwrap();
            rx_b.recv().unwrap();
            done_tx.send(()).unwrap();
        });
        spawn(move || {
            rx_a.recv().unwrap();
            tx_b.send(()).unwrap();
            done_tx2.send(()).unwrap();
        });
        for _ in 0..2 {
            done_rx
                .recv_timeout(std::time::Duration::from_secs(5))
                .unwrap();
        }
    }
}
