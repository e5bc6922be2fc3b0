//! Fixed-size thread pool and chunked request fan-out.
//!
//! Queries fan per-element work out across a pool created once at startup
//! and sized to hardware concurrency. Submission is fire-and-wait: the
//! dispatcher submits one job per worker, then blocks on every completion
//! handle before assembling the reply, so worker buffers can be concatenated
//! in worker-index order and replies stay byte-identical no matter how the
//! scheduler interleaves the workers. There is no work stealing and no
//! cancellation; a disconnecting client does not stop in-flight work.

use crossbeam_channel::{bounded, unbounded, Receiver, Sender};
use std::thread::JoinHandle;

type Job = Box<dyn FnOnce() + Send + 'static>;

/// Fixed-size OS thread pool.
#[derive(Debug)]
pub struct ThreadPool {
    sender: Option<Sender<Job>>,
    workers: Vec<JoinHandle<()>>,
}

impl ThreadPool {
    /// Creates a pool with `size` workers; `0` means hardware concurrency.
    pub fn new(size: usize) -> Self {
        let size = if size == 0 {
            std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1)
        } else {
            size
        };

        let (sender, receiver) = unbounded::<Job>();
        let workers = (0..size)
            .map(|i| {
                let receiver: Receiver<Job> = receiver.clone();
                std::thread::Builder::new()
                    .name(format!("graphd-fanout-{i}"))
                    .spawn(move || {
                        while let Ok(job) = receiver.recv() {
                            job();
                        }
                    })
                    .expect("failed to spawn fan-out worker")
            })
            .collect();

        Self {
            sender: Some(sender),
            workers,
        }
    }

    /// Number of workers in the pool.
    pub fn size(&self) -> usize {
        self.workers.len()
    }

    /// Submits a job and returns its completion handle.
    fn submit<T: Send + 'static>(
        &self,
        job: impl FnOnce() -> T + Send + 'static,
    ) -> Receiver<T> {
        let (done, handle) = bounded(1);
        let task: Job = Box::new(move || {
            let _ = done.send(job());
        });
        self.sender
            .as_ref()
            .expect("pool is running until drop")
            .send(task)
            .expect("fan-out pool disconnected");
        handle
    }
}

impl Drop for ThreadPool {
    fn drop(&mut self) {
        // Closing the channel drains the queue and stops the workers.
        self.sender.take();
        for worker in self.workers.drain(..) {
            let _ = worker.join();
        }
    }
}

/// Splits `items` into contiguous ranges and runs `work` over them.
///
/// With a pool, the work list is cut into `pool.size()` ranges when `items`
/// covers at least one element per worker, otherwise a single range; the
/// last range absorbs the remainder. Without a pool everything runs on the
/// calling thread. Buffers are returned in worker-index order.
pub fn run_chunked<B, I, F>(pool: Option<&ThreadPool>, items: usize, init: I, work: F) -> Vec<B>
where
    B: Send + 'static,
    I: Fn() -> B + Clone + Send + 'static,
    F: Fn(usize, usize, usize, &mut B) + Clone + Send + 'static,
{
    let concurrency = match pool {
        Some(pool) if items / pool.size().max(1) > 0 => pool.size(),
        _ => 1,
    };

    let per_worker = items / concurrency;
    let range = |worker: usize| {
        let start = worker * per_worker;
        let end = if worker == concurrency - 1 {
            items
        } else {
            start + per_worker
        };
        (start, end)
    };

    match pool {
        None => {
            let mut buffer = init();
            work(0, 0, items, &mut buffer);
            vec![buffer]
        }
        Some(pool) => {
            let handles: Vec<Receiver<B>> = (0..concurrency)
                .map(|worker| {
                    let init = init.clone();
                    let work = work.clone();
                    let (start, end) = range(worker);
                    pool.submit(move || {
                        let mut buffer = init();
                        work(worker, start, end, &mut buffer);
                        buffer
                    })
                })
                .collect();
            handles
                .into_iter()
                .map(|handle| handle.recv().expect("fan-out worker dropped its result"))
                .collect()
        }
    }
}
