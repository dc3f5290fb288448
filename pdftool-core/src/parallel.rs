//! Page-level fan-out over scoped worker threads.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc;
use std::thread;

/// Upper bound on workers when the caller does not choose.
const MAX_DEFAULT_WORKERS: usize = 8;

pub fn default_parallelism() -> usize {
    num_cpus::get().clamp(1, MAX_DEFAULT_WORKERS)
}

/// Applies `work` to every item on up to `threads` workers and returns the
/// results in input order.
pub fn map_ordered<I, T, F>(items: &[I], threads: Option<usize>, work: F) -> Vec<T>
where
    I: Sync,
    T: Send,
    F: Fn(&I) -> T + Sync,
{
    let workers = threads
        .unwrap_or_else(default_parallelism)
        .clamp(1, items.len().max(1));
    if workers == 1 {
        return items.iter().map(&work).collect();
    }

    let next = AtomicUsize::new(0);
    let (sender, receiver) = mpsc::channel();
    thread::scope(|scope| {
        for _ in 0..workers {
            let sender = sender.clone();
            let next = &next;
            let work = &work;
            scope.spawn(move || loop {
                let index = next.fetch_add(1, Ordering::Relaxed);
                let Some(item) = items.get(index) else {
                    break;
                };
                if sender.send((index, work(item))).is_err() {
                    break;
                }
            });
        }
    });
    drop(sender);

    let mut indexed: Vec<(usize, T)> = receiver.into_iter().collect();
    indexed.sort_by_key(|(index, _)| *index);
    indexed.into_iter().map(|(_, result)| result).collect()
}
