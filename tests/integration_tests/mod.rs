use fenris_thermal::parallel::{Communicator, ThreadCommunicator};
use std::sync::Arc;

mod distributed;

/// Runs `f` on `size` ranks, each on its own thread, and returns the results ordered by rank.
fn run_on_ranks<R, F>(size: usize, f: F) -> Vec<R>
where
    R: Send,
    F: Fn(Arc<dyn Communicator>) -> R + Sync,
{
    let f = &f;
    std::thread::scope(|scope| {
        let handles: Vec<_> = ThreadCommunicator::world(size)
            .into_iter()
            .map(|communicator| scope.spawn(move || f(Arc::new(communicator))))
            .collect();
        handles
            .into_iter()
            .map(|handle| handle.join().expect("Rank panicked"))
            .collect()
    })
}
