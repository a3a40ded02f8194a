//! Worker loop and per-platform worker initialization.
//!
//! A worker pulls jobs from the pool's shared injector channel and runs them
//! to completion, one at a time. The loop exits when the injector closes,
//! which happens when the last pool handle is dropped. Workers are linked to
//! the lifetime of their owner and cannot be orphaned.
//!
//! ## Interrupt isolation
//! Workers running on dedicated OS threads ([`SpawnMode::Thread`]) mask
//! `SIGINT` in their own signal mask at startup. An interrupt aimed at the
//! parent (Ctrl-C) is then always delivered to a non-worker thread, and the
//! parent keeps explicit control over worker lifecycle instead of losing
//! workers mid-task.
//!
//! [`SpawnMode::Thread`]: crate::SpawnMode::Thread

use super::Job;

/// Runs jobs from the injector until the channel closes.
pub(crate) async fn worker_loop(jobs: async_channel::Receiver<Job>) {
    while let Ok(job) = jobs.recv().await {
        job.run().await;
    }
}

/// Blocks `SIGINT` for the calling worker thread.
///
/// Signal dispositions are process-wide, but delivery targets a thread whose
/// mask allows the signal; masking here keeps interrupt handling on the
/// parent's threads.
#[cfg(unix)]
pub(crate) fn mask_interrupts() {
    unsafe {
        let mut set: libc::sigset_t = std::mem::zeroed();
        libc::sigemptyset(&mut set);
        libc::sigaddset(&mut set, libc::SIGINT);
        libc::pthread_sigmask(libc::SIG_BLOCK, &set, std::ptr::null_mut());
    }
}

/// No per-thread signal masks outside Unix; console events are handled by
/// the runtime on the parent side.
#[cfg(not(unix))]
pub(crate) fn mask_interrupts() {}
