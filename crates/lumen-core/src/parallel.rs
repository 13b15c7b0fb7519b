use crate::comp::Registry;
use crate::json::{self, Json};
use anyhow::Result;
use rayon::prelude::*;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::OnceLock;
use std::time::Instant;

pub const DEFAULT_TYPE: &str = "parallel::rayon";

pub type ProcessFn<'a> = dyn Fn(u64, usize) + Sync + 'a;

pub trait ParallelContext: Send + Sync {
    fn construct(&mut self, prop: &Json) -> Result<()>;

    fn num_threads(&self) -> usize;

    /// Calls `process(index, thread_id)` once for every index in
    /// `0..num_samples` and returns when all calls have finished.
    fn foreach(&self, num_samples: u64, process: &ProcessFn<'_>);
}

pub fn register(registry: &mut Registry) {
    registry.register::<dyn ParallelContext, _>(DEFAULT_TYPE, || {
        Box::new(RayonContext::default())
    });
    // Scripts written against the OpenMP backend keep working.
    registry.register::<dyn ParallelContext, _>("parallel::openmp", || {
        Box::new(RayonContext::default())
    });
}

/// Resolves the `numThreads` hint. Positive values are taken as is; zero or
/// negative values count back from the number of cores, so `-1` means every
/// core and `-2` leaves one free.
pub fn resolve_num_threads(hint: i64, available: usize) -> usize {
    let resolved = if hint > 0 {
        hint
    } else {
        available as i64 + hint.min(-1) + 1
    };
    resolved.max(1) as usize
}

/// The worker pool is built on the first `foreach`, so a context that is
/// replaced before anything runs never spawns threads.
#[derive(Default)]
pub struct RayonContext {
    pool: OnceLock<Option<rayon::ThreadPool>>,
    num_threads: usize,
    progress_interval: u64,
}

impl ParallelContext for RayonContext {
    fn construct(&mut self, prop: &Json) -> Result<()> {
        let hint: i64 = json::value_or(prop, "numThreads", -1)?;
        let available = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1);
        self.num_threads = resolve_num_threads(hint, available);
        self.progress_interval = json::value_or(prop, "progress_interval", 10u64)?;
        self.pool = OnceLock::new();
        log::info!("Parallel context: {} threads", self.num_threads);
        Ok(())
    }

    fn num_threads(&self) -> usize {
        self.num_threads
    }

    fn foreach(&self, num_samples: u64, process: &ProcessFn<'_>) {
        let start = Instant::now();
        let counter = AtomicU64::new(0);
        let step = (num_samples * self.progress_interval.clamp(1, 100) / 100).max(1);
        let report = self.progress_interval > 0;

        let run = || {
            (0..num_samples).into_par_iter().for_each(|index| {
                process(index, rayon::current_thread_index().unwrap_or(0));

                if report {
                    let done = counter.fetch_add(1, Ordering::Relaxed) + 1;
                    if done == num_samples || done % step == 0 {
                        let elapsed = start.elapsed().as_secs_f64();
                        let percent = (done as f64 / num_samples as f64) * 100.0;
                        log::debug!(
                            "progress: {}/{} ({:.1}%) elapsed {:.2}s",
                            done,
                            num_samples,
                            percent,
                            elapsed
                        );
                    }
                }
            })
        };

        match self.pool() {
            Some(pool) => pool.install(run),
            None => run(),
        }
    }
}

impl RayonContext {
    fn pool(&self) -> Option<&rayon::ThreadPool> {
        self.pool
            .get_or_init(|| {
                rayon::ThreadPoolBuilder::new()
                    .num_threads(self.num_threads.max(1))
                    .thread_name(|i| format!("lumen-worker-{i}"))
                    .build()
                    .map_err(|err| log::warn!("failed to build thread pool, using the global one: {err}"))
                    .ok()
            })
            .as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::Mutex;

    #[test]
    fn negative_hint_counts_back_from_cores() {
        assert_eq!(resolve_num_threads(-1, 8), 8);
        assert_eq!(resolve_num_threads(-2, 8), 7);
        assert_eq!(resolve_num_threads(0, 8), 8);
        assert_eq!(resolve_num_threads(3, 8), 3);
        assert_eq!(resolve_num_threads(-20, 8), 1);
    }

    #[test]
    fn foreach_visits_every_index_once() {
        let mut context = RayonContext::default();
        context.construct(&json!({"numThreads": 3})).unwrap();
        assert_eq!(context.num_threads(), 3);

        let seen = Mutex::new(vec![0u32; 1000]);
        context.foreach(1000, &|index, thread_id| {
            assert!(thread_id < 3);
            seen.lock().unwrap()[index as usize] += 1;
        });
        assert!(seen.into_inner().unwrap().iter().all(|&n| n == 1));
    }

    #[test]
    fn pool_is_built_on_first_use() {
        let mut context = RayonContext::default();
        context.construct(&json!({"numThreads": 2})).unwrap();
        assert!(context.pool.get().is_none());
        context.foreach(4, &|_, _| {});
        assert_eq!(context.pool.get().unwrap().as_ref().unwrap().current_num_threads(), 2);
    }

    #[test]
    fn foreach_with_zero_samples_returns() {
        let mut context = RayonContext::default();
        context.construct(&json!({"numThreads": 1})).unwrap();
        context.foreach(0, &|_, _| panic!("no samples"));
    }
}
