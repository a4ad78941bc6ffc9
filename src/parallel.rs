//! Worker pool configuration
//!
//! The pool is built once and handed to the tuner explicitly, so the worker
//! count is part of a run's configuration rather than process state.

use crate::error::{Result, TuneError};
use rayon::ThreadPool;
use serde::{Deserialize, Serialize};

/// Size of the fold-fitting worker pool
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParallelConfig {
    /// Worker threads; `None` uses every available core
    pub n_threads: Option<usize>,
}

impl ParallelConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_threads(mut self, n_threads: usize) -> Self {
        self.n_threads = Some(n_threads);
        self
    }

    /// Threads the pool will run
    pub fn effective_threads(&self) -> usize {
        match self.n_threads {
            Some(n) => n,
            None => std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1),
        }
    }

    pub fn build_pool(&self) -> Result<ThreadPool> {
        let n_threads = self.effective_threads();
        if n_threads == 0 {
            return Err(TuneError::invalid_param("n_threads", 0, "must be at least 1"));
        }
        rayon::ThreadPoolBuilder::new()
            .num_threads(n_threads)
            .thread_name(|idx| format!("celltune-worker-{}", idx))
            .build()
            .map_err(|e| TuneError::ThreadPoolError(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fixed_pool_size() {
        let pool = ParallelConfig::new().with_threads(2).build_pool().unwrap();
        assert_eq!(pool.current_num_threads(), 2);
    }

    #[test]
    fn test_default_uses_available_cores() {
        assert!(ParallelConfig::default().effective_threads() >= 1);
    }

    #[test]
    fn test_zero_threads_rejected() {
        let err = ParallelConfig::new().with_threads(0).build_pool().unwrap_err();
        assert!(matches!(err, TuneError::InvalidParameter { .. }));
    }
}
