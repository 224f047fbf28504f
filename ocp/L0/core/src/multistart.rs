//! Independent starts of the same problem, one per seed.
//!
//! Each start builds its own program (and so its own model instance), so
//! starts never share mutable state. With the `parallel` feature the starts
//! run on the rayon pool; otherwise they run in seed order. Results are
//! returned in seed order either way.

use ocp_types::{OcpError, Result};
use tracing::{debug, warn};

/// Outcome of one start.
#[derive(Debug, Clone, PartialEq)]
pub struct StartResult<T> {
    /// Seed the start was built with.
    pub seed: u64,
    /// What the solve step returned.
    pub output: Result<T>,
}

impl<T> StartResult<T> {
    /// Whether the start succeeded.
    #[must_use]
    pub fn is_ok(&self) -> bool {
        self.output.is_ok()
    }
}

/// A list of seeds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MultiStart {
    seeds: Vec<u64>,
}

impl MultiStart {
    /// Starts for `seeds`. Seeds must be distinct.
    pub fn new(seeds: Vec<u64>) -> Result<Self> {
        if seeds.is_empty() {
            return Err(OcpError::invalid_config("multi-start needs at least one seed"));
        }
        for (i, seed) in seeds.iter().enumerate() {
            if seeds[..i].contains(seed) {
                return Err(OcpError::invalid_config(format!("seed {seed} given twice")));
            }
        }
        Ok(Self { seeds })
    }

    /// Seeds `0..n`.
    pub fn range(n: u64) -> Result<Self> {
        Self::new((0..n).collect())
    }

    /// Seeds in run order.
    #[must_use]
    pub fn seeds(&self) -> &[u64] {
        &self.seeds
    }

    /// Number of starts.
    #[must_use]
    pub fn len(&self) -> usize {
        self.seeds.len()
    }

    /// Always false, a multi-start has at least one seed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.seeds.is_empty()
    }

    /// Build one problem per seed with `build`, then hand it to `solve`.
    pub fn run<P, T, B, S>(&self, build: B, solve: S) -> Vec<StartResult<T>>
    where
        B: Fn(u64) -> Result<P> + Sync,
        S: Fn(&mut P, u64) -> Result<T> + Sync,
        T: Send,
    {
        let start = |seed: u64| {
            let output = build(seed).and_then(|mut problem| solve(&mut problem, seed));
            if let Err(e) = &output {
                warn!(seed, error = %e, "start failed");
            }
            StartResult { seed, output }
        };

        debug!(starts = self.seeds.len(), "multi-start");

        #[cfg(feature = "parallel")]
        {
            use rayon::iter::{IntoParallelRefIterator, ParallelIterator};
            self.seeds.par_iter().map(|&seed| start(seed)).collect()
        }

        #[cfg(not(feature = "parallel"))]
        {
            self.seeds.iter().map(|&seed| start(seed)).collect()
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::float_cmp)]
mod tests {
    use super::*;

    #[test]
    fn test_results_in_seed_order() {
        let starts = MultiStart::new(vec![3, 1, 2]).unwrap();
        let results = starts.run(|seed| Ok(seed * 10), |p: &mut u64, seed| Ok(*p + seed));
        let seeds: Vec<u64> = results.iter().map(|r| r.seed).collect();
        assert_eq!(seeds, vec![3, 1, 2]);
        assert_eq!(results[0].output.as_ref().unwrap(), &33);
    }

    #[test]
    fn test_failed_build_is_reported_per_start() {
        let starts = MultiStart::range(3).unwrap();
        let results = starts.run(
            |seed| {
                if seed == 1 {
                    Err(OcpError::invalid_config("bad seed"))
                } else {
                    Ok(seed)
                }
            },
            |p: &mut u64, _| Ok(*p),
        );
        assert!(results[0].is_ok());
        assert!(!results[1].is_ok());
        assert!(results[2].is_ok());
    }

    #[test]
    fn test_seeds_validated() {
        assert!(MultiStart::new(vec![]).is_err());
        assert!(MultiStart::new(vec![1, 1]).is_err());
    }
}
