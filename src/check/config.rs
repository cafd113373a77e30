//! Configuration for index checks.

use serde::{Deserialize, Serialize};

/// Configuration for [`CheckIndex`](crate::check::CheckIndex).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckIndexConfig {
    /// Number of segments verified concurrently.
    /// 1 checks segments one after another on the calling thread.
    pub threads: usize,

    /// Compare every live document's term vectors with the postings of the
    /// same field.
    pub cross_check_term_vectors: bool,

    /// Report progress to stderr, flushing after every line, until another
    /// sink is set.
    pub verbose: bool,
}

impl Default for CheckIndexConfig {
    fn default() -> Self {
        Self {
            threads: 1,
            cross_check_term_vectors: false,
            verbose: false,
        }
    }
}

impl CheckIndexConfig {
    /// Use `threads` workers; 0 means one per CPU core.
    pub fn with_threads(mut self, threads: usize) -> Self {
        self.threads = if threads == 0 { num_cpus::get() } else { threads };
        self
    }

    /// Enable or disable the term vector cross-check.
    pub fn with_cross_check_term_vectors(mut self, enabled: bool) -> Self {
        self.cross_check_term_vectors = enabled;
        self
    }

    /// Enable or disable progress output to stderr.
    pub fn with_verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }
}
