// src/utils/progress.rs
// Progress bar gating, environment-driven.

use indicatif::MultiProgress;
use std::env;

#[derive(Debug, Clone)]
pub struct ProgressConfig {
    pub enabled: bool,
}

impl ProgressConfig {
    /// `DEDUPE_PROGRESS=false` disables bars (useful under CI logs).
    pub fn from_env() -> Self {
        let enabled = env::var("DEDUPE_PROGRESS")
            .unwrap_or_else(|_| "true".to_string())
            .parse::<bool>()
            .unwrap_or(true);
        Self { enabled }
    }

    pub fn create_multi_progress(&self) -> Option<MultiProgress> {
        if self.enabled {
            Some(MultiProgress::new())
        } else {
            None
        }
    }
}
