//! Parsed option surface consumed by the core.
//!
//! Parsing itself is `transcoder-cli`'s job; this is just the landing
//! struct the scheduler reads from.

use std::collections::HashMap;

use crate::error::CoreError;

#[derive(Debug, Clone)]
pub struct Config {
    pub copyts: bool,
    pub start_at_zero: bool,
    pub stats_period_us: i64,
    pub benchmark: bool,
    pub benchmark_all: bool,
    pub max_error_rate: f64,
    pub progress_sink: Option<String>,
    /// Escalates any warning-level condition to a fatal exit.
    pub xerror: bool,
    pub loglevel: i32,
    pub interactive: bool,
    /// Per-stream option keys the caller set but that nothing ever
    /// consumed, tracked so [`Config::assert_no_leftover_options`] can fail
    /// loudly (`assert_avoptions` in the original).
    unconsumed_options: HashMap<String, String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            copyts: false,
            start_at_zero: false,
            stats_period_us: 500_000,
            benchmark: false,
            benchmark_all: false,
            max_error_rate: 2.0 / 3.0,
            progress_sink: None,
            xerror: false,
            loglevel: 0,
            interactive: true,
            unconsumed_options: HashMap::new(),
        }
    }
}

impl Config {
    pub fn set_option(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.unconsumed_options.insert(key.into(), value.into());
    }

    /// Marks an option as consumed (`remove_avoptions`); called by whatever
    /// collaborator setup step actually used it.
    pub fn mark_consumed(&mut self, key: &str) {
        self.unconsumed_options.remove(key);
    }

    /// Fails loudly if any option was set but never consumed by setup,
    /// surfaced before the main loop ever starts.
    pub fn assert_no_leftover_options(&self) -> Result<(), CoreError> {
        if self.unconsumed_options.is_empty() {
            return Ok(());
        }
        let mut keys: Vec<&str> = self.unconsumed_options.keys().map(String::as_str).collect();
        keys.sort_unstable();
        Err(CoreError::Configuration(format!(
            "unrecognized option(s): {}",
            keys.join(", ")
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn leftover_option_is_a_configuration_failure() {
        let mut c = Config::default();
        c.set_option("foo", "bar");
        assert!(c.assert_no_leftover_options().is_err());
        c.mark_consumed("foo");
        assert!(c.assert_no_leftover_options().is_ok());
    }

    #[test]
    fn no_options_set_passes_by_default() {
        assert!(Config::default().assert_no_leftover_options().is_ok());
    }
}
