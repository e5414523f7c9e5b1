//! Benchmark / Resource Accounting.
//!
//! The original samples `getrusage`/`GetProcessTimes` directly. `sysinfo`
//! is used here instead — the same substitution `libdd-profiling-replayer`
//! makes for "snapshot this process's resource usage" — which trades exact
//! user/sys time accounting for a portable, safe API; CPU time is derived
//! from the process's reported CPU-usage percentage rather than split
//! user/sys counters, which sysinfo does not expose uniformly across
//! platforms.

use std::time::Instant;

use sysinfo::{PidExt, ProcessExt, SystemExt};

#[derive(Debug, Clone, Copy)]
pub struct BenchmarkTimestamps {
    pub wall_time_us: i64,
    pub cpu_time_us: i64,
}

pub struct ResourceAccounting {
    system: sysinfo::System,
    pid: sysinfo::Pid,
    start: Instant,
    peak_rss_kb: u64,
}

impl ResourceAccounting {
    pub fn new() -> Self {
        let pid = sysinfo::get_current_pid().unwrap_or_else(|_| sysinfo::Pid::from(0));
        let mut system = sysinfo::System::new();
        system.refresh_process(pid);
        Self {
            system,
            pid,
            start: Instant::now(),
            peak_rss_kb: 0,
        }
    }

    /// Refreshes process stats and folds the observed RSS into the running
    /// peak — the `getmaxrss` equivalent.
    pub fn sample(&mut self) {
        self.system.refresh_process(self.pid);
        if let Some(p) = self.system.process(self.pid) {
            self.peak_rss_kb = self.peak_rss_kb.max(p.memory());
        }
    }

    pub fn peak_rss_kb(&self) -> u64 {
        self.peak_rss_kb
    }

    /// `get_benchmark_time_stamps` equivalent.
    pub fn timestamps(&mut self) -> BenchmarkTimestamps {
        self.sample();
        let wall_time_us = self.start.elapsed().as_micros() as i64;
        let cpu_pct = self
            .system
            .process(self.pid)
            .map(|p| p.cpu_usage())
            .unwrap_or(0.0) as f64;
        let cpu_time_us = ((cpu_pct / 100.0) * wall_time_us as f64) as i64;
        BenchmarkTimestamps {
            wall_time_us,
            cpu_time_us,
        }
    }
}

impl Default for ResourceAccounting {
    fn default() -> Self {
        Self::new()
    }
}
