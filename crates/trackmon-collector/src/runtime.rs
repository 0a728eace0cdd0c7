//! Fixed table of runtime gauges sampled from the host and the current
//! process.
//!
//! The agent samples one [`RuntimeStats`] snapshot per scrape pass and
//! projects every entry of [`RUNTIME_GAUGES`] into a gauge metric.
//! Unsigned fields are widened to `f64` by unsigned cast; float fields are
//! passed through.

use sysinfo::{Pid, System};

/// One snapshot of the host/process counters backing the runtime gauges.
#[derive(Debug, Clone, Copy, Default)]
pub struct RuntimeStats {
    pub uptime: u64,
    pub boot_time: u64,
    pub mem_total: u64,
    pub mem_free: u64,
    pub mem_available: u64,
    pub mem_used: u64,
    pub swap_total: u64,
    pub swap_free: u64,
    pub swap_used: u64,
    pub load_avg1: f64,
    pub load_avg5: f64,
    pub load_avg15: f64,
    pub num_cpus: u64,
    pub global_cpu_usage: f64,
    pub proc_count: u64,
    pub proc_rss: u64,
    pub proc_virtual_memory: u64,
    pub proc_cpu_usage: f64,
    pub proc_run_time: u64,
    pub proc_start_time: u64,
}

/// Extractor over a [`RuntimeStats`] snapshot. The variant records the
/// underlying field kind so widening stays explicit.
#[derive(Clone, Copy)]
pub enum Sample {
    Unsigned(fn(&RuntimeStats) -> u64),
    Float(fn(&RuntimeStats) -> f64),
}

impl Sample {
    /// Gauge value of the field, unsigned fields widened by cast.
    pub fn gauge_value(&self, stats: &RuntimeStats) -> f64 {
        match self {
            Sample::Unsigned(f) => f(stats) as f64,
            Sample::Float(f) => f(stats),
        }
    }

    /// Bare rendering for the URL-style report form: unsigned fields keep
    /// their integer shape.
    pub fn render(&self, stats: &RuntimeStats) -> String {
        match self {
            Sample::Unsigned(f) => format!("{}", f(stats)),
            Sample::Float(f) => format!("{}", f(stats)),
        }
    }
}

pub const RUNTIME_GAUGES: &[(&str, Sample)] = &[
    ("Uptime", Sample::Unsigned(|s| s.uptime)),
    ("BootTime", Sample::Unsigned(|s| s.boot_time)),
    ("MemTotal", Sample::Unsigned(|s| s.mem_total)),
    ("MemFree", Sample::Unsigned(|s| s.mem_free)),
    ("MemAvailable", Sample::Unsigned(|s| s.mem_available)),
    ("MemUsed", Sample::Unsigned(|s| s.mem_used)),
    ("SwapTotal", Sample::Unsigned(|s| s.swap_total)),
    ("SwapFree", Sample::Unsigned(|s| s.swap_free)),
    ("SwapUsed", Sample::Unsigned(|s| s.swap_used)),
    ("LoadAvg1", Sample::Float(|s| s.load_avg1)),
    ("LoadAvg5", Sample::Float(|s| s.load_avg5)),
    ("LoadAvg15", Sample::Float(|s| s.load_avg15)),
    ("NumCpus", Sample::Unsigned(|s| s.num_cpus)),
    ("GlobalCpuUsage", Sample::Float(|s| s.global_cpu_usage)),
    ("ProcCount", Sample::Unsigned(|s| s.proc_count)),
    ("ProcRss", Sample::Unsigned(|s| s.proc_rss)),
    ("ProcVirtualMemory", Sample::Unsigned(|s| s.proc_virtual_memory)),
    ("ProcCpuUsage", Sample::Float(|s| s.proc_cpu_usage)),
    ("ProcRunTime", Sample::Unsigned(|s| s.proc_run_time)),
    ("ProcStartTime", Sample::Unsigned(|s| s.proc_start_time)),
];

/// Owns the `sysinfo` handle and produces [`RuntimeStats`] snapshots.
pub struct RuntimeSampler {
    system: System,
    pid: Option<Pid>,
}

impl RuntimeSampler {
    pub fn new() -> Self {
        Self {
            system: System::new(),
            pid: sysinfo::get_current_pid().ok(),
        }
    }

    pub fn sample(&mut self) -> RuntimeStats {
        self.system.refresh_all();
        let load = System::load_average();
        let mut stats = RuntimeStats {
            uptime: System::uptime(),
            boot_time: System::boot_time(),
            mem_total: self.system.total_memory(),
            mem_free: self.system.free_memory(),
            mem_available: self.system.available_memory(),
            mem_used: self.system.used_memory(),
            swap_total: self.system.total_swap(),
            swap_free: self.system.free_swap(),
            swap_used: self.system.used_swap(),
            load_avg1: load.one,
            load_avg5: load.five,
            load_avg15: load.fifteen,
            num_cpus: self.system.cpus().len() as u64,
            global_cpu_usage: self.system.global_cpu_usage() as f64,
            proc_count: self.system.processes().len() as u64,
            ..Default::default()
        };
        if let Some(proc) = self.pid.and_then(|pid| self.system.process(pid)) {
            stats.proc_rss = proc.memory();
            stats.proc_virtual_memory = proc.virtual_memory();
            stats.proc_cpu_usage = proc.cpu_usage() as f64;
            stats.proc_run_time = proc.run_time();
            stats.proc_start_time = proc.start_time();
        }
        stats
    }
}

impl Default for RuntimeSampler {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn table_names_are_unique() {
        let mut names: Vec<&str> = RUNTIME_GAUGES.iter().map(|(n, _)| *n).collect();
        names.sort_unstable();
        names.dedup();
        assert_eq!(names.len(), RUNTIME_GAUGES.len());
    }

    #[test]
    fn unsigned_fields_widen_by_cast() {
        let stats = RuntimeStats {
            mem_total: u64::MAX,
            ..Default::default()
        };
        let (_, sample) = RUNTIME_GAUGES
            .iter()
            .find(|(n, _)| *n == "MemTotal")
            .unwrap();
        assert_eq!(sample.gauge_value(&stats), u64::MAX as f64);
        assert_eq!(sample.render(&stats), u64::MAX.to_string());
    }

    #[test]
    fn sampler_fills_host_memory() {
        let mut sampler = RuntimeSampler::new();
        let stats = sampler.sample();
        assert!(stats.mem_total > 0);
        assert!(stats.num_cpus > 0);
    }
}
