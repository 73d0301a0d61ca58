//! Process CPU and memory sampling via sysinfo (single-PID refresh).

use sysinfo::{Pid, ProcessesToUpdate, System};

/// One sample of the collector process's resource usage
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct CpuSnapshot {
    /// Process CPU usage, normalized to 0..100 across all cores
    pub cpu_percent: f32,
    /// Resident memory in MiB
    pub memory_mb: f64,
}

/// Samples CPU and memory usage for the current process
///
/// Keeps a `sysinfo::System` alive between samples because CPU usage is
/// computed from the delta since the previous refresh; the first sample
/// after construction establishes the baseline and reads as zero.
pub struct CpuMonitor {
    system: System,
    pid: Pid,
    num_cpus: f32,
}

impl Default for CpuMonitor {
    fn default() -> Self {
        Self::new()
    }
}

impl CpuMonitor {
    /// Create a monitor and take the baseline measurement
    pub fn new() -> Self {
        let pid = Pid::from_u32(std::process::id());
        let mut system = System::new();
        system.refresh_processes(ProcessesToUpdate::Some(&[pid]), true);
        system.refresh_memory();
        // sysinfo's cpu_usage() returns 0..num_cpus*100, normalize to 0..100
        let num_cpus = std::thread::available_parallelism()
            .map(|n| n.get() as f32)
            .unwrap_or(1.0);
        Self {
            system,
            pid,
            num_cpus,
        }
    }

    /// Refresh and return the current usage
    pub fn refresh(&mut self) -> CpuSnapshot {
        self.system
            .refresh_processes(ProcessesToUpdate::Some(&[self.pid]), true);
        self.system.refresh_memory();

        self.system
            .process(self.pid)
            .map(|p| CpuSnapshot {
                cpu_percent: p.cpu_usage() / self.num_cpus,
                memory_mb: p.memory() as f64 / (1024.0 * 1024.0),
            })
            .unwrap_or_default()
    }
}
