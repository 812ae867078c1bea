// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Process and host resource sampling.

use std::fmt::Debug;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use sysinfo::{DiskExt, Pid, ProcessExt, ProcessRefreshKind, System, SystemExt};
use tick::Clock;

use crate::error::ProbeError;
use crate::record::{DiskUsage, MemoryUsage, SystemSample};

/// Reads raw resource figures from the platform.
///
/// [`SysinfoProbe`] is the production implementation; tests supply their own.
pub trait ResourceProbe: Send + Sync + Debug {
    /// Refreshes the process CPU figures and returns the usage since the
    /// previous call, as a percentage of one core.
    ///
    /// The first call only starts the measurement.
    ///
    /// # Errors
    ///
    /// Returns an error if the figure cannot be read.
    fn cpu_usage(&self) -> Result<f64, ProbeError>;

    /// Number of cores the process may run on.
    fn cpu_count(&self) -> usize;

    /// Current memory figures.
    ///
    /// # Errors
    ///
    /// Returns an error if the figures cannot be read.
    fn memory(&self) -> Result<MemoryUsage, ProbeError>;

    /// Disk figures for the monitored mount, or `None` if unsupported.
    ///
    /// # Errors
    ///
    /// Returns an error if the platform supports disk figures but reading them failed.
    fn disk(&self) -> Result<Option<DiskUsage>, ProbeError>;
}

const PROCESS_CPU: &str = "process cpu";
const MEMORY: &str = "memory";

/// Reads figures for the current process and its host through [`sysinfo`].
///
/// On platforms `sysinfo` does not support every read fails and the sampler
/// produces error-tagged samples.
#[derive(Debug)]
pub struct SysinfoProbe {
    system: Mutex<System>,
    pid: Option<Pid>,
    disk_path: PathBuf,
}

impl Default for SysinfoProbe {
    fn default() -> Self {
        Self {
            system: Mutex::new(System::new()),
            pid: sysinfo::get_current_pid().ok(),
            disk_path: PathBuf::from("/"),
        }
    }
}

impl SysinfoProbe {
    /// Creates a probe for the current process, reporting disk usage for `/`.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Reports disk usage for the filesystem holding `path`.
    #[must_use]
    pub fn with_disk_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.disk_path = path.into();
        self
    }

    fn pid(&self, resource: &'static str) -> Result<Pid, ProbeError> {
        if !System::IS_SUPPORTED {
            return Err(ProbeError::unavailable(resource, "platform not supported"));
        }
        self.pid.ok_or_else(|| ProbeError::unavailable(resource, "unknown process id"))
    }
}

impl ResourceProbe for SysinfoProbe {
    fn cpu_usage(&self) -> Result<f64, ProbeError> {
        let pid = self.pid(PROCESS_CPU)?;
        let mut system = self.system.lock();
        if !system.refresh_process_specifics(pid, ProcessRefreshKind::new().with_cpu()) {
            return Err(ProbeError::unavailable(PROCESS_CPU, "process not found"));
        }
        system
            .process(pid)
            .map(|process| f64::from(process.cpu_usage()))
            .ok_or_else(|| ProbeError::unavailable(PROCESS_CPU, "process not found"))
    }

    fn cpu_count(&self) -> usize {
        std::thread::available_parallelism().map_or(1, std::num::NonZero::get)
    }

    fn memory(&self) -> Result<MemoryUsage, ProbeError> {
        let pid = self.pid(MEMORY)?;
        let mut system = self.system.lock();
        system.refresh_memory();
        // Without the cpu flag the CPU baseline kept for `cpu_usage` is left alone.
        if !system.refresh_process_specifics(pid, ProcessRefreshKind::new()) {
            return Err(ProbeError::unavailable(MEMORY, "process not found"));
        }
        let process = system.process(pid).ok_or_else(|| ProbeError::unavailable(MEMORY, "process not found"))?;

        Ok(MemoryUsage {
            resident_bytes: process.memory(),
            virtual_bytes: process.virtual_memory(),
            system_total_bytes: system.total_memory(),
            system_available_bytes: system.available_memory(),
        })
    }

    fn disk(&self) -> Result<Option<DiskUsage>, ProbeError> {
        let mut system = self.system.lock();
        system.refresh_disks_list();
        system.refresh_disks();

        // The deepest mount point holding the path is the filesystem it lives on.
        Ok(system
            .disks()
            .iter()
            .filter(|disk| self.disk_path.starts_with(disk.mount_point()))
            .max_by_key(|disk| disk.mount_point().as_os_str().len())
            .map(|disk| DiskUsage {
                total_bytes: disk.total_space(),
                available_bytes: disk.available_space(),
            }))
    }
}

/// Collects [`SystemSample`]s from a [`ResourceProbe`].
///
/// CPU usage is measured over a short window: the probe is refreshed before
/// and after waiting on the clock, and the usage it reports for that window is
/// divided by the core count. Failures never propagate; they produce zeroed,
/// error-tagged samples.
#[derive(Debug, Clone)]
pub struct SystemSampler {
    clock: Clock,
    probe: Arc<dyn ResourceProbe>,
    cpu_window: Duration,
}

impl SystemSampler {
    /// Creates a sampler over `probe`.
    #[must_use]
    pub fn new(clock: &Clock, probe: Arc<dyn ResourceProbe>, cpu_window: Duration) -> Self {
        Self {
            clock: clock.clone(),
            probe,
            cpu_window,
        }
    }

    /// Takes one sample. Waits for the CPU window on the clock.
    pub async fn sample(&self) -> SystemSample {
        let cpu = self.cpu_percent().await;
        let memory = self.probe.memory();
        let disk = self.probe.disk();

        let mut errors = Vec::new();
        let cpu_percent = cpu.unwrap_or_else(|e| {
            errors.push(e.to_string());
            0.0
        });
        let memory = memory.unwrap_or_else(|e| {
            errors.push(e.to_string());
            MemoryUsage::default()
        });
        let disk = disk.unwrap_or_else(|e| {
            errors.push(e.to_string());
            None
        });

        let error = if errors.is_empty() {
            None
        } else {
            tracing::warn!(sample.errors = errors.len(), "system.sample_degraded");
            Some(errors.join("; "))
        };

        SystemSample {
            cpu_percent,
            memory,
            disk,
            error,
        }
    }

    async fn cpu_percent(&self) -> Result<f64, ProbeError> {
        self.probe.cpu_usage()?;
        self.clock.delay(self.cpu_window).await;
        let usage = self.probe.cpu_usage()?;

        #[expect(clippy::cast_precision_loss, reason = "core counts are small")]
        let cores = self.probe.cpu_count().max(1) as f64;
        Ok((usage / cores).clamp(0.0, 100.0))
    }
}

#[cfg(test)]
mod tests {
    use tick::ClockControl;

    use super::*;

    #[derive(Debug)]
    struct ScriptedProbe {
        cpu_usage: Mutex<Vec<f64>>,
        cores: usize,
        memory_fails: bool,
    }

    impl ResourceProbe for ScriptedProbe {
        fn cpu_usage(&self) -> Result<f64, ProbeError> {
            let mut usage = self.cpu_usage.lock();
            if usage.is_empty() {
                return Err(ProbeError::unavailable(PROCESS_CPU, "script exhausted"));
            }
            Ok(usage.remove(0))
        }

        fn cpu_count(&self) -> usize {
            self.cores
        }

        fn memory(&self) -> Result<MemoryUsage, ProbeError> {
            if self.memory_fails {
                return Err(ProbeError::unavailable(MEMORY, "unreadable"));
            }
            Ok(MemoryUsage {
                system_total_bytes: 1_000,
                system_available_bytes: 400,
                ..MemoryUsage::default()
            })
        }

        fn disk(&self) -> Result<Option<DiskUsage>, ProbeError> {
            Ok(None)
        }
    }

    fn scripted(cpu_usage: &[f64], cores: usize, memory_fails: bool) -> Arc<dyn ResourceProbe> {
        Arc::new(ScriptedProbe {
            cpu_usage: Mutex::new(cpu_usage.to_vec()),
            cores,
            memory_fails,
        })
    }

    #[test]
    fn cpu_percent_is_normalized_by_cores() {
        let control = ClockControl::new().auto_advance_timers(true);
        let sampler = SystemSampler::new(&control.to_clock(), scripted(&[0.0, 100.0], 2, false), Duration::from_millis(100));

        let sample = futures::executor::block_on(sampler.sample());
        assert!(!sample.is_error());
        assert!((sample.cpu_percent - 50.0).abs() < 1e-6, "got {}", sample.cpu_percent);
        assert!((sample.memory_percent() - 60.0).abs() < 1e-9);
    }

    #[test]
    fn cpu_percent_is_capped() {
        let control = ClockControl::new().auto_advance_timers(true);
        let sampler = SystemSampler::new(&control.to_clock(), scripted(&[0.0, 900.0], 4, false), Duration::from_millis(100));

        let sample = futures::executor::block_on(sampler.sample());
        assert!((sample.cpu_percent - 100.0).abs() < f64::EPSILON);
    }

    #[test]
    fn failures_degrade_to_tagged_sample() {
        let control = ClockControl::new().auto_advance_timers(true);
        let sampler = SystemSampler::new(&control.to_clock(), scripted(&[], 1, true), Duration::from_millis(100));

        let sample = futures::executor::block_on(sampler.sample());
        assert!(sample.is_error());
        assert!(sample.cpu_percent.abs() < f64::EPSILON);
        assert_eq!(sample.memory, MemoryUsage::default());
        let error = sample.error.expect("tagged");
        assert!(error.contains(PROCESS_CPU), "got {error}");
        assert!(error.contains(MEMORY), "got {error}");
    }

    #[test]
    fn sysinfo_probe_reads_live_figures() {
        if !System::IS_SUPPORTED {
            return;
        }
        let probe = SysinfoProbe::new();
        let memory = probe.memory().expect("memory readable");
        assert!(memory.resident_bytes > 0);
        assert!(memory.system_total_bytes >= memory.system_available_bytes);
        assert!(probe.cpu_usage().is_ok_and(|usage| usage >= 0.0));
        assert!(probe.cpu_count() >= 1);
    }

    #[test]
    fn unknown_process_reports_errors() {
        let probe = SysinfoProbe {
            pid: None,
            ..SysinfoProbe::new()
        };
        assert_eq!(probe.memory().expect_err("no pid").resource(), MEMORY);
        assert_eq!(probe.cpu_usage().expect_err("no pid").resource(), PROCESS_CPU);
    }
}
