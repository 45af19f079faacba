//! Disk capacity sampling for the monitor's `disk_space` check.

use std::path::{Path, PathBuf};

use arca_core::{CoreError, CoreResult};
use sysinfo::{DiskExt, System, SystemExt};

/// One capacity sample for the filesystem holding backup storage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DiskSample {
    /// Filesystem size in bytes.
    pub total_bytes: u64,
    /// Unused bytes.
    pub available_bytes: u64,
}

impl DiskSample {
    /// Bytes currently in use.
    #[must_use]
    pub const fn used_bytes(&self) -> u64 {
        self.total_bytes.saturating_sub(self.available_bytes)
    }
}

/// Source of disk capacity samples.
pub trait DiskProbe: Send + Sync {
    /// Samples the filesystem backing backup storage.
    ///
    /// # Errors
    ///
    /// Returns an error when no matching filesystem can be found.
    fn sample(&self) -> CoreResult<DiskSample>;
}

/// `sysinfo`-backed probe resolving the disk that holds a given path.
pub struct SystemDiskProbe {
    path: PathBuf,
}

impl SystemDiskProbe {
    /// Probe the filesystem containing `path`.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl DiskProbe for SystemDiskProbe {
    fn sample(&self) -> CoreResult<DiskSample> {
        let mut system = System::new();
        system.refresh_disks_list();

        // Longest mount-point prefix wins (e.g. `/var` over `/`).
        let mut best: Option<(&Path, DiskSample)> = None;
        for disk in system.disks() {
            let mount = disk.mount_point();
            if self.path.starts_with(mount) {
                let deeper = best.map_or(true, |(prev, _)| {
                    mount.components().count() > prev.components().count()
                });
                if deeper {
                    best = Some((
                        mount,
                        DiskSample {
                            total_bytes: disk.total_space(),
                            available_bytes: disk.available_space(),
                        },
                    ));
                }
            }
        }

        best.map(|(_, sample)| sample).ok_or_else(|| {
            CoreError::internal(format!(
                "no filesystem found for path {}",
                self.path.display()
            ))
        })
    }
}

/// Probe returning a fixed sample; used by tests and scenario drills.
#[derive(Debug, Clone, Copy)]
pub struct FixedDiskProbe {
    sample: DiskSample,
}

impl FixedDiskProbe {
    /// Probe that always reports the given totals.
    #[must_use]
    pub const fn new(total_bytes: u64, available_bytes: u64) -> Self {
        Self {
            sample: DiskSample {
                total_bytes,
                available_bytes,
            },
        }
    }
}

impl DiskProbe for FixedDiskProbe {
    fn sample(&self) -> CoreResult<DiskSample> {
        Ok(self.sample)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn used_bytes_never_underflows() {
        let sample = DiskSample {
            total_bytes: 10,
            available_bytes: 30,
        };
        assert_eq!(sample.used_bytes(), 0);
    }

    #[test]
    fn fixed_probe_reports_what_it_was_given() {
        let probe = FixedDiskProbe::new(100 * 1024, 40 * 1024);
        let sample = probe.sample().unwrap();
        assert_eq!(sample.total_bytes, 100 * 1024);
        assert_eq!(sample.available_bytes, 40 * 1024);
        assert_eq!(sample.used_bytes(), 60 * 1024);
    }
}
