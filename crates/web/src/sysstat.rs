//! Host resource metrics for the status endpoint.

use serde::{Deserialize, Serialize};
use sysinfo::{Disks, System, MINIMUM_CPU_UPDATE_INTERVAL};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryStats {
    pub total: u64,
    pub available: u64,
    pub percent: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiskStats {
    pub total: u64,
    pub free: u64,
    pub percent: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SystemStats {
    pub cpu_percent: f64,
    pub memory: MemoryStats,
    pub disk: DiskStats,
}

/// Sample CPU, memory, and disk usage.
///
/// CPU usage needs two refreshes separated by the sysinfo minimum interval.
pub async fn sample() -> SystemStats {
    let mut sys = System::new();
    sys.refresh_cpu();
    tokio::time::sleep(MINIMUM_CPU_UPDATE_INTERVAL).await;
    sys.refresh_cpu();
    sys.refresh_memory();

    let cpu_percent = sys.global_cpu_info().cpu_usage() as f64;

    let total = sys.total_memory();
    let available = sys.available_memory();
    let mem_percent = if total > 0 {
        (total.saturating_sub(available)) as f64 / total as f64 * 100.0
    } else {
        0.0
    };

    let disks = Disks::new_with_refreshed_list();
    let root = disks
        .list()
        .iter()
        .find(|d| d.mount_point() == std::path::Path::new("/"))
        .or_else(|| disks.list().first());
    let (disk_total, disk_free) = root
        .map(|d| (d.total_space(), d.available_space()))
        .unwrap_or((0, 0));
    let disk_percent = if disk_total > 0 {
        (disk_total - disk_free) as f64 / disk_total as f64 * 100.0
    } else {
        0.0
    };

    SystemStats {
        cpu_percent,
        memory: MemoryStats {
            total,
            available,
            percent: mem_percent,
        },
        disk: DiskStats {
            total: disk_total,
            free: disk_free,
            percent: disk_percent,
        },
    }
}
