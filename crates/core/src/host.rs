//! Host capability and process memory probes

use std::sync::atomic::{AtomicU64, Ordering};

/// Source of host hints for quality detection and memory pressure
pub trait HostProbe: Send + Sync {
    /// Installed physical memory
    fn physical_memory_bytes(&self) -> Option<u64>;

    /// Resident set size of this process
    fn resident_bytes(&self) -> Option<u64>;

    fn logical_cores(&self) -> Option<usize>;

    /// Ask the allocator to hand freed pages back to the OS.
    /// Returns `true` if anything was attempted.
    fn trim_allocator(&self) -> bool {
        false
    }
}

/// Reads the running system
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemProbe;

impl HostProbe for SystemProbe {
    fn physical_memory_bytes(&self) -> Option<u64> {
        physical_ram_bytes()
    }

    fn resident_bytes(&self) -> Option<u64> {
        current_rss_bytes()
    }

    fn logical_cores(&self) -> Option<usize> {
        std::thread::available_parallelism().ok().map(|n| n.get())
    }

    fn trim_allocator(&self) -> bool {
        trim_allocator()
    }
}

/// Fixed answers, with an adjustable resident size
#[derive(Debug, Default)]
pub struct StaticProbe {
    physical: Option<u64>,
    cores: Option<usize>,
    resident: AtomicU64,
    trims: AtomicU64,
}

impl StaticProbe {
    pub fn new(physical: Option<u64>, cores: Option<usize>) -> Self {
        Self {
            physical,
            cores,
            ..Default::default()
        }
    }

    pub fn set_resident(&self, bytes: u64) {
        self.resident.store(bytes, Ordering::Relaxed);
    }

    /// Number of allocator trims requested
    pub fn trims(&self) -> u64 {
        self.trims.load(Ordering::Relaxed)
    }
}

impl HostProbe for StaticProbe {
    fn physical_memory_bytes(&self) -> Option<u64> {
        self.physical
    }

    fn resident_bytes(&self) -> Option<u64> {
        Some(self.resident.load(Ordering::Relaxed))
    }

    fn logical_cores(&self) -> Option<usize> {
        self.cores
    }

    fn trim_allocator(&self) -> bool {
        self.trims.fetch_add(1, Ordering::Relaxed);
        true
    }
}

#[cfg(any(target_os = "macos", target_os = "linux"))]
fn sysconf(name: libc::c_int) -> Option<u64> {
    let value = unsafe { libc::sysconf(name) };
    u64::try_from(value).ok().filter(|&v| v > 0)
}

#[cfg(any(target_os = "macos", target_os = "linux"))]
fn physical_ram_bytes() -> Option<u64> {
    let pages = sysconf(libc::_SC_PHYS_PAGES)?;
    Some(pages.saturating_mul(sysconf(libc::_SC_PAGESIZE)?))
}

#[cfg(target_os = "linux")]
fn current_rss_bytes() -> Option<u64> {
    // statm: size resident shared text lib data dt, all in pages
    let statm = std::fs::read_to_string("/proc/self/statm").ok()?;
    let pages: u64 = statm.split_whitespace().nth(1)?.parse().ok()?;
    Some(pages.saturating_mul(sysconf(libc::_SC_PAGESIZE)?))
}

#[cfg(target_os = "macos")]
fn current_rss_bytes() -> Option<u64> {
    let mut info = std::mem::MaybeUninit::<libc::mach_task_basic_info>::zeroed();
    let mut count = libc::MACH_TASK_BASIC_INFO_COUNT;
    #[allow(deprecated)]
    let kr = unsafe {
        libc::task_info(
            libc::mach_task_self(),
            libc::MACH_TASK_BASIC_INFO,
            info.as_mut_ptr().cast(),
            &mut count,
        )
    };
    (kr == libc::KERN_SUCCESS).then(|| unsafe { info.assume_init() }.resident_size)
}

#[cfg(not(any(target_os = "macos", target_os = "linux")))]
fn physical_ram_bytes() -> Option<u64> {
    None
}

#[cfg(not(any(target_os = "macos", target_os = "linux")))]
fn current_rss_bytes() -> Option<u64> {
    None
}

#[cfg(all(target_os = "linux", target_env = "gnu"))]
fn trim_allocator() -> bool {
    unsafe { libc::malloc_trim(0) };
    true
}

#[cfg(not(all(target_os = "linux", target_env = "gnu")))]
fn trim_allocator() -> bool {
    false
}
