use std::fmt;
use std::thread;

/// Where the network math runs. Picked once at startup and fixed for the
/// lifetime of the detector.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComputeDevice {
    /// Convolutions fan out over a dedicated rayon pool.
    Parallel { threads: usize },
    /// Everything runs on the calling thread.
    SingleThread,
}

impl ComputeDevice {
    /// Pick a device from the cores the host exposes.
    pub fn detect() -> Self {
        match thread::available_parallelism() {
            Ok(n) if n.get() > 1 => ComputeDevice::Parallel { threads: n.get() },
            _ => ComputeDevice::SingleThread,
        }
    }

    pub(crate) fn build_pool(self) -> Result<rayon::ThreadPool, rayon::ThreadPoolBuildError> {
        let threads = match self {
            ComputeDevice::Parallel { threads } => threads,
            ComputeDevice::SingleThread => 1,
        };
        rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .thread_name(|i| format!("detector-{i}"))
            .build()
    }
}

impl fmt::Display for ComputeDevice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ComputeDevice::Parallel { threads } => write!(f, "parallel({threads})"),
            ComputeDevice::SingleThread => write!(f, "single-thread"),
        }
    }
}
