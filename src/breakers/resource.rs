use std::path::PathBuf;

/// Source of a host pressure sample for the resource breaker.
pub trait ResourceMonitor: Send + Sync {
    /// Current load, or `None` when no sample is available.
    fn sample(&self) -> Option<f64>;
}

/// Reads the one-minute load average from `/proc/loadavg`.
#[derive(Debug, Clone)]
pub struct LoadAverageMonitor {
    path: PathBuf,
}

impl Default for LoadAverageMonitor {
    fn default() -> Self {
        Self {
            path: PathBuf::from("/proc/loadavg"),
        }
    }
}

impl LoadAverageMonitor {
    pub fn with_path(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl ResourceMonitor for LoadAverageMonitor {
    fn sample(&self) -> Option<f64> {
        let content = match std::fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) => {
                tracing::warn!(path = %self.path.display(), error = %e, "load average unavailable");
                return None;
            }
        };
        let load = content.split_whitespace().next()?.parse::<f64>();
        match load {
            Ok(load) => Some(load),
            Err(e) => {
                tracing::warn!(error = %e, "could not parse load average");
                None
            }
        }
    }
}
