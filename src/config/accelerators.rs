//! Accelerator discovery.
//!
//! The launcher starts one worker per visible accelerator. Discovery does not
//! talk to any driver: it honours `CUDA_VISIBLE_DEVICES` when set and otherwise
//! counts `/dev/nvidia<N>` device nodes.

use std::path::{Path, PathBuf};

use super::EnvSnapshot;

const CUDA_VISIBLE_DEVICES: &str = "CUDA_VISIBLE_DEVICES";

/// Source of the host's accelerator count.
pub trait AcceleratorCount {
    /// Number of accelerators usable by this launch (may be zero).
    fn count(&self) -> usize;
}

/// Always reports the same count. Used for `--nproc-per-node` and in tests.
#[derive(Clone, Copy, Debug)]
pub struct FixedAccelerators(pub usize);

impl AcceleratorCount for FixedAccelerators {
    fn count(&self) -> usize {
        self.0
    }
}

/// Counts accelerators on the running host.
#[derive(Clone, Debug)]
pub struct SystemAccelerators {
    visible_devices: Option<String>,
    dev_dir: PathBuf,
}

impl SystemAccelerators {
    /// Counter that reads `CUDA_VISIBLE_DEVICES` from `env` and scans `/dev`.
    pub fn new(env: &EnvSnapshot) -> Self {
        Self {
            visible_devices: env
                .contains(CUDA_VISIBLE_DEVICES)
                .then(|| env.get(CUDA_VISIBLE_DEVICES).unwrap_or_default().to_string()),
            dev_dir: PathBuf::from("/dev"),
        }
    }

    /// Overrides the directory scanned for device nodes.
    pub fn with_dev_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.dev_dir = dir.into();
        self
    }
}

impl AcceleratorCount for SystemAccelerators {
    fn count(&self) -> usize {
        match &self.visible_devices {
            Some(list) => count_visible_devices(list),
            None => count_device_nodes(&self.dev_dir),
        }
    }
}

/// Counts entries in a `CUDA_VISIBLE_DEVICES` value.
///
/// Parsing stops at the first `-1`, which hides that device and every one after it.
pub(crate) fn count_visible_devices(list: &str) -> usize {
    list.split(',')
        .map(str::trim)
        .take_while(|d| *d != "-1")
        .filter(|d| !d.is_empty())
        .count()
}

fn count_device_nodes(dir: &Path) -> usize {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return 0;
    };
    entries
        .filter_map(Result::ok)
        .filter(|e| {
            e.file_name()
                .to_str()
                .and_then(|n| n.strip_prefix("nvidia"))
                .is_some_and(|idx| !idx.is_empty() && idx.bytes().all(|b| b.is_ascii_digit()))
        })
        .count()
}
