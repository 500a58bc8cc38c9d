use std::fmt;
use std::process::{Command, Stdio};
use std::str::FromStr;

use tracing::debug;

use crate::request::DevicePreference;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Device {
    Cpu,
    Gpu,
}

impl Device {
    pub fn as_str(&self) -> &'static str {
        match self {
            Device::Cpu => "cpu",
            Device::Gpu => "cuda",
        }
    }
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct ComputeCapability {
    pub major: u32,
    pub minor: u32,
}

impl ComputeCapability {
    pub const fn new(major: u32, minor: u32) -> Self {
        Self { major, minor }
    }
}

impl fmt::Display for ComputeCapability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)
    }
}

impl FromStr for ComputeCapability {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (major, minor) = s.trim().split_once('.').unwrap_or((s.trim(), "0"));
        let major = major
            .parse()
            .map_err(|_| format!("invalid compute capability: {s}"))?;
        let minor = minor
            .parse()
            .map_err(|_| format!("invalid compute capability: {s}"))?;
        Ok(Self { major, minor })
    }
}

/// Answers the three questions asked before a GPU is used.
pub trait AcceleratorProbe: Send + Sync {
    fn runtime_available(&self) -> bool;
    fn compute_capability(&self) -> Option<ComputeCapability>;
    fn smoke_test(&self) -> Result<(), String>;
}

/// Probe backed by the `nvidia-smi` tool.
#[derive(Debug, Default, Clone)]
pub struct NvidiaSmiProbe;

impl NvidiaSmiProbe {
    fn query(&self, field: &str) -> Option<String> {
        let query = format!("--query-gpu={field}");
        let output = Command::new("nvidia-smi")
            .args([query.as_str(), "--format=csv,noheader,nounits"])
            .stdin(Stdio::null())
            .stderr(Stdio::null())
            .output()
            .ok()?;
        if !output.status.success() {
            return None;
        }
        let stdout = String::from_utf8_lossy(&output.stdout);
        stdout.lines().next().map(|l| l.trim().to_string())
    }
}

impl AcceleratorProbe for NvidiaSmiProbe {
    fn runtime_available(&self) -> bool {
        self.query("name").is_some_and(|name| !name.is_empty())
    }

    fn compute_capability(&self) -> Option<ComputeCapability> {
        self.query("compute_cap")?.parse().ok()
    }

    fn smoke_test(&self) -> Result<(), String> {
        let free = self
            .query("memory.free")
            .ok_or_else(|| "device did not answer a memory query".to_string())?;
        match free.parse::<u64>() {
            Ok(mib) if mib > 0 => Ok(()),
            Ok(_) => Err("device reports no free memory".into()),
            Err(_) => Err(format!("unexpected memory query answer: {free}")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    pub device: Device,
    /// Why the requested device was not granted, if it was not.
    pub diagnostic: Option<String>,
}

pub struct DeviceSelector {
    probe: Box<dyn AcceleratorProbe>,
    min_capability: ComputeCapability,
}

impl fmt::Debug for DeviceSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeviceSelector")
            .field("min_capability", &self.min_capability)
            .finish_non_exhaustive()
    }
}

impl DeviceSelector {
    pub fn new(probe: Box<dyn AcceleratorProbe>, min_capability: ComputeCapability) -> Self {
        Self {
            probe,
            min_capability,
        }
    }

    pub fn resolve(&self, requested: DevicePreference) -> Resolution {
        match requested {
            DevicePreference::Cpu => Resolution {
                device: Device::Cpu,
                diagnostic: None,
            },
            DevicePreference::Gpu => match self.gpu_usable() {
                Ok(()) => Resolution {
                    device: Device::Gpu,
                    diagnostic: None,
                },
                Err(reason) => Resolution {
                    device: Device::Cpu,
                    diagnostic: Some(format!(
                        "GPU requested but unusable ({reason}); falling back to CPU"
                    )),
                },
            },
            DevicePreference::Auto => {
                let usable = self.gpu_usable();
                if let Err(reason) = &usable {
                    debug!("auto device: staying on CPU ({reason})");
                }
                Resolution {
                    device: if usable.is_ok() { Device::Gpu } else { Device::Cpu },
                    diagnostic: None,
                }
            }
        }
    }

    fn gpu_usable(&self) -> Result<(), String> {
        if !self.probe.runtime_available() {
            return Err("no accelerator runtime".into());
        }
        let capability = self
            .probe
            .compute_capability()
            .ok_or_else(|| "compute capability unknown".to_string())?;
        if capability < self.min_capability {
            return Err(format!(
                "compute capability {capability} is below the required {}",
                self.min_capability
            ));
        }
        self.probe.smoke_test()
    }
}
