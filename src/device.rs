use std::panic::{self, AssertUnwindSafe};

use burn::backend::ndarray::NdArrayDevice;
use burn::backend::wgpu::WgpuDevice;
use burn::backend::Wgpu;
use burn::prelude::Tensor;
use tracing::{info, warn};

use crate::error::{panic_message, Result, TrainError};

/// Where the compute thread runs its tensors.
#[derive(Debug, Clone)]
pub enum ComputeTarget {
    Accelerator(WgpuDevice),
    Host(NdArrayDevice),
}

impl ComputeTarget {
    /// Prefers a wgpu adapter and falls back to the host backend, logging the
    /// reason once.
    ///
    /// Probing swaps the process-wide panic hook, so call this once at program
    /// startup before any other thread is running.
    pub fn select(prefer_accelerator: bool) -> Self {
        if !prefer_accelerator {
            info!("using host backend");
            return ComputeTarget::Host(NdArrayDevice::Cpu);
        }

        match probe_accelerator() {
            Ok(device) => {
                info!(?device, "using accelerator");
                ComputeTarget::Accelerator(device)
            }
            Err(err) => {
                warn!(%err, "falling back to host backend");
                ComputeTarget::Host(NdArrayDevice::Cpu)
            }
        }
    }

    pub fn is_accelerator(&self) -> bool {
        matches!(self, ComputeTarget::Accelerator(_))
    }
}

/// Runs a tiny round trip on the default adapter. wgpu panics when no adapter
/// exists, so the panic is caught with the hook silenced. The hook is global:
/// only reachable through [`ComputeTarget::select`] on the startup path.
fn probe_accelerator() -> Result<WgpuDevice> {
    let device = WgpuDevice::default();

    let hook = panic::take_hook();
    panic::set_hook(Box::new(|_| {}));
    let probed = panic::catch_unwind(AssertUnwindSafe(|| {
        Tensor::<Wgpu, 1>::ones([1], &device).sum().into_data()
    }));
    panic::set_hook(hook);

    match probed {
        Ok(_) => Ok(device),
        Err(payload) => {
            let reason =
                panic_message(payload.as_ref()).unwrap_or_else(|| "wgpu adapter probe panicked".to_string());

            Err(TrainError::ComputeResourceUnavailable(reason))
        }
    }
}
