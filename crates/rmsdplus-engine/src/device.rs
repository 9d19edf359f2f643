use rmsdplus_core::error::{ForceError, ForceResult};

#[cfg(feature = "cuda")]
use rmsdplus_gpu::GpuContext;

#[derive(Clone, Debug)]
pub enum Device {
    Cpu,
    #[cfg(feature = "cuda")]
    Cuda(GpuContext),
}

impl Device {
    pub fn cpu() -> Self {
        Device::Cpu
    }

    /// Parses `cpu`, `auto` or `cuda[:N]`. `auto` falls back to the CPU when
    /// no device can be opened.
    pub fn from_spec(spec: &str) -> ForceResult<Self> {
        let spec = spec.trim();
        if spec.eq_ignore_ascii_case("cpu") {
            return Ok(Device::Cpu);
        }
        if spec.eq_ignore_ascii_case("auto") {
            #[cfg(feature = "cuda")]
            {
                match GpuContext::new(0) {
                    Ok(ctx) => return Ok(Device::Cuda(ctx)),
                    Err(err) => log::info!("auto device: cuda unavailable ({err}), using cpu"),
                }
            }
            return Ok(Device::Cpu);
        }
        if spec.to_ascii_lowercase().starts_with("cuda") {
            let idx = parse_cuda_index(spec)?;
            #[cfg(feature = "cuda")]
            {
                return Ok(Device::Cuda(GpuContext::new(idx)?));
            }
            #[cfg(not(feature = "cuda"))]
            {
                let _ = idx;
                return Err(ForceError::Unsupported(
                    "cuda feature disabled; rebuild with --features cuda".into(),
                ));
            }
        }
        Err(ForceError::Unsupported(format!("unknown device spec '{spec}'")))
    }

    pub fn name(&self) -> String {
        match self {
            Device::Cpu => "cpu".to_string(),
            #[cfg(feature = "cuda")]
            Device::Cuda(ctx) => format!("cuda:{}", ctx.ordinal()),
        }
    }
}

fn parse_cuda_index(spec: &str) -> ForceResult<usize> {
    if let Some((head, tail)) = spec.split_once(':') {
        if !head.eq_ignore_ascii_case("cuda") || tail.contains(':') {
            return Err(ForceError::Parse(format!(
                "invalid cuda device spec '{spec}'"
            )));
        }
        return tail
            .parse()
            .map_err(|_| ForceError::Parse(format!("invalid cuda device spec '{spec}'")));
    }
    if spec.eq_ignore_ascii_case("cuda") {
        return Ok(0);
    }
    Err(ForceError::Parse(format!(
        "invalid cuda device spec '{spec}'"
    )))
}
