#[cfg(feature = "cuda")]
mod cuda;

#[cfg(feature = "cuda")]
pub use cuda::*;

#[cfg(not(feature = "cuda"))]
use rmsdplus_core::error::{ForceError, ForceResult};

#[cfg(not(feature = "cuda"))]
#[derive(Clone, Debug)]
pub struct GpuContext;

#[cfg(not(feature = "cuda"))]
impl GpuContext {
    pub fn new(_device: usize) -> ForceResult<Self> {
        Err(ForceError::Unsupported(
            "cuda feature disabled; rebuild with --features cuda".into(),
        ))
    }
}

#[cfg(all(test, not(feature = "cuda")))]
mod tests {
    use super::*;

    #[test]
    fn stub_context_reports_unsupported() {
        assert!(matches!(GpuContext::new(0), Err(ForceError::Unsupported(_))));
    }
}
