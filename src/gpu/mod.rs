pub mod cuda_context;
pub mod device;
pub mod interop;

pub use cuda_context::GpuContext;
pub use device::is_very_old_gpu;
