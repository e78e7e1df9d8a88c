use cust::context::{Context, ContextFlags};
use cust::device::Device;
use ffmpeg_next::ffi;

use crate::error::{GsrError, Result};

/// Owns the single CUDA context created on device 0 with automatic
/// scheduling, for the lifetime of the process (spec.md section 2/5: "CUDA
/// context: main only, pushed/popped around interop calls"). Mirrors
/// `NvencEncoder::new`'s `cust::quick_init()` call, but explicit about the
/// scheduling flag the way `original_source`'s `cuCtxCreate_v2(...,
/// CU_CTX_SCHED_AUTO, ...)` is.
pub struct GpuContext {
    pub cuda_ctx: Context,
}

impl GpuContext {
    pub fn new() -> Result<Self> {
        cust::init(cust::CudaFlags::empty())
            .map_err(|e| GsrError::Cuda(format!("cuInit failed: {e}")))?;

        let device_count = Device::num_devices()
            .map_err(|e| GsrError::Cuda(format!("failed to query CUDA device count: {e}")))?;
        if device_count == 0 {
            return Err(GsrError::Setup(
                "no NVIDIA GPU found (CUDA device count is 0)".to_string(),
            ));
        }

        let device = Device::get_device(0)
            .map_err(|e| GsrError::Cuda(format!("failed to open CUDA device 0: {e}")))?;

        let cuda_ctx = Context::new(device)
            .map_err(|e| GsrError::Cuda(format!("failed to create CUDA context: {e}")))?;
        cuda_ctx
            .set_flags(ContextFlags::SCHED_AUTO)
            .map_err(|e| GsrError::Cuda(format!("failed to set CUDA scheduling flag: {e}")))?;

        Ok(Self { cuda_ctx })
    }

    /// GL_RENDERER-derived GPU model string, used for the
    /// `gpu::device::is_very_old_gpu` heuristic. CUDA device name is a
    /// reasonable stand-in for the GL_RENDERER string in most NVIDIA
    /// driver stacks (both surface the marketing model name).
    pub fn device_name(&self) -> Result<String> {
        Device::get_device(0)
            .and_then(|d| d.name())
            .map_err(|e| GsrError::Cuda(format!("failed to query CUDA device name: {e}")))
    }

    /// Allocates and opens a CUDA hw-device context ffmpeg can drive,
    /// wrapping `self.cuda_ctx`. Mirrors `NvencEncoder::create_encoder`'s
    /// `av_hwdevice_ctx_alloc(AV_HWDEVICE_TYPE_CUDA)` + `cuda_ctx` field
    /// assignment + `av_hwdevice_ctx_init`.
    pub fn create_hw_device_ctx(&self) -> Result<*mut ffi::AVBufferRef> {
        unsafe {
            let device_ctx_ref = ffi::av_hwdevice_ctx_alloc(ffi::AVHWDeviceType::AV_HWDEVICE_TYPE_CUDA);
            if device_ctx_ref.is_null() {
                return Err(GsrError::Cuda("av_hwdevice_ctx_alloc failed".to_string()));
            }

            let device_ctx = (*device_ctx_ref).data as *mut ffi::AVHWDeviceContext;
            let cuda_device_ctx = (*device_ctx).hwctx as *mut AvCudaHwDeviceContext;
            (*cuda_device_ctx).cuda_ctx = self.cuda_ctx.get_unowned().as_raw() as *mut std::ffi::c_void;

            let ret = ffi::av_hwdevice_ctx_init(device_ctx_ref);
            if ret < 0 {
                ffi::av_buffer_unref(&mut { device_ctx_ref } as *mut _);
                return Err(GsrError::Cuda(format!(
                    "av_hwdevice_ctx_init failed (ret={ret})"
                )));
            }

            Ok(device_ctx_ref)
        }
    }
}

/// Matches ffmpeg's `AVCUDADeviceContext` layout (see also
/// `gpu::interop::AvCudaDeviceContext`, used for the stream-carrying half
/// of this same struct during interop calls).
#[repr(C)]
struct AvCudaHwDeviceContext {
    cuda_ctx: *mut std::ffi::c_void,
    stream: *mut std::ffi::c_void,
    internal: *mut std::ffi::c_void,
}

/// Allocates and initializes a hw-frame pool with the encoder's dimensions,
/// CUDA-surface format, software format 32-bit RGB (`0RGB32`), mirroring
/// `NvencEncoder::create_hw_frame_ctx`.
pub unsafe fn create_hw_frame_ctx(
    device_ctx_ref: *mut ffi::AVBufferRef,
    width: u32,
    height: u32,
) -> Result<*mut ffi::AVBufferRef> {
    let frames_ref = ffi::av_hwframe_ctx_alloc(device_ctx_ref);
    if frames_ref.is_null() {
        return Err(GsrError::Cuda("av_hwframe_ctx_alloc failed".to_string()));
    }

    let frames_ctx = (*frames_ref).data as *mut ffi::AVHWFramesContext;
    (*frames_ctx).format = ffi::AV_PIX_FMT_CUDA;
    (*frames_ctx).sw_format = ffi::AV_PIX_FMT_0RGB32;
    (*frames_ctx).width = width as i32;
    (*frames_ctx).height = height as i32;
    (*frames_ctx).initial_pool_size = 2;

    let ret = ffi::av_hwframe_ctx_init(frames_ref);
    if ret < 0 {
        ffi::av_buffer_unref(&mut { frames_ref } as *mut _);
        return Err(GsrError::Cuda(format!(
            "av_hwframe_ctx_init failed (ret={ret})"
        )));
    }

    Ok(frames_ref)
}

/// Pulls one frame from the hw-frame pool (`av_hwframe_get_buffer`) so its
/// `data[0]` carries a real CUDA device pointer the capture back-ends can
/// write into. Allocated once per bound capture source and reused across
/// ticks (see `types::frame::Frame`'s doc comment).
pub unsafe fn alloc_hw_frame(
    frames_ref: *mut ffi::AVBufferRef,
    width: u32,
    height: u32,
) -> Result<ffmpeg_next::frame::Video> {
    let mut frame = ffmpeg_next::frame::Video::empty();
    let ret = ffi::av_hwframe_get_buffer(frames_ref, frame.as_mut_ptr(), 0);
    if ret < 0 {
        return Err(GsrError::Cuda(format!(
            "av_hwframe_get_buffer failed (ret={ret})"
        )));
    }
    (*frame.as_mut_ptr()).width = width as i32;
    (*frame.as_mut_ptr()).height = height as i32;
    Ok(frame)
}
