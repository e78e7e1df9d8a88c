use std::os::raw::c_void;

use cust::sys::{CUarray, CUgraphicsResource, CUresult, CUstream};

use crate::error::{GsrError, Result};

/// Matches ffmpeg's `AVCUDADeviceContext` layout so the raw hw-device
/// pointer handed to ffmpeg can be reinterpreted as our live CUDA context
/// and stream, exactly as `encoders/cuda.rs` does for the Wayland/EGL path.
#[repr(C)]
pub struct AvCudaDeviceContext {
    pub cuda_ctx: cust::sys::CUcontext,
    pub stream: CUstream,
    internal: *mut c_void,
}

extern "C" {
    /// Registers a GL texture for CUDA-GL interop. Not exposed by `cust`
    /// directly (it only binds the portable Driver API), so bound here by
    /// hand the same way the teacher's `encoders/cuda.rs` does, against the
    /// system CUDA driver library `cust` itself links.
    fn cuGraphicsGLRegisterImage(
        resource: *mut CUgraphicsResource,
        image: u32,
        target: u32,
        flags: u32,
    ) -> CUresult;
}

pub const GL_TEXTURE_2D: u32 = 0x0DE1;
/// `CU_GRAPHICS_REGISTER_FLAGS_NONE`
pub const CU_GRAPHICS_REGISTER_FLAGS_NONE: u32 = 0x00;

/// Registers `gl_texture` (a `GL_TEXTURE_2D` name) for CUDA-graphics
/// interop, returning the opaque resource handle used by
/// `map_and_copy_into`.
pub fn register_gl_texture(gl_texture: u32) -> Result<CUgraphicsResource> {
    let mut resource: CUgraphicsResource = std::ptr::null_mut();
    let res = unsafe {
        cuGraphicsGLRegisterImage(
            &mut resource,
            gl_texture,
            GL_TEXTURE_2D,
            CU_GRAPHICS_REGISTER_FLAGS_NONE,
        )
    };
    if res != CUresult::CUDA_SUCCESS {
        return Err(GsrError::Cuda(format!(
            "cuGraphicsGLRegisterImage failed: {res:?}"
        )));
    }
    Ok(resource)
}

pub fn unregister(resource: CUgraphicsResource) {
    unsafe {
        let _ = cust::sys::cuGraphicsUnregisterResource(resource);
    }
}

/// Reads the CUDA device pointer out of a hw frame's `data[0]` slot. For a
/// `AV_PIX_FMT_CUDA` frame this slot holds the device pointer value itself,
/// not frame bytes, mirroring how ffmpeg's own CUDA hwaccel code treats it.
pub fn device_ptr_of(frame: &ffmpeg_next::frame::Video) -> cust::sys::CUdeviceptr {
    unsafe { (*frame.as_ptr()).data[0] as cust::sys::CUdeviceptr }
}

/// Maps `resource`, copies its mapped array into `dest` (a CUDA device
/// pointer, `pitch` bytes per row, `width_bytes x height` pixels) via a
/// device-to-device 2D copy, then unmaps. This is the GPU-to-GPU copy path
/// named in spec.md section 4.1 — never a CPU round trip.
pub fn map_and_copy_into(
    resource: CUgraphicsResource,
    dest: cust::sys::CUdeviceptr,
    dest_pitch: usize,
    width_bytes: usize,
    height: usize,
) -> Result<()> {
    unsafe {
        let mut res_mut = resource;
        let res = cust::sys::cuGraphicsMapResources(1, &mut res_mut, std::ptr::null_mut());
        if res != CUresult::CUDA_SUCCESS {
            return Err(GsrError::Cuda(format!(
                "cuGraphicsMapResources failed: {res:?}"
            )));
        }

        let mut array: CUarray = std::ptr::null_mut();
        let res = cust::sys::cuGraphicsSubResourceGetMappedArray(&mut array, res_mut, 0, 0);
        if res != CUresult::CUDA_SUCCESS {
            let _ = cust::sys::cuGraphicsUnmapResources(1, &mut res_mut, std::ptr::null_mut());
            return Err(GsrError::Cuda(format!(
                "cuGraphicsSubResourceGetMappedArray failed: {res:?}"
            )));
        }

        let copy = cust::sys::CUDA_MEMCPY2D_st {
            srcXInBytes: 0,
            srcY: 0,
            srcMemoryType: cust::sys::CUmemorytype::CU_MEMORYTYPE_ARRAY,
            srcHost: std::ptr::null(),
            srcDevice: 0,
            srcArray: array,
            srcPitch: 0,
            dstXInBytes: 0,
            dstY: 0,
            dstMemoryType: cust::sys::CUmemorytype::CU_MEMORYTYPE_DEVICE,
            dstHost: std::ptr::null_mut(),
            dstDevice: dest,
            dstArray: std::ptr::null_mut(),
            dstPitch: dest_pitch,
            WidthInBytes: width_bytes,
            Height: height,
        };
        let res = cust::sys::cuMemcpy2D_v2(&copy);

        let _ = cust::sys::cuGraphicsUnmapResources(1, &mut res_mut, std::ptr::null_mut());

        if res != CUresult::CUDA_SUCCESS {
            return Err(GsrError::Cuda(format!("cuMemcpy2D_v2 failed: {res:?}")));
        }
    }
    Ok(())
}
