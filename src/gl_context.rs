//! A 1x1 invisible GLX window + OpenGL context, used as the render target
//! that owns the GL texture shared with CUDA via `gpu::interop`.
//!
//! `original_source::create_opengl_window` does this with static Xlib/GLX
//! linkage. This crate instead dynamically loads `libGL.so.1` with
//! `libloading`, the same technique the teacher's `waycap_egl.rs` uses to
//! load `libEGL.so.1` — the idiom carries over even though the target
//! library (and windowing system) changes from EGL/Wayland to GLX/X11.

use std::ffi::{c_int, c_void, CString};
use std::os::raw::c_uint;

use libloading::{Library, Symbol};
use x11rb::connection::Connection;
use x11rb::protocol::xproto::{ConnectionExt as _, CreateWindowAux, WindowClass};
use x11rb::rust_connection::RustConnection;

use crate::error::{GsrError, Result};

type XOpenDisplayFn = unsafe extern "C" fn(*const i8) -> *mut c_void;
type GlXChooseVisualFn =
    unsafe extern "C" fn(*mut c_void, c_int, *mut c_int) -> *mut c_void;
type GlXCreateContextFn =
    unsafe extern "C" fn(*mut c_void, *mut c_void, *mut c_void, c_int) -> *mut c_void;
type GlXMakeCurrentFn = unsafe extern "C" fn(*mut c_void, u64, *mut c_void) -> c_int;
type GlXDestroyContextFn = unsafe extern "C" fn(*mut c_void, *mut c_void);
type GlXGetProcAddressFn = unsafe extern "C" fn(*const u8) -> *mut c_void;

const GLX_RGBA: c_int = 4;
const GLX_DEPTH_SIZE: c_int = 12;
const GLX_DOUBLEBUFFER: c_int = 5;

/// Owns the libGL/libX11 dynamic libraries, the 1x1 invisible window and
/// the GLX context bound to it. Dropped leaves-first (context destroyed
/// before the window, window before the display connection), per spec.md
/// section 9's cyclic-handle-graph design note.
pub struct GlContext {
    _libgl: Library,
    xlib_display: *mut c_void,
    glx_context: *mut c_void,
    window: u64,
    conn: RustConnection,
}

unsafe impl Send for GlContext {}

impl GlContext {
    /// `conn` is the X11 protocol connection already used for window
    /// capture; GLX needs its own Xlib `Display*` to the same X server for
    /// context creation, since GLX is a Xlib-era extension.
    pub fn new(conn: RustConnection, screen_num: usize) -> Result<Self> {
        let libgl = unsafe { Library::new("libGL.so.1") }
            .map_err(|e| GsrError::Gl(format!("failed to load libGL.so.1: {e}")))?;
        let libx11 = unsafe { Library::new("libX11.so.6") }
            .map_err(|e| GsrError::Gl(format!("failed to load libX11.so.6: {e}")))?;

        let x_open_display: Symbol<XOpenDisplayFn> = unsafe {
            libx11
                .get(b"XOpenDisplay\0")
                .map_err(|e| GsrError::Gl(format!("XOpenDisplay not found: {e}")))?
        };
        let glx_choose_visual: Symbol<GlXChooseVisualFn> = unsafe {
            libgl
                .get(b"glXChooseVisual\0")
                .map_err(|e| GsrError::Gl(format!("glXChooseVisual not found: {e}")))?
        };
        let glx_create_context: Symbol<GlXCreateContextFn> = unsafe {
            libgl
                .get(b"glXCreateContext\0")
                .map_err(|e| GsrError::Gl(format!("glXCreateContext not found: {e}")))?
        };
        let glx_make_current: Symbol<GlXMakeCurrentFn> = unsafe {
            libgl
                .get(b"glXMakeCurrent\0")
                .map_err(|e| GsrError::Gl(format!("glXMakeCurrent not found: {e}")))?
        };

        let xlib_display = unsafe { x_open_display(std::ptr::null()) };
        if xlib_display.is_null() {
            return Err(GsrError::X11("XOpenDisplay returned NULL".to_string()));
        }

        let mut attribs: [c_int; 7] = [GLX_RGBA, GLX_DEPTH_SIZE, 24, GLX_DOUBLEBUFFER, 0, 0, 0];
        let visual = unsafe { glx_choose_visual(xlib_display, screen_num as c_int, attribs.as_mut_ptr()) };
        if visual.is_null() {
            return Err(GsrError::Gl("glXChooseVisual found no matching visual".to_string()));
        }

        let screen = &conn.setup().roots[screen_num];
        let window = conn.generate_id().map_err(|e| GsrError::X11(e.to_string()))?;
        conn.create_window(
            x11rb::COPY_DEPTH_FROM_PARENT,
            window,
            screen.root,
            0,
            0,
            1,
            1,
            0,
            WindowClass::INPUT_OUTPUT,
            screen.root_visual,
            &CreateWindowAux::new(),
        )
        .map_err(|e| GsrError::X11(e.to_string()))?;
        conn.flush().map_err(|e| GsrError::X11(e.to_string()))?;

        let glx_context =
            unsafe { glx_create_context(xlib_display, visual, std::ptr::null_mut(), 1) };
        if glx_context.is_null() {
            return Err(GsrError::Gl("glXCreateContext failed".to_string()));
        }

        let ok = unsafe { glx_make_current(xlib_display, window, glx_context) };
        if ok == 0 {
            return Err(GsrError::Gl("glXMakeCurrent failed".to_string()));
        }

        // Load the GL function table used for texture upload/clear/copy
        // through this same libGL, so `gl::*` calls resolve correctly.
        let glx_get_proc_address: Symbol<GlXGetProcAddressFn> = unsafe {
            libgl
                .get(b"glXGetProcAddressARB\0")
                .map_err(|e| GsrError::Gl(format!("glXGetProcAddressARB not found: {e}")))?
        };
        gl::load_with(|s| {
            let cstr = CString::new(s).unwrap();
            unsafe { glx_get_proc_address(cstr.as_ptr() as *const u8) as *const c_void }
        });

        Ok(Self {
            _libgl: libgl,
            xlib_display,
            glx_context,
            window,
            conn,
        })
    }

    pub fn connection(&self) -> &RustConnection {
        &self.conn
    }

    pub fn window(&self) -> u64 {
        self.window
    }
}

impl Drop for GlContext {
    fn drop(&mut self) {
        unsafe {
            if let Ok(libgl) = Library::new("libGL.so.1") {
                if let Ok(glx_destroy) = libgl.get::<GlXDestroyContextFn>(b"glXDestroyContext\0") {
                    glx_destroy(self.xlib_display, self.glx_context);
                }
            }
        }
        let _ = self.conn.destroy_window(self.window as c_uint);
        let _ = self.conn.flush();
    }
}
