use std::error::Error;
use std::fmt;
use std::io;

/// Error taxonomy per the design's setup/recoverable/fatal split.
///
/// `Setup`, `CodecUnavailable` and `InvalidAudioInput` are the only variants
/// that ever propagate out of initialization; everything else is handled at
/// the point it occurs (logged and either recovered from or folded into a
/// `running := false` transition).
#[derive(Debug)]
pub enum GsrError {
    /// Bad CLI, unreadable window id, GPU unavailable. Exit code 1.
    Setup(String),
    /// Requested codec unsupported by the installed NVENC build. Exit code 2.
    CodecUnavailable(String),
    /// Audio device name does not resolve. Exit code 2.
    InvalidAudioInput(String),
    /// Errors from FFmpeg.
    Ffmpeg(ffmpeg_next::Error),
    /// I/O errors.
    Io(io::Error),
    /// X11 connection / protocol errors.
    X11(String),
    /// CUDA driver API errors.
    Cuda(String),
    /// OpenGL / GLX errors.
    Gl(String),
    /// Other.
    Other(String),
}

impl GsrError {
    /// Process exit code this error maps to, per spec.md section 6.
    pub fn exit_code(&self) -> i32 {
        match self {
            GsrError::CodecUnavailable(_) | GsrError::InvalidAudioInput(_) => 2,
            _ => 1,
        }
    }
}

impl fmt::Display for GsrError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GsrError::Setup(msg) => write!(f, "{msg}"),
            GsrError::CodecUnavailable(msg) => write!(f, "{msg}"),
            GsrError::InvalidAudioInput(msg) => write!(f, "{msg}"),
            GsrError::Ffmpeg(err) => write!(f, "ffmpeg error: {err}"),
            GsrError::Io(err) => write!(f, "I/O error: {err}"),
            GsrError::X11(msg) => write!(f, "X11 error: {msg}"),
            GsrError::Cuda(msg) => write!(f, "CUDA error: {msg}"),
            GsrError::Gl(msg) => write!(f, "GL error: {msg}"),
            GsrError::Other(msg) => write!(f, "{msg}"),
        }
    }
}

impl Error for GsrError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            GsrError::Ffmpeg(err) => Some(err),
            GsrError::Io(err) => Some(err),
            _ => None,
        }
    }
}

impl From<ffmpeg_next::Error> for GsrError {
    fn from(err: ffmpeg_next::Error) -> Self {
        GsrError::Ffmpeg(err)
    }
}

impl From<io::Error> for GsrError {
    fn from(err: io::Error) -> Self {
        GsrError::Io(err)
    }
}

impl From<String> for GsrError {
    fn from(err: String) -> Self {
        GsrError::Other(err)
    }
}

impl From<&str> for GsrError {
    fn from(err: &str) -> Self {
        GsrError::Other(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, GsrError>;
