pub mod display;
pub mod window;

use crate::error::Result;
use crate::types::frame::Frame;

pub use display::DisplayCapture;
pub use window::WindowCapture;

/// Tagged variant over the two capture back-ends (spec.md section 9: avoid
/// inheritance, model as a tagged variant with a single `capture`
/// operation; the two variants carry different per-tick state — texture id
/// + source rect for the window path, a device pointer for the display
/// path).
pub enum CaptureSource {
    Window(WindowCapture),
    Display(DisplayCapture),
}

impl CaptureSource {
    /// GPU-to-GPU copy into `frame`, never a CPU round trip.
    pub fn capture_into(&mut self, frame: &mut Frame) -> Result<()> {
        match self {
            CaptureSource::Window(w) => w.capture_into(frame),
            CaptureSource::Display(d) => d.capture_into(frame),
        }
    }

    pub fn dimensions(&self) -> (u32, u32) {
        match self {
            CaptureSource::Window(w) => w.dimensions(),
            CaptureSource::Display(d) => d.dimensions(),
        }
    }
}
