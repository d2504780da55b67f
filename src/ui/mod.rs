pub mod render;
pub mod surface;
pub mod waves;

pub use surface::{DrawContext, Scene, Surface, SurfaceSize, TerminalSurface};
pub use waves::{PaintReport, WaveRenderer};
