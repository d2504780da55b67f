//! Drawing surface abstraction and the display list the renderer paints into.

use crate::error::SurfaceError;

/// Device pixels per terminal cell with braille markers.
pub const CELL_DEVICE_WIDTH: u32 = 2;
pub const CELL_DEVICE_HEIGHT: u32 = 4;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SurfaceSize {
    pub width: u32,
    pub height: u32,
}

impl SurfaceSize {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Device size of a `cols` x `rows` terminal area.
    pub fn from_cells(cols: u16, rows: u16) -> Self {
        Self {
            width: u32::from(cols) * CELL_DEVICE_WIDTH,
            height: u32::from(rows) * CELL_DEVICE_HEIGHT,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }
}

/// Colour with straight alpha in [0, 1].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rgba {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: f64,
}

impl Rgba {
    pub const fn new(r: u8, g: u8, b: u8, a: f64) -> Self {
        Self { r, g, b, a }
    }

    pub fn with_alpha(self, a: f64) -> Self {
        Self { a, ..self }
    }

    /// Composite onto an opaque background with the "screen" blend, which
    /// only ever lightens: `1 - (1 - src * alpha) * (1 - dst)`.
    pub fn screen_over(self, background: (u8, u8, u8), gain: f64) -> (u8, u8, u8) {
        let alpha = (self.a * gain).clamp(0.0, 1.0);
        let channel = |src: u8, dst: u8| {
            let s = f64::from(src) / 255.0 * alpha;
            let d = f64::from(dst) / 255.0;
            ((1.0 - (1.0 - s) * (1.0 - d)) * 255.0).round().clamp(0.0, 255.0) as u8
        };
        (
            channel(self.r, background.0),
            channel(self.g, background.1),
            channel(self.b, background.2),
        )
    }
}

/// Horizontal linear gradient with stops at offsets in [0, 1].
#[derive(Debug, Clone, PartialEq)]
pub struct Gradient {
    stops: Vec<(f64, Rgba)>,
}

impl Gradient {
    /// Stops must be sorted by offset.
    pub fn new(stops: Vec<(f64, Rgba)>) -> Self {
        Self { stops }
    }

    pub fn stops(&self) -> &[(f64, Rgba)] {
        &self.stops
    }

    /// Colour at `t`, interpolating linearly between neighbouring stops.
    pub fn color_at(&self, t: f64) -> Rgba {
        let Some(&(first_offset, first)) = self.stops.first() else {
            return Rgba::new(0, 0, 0, 0.0);
        };
        if t <= first_offset {
            return first;
        }
        for pair in self.stops.windows(2) {
            let (o0, c0) = pair[0];
            let (o1, c1) = pair[1];
            if t <= o1 {
                let span = (o1 - o0).max(f64::EPSILON);
                let k = ((t - o0) / span).clamp(0.0, 1.0);
                let lerp = |a: u8, b: u8| {
                    (f64::from(a) + (f64::from(b) - f64::from(a)) * k).round() as u8
                };
                return Rgba {
                    r: lerp(c0.r, c1.r),
                    g: lerp(c0.g, c1.g),
                    b: lerp(c0.b, c1.b),
                    a: c0.a + (c1.a - c0.a) * k,
                };
            }
        }
        self.stops[self.stops.len() - 1].1
    }
}

/// Immediate-mode drawing operations.
pub trait DrawContext {
    fn clear(&mut self);

    /// Stroke an open polyline.
    fn stroke_path(&mut self, points: &[(f64, f64)], gradient: &Gradient, line_width: f64);

    fn fill_circle(&mut self, x: f64, y: f64, radius: f64, color: Rgba);
}

/// Something that can hand out a drawing context of a known device size.
pub trait Surface {
    fn device_size(&self) -> SurfaceSize;

    fn resize(&mut self, size: SurfaceSize);

    fn context(&mut self) -> Result<&mut dyn DrawContext, SurfaceError>;
}

#[derive(Debug, Clone, PartialEq)]
pub enum Shape {
    Stroke {
        points: Vec<(f64, f64)>,
        gradient: Gradient,
        line_width: f64,
    },
    Dot {
        x: f64,
        y: f64,
        radius: f64,
        color: Rgba,
    },
}

/// Display list recorded from one paint.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Scene {
    shapes: Vec<Shape>,
}

impl Scene {
    pub fn shapes(&self) -> &[Shape] {
        &self.shapes
    }

    pub fn strokes(&self) -> impl Iterator<Item = &Shape> {
        self.shapes.iter().filter(|s| matches!(s, Shape::Stroke { .. }))
    }

    pub fn dots(&self) -> impl Iterator<Item = &Shape> {
        self.shapes.iter().filter(|s| matches!(s, Shape::Dot { .. }))
    }
}

impl DrawContext for Scene {
    fn clear(&mut self) {
        self.shapes.clear();
    }

    fn stroke_path(&mut self, points: &[(f64, f64)], gradient: &Gradient, line_width: f64) {
        self.shapes.push(Shape::Stroke {
            points: points.to_vec(),
            gradient: gradient.clone(),
            line_width,
        });
    }

    fn fill_circle(&mut self, x: f64, y: f64, radius: f64, color: Rgba) {
        self.shapes.push(Shape::Dot {
            x,
            y,
            radius,
            color,
        });
    }
}

/// Full-screen terminal surface. Painting records into a `Scene` that the
/// UI layer later rasterizes with ratatui.
#[derive(Debug, Default)]
pub struct TerminalSurface {
    size: SurfaceSize,
    scene: Scene,
}

impl TerminalSurface {
    pub fn new(size: SurfaceSize) -> Self {
        Self {
            size,
            scene: Scene::default(),
        }
    }

    pub fn scene(&self) -> &Scene {
        &self.scene
    }
}

impl Surface for TerminalSurface {
    fn device_size(&self) -> SurfaceSize {
        self.size
    }

    fn resize(&mut self, size: SurfaceSize) {
        self.size = size;
    }

    fn context(&mut self) -> Result<&mut dyn DrawContext, SurfaceError> {
        if self.size.is_empty() {
            return Err(SurfaceError::ContextUnavailable {
                width: self.size.width,
                height: self.size.height,
            });
        }
        Ok(&mut self.scene)
    }
}
