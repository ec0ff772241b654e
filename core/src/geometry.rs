use serde::{Deserialize, Serialize};

pub const REFERENCE_WIDTH_DEFAULT: f32 = 1600.0;
pub const REFERENCE_HEIGHT_DEFAULT: f32 = 900.0;

/// Room-relative position, normalized to [0, 1] of the reference frame.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Point {
    pub x: f32,
    pub y: f32,
}

impl Point {
    pub const fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    pub fn offset_from(self, origin: Point) -> Point {
        Point::new(self.x - origin.x, self.y - origin.y)
    }

    pub fn minus(self, offset: Point) -> Point {
        Point::new(self.x - offset.x, self.y - offset.y)
    }

    /// Pins both axes into the reference frame.
    pub fn clamp_to_frame(self) -> Point {
        Point::new(self.x.clamp(0.0, 1.0), self.y.clamp(0.0, 1.0))
    }

    pub fn approx_eq(self, other: Point, eps: f32) -> bool {
        (self.x - other.x).abs() <= eps && (self.y - other.y).abs() <= eps
    }
}

/// Device pixels, as reported by pointer events.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ScreenPoint {
    pub x: f32,
    pub y: f32,
}

impl ScreenPoint {
    pub const fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }
}

/// Logical pixels of the reference frame (e.g. 0..1600 x 0..900).
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct FramePoint {
    pub x: f32,
    pub y: f32,
}

impl FramePoint {
    pub const fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum GeometryError {
    #[error("reference frame must be positive, got {width}x{height}")]
    Frame { width: f32, height: f32 },
    #[error("viewport size must be positive, got {width}x{height}")]
    ViewportSize { width: f32, height: f32 },
    #[error("display scale must be positive and finite, got {0}")]
    Scale(f32),
    #[error("grid bounds are empty or the cell size is not positive")]
    Grid,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ReferenceFrame {
    pub width: f32,
    pub height: f32,
}

impl Default for ReferenceFrame {
    fn default() -> Self {
        Self {
            width: REFERENCE_WIDTH_DEFAULT,
            height: REFERENCE_HEIGHT_DEFAULT,
        }
    }
}

impl ReferenceFrame {
    pub fn new(width: f32, height: f32) -> Result<Self, GeometryError> {
        if !(width.is_finite() && height.is_finite() && width > 0.0 && height > 0.0) {
            return Err(GeometryError::Frame { width, height });
        }
        Ok(Self { width, height })
    }

    pub fn to_frame(&self, point: Point) -> FramePoint {
        FramePoint::new(point.x * self.width, point.y * self.height)
    }

    pub fn normalize(&self, point: FramePoint) -> Point {
        Point::new(point.x / self.width, point.y / self.height)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScalePolicy {
    #[default]
    Fit,
    FitNoUpscale,
}

/// Display scale mapping reference pixels to device pixels. Every client
/// must derive this from the same frame constants; it is never sent.
pub fn compute_scale(
    frame: &ReferenceFrame,
    viewport_width: f32,
    viewport_height: f32,
    policy: ScalePolicy,
) -> Result<f32, GeometryError> {
    if !(viewport_width.is_finite()
        && viewport_height.is_finite()
        && viewport_width > 0.0
        && viewport_height > 0.0)
    {
        return Err(GeometryError::ViewportSize {
            width: viewport_width,
            height: viewport_height,
        });
    }
    let fit = (viewport_width / frame.width).min(viewport_height / frame.height);
    Ok(match policy {
        ScalePolicy::Fit => fit,
        ScalePolicy::FitNoUpscale => fit.min(1.0),
    })
}

/// Placement of the mounted board container on screen.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Viewport {
    left: f32,
    top: f32,
    scale: f32,
}

impl Viewport {
    pub fn new(left: f32, top: f32, scale: f32) -> Result<Self, GeometryError> {
        if !(scale.is_finite() && scale > 0.0) {
            return Err(GeometryError::Scale(scale));
        }
        Ok(Self { left, top, scale })
    }

    pub fn left(&self) -> f32 {
        self.left
    }

    pub fn top(&self) -> f32 {
        self.top
    }

    pub fn scale(&self) -> f32 {
        self.scale
    }

    pub fn screen_to_frame(&self, screen: ScreenPoint) -> FramePoint {
        FramePoint::new(
            (screen.x - self.left) / self.scale,
            (screen.y - self.top) / self.scale,
        )
    }

    pub fn frame_to_screen(&self, point: FramePoint) -> ScreenPoint {
        ScreenPoint::new(
            point.x * self.scale + self.left,
            point.y * self.scale + self.top,
        )
    }

    pub fn to_room_relative(&self, frame: &ReferenceFrame, screen: ScreenPoint) -> Point {
        frame.normalize(self.screen_to_frame(screen))
    }

    pub fn to_screen(&self, frame: &ReferenceFrame, point: Point) -> ScreenPoint {
        self.frame_to_screen(frame.to_frame(point))
    }
}

/// Snap grid in reference pixels.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GridBounds {
    pub left: f32,
    pub top: f32,
    pub right: f32,
    pub bottom: f32,
    pub cell_size: f32,
}

impl GridBounds {
    pub fn new(
        left: f32,
        top: f32,
        right: f32,
        bottom: f32,
        cell_size: f32,
    ) -> Result<Self, GeometryError> {
        if !(right > left && bottom > top && cell_size > 0.0) {
            return Err(GeometryError::Grid);
        }
        Ok(Self {
            left,
            top,
            right,
            bottom,
            cell_size,
        })
    }

    /// Square grid of `size` px centered in the frame.
    pub fn centered(
        frame: &ReferenceFrame,
        size: f32,
        cell_size: f32,
    ) -> Result<Self, GeometryError> {
        let cx = frame.width / 2.0;
        let cy = frame.height / 2.0;
        Self::new(
            cx - size / 2.0,
            cy - size / 2.0,
            cx + size / 2.0,
            cy + size / 2.0,
            cell_size,
        )
    }

    pub fn contains(&self, point: FramePoint) -> bool {
        point.x >= self.left && point.x < self.right && point.y >= self.top && point.y < self.bottom
    }

    /// Center of the cell containing `point`, or `None` outside the grid.
    pub fn snap(&self, point: FramePoint) -> Option<FramePoint> {
        if !self.contains(point) {
            return None;
        }
        let cols = ((self.right - self.left) / self.cell_size).floor().max(1.0);
        let rows = ((self.bottom - self.top) / self.cell_size).floor().max(1.0);
        let col = ((point.x - self.left) / self.cell_size).floor().clamp(0.0, cols - 1.0);
        let row = ((point.y - self.top) / self.cell_size).floor().clamp(0.0, rows - 1.0);
        Some(FramePoint::new(
            self.left + (col + 0.5) * self.cell_size,
            self.top + (row + 0.5) * self.cell_size,
        ))
    }
}
