// Coordinate mapping from authored rectangles to rendered screen pixels.
// Pure and stateless: callers must pass a fresh rendered size on every use.

use crate::types::*;

/// Map an authored rectangle onto the rendered image.
///
/// Percentage rectangles scale with `rendered` alone. Absolute rectangles scale by
/// `rendered / natural` and need a usable natural size; without one this returns
/// `None` so the caller never draws a hotspot it cannot position.
pub fn to_screen_rect(
    authored: &AuthoredRect,
    natural: Option<Size>,
    rendered: Size,
) -> Option<ScreenRect> {
    if !rendered.is_usable() {
        return None;
    }

    match authored {
        AuthoredRect::Percent(r) => Some(ScreenRect {
            left: r.x_percent * rendered.width / 100.0,
            top: r.y_percent * rendered.height / 100.0,
            width: r.width_percent * rendered.width / 100.0,
            height: r.height_percent * rendered.height / 100.0,
        }),
        AuthoredRect::Absolute(r) => {
            let natural = natural.filter(Size::is_usable)?;
            let sx = rendered.width / natural.width;
            let sy = rendered.height / natural.height;
            Some(ScreenRect {
                left: r.x * sx,
                top: r.y * sy,
                width: r.width * sx,
                height: r.height * sy,
            })
        }
    }
}

/// Convert an absolute rectangle to percentages of the natural image size.
pub fn to_percent_rect(authored: &AuthoredRect, natural: Size) -> Option<PercentRect> {
    match authored {
        AuthoredRect::Percent(r) => Some(*r),
        AuthoredRect::Absolute(r) => {
            if !natural.is_usable() {
                return None;
            }
            Some(PercentRect {
                x_percent: r.x / natural.width * 100.0,
                y_percent: r.y / natural.height * 100.0,
                width_percent: r.width / natural.width * 100.0,
                height_percent: r.height / natural.height * 100.0,
            })
        }
    }
}

/// Rendered/natural scale factors.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Scale {
    pub x: f64,
    pub y: f64,
}

/// Image metrics for the current slide plus the last scale a layout was derived from.
///
/// Width/height scale factors are compared with an epsilon so layout jitter from
/// floating-point noise does not cause endless recomputation.
#[derive(Debug, Clone, Default)]
pub struct ImageMetrics {
    natural: Option<Size>,
    rendered: Option<Size>,
    last_scale: Option<Scale>,
}

impl ImageMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn rendered(&self) -> Option<Size> {
        self.rendered
    }

    /// Forget everything; used when the slide image changes.
    pub fn clear(&mut self) {
        *self = ImageMetrics::default();
    }

    /// Record natural + rendered size for a freshly loaded image. Always requires a relayout.
    pub fn set_loaded(&mut self, natural: Size, rendered: Size) {
        self.natural = Some(natural).filter(Size::is_usable);
        self.rendered = Some(rendered);
        self.last_scale = self.scale();
    }

    /// Record a new rendered size. Returns `true` when the scale moved by more than
    /// `epsilon` on either axis and dependent rectangles must be recomputed.
    pub fn update_rendered(&mut self, rendered: Size, epsilon: f64) -> bool {
        self.rendered = Some(rendered);
        let scale = self.scale();
        let changed = match (self.last_scale, scale) {
            (Some(prev), Some(next)) => {
                (prev.x - next.x).abs() > epsilon || (prev.y - next.y).abs() > epsilon
            }
            (None, None) => false,
            _ => true,
        };
        if changed {
            self.last_scale = scale;
        }
        changed
    }

    /// Rendered/natural scale, when both sizes are usable.
    pub fn scale(&self) -> Option<Scale> {
        let natural = self.natural.filter(Size::is_usable)?;
        let rendered = self.rendered.filter(Size::is_usable)?;
        Some(Scale {
            x: rendered.width / natural.width,
            y: rendered.height / natural.height,
        })
    }

    /// Map with the current metrics. `None` until an image has been measured.
    pub fn map(&self, authored: &AuthoredRect) -> Option<ScreenRect> {
        // A natural size is required even for percent rects: it proves the current
        // image has actually loaded.
        self.natural?;
        to_screen_rect(authored, self.natural, self.rendered?)
    }
}
