// Screen layout for the current slide: the active hotspot's rectangle and the mask overlays.
// Masks are passive and mapped fresh every time; they never reach the attempt log.

use serde::{Deserialize, Serialize};

use crate::geometry::ImageMetrics;
use crate::types::*;

/// The active hotspot, positioned on screen.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HotspotOverlay {
    pub step_id: StepId,
    pub hotspot_type: HotspotType,
    pub rect: ScreenRect,
}

/// Everything the host draws over the slide image.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SlideLayout {
    pub image_id: ImageId,
    pub hotspot: Option<HotspotOverlay>,
    /// Drawn above the image, in authored order.
    pub masks: Vec<ScreenRect>,
}

/// Compute the layout for `slide` with the current metrics.
///
/// Returns `None` while the image is unmeasured; nothing may be drawn until a
/// rectangle is resolved.
pub fn compute_layout(
    slide: &Slide,
    active: Option<(&StepId, &HotspotStep)>,
    metrics: &ImageMetrics,
) -> Option<SlideLayout> {
    metrics.scale()?;

    let hotspot = match active {
        Some((step_id, hotspot)) => Some(HotspotOverlay {
            step_id: step_id.clone(),
            hotspot_type: hotspot.hotspot_type,
            rect: metrics.map(&hotspot.rect)?,
        }),
        None => None,
    };

    let masks = slide
        .masking
        .iter()
        .filter_map(|mask| metrics.map(&mask.rect))
        .collect();

    Some(SlideLayout {
        image_id: slide.image_id.clone(),
        hotspot,
        masks,
    })
}
