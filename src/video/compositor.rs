//! Builds the displayed frame from the background and the two previews
//!
//! The display frame is rebuilt from its sources on every render: background
//! first, then the inbound preview, then the outbound preview. Overlays are a
//! straight overwrite, no blending.

use crate::constants::{
    INBOUND_PREVIEW_ORIGIN, INBOUND_PREVIEW_WIDTH, OUTBOUND_PREVIEW_ORIGIN,
    OUTBOUND_PREVIEW_WIDTH, SCREEN_HEIGHT, SCREEN_WIDTH,
};
use crate::video::frame::Frame;

/// Screen geometry; origins are (row, column) of each overlay's top-left pixel
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Layout {
    pub width: u32,
    pub height: u32,
    pub inbound_width: u32,
    pub inbound_origin: (u32, u32),
    pub outbound_width: u32,
    pub outbound_origin: (u32, u32),
}

impl Default for Layout {
    fn default() -> Self {
        Self {
            width: SCREEN_WIDTH,
            height: SCREEN_HEIGHT,
            inbound_width: INBOUND_PREVIEW_WIDTH,
            inbound_origin: INBOUND_PREVIEW_ORIGIN,
            outbound_width: OUTBOUND_PREVIEW_WIDTH,
            outbound_origin: OUTBOUND_PREVIEW_ORIGIN,
        }
    }
}

/// Previews to draw this tick.
///
/// `inbound` is only set while the remote is live and `outbound` only while
/// the camera is on. The outbound preview is stored already mirrored.
#[derive(Debug, Default, Clone, Copy)]
pub struct Overlays<'a> {
    pub inbound: Option<&'a Frame>,
    pub outbound: Option<&'a Frame>,
}

/// Compose a fresh display frame
pub fn compose(background: &Frame, overlays: &Overlays<'_>, layout: &Layout) -> Frame {
    let mut display = background.clone();
    draw_overlays(&mut display, overlays, layout);
    display
}

fn draw_overlays(display: &mut Frame, overlays: &Overlays<'_>, layout: &Layout) {
    if let Some(inbound) = overlays.inbound {
        let (row, col) = layout.inbound_origin;
        display.blit(inbound, row, col);
    }
    if let Some(outbound) = overlays.outbound {
        let (row, col) = layout.outbound_origin;
        display.blit(outbound, row, col);
    }
}

/// Owns the background and the display buffer reused across ticks
pub struct Compositor {
    background: Frame,
    display: Frame,
    layout: Layout,
}

impl Compositor {
    pub fn new(background: Frame, layout: Layout) -> Self {
        Self {
            display: background.clone(),
            background,
            layout,
        }
    }

    pub fn display(&self) -> &Frame {
        &self.display
    }

    /// Make the display frame an exact copy of the background
    pub fn reset_display(&mut self) {
        self.display.copy_from(&self.background);
    }

    /// Rebuild the display frame for this tick
    pub fn render(&mut self, overlays: &Overlays<'_>) -> &Frame {
        self.reset_display();
        draw_overlays(&mut self.display, overlays, &self.layout);
        &self.display
    }
}
