//! View effects requested by the stores.
//!
//! Stores never touch a viewport; they describe what the presentation layer
//! should do after a change.

use shared::models::MessageId;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScrollBehavior {
    /// Jump without animation (initial load).
    Instant,
    /// Animated scroll (live update or own send).
    Smooth,
}

/// Scroll position and content height captured by the presentation layer.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ViewportMetrics {
    pub scroll_height: f64,
    pub scroll_top: f64,
}

/// Keeps a previously visible message stationary after older history was prepended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScrollAnchor {
    /// Oldest message before the prepend; it must not move on screen.
    pub anchor_id: MessageId,
    /// Number of entries inserted above the anchor.
    pub prepended: usize,
}

impl ScrollAnchor {
    /// Scroll offset that keeps the anchor in place: `new_height - old_height + old_top`.
    ///
    /// With nothing prepended any height change happened below the anchor, so
    /// the old offset is kept.
    #[must_use]
    pub fn restored_offset(&self, before: ViewportMetrics, after_height: f64) -> f64 {
        if self.prepended == 0 {
            return before.scroll_top;
        }
        after_height - before.scroll_height + before.scroll_top
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ViewEffect {
    ScrollToBottom(ScrollBehavior),
    PreserveAnchor(ScrollAnchor),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn restored_offset_accounts_for_inserted_height() {
        let anchor = ScrollAnchor {
            anchor_id: MessageId::new("m1"),
            prepended: 20,
        };
        let before = ViewportMetrics {
            scroll_height: 1200.0,
            scroll_top: 35.0,
        };

        let offset = anchor.restored_offset(before, 2000.0);
        assert!((offset - 835.0).abs() < f64::EPSILON);
    }

    #[test]
    fn restored_offset_is_unchanged_when_nothing_was_prepended() {
        let anchor = ScrollAnchor {
            anchor_id: MessageId::new("m1"),
            prepended: 0,
        };
        let before = ViewportMetrics {
            scroll_height: 1200.0,
            scroll_top: 35.0,
        };

        let offset = anchor.restored_offset(before, 1260.0);
        assert!((offset - 35.0).abs() < f64::EPSILON);
    }
}
