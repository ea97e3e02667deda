use std::fmt;

/// Which scroll position moved. The history panel can scroll on its own or,
/// in narrow layouts, with the whole page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScrollSource {
    Panel,
    Page,
}

impl fmt::Display for ScrollSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScrollSource::Panel => f.write_str("panel"),
            ScrollSource::Page => f.write_str("page"),
        }
    }
}

/// Scroll state in whatever unit the front end measures (pixels, rows).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScrollMetrics {
    /// Distance scrolled from the top.
    pub offset: usize,
    /// Size of the visible area.
    pub viewport: usize,
    /// Size of everything rendered.
    pub content: usize,
}

impl ScrollMetrics {
    pub fn new(offset: usize, viewport: usize, content: usize) -> Self {
        Self {
            offset,
            viewport,
            content,
        }
    }

    /// Rendered content below the bottom edge of the viewport.
    pub fn remaining(&self) -> usize {
        self.content
            .saturating_sub(self.offset.saturating_add(self.viewport))
    }
}

/// Decides when a scroll position is close enough to the end of the list to
/// ask for the next page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ViewportTrigger {
    threshold: usize,
}

impl ViewportTrigger {
    pub fn new(threshold: usize) -> Self {
        Self { threshold }
    }

    pub fn threshold(&self) -> usize {
        self.threshold
    }

    pub fn should_load(&self, metrics: ScrollMetrics) -> bool {
        metrics.remaining() < self.threshold
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_remaining_distance() {
        assert_eq!(ScrollMetrics::new(0, 10, 40).remaining(), 30);
        assert_eq!(ScrollMetrics::new(35, 10, 40).remaining(), 0);
    }

    #[test]
    fn test_triggers_below_threshold_only() {
        let trigger = ViewportTrigger::new(5);
        assert!(!trigger.should_load(ScrollMetrics::new(25, 10, 40)));
        assert!(trigger.should_load(ScrollMetrics::new(26, 10, 40)));
    }

    #[test]
    fn test_short_list_triggers_immediately() {
        let trigger = ViewportTrigger::new(5);
        assert!(trigger.should_load(ScrollMetrics::new(0, 20, 3)));
    }

    proptest! {
        #[test]
        fn prop_scrolling_further_never_untriggers(
            offset in 0usize..1000,
            step in 0usize..100,
            viewport in 1usize..100,
            content in 0usize..2000,
            threshold in 1usize..50,
        ) {
            let trigger = ViewportTrigger::new(threshold);
            let near = trigger.should_load(ScrollMetrics::new(offset, viewport, content));
            let further = trigger.should_load(ScrollMetrics::new(offset + step, viewport, content));
            prop_assert!(!near || further);
        }
    }
}
