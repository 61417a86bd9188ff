//! State of the preview pane.
//!
//! Hovering over a row schedules a render after a short debounce; only the result carrying
//! the latest token is kept. Results from an explicit open are pushed in directly by the
//! app state.

use crate::core::address::PathAddress;
use crate::core::render::RenderResult;
use crate::core::worker::FetchToken;

use std::time::{Duration, Instant};

const DEBOUNCE: Duration = Duration::from_millis(75);

pub struct PreviewState {
    result: Option<RenderResult>,
    address: Option<PathAddress>,
    token: Option<FetchToken>,
    pending: bool,
    last_input_time: Instant,
    scroll: usize,
}

impl PreviewState {
    // Accessors

    #[inline]
    pub fn result(&self) -> Option<&RenderResult> {
        self.result.as_ref()
    }

    #[inline]
    pub fn address(&self) -> Option<&PathAddress> {
        self.address.as_ref()
    }

    #[inline]
    pub fn token(&self) -> Option<FetchToken> {
        self.token
    }

    #[inline]
    pub fn scroll(&self) -> usize {
        self.scroll
    }

    /// True while a render for the shown address is outstanding.
    #[inline]
    pub fn is_loading(&self) -> bool {
        self.token.is_some()
    }

    /// Marks the preview as pending and restarts the debounce window.
    pub fn mark_pending(&mut self) {
        self.pending = true;
        self.last_input_time = Instant::now();
    }

    pub fn should_trigger(&self) -> bool {
        self.pending && self.last_input_time.elapsed() > DEBOUNCE
    }

    /// Starts tracking a render for `address`. Earlier tokens become stale, and the result
    /// of another address is dropped rather than drawn under the new one.
    pub fn prepare(&mut self, address: PathAddress, token: FetchToken) {
        if self.address.as_ref() != Some(&address) {
            self.scroll = 0;
            self.result = None;
        }
        self.address = Some(address);
        self.token = Some(token);
        self.pending = false;
    }

    /// Applies a result if it carries the awaited token. Returns whether it was applied.
    pub fn update(&mut self, token: FetchToken, result: RenderResult) -> bool {
        if self.token != Some(token) {
            return false;
        }
        self.token = None;
        self.result = Some(result);
        true
    }

    /// Shows a result obtained outside the preview's own requests.
    pub fn show(&mut self, address: PathAddress, result: RenderResult) {
        if self.address.as_ref() != Some(&address) {
            self.scroll = 0;
        }
        self.address = Some(address);
        self.token = None;
        self.pending = false;
        self.result = Some(result);
    }

    pub fn scroll_up(&mut self, lines: usize) {
        self.scroll = self.scroll.saturating_sub(lines);
    }

    /// Scrolls down, stopping at the last line of the current result.
    pub fn scroll_down(&mut self, lines: usize) {
        let max = self.line_count().saturating_sub(1);
        self.scroll = (self.scroll + lines).min(max);
    }

    fn line_count(&self) -> usize {
        match &self.result {
            Some(RenderResult::Text { content, .. }) => content.lines().count(),
            Some(RenderResult::Table { rows, .. }) => rows.len(),
            Some(RenderResult::Directory { listing }) => listing.len(),
            Some(RenderResult::Image { height, .. }) => *height as usize / 2,
            _ => 0,
        }
    }

    pub fn clear(&mut self) {
        self.result = None;
        self.address = None;
        self.token = None;
        self.pending = false;
        self.scroll = 0;
    }
}

impl Default for PreviewState {
    fn default() -> Self {
        Self {
            result: None,
            address: None,
            token: None,
            pending: false,
            last_input_time: Instant::now(),
            scroll: 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    fn text(s: &str) -> RenderResult {
        RenderResult::Text {
            content: s.into(),
            language: None,
            truncated: false,
        }
    }

    #[test]
    fn only_the_latest_token_applies() {
        let mut preview = PreviewState::default();
        let a = PathAddress::local(Path::new("/a.txt"), Path::new("/"));
        let b = PathAddress::local(Path::new("/b.txt"), Path::new("/"));
        let first = FetchToken::new(1);
        let second = first.next();

        preview.prepare(a, first);
        preview.prepare(b.clone(), second);
        assert!(preview.is_loading());
        assert!(!preview.update(first, text("a")));
        assert!(preview.result().is_none());

        assert!(preview.update(second, text("b")));
        assert_eq!(preview.address(), Some(&b));
        assert!(!preview.is_loading());
    }

    #[test]
    fn switching_address_drops_the_old_result() {
        let mut preview = PreviewState::default();
        let a = PathAddress::local(Path::new("/a.txt"), Path::new("/"));
        let b = PathAddress::local(Path::new("/b.txt"), Path::new("/"));

        preview.show(a.clone(), text("a"));
        preview.prepare(a.clone(), FetchToken::new(1));
        // a refresh of the same address keeps showing the old content meanwhile
        assert!(preview.result().is_some());

        preview.prepare(b.clone(), FetchToken::new(2));
        assert!(preview.result().is_none());
        assert_eq!(preview.address(), Some(&b));
    }

    #[test]
    fn debounce_waits() {
        let mut preview = PreviewState::default();
        assert!(!preview.should_trigger());
        preview.mark_pending();
        assert!(!preview.should_trigger());
        std::thread::sleep(DEBOUNCE + Duration::from_millis(10));
        assert!(preview.should_trigger());
    }

    #[test]
    fn scrolling_is_bounded_by_content() {
        let mut preview = PreviewState::default();
        let a = PathAddress::local(Path::new("/a.txt"), Path::new("/"));
        preview.show(a, text("1\n2\n3"));
        preview.scroll_down(10);
        assert_eq!(preview.scroll(), 2);
        preview.scroll_up(5);
        assert_eq!(preview.scroll(), 0);
        preview.clear();
        assert!(preview.result().is_none());
    }
}
