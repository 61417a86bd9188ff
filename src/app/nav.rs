//! Navigation state machine for lookout.
//!
//! Owns the current directory, the lazily filled tree of listings, cursor, expansion set and
//! history. Every user intent that needs a backend returns a [FetchTask] carrying a fresh
//! [FetchToken]; only a completion carrying the pending token may change the state.
//!
//! The tree is a flat arena `PathAddress -> Arc<DirectoryListing>`. Visible rows are derived
//! by walking the current listing and descending into expanded directories that are present
//! in the arena.
//!
//! This module does no I/O and spawns nothing, so it is tested by feeding it completions.

use crate::core::address::PathAddress;
use crate::core::backend::{DirectoryEntry, DirectoryListing};
use crate::core::error::{BrowseError, ErrorKind};
use crate::core::render::{RenderRequest, RenderResult};
use crate::core::worker::{FetchTask, FetchToken};

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

const README: &str = "README.md";

/// Where the session is with respect to its single pending fetch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Listing(PathAddress),
    Rendering(PathAddress),
    /// Last fetch failed. The next user action returns to `Idle`.
    Error(ErrorKind),
}

/// Result of feeding a completion into the state machine.
#[derive(Debug)]
pub enum Update {
    /// Token no longer pending; nothing changed.
    Stale,
    Applied,
    /// Applied, and a follow-up fetch is now pending.
    Follow(FetchTask),
}

impl Update {
    #[inline]
    pub fn is_stale(&self) -> bool {
        matches!(self, Update::Stale)
    }
}

/// What a pending fetch was issued for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Intent {
    /// Initial address, not yet known to be a file or a directory.
    Start,
    /// Listing the parent of a start address that turned out to be a file.
    StartParent,
    Navigate,
    Back,
    Expand,
    Refresh,
    Open,
}

#[derive(Debug, Clone)]
struct Pending {
    token: FetchToken,
    address: PathAddress,
    intent: Intent,
    /// Entry name to put the cursor on once the listing arrives.
    focus: Option<String>,
}

/// One visible line of the tree.
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    address: PathAddress,
    entry: DirectoryEntry,
    depth: usize,
    expanded: bool,
}

impl Row {
    #[inline]
    pub fn address(&self) -> &PathAddress {
        &self.address
    }

    #[inline]
    pub fn entry(&self) -> &DirectoryEntry {
        &self.entry
    }

    #[inline]
    pub fn depth(&self) -> usize {
        self.depth
    }

    #[inline]
    pub fn is_expanded(&self) -> bool {
        self.expanded
    }
}

pub struct NavState {
    current: PathAddress,
    arena: HashMap<PathAddress, Arc<DirectoryListing>>,
    expanded: HashSet<PathAddress>,
    history: Vec<PathAddress>,
    rows: Vec<Row>,
    selected: usize,
    positions: HashMap<PathAddress, PathAddress>,
    pending: Option<Pending>,
    phase: Phase,
    last_error: Option<String>,
    last_token: FetchToken,
    show_hidden: bool,
    readme_preview: bool,
}

impl NavState {
    pub fn new(start: PathAddress, show_hidden: bool) -> Self {
        Self {
            current: start,
            arena: HashMap::new(),
            expanded: HashSet::new(),
            history: Vec::new(),
            rows: Vec::new(),
            selected: 0,
            positions: HashMap::new(),
            pending: None,
            phase: Phase::Idle,
            last_error: None,
            last_token: FetchToken::default(),
            show_hidden,
            readme_preview: true,
        }
    }

    pub fn with_readme_preview(mut self, enabled: bool) -> Self {
        self.readme_preview = enabled;
        self
    }

    // Accessors

    #[inline]
    pub fn current(&self) -> &PathAddress {
        &self.current
    }

    #[inline]
    pub fn phase(&self) -> &Phase {
        &self.phase
    }

    #[inline]
    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    #[inline]
    pub fn selected_idx(&self) -> usize {
        self.selected
    }

    #[inline]
    pub fn selected_row(&self) -> Option<&Row> {
        self.rows.get(self.selected)
    }

    #[inline]
    pub fn history(&self) -> &[PathAddress] {
        &self.history
    }

    #[inline]
    pub fn expanded(&self) -> &HashSet<PathAddress> {
        &self.expanded
    }

    #[inline]
    pub fn pending_token(&self) -> Option<FetchToken> {
        self.pending.as_ref().map(|p| p.token)
    }

    #[inline]
    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    #[inline]
    pub fn show_hidden(&self) -> bool {
        self.show_hidden
    }

    pub fn listing(&self, addr: &PathAddress) -> Option<&Arc<DirectoryListing>> {
        self.arena.get(addr)
    }

    pub fn current_listing(&self) -> Option<&Arc<DirectoryListing>> {
        self.arena.get(&self.current)
    }

    pub fn row_index(&self, addr: &PathAddress) -> Option<usize> {
        self.rows.iter().position(|r| &r.address == addr)
    }

    /// A fresh token, also used by the preview for its own fetches.
    pub fn issue_token(&mut self) -> FetchToken {
        self.last_token = self.last_token.next();
        self.last_token
    }

    // Intents

    /// Resolves the start address: a directory is opened, a file opens its parent and is
    /// previewed.
    pub fn start(&mut self) -> FetchTask {
        let start = self.current.clone();
        self.render_intent(start, Intent::Start)
    }

    /// Opens the row: directories are listed and entered, files are rendered.
    pub fn select(&mut self, row: usize) -> Option<FetchTask> {
        self.acknowledge();
        let target = self.rows.get(row)?.clone();
        self.selected = row;
        if target.entry.is_dir() {
            Some(self.list_intent(target.address, Intent::Navigate, false, None))
        } else {
            Some(self.render_intent(target.address, Intent::Open))
        }
    }

    pub fn select_current(&mut self) -> Option<FetchTask> {
        self.select(self.selected)
    }

    /// Lists the parent and puts the cursor on the directory just left.
    pub fn go_parent(&mut self) -> Option<FetchTask> {
        self.acknowledge();
        let parent = self.current.parent()?;
        let focus = self.current.name().map(str::to_string);
        Some(self.list_intent(parent, Intent::Navigate, false, focus))
    }

    /// Returns to the previous directory without pushing onto the history.
    pub fn go_back(&mut self) -> Option<FetchTask> {
        self.acknowledge();
        let previous = self.history.last()?.clone();
        Some(self.list_intent(previous, Intent::Back, false, None))
    }

    /// Expands or collapses a directory row. Expanding a directory missing from the arena
    /// lists it first.
    pub fn toggle_expand(&mut self, row: usize) -> Option<FetchTask> {
        self.acknowledge();
        let target = self.rows.get(row)?.clone();
        if !target.entry.is_dir() {
            return None;
        }
        self.selected = row;

        if self.expanded.remove(&target.address) {
            self.rebuild_rows();
            return None;
        }
        if self.arena.contains_key(&target.address) {
            self.expanded.insert(target.address);
            self.rebuild_rows();
            return None;
        }
        Some(self.list_intent(target.address, Intent::Expand, false, None))
    }

    /// Relists the current directory, bypassing the cache.
    pub fn refresh(&mut self) -> FetchTask {
        self.acknowledge();
        let current = self.current.clone();
        self.list_intent(current, Intent::Refresh, true, None)
    }

    pub fn move_up(&mut self) -> bool {
        self.acknowledge();
        let len = self.rows.len();
        if len == 0 {
            return false;
        }
        self.selected = if self.selected == 0 {
            len - 1
        } else {
            self.selected - 1
        };
        true
    }

    pub fn move_down(&mut self) -> bool {
        self.acknowledge();
        let len = self.rows.len();
        if len == 0 {
            return false;
        }
        self.selected = (self.selected + 1) % len;
        true
    }

    pub fn go_to_top(&mut self) -> bool {
        self.acknowledge();
        let moved = self.selected != 0;
        self.selected = 0;
        moved
    }

    pub fn go_to_bottom(&mut self) -> bool {
        self.acknowledge();
        let last = self.rows.len().saturating_sub(1);
        let moved = self.selected != last;
        self.selected = last;
        moved
    }

    pub fn toggle_hidden(&mut self) {
        self.acknowledge();
        self.show_hidden = !self.show_hidden;
        self.rebuild_rows();
    }

    /// Stores a listing obtained outside the pending fetch, such as a directory preview.
    pub fn absorb(&mut self, listing: Arc<DirectoryListing>) {
        let addr = listing.address().clone();
        let visible = addr == self.current || self.expanded.contains(&addr);
        self.arena.insert(addr, listing);
        if visible {
            self.rebuild_rows();
        }
    }

    /// Leaves the `Error` phase; called by every user action.
    pub fn acknowledge(&mut self) {
        if matches!(self.phase, Phase::Error(_)) {
            self.phase = Phase::Idle;
            self.last_error = None;
        }
    }

    // Completions

    pub fn complete_listing(
        &mut self,
        token: FetchToken,
        address: &PathAddress,
        listing: Arc<DirectoryListing>,
    ) -> Update {
        let Some(pending) = self.take_pending(token, address) else {
            return Update::Stale;
        };
        self.phase = Phase::Idle;
        self.arena.insert(address.clone(), listing);

        match pending.intent {
            Intent::Navigate | Intent::Back | Intent::StartParent => {
                self.enter(address.clone(), pending.intent, pending.focus);
            }
            Intent::Expand => {
                self.expanded.insert(address.clone());
                self.rebuild_rows();
            }
            Intent::Refresh => self.rebuild_rows(),
            Intent::Start | Intent::Open => {
                self.enter(address.clone(), Intent::Navigate, None);
            }
        }
        Update::Applied
    }

    pub fn complete_render(
        &mut self,
        token: FetchToken,
        address: &PathAddress,
        result: &RenderResult,
    ) -> Update {
        let Some(pending) = self.take_pending(token, address) else {
            return Update::Stale;
        };

        if let RenderResult::Error { kind, message } = result {
            self.set_error(*kind, message);
            return Update::Applied;
        }
        self.phase = Phase::Idle;

        match (pending.intent, result) {
            (Intent::Start, RenderResult::Directory { listing }) => {
                self.arena.insert(address.clone(), Arc::clone(listing));
                self.enter(address.clone(), Intent::StartParent, None);
                if self.readme_preview
                    && let Some(idx) = self.readme_row()
                {
                    self.selected = idx;
                    let readme = self.rows[idx].address.clone();
                    return Update::Follow(self.render_intent(readme, Intent::Open));
                }
                Update::Applied
            }
            (Intent::Start, _) => match address.parent() {
                Some(parent) => {
                    let focus = address.name().map(str::to_string);
                    Update::Follow(self.list_intent(parent, Intent::StartParent, false, focus))
                }
                None => Update::Applied,
            },
            (_, RenderResult::Directory { listing }) => {
                self.arena.insert(address.clone(), Arc::clone(listing));
                self.enter(address.clone(), Intent::Navigate, None);
                Update::Applied
            }
            _ => Update::Applied,
        }
    }

    pub fn fail(&mut self, token: FetchToken, address: &PathAddress, error: &BrowseError) -> Update {
        if self.take_pending(token, address).is_none() {
            return Update::Stale;
        }
        self.set_error(error.kind(), error.message());
        Update::Applied
    }

    // Internals

    fn take_pending(&mut self, token: FetchToken, address: &PathAddress) -> Option<Pending> {
        match &self.pending {
            Some(p) if p.token == token && &p.address == address => self.pending.take(),
            _ => {
                tracing::debug!(%token, address = %address, "dropping stale completion");
                None
            }
        }
    }

    fn issue(&mut self, address: PathAddress, intent: Intent, focus: Option<String>) -> FetchToken {
        let token = self.issue_token();
        self.phase = match intent {
            Intent::Start | Intent::Open => Phase::Rendering(address.clone()),
            _ => Phase::Listing(address.clone()),
        };
        let superseded = self.pending.replace(Pending {
            token,
            address,
            intent,
            focus,
        });
        if let Some(old) = superseded {
            tracing::debug!(old = %old.token, new = %token, "pending fetch superseded");
        }
        token
    }

    fn list_intent(
        &mut self,
        address: PathAddress,
        intent: Intent,
        force: bool,
        focus: Option<String>,
    ) -> FetchTask {
        let token = self.issue(address.clone(), intent, focus);
        FetchTask::LoadListing {
            address,
            token,
            force,
        }
    }

    fn render_intent(&mut self, address: PathAddress, intent: Intent) -> FetchTask {
        let token = self.issue(address.clone(), intent, None);
        FetchTask::Render {
            request: RenderRequest::new(address),
            token,
        }
    }

    fn set_error(&mut self, kind: ErrorKind, message: &str) {
        tracing::debug!(kind = kind.label(), message, "fetch failed");
        self.phase = Phase::Error(kind);
        self.last_error = Some(format!("{}: {}", kind.label(), message));
    }

    /// Makes `address` the current directory. Its listing must already be in the arena.
    fn enter(&mut self, address: PathAddress, intent: Intent, focus: Option<String>) {
        if address != self.current {
            self.save_position();
            match intent {
                Intent::Navigate => self.history.push(self.current.clone()),
                Intent::Back if self.history.last() == Some(&address) => {
                    self.history.pop();
                }
                _ => {}
            }
        } else if intent == Intent::Back && self.history.last() == Some(&address) {
            self.history.pop();
        }
        self.current = address;
        self.rows.clear();
        self.rebuild_rows();

        let focused = focus
            .map(|name| self.current.join(&name))
            .or_else(|| self.positions.get(&self.current).cloned())
            .and_then(|addr| self.row_index(&addr));
        self.selected = focused.unwrap_or(0);
    }

    fn save_position(&mut self) {
        if let Some(row) = self.selected_row() {
            let addr = row.address.clone();
            self.positions.insert(self.current.clone(), addr);
        }
    }

    fn readme_row(&self) -> Option<usize> {
        self.rows.iter().position(|r| {
            r.depth == 0 && !r.entry.is_dir() && r.entry.name().eq_ignore_ascii_case(README)
        })
    }

    /// Rederives the visible rows, keeping the cursor on the same address when it survives.
    fn rebuild_rows(&mut self) {
        let keep = self.selected_row().map(|r| r.address.clone());
        let mut rows = Vec::new();
        let current = self.current.clone();
        self.push_rows(&current, 0, &mut rows);
        self.rows = rows;

        let idx = keep.and_then(|addr| self.row_index(&addr));
        self.selected = idx
            .unwrap_or(self.selected)
            .min(self.rows.len().saturating_sub(1));
    }

    fn push_rows(&self, at: &PathAddress, depth: usize, out: &mut Vec<Row>) {
        let Some(listing) = self.arena.get(at) else {
            return;
        };
        for entry in listing.entries() {
            if !self.show_hidden && entry.is_hidden() {
                continue;
            }
            let address = at.join(entry.name());
            let expanded = entry.is_dir()
                && self.expanded.contains(&address)
                && self.arena.contains_key(&address);
            out.push(Row {
                address: address.clone(),
                entry: entry.clone(),
                depth,
                expanded,
            });
            if expanded {
                self.push_rows(&address, depth + 1, out);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use rand::{Rng, rng};
    use std::path::Path;

    fn addr(s: &str) -> PathAddress {
        PathAddress::local(Path::new(s), Path::new("/"))
    }

    fn listing(at: &PathAddress, dirs: &[&str], files: &[&str]) -> Arc<DirectoryListing> {
        let entries = dirs
            .iter()
            .map(|d| DirectoryEntry::new(*d, true))
            .chain(files.iter().map(|f| DirectoryEntry::new(*f, false)))
            .collect();
        Arc::new(DirectoryListing::new(at.clone(), entries, None))
    }

    fn task_parts(task: &FetchTask) -> (FetchToken, PathAddress) {
        (task.token(), task.address().clone())
    }

    /// Nav opened on `/root` with `a/`, `b/` and `notes.txt`.
    fn opened() -> NavState {
        let root = addr("/root");
        let mut nav = NavState::new(root.clone(), false).with_readme_preview(false);
        let start = nav.start();
        let (token, at) = task_parts(&start);
        let result = RenderResult::Directory {
            listing: listing(&root, &["a", "b"], &["notes.txt"]),
        };
        assert!(matches!(nav.complete_render(token, &at, &result), Update::Applied));
        nav
    }

    #[test]
    fn start_on_directory_lists_it() {
        let nav = opened();
        assert_eq!(nav.phase(), &Phase::Idle);
        let names: Vec<_> = nav.rows().iter().map(|r| r.entry().name()).collect();
        assert_eq!(names, vec!["a", "b", "notes.txt"]);
        assert!(nav.history().is_empty());
    }

    #[test]
    fn selecting_a_directory_lists_then_enters() {
        let mut nav = opened();
        let Some(task) = nav.select(0) else {
            panic!("directory row should produce a fetch");
        };
        let (token, target) = task_parts(&task);
        assert!(matches!(task, FetchTask::LoadListing { force: false, .. }));
        assert_eq!(nav.phase(), &Phase::Listing(addr("/root/a")));

        nav.complete_listing(token, &target, listing(&target, &[], &["x.rs"]));
        assert_eq!(nav.phase(), &Phase::Idle);
        assert_eq!(nav.current(), &addr("/root/a"));
        assert_eq!(nav.history(), &[addr("/root")]);
    }

    #[test]
    fn selecting_a_file_renders_it() {
        let mut nav = opened();
        let Some(task) = nav.select(2) else {
            panic!("file row should produce a fetch");
        };
        assert!(matches!(task, FetchTask::Render { .. }));
        assert_eq!(nav.phase(), &Phase::Rendering(addr("/root/notes.txt")));

        let (token, at) = task_parts(&task);
        let text = RenderResult::Text {
            content: "hi".into(),
            language: None,
            truncated: false,
        };
        nav.complete_render(token, &at, &text);
        assert_eq!(nav.phase(), &Phase::Idle);
        assert_eq!(nav.current(), &addr("/root"));
    }

    #[test]
    fn newer_navigation_wins_over_late_results() {
        let mut nav = opened();
        let Some(to_a) = nav.select(0) else {
            panic!("expected fetch");
        };
        let Some(to_b) = nav.select(1) else {
            panic!("expected fetch");
        };
        let (a_token, a) = task_parts(&to_a);
        let (b_token, b) = task_parts(&to_b);

        let update = nav.complete_listing(b_token, &b, listing(&b, &[], &["b1"]));
        assert!(matches!(update, Update::Applied));

        let update = nav.complete_listing(a_token, &a, listing(&a, &[], &["a1"]));
        assert!(update.is_stale());
        assert_eq!(nav.current(), &b);
        assert_eq!(nav.rows()[0].entry().name(), "b1");

        // a late failure for A is dropped as well
        assert!(nav.fail(a_token, &a, &BrowseError::network("late")).is_stale());
        assert_eq!(nav.phase(), &Phase::Idle);
    }

    #[test]
    fn failures_are_recoverable() {
        let mut nav = opened();
        let task = nav.refresh();
        let (token, at) = task_parts(&task);
        nav.fail(token, &at, &BrowseError::auth("bad credentials"));
        assert_eq!(nav.phase(), &Phase::Error(ErrorKind::Auth));
        assert!(nav.last_error().is_some_and(|e| e.contains("bad credentials")));

        assert!(nav.move_down());
        assert_eq!(nav.phase(), &Phase::Idle);
        assert!(nav.last_error().is_none());
        assert_eq!(nav.rows().len(), 3);
    }

    #[test]
    fn go_back_pops_without_pushing() {
        let mut nav = opened();
        let Some(task) = nav.select(1) else {
            panic!("expected fetch");
        };
        let (token, b) = task_parts(&task);
        nav.complete_listing(token, &b, listing(&b, &[], &[]));
        assert_eq!(nav.history().len(), 1);

        let Some(back) = nav.go_back() else {
            panic!("history should not be empty");
        };
        let (token, root) = task_parts(&back);
        assert_eq!(root, addr("/root"));
        nav.complete_listing(token, &root, listing(&root, &["a", "b"], &["notes.txt"]));
        assert_eq!(nav.current(), &root);
        assert!(nav.history().is_empty());
        // cursor returns to where it was
        assert_eq!(nav.selected_row().map(|r| r.entry().name()), Some("b"));
        assert!(nav.go_back().is_none());
    }

    #[test]
    fn go_parent_focuses_the_directory_left() {
        let mut nav = opened();
        let Some(task) = nav.select(1) else {
            panic!("expected fetch");
        };
        let (token, b) = task_parts(&task);
        nav.complete_listing(token, &b, listing(&b, &[], &["z"]));

        let Some(up) = nav.go_parent() else {
            panic!("/root/b has a parent");
        };
        let (token, root) = task_parts(&up);
        nav.complete_listing(token, &root, listing(&root, &["a", "b"], &["notes.txt"]));
        assert_eq!(nav.selected_row().map(|r| r.address().clone()), Some(b));
        assert_eq!(nav.history().len(), 2);
    }

    #[test]
    fn expansion_lists_once_then_toggles_locally() {
        let mut nav = opened();
        let Some(task) = nav.toggle_expand(0) else {
            panic!("unknown directory should be listed");
        };
        let (token, a) = task_parts(&task);
        assert_eq!(nav.phase(), &Phase::Listing(a.clone()));
        nav.complete_listing(token, &a, listing(&a, &[], &["inner.txt"]));

        let rows: Vec<_> = nav.rows().iter().map(|r| (r.entry().name(), r.depth())).collect();
        assert_eq!(rows, vec![("a", 0), ("inner.txt", 1), ("b", 0), ("notes.txt", 0)]);
        assert!(nav.rows()[0].is_expanded());
        assert_eq!(nav.current(), &addr("/root"));

        assert!(nav.toggle_expand(0).is_none());
        assert_eq!(nav.rows().len(), 3);
        assert!(nav.toggle_expand(0).is_none());
        assert_eq!(nav.rows().len(), 4);
        assert!(nav.toggle_expand(3).is_none());
    }

    #[test]
    fn hidden_entries_follow_the_filter() {
        let root = addr("/root");
        let mut nav = NavState::new(root.clone(), false).with_readme_preview(false);
        let start = nav.start();
        let (token, at) = task_parts(&start);
        let result = RenderResult::Directory {
            listing: listing(&root, &[".git"], &[".env", "main.rs"]),
        };
        nav.complete_render(token, &at, &result);
        assert_eq!(nav.rows().len(), 1);

        nav.toggle_hidden();
        assert_eq!(nav.rows().len(), 3);
        assert_eq!(nav.selected_row().map(|r| r.entry().name()), Some("main.rs"));
    }

    #[test]
    fn starting_on_a_file_opens_its_parent() {
        let file = addr("/root/notes.txt");
        let mut nav = NavState::new(file.clone(), false);
        let start = nav.start();
        let (token, at) = task_parts(&start);
        let text = RenderResult::Text {
            content: "hi".into(),
            language: None,
            truncated: false,
        };
        let Update::Follow(follow) = nav.complete_render(token, &at, &text) else {
            panic!("expected a parent listing");
        };
        let (token, parent) = task_parts(&follow);
        assert_eq!(parent, addr("/root"));

        nav.complete_listing(token, &parent, listing(&parent, &["a"], &["notes.txt"]));
        assert_eq!(nav.current(), &parent);
        assert_eq!(nav.selected_row().map(|r| r.address().clone()), Some(file));
        assert!(nav.history().is_empty());
    }

    #[test]
    fn readme_is_previewed_at_startup() {
        let root = addr("/repo");
        let mut nav = NavState::new(root.clone(), false);
        let start = nav.start();
        let (token, at) = task_parts(&start);
        let result = RenderResult::Directory {
            listing: listing(&root, &["src"], &["Cargo.toml", "README.md"]),
        };
        let Update::Follow(FetchTask::Render { request, .. }) =
            nav.complete_render(token, &at, &result)
        else {
            panic!("expected README render");
        };
        assert_eq!(request.address, root.join("README.md"));
        assert_eq!(nav.selected_row().map(|r| r.entry().name()), Some("README.md"));
    }

    #[test]
    fn error_render_moves_to_error_phase() {
        let mut nav = opened();
        let Some(task) = nav.select(2) else {
            panic!("expected fetch");
        };
        let (token, at) = task_parts(&task);
        let result = RenderResult::Error {
            kind: ErrorKind::PermissionDenied,
            message: "nope".into(),
        };
        nav.complete_render(token, &at, &result);
        assert_eq!(nav.phase(), &Phase::Error(ErrorKind::PermissionDenied));
    }

    #[test]
    fn cursor_wraps() {
        let mut nav = opened();
        assert!(nav.move_up());
        assert_eq!(nav.selected_idx(), 2);
        assert!(nav.move_down());
        assert_eq!(nav.selected_idx(), 0);
        assert!(nav.go_to_bottom());
        assert!(!nav.go_to_bottom());
        assert!(nav.go_to_top());
    }

    #[test]
    fn stale_completions_never_mutate_state() {
        let mut rng = rng();
        let mut nav = opened();
        let mut issued: Vec<FetchTask> = Vec::new();

        for _ in 0..200 {
            let task = match rng.random_range(0..4) {
                0 => nav.select(rng.random_range(0..2)),
                1 => Some(nav.refresh()),
                2 => nav.go_back(),
                _ => nav.go_parent(),
            };
            if let Some(task) = task {
                issued.push(task);
            }

            // deliver a random earlier task; only the pending one may apply
            if !issued.is_empty() && rng.random_bool(0.5) {
                let task = issued.swap_remove(rng.random_range(0..issued.len()));
                let (token, at) = task_parts(&task);
                let is_pending = nav.pending_token() == Some(token);

                let before = (nav.current().clone(), nav.rows().to_vec(), nav.history().to_vec());
                let update = nav.complete_listing(token, &at, listing(&at, &["a", "b"], &["f"]));

                if is_pending {
                    assert!(!update.is_stale());
                } else {
                    assert!(update.is_stale());
                    let after = (nav.current().clone(), nav.rows().to_vec(), nav.history().to_vec());
                    assert_eq!(before, after);
                }
            }
        }
    }
}
