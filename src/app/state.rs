//! Application state and main controller for lookout.
//!
//! [AppState] owns the navigation state machine, the preview and the fetch pool. Key presses
//! become intents on [NavState]; the fetch tasks they return go to the pool and the responses
//! are drained in [AppState::tick], routed by token to whichever side is waiting for them.

use crate::app::keymap::{Action, Keymap, NavAction, PreviewAction, SystemAction, ViewAction};
use crate::app::nav::{NavState, Phase, Update};
use crate::app::preview::PreviewState;
use crate::app::view::ViewState;
use crate::config::Config;
use crate::core::address::PathAddress;
use crate::core::cache::DirectoryCache;
use crate::core::engine::Engine;
use crate::core::registry::{BackendRegistry, EnvCredentials};
use crate::core::render::{RenderRequest, RenderResult, RendererDispatch};
use crate::core::worker::{FetchResponse, FetchTask, Workers};
use crate::ui::highlight;
use crate::utils::clipboard::Clipboard;

use crossterm::event::KeyEvent;

use std::sync::Arc;
use std::time::{Duration, Instant};

const NOTICE_TTL: Duration = Duration::from_secs(3);

/// Outcome of a single key press.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeypressResult {
    Continue,
    Consumed,
    Quit,
}

/// Sizes of the panes as last drawn.
#[derive(Debug, Clone, Copy)]
pub struct LayoutMetrics {
    pub tree_width: usize,
    pub preview_width: usize,
    pub preview_height: usize,
}

impl Default for LayoutMetrics {
    fn default() -> Self {
        Self {
            tree_width: 40,
            preview_width: 60,
            preview_height: 40,
        }
    }
}

/// Builds the engine described by the config, reading credentials from the environment.
pub fn build_engine(config: &Config) -> Arc<Engine> {
    let registry = BackendRegistry::new(config.backends().clone(), Arc::new(EnvCredentials));
    let cache = DirectoryCache::new(config.cache());
    let dispatch = RendererDispatch::new(*config.limits());
    Arc::new(Engine::new(registry, cache, dispatch))
}

pub struct AppState<'a> {
    config: &'a Config,
    keymap: Keymap,
    metrics: LayoutMetrics,
    nav: NavState,
    preview: PreviewState,
    view: ViewState,
    clipboard: Clipboard,
    notice: Option<(String, Instant)>,
    workers: Workers,
    worker_time: Option<Instant>,
}

impl<'a> AppState<'a> {
    pub fn new(config: &'a Config, start: PathAddress) -> Self {
        Self::with_engine(config, start, build_engine(config))
    }

    /// Same as [AppState::new] with a prepared engine.
    pub fn with_engine(config: &'a Config, start: PathAddress, engine: Arc<Engine>) -> Self {
        let general = config.general();
        let workers = Workers::spawn(engine, general.workers());
        let nav = NavState::new(start, general.show_hidden())
            .with_readme_preview(general.readme_preview());

        let mut app = Self {
            config,
            keymap: Keymap::from_config(config),
            metrics: LayoutMetrics::default(),
            nav,
            preview: PreviewState::default(),
            view: ViewState::new(config.display(), highlight::theme_names()),
            clipboard: Clipboard::new(),
            notice: None,
            workers,
            worker_time: None,
        };
        let task = app.nav.start();
        app.submit(task);
        app
    }

    // Accessors

    #[inline]
    pub fn config(&self) -> &Config {
        self.config
    }

    #[inline]
    pub fn nav(&self) -> &NavState {
        &self.nav
    }

    #[inline]
    pub fn preview(&self) -> &PreviewState {
        &self.preview
    }

    #[inline]
    pub fn view(&self) -> &ViewState {
        &self.view
    }

    #[inline]
    pub fn clipboard(&self) -> &Clipboard {
        &self.clipboard
    }

    #[inline]
    pub fn clipboard_mut(&mut self) -> &mut Clipboard {
        &mut self.clipboard
    }

    /// Short message for the status bar, dropped after a few seconds.
    pub fn notice(&self) -> Option<&str> {
        self.notice
            .as_ref()
            .filter(|(_, at)| at.elapsed() < NOTICE_TTL)
            .map(|(text, _)| text.as_str())
    }

    #[inline]
    pub fn workers(&self) -> &Workers {
        &self.workers
    }

    #[inline]
    pub fn metrics(&self) -> LayoutMetrics {
        self.metrics
    }

    /// True while a fetch issued by the navigation is outstanding.
    #[inline]
    pub fn is_loading(&self) -> bool {
        self.nav.pending_token().is_some()
    }

    /// Worker activity lasting longer than a blink, for the spinner.
    pub fn is_busy(&self) -> bool {
        self.worker_time
            .is_some_and(|t| t.elapsed() >= Duration::from_millis(200))
    }

    pub fn update_layout_metrics(&mut self, metrics: LayoutMetrics) {
        self.metrics = metrics;
    }

    /// Drains worker responses and fires the debounced preview.
    ///
    /// Returns true when something visible changed.
    pub fn tick(&mut self) -> bool {
        let mut changed = false;

        if self
            .notice
            .as_ref()
            .is_some_and(|(_, at)| at.elapsed() >= NOTICE_TTL)
        {
            self.notice = None;
            changed = true;
        }

        if self.workers.active() > 0 {
            let start = *self.worker_time.get_or_insert_with(Instant::now);
            if start.elapsed() >= Duration::from_millis(200) {
                changed = true;
            }
        } else if self.worker_time.is_some() {
            self.worker_time = None;
            changed = true;
        }

        if self.preview.should_trigger() {
            self.request_preview();
            changed = true;
        }

        while let Ok(response) = self.workers.response_rx().try_recv() {
            changed |= self.handle_response(response);
        }
        changed
    }

    /// Routes one response by token. Returns false for stale responses.
    pub fn handle_response(&mut self, response: FetchResponse) -> bool {
        let token = response.token();
        let for_nav = self.nav.pending_token() == Some(token);
        let for_preview = self.preview.token() == Some(token);

        match response {
            FetchResponse::ListingLoaded {
                address, listing, ..
            } => {
                if for_nav {
                    let update = self.nav.complete_listing(token, &address, listing);
                    let applied = !update.is_stale();
                    self.after_nav(update);
                    return applied;
                }
                if for_preview {
                    self.nav.absorb(Arc::clone(&listing));
                    self.preview.update(token, RenderResult::Directory { listing });
                    return true;
                }
            }
            FetchResponse::Rendered {
                address, result, ..
            } => {
                if for_nav {
                    let update = self.nav.complete_render(token, &address, &result);
                    if update.is_stale() {
                        return false;
                    }
                    if !matches!(result, RenderResult::Directory { .. }) {
                        self.preview.show(address, result);
                    }
                    self.after_nav(update);
                    return true;
                }
                if for_preview {
                    if let RenderResult::Directory { listing } = &result {
                        self.nav.absorb(Arc::clone(listing));
                    }
                    self.preview.update(token, result);
                    return true;
                }
            }
            FetchResponse::Failed { address, error, .. } => {
                if for_nav {
                    let update = self.nav.fail(token, &address, &error);
                    if update.is_stale() {
                        return false;
                    }
                    self.preview.show(address, RenderResult::from_error(&error));
                    self.after_nav(update);
                    return true;
                }
                if for_preview {
                    self.preview.update(token, RenderResult::from_error(&error));
                    return true;
                }
            }
        }
        tracing::debug!(%token, "ignoring stale response");
        false
    }

    fn after_nav(&mut self, update: Update) {
        if let Update::Follow(task) = update {
            self.submit(task);
        }
        self.preview.mark_pending();
    }

    /// Central key handler.
    pub fn handle_keypress(&mut self, key: KeyEvent) -> KeypressResult {
        match self.keymap.lookup(key) {
            Some(Action::System(SystemAction::Quit)) => KeypressResult::Quit,
            Some(Action::System(SystemAction::CopyPath)) => {
                self.nav.acknowledge();
                self.copy_path();
                KeypressResult::Consumed
            }
            Some(Action::View(view_act)) => {
                self.nav.acknowledge();
                self.handle_view_action(view_act);
                KeypressResult::Consumed
            }
            Some(Action::Nav(nav_act)) => {
                self.handle_nav_action(nav_act);
                KeypressResult::Consumed
            }
            Some(Action::Preview(preview_act)) => {
                self.nav.acknowledge();
                let step = (self.metrics.preview_height / 2).max(1);
                match preview_act {
                    PreviewAction::ScrollUp => self.preview.scroll_up(step),
                    PreviewAction::ScrollDown => self.preview.scroll_down(step),
                }
                KeypressResult::Consumed
            }
            None => KeypressResult::Continue,
        }
    }

    fn handle_view_action(&mut self, action: ViewAction) {
        match action {
            ViewAction::ToggleLineNumbers => self.view.toggle_line_numbers(),
            ViewAction::ToggleTree => self.view.toggle_tree(),
            ViewAction::ToggleMarkdown => self.view.toggle_markdown(),
            ViewAction::CycleTheme => {
                let name = self.view.cycle_theme().to_string();
                self.set_notice(format!("theme: {name}"));
            }
        }
    }

    /// Copies the selected row's path, or the current directory's when nothing is selected.
    /// Local paths are copied as filesystem paths, remote ones as addresses.
    pub fn copy_path(&mut self) {
        let address = self
            .nav
            .selected_row()
            .map(|row| row.address())
            .unwrap_or_else(|| self.nav.current());
        let text = match address.to_local_path() {
            Some(path) => path.display().to_string(),
            None => address.to_string(),
        };
        self.clipboard.copy(&text);
        tracing::debug!(path = %text, "copied path");
        self.set_notice(format!("copied {text}"));
    }

    fn set_notice(&mut self, text: String) {
        self.notice = Some((text, Instant::now()));
    }

    fn handle_nav_action(&mut self, action: NavAction) {
        let task = match action {
            NavAction::Open => self.nav.select_current(),
            NavAction::GoParent => self.nav.go_parent(),
            NavAction::GoBack => self.nav.go_back(),
            NavAction::ToggleExpand => {
                let idx = self.nav.selected_idx();
                self.nav.toggle_expand(idx)
            }
            NavAction::Refresh => Some(self.nav.refresh()),
            NavAction::GoUp => self.moved(|nav| nav.move_up()),
            NavAction::GoDown => self.moved(|nav| nav.move_down()),
            NavAction::GoToTop => self.moved(|nav| nav.go_to_top()),
            NavAction::GoToBottom => self.moved(|nav| nav.go_to_bottom()),
            NavAction::ToggleHidden => self.moved(|nav| {
                nav.toggle_hidden();
                true
            }),
        };
        if let Some(task) = task {
            self.submit(task);
        }
    }

    fn moved(&mut self, f: impl FnOnce(&mut NavState) -> bool) -> Option<FetchTask> {
        if f(&mut self.nav) {
            self.preview.mark_pending();
        }
        None
    }

    /// Requests a preview of the selected row unless it is already shown or loading.
    pub fn request_preview(&mut self) {
        let Some(row) = self.nav.selected_row() else {
            // keep a failed start visible until something is listed
            if self.nav.current_listing().is_some() {
                self.preview.clear();
            }
            return;
        };
        let address = row.address().clone();
        if self.preview.address() == Some(&address)
            && (self.preview.is_loading() || self.preview.result().is_some())
        {
            return;
        }
        if matches!(self.nav.phase(), Phase::Rendering(a) if a == &address) {
            return;
        }

        let token = self.nav.issue_token();
        self.preview.prepare(address.clone(), token);
        self.submit(FetchTask::Render {
            request: RenderRequest::new(address),
            token,
        });
    }

    fn submit(&self, task: FetchTask) {
        let token = task.token();
        if !self.workers.submit(task) {
            tracing::warn!(%token, "fetch pool is shut down; task dropped");
        }
    }
}
