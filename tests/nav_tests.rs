//! Navigation tests for lookout
//!
//! These tests run the navigation state machine against the real fetch pool, with backends
//! that answer out of order or refuse credentials, and check that only the newest intent
//! ever lands.

use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};
use lookout_tui::app::{AppState, NavState, Phase, Update};
use lookout_tui::config::Config;
use lookout_tui::core::backend::RetryPolicy;
use lookout_tui::core::registry::MapCredentials;
use lookout_tui::core::{
    Backend, BackendClient, BackendOptions, BackendRegistry, BrowseError, CacheSettings,
    CredentialSource, DirectoryCache, DirectoryEntry, DirectoryListing, Engine, ErrorKind,
    FetchResponse, PathAddress, RenderLimits, RenderResult, RendererDispatch, Workers,
};

use tiny_http::{Response, Server};

use std::error;
use std::path::Path;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

/// Directory `/srv` holds `a/` and `b/`; listing `a` is slow.
struct SkewedBackend;

impl Backend for SkewedBackend {
    fn list(&self, addr: &PathAddress) -> lookout_tui::core::Result<DirectoryListing> {
        let entries = match addr.name() {
            Some("a") => {
                thread::sleep(Duration::from_millis(300));
                vec![DirectoryEntry::new("from-a", false)]
            }
            Some("b") => vec![DirectoryEntry::new("from-b", false)],
            _ => vec![DirectoryEntry::new("a", true), DirectoryEntry::new("b", true)],
        };
        Ok(DirectoryListing::new(addr.clone(), entries, None))
    }

    fn stat(&self, addr: &PathAddress) -> lookout_tui::core::Result<DirectoryEntry> {
        Ok(DirectoryEntry::new(addr.name().unwrap_or_default(), true))
    }

    fn open_range(&self, addr: &PathAddress, _: u64, _: u64) -> lookout_tui::core::Result<Vec<u8>> {
        Err(BrowseError::unsupported(format!("{addr} is a directory")))
    }

    fn exists(&self, _: &PathAddress) -> lookout_tui::core::Result<bool> {
        Ok(true)
    }

    fn label(&self) -> &str {
        "skewed"
    }
}

fn skewed_engine() -> Arc<Engine> {
    let registry = BackendRegistry::with_factory(
        Arc::new(MapCredentials::new()),
        |_: &PathAddress, _: &dyn CredentialSource| Ok(Arc::new(SkewedBackend) as BackendClient),
    );
    Arc::new(Engine::new(
        registry,
        DirectoryCache::new(CacheSettings::default()),
        RendererDispatch::new(RenderLimits::default()),
    ))
}

fn feed(nav: &mut NavState, response: FetchResponse) -> Update {
    match response {
        FetchResponse::ListingLoaded {
            address,
            listing,
            token,
        } => nav.complete_listing(token, &address, listing),
        FetchResponse::Rendered {
            address,
            result,
            token,
        } => nav.complete_render(token, &address, &result),
        FetchResponse::Failed {
            address,
            error,
            token,
        } => nav.fail(token, &address, &error),
    }
}

#[test]
fn late_listing_never_overrides_a_newer_navigation() -> Result<(), Box<dyn error::Error>> {
    let workers = Workers::spawn(skewed_engine(), 4);
    let root = PathAddress::parse("ssh://ops@box/srv", Path::new("/"))?;
    let mut nav = NavState::new(root.clone(), false);

    assert!(workers.submit(nav.start()));
    let response = workers.response_rx().recv_timeout(Duration::from_secs(5))?;
    assert!(matches!(feed(&mut nav, response), Update::Applied));
    assert_eq!(nav.rows().len(), 2);

    let to_a = nav.select(0).ok_or("row a missing")?;
    let to_b = nav.select(1).ok_or("row b missing")?;
    assert!(workers.submit(to_a));
    assert!(workers.submit(to_b));

    let mut stale = 0;
    for _ in 0..2 {
        let response = workers.response_rx().recv_timeout(Duration::from_secs(5))?;
        if feed(&mut nav, response).is_stale() {
            stale += 1;
        }
    }

    assert_eq!(stale, 1);
    assert_eq!(nav.current(), &root.join("b"));
    assert_eq!(nav.rows()[0].entry().name(), "from-b");
    assert_eq!(nav.phase(), &Phase::Idle);
    assert_eq!(nav.history(), &[root]);
    Ok(())
}

#[test]
fn code_host_auth_failure_is_shown_then_cleared() -> Result<(), Box<dyn error::Error>> {
    let server = Server::http("127.0.0.1:0").map_err(|e| e.to_string())?;
    let addr = server.server_addr().to_ip().ok_or("no ip address")?;
    thread::spawn(move || {
        for request in server.incoming_requests() {
            let response =
                Response::from_string(r#"{"message":"Bad credentials"}"#).with_status_code(401);
            let _ = request.respond(response);
        }
    });

    let mut options = BackendOptions {
        retry: RetryPolicy::none(),
        ..BackendOptions::default()
    };
    options.code_host.api_url = format!("http://{}", addr);
    let engine = Arc::new(Engine::new(
        BackendRegistry::new(options, Arc::new(MapCredentials::new())),
        DirectoryCache::new(CacheSettings::default()),
        RendererDispatch::new(RenderLimits::default()),
    ));

    let config = Config::default();
    let start = PathAddress::parse("github://owner/repo@main", Path::new("/"))?;
    let mut app = AppState::with_engine(&config, start, engine);

    let deadline = Instant::now() + Duration::from_secs(5);
    while !matches!(app.nav().phase(), Phase::Error(_)) && Instant::now() < deadline {
        app.tick();
        thread::sleep(Duration::from_millis(5));
    }
    assert_eq!(app.nav().phase(), &Phase::Error(ErrorKind::Auth));
    assert_eq!(
        app.preview().result().and_then(RenderResult::error_kind),
        Some(ErrorKind::Auth)
    );

    app.handle_keypress(KeyEvent::new(KeyCode::Char('j'), KeyModifiers::NONE));
    assert_eq!(app.nav().phase(), &Phase::Idle);
    Ok(())
}
