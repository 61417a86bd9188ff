//! Engine tests for lookout
//!
//! These tests drive the path and render engine end to end: address parsing, the backend
//! registry, the directory cache and the renderer dispatch. Remote backends are faked with
//! a local HTTP server or an in-process backend; local trees live in temporary directories.

use lookout_tui::core::backend::{ObjectStoreOptions, RetryPolicy};
use lookout_tui::core::formatter::display_name;
use lookout_tui::core::registry::MapCredentials;
use lookout_tui::core::{
    Backend, BackendClient, BackendOptions, BackendRegistry, BrowseError, CacheSettings,
    CredentialSource, DirectoryCache, DirectoryEntry, DirectoryListing, Engine, ErrorKind,
    PathAddress, RenderLimits, RenderRequest, RenderResult, RendererDispatch,
};

use tiny_http::{Header, Response, Server};

use std::error;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc;
use std::sync::{Arc, Barrier};
use std::thread;
use std::time::Duration;

const LIST_XML: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<ListBucketResult xmlns="http://s3.amazonaws.com/doc/2006-03-01/">
  <Name>bucket</Name>
  <Prefix>data/</Prefix>
  <KeyCount>3</KeyCount>
  <IsTruncated>false</IsTruncated>
  <Contents><Key>data/c.txt</Key><Size>3</Size><ETag>&quot;c1&quot;</ETag></Contents>
  <Contents><Key>data/b.txt</Key><Size>2</Size><ETag>&quot;b1&quot;</ETag></Contents>
  <CommonPrefixes><Prefix>data/a/</Prefix></CommonPrefixes>
</ListBucketResult>"#;

/// Serves every request with `status` and `body`, reporting (url, authorization) of each.
fn serve(status: u16, body: &'static str) -> Result<(String, mpsc::Receiver<(String, Option<String>)>), Box<dyn error::Error>> {
    let server = Server::http("127.0.0.1:0").map_err(|e| e.to_string())?;
    let addr = server
        .server_addr()
        .to_ip()
        .ok_or("server is not bound to an ip address")?;
    let (tx, rx) = mpsc::channel();

    thread::spawn(move || {
        for request in server.incoming_requests() {
            let auth = request
                .headers()
                .iter()
                .find(|h| h.field.equiv("Authorization"))
                .map(|h| h.value.to_string());
            let _ = tx.send((request.url().to_string(), auth));

            let mut response = Response::from_string(body).with_status_code(status);
            if let Ok(header) = Header::from_bytes(&b"Content-Type"[..], &b"application/xml"[..]) {
                response = response.with_header(header);
            }
            let _ = request.respond(response);
        }
    });
    Ok((format!("http://{}", addr), rx))
}

fn engine_with(options: BackendOptions, creds: Arc<dyn CredentialSource>) -> Engine {
    Engine::new(
        BackendRegistry::new(options, creds),
        DirectoryCache::new(CacheSettings::default()),
        RendererDispatch::new(RenderLimits::default()),
    )
}

fn object_store_options(endpoint: String, anonymous: bool) -> BackendOptions {
    BackendOptions {
        retry: RetryPolicy::none(),
        timeout: Duration::from_secs(5),
        object_store: ObjectStoreOptions {
            endpoint: Some(endpoint),
            region: Some("us-east-1".into()),
            anonymous,
        },
        ..BackendOptions::default()
    }
}

#[test]
fn object_store_listing_is_sorted_dirs_first() -> Result<(), Box<dyn error::Error>> {
    let (endpoint, requests) = serve(200, LIST_XML)?;
    let engine = engine_with(
        object_store_options(endpoint, true),
        Arc::new(MapCredentials::new()),
    );

    let addr = PathAddress::parse("s3://bucket/data", Path::new("/"))?;
    let listing = engine.list(&addr, false)?;

    let names: Vec<String> = listing.entries().iter().map(display_name).collect();
    assert_eq!(names, ["a/", "b.txt", "c.txt"]);
    assert_eq!(listing.find("c.txt").and_then(|e| e.size()), Some(3));

    let (url, auth) = requests.recv_timeout(Duration::from_secs(5))?;
    assert!(url.starts_with("/bucket?"), "path-style request expected, got {url}");
    assert!(url.contains("list-type=2"));
    assert!(url.contains("prefix=data%2F"));
    assert_eq!(auth, None);
    Ok(())
}

#[test]
fn object_store_requests_are_signed_with_credentials() -> Result<(), Box<dyn error::Error>> {
    let (endpoint, requests) = serve(200, LIST_XML)?;
    let creds = MapCredentials::new()
        .with("AWS_ACCESS_KEY_ID", "AKIDEXAMPLE")
        .with("AWS_SECRET_ACCESS_KEY", "secret");
    let engine = engine_with(object_store_options(endpoint, false), Arc::new(creds));

    let addr = PathAddress::parse("s3://bucket/data", Path::new("/"))?;
    engine.list(&addr, false)?;

    let (_, auth) = requests.recv_timeout(Duration::from_secs(5))?;
    let auth = auth.ok_or("request was not signed")?;
    assert!(auth.starts_with("AWS4-HMAC-SHA256 Credential=AKIDEXAMPLE/"));
    Ok(())
}

#[test]
fn object_store_without_credentials_is_an_auth_error() -> Result<(), Box<dyn error::Error>> {
    let (endpoint, _requests) = serve(200, LIST_XML)?;
    let engine = engine_with(
        object_store_options(endpoint, false),
        Arc::new(MapCredentials::new()),
    );
    let addr = PathAddress::parse("s3://bucket/data", Path::new("/"))?;
    let err = engine.list(&addr, false).err().map(|e| e.kind());
    assert_eq!(err, Some(ErrorKind::Auth));
    Ok(())
}

#[test]
fn code_host_401_is_an_auth_error() -> Result<(), Box<dyn error::Error>> {
    let (endpoint, _requests) = serve(401, r#"{"message":"Bad credentials"}"#)?;
    let mut options = BackendOptions {
        retry: RetryPolicy::none(),
        ..BackendOptions::default()
    };
    options.code_host.api_url = endpoint;
    let creds = MapCredentials::new().with("GITHUB_TOKEN", "expired");
    let engine = engine_with(options, Arc::new(creds));

    let addr = PathAddress::parse("github://owner/repo@main/src", Path::new("/"))?;
    let err = engine.list(&addr, false).err().map(|e| e.kind());
    assert_eq!(err, Some(ErrorKind::Auth));
    // the client is dropped so a refreshed token is picked up next time
    assert!(engine.registry().is_empty());

    let result = engine.render(&RenderRequest::new(addr.join("main.rs")));
    assert_eq!(result.error_kind(), Some(ErrorKind::Auth));
    Ok(())
}

/// Fake contents API for `owner/repo@main` holding `src/lib.rs`; reports every url served.
fn serve_repository() -> Result<(String, mpsc::Receiver<String>), Box<dyn error::Error>> {
    let server = Server::http("127.0.0.1:0").map_err(|e| e.to_string())?;
    let addr = server
        .server_addr()
        .to_ip()
        .ok_or("server is not bound to an ip address")?;
    let (tx, rx) = mpsc::channel();

    thread::spawn(move || {
        for request in server.incoming_requests() {
            let url = request.url().to_string();
            let raw = request
                .headers()
                .iter()
                .any(|h| h.field.equiv("Accept") && h.value.to_string().contains("raw"));
            let _ = tx.send(url.clone());

            let (status, body) = match url.split('?').next().unwrap_or_default() {
                "/repos/owner/repo/contents/src" => (
                    200,
                    r#"[{"name":"lib.rs","type":"file","size":13,"sha":"abc"}]"#,
                ),
                "/repos/owner/repo/contents/src/lib.rs" if raw => (200, "fn main() {}\n"),
                "/repos/owner/repo/contents/src/lib.rs" => (
                    200,
                    r#"{"name":"lib.rs","type":"file","size":13,"sha":"abc"}"#,
                ),
                _ => (404, r#"{"message":"Not Found"}"#),
            };
            let _ = request.respond(Response::from_string(body).with_status_code(status));
        }
    });
    Ok((format!("http://{}", addr), rx))
}

fn code_host_engine(endpoint: String) -> Engine {
    let mut options = BackendOptions {
        retry: RetryPolicy::none(),
        ..BackendOptions::default()
    };
    options.code_host.api_url = endpoint;
    engine_with(options, Arc::new(MapCredentials::new()))
}

#[test]
fn code_host_previews_reuse_the_cached_parent_listing() -> Result<(), Box<dyn error::Error>> {
    let (endpoint, requests) = serve_repository()?;
    let engine = code_host_engine(endpoint);
    let dir = PathAddress::parse("github://owner/repo@main/src", Path::new("/"))?;

    engine.list(&dir, false)?;
    for _ in 0..3 {
        match engine.render(&RenderRequest::new(dir.join("lib.rs"))) {
            RenderResult::Text { content, .. } => assert_eq!(content, "fn main() {}\n"),
            other => panic!("expected text, got {:?}", other.kind()),
        }
    }

    let served: Vec<String> = requests.try_iter().collect();
    let listings = served.iter().filter(|u| u.starts_with("/repos/owner/repo/contents/src?")).count();
    let reads = served.iter().filter(|u| u.contains("/contents/src/lib.rs")).count();
    assert_eq!(listings, 1, "served: {served:?}");
    // one sample read per render; the small file fits in it
    assert_eq!(reads, 3, "served: {served:?}");
    Ok(())
}

#[test]
fn code_host_stat_is_a_single_request() -> Result<(), Box<dyn error::Error>> {
    let (endpoint, requests) = serve_repository()?;
    let engine = code_host_engine(endpoint);
    let file = PathAddress::parse("github://owner/repo@main/src/lib.rs", Path::new("/"))?;

    let entry = engine.stat(&file)?;
    assert_eq!(entry.size(), Some(13));
    assert!(!entry.is_dir());

    let served: Vec<String> = requests.try_iter().collect();
    assert_eq!(served, ["/repos/owner/repo/contents/src/lib.rs?ref=main"]);
    Ok(())
}

/// Remote shell stand-in that counts listings and answers slowly.
struct SlowShell {
    lists: Arc<AtomicUsize>,
}

impl Backend for SlowShell {
    fn list(&self, addr: &PathAddress) -> lookout_tui::core::Result<DirectoryListing> {
        self.lists.fetch_add(1, Ordering::SeqCst);
        thread::sleep(Duration::from_millis(150));
        Ok(DirectoryListing::new(
            addr.clone(),
            vec![
                DirectoryEntry::new("syslog", false).with_size(Some(10)),
                DirectoryEntry::new("nginx", true),
            ],
            None,
        ))
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
        "slow-shell"
    }
}

#[test]
fn concurrent_listings_are_coalesced() -> Result<(), Box<dyn error::Error>> {
    let lists = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&lists);
    let registry = BackendRegistry::with_factory(
        Arc::new(MapCredentials::new()),
        move |_: &PathAddress, _: &dyn CredentialSource| {
            Ok(Arc::new(SlowShell {
                lists: Arc::clone(&counter),
            }) as BackendClient)
        },
    );
    let engine = Arc::new(Engine::new(
        registry,
        DirectoryCache::new(CacheSettings::default()),
        RendererDispatch::new(RenderLimits::default()),
    ));
    let addr = PathAddress::parse("ssh://deploy@web1:2222/var/log", Path::new("/"))?;

    let barrier = Arc::new(Barrier::new(2));
    let handles: Vec<_> = (0..2)
        .map(|_| {
            let engine = Arc::clone(&engine);
            let addr = addr.clone();
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                engine.list(&addr, false)
            })
        })
        .collect();

    let mut results = Vec::new();
    for handle in handles {
        let listing = handle.join().map_err(|_| "lister panicked")??;
        results.push(listing);
    }

    assert!(Arc::ptr_eq(&results[0], &results[1]));
    assert_eq!(lists.load(Ordering::SeqCst), 1);
    assert_eq!(results[0].entries()[0].name(), "nginx");

    // a forced refresh goes back to the backend
    engine.list(&addr, true)?;
    assert_eq!(lists.load(Ordering::SeqCst), 2);
    Ok(())
}

#[test]
fn local_images_decode_regardless_of_extension_case() -> Result<(), Box<dyn error::Error>> {
    let temp = tempfile::tempdir()?;
    let img = image::RgbaImage::from_pixel(4, 3, image::Rgba([10, 20, 30, 255]));
    img.save(temp.path().join("photo.png"))?;
    std::fs::copy(temp.path().join("photo.png"), temp.path().join("SHOUT.PNG"))?;

    let engine = engine_with(BackendOptions::default(), Arc::new(MapCredentials::new()));
    let root = PathAddress::local(temp.path(), Path::new("/"));

    for name in ["photo.png", "SHOUT.PNG"] {
        match engine.render(&RenderRequest::new(root.join(name))) {
            RenderResult::Image {
                width,
                height,
                pixels,
            } => {
                assert_eq!((width, height), (4, 3));
                assert_eq!(&pixels[..4], &[10, 20, 30, 255]);
            }
            other => panic!("{name}: expected an image, got {:?}", other.kind()),
        }
    }
    Ok(())
}

#[test]
fn large_csv_is_cut_at_the_row_ceiling() -> Result<(), Box<dyn error::Error>> {
    let temp = tempfile::tempdir()?;
    let mut csv = String::from("id,name\n");
    for i in 0..10_000 {
        csv.push_str(&format!("{i},row{i}\n"));
    }
    std::fs::write(temp.path().join("big.csv"), csv)?;

    let limits = RenderLimits {
        table_rows: 100,
        ..RenderLimits::default()
    };
    let engine = Engine::new(
        BackendRegistry::new(BackendOptions::default(), Arc::new(MapCredentials::new())),
        DirectoryCache::new(CacheSettings::default()),
        RendererDispatch::new(limits),
    );

    let addr = PathAddress::local(&temp.path().join("big.csv"), Path::new("/"));
    match engine.render(&RenderRequest::new(addr)) {
        RenderResult::Table {
            columns,
            rows,
            truncated,
        } => {
            assert_eq!(columns, ["id", "name"]);
            assert_eq!(rows.len(), 100);
            assert_eq!(rows[99], ["99", "row99"]);
            assert!(truncated);
        }
        other => panic!("expected a table, got {:?}", other.kind()),
    }
    Ok(())
}

#[test]
fn local_directory_renders_as_listing() -> Result<(), Box<dyn error::Error>> {
    let temp = tempfile::tempdir()?;
    std::fs::create_dir(temp.path().join("src"))?;
    std::fs::write(temp.path().join("Cargo.toml"), "[package]\n")?;

    let engine = engine_with(BackendOptions::default(), Arc::new(MapCredentials::new()));
    let root = PathAddress::local(temp.path(), Path::new("/"));
    let RenderResult::Directory { listing } = engine.render(&RenderRequest::new(root.clone()))
    else {
        panic!("expected a directory listing");
    };
    let names: Vec<&str> = listing.entries().iter().map(|e| e.name()).collect();
    assert_eq!(names, ["src", "Cargo.toml"]);
    assert!(engine.exists(&root.join("Cargo.toml"))?);
    assert!(!engine.exists(&root.join("missing"))?);
    Ok(())
}
