//! Code host adapter over the GitHub REST contents API.
//!
//! Addresses look like `github://owner/repo@ref/path`. Without a ref, the repository's default
//! branch is looked up once per client and reused.
//!
//! The contents API cannot serve byte ranges reliably. Reads send a `Range` header and fall
//! back to slicing the full response when the server answers `200`, so a ranged read may cost
//! a whole-object download.

use crate::core::address::PathAddress;
use crate::core::backend::object_store::uri_encode;
use crate::core::backend::{Backend, DirectoryEntry, DirectoryListing, RetryPolicy};
use crate::core::error::{BrowseError, ErrorKind, Result};
use crate::core::registry::CredentialSource;

use serde::Deserialize;

use std::io::{self, Read};
use std::sync::Mutex;
use std::time::Duration;

const DEFAULT_API_URL: &str = "https://api.github.com";
const JSON_MEDIA: &str = "application/vnd.github+json";
const RAW_MEDIA: &str = "application/vnd.github.raw";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodeHostOptions {
    pub api_url: String,
    /// Environment variable holding the access token.
    pub token_var: String,
}

impl Default for CodeHostOptions {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_API_URL.to_string(),
            token_var: "GITHUB_TOKEN".to_string(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct ContentItem {
    name: String,
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    size: Option<u64>,
    #[serde(default)]
    sha: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Contents {
    Dir(Vec<ContentItem>),
    File(ContentItem),
}

#[derive(Debug, Deserialize)]
struct RepoInfo {
    default_branch: String,
}

pub struct CodeHostBackend {
    owner: String,
    repo: String,
    api_url: String,
    token: Option<String>,
    default_ref: Mutex<Option<String>>,
    agent: ureq::Agent,
    retry: RetryPolicy,
    label: String,
}

type Reply = std::result::Result<ureq::Response, (u16, String)>;

impl CodeHostBackend {
    pub fn new(
        authority: &str,
        options: &CodeHostOptions,
        credentials: &dyn CredentialSource,
        timeout: Duration,
        retry: RetryPolicy,
    ) -> Result<Self> {
        let Some((owner, repo)) = authority.split_once('/') else {
            return Err(BrowseError::configuration(format!(
                "code host authority '{}' is not owner/repo",
                authority
            )));
        };

        let agent = ureq::AgentBuilder::new()
            .timeout(timeout)
            .user_agent(concat!("lookout/", env!("CARGO_PKG_VERSION")))
            .build();

        Ok(Self {
            owner: owner.to_string(),
            repo: repo.to_string(),
            api_url: options.api_url.trim_end_matches('/').to_string(),
            token: credentials.get(&options.token_var),
            default_ref: Mutex::new(None),
            agent,
            retry,
            label: format!("github://{}", authority),
        })
    }

    fn request(&self, path: &str, query: Option<&str>, headers: &[(&str, &str)]) -> Result<Reply> {
        let mut url = format!("{}{}", self.api_url, uri_encode(path, true));
        if let Some(query) = query {
            url.push('?');
            url.push_str(query);
        }

        let mut req = self
            .agent
            .get(&url)
            .set("X-GitHub-Api-Version", "2022-11-28");
        if let Some(token) = &self.token {
            req = req.set("Authorization", &format!("Bearer {}", token));
        }
        for (name, value) in headers {
            req = req.set(name, value);
        }

        tracing::debug!(url = %url, "code host request");
        match req.call() {
            Ok(resp) => Ok(Ok(resp)),
            Err(ureq::Error::Status(code, resp)) => {
                let limited = resp.header("x-ratelimit-remaining") == Some("0");
                let mut body = resp.into_string().unwrap_or_default();
                if limited {
                    body.push_str(" (rate limit exhausted; set a token)");
                }
                Ok(Err((code, body)))
            }
            Err(ureq::Error::Transport(t)) => Err(BrowseError::network(t.to_string())),
        }
    }

    /// Ref to read from: the address revision, else the cached default branch.
    fn resolve_ref(&self, addr: &PathAddress) -> Result<String> {
        if let Some(rev) = addr.revision() {
            return Ok(rev.to_string());
        }

        let mut cached = self.default_ref.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(branch) = cached.as_ref() {
            return Ok(branch.clone());
        }

        let path = format!("/repos/{}/{}", self.owner, self.repo);
        let resp = self
            .request(&path, None, &[("Accept", JSON_MEDIA)])?
            .map_err(|(code, body)| status_error(code, &body, &self.label))?;
        let info: RepoInfo = serde_json::from_reader(resp.into_reader())
            .map_err(|e| BrowseError::internal(format!("repository metadata: {}", e)))?;

        tracing::debug!(repo = %self.label, branch = %info.default_branch, "resolved default branch");
        *cached = Some(info.default_branch.clone());
        Ok(info.default_branch)
    }

    fn contents_path(&self, addr: &PathAddress) -> String {
        let base = format!("/repos/{}/{}/contents", self.owner, self.repo);
        if addr.is_root() {
            base
        } else {
            format!("{}/{}", base, addr.relative_path())
        }
    }

    fn ref_query(reference: &str) -> String {
        format!("ref={}", uri_encode(reference, false))
    }

    fn fetch_listing(&self, addr: &PathAddress) -> Result<DirectoryListing> {
        let reference = self.resolve_ref(addr)?;
        let query = Self::ref_query(&reference);
        let resp = self
            .request(&self.contents_path(addr), Some(&query), &[("Accept", JSON_MEDIA)])?
            .map_err(|(code, body)| status_error(code, &body, &addr.to_string()))?;

        let etag = resp.header("ETag").map(str::to_string);
        let contents: Contents = serde_json::from_reader(resp.into_reader())
            .map_err(|e| BrowseError::internal(format!("contents of {}: {}", addr, e)))?;

        let Contents::Dir(items) = contents else {
            return Err(BrowseError::not_found(format!("{} is not a directory", addr)));
        };

        let entries = items.into_iter().map(entry_from_item).collect();
        Ok(DirectoryListing::new(addr.clone(), entries, etag))
    }
}

fn entry_from_item(item: ContentItem) -> DirectoryEntry {
    let is_dir = item.kind == "dir";
    let mut entry = DirectoryEntry::new(item.name, is_dir)
        .with_size(if is_dir { None } else { item.size })
        .with_meta("type", item.kind);
    if let Some(sha) = item.sha {
        entry = entry.with_meta("sha", sha);
    }
    entry
}

fn status_error(code: u16, body: &str, target: &str) -> BrowseError {
    let message = serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| v.get("message").and_then(|m| m.as_str()).map(str::to_string))
        .unwrap_or_else(|| body.trim().to_string());
    let text = format!("{} ({}): {}", target, code, message);

    match code {
        401 => BrowseError::auth(text),
        403 => BrowseError::permission_denied(text),
        404 => BrowseError::not_found(text),
        408 | 429 | 500..=599 => BrowseError::network(text),
        _ => BrowseError::internal(text),
    }
}

impl Backend for CodeHostBackend {
    fn list(&self, addr: &PathAddress) -> Result<DirectoryListing> {
        let listing = self.retry.run("list", || self.fetch_listing(addr))?;
        tracing::debug!(address = %addr, count = listing.len(), "listed code host directory");
        Ok(listing)
    }

    /// One contents request for the item itself; a directory answers with an array.
    fn stat(&self, addr: &PathAddress) -> Result<DirectoryEntry> {
        if addr.is_root() {
            return Ok(DirectoryEntry::new(self.repo.clone(), true));
        }
        let reference = self.resolve_ref(addr)?;
        let query = Self::ref_query(&reference);

        self.retry.run("stat", || {
            let resp = self
                .request(&self.contents_path(addr), Some(&query), &[("Accept", JSON_MEDIA)])?
                .map_err(|(code, body)| status_error(code, &body, &addr.to_string()))?;
            let contents: Contents = serde_json::from_reader(resp.into_reader())
                .map_err(|e| BrowseError::internal(format!("metadata of {}: {}", addr, e)))?;
            Ok(match contents {
                Contents::File(item) => entry_from_item(item),
                Contents::Dir(_) => DirectoryEntry::new(addr.name().unwrap_or_default(), true)
                    .with_meta("type", "dir"),
            })
        })
    }

    fn open_range(&self, addr: &PathAddress, offset: u64, len: u64) -> Result<Vec<u8>> {
        if addr.is_root() {
            return Err(BrowseError::unsupported(format!("{} is a directory", addr)));
        }
        if len == 0 {
            return Ok(Vec::new());
        }

        let reference = self.resolve_ref(addr)?;
        let query = Self::ref_query(&reference);
        let range = format!("bytes={}-{}", offset, offset.saturating_add(len - 1));

        self.retry.run("read", || {
            let headers = [("Accept", RAW_MEDIA), ("Range", range.as_str())];
            let resp = match self.request(&self.contents_path(addr), Some(&query), &headers)? {
                Ok(resp) => resp,
                Err((416, _)) => return Ok(Vec::new()),
                Err((code, body)) => return Err(status_error(code, &body, &addr.to_string())),
            };

            let whole_object = resp.status() == 200;
            let mut reader = resp.into_reader();
            if whole_object {
                io::copy(&mut reader.by_ref().take(offset), &mut io::sink())?;
            }
            let mut buf = Vec::with_capacity(len.min(1 << 20) as usize);
            reader.take(len).read_to_end(&mut buf)?;
            Ok(buf)
        })
    }

    fn exists(&self, addr: &PathAddress) -> Result<bool> {
        match self.stat(addr) {
            Ok(_) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Conditional listing request: `304 Not Modified` confirms the known ETag.
    fn probe_revision(&self, addr: &PathAddress, known: Option<&str>) -> Result<Option<String>> {
        let Some(known) = known else {
            return Ok(None);
        };
        let reference = self.resolve_ref(addr)?;
        let query = Self::ref_query(&reference);
        let headers = [("Accept", JSON_MEDIA), ("If-None-Match", known)];

        match self.request(&self.contents_path(addr), Some(&query), &headers)? {
            Ok(resp) if resp.status() == 304 => Ok(Some(known.to_string())),
            Ok(resp) => Ok(resp.header("ETag").map(str::to_string)),
            Err((code, body)) => Err(status_error(code, &body, &addr.to_string())),
        }
    }

    fn label(&self) -> &str {
        &self.label
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn directory_items_become_entries() -> std::result::Result<(), Box<dyn std::error::Error>> {
        let body = r#"[
            {"name": "src", "path": "src", "type": "dir", "size": 0, "sha": "a1"},
            {"name": "README.md", "path": "README.md", "type": "file", "size": 120, "sha": "b2"}
        ]"#;
        let Contents::Dir(items) = serde_json::from_str::<Contents>(body)? else {
            return Err("expected a directory".into());
        };
        let entries: Vec<DirectoryEntry> = items.into_iter().map(entry_from_item).collect();

        assert!(entries[0].is_dir());
        assert_eq!(entries[0].size(), None);
        assert_eq!(entries[1].size(), Some(120));
        assert_eq!(entries[1].metadata().get("sha").map(String::as_str), Some("b2"));
        Ok(())
    }

    #[test]
    fn single_file_is_not_a_listing() -> std::result::Result<(), Box<dyn std::error::Error>> {
        let body = r#"{"name": "lib.rs", "path": "src/lib.rs", "type": "file", "size": 10}"#;
        assert!(matches!(serde_json::from_str::<Contents>(body)?, Contents::File(_)));
        Ok(())
    }

    #[test]
    fn statuses_map_onto_kinds() {
        let bad = r#"{"message": "Bad credentials"}"#;
        let err = status_error(401, bad, "github://o/r");
        assert_eq!(err.kind(), ErrorKind::Auth);
        assert!(err.message().contains("Bad credentials"));

        assert_eq!(status_error(403, "", "x").kind(), ErrorKind::PermissionDenied);
        assert_eq!(status_error(404, "", "x").kind(), ErrorKind::NotFound);
        assert_eq!(status_error(502, "", "x").kind(), ErrorKind::Network);
    }
}
