//! S3-compatible object store adapter.
//!
//! Talks plain REST over `ureq` with path-style addressing (`{endpoint}/{bucket}/{key}`), so
//! the same code drives AWS, MinIO and other compatible servers. Requests are signed with
//! AWS Signature V4 unless the client runs anonymously.
//!
//! Object stores have no directories: a "directory" is a key prefix ending in `/`, listed
//! with `ListObjectsV2` and a `/` delimiter. The empty authority (`s3://`) lists buckets.
//!
//! There is no cheap way to ask whether a prefix changed, so [Backend::probe_revision] keeps
//! the default `None` and the cache falls back to TTL for this scheme.

use crate::core::address::PathAddress;
use crate::core::backend::{Backend, DirectoryEntry, DirectoryListing, RetryPolicy};
use crate::core::error::{BrowseError, Result};
use crate::core::registry::CredentialSource;

use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256};

use std::io::{self, Read};
use std::time::{Duration, SystemTime};

type HmacSha256 = Hmac<Sha256>;

/// SHA-256 of the empty body; every request we send is a bodiless GET or HEAD.
const EMPTY_PAYLOAD_SHA256: &str =
    "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855";
const DEFAULT_REGION: &str = "us-east-1";

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ObjectStoreOptions {
    /// Override for the service endpoint (`http://localhost:9000` for MinIO).
    pub endpoint: Option<String>,
    pub region: Option<String>,
    /// Skip signing entirely; only public buckets will answer.
    pub anonymous: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct AwsCredentials {
    access_key: String,
    secret_key: String,
    session_token: Option<String>,
}

impl AwsCredentials {
    fn from_source(source: &dyn CredentialSource) -> Option<Self> {
        Some(Self {
            access_key: source.get("AWS_ACCESS_KEY_ID")?,
            secret_key: source.get("AWS_SECRET_ACCESS_KEY")?,
            session_token: source.get("AWS_SESSION_TOKEN"),
        })
    }
}

pub struct ObjectStoreBackend {
    bucket: String,
    endpoint: String,
    host: String,
    region: String,
    credentials: Option<AwsCredentials>,
    anonymous: bool,
    agent: ureq::Agent,
    retry: RetryPolicy,
    label: String,
}

/// A response, or the status and body of a non-2xx answer.
type Reply = std::result::Result<ureq::Response, (u16, String)>;

impl ObjectStoreBackend {
    pub fn new(
        bucket: &str,
        options: &ObjectStoreOptions,
        credentials: &dyn CredentialSource,
        timeout: Duration,
        retry: RetryPolicy,
    ) -> Result<Self> {
        let region = options
            .region
            .clone()
            .or_else(|| credentials.get("AWS_REGION"))
            .or_else(|| credentials.get("AWS_DEFAULT_REGION"))
            .unwrap_or_else(|| DEFAULT_REGION.to_string());

        let endpoint = options
            .endpoint
            .clone()
            .or_else(|| credentials.get("AWS_ENDPOINT_URL"))
            .unwrap_or_else(|| format!("https://s3.{}.amazonaws.com", region));
        let endpoint = endpoint.trim_end_matches('/').to_string();
        let host = host_of(&endpoint).ok_or_else(|| {
            BrowseError::configuration(format!("invalid object store endpoint '{}'", endpoint))
        })?;

        let agent = ureq::AgentBuilder::new()
            .timeout(timeout)
            .user_agent(concat!("lookout/", env!("CARGO_PKG_VERSION")))
            .build();

        Ok(Self {
            bucket: bucket.to_string(),
            label: format!("s3://{}", bucket),
            endpoint,
            host,
            region,
            credentials: AwsCredentials::from_source(credentials),
            anonymous: options.anonymous,
            agent,
            retry,
        })
    }

    /// Sends a signed bodiless request. `path` starts with `/` and is not yet encoded.
    fn request(
        &self,
        method: &str,
        path: &str,
        query: &[(&str, String)],
        headers: &[(&str, String)],
    ) -> Result<Reply> {
        let canonical_uri = encode_path(path);
        let canonical_query = canonical_query(query);
        let mut url = format!("{}{}", self.endpoint, canonical_uri);
        if !canonical_query.is_empty() {
            url.push('?');
            url.push_str(&canonical_query);
        }

        let mut req = self.agent.request(method, &url);
        for (name, value) in headers {
            req = req.set(name, value);
        }

        if !self.anonymous {
            let creds = self.credentials.as_ref().ok_or_else(|| {
                BrowseError::auth(
                    "no object store credentials: set AWS_ACCESS_KEY_ID and AWS_SECRET_ACCESS_KEY",
                )
            })?;
            let amz_date = Utc::now().format("%Y%m%dT%H%M%SZ").to_string();
            let signed = sign_v4(&SigningInput {
                method,
                host: &self.host,
                canonical_uri: &canonical_uri,
                canonical_query: &canonical_query,
                headers,
                region: &self.region,
                amz_date: &amz_date,
                credentials: creds,
            })?;
            for (name, value) in &signed {
                req = req.set(name, value);
            }
        }

        tracing::debug!(method, url = %url, "object store request");
        match req.call() {
            Ok(resp) => Ok(Ok(resp)),
            Err(ureq::Error::Status(code, resp)) => {
                Ok(Err((code, resp.into_string().unwrap_or_default())))
            }
            Err(ureq::Error::Transport(t)) => Err(BrowseError::network(t.to_string())),
        }
    }

    fn send(
        &self,
        method: &str,
        path: &str,
        query: &[(&str, String)],
        target: &str,
    ) -> Result<ureq::Response> {
        self.request(method, path, query, &[])?
            .map_err(|(code, body)| status_error(code, &body, target))
    }

    fn list_buckets(&self, addr: &PathAddress) -> Result<DirectoryListing> {
        let body = self
            .send("GET", "/", &[], "bucket list")?
            .into_string()
            .map_err(BrowseError::from)?;

        let entries = xml_blocks(&body, "Bucket")
            .into_iter()
            .filter_map(|block| {
                let name = xml_text(block, "Name")?;
                let created = xml_text(block, "CreationDate").and_then(|d| parse_rfc3339(&d));
                Some(DirectoryEntry::new(name, true).with_modified(created))
            })
            .collect();
        Ok(DirectoryListing::new(addr.clone(), entries, None))
    }

    fn list_prefix(&self, addr: &PathAddress) -> Result<DirectoryListing> {
        let prefix = dir_prefix(addr);
        let mut entries = Vec::new();
        let mut marker_found = false;
        let mut continuation: Option<String> = None;

        loop {
            let mut query = vec![
                ("list-type", "2".to_string()),
                ("delimiter", "/".to_string()),
                ("prefix", prefix.clone()),
            ];
            if let Some(token) = &continuation {
                query.push(("continuation-token", token.clone()));
            }

            let body = self
                .send("GET", &format!("/{}", self.bucket), &query, &addr.to_string())?
                .into_string()
                .map_err(BrowseError::from)?;

            let page = parse_list_page(&body, &prefix);
            marker_found |= page.marker_found;
            entries.extend(page.entries);

            match page.next_token {
                Some(token) if page.truncated => continuation = Some(token),
                _ => break,
            }
        }

        if entries.is_empty() && !marker_found && !addr.is_root() {
            return Err(BrowseError::not_found(format!("{} does not exist", addr)));
        }

        tracing::debug!(address = %addr, count = entries.len(), "listed object store prefix");
        Ok(DirectoryListing::new(addr.clone(), entries, None))
    }

    fn head_object(&self, addr: &PathAddress) -> Result<Option<DirectoryEntry>> {
        let path = format!("/{}/{}", self.bucket, addr.relative_path());
        match self.request("HEAD", &path, &[], &[])? {
            Ok(resp) => {
                let size = resp
                    .header("Content-Length")
                    .and_then(|v| v.parse::<u64>().ok());
                let modified = resp.header("Last-Modified").and_then(parse_rfc2822);
                let mut entry = DirectoryEntry::new(addr.name().unwrap_or_default(), false)
                    .with_size(size)
                    .with_modified(modified);
                if let Some(etag) = resp.header("ETag") {
                    entry = entry.with_meta("etag", etag.trim_matches('"'));
                }
                if let Some(ct) = resp.header("Content-Type") {
                    entry = entry.with_meta("content-type", ct);
                }
                Ok(Some(entry))
            }
            Err((404, _)) => Ok(None),
            Err((code, body)) => Err(status_error(code, &body, &addr.to_string())),
        }
    }
}

impl Backend for ObjectStoreBackend {
    fn list(&self, addr: &PathAddress) -> Result<DirectoryListing> {
        if self.bucket.is_empty() {
            return self.retry.run("list", || self.list_buckets(addr));
        }
        self.retry.run("list", || self.list_prefix(addr))
    }

    fn stat(&self, addr: &PathAddress) -> Result<DirectoryEntry> {
        if addr.is_root() {
            let name = if self.bucket.is_empty() { "/" } else { self.bucket.as_str() };
            return Ok(DirectoryEntry::new(name, true));
        }

        if let Some(entry) = self.retry.run("stat", || self.head_object(addr))? {
            return Ok(entry);
        }

        // no object under the exact key; it may still be a prefix
        let query = [
            ("list-type", "2".to_string()),
            ("delimiter", "/".to_string()),
            ("max-keys", "1".to_string()),
            ("prefix", dir_prefix(addr)),
        ];
        let body = self
            .send("GET", &format!("/{}", self.bucket), &query, &addr.to_string())?
            .into_string()
            .map_err(BrowseError::from)?;
        if body.contains("<Contents>") || body.contains("<CommonPrefixes>") {
            return Ok(DirectoryEntry::new(addr.name().unwrap_or_default(), true));
        }
        Err(BrowseError::not_found(format!("{} does not exist", addr)))
    }

    fn open_range(&self, addr: &PathAddress, offset: u64, len: u64) -> Result<Vec<u8>> {
        if self.bucket.is_empty() || addr.is_root() {
            return Err(BrowseError::unsupported(format!("{} is a directory", addr)));
        }
        if len == 0 {
            return Ok(Vec::new());
        }

        let path = format!("/{}/{}", self.bucket, addr.relative_path());
        let range = format!("bytes={}-{}", offset, offset.saturating_add(len - 1));

        self.retry.run("read", || {
            let resp = match self.request("GET", &path, &[], &[("range", range.clone())])? {
                Ok(resp) => resp,
                // offset at or past the end of the object
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
            Err(e) if e.kind() == crate::core::error::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e),
        }
    }

    fn label(&self) -> &str {
        &self.label
    }
}

/// Key prefix of a directory address: `a/b/` or the empty string for the bucket root.
fn dir_prefix(addr: &PathAddress) -> String {
    if addr.is_root() {
        String::new()
    } else {
        format!("{}/", addr.relative_path())
    }
}

fn host_of(endpoint: &str) -> Option<String> {
    let rest = endpoint
        .strip_prefix("https://")
        .or_else(|| endpoint.strip_prefix("http://"))?;
    let host = rest.split('/').next()?;
    (!host.is_empty()).then(|| host.to_string())
}

/// Maps an S3 error answer onto the error taxonomy.
fn status_error(code: u16, body: &str, target: &str) -> BrowseError {
    let s3_code = xml_text(body, "Code").unwrap_or_default();
    let message = xml_text(body, "Message").unwrap_or_else(|| format!("HTTP {}", code));
    let text = format!("{} ({}): {}", target, code, message);

    match (code, s3_code.as_str()) {
        (_, "InvalidAccessKeyId" | "SignatureDoesNotMatch" | "ExpiredToken" | "InvalidToken") => {
            BrowseError::auth(text)
        }
        (401, _) => BrowseError::auth(text),
        (403, _) => BrowseError::permission_denied(text),
        (404, _) => BrowseError::not_found(text),
        (301 | 307 | 400, _) => BrowseError::configuration(text),
        (408 | 429, _) | (500..=599, _) => BrowseError::network(text),
        _ => BrowseError::internal(text),
    }
}

fn parse_rfc3339(value: &str) -> Option<SystemTime> {
    DateTime::parse_from_rfc3339(value)
        .ok()
        .map(|dt| SystemTime::from(dt.with_timezone(&Utc)))
}

fn parse_rfc2822(value: &str) -> Option<SystemTime> {
    DateTime::parse_from_rfc2822(value)
        .ok()
        .map(|dt| SystemTime::from(dt.with_timezone(&Utc)))
}

struct ListPage {
    entries: Vec<DirectoryEntry>,
    marker_found: bool,
    truncated: bool,
    next_token: Option<String>,
}

fn parse_list_page(body: &str, prefix: &str) -> ListPage {
    let mut entries = Vec::new();
    let mut marker_found = false;

    for block in xml_blocks(body, "CommonPrefixes") {
        let Some(full) = xml_text(block, "Prefix") else {
            continue;
        };
        let name = full
            .strip_prefix(prefix)
            .unwrap_or(&full)
            .trim_end_matches('/');
        if !name.is_empty() {
            entries.push(DirectoryEntry::new(name, true));
        }
    }

    for block in xml_blocks(body, "Contents") {
        let Some(key) = xml_text(block, "Key") else {
            continue;
        };
        let name = key.strip_prefix(prefix).unwrap_or(&key);
        // the zero-byte "folder" object some tools create
        if name.is_empty() {
            marker_found = true;
            continue;
        }

        let mut entry = DirectoryEntry::new(name, false)
            .with_size(xml_text(block, "Size").and_then(|s| s.parse().ok()))
            .with_modified(xml_text(block, "LastModified").and_then(|d| parse_rfc3339(&d)));
        if let Some(etag) = xml_text(block, "ETag") {
            entry = entry.with_meta("etag", etag.trim_matches('"'));
        }
        if let Some(class) = xml_text(block, "StorageClass") {
            entry = entry.with_meta("storage-class", class);
        }
        entries.push(entry);
    }

    ListPage {
        entries,
        marker_found,
        truncated: xml_text(body, "IsTruncated").is_some_and(|t| t == "true"),
        next_token: xml_text(body, "NextContinuationToken"),
    }
}

/// Inner text of every `<tag>...</tag>` element, in document order.
/// The S3 list responses are flat enough that a tag scanner is sufficient.
fn xml_blocks<'a>(xml: &'a str, tag: &str) -> Vec<&'a str> {
    let open = format!("<{}>", tag);
    let close = format!("</{}>", tag);
    let mut out = Vec::new();
    let mut rest = xml;
    while let Some(start) = rest.find(&open) {
        let after = &rest[start + open.len()..];
        let Some(end) = after.find(&close) else {
            break;
        };
        out.push(&after[..end]);
        rest = &after[end + close.len()..];
    }
    out
}

fn xml_text(xml: &str, tag: &str) -> Option<String> {
    xml_blocks(xml, tag).first().map(|raw| xml_unescape(raw))
}

/// Decodes the five named entities and numeric references (`&#10;`, `&#x2F;`).
/// Unknown or malformed references are kept verbatim.
fn xml_unescape(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut rest = raw;
    while let Some(start) = rest.find('&') {
        out.push_str(&rest[..start]);
        let tail = &rest[start..];
        let decoded = tail.find(';').and_then(|end| {
            let entity = &tail[1..end];
            let ch = match entity {
                "quot" => Some('"'),
                "apos" => Some('\''),
                "lt" => Some('<'),
                "gt" => Some('>'),
                "amp" => Some('&'),
                _ => entity
                    .strip_prefix("#x")
                    .or_else(|| entity.strip_prefix("#X"))
                    .map(|hex| u32::from_str_radix(hex, 16))
                    .or_else(|| entity.strip_prefix('#').map(str::parse::<u32>))
                    .and_then(|code| code.ok())
                    .and_then(char::from_u32),
            };
            ch.map(|c| (c, end + 1))
        });
        match decoded {
            Some((c, consumed)) => {
                out.push(c);
                rest = &tail[consumed..];
            }
            None => {
                out.push('&');
                rest = &tail[1..];
            }
        }
    }
    out.push_str(rest);
    out
}

// SigV4

pub(crate) fn uri_encode(input: &str, keep_slash: bool) -> String {
    let mut out = String::with_capacity(input.len());
    for b in input.bytes() {
        match b {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                out.push(b as char)
            }
            b'/' if keep_slash => out.push('/'),
            _ => out.push_str(&format!("%{:02X}", b)),
        }
    }
    out
}

fn encode_path(path: &str) -> String {
    uri_encode(path, true)
}

fn canonical_query(query: &[(&str, String)]) -> String {
    let mut pairs: Vec<(String, String)> = query
        .iter()
        .map(|(k, v)| (uri_encode(k, false), uri_encode(v, false)))
        .collect();
    pairs.sort();
    pairs
        .iter()
        .map(|(k, v)| format!("{}={}", k, v))
        .collect::<Vec<_>>()
        .join("&")
}

fn hmac(key: &[u8], data: &str) -> Result<Vec<u8>> {
    let mut mac = HmacSha256::new_from_slice(key)
        .map_err(|e| BrowseError::internal(format!("hmac key: {}", e)))?;
    mac.update(data.as_bytes());
    Ok(mac.finalize().into_bytes().to_vec())
}

struct SigningInput<'a> {
    method: &'a str,
    host: &'a str,
    canonical_uri: &'a str,
    canonical_query: &'a str,
    /// Extra headers that travel with the request and are signed too.
    headers: &'a [(&'a str, String)],
    region: &'a str,
    amz_date: &'a str,
    credentials: &'a AwsCredentials,
}

/// Headers to add to the request: `x-amz-*` and `authorization`.
fn sign_v4(input: &SigningInput<'_>) -> Result<Vec<(String, String)>> {
    let date = input.amz_date.get(..8).unwrap_or(input.amz_date);

    let mut added = vec![
        ("x-amz-content-sha256".to_string(), EMPTY_PAYLOAD_SHA256.to_string()),
        ("x-amz-date".to_string(), input.amz_date.to_string()),
    ];
    if let Some(token) = &input.credentials.session_token {
        added.push(("x-amz-security-token".to_string(), token.clone()));
    }

    let mut canonical: Vec<(String, String)> = vec![("host".to_string(), input.host.to_string())];
    canonical.extend(
        input
            .headers
            .iter()
            .map(|(k, v)| (k.to_ascii_lowercase(), v.trim().to_string())),
    );
    canonical.extend(added.iter().cloned());
    canonical.sort();

    let canonical_headers: String = canonical
        .iter()
        .map(|(k, v)| format!("{}:{}\n", k, v))
        .collect();
    let signed_headers = canonical
        .iter()
        .map(|(k, _)| k.as_str())
        .collect::<Vec<_>>()
        .join(";");

    let canonical_request = format!(
        "{}\n{}\n{}\n{}\n{}\n{}",
        input.method,
        input.canonical_uri,
        input.canonical_query,
        canonical_headers,
        signed_headers,
        EMPTY_PAYLOAD_SHA256
    );

    let scope = format!("{}/{}/s3/aws4_request", date, input.region);
    let string_to_sign = format!(
        "AWS4-HMAC-SHA256\n{}\n{}\n{}",
        input.amz_date,
        scope,
        hex::encode(Sha256::digest(canonical_request.as_bytes()))
    );

    let k_date = hmac(
        format!("AWS4{}", input.credentials.secret_key).as_bytes(),
        date,
    )?;
    let k_region = hmac(&k_date, input.region)?;
    let k_service = hmac(&k_region, "s3")?;
    let k_signing = hmac(&k_service, "aws4_request")?;
    let signature = hex::encode(hmac(&k_signing, &string_to_sign)?);

    added.push((
        "authorization".to_string(),
        format!(
            "AWS4-HMAC-SHA256 Credential={}/{}, SignedHeaders={}, Signature={}",
            input.credentials.access_key, scope, signed_headers, signature
        ),
    ));
    Ok(added)
}
