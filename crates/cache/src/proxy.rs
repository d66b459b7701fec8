use std::io;
use std::path::{Path, PathBuf};

use log::{debug, error, info, warn};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;

/// The proxy cache's backing directory failed in a way that is not
/// per-entry recoverable.
#[derive(Debug, Error)]
pub enum ProxyError {
    #[error("proxy cache io error: {0}")]
    Io(#[from] io::Error),
    #[error("proxy cache metadata error: {0}")]
    Meta(#[from] serde_json::Error),
}

/// Outcome of routing one request through the proxy cache.
#[derive(Debug)]
pub enum ProxyFetch {
    /// The request is not HTTP(S) and is passed through unintercepted.
    Bypass,
    Response(ProxyResponse),
}

#[derive(Debug)]
pub struct ProxyResponse {
    pub status: StatusCode,
    pub content_type: Option<String>,
    pub body: Vec<u8>,
    pub source: ResponseSource,
}

impl ProxyResponse {
    fn service_unavailable() -> Self {
        ProxyResponse {
            status: StatusCode::SERVICE_UNAVAILABLE,
            content_type: None,
            body: b"Service Unavailable".to_vec(),
            source: ResponseSource::Synthesized,
        }
    }
}

/// Where a [`ProxyResponse`] came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseSource {
    Network,
    Cache,
    Synthesized,
}

/// One cached response: body blob plus a JSON sidecar.
#[derive(Serialize, Deserialize)]
struct EntryMeta {
    url: String,
    status: u16,
    content_type: Option<String>,
}

/// Generational cache sitting between the application shell and the network.
///
/// Each deployed version owns one generation, a directory under `root` named
/// after it. [`install`](Self::install) precaches a fixed manifest into the
/// current generation, [`activate`](Self::activate) deletes every other
/// generation, and [`fetch`](Self::fetch) routes requests: model artifacts
/// cache-first, everything else network-first with a cached fallback.
pub struct AssetProxyCache {
    client: reqwest::Client,
    root: PathBuf,
    generation: String,
    manifest: Vec<String>,
}

impl AssetProxyCache {
    pub fn new(
        root: impl Into<PathBuf>,
        generation: impl Into<String>,
        manifest: Vec<String>,
    ) -> Self {
        Self::with_client(reqwest::Client::new(), root, generation, manifest)
    }

    pub fn with_client(
        client: reqwest::Client,
        root: impl Into<PathBuf>,
        generation: impl Into<String>,
        manifest: Vec<String>,
    ) -> Self {
        Self {
            client,
            root: root.into(),
            generation: generation.into(),
            manifest,
        }
    }

    pub fn generation(&self) -> &str {
        &self.generation
    }

    pub fn manifest(&self) -> &[String] {
        &self.manifest
    }

    /// Precache every manifest entry into the current generation.
    ///
    /// An entry that cannot be fetched or stored is logged and skipped; it
    /// simply will not be servable offline. Only a failure to create the
    /// generation directory itself aborts the install.
    pub async fn install(&self) -> Result<(), ProxyError> {
        let dir = self.generation_dir();
        tokio::fs::create_dir_all(&dir).await?;
        info!(
            "installing cache generation {} ({} manifest entries)",
            self.generation,
            self.manifest.len()
        );

        for url in &self.manifest {
            match self.network_fetch(url).await {
                Ok(response) if response.status.is_success() => {
                    if let Err(e) = store_response(
                        &dir,
                        url,
                        response.status,
                        response.content_type.as_deref(),
                        &response.body,
                    )
                    .await
                    {
                        warn!("failed to precache {}: {}", url, e);
                    }
                }
                Ok(response) => {
                    warn!("skipping manifest entry {}: status {}", url, response.status)
                }
                Err(e) => warn!("skipping manifest entry {}: {}", url, e),
            }
        }
        Ok(())
    }

    /// Delete every cache generation other than the current one.
    pub async fn activate(&self) -> Result<(), ProxyError> {
        tokio::fs::create_dir_all(&self.root).await?;
        let mut entries = tokio::fs::read_dir(&self.root).await?;
        while let Some(entry) = entries.next_entry().await? {
            if !entry.file_type().await?.is_dir() {
                continue;
            }
            let name = entry.file_name().to_string_lossy().into_owned();
            if name != self.generation {
                info!("deleting stale cache generation {}", name);
                if let Err(e) = tokio::fs::remove_dir_all(entry.path()).await {
                    warn!("failed to delete stale generation {}: {}", name, e);
                }
            }
        }
        Ok(())
    }

    /// Delete every generation, current one included.
    pub async fn purge_all(&self) -> Result<(), ProxyError> {
        match tokio::fs::remove_dir_all(&self.root).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    /// Route one request.
    ///
    /// Non-HTTP(S) URLs are bypassed. Model artifacts (`.onnx`) are served
    /// cache-first: a cached copy is returned without touching the network.
    /// Everything else (and artifact cache misses) is network-first: the
    /// live response is returned immediately and a copy is written to the
    /// current generation in the background; on network failure the cached
    /// copy is served, or a 503 is synthesized if there is none.
    pub async fn fetch(&self, url: &str) -> ProxyFetch {
        if !url.starts_with("http://") && !url.starts_with("https://") {
            return ProxyFetch::Bypass;
        }
        if url.ends_with(".onnx") {
            if let Some(cached) = self.cached_lookup(url).await {
                debug!("serving {} from generation {}", url, self.generation);
                return ProxyFetch::Response(cached);
            }
        }
        ProxyFetch::Response(self.network_first(url).await)
    }

    async fn network_first(&self, url: &str) -> ProxyResponse {
        match self.network_fetch(url).await {
            Ok(response) => {
                self.spawn_cache_write(url, &response);
                response
            }
            Err(e) => {
                warn!("network fetch for {} failed, falling back to cache: {}", url, e);
                match self.cached_lookup(url).await {
                    Some(cached) => cached,
                    None => ProxyResponse::service_unavailable(),
                }
            }
        }
    }

    /// Copy a live response into the current generation without delaying the
    /// caller. A failed write is logged and the response is unaffected.
    fn spawn_cache_write(&self, url: &str, response: &ProxyResponse) {
        let dir = self.generation_dir();
        let url = url.to_string();
        let status = response.status;
        let content_type = response.content_type.clone();
        let body = response.body.clone();
        tokio::spawn(async move {
            if let Err(e) =
                store_response(&dir, &url, status, content_type.as_deref(), &body).await
            {
                error!("failed to cache response for {}: {}", url, e);
            }
        });
    }

    async fn network_fetch(&self, url: &str) -> Result<ProxyResponse, reqwest::Error> {
        let response = self.client.get(url).send().await?;
        let status = response.status();
        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let body = response.bytes().await?.to_vec();
        Ok(ProxyResponse {
            status,
            content_type,
            body,
            source: ResponseSource::Network,
        })
    }

    /// The entry cached for `url` in the current generation, if any.
    /// Never touches the network.
    pub async fn cached_lookup(&self, url: &str) -> Option<ProxyResponse> {
        let base = self.generation_dir().join(entry_name(url));
        let meta = tokio::fs::read(base.with_extension("meta")).await.ok()?;
        let meta: EntryMeta = serde_json::from_slice(&meta).ok()?;
        let body = tokio::fs::read(&base).await.ok()?;
        Some(ProxyResponse {
            status: StatusCode::from_u16(meta.status).ok()?,
            content_type: meta.content_type,
            body,
            source: ResponseSource::Cache,
        })
    }

    fn generation_dir(&self) -> PathBuf {
        self.root.join(&self.generation)
    }
}

fn entry_name(url: &str) -> String {
    format!("{:x}", Sha256::digest(url.as_bytes()))
}

/// Write one entry: body blob first (via a rename), then the meta sidecar.
/// A crash in between leaves a body without meta, which lookups treat as a
/// miss.
async fn store_response(
    dir: &Path,
    url: &str,
    status: StatusCode,
    content_type: Option<&str>,
    body: &[u8],
) -> Result<(), ProxyError> {
    tokio::fs::create_dir_all(dir).await?;
    let base = dir.join(entry_name(url));
    let partial = base.with_extension("partial");
    tokio::fs::write(&partial, body).await?;
    tokio::fs::rename(&partial, &base).await?;

    let meta = EntryMeta {
        url: url.to_string(),
        status: status.as_u16(),
        content_type: content_type.map(str::to_string),
    };
    tokio::fs::write(base.with_extension("meta"), serde_json::to_vec(&meta)?).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tempfile::TempDir;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const GENERATION: &str = "octiq-shell-v1";

    fn proxy(root: &Path, manifest: Vec<String>) -> AssetProxyCache {
        AssetProxyCache::new(root, GENERATION, manifest)
    }

    async fn mount_text(server: &MockServer, route: &str, body: &str) {
        // set_body_raw rather than insert_header + set_body_string: the
        // latter overrides content-type with text/plain when the response
        // is generated.
        Mock::given(method("GET"))
            .and(path(route))
            .respond_with(ResponseTemplate::new(200).set_body_raw(body, "text/html"))
            .mount(server)
            .await;
    }

    /// Wait for the decoupled cache write to land.
    async fn poll_cached(proxy: &AssetProxyCache, url: &str) -> ProxyResponse {
        for _ in 0..100 {
            if let Some(hit) = proxy.cached_lookup(url).await {
                return hit;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("cache write for {} never landed", url);
    }

    #[tokio::test]
    async fn non_http_requests_are_bypassed() {
        let dir = TempDir::new().unwrap();
        let proxy = proxy(dir.path(), Vec::new());

        assert!(matches!(proxy.fetch("file:///etc/hosts").await, ProxyFetch::Bypass));
        assert!(matches!(
            proxy.fetch("chrome-extension://abcdef/page.html").await,
            ProxyFetch::Bypass
        ));
    }

    #[tokio::test]
    async fn install_precaches_manifest_and_serves_offline() {
        // Non-pooled so drop(server) actually frees the port.
        let server = MockServer::builder().start().await;
        mount_text(&server, "/index.html", "<html>shell</html>").await;
        let url = format!("{}/index.html", server.uri());

        let dir = TempDir::new().unwrap();
        let proxy = proxy(dir.path(), vec![url.clone()]);
        proxy.install().await.unwrap();
        drop(server);

        let response = match proxy.fetch(&url).await {
            ProxyFetch::Response(r) => r,
            other => panic!("expected response, got {:?}", other),
        };
        assert_eq!(response.source, ResponseSource::Cache);
        assert_eq!(response.status, StatusCode::OK);
        assert_eq!(response.body, b"<html>shell</html>");
        assert_eq!(response.content_type.as_deref(), Some("text/html"));
    }

    #[tokio::test]
    async fn install_skips_entries_it_cannot_fetch() {
        let server = MockServer::start().await;
        mount_text(&server, "/app.js", "console.log('ok')").await;
        let good = format!("{}/app.js", server.uri());
        let missing = format!("{}/gone.css", server.uri());

        let dir = TempDir::new().unwrap();
        let proxy = proxy(dir.path(), vec![good.clone(), missing.clone()]);
        proxy.install().await.unwrap();
        drop(server);

        assert!(proxy.cached_lookup(&good).await.is_some());
        assert!(proxy.cached_lookup(&missing).await.is_none());
    }

    #[tokio::test]
    async fn activate_deletes_every_stale_generation() {
        let dir = TempDir::new().unwrap();
        let stale_a = dir.path().join("octiq-shell-v0");
        let stale_b = dir.path().join("demo-pwa-cache-v1");
        std::fs::create_dir_all(&stale_a).unwrap();
        std::fs::create_dir_all(&stale_b).unwrap();
        std::fs::write(stale_a.join("blob"), b"old").unwrap();
        let current = dir.path().join(GENERATION);
        std::fs::create_dir_all(&current).unwrap();
        std::fs::write(current.join("blob"), b"new").unwrap();

        let proxy = proxy(dir.path(), Vec::new());
        proxy.activate().await.unwrap();

        assert!(!stale_a.exists());
        assert!(!stale_b.exists());
        assert!(current.join("blob").exists());
    }

    #[tokio::test]
    async fn lookups_never_read_superseded_generations() {
        // An entry cached under an old generation must not satisfy fetches
        // once the new generation takes over, even with the network gone.
        // Non-pooled so drop(server) actually frees the port.
        let server = MockServer::builder().start().await;
        let url = format!("{}/index.html", server.uri());
        drop(server);

        let dir = TempDir::new().unwrap();
        let old_dir = dir.path().join("octiq-shell-v0");
        store_response(&old_dir, &url, StatusCode::OK, Some("text/html"), b"stale shell")
            .await
            .unwrap();
        let old = AssetProxyCache::new(dir.path(), "octiq-shell-v0", Vec::new());
        assert!(old.cached_lookup(&url).await.is_some());

        let current = proxy(dir.path(), Vec::new());
        current.activate().await.unwrap();

        let response = match current.fetch(&url).await {
            ProxyFetch::Response(r) => r,
            other => panic!("expected response, got {:?}", other),
        };
        assert_eq!(response.status, StatusCode::SERVICE_UNAVAILABLE);
        assert!(!old_dir.exists());
    }

    #[tokio::test]
    async fn network_first_returns_live_response_and_caches_it() {
        let server = MockServer::start().await;
        mount_text(&server, "/index.html", "v1").await;
        let url = format!("{}/index.html", server.uri());

        let dir = TempDir::new().unwrap();
        let proxy = proxy(dir.path(), Vec::new());

        let response = match proxy.fetch(&url).await {
            ProxyFetch::Response(r) => r,
            other => panic!("expected response, got {:?}", other),
        };
        assert_eq!(response.source, ResponseSource::Network);
        assert_eq!(response.body, b"v1");

        let cached = poll_cached(&proxy, &url).await;
        assert_eq!(cached.body, b"v1");
        assert_eq!(cached.status, StatusCode::OK);
    }

    #[tokio::test]
    async fn runtime_cache_write_replaces_prior_entry() {
        let server = MockServer::start().await;
        mount_text(&server, "/index.html", "v1").await;
        let url = format!("{}/index.html", server.uri());

        let dir = TempDir::new().unwrap();
        let proxy = proxy(dir.path(), Vec::new());
        proxy.fetch(&url).await;
        poll_cached(&proxy, &url).await;

        server.reset().await;
        mount_text(&server, "/index.html", "v2").await;
        proxy.fetch(&url).await;

        for _ in 0..100 {
            if poll_cached(&proxy, &url).await.body == b"v2" {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("cached entry was never replaced");
    }

    #[tokio::test]
    async fn network_failure_falls_back_to_cached_response() {
        // Non-pooled so drop(server) actually frees the port.
        let server = MockServer::builder().start().await;
        mount_text(&server, "/styles.css", "body{}").await;
        let url = format!("{}/styles.css", server.uri());

        let dir = TempDir::new().unwrap();
        let proxy = proxy(dir.path(), vec![url.clone()]);
        proxy.install().await.unwrap();
        drop(server);

        let response = match proxy.fetch(&url).await {
            ProxyFetch::Response(r) => r,
            other => panic!("expected response, got {:?}", other),
        };
        assert_eq!(response.source, ResponseSource::Cache);
        assert_eq!(response.body, b"body{}");
    }

    #[tokio::test]
    async fn network_failure_without_cached_copy_synthesizes_503() {
        // Non-pooled so drop(server) actually frees the port.
        let server = MockServer::builder().start().await;
        let url = format!("{}/never-cached.js", server.uri());
        drop(server);

        let dir = TempDir::new().unwrap();
        let proxy = proxy(dir.path(), Vec::new());

        let response = match proxy.fetch(&url).await {
            ProxyFetch::Response(r) => r,
            other => panic!("expected response, got {:?}", other),
        };
        assert_eq!(response.status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(response.body, b"Service Unavailable");
        assert_eq!(response.source, ResponseSource::Synthesized);
    }

    #[tokio::test]
    async fn model_artifacts_are_served_cache_first() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/GCIPL.onnx"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![1u8; 128]))
            .expect(1)
            .mount(&server)
            .await;
        let url = format!("{}/GCIPL.onnx", server.uri());

        let dir = TempDir::new().unwrap();
        let proxy = proxy(dir.path(), vec![url.clone()]);
        proxy.install().await.unwrap();

        // Served from the generation; expect(1) verifies no second GET.
        let response = match proxy.fetch(&url).await {
            ProxyFetch::Response(r) => r,
            other => panic!("expected response, got {:?}", other),
        };
        assert_eq!(response.source, ResponseSource::Cache);
        assert_eq!(response.body, vec![1u8; 128]);
    }

    #[tokio::test]
    async fn uncached_model_artifact_falls_through_to_network() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/HD21.onnx"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![9u8; 64]))
            .mount(&server)
            .await;
        let url = format!("{}/HD21.onnx", server.uri());

        let dir = TempDir::new().unwrap();
        let proxy = proxy(dir.path(), Vec::new());

        let response = match proxy.fetch(&url).await {
            ProxyFetch::Response(r) => r,
            other => panic!("expected response, got {:?}", other),
        };
        assert_eq!(response.source, ResponseSource::Network);
        assert_eq!(response.body, vec![9u8; 64]);

        // The miss took the network-first path, so a copy lands in the cache
        // and later fetches are served without the server.
        let cached = poll_cached(&proxy, &url).await;
        assert_eq!(cached.body, vec![9u8; 64]);
    }

    #[tokio::test]
    async fn error_statuses_from_the_network_are_returned_and_cached() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/flaky.json"))
            .respond_with(ResponseTemplate::new(404).set_body_string("nope"))
            .mount(&server)
            .await;
        let url = format!("{}/flaky.json", server.uri());

        let dir = TempDir::new().unwrap();
        let proxy = proxy(dir.path(), Vec::new());

        let response = match proxy.fetch(&url).await {
            ProxyFetch::Response(r) => r,
            other => panic!("expected response, got {:?}", other),
        };
        assert_eq!(response.status, StatusCode::NOT_FOUND);
        assert_eq!(response.source, ResponseSource::Network);

        let cached = poll_cached(&proxy, &url).await;
        assert_eq!(cached.status, StatusCode::NOT_FOUND);
        assert_eq!(cached.body, b"nope");
    }

    #[tokio::test]
    async fn purge_all_removes_every_generation() {
        let dir = TempDir::new().unwrap();
        let root = dir.path().join("proxy");
        std::fs::create_dir_all(root.join("octiq-shell-v0")).unwrap();
        std::fs::create_dir_all(root.join(GENERATION)).unwrap();

        let proxy = AssetProxyCache::new(&root, GENERATION, Vec::new());
        proxy.purge_all().await.unwrap();

        assert!(!root.exists());
        // A second purge of the now-missing root is fine.
        proxy.purge_all().await.unwrap();
    }
}
