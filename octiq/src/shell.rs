use std::path::Path;

use octiq_cache::AssetProxyCache;

/// Cache generation written by this build. Bumping the crate version
/// retires the generations of every older build on activate.
pub const SHELL_GENERATION: &str = concat!("octiq-shell-v", env!("CARGO_PKG_VERSION"));

/// Where the hosted demo page lives.
pub const DEFAULT_SHELL_BASE_URL: &str =
    "https://pub-9133bb6240c146bda04d936a663ab7bc.r2.dev";

/// Static assets the demo shell needs to run offline, in order of appearance
/// on the page. Entries starting with `/` are joined to the shell base URL;
/// the CDN entries are version-pinned absolute URLs.
const SHELL_RESOURCES: [&str; 13] = [
    "/",
    "/index.html",
    "https://cdn.jsdelivr.net/npm/dropzone@5.9.3/dist/min/dropzone.min.js",
    "https://cdn.jsdelivr.net/npm/dropzone@5.9.3/dist/min/dropzone.min.css",
    "https://cdn.jsdelivr.net/npm/bootstrap@5.3.3/dist/css/bootstrap.min.css",
    "/stylesheet.css",
    "https://cdn.jsdelivr.net/npm/tiff.js@1.0.0/tiff.min.js",
    "https://cdn.jsdelivr.net/npm/onnxruntime-web@1.21.0/dist/ort.all.min.js",
    "https://cdn.jsdelivr.net/npm/@tensorflow/tfjs@4.22.0/dist/tf.min.js",
    "/caching.js",
    "/models.js",
    "/index.js",
    "https://cdn.jsdelivr.net/npm/bootstrap@5.3.5/dist/js/bootstrap.bundle.min.js",
];

/// Full URL list for the shell hosted at `base_url`.
pub fn shell_manifest(base_url: &str) -> Vec<String> {
    let base = base_url.trim_end_matches('/');
    SHELL_RESOURCES
        .iter()
        .map(|resource| {
            if resource.starts_with('/') {
                format!("{}{}", base, resource)
            } else {
                (*resource).to_string()
            }
        })
        .collect()
}

/// Proxy cache over the shell assets, rooted under the data directory.
pub fn shell_proxy(data_dir: &Path, base_url: &str) -> AssetProxyCache {
    AssetProxyCache::new(
        data_dir.join("shell"),
        SHELL_GENERATION,
        shell_manifest(base_url),
    )
}
