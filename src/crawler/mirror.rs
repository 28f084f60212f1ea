//! Raw-text artifacts mirroring saved pages.
//!
//! Each saved page can be written to disk as `URL: <url>` plus the cleaned
//! body, grouped by host. The artifacts double as a local serving corpus
//! and as a file-based re-ingestion source.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::path::{Path, PathBuf};

use tokio::fs;
use tracing::debug;
use url::Url;

use crate::types::RagError;

const SLUG_MAX_CHARS: usize = 50;

/// Writes page artifacts under a root directory.
#[derive(Clone, Debug)]
pub struct PageMirror {
    root: PathBuf,
}

impl PageMirror {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Deterministic artifact path for a page:
    /// `<root>/<host_with_underscores>/<title-slug>-<hash>.txt`.
    pub fn artifact_path(&self, url: &Url, title: &str) -> PathBuf {
        let host = url
            .host_str()
            .unwrap_or("unknown-host")
            .replace('.', "_");
        let file = format!("{}-{:08x}.txt", title_slug(title), url_hash(url));
        self.root.join(host).join(file)
    }

    /// Writes the artifact, creating directories as needed.
    pub async fn write(&self, url: &Url, title: &str, content: &str) -> Result<PathBuf, RagError> {
        let path = self.artifact_path(url, title);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }
        fs::write(&path, format!("URL: {url}\n\n{content}")).await?;
        debug!(path = %path.display(), "mirrored page");
        Ok(path)
    }
}

fn title_slug(title: &str) -> String {
    let lowered = title.to_lowercase();
    let kept: String = lowered
        .chars()
        .filter(|c| c.is_alphanumeric() || c.is_whitespace() || *c == '-')
        .collect();
    let slug = kept
        .split(|c: char| c.is_whitespace() || c == '-')
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join("-");
    let slug: String = slug.chars().take(SLUG_MAX_CHARS).collect();
    if slug.is_empty() {
        "untitled".to_string()
    } else {
        slug
    }
}

fn url_hash(url: &Url) -> u32 {
    let mut hasher = DefaultHasher::new();
    url.as_str().hash(&mut hasher);
    hasher.finish() as u32
}
