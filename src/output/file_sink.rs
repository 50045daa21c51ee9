use crate::cancel::CancelToken;
use crate::output::{LeafDocument, ProcessedOutput, Processor};
use crate::HarvestError;
use async_trait::async_trait;
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use tracing::debug;
use url::Url;

/// Stores raw leaf bodies under `<root>/<host>/<sha256(id)[..16]>.<ext>`
#[derive(Debug, Clone)]
pub struct FileSink {
    root: PathBuf,
}

impl FileSink {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path a document is stored at
    pub fn path_for(&self, doc: &LeafDocument) -> PathBuf {
        let host = host_dir(&doc.id);
        let digest = hex::encode(Sha256::digest(doc.id.as_bytes()));
        let ext = extension_for(doc.content_type.as_deref(), &doc.url);
        self.root.join(host).join(format!("{}.{}", &digest[..16], ext))
    }
}

#[async_trait]
impl Processor for FileSink {
    async fn process(
        &self,
        cancel: &CancelToken,
        doc: &LeafDocument,
    ) -> Result<ProcessedOutput, HarvestError> {
        cancel.check()?;

        let path = self.path_for(doc);
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&path, &doc.body).await?;

        debug!("Stored {} ({} bytes) at {}", doc.id, doc.body.len(), path.display());
        Ok(ProcessedOutput {
            file_path: path.to_string_lossy().into_owned(),
        })
    }
}

/// Directory name for the identity's host, port included when present
fn host_dir(id: &str) -> String {
    match Url::parse(id) {
        Ok(url) => match (url.host_str(), url.port()) {
            (Some(host), Some(port)) => format!("{}_{}", host, port),
            (Some(host), None) => host.to_string(),
            (None, _) => "unknown-host".to_string(),
        },
        Err(_) => "unknown-host".to_string(),
    }
}

/// Picks a file extension from the content type, then from the URL path
fn extension_for(content_type: Option<&str>, url: &str) -> &'static str {
    if let Some(ct) = content_type {
        let mime = ct
            .split(';')
            .next()
            .unwrap_or("")
            .trim()
            .to_ascii_lowercase();
        match mime.as_str() {
            "text/markdown" | "text/x-markdown" => return "md",
            "text/html" | "application/xhtml+xml" => return "html",
            "application/json" => return "json",
            "application/xml" | "text/xml" => return "xml",
            "text/plain" => return "txt",
            _ => {}
        }
    }

    let path = Url::parse(url)
        .map(|u| u.path().to_ascii_lowercase())
        .unwrap_or_default();
    if path.ends_with(".md") || path.ends_with(".markdown") {
        "md"
    } else if path.ends_with(".json") {
        "json"
    } else if path.ends_with(".txt") {
        "txt"
    } else if path.ends_with(".xml") {
        "xml"
    } else {
        "html"
    }
}
