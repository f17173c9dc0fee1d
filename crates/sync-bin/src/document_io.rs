use anyhow::{Context, Result};
use core_model::{NodeRef, PreviewDocument};
use std::path::Path;
use tracing::info;

pub async fn load_document(path: &Path) -> Result<PreviewDocument> {
    let text = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("reading document {}", path.display()))?;
    let document: PreviewDocument = serde_json::from_str(&text)
        .with_context(|| format!("parsing document {}", path.display()))?;
    info!(
        target: "runtime.startup",
        path = %path.display(),
        blocks = document.blocks().len(),
        "document_loaded"
    );
    Ok(document)
}

/// Recommended-content catalog: a JSON array of nodes.
pub async fn load_catalog(path: &Path) -> Result<Vec<NodeRef>> {
    let text = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("reading catalog {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("parsing catalog {}", path.display()))
}

pub fn render_document(document: &PreviewDocument) -> Result<String> {
    let mut out = serde_json::to_string_pretty(document).context("encoding document")?;
    out.push('\n');
    Ok(out)
}

pub async fn write_document(document: &PreviewDocument, path: &Path) -> Result<()> {
    let text = render_document(document)?;
    tokio::fs::write(path, text)
        .await
        .with_context(|| format!("writing document {}", path.display()))?;
    info!(target: "runtime.shutdown", path = %path.display(), "document_written");
    Ok(())
}
