//! Catalog file loading.

use std::path::Path;

use anyhow::Context;
use reelmatch_core::CanonicalEntity;

/// Read a catalog: a JSON array of entities.
pub fn load_catalog(path: &Path) -> anyhow::Result<Vec<CanonicalEntity>> {
    let bytes =
        std::fs::read(path).with_context(|| format!("reading catalog {}", path.display()))?;
    let entities: Vec<CanonicalEntity> = serde_json::from_slice(&bytes)
        .with_context(|| format!("parsing catalog {}", path.display()))?;
    tracing::info!(path = %path.display(), entities = entities.len(), "loaded catalog");
    Ok(entities)
}

/// Entities whose normalised title equals that of `title`.
pub fn select<'a>(entities: &'a [CanonicalEntity], title: &str) -> Vec<&'a CanonicalEntity> {
    let wanted = reelmatch_core::normalize(title);
    entities
        .iter()
        .filter(|e| reelmatch_core::normalize(&e.title) == wanted)
        .collect()
}
