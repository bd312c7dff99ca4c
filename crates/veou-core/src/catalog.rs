use std::{fs, path::Path};

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use veou_schema::Region;

use crate::places::{Completion, PlaceResult, PlaceSearchProvider};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogEntry {
    #[serde(flatten)]
    pub place: PlaceResult,
    /// Lowercase tags such as "cafe" or "popular"; a query containing any of
    /// them matches the entry.
    #[serde(default)]
    pub keywords: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct CatalogFile {
    #[serde(default)]
    places: Vec<CatalogEntry>,
}

/// In-memory place search over a fixed list of entries, in file order.
#[derive(Debug, Clone, Default)]
pub struct StaticPlaceCatalog {
    entries: Vec<CatalogEntry>,
}

impl StaticPlaceCatalog {
    pub fn new(entries: Vec<CatalogEntry>) -> Self {
        Self { entries }
    }

    pub fn load(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("failed to read place catalog {}", path.display()))?;
        let file: CatalogFile = serde_yaml::from_str(&raw)
            .with_context(|| format!("invalid place catalog {}", path.display()))?;
        tracing::debug!(places = file.places.len(), "loaded place catalog");
        Ok(Self::new(file.places))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn in_region<'a>(
        &'a self,
        region: Option<Region>,
    ) -> impl Iterator<Item = &'a CatalogEntry> + 'a {
        self.entries.iter().filter(move |entry| {
            region.map_or(true, |r| r.contains(&entry.place.coordinate))
        })
    }
}

fn entry_matches(entry: &CatalogEntry, query: &str) -> bool {
    let query = query.trim().to_lowercase();
    if query.is_empty() {
        return false;
    }
    entry.place.name.to_lowercase().contains(&query)
        || entry.place.address_line.to_lowercase().contains(&query)
        || entry
            .keywords
            .iter()
            .any(|k| !k.is_empty() && query.contains(&k.to_lowercase()))
}

#[async_trait]
impl PlaceSearchProvider for StaticPlaceCatalog {
    async fn search(&self, query: &str, region: Option<Region>) -> Result<Vec<PlaceResult>> {
        Ok(self
            .in_region(region)
            .filter(|entry| entry_matches(entry, query))
            .map(|entry| entry.place.clone())
            .collect())
    }

    async fn autocomplete(
        &self,
        fragment: &str,
        region: Option<Region>,
    ) -> Result<Vec<Completion>> {
        let fragment = fragment.trim().to_lowercase();
        if fragment.is_empty() {
            return Ok(Vec::new());
        }
        Ok(self
            .in_region(region)
            .filter(|entry| {
                entry.place.name.to_lowercase().contains(&fragment)
                    || entry.place.address_line.to_lowercase().contains(&fragment)
            })
            .map(|entry| Completion {
                title: entry.place.name.clone(),
                subtitle: entry.place.address_line.clone(),
            })
            .collect())
    }
}
