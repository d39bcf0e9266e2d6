//! Immutable catalogs built once at startup
//!
//! Built-in defaults cover a playable server; JSON files can replace
//! them via `MAPS_PATH` / `GARAGE_PATH`.

pub mod garage;
pub mod maps;

use serde::{Deserialize, Serialize};

pub use garage::{GarageCatalog, HullPhysics, HullSpec, PaintSpec, WeaponSpec};
pub use maps::{MapCatalog, MapDescriptor};

#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    #[error("Failed to read catalog '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("Invalid catalog JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Invalid weapon '{id}': {source}")]
    InvalidWeapon {
        id: String,
        #[source]
        source: crate::game::damage::DamageError,
    },
    #[error("Map '{0}' has no spawn points")]
    NoSpawnPoints(String),
    #[error("Catalog is empty")]
    Empty,
}

pub(crate) fn read_file(path: &str) -> Result<String, CatalogError> {
    std::fs::read_to_string(path).map_err(|source| CatalogError::Io {
        path: path.to_string(),
        source,
    })
}

/// A client-loadable resource
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceRef {
    pub id: u64,
    #[serde(default = "default_version")]
    pub version: u64,
    pub kind: u32,
}

fn default_version() -> u64 {
    1
}

impl ResourceRef {
    pub const fn new(id: u64, kind: u32) -> Self {
        Self { id, version: 1, kind }
    }
}

/// Resource set payload of a `load_resources` command
pub fn resources_json(resources: &[ResourceRef]) -> String {
    let entries: Vec<serde_json::Value> = resources
        .iter()
        .map(|r| {
            serde_json::json!({
                "idhigh": "0",
                "idlow": r.id,
                "versionhigh": "0",
                "versionlow": r.version,
                "lazy": false,
                "alpha": false,
                "type": r.kind,
            })
        })
        .collect();
    serde_json::json!({ "resources": entries }).to_string()
}

/// Resources every client loads right after connecting
pub const MAIN_RESOURCES: &[ResourceRef] = &[
    ResourceRef::new(115_156, 10),
    ResourceRef::new(115_157, 10),
    ResourceRef::new(231_009, 13),
    ResourceRef::new(231_010, 13),
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resources_json() {
        let json = resources_json(&[ResourceRef::new(42, 7)]);
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["resources"][0]["idlow"], 42);
        assert_eq!(value["resources"][0]["type"], 7);
        assert_eq!(value["resources"][0]["versionlow"], 1);
    }

    #[test]
    fn test_empty_resources_json() {
        assert_eq!(resources_json(&[]), r#"{"resources":[]}"#);
    }
}
