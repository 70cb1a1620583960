//! Core data models used throughout Estate Harness.
//!
//! These types represent the canonical listings, portal tags, account roles,
//! and import reports that flow through the import pipeline.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

use crate::error::ImportError;

/// Default property type when a feed does not say.
pub const UNSPECIFIED_TYPE: &str = "Não informado";

/// Default primary image when a feed carries none.
pub const PLACEHOLDER_PHOTO: &str = "/placeholder.svg?height=300&width=400";

/// The two supported listing portals.
///
/// `as_str` is the tag persisted in `listings.source_portal`. Parsing also
/// accepts the `portalA` / `portalB` aliases used by the HTTP API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Portal {
    /// Portal A, feed root `imoveis`.
    ChavesNaMao,
    /// Portal B, feed root `ListaImoveis`.
    CanalPro,
}

impl Portal {
    pub fn as_str(&self) -> &'static str {
        match self {
            Portal::ChavesNaMao => "chavesnamao",
            Portal::CanalPro => "canalpro",
        }
    }
}

impl fmt::Display for Portal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Portal {
    type Err = ImportError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "chavesnamao" | "portala" => Ok(Portal::ChavesNaMao),
            "canalpro" | "portalb" => Ok(Portal::CanalPro),
            _ => Err(ImportError::UnsupportedPortal(s.to_string())),
        }
    }
}

impl Serialize for Portal {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for Portal {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Account role. Only `Master` may trigger imports; `Client` accounts own
/// listings through their client reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Master,
    Client,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Master => "master",
            Role::Client => "client",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "master" => Ok(Role::Master),
            "client" | "cliente" => Ok(Role::Client),
            other => anyhow::bail!("Unknown role: '{}'. Must be master or client.", other),
        }
    }
}

/// Canonical, portal-agnostic listing produced by a field mapper.
///
/// `(code, portal)` is the natural key. Physical quantities stay `None`
/// when the feed omits them or they do not parse; they are never zero-filled.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ListingRecord {
    pub code: String,
    pub portal: Portal,
    pub title: String,
    pub description: String,
    pub price: f64,
    pub property_type: String,
    pub city: String,
    pub neighborhood: String,
    pub address: String,
    pub total_area: Option<f64>,
    pub bedrooms: Option<i64>,
    pub bathrooms: Option<i64>,
    pub parking_spaces: Option<i64>,
    pub main_photo: String,
    pub extra_photos: Vec<String>,
    /// The per-listing feed subtree, verbatim.
    pub raw: serde_json::Value,
    /// Owning client account, filled in by the client linker.
    pub owner_id: Option<i64>,
}

/// A listing that failed to upsert, keyed by its source code.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RecordFailure {
    #[serde(rename = "codigo")]
    pub code: String,
    pub error: String,
}

/// Outcome of one import run.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ImportReport {
    /// Listings produced by the mapper.
    pub total: usize,
    pub inserted: usize,
    pub updated: usize,
    pub failures: Vec<RecordFailure>,
}

impl ImportReport {
    pub fn new(total: usize) -> Self {
        Self {
            total,
            ..Default::default()
        }
    }

    pub fn error_count(&self) -> usize {
        self.failures.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_portal_aliases() {
        assert_eq!("portalA".parse::<Portal>().unwrap(), Portal::ChavesNaMao);
        assert_eq!("PORTALB".parse::<Portal>().unwrap(), Portal::CanalPro);
        assert_eq!("chavesnamao".parse::<Portal>().unwrap(), Portal::ChavesNaMao);
        assert_eq!("canalpro".parse::<Portal>().unwrap(), Portal::CanalPro);
    }

    #[test]
    fn test_unknown_portal_rejected() {
        let err = "zap".parse::<Portal>().unwrap_err();
        assert!(matches!(err, ImportError::UnsupportedPortal(p) if p == "zap"));
    }

    #[test]
    fn test_portal_serde_uses_storage_tag() {
        let json = serde_json::to_string(&Portal::CanalPro).unwrap();
        assert_eq!(json, "\"canalpro\"");
        let back: Portal = serde_json::from_str("\"portalA\"").unwrap();
        assert_eq!(back, Portal::ChavesNaMao);
    }

    #[test]
    fn test_record_failure_wire_shape() {
        let f = RecordFailure {
            code: "X1".to_string(),
            error: "boom".to_string(),
        };
        let v = serde_json::to_value(&f).unwrap();
        assert_eq!(v, serde_json::json!({ "codigo": "X1", "error": "boom" }));
    }
}
