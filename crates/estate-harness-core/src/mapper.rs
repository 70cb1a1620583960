//! Portal field mappers and feed format detection.
//!
//! Each supported portal has one [`FeedMapper`] that knows where listings
//! live in the parsed tree and how that portal names its fields. Mapping
//! never fails: missing or unparsable fields take their canonical defaults,
//! and a tree without the expected root path yields no records.
//!
//! | Portal | Tag | Listing path |
//! |--------|-----|--------------|
//! | A | `chavesnamao` | `imoveis.imovel` |
//! | B | `canalpro` | `ListaImoveis.Imovel` |

use serde_json::Value;

use crate::error::ImportError;
use crate::fields::Fields;
use crate::models::{ListingRecord, Portal, PLACEHOLDER_PHOTO, UNSPECIFIED_TYPE};

/// Converts one portal's feed tree into canonical listings.
pub trait FeedMapper: Send + Sync {
    fn portal(&self) -> Portal;

    /// Top-level keys that identify this portal's feed.
    fn markers(&self) -> &'static [&'static str];

    /// Map every listing in `tree`, in document order.
    fn map(&self, tree: &Value) -> Vec<ListingRecord>;
}

/// Portal A (`chavesnamao`).
#[derive(Debug, Clone, Copy, Default)]
pub struct PortalAFormat;

/// Portal B (`canalpro`).
#[derive(Debug, Clone, Copy, Default)]
pub struct PortalBFormat;

static PORTAL_A: PortalAFormat = PortalAFormat;
static PORTAL_B: PortalBFormat = PortalBFormat;

/// Pick the mapper whose markers appear at the top of `tree`.
///
/// Portal A is checked first.
pub fn detect_format(tree: &Value) -> Result<&'static dyn FeedMapper, ImportError> {
    let candidates: [&'static dyn FeedMapper; 2] = [&PORTAL_A, &PORTAL_B];
    candidates
        .into_iter()
        .find(|m| m.markers().iter().any(|k| tree.get(*k).is_some()))
        .ok_or(ImportError::UnrecognizedFormat)
}

/// The mapper for a declared portal.
pub fn mapper_for(portal: Portal) -> &'static dyn FeedMapper {
    match portal {
        Portal::ChavesNaMao => &PORTAL_A,
        Portal::CanalPro => &PORTAL_B,
    }
}

/// Listing nodes under the first present root, as a sequence.
fn records_at<'a>(tree: &'a Value, roots: &[&str], item: &str) -> Vec<&'a Value> {
    let Some(node) = roots
        .iter()
        .find_map(|r| tree.get(*r))
        .and_then(|root| root.get(item))
    else {
        return Vec::new();
    };
    match node {
        Value::Array(items) => items.iter().collect(),
        other => vec![other],
    }
}

fn default_title(property_type: &str, city: &str) -> String {
    format!("{} em {}", property_type, city)
}

impl FeedMapper for PortalAFormat {
    fn portal(&self) -> Portal {
        Portal::ChavesNaMao
    }

    fn markers(&self) -> &'static [&'static str] {
        &["imoveis", "chavesnamao"]
    }

    fn map(&self, tree: &Value) -> Vec<ListingRecord> {
        records_at(tree, self.markers(), "imovel")
            .into_iter()
            .map(|node| {
                let f = Fields::new(node);
                let property_type = f.text_or("tipo", UNSPECIFIED_TYPE);
                let city = f.text_or("cidade", "");
                ListingRecord {
                    code: f
                        .text("referencia")
                        .or_else(|| f.text("codigo"))
                        .unwrap_or_default(),
                    portal: self.portal(),
                    title: f
                        .text("titulo")
                        .unwrap_or_else(|| default_title(&property_type, &city)),
                    description: f.text_or("descricao", ""),
                    price: f.float("valor").unwrap_or(0.0),
                    property_type,
                    city,
                    neighborhood: f.text_or("bairro", ""),
                    address: f.text_or("endereco", ""),
                    total_area: f.float("area"),
                    bedrooms: f.int("quartos"),
                    bathrooms: f.int("banheiros"),
                    parking_spaces: f.int("vagas"),
                    main_photo: f.text_or("foto_principal", PLACEHOLDER_PHOTO),
                    extra_photos: f.urls("fotos"),
                    raw: node.clone(),
                    owner_id: None,
                }
            })
            .collect()
    }
}

impl FeedMapper for PortalBFormat {
    fn portal(&self) -> Portal {
        Portal::CanalPro
    }

    fn markers(&self) -> &'static [&'static str] {
        &["ListaImoveis", "canalpro"]
    }

    fn map(&self, tree: &Value) -> Vec<ListingRecord> {
        records_at(tree, self.markers(), "Imovel")
            .into_iter()
            .map(|node| {
                let f = Fields::new(node);
                let property_type = f.text_or("TipoImovel", UNSPECIFIED_TYPE);
                let city = f.text_or("Cidade", "");
                let price = f
                    .float("PrecoVenda")
                    .filter(|p| *p > 0.0)
                    .or_else(|| f.float("PrecoLocacao"))
                    .unwrap_or(0.0);
                let address = [f.text("Endereco"), f.text("Numero")]
                    .into_iter()
                    .flatten()
                    .collect::<Vec<_>>()
                    .join(", ");
                ListingRecord {
                    code: f.text("CodigoImovel").unwrap_or_default(),
                    portal: self.portal(),
                    title: f
                        .text("TituloImovel")
                        .unwrap_or_else(|| default_title(&property_type, &city)),
                    description: f.text_or("DescricaoImovel", ""),
                    price,
                    property_type,
                    city,
                    neighborhood: f.text_or("Bairro", ""),
                    address,
                    total_area: f.float("AreaTotal"),
                    bedrooms: f.int("QtdQuartos"),
                    bathrooms: f.int("QtdBanheiros"),
                    parking_spaces: f.int("QtdVagas"),
                    main_photo: f.text_or("URLFoto", PLACEHOLDER_PHOTO),
                    extra_photos: f.urls("Fotos"),
                    raw: node.clone(),
                    owner_id: None,
                }
            })
            .collect()
    }
}
