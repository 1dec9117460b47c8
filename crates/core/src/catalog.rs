//! Read-only price list the dashboard renders and the assistant quotes from.

use serde::{Deserialize, Serialize};

use crate::error::Result;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PriceItem {
    pub item: String,
    pub spec: String,
    pub price_in: u64,
    pub price_out: u64,
    pub unit: String,
    pub note: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuleItem {
    pub title: String,
    pub detail: String,
    pub impact: String,
    pub cost_in: u64,
    pub cost_out: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PricingCatalog {
    pub kitchen: Vec<PriceItem>,
    pub wallpanel: Vec<PriceItem>,
    pub rules: Vec<RuleItem>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PriceDifference {
    pub diff: i64,
    pub percent: f64,
    pub is_same: bool,
}

impl PricingCatalog {
    pub fn builtin() -> Self {
        Self {
            kitchen: vec![
                price(
                    "Kitchen Set Aluminium (Standard)",
                    "Bahan ACP 4mm, Rell Double Track, Engsel Slow Motion",
                    3_500_000,
                    3_500_000,
                    "/m¹",
                    "Harga relatif stabil di kedua area. Sudah termasuk: Rak Piring Stainless, Rak Sendok, Rak Bumbu, LED Strip.",
                ),
                price(
                    "Kitchen Set Multipleks (Standard)",
                    "Finishing HPL, Engsel Slow Motion",
                    2_100_000,
                    2_600_000,
                    "/m¹",
                    "Harga Multipleks bervariasi tergantung finishing. Selisih ~24% untuk luar kota.",
                ),
            ],
            wallpanel: vec![
                price(
                    "Wallpanel Minimalis",
                    "Multipleks, Finishing HPL/Duco Grade B",
                    1_350_000,
                    1_350_000,
                    "/m²",
                    "Harga dasar sama untuk kedua area.",
                ),
                price(
                    "Wallpanel Semi Klasik",
                    "Multipleks, List Profil",
                    1_500_000,
                    1_500_000,
                    "/m²",
                    "Harga dasar sama, cocok untuk ruang makan & living room.",
                ),
                price(
                    "Wallpanel Klasik",
                    "Multipleks, Profil Rumit, Cat Duco",
                    1_650_000,
                    1_850_000,
                    "/m²",
                    "SELISIH TINGGI! Luar kota lebih mahal Rp 200rb/m² karena waktu instalasi lebih lama.",
                ),
                price(
                    "WPC Panel (Kisi-kisi)",
                    "Bahan WPC (Wood Plastic Composite)",
                    850_000,
                    950_000,
                    "/m²",
                    "Luar kota lebih mahal Rp 100rb/m² karena volume pengiriman besar.",
                ),
                price(
                    "Cermin Biasa (Add-on)",
                    "Finishing Bevel",
                    1_850_000,
                    1_850_000,
                    "/m²",
                    "Harga stabil, bagus untuk memperluas kesan ruangan.",
                ),
            ],
            rules: vec![
                RuleItem {
                    title: "Minimum Order (Project Kecil)".to_string(),
                    detail: "Project di bawah Rp 15 Juta (Dalam Kota) / Rp 20 Juta (Luar Kota)"
                        .to_string(),
                    impact: "Dikenakan Biaya Tambahan (Charge)".to_string(),
                    cost_in: 500_000,
                    cost_out: 1_000_000,
                },
                RuleItem {
                    title: "Biaya Survey & Desain".to_string(),
                    detail: "Survey Lokasi & Gambar 3D".to_string(),
                    impact: "GRATIS (Included)".to_string(),
                    cost_in: 0,
                    cost_out: 0,
                },
            ],
        }
    }

    /// Kitchen sets followed by wall panels, the order the material pickers use.
    pub fn all_materials(&self) -> Vec<&PriceItem> {
        self.kitchen.iter().chain(self.wallpanel.iter()).collect()
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

pub fn price_difference(price_in: u64, price_out: u64) -> PriceDifference {
    if price_in == price_out {
        return PriceDifference {
            diff: 0,
            percent: 0.0,
            is_same: true,
        };
    }
    let diff = price_out as i64 - price_in as i64;
    let percent = if price_in == 0 {
        0.0
    } else {
        (diff as f64 / price_in as f64 * 1000.0).round() / 10.0
    };
    PriceDifference {
        diff,
        percent,
        is_same: false,
    }
}

fn price(item: &str, spec: &str, price_in: u64, price_out: u64, unit: &str, note: &str) -> PriceItem {
    PriceItem {
        item: item.to_string(),
        spec: spec.to_string(),
        price_in,
        price_out,
        unit: unit.to_string(),
        note: note.to_string(),
    }
}
