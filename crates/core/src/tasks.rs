use serde::{Deserialize, Serialize};

use crate::catalog::PricingCatalog;
use crate::error::{CoreError, Result};

const IN_CITY_MIN_ORDER: &str = "Dalam Kota < 15jt";
const OUT_OF_CITY_MIN_ORDER: &str = "Luar Kota < 20jt";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Region {
    Dalam,
    Luar,
}

impl Region {
    fn long_label(&self) -> &'static str {
        match self {
            Region::Dalam => "Dalam Kota (Bandung/Jatim)",
            Region::Luar => "Luar Kota (Jabodetabek/Pantura)",
        }
    }

    fn short_label(&self) -> &'static str {
        match self {
            Region::Dalam => "Dalam Kota",
            Region::Luar => "Luar Kota",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectEstimate {
    #[serde(default)]
    pub client_name: String,
    pub region: Region,
    #[serde(default)]
    pub kitchen_length_m: f64,
    #[serde(default = "default_wallpanel_type")]
    pub wallpanel_type: String,
    #[serde(default)]
    pub wallpanel_area_m2: f64,
}

fn default_wallpanel_type() -> String {
    "Minimalis".to_string()
}

/// One unit of assistant work. Every variant runs through retrieval, assembly and the
/// fallback chain; only chat carries conversation history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "task", rename_all = "lowercase")]
pub enum AssistantTask {
    Chat { message: String },
    Calculate(ProjectEstimate),
    Compare { item1: String, item2: String },
    Proposal(ProjectEstimate),
}

impl AssistantTask {
    pub fn validate(&self) -> Result<()> {
        match self {
            AssistantTask::Chat { message } if message.trim().is_empty() => {
                Err(CoreError::InvalidTask("message must not be empty".to_string()))
            }
            AssistantTask::Compare { item1, item2 }
                if item1.trim().is_empty() || item2.trim().is_empty() =>
            {
                Err(CoreError::InvalidTask(
                    "both items are required for a comparison".to_string(),
                ))
            }
            AssistantTask::Calculate(estimate) | AssistantTask::Proposal(estimate)
                if estimate.kitchen_length_m < 0.0 || estimate.wallpanel_area_m2 < 0.0 =>
            {
                Err(CoreError::InvalidTask(
                    "lengths and areas must not be negative".to_string(),
                ))
            }
            _ => Ok(()),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            AssistantTask::Chat { .. } => "chat",
            AssistantTask::Calculate(_) => "calculate",
            AssistantTask::Compare { .. } => "compare",
            AssistantTask::Proposal(_) => "proposal",
        }
    }

    pub fn uses_history(&self) -> bool {
        matches!(self, AssistantTask::Chat { .. })
    }

    /// Text sent to the embedder for the knowledge-base lookup.
    pub fn retrieval_query(&self) -> String {
        match self {
            AssistantTask::Chat { message } => message.clone(),
            AssistantTask::Calculate(estimate) | AssistantTask::Proposal(estimate) => format!(
                "harga kitchen set wallpanel {} {} minimum order",
                estimate.wallpanel_type,
                estimate.region.short_label()
            ),
            AssistantTask::Compare { item1, item2 } => format!("perbandingan {item1} {item2}"),
        }
    }

    /// Final user message of the completion request.
    pub fn user_message(&self, catalog: &PricingCatalog) -> Result<String> {
        match self {
            AssistantTask::Chat { message } => Ok(message.trim().to_string()),
            AssistantTask::Calculate(estimate) => calculation_prompt(estimate, catalog),
            AssistantTask::Compare { item1, item2 } => comparison_prompt(item1, item2, catalog),
            AssistantTask::Proposal(estimate) => proposal_prompt(estimate, catalog),
        }
    }
}

fn calculation_prompt(estimate: &ProjectEstimate, catalog: &PricingCatalog) -> Result<String> {
    Ok(format!(
        "Bertindaklah sebagai konsultan yang sedang menghitungkan budget klien.\n\
         Jangan berikan output tabel kaku. Berikan penjelasan naratif yang enak dibaca.\n\n\
         DATA PROYEK:\n\
         - Lokasi: {location}\n\
         - Kitchen Set: {kitchen} meter\n\
         - Wallpanel: {panel} seluas {area} m²\n\n\
         DATA HARGA: {data}\n\n\
         TUGAS:\n\
         1. Hitung total biaya secara rinci tapi santai.\n\
         2. Cek apakah kena Charge Minimum Order ({IN_CITY_MIN_ORDER}, {OUT_OF_CITY_MIN_ORDER}).\n\
         3. Berikan kesimpulan total bersih.",
        location = estimate.region.long_label(),
        kitchen = estimate.kitchen_length_m,
        panel = estimate.wallpanel_type,
        area = estimate.wallpanel_area_m2,
        data = catalog.to_json()?,
    ))
}

fn proposal_prompt(estimate: &ProjectEstimate, catalog: &PricingCatalog) -> Result<String> {
    let client = if estimate.client_name.trim().is_empty() {
        "Bapak/Ibu"
    } else {
        estimate.client_name.trim()
    };
    Ok(format!(
        "Buatkan draft pesan WhatsApp (Copywriting) yang sopan, rapi, dan menarik untuk dikirim ke klien.\n\
         Jangan gunakan format Markdown tebal/miring. Gunakan format text biasa.\n\n\
         UNTUK KLIEN: {client}\n\
         DETAIL:\n\
         - Lokasi: {location}\n\
         - Kitchen Set: {kitchen}m\n\
         - Wallpanel {panel}: {area}m²\n\n\
         DATA HARGA: {data}\n\n\
         GUIDE:\n\
         - Buka dengan salam hangat.\n\
         - Rincian harga yang jelas.\n\
         - Total akhir.\n\
         - Closing statement yang mengajak diskusi.",
        location = estimate.region.short_label(),
        kitchen = estimate.kitchen_length_m,
        panel = estimate.wallpanel_type,
        area = estimate.wallpanel_area_m2,
        data = catalog.to_json()?,
    ))
}

fn comparison_prompt(item1: &str, item2: &str, catalog: &PricingCatalog) -> Result<String> {
    Ok(format!(
        "Jelaskan perbandingan antara \"{item1}\" vs \"{item2}\" selayaknya kamu menjelaskan ke teman awam.\n\n\
         DATA: {data}\n\n\
         JANGAN PAKAI TABEL. Gunakan poin-poin penjelasan santai.\n\
         Bahas aspek: Harga, Keawetan, dan Penampilan.\n\
         Berikan rekomendasi akhir: \"Kalau budget masuk, saya sarankan ambil yang X karena...\"",
        item1 = item1.trim(),
        item2 = item2.trim(),
        data = catalog.to_json()?,
    ))
}
