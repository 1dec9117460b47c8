mod budget;
mod catalog;
mod context;
mod conversation;
mod currency;
mod embedding;
mod error;
mod passage;
mod tasks;

pub use budget::truncate_to_tokens;
pub use catalog::{price_difference, PriceDifference, PriceItem, PricingCatalog, RuleItem};
pub use context::{
    default_supplementary, load_persona, metadata_lines, AssembledContext, ContextAssembler,
    CONTEXT_END, CONTEXT_START, FALLBACK_PERSONA, NO_CONTEXT_FALLBACK,
};
pub use conversation::{window, ConversationTurn, Role};
pub use currency::{format_grouped, format_rupiah, parse_amount};
pub use embedding::{HashEmbedder, HashEmbedderConfig, DEFAULT_DIMENSIONS};
pub use error::{CoreError, Result};
pub use passage::RetrievedPassage;
pub use tasks::{AssistantTask, ProjectEstimate, Region};
