pub mod assistant;
pub mod config;
pub mod embedding;
pub mod error;
pub mod gateway;
pub mod seed;
pub mod store;
pub mod vector;

pub use assistant::{Assistant, AssistantReply};
pub use config::{
    AssistantConfig, CompletionSection, EmbeddingProviderKind, EmbeddingSettings,
    DEFAULT_BIND_ADDR, DEFAULT_CONFIG_FILE, DEFAULT_PERSONA_PATH, DEFAULT_RAG_DB,
};
pub use embedding::{
    EmbeddingBackend, EmbeddingClient, EmbeddingProvider, RemoteEmbeddingClient, SharedEmbedder,
};
pub use error::{AssistantError, RetrievalError};
pub use gateway::VectorStoreGateway;
pub use seed::{chunks_for_file, seed_directory, Chunk, FileReport, SeedReport};
pub use store::{PassageInsert, StoreConnection, VectorStore};
pub use vector::{cosine_distance, parse_vector_literal, to_vector_literal};
