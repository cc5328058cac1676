pub mod embedder;

pub use embedder::{EmbedConfig, PayloadEmbedder};
