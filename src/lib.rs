//! Chatbot multi-documento: troceado, índice vectorial por sesión, filtro
//! léxico de candidatos y respuesta fundamentada con un LLM.

pub mod api;
pub mod app_state;
pub mod chunker;
pub mod config;
pub mod context;
pub mod embeddings;
pub mod error;
pub mod filter;
pub mod index;
pub mod llm;
pub mod loaders;
pub mod models;
pub mod prompt;
pub mod rag;
pub mod session;
pub mod vector_store;
