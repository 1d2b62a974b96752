//! Multi-tenant retrieval-augmented chat backend.

pub mod admin;
pub mod chat;
pub mod core;
pub mod documents;
pub mod ingestion;
pub mod llm;
pub mod relational;
pub mod retrieval;
pub mod server;
pub mod state;
pub mod vector;
