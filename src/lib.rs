//! Convo Engine - AI provider orchestration with persistent conversations
//!
//! Routes completion requests across OpenAI, Anthropic and a local Ollama
//! server with retries and fallback, and keeps every exchange in durable
//! threads with checkpoints that support rewinding a conversation.

pub mod adapters;
pub mod application;
pub mod config;
pub mod domain;
pub mod ports;
