#![deny(missing_docs)]

//! Core library for the document summarization service.

/// HTTP routing and handlers.
pub mod api;
/// Environment-driven configuration management.
pub mod config;
/// Plain-text extraction from uploads, web pages, and inline text.
pub mod extraction;
/// Remote chat-completion client.
pub mod generation;
/// Structured logging and tracing setup.
pub mod logging;
/// Request validation and backend orchestration.
pub mod pipeline;
/// Local seq2seq summarization engine.
pub mod summarization;
