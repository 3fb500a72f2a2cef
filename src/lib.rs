//! BrainSAIT Business Discovery Library
//!
//! Discovers businesses through the Google Places API, crawls their websites,
//! derives digital-presence features, scores digital maturity and writes
//! bilingual (English/Arabic) narratives with an LLM.
//!
//! # Modules
//!
//! - `api`: HTTP-facing components.
//! - `core`: Crawling, feature extraction and scoring.
//! - `integrations`: External service clients (Places, LLM).
//! - `circuit_breaker`: Circuit breaker for LLM calls.
//! - `config`: Configuration management.
//! - `crawler`: Same-site breadth-first crawler.
//! - `errors`: Error handling types.
//! - `extractor`: Title, text, language and link extraction.
//! - `features`: Feature vector construction.
//! - `fetcher`: Page fetcher with retries.
//! - `handlers`: HTTP request handlers.
//! - `llm`: Text-generation trait and OpenAI client.
//! - `models`: Core data models.
//! - `pipeline`: End-to-end discovery orchestration.
//! - `places`: Google Places client.
//! - `records`: Typed loading of persisted analyses.
//! - `retry`: Retry policy.
//! - `robots`: robots.txt parsing and caching.
//! - `scoring`: Digital maturity scoring.
//! - `storage`: Output artifacts on disk.
//! - `url_normalizer`: Canonical URL form.

pub mod api;
pub mod core;
pub mod integrations;

pub mod circuit_breaker;
pub mod config;
pub mod crawler;
pub mod errors;
pub mod extractor;
pub mod features;
pub mod fetcher;
pub mod handlers;
pub mod llm;
pub mod models;
pub mod pipeline;
pub mod places;
pub mod records;
pub mod retry;
pub mod robots;
pub mod scoring;
pub mod storage;
pub mod url_normalizer;
