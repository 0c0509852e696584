//! # Reforge
//!
//! A resilient transformation pipeline for legacy source artifacts.
//!
//! Reforge splits oversized inputs into overlapping chunks, sends each
//! chunk to an external text-generation service, validates every raw
//! result (JSON structure, SQL syntax), and repairs failures through a
//! strategy-driven retry orchestrator — producing a structured, scored
//! result even when the service returns malformed, incomplete, or
//! rejected output.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐   ┌───────────┐   ┌───────────┐   ┌──────────┐
//! │ Chunker  │──▶│ Generator │──▶│ Validator │──▶│  Report  │
//! │ overlap  │   │ (external)│   │ JSON/SQL  │   │ + score  │
//! └──────────┘   └───────────┘   └─────┬─────┘   └──────────┘
//!                      ▲               │ failure
//!                      │         ┌─────▼─────┐
//!                      └─────────│  Repair   │
//!                   re-prompt    │ classify/ │
//!                                │ strategy  │
//!                                └───────────┘
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing and validation |
//! | [`models`] | Core data types |
//! | [`chunker`] | Deterministic overlap chunking (batch and streaming) |
//! | [`validate`] | JSON, SQL, and composite validators with confidence scoring |
//! | [`generate`] | Generation collaborator abstraction (OpenAI, Ollama) |
//! | [`repair`] | Failure classification, repair strategies, and orchestration |
//! | [`pipeline`] | Chunk → generate → validate → repair control flow |

pub mod chunker;
pub mod config;
pub mod generate;
pub mod models;
pub mod pipeline;
pub mod repair;
pub mod validate;
