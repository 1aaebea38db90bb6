//! ManuWeaver Core Library
//!
//! This library is the computational heart of the manuscript pipeline: it
//! resolves citation-worthy references from external scholarly indexes,
//! merges duplicate records into one bibliography, and exposes the multi-step
//! workflow through asynchronously executed jobs that stream progress to
//! callers.
//!
//! # Architecture
//!
//! The library is organized into the following modules:
//! - [`provider`] - Provider clients for external scholarly indexes
//! - [`resolver`] - Concurrent fan-out and fuzzy merge into canonical references
//! - [`bibliography`] - Exact-key deduplication and BibTeX serialization
//! - [`job`] - Job lifecycle orchestration with replayable progress streams
//! - [`store`] - Flat JSON-file persistence for projects and jobs
//! - [`llm`] - Language-model collaborator with best-effort JSON coercion
//! - [`pipeline`] - Stage handlers wiring the resolver and compiler into jobs
//! - [`config`] - Environment-driven runtime settings

// Clippy lints - strict for library code
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod bibliography;
pub mod config;
pub mod job;
pub mod llm;
pub mod pipeline;
pub mod project;
pub mod provider;
pub mod resolver;
pub mod store;

// Re-export commonly used types
pub use bibliography::BibliographyCompiler;
pub use config::Settings;
pub use job::{Job, JobOrchestrator, JobStatus, JobStream, PipelineStage, STREAM_SENTINEL};
pub use llm::{LlmClient, extract_structured_json};
pub use pipeline::{PipelineError, run_reference_search};
pub use project::{CitationSlot, Manuscript, Project, ProjectStatus, Reference};
pub use provider::{
    ArxivProvider, CrossrefProvider, OpenAlexProvider, ProviderClient, ProviderError,
    ProviderResult, PubMedProvider, RawRecord, build_default_provider_set,
};
pub use resolver::{FanoutPolicy, ReferenceResolver, ResolverError, canonical_key};
pub use store::{JobRepository, ProjectRepository, StoreError, generate_id};
