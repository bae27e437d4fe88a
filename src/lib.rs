//! # rosterguard-core
//!
//! Validation and enrichment pipeline for Korean HR / retirement-benefit
//! rosters, driven by a ReACT-style autonomous agent.
//!
//! ## Pipeline
//!
//! Uploaded workbook bytes flow through: **Parser** -> **Header Matcher**
//! (case memory -> LLM -> lexical fallback) -> three validation layers
//! (rule-based, diagnostic-answer reconciliation, AI context review) ->
//! **Duplicate Detector** -> **Confidence Scorer**. The **Agent** orchestrates
//! all of this as a bounded Think/Act/Observe loop; the **Tool Registry** and
//! **Retry Strategy** are its internal plumbing; the **Case Store** and
//! **Knowledge Base** are its persistent memory.

pub mod agent;
pub mod case_store;
pub mod confidence;
pub mod config;
pub mod diagnostic_questions;
pub mod duplicates;
pub mod error;
pub mod header_matcher;
pub mod http;
pub mod knowledge_base;
pub mod llm;
pub mod parser;
pub mod retry;
pub mod schema;
pub mod tools;
pub mod validation;
pub mod webhook;

pub use agent::{Agent, AgentAction, AgentResult, AgentStatus, Thought};
pub use case_store::{CaseRecord, CaseStore, FewShotExample, RankedCase};
pub use confidence::{AnomalyReport, ConfidenceRecord, Recommendation};
pub use config::Config;
pub use error::{Error, Result};
pub use header_matcher::{HeaderMatch, MatchSet, Provenance};
pub use knowledge_base::{KnowledgeBase, TrainingExample};
pub use parser::{ParsedWorkbook, ParserConfig};
pub use schema::{SheetAffinity, StandardSchema};
pub use validation::{Finding, Severity, ValidationBundle};
