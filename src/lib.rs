//! Lead Campaign: concurrent per-record LLM enrichment for sales outreach.

pub mod cli;
pub mod config;
pub mod dataset;
pub mod error;
pub mod llm;
pub mod pipeline;
pub mod report;
pub mod stages;
pub mod transport;
