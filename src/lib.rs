//! stampa
//!
//! Bounded-concurrency render orchestrator that fronts a headless Chromium
//! browser to produce PDFs from remote wiki articles. The core is the render
//! queue: admission-controlled, strictly FIFO, with independent budgets for
//! queue residency and active rendering and cooperative cancellation at any
//! lifecycle point.

pub mod application;
pub mod config;
pub mod domain;
pub mod infra;
