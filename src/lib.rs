//! Virtual Try-On Orchestrator
//!
//! This library turns the one-shot "submit + poll" API of a remote try-on
//! generation service into a robust, cancellable, rate-limit-aware widget
//! backend: image preparation, job submission with bounded retry, adaptive
//! status polling, session resumption across restarts, and a controller
//! exposing observable UI state.

pub mod config;
pub mod models;
pub mod services;
pub mod widget;
