//! # Claude Usage Monitor
//!
//! Keeps an eye on Claude subscription usage limits and on locally logged
//! token consumption.
//!
//! ## Overview
//!
//! Each refresh cycle:
//! - reads the OAuth access token from the system secret store (cached, with a
//!   cooldown between store lookups)
//! - fetches the 5-hour / 7-day utilization snapshot from the usage endpoint
//! - rebuilds a token history from session transcripts or the daily stats cache
//! - optionally runs a user script when the 5-hour window runs hot
//!
//! Cycles run on a timer or on demand and never overlap.
//!
//! ## Features
//!
//! - `colors` (default): Enables terminal color output via owo-colors

/// Threshold-triggered user script
pub mod automation;

/// Command-line argument parsing
pub mod cli;

/// OAuth token lookup and caching
pub mod credentials;

/// Text and JSON rendering of monitor state
pub mod display;

/// Error taxonomy for credential and usage failures
pub mod error;

/// Token history from local logs
pub mod history;

/// tracing subscriber setup
pub mod logging;

/// Wire and on-disk data models
pub mod models;

/// Refresh cycle, published state and scheduler
pub mod orchestrator;

/// User settings file
pub mod settings;

/// Usage limits retrieved from the Claude OAuth API
pub mod usage_api;

/// Utility functions for paths, timestamps and formatting
pub mod utils;
