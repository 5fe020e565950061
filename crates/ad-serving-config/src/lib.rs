// crates/ad-serving-config/src/lib.rs
// ============================================================================
// Module: Ad Serving Config Library
// Description: Configuration model and validation for the ad serving core.
// Purpose: Load TOML configuration and convert it into serving parameters.
// Dependencies: ad-serving-core, serde, toml
// ============================================================================

//! ## Overview
//! This crate owns the on-disk configuration format. Loading is strict:
//! unknown keys, oversized files, and out-of-range values are rejected before
//! any parameter reaches the serving pipeline.

pub mod config;

pub use config::*;
