// crates/ad-serving-redemption/src/lib.rs
// ============================================================================
// Module: Ad Serving Redemption Library
// Description: HTTP transport for redeeming ad confirmations.
// Purpose: Implement the core redemption transport over blocking reqwest.
// Dependencies: ad-serving-core, reqwest, url
// ============================================================================

//! ## Overview
//! The core crate builds redemption requests and classifies responses; this
//! crate only moves bytes. [`HttpRedemptionTransport`] enforces scheme,
//! redirect, timeout, and response size limits before handing a
//! [`ad_serving_core::UrlResponse`] back for classification.

pub mod http;

pub use http::HttpRedemptionTransport;
pub use http::HttpTransportConfig;
pub use http::HttpTransportError;
