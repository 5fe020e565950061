// crates/ad-serving-core/src/core/transaction.rs
// ============================================================================
// Module: Ad Serving Transactions
// Description: Ledger transactions, confirmations, and the confirmation payload.
// Purpose: Carry ad event credit from the ledger into the redemption protocol.
// Dependencies: crate::core::{ad, identifiers, time}, serde, serde_json, time
// ============================================================================

//! ## Overview
//! The ledger collaborator returns a [`TransactionInfo`] for each recorded
//! event. The event handler turns it into a [`ConfirmationInfo`], optionally
//! carrying opted-in credential data, which is redeemed through the
//! confirmation endpoint using the JSON payload built here.
//!
//! The payload timestamp is truncated to the hour so it cannot be used to
//! correlate individual events.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde::Deserialize;
use serde::Serialize;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

use crate::core::ad::AdType;
use crate::core::ad::ConfirmationType;
use crate::core::identifiers::CreativeInstanceId;
use crate::core::identifiers::TransactionId;
use crate::core::time::Timestamp;

// ============================================================================
// SECTION: Transactions
// ============================================================================

/// Transaction recorded by the ledger collaborator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransactionInfo {
    /// Transaction identifier.
    pub id: TransactionId,
    /// Creation time.
    pub created_at: Timestamp,
    /// Creative instance credited.
    pub creative_instance_id: CreativeInstanceId,
    /// Ad type credited.
    pub ad_type: AdType,
    /// Confirmation type recorded.
    pub confirmation_type: ConfirmationType,
    /// Credited value.
    pub value: f64,
}

// ============================================================================
// SECTION: Confirmations
// ============================================================================

/// Opted-in confirmation data produced by the credential issuer.
///
/// # Invariants
/// - `credential_base64url` uses the URL-safe base64 alphabet without padding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OptedInCredential {
    /// Credential embedded in the redemption URL.
    pub credential_base64url: String,
    /// Blinded payment tokens in base64.
    pub blinded_tokens: Vec<String>,
    /// Public key in base64.
    pub public_key: String,
}

/// Confirmation awaiting redemption.
///
/// # Invariants
/// - `opted_in` is `None` for opted-out confirmations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfirmationInfo {
    /// Transaction being confirmed.
    pub transaction_id: TransactionId,
    /// Creative instance identifier.
    pub creative_instance_id: CreativeInstanceId,
    /// Ad type.
    pub ad_type: AdType,
    /// Confirmation type.
    pub confirmation_type: ConfirmationType,
    /// Confirmation creation time.
    pub created_at: Timestamp,
    /// Opted-in credential data, if any.
    pub opted_in: Option<OptedInCredential>,
}

impl ConfirmationInfo {
    /// Builds a confirmation for a recorded transaction.
    #[must_use]
    pub fn from_transaction(
        transaction: &TransactionInfo,
        opted_in: Option<OptedInCredential>,
    ) -> Self {
        Self {
            transaction_id: transaction.id.clone(),
            creative_instance_id: transaction.creative_instance_id.clone(),
            ad_type: transaction.ad_type,
            confirmation_type: transaction.confirmation_type,
            created_at: transaction.created_at,
            opted_in,
        }
    }

    /// Returns true when the confirmation carries opted-in credential data.
    #[must_use]
    pub const fn is_opted_in(&self) -> bool {
        self.opted_in.is_some()
    }

    /// Serializes the confirmation payload sent in the redemption request body.
    ///
    /// # Errors
    ///
    /// Returns [`serde_json::Error`] when serialization fails.
    pub fn payload_json(&self) -> Result<String, serde_json::Error> {
        let payload = ConfirmationPayload {
            transaction_id: self.transaction_id.as_str(),
            creative_instance_id: self.creative_instance_id.as_str(),
            confirmation_type: self.confirmation_type.as_str(),
            ad_type: self.ad_type.as_str(),
            created_at_timestamp: hour_truncated_rfc3339(self.created_at),
            blinded_payment_tokens: self.opted_in.as_ref().map(|data| data.blinded_tokens.as_slice()),
            public_key: self.opted_in.as_ref().map(|data| data.public_key.as_str()),
        };
        serde_json::to_string(&payload)
    }
}

/// Wire shape of the confirmation payload.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ConfirmationPayload<'a> {
    /// Transaction identifier.
    transaction_id: &'a str,
    /// Creative instance identifier.
    creative_instance_id: &'a str,
    /// Confirmation type label.
    #[serde(rename = "type")]
    confirmation_type: &'a str,
    /// Ad type label.
    ad_type: &'a str,
    /// Hour-truncated creation time.
    #[serde(skip_serializing_if = "Option::is_none")]
    created_at_timestamp: Option<String>,
    /// Blinded payment tokens (opted-in only).
    #[serde(skip_serializing_if = "Option::is_none")]
    blinded_payment_tokens: Option<&'a [String]>,
    /// Public key (opted-in only).
    #[serde(skip_serializing_if = "Option::is_none")]
    public_key: Option<&'a str>,
}

/// Seconds per hour.
const SECONDS_PER_HOUR: i64 = 3_600;

/// Formats `timestamp` truncated to the hour as RFC 3339.
fn hour_truncated_rfc3339(timestamp: Timestamp) -> Option<String> {
    let secs = timestamp.as_unix_secs();
    let truncated = secs - secs.rem_euclid(SECONDS_PER_HOUR);
    OffsetDateTime::from_unix_timestamp(truncated).ok()?.format(&Rfc3339).ok()
}
