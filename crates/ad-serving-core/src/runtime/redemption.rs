// crates/ad-serving-core/src/runtime/redemption.rs
// ============================================================================
// Module: Ad Serving Confirmation Redemption
// Description: Redemption requests, response classification, and pending tasks.
// Purpose: Redeem confirmations with exactly one completion callback per attempt.
// Dependencies: crate::{core, interfaces}, serde, serde_json, thiserror
// ============================================================================

//! ## Overview
//! A [`RedeemConfirmation`] is a short-lived task. [`RedeemConfirmation::redeem`]
//! consumes it, sends one request, calls the delegate exactly once, and
//! returns a retry task when the failure is retryable. [`PendingRedemptions`]
//! owns queued tasks keyed by [`RedemptionRequestId`] and reschedules retries
//! with capped exponential backoff.
//!
//! Response taxonomy:
//! - 2xx with a JSON body, or 409 (already redeemed): success. Opted-out
//!   confirmations also accept an empty 2xx body.
//! - 2xx with an unparsable body, 408, 429, 5xx, or no response: retryable
//!   with backoff.
//! - Any other status: fatal.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::time::Duration;

use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;

use crate::core::AdType;
use crate::core::ConfirmationInfo;
use crate::core::RedemptionParams;
use crate::core::RedemptionRequestId;
use crate::core::Timestamp;
use crate::core::TransactionId;
use crate::core::TransactionInfo;
use crate::interfaces::RedeemConfirmationDelegate;
use crate::interfaces::RedemptionTransport;
use crate::interfaces::UrlRequest;
use crate::interfaces::UrlRequestMethod;
use crate::interfaces::UrlResponse;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// HTTP 409 Conflict: the confirmation was already redeemed.
const STATUS_CONFLICT: u16 = 409;
/// HTTP 408 Request Timeout.
const STATUS_REQUEST_TIMEOUT: u16 = 408;
/// HTTP 429 Too Many Requests.
const STATUS_TOO_MANY_REQUESTS: u16 = 429;

/// Redemption errors.
///
/// # Invariants
/// - Variants are stable for programmatic handling.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RedemptionError {
    /// Request could not be built; never retried.
    #[error("invalid redemption request: {0}")]
    InvalidRequest(String),
    /// Redemption failed.
    #[error("redemption failed (status {status:?}, retryable {retryable}): {message}")]
    Failed {
        /// HTTP status, when a response was received.
        status: Option<u16>,
        /// True when the caller should retry.
        retryable: bool,
        /// True when the retry should back off.
        should_backoff: bool,
        /// Failure description.
        message: String,
    },
}

impl RedemptionError {
    /// Returns true when the failure may be retried.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::Failed { retryable: true, .. })
    }

    /// Returns true when a retry should back off.
    #[must_use]
    pub const fn should_backoff(&self) -> bool {
        matches!(self, Self::Failed { should_backoff: true, .. })
    }

    /// Builds a retryable failure.
    fn retryable(status: Option<u16>, message: impl Into<String>) -> Self {
        Self::Failed {
            status,
            retryable: true,
            should_backoff: true,
            message: message.into(),
        }
    }

    /// Builds a fatal failure.
    fn fatal(status: Option<u16>, message: impl Into<String>) -> Self {
        Self::Failed {
            status,
            retryable: false,
            should_backoff: false,
            message: message.into(),
        }
    }
}

// ============================================================================
// SECTION: Requests and Responses
// ============================================================================

/// Builds the redemption request for `confirmation`.
///
/// # Errors
///
/// Returns [`RedemptionError::InvalidRequest`] when identifiers are not URL safe
/// or the payload cannot be serialized.
pub fn build_request(
    confirmation: &ConfirmationInfo,
    params: &RedemptionParams,
) -> Result<UrlRequest, RedemptionError> {
    let transaction_id = confirmation.transaction_id.as_str();
    if !is_url_safe(transaction_id) {
        return Err(RedemptionError::InvalidRequest(format!(
            "transaction id {transaction_id:?} is not url safe"
        )));
    }
    let host = match confirmation.ad_type {
        AdType::SearchResultAd => params.anonymous_search_host.trim_end_matches('/'),
        _ => params.anonymous_host.trim_end_matches('/'),
    };
    let url = match &confirmation.opted_in {
        Some(opted_in) => {
            if !is_url_safe(&opted_in.credential_base64url) {
                return Err(RedemptionError::InvalidRequest(
                    "credential is not base64url encoded".to_string(),
                ));
            }
            format!("{host}/v3/confirmation/{transaction_id}/{}", opted_in.credential_base64url)
        }
        None => format!("{host}/v3/confirmation/{transaction_id}"),
    };
    let content = confirmation
        .payload_json()
        .map_err(|err| RedemptionError::InvalidRequest(err.to_string()))?;
    Ok(UrlRequest {
        url,
        method: UrlRequestMethod::Post,
        headers: vec!["accept: application/json".to_string()],
        content,
        content_type: "application/json".to_string(),
    })
}

/// Returns true for non-empty strings of `[A-Za-z0-9_-]`.
fn is_url_safe(value: &str) -> bool {
    !value.is_empty() && value.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_')
}

/// Classifies a redemption response.
///
/// # Errors
///
/// Returns [`RedemptionError::Failed`] describing whether to retry.
pub fn classify_response(response: &UrlResponse, opted_in: bool) -> Result<(), RedemptionError> {
    let status = response.status_code;
    if status == STATUS_CONFLICT {
        return Ok(());
    }
    if (200..300).contains(&status) {
        if !opted_in && response.body.trim().is_empty() {
            return Ok(());
        }
        return serde_json::from_str::<serde_json::Value>(&response.body).map(|_| ()).map_err(
            |err| RedemptionError::retryable(Some(status), format!("unparsable body: {err}")),
        );
    }
    if status == STATUS_REQUEST_TIMEOUT
        || status == STATUS_TOO_MANY_REQUESTS
        || (500..600).contains(&status)
    {
        return Err(RedemptionError::retryable(Some(status), format!("http status {status}")));
    }
    Err(RedemptionError::fatal(Some(status), format!("http status {status}")))
}

// ============================================================================
// SECTION: Task
// ============================================================================

/// Self-contained redemption task for one confirmation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RedeemConfirmation {
    /// Pending-set key.
    pub request_id: RedemptionRequestId,
    /// Confirmation to redeem.
    pub confirmation: ConfirmationInfo,
    /// Transaction reported to the delegate.
    pub transaction: TransactionInfo,
    /// Attempt number, starting at 1.
    pub attempt: u32,
}

/// Result of one redemption attempt.
#[derive(Debug, Clone, PartialEq)]
pub enum RedemptionAttempt {
    /// The confirmation was redeemed.
    Redeemed,
    /// The attempt failed.
    Failed {
        /// Failure.
        error: RedemptionError,
        /// Follow-up task, present when another attempt is allowed.
        retry: Option<RedeemConfirmation>,
    },
}

impl RedeemConfirmation {
    /// Sends the request and calls `delegate` exactly once.
    pub fn redeem(
        self,
        transport: &dyn RedemptionTransport,
        params: &RedemptionParams,
        delegate: &dyn RedeemConfirmationDelegate,
    ) -> RedemptionAttempt {
        let result = build_request(&self.confirmation, params).and_then(|request| {
            transport
                .send(&request)
                .map_err(|err| RedemptionError::retryable(None, err.to_string()))
                .and_then(|response| classify_response(&response, self.confirmation.is_opted_in()))
        });
        match result {
            Ok(()) => {
                delegate.on_did_redeem(self.request_id, &self.transaction);
                RedemptionAttempt::Redeemed
            }
            Err(error) => {
                let retry = (error.is_retryable() && self.attempt < params.max_attempts)
                    .then(|| Self {
                        attempt: self.attempt + 1,
                        ..self.clone()
                    });
                delegate.on_failed_to_redeem(
                    self.request_id,
                    &self.transaction,
                    retry.is_some(),
                    error.should_backoff(),
                );
                RedemptionAttempt::Failed { error, retry }
            }
        }
    }
}

// ============================================================================
// SECTION: Pending Set
// ============================================================================

/// Queued task and the time it becomes due.
#[derive(Debug, Clone)]
struct ScheduledRedemption {
    /// Task to run.
    task: RedeemConfirmation,
    /// Earliest run time.
    due_at: Timestamp,
}

/// Status reported for a processed attempt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RedemptionStatus {
    /// Redeemed.
    Redeemed,
    /// Failed and rescheduled.
    Retrying {
        /// Next attempt time.
        next_attempt_at: Timestamp,
        /// Failure message.
        message: String,
    },
    /// Failed permanently.
    Failed {
        /// Failure message.
        message: String,
    },
}

/// Report for one processed attempt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RedemptionReport {
    /// Request identifier.
    pub request_id: RedemptionRequestId,
    /// Transaction identifier.
    pub transaction_id: TransactionId,
    /// Attempt number.
    pub attempt: u32,
    /// Attempt status.
    pub status: RedemptionStatus,
}

/// Pending redemption tasks keyed by request id.
///
/// # Invariants
/// - Each task lives in exactly one place: the pending set or an in-flight attempt.
/// - Request ids are never reused.
#[derive(Debug, Default)]
pub struct PendingRedemptions {
    /// Queued tasks.
    tasks: BTreeMap<RedemptionRequestId, ScheduledRedemption>,
    /// Last issued request id.
    last_id: u64,
}

impl PendingRedemptions {
    /// Creates an empty pending set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues a confirmation due immediately.
    pub fn enqueue(
        &mut self,
        confirmation: ConfirmationInfo,
        transaction: TransactionInfo,
        now: Timestamp,
    ) -> RedemptionRequestId {
        self.last_id += 1;
        let request_id = RedemptionRequestId::new(self.last_id);
        let task = RedeemConfirmation {
            request_id,
            confirmation,
            transaction,
            attempt: 1,
        };
        self.tasks.insert(request_id, ScheduledRedemption { task, due_at: now });
        request_id
    }

    /// Returns the number of queued tasks.
    #[must_use]
    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    /// Returns true when nothing is queued.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Returns the queued task for `request_id`.
    #[must_use]
    pub fn get(&self, request_id: RedemptionRequestId) -> Option<&RedeemConfirmation> {
        self.tasks.get(&request_id).map(|scheduled| &scheduled.task)
    }

    /// Returns the earliest due time.
    #[must_use]
    pub fn next_due(&self) -> Option<Timestamp> {
        self.tasks.values().map(|scheduled| scheduled.due_at).min()
    }

    /// Drops every queued task.
    pub fn clear(&mut self) {
        self.tasks.clear();
    }

    /// Runs every task due at `now` in request-id order.
    pub fn process_due(
        &mut self,
        transport: &dyn RedemptionTransport,
        params: &RedemptionParams,
        delegate: &dyn RedeemConfirmationDelegate,
        now: Timestamp,
    ) -> Vec<RedemptionReport> {
        let due: Vec<RedemptionRequestId> = self
            .tasks
            .iter()
            .filter(|(_, scheduled)| scheduled.due_at <= now)
            .map(|(id, _)| *id)
            .collect();
        let mut reports = Vec::with_capacity(due.len());
        for request_id in due {
            let Some(scheduled) = self.tasks.remove(&request_id) else {
                continue;
            };
            let task = scheduled.task;
            let attempt = task.attempt;
            let transaction_id = task.confirmation.transaction_id.clone();
            let status = match task.redeem(transport, params, delegate) {
                RedemptionAttempt::Redeemed => RedemptionStatus::Redeemed,
                RedemptionAttempt::Failed { error, retry: Some(retry) } => {
                    let next_attempt_at = now.saturating_add(backoff_delay(params, attempt));
                    self.tasks.insert(request_id, ScheduledRedemption {
                        task: retry,
                        due_at: next_attempt_at,
                    });
                    RedemptionStatus::Retrying {
                        next_attempt_at,
                        message: error.to_string(),
                    }
                }
                RedemptionAttempt::Failed { error, retry: None } => RedemptionStatus::Failed {
                    message: error.to_string(),
                },
            };
            reports.push(RedemptionReport {
                request_id,
                transaction_id,
                attempt,
                status,
            });
        }
        reports
    }
}

/// Returns the backoff after failed attempt `attempt`: `base * 2^(attempt - 1)`, capped.
#[must_use]
pub fn backoff_delay(params: &RedemptionParams, attempt: u32) -> Duration {
    let exponent = attempt.saturating_sub(1).min(32);
    let secs = params.base_backoff_secs.saturating_mul(1_u64 << exponent);
    Duration::from_secs(secs.min(params.max_backoff_secs))
}
