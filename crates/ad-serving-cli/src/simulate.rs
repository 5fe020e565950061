// crates/ad-serving-cli/src/simulate.rs
// ============================================================================
// Module: Ad Serving CLI Simulation
// Description: Offline serving simulation over a JSON candidate catalog.
// Purpose: Drive the notification ad handler and emit JSON lines.
// Dependencies: ad-serving-config, ad-serving-core, serde, serde_json
// ============================================================================

//! ## Overview
//! A simulation replays `opportunities` serving attempts on a manual clock.
//! Each attempt emits one `decision` line. Committed ads optionally receive
//! synthetic engagement, and due redemptions run when a transport is given.
//! A final `summary` line reports totals.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::io::Write;
use std::time::Duration;

use ad_serving_config::AdServingConfig;
use ad_serving_core::AdEventOutcome;
use ad_serving_core::AdEventType;
use ad_serving_core::BanditArmStore;
use ad_serving_core::Candidate;
use ad_serving_core::ClientContext;
use ad_serving_core::ClientState;
use ad_serving_core::Clock;
use ad_serving_core::FixedClock;
use ad_serving_core::HandlerParts;
use ad_serving_core::InMemoryAdEventHistory;
use ad_serving_core::InMemoryCatalog;
use ad_serving_core::InMemoryTransactionLedger;
use ad_serving_core::NotificationAdHandler;
use ad_serving_core::OptedOutCredentialIssuer;
use ad_serving_core::PacingRandom;
use ad_serving_core::ParamsHandle;
use ad_serving_core::RedeemConfirmationDelegate;
use ad_serving_core::RedemptionReport;
use ad_serving_core::RedemptionStatus;
use ad_serving_core::RedemptionTransport;
use ad_serving_core::ServingDecision;
use ad_serving_core::Timestamp;
use clap::ValueEnum;
use serde::Serialize;

use crate::CliError;
use crate::CliResult;

// ============================================================================
// SECTION: Options
// ============================================================================

/// Delay between serving and the synthetic view.
const VIEW_DELAY: Duration = Duration::from_secs(5);
/// Delay between the view and the synthetic terminal event.
const ENGAGE_DELAY: Duration = Duration::from_secs(10);

/// Synthetic engagement applied to each served ad.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub(crate) enum Engagement {
    /// Leave served ads untouched.
    #[default]
    None,
    /// View each served ad.
    View,
    /// View, then click each served ad.
    Click,
    /// View, then dismiss each served ad.
    Dismiss,
}

impl Engagement {
    /// Returns the events applied after `Served`, in order.
    const fn events(self) -> &'static [AdEventType] {
        match self {
            Self::None => &[],
            Self::View => &[AdEventType::Viewed],
            Self::Click => &[AdEventType::Viewed, AdEventType::Clicked],
            Self::Dismiss => &[AdEventType::Viewed, AdEventType::Dismissed],
        }
    }
}

/// Simulation inputs.
#[derive(Debug, Clone)]
pub(crate) struct SimulationOptions {
    /// Number of serving opportunities.
    pub(crate) opportunities: u32,
    /// Seed for the pacing and bandit random source.
    pub(crate) seed: u64,
    /// Time of the first opportunity.
    pub(crate) start: Timestamp,
    /// Spacing between opportunities.
    pub(crate) interval: Duration,
    /// Engagement applied to served ads.
    pub(crate) engagement: Engagement,
    /// Client signals for the whole run.
    pub(crate) client: ClientState,
}

// ============================================================================
// SECTION: Output
// ============================================================================

/// One JSON line of simulation output.
#[derive(Debug, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
enum SimulationLine<'a> {
    /// Serving decision for one opportunity.
    Decision {
        /// Zero-based opportunity index.
        opportunity: u32,
        /// Decision record.
        decision: &'a ServingDecision,
    },
    /// Accepted lifecycle event.
    Event {
        /// Event applied.
        event_type: AdEventType,
        /// Transition outcome.
        outcome: &'a AdEventOutcome,
    },
    /// Processed redemption attempt.
    Redemption {
        /// Attempt report.
        report: &'a RedemptionReport,
    },
    /// Run totals.
    Summary(&'a SimulationSummary),
}

/// Run totals.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub(crate) struct SimulationSummary {
    /// Opportunities attempted.
    pub(crate) opportunities: u32,
    /// Ads served.
    pub(crate) served: u32,
    /// Opportunities suppressed.
    pub(crate) suppressed: u32,
    /// Lifecycle events accepted after `Served`.
    pub(crate) events: u32,
    /// Confirmations redeemed.
    pub(crate) redeemed: u32,
}

/// Serializes `line` and writes it with a trailing newline.
fn emit<W: Write>(out: &mut W, line: &SimulationLine<'_>) -> CliResult<()> {
    let json = serde_json::to_string(line)
        .map_err(|err| CliError::new(format!("failed to serialize output: {err}")))?;
    writeln!(out, "{json}").map_err(|err| CliError::new(format!("failed to write output: {err}")))
}

// ============================================================================
// SECTION: Simulation
// ============================================================================

/// Delegate for redemptions; outcomes are reported from the attempt reports.
struct ReportedDelegate;

impl RedeemConfirmationDelegate for ReportedDelegate {}

/// Runs a simulation, writing JSON lines to `out`.
///
/// # Errors
///
/// Returns [`CliError`] when the audit sink cannot be built, a committed ad
/// cannot be tracked, or output cannot be written.
pub(crate) fn run_simulation<S, W>(
    config: &AdServingConfig,
    catalog: Vec<Candidate>,
    arms: S,
    options: &SimulationOptions,
    transport: Option<&dyn RedemptionTransport>,
    out: &mut W,
) -> CliResult<SimulationSummary>
where
    S: BanditArmStore + Clone,
    W: Write,
{
    let audit = config
        .audit
        .build_sink()
        .map_err(|err| CliError::new(format!("failed to open audit sink: {err}")))?;
    let mut handler = NotificationAdHandler::new(HandlerParts {
        catalog: InMemoryCatalog::new(catalog),
        history: InMemoryAdEventHistory::new(),
        ledger: InMemoryTransactionLedger::new(),
        arms,
        client: ClientContext::new(options.client.clone()),
        params: ParamsHandle::new(config.serving_params()),
        random: PacingRandom::seeded(options.seed),
        credentials: Box::new(OptedOutCredentialIssuer),
        audit,
    });
    let clock = FixedClock::new(options.start);
    let mut summary = SimulationSummary {
        opportunities: options.opportunities,
        ..SimulationSummary::default()
    };
    for opportunity in 0..options.opportunities {
        if opportunity > 0 {
            clock.advance(options.interval);
        }
        let now = clock.now();
        let decision = handler
            .maybe_serve(now)
            .map_err(|err| CliError::new(format!("opportunity {opportunity} failed: {err}")))?;
        emit(out, &SimulationLine::Decision {
            opportunity,
            decision: &decision,
        })?;
        let Some(ad) = decision.committed_ad() else {
            summary.suppressed += 1;
            continue;
        };
        summary.served += 1;
        let placement_id = ad.placement_id.clone();
        let mut at = now.saturating_add(VIEW_DELAY);
        for &event_type in options.engagement.events() {
            // Rejected transitions are recorded by the audit sink; the run continues.
            if let Ok(outcome) = handler.trigger_event(&placement_id, event_type, at) {
                summary.events += 1;
                emit(out, &SimulationLine::Event {
                    event_type,
                    outcome: &outcome,
                })?;
            }
            at = at.saturating_add(ENGAGE_DELAY);
        }
        if let Some(transport) = transport {
            for report in handler.process_redemptions(transport, &ReportedDelegate, at) {
                if report.status == RedemptionStatus::Redeemed {
                    summary.redeemed += 1;
                }
                emit(out, &SimulationLine::Redemption {
                    report: &report,
                })?;
            }
        }
    }
    handler.end_session();
    emit(out, &SimulationLine::Summary(&summary))?;
    Ok(summary)
}
