//! Folding local results and the breach verdict into a snapshot.

use chrono::Utc;
use warden_common::constants::messages;
use warden_common::{
    HibpStatus, Requirement, UnknownReason, ValidationSnapshot, VerificationVerdict,
};

use super::requirements::LocalReport;
use crate::client::VerificationOutcome;

/// Where the breach check stands for the current value
#[derive(Debug, Clone, Copy)]
pub enum RemoteStatus<'a> {
    /// No check will run (local requirements failing, or cancelled)
    Idle,
    /// Debounce window open
    Pending,
    Checking,
    Resolved {
        outcome: &'a VerificationOutcome,
        fingerprint: &'a str,
    },
}

/// Build a complete snapshot. Never patches an existing one.
pub fn compose(version: u64, local: &LocalReport, remote: RemoteStatus<'_>) -> ValidationSnapshot {
    let mut snapshot = ValidationSnapshot::fresh();
    snapshot.version = version;
    snapshot.updated_at = Utc::now();

    for (requirement, passed) in &local.results {
        snapshot.requirements.insert(*requirement, Some(*passed));
    }
    snapshot.errors = local.errors.clone();

    match remote {
        RemoteStatus::Idle => {}
        RemoteStatus::Pending => snapshot.hibp = HibpStatus::Pending,
        RemoteStatus::Checking => snapshot.hibp = HibpStatus::Checking,
        RemoteStatus::Resolved {
            outcome,
            fingerprint,
        } => fold_verdict(&mut snapshot, outcome, fingerprint),
    }

    let breach_ok = snapshot.requirement(Requirement::NotCompromised) == Some(true)
        || snapshot.fallback_applied;
    snapshot.is_valid = local.all_passed() && snapshot.errors.is_empty() && breach_ok;
    snapshot.progress = progress(&snapshot);
    snapshot
}

fn fold_verdict(snapshot: &mut ValidationSnapshot, outcome: &VerificationOutcome, fingerprint: &str) {
    match outcome.verdict {
        VerificationVerdict::Safe => {
            snapshot.hibp = HibpStatus::Safe;
            snapshot
                .requirements
                .insert(Requirement::NotCompromised, Some(true));
        }
        VerificationVerdict::Compromised => {
            snapshot.hibp = HibpStatus::Compromised;
            snapshot
                .requirements
                .insert(Requirement::NotCompromised, Some(false));
            snapshot.errors.push(messages::COMPROMISED.to_string());
        }
        VerificationVerdict::Unknown { reason } => match reason {
            UnknownReason::Cancelled | UnknownReason::NotChecked => return,
            UnknownReason::ServiceUnavailable | UnknownReason::RateLimited => {
                snapshot.hibp = HibpStatus::Unavailable;
                // The requirement stays unknown; fallback lets it count as met.
                let fallback = outcome.handling.as_ref().is_none_or(|h| h.should_fallback);
                if fallback {
                    snapshot.fallback_applied = true;
                    snapshot.warnings.push(messages::NOT_CONFIRMED.to_string());
                }
                if let Some(handling) = &outcome.handling {
                    if handling.user_message != messages::NOT_CONFIRMED {
                        snapshot.warnings.push(handling.user_message.clone());
                    }
                }
            }
        },
    }
    snapshot.last_checked = Some(fingerprint.to_string());
}

/// Share of requirements met, 0-100. A fallback counts as met.
fn progress(snapshot: &ValidationSnapshot) -> u8 {
    let total = snapshot.requirements.len();
    if total == 0 {
        return 0;
    }
    let met = snapshot
        .requirements
        .iter()
        .filter(|(requirement, state)| {
            **state == Some(true)
                || (**requirement == Requirement::NotCompromised && snapshot.fallback_applied)
        })
        .count();
    ((met * 100) / total) as u8
}
