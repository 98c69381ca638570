//! Gateway status conditions

use chrono::{SecondsFormat, Utc};
use fetchfy_api::Condition;

pub const CONDITION_READY: &str = "Ready";
pub const CONDITION_AVAILABLE: &str = "Available";

pub const REASON_GATEWAY_READY: &str = "GatewayReady";
pub const REASON_GATEWAY_CONFIGURED: &str = "GatewayConfigured";
pub const REASON_SERVER_ERROR: &str = "ServerError";
pub const REASON_CONFIGURATION_ERROR: &str = "ConfigurationError";

pub const STATUS_TRUE: &str = "True";
pub const STATUS_FALSE: &str = "False";

/// Set a condition by type.
///
/// Returns false without touching anything when status, reason and message
/// already match. Otherwise the condition is replaced in place or appended,
/// stamped with the current time and `generation`.
pub fn set_condition(
    conditions: &mut Vec<Condition>,
    condition_type: &str,
    status: &str,
    reason: &str,
    message: &str,
    generation: Option<i64>,
) -> bool {
    let existing = conditions
        .iter()
        .position(|c| c.condition_type == condition_type);

    if let Some(i) = existing {
        let current = &conditions[i];
        if current.status == status && current.reason == reason && current.message == message {
            return false;
        }
    }

    let condition = Condition {
        condition_type: condition_type.to_string(),
        status: status.to_string(),
        reason: reason.to_string(),
        message: message.to_string(),
        last_transition_time: Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
        observed_generation: generation,
    };

    match existing {
        Some(i) => conditions[i] = condition,
        None => conditions.push(condition),
    }
    true
}
