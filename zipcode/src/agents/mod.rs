//! Model-backed agents: intent classification and planning.

pub mod classifier;
pub mod planner;

use crate::error::ProviderError;

/// Describe a provider failure for an agent's error message.
pub(crate) fn describe_provider_error(err: &ProviderError) -> String {
    match err {
        ProviderError::Transport(detail) => format!("provider unavailable: {detail}"),
        ProviderError::Response(detail) => format!("provider response unusable: {detail}"),
    }
}
