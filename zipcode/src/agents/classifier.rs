//! Intent classifier agent.

use std::sync::Arc;

use tracing::{debug, instrument};

use crate::core::intent::{Intent, parse_intent};
use crate::error::RuntimeError;
use crate::io::prompt::classifier_system_prompt;
use crate::io::provider::CapabilityProvider;

use super::describe_provider_error;

/// Turns a raw user prompt into a strictly validated [`Intent`].
///
/// The prompt is sent as-is, without repository context.
#[derive(Clone)]
pub struct IntentClassifier {
    provider: Arc<dyn CapabilityProvider>,
}

impl IntentClassifier {
    pub fn new(provider: Arc<dyn CapabilityProvider>) -> Self {
        Self { provider }
    }

    /// Provider failures are `TransportFailure`; a response that is not a
    /// conforming intent object is `ClassificationMalformed`.
    #[instrument(skip_all, fields(prompt_bytes = prompt.len()))]
    pub async fn classify(&self, prompt: &str) -> Result<Intent, RuntimeError> {
        let system_prompt = classifier_system_prompt().map_err(|err| {
            RuntimeError::ClassificationMalformed(format!("render classifier prompt: {err}"))
        })?;
        let raw = self
            .provider
            .complete(&system_prompt, prompt)
            .await
            .map_err(|err| RuntimeError::TransportFailure(describe_provider_error(&err)))?;
        debug!(response_bytes = raw.len(), "classifier responded");
        let intent = parse_intent(&raw).map_err(RuntimeError::ClassificationMalformed)?;
        debug!(?intent, "intent classified");
        Ok(intent)
    }
}
