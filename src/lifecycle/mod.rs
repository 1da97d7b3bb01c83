//! Request lifecycle engine: the session snapshot and the two user flows.
//!
//! Flows never mutate local state after a mutation succeeds. They await the
//! call, then refetch the user snapshot and re-derive what to show from it.

mod conversion;
mod error;
mod session;
mod withdrawal;

pub use conversion::ConversionFlow;
pub use error::{FieldErrors, FieldSlot, FlowError, FlowOutcome, ValidationError, field_slot};
pub use session::SessionStore;
pub use withdrawal::{MethodKind, StatusOutcome, StatusView, WithdrawalFlow, WithdrawalView};

use std::future::Future;

use tracing::{debug, warn};

use crate::api::{self, ApiResponse};
use crate::notification::{Event, Notifier};

/// Awaits a mutating call, mirrors the result as a toast and refetches the snapshot.
///
/// A failed refetch does not fail the action; the next refresh converges.
pub(crate) async fn complete_mutation<T, F>(
    session: &SessionStore,
    notifier: &dyn Notifier,
    action: &'static str,
    call: F,
) -> Result<(FlowOutcome, Option<T>), FlowError>
where
    F: Future<Output = api::Result<ApiResponse<T>>>,
{
    let response = match call.await {
        Ok(response) => response,
        Err(err) => {
            let err = FlowError::from(err);
            warn!(action, error = %err, "request failed");
            if err.wants_toast() {
                notifier.send_async(Event::failure(
                    action,
                    err.to_string(),
                    err.description().map(str::to_string),
                ));
            }
            return Err(err);
        }
    };

    let refreshed = match session.refresh().await {
        Ok(installed) => installed,
        Err(err) => {
            warn!(action, error = %err, "refetch after mutation failed");
            false
        }
    };
    debug!(action, refreshed, "request completed");

    if let Some(message) = &response.message {
        notifier.send_async(Event::success(
            action,
            message.clone(),
            response.description.clone(),
        ));
    }
    let outcome = FlowOutcome {
        message: response.message,
        description: response.description,
        refreshed,
    };
    Ok((outcome, response.data))
}

#[cfg(test)]
mod tests;
