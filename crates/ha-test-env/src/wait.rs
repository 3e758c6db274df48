//! Waiting for an entity to reach a state

use std::time::Duration;

use ha_ws_client::{subscribe_entities, HassSocket};
use tracing::debug;

use crate::builder::release;
use crate::error::{HassError, HassResult};

pub const DEFAULT_WAIT_TIMEOUT: Duration = Duration::from_millis(5000);

/// Resolve once `entity_id` reports `expected`
///
/// The entity subscription is released on every exit path. On timeout the
/// unsubscribe is sent without waiting for the hub, so the error arrives on
/// schedule even if the hub stops answering.
pub async fn wait_for_state(
    connection: &HassSocket,
    entity_id: &str,
    expected: &str,
    timeout: Duration,
) -> HassResult<()> {
    let mut stream = subscribe_entities(connection).await?;

    let outcome = tokio::time::timeout(timeout, async {
        loop {
            let entities = stream.next().await?;
            if entities.get(entity_id).is_some_and(|e| e.state == expected) {
                return Ok::<_, HassError>(());
            }
        }
    })
    .await;

    match outcome {
        Ok(result) => {
            release("entities", stream.unsubscribe()).await;
            if result.is_ok() {
                debug!(entity_id, expected, "Entity reached expected state");
            }
            result
        }
        Err(_) => {
            drop(stream);
            Err(HassError::StateWaitTimeout {
                entity_id: entity_id.to_string(),
                expected: expected.to_string(),
                timeout,
            })
        }
    }
}
