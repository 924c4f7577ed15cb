use std::{convert::Infallible, time::Duration};

use axum::response::sse::{Event, KeepAlive, Sse};
use futures::Stream;
use tokio::sync::{
    broadcast::{self, error::RecvError},
    mpsc, watch,
};
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, info, warn};

use crate::{
    dto::sse::{AttemptEvent, Handshake, ServerEvent},
    services::public_service,
    state::{SharedState, counting::HistoryEntry},
};

const EVENT_HANDSHAKE: &str = "handshake";
const EVENT_ATTEMPT: &str = "attempt";
const EVENT_DEGRADED: &str = "degraded";

/// Build the public live feed: a handshake, then one `attempt` event per committed entry
/// and a `degraded` event whenever storage connectivity changes.
pub async fn public_stream(
    state: SharedState,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    // Subscribe before reading the handshake so no commit falls in between.
    let receiver = state.subscribe_feed();
    let mut degraded = state.degraded_watcher();
    degraded.mark_unchanged();
    let handshake = handshake(&state).await;
    to_sse_stream(receiver, degraded, handshake)
}

async fn handshake(state: &SharedState) -> Option<ServerEvent> {
    let current_number = match public_service::current_number(state).await {
        Ok(number) => Some(number),
        Err(err) => {
            debug!(error = %err, "current number unavailable for SSE handshake");
            None
        }
    };
    encode(
        EVENT_HANDSHAKE,
        &Handshake {
            current_number,
            degraded: state.is_degraded(),
        },
    )
}

/// Forward feed entries and degraded-mode changes into an SSE response until the client
/// disconnects.
fn to_sse_stream(
    mut receiver: broadcast::Receiver<HistoryEntry>,
    mut degraded: watch::Receiver<bool>,
    first: Option<ServerEvent>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    // small bounded channel between forwarder and response
    let (tx, rx) = mpsc::channel::<Result<Event, Infallible>>(8);

    tokio::spawn(async move {
        if let Some(first) = first {
            if tx.send(Ok(to_event(first))).await.is_err() {
                return;
            }
        }

        loop {
            let next = tokio::select! {
                _ = tx.closed() => break,
                changed = degraded.changed() => match changed {
                    Ok(()) => {
                        let value = *degraded.borrow_and_update();
                        encode(EVENT_DEGRADED, &value)
                    }
                    Err(_) => break,
                },
                recv_result = receiver.recv() => match recv_result {
                    Ok(entry) => encode(EVENT_ATTEMPT, &AttemptEvent::from(&entry)),
                    Err(RecvError::Closed) => break,
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(skipped, "SSE subscriber lagging; dropping attempts");
                        continue;
                    }
                },
            };

            let Some(event) = next else { continue };
            if tx.send(Ok(to_event(event))).await.is_err() {
                break;
            }
        }

        info!("Public SSE stream disconnected");
    });

    // response stream reads from mpsc; when client disconnects axum drops this stream
    let stream = ReceiverStream::new(rx);
    Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("keep-alive"),
    )
}

fn encode(name: &str, payload: &impl serde::Serialize) -> Option<ServerEvent> {
    match ServerEvent::json(Some(name.to_string()), payload) {
        Ok(event) => Some(event),
        Err(err) => {
            warn!(event = name, error = %err, "failed to serialize SSE payload");
            None
        }
    }
}

fn to_event(payload: ServerEvent) -> Event {
    let event = Event::default().data(payload.data);
    match payload.event {
        Some(name) => event.event(name),
        None => event,
    }
}
