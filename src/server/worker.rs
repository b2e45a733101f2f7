//! Worker tasks: dequeue, invoke the handler, reply.

use std::sync::Arc;

use tokio::task::JoinHandle;

use crate::error::QueueError;
use crate::lifecycle::drain::InFlightTracker;
use crate::observability::metrics;
use crate::queue::QueueReceiver;
use crate::server::handler::RequestHandler;

/// Spawn `count` workers sharing `receiver`'s queue. Each exits once the handle
/// it was spawned from closes or the queue is reclaimed.
pub fn spawn_workers(
    receiver: &QueueReceiver,
    count: usize,
    handler: Arc<dyn RequestHandler>,
    in_flight: &InFlightTracker,
) -> Vec<JoinHandle<()>> {
    (0..count)
        .map(|worker| {
            let mut receiver = receiver.clone();
            let handler = handler.clone();
            let in_flight = in_flight.clone();
            tokio::spawn(async move {
                let queue = receiver.queue_name().to_string();
                tracing::debug!(%queue, worker, "Worker started");
                loop {
                    match receiver.dequeue().await {
                        Ok(request) => {
                            let _guard = in_flight.track();
                            metrics::record_dequeued(&queue);
                            let response = handler.handle(&queue, &request);
                            let request_id = request.id();
                            if !request.respond(response) {
                                tracing::debug!(%queue, %request_id, "Client went away before reply");
                            }
                        }
                        Err(QueueError::Closed) => break,
                        Err(e) => {
                            tracing::error!(%queue, worker, error = %e, "Dequeue failed");
                            break;
                        }
                    }
                }
                tracing::debug!(%queue, worker, "Worker stopped");
            })
        })
        .collect()
}
