//! Fault supervisor: republishes executor faults as pipeline events.

use tokio::sync::broadcast::{self, error::RecvError};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::executor::ExecutorFault;
use crate::types::Event;

use super::store::JobStore;

/// Consume `faults` until `token` is cancelled or the channel closes
pub(super) fn spawn(
    mut faults: broadcast::Receiver<ExecutorFault>,
    store: JobStore,
    token: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = token.cancelled() => break,
                fault = faults.recv() => match fault {
                    Ok(fault) => {
                        tracing::error!(task = %fault.task, error = %fault.error, "unhandled task fault");
                        store.emit(Event::Fault {
                            task: fault.task,
                            error: fault.error.to_string(),
                        });
                    }
                    Err(RecvError::Lagged(missed)) => {
                        tracing::warn!(missed, "fault supervisor fell behind, faults were dropped");
                    }
                    Err(RecvError::Closed) => break,
                },
            }
        }
        tracing::debug!("fault supervisor stopped");
    })
}
