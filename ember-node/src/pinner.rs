//! Bounded background worker for ahead-of-time compilation.
//!
//! Pin requests must never block the calling transaction's critical path,
//! so they are queued here and compiled off-thread, at most one at a time.

use tokio::sync::mpsc;
use tracing::{debug, warn};

use ember_kiln::{Kiln, TxContext};
use ember_types::primitives::CodeId;

const QUEUE_DEPTH: usize = 64;

/// Handle for submitting pin jobs to the background worker.
#[derive(Clone)]
pub struct Pinner {
    tx: mpsc::Sender<CodeId>,
}

impl Pinner {
    /// Spawn the worker. Compilation runs on the blocking pool; the queue is
    /// bounded, and overflow drops the request with a warning rather than
    /// stalling the caller.
    pub fn spawn(kiln: Kiln, ctx: TxContext) -> Self {
        let (tx, mut rx) = mpsc::channel::<CodeId>(QUEUE_DEPTH);
        tokio::spawn(async move {
            while let Some(code_id) = rx.recv().await {
                let kiln = kiln.clone();
                let ctx = ctx.clone();
                let outcome =
                    tokio::task::spawn_blocking(move || kiln.pin_code(&ctx, code_id)).await;
                match outcome {
                    Ok(Ok(())) => debug!(code_id, "background pin complete"),
                    Ok(Err(err)) => warn!(code_id, error = %err, "background pin failed"),
                    Err(err) => warn!(code_id, error = %err, "background pin panicked"),
                }
            }
        });
        Self { tx }
    }

    pub fn request(&self, code_id: CodeId) {
        if self.tx.try_send(code_id).is_err() {
            warn!(code_id, "pin queue full; dropping request");
        }
    }
}
