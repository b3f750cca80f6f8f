//! Welcome playback. Greetings play one at a time, in detection order, with a
//! short pause after each.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::pipeline::Shared;

pub(crate) async fn run(
    shared: Arc<Shared>,
    mut rx: mpsc::UnboundedReceiver<String>,
    cancel: CancellationToken,
) {
    info!("welcome worker started");

    loop {
        let identity = tokio::select! {
            _ = cancel.cancelled() => break,
            next = rx.recv() => match next {
                Some(identity) => identity,
                None => break,
            },
        };

        debug!(%identity, "playing welcome");
        if let Err(e) = shared.annunciator.welcome(&identity).await {
            warn!(%identity, error = %e, "welcome playback failed");
        }

        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = tokio::time::sleep(shared.config.welcome_pause) => {}
        }
    }

    info!("welcome worker stopped");
}
