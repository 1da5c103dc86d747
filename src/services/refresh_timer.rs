use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;

use crate::models::{AppEvent, EventSender};

/// Periodically asks the UI loop for a refresh. Whether the tick actually
/// refreshes is up to the receiver (auto-refresh may be off).
pub struct RefreshTimer {
    stop_tx: mpsc::Sender<()>,
}

impl RefreshTimer {
    pub fn spawn(period: Duration, events: EventSender) -> Self {
        let (stop_tx, mut stop_rx) = mpsc::channel(1);

        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
            // first tick completes immediately
            interval.tick().await;

            loop {
                tokio::select! {
                    _ = interval.tick() => {
                        if events.send(AppEvent::RefreshTick).is_err() {
                            break;
                        }
                    }
                    _ = stop_rx.recv() => break,
                }
            }
            tracing::debug!("Refresh timer stopped");
        });

        Self { stop_tx }
    }

    /// Best-effort stop; dropping the timer has the same effect.
    pub fn stop(&self) {
        let _ = self.stop_tx.try_send(());
    }
}
