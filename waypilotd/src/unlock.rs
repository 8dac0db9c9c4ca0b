use std::time::Duration;

use serde::Serialize;
use tokio::time::sleep;
use tracing::{info, warn};

use crate::classify::ScreenState;
use crate::compositor::Compositor;
use crate::config::ClickTarget;
use crate::container::Session;
use crate::device::Transport;
use crate::screen::Observer;

#[derive(Debug, Serialize)]
pub struct UnlockReport {
    pub unlocked: bool,
    pub attempts: u32,
    pub steps_dispatched: u32,
    pub final_state: ScreenState,
}

/// Replay the configured unlock click sequence until the desktop is no
/// longer locked. Safe to call speculatively: when the screen is already
/// unlocked, no click is dispatched at all. Clicks on an unlocked desktop
/// are harmless, so the bounded retries may replay the sequence freely.
pub async fn run_unlock<T: Transport, C: Compositor, S: Session>(
    observer: &Observer<'_, T, C, S>,
) -> UnlockReport {
    let state = observer.screen_state().await;
    if state != ScreenState::Locked {
        return UnlockReport {
            unlocked: true,
            attempts: 0,
            steps_dispatched: 0,
            final_state: state,
        };
    }

    let config = observer.config;
    let sequence = &config.unlock_sequence;
    let center = observer.window().await.center();
    let button = config.elements.button_unlock.position;
    let mut steps_dispatched = 0;

    for attempt in 1..=sequence.retry.max_attempts {
        info!(attempt, max = sequence.retry.max_attempts, "unlock attempt");
        for step in &sequence.steps {
            let point = match step.target {
                ClickTarget::Center => center,
                ClickTarget::ButtonUnlock => button,
            };
            if let Err(e) = observer.transport.desktop_click(point.x, point.y).await {
                warn!(error = %e, "unlock click failed");
            }
            steps_dispatched += 1;
            if step.wait_after_secs > 0.0 {
                sleep(Duration::from_secs_f32(step.wait_after_secs)).await;
            }
        }

        if sequence.retry.verify_after_each {
            let state = observer.screen_state().await;
            if state != ScreenState::Locked {
                info!(attempt, "desktop unlocked");
                return UnlockReport {
                    unlocked: true,
                    attempts: attempt,
                    steps_dispatched,
                    final_state: state,
                };
            }
            warn!(attempt, "still locked after attempt");
        }
    }

    let final_state = observer.screen_state().await;
    let unlocked = final_state != ScreenState::Locked;
    if !unlocked {
        warn!(
            attempts = sequence.retry.max_attempts,
            "desktop still locked after all attempts"
        );
    }
    UnlockReport {
        unlocked,
        attempts: sequence.retry.max_attempts,
        steps_dispatched,
        final_state,
    }
}
