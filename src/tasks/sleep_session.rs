//! Sleep session task: hosts a timer and acts on its events

use chrono::{Local, TimeDelta};
use futures::stream::{Stream, StreamExt};
use tracing::{debug, info, warn};

use crate::{
    state::TimerState,
    timer::{Scheduler, SleepTimer, TickEvent, TimerEvent},
    utils::{format_time, ControlSignal},
};

/// How a session ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionOutcome {
    /// The countdown completed and playback was stopped
    Stopped,
    /// The countdown completed but auto-stop is off
    Expired,
    /// A shutdown signal cancelled the countdown
    Cancelled,
}

/// Playback-side view of the session: the volume the player should use
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlaybackVolume {
    base: f32,
    current: f32,
}

impl PlaybackVolume {
    /// Start at `percent` of full volume
    pub fn new(percent: u8) -> Self {
        let base = f32::from(percent.min(100)) / 100.0;
        Self {
            base,
            current: base,
        }
    }

    /// Scale the base volume by the tick's fade-out ratio, if any
    pub fn apply(&mut self, tick: &TickEvent) -> f32 {
        self.current = match tick.fade_out {
            Some(ratio) => self.base * ratio.clamp(0.0, 1.0),
            None => self.base,
        };
        self.current
    }

    pub fn current(&self) -> f32 {
        self.current
    }

    pub fn silence(&mut self) {
        self.current = 0.0;
    }
}

/// Drive `timer` until its countdown finishes or a shutdown signal arrives
///
/// The timer must already be started. `signals` delivers pause, extend and
/// shutdown requests.
pub async fn sleep_session_task<S, C>(
    timer: SleepTimer<S>,
    signals: C,
    volume: &mut PlaybackVolume,
    extend_minutes: u64,
) -> SessionOutcome
where
    S: Scheduler + 'static,
    C: Stream<Item = ControlSignal>,
{
    info!("Starting sleep session");
    log_expected_end(&timer);

    let mut events = timer.subscribe();
    let mut signals = std::pin::pin!(signals);

    loop {
        tokio::select! {
            event = events.recv() => {
                match event {
                    Some(TimerEvent::Tick(tick)) => {
                        let level = volume.apply(&tick);
                        if tick.fade_out.is_some() {
                            info!("{} remaining, fading volume to {:.0}%",
                                  format_time(tick.remaining_ms), level * 100.0);
                        } else {
                            debug!("{} remaining", format_time(tick.remaining_ms));
                        }
                    }
                    Some(TimerEvent::Finished { auto_stop: true }) => {
                        volume.silence();
                        info!("Sleep timer expired, stopping playback");
                        return SessionOutcome::Stopped;
                    }
                    Some(TimerEvent::Finished { auto_stop: false }) => {
                        info!("Sleep timer expired, auto-stop is off so playback continues");
                        return SessionOutcome::Expired;
                    }
                    None => {
                        warn!("Timer event channel closed, ending session");
                        return SessionOutcome::Cancelled;
                    }
                }
            }

            Some(signal) = signals.next() => {
                match signal {
                    ControlSignal::Shutdown => {
                        info!("Shutdown requested, cancelling sleep timer");
                        timer.cancel();
                        return SessionOutcome::Cancelled;
                    }
                    ControlSignal::TogglePause => match timer.current_state() {
                        TimerState::Running => timer.pause(),
                        TimerState::Paused => {
                            timer.resume();
                            log_expected_end(&timer);
                        }
                        TimerState::Stopped => debug!("Pause toggle ignored: timer is stopped"),
                    },
                    ControlSignal::Extend => {
                        timer.extend_timer(extend_minutes);
                        log_expected_end(&timer);
                    }
                }
            }
        }
    }
}

fn log_expected_end<S: Scheduler + 'static>(timer: &SleepTimer<S>) {
    let remaining = timer.remaining_time();
    if remaining == 0 {
        return;
    }
    let Ok(millis) = i64::try_from(remaining) else { return };
    let Some(end) = Local::now().checked_add_signed(TimeDelta::milliseconds(millis)) else {
        return;
    };
    info!(
        "Playback will stop in {} (at {})",
        timer.formatted_remaining_time(),
        end.format("%H:%M:%S")
    );
}
