//! Sleep timer state machine

use std::{
    cell::RefCell,
    rc::{Rc, Weak},
    time::Duration,
};
use tokio::sync::mpsc;
use tracing::{debug, info, trace};

use super::{
    events::{ListenerId, Notifier, TickEvent, TimerEvent},
    scheduler::{ScheduledTask, Scheduler, TokioScheduler},
};
use crate::{
    state::{TimerInfo, TimerSettings, TimerState},
    utils::format_time,
};

/// Countdown cadence
pub const TICK_INTERVAL_MS: u64 = 1000;

const MINUTE_MS: u64 = 60_000;
const HOUR_MS: u64 = 60 * MINUTE_MS;

/// Durations offered by a duration picker, shortest first
pub const PRESET_DURATIONS_MS: [u64; 6] = [
    15 * MINUTE_MS,
    30 * MINUTE_MS,
    45 * MINUTE_MS,
    HOUR_MS,
    HOUR_MS + 30 * MINUTE_MS,
    2 * HOUR_MS,
];

/// The scheduled next step of a running countdown
struct Countdown {
    generation: u64,
    pending: Box<dyn ScheduledTask>,
}

enum Phase {
    Stopped,
    Running(Countdown),
    Paused,
}

struct Core {
    phase: Phase,
    total_duration: u64,
    elapsed: u64,
    settings: TimerSettings,
    /// Bumped on every start so steps of a superseded run are ignored
    generation: u64,
}

impl Core {
    fn state(&self) -> TimerState {
        match self.phase {
            Phase::Stopped => TimerState::Stopped,
            Phase::Running(_) => TimerState::Running,
            Phase::Paused => TimerState::Paused,
        }
    }

    fn remaining(&self) -> u64 {
        self.total_duration.saturating_sub(self.elapsed)
    }

    /// Cancel any pending step and fall back to `Stopped`
    fn halt(&mut self) {
        if let Phase::Running(mut countdown) = std::mem::replace(&mut self.phase, Phase::Stopped) {
            countdown.pending.cancel();
        }
    }
}

struct Shared<S> {
    scheduler: S,
    core: RefCell<Core>,
    notifier: RefCell<Notifier>,
}

impl<S> Drop for Shared<S> {
    fn drop(&mut self) {
        self.core.get_mut().halt();
    }
}

/// Countdown sleep timer with pause, resume, extend and fade-out signalling
///
/// All operations are plain state transitions: calling one in a state where it
/// has no meaning (for example `resume` while running) does nothing. The
/// countdown advances through the injected [`Scheduler`], one step per second,
/// and reports through [`TimerEvent`]s.
///
/// `SleepTimer` is a reference-counted handle bound to one thread. Clones
/// drive the same timer, which lets callbacks call back into it.
pub struct SleepTimer<S: Scheduler + 'static = TokioScheduler> {
    shared: Rc<Shared<S>>,
}

impl<S: Scheduler + 'static> Clone for SleepTimer<S> {
    fn clone(&self) -> Self {
        Self {
            shared: Rc::clone(&self.shared),
        }
    }
}

impl SleepTimer<TokioScheduler> {
    /// Create a timer driven by tokio on the current `LocalSet`
    pub fn new() -> Self {
        Self::with_scheduler(TokioScheduler::new())
    }
}

impl Default for SleepTimer<TokioScheduler> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S: Scheduler + 'static> SleepTimer<S> {
    /// Create a stopped timer with default settings
    pub fn with_scheduler(scheduler: S) -> Self {
        Self::with_settings(scheduler, TimerSettings::default())
    }

    /// Create a stopped timer with the given settings
    pub fn with_settings(scheduler: S, settings: TimerSettings) -> Self {
        Self {
            shared: Rc::new(Shared {
                scheduler,
                core: RefCell::new(Core {
                    phase: Phase::Stopped,
                    total_duration: 0,
                    elapsed: 0,
                    settings,
                    generation: 0,
                }),
                notifier: RefCell::new(Notifier::default()),
            }),
        }
    }

    /// Scheduler driving the countdown
    pub fn scheduler(&self) -> &S {
        &self.shared.scheduler
    }

    // ---- Transitions ----

    /// Start a fresh countdown of `duration_ms`, superseding any current one
    ///
    /// Ignored while the timer is disabled.
    pub fn start(&self, duration_ms: u64) {
        let mut core = self.shared.core.borrow_mut();
        if !core.settings.enabled {
            debug!("Start ignored: sleep timer is disabled");
            return;
        }

        core.halt();
        core.generation += 1;
        core.total_duration = duration_ms;
        core.elapsed = 0;

        let generation = core.generation;
        let pending = self.schedule_step(generation, duration_ms.min(TICK_INTERVAL_MS));
        core.phase = Phase::Running(Countdown { generation, pending });

        info!("Sleep timer started for {}", format_time(duration_ms));
    }

    /// Freeze a running countdown
    pub fn pause(&self) {
        let mut core = self.shared.core.borrow_mut();
        match std::mem::replace(&mut core.phase, Phase::Paused) {
            Phase::Running(mut countdown) => {
                countdown.pending.cancel();
                info!("Sleep timer paused with {} remaining", format_time(core.remaining()));
            }
            other => {
                core.phase = other;
                debug!("Pause ignored: sleep timer is {}", core.state());
            }
        }
    }

    /// Restart a paused countdown from its remaining time
    ///
    /// The new run's total duration is the remaining segment, not the
    /// original total.
    pub fn resume(&self) {
        let remaining = {
            let core = self.shared.core.borrow();
            if !matches!(core.phase, Phase::Paused) {
                debug!("Resume ignored: sleep timer is {}", core.state());
                return;
            }
            core.remaining()
        };

        if remaining == 0 {
            debug!("Resume ignored: no time remaining");
            return;
        }

        self.start(remaining);
        info!("Sleep timer resumed");
    }

    /// Stop without reporting completion
    pub fn cancel(&self) {
        self.shared.core.borrow_mut().halt();
        info!("Sleep timer cancelled");
    }

    /// Add minutes to a running countdown
    pub fn extend_timer(&self, additional_minutes: u64) {
        let remaining = {
            let core = self.shared.core.borrow();
            if !matches!(core.phase, Phase::Running(_)) {
                debug!("Extend ignored: sleep timer is {}", core.state());
                return;
            }
            core.remaining()
                .saturating_add(additional_minutes.saturating_mul(MINUTE_MS))
        };

        self.start(remaining);
        info!("Sleep timer extended by {} minutes", additional_minutes);
    }

    /// Set the total duration without starting a countdown
    pub fn set_timer(&self, duration_ms: u64) {
        let mut core = self.shared.core.borrow_mut();
        core.total_duration = duration_ms;
        core.elapsed = core.elapsed.min(duration_ms);
        debug!("Sleep timer duration set to {}", format_time(duration_ms));
    }

    /// Cancel the countdown and drop every callback, listener and subscriber
    ///
    /// Safe to call repeatedly.
    pub fn release(&self) {
        self.shared.core.borrow_mut().halt();
        self.shared.notifier.borrow_mut().clear();
        debug!("Sleep timer released");
    }

    // ---- Settings ----

    /// Enable or disable the timer. Disabling cancels a running countdown.
    pub fn set_enabled(&self, enabled: bool) {
        let mut core = self.shared.core.borrow_mut();
        core.settings.enabled = enabled;
        if !enabled {
            core.halt();
        }
        info!("Sleep timer {}", if enabled { "enabled" } else { "disabled" });
    }

    /// Set whether playback should stop when the countdown finishes
    pub fn set_auto_stop(&self, auto_stop: bool) {
        self.shared.core.borrow_mut().settings.auto_stop = auto_stop;
        debug!("Auto stop {}", if auto_stop { "enabled" } else { "disabled" });
    }

    /// Enable or disable fade-out ratios on late ticks
    pub fn set_fade_out(&self, fade_out: bool) {
        self.shared.core.borrow_mut().settings.fade_out = fade_out;
        debug!("Fade out {}", if fade_out { "enabled" } else { "disabled" });
    }

    /// Set the fade-out window in seconds
    pub fn set_fade_out_duration(&self, duration_secs: u64) {
        self.shared.core.borrow_mut().settings.fade_out_duration_secs = duration_secs;
        debug!("Fade out duration set to {}s", duration_secs);
    }

    /// Replace all settings at once, as loaded from a settings store
    ///
    /// Unlike `set_enabled(false)`, a disabled record leaves a running
    /// countdown alone and only blocks later starts.
    pub fn apply_settings(&self, settings: TimerSettings) {
        self.shared.core.borrow_mut().settings = settings;
        debug!("Sleep timer settings applied: {:?}", settings);
    }

    /// Get the current settings
    pub fn settings(&self) -> TimerSettings {
        self.shared.core.borrow().settings
    }

    /// Check if `start` is currently allowed
    pub fn is_enabled(&self) -> bool {
        self.settings().enabled
    }

    /// Check if completion should stop playback
    pub fn is_auto_stop(&self) -> bool {
        self.settings().auto_stop
    }

    /// Check if fade-out is enabled
    pub fn is_fade_out(&self) -> bool {
        self.settings().fade_out
    }

    /// Get the fade-out window in seconds
    pub fn fade_out_duration_secs(&self) -> u64 {
        self.settings().fade_out_duration_secs
    }

    // ---- Queries ----

    /// Get the current state
    pub fn current_state(&self) -> TimerState {
        self.shared.core.borrow().state()
    }

    /// Check if a countdown is running
    pub fn is_running(&self) -> bool {
        self.current_state() == TimerState::Running
    }

    /// Check if a countdown is paused
    pub fn is_paused(&self) -> bool {
        self.current_state() == TimerState::Paused
    }

    /// Running or paused
    pub fn is_active(&self) -> bool {
        self.current_state().is_active()
    }

    /// Time left in the current run, 0 unless running
    pub fn remaining_time(&self) -> u64 {
        let core = self.shared.core.borrow();
        match core.phase {
            Phase::Running(_) => core.remaining(),
            _ => 0,
        }
    }

    /// Get the total duration of the current or last run
    pub fn total_duration(&self) -> u64 {
        self.shared.core.borrow().total_duration
    }

    /// Get the time elapsed in the current or last run
    pub fn elapsed_time(&self) -> u64 {
        self.shared.core.borrow().elapsed
    }

    /// Elapsed fraction of the total duration, 0 when no duration is set
    pub fn progress(&self) -> f32 {
        let core = self.shared.core.borrow();
        if core.total_duration == 0 {
            return 0.0;
        }
        (core.elapsed as f64 / core.total_duration as f64).clamp(0.0, 1.0) as f32
    }

    /// Remaining time as `H:MM:SS`, `M:SS` or `Ns`
    pub fn formatted_remaining_time(&self) -> String {
        format_time(self.remaining_time())
    }

    /// Total duration as `H:MM:SS`, `M:SS` or `Ns`
    pub fn formatted_total_time(&self) -> String {
        format_time(self.total_duration())
    }

    /// Elapsed time as `H:MM:SS`, `M:SS` or `Ns`
    pub fn formatted_elapsed_time(&self) -> String {
        format_time(self.elapsed_time())
    }

    /// Get the preset durations offered by a picker
    pub fn preset_durations(&self) -> &'static [u64] {
        &PRESET_DURATIONS_MS
    }

    /// Snapshot of state, timing and settings
    pub fn info(&self) -> TimerInfo {
        let settings = self.settings();
        TimerInfo {
            state: self.current_state(),
            remaining_ms: self.remaining_time(),
            total_duration_ms: self.total_duration(),
            elapsed_ms: self.elapsed_time(),
            progress: self.progress(),
            enabled: settings.enabled,
            auto_stop: settings.auto_stop,
            fade_out: settings.fade_out,
            fade_out_duration_secs: settings.fade_out_duration_secs,
        }
    }

    // ---- Notifications ----

    /// Replace the tick callback, which receives the remaining milliseconds
    pub fn set_on_timer_tick(&self, callback: impl FnMut(u64) + 'static) {
        self.shared.notifier.borrow_mut().set_on_tick(Box::new(callback));
    }

    /// Replace the completion callback
    pub fn set_on_timer_finish(&self, callback: impl FnMut() + 'static) {
        self.shared.notifier.borrow_mut().set_on_finish(Box::new(callback));
    }

    /// Register an additional observer of every event
    pub fn add_listener(&self, listener: impl FnMut(&TimerEvent) + 'static) -> ListenerId {
        self.shared.notifier.borrow_mut().add_listener(Box::new(listener))
    }

    /// Unregister an observer. A listener removed while it is being notified
    /// still sees the current event.
    pub fn remove_listener(&self, id: ListenerId) {
        self.shared.notifier.borrow_mut().remove_listener(id);
    }

    /// Receive every event on a channel until the timer is released
    pub fn subscribe(&self) -> mpsc::UnboundedReceiver<TimerEvent> {
        self.shared.notifier.borrow_mut().subscribe()
    }

    // ---- Countdown ----

    fn schedule_step(&self, generation: u64, step_ms: u64) -> Box<dyn ScheduledTask> {
        let weak: Weak<Shared<S>> = Rc::downgrade(&self.shared);
        self.shared.scheduler.schedule(
            Duration::from_millis(step_ms),
            Box::new(move || {
                if let Some(shared) = weak.upgrade() {
                    SleepTimer { shared }.step(generation, step_ms);
                }
            }),
        )
    }

    fn step(&self, generation: u64, step_ms: u64) {
        let event = {
            let mut core = self.shared.core.borrow_mut();
            match &core.phase {
                Phase::Running(countdown) if countdown.generation == generation => {}
                _ => {
                    trace!("Ignoring step of superseded run #{}", generation);
                    return;
                }
            }

            core.elapsed = (core.elapsed + step_ms).min(core.total_duration);
            let remaining = core.remaining();

            if remaining == 0 {
                core.phase = Phase::Stopped;
                core.elapsed = core.total_duration;
                info!("Sleep timer finished");
                TimerEvent::Finished {
                    auto_stop: core.settings.auto_stop,
                }
            } else {
                let next = self.schedule_step(generation, remaining.min(TICK_INTERVAL_MS));
                if let Phase::Running(countdown) = &mut core.phase {
                    countdown.pending = next;
                }

                let fade_out = core.settings.fade_ratio(remaining);
                if let Some(ratio) = fade_out {
                    debug!("Fade out progress: {:.0}%", (1.0 - ratio) * 100.0);
                }
                debug!("Sleep timer tick: {} remaining", format_time(remaining));

                TimerEvent::Tick(TickEvent {
                    remaining_ms: remaining,
                    elapsed_ms: core.elapsed,
                    fade_out,
                })
            }
        };

        self.emit(event);
    }

    fn emit(&self, event: TimerEvent) {
        let mut taken = {
            let mut notifier = self.shared.notifier.borrow_mut();
            notifier.send_to_subscribers(&event);
            notifier.take()
        };

        let epoch = taken.epoch();
        taken.dispatch(&event, || self.shared.notifier.borrow().epoch() == epoch);
        self.shared.notifier.borrow_mut().restore(taken);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::timer::ManualScheduler;
    use std::cell::Cell;

    fn timer() -> SleepTimer<ManualScheduler> {
        SleepTimer::with_scheduler(ManualScheduler::new())
    }

    #[test]
    fn new_timer_is_stopped_and_empty() {
        let timer = timer();
        assert_eq!(timer.current_state(), TimerState::Stopped);
        assert_eq!(timer.total_duration(), 0);
        assert_eq!(timer.elapsed_time(), 0);
        assert_eq!(timer.remaining_time(), 0);
        assert_eq!(timer.progress(), 0.0);
        assert!(!timer.is_active());
    }

    #[test]
    fn start_enters_running() {
        let timer = timer();
        timer.start(10_000);

        assert_eq!(timer.current_state(), TimerState::Running);
        assert_eq!(timer.total_duration(), 10_000);
        assert_eq!(timer.elapsed_time(), 0);
        assert_eq!(timer.remaining_time(), 10_000);
        assert_eq!(timer.scheduler().pending(), 1);
    }

    #[test]
    fn restart_supersedes_previous_run() {
        let timer = timer();
        let ticks = Rc::new(RefCell::new(Vec::new()));
        let t = Rc::clone(&ticks);
        timer.set_on_timer_tick(move |ms| t.borrow_mut().push(ms));

        timer.start(10_000);
        timer.scheduler().advance_ms(500);
        timer.start(5_000);
        assert_eq!(timer.scheduler().pending(), 1);

        timer.scheduler().advance_ms(1000);
        assert_eq!(*ticks.borrow(), vec![4_000]);
    }

    #[test]
    fn pause_freezes_elapsed() {
        let timer = timer();
        timer.start(10_000);
        timer.scheduler().advance_ms(3000);
        timer.pause();

        assert_eq!(timer.current_state(), TimerState::Paused);
        assert_eq!(timer.elapsed_time(), 3000);
        assert_eq!(timer.remaining_time(), 0);
        assert_eq!(timer.scheduler().pending(), 0);

        timer.scheduler().advance_ms(5000);
        assert_eq!(timer.elapsed_time(), 3000);
        assert!(timer.is_active());
    }

    #[test]
    fn invalid_transitions_are_no_ops() {
        let timer = timer();
        timer.pause();
        timer.resume();
        timer.extend_timer(5);
        assert_eq!(timer.current_state(), TimerState::Stopped);

        timer.start(5000);
        timer.resume();
        assert_eq!(timer.current_state(), TimerState::Running);
        assert_eq!(timer.total_duration(), 5000);

        timer.pause();
        timer.pause();
        timer.extend_timer(5);
        assert_eq!(timer.current_state(), TimerState::Paused);
        assert_eq!(timer.total_duration(), 5000);
    }

    #[test]
    fn resume_restarts_from_remaining() {
        let timer = timer();
        timer.start(10_000);
        timer.scheduler().advance_ms(4000);
        timer.pause();
        timer.resume();

        assert_eq!(timer.current_state(), TimerState::Running);
        assert_eq!(timer.total_duration(), 6000);
        assert_eq!(timer.elapsed_time(), 0);
        assert_eq!(timer.remaining_time(), 6000);
    }

    #[test]
    fn resume_with_nothing_left_stays_paused() {
        let timer = timer();
        timer.start(10_000);
        timer.scheduler().advance_ms(2000);
        timer.pause();
        timer.set_timer(2000);

        timer.resume();
        assert_eq!(timer.current_state(), TimerState::Paused);
    }

    #[test]
    fn set_timer_only_configures() {
        let timer = timer();
        timer.set_timer(60_000);

        assert_eq!(timer.total_duration(), 60_000);
        assert_eq!(timer.current_state(), TimerState::Stopped);
        assert_eq!(timer.scheduler().pending(), 0);
        assert_eq!(timer.formatted_total_time(), "1:00");
    }

    #[test]
    fn disabled_timer_ignores_start() {
        let timer = timer();
        timer.start(10_000);
        timer.set_enabled(false);
        assert_eq!(timer.current_state(), TimerState::Stopped);
        assert_eq!(timer.scheduler().pending(), 0);

        timer.start(10_000);
        assert_eq!(timer.current_state(), TimerState::Stopped);

        timer.set_enabled(true);
        timer.start(10_000);
        assert_eq!(timer.current_state(), TimerState::Running);
    }

    #[test]
    fn apply_settings_replaces_all_fields() {
        let timer = timer();
        let settings = TimerSettings {
            enabled: true,
            auto_stop: false,
            fade_out: true,
            fade_out_duration_secs: 12,
        };
        timer.apply_settings(settings);

        assert_eq!(timer.settings(), settings);
        assert!(!timer.is_auto_stop());
        assert!(timer.is_fade_out());
        assert_eq!(timer.fade_out_duration_secs(), 12);
    }

    #[test]
    fn applying_disabled_settings_keeps_countdown_running() {
        let timer = timer();
        timer.start(10_000);
        timer.scheduler().advance_ms(2000);
        timer.apply_settings(TimerSettings {
            enabled: false,
            ..TimerSettings::default()
        });

        assert!(!timer.is_enabled());
        assert_eq!(timer.current_state(), TimerState::Running);
        assert_eq!(timer.remaining_time(), 8000);

        timer.scheduler().advance_ms(8000);
        assert_eq!(timer.current_state(), TimerState::Stopped);
        assert_eq!(timer.elapsed_time(), 10_000);

        timer.start(5000);
        assert_eq!(timer.current_state(), TimerState::Stopped);
    }

    #[test]
    fn callbacks_may_reenter_the_timer() {
        let timer = timer();
        let handle = timer.clone();
        timer.set_on_timer_tick(move |remaining| {
            if remaining <= 8000 {
                handle.cancel();
            }
        });
        let finished = Rc::new(Cell::new(false));
        let f = Rc::clone(&finished);
        timer.set_on_timer_finish(move || f.set(true));

        timer.start(10_000);
        timer.scheduler().advance_ms(20_000);

        assert_eq!(timer.current_state(), TimerState::Stopped);
        assert_eq!(timer.elapsed_time(), 2000);
        assert!(!finished.get());
    }

    #[test]
    fn dropping_the_last_handle_cancels_the_countdown() {
        let scheduler = ManualScheduler::new();
        let timer = SleepTimer::with_scheduler(scheduler.clone());
        timer.start(5000);
        assert_eq!(scheduler.pending(), 1);

        drop(timer);
        assert_eq!(scheduler.pending(), 0);
    }

    #[test]
    fn info_reflects_live_fields() {
        let timer = timer();
        timer.set_fade_out(true);
        timer.set_fade_out_duration(20);
        timer.set_auto_stop(false);
        timer.start(4000);
        timer.scheduler().advance_ms(1000);

        let info = timer.info();
        assert_eq!(info.state, TimerState::Running);
        assert_eq!(info.remaining_ms, 3000);
        assert_eq!(info.total_duration_ms, 4000);
        assert_eq!(info.elapsed_ms, 1000);
        assert_eq!(info.progress, 0.25);
        assert!(info.enabled);
        assert!(!info.auto_stop);
        assert!(info.fade_out);
        assert_eq!(info.fade_out_duration_secs, 20);
    }
}
