//! Process signals mapped to timer controls

use futures::stream::{Stream, StreamExt};
use signal_hook::consts::{SIGINT, SIGTERM, SIGUSR1, SIGUSR2};
use signal_hook_tokio::Signals;
use tracing::info;

/// What a received signal asks the timer session to do
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlSignal {
    /// SIGINT or SIGTERM: cancel silently and exit
    Shutdown,
    /// SIGUSR1: pause a running timer or resume a paused one
    TogglePause,
    /// SIGUSR2: add time to a running timer
    Extend,
}

impl ControlSignal {
    /// Map a raw signal number, if it is one the session handles
    pub fn from_raw(signal: i32) -> Option<Self> {
        match signal {
            SIGINT | SIGTERM => Some(ControlSignal::Shutdown),
            SIGUSR1 => Some(ControlSignal::TogglePause),
            SIGUSR2 => Some(ControlSignal::Extend),
            _ => None,
        }
    }
}

/// Stream of control signals (SIGTERM, SIGINT, SIGUSR1, SIGUSR2)
pub fn control_signals() -> std::io::Result<impl Stream<Item = ControlSignal>> {
    let signals = Signals::new([SIGTERM, SIGINT, SIGUSR1, SIGUSR2])?;

    Ok(signals.filter_map(|signal| async move {
        info!("Received signal: {}", signal);
        ControlSignal::from_raw(signal)
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maps_handled_signals() {
        assert_eq!(ControlSignal::from_raw(SIGINT), Some(ControlSignal::Shutdown));
        assert_eq!(ControlSignal::from_raw(SIGTERM), Some(ControlSignal::Shutdown));
        assert_eq!(ControlSignal::from_raw(SIGUSR1), Some(ControlSignal::TogglePause));
        assert_eq!(ControlSignal::from_raw(SIGUSR2), Some(ControlSignal::Extend));
        assert_eq!(ControlSignal::from_raw(signal_hook::consts::SIGHUP), None);
    }
}
