//! The long-running poll, deliver, sleep loop.
//!
//! One logical thread runs every cycle to completion before sleeping.
//! A stop request is honored at the top of each cycle and during sleeps;
//! an in-flight HTTP call always finishes (or times out) first.

use anyhow::Context;
use signal_hook::consts::{SIGINT, SIGTERM};
use signal_hook::flag;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::avito::{AvitoClient, MessageApi};
use crate::channel::telegram::TelegramClient;
use crate::channel::NotificationChannel;
use crate::config::RelayConfig;
use crate::fanout::Fanout;
use crate::source::MessageSource;

/// Granularity of stop checks while sleeping.
const SLEEP_STEP: Duration = Duration::from_millis(250);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelayState {
    Idle,
    Polling,
    Delivering,
    Sleeping,
    Stopped,
}

/// Shared stop request, set by SIGINT/SIGTERM or by calling [`StopSignal::stop`].
#[derive(Debug, Clone, Default)]
pub struct StopSignal {
    flag: Arc<AtomicBool>,
}

impl StopSignal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Route SIGINT and SIGTERM to this signal.
    pub fn register_os_signals(&self) -> anyhow::Result<()> {
        flag::register(SIGTERM, Arc::clone(&self.flag))
            .context("Failed to register SIGTERM handler")?;
        flag::register(SIGINT, Arc::clone(&self.flag))
            .context("Failed to register SIGINT handler")?;
        Ok(())
    }

    pub fn stop(&self) {
        self.flag.store(true, Ordering::Relaxed);
    }

    pub fn is_stopped(&self) -> bool {
        self.flag.load(Ordering::Relaxed)
    }

    /// Sleep for `duration`, waking early on stop. Returns true if stopped.
    pub fn sleep(&self, duration: Duration) -> bool {
        let mut remaining = duration;
        while remaining > Duration::ZERO {
            if self.is_stopped() {
                return true;
            }
            let step = remaining.min(SLEEP_STEP);
            std::thread::sleep(step);
            remaining = remaining.saturating_sub(step);
        }
        self.is_stopped()
    }
}

/// What one cycle did.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct CycleReport {
    pub polled: usize,
    pub delivered: usize,
    pub undelivered: usize,
    pub marked_read: usize,
}

pub struct Relay<A, C> {
    source: MessageSource<A>,
    fanout: Fanout<C>,
    poll_interval: Duration,
    recovery_delay: Duration,
    mark_read: bool,
    state: RelayState,
}

impl Relay<AvitoClient, TelegramClient> {
    pub fn from_config(config: &RelayConfig) -> Self {
        let source = MessageSource::new(
            AvitoClient::from_config(config),
            config.avito.method,
            &config.avito.user_id,
        );
        let fanout = Fanout::new(TelegramClient::from_config(config), config.recipients());
        Self::new(source, fanout)
            .with_intervals(
                Duration::from_secs(config.relay.poll_interval_secs),
                Duration::from_secs(config.relay.recovery_delay_secs),
            )
            .with_mark_read(config.relay.mark_read)
    }
}

impl<A: MessageApi, C: NotificationChannel> Relay<A, C> {
    pub fn new(source: MessageSource<A>, fanout: Fanout<C>) -> Self {
        Self {
            source,
            fanout,
            poll_interval: Duration::from_secs(300),
            recovery_delay: Duration::from_secs(60),
            mark_read: false,
            state: RelayState::Idle,
        }
    }

    pub fn with_intervals(mut self, poll_interval: Duration, recovery_delay: Duration) -> Self {
        self.poll_interval = poll_interval;
        self.recovery_delay = recovery_delay;
        self
    }

    pub fn with_mark_read(mut self, mark_read: bool) -> Self {
        self.mark_read = mark_read;
        self
    }

    pub fn state(&self) -> RelayState {
        self.state
    }

    fn set_state(&mut self, state: RelayState) {
        if self.state != state {
            log::debug!("Relay: {:?} -> {:?}", self.state, state);
            self.state = state;
        }
    }

    /// Poll once and deliver every new message before returning.
    pub fn run_cycle(&mut self) -> CycleReport {
        let mut report = CycleReport::default();

        self.set_state(RelayState::Polling);
        log::info!("Checking for new messages...");
        let messages = self.source.poll_new_messages();
        report.polled = messages.len();

        if messages.is_empty() {
            log::info!("No new messages");
            return report;
        }
        log::info!("Found {} new message(s)", messages.len());

        self.set_state(RelayState::Delivering);
        for message in &messages {
            if self.fanout.deliver(message) {
                log::info!("Message {} relayed", message.id);
                report.delivered += 1;
                if self.mark_read && self.source.mark_read(&message.id, &message.thread_id) {
                    report.marked_read += 1;
                }
            } else {
                log::error!("Message {} could not be relayed", message.id);
                report.undelivered += 1;
            }
        }
        report
    }

    /// Run cycles until `stop` is set. A panicking cycle is logged and
    /// followed by the shorter recovery delay instead of ending the loop.
    pub fn run(&mut self, stop: &StopSignal) {
        log::info!(
            "Relay started (interval: {}s)",
            self.poll_interval.as_secs()
        );

        loop {
            if stop.is_stopped() {
                break;
            }

            let outcome = panic::catch_unwind(AssertUnwindSafe(|| self.run_cycle()));
            let pause = match outcome {
                Ok(report) => {
                    log::debug!("Cycle finished: {report:?}");
                    self.poll_interval
                }
                Err(payload) => {
                    log::error!(
                        "Relay cycle failed unexpectedly: {}",
                        panic_message(payload.as_ref())
                    );
                    self.recovery_delay
                }
            };

            self.set_state(RelayState::Sleeping);
            if stop.sleep(pause) {
                break;
            }
        }

        self.set_state(RelayState::Stopped);
        log::info!("Relay stopped");
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
