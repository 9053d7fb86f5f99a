//! Poll scheduler - Two independently paced refresh timers

use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::{info, trace};

use super::controller::Controller;
use super::settings::Settings;
use super::store::FetchKind;

/// Drives periodic process and port fetches for a controller
///
/// Each timer only asks the controller for a fetch; the controller drops the
/// request if one of that kind is still outstanding, so a slow backend never
/// piles up concurrent fetches.
pub struct PollScheduler {
    controller: Controller,
    timers: Vec<JoinHandle<()>>,
}

impl PollScheduler {
    /// Fetch both kinds immediately, then keep refreshing on the configured
    /// periods. Must be called from within a Tokio runtime.
    pub fn start(controller: Controller, settings: &Settings) -> Self {
        let process_period = settings.process_interval();
        let port_period = settings.port_interval();

        controller.trigger(FetchKind::Processes);
        controller.trigger(FetchKind::Ports);

        let timers = vec![
            spawn_timer(controller.clone(), FetchKind::Processes, process_period),
            spawn_timer(controller.clone(), FetchKind::Ports, port_period),
        ];

        info!(
            "Polling processes every {:?} and ports every {:?}",
            process_period, port_period
        );
        Self { controller, timers }
    }

    /// Cancel both timers and stop the controller. Fetches already running
    /// complete, but their results are discarded.
    pub fn stop(&mut self) {
        if self.timers.is_empty() {
            return;
        }
        for timer in self.timers.drain(..) {
            timer.abort();
        }
        self.controller.shutdown();
    }

    pub fn is_running(&self) -> bool {
        !self.timers.is_empty()
    }
}

impl Drop for PollScheduler {
    fn drop(&mut self) {
        self.stop();
    }
}

fn spawn_timer(controller: Controller, kind: FetchKind, period: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = time::interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        loop {
            ticker.tick().await;
            if controller.is_stopped() {
                break;
            }
            if controller.trigger(kind).is_none() {
                trace!("{} tick skipped", kind);
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::core::testing::{process, tcp, FakeBackend};

    fn fast_settings() -> Settings {
        Settings {
            process_interval_ms: 100,
            port_interval_ms: 100,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn start_fetches_both_kinds_immediately() {
        let backend = Arc::new(FakeBackend::new());
        backend.set_processes(Ok(vec![process(1, "a", 2.0, 1000)]));
        backend.set_ports(Ok(vec![tcp(8080, 1, "a")]));
        let process_gate = backend.hold_processes();
        let port_gate = backend.hold_ports();

        let controller = Controller::new(backend.clone(), &Settings::default());
        let mut scheduler = PollScheduler::start(controller.clone(), &Settings::default());
        assert!(scheduler.is_running());
        assert!(controller.is_fetching(FetchKind::Processes));
        assert!(controller.is_fetching(FetchKind::Ports));

        drop(process_gate);
        drop(port_gate);
        for _ in 0..100 {
            if !controller.is_fetching(FetchKind::Processes)
                && !controller.is_fetching(FetchKind::Ports)
            {
                break;
            }
            time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(controller.process_view().rows.len(), 1);
        assert_eq!(controller.port_view().len(), 1);

        scheduler.stop();
        assert!(!scheduler.is_running());
        assert!(controller.is_stopped());
    }

    #[tokio::test]
    async fn timers_keep_polling_until_stopped() {
        let backend = Arc::new(FakeBackend::new());
        let settings = fast_settings();
        let controller = Controller::new(backend.clone(), &settings);
        let mut scheduler = PollScheduler::start(controller.clone(), &settings);

        time::sleep(Duration::from_millis(450)).await;
        assert!(FakeBackend::calls(&backend.process_calls) >= 2);
        assert!(FakeBackend::calls(&backend.port_calls) >= 2);

        scheduler.stop();
        time::sleep(Duration::from_millis(50)).await;
        let processes = FakeBackend::calls(&backend.process_calls);
        let ports = FakeBackend::calls(&backend.port_calls);

        time::sleep(Duration::from_millis(300)).await;
        assert_eq!(FakeBackend::calls(&backend.process_calls), processes);
        assert_eq!(FakeBackend::calls(&backend.port_calls), ports);
    }

    #[tokio::test]
    async fn slow_fetch_suppresses_overlapping_ticks() {
        let backend = Arc::new(FakeBackend::new());
        let gate = backend.hold_ports();
        let settings = fast_settings();
        let controller = Controller::new(backend.clone(), &settings);
        let _scheduler = PollScheduler::start(controller.clone(), &settings);

        // Several port periods elapse while the first fetch is held open
        time::sleep(Duration::from_millis(350)).await;
        assert_eq!(FakeBackend::calls(&backend.port_calls), 1);
        assert!(FakeBackend::calls(&backend.process_calls) >= 2);

        drop(gate);
    }

    #[tokio::test(start_paused = true)]
    async fn manual_refresh_leaves_timer_schedule_alone() {
        let backend = Arc::new(FakeBackend::new());
        let settings = Settings {
            process_interval_ms: 60_000,
            port_interval_ms: 1000,
            ..Default::default()
        };
        let controller = Controller::new(backend.clone(), &settings);
        let started = Instant::now();
        let _scheduler = PollScheduler::start(controller.clone(), &settings);

        time::sleep_until(started + Duration::from_millis(400)).await;
        assert_eq!(FakeBackend::calls(&backend.port_calls), 1);
        assert!(controller.refresh_ports().await);
        assert_eq!(FakeBackend::calls(&backend.port_calls), 2);

        // The timer still fires one period after start, not after the manual refresh
        time::sleep_until(started + Duration::from_millis(900)).await;
        assert_eq!(FakeBackend::calls(&backend.port_calls), 2);
        time::sleep_until(started + Duration::from_millis(1100)).await;
        assert_eq!(FakeBackend::calls(&backend.port_calls), 3);
        time::sleep_until(started + Duration::from_millis(1450)).await;
        assert_eq!(FakeBackend::calls(&backend.port_calls), 3);
        time::sleep_until(started + Duration::from_millis(2100)).await;
        assert_eq!(FakeBackend::calls(&backend.port_calls), 4);
    }

    #[tokio::test]
    async fn dropping_scheduler_stops_controller() {
        let backend = Arc::new(FakeBackend::new());
        let controller = Controller::new(backend.clone(), &fast_settings());
        {
            let _scheduler = PollScheduler::start(controller.clone(), &fast_settings());
        }
        assert!(controller.is_stopped());
        assert!(controller.trigger(FetchKind::Ports).is_none());
    }
}
