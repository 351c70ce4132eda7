//! Lifecycle-driven heading monitor
//!
//! The monitor pulls samples from a [`HeadingSource`] while its host surface
//! is visible and the application is in the foreground, and publishes the
//! derived display values over a watch channel. Hiding the surface or moving
//! to the background stops the update stream; showing it or returning to the
//! foreground starts it again.

use crate::error::Result;
use crate::heading::{HeadingDisplay, HeadingSample};
use async_trait::async_trait;
use tokio::sync::{mpsc, watch};
use tracing::{debug, warn};

/// Provider of magnetic heading updates
///
/// Implementations must deliver every reading without a minimum-change
/// filter. Errors are classified by [`crate::Error::is_sensor_terminal`]:
/// terminal errors end the update stream, everything else is transient.
#[async_trait]
pub trait HeadingSource: Send {
    /// Wait for and return the next heading sample
    async fn next_heading(&mut self) -> Result<HeadingSample>;
}

/// Visibility and application-state transitions of the host surface
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleEvent {
    /// The host surface became visible
    Shown,
    /// The host surface was hidden
    Hidden,
    /// The application returned to the foreground
    Activated,
    /// The application moved to the background
    Deactivated,
}

/// Heading monitor state machine
pub struct HeadingMonitor<S> {
    source: S,
    display_tx: watch::Sender<Option<HeadingDisplay>>,
    visible: bool,
    active: bool,
    denied: bool,
}

impl<S: HeadingSource> HeadingMonitor<S> {
    /// Create a monitor around a heading source.
    ///
    /// Returns the monitor and a receiver for display updates. The monitor
    /// starts hidden; deliver [`LifecycleEvent::Shown`] to begin updates.
    pub fn new(source: S) -> (Self, watch::Receiver<Option<HeadingDisplay>>) {
        let (display_tx, display_rx) = watch::channel(None);
        (
            Self {
                source,
                display_tx,
                visible: false,
                active: true,
                denied: false,
            },
            display_rx,
        )
    }

    /// Whether the monitor is currently pulling updates
    pub fn is_updating(&self) -> bool {
        self.visible && self.active && !self.denied
    }

    /// Apply a lifecycle transition.
    ///
    /// Showing the surface or returning to the foreground restarts the
    /// stream, which also clears a previous permission denial so the
    /// platform gets asked again.
    pub fn handle_event(&mut self, event: LifecycleEvent) {
        match event {
            LifecycleEvent::Shown => {
                self.visible = true;
                self.denied = false;
            }
            LifecycleEvent::Hidden => self.visible = false,
            LifecycleEvent::Activated => {
                self.active = true;
                self.denied = false;
            }
            LifecycleEvent::Deactivated => self.active = false,
        }
        debug!(?event, updating = self.is_updating(), "heading lifecycle");
    }

    /// Pull a single sample if the monitor is updating.
    ///
    /// Returns the published display values, or `None` when the monitor is
    /// stopped or the sample failed.
    pub async fn poll_once(&mut self) -> Option<HeadingDisplay> {
        if !self.is_updating() {
            return None;
        }
        let result = self.source.next_heading().await;
        self.apply_sample(result)
    }

    /// Drive the monitor until the event channel closes.
    pub async fn run(mut self, mut events: mpsc::Receiver<LifecycleEvent>) {
        enum Step {
            Event(Option<LifecycleEvent>),
            Sample(Result<HeadingSample>),
        }

        loop {
            let step = if self.is_updating() {
                tokio::select! {
                    event = events.recv() => Step::Event(event),
                    result = self.source.next_heading() => Step::Sample(result),
                }
            } else {
                Step::Event(events.recv().await)
            };

            match step {
                Step::Event(Some(event)) => self.handle_event(event),
                Step::Event(None) => break,
                Step::Sample(result) => {
                    self.apply_sample(result);
                }
            }
        }
    }

    fn apply_sample(&mut self, result: Result<HeadingSample>) -> Option<HeadingDisplay> {
        match result {
            Ok(sample) => {
                let display = sample.display();
                // Receivers may come and go; a send with no receiver is fine.
                let _ = self.display_tx.send(Some(display));
                Some(display)
            }
            Err(err) if err.is_sensor_terminal() => {
                warn!(error = %err, "heading updates stopped");
                self.denied = true;
                None
            }
            Err(err) => {
                warn!(error = %err, "heading failure, continuing");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use std::collections::VecDeque;

    struct ScriptedSource {
        script: VecDeque<Result<HeadingSample>>,
        polls: usize,
    }

    impl ScriptedSource {
        fn new(script: Vec<Result<HeadingSample>>) -> Self {
            Self {
                script: script.into(),
                polls: 0,
            }
        }
    }

    #[async_trait]
    impl HeadingSource for ScriptedSource {
        async fn next_heading(&mut self) -> Result<HeadingSample> {
            self.polls += 1;
            self.script
                .pop_front()
                .unwrap_or(Ok(HeadingSample::new(0.0, 0.0, 0.0)))
        }
    }

    #[tokio::test]
    async fn hidden_monitor_publishes_nothing() {
        let source = ScriptedSource::new(vec![Ok(HeadingSample::new(3.0, 4.0, 0.0))]);
        let (mut monitor, rx) = HeadingMonitor::new(source);

        assert!(monitor.poll_once().await.is_none());
        assert!(rx.borrow().is_none());
        assert_eq!(monitor.source.polls, 0);
    }

    #[tokio::test]
    async fn shown_monitor_publishes_display_values() {
        let source = ScriptedSource::new(vec![Ok(HeadingSample::new(3.0, 4.0, 0.0))]);
        let (mut monitor, rx) = HeadingMonitor::new(source);
        monitor.handle_event(LifecycleEvent::Shown);

        let display = monitor.poll_once().await.expect("display published");
        assert_eq!(display.strength, 5.0);
        assert_eq!(display.strength_ratio, 0.005);
        assert_eq!(rx.borrow().as_ref().unwrap().strength, 5.0);
    }

    #[tokio::test]
    async fn background_transition_pauses_and_resumes() {
        let source = ScriptedSource::new(vec![
            Ok(HeadingSample::new(1.0, 0.0, 0.0)),
            Ok(HeadingSample::new(2.0, 0.0, 0.0)),
        ]);
        let (mut monitor, _rx) = HeadingMonitor::new(source);
        monitor.handle_event(LifecycleEvent::Shown);

        assert!(monitor.poll_once().await.is_some());

        monitor.handle_event(LifecycleEvent::Deactivated);
        assert!(monitor.poll_once().await.is_none());
        assert_eq!(monitor.source.polls, 1);

        monitor.handle_event(LifecycleEvent::Activated);
        let display = monitor.poll_once().await.expect("resumed");
        assert_eq!(display.strength, 2.0);
    }

    #[tokio::test]
    async fn permission_denial_stops_the_stream() {
        let source = ScriptedSource::new(vec![
            Err(Error::SensorPermissionDenied("denied".into())),
            Ok(HeadingSample::new(1.0, 0.0, 0.0)),
        ]);
        let (mut monitor, rx) = HeadingMonitor::new(source);
        monitor.handle_event(LifecycleEvent::Shown);

        assert!(monitor.poll_once().await.is_none());
        assert!(!monitor.is_updating());

        // Still stopped; the queued good sample is never pulled.
        assert!(monitor.poll_once().await.is_none());
        assert_eq!(monitor.source.polls, 1);
        assert!(rx.borrow().is_none());
    }

    #[tokio::test]
    async fn transient_failure_is_logged_and_skipped() {
        let source = ScriptedSource::new(vec![
            Err(Error::HeadingFailure("glitch".into())),
            Ok(HeadingSample::new(0.0, 0.0, 9.0)),
        ]);
        let (mut monitor, _rx) = HeadingMonitor::new(source);
        monitor.handle_event(LifecycleEvent::Shown);

        assert!(monitor.poll_once().await.is_none());
        assert!(monitor.is_updating());

        let display = monitor.poll_once().await.expect("stream continued");
        assert_eq!(display.strength, 9.0);
    }

    #[tokio::test]
    async fn showing_again_retries_after_denial() {
        let source = ScriptedSource::new(vec![
            Err(Error::SensorPermissionDenied("denied".into())),
            Ok(HeadingSample::new(1.0, 0.0, 0.0)),
        ]);
        let (mut monitor, _rx) = HeadingMonitor::new(source);
        monitor.handle_event(LifecycleEvent::Shown);
        assert!(monitor.poll_once().await.is_none());

        monitor.handle_event(LifecycleEvent::Shown);
        assert!(monitor.poll_once().await.is_some());
    }
}
