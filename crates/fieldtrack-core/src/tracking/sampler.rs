//! In-process periodic sampler.
//!
//! Implements [`Scheduler`] with a tokio interval for hosts that stay
//! running (a daemon, a desktop shell). Each tick reads the current
//! position and forwards it unless it is closer than `min_distance_m` to
//! the last position delivered.

use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use super::event::Position;
use crate::capabilities::{LocationProvider, LocationSink, SamplerOptions, Scheduler};
use crate::error::CoreError;

pub struct IntervalSampler {
    location: Arc<dyn LocationProvider>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl IntervalSampler {
    pub fn new(location: Arc<dyn LocationProvider>) -> Self {
        Self {
            location,
            task: Mutex::new(None),
        }
    }
}

#[async_trait]
impl Scheduler for IntervalSampler {
    async fn start_periodic(
        &self,
        options: SamplerOptions,
        sink: Arc<dyn LocationSink>,
    ) -> Result<(), CoreError> {
        let mut task = self.task.lock().await;
        if task.as_ref().is_some_and(|handle| !handle.is_finished()) {
            return Ok(());
        }

        let location = self.location.clone();
        *task = Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(options.interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            let mut last: Option<Position> = None;
            loop {
                ticker.tick().await;
                let position = match location.current_position().await {
                    Ok(position) => position,
                    Err(e) => {
                        tracing::warn!(error = %e, "sampler could not read position");
                        continue;
                    }
                };
                if let Some(previous) = last {
                    if previous.distance_m(&position) < options.min_distance_m {
                        tracing::trace!("sampler moved less than minimum distance");
                        continue;
                    }
                }
                last = Some(position);
                sink.on_location(position).await;
            }
        }));
        tracing::debug!(interval = ?options.interval, "periodic sampler started");
        Ok(())
    }

    async fn stop_periodic(&self) -> Result<(), CoreError> {
        if let Some(handle) = self.task.lock().await.take() {
            handle.abort();
            tracing::debug!("periodic sampler stopped");
        }
        Ok(())
    }

    async fn is_running(&self) -> bool {
        self.task
            .lock()
            .await
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }
}
