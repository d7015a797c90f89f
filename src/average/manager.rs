use chrono::Utc;

use super::channel::ChannelAverager;
use super::normalize_window_size;
use super::queue::SampleQueue;
use super::reference_layer::ReferenceLayerAverager;
use crate::config::{AverageConfig, TriggerMode};
use crate::ensemble::{ChannelKind, Ensemble};
use crate::error::Result;

/// Callback receiving every published average
pub type Subscriber = Box<dyn FnMut(&Ensemble) + Send>;

/// Handle returned by [`AverageManager::subscribe`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

/// Ping bookkeeping for one queued ensemble
#[derive(Debug, Clone, Copy)]
struct PingSummary {
    desired: u32,
    actual: u32,
    first_ping_time: Option<f32>,
}

impl PingSummary {
    fn of(ensemble: &Ensemble) -> Self {
        match ensemble.info.as_ref() {
            Some(info) => Self {
                desired: info.desired_ping_count,
                actual: info.actual_ping_count,
                first_ping_time: Some(info.first_ping_time),
            },
            None => Self {
                desired: 0,
                actual: 0,
                first_ping_time: None,
            },
        }
    }
}

/// Keeps one averager per enabled channel in step and publishes averages
///
/// Every ensemble goes to every enabled averager, and every eviction is
/// applied to all of them together, so the channels of a published
/// ensemble always cover the same ensembles. Publishing clones the most
/// recent ensemble, overwrites its channels with the averages, stamps the
/// window's ping totals and hands it to each subscriber in turn.
///
/// Not thread safe by itself: arrivals and timer ticks must be delivered
/// from one thread (see [`crate::processing::run_averaging`]).
pub struct AverageManager {
    config: AverageConfig,
    channels: Vec<(ChannelAverager, f32)>,
    reference_layer: Option<(ReferenceLayerAverager, f32)>,
    pings: SampleQueue<PingSummary>,
    sample_count: usize,
    first_ping_time: Option<f32>,
    last_ensemble: Option<Ensemble>,
    subscribers: Vec<(SubscriptionId, Subscriber)>,
    next_subscription: u64,
}

impl AverageManager {
    pub fn new(config: &AverageConfig) -> Self {
        let mut manager = Self {
            config: config.normalized(),
            channels: Vec::new(),
            reference_layer: None,
            pings: SampleQueue::new(),
            sample_count: 0,
            first_ping_time: None,
            last_ensemble: None,
            subscribers: Vec::new(),
            next_subscription: 0,
        };
        manager.build_averagers();
        manager
    }

    fn build_averagers(&mut self) {
        let config = &self.config;
        let layer = config.reference_layer;

        self.channels = config
            .channels
            .enabled()
            .filter(|(kind, _)| {
                let replaced = layer.enabled && *kind == ChannelKind::EarthVelocity;
                if replaced {
                    log::debug!("earth velocity is averaged by the reference layer");
                }
                !replaced
            })
            .map(|(kind, settings)| {
                (
                    ChannelAverager::new(kind, config.window_size, config.running_average),
                    settings.scale,
                )
            })
            .collect();

        self.reference_layer = layer.enabled.then(|| {
            (
                ReferenceLayerAverager::new(
                    config.window_size,
                    config.running_average,
                    layer.min_bin,
                    layer.max_bin,
                ),
                layer.scale,
            )
        });

        log::info!(
            "averaging {} ensembles ({}, {:?} trigger), channels: {:?}, reference layer: {}",
            config.window_size,
            if config.running_average { "running" } else { "block" },
            config.trigger,
            self.channels.iter().map(|(a, _)| a.kind()).collect::<Vec<_>>(),
            if layer.enabled {
                format!("bins {}..={}", layer.min_bin, layer.max_bin)
            } else {
                "off".to_string()
            }
        );
    }

    /// Add an ensemble to every enabled averager
    ///
    /// With the sample-count trigger this publishes once the window is
    /// full and then clears (block) or slides (running) every window.
    ///
    /// # Returns
    /// The published average, if this ensemble completed a window
    pub fn add_ensemble(&mut self, ensemble: Ensemble) -> Result<Option<Ensemble>> {
        let window_size = self.config.window_size;

        // Timer-driven windows never publish on arrival, so bound them here
        if self.config.trigger == TriggerMode::Timer && self.sample_count >= window_size {
            self.evict_oldest();
            self.sample_count = window_size - 1;
            self.first_ping_time = self.pings.oldest().and_then(|p| p.first_ping_time);
        }

        for (averager, _) in self.channels.iter_mut() {
            averager.add_sample(&ensemble);
        }
        if let Some((averager, _)) = self.reference_layer.as_mut() {
            averager.add_sample(&ensemble);
        }
        self.pings.push(PingSummary::of(&ensemble));

        if self.first_ping_time.is_none() {
            self.first_ping_time = ensemble.first_ping_time();
        }
        let first_ping_time = ensemble.first_ping_time();
        self.last_ensemble = Some(ensemble);
        self.sample_count += 1;

        if self.config.trigger != TriggerMode::SampleCount || self.sample_count < window_size {
            return Ok(None);
        }

        let published = self.publish();

        if self.config.running_average {
            self.sample_count = window_size;
            self.first_ping_time = first_ping_time;
            self.evict_oldest();
        } else {
            self.restart_window();
        }

        published
    }

    /// Publish on a timer tick
    ///
    /// Ignored with the sample-count trigger or before any ensemble arrived.
    /// A running window keeps sliding on arrival and `sample_count` is left
    /// alone. A block window restarts after the publish, which does reset
    /// `sample_count` to 0 so the next tick averages only new arrivals.
    pub fn on_timer_tick(&mut self) -> Result<Option<Ensemble>> {
        if self.config.trigger != TriggerMode::Timer {
            return Ok(None);
        }
        if self.last_ensemble.is_none() {
            log::debug!("timer tick before any ensemble, nothing to publish");
            return Ok(None);
        }

        let published = self.publish();
        if !self.config.running_average {
            self.restart_window();
        }
        published
    }

    fn publish(&mut self) -> Result<Option<Ensemble>> {
        let Some(template) = self.last_ensemble.as_ref() else {
            return Ok(None);
        };
        let mut averaged = template.clone();

        if let Some(info) = averaged.info.as_mut() {
            info.desired_ping_count = self.pings.iter().map(|p| p.desired).sum();
            info.actual_ping_count = self.pings.iter().map(|p| p.actual).sum();
            if let Some(first) = self.first_ping_time {
                info.first_ping_time = first;
            }
            info.averaged_count = self.pings.len() as u32;
            info.averaged_at = Some(Utc::now());
        }

        for (averager, scale) in self.channels.iter_mut() {
            if !averager.apply_average(&mut averaged, *scale)? {
                averager.kind().fill_bad(&mut averaged);
            }
        }
        if let Some((averager, scale)) = self.reference_layer.as_ref() {
            if !averager.apply_average(&mut averaged, *scale)? {
                ChannelKind::EarthVelocity.fill_bad(&mut averaged);
            }
        }

        log::debug!(
            "published average of {} ensembles (last ensemble {:?})",
            self.pings.len(),
            averaged.ensemble_number()
        );

        for (_, subscriber) in self.subscribers.iter_mut() {
            subscriber(&averaged);
        }

        Ok(Some(averaged))
    }

    fn evict_oldest(&mut self) {
        for (averager, _) in self.channels.iter_mut() {
            averager.evict_oldest();
        }
        if let Some((averager, _)) = self.reference_layer.as_mut() {
            averager.evict_oldest();
        }
        if self.pings.len() >= self.config.window_size {
            self.pings.pop_oldest();
        }
        log::trace!("evicted oldest sample, window {}", self.pings.len());
    }

    fn restart_window(&mut self) {
        for (averager, _) in self.channels.iter_mut() {
            averager.clear();
        }
        if let Some((averager, _)) = self.reference_layer.as_mut() {
            averager.clear();
        }
        self.pings.clear();
        self.sample_count = 0;
        self.first_ping_time = None;
    }

    /// Drop every queued sample and forget the last ensemble.
    /// Subscribers are kept.
    pub fn clear(&mut self) {
        self.restart_window();
        self.last_ensemble = None;
    }

    /// Register a callback for every future publish
    pub fn subscribe<F>(&mut self, subscriber: F) -> SubscriptionId
    where
        F: FnMut(&Ensemble) + Send + 'static,
    {
        let id = SubscriptionId(self.next_subscription);
        self.next_subscription += 1;
        self.subscribers.push((id, Box::new(subscriber)));
        id
    }

    /// Returns false if `id` was not subscribed
    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        let before = self.subscribers.len();
        self.subscribers.retain(|(sid, _)| *sid != id);
        self.subscribers.len() != before
    }

    /// Rebuild every averager from `config`. Queued samples are dropped.
    pub fn reconfigure(&mut self, config: &AverageConfig) {
        self.config = config.normalized();
        self.clear();
        self.build_averagers();
    }

    /// Change the window size of every averager
    ///
    /// Queued samples span the old window, so a changed size restarts the
    /// window for every channel at once.
    pub fn set_window_size(&mut self, window_size: usize) {
        let window_size = normalize_window_size(window_size);
        if window_size == self.config.window_size {
            return;
        }
        self.restart_window();
        self.config.window_size = window_size;
        for (averager, _) in self.channels.iter_mut() {
            averager.set_window_size(window_size);
        }
        if let Some((averager, _)) = self.reference_layer.as_mut() {
            averager.set_window_size(window_size);
        }
    }

    pub fn set_running_average(&mut self, running_average: bool) {
        self.config.running_average = running_average;
        for (averager, _) in self.channels.iter_mut() {
            averager.set_running_average(running_average);
        }
        if let Some((averager, _)) = self.reference_layer.as_mut() {
            averager.set_running_average(running_average);
        }
    }

    pub fn set_trigger(&mut self, trigger: TriggerMode) {
        self.config.trigger = trigger;
    }

    /// Move the reference layer, discarding its queued residuals
    pub fn set_reference_range(&mut self, min_bin: usize, max_bin: usize) {
        let max_bin = max_bin.max(min_bin);
        self.config.reference_layer.min_bin = min_bin;
        self.config.reference_layer.max_bin = max_bin;
        if let Some((averager, _)) = self.reference_layer.as_mut() {
            averager.set_reference_range(min_bin, max_bin);
        }
    }

    pub fn config(&self) -> &AverageConfig {
        &self.config
    }

    pub fn sample_count(&self) -> usize {
        self.sample_count
    }

    pub fn first_ping_time(&self) -> Option<f32> {
        self.first_ping_time
    }

    /// Number of ensembles in the current window
    pub fn window_len(&self) -> usize {
        self.pings.len()
    }

    pub fn last_ensemble(&self) -> Option<&Ensemble> {
        self.last_ensemble.as_ref()
    }

    pub fn channel(&self, kind: ChannelKind) -> Option<&ChannelAverager> {
        self.channels
            .iter()
            .map(|(averager, _)| averager)
            .find(|averager| averager.kind() == kind)
    }

    pub fn reference_layer(&self) -> Option<&ReferenceLayerAverager> {
        self.reference_layer.as_ref().map(|(averager, _)| averager)
    }
}
