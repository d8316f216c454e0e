//! Single-threaded event loop for the cluster
//!
//! [`ClusterRuntime`] owns both channel subscribers, the reconciler (and
//! through it the vehicle state) and the optional synthetic feed. One loop
//! waits on channel readiness, the sign hide deadline and the synthetic tick;
//! each wakeup is handled to completion before the next wait, so state
//! updates never interleave.

use std::future::Future;
use std::time::Duration;

use cluster_core::{StateReconciler, StateWatch, SyntheticFeed, VehicleState};
use tokio::time::{Instant, Interval, MissedTickBehavior};
use tracing::{debug, info, trace};

use crate::config::{ChannelKind, ClusterConfig};
use crate::subscriber::ChannelSubscriber;

/// Synthetic feed and its tick schedule
struct SyntheticDriver {
    feed: SyntheticFeed,
    ticker: Interval,
}

/// Event loop tying the channels to the vehicle state
pub struct ClusterRuntime {
    // Field order is drop order: subscribers stop before the state goes away
    critical: ChannelSubscriber,
    non_critical: ChannelSubscriber,
    synthetic: Option<SyntheticDriver>,
    synthetic_period: Duration,
    synthetic_seed: Option<u64>,
    discarded: u64,
    reconciler: StateReconciler,
}

impl ClusterRuntime {
    /// Build a runtime that subscribes to the configured ZeroMQ endpoints.
    ///
    /// Must be called from within a tokio runtime.
    pub fn from_config(config: &ClusterConfig) -> Self {
        let critical = ChannelSubscriber::connect(ChannelKind::Critical, &config.critical);
        let non_critical =
            ChannelSubscriber::connect(ChannelKind::NonCritical, &config.non_critical);
        let reconciler =
            StateReconciler::new(VehicleState::new()).with_hide_after(config.sign_hide_after());

        let mut runtime = Self::new(critical, non_critical, reconciler)
            .with_synthetic_period(config.synthetic_period());
        runtime.synthetic_seed = config.synthetic.seed;
        runtime.set_synthetic(config.synthetic.enabled);
        runtime
    }

    pub fn new(
        critical: ChannelSubscriber,
        non_critical: ChannelSubscriber,
        reconciler: StateReconciler,
    ) -> Self {
        Self {
            critical,
            non_critical,
            synthetic: None,
            synthetic_period: cluster_core::synthetic::DEFAULT_PERIOD,
            synthetic_seed: None,
            discarded: 0,
            reconciler,
        }
    }

    pub fn with_synthetic_period(mut self, period: Duration) -> Self {
        self.synthetic_period = period;
        self
    }

    /// Seed the synthetic feed for reproducible output
    pub fn with_synthetic_seed(mut self, seed: u64) -> Self {
        self.synthetic_seed = Some(seed);
        self
    }

    pub fn state(&self) -> &VehicleState {
        self.reconciler.state()
    }

    /// Reader for the presentation layer
    pub fn watch(&self) -> StateWatch {
        self.reconciler.state().watch()
    }

    pub fn subscriber(&self, kind: ChannelKind) -> &ChannelSubscriber {
        match kind {
            ChannelKind::Critical => &self.critical,
            ChannelKind::NonCritical => &self.non_critical,
        }
    }

    /// Live frames discarded while the synthetic feed was active
    pub fn discarded(&self) -> u64 {
        self.discarded
    }

    pub fn is_synthetic(&self) -> bool {
        self.synthetic.is_some()
    }

    /// Switch between live channel data and the synthetic feed.
    ///
    /// While synthetic, channel frames are still drained but thrown away.
    pub fn set_synthetic(&mut self, enabled: bool) {
        if enabled == self.is_synthetic() {
            return;
        }

        if enabled {
            let feed = match self.synthetic_seed {
                Some(seed) => SyntheticFeed::with_seed(seed),
                None => SyntheticFeed::new(),
            };
            let period = self.synthetic_period;
            let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            self.synthetic = Some(SyntheticDriver { feed, ticker });
            info!(period_ms = period.as_millis() as u64, "Synthetic feed enabled");
        } else {
            self.synthetic = None;
            info!("Synthetic feed disabled, using live channels");
        }
    }

    /// Run until `shutdown` resolves
    pub async fn run_until<F>(&mut self, shutdown: F)
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);
        info!(synthetic = self.is_synthetic(), "Cluster runtime started");

        loop {
            let deadline = self.reconciler.sign_deadline();

            tokio::select! {
                biased;
                _ = &mut shutdown => break,
                _ = self.critical.readable() => self.handle_frames(ChannelKind::Critical),
                _ = self.non_critical.readable() => self.handle_frames(ChannelKind::NonCritical),
                _ = hide_timer(deadline) => {
                    self.reconciler.expire_sign(Instant::now());
                }
                _ = synthetic_tick(&mut self.synthetic) => self.apply_synthetic(),
            }
        }

        info!(
            critical_received = self.critical.received(),
            critical_dropped = self.critical.dropped(),
            non_critical_received = self.non_critical.received(),
            non_critical_dropped = self.non_critical.dropped(),
            discarded = self.discarded,
            "Cluster runtime stopped"
        );
    }

    /// Drain a channel and apply each frame in arrival order
    fn handle_frames(&mut self, kind: ChannelKind) {
        let frames = self.subscriber(kind).drain();

        if self.is_synthetic() {
            self.discarded += frames.len() as u64;
            debug!(channel = %kind, count = frames.len(), "Discarding live frames in synthetic mode");
            return;
        }

        for frame in frames {
            let fields = frame.decode();
            trace!(
                channel = %kind,
                latency_us = frame.received_at.elapsed().as_micros() as u64,
                fields = fields.len(),
                "Applying frame"
            );
            self.reconciler.apply(&fields, Instant::now());
        }
    }

    fn apply_synthetic(&mut self) {
        let Some(driver) = self.synthetic.as_mut() else {
            return;
        };
        let fields = driver.feed.next_fields();
        trace!(fields = %fields, "Synthetic tick");
        self.reconciler.apply(&fields, Instant::now());
    }
}

async fn hide_timer(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

async fn synthetic_tick(driver: &mut Option<SyntheticDriver>) {
    match driver {
        Some(driver) => {
            driver.ticker.tick().await;
        }
        None => std::future::pending().await,
    }
}
