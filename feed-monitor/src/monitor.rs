use crate::query::split_query;
use crate::registry::TargetRegistry;
use crate::repair::{TipRepairer, TipStatus};
use crate::tip::TipWindow;
use crate::traits::FetchOperator;
use crate::types::{FeedItem, MonitorConfig, MonitorError, NEW_SORT};
use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, watch};
use tokio::time::MissedTickBehavior;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, error, info, warn};

/// Steps of a single poll cycle.
///
/// ```text
/// Idle -> Fetching -> Absorbing -> [Repairing] -> Publishing -> Idle
///            |                          |
///            +-- error -> Idle          +-- tip broken -> Fetching (once)
///                                       +-- error -> Publishing
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollState {
    Idle,
    Fetching,
    Absorbing,
    Repairing,
    Publishing,
}

/// What happened during one cycle.
#[derive(Debug, Clone)]
pub struct CycleReport {
    pub started_at: DateTime<Utc>,
    /// States entered, in order, ending with `Idle`.
    pub states: Vec<PollState>,
    pub fetched: usize,
    pub new_items: usize,
    pub updated_items: usize,
    pub tip_status: Option<TipStatus>,
    pub failed: bool,
    pending: Vec<FeedItem>,
    repaired: bool,
    refetched: bool,
}

impl CycleReport {
    fn new() -> Self {
        Self {
            started_at: Utc::now(),
            states: Vec::new(),
            fetched: 0,
            new_items: 0,
            updated_items: 0,
            tip_status: None,
            failed: false,
            pending: Vec::new(),
            repaired: false,
            refetched: false,
        }
    }
}

/// Control surface for a running monitor. Cheap to clone and safe to use
/// from any task; changes take effect on the next cycle.
#[derive(Clone)]
pub struct MonitorHandle {
    subreddits: Arc<TargetRegistry>,
    threads: Arc<TargetRegistry>,
    stop: Arc<watch::Sender<bool>>,
}

impl MonitorHandle {
    /// Start monitoring the given subreddits for new posts.
    pub async fn monitor_subreddits<I, S>(&self, subreddits: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.subreddits.add(subreddits).await;
    }

    pub async fn unmonitor_subreddits<I, S>(&self, subreddits: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.subreddits.remove(subreddits).await;
    }

    /// Start watching the given thread fullnames for updates.
    pub async fn monitor_threads<I, S>(&self, threads: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.threads.add(threads).await;
    }

    pub async fn unmonitor_threads<I, S>(&self, threads: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.threads.remove(threads).await;
    }

    pub async fn subreddit_query(&self) -> String {
        self.subreddits.query().await
    }

    pub async fn thread_query(&self) -> String {
        self.threads.query().await
    }

    /// Ask the loop to exit. Observed between cycles.
    pub fn stop(&self) {
        self.stop.send_replace(true);
    }

    pub fn is_stopped(&self) -> bool {
        *self.stop.borrow()
    }
}

/// Receiving ends of the monitor's outputs.
///
/// Channels are bounded; when a consumer falls behind, records are dropped
/// rather than stalling the poll loop.
pub struct MonitorStreams {
    pub new_posts: mpsc::Receiver<FeedItem>,
    pub post_updates: mpsc::Receiver<FeedItem>,
    pub errors: mpsc::Receiver<MonitorError>,
}

impl MonitorStreams {
    pub fn into_streams(
        self,
    ) -> (
        ReceiverStream<FeedItem>,
        ReceiverStream<FeedItem>,
        ReceiverStream<MonitorError>,
    ) {
        (
            ReceiverStream::new(self.new_posts),
            ReceiverStream::new(self.post_updates),
            ReceiverStream::new(self.errors),
        )
    }
}

/// The poll loop. Owns the tip and is the only place fetches happen.
pub struct Monitor {
    operator: Arc<dyn FetchOperator>,
    config: MonitorConfig,
    tip: TipWindow,
    handle: MonitorHandle,
    stop: watch::Receiver<bool>,
    new_posts: mpsc::Sender<FeedItem>,
    post_updates: mpsc::Sender<FeedItem>,
    errors: mpsc::Sender<MonitorError>,
    thread_snapshots: HashMap<String, FeedItem>,
    cycles: u64,
    empty_streak: u32,
}

impl Monitor {
    pub fn new(
        operator: Arc<dyn FetchOperator>,
        config: MonitorConfig,
    ) -> (Self, MonitorHandle, MonitorStreams) {
        let capacity = config.channel_capacity.max(1);
        let (new_posts, new_posts_rx) = mpsc::channel(capacity);
        let (post_updates, post_updates_rx) = mpsc::channel(capacity);
        let (errors, errors_rx) = mpsc::channel(capacity);
        let (stop_tx, stop) = watch::channel(false);

        let handle = MonitorHandle {
            subreddits: Arc::new(TargetRegistry::subreddits()),
            threads: Arc::new(TargetRegistry::threads()),
            stop: Arc::new(stop_tx),
        };

        let monitor = Self {
            operator,
            tip: TipWindow::new(config.tip_capacity),
            config,
            handle: handle.clone(),
            stop,
            new_posts,
            post_updates,
            errors,
            thread_snapshots: HashMap::new(),
            cycles: 0,
            empty_streak: 0,
        };

        let streams = MonitorStreams {
            new_posts: new_posts_rx,
            post_updates: post_updates_rx,
            errors: errors_rx,
        };

        (monitor, handle, streams)
    }

    pub fn tip(&self) -> &TipWindow {
        &self.tip
    }

    /// Poll on every tick until [`MonitorHandle::stop`] is called.
    pub async fn run(mut self) {
        info!(
            "Starting monitor with {} (interval {:?})",
            self.operator.operator_name(),
            self.config.poll_interval
        );

        // interval() panics on a zero period.
        let period = self.config.poll_interval.max(Duration::from_millis(1));
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {}
                _ = self.stop.changed() => {}
            }
            if *self.stop.borrow() {
                break;
            }

            let report = self.poll_once().await;
            debug!(
                "Cycle {}: fetched {}, new {}, updated {}, states {:?}",
                self.cycles, report.fetched, report.new_items, report.updated_items, report.states
            );
        }

        info!("Monitor stopped after {} cycles", self.cycles);
    }

    /// Run one full cycle and report what happened.
    pub async fn poll_once(&mut self) -> CycleReport {
        self.cycles += 1;
        let mut cycle = CycleReport::new();
        let mut state = PollState::Fetching;

        while state != PollState::Idle {
            cycle.states.push(state);
            state = match state {
                PollState::Fetching => self.fetch(&mut cycle).await,
                PollState::Absorbing => self.absorb(&mut cycle),
                PollState::Repairing => self.repair(&mut cycle).await,
                PollState::Publishing => self.publish_updates(&mut cycle).await,
                PollState::Idle => PollState::Idle,
            };
        }
        cycle.states.push(PollState::Idle);

        cycle
    }

    async fn fetch(&mut self, cycle: &mut CycleReport) -> PollState {
        let query = self.handle.subreddits.query().await;
        if query.is_empty() {
            debug!("No subreddits monitored, skipping fetch");
            return PollState::Publishing;
        }

        let before = self.tip.front().to_owned();
        match self
            .operator
            .scrape(&query, NEW_SORT, "", &before, self.config.max_posts)
            .await
        {
            Ok(items) => {
                cycle.fetched += items.len();
                cycle.pending = items;
                PollState::Absorbing
            }
            Err(e) => {
                self.sink_error(e, cycle);
                PollState::Idle
            }
        }
    }

    fn absorb(&mut self, cycle: &mut CycleReport) -> PollState {
        let items = std::mem::take(&mut cycle.pending);
        let fresh: Vec<FeedItem> = items
            .into_iter()
            .filter(|item| !item.name.is_empty() && !self.tip.contains(&item.name))
            .collect();

        if fresh.is_empty() {
            self.empty_streak += 1;
        } else {
            self.empty_streak = 0;
        }

        self.tip.absorb_new_items(&fresh);
        cycle.new_items += fresh.len();

        // Oldest first so consumers see posts in the order they were made.
        for item in fresh.into_iter().rev() {
            publish(&self.new_posts, item, "new posts");
        }

        if self.repair_due(cycle) {
            PollState::Repairing
        } else {
            PollState::Publishing
        }
    }

    fn repair_due(&self, cycle: &CycleReport) -> bool {
        if cycle.repaired {
            return false;
        }
        let scheduled = self.config.repair_every_cycles > 0
            && self.cycles % self.config.repair_every_cycles == 0;
        let suspicious = self.config.suspicion_threshold > 0
            && self.empty_streak >= self.config.suspicion_threshold;
        scheduled || suspicious
    }

    async fn repair(&mut self, cycle: &mut CycleReport) -> PollState {
        cycle.repaired = true;

        match TipRepairer::fix_tip(&mut self.tip, self.operator.as_ref()).await {
            Ok(status) => {
                let broken = status.was_broken();
                cycle.tip_status = Some(status);
                if !broken {
                    self.empty_streak = 0;
                    PollState::Publishing
                } else if !cycle.refetched {
                    cycle.refetched = true;
                    PollState::Fetching
                } else {
                    PollState::Publishing
                }
            }
            // The thread watch does not depend on the tip.
            Err(e) => {
                self.sink_error(e, cycle);
                PollState::Publishing
            }
        }
    }

    async fn publish_updates(&mut self, cycle: &mut CycleReport) -> PollState {
        let query = self.handle.threads.query().await;
        let ids: Vec<String> = split_query(&query, self.handle.threads.delimiter())
            .map(str::to_owned)
            .collect();

        let watched: HashSet<&str> = ids.iter().map(String::as_str).collect();
        self.thread_snapshots
            .retain(|name, _| watched.contains(name.as_str()));

        if ids.is_empty() {
            return PollState::Idle;
        }

        match self.operator.resolve_by_ids(&ids).await {
            Ok(posts) => {
                for post in posts {
                    if self.thread_snapshots.get(&post.name) == Some(&post) {
                        continue;
                    }
                    self.thread_snapshots.insert(post.name.clone(), post.clone());
                    cycle.updated_items += 1;
                    publish(&self.post_updates, post, "post updates");
                }
            }
            Err(e) => self.sink_error(e, cycle),
        }

        PollState::Idle
    }

    fn sink_error(&self, e: MonitorError, report: &mut CycleReport) {
        error!("Poll cycle {} failed: {}", self.cycles, e);
        report.failed = true;
        publish(&self.errors, e, "errors");
    }
}

fn publish<T>(sender: &mpsc::Sender<T>, value: T, stream: &str) {
    match sender.try_send(value) {
        Ok(()) => {}
        Err(TrySendError::Full(_)) => {
            warn!("Consumer of {} is falling behind, dropping record", stream);
        }
        Err(TrySendError::Closed(_)) => {
            debug!("No consumer left for {}", stream);
        }
    }
}
