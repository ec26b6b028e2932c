//! ---
//! ems_section: "02-messaging-ipc-data-model"
//! ems_subsection: "module"
//! ems_type: "source"
//! ems_scope: "code"
//! ems_description: "Live metrics bus: subscriptions, switch state, and generation timers."
//! ems_version: "v0.0.0-prealpha"
//! ems_owner: "tbd"
//! ---
use std::any::Any;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use cems_common::{BusConfig, ClassroomId, IdError, OfflinePolicy};
use cems_sim::{MetricGenerator, Sample};
use chrono::Utc;
use indexmap::IndexMap;
use parking_lot::{Mutex, ReentrantMutex};
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::metrics::{BusMetrics, BusMetricsExporter, Counters};
use crate::schedule::{spawn_periodic, TimerToken};
use crate::sink::{FnSink, SampleSink};
use crate::Result;

/// Registration key for one sink on one classroom.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(u64);

impl SubscriptionId {
    pub fn get(self) -> u64 {
        self.0
    }
}

struct ActiveTimer {
    token: TimerToken,
    task: JoinHandle<()>,
}

#[derive(Default)]
struct BusState {
    subscribers: HashMap<ClassroomId, IndexMap<SubscriptionId, Arc<dyn SampleSink>>>,
    switch_states: HashMap<ClassroomId, bool>,
    timers: HashMap<ClassroomId, ActiveTimer>,
    // One delivery lane per classroom. Reentrant so sinks may call back into
    // the bus for their own classroom from inside `notify`.
    lanes: HashMap<ClassroomId, Arc<ReentrantMutex<()>>>,
}

impl BusState {
    fn sinks_for(&self, classroom: ClassroomId) -> Vec<Arc<dyn SampleSink>> {
        self.subscribers
            .get(&classroom)
            .map(|set| set.values().cloned().collect())
            .unwrap_or_default()
    }

    fn timer_matches(&self, classroom: ClassroomId, token: TimerToken) -> bool {
        self.timers
            .get(&classroom)
            .is_some_and(|timer| timer.token == token)
    }

    fn lane(&mut self, classroom: ClassroomId) -> Arc<ReentrantMutex<()>> {
        self.lanes
            .entry(classroom)
            .or_insert_with(|| Arc::new(ReentrantMutex::new(())))
            .clone()
    }
}

struct BusInner {
    generator: MetricGenerator,
    tick_interval: Duration,
    offline_policy: OfflinePolicy,
    external: HashSet<ClassroomId>,
    runtime: Handle,
    state: Mutex<BusState>,
    next_subscription: AtomicU64,
    next_token: AtomicU64,
    counters: Counters,
}

impl BusInner {
    /// Lane serializing deliveries and switch transitions for one classroom.
    /// The state lock is released before the caller takes the lane.
    fn lane(&self, classroom: ClassroomId) -> Arc<ReentrantMutex<()>> {
        self.state.lock().lane(classroom)
    }

    /// Publish one live sample if `token` is still the classroom's current
    /// timer. Returns `false` once the timer has been superseded.
    fn emit_tick(&self, classroom: ClassroomId, token: TimerToken) -> bool {
        let lane = self.lane(classroom);
        let _delivering = lane.lock();
        let sinks = {
            let state = self.state.lock();
            if !state.timer_matches(classroom, token) {
                return false;
            }
            state.sinks_for(classroom)
        };
        let sample = self.generator.live_sample(classroom);
        self.deliver(classroom, &sinks, &sample);
        true
    }

    fn emit_offline(&self, classroom: ClassroomId) {
        let lane = self.lane(classroom);
        let _delivering = lane.lock();
        let sinks = self.state.lock().sinks_for(classroom);
        let sample = Sample::offline(classroom, Utc::now());
        self.deliver(classroom, &sinks, &sample);
    }

    fn deliver(&self, classroom: ClassroomId, sinks: &[Arc<dyn SampleSink>], sample: &Sample) {
        self.counters.record_published();
        for sink in sinks {
            match panic::catch_unwind(AssertUnwindSafe(|| sink.notify(sample))) {
                Ok(Ok(())) => self.counters.record_delivered(),
                Ok(Err(err)) => {
                    warn!(classroom = %classroom, sink = sink.name(), error = %err, "sink rejected sample");
                    self.counters.record_failed();
                }
                Err(payload) => {
                    warn!(
                        classroom = %classroom,
                        sink = sink.name(),
                        panic = panic_message(payload.as_ref()),
                        "sink panicked during delivery"
                    );
                    self.counters.record_failed();
                }
            }
        }
    }

    fn stop(&self, classroom: ClassroomId) {
        let lane = self.lane(classroom);
        let _delivering = lane.lock();
        let timer = {
            let mut state = self.state.lock();
            state.switch_states.insert(classroom, false);
            state.timers.remove(&classroom)
        };

        let was_running = timer.is_some();
        if let Some(timer) = timer {
            timer.task.abort();
            self.counters.record_timer_stopped();
            info!(classroom = %classroom, "classroom switched off");
        }

        let emit = match self.offline_policy {
            OfflinePolicy::OnTransition => was_running,
            OfflinePolicy::Always => true,
        };
        if emit {
            self.emit_offline(classroom);
        } else {
            debug!(classroom = %classroom, "classroom already off");
        }
    }
}

impl Drop for BusInner {
    fn drop(&mut self) {
        for (_, timer) in self.state.get_mut().timers.drain() {
            timer.task.abort();
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(message) = payload.downcast_ref::<&'static str>() {
        message
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.as_str()
    } else {
        "non-string panic payload"
    }
}

/// Configures and builds a [`LiveMetricsBus`].
pub struct LiveMetricsBusBuilder {
    config: BusConfig,
    generator: MetricGenerator,
    runtime: Option<Handle>,
    exporter: Option<BusMetricsExporter>,
}

impl LiveMetricsBusBuilder {
    pub fn generator(mut self, generator: MetricGenerator) -> Self {
        self.generator = generator;
        self
    }

    /// Runtime used to spawn generation timers. Defaults to the current one.
    pub fn runtime(mut self, runtime: Handle) -> Self {
        self.runtime = Some(runtime);
        self
    }

    pub fn metrics(mut self, exporter: BusMetricsExporter) -> Self {
        self.exporter = Some(exporter);
        self
    }

    pub fn build(self) -> Result<LiveMetricsBus> {
        let runtime = match self.runtime {
            Some(runtime) => runtime,
            None => Handle::try_current()?,
        };
        let external = self
            .config
            .external_classrooms
            .iter()
            .map(|raw| ClassroomId::try_from(*raw))
            .collect::<std::result::Result<HashSet<_>, IdError>>()?;
        // A zero period would make the interval panic.
        let tick_interval = if self.config.tick_interval.is_zero() {
            warn!("zero tick interval requested; using one second");
            Duration::from_secs(1)
        } else {
            self.config.tick_interval
        };

        Ok(LiveMetricsBus {
            inner: Arc::new(BusInner {
                generator: self.generator,
                tick_interval,
                offline_policy: self.config.offline_policy,
                external,
                runtime,
                state: Mutex::new(BusState::default()),
                next_subscription: AtomicU64::new(1),
                next_token: AtomicU64::new(1),
                counters: Counters::new(self.exporter),
            }),
        })
    }
}

/// Per-classroom publish/subscribe hub for live samples.
///
/// Cloning yields another handle to the same bus. Timers stop when the last
/// handle is dropped.
#[derive(Clone)]
pub struct LiveMetricsBus {
    inner: Arc<BusInner>,
}

impl fmt::Debug for LiveMetricsBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LiveMetricsBus")
            .field("tick_interval", &self.inner.tick_interval)
            .field("offline_policy", &self.inner.offline_policy)
            .field("active", &self.active_classrooms())
            .finish()
    }
}

impl LiveMetricsBus {
    pub fn builder(config: BusConfig) -> LiveMetricsBusBuilder {
        LiveMetricsBusBuilder {
            config,
            generator: MetricGenerator::default(),
            runtime: None,
            exporter: None,
        }
    }

    /// Build with the default generator on the current tokio runtime.
    pub fn new(config: &BusConfig) -> Result<Self> {
        Self::builder(config.clone()).build()
    }

    pub fn generator(&self) -> &MetricGenerator {
        &self.inner.generator
    }

    /// Register `sink` for `classroom`. Delivery order follows registration order.
    pub fn subscribe(&self, classroom: ClassroomId, sink: Arc<dyn SampleSink>) -> Subscription {
        let id = SubscriptionId(self.inner.next_subscription.fetch_add(1, Ordering::Relaxed));
        let total = {
            let mut state = self.inner.state.lock();
            let set = state.subscribers.entry(classroom).or_default();
            set.insert(id, sink);
            set.len()
        };
        debug!(classroom = %classroom, subscription = id.0, subscribers = total, "subscribed");
        Subscription {
            bus: Arc::downgrade(&self.inner),
            classroom,
            id,
        }
    }

    pub fn subscribe_fn<F>(&self, classroom: ClassroomId, callback: F) -> Subscription
    where
        F: Fn(&Sample) + Send + Sync + 'static,
    {
        self.subscribe(classroom, Arc::new(FnSink::new(callback)))
    }

    /// Switch a classroom on or off.
    ///
    /// On: the first sample goes out before this returns, then one per tick.
    /// Repeating "on" changes nothing. Off: the timer is cancelled and an
    /// offline sample follows any in-flight tick. Only calls for the same
    /// classroom wait on each other. Externally fed classrooms only have
    /// their state recorded.
    pub fn set_switch_state(&self, classroom: ClassroomId, on: bool) {
        if self.inner.external.contains(&classroom) {
            self.inner.state.lock().switch_states.insert(classroom, on);
            debug!(classroom = %classroom, on, "recorded switch state for externally fed classroom");
            return;
        }
        if on {
            self.start(classroom);
        } else {
            self.inner.stop(classroom);
        }
    }

    /// Last requested state; `false` for classrooms never touched.
    pub fn switch_state(&self, classroom: ClassroomId) -> bool {
        self.inner
            .state
            .lock()
            .switch_states
            .get(&classroom)
            .copied()
            .unwrap_or(false)
    }

    /// Whether the bus itself is generating samples for `classroom`.
    pub fn is_generating(&self, classroom: ClassroomId) -> bool {
        self.inner.state.lock().timers.contains_key(&classroom)
    }

    pub fn is_external(&self, classroom: ClassroomId) -> bool {
        self.inner.external.contains(&classroom)
    }

    pub fn subscriber_count(&self, classroom: ClassroomId) -> usize {
        self.inner
            .state
            .lock()
            .subscribers
            .get(&classroom)
            .map_or(0, IndexMap::len)
    }

    /// Classrooms with a running timer, ascending.
    pub fn active_classrooms(&self) -> Vec<ClassroomId> {
        let mut ids: Vec<ClassroomId> = self.inner.state.lock().timers.keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    /// Push a sample produced elsewhere to the classroom's subscribers.
    pub fn publish_external(&self, sample: &Sample) {
        let lane = self.inner.lane(sample.classroom_id);
        let _delivering = lane.lock();
        let sinks = self.inner.state.lock().sinks_for(sample.classroom_id);
        self.inner.deliver(sample.classroom_id, &sinks, sample);
    }

    /// Switch every running classroom off. Returns how many were stopped.
    pub fn shutdown(&self) -> usize {
        let running = self.active_classrooms();
        for classroom in &running {
            self.inner.stop(*classroom);
        }
        info!(stopped = running.len(), "live metrics bus shut down");
        running.len()
    }

    pub fn metrics(&self) -> BusMetrics {
        self.inner.counters.snapshot()
    }

    fn start(&self, classroom: ClassroomId) {
        let inner = &self.inner;
        let lane = inner.lane(classroom);
        let _delivering = lane.lock();
        let token = {
            let mut state = inner.state.lock();
            state.switch_states.insert(classroom, true);
            if state.timers.contains_key(&classroom) {
                debug!(classroom = %classroom, "classroom already on");
                return;
            }
            let token = TimerToken::next(&inner.next_token);
            let weak = Arc::downgrade(inner);
            let task = spawn_periodic(&inner.runtime, inner.tick_interval, move || {
                match weak.upgrade() {
                    Some(inner) => inner.emit_tick(classroom, token),
                    None => false,
                }
            });
            state.timers.insert(classroom, ActiveTimer { token, task });
            token
        };
        inner.counters.record_timer_started();
        info!(classroom = %classroom, interval = ?inner.tick_interval, "classroom switched on");
        inner.emit_tick(classroom, token);
    }
}

/// Handle for one registration. Dropping it leaves the sink registered.
#[must_use = "keep the handle to unsubscribe later"]
#[derive(Debug)]
pub struct Subscription {
    bus: Weak<BusInner>,
    classroom: ClassroomId,
    id: SubscriptionId,
}

impl Subscription {
    pub fn classroom(&self) -> ClassroomId {
        self.classroom
    }

    pub fn id(&self) -> SubscriptionId {
        self.id
    }

    /// Remove the sink. Safe to call repeatedly or after the bus is gone.
    pub fn unsubscribe(&self) {
        let Some(inner) = self.bus.upgrade() else {
            return;
        };
        let mut state = inner.state.lock();
        if let Some(set) = state.subscribers.get_mut(&self.classroom) {
            if set.shift_remove(&self.id).is_some() {
                debug!(classroom = %self.classroom, subscription = self.id.0, "unsubscribed");
            }
            if set.is_empty() {
                state.subscribers.remove(&self.classroom);
            }
        }
    }

    pub fn is_active(&self) -> bool {
        let Some(inner) = self.bus.upgrade() else {
            return false;
        };
        let state = inner.state.lock();
        state
            .subscribers
            .get(&self.classroom)
            .is_some_and(|set| set.contains_key(&self.id))
    }
}
