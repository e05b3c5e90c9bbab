//! Dual-mode event bus — decoupled pub/sub for cross-module communication.
//!
//! Sync handlers run inline on the emitting thread in priority order; async
//! handlers are scheduled on the running tokio runtime (`emit`) or awaited
//! inline (`emit_async`). Thread-safe; one bus per process.

use std::cell::Cell;
use std::collections::{HashMap, HashSet, VecDeque};
use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex};

use futures::future::BoxFuture;
use futures::FutureExt;
use serde::Serialize;

use elara_core::constants::{DEFAULT_HISTORY_SIZE, MAX_EMIT_DEPTH};
use elara_core::types::{now_timestamp, Timestamp};

use crate::payload::Payload;

// ── Event types ──────────────────────────────────────────────────────────────

/// Every event token the substrate knows about.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum EventType {
    // Creation events (validated by the Layer 1 bridge)
    ModelCreated,
    PredictionMade,
    PrincipleCrystallized,
    WorkflowCreated,
    CorrectionAdded,
    DreamCompleted,
    EpisodeEnded,
    HandoffSaved,
    SynthesisCreated,
    OutcomeRecorded,
    // Session / cognition
    SessionStarted,
    SessionEnded,
    BrainThinkingCompleted,
    // Mood
    MoodChanged,
    MoodSet,
    ImprintCreated,
    ImprintDecayed,
    // Memory / goals
    MemorySaved,
    MemoryConsolidated,
    GoalAdded,
    GoalUpdated,
    LlmUnavailable,
    // Emitted by the substrate itself
    ArtifactValidated,
    ContinuityCheckpoint,
    NetworkStarted,
    NetworkStopped,
    RecordReceived,
    RecordWitnessed,
}

impl EventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::ModelCreated => "model_created",
            EventType::PredictionMade => "prediction_made",
            EventType::PrincipleCrystallized => "principle_crystallized",
            EventType::WorkflowCreated => "workflow_created",
            EventType::CorrectionAdded => "correction_added",
            EventType::DreamCompleted => "dream_completed",
            EventType::EpisodeEnded => "episode_ended",
            EventType::HandoffSaved => "handoff_saved",
            EventType::SynthesisCreated => "synthesis_created",
            EventType::OutcomeRecorded => "outcome_recorded",
            EventType::SessionStarted => "session_started",
            EventType::SessionEnded => "session_ended",
            EventType::BrainThinkingCompleted => "brain_thinking_completed",
            EventType::MoodChanged => "mood_changed",
            EventType::MoodSet => "mood_set",
            EventType::ImprintCreated => "imprint_created",
            EventType::ImprintDecayed => "imprint_decayed",
            EventType::MemorySaved => "memory_saved",
            EventType::MemoryConsolidated => "memory_consolidated",
            EventType::GoalAdded => "goal_added",
            EventType::GoalUpdated => "goal_updated",
            EventType::LlmUnavailable => "llm_unavailable",
            EventType::ArtifactValidated => "artifact_validated",
            EventType::ContinuityCheckpoint => "continuity_checkpoint",
            EventType::NetworkStarted => "network_started",
            EventType::NetworkStopped => "network_stopped",
            EventType::RecordReceived => "record_received",
            EventType::RecordWitnessed => "record_witnessed",
        }
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ── Event ────────────────────────────────────────────────────────────────────

/// A dispatched event: type, payload, optional source tag, wall-clock stamp.
#[derive(Clone, Debug)]
pub struct Event {
    pub event_type: EventType,
    pub data: Payload,
    pub source: Option<String>,
    pub timestamp: Timestamp,
}

impl Event {
    fn new(event_type: EventType, data: Payload, source: Option<&str>) -> Self {
        Self {
            event_type,
            data,
            source: source.map(str::to_string),
            timestamp: now_timestamp(),
        }
    }
}

// ── Subscriptions ────────────────────────────────────────────────────────────

/// Stable handle returned by `on`/`on_async`, used to unsubscribe. The bus
/// owns the handler; holding the id creates no reference cycle.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

type SyncHandler = Arc<dyn Fn(&Event) + Send + Sync>;
type AsyncHandler = Arc<dyn Fn(Event) -> BoxFuture<'static, ()> + Send + Sync>;

#[derive(Clone)]
enum Handler {
    Sync(SyncHandler),
    Async(AsyncHandler),
}

struct Subscription {
    id: SubscriptionId,
    handler: Handler,
    priority: i32,
    once: bool,
    source: Option<String>,
}

/// Read-only view of one subscription, for diagnostics.
#[derive(Clone, Debug, Serialize)]
pub struct SubscriberInfo {
    pub priority: i32,
    pub is_async: bool,
    pub source: Option<String>,
}

// ── Bus ──────────────────────────────────────────────────────────────────────

#[derive(Clone, Debug, Default, Serialize)]
pub struct BusStats {
    pub events_emitted: u64,
    pub emits_refused: u64,
    pub handler_panics: u64,
    pub total_subscribers: usize,
    pub muted_types: usize,
    pub history_len: usize,
}

struct Inner {
    subscribers: HashMap<EventType, Vec<Subscription>>,
    muted: HashSet<EventType>,
    history: VecDeque<Event>,
    history_size: usize,
    next_id: u64,
    events_emitted: u64,
    emits_refused: u64,
    handler_panics: u64,
}

impl Inner {
    fn push_history(&mut self, event: Event) {
        self.history.push_back(event);
        while self.history.len() > self.history_size {
            self.history.pop_front();
        }
    }

    /// Snapshot matching handlers in dispatch order (priority high → low,
    /// ties in registration order), removing once-subscribers as collected.
    fn collect_batch(&mut self, event_type: EventType) -> Vec<Handler> {
        let Some(subs) = self.subscribers.get_mut(&event_type) else {
            return Vec::new();
        };
        let mut order: Vec<(i32, usize)> = subs
            .iter()
            .enumerate()
            .map(|(idx, s)| (s.priority, idx))
            .collect();
        order.sort_by(|a, b| b.0.cmp(&a.0).then(a.1.cmp(&b.1)));
        let batch: Vec<Handler> = order
            .iter()
            .map(|(_, idx)| subs[*idx].handler.clone())
            .collect();
        subs.retain(|s| !s.once);
        batch
    }
}

thread_local! {
    static EMIT_DEPTH: Cell<usize> = const { Cell::new(0) };
}

/// The event bus. Cheap to share via `Arc`; all methods take `&self`.
pub struct EventBus {
    inner: Mutex<Inner>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY_SIZE)
    }
}

impl EventBus {
    pub fn new(history_size: usize) -> Self {
        Self {
            inner: Mutex::new(Inner {
                subscribers: HashMap::new(),
                muted: HashSet::new(),
                history: VecDeque::new(),
                history_size,
                next_id: 0,
                events_emitted: 0,
                emits_refused: 0,
                handler_panics: 0,
            }),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner.lock().expect("event bus lock poisoned")
    }

    fn register(
        &self,
        event_type: EventType,
        handler: Handler,
        priority: i32,
        once: bool,
        source: Option<&str>,
    ) -> SubscriptionId {
        let mut inner = self.lock();
        inner.next_id += 1;
        let id = SubscriptionId(inner.next_id);
        inner
            .subscribers
            .entry(event_type)
            .or_default()
            .push(Subscription {
                id,
                handler,
                priority,
                once,
                source: source.map(str::to_string),
            });
        id
    }

    /// Register a synchronous handler. Higher priority runs first.
    pub fn on<F>(
        &self,
        event_type: EventType,
        handler: F,
        priority: i32,
        source: Option<&str>,
    ) -> SubscriptionId
    where
        F: Fn(&Event) + Send + Sync + 'static,
    {
        self.register(event_type, Handler::Sync(Arc::new(handler)), priority, false, source)
    }

    /// Register an asynchronous handler. Scheduled by `emit`, awaited by
    /// `emit_async`.
    pub fn on_async<F>(
        &self,
        event_type: EventType,
        handler: F,
        priority: i32,
        source: Option<&str>,
    ) -> SubscriptionId
    where
        F: Fn(Event) -> BoxFuture<'static, ()> + Send + Sync + 'static,
    {
        self.register(event_type, Handler::Async(Arc::new(handler)), priority, false, source)
    }

    /// Register a synchronous handler for a single delivery.
    pub fn once<F>(&self, event_type: EventType, handler: F) -> SubscriptionId
    where
        F: Fn(&Event) + Send + Sync + 'static,
    {
        self.register(event_type, Handler::Sync(Arc::new(handler)), 0, true, None)
    }

    /// Remove a subscription by handle. Returns whether anything was removed.
    pub fn off(&self, event_type: EventType, id: SubscriptionId) -> bool {
        let mut inner = self.lock();
        if let Some(subs) = inner.subscribers.get_mut(&event_type) {
            let before = subs.len();
            subs.retain(|s| s.id != id);
            return subs.len() < before;
        }
        false
    }

    pub fn mute(&self, event_type: EventType) {
        self.lock().muted.insert(event_type);
    }

    pub fn unmute(&self, event_type: EventType) {
        self.lock().muted.remove(&event_type);
    }

    /// Synchronous emit. Sync handlers run inline; async handlers are spawned
    /// on the active tokio runtime, or dropped with a warning when none is
    /// running. Returns the constructed event.
    pub fn emit(&self, event_type: EventType, data: Payload, source: Option<&str>) -> Event {
        let event = Event::new(event_type, data, source);
        let Some(batch) = self.begin_dispatch(&event) else {
            return event;
        };

        let depth = EMIT_DEPTH.with(|d| d.get());
        EMIT_DEPTH.with(|d| d.set(depth + 1));
        for handler in batch {
            match handler {
                Handler::Sync(h) => self.run_sync(&h, &event),
                Handler::Async(h) => match tokio::runtime::Handle::try_current() {
                    Ok(runtime) => {
                        runtime.spawn(h(event.clone()));
                    }
                    Err(_) => {
                        tracing::warn!(
                            event = %event_type,
                            "async subscriber dropped: no runtime on emitting thread"
                        );
                    }
                },
            }
        }
        EMIT_DEPTH.with(|d| d.set(depth));
        event
    }

    /// Asynchronous emit: handlers run in strict priority order, async ones
    /// awaited inline.
    pub async fn emit_async(
        &self,
        event_type: EventType,
        data: Payload,
        source: Option<&str>,
    ) -> Event {
        let event = Event::new(event_type, data, source);
        let Some(batch) = self.begin_dispatch(&event) else {
            return event;
        };

        for handler in batch {
            match handler {
                Handler::Sync(h) => {
                    let depth = EMIT_DEPTH.with(|d| d.get());
                    EMIT_DEPTH.with(|d| d.set(depth + 1));
                    self.run_sync(&h, &event);
                    EMIT_DEPTH.with(|d| d.set(depth));
                }
                Handler::Async(h) => {
                    if AssertUnwindSafe(h(event.clone())).catch_unwind().await.is_err() {
                        self.lock().handler_panics += 1;
                        tracing::error!(event = %event_type, "async subscriber panicked");
                    }
                }
            }
        }
        event
    }

    /// Shared front half of both emit paths: recursion guard, history,
    /// mute check, batch snapshot. `None` means nothing to dispatch.
    fn begin_dispatch(&self, event: &Event) -> Option<Vec<Handler>> {
        if EMIT_DEPTH.with(|d| d.get()) >= MAX_EMIT_DEPTH {
            let mut inner = self.lock();
            inner.emits_refused += 1;
            drop(inner);
            tracing::warn!(event = %event.event_type, "emit refused: recursion depth limit");
            return None;
        }

        let mut inner = self.lock();
        inner.events_emitted += 1;
        inner.push_history(event.clone());
        if inner.muted.contains(&event.event_type) {
            return None;
        }
        let batch = inner.collect_batch(event.event_type);
        if batch.is_empty() {
            return None;
        }
        Some(batch)
    }

    fn run_sync(&self, handler: &SyncHandler, event: &Event) {
        if std::panic::catch_unwind(AssertUnwindSafe(|| handler(event))).is_err() {
            self.lock().handler_panics += 1;
            tracing::error!(event = %event.event_type, "subscriber panicked");
        }
    }

    /// Diagnostic view of the subscriptions for one event type, in dispatch
    /// order.
    pub fn subscribers_for(&self, event_type: EventType) -> Vec<SubscriberInfo> {
        let inner = self.lock();
        let Some(subs) = inner.subscribers.get(&event_type) else {
            return Vec::new();
        };
        let mut infos: Vec<SubscriberInfo> = subs
            .iter()
            .map(|s| SubscriberInfo {
                priority: s.priority,
                is_async: matches!(s.handler, Handler::Async(_)),
                source: s.source.clone(),
            })
            .collect();
        infos.sort_by(|a, b| b.priority.cmp(&a.priority));
        infos
    }

    pub fn stats(&self) -> BusStats {
        let inner = self.lock();
        BusStats {
            events_emitted: inner.events_emitted,
            emits_refused: inner.emits_refused,
            handler_panics: inner.handler_panics,
            total_subscribers: inner.subscribers.values().map(Vec::len).sum(),
            muted_types: inner.muted.len(),
            history_len: inner.history.len(),
        }
    }

    /// Last `n` events, oldest first.
    pub fn history(&self, n: usize) -> Vec<Event> {
        let inner = self.lock();
        inner
            .history
            .iter()
            .rev()
            .take(n)
            .cloned()
            .collect::<Vec<_>>()
            .into_iter()
            .rev()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex as StdMutex;

    fn bus() -> Arc<EventBus> {
        Arc::new(EventBus::new(50))
    }

    fn payload() -> Payload {
        Payload::from_value(serde_json::json!({"id": "x"}))
    }

    #[test]
    fn emit_calls_subscriber_and_returns_event() {
        let bus = bus();
        let seen = Arc::new(AtomicUsize::new(0));
        let seen2 = Arc::clone(&seen);
        bus.on(EventType::GoalAdded, move |_| {
            seen2.fetch_add(1, Ordering::SeqCst);
        }, 0, None);

        let event = bus.emit(EventType::GoalAdded, payload(), Some("test"));
        assert_eq!(seen.load(Ordering::SeqCst), 1);
        assert_eq!(event.event_type, EventType::GoalAdded);
        assert_eq!(event.source.as_deref(), Some("test"));
    }

    #[test]
    fn emit_with_no_subscribers_is_fine() {
        let bus = bus();
        let event = bus.emit(EventType::MemorySaved, payload(), None);
        assert_eq!(event.event_type, EventType::MemorySaved);
    }

    #[test]
    fn higher_priority_runs_first_and_ties_preserve_order() {
        let bus = bus();
        let order = Arc::new(StdMutex::new(Vec::new()));
        for (name, priority) in [("low", 0), ("high", 10), ("mid_a", 5), ("mid_b", 5)] {
            let order = Arc::clone(&order);
            bus.on(EventType::GoalAdded, move |_| {
                order.lock().unwrap().push(name);
            }, priority, None);
        }
        bus.emit(EventType::GoalAdded, payload(), None);
        assert_eq!(*order.lock().unwrap(), vec!["high", "mid_a", "mid_b", "low"]);
    }

    #[test]
    fn once_fires_exactly_once() {
        let bus = bus();
        let count = Arc::new(AtomicUsize::new(0));
        let count2 = Arc::clone(&count);
        bus.once(EventType::SessionEnded, move |_| {
            count2.fetch_add(1, Ordering::SeqCst);
        });
        bus.emit(EventType::SessionEnded, payload(), None);
        bus.emit(EventType::SessionEnded, payload(), None);
        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert!(bus.subscribers_for(EventType::SessionEnded).is_empty());
    }

    #[test]
    fn off_removes_by_handle() {
        let bus = bus();
        let id = bus.on(EventType::GoalAdded, |_| {}, 0, None);
        assert!(bus.off(EventType::GoalAdded, id));
        assert!(!bus.off(EventType::GoalAdded, id));
    }

    #[test]
    fn muted_events_skip_dispatch_but_stay_in_history() {
        let bus = bus();
        let count = Arc::new(AtomicUsize::new(0));
        let count2 = Arc::clone(&count);
        bus.on(EventType::GoalAdded, move |_| {
            count2.fetch_add(1, Ordering::SeqCst);
        }, 0, None);

        bus.mute(EventType::GoalAdded);
        bus.emit(EventType::GoalAdded, payload(), None);
        assert_eq!(count.load(Ordering::SeqCst), 0);
        assert_eq!(bus.history(10).len(), 1);

        bus.unmute(EventType::GoalAdded);
        bus.emit(EventType::GoalAdded, payload(), None);
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn history_is_bounded_keeping_newest() {
        let bus = Arc::new(EventBus::new(3));
        for _ in 0..10 {
            bus.emit(EventType::GoalAdded, payload(), None);
        }
        let history = bus.history(10);
        assert_eq!(history.len(), 3);
    }

    #[test]
    fn panicking_handler_does_not_stop_others() {
        let bus = bus();
        let seen = Arc::new(AtomicUsize::new(0));
        bus.on(EventType::GoalAdded, |_| panic!("boom"), 10, None);
        let seen2 = Arc::clone(&seen);
        bus.on(EventType::GoalAdded, move |_| {
            seen2.fetch_add(1, Ordering::SeqCst);
        }, 0, None);

        bus.emit(EventType::GoalAdded, payload(), None);
        assert_eq!(seen.load(Ordering::SeqCst), 1);
        assert_eq!(bus.stats().handler_panics, 1);
    }

    #[test]
    fn recursive_emit_terminates_within_depth_limit() {
        let bus = bus();
        let count = Arc::new(AtomicUsize::new(0));
        let count2 = Arc::clone(&count);
        let bus2 = Arc::clone(&bus);
        bus.on(EventType::GoalAdded, move |_| {
            count2.fetch_add(1, Ordering::SeqCst);
            bus2.emit(EventType::GoalAdded, Payload::from_value(serde_json::json!({"again": true})), None);
        }, 0, None);

        bus.emit(EventType::GoalAdded, payload(), None);
        assert!(count.load(Ordering::SeqCst) <= 3);
        assert!(bus.stats().emits_refused >= 1);
    }

    #[test]
    fn concurrent_emits_all_deliver() {
        let bus = bus();
        let count = Arc::new(AtomicUsize::new(0));
        let count2 = Arc::clone(&count);
        bus.on(EventType::GoalAdded, move |_| {
            count2.fetch_add(1, Ordering::SeqCst);
        }, 0, None);

        let threads: Vec<_> = (0..100)
            .map(|_| {
                let bus = Arc::clone(&bus);
                std::thread::spawn(move || {
                    bus.emit(EventType::GoalAdded, Payload::from_value(serde_json::json!({"n": 1})), None);
                })
            })
            .collect();
        for t in threads {
            t.join().unwrap();
        }
        assert_eq!(count.load(Ordering::SeqCst), 100);
    }

    #[tokio::test]
    async fn emit_async_awaits_async_handlers() {
        let bus = bus();
        let count = Arc::new(AtomicUsize::new(0));
        let count2 = Arc::clone(&count);
        bus.on_async(EventType::DreamCompleted, move |_event| {
            let count = Arc::clone(&count2);
            Box::pin(async move {
                count.fetch_add(1, Ordering::SeqCst);
            })
        }, 0, None);

        bus.emit_async(EventType::DreamCompleted, payload(), None).await;
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn sync_emit_schedules_async_handlers_on_runtime() {
        let bus = bus();
        let (tx, rx) = tokio::sync::oneshot::channel::<u32>();
        let tx = Arc::new(StdMutex::new(Some(tx)));
        bus.on_async(EventType::DreamCompleted, move |_event| {
            let tx = Arc::clone(&tx);
            Box::pin(async move {
                if let Some(tx) = tx.lock().unwrap().take() {
                    let _ = tx.send(7);
                }
            })
        }, 0, None);

        bus.emit(EventType::DreamCompleted, payload(), None);
        let got = tokio::time::timeout(std::time::Duration::from_secs(2), rx)
            .await
            .expect("async handler should run")
            .unwrap();
        assert_eq!(got, 7);
    }
}
