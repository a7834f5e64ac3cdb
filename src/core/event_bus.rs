use crate::config::toml_config::EventBusMode;
use crate::domain::events::{CommerceEvent, EventLogEntry};
use crate::domain::ports::EventListener;
use crate::utils::error::{CommerceError, Result};
use chrono::Utc;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use tokio::task::JoinHandle;

type ListenerMap = HashMap<String, Vec<Arc<dyn EventListener>>>;

pub const DEFAULT_EVENT_LOG_CAPACITY: usize = 10_000;

/// 商務端與產品管理端之間的事件匯流排
///
/// 同步模式下 `emit` 會依註冊順序呼叫每個 listener，並在全部執行完後回報失敗；
/// 非同步模式下每個 listener 各自在 tokio task 中執行，`wait_idle` 等待它們結束。
/// Listener 回傳的後續事件會以同樣的模式繼續分派。
#[derive(Clone)]
pub struct EventBus {
    inner: Arc<Inner>,
}

struct Inner {
    mode: EventBusMode,
    logging_enabled: bool,
    listeners: RwLock<ListenerMap>,
    event_log: Mutex<VecDeque<EventLogEntry>>,
    log_capacity: AtomicUsize,
    next_sequence: AtomicU64,
    pending: Mutex<Vec<JoinHandle<()>>>,
}

impl EventBus {
    pub fn new(mode: EventBusMode, logging_enabled: bool) -> Self {
        Self {
            inner: Arc::new(Inner {
                mode,
                logging_enabled,
                listeners: RwLock::new(HashMap::new()),
                event_log: Mutex::new(VecDeque::new()),
                log_capacity: AtomicUsize::new(DEFAULT_EVENT_LOG_CAPACITY),
                next_sequence: AtomicU64::new(0),
                pending: Mutex::new(Vec::new()),
            }),
        }
    }

    /// 日誌超過上限時會捨棄最舊的紀錄（最少保留一筆）
    pub fn with_log_capacity(self, capacity: usize) -> Self {
        self.inner
            .log_capacity
            .store(capacity.max(1), Ordering::Relaxed);
        self
    }

    pub fn mode(&self) -> EventBusMode {
        self.inner.mode
    }

    pub fn register_listener(&self, event_name: &str, listener: Arc<dyn EventListener>) {
        tracing::debug!("🔗 Registering listener '{}' for {}", listener.name(), event_name);
        self.inner
            .listeners
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(event_name.to_string())
            .or_default()
            .push(listener);
    }

    pub fn clear_listeners(&self) {
        self.inner
            .listeners
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    pub fn listener_count(&self, event_name: &str) -> usize {
        self.inner
            .listeners
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(event_name)
            .map(Vec::len)
            .unwrap_or(0)
    }

    pub async fn emit(&self, event: CommerceEvent) -> Result<()> {
        match self.inner.mode {
            EventBusMode::Sync => self.dispatch_sync(event).await,
            EventBusMode::Async => {
                self.dispatch_async(event);
                Ok(())
            }
        }
    }

    /// 等待所有非同步 listener（包含它們衍生的事件）執行完畢
    pub async fn wait_idle(&self) {
        loop {
            let handles = std::mem::take(
                &mut *self
                    .inner
                    .pending
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner),
            );
            if handles.is_empty() {
                break;
            }
            for handle in handles {
                if let Err(e) = handle.await {
                    tracing::error!("❌ Event listener task aborted: {}", e);
                }
            }
        }
    }

    pub fn event_log(&self) -> Vec<EventLogEntry> {
        self.inner
            .event_log
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .cloned()
            .collect()
    }

    /// 取出並清空目前的事件日誌
    pub fn drain_event_log(&self) -> Vec<EventLogEntry> {
        self.inner
            .event_log
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .drain(..)
            .collect()
    }

    /// 已發布過的事件名稱（依時間順序）
    pub fn emitted_event_names(&self) -> Vec<String> {
        self.event_log()
            .into_iter()
            .map(|entry| entry.event_name)
            .collect()
    }

    async fn dispatch_sync(&self, event: CommerceEvent) -> Result<()> {
        let root_name = event.name().to_string();
        let mut failures = Vec::new();
        let mut queue = VecDeque::from([event]);

        while let Some(event) = queue.pop_front() {
            let sequence = self.record(&event);
            let listeners = self.listeners_for(event.name());
            let mut event_failed = false;

            for listener in listeners {
                match listener.handle(&event).await {
                    Ok(follow_ups) => queue.extend(follow_ups),
                    Err(e) => {
                        tracing::error!(
                            "❌ Listener '{}' failed on {}: {}",
                            listener.name(),
                            event.name(),
                            e
                        );
                        failures.push(format!("{} ({}): {}", listener.name(), event.name(), e));
                        event_failed = true;
                    }
                }
            }

            if !event_failed {
                self.mark_processed(sequence);
            }
        }

        if failures.is_empty() {
            Ok(())
        } else {
            Err(CommerceError::EventDispatchError {
                event: root_name,
                failures,
            })
        }
    }

    fn dispatch_async(&self, event: CommerceEvent) {
        let sequence = self.record(&event);
        let listeners = self.listeners_for(event.name());

        if listeners.is_empty() {
            self.mark_processed(sequence);
            return;
        }

        let event = Arc::new(event);
        let mut handles = Vec::with_capacity(listeners.len());
        for listener in listeners {
            let bus = self.clone();
            let event = Arc::clone(&event);
            handles.push(tokio::spawn(async move {
                match listener.handle(&event).await {
                    Ok(follow_ups) => {
                        bus.mark_processed(sequence);
                        for follow_up in follow_ups {
                            bus.dispatch_async(follow_up);
                        }
                    }
                    Err(e) => tracing::error!(
                        "❌ Listener '{}' failed on {}: {}",
                        listener.name(),
                        event.name(),
                        e
                    ),
                }
            }));
        }

        self.inner
            .pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .extend(handles);
    }

    fn listeners_for(&self, event_name: &str) -> Vec<Arc<dyn EventListener>> {
        self.inner
            .listeners
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(event_name)
            .cloned()
            .unwrap_or_default()
    }

    fn record(&self, event: &CommerceEvent) -> Option<u64> {
        tracing::info!("📣 Event emitted: {} {}", event.name(), event.payload());

        if !self.inner.logging_enabled {
            return None;
        }

        let sequence = self.inner.next_sequence.fetch_add(1, Ordering::Relaxed);
        let capacity = self.inner.log_capacity.load(Ordering::Relaxed);
        let mut log = self
            .inner
            .event_log
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        while log.len() >= capacity {
            if let Some(dropped) = log.pop_front() {
                tracing::debug!("🗑️ Event log full, dropping #{} {}", dropped.sequence, dropped.event_name);
            }
        }
        log.push_back(EventLogEntry {
            sequence,
            event_name: event.name().to_string(),
            payload: event.payload(),
            timestamp: Utc::now(),
            processed: false,
        });
        Some(sequence)
    }

    // 紀錄可能已被捨棄或取出，找不到時略過
    fn mark_processed(&self, sequence: Option<u64>) {
        let Some(sequence) = sequence else { return };
        if let Some(entry) = self
            .inner
            .event_log
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter_mut()
            .rev()
            .find(|entry| entry.sequence == sequence)
        {
            entry.processed = true;
        }
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(EventBusMode::Sync, true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::events::{BOUNTY_FUNDED, ORDER_PAYMENT_COMPLETED, ORDER_REFUNDED};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use uuid::Uuid;

    struct CountingListener {
        name: String,
        calls: Arc<AtomicUsize>,
        fail: bool,
        follow_up: Option<CommerceEvent>,
    }

    impl CountingListener {
        fn new(name: &str, calls: Arc<AtomicUsize>) -> Self {
            Self {
                name: name.to_string(),
                calls,
                fail: false,
                follow_up: None,
            }
        }

        fn failing(mut self) -> Self {
            self.fail = true;
            self
        }

        fn with_follow_up(mut self, event: CommerceEvent) -> Self {
            self.follow_up = Some(event);
            self
        }
    }

    #[async_trait]
    impl EventListener for CountingListener {
        fn name(&self) -> &str {
            &self.name
        }

        async fn handle(&self, _event: &CommerceEvent) -> Result<Vec<CommerceEvent>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(CommerceError::validation("listener exploded"));
            }
            Ok(self.follow_up.clone().into_iter().collect())
        }
    }

    fn refunded() -> CommerceEvent {
        CommerceEvent::OrderRefunded {
            sales_order_id: Uuid::new_v4(),
            amount_cents: 100,
            reason: "test".to_string(),
        }
    }

    #[tokio::test]
    async fn test_sync_dispatch_runs_all_listeners_and_aggregates_failures() {
        let bus = EventBus::default();
        let calls = Arc::new(AtomicUsize::new(0));

        bus.register_listener(
            ORDER_REFUNDED,
            Arc::new(CountingListener::new("first", calls.clone()).failing()),
        );
        bus.register_listener(
            ORDER_REFUNDED,
            Arc::new(CountingListener::new("second", calls.clone())),
        );

        let result = bus.emit(refunded()).await;

        assert_eq!(calls.load(Ordering::SeqCst), 2);
        match result {
            Err(CommerceError::EventDispatchError { event, failures }) => {
                assert_eq!(event, ORDER_REFUNDED);
                assert_eq!(failures.len(), 1);
                assert!(failures[0].starts_with("first"));
            }
            other => panic!("expected dispatch error, got {:?}", other),
        }

        let log = bus.event_log();
        assert_eq!(log.len(), 1);
        assert!(!log[0].processed);
    }

    #[tokio::test]
    async fn test_follow_up_events_are_dispatched_in_order() {
        let bus = EventBus::default();
        let calls = Arc::new(AtomicUsize::new(0));
        let funded = CommerceEvent::BountyFunded {
            bounty_id: Uuid::new_v4(),
            sales_order_id: Uuid::new_v4(),
            product_id: "product-1".to_string(),
        };

        bus.register_listener(
            ORDER_PAYMENT_COMPLETED,
            Arc::new(CountingListener::new("paid", calls.clone()).with_follow_up(funded)),
        );
        bus.register_listener(BOUNTY_FUNDED, Arc::new(CountingListener::new("funded", calls.clone())));

        bus.emit(CommerceEvent::payment_completed(Uuid::new_v4()))
            .await
            .unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(
            bus.emitted_event_names(),
            vec![ORDER_PAYMENT_COMPLETED.to_string(), BOUNTY_FUNDED.to_string()]
        );
        assert!(bus.event_log().iter().all(|entry| entry.processed));
    }

    #[tokio::test]
    async fn test_async_dispatch_and_wait_idle() {
        let bus = EventBus::new(EventBusMode::Async, true);
        let calls = Arc::new(AtomicUsize::new(0));

        for name in ["a", "b", "c"] {
            bus.register_listener(ORDER_REFUNDED, Arc::new(CountingListener::new(name, calls.clone())));
        }
        // 非同步模式下 listener 失敗只會記錄在日誌中
        bus.register_listener(
            ORDER_REFUNDED,
            Arc::new(CountingListener::new("broken", calls.clone()).failing()),
        );

        assert!(bus.emit(refunded()).await.is_ok());
        bus.wait_idle().await;

        assert_eq!(calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn test_log_capacity_drops_oldest_entries() {
        let bus = EventBus::default().with_log_capacity(2);

        for _ in 0..5 {
            bus.emit(refunded()).await.unwrap();
        }

        let log = bus.event_log();
        assert_eq!(log.len(), 2);
        assert_eq!(log[0].sequence, 3);
        assert_eq!(log[1].sequence, 4);
        assert!(log.iter().all(|entry| entry.processed));
    }

    #[tokio::test]
    async fn test_drain_event_log_empties_the_log() {
        let bus = EventBus::default();
        let calls = Arc::new(AtomicUsize::new(0));
        bus.register_listener(ORDER_REFUNDED, Arc::new(CountingListener::new("x", calls.clone())));

        bus.emit(refunded()).await.unwrap();
        bus.emit(refunded()).await.unwrap();

        let drained = bus.drain_event_log();
        assert_eq!(drained.len(), 2);
        assert!(bus.event_log().is_empty());

        // 序號在清空後繼續遞增
        bus.emit(refunded()).await.unwrap();
        let log = bus.event_log();
        assert_eq!(log.len(), 1);
        assert_eq!(log[0].sequence, 2);
        assert!(log[0].processed);
    }

    #[tokio::test]
    async fn test_clear_listeners_and_disabled_log() {
        let bus = EventBus::new(EventBusMode::Sync, false);
        let calls = Arc::new(AtomicUsize::new(0));
        bus.register_listener(ORDER_REFUNDED, Arc::new(CountingListener::new("x", calls.clone())));
        assert_eq!(bus.listener_count(ORDER_REFUNDED), 1);

        bus.clear_listeners();
        assert_eq!(bus.listener_count(ORDER_REFUNDED), 0);

        bus.emit(refunded()).await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert!(bus.event_log().is_empty());
    }
}
