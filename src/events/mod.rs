//! Publish/subscribe event bus (§4.2).
//!
//! Delivery is non-blocking: each subscriber has a bounded pending queue;
//! overflow drops the oldest event and emits a `QueueOverflow` diagnostic
//! event instead. `drain_pending_events` is how polling consumers pull and
//! clear their queue.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::RwLock;
use tracing::debug;
use uuid::Uuid;

use crate::constants::EVENT_QUEUE_CAPACITY;
use crate::models::{AgentEvent, AgentEventType};

/// Per-subscriber delivery filter.
#[derive(Debug, Clone)]
pub struct SubscriptionFilter {
    pub agent_id: String,
    pub agent_name: String,
    pub event_types: Vec<AgentEventType>,
    pub exclude_self: bool,
}

struct Subscriber {
    filter: SubscriptionFilter,
    queue: VecDeque<AgentEvent>,
    dropped: u64,
}

/// Many-writer / many-reader pub-sub bus owning its subscribers.
#[derive(Clone)]
pub struct EventBus {
    subscribers: Arc<RwLock<HashMap<String, Subscriber>>>,
    next_id: Arc<AtomicU64>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl EventBus {
    pub fn new() -> Self {
        Self {
            subscribers: Arc::new(RwLock::new(HashMap::new())),
            next_id: Arc::new(AtomicU64::new(1)),
        }
    }

    pub async fn subscribe(&self, filter: SubscriptionFilter) -> String {
        let id = format!(
            "sub-{}-{}",
            self.next_id.fetch_add(1, Ordering::SeqCst),
            Uuid::new_v4()
        );
        self.subscribers.write().await.insert(
            id.clone(),
            Subscriber {
                filter,
                queue: VecDeque::new(),
                dropped: 0,
            },
        );
        id
    }

    pub async fn unsubscribe(&self, subscription_id: &str) -> bool {
        self.subscribers.write().await.remove(subscription_id).is_some()
    }

    /// Delivers `event` to every matching subscriber. Must never block on a
    /// slow consumer: a full queue drops its oldest entry instead.
    pub async fn emit(&self, event: AgentEvent) {
        let mut overflowed: Vec<String> = Vec::new();
        {
            let mut subscribers = self.subscribers.write().await;
            for (sub_id, subscriber) in subscribers.iter_mut() {
                if !matches(&subscriber.filter, &event) {
                    continue;
                }
                if subscriber.queue.len() >= EVENT_QUEUE_CAPACITY {
                    subscriber.queue.pop_front();
                    subscriber.dropped += 1;
                    overflowed.push(sub_id.clone());
                    debug!(subscriber = %sub_id, "event queue overflow, dropped oldest");
                }
                subscriber.queue.push_back(event.clone());
            }
        }

        for sub_id in overflowed {
            let diagnostic = AgentEvent::new(
                AgentEventType::QueueOverflow,
                event.agent_id.clone(),
                event.workspace_id.clone(),
                serde_json::json!({ "dropped_for": sub_id }),
            );
            // Boxed recursion avoided: overflow events are delivered directly,
            // never re-counted against another subscriber's overflow.
            let mut subscribers = self.subscribers.write().await;
            for (_, subscriber) in subscribers.iter_mut() {
                if matches(&subscriber.filter, &diagnostic) && subscriber.queue.len() < EVENT_QUEUE_CAPACITY {
                    subscriber.queue.push_back(diagnostic.clone());
                }
            }
        }
    }

    /// Pulls and clears every pending event queued under `subscription_id`.
    pub async fn drain_pending_events(&self, subscription_id: &str) -> Vec<AgentEvent> {
        let mut subscribers = self.subscribers.write().await;
        match subscribers.get_mut(subscription_id) {
            Some(subscriber) => subscriber.queue.drain(..).collect(),
            None => Vec::new(),
        }
    }

    pub async fn dropped_count(&self, subscription_id: &str) -> u64 {
        self.subscribers
            .read()
            .await
            .get(subscription_id)
            .map(|s| s.dropped)
            .unwrap_or(0)
    }

    pub async fn subscriber_count(&self) -> usize {
        self.subscribers.read().await.len()
    }
}

fn matches(filter: &SubscriptionFilter, event: &AgentEvent) -> bool {
    if filter.exclude_self && event.agent_id == filter.agent_id {
        return false;
    }
    filter.event_types.is_empty() || filter.event_types.contains(&event.event_type)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn filter(agent_id: &str, types: Vec<AgentEventType>, exclude_self: bool) -> SubscriptionFilter {
        SubscriptionFilter {
            agent_id: agent_id.to_string(),
            agent_name: agent_id.to_string(),
            event_types: types,
            exclude_self,
        }
    }

    #[tokio::test]
    async fn subscribe_then_unsubscribe_restores_prior_state() {
        let bus = EventBus::new();
        let before = bus.subscriber_count().await;
        let id = bus.subscribe(filter("a1", vec![], false)).await;
        assert_eq!(bus.subscriber_count().await, before + 1);
        assert!(bus.unsubscribe(&id).await);
        assert_eq!(bus.subscriber_count().await, before);
    }

    #[tokio::test]
    async fn delivers_only_matching_event_types() {
        let bus = EventBus::new();
        let id = bus
            .subscribe(filter("a1", vec![AgentEventType::TaskAssigned], false))
            .await;

        bus.emit(AgentEvent::new(
            AgentEventType::MessageSent,
            "a2",
            "ws1",
            serde_json::json!({}),
        ))
        .await;
        bus.emit(AgentEvent::new(
            AgentEventType::TaskAssigned,
            "a2",
            "ws1",
            serde_json::json!({}),
        ))
        .await;

        let pending = bus.drain_pending_events(&id).await;
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].event_type, AgentEventType::TaskAssigned);
    }

    #[tokio::test]
    async fn exclude_self_skips_the_originating_agent() {
        let bus = EventBus::new();
        let id = bus.subscribe(filter("a1", vec![], true)).await;
        bus.emit(AgentEvent::new(
            AgentEventType::MessageSent,
            "a1",
            "ws1",
            serde_json::json!({}),
        ))
        .await;
        assert!(bus.drain_pending_events(&id).await.is_empty());
    }

    #[tokio::test]
    async fn overflow_drops_oldest_and_emits_diagnostic() {
        let bus = EventBus::new();
        let id = bus.subscribe(filter("a1", vec![], false)).await;

        for i in 0..(EVENT_QUEUE_CAPACITY + 1) {
            bus.emit(AgentEvent::new(
                AgentEventType::MessageSent,
                format!("agent-{i}"),
                "ws1",
                serde_json::json!({ "i": i }),
            ))
            .await;
        }

        assert_eq!(bus.dropped_count(&id).await, 1);
        let pending = bus.drain_pending_events(&id).await;
        // oldest (agent-0) dropped; queue holds the rest plus the overflow diagnostic
        assert!(pending.iter().any(|e| e.event_type == AgentEventType::QueueOverflow));
        assert!(!pending.iter().any(|e| e.agent_id == "agent-0"));
    }
}
