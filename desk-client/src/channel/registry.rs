// desk-client/src/channel/registry.rs
// 订阅注册表 - topic -> handlers

use serde_json::Value;
use shared::Topic;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc;

/// Listener invoked with the decoded JSON body of a MESSAGE frame
pub type Handler = Arc<dyn Fn(&Value) + Send + Sync>;

/// Subscription changes forwarded to the live session
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum ChannelCommand {
    Subscribe { sub_id: String, topic: Topic },
    Unsubscribe { sub_id: String },
}

struct TopicEntry {
    sub_id: String,
    handlers: Vec<(u64, Handler)>,
}

/// Handler registry shared between the channel handle and its worker
///
/// One STOMP subscription per topic, any number of handlers behind it.
/// `epoch` changes on every teardown so that handles and workers from an
/// older session can tell they are stale.
#[derive(Default)]
pub(crate) struct Registry {
    next_handler: u64,
    next_sub: u64,
    topics: HashMap<Topic, TopicEntry>,
    epoch: u64,
    commands: Option<mpsc::UnboundedSender<ChannelCommand>>,
}

impl Registry {
    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    /// Attach the command queue of a new session
    pub fn attach(&mut self, commands: mpsc::UnboundedSender<ChannelCommand>) {
        self.commands = Some(commands);
    }

    /// Detach the current session but keep every handler
    ///
    /// Used when the same user reconnects with a new credential; the next
    /// session replays `subscriptions()`.
    pub fn detach(&mut self) {
        self.commands = None;
    }

    /// Register a handler; returns its id
    pub fn add(&mut self, topic: &Topic, handler: Handler) -> u64 {
        self.next_handler += 1;
        let handler_id = self.next_handler;

        if let Some(entry) = self.topics.get_mut(topic) {
            entry.handlers.push((handler_id, handler));
            return handler_id;
        }

        let sub_id = format!("sub-{}", self.next_sub);
        self.next_sub += 1;
        self.send(ChannelCommand::Subscribe {
            sub_id: sub_id.clone(),
            topic: topic.clone(),
        });
        self.topics.insert(
            topic.clone(),
            TopicEntry {
                sub_id,
                handlers: vec![(handler_id, handler)],
            },
        );
        handler_id
    }

    /// Remove a handler; the topic is unsubscribed when it was the last one
    pub fn remove(&mut self, topic: &Topic, handler_id: u64) -> bool {
        let Some(entry) = self.topics.get_mut(topic) else {
            return false;
        };
        let before = entry.handlers.len();
        entry.handlers.retain(|(id, _)| *id != handler_id);
        let removed = entry.handlers.len() != before;

        if entry.handlers.is_empty() {
            let sub_id = entry.sub_id.clone();
            self.topics.remove(topic);
            self.send(ChannelCommand::Unsubscribe { sub_id });
        }
        removed
    }

    /// Handlers of the topic behind a subscription id (or destination)
    pub fn handlers_for(&self, sub_id: Option<&str>, destination: Option<&str>) -> Vec<Handler> {
        let by_sub = sub_id.and_then(|id| self.topics.values().find(|e| e.sub_id == id));
        let entry = by_sub.or_else(|| {
            destination
                .and_then(Topic::from_destination)
                .and_then(|topic| self.topics.get(&topic))
        });
        entry
            .map(|e| e.handlers.iter().map(|(_, h)| h.clone()).collect())
            .unwrap_or_default()
    }

    /// `(sub_id, topic)` of every registered topic
    pub fn subscriptions(&self) -> Vec<(String, Topic)> {
        let mut subs: Vec<_> = self
            .topics
            .iter()
            .map(|(topic, e)| (e.sub_id.clone(), topic.clone()))
            .collect();
        subs.sort();
        subs
    }

    pub fn handler_count(&self, topic: &Topic) -> usize {
        self.topics.get(topic).map(|e| e.handlers.len()).unwrap_or(0)
    }

    /// Drop every handler and detach the session
    pub fn clear(&mut self) {
        self.topics.clear();
        self.commands = None;
        self.epoch += 1;
    }

    fn send(&self, command: ChannelCommand) {
        if let Some(tx) = &self.commands {
            // worker gone: the next session replays from `subscriptions()`
            let _ = tx.send(command);
        }
    }
}
