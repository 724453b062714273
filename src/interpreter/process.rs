use crate::interpreter::environment::Snapshot;
use crate::interpreter::object::{lock, Object};
use crate::interpreter::Config;

use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::{channel, Receiver, Sender};
use std::sync::Mutex;

use tracing::{debug, trace};

/// Process-wide state shared by every evaluator of one interpreter: the
/// process table, the pubsub broker, the module cache and the sources used
/// to render error excerpts.
pub struct Runtime {
    config: Config,
    processes: Mutex<HashMap<u64, Sender<Object>>>,
    next_pid: AtomicU64,
    next_id: AtomicU64,
    broker: Broker,
    modules: Mutex<HashMap<String, Object>>,
    loading: Mutex<HashSet<String>>,
    sources: Mutex<HashMap<String, String>>,
}

pub const MAIN_PID: u64 = 0;

impl Runtime {
    pub fn new(config: Config) -> Runtime {
        Runtime {
            config,
            processes: Mutex::new(HashMap::new()),
            next_pid: AtomicU64::new(MAIN_PID),
            next_id: AtomicU64::new(1),
            broker: Broker::default(),
            modules: Mutex::new(HashMap::new()),
            loading: Mutex::new(HashSet::new()),
            sources: Mutex::new(HashMap::new()),
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn broker(&self) -> &Broker {
        &self.broker
    }

    /// Fresh id for subscribers and host objects.
    pub fn next_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }

    /// Allocates a pid with its mailbox. The first call yields the main pid.
    pub fn register(&self) -> (u64, Receiver<Object>) {
        let pid = self.next_pid.fetch_add(1, Ordering::Relaxed);
        let (sender, receiver) = channel();
        lock(&self.processes).insert(pid, sender);
        debug!(pid, "process registered");
        (pid, receiver)
    }

    /// Forgets a finished process and closes the subscriptions it owned.
    pub fn unregister(&self, pid: u64) {
        lock(&self.processes).remove(&pid);
        self.broker.drop_owner(pid);
        debug!(pid, "process exited");
    }

    /// Delivers a deep copy of `msg` to the mailbox of `pid`.
    pub fn send(&self, pid: u64, msg: &Object) -> bool {
        let sender = lock(&self.processes).get(&pid).cloned();
        match sender {
            Some(sender) => sender.send(Snapshot::default().object(msg)).is_ok(),
            None => false,
        }
    }

    /// True when `pid` is the only live process, so nobody can send to it.
    pub fn is_alone(&self, pid: u64) -> bool {
        lock(&self.processes).keys().all(|other| *other == pid)
    }

    pub fn pids(&self) -> Vec<u64> {
        let mut pids: Vec<u64> = lock(&self.processes).keys().copied().collect();
        pids.sort_unstable();
        pids
    }

    pub fn cached_module(&self, key: &str) -> Option<Object> {
        lock(&self.modules).get(key).cloned()
    }

    pub fn cache_module(&self, key: &str, module: Object) {
        lock(&self.modules).insert(key.to_string(), module);
    }

    /// Marks `key` as being loaded; false if it already is (an import cycle).
    pub fn begin_loading(&self, key: &str) -> bool {
        lock(&self.loading).insert(key.to_string())
    }

    pub fn end_loading(&self, key: &str) {
        lock(&self.loading).remove(key);
    }

    pub fn add_source(&self, file: &str, text: &str) {
        lock(&self.sources).insert(file.to_string(), text.to_string());
    }

    pub fn source(&self, file: &str) -> Option<String> {
        lock(&self.sources).get(file).cloned()
    }
}

struct Subscriber {
    owner: u64,
    sender: Sender<Object>,
}

#[derive(Default)]
struct BrokerState {
    subscribers: HashMap<u64, Subscriber>,
    topics: HashMap<String, BTreeSet<u64>>,
    subscriptions: HashMap<u64, BTreeSet<String>>,
}

/// Topic-keyed fan-out. Every subscriber owns an unbounded channel; a
/// publisher only clones senders under the lock and delivers after it is
/// released.
#[derive(Default)]
pub struct Broker {
    state: Mutex<BrokerState>,
}

/// Receiving end handed to scripts as a host object.
pub struct Subscription {
    pub id: u64,
    receiver: Mutex<Receiver<Object>>,
}

impl Subscription {
    /// Blocks until a message arrives; `None` once the subscription closed.
    pub fn recv(&self) -> Option<Object> {
        lock(&self.receiver).recv().ok()
    }

    pub fn try_recv(&self) -> Option<Object> {
        lock(&self.receiver).try_recv().ok()
    }
}

impl Broker {
    pub fn subscribe(&self, id: u64, owner: u64, topic: &str) -> Subscription {
        let (sender, receiver) = channel();
        let mut state = lock(&self.state);
        state.subscribers.insert(id, Subscriber { owner, sender });
        state.topics.entry(topic.to_string()).or_default().insert(id);
        state
            .subscriptions
            .entry(id)
            .or_default()
            .insert(topic.to_string());
        debug!(id, owner, topic, "subscribed");

        Subscription {
            id,
            receiver: Mutex::new(receiver),
        }
    }

    /// Adds another topic to an existing subscriber.
    pub fn add_topic(&self, id: u64, topic: &str) -> bool {
        let mut state = lock(&self.state);
        if !state.subscribers.contains_key(&id) {
            return false;
        }
        state.topics.entry(topic.to_string()).or_default().insert(id);
        state
            .subscriptions
            .entry(id)
            .or_default()
            .insert(topic.to_string());
        true
    }

    /// Removes one topic, or the whole subscriber when `topic` is `None`.
    /// Dropping the subscriber closes its channel.
    pub fn unsubscribe(&self, id: u64, topic: Option<&str>) {
        let mut state = lock(&self.state);
        let topics: Vec<String> = match topic {
            Some(topic) => vec![topic.to_string()],
            None => state
                .subscriptions
                .get(&id)
                .map(|topics| topics.iter().cloned().collect())
                .unwrap_or_default(),
        };

        for topic in &topics {
            if let Some(ids) = state.topics.get_mut(topic) {
                ids.remove(&id);
                if ids.is_empty() {
                    state.topics.remove(topic);
                }
            }
            if let Some(subscribed) = state.subscriptions.get_mut(&id) {
                subscribed.remove(topic);
            }
        }

        if topic.is_none() {
            state.subscriptions.remove(&id);
            state.subscribers.remove(&id);
        }
        debug!(id, ?topic, "unsubscribed");
    }

    /// Delivers `msg` to every subscriber of `topic`; returns how many.
    pub fn publish(&self, topic: &str, msg: &Object) -> usize {
        let senders: Vec<Sender<Object>> = {
            let state = lock(&self.state);
            state
                .topics
                .get(topic)
                .into_iter()
                .flatten()
                .filter_map(|id| state.subscribers.get(id))
                .map(|subscriber| subscriber.sender.clone())
                .collect()
        };

        let delivered = deliver(senders, msg);
        trace!(topic, delivered, "published");
        delivered
    }

    /// Delivers `msg` to every subscriber regardless of topic.
    pub fn broadcast(&self, msg: &Object) -> usize {
        let senders: Vec<Sender<Object>> = {
            let state = lock(&self.state);
            state
                .subscribers
                .values()
                .map(|subscriber| subscriber.sender.clone())
                .collect()
        };

        let delivered = deliver(senders, msg);
        trace!(delivered, "broadcast");
        delivered
    }

    pub fn topics(&self, id: u64) -> Vec<String> {
        lock(&self.state)
            .subscriptions
            .get(&id)
            .map(|topics| topics.iter().cloned().collect())
            .unwrap_or_default()
    }

    fn drop_owner(&self, owner: u64) {
        let owned: Vec<u64> = lock(&self.state)
            .subscribers
            .iter()
            .filter(|(_, subscriber)| subscriber.owner == owner)
            .map(|(id, _)| *id)
            .collect();

        for id in owned {
            self.unsubscribe(id, None);
        }
    }
}

fn deliver(senders: Vec<Sender<Object>>, msg: &Object) -> usize {
    senders
        .into_iter()
        .filter(|sender| sender.send(Snapshot::default().object(msg)).is_ok())
        .count()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interpreter::object::Locked;

    use pretty_assertions::assert_eq;

    #[test]
    fn publish_reaches_topic_subscribers_in_order() {
        let broker = Broker::default();
        let a = broker.subscribe(1, MAIN_PID, "news");
        let b = broker.subscribe(2, MAIN_PID, "sports");

        assert_eq!(broker.publish("news", &Object::Integer(1)), 1);
        assert_eq!(broker.publish("news", &Object::Integer(2)), 1);

        assert_eq!(a.recv(), Some(Object::Integer(1)));
        assert_eq!(a.recv(), Some(Object::Integer(2)));
        assert_eq!(b.try_recv(), None);
    }

    #[test]
    fn unsubscribe_closes_channel() {
        let broker = Broker::default();
        let sub = broker.subscribe(1, MAIN_PID, "news");
        broker.unsubscribe(1, None);

        assert_eq!(broker.publish("news", &Object::Null), 0);
        assert_eq!(sub.recv(), None);
    }

    #[test]
    fn broadcast_fans_out() {
        let broker = Broker::default();
        let a = broker.subscribe(1, MAIN_PID, "x");
        let b = broker.subscribe(2, MAIN_PID, "y");

        assert_eq!(broker.broadcast(&Object::string("hi")), 2);
        assert_eq!(a.recv(), Some(Object::string("hi")));
        assert_eq!(b.recv(), Some(Object::string("hi")));
    }

    #[test]
    fn messages_are_copied() {
        let runtime = Runtime::new(Config::default());
        let (pid, mailbox) = runtime.register();
        let list = Object::list(vec![Object::Integer(1)]);

        assert!(runtime.send(pid, &list));
        let received = mailbox.recv().unwrap();
        if let Object::List(items) = &list {
            items.write_lock().push(Object::Integer(2));
        }

        assert_eq!(received, Object::list(vec![Object::Integer(1)]));
    }

    #[test]
    fn unregister_drops_owned_subscribers() {
        let runtime = Runtime::new(Config::default());
        let (pid, _mailbox) = runtime.register();
        let sub = runtime.broker().subscribe(runtime.next_id(), pid, "t");

        runtime.unregister(pid);
        assert_eq!(sub.recv(), None);
        assert!(!runtime.pids().contains(&pid));
    }
}
