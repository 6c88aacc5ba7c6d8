use std::collections::HashMap;
use std::sync::Arc;

use crate::codec::direction::Direction;
use crate::codec::message::Message;

/// Delivery mode for a registered interceptor (spec §4.D).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InterceptMode {
    /// Runs inline on the manipulator; may freely mutate/block the message.
    Blocking,
    /// Runs on a worker against a shallow copy; mutations are invisible
    /// to the host reply, which always uses the original message.
    AsyncObserve,
    /// The original message is marked blocked immediately (so the host
    /// reply suppresses the packet); a copy with `blocked = false` runs
    /// on a worker, and if it comes back unblocked the runtime re-emits
    /// it as a fresh SEND_MESSAGE.
    AsyncModify,
}

/// A registered callback: synchronous closure invoked with `&mut
/// Message`, boxed so callbacks of different concrete closures can share
/// one list.
pub type Callback = Arc<dyn Fn(&mut Message) + Send + Sync>;

/// Key an interceptor is registered under: numeric header id, symbolic
/// hash/name, or the catch-all sentinel.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum InterceptKey {
    CatchAll,
    Id(i16),
    Name(String),
}

impl From<i16> for InterceptKey {
    fn from(v: i16) -> Self {
        if v == -1 {
            InterceptKey::CatchAll
        } else {
            InterceptKey::Id(v)
        }
    }
}

impl From<&str> for InterceptKey {
    fn from(v: &str) -> Self {
        InterceptKey::Name(v.to_owned())
    }
}

#[derive(Default)]
struct DirectionRegistry {
    catch_all: Vec<Callback>,
    by_key: HashMap<InterceptKey, Vec<Callback>>,
}

/// Per-direction callback lists keyed by identifier, with a dedicated
/// catch-all bucket that always runs first (spec §4.D, §8 property 6).
#[derive(Default)]
pub struct InterceptorRegistry {
    to_client: DirectionRegistry,
    to_server: DirectionRegistry,
}

impl InterceptorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn dir_mut(&mut self, direction: Direction) -> &mut DirectionRegistry {
        match direction {
            Direction::ToClient => &mut self.to_client,
            Direction::ToServer => &mut self.to_server,
        }
    }

    fn dir_ref(&self, direction: Direction) -> &DirectionRegistry {
        match direction {
            Direction::ToClient => &self.to_client,
            Direction::ToServer => &self.to_server,
        }
    }

    /// Registers `callback` for `direction` under `key`, already wrapped
    /// for its delivery mode by the caller (see [`crate::runtime::Runtime::intercept`]).
    pub fn register(&mut self, direction: Direction, key: InterceptKey, callback: Callback) {
        let registry = self.dir_mut(direction);
        match key {
            InterceptKey::CatchAll => registry.catch_all.push(callback),
            other => registry.by_key.entry(other).or_default().push(callback),
        }
    }

    /// Removes every list registered under `key` across both directions.
    /// `InterceptKey::CatchAll` clears everything (catch-all buckets and
    /// every keyed bucket in both directions).
    pub fn remove(&mut self, key: &InterceptKey) {
        if *key == InterceptKey::CatchAll {
            self.to_client.catch_all.clear();
            self.to_client.by_key.clear();
            self.to_server.catch_all.clear();
            self.to_server.by_key.clear();
            return;
        }
        self.to_client.by_key.remove(key);
        self.to_server.by_key.remove(key);
    }

    pub fn catch_all(&self, direction: Direction) -> &[Callback] {
        &self.dir_ref(direction).catch_all
    }

    pub fn for_key(&self, direction: Direction, key: &InterceptKey) -> &[Callback] {
        self.dir_ref(direction)
            .by_key
            .get(key)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    fn recording_callback(log: Arc<Mutex<Vec<&'static str>>>, tag: &'static str) -> Callback {
        Arc::new(move |_msg: &mut Message| {
            log.lock().unwrap().push(tag);
        })
    }

    #[test]
    fn catch_all_runs_first_in_registration_order() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut reg = InterceptorRegistry::new();
        reg.register(Direction::ToServer, InterceptKey::CatchAll, recording_callback(log.clone(), "catch1"));
        reg.register(Direction::ToServer, InterceptKey::CatchAll, recording_callback(log.clone(), "catch2"));
        reg.register(Direction::ToServer, InterceptKey::Id(100), recording_callback(log.clone(), "id100"));

        for cb in reg.catch_all(Direction::ToServer) {
            cb(&mut dummy_message());
        }
        for cb in reg.for_key(Direction::ToServer, &InterceptKey::Id(100)) {
            cb(&mut dummy_message());
        }

        assert_eq!(*log.lock().unwrap(), vec!["catch1", "catch2", "id100"]);
    }

    #[test]
    fn multi_key_registration_is_independent_per_direction() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut reg = InterceptorRegistry::new();
        reg.register(Direction::ToServer, InterceptKey::Name("Chat".into()), recording_callback(log.clone(), "chat"));

        assert_eq!(reg.for_key(Direction::ToServer, &InterceptKey::Name("Chat".into())).len(), 1);
        assert_eq!(reg.for_key(Direction::ToClient, &InterceptKey::Name("Chat".into())).len(), 0);
    }

    #[test]
    fn remove_catch_all_clears_everything() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut reg = InterceptorRegistry::new();
        reg.register(Direction::ToServer, InterceptKey::Id(5), recording_callback(log.clone(), "a"));
        reg.register(Direction::ToClient, InterceptKey::CatchAll, recording_callback(log.clone(), "b"));

        reg.remove(&InterceptKey::CatchAll);

        assert!(reg.for_key(Direction::ToServer, &InterceptKey::Id(5)).is_empty());
        assert!(reg.catch_all(Direction::ToClient).is_empty());
    }

    #[test]
    fn remove_by_key_only_removes_that_key() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut reg = InterceptorRegistry::new();
        reg.register(Direction::ToServer, InterceptKey::Id(5), recording_callback(log.clone(), "a"));
        reg.register(Direction::ToServer, InterceptKey::Id(6), recording_callback(log.clone(), "b"));

        reg.remove(&InterceptKey::Id(5));

        assert!(reg.for_key(Direction::ToServer, &InterceptKey::Id(5)).is_empty());
        assert_eq!(reg.for_key(Direction::ToServer, &InterceptKey::Id(6)).len(), 1);
    }

    fn dummy_message() -> Message {
        Message::new(crate::codec::packet::Packet::empty(1), Direction::ToServer, 0, false)
    }
}
