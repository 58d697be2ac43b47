use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt::Debug;
use std::hash::Hash;
use std::rc::Rc;

use anyhow::{Result, bail};

/// Observable state of one key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FlightState {
    InFlight,
    Ready,
    Failed { attempts: u32, message: String },
}

enum Entry<V> {
    InFlight,
    Ready(Rc<V>),
    Failed { attempts: u32, message: String },
}

/// Runs a one-time initialization per key and caches the outcome.
///
/// Successes are shared; failures are remembered with an attempt count and
/// retried on the next request. Requesting a key from inside its own
/// initializer is an error instead of a deadlock.
pub struct SingleFlight<K, V> {
    entries: RefCell<HashMap<K, Entry<V>>>,
}

impl<K: Eq + Hash + Clone + Debug, V> SingleFlight<K, V> {
    pub fn new() -> Self {
        Self { entries: RefCell::new(HashMap::new()) }
    }

    pub fn get_or_init(&self, key: &K, init: impl FnOnce() -> Result<V>) -> Result<Rc<V>> {
        let attempts = match self.entries.borrow().get(key) {
            Some(Entry::Ready(value)) => return Ok(Rc::clone(value)),
            Some(Entry::InFlight) => bail!("{key:?} is already being initialized"),
            Some(Entry::Failed { attempts, .. }) => *attempts,
            None => 0,
        };
        self.entries.borrow_mut().insert(key.clone(), Entry::InFlight);

        let outcome = init();
        let mut entries = self.entries.borrow_mut();
        match outcome {
            Ok(value) => {
                let value = Rc::new(value);
                entries.insert(key.clone(), Entry::Ready(Rc::clone(&value)));
                Ok(value)
            }
            Err(err) => {
                let attempts = attempts + 1;
                log::warn!("initializing {key:?} failed (attempt {attempts}): {err:#}");
                entries.insert(key.clone(), Entry::Failed { attempts, message: format!("{err:#}") });
                Err(err)
            }
        }
    }

    pub fn state(&self, key: &K) -> Option<FlightState> {
        self.entries.borrow().get(key).map(|entry| match entry {
            Entry::InFlight => FlightState::InFlight,
            Entry::Ready(_) => FlightState::Ready,
            Entry::Failed { attempts, message } => {
                FlightState::Failed { attempts: *attempts, message: message.clone() }
            }
        })
    }

    /// Forgets `key` so the next request initializes it again.
    pub fn invalidate(&self, key: &K) {
        self.entries.borrow_mut().remove(key);
    }
}

impl<K: Eq + Hash + Clone + Debug, V> Default for SingleFlight<K, V> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;

    use anyhow::anyhow;

    use super::*;

    #[test]
    fn initializes_once() {
        let flights: SingleFlight<&str, u32> = SingleFlight::new();
        let calls = Cell::new(0);
        let init = || {
            calls.set(calls.get() + 1);
            Ok(7)
        };
        let a = flights.get_or_init(&"k", init).unwrap();
        let b = flights.get_or_init(&"k", || Ok(8)).unwrap();
        assert!(Rc::ptr_eq(&a, &b));
        assert_eq!(*b, 7);
        assert_eq!(calls.get(), 1);
        assert_eq!(flights.state(&"k"), Some(FlightState::Ready));
    }

    #[test]
    fn failures_are_retried() {
        let flights: SingleFlight<&str, u32> = SingleFlight::new();
        assert!(flights.get_or_init(&"k", || Err(anyhow!("boom"))).is_err());
        assert!(flights.get_or_init(&"k", || Err(anyhow!("boom"))).is_err());
        assert_eq!(
            flights.state(&"k"),
            Some(FlightState::Failed { attempts: 2, message: "boom".into() })
        );
        assert_eq!(*flights.get_or_init(&"k", || Ok(1)).unwrap(), 1);
    }

    #[test]
    fn reentrant_requests_fail() {
        let flights: SingleFlight<&str, u32> = SingleFlight::new();
        let outer = flights.get_or_init(&"k", || {
            assert_eq!(flights.state(&"k"), Some(FlightState::InFlight));
            flights.get_or_init(&"k", || Ok(1)).map(|v| *v)
        });
        assert!(outer.is_err());
        assert!(matches!(flights.state(&"k"), Some(FlightState::Failed { attempts: 1, .. })));
    }

    #[test]
    fn invalidate_forgets() {
        let flights: SingleFlight<&str, u32> = SingleFlight::new();
        flights.get_or_init(&"k", || Ok(1)).unwrap();
        flights.invalidate(&"k");
        assert_eq!(flights.state(&"k"), None);
    }
}
