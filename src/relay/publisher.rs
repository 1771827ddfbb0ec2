use std::collections::VecDeque;
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread::JoinHandle;
use std::time::Duration;

use crate::error::RelayError;

/// Receives events released by a [`CreditPublisher`], one call per event.
pub trait EventSink<T>: Send + 'static {
    fn deliver(&mut self, event: T) -> Result<(), RelayError>;
}

impl<T, F> EventSink<T> for F
where
    F: FnMut(T) -> Result<(), RelayError> + Send + 'static,
{
    fn deliver(&mut self, event: T) -> Result<(), RelayError> {
        self(event)
    }
}

struct State<T> {
    queue: VecDeque<T>,
    demand: u64,
    in_flight: bool,
    stopped: bool,
    fault: Option<String>,
}

struct Shared<T> {
    state: Mutex<State<T>>,
    changed: Condvar,
}

impl<T> Shared<T> {
    fn lock(&self) -> Result<MutexGuard<'_, State<T>>, RelayError> {
        self.state
            .lock()
            .map_err(|_| RelayError::DispatchInterrupted("publisher state poisoned".to_string()))
    }
}

/// FIFO of outbound events released one for one against granted demand.
///
/// A dedicated thread waits until there is both demand and a queued event,
/// then hands the event to the sink outside the lock.
pub struct CreditPublisher<T> {
    name: String,
    shared: Arc<Shared<T>>,
    dispatcher: Mutex<Option<JoinHandle<()>>>,
}

impl<T: Send + 'static> CreditPublisher<T> {
    pub fn spawn(name: &str, sink: impl EventSink<T>) -> Result<Self, RelayError> {
        let shared = Arc::new(Shared {
            state: Mutex::new(State {
                queue: VecDeque::new(),
                demand: 0,
                in_flight: false,
                stopped: false,
                fault: None,
            }),
            changed: Condvar::new(),
        });

        let dispatcher = {
            let shared = shared.clone();
            let name = name.to_string();
            std::thread::Builder::new()
                .name(format!("{}-dispatch", name))
                .spawn(move || dispatch(&name, &shared, sink))
                .map_err(|e| RelayError::DispatchInterrupted(e.to_string()))?
        };

        Ok(Self {
            name: name.to_string(),
            shared,
            dispatcher: Mutex::new(Some(dispatcher)),
        })
    }

    pub fn grant(&self, n: u64) -> Result<(), RelayError> {
        let mut state = self.shared.lock()?;
        state.demand = state.demand.saturating_add(n);
        drop(state);
        self.shared.changed.notify_all();
        Ok(())
    }

    pub fn enqueue(&self, event: T) -> Result<(), RelayError> {
        let mut state = self.shared.lock()?;
        if state.stopped {
            let reason = state
                .fault
                .clone()
                .unwrap_or_else(|| format!("{} publisher stopped", self.name));
            return Err(RelayError::DispatchInterrupted(reason));
        }
        state.queue.push_back(event);
        drop(state);
        self.shared.changed.notify_all();
        Ok(())
    }

    /// Waits until every queued event has been handed to the sink.
    ///
    /// Returns false when the timeout elapsed or the dispatcher stopped with
    /// events still queued.
    pub fn drain(&self, timeout: Duration) -> bool {
        let Ok(state) = self.shared.lock() else {
            return false;
        };
        let (state, _) = self
            .shared
            .changed
            .wait_timeout_while(state, timeout, |s| {
                !s.stopped && (s.in_flight || !s.queue.is_empty())
            })
            .unwrap_or_else(PoisonError::into_inner);
        !state.in_flight && state.queue.is_empty()
    }

    /// Stops dispatching. Events still queued are abandoned.
    pub fn stop(&self) {
        let mut state = self.shared.state.lock().unwrap_or_else(PoisonError::into_inner);
        if !state.queue.is_empty() {
            tracing::debug!("{} publisher abandoning {} events", self.name, state.queue.len());
        }
        state.stopped = true;
        state.queue.clear();
        drop(state);
        self.shared.changed.notify_all();

        let handle = self
            .dispatcher
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(handle) = handle {
            if handle.thread().id() != std::thread::current().id() && handle.join().is_err() {
                tracing::error!("{} dispatcher panicked", self.name);
            }
        }
    }

    pub fn is_stopped(&self) -> bool {
        self.shared
            .state
            .lock()
            .map(|state| state.stopped)
            .unwrap_or(true)
    }

    pub fn pending(&self) -> usize {
        self.shared
            .state
            .lock()
            .map(|state| state.queue.len())
            .unwrap_or(0)
    }

    pub fn demand(&self) -> u64 {
        self.shared
            .state
            .lock()
            .map(|state| state.demand)
            .unwrap_or(0)
    }
}

impl<T> Drop for CreditPublisher<T> {
    fn drop(&mut self) {
        if let Ok(mut state) = self.shared.state.lock() {
            state.stopped = true;
        }
        self.shared.changed.notify_all();
    }
}

fn dispatch<T>(name: &str, shared: &Shared<T>, mut sink: impl EventSink<T>) {
    tracing::debug!("{} dispatcher started", name);
    loop {
        let event = {
            let state = match shared.lock() {
                Ok(state) => state,
                Err(e) => {
                    tracing::error!("{} dispatcher: {}", name, e);
                    return;
                }
            };
            let mut state = match shared
                .changed
                .wait_while(state, |s| !s.stopped && (s.demand == 0 || s.queue.is_empty()))
            {
                Ok(state) => state,
                Err(_) => {
                    tracing::error!("{} dispatcher: publisher state poisoned", name);
                    return;
                }
            };
            if state.stopped {
                break;
            }
            let Some(event) = state.queue.pop_front() else {
                continue;
            };
            state.demand -= 1;
            state.in_flight = true;
            event
        };

        let delivered = sink.deliver(event);

        let mut state = shared.state.lock().unwrap_or_else(PoisonError::into_inner);
        state.in_flight = false;
        if let Err(e) = delivered {
            tracing::error!("{} dispatcher failed to deliver event: {}", name, e);
            state.fault = Some(e.to_string());
            state.stopped = true;
            drop(state);
            shared.changed.notify_all();
            return;
        }
        drop(state);
        shared.changed.notify_all();
    }
    tracing::debug!("{} dispatcher stopped", name);
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    fn recording_sink() -> (Arc<Mutex<Vec<u32>>>, impl EventSink<u32>) {
        let delivered = Arc::new(Mutex::new(Vec::new()));
        let sink = {
            let delivered = delivered.clone();
            move |event: u32| -> Result<(), RelayError> {
                delivered.lock().unwrap().push(event);
                Ok(())
            }
        };
        (delivered, sink)
    }

    fn wait_for(delivered: &Mutex<Vec<u32>>, count: usize) {
        let deadline = Instant::now() + Duration::from_secs(2);
        while delivered.lock().unwrap().len() < count && Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(5));
        }
    }

    #[test]
    fn test_releases_no_more_than_granted() {
        let (delivered, sink) = recording_sink();
        let publisher = CreditPublisher::spawn("test", sink).unwrap();

        for i in 0..5 {
            publisher.enqueue(i).unwrap();
        }
        std::thread::sleep(Duration::from_millis(20));
        assert!(delivered.lock().unwrap().is_empty());

        publisher.grant(3).unwrap();
        wait_for(&delivered, 3);
        std::thread::sleep(Duration::from_millis(20));
        assert_eq!(*delivered.lock().unwrap(), vec![0, 1, 2]);
        assert_eq!(publisher.pending(), 2);
        assert_eq!(publisher.demand(), 0);
        assert!(!publisher.drain(Duration::from_millis(20)));

        publisher.grant(10).unwrap();
        assert!(publisher.drain(Duration::from_secs(2)));
        assert_eq!(*delivered.lock().unwrap(), vec![0, 1, 2, 3, 4]);
        assert_eq!(publisher.demand(), 8);

        publisher.stop();
    }

    #[test]
    fn test_enqueue_after_stop_fails() {
        let (delivered, sink) = recording_sink();
        let publisher = CreditPublisher::spawn("test", sink).unwrap();
        publisher.enqueue(1).unwrap();
        publisher.stop();

        assert!(publisher.is_stopped());
        assert!(matches!(
            publisher.enqueue(2),
            Err(RelayError::DispatchInterrupted(_))
        ));
        assert!(delivered.lock().unwrap().is_empty());
    }

    #[test]
    fn test_sink_failure_interrupts_dispatch() {
        let sink = |_: u32| -> Result<(), RelayError> { Err(RelayError::TelephonyClosed) };
        let publisher = CreditPublisher::spawn("test", sink).unwrap();
        publisher.grant(1).unwrap();
        publisher.enqueue(1).unwrap();

        let deadline = Instant::now() + Duration::from_secs(2);
        while !publisher.is_stopped() && Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(5));
        }
        match publisher.enqueue(2) {
            Err(RelayError::DispatchInterrupted(reason)) => {
                assert!(reason.contains("telephony channel closed"))
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }
}
