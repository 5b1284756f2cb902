use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::mpsc;

/// What a subscriber receives
#[derive(Debug, Clone, PartialEq)]
pub enum Signal<T> {
    Next(T),
    /// Graceful end of stream
    Completed,
    /// Abnormal end of stream with its reason
    Error(String),
}

impl<T> Signal<T> {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Signal::Next(_))
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Terminal {
    Completed,
    Error(String),
}

impl Terminal {
    fn signal<T>(&self) -> Signal<T> {
        match self {
            Terminal::Completed => Signal::Completed,
            Terminal::Error(reason) => Signal::Error(reason.clone()),
        }
    }
}

struct Inner<T> {
    last: Option<T>,
    subscribers: Vec<mpsc::UnboundedSender<Signal<T>>>,
    terminal: Option<Terminal>,
}

/// Broadcast channel that replays its latest value to late subscribers
///
/// Publishing happens under a lock, so every subscriber sees values in
/// publish order. After `complete` or `error` the terminal signal is
/// delivered once to every subscriber, the subscriber list is dropped and
/// further publishes are ignored.
pub struct Subject<T> {
    name: &'static str,
    inner: Arc<Mutex<Inner<T>>>,
}

impl<T> Clone for Subject<T> {
    fn clone(&self) -> Self {
        Self {
            name: self.name,
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> fmt::Debug for Subject<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subject").field("name", &self.name).finish()
    }
}

impl<T: Clone + Send + 'static> Subject<T> {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            inner: Arc::new(Mutex::new(Inner {
                last: None,
                subscribers: Vec::new(),
                terminal: None,
            })),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Publish a value to every subscriber. Returns false once the subject
    /// has ended.
    pub fn publish(&self, value: T) -> bool {
        let mut inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        if inner.terminal.is_some() {
            tracing::debug!(target: "events", "Dropping publish on ended channel {}", self.name);
            return false;
        }
        // Subscribers whose receiver is gone are pruned here
        inner
            .subscribers
            .retain(|tx| tx.send(Signal::Next(value.clone())).is_ok());
        inner.last = Some(value);
        true
    }

    pub fn complete(&self) {
        self.terminate(Terminal::Completed);
    }

    pub fn error(&self, reason: impl Into<String>) {
        self.terminate(Terminal::Error(reason.into()));
    }

    fn terminate(&self, terminal: Terminal) {
        let mut inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        if inner.terminal.is_some() {
            return;
        }
        for tx in inner.subscribers.drain(..) {
            let _ = tx.send(terminal.signal());
        }
        tracing::debug!(target: "events", "Channel {} ended: {:?}", self.name, terminal);
        inner.terminal = Some(terminal);
    }

    /// Attach a new subscriber. It immediately receives the latest value, if
    /// any, and the terminal signal if the subject has already ended.
    pub fn subscribe(&self) -> Subscription<T> {
        self.attach(true)
    }

    /// Attach a subscriber that only sees values published from now on, plus
    /// the terminal signal
    pub fn subscribe_new(&self) -> Subscription<T> {
        self.attach(false)
    }

    fn attach(&self, replay: bool) -> Subscription<T> {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);

        if let (true, Some(last)) = (replay, &inner.last) {
            let _ = tx.send(Signal::Next(last.clone()));
        }

        match &inner.terminal {
            Some(terminal) => {
                let _ = tx.send(terminal.signal());
            }
            None => inner.subscribers.push(tx),
        }

        Subscription { rx, done: false }
    }

    /// Most recently published value
    pub fn last(&self) -> Option<T> {
        let inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        inner.last.clone()
    }

    pub fn subscriber_count(&self) -> usize {
        let inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        inner.subscribers.iter().filter(|tx| !tx.is_closed()).count()
    }

    pub fn is_ended(&self) -> bool {
        let inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        inner.terminal.is_some()
    }
}

/// Receiving end of a [`Subject`]
#[derive(Debug)]
pub struct Subscription<T> {
    rx: mpsc::UnboundedReceiver<Signal<T>>,
    done: bool,
}

impl<T> Subscription<T> {
    /// Wait for the next signal. Returns `None` after the terminal signal has
    /// been handed out, or if the subject was dropped.
    pub async fn next(&mut self) -> Option<Signal<T>> {
        if self.done {
            return None;
        }
        let signal = self.rx.recv().await;
        self.observe(signal)
    }

    /// Non-blocking variant of [`Subscription::next`]
    pub fn try_next(&mut self) -> Option<Signal<T>> {
        if self.done {
            return None;
        }
        let signal = self.rx.try_recv().ok();
        match signal {
            Some(signal) => self.observe(Some(signal)),
            None => None,
        }
    }

    fn observe(&mut self, signal: Option<Signal<T>>) -> Option<Signal<T>> {
        match signal {
            Some(signal) => {
                if signal.is_terminal() {
                    self.done = true;
                }
                Some(signal)
            }
            None => {
                self.done = true;
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_subscriber_receives_in_publish_order() {
        let subject = Subject::new("test");
        let mut sub = subject.subscribe();
        subject.publish(1);
        subject.publish(2);
        assert_eq!(sub.try_next(), Some(Signal::Next(1)));
        assert_eq!(sub.try_next(), Some(Signal::Next(2)));
        assert_eq!(sub.try_next(), None);
    }

    #[test]
    fn test_late_subscriber_gets_last_value_once() {
        let subject = Subject::new("test");
        subject.publish("old");
        subject.publish("current");

        let mut sub = subject.subscribe();
        assert_eq!(sub.try_next(), Some(Signal::Next("current")));
        assert_eq!(sub.try_next(), None);

        subject.publish("new");
        assert_eq!(sub.try_next(), Some(Signal::Next("new")));
        assert_eq!(sub.try_next(), None);
    }

    #[test]
    fn test_subscriber_without_history_gets_nothing() {
        let subject: Subject<u8> = Subject::new("test");
        let mut sub = subject.subscribe();
        assert_eq!(sub.try_next(), None);
    }

    #[test]
    fn test_complete_is_delivered_then_ends() {
        let subject = Subject::new("test");
        let mut sub = subject.subscribe();
        subject.publish(1);
        subject.complete();

        assert_eq!(sub.try_next(), Some(Signal::Next(1)));
        assert_eq!(sub.try_next(), Some(Signal::Completed));
        assert_eq!(sub.try_next(), None);
        assert_eq!(subject.subscriber_count(), 0);
    }

    #[test]
    fn test_publish_after_end_is_ignored() {
        let subject = Subject::new("test");
        subject.error("connection reset");
        assert!(!subject.publish(5));
        assert_eq!(subject.last(), None);
    }

    #[test]
    fn test_terminal_signal_sent_only_once() {
        let subject: Subject<u8> = Subject::new("test");
        let mut sub = subject.subscribe();
        subject.error("first");
        subject.complete();
        assert_eq!(sub.try_next(), Some(Signal::Error("first".to_string())));
        assert_eq!(sub.try_next(), None);
    }

    #[test]
    fn test_late_subscriber_after_end_gets_replay_and_terminal() {
        let subject = Subject::new("test");
        subject.publish(7);
        subject.complete();

        let mut sub = subject.subscribe();
        assert_eq!(sub.try_next(), Some(Signal::Next(7)));
        assert_eq!(sub.try_next(), Some(Signal::Completed));
        assert_eq!(sub.try_next(), None);
    }

    #[test]
    fn test_subscribe_new_skips_replay() {
        let subject = Subject::new("test");
        subject.publish(1);
        let mut sub = subject.subscribe_new();
        assert_eq!(sub.try_next(), None);
        subject.publish(2);
        assert_eq!(sub.try_next(), Some(Signal::Next(2)));
    }

    #[test]
    fn test_dropped_subscriber_is_pruned() {
        let subject = Subject::new("test");
        let sub = subject.subscribe();
        let _keep = subject.subscribe();
        assert_eq!(subject.subscriber_count(), 2);
        drop(sub);
        subject.publish(1);
        assert_eq!(subject.subscriber_count(), 1);
    }

    #[tokio::test]
    async fn test_async_next_waits_for_publish() {
        let subject = Subject::new("test");
        let mut sub = subject.subscribe();

        let publisher = subject.clone();
        tokio::spawn(async move {
            publisher.publish("hello".to_string());
            publisher.complete();
        });

        assert_eq!(sub.next().await, Some(Signal::Next("hello".to_string())));
        assert_eq!(sub.next().await, Some(Signal::Completed));
        assert_eq!(sub.next().await, None);
    }
}
