use outrider_events::{
    Arrival, ConnectionStatus, Death, Experience, Familiar, LogLine, Room, StreamEvent, Thought,
    Vitals,
};

use super::subject::Subject;

/// The event bus: one replaying channel per stream category plus the log
/// channel that carries the full transcript.
///
/// The decoding side is the only writer. Scripts and UI components only
/// subscribe.
#[derive(Debug, Clone)]
pub struct GameStream {
    pub connection: Subject<ConnectionStatus>,
    pub vitals: Subject<Vitals>,
    pub room: Subject<Room>,
    pub experience: Subject<Experience>,
    pub thoughts: Subject<Thought>,
    pub arrivals: Subject<Arrival>,
    pub deaths: Subject<Death>,
    pub familiar: Subject<Familiar>,
    pub log: Subject<LogLine>,
}

impl Default for GameStream {
    fn default() -> Self {
        Self::new()
    }
}

impl GameStream {
    pub fn new() -> Self {
        Self {
            connection: Subject::new("connection"),
            vitals: Subject::new("vitals"),
            room: Subject::new("room"),
            experience: Subject::new("experience"),
            thoughts: Subject::new("thoughts"),
            arrivals: Subject::new("arrivals"),
            deaths: Subject::new("deaths"),
            familiar: Subject::new("familiar"),
            log: Subject::new("log"),
        }
    }

    /// Route an event to its category channel and mirror it into the log
    pub fn publish(&self, event: StreamEvent) {
        tracing::trace!(target: "events", "Publishing {} event", event.category());

        let mirror = match &event {
            StreamEvent::Log(_) => None,
            other => Some(other.to_log_line()),
        };

        match event {
            StreamEvent::Connection(e) => {
                self.connection.publish(e);
            }
            StreamEvent::Vitals(e) => {
                self.vitals.publish(e);
            }
            StreamEvent::Room(e) => {
                self.room.publish(e);
            }
            StreamEvent::Experience(e) => {
                self.experience.publish(e);
            }
            StreamEvent::Thought(e) => {
                self.thoughts.publish(e);
            }
            StreamEvent::Arrival(e) => {
                self.arrivals.publish(e);
            }
            StreamEvent::Death(e) => {
                self.deaths.publish(e);
            }
            StreamEvent::Familiar(e) => {
                self.familiar.publish(e);
            }
            StreamEvent::Log(line) => {
                self.log.publish(line);
            }
        }

        if let Some(line) = mirror {
            self.log.publish(line);
        }
    }

    pub fn publish_all(&self, events: impl IntoIterator<Item = StreamEvent>) {
        for event in events {
            self.publish(event);
        }
    }

    /// End every channel gracefully
    pub fn complete(&self) {
        self.connection.complete();
        self.vitals.complete();
        self.room.complete();
        self.experience.complete();
        self.thoughts.complete();
        self.arrivals.complete();
        self.deaths.complete();
        self.familiar.complete();
        self.log.complete();
    }

    /// End every channel with an error
    pub fn error(&self, reason: impl Into<String>) {
        let reason = reason.into();
        tracing::warn!(target: "events", "Game stream ended with error: {}", reason);
        self.connection.error(reason.clone());
        self.vitals.error(reason.clone());
        self.room.error(reason.clone());
        self.experience.error(reason.clone());
        self.thoughts.error(reason.clone());
        self.arrivals.error(reason.clone());
        self.deaths.error(reason.clone());
        self.familiar.error(reason.clone());
        self.log.error(reason);
    }

    pub fn is_ended(&self) -> bool {
        self.log.is_ended()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stream::Signal;
    use outrider_events::StyleHint;

    fn vitals(health: u8) -> StreamEvent {
        let mut v = Vitals::default();
        v.values.insert("health".to_string(), health);
        StreamEvent::Vitals(v)
    }

    #[test]
    fn test_publish_routes_and_mirrors() {
        let stream = GameStream::new();
        let mut vitals_sub = stream.vitals.subscribe();
        let mut log_sub = stream.log.subscribe();

        stream.publish(vitals(80));

        match vitals_sub.try_next() {
            Some(Signal::Next(v)) => assert_eq!(v.get("health"), Some(80)),
            other => panic!("Expected vitals, got {:?}", other),
        }
        match log_sub.try_next() {
            Some(Signal::Next(line)) => {
                assert_eq!(line.text, "Vitals: health 80%");
                assert!(line.has_style(&StyleHint::Stream("vitals".to_string())));
            }
            other => panic!("Expected mirrored log line, got {:?}", other),
        }
    }

    #[test]
    fn test_log_events_are_not_duplicated() {
        let stream = GameStream::new();
        let mut log_sub = stream.log.subscribe();
        stream.publish(StreamEvent::Log(LogLine::new("hello")));
        assert_eq!(log_sub.try_next(), Some(Signal::Next(LogLine::new("hello"))));
        assert_eq!(log_sub.try_next(), None);
    }

    #[test]
    fn test_late_ui_sees_current_vitals() {
        let stream = GameStream::new();
        stream.publish(vitals(50));
        stream.publish(vitals(70));

        let mut late = stream.vitals.subscribe();
        match late.try_next() {
            Some(Signal::Next(v)) => assert_eq!(v.get("health"), Some(70)),
            other => panic!("Expected replayed vitals, got {:?}", other),
        }
        assert_eq!(late.try_next(), None);
    }

    #[test]
    fn test_error_ends_every_channel() {
        let stream = GameStream::new();
        let mut room_sub = stream.room.subscribe();
        let mut log_sub = stream.log.subscribe();

        stream.error("connection reset by peer");

        assert_eq!(
            room_sub.try_next(),
            Some(Signal::Error("connection reset by peer".to_string()))
        );
        assert_eq!(
            log_sub.try_next(),
            Some(Signal::Error("connection reset by peer".to_string()))
        );
        assert!(stream.is_ended());
    }
}
