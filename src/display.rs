use chrono::{DateTime, Local};
use std::collections::{HashMap, VecDeque};
use std::fmt;

use crate::backend::events::{ChatEvent, FeedEvent, Platform, Segment};
use crate::backend::state::ConnectionState;

/// Lines kept for display; older ones are discarded first
pub const MAX_DISPLAY_LINES: usize = 500;

#[derive(Debug, Clone)]
pub enum DisplayLine {
    Chat(ChatEvent),
    System {
        timestamp: DateTime<Local>,
        message: String,
    },
}

impl fmt::Display for DisplayLine {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            DisplayLine::Chat(event) => {
                write!(f, "[{}] {}: ", event.timestamp.format("%H:%M:%S"), event.username)?;
                for segment in &event.segments {
                    match segment {
                        Segment::Text { text } => write!(f, "{}", text)?,
                        Segment::Emote { name, .. } => write!(f, "{}", name)?,
                    }
                }
                Ok(())
            }
            DisplayLine::System { timestamp, message } => {
                write!(f, "[{}] {}", timestamp.format("%H:%M:%S"), message)
            }
        }
    }
}

/// Bounded scrollback plus the last known state of each platform
#[derive(Debug)]
pub struct DisplayBuffer {
    lines: VecDeque<DisplayLine>,
    capacity: usize,
    states: HashMap<Platform, ConnectionState>,
}

impl DisplayBuffer {
    pub fn new() -> Self {
        Self::with_capacity(MAX_DISPLAY_LINES)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            lines: VecDeque::with_capacity(capacity),
            capacity,
            states: HashMap::new(),
        }
    }

    /// Apply one feed event. Returns the line it added, if any.
    pub fn push(&mut self, event: FeedEvent) -> Option<&DisplayLine> {
        let line = match event {
            FeedEvent::Chat(chat) => DisplayLine::Chat(chat),
            FeedEvent::System { message, .. } => DisplayLine::System {
                timestamp: Local::now(),
                message,
            },
            FeedEvent::State { platform, state } => {
                self.states.insert(platform, state);
                return None;
            }
        };

        if self.lines.len() >= self.capacity {
            self.lines.pop_front();
        }
        self.lines.push_back(line);
        self.lines.back()
    }

    #[cfg(test)]
    pub fn lines(&self) -> impl Iterator<Item = &DisplayLine> {
        self.lines.iter()
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn state(&self, platform: Platform) -> ConnectionState {
        self.states
            .get(&platform)
            .copied()
            .unwrap_or(ConnectionState::Disconnected)
    }

    /// e.g. `Twitch: Connected | YouTube: Disconnected`
    pub fn status_line(&self) -> String {
        [Platform::Twitch, Platform::YouTube]
            .iter()
            .map(|p| format!("{}: {:?}", p, self.state(*p)))
            .collect::<Vec<_>>()
            .join(" | ")
    }
}
