//! Short-term turn queue.
//!
//! Strict FIFO of raw dialogue turns: the newest `max_size` turns survive,
//! with no priority of any kind.

use std::collections::VecDeque;

use chrono::{DateTime, Utc};

use super::{Turn, TurnInput};
use crate::{MemoryError, MemoryResult};

/// Bounded FIFO of dialogue turns for one persona
#[derive(Debug, Clone)]
pub struct ShortTermQueue {
    turns: VecDeque<Turn>,
    max_size: usize,
}

impl ShortTermQueue {
    /// Create an empty queue holding at most `max_size` turns
    pub fn new(max_size: usize) -> Self {
        Self {
            turns: VecDeque::with_capacity(max_size.saturating_add(1)),
            max_size,
        }
    }

    /// Rebuild a queue from stored turns (oldest first), keeping the newest
    pub fn from_turns(turns: impl IntoIterator<Item = Turn>, max_size: usize) -> Self {
        let mut queue = Self::new(max_size);
        queue.extend(turns);
        queue
    }

    /// Append already validated turns, oldest first
    pub(crate) fn extend(&mut self, turns: impl IntoIterator<Item = Turn>) {
        for turn in turns {
            self.append(turn);
        }
    }

    /// Validate and append a turn, evicting from the head while over capacity
    ///
    /// `now` is used only when the caller did not supply a timestamp.
    pub fn push(&mut self, input: TurnInput, now: DateTime<Utc>) -> MemoryResult<()> {
        let role = input
            .role
            .ok_or_else(|| MemoryError::invalid_turn("missing role"))?;
        let content = match input.content {
            Some(content) if !content.is_empty() => content,
            _ => return Err(MemoryError::invalid_turn("missing content")),
        };

        self.append(Turn {
            role,
            content,
            timestamp: input.timestamp.unwrap_or(now),
        });
        Ok(())
    }

    fn append(&mut self, turn: Turn) {
        self.turns.push_back(turn);
        while self.turns.len() > self.max_size {
            self.turns.pop_front();
        }
    }

    /// Turns in insertion order, oldest first
    pub fn read(&self) -> impl Iterator<Item = &Turn> {
        self.turns.iter()
    }

    /// Copy of the turns, oldest first
    pub fn to_vec(&self) -> Vec<Turn> {
        self.turns.iter().cloned().collect()
    }

    pub fn clear(&mut self) {
        self.turns.clear();
    }

    pub fn size(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    pub fn max_size(&self) -> usize {
        self.max_size
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::Role;
    use chrono::Duration;

    #[test]
    fn test_push_keeps_most_recent_in_order() {
        let now = Utc::now();
        let mut queue = ShortTermQueue::new(10);

        for i in 1..=15 {
            queue.push(TurnInput::user(format!("turn {i}")), now).unwrap();
            assert!(queue.size() <= 10);
        }

        assert_eq!(queue.size(), 10);
        let contents: Vec<&str> = queue.read().map(|t| t.content.as_str()).collect();
        let expected: Vec<String> = (6..=15).map(|i| format!("turn {i}")).collect();
        assert_eq!(contents, expected);
        assert_eq!(queue.read().next().unwrap().content, "turn 6");
    }

    #[test]
    fn test_push_rejects_incomplete_turns() {
        let now = Utc::now();
        let mut queue = ShortTermQueue::new(3);

        let err = queue.push(TurnInput::from_parts(None, Some("hi")), now).unwrap_err();
        assert!(err.is_invalid_turn());

        let err = queue.push(TurnInput::from_parts(Some("user"), None), now).unwrap_err();
        assert!(err.is_invalid_turn());

        let err = queue.push(TurnInput::from_parts(Some("user"), Some("")), now).unwrap_err();
        assert!(err.is_invalid_turn());

        let err = queue.push(TurnInput::from_parts(Some("narrator"), Some("hi")), now).unwrap_err();
        assert!(err.is_invalid_turn());

        assert_eq!(queue.size(), 0);
    }

    #[test]
    fn test_push_timestamps() {
        let now = Utc::now();
        let earlier = now - Duration::hours(2);
        let mut queue = ShortTermQueue::new(5);

        queue.push(TurnInput::assistant("hello"), now).unwrap();
        queue
            .push(TurnInput::user("hi").with_timestamp(earlier), now)
            .unwrap();

        let turns = queue.to_vec();
        assert_eq!(turns[0].timestamp, now);
        assert_eq!(turns[0].role, Role::Assistant);
        assert_eq!(turns[1].timestamp, earlier);
    }

    #[test]
    fn test_clear_and_from_turns() {
        let now = Utc::now();
        let turns: Vec<Turn> = (0..8)
            .map(|i| Turn {
                role: Role::User,
                content: format!("t{i}"),
                timestamp: now,
            })
            .collect();

        let mut queue = ShortTermQueue::from_turns(turns, 5);
        assert_eq!(queue.size(), 5);
        assert_eq!(queue.read().next().unwrap().content, "t3");

        queue.clear();
        assert!(queue.is_empty());
    }
}
