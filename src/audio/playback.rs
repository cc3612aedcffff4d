//! Gapless playback of inbound synthesized speech.
//!
//! Chunks are not played on arrival. Each one is placed on the output clock at
//! the running cursor so consecutive chunks butt up against each other, and the
//! cursor snaps forward to "now" whenever playback has drained.

use std::collections::HashSet;

use super::codec::{decode_chunk, EncodedChunk};
use super::device::{OutputContext, SourceId};
use crate::error::LiveResult;

/// Earliest time the next buffer may start, on the output device clock
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct PlaybackCursor {
    next_start: f64,
}

impl PlaybackCursor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next_start(&self) -> f64 {
        self.next_start
    }

    /// Claim `duration` seconds of output time and return the start of the slot.
    ///
    /// start = max(cursor, now); cursor = start + duration.
    pub fn reserve(&mut self, now: f64, duration: f64) -> f64 {
        let start = self.next_start.max(now);
        self.next_start = start + duration.max(0.0);
        start
    }
}

/// Where a chunk landed on the output clock
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ScheduledPlayback {
    pub source: SourceId,
    pub start: f64,
    pub duration: f64,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PlaybackStats {
    pub scheduled: u64,
    pub dropped: u64,
    pub completed: u64,
}

pub struct PlaybackScheduler {
    output: Box<dyn OutputContext>,
    sample_rate: u32,
    cursor: PlaybackCursor,
    active_sources: HashSet<SourceId>,
    stats: PlaybackStats,
}

impl PlaybackScheduler {
    /// Take ownership of the output context for the lifetime of one session
    pub fn new(output: Box<dyn OutputContext>, sample_rate: u32) -> Self {
        Self {
            output,
            sample_rate,
            cursor: PlaybackCursor::new(),
            active_sources: HashSet::new(),
            stats: PlaybackStats::default(),
        }
    }

    /// Decode a chunk and queue it right behind everything already scheduled.
    ///
    /// A chunk that fails to decode is counted and returned as an error; the
    /// cursor and the active sources are left untouched.
    pub fn on_chunk_received(&mut self, chunk: &EncodedChunk) -> LiveResult<ScheduledPlayback> {
        let buffer = match decode_chunk(chunk, self.sample_rate) {
            Ok(buffer) => buffer,
            Err(e) => {
                self.stats.dropped += 1;
                return Err(e);
            }
        };

        let duration = buffer.duration_secs();
        let now = self.output.current_time();
        let mut cursor = self.cursor;
        let start = cursor.reserve(now, duration);

        let source = self.output.schedule(buffer, start)?;
        self.cursor = cursor;
        self.active_sources.insert(source);
        self.stats.scheduled += 1;

        log::debug!(
            "[Playback] chunk {} at {:.3}s for {:.3}s (now {:.3}s)",
            source,
            start,
            duration,
            now
        );

        Ok(ScheduledPlayback {
            source,
            start,
            duration,
        })
    }

    /// Device reported that `source` finished playing
    pub fn on_source_ended(&mut self, source: SourceId) {
        if self.active_sources.remove(&source) {
            self.stats.completed += 1;
        }
    }

    pub fn cursor(&self) -> f64 {
        self.cursor.next_start()
    }

    pub fn active_sources(&self) -> usize {
        self.active_sources.len()
    }

    pub fn stats(&self) -> PlaybackStats {
        self.stats
    }

    /// Release the output context. Anything still playing is cut off.
    pub fn close(mut self) -> LiveResult<()> {
        self.active_sources.clear();
        self.output.close()
    }
}
