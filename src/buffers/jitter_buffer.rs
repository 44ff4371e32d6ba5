use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use log::Level;

use super::config::{ConcealmentMode, DepthBounds, JitterBufferConfig};
use super::slots::{SlotArena, SlotState, WriteOutcome};
use super::BufferError;
use crate::concealment::{SharedConcealment, Silence};
use crate::logging::{LogCrateSink, SharedLogSink};
use crate::metrics::Metrics;
use crate::packet::Packet;
use crate::JitterError;

struct BufferState {
    slots: SlotArena,
    read_cursor: Option<u64>,
    concealment: Option<SharedConcealment>,
    metrics: Metrics,
}

impl BufferState {
    fn depth(&self) -> usize {
        match self.read_cursor {
            Some(cursor) => self.slots.occupied_run(cursor, self.slots.capacity()),
            None => 0,
        }
    }

    fn refresh_peak(&mut self) {
        let depth = self.depth();
        if depth > self.metrics.peak_depth {
            self.metrics.peak_depth = depth;
        }
    }

    /// Conceals every empty run among `count` positions from `start`, one
    /// handler call per run. `count` must not exceed the slot capacity.
    fn conceal_gaps(&mut self, start: u64, count: usize) {
        let handler = self.concealment.clone().unwrap_or_else(Silence::shared);
        let mut offset = 0;
        while offset < count {
            let position = start.wrapping_add(offset as u64);
            if self.slots.state(position) != SlotState::Empty {
                offset += 1;
                continue;
            }
            let run = (offset..count)
                .take_while(|o| self.slots.state(start.wrapping_add(*o as u64)) == SlotState::Empty)
                .count();
            self.slots.conceal(position, run, handler.as_ref());
            self.metrics.concealed += run as u64;
            offset += run;
        }
    }
}

/// Reorders incoming packets by sequence number and plays them out as a
/// steady stream of fixed-size elements.
///
/// The buffer holds at most `max_depth_elements` positions starting at the
/// read cursor. Every dequeue serves exactly the requested number of elements:
/// positions still missing at that point are concealed rather than waited
/// for, so the added latency stays bounded by the window.
///
/// All methods take `&self`; one producer and one consumer thread can share
/// the buffer through an `Arc`.
pub struct JitterBuffer {
    config: JitterBufferConfig,
    bounds: DepthBounds,
    log_sink: SharedLogSink,
    state: Mutex<BufferState>,
}

impl JitterBuffer {
    pub fn new(config: JitterBufferConfig, log_sink: SharedLogSink) -> Result<Self, JitterError> {
        let bounds = match config.validate() {
            Ok(bounds) => bounds,
            Err(error) => {
                log_sink.log(
                    Level::Error,
                    &format!("{}: invalid configuration: {}", config.name, error),
                    true,
                );
                return Err(error.into());
            }
        };
        let slots = SlotArena::new(bounds.max_depth_elements, config.element_size);
        Ok(JitterBuffer {
            config,
            bounds,
            log_sink,
            state: Mutex::new(BufferState {
                slots,
                read_cursor: None,
                concealment: None,
                metrics: Metrics::default(),
            }),
        })
    }

    pub fn with_default_logging(config: JitterBufferConfig) -> Result<Self, JitterError> {
        Self::new(config, Arc::new(LogCrateSink))
    }

    pub fn config(&self) -> &JitterBufferConfig {
        &self.config
    }

    pub fn min_depth_elements(&self) -> usize {
        self.bounds.min_depth_elements
    }

    pub fn max_depth_elements(&self) -> usize {
        self.bounds.max_depth_elements
    }

    fn lock_state(&self) -> MutexGuard<'_, BufferState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn debug(&self, message: impl FnOnce() -> String) {
        if self.log_sink.enabled(Level::Debug) {
            self.log_sink.log(Level::Debug, &message(), false);
        }
    }

    fn contract_violation(&self, error: JitterError) -> JitterError {
        self.log_sink
            .log(Level::Error, &format!("{}: {}", self.config.name, error), true);
        error
    }

    /// Starts the read cursor at `sequence_number` before any data arrived.
    ///
    /// Returns the number of positions concealed up front, which is only
    /// non-zero with [`ConcealmentMode::Eager`]. A buffer that already has a
    /// read cursor is left alone and 0 is returned.
    pub fn prepare(&self, sequence_number: u64, concealment: &SharedConcealment) -> usize {
        let mut state = self.lock_state();
        if let Some(cursor) = state.read_cursor {
            self.log_sink.log(
                Level::Warn,
                &format!(
                    "{}: prepare({}) ignored, read cursor already at {}",
                    self.config.name, sequence_number, cursor
                ),
                false,
            );
            return 0;
        }

        state.read_cursor = Some(sequence_number);
        state.concealment = Some(Arc::clone(concealment));
        let primed = match self.config.concealment_mode {
            ConcealmentMode::Lazy => 0,
            ConcealmentMode::Eager => {
                let count = self.bounds.min_depth_elements;
                if count > 0 {
                    state.slots.conceal(sequence_number, count, concealment.as_ref());
                    state.metrics.concealed += count as u64;
                }
                count
            }
        };
        state.refresh_peak();
        self.debug(|| {
            format!(
                "{}: read cursor prepared at {}, {} positions primed",
                self.config.name, sequence_number, primed
            )
        });
        primed
    }

    /// Stores a packet's elements and returns how many were written.
    ///
    /// Late, duplicate and overflowing elements are dropped and counted in
    /// the metrics. `concealment` replaces the handler later dequeues use for
    /// positions that are still missing.
    pub fn enqueue(
        &self,
        packet: &Packet,
        concealment: &SharedConcealment,
    ) -> Result<usize, JitterError> {
        packet
            .validate(self.config.element_size, self.config.packet_elements)
            .map_err(|error| self.contract_violation(error.into()))?;

        let mut state = self.lock_state();
        state.concealment = Some(Arc::clone(concealment));
        let written = self.insert_packet(&mut state, packet);
        state.refresh_peak();
        Ok(written)
    }

    /// Enqueues several packets under one lock. The whole batch is validated
    /// before any packet is stored.
    pub fn enqueue_batch(
        &self,
        packets: &[Packet],
        concealment: &SharedConcealment,
    ) -> Result<usize, JitterError> {
        for packet in packets {
            packet
                .validate(self.config.element_size, self.config.packet_elements)
                .map_err(|error| self.contract_violation(error.into()))?;
        }

        let mut state = self.lock_state();
        state.concealment = Some(Arc::clone(concealment));
        let written: usize = packets
            .iter()
            .map(|packet| self.insert_packet(&mut state, packet))
            .sum();
        state.refresh_peak();
        Ok(written)
    }

    fn insert_packet(&self, state: &mut BufferState, packet: &Packet) -> usize {
        let max_depth = self.bounds.max_depth_elements as u64;
        let mut cursor = match state.read_cursor {
            Some(cursor) => cursor,
            None => {
                self.debug(|| {
                    format!(
                        "{}: read cursor starts at first packet {}",
                        self.config.name, packet.sequence_number
                    )
                });
                state.read_cursor = Some(packet.sequence_number);
                packet.sequence_number
            }
        };
        let mut first = packet.sequence_number;
        let mut end = packet.end();
        // Positions past u64::MAX do not exist.
        state.metrics.dropped_overflow += packet.elements as u64 - (end - first);

        if first < cursor {
            let stale_end = end.min(cursor);
            state.metrics.dropped_stale += stale_end - first;
            state.metrics.update_missed += (first..stale_end)
                .filter(|position| state.slots.state(*position) == SlotState::Concealed)
                .count() as u64;
            first = stale_end;
        }
        if first >= end {
            return 0;
        }

        let window_end = cursor.saturating_add(max_depth);
        if end > window_end {
            if state.depth() < self.bounds.min_depth_elements {
                let advanced = end - max_depth;
                self.debug(|| {
                    format!(
                        "{}: advancing read cursor from {} to {} for early packet {}",
                        self.config.name, cursor, advanced, packet.sequence_number
                    )
                });
                state.metrics.skipped += advanced - cursor;
                cursor = advanced;
                state.read_cursor = Some(cursor);
                if first < cursor {
                    state.metrics.dropped_overflow += cursor - first;
                    first = cursor;
                }
            } else {
                let kept_end = window_end.max(first);
                state.metrics.dropped_overflow += end - kept_end;
                end = kept_end;
            }
        }

        let element_size = self.config.element_size;
        let mut written = 0;
        for position in first..end {
            match state
                .slots
                .write(position, packet.element(position, element_size))
            {
                WriteOutcome::Inserted => written += 1,
                WriteOutcome::Replaced => {
                    written += 1;
                    state.metrics.updated += 1;
                }
                WriteOutcome::Duplicate => state.metrics.dropped_duplicate += 1,
            }
        }
        state.metrics.enqueued += written as u64;
        if written > 0 {
            state.metrics.filled_packets += 1;
        }
        written
    }

    /// Copies the next `elements` positions into `destination` and moves the
    /// read cursor past them.
    ///
    /// Missing positions are concealed on the spot. Returns `elements`, or 0
    /// when nothing was requested or the buffer has no read cursor yet. A
    /// destination shorter than `elements * element_size` bytes is an error.
    pub fn dequeue(&self, destination: &mut [u8], elements: usize) -> Result<usize, JitterError> {
        if elements == 0 {
            return Ok(0);
        }
        let element_size = self.config.element_size;
        let required = elements.saturating_mul(element_size);
        if destination.len() < required {
            return Err(self.contract_violation(
                BufferError::DestinationTooSmall {
                    required,
                    available: destination.len(),
                }
                .into(),
            ));
        }

        let mut state = self.lock_state();
        let mut cursor = match state.read_cursor {
            Some(cursor) => cursor,
            None => {
                state.metrics.underruns += elements as u64;
                self.debug(|| {
                    format!(
                        "{}: dequeue of {} elements before any data",
                        self.config.name, elements
                    )
                });
                return Ok(0);
            }
        };

        let capacity = state.slots.capacity();
        let mut served = 0;
        while served < elements {
            let chunk = (elements - served).min(capacity);
            state.conceal_gaps(cursor, chunk);
            state.slots.copy_out(
                cursor,
                chunk,
                &mut destination[served * element_size..(served + chunk) * element_size],
            );
            cursor = cursor.wrapping_add(chunk as u64);
            state.read_cursor = Some(cursor);
            served += chunk;
        }
        state.metrics.dequeued += served as u64;
        Ok(served)
    }

    /// Contiguous playable elements from the read cursor up to the first gap.
    pub fn get_current_depth(&self) -> usize {
        self.lock_state().depth()
    }

    pub fn get_current_depth_ms(&self) -> u64 {
        self.config.elements_to_ms(self.get_current_depth())
    }

    pub fn get_metrics(&self) -> Metrics {
        let state = self.lock_state();
        let mut metrics = state.metrics;
        metrics.current_depth = state.depth();
        metrics
    }

    /// Restarts the depth high-water mark from the current depth.
    pub fn reset_peak_depth(&self) {
        let mut state = self.lock_state();
        state.metrics.peak_depth = state.depth();
    }
}
