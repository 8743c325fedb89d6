//! Lock-free single-producer/single-consumer MIDI byte queue.
//!
//! The host's MIDI delivery thread pushes timestamped bytes; the render
//! thread drains them during `render_block`. Matches the original firmware's
//! 65536-byte buffer and 32-bit timestamp-prefixed event encoding, but
//! re-expresses the "no event" / "stale event" sentinels as `Option` rather
//! than overloading the byte value `0xFF`.

use std::cell::UnsafeCell;
use std::sync::atomic::{AtomicU32, Ordering};

const CAPACITY: usize = 65536;
const MASK: usize = CAPACITY - 1;

/// A queue entry is a 4-byte little-endian millisecond timestamp followed by
/// one MIDI byte.
const RECORD_LEN: usize = 5;

/// How far a queued timestamp may drift from the synth clock before the
/// buffer is considered stale and flushed.
const STALENESS_MS: u32 = 600_000;

/// Result of draining one record from the ring buffer.
pub enum Drain {
    /// A byte was available and is returned.
    Byte(u8),
    /// No complete record is currently queued.
    Empty,
    /// A record was queued but its timestamp was too far from `now` in
    /// either direction; the caller should flush voices and reset state.
    /// The queue has already been emptied.
    Stale,
}

/// A 65536-byte SPSC ring buffer of timestamped MIDI bytes.
///
/// `buffer` is an `UnsafeCell` rather than plain bytes behind `&mut self`:
/// the producer (`push`) and consumer (`pop`) are expected to run
/// concurrently from different threads, each touching only the byte range
/// it owns (the producer writes strictly ahead of `read_index`, the consumer
/// reads strictly behind `write_index`), with the atomic indices providing
/// the publish/acquire edge. Both methods take `&self` by design.
pub struct MidiRingBuffer {
    buffer: UnsafeCell<Box<[u8; CAPACITY]>>,
    read_index: AtomicU32,
    write_index: AtomicU32,
    dropped_bytes: AtomicU32,
}

// Safety: access to `buffer` is partitioned by the atomic read/write indices
// exactly as a single-producer/single-consumer queue requires; see the
// struct docs.
unsafe impl Sync for MidiRingBuffer {}

impl MidiRingBuffer {
    pub fn new() -> Self {
        MidiRingBuffer {
            buffer: UnsafeCell::new(Box::new([0u8; CAPACITY])),
            read_index: AtomicU32::new(0),
            write_index: AtomicU32::new(0),
            dropped_bytes: AtomicU32::new(0),
        }
    }

    /// Producer side: push one MIDI byte, timestamped `now`.
    ///
    /// If the queue is full, the byte is silently dropped and the drop
    /// counter is incremented — matching §7's BufferOverrun policy.
    pub fn push(&self, now: u32, byte: u8) {
        let read = self.read_index.load(Ordering::Acquire);
        let write = self.write_index.load(Ordering::Relaxed);
        let used = write.wrapping_sub(read) as usize;
        if used.saturating_add(RECORD_LEN) > CAPACITY {
            self.dropped_bytes.fetch_add(1, Ordering::Relaxed);
            log::warn!("MIDI ring buffer full, dropping byte {byte:#04x}");
            return;
        }

        // Safety: only the producer writes, and only at offsets at or past
        // `write`, which the consumer never touches until a later `pop`
        // observes the `Release` store below.
        let buf = unsafe { &mut *self.buffer.get() };
        let mut idx = write as usize & MASK;
        for shift in 0..4 {
            buf[idx] = ((now >> (8 * shift)) & 0xFF) as u8;
            idx = (idx + 1) & MASK;
        }
        buf[idx] = byte;

        self.write_index
            .store(write.wrapping_add(RECORD_LEN as u32), Ordering::Release);
    }

    /// Consumer side: drain one record, healing staleness against `now`.
    pub fn pop(&self, now: u32) -> Drain {
        let write = self.write_index.load(Ordering::Acquire);
        let mut read = self.read_index.load(Ordering::Relaxed);

        if write.wrapping_sub(read) < RECORD_LEN as u32 {
            return Drain::Empty;
        }

        // Safety: only the consumer reads, and only at offsets behind
        // `write`, which we just loaded with `Acquire` ordering above.
        let buf = unsafe { &*self.buffer.get() };
        let mut timestamp: u32 = 0;
        for shift in 0..4 {
            let idx = read as usize & MASK;
            timestamp |= (buf[idx] as u32) << (8 * shift);
            read = read.wrapping_add(1);
        }
        let byte_idx = read as usize & MASK;
        let byte = buf[byte_idx];
        read = read.wrapping_add(1);

        let lower_bound = now.saturating_sub(STALENESS_MS);
        let upper_bound = now.wrapping_add(STALENESS_MS);
        let stale = if upper_bound >= now {
            timestamp < lower_bound || timestamp > upper_bound
        } else {
            // upper_bound wrapped past u32::MAX; the "future" side can't be stale.
            timestamp < lower_bound
        };

        if stale {
            self.read_index.store(0, Ordering::Release);
            self.write_index.store(0, Ordering::Release);
            return Drain::Stale;
        }

        self.read_index.store(read, Ordering::Release);
        Drain::Byte(byte)
    }

    pub fn dropped_bytes(&self) -> u32 {
        self.dropped_bytes.load(Ordering::Relaxed)
    }

    pub fn is_empty(&self) -> bool {
        self.read_index.load(Ordering::Relaxed) == self.write_index.load(Ordering::Relaxed)
    }
}

impl Default for MidiRingBuffer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_queue_pops_empty() {
        let q = MidiRingBuffer::new();
        assert!(matches!(q.pop(0), Drain::Empty));
    }

    #[test]
    fn round_trips_a_byte() {
        let q = MidiRingBuffer::new();
        q.push(1000, 0x90);
        match q.pop(1000) {
            Drain::Byte(b) => assert_eq!(b, 0x90),
            _ => panic!("expected a byte"),
        }
    }

    #[test]
    fn partial_record_reports_empty_without_consuming() {
        let q = MidiRingBuffer::new();
        q.push(1000, 0x90);
        // Only one full record was written; a second pop must not under-read.
        assert!(matches!(q.pop(1000), Drain::Byte(_)));
        assert!(matches!(q.pop(1000), Drain::Empty));
    }

    #[test]
    fn stale_timestamp_flushes_queue() {
        let q = MidiRingBuffer::new();
        q.push(0, 0x90);
        // Far in the future relative to the queued timestamp.
        assert!(matches!(q.pop(1_000_000), Drain::Stale));
        assert!(q.is_empty());
    }

    #[test]
    fn overflow_drops_bytes_and_counts_them() {
        let q = MidiRingBuffer::new();
        for i in 0..(CAPACITY / RECORD_LEN + 10) {
            q.push(0, i as u8);
        }
        assert!(q.dropped_bytes() > 0);
    }
}
