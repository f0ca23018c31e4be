//! Audio ring read cursor tracking
//!
//! The card writes embedded audio into a ring in its own memory and only exposes the
//! position of its write head. The tracker remembers where the previous poll stopped and
//! turns each new write head position into at most two DMA transfers.

use crate::device::Card;
use crate::ntv2::AudioSystem;

/// Snapshot of the audio ring registers of one audio system
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AudioRegisters {
    /// Ring base in audio memory
    pub read_offset: u32,
    /// Ring size in bytes
    pub wrap_size: u32,
    /// Write head relative to the ring base
    pub last_in: u32,
}

impl AudioRegisters {
    pub fn read(card: &dyn Card, system: AudioSystem) -> Self {
        Self {
            read_offset: card.audio_read_offset(system),
            wrap_size: card.audio_wrap_address(system),
            last_in: card.read_audio_last_in(system),
        }
    }
}

/// Ring bytes to transfer for one poll, as absolute audio memory addresses
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AudioSpan {
    Contiguous {
        address: u32,
        len: u32,
    },
    /// Tail of the ring followed by its head
    Wrapped {
        tail_address: u32,
        tail_len: u32,
        head_address: u32,
        head_len: u32,
    },
}

impl AudioSpan {
    pub fn len(&self) -> u32 {
        match *self {
            AudioSpan::Contiguous { len, .. } => len,
            AudioSpan::Wrapped {
                tail_len, head_len, ..
            } => tail_len + head_len,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// (address, length) pairs in read order
    pub fn transfers(&self) -> Vec<(u32, u32)> {
        match *self {
            AudioSpan::Contiguous { address, len } => vec![(address, len)],
            AudioSpan::Wrapped {
                tail_address,
                tail_len,
                head_address,
                head_len,
            } => vec![(tail_address, tail_len), (head_address, head_len)],
        }
    }
}

/// Outcome of one poll of the write head
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AudioPoll {
    /// Nothing new since the previous poll
    Empty,
    Ready(AudioSpan),
    /// More bytes arrived than the destination holds; the cursor was not moved
    Overrun { bytes: u32 },
}

impl AudioPoll {
    pub fn is_overrun(&self) -> bool {
        matches!(self, AudioPoll::Overrun { .. })
    }
}

/// Read cursor of one audio ring
///
/// Invariant: `read_offset <= last_address <= wrap_address`.
#[derive(Debug, Clone, Default)]
pub struct AudioOffsets {
    current_address: u32,
    last_address: u32,
    read_offset: u32,
    wrap_address: u32,
    bytes_read: u32,
    capacity: u32,
}

impl AudioOffsets {
    /// Tracker delivering at most `capacity` bytes per poll
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.min(u32::MAX as usize) as u32,
            ..Self::default()
        }
    }

    /// Forget all progress and restart from the live write head
    ///
    /// Starting at the write head instead of the ring base keeps the first span after a
    /// reset no larger than what arrives between two polls.
    pub fn reset(&mut self, regs: AudioRegisters) {
        self.read_offset = regs.read_offset;
        self.wrap_address = regs.read_offset.saturating_add(regs.wrap_size);
        let head = (regs.last_in & !0x3).min(regs.wrap_size);
        self.last_address = regs.read_offset + head;
        self.current_address = self.last_address;
        self.bytes_read = 0;
    }

    /// Compute the span written since the previous poll
    pub fn advance(&mut self, raw_last_in: u32) -> AudioPoll {
        let current = (raw_last_in & !0x3)
            .saturating_add(self.read_offset)
            .min(self.wrap_address);
        self.current_address = current;

        let span = if current < self.last_address {
            let tail_len = self.wrap_address - self.last_address;
            let head_len = current - self.read_offset;
            if head_len == 0 {
                AudioSpan::Contiguous {
                    address: self.last_address,
                    len: tail_len,
                }
            } else {
                AudioSpan::Wrapped {
                    tail_address: self.last_address,
                    tail_len,
                    head_address: self.read_offset,
                    head_len,
                }
            }
        } else {
            AudioSpan::Contiguous {
                address: self.last_address,
                len: current - self.last_address,
            }
        };

        let bytes = span.len();
        if bytes > self.capacity {
            return AudioPoll::Overrun { bytes };
        }

        self.bytes_read = bytes;
        // a write head sitting exactly on the wrap address is the ring base
        self.last_address = if current == self.wrap_address {
            self.read_offset
        } else {
            current
        };
        if bytes == 0 {
            AudioPoll::Empty
        } else {
            AudioPoll::Ready(span)
        }
    }

    /// Aligned write head seen by the most recent poll
    pub fn current_address(&self) -> u32 {
        self.current_address
    }

    pub fn last_address(&self) -> u32 {
        self.last_address
    }

    pub fn read_offset(&self) -> u32 {
        self.read_offset
    }

    pub fn wrap_address(&self) -> u32 {
        self.wrap_address
    }

    /// Bytes delivered by the most recent successful poll
    pub fn bytes_read(&self) -> u32 {
        self.bytes_read
    }

    pub fn capacity(&self) -> u32 {
        self.capacity
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const BASE: u32 = 0x1000;
    const WRAP: u32 = 0x800;

    fn tracker(last_in: u32) -> AudioOffsets {
        let mut offsets = AudioOffsets::new(0x400);
        offsets.reset(AudioRegisters {
            read_offset: BASE,
            wrap_size: WRAP,
            last_in,
        });
        offsets
    }

    #[test]
    fn test_reset_starts_at_write_head() {
        let offsets = tracker(0x103);
        assert_eq!(offsets.read_offset(), BASE);
        assert_eq!(offsets.wrap_address(), BASE + WRAP);
        assert_eq!(offsets.last_address(), BASE + 0x100);
        assert_eq!(offsets.bytes_read(), 0);
    }

    #[test]
    fn test_contiguous_span_is_aligned() {
        let mut offsets = tracker(0x100);
        let poll = offsets.advance(0x183);
        assert_eq!(
            poll,
            AudioPoll::Ready(AudioSpan::Contiguous {
                address: BASE + 0x100,
                len: 0x80,
            })
        );
        assert_eq!(offsets.last_address(), BASE + 0x180);
        assert_eq!(offsets.advance(0x180), AudioPoll::Empty);
    }

    #[test]
    fn test_wrapped_span_splits_in_two() {
        let mut offsets = tracker(0x700);
        let poll = offsets.advance(0x40);
        let AudioPoll::Ready(span) = poll else {
            panic!("expected a span, got {:?}", poll);
        };
        // (wrap - last) + (current - read_offset)
        assert_eq!(span.len(), 0x100 + 0x40);
        assert_eq!(
            span.transfers(),
            vec![(BASE + 0x700, 0x100), (BASE, 0x40)]
        );
        assert_eq!(offsets.last_address(), BASE + 0x40);
    }

    #[test]
    fn test_wrap_exactly_at_base() {
        let mut offsets = tracker(0x700);
        let poll = offsets.advance(0);
        assert_eq!(
            poll,
            AudioPoll::Ready(AudioSpan::Contiguous {
                address: BASE + 0x700,
                len: 0x100,
            })
        );
        assert_eq!(offsets.last_address(), BASE);
    }

    #[test]
    fn test_overrun_leaves_cursor() {
        let mut offsets = tracker(0);
        assert_eq!(offsets.advance(0x500), AudioPoll::Overrun { bytes: 0x500 });
        assert_eq!(offsets.last_address(), BASE);

        // caller resets: the tracker resumes from the write head
        offsets.reset(AudioRegisters {
            read_offset: BASE,
            wrap_size: WRAP,
            last_in: 0x500,
        });
        assert!(!offsets.advance(0x540).is_overrun());
        assert!(offsets.last_address() >= offsets.read_offset());
        assert!(offsets.last_address() <= offsets.wrap_address());
    }
}
