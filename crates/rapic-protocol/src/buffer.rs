//! Resizable byte buffer with separate read and write cursors.
//!
//! The buffer backs the receive path of a rapic connection: socket reads
//! land in space acquired with [`write_acquire`](Buffer::write_acquire),
//! the framer classifies the next complete message with
//! [`read_detect`](Buffer::read_detect), and message decoders consume the
//! unread span returned by [`read_acquire`](Buffer::read_acquire).
//!
//! Storage is contiguous. When trailing space runs out the unread span is
//! shifted to the front if that alone satisfies the request; otherwise the
//! buffer grows, doubling up to the configured maximum size. Growth beyond
//! the maximum fails, which bounds memory per connection.

use rapic_core::{Error, MessageType, Result};

use crate::framer;

/// Byte queue with acquire/commit semantics on both cursors.
#[derive(Debug)]
pub struct Buffer {
    data: Vec<u8>,
    wpos: usize,
    rpos: usize,
    max_size: usize,
}

impl Buffer {
    /// Construct a buffer with an initial capacity and a growth cap.
    ///
    /// `max_size` bounds all future growth; pass [`usize::MAX`] for an
    /// effectively unbounded buffer.
    pub fn new(size: usize, max_size: usize) -> Buffer {
        Buffer {
            data: vec![0; size],
            wpos: 0,
            rpos: 0,
            max_size,
        }
    }

    /// Get the current capacity of the buffer.
    pub fn size(&self) -> usize {
        self.data.len()
    }

    /// Get the maximum capacity the buffer may grow to.
    pub fn max_size(&self) -> usize {
        self.max_size
    }

    /// Get the number of unread bytes.
    pub fn unread(&self) -> usize {
        self.wpos - self.rpos
    }

    /// Discard any unread contents.
    pub fn clear(&mut self) {
        self.wpos = 0;
        self.rpos = 0;
    }

    /// Change the buffer capacity, preserving unread data.
    ///
    /// Fails with [`Error::InvalidState`] if the new capacity cannot hold
    /// the unread span.
    pub fn resize(&mut self, size: usize) -> Result<()> {
        let unread = self.unread();
        if size < unread {
            return Err(Error::InvalidState("buffer resize would discard unread data"));
        }
        if size == self.data.len() {
            return Ok(());
        }

        let mut data = vec![0; size];
        data[..unread].copy_from_slice(&self.data[self.rpos..self.wpos]);
        self.data = data;
        self.wpos = unread;
        self.rpos = 0;
        Ok(())
    }

    /// Shift unread data to the front of the buffer.
    pub fn optimize(&mut self) {
        if self.rpos != 0 {
            self.data.copy_within(self.rpos..self.wpos, 0);
            self.wpos -= self.rpos;
            self.rpos = 0;
        }
    }

    /// Acquire contiguous space for writing at least `min_space` bytes.
    ///
    /// Compacts or grows the buffer as required. Fails with
    /// [`Error::BufferOverflow`] if satisfying the request would exceed the
    /// maximum size. The returned slice may be longer than `min_space`;
    /// commit what was actually written with
    /// [`write_advance`](Buffer::write_advance).
    pub fn write_acquire(&mut self, min_space: usize) -> Result<&mut [u8]> {
        let space = self.data.len() - self.wpos;
        if space < min_space {
            let min_size = self.unread() + min_space;
            if min_size > self.max_size {
                return Err(Error::BufferOverflow);
            }
            if space + self.rpos < min_space {
                let target = (self.data.len() * 2).max(min_size).min(self.max_size);
                self.resize(target)?;
            } else {
                self.optimize();
            }
        } else if space == 0 {
            // a full fixed-size buffer part way through a message can only
            // clear itself by shuffling, since no read_advance will come
            self.optimize();
        }
        Ok(&mut self.data[self.wpos..])
    }

    /// Advance the write cursor after writing `len` bytes into the slice
    /// returned by [`write_acquire`](Buffer::write_acquire).
    ///
    /// # Panics
    ///
    /// Panics if `len` exceeds the acquired space.
    pub fn write_advance(&mut self, len: usize) {
        assert!(
            self.wpos + len <= self.data.len(),
            "buffer overflow detected on write operation"
        );
        self.wpos += len;
    }

    /// Append a byte slice, acquiring the space it needs.
    pub fn write_all(&mut self, bytes: &[u8]) -> Result<()> {
        let space = self.write_acquire(bytes.len())?;
        space[..bytes.len()].copy_from_slice(bytes);
        self.write_advance(bytes.len());
        Ok(())
    }

    /// Get the unread span of the buffer.
    ///
    /// This allows direct reading from the buffer, useful where there is no
    /// need to decode the rapic data (such as data logging).
    pub fn read_acquire(&self) -> &[u8] {
        &self.data[self.rpos..self.wpos]
    }

    /// Advance the read cursor by `len` bytes.
    ///
    /// When the cursors meet, both reset to the front of the buffer.
    ///
    /// # Panics
    ///
    /// Panics if `len` exceeds the unread span.
    pub fn read_advance(&mut self, len: usize) {
        assert!(
            self.rpos + len <= self.wpos,
            "buffer overflow detected on read operation"
        );
        self.rpos += len;
        if self.rpos == self.wpos {
            self.rpos = 0;
            self.wpos = 0;
        }
    }

    /// Determine whether a complete message is waiting in the buffer, and
    /// if so its type and length (terminator included).
    ///
    /// The scan does not mutate the buffer: calling this any number of
    /// times without [`read_advance`](Buffer::read_advance) reports the
    /// same message. `Ok(None)` means more data is needed; if no message
    /// can be framed once the unread span has reached the maximum buffer
    /// size the caller could otherwise wait forever, so that case fails
    /// with [`Error::BufferOverflow`].
    pub fn read_detect(&self) -> Result<Option<(MessageType, usize)>> {
        match framer::detect(self.read_acquire()) {
            Some(found) => Ok(Some(found)),
            None if self.unread() >= self.max_size => Err(Error::BufferOverflow),
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write_then_read() {
        let mut buf = Buffer::new(16, usize::MAX);
        buf.write_all(b"RDRSTAT:\n").unwrap();
        assert_eq!(buf.read_acquire(), b"RDRSTAT:\n");
        assert_eq!(buf.unread(), 9);

        buf.read_advance(9);
        assert_eq!(buf.unread(), 0);
        assert!(buf.read_acquire().is_empty());
    }

    #[test]
    fn cursors_reset_when_drained() {
        let mut buf = Buffer::new(8, usize::MAX);
        buf.write_all(b"abcdef").unwrap();
        buf.read_advance(3);
        buf.read_advance(3);
        // both cursors are back at the front: the full capacity is writable
        assert_eq!(buf.write_acquire(0).unwrap().len(), 8);
    }

    #[test]
    fn optimize_shifts_unread_data() {
        let mut buf = Buffer::new(8, 8);
        buf.write_all(b"abcdef").unwrap();
        buf.read_advance(4);
        buf.optimize();
        assert_eq!(buf.read_acquire(), b"ef");
        // the freed space is writable again without growing
        assert_eq!(buf.write_acquire(6).unwrap().len(), 6);
    }

    #[test]
    fn growth_doubles_capacity() {
        let mut buf = Buffer::new(4, usize::MAX);
        buf.write_all(b"abcd").unwrap();
        buf.write_all(b"ef").unwrap();
        assert_eq!(buf.size(), 8);
        assert_eq!(buf.read_acquire(), b"abcdef");
    }

    #[test]
    fn growth_satisfies_large_requests() {
        let mut buf = Buffer::new(4, usize::MAX);
        buf.write_all(b"ab").unwrap();
        let space = buf.write_acquire(100).unwrap();
        assert!(space.len() >= 100);
        assert_eq!(buf.read_acquire(), b"ab");
    }

    #[test]
    fn growth_respects_max_size() {
        let mut buf = Buffer::new(4, 8);
        buf.write_all(b"abcd").unwrap();
        buf.write_all(b"efgh").unwrap();
        assert_eq!(buf.size(), 8);
        assert!(matches!(
            buf.write_acquire(1),
            Err(Error::BufferOverflow)
        ));
    }

    #[test]
    fn compaction_preferred_over_growth() {
        let mut buf = Buffer::new(8, 8);
        buf.write_all(b"abcdefgh").unwrap();
        buf.read_advance(6);
        // only compaction can satisfy this; growth is capped
        let space = buf.write_acquire(4).unwrap();
        assert!(space.len() >= 4);
        assert_eq!(buf.read_acquire(), b"gh");
    }

    #[test]
    fn resize_refuses_to_discard_unread() {
        let mut buf = Buffer::new(8, usize::MAX);
        buf.write_all(b"abcdef").unwrap();
        assert!(matches!(buf.resize(4), Err(Error::InvalidState(_))));
        buf.resize(6).unwrap();
        assert_eq!(buf.read_acquire(), b"abcdef");
    }

    #[test]
    fn clear_discards_unread() {
        let mut buf = Buffer::new(8, usize::MAX);
        buf.write_all(b"abc").unwrap();
        buf.clear();
        assert_eq!(buf.unread(), 0);
    }

    #[test]
    fn detect_is_non_destructive() {
        let mut buf = Buffer::new(64, usize::MAX);
        buf.write_all(b"RDRSTAT:\nMSSG: 1 hello\n").unwrap();
        for _ in 0..3 {
            let (kind, len) = buf.read_detect().unwrap().unwrap();
            assert_eq!(kind, MessageType::Status);
            assert_eq!(len, 9);
        }
        buf.read_advance(9);
        let (kind, len) = buf.read_detect().unwrap().unwrap();
        assert_eq!(kind, MessageType::Mssg);
        assert_eq!(len, 14);
    }

    #[test]
    fn detect_incomplete_returns_none() {
        let mut buf = Buffer::new(64, usize::MAX);
        buf.write_all(b"RDRSTAT:").unwrap();
        assert!(buf.read_detect().unwrap().is_none());
    }

    #[test]
    fn detect_at_max_size_overflows() {
        // an unterminated scan that fills the buffer to its cap can never
        // complete; the caller must not be left polling forever
        let mut buf = Buffer::new(8, 32);
        buf.write_all(b"STNID: 64\nPRODUCT: VOLUMETRIC ").unwrap();
        buf.write_all(b"xx").unwrap();
        assert_eq!(buf.unread(), 32);
        assert!(matches!(buf.read_detect(), Err(Error::BufferOverflow)));
    }
}
