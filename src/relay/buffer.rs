use std::collections::VecDeque;
use std::io::{self, Read};
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};

use crate::error::RelayError;

#[derive(Default)]
struct Inner {
    bytes: VecDeque<u8>,
    closed: bool,
}

/// Unbounded byte pipe between one writer and one blocking reader.
///
/// Bytes written before `close` stay readable; once they are drained every
/// read reports end of stream.
#[derive(Default)]
pub struct AudioRelayBuffer {
    inner: Mutex<Inner>,
    ready: Condvar,
}

impl AudioRelayBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn write(&self, bytes: &[u8]) -> Result<(), RelayError> {
        let mut inner = self.lock();
        if inner.closed {
            return Err(RelayError::ClosedBuffer);
        }
        inner.bytes.extend(bytes);
        drop(inner);
        self.ready.notify_all();
        Ok(())
    }

    /// Blocks until a byte arrives, or returns `None` once closed and drained.
    pub fn next_byte(&self) -> Option<u8> {
        let mut inner = self.wait_readable();
        inner.bytes.pop_front()
    }

    pub fn close(&self) {
        let mut inner = self.lock();
        if !inner.closed {
            inner.closed = true;
            tracing::trace!("relay buffer closed with {} bytes pending", inner.bytes.len());
        }
        drop(inner);
        self.ready.notify_all();
    }

    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }

    pub fn len(&self) -> usize {
        self.lock().bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn wait_readable(&self) -> MutexGuard<'_, Inner> {
        let guard = self.lock();
        self.ready
            .wait_while(guard, |inner| inner.bytes.is_empty() && !inner.closed)
            .unwrap_or_else(PoisonError::into_inner)
    }
}

impl Read for &AudioRelayBuffer {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        let mut inner = self.wait_readable();
        let n = buf.len().min(inner.bytes.len());
        for (slot, byte) in buf.iter_mut().zip(inner.bytes.drain(..n)) {
            *slot = byte;
        }
        Ok(n)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn test_fifo_then_end_of_stream() {
        let buffer = AudioRelayBuffer::new();
        buffer.write(&[1, 2, 3]).unwrap();
        buffer.write(&[4]).unwrap();
        buffer.close();

        let mut reader = &buffer;
        let mut buf = [0u8; 3];
        assert_eq!(reader.read(&mut buf).unwrap(), 3);
        assert_eq!(buf, [1, 2, 3]);
        assert_eq!(buffer.next_byte(), Some(4));
        assert_eq!(buffer.next_byte(), None);
        assert_eq!(buffer.next_byte(), None);
        assert_eq!(reader.read(&mut buf).unwrap(), 0);
        assert_eq!(reader.read(&mut buf).unwrap(), 0);
    }

    #[test]
    fn test_write_after_close_fails() {
        let buffer = AudioRelayBuffer::new();
        buffer.close();
        buffer.close();
        assert!(matches!(buffer.write(&[1]), Err(RelayError::ClosedBuffer)));
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_close_wakes_blocked_reader() {
        let buffer = Arc::new(AudioRelayBuffer::new());
        let reader = {
            let buffer = buffer.clone();
            thread::spawn(move || {
                let mut out = Vec::new();
                while let Some(byte) = buffer.next_byte() {
                    out.push(byte);
                }
                out
            })
        };

        thread::sleep(Duration::from_millis(20));
        buffer.write(&[9, 8]).unwrap();
        thread::sleep(Duration::from_millis(20));
        buffer.write(&[7]).unwrap();
        buffer.close();

        assert_eq!(reader.join().unwrap(), vec![9, 8, 7]);
    }
}
