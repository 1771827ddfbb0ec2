use std::io::{self, Read};

use crate::g711::CompandingLaw;

/// Pulls little-endian PCM16 from a byte source and hands it out companded,
/// one byte per sample.
pub struct FrameTranscoder<R: Read> {
    source: R,
    law: CompandingLaw,
    // odd byte left over from the previous read
    carry: Option<u8>,
}

impl<R: Read> FrameTranscoder<R> {
    pub fn new(source: R, law: CompandingLaw) -> Self {
        Self {
            source,
            law,
            carry: None,
        }
    }

    pub fn law(&self) -> CompandingLaw {
        self.law
    }

    /// Reads at most `max_samples` samples with a single read on the source.
    ///
    /// Returns `Ok(None)` once the source is exhausted. A frame may come back
    /// empty when the read produced only half a sample.
    pub fn fill(&mut self, max_samples: usize) -> io::Result<Option<Vec<u8>>> {
        if max_samples == 0 {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "frame must hold at least one sample",
            ));
        }

        let mut raw = vec![0u8; max_samples * 2];
        let offset = match self.carry.take() {
            Some(byte) => {
                raw[0] = byte;
                1
            }
            None => 0,
        };

        let read = loop {
            match self.source.read(&mut raw[offset..]) {
                Ok(n) => break n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        };

        if read == 0 {
            if offset == 1 {
                tracing::warn!("dropping half a sample at end of stream");
            }
            return Ok(None);
        }

        let total = offset + read;
        if total % 2 == 1 {
            self.carry = Some(raw[total - 1]);
        }

        let frame = raw[..total - total % 2]
            .chunks_exact(2)
            .map(|pair| self.law.compress(i16::from_le_bytes([pair[0], pair[1]])))
            .collect();
        Ok(Some(frame))
    }
}

impl<R: Read> Read for FrameTranscoder<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.len() == 1 {
            return Err(io::Error::new(
                io::ErrorKind::Unsupported,
                "single byte reads are not supported",
            ));
        }
        if buf.is_empty() {
            return Ok(0);
        }

        loop {
            match self.fill(buf.len())? {
                None => return Ok(0),
                Some(frame) if frame.is_empty() => continue,
                Some(frame) => {
                    buf[..frame.len()].copy_from_slice(&frame);
                    return Ok(frame.len());
                }
            }
        }
    }
}
