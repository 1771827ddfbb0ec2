use std::io::Read;
use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::JoinHandle;

use call_relay_types::telephony::{ClearMessage, MarkMessage, MediaMessage};
use call_relay_types::OutboundMessage;
use call_relay_utils::audio;
use call_relay_utils::g711::CompandingLaw;
use call_relay_utils::transcode::FrameTranscoder;
use tokio::sync::mpsc::UnboundedSender;

use crate::error::RelayError;
use crate::relay::buffer::AudioRelayBuffer;
use crate::relay::state::{PlaybackLabel, SessionStateMachine};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum PlaybackPhase {
    Idle = 0,
    Streaming = 1,
    EndOfUtterance = 2,
    Interrupted = 3,
}

impl From<u8> for PlaybackPhase {
    fn from(value: u8) -> Self {
        match value {
            1 => PlaybackPhase::Streaming,
            2 => PlaybackPhase::EndOfUtterance,
            3 => PlaybackPhase::Interrupted,
            _ => PlaybackPhase::Idle,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlaybackOutcome {
    /// The utterance played out. Carries the label sent in the closing mark,
    /// if one could be minted.
    Completed(Option<PlaybackLabel>),
    Interrupted,
}

/// Streams agent speech to the telephony side as companded media frames.
///
/// Interruption is an epoch: each `play` remembers the epoch it started in
/// and stops once `interrupt` has moved it on. Frames and marks are checked
/// against the epoch and sent under `gate`, so nothing from an interrupted
/// utterance follows its `clear`.
pub struct PlaybackController {
    stream_sid: String,
    law: CompandingLaw,
    frame_sample_limit: usize,
    telephony: UnboundedSender<OutboundMessage>,
    state: Arc<SessionStateMachine>,
    epoch: AtomicU64,
    phase: AtomicU8,
    gate: Mutex<()>,
}

impl PlaybackController {
    pub fn new(
        stream_sid: &str,
        law: CompandingLaw,
        frame_sample_limit: usize,
        telephony: UnboundedSender<OutboundMessage>,
        state: Arc<SessionStateMachine>,
    ) -> Self {
        Self {
            stream_sid: stream_sid.to_string(),
            law,
            frame_sample_limit,
            telephony,
            state,
            epoch: AtomicU64::new(0),
            phase: AtomicU8::new(PlaybackPhase::Idle as u8),
            gate: Mutex::new(()),
        }
    }

    pub fn phase(&self) -> PlaybackPhase {
        PlaybackPhase::from(self.phase.load(Ordering::SeqCst))
    }

    fn set_phase(&self, phase: PlaybackPhase) {
        self.phase.store(phase as u8, Ordering::SeqCst);
    }

    fn gate(&self) -> MutexGuard<'_, ()> {
        self.gate.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn interrupted_since(&self, epoch: u64) -> bool {
        self.epoch.load(Ordering::SeqCst) != epoch
    }

    fn send(&self, message: OutboundMessage) -> Result<(), RelayError> {
        self.telephony
            .send(message)
            .map_err(|_| RelayError::TelephonyClosed)
    }

    fn finish_interrupted(&self) -> PlaybackOutcome {
        self.set_phase(PlaybackPhase::Interrupted);
        tracing::debug!("stream {}: playback interrupted", self.stream_sid);
        self.set_phase(PlaybackPhase::Idle);
        PlaybackOutcome::Interrupted
    }

    /// Plays one utterance from `source` and closes it with a mark.
    pub fn play<R: Read>(&self, source: R) -> Result<PlaybackOutcome, RelayError> {
        let epoch = self.epoch.load(Ordering::SeqCst);
        self.set_phase(PlaybackPhase::Streaming);
        let result = self.stream(source, epoch);
        if result.is_err() {
            self.set_phase(PlaybackPhase::Idle);
        }
        result
    }

    fn stream<R: Read>(&self, source: R, epoch: u64) -> Result<PlaybackOutcome, RelayError> {
        let mut transcoder = FrameTranscoder::new(source, self.law);
        let mut frames = 0usize;

        loop {
            if self.interrupted_since(epoch) {
                return Ok(self.finish_interrupted());
            }
            let frame = match transcoder.fill(self.frame_sample_limit) {
                Ok(Some(frame)) => frame,
                Ok(None) => break,
                Err(e) => {
                    tracing::error!("stream {}: aborting utterance: {}", self.stream_sid, e);
                    return Err(RelayError::TranscodeIo(e));
                }
            };
            if frame.is_empty() {
                continue;
            }
            // the fill may have blocked across an interruption
            let gate = self.gate();
            if self.interrupted_since(epoch) {
                drop(gate);
                return Ok(self.finish_interrupted());
            }
            tracing::trace!("stream {}: media frame of {} samples", self.stream_sid, frame.len());
            self.send(OutboundMessage::Media(MediaMessage::new(
                &self.stream_sid,
                audio::encode(&frame),
            )))?;
            drop(gate);
            frames += 1;
        }

        if self.interrupted_since(epoch) {
            return Ok(self.finish_interrupted());
        }
        self.set_phase(PlaybackPhase::EndOfUtterance);

        let label = self.state.mint_label();
        if let Some(minted) = &label {
            let _gate = self.gate();
            if self.interrupted_since(epoch) {
                self.state.release_label(minted);
                return Ok(self.finish_interrupted());
            }
            self.send(OutboundMessage::Mark(MarkMessage::new(
                &self.stream_sid,
                minted.as_str(),
            )))?;
        }
        tracing::debug!(
            "stream {}: utterance done after {} frames, mark {:?}",
            self.stream_sid,
            frames,
            label.as_ref().map(|l| l.as_str())
        );
        self.set_phase(PlaybackPhase::Idle);
        Ok(PlaybackOutcome::Completed(label))
    }

    /// Stops the utterance in flight, if any, and tells the telephony side to
    /// drop audio it has not played yet. Waits at most for one frame send on
    /// the playback thread, never for the utterance.
    pub fn interrupt(&self) -> Result<(), RelayError> {
        let _gate = self.gate();
        self.epoch.fetch_add(1, Ordering::SeqCst);
        if let Some(label) = self.state.clear_label() {
            tracing::debug!("stream {}: dropping label {}", self.stream_sid, label);
        }
        self.send(OutboundMessage::Clear(ClearMessage::new(&self.stream_sid)))
    }

    /// Plays `buffer` on a dedicated thread until it is closed and drained.
    pub fn play_in_background(
        self: &Arc<Self>,
        buffer: Arc<AudioRelayBuffer>,
    ) -> Result<JoinHandle<()>, RelayError> {
        let controller = self.clone();
        std::thread::Builder::new()
            .name(format!("playback-{}", self.stream_sid))
            .spawn(move || match controller.play(&*buffer) {
                Ok(outcome) => {
                    tracing::debug!("stream {}: playback {:?}", controller.stream_sid, outcome)
                }
                Err(e) => tracing::error!("stream {}: playback failed: {}", controller.stream_sid, e),
            })
            .map_err(RelayError::ThreadSpawn)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::call::events::EventFactory;
    use crate::relay::publisher::CreditPublisher;
    use call_relay_types::{CallIdentifier, ClientEvent};
    use std::io;
    use tokio::sync::mpsc::{self, UnboundedReceiver};

    fn controller() -> (Arc<PlaybackController>, UnboundedReceiver<OutboundMessage>) {
        let publisher = CreditPublisher::spawn("playback-test", |_: ClientEvent| -> Result<(), RelayError> {
            Ok(())
        })
        .unwrap();
        let state = Arc::new(SessionStateMachine::new(
            CallIdentifier::new("AC1", "CA1", "MZ1"),
            Arc::new(publisher),
            Arc::new(EventFactory::new()),
        ));
        let (tx, rx) = mpsc::unbounded_channel();
        let controller = PlaybackController::new("MZ1", CompandingLaw::MuLaw, 5000, tx, state);
        (Arc::new(controller), rx)
    }

    struct Broken;

    // yields one byte per read so the utterance takes many frames
    struct Trickle(usize);

    impl Read for Trickle {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            if self.0 == 0 || buf.is_empty() {
                return Ok(0);
            }
            self.0 -= 1;
            buf[0] = 0;
            Ok(1)
        }
    }

    impl Read for Broken {
        fn read(&mut self, _: &mut [u8]) -> io::Result<usize> {
            Err(io::Error::new(io::ErrorKind::BrokenPipe, "gone"))
        }
    }

    #[test]
    fn test_chunks_then_single_mark() {
        let (controller, mut rx) = controller();
        let buffer = Arc::new(AudioRelayBuffer::new());
        let handle = controller.play_in_background(buffer.clone()).unwrap();

        buffer.write(&[0u8; 320]).unwrap();
        let Some(OutboundMessage::Media(first)) = rx.blocking_recv() else {
            panic!("expected a media frame");
        };
        assert_eq!(audio::decode(first.payload()).len(), 160);

        buffer.write(&[0u8; 160]).unwrap();
        buffer.close();
        handle.join().unwrap();

        let Some(OutboundMessage::Media(second)) = rx.blocking_recv() else {
            panic!("expected a media frame");
        };
        assert_eq!(audio::decode(second.payload()).len(), 80);
        let Some(OutboundMessage::Mark(mark)) = rx.blocking_recv() else {
            panic!("expected a mark");
        };
        assert_eq!(
            controller.state.outstanding_label().unwrap().as_str(),
            mark.name()
        );
        assert!(rx.try_recv().is_err());
        assert_eq!(controller.phase(), PlaybackPhase::Idle);
    }

    #[test]
    fn test_interrupt_sends_clear_and_no_mark() {
        let (controller, mut rx) = controller();
        let buffer = Arc::new(AudioRelayBuffer::new());
        let handle = controller.play_in_background(buffer.clone()).unwrap();

        buffer.write(&[1u8; 64]).unwrap();
        assert!(matches!(rx.blocking_recv(), Some(OutboundMessage::Media(_))));

        controller.interrupt().unwrap();
        buffer.write(&[2u8; 64]).unwrap();
        buffer.close();
        handle.join().unwrap();

        assert!(matches!(rx.blocking_recv(), Some(OutboundMessage::Clear(_))));
        assert!(rx.try_recv().is_err());
        assert!(controller.state.outstanding_label().is_none());
    }

    #[test]
    fn test_interrupt_is_not_sticky() {
        let (controller, mut rx) = controller();
        controller.interrupt().unwrap();

        let buffer = AudioRelayBuffer::new();
        buffer.write(&[0u8; 4]).unwrap();
        buffer.close();
        let outcome = controller.play(&buffer).unwrap();
        assert!(matches!(outcome, PlaybackOutcome::Completed(Some(_))));

        assert!(matches!(rx.try_recv(), Ok(OutboundMessage::Clear(_))));
        assert!(matches!(rx.try_recv(), Ok(OutboundMessage::Media(_))));
        assert!(matches!(rx.try_recv(), Ok(OutboundMessage::Mark(_))));
    }

    #[test]
    fn test_empty_utterance_is_just_a_mark() {
        let (controller, mut rx) = controller();
        let buffer = AudioRelayBuffer::new();
        buffer.close();

        let outcome = controller.play(&buffer).unwrap();
        assert!(matches!(outcome, PlaybackOutcome::Completed(Some(_))));
        assert!(matches!(rx.try_recv(), Ok(OutboundMessage::Mark(_))));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_second_utterance_skips_mark_while_label_outstanding() {
        let (controller, mut rx) = controller();
        for _ in 0..2 {
            let buffer = AudioRelayBuffer::new();
            buffer.close();
            controller.play(&buffer).unwrap();
        }
        assert!(matches!(rx.try_recv(), Ok(OutboundMessage::Mark(_))));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_transcode_failure_aborts_without_mark() {
        let (controller, mut rx) = controller();
        let result = controller.play(Broken);
        assert!(matches!(result, Err(RelayError::TranscodeIo(_))));
        assert!(rx.try_recv().is_err());
        assert!(controller.state.outstanding_label().is_none());
        assert_eq!(controller.phase(), PlaybackPhase::Idle);
    }

    #[test]
    fn test_closed_telephony_aborts() {
        let (controller, rx) = controller();
        drop(rx);
        let buffer = AudioRelayBuffer::new();
        buffer.write(&[0u8; 8]).unwrap();
        buffer.close();
        assert!(matches!(
            controller.play(&buffer),
            Err(RelayError::TelephonyClosed)
        ));
    }

    #[test]
    fn test_nothing_follows_clear_when_interrupt_races_playback() {
        for round in 0..50 {
            let (controller, mut rx) = controller();
            let player = {
                let controller = controller.clone();
                std::thread::spawn(move || controller.play(Trickle(round * 4)).unwrap())
            };
            // once streaming, `play` has captured its epoch
            while controller.phase() == PlaybackPhase::Idle && !player.is_finished() {
                std::thread::yield_now();
            }
            controller.interrupt().unwrap();
            let outcome = player.join().unwrap();

            let mut sent = Vec::new();
            while let Ok(message) = rx.try_recv() {
                sent.push(message);
            }
            let clear = sent
                .iter()
                .position(|m| matches!(m, OutboundMessage::Clear(_)))
                .unwrap();
            assert_eq!(clear, sent.len() - 1, "frames after clear in round {round}");
            if outcome == PlaybackOutcome::Interrupted {
                assert!(!sent.iter().any(|m| matches!(m, OutboundMessage::Mark(_))));
            }
            assert!(controller.state.outstanding_label().is_none());
        }
    }
}
