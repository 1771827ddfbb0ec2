//! The audio relay engine: byte pipes between the two legs of a call, the
//! credit-based publisher towards the agent, playback towards the caller and
//! the per-call dialog state.

pub mod buffer;
pub mod playback;
pub mod publisher;
pub mod state;

pub use buffer::AudioRelayBuffer;
pub use playback::{PlaybackController, PlaybackOutcome, PlaybackPhase};
pub use publisher::{CreditPublisher, EventSink};
pub use state::{MarkOutcome, PlaybackLabel, SessionStateMachine};
