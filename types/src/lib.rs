pub mod audio;
pub mod events;
pub mod telephony;

pub use events::{ClientEvent, ServerEvent};
pub use telephony::{CallIdentifier, InboundMessage, OutboundMessage};
