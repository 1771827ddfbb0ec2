use std::io;

#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    #[error("write to a closed relay buffer")]
    ClosedBuffer,
    #[error("transcoding failed: {0}")]
    TranscodeIo(#[source] io::Error),
    #[error("single byte reads are not supported")]
    UnsupportedOperation,
    #[error("failed to start worker thread: {0}")]
    ThreadSpawn(#[source] io::Error),
    #[error("event dispatch interrupted: {0}")]
    DispatchInterrupted(String),
    #[error("agent stream fault: {0}")]
    AgentStreamFault(String),
    #[error("telephony channel closed")]
    TelephonyClosed,
}

impl From<io::Error> for RelayError {
    fn from(e: io::Error) -> Self {
        match e.kind() {
            io::ErrorKind::Unsupported => RelayError::UnsupportedOperation,
            _ => RelayError::TranscodeIo(e),
        }
    }
}
