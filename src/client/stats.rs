#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
pub struct Stats {
    events_sent: u64,
    audio_chunks_received: u64,
    exceptions: u64,
}

impl Stats {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn record_sent(&mut self) {
        self.events_sent += 1;
    }

    pub(crate) fn record_audio_chunk(&mut self) {
        self.audio_chunks_received += 1;
    }

    pub(crate) fn record_exception(&mut self) {
        self.exceptions += 1;
    }

    pub fn events_sent(&self) -> u64 {
        self.events_sent
    }

    pub fn audio_chunks_received(&self) -> u64 {
        self.audio_chunks_received
    }

    pub fn exceptions(&self) -> u64 {
        self.exceptions
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters() {
        let mut stats = Stats::new();
        stats.record_sent();
        stats.record_sent();
        stats.record_audio_chunk();
        assert_eq!(stats.events_sent(), 2);
        assert_eq!(stats.audio_chunks_received(), 1);
        assert_eq!(stats.exceptions(), 0);
    }
}
