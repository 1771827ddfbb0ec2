use base64::Engine;

use crate::g711::CompandingLaw;

pub const PCM16_SAMPLE_RATE: u32 = 8000;

pub fn decode(fragment: &str) -> Vec<u8> {
    match base64::engine::general_purpose::STANDARD.decode(fragment) {
        Ok(bytes) => bytes,
        Err(e) => {
            tracing::error!("Failed to decode base64 fragment: {}", e);
            Vec::new()
        }
    }
}

pub fn encode(bytes: &[u8]) -> String {
    base64::engine::general_purpose::STANDARD.encode(bytes)
}

/// Expands companded telephony bytes into little-endian PCM16.
pub fn expand(law: CompandingLaw, companded: &[u8]) -> Vec<u8> {
    companded
        .iter()
        .flat_map(|&code| law.expand(code).to_le_bytes())
        .collect()
}

/// Compresses little-endian PCM16 into telephony bytes. A trailing odd byte is ignored.
pub fn compress(law: CompandingLaw, pcm16: &[u8]) -> Vec<u8> {
    pcm16
        .chunks_exact(2)
        .map(|pair| law.compress(i16::from_le_bytes([pair[0], pair[1]])))
        .collect()
}

/// Decodes a base64 media payload straight to PCM16 bytes.
pub fn decode_companded(law: CompandingLaw, fragment: &str) -> Vec<u8> {
    expand(law, &decode(fragment))
}
