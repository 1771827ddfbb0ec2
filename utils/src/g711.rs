//! G.711 companding between 16-bit linear PCM and 8-bit telephony samples.

const CLIP: i32 = 32635;
const MULAW_BIAS: i32 = 0x84;

const MULAW_EXPONENTS: [u8; 256] = {
    let mut table = [0u8; 256];
    let mut i = 2;
    while i < 256 {
        table[i] = 7 - (i as u8).leading_zeros() as u8;
        i += 1;
    }
    table
};

const ALAW_EXPONENTS: [u8; 128] = {
    let mut table = [0u8; 128];
    let mut i = 0;
    while i < 128 {
        table[i] = if i == 0 { 1 } else { 8 - (i as u8).leading_zeros() as u8 };
        i += 1;
    }
    table
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompandingLaw {
    MuLaw,
    ALaw,
}

impl CompandingLaw {
    pub fn compress(&self, sample: i16) -> u8 {
        match self {
            CompandingLaw::MuLaw => compress_mulaw(sample),
            CompandingLaw::ALaw => compress_alaw(sample),
        }
    }

    pub fn expand(&self, code: u8) -> i16 {
        match self {
            CompandingLaw::MuLaw => expand_mulaw(code),
            CompandingLaw::ALaw => expand_alaw(code),
        }
    }
}

pub fn compress_mulaw(sample: i16) -> u8 {
    let mut s = sample as i32;
    let sign = (s >> 8) & 0x80;
    if sign != 0 {
        s = -s;
    }
    s = s.min(CLIP) + MULAW_BIAS;

    let exponent = MULAW_EXPONENTS[((s >> 7) & 0xFF) as usize] as i32;
    let mantissa = (s >> (exponent + 3)) & 0x0F;
    !((sign | (exponent << 4) | mantissa) as u8)
}

pub fn expand_mulaw(code: u8) -> i16 {
    let code = !code;
    let exponent = ((code >> 4) & 0x07) as i32;
    let mantissa = (code & 0x0F) as i32;
    let magnitude = (((mantissa << 3) + MULAW_BIAS) << exponent) - MULAW_BIAS;
    if code & 0x80 != 0 {
        -magnitude as i16
    } else {
        magnitude as i16
    }
}

pub fn compress_alaw(sample: i16) -> u8 {
    let mut s = sample as i32;
    // set for non-negative samples
    let sign = (!s >> 8) & 0x80;
    if sign == 0 {
        s = -s;
    }
    s = s.min(CLIP);

    let code = if s >= 256 {
        let exponent = ALAW_EXPONENTS[((s >> 8) & 0x7F) as usize] as i32;
        let mantissa = (s >> (exponent + 3)) & 0x0F;
        ((exponent << 4) | mantissa) & 0x7F
    } else {
        s >> 4
    };
    (code ^ (sign ^ 0x55)) as u8
}

pub fn expand_alaw(code: u8) -> i16 {
    let code = code ^ 0x55;
    let exponent = ((code >> 4) & 0x07) as i32;
    let mantissa = ((code & 0x0F) as i32) << 4;
    let magnitude = match exponent {
        0 => mantissa + 8,
        _ => (mantissa + 0x108) << (exponent - 1),
    };
    if code & 0x80 != 0 {
        magnitude as i16
    } else {
        -magnitude as i16
    }
}
