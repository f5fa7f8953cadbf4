//! G.711 mu-law helpers used to mix the two directions of a call for the listener.

const BIAS: i32 = 0x84;
const CLIP: i32 = 32_635;

/// mu-law byte => 16-bit linear sample, one entry per possible byte.
static DECODE_TABLE: [i16; 256] = build_decode_table();

const fn build_decode_table() -> [i16; 256] {
    let mut table = [0i16; 256];
    let mut i = 0;
    while i < 256 {
        let u = !(i as u8);
        let exponent = (u >> 4) & 0x07;
        let mantissa = (u & 0x0F) as i32;
        let magnitude = (((mantissa << 3) + BIAS) << exponent) - BIAS;
        table[i] = if u & 0x80 != 0 {
            (-magnitude) as i16
        } else {
            magnitude as i16
        };
        i += 1;
    }
    table
}

pub fn decode(byte: u8) -> i16 {
    DECODE_TABLE[byte as usize]
}

/// Encode one linear sample to a mu-law byte.
pub fn encode(sample: i16) -> u8 {
    let mut pcm = sample as i32;
    let sign = if pcm < 0 {
        pcm = -pcm;
        0x80
    } else {
        0
    };
    // keep the biased magnitude inside segment 7
    let pcm = pcm.min(CLIP) + BIAS;
    let mut exponent = 7;
    let mut mask = 0x4000;
    while exponent > 0 && pcm & mask == 0 {
        exponent -= 1;
        mask >>= 1;
    }
    let mantissa = (pcm >> (exponent + 3)) & 0x0F;
    !(sign | (exponent << 4) | mantissa) as u8
}

/// Mix two mu-law buffers sample by sample.  The output is as long as the longer input; the
/// missing tail of the shorter one counts as silence.
pub fn mix(a: &[u8], b: &[u8]) -> Vec<u8> {
    let len = a.len().max(b.len());
    (0..len)
        .map(|i| {
            let sa = a.get(i).map_or(0, |&s| decode(s) as i32);
            let sb = b.get(i).map_or(0, |&s| decode(s) as i32);
            encode((sa + sb).clamp(i16::MIN as i32, i16::MAX as i32) as i16)
        })
        .collect()
}
