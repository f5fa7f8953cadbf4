use crate::consts::{MULAW_CONTENT_TYPE, SAMPLE_RATE};
use crate::plivo_types::{OutboundMediaMeta, PlivoOutbound};

use base64::{engine, Engine};
use uuid::Uuid;

/// Prepare a `playAudio` frame carrying raw mu-law bytes for the given stream.
pub fn mulaw2plivo(chunk: &[u8], stream_id: &str) -> PlivoOutbound {
    PlivoOutbound::PlayAudio {
        media: OutboundMediaMeta {
            content_type: MULAW_CONTENT_TYPE.to_string(),
            sample_rate: SAMPLE_RATE,
            payload: engine::general_purpose::STANDARD.encode(chunk),
        },
        stream_id: Some(stream_id.to_string()),
    }
}

pub fn b64_decode(enc: &str) -> Result<Vec<u8>, base64::DecodeError> {
    engine::general_purpose::STANDARD.decode(enc)
}

/// First eight characters of a v4 uuid.
pub fn short_id() -> String {
    let mut id = Uuid::new_v4().simple().to_string();
    id.truncate(8);
    id
}

/// Convert any phone format to E.164.  Bare ten digit numbers are assumed to be North American.
pub fn normalize_phone_number(phone: &str) -> String {
    let mut digits: String = phone.chars().filter(|c| c.is_ascii_digit()).collect();
    if digits.len() == 10 {
        digits.insert(0, '1');
    }
    format!("+{digits}")
}
