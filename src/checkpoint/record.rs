//! Checkpoint record format.
//!
//! Wire layout of one record: `[len:u32 big-endian][JSON body]`.
//! The log is a plain concatenation of records, so it can always be appended
//! to without rewriting anything already on disk.

use crate::models::{CourierError, Result, StatusUpdate, UpdateUuid};
use serde::{Deserialize, Serialize};

/// Size of the length prefix in bytes.
const LEN_PREFIX: usize = 4;

/// Largest record body accepted. A status update is a few KB at most, so a
/// longer length prefix can only come from corruption.
pub const MAX_RECORD_LEN: usize = 1 << 20;

/// One durable entry of a task's update log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CheckpointRecord {
    /// A status update was accepted; carries the full payload.
    Update { update: StatusUpdate },
    /// The update with this uuid was acknowledged.
    Ack { uuid: UpdateUuid },
}

impl CheckpointRecord {
    pub fn uuid(&self) -> UpdateUuid {
        match self {
            Self::Update { update } => update.uuid,
            Self::Ack { uuid } => *uuid,
        }
    }

    /// Record type name as logged.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Update { .. } => "UPDATE",
            Self::Ack { .. } => "ACK",
        }
    }

    /// Encode into a self-delimited frame.
    pub fn encode(&self) -> Result<Vec<u8>> {
        let body = serde_json::to_vec(self)
            .map_err(|e| CourierError::Internal(format!("Serializing checkpoint record: {e}")))?;
        if body.len() > MAX_RECORD_LEN {
            return Err(CourierError::Internal(format!(
                "Checkpoint record too large: {} bytes",
                body.len()
            )));
        }
        let len = body.len() as u32;

        let mut out = Vec::with_capacity(LEN_PREFIX + body.len());
        out.extend_from_slice(&len.to_be_bytes());
        out.extend_from_slice(&body);
        Ok(out)
    }
}

/// Records decoded from a log buffer.
#[derive(Debug, Default)]
pub struct DecodedRecords {
    /// Complete records in file order
    pub records: Vec<CheckpointRecord>,
    /// Byte offset just past the last complete record
    pub valid_len: u64,
    /// Whether bytes of an incomplete record follow `valid_len`
    pub truncated_tail: bool,
}

/// Decode every complete record in `buf`.
///
/// An incomplete trailing frame (crash mid-append) is reported through
/// `truncated_tail` rather than as an error. Anything else that does not
/// decode is corruption and fails with [`CourierError::Parse`]:
/// - a complete frame whose body does not parse
/// - a length prefix above [`MAX_RECORD_LEN`]
/// - a short final frame whose bytes are not the start of one JSON record
pub fn decode_all(buf: &[u8]) -> Result<DecodedRecords> {
    let mut decoded = DecodedRecords::default();
    let mut offset = 0usize;

    while offset < buf.len() {
        let remaining = &buf[offset..];
        if remaining.len() < LEN_PREFIX {
            decoded.truncated_tail = true;
            break;
        }

        let body_len =
            u32::from_be_bytes([remaining[0], remaining[1], remaining[2], remaining[3]]) as usize;
        if body_len > MAX_RECORD_LEN {
            return Err(CourierError::Parse(format!(
                "Invalid checkpoint record length {body_len} at offset {offset}"
            )));
        }
        if remaining.len() < LEN_PREFIX + body_len {
            check_partial_body(&remaining[LEN_PREFIX..], offset)?;
            decoded.truncated_tail = true;
            break;
        }

        let body = &remaining[LEN_PREFIX..LEN_PREFIX + body_len];
        let record: CheckpointRecord = serde_json::from_slice(body).map_err(|e| {
            CourierError::Parse(format!("Invalid checkpoint record at offset {offset}: {e}"))
        })?;

        decoded.records.push(record);
        offset += LEN_PREFIX + body_len;
        decoded.valid_len = offset as u64;
    }

    Ok(decoded)
}

/// An interrupted append leaves a prefix of one JSON object. If the short
/// bytes hold a whole value, or trailing bytes of later frames, the length
/// prefix itself is damaged.
fn check_partial_body(partial: &[u8], offset: usize) -> Result<()> {
    match serde_json::from_slice::<serde_json::Value>(partial) {
        Err(e) if e.is_eof() => Ok(()),
        _ => Err(CourierError::Parse(format!(
            "Damaged checkpoint record at offset {offset}: length exceeds the log"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{FrameworkId, TaskId, TaskState, TaskStatus};

    fn update() -> StatusUpdate {
        StatusUpdate::new(
            FrameworkId::new("f1"),
            TaskStatus::new(TaskId::new("t1"), TaskState::Running),
        )
    }

    #[test]
    fn test_ack_record_carries_only_uuid() {
        let uuid = UpdateUuid::new_v4();
        let frame = CheckpointRecord::Ack { uuid }.encode().unwrap();
        let body: serde_json::Value = serde_json::from_slice(&frame[LEN_PREFIX..]).unwrap();
        assert_eq!(body["type"], "ack");
        assert_eq!(body["uuid"], uuid.to_string());
        assert_eq!(body.as_object().unwrap().len(), 2);
    }

    #[test]
    fn test_decode_sequence_of_frames() {
        let u = update();
        let mut buf = CheckpointRecord::Update { update: u.clone() }.encode().unwrap();
        buf.extend(CheckpointRecord::Ack { uuid: u.uuid }.encode().unwrap());

        let decoded = decode_all(&buf).unwrap();
        assert_eq!(decoded.records.len(), 2);
        assert_eq!(decoded.records[0], CheckpointRecord::Update { update: u.clone() });
        assert_eq!(decoded.records[1].kind(), "ACK");
        assert_eq!(decoded.valid_len, buf.len() as u64);
        assert!(!decoded.truncated_tail);
    }

    #[test]
    fn test_partial_trailing_frame_is_reported_not_failed() {
        let first = CheckpointRecord::Update { update: update() }.encode().unwrap();
        let second = CheckpointRecord::Update { update: update() }.encode().unwrap();

        let mut buf = first.clone();
        buf.extend_from_slice(&second[..second.len() / 2]);

        let decoded = decode_all(&buf).unwrap();
        assert_eq!(decoded.records.len(), 1);
        assert_eq!(decoded.valid_len, first.len() as u64);
        assert!(decoded.truncated_tail);

        // Not even a full length prefix.
        let decoded = decode_all(&second[..2]).unwrap();
        assert!(decoded.records.is_empty());
        assert_eq!(decoded.valid_len, 0);
        assert!(decoded.truncated_tail);
    }

    #[test]
    fn test_oversized_length_prefix_is_an_error() {
        let mut buf = CheckpointRecord::Update { update: update() }.encode().unwrap();
        let second = CheckpointRecord::Update { update: update() }.encode().unwrap();
        let at = buf.len();
        buf.extend_from_slice(&second);
        buf[at] = 0x7f;

        let err = decode_all(&buf).unwrap_err();
        assert!(matches!(err, CourierError::Parse(_)));
        assert!(err.to_string().contains(&format!("offset {at}")));
    }

    #[test]
    fn test_overlong_prefix_in_the_middle_is_an_error() {
        let mut buf = CheckpointRecord::Update { update: update() }.encode().unwrap();
        let at = buf.len();
        let mut second = CheckpointRecord::Update { update: update() }.encode().unwrap();
        let third = CheckpointRecord::Ack { uuid: UpdateUuid::new_v4() }.encode().unwrap();

        // Within the cap, but reaching past the end of the log.
        let claimed = (second.len() + third.len()) as u32;
        second[..LEN_PREFIX].copy_from_slice(&claimed.to_be_bytes());
        buf.extend_from_slice(&second);
        buf.extend_from_slice(&third);

        assert!(matches!(decode_all(&buf), Err(CourierError::Parse(_))));
        assert!(decode_all(&buf[..at]).is_ok());
    }

    #[test]
    fn test_prefix_alone_is_a_partial_tail() {
        let frame = CheckpointRecord::Ack { uuid: UpdateUuid::new_v4() }.encode().unwrap();
        let decoded = decode_all(&frame[..LEN_PREFIX]).unwrap();
        assert!(decoded.truncated_tail);
        assert_eq!(decoded.valid_len, 0);
    }

    #[test]
    fn test_corrupt_complete_frame_is_an_error() {
        let mut buf = 3u32.to_be_bytes().to_vec();
        buf.extend_from_slice(b"{{{");
        assert!(matches!(decode_all(&buf), Err(CourierError::Parse(_))));
    }
}
