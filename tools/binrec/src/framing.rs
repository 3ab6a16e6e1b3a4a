use crate::errors::RecordStreamError;
use crate::types::ByteOrder;

pub const PREFIX_LEN: usize = 4;

pub fn encode_prefix(len: u32, order: ByteOrder) -> [u8; PREFIX_LEN] {
    match order {
        ByteOrder::Native => len.to_ne_bytes(),
        ByteOrder::Little => len.to_le_bytes(),
        ByteOrder::Big => len.to_be_bytes(),
    }
}

pub fn decode_prefix(bytes: [u8; PREFIX_LEN], order: ByteOrder) -> u32 {
    match order {
        ByteOrder::Native => u32::from_ne_bytes(bytes),
        ByteOrder::Little => u32::from_le_bytes(bytes),
        ByteOrder::Big => u32::from_be_bytes(bytes),
    }
}

/// Builds `prefix ‖ payload` so the record goes out as a single write.
pub fn encode_record(payload: &[u8], order: ByteOrder) -> Result<Vec<u8>, RecordStreamError> {
    let len = u32::try_from(payload.len()).map_err(|_| {
        RecordStreamError::RecordTooLarge(format!(
            "payload of {} bytes does not fit a 32-bit length prefix",
            payload.len()
        ))
    })?;
    let mut record = Vec::with_capacity(PREFIX_LEN + payload.len());
    record.extend_from_slice(&encode_prefix(len, order));
    record.extend_from_slice(payload);
    Ok(record)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_is_prefix_then_payload() {
        let record = encode_record(b"abc", ByteOrder::Little).expect("encode");
        assert_eq!(record, vec![3, 0, 0, 0, b'a', b'b', b'c']);

        let record = encode_record(b"abc", ByteOrder::Big).expect("encode");
        assert_eq!(&record[..PREFIX_LEN], &[0, 0, 0, 3]);
    }

    #[test]
    fn empty_payload_is_prefix_only() {
        let record = encode_record(b"", ByteOrder::Native).expect("encode");
        assert_eq!(record, vec![0u8; PREFIX_LEN]);
    }

    #[test]
    fn native_order_matches_platform() {
        let prefix = encode_prefix(0x0102_0304, ByteOrder::Native);
        assert_eq!(prefix, 0x0102_0304u32.to_ne_bytes());
        assert_eq!(decode_prefix(prefix, ByteOrder::Native), 0x0102_0304);
    }

    #[test]
    fn mismatched_order_decodes_differently() {
        let prefix = encode_prefix(1, ByteOrder::Big);
        assert_eq!(decode_prefix(prefix, ByteOrder::Little), 1 << 24);
    }
}
