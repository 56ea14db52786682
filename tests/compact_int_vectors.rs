//! CompactInt wire vectors and universal properties

use btcproto::compact_int::CompactInt;
use btcproto::error::CoreError;
use btcproto::stream::ByteReader;
use proptest::prelude::*;

fn decode(bytes: &[u8]) -> Result<u64, CoreError> {
    let mut reader = ByteReader::new(bytes);
    let value = CompactInt::read(&mut reader)?;
    Ok(value.value())
}

#[test]
fn test_wire_vectors() {
    assert_eq!(CompactInt(0).to_bytes(), vec![0x00]);
    assert_eq!(CompactInt(252).to_bytes(), vec![0xfc]);
    assert_eq!(CompactInt(253).to_bytes(), vec![0xfd, 0xfd, 0x00]);
    assert_eq!(CompactInt(515).to_bytes(), vec![0xfd, 0x03, 0x02]);
}

#[test]
fn test_non_canonical_two_byte_form_fails() {
    // 252 encoded with the 0xfd prefix
    assert!(matches!(
        decode(&[0xfd, 0xfc, 0x00]),
        Err(CoreError::Malformed(_))
    ));
}

#[test]
fn test_decode_consumes_exact_length() {
    let mut reader = ByteReader::new(&[0xfd, 0x03, 0x02, 0xff]);
    assert_eq!(CompactInt::read(&mut reader).unwrap().value(), 515);
    assert_eq!(reader.remaining(), 1);
}

proptest! {
    /// read(write(v)) = v and the length is minimal for the value
    #[test]
    fn prop_round_trip_with_minimal_length(value in any::<u64>()) {
        let encoded = CompactInt(value).to_bytes();
        let expected_len = match value {
            0..=0xfc => 1,
            0xfd..=0xffff => 3,
            0x1_0000..=0xffff_ffff => 5,
            _ => 9,
        };
        prop_assert_eq!(encoded.len(), expected_len);
        prop_assert_eq!(decode(&encoded).unwrap(), value);
    }

    /// Every value representable in a shorter form fails in the longer forms
    #[test]
    fn prop_non_canonical_fails(value in 0u64..=0xffff_ffff) {
        if value <= 0xfc {
            let mut bytes = vec![0xfd];
            bytes.extend_from_slice(&(value as u16).to_le_bytes());
            prop_assert!(decode(&bytes).is_err());
        }
        if value <= 0xffff {
            let mut bytes = vec![0xfe];
            bytes.extend_from_slice(&(value as u32).to_le_bytes());
            prop_assert!(decode(&bytes).is_err());
        }
        let mut bytes = vec![0xff];
        bytes.extend_from_slice(&value.to_le_bytes());
        prop_assert!(decode(&bytes).is_err());
    }

    /// Truncating any canonical encoding yields EndOfStream
    #[test]
    fn prop_truncation_fails(value in any::<u64>(), cut in 0usize..9) {
        let encoded = CompactInt(value).to_bytes();
        if cut < encoded.len() {
            prop_assert_eq!(decode(&encoded[..cut]), Err(CoreError::EndOfStream));
        }
    }
}
