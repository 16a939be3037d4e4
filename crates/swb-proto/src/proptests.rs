
#[cfg(test)]
mod tests {
    use proptest::prelude::*;
    use prost::Message;

    use crate::codec::{decode, encode, DecodeError};
    use crate::rts::*;
    use crate::v1::{rts_connection_v1::Msg, RtsConnResponseV1, RtsConnectionV1};

    prop_compose! {
        fn any_connect_request()(
            ssid in proptest::collection::vec(any::<u8>(), 1..=32),
            password in "[ -~]{0,63}",
            auth_type in 0u32..8,
            hidden in any::<bool>(),
            timeout_secs in any::<u32>()
        ) -> WifiConnectRequest {
            WifiConnectRequest { ssid, password, auth_type, hidden, timeout_secs }
        }
    }

    prop_compose! {
        fn any_file_chunk()(
            status in any::<u32>(),
            file_id in any::<u32>(),
            offset in any::<u32>(),
            total in any::<u32>(),
            chunk in proptest::collection::vec(any::<u8>(), 0..256)
        ) -> FileChunk {
            FileChunk { status, file_id, offset, total, chunk }
        }
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(256))]

        #[test]
        fn prop_decode_never_panics(frame in proptest::collection::vec(any::<u8>(), 0..512)) {
            let _ = decode(&frame);
        }

        #[test]
        fn prop_connect_request_survives_codec(req in any_connect_request()) {
            let msg = RtsMessage::WifiConnectRequest(req);
            prop_assert_eq!(decode(&encode(&msg)).unwrap(), msg);
        }

        #[test]
        fn prop_file_chunk_survives_codec(chunk in any_file_chunk()) {
            let msg = RtsMessage::FileDownload(chunk);
            prop_assert_eq!(decode(&encode(&msg)).unwrap(), msg);
        }

        #[test]
        fn prop_public_key_length_enforced(key in proptest::collection::vec(any::<u8>(), 0..64)) {
            let frame = RtsConnectionV1 {
                msg: Some(Msg::ConnResponse(RtsConnResponseV1 {
                    connection_type: 1,
                    public_key: key.clone(),
                })),
            }
            .encode_to_vec();
            match decode(&frame) {
                Ok(RtsMessage::ConnResponse(r)) => {
                    prop_assert_eq!(key.len(), PUBLIC_KEY_LEN);
                    prop_assert_eq!(r.public_key.to_vec(), key);
                }
                Err(DecodeError::Invalid(_)) => prop_assert_ne!(key.len(), PUBLIC_KEY_LEN),
                other => prop_assert!(false, "unexpected decode result: {:?}", other),
            }
        }

        #[test]
        fn prop_oversized_ssid_rejected(ssid in proptest::collection::vec(any::<u8>(), 33..64)) {
            let msg = RtsMessage::WifiForgetRequest(WifiForgetRequest { ssid, delete_all: false });
            prop_assert!(matches!(decode(&encode(&msg)), Err(DecodeError::Invalid(_))));
        }
    }
}
