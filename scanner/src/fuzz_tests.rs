//! Property-based tests for the decoder, range splitting and stealth matching

#[cfg(test)]
mod property_tests {
    use alloy_primitives::{Address, B256};
    use proptest::prelude::*;

    use crate::announcement::{encode_announcement_log, Announcement};
    use crate::crypto::{compute_stealth_payment, DksapScheme, StealthKeys, StealthScheme};
    use crate::fetcher::split_range;
    use crate::rpc::RawLog;

    fn nonzero_scalar() -> impl Strategy<Value = [u8; 32]> {
        prop::array::uniform32(any::<u8>()).prop_filter("non-zero scalar", |b| b.iter().any(|&x| x != 0))
    }

    proptest! {
        /// Arbitrary log payloads are rejected or decoded, never a panic
        #[test]
        fn prop_decoder_never_panics(
            data in prop::collection::vec(any::<u8>(), 0..512),
            topics in 0usize..5,
        ) {
            let mut log = encode_announcement_log(1, B256::ZERO, Address::ZERO, &[1; 33], &[]);
            log.topics.truncate(topics);
            log.data = format!("0x{}", hex::encode(&data));
            let _ = Announcement::from_log(&log);
        }

        /// Whatever the announcer encodes, the decoder reads back
        #[test]
        fn prop_decoder_reads_encoded_payload(
            ephemeral in prop::collection::vec(any::<u8>(), 1..100),
            metadata in prop::collection::vec(any::<u8>(), 0..100),
            block in any::<u32>(),
        ) {
            let log = encode_announcement_log(block as u64, B256::repeat_byte(3), Address::repeat_byte(4), &ephemeral, &metadata);
            let ann = Announcement::from_log(&log).unwrap();
            prop_assert_eq!(ann.view_tag, ephemeral[0]);
            prop_assert_eq!(ann.ephemeral_pub_key, ephemeral);
            prop_assert_eq!(ann.metadata, metadata);
            prop_assert_eq!(ann.block_number, block as u64);
        }

        /// Garbage hex fields are rejected
        #[test]
        fn prop_non_hex_block_number_rejected(s in "[g-z]{1,12}") {
            let mut log: RawLog = encode_announcement_log(1, B256::ZERO, Address::ZERO, &[1; 33], &[]);
            log.block_number = format!("0x{s}");
            prop_assert!(Announcement::from_log(&log).is_err());
        }

        /// Sub-ranges tile `[from, to]` exactly, in order, within the size cap
        #[test]
        fn prop_split_range_covers_exactly(
            from in 0u64..1_000_000,
            len in 0u64..50_000,
            per_request in 1u64..5_000,
        ) {
            let to = from + len;
            let ranges = split_range(from, to, per_request);

            prop_assert_eq!(*ranges[0].start(), from);
            prop_assert_eq!(*ranges[ranges.len() - 1].end(), to);
            for pair in ranges.windows(2) {
                prop_assert_eq!(*pair[1].start(), *pair[0].end() + 1);
            }
            for range in &ranges {
                prop_assert!(range.end() >= range.start());
                prop_assert!(range.end() - range.start() + 1 <= per_request);
            }
            let total: u64 = ranges.iter().map(|r| r.end() - r.start() + 1).sum();
            prop_assert_eq!(total, len + 1);
        }

        /// A recipient always recognises payments derived for its keys
        #[test]
        fn prop_recipient_always_matches(scan in nonzero_scalar(), spend in nonzero_scalar()) {
            let keys = StealthKeys::from_secrets(&scan, &spend);
            let payment = compute_stealth_payment(&keys.scan_pubkey, &keys.spend_pubkey).unwrap();
            let log = encode_announcement_log(9, B256::ZERO, payment.stealth_address, &payment.ephemeral_pub_key, &[]);
            let ann = Announcement::from_log(&log).unwrap();

            let material = keys.key_material();
            prop_assert!(DksapScheme.view_tag_matches(&material, &ann).unwrap());
            prop_assert_eq!(DksapScheme.derive_recipient(&material, &ann).unwrap(), payment.stealth_address);
        }

        /// Arbitrary ephemeral regions never panic the scheme
        #[test]
        fn prop_scheme_rejects_garbage(region in prop::collection::vec(any::<u8>(), 0..64)) {
            let keys = StealthKeys::from_secrets(&[7; 32], &[9; 32]);
            let ann = Announcement {
                block_number: 0,
                tx_hash: B256::ZERO,
                log_index: None,
                stealth_address: Address::ZERO,
                view_tag: region.first().copied().unwrap_or_default(),
                ephemeral_pub_key: region,
                metadata: Vec::new(),
            };
            let material = keys.key_material();
            let _ = DksapScheme.view_tag_matches(&material, &ann);
            let _ = DksapScheme.derive_recipient(&material, &ann);
        }
    }
}
