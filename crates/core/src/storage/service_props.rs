//! Property-based tests for StorageService.

use proptest::prelude::*;

use super::*;
use crate::storage::config::MIB;

proptest! {
    // Property: payloads above the threshold are chunked, everything else is sent whole.
    #[test]
    fn prop_strategy_matches_threshold(
        threshold in 1u64..(100 * MIB),
        size in 0u64..(200 * MIB),
    ) {
        let config = StorageConfig::new(StorageProvider::Memory).with_multipart_threshold(threshold);
        let expected = if size > threshold {
            UploadStrategy::Chunked
        } else {
            UploadStrategy::SingleRequest
        };
        prop_assert_eq!(config.strategy_for(size), expected);
    }
}

proptest! {
    // Property: stamped names keep the directory, stem and extension of the original.
    #[test]
    fn prop_stamped_name_preserves_parts(
        stem in "[a-zA-Z0-9_-]{1,20}",
        ext in "[a-z]{1,4}",
        stamp in any::<i64>(),
    ) {
        let original = format!("{stem}.{ext}");
        let name = stamped_name(&original, stamp);

        prop_assert_eq!(name, format!("{stem}_{stamp}.{ext}"));
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    // Property: bytes stored under a key read back unchanged on both upload paths.
    #[test]
    fn prop_round_trip(bytes in proptest::collection::vec(any::<u8>(), 0..8192)) {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .expect("runtime");
        let config = StorageConfig::new(StorageProvider::Memory)
            .with_multipart_threshold(2048)
            .with_chunk_size(512);
        let service = StorageService::from_config(config).expect("memory service");

        let stored = runtime.block_on(async {
            service
                .put_object("p/q/r.bin", bytes.as_slice(), bytes.len() as u64, "application/octet-stream")
                .await
                .expect("upload");
            service.read("p/q/r.bin").await.expect("read")
        });

        prop_assert_eq!(stored, bytes);
    }
}
