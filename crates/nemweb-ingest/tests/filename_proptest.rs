//! Property tests for AEMO filename parsing

use chrono::{NaiveDate, NaiveDateTime};
use nemweb_common::BucketSize;
use nemweb_ingest::filename::AemoFilename;
use proptest::prelude::*;

fn interval_timestamp() -> impl Strategy<Value = NaiveDateTime> {
    (2009i32..2040, 1u32..=12, 1u32..=28, 0u32..24, 0u32..12).prop_map(|(y, mo, d, h, five)| {
        NaiveDate::from_ymd_opt(y, mo, d)
            .unwrap()
            .and_hms_opt(h, five * 5, 0)
            .unwrap()
    })
}

proptest! {
    #[test]
    fn interval_filenames_round_trip(
        base in "PUBLIC_[A-Z]{4,20}",
        ts in interval_timestamp(),
        seq in "[0-9]{16}",
        ext in prop_oneof![Just("zip"), Just("ZIP"), Just("CSV")],
    ) {
        let name = format!("{base}_{}_{seq}.{ext}", ts.format("%Y%m%d%H%M"));
        let parsed = AemoFilename::parse(&name).unwrap();

        prop_assert_eq!(&parsed.base_name, &base);
        prop_assert_eq!(parsed.timestamp, ts);
        prop_assert_eq!(parsed.sequence_token.as_deref(), Some(seq.as_str()));
        prop_assert_eq!(parsed.inferred_bucket(), BucketSize::Interval);
        prop_assert_eq!(parsed.to_filename(), name);
    }

    #[test]
    fn daily_filenames_resolve_to_midnight(
        base in "PUBLIC_[A-Z]{4,20}",
        ts in interval_timestamp(),
    ) {
        let name = format!("{base}_{}.zip", ts.format("%Y%m%d"));
        let parsed = AemoFilename::parse(&name).unwrap();

        prop_assert_eq!(parsed.timestamp, ts.date().and_hms_opt(0, 0, 0).unwrap());
        prop_assert_eq!(&parsed.sequence_token, &None);
        prop_assert_eq!(parsed.inferred_bucket(), BucketSize::Day);
    }

    #[test]
    fn other_extensions_never_parse(
        base in "PUBLIC_[A-Z]{4,20}",
        ts in interval_timestamp(),
        ext in "(txt|json|xml|html)",
    ) {
        let name = format!("{base}_{}.{ext}", ts.format("%Y%m%d%H%M"));
        prop_assert!(AemoFilename::parse(&name).is_err());
    }
}
