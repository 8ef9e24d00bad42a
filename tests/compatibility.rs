// tests/compatibility.rs

use studiograph::types::{CompatibilityReason, DataType, compatibility_reason, compatible};

#[test]
fn any_is_compatible_in_both_directions() {
    for t in DataType::ALL {
        assert!(compatible(DataType::Any, t), "any -> {t}");
        assert!(compatible(t, DataType::Any), "{t} -> any");
    }
}

#[test]
fn text_source_feeds_every_target() {
    for t in DataType::ALL {
        assert!(compatible(DataType::Text, t), "text -> {t}");
    }
}

#[test]
fn media_types_only_match_themselves_or_any() {
    let media = [
        DataType::Image,
        DataType::Video,
        DataType::Audio,
        DataType::Tensor,
        DataType::Json,
    ];
    for s in media {
        for t in DataType::ALL {
            let expected = s == t || t == DataType::Any;
            assert_eq!(compatible(s, t), expected, "{s} -> {t}");
        }
    }
}

#[test]
fn image_cannot_feed_text() {
    assert!(!compatible(DataType::Image, DataType::Text));
    assert!(!compatible(DataType::Audio, DataType::Video));
}

#[test]
fn reasons_are_reported() {
    assert_eq!(
        compatibility_reason(DataType::Image, DataType::Image),
        Some(CompatibilityReason::ExactMatch)
    );
    assert_eq!(
        compatibility_reason(DataType::Text, DataType::Image),
        Some(CompatibilityReason::TextUniversal)
    );
    assert_eq!(
        compatibility_reason(DataType::Any, DataType::Video),
        Some(CompatibilityReason::AnyAcceptsAll)
    );
    assert_eq!(
        compatibility_reason(DataType::Video, DataType::Any),
        Some(CompatibilityReason::AnyAcceptsAll)
    );
    assert_eq!(compatibility_reason(DataType::Json, DataType::Text), None);
}

#[test]
fn data_type_round_trips_through_str() {
    for t in DataType::ALL {
        let parsed: DataType = t.as_str().parse().unwrap();
        assert_eq!(parsed, t);
    }
    assert!("pixels".parse::<DataType>().is_err());
}
