//! Integration tests for object handles minted by a session.
//!
//! Covers tag checks, shared payloads across duplicates, and refusal of
//! handles from another session.

use proptest::prelude::*;

use bench_bridge::core::tags::{self, ENGINE_OBJECT, RESERVED_MASK};
use bench_bridge::engine::Session;

#[derive(Debug, PartialEq)]
struct Payload {
    values: Vec<u32>,
}

#[test]
fn test_round_trip_through_handle() {
    let session = Session::new();
    let h = session
        .create_handle(12, 0x4, Payload { values: vec![1, 2, 3] })
        .unwrap();
    assert_eq!(h.size, 12);
    assert!(tags::has_class(h.tag, ENGINE_OBJECT | 0x4));

    let back = session.retrieve::<Payload>(&h, 0x4).unwrap();
    assert_eq!(back.values, vec![1, 2, 3]);
    drop(back);
    session.destroy_handle(h).unwrap();
}

#[test]
fn test_duplicate_outlives_original() {
    let session = Session::new();
    let h = session.create_handle(0, 0x1, Payload { values: vec![9] }).unwrap();
    let dup = session.duplicate_handle(&h, None, 0x1).unwrap();
    assert_eq!(dup.tag, h.tag);
    assert_eq!(session.ref_count(&h).unwrap(), 2);

    session.destroy_handle(h).unwrap();
    assert_eq!(session.ref_count(&dup).unwrap(), 1);
    assert_eq!(session.retrieve::<Payload>(&dup, 0x1).unwrap().values, vec![9]);
    session.destroy_handle(dup).unwrap();
}

#[test]
fn test_retag_on_duplicate() {
    let session = Session::new();
    let h = session.create_handle(0, 0x1, 5u64).unwrap();
    let dup = session.duplicate_handle(&h, Some(0x2), 0x1).unwrap();
    assert_eq!(dup.tag, ENGINE_OBJECT | 0x2);
    // the old bit is gone from the duplicate
    assert!(session.retrieve::<u64>(&dup, 0x1).unwrap_err().is_critical());
    assert_eq!(*session.retrieve::<u64>(&dup, 0x2).unwrap(), 5);
    session.destroy_handle(dup).unwrap();
    session.destroy_handle(h).unwrap();
}

#[test]
fn test_missing_tag_bits_are_critical() {
    let session = Session::new();
    let h = session.create_handle(0, 0x1, 1u8).unwrap();
    let err = session.retrieve::<u8>(&h, 0x1 | 0x8).unwrap_err();
    assert!(err.is_critical());
    session.destroy_handle(h).unwrap();
}

#[test]
fn test_wrong_payload_type_is_critical() {
    let session = Session::new();
    let h = session.create_handle(0, 0, 1u8).unwrap();
    assert!(session.retrieve::<String>(&h, 0).unwrap_err().is_critical());
    session.destroy_handle(h).unwrap();
}

#[test]
fn test_foreign_session_rejected() {
    let a = Session::new();
    let b = Session::new();
    assert_ne!(a.id(), b.id());
    let h = a.create_handle(0, 0, 3i64).unwrap();
    assert!(b.retrieve::<i64>(&h, 0).unwrap_err().is_critical());
    assert!(b.duplicate_handle(&h, None, 0).is_err());
    assert!(b.destroy_handle(h).is_err());
    a.destroy_handle(h).unwrap();
}

#[test]
fn test_null_handle_is_not_an_object() {
    let session = Session::new();
    let null = bench_bridge::Handle {
        tag: ENGINE_OBJECT,
        ..bench_bridge::Handle::null()
    };
    assert!(session.retrieve::<u8>(&null, 0).unwrap_err().is_critical());
}

proptest! {
    #[test]
    fn test_reserved_bits_never_accepted(bits in 1u64..=0xFF) {
        let session = Session::new();
        let reserved = bits << 56;
        prop_assert!(reserved & RESERVED_MASK != 0);
        prop_assert!(session.create_handle(0, reserved, 0u8).unwrap_err().is_critical());

        let h = session.create_handle(0, 0x1, 0u8).unwrap();
        prop_assert!(session.duplicate_handle(&h, Some(reserved | 0x1), 0x1).is_err());
        session.destroy_handle(h).unwrap();
    }

    #[test]
    fn test_backend_bits_round_trip(bits in 0u64..(1u64 << 56)) {
        let session = Session::new();
        let h = session.create_handle(0, bits, 0u8).unwrap();
        prop_assert_eq!(h.tag, ENGINE_OBJECT | bits);
        prop_assert!(session.retrieve::<u8>(&h, bits).is_ok());
        session.destroy_handle(h).unwrap();
    }
}
