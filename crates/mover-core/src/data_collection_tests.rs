use std::collections::BTreeSet;
use std::sync::atomic::{AtomicUsize, Ordering};

use glam::Vec3;
use proptest::prelude::*;
use serde::{Deserialize, Serialize};

use super::*;
use crate::default_data::{
    CharacterDefaultInputs, INPUT_DATA_TAG, MoverDefaultSyncState, SYNC_STATE_DATA_TAG,
};
use crate::registry::MoverTypeRegistry;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
struct StaminaState {
    stamina: f32,
}

impl MoverType for StaminaState {
    const TAG: &'static str = "StaminaState";
    const PARENTS: &'static [&'static str] = &[SYNC_STATE_DATA_TAG];
}

impl MoverDataStruct for StaminaState {}

fn tag_set(collection: &MoverDataCollection) -> BTreeSet<&'static str> {
    collection.iter().map(|d| d.type_tag()).collect()
}

fn sync_state_at(x: f32) -> MoverDefaultSyncState {
    MoverDefaultSyncState {
        location: Vec3::new(x, 0.0, 0.0),
        ..Default::default()
    }
}

#[test]
fn test_add_overwrites_same_type() {
    let mut collection = MoverDataCollection::new();
    collection.add(sync_state_at(1.0));
    collection.add(sync_state_at(2.0));
    assert_eq!(collection.len(), 1);
    assert_eq!(
        collection.find::<MoverDefaultSyncState>().unwrap().location.x,
        2.0
    );
}

#[test]
fn test_find_by_supertype() {
    let mut collection = MoverDataCollection::new();
    collection.add(CharacterDefaultInputs::default());
    collection.add(StaminaState { stamina: 3.0 });

    let input = collection.find_data_by_tag(INPUT_DATA_TAG).unwrap();
    assert_eq!(input.type_tag(), CharacterDefaultInputs::TAG);
    let sync = collection.find_data_by_tag(SYNC_STATE_DATA_TAG).unwrap();
    assert_eq!(sync.type_tag(), StaminaState::TAG);
    assert!(collection.find_data_by_tag("Nope").is_none());
}

#[test]
fn test_find_or_add_and_remove() {
    let mut collection = MoverDataCollection::new();
    collection.find_or_add_mut::<StaminaState>().stamina = 9.0;
    assert_eq!(collection.find::<StaminaState>().unwrap().stamina, 9.0);
    collection.find_or_add_mut::<StaminaState>().stamina += 1.0;
    assert_eq!(collection.len(), 1);
    assert_eq!(collection.find::<StaminaState>().unwrap().stamina, 10.0);

    assert!(collection.remove_data_by_tag(StaminaState::TAG));
    assert!(!collection.remove_data_by_tag(StaminaState::TAG));
    assert!(collection.is_empty());
}

#[test]
fn test_clone_is_deep() {
    let mut original = MoverDataCollection::new();
    original.add(sync_state_at(1.0));
    let mut copy = original.clone();
    copy.find_mut::<MoverDefaultSyncState>().unwrap().location.x = 5.0;
    assert_eq!(
        original.find::<MoverDefaultSyncState>().unwrap().location.x,
        1.0
    );
}

#[test]
fn test_clone_from_reuses_same_layout() {
    let mut source = MoverDataCollection::new();
    source.add(sync_state_at(7.0));
    let mut target = MoverDataCollection::new();
    target.add(sync_state_at(0.0));
    target.clone_from(&source);
    assert_eq!(target.find::<MoverDefaultSyncState>().unwrap().location.x, 7.0);

    // Different layout falls back to a full copy.
    source.add(StaminaState { stamina: 1.0 });
    target.clone_from(&source);
    assert_eq!(tag_set(&target), tag_set(&source));
}

#[test]
fn test_interpolate_blends_shared_and_copies_exclusive() {
    let mut from = MoverDataCollection::new();
    from.add(sync_state_at(0.0));
    from.add(StaminaState { stamina: 2.0 });
    let mut to = MoverDataCollection::new();
    to.add(sync_state_at(10.0));
    to.add(CharacterDefaultInputs::default());

    let mut out = MoverDataCollection::new();
    out.interpolate(&from, &to, 0.25);

    assert_eq!(out.len(), 3);
    assert_eq!(out.find::<MoverDefaultSyncState>().unwrap().location.x, 2.5);
    assert_eq!(out.find::<StaminaState>().unwrap().stamina, 2.0);
    assert!(out.find::<CharacterDefaultInputs>().is_some());
}

#[test]
fn test_should_reconcile_on_type_mismatch() {
    let mut local = MoverDataCollection::new();
    local.add(sync_state_at(0.0));
    let mut authority = MoverDataCollection::new();
    authority.add(StaminaState::default());
    assert!(local.should_reconcile(&authority));

    let mut bigger = local.clone();
    bigger.add(StaminaState::default());
    assert!(local.should_reconcile(&bigger));
    assert!(!local.should_reconcile(&local.clone()));
}

#[test]
fn test_merge_adopts_missing_blocks() {
    let mut into = MoverDataCollection::new();
    into.add(CharacterDefaultInputs::default());
    let mut from = MoverDataCollection::new();
    from.add(CharacterDefaultInputs {
        is_jump_just_pressed: true,
        ..Default::default()
    });
    from.add(StaminaState { stamina: 4.0 });

    into.merge(&from);
    assert!(into.find::<CharacterDefaultInputs>().unwrap().is_jump_just_pressed);
    assert_eq!(into.find::<StaminaState>().unwrap().stamina, 4.0);
}

// ---------------------------------------------------------------------------
// Wire
// ---------------------------------------------------------------------------

#[test]
fn test_net_round_trip_reuses_existing_block() {
    let registry = MoverTypeRegistry::with_defaults();
    let mut sent = MoverDataCollection::new();
    sent.add(sync_state_at(3.0));
    sent.add(CharacterDefaultInputs::default());

    let mut writer = NetWriter::new();
    sent.net_serialize(&mut writer).unwrap();
    let bytes = writer.into_bytes();

    let mut received = MoverDataCollection::new();
    received.add(sync_state_at(-1.0));
    let mut reader = NetReader::new(&bytes);
    received.net_deserialize(&mut reader, &registry.data).unwrap();

    assert!(!reader.has_error());
    assert_eq!(reader.remaining(), 0);
    assert_eq!(tag_set(&received), tag_set(&sent));
    assert_eq!(
        received.find::<MoverDefaultSyncState>().unwrap().location.x,
        3.0
    );
}

static PROBES_BUILT: AtomicUsize = AtomicUsize::new(0);

fn build_probe() -> Box<dyn MoverDataStruct> {
    PROBES_BUILT.fetch_add(1, Ordering::SeqCst);
    Box::new(StaminaState::default())
}

#[test]
fn test_untrusted_tag_is_rejected_without_construction() {
    let mut registry = TypeRegistry::<dyn MoverDataStruct>::new("MoverDataStruct");
    registry
        .register_abstract(SYNC_STATE_DATA_TAG, &[])
        .unwrap();
    registry
        .register(StaminaState::TAG, StaminaState::PARENTS, build_probe)
        .unwrap();

    for forged in ["LaunchMove", SYNC_STATE_DATA_TAG, "Anything"] {
        let mut writer = NetWriter::new();
        writer.write_count(1).unwrap();
        writer.write_tag(forged).unwrap();
        writer.write_payload(&1.0f32).unwrap();
        let bytes = writer.into_bytes();

        let mut collection = MoverDataCollection::new();
        let mut reader = NetReader::new(&bytes);
        let result = collection.net_deserialize(&mut reader, &registry);

        assert!(matches!(
            result,
            Err(NetSerializeError::ProtocolViolation { ref tag, .. }) if tag == forged
        ));
        assert!(reader.has_error());
        assert!(collection.is_empty());
    }
    assert_eq!(PROBES_BUILT.load(Ordering::SeqCst), 0);

    // The registered type is still built normally.
    let mut sent = MoverDataCollection::new();
    sent.add(StaminaState { stamina: 5.0 });
    let mut writer = NetWriter::new();
    sent.net_serialize(&mut writer).unwrap();
    let bytes = writer.into_bytes();
    let mut collection = MoverDataCollection::new();
    collection
        .net_deserialize(&mut NetReader::new(&bytes), &registry)
        .unwrap();
    assert_eq!(PROBES_BUILT.load(Ordering::SeqCst), 1);
    assert_eq!(collection.find::<StaminaState>().unwrap().stamina, 5.0);
}

#[test]
fn test_truncated_payload_fails() {
    let registry = MoverTypeRegistry::with_defaults();
    let mut sent = MoverDataCollection::new();
    sent.add(sync_state_at(3.0));
    let mut writer = NetWriter::new();
    sent.net_serialize(&mut writer).unwrap();
    let bytes = writer.into_bytes();

    let mut reader = NetReader::new(&bytes[..bytes.len() - 2]);
    let mut received = MoverDataCollection::new();
    assert!(received.net_deserialize(&mut reader, &registry.data).is_err());
    assert!(reader.has_error());
}

// ---------------------------------------------------------------------------
// Laws
// ---------------------------------------------------------------------------

fn add_by_index(collection: &mut MoverDataCollection, index: u8, value: f32) {
    match index % 3 {
        0 => collection.add(sync_state_at(value)),
        1 => collection.add(StaminaState { stamina: value }),
        _ => collection.add(CharacterDefaultInputs {
            move_input: Vec3::splat(value),
            ..Default::default()
        }),
    }
}

proptest! {
    #[test]
    fn prop_type_uniqueness_last_wins(
        ops in prop::collection::vec((0u8..3, -100.0f32..100.0), 0..24)
    ) {
        let mut collection = MoverDataCollection::new();
        for (index, value) in &ops {
            add_by_index(&mut collection, *index, *value);
        }

        let tags: Vec<_> = collection.iter().map(|d| d.type_tag()).collect();
        let unique: BTreeSet<_> = tags.iter().copied().collect();
        prop_assert_eq!(tags.len(), unique.len());

        if let Some((_, value)) = ops.iter().rev().find(|(i, _)| i % 3 == 1) {
            prop_assert_eq!(collection.find::<StaminaState>().unwrap().stamina, *value);
        }
    }

    #[test]
    fn prop_interpolation_is_union(a_mask in 0u8..8, b_mask in 0u8..8, pct in 0.0f32..=1.0) {
        let mut a = MoverDataCollection::new();
        let mut b = MoverDataCollection::new();
        for index in 0..3u8 {
            if a_mask & (1 << index) != 0 {
                add_by_index(&mut a, index, 1.0);
            }
            if b_mask & (1 << index) != 0 {
                add_by_index(&mut b, index, 2.0);
            }
        }

        let mut out = MoverDataCollection::new();
        out.interpolate(&a, &b, pct);

        let expected: BTreeSet<_> = tag_set(&a).union(&tag_set(&b)).copied().collect();
        prop_assert_eq!(tag_set(&out), expected);
    }
}
