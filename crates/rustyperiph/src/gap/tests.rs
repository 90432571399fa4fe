//! Unit tests for addresses, identities and the advertising set registry

use super::*;
use crate::error::SessionError;
use crate::radio::mock::{MockRadio, RadioRequest};
use crate::radio::{AdvHandle, RadioError};
use rand::rngs::StdRng;
use rand::SeedableRng;

const DEVICE_NAME: &str = "rustyperiph";

fn identity() -> PeerAddress {
    PeerAddress::public([0x01, 0x02, 0x03, 0x04, 0x05, 0x06])
}

fn registry(radio: MockRadio) -> AdvertisingRegistry<MockRadio> {
    AdvertisingRegistry::new(
        radio,
        IdentityTable::new(identity(), 2),
        DEVICE_NAME.to_string(),
        4,
        LEGACY_ADV_DATA_MAX,
    )
}

fn flags_only() -> Vec<AdvertisingElement> {
    vec![AdvertisingElement::flags(AdFlags::LE_GENERAL | AdFlags::NO_BREDR)]
}

#[test]
fn test_address_display_and_parse() {
    let addr = PeerAddress::random([0xE2, 0x4E, 0x39, 0x95, 0xC1, 0xC9]);
    assert_eq!(addr.to_string(), "C9:C1:95:39:4E:E2 (random)");

    let parsed: PeerAddress = "C9:C1:95:39:4E:E2 (random)".parse().unwrap();
    assert_eq!(parsed, addr);

    let public: PeerAddress = "00:11:22:33:44:55".parse().unwrap();
    assert_eq!(public.kind, AddressKind::Public);
    assert_eq!(public.bytes, [0x55, 0x44, 0x33, 0x22, 0x11, 0x00]);

    assert!("00:11:22:33:44".parse::<PeerAddress>().is_err());
    assert!("00:11:22:33:44:ZZ".parse::<PeerAddress>().is_err());
    assert!("00:11:22:33:44:55 (other)".parse::<PeerAddress>().is_err());
}

#[test]
fn test_identity_creation() {
    let mut rng = StdRng::seed_from_u64(7);
    let mut table = IdentityTable::new(identity(), 2);

    let slot = table.create_identity(&mut rng).unwrap();
    assert_eq!(slot, 1);
    assert!(table.get(1).unwrap().is_random_static());
    assert_eq!(table.len(), 2);

    assert_eq!(
        table.create_identity(&mut rng),
        Err(SessionError::ResourceExhausted)
    );
}

#[test]
fn test_start_and_double_start() {
    let mut registry = registry(MockRadio::new());
    let id = registry
        .create(AdvertisingParameters::connectable().with_identity(0), flags_only())
        .unwrap();

    assert_eq!(registry.state(id), Some(SetState::Idle));
    registry.start(id, DutyCycle::Low).unwrap();
    assert_eq!(registry.state(id), Some(SetState::Running));

    match registry.radio().last_start() {
        Some(RadioRequest::Start {
            handle,
            identity: Some(addr),
            payload,
            ..
        }) => {
            assert_eq!(*handle, AdvHandle(0));
            assert_eq!(*addr, identity());
            assert_eq!(payload, &vec![0x02, 0x01, 0x06]);
        }
        other => panic!("unexpected request {:?}", other),
    }

    assert_eq!(
        registry.start(id, DutyCycle::Low),
        Err(SessionError::AlreadyRunning(id))
    );
    assert_eq!(registry.radio().starts().len(), 1);
}

#[test]
fn test_stop_is_idempotent() {
    let mut registry = registry(MockRadio::new());
    let id = registry
        .create(AdvertisingParameters::non_connectable(), flags_only())
        .unwrap();

    registry.start(id, DutyCycle::Low).unwrap();
    registry.stop(id).unwrap();
    assert_eq!(registry.state(id), Some(SetState::Idle));

    registry.radio_mut().clear();
    registry.stop(id).unwrap();
    registry.stop(id).unwrap();
    assert!(registry.radio().requests.is_empty());
}

#[test]
fn test_resource_exhausted() {
    let mut registry = registry(MockRadio::with_max_contexts(1));
    registry
        .create(AdvertisingParameters::non_connectable(), flags_only())
        .unwrap();

    assert_eq!(
        registry.create(AdvertisingParameters::non_connectable(), flags_only()),
        Err(SessionError::ResourceExhausted)
    );

    let mut limited = AdvertisingRegistry::new(
        MockRadio::new(),
        IdentityTable::new(identity(), 1),
        String::new(),
        1,
        LEGACY_ADV_DATA_MAX,
    );
    limited
        .create(AdvertisingParameters::non_connectable(), flags_only())
        .unwrap();
    assert_eq!(
        limited.create(AdvertisingParameters::non_connectable(), flags_only()),
        Err(SessionError::ResourceExhausted)
    );
}

#[test]
fn test_oversized_payload_rejected_on_start() {
    let mut registry = registry(MockRadio::new());
    let id = registry
        .create(
            AdvertisingParameters::non_connectable(),
            vec![AdvertisingElement::manufacturer_data(0x0059, &[0u8; 40])],
        )
        .unwrap();

    assert_eq!(
        registry.start(id, DutyCycle::Low),
        Err(SessionError::InvalidPayload { len: 44, max: 31 })
    );
    assert_eq!(registry.state(id), Some(SetState::Idle));
    assert!(registry.radio().starts().is_empty());
}

#[test]
fn test_set_ids_cap_at_one_octet() {
    let mut registry = AdvertisingRegistry::new(
        MockRadio::new(),
        IdentityTable::new(identity(), 1),
        String::new(),
        300,
        LEGACY_ADV_DATA_MAX,
    );

    for expected in 0..=u8::MAX {
        let id = registry
            .create(AdvertisingParameters::non_connectable(), flags_only())
            .unwrap();
        assert_eq!(id, SetId(expected));
    }

    assert_eq!(
        registry.create(AdvertisingParameters::non_connectable(), flags_only()),
        Err(SessionError::ResourceExhausted)
    );
    // No context was requested for the rejected set
    assert_eq!(registry.radio().requests.len(), 256);
}

#[test]
fn test_link_layer_rejection() {
    let mut registry = registry(MockRadio::new());
    let id = registry
        .create(AdvertisingParameters::connectable(), flags_only())
        .unwrap();

    registry.radio_mut().fail_next(RadioError::Rejected(0x0C));
    assert_eq!(
        registry.start(id, DutyCycle::Low),
        Err(SessionError::LinkLayerRejected(0x0C))
    );
    assert_eq!(registry.state(id), Some(SetState::Idle));

    registry.radio_mut().fail_next(RadioError::AlreadyActive);
    assert_eq!(
        registry.start(id, DutyCycle::Low),
        Err(SessionError::AlreadyRunning(id))
    );
}

#[test]
fn test_set_payload_running_and_idle() {
    let mut registry = registry(MockRadio::new());
    let id = registry
        .create(AdvertisingParameters::non_connectable(), flags_only())
        .unwrap();

    let hrs = vec![
        AdvertisingElement::flags(AdFlags::LE_GENERAL | AdFlags::NO_BREDR),
        AdvertisingElement::uuid16_all(&[UUID_HRS]),
    ];
    registry.set_payload(id, hrs.clone()).unwrap();
    assert!(registry.radio().requests.iter().all(|r| !matches!(r, RadioRequest::Update(..))));

    registry.start(id, DutyCycle::Low).unwrap();
    registry
        .set_payload(id, vec![AdvertisingElement::uuid16_all(&[UUID_BAS])])
        .unwrap();
    assert_eq!(registry.state(id), Some(SetState::Running));
    assert_eq!(
        registry.radio().requests.last(),
        Some(&RadioRequest::Update(AdvHandle(0), vec![0x03, 0x03, 0x0F, 0x18]))
    );

    // A rejected swap keeps the previous payload
    let too_big = vec![AdvertisingElement::manufacturer_data(0x0059, &[0u8; 40])];
    assert!(registry.set_payload(id, too_big).is_err());
    assert_eq!(
        registry.get(id).unwrap().payload(),
        &[AdvertisingElement::uuid16_all(&[UUID_BAS])]
    );
}

#[test]
fn test_payload_update_on_active_context() {
    let mut registry = registry(MockRadio::new());
    let id = registry
        .create(AdvertisingParameters::non_connectable(), flags_only())
        .unwrap();
    registry.start(id, DutyCycle::Low).unwrap();

    registry.radio_mut().fail_next(RadioError::AlreadyActive);
    assert_eq!(
        registry.set_payload(id, vec![AdvertisingElement::uuid16_all(&[UUID_HRS])]),
        Err(SessionError::AlreadyRunning(id))
    );
    assert_eq!(registry.get(id).unwrap().payload(), flags_only().as_slice());
    assert_eq!(registry.state(id), Some(SetState::Running));
}

#[test]
fn test_use_name_appends_device_name() {
    let mut registry = registry(MockRadio::new());
    let id = registry
        .create(AdvertisingParameters::non_connectable().with_name(), flags_only())
        .unwrap();
    registry.start(id, DutyCycle::Low).unwrap();

    match registry.radio().last_start() {
        Some(RadioRequest::Start { payload, .. }) => {
            let decoded = advertising::decode_payload(payload);
            assert_eq!(decoded.len(), 2);
            assert_eq!(decoded[1], AdvertisingElement::complete_name(DEVICE_NAME));
        }
        other => panic!("unexpected request {:?}", other),
    }
}

#[test]
fn test_unknown_identity_rejected() {
    let mut registry = registry(MockRadio::new());
    let result = registry.create(
        AdvertisingParameters::connectable().with_identity(1),
        flags_only(),
    );
    assert!(matches!(result, Err(SessionError::InvalidParameters(_))));

    let mut rng = StdRng::seed_from_u64(1);
    registry.identities_mut().create_identity(&mut rng).unwrap();
    assert!(registry
        .create(AdvertisingParameters::connectable().with_identity(1), flags_only())
        .is_ok());
}

#[test]
fn test_connectable_sets_share_identity_exclusively() {
    let mut rng = StdRng::seed_from_u64(3);
    let mut registry = registry(MockRadio::new());
    registry.identities_mut().create_identity(&mut rng).unwrap();

    let first = registry
        .create(AdvertisingParameters::connectable().with_identity(0), flags_only())
        .unwrap();
    let second = registry
        .create(AdvertisingParameters::connectable().with_identity(0), flags_only())
        .unwrap();
    let other_identity = registry
        .create(AdvertisingParameters::connectable().with_identity(1), flags_only())
        .unwrap();
    let beacon = registry
        .create(AdvertisingParameters::non_connectable().with_identity(0), flags_only())
        .unwrap();

    registry.start(first, DutyCycle::Low).unwrap();
    assert!(matches!(
        registry.start(second, DutyCycle::Low),
        Err(SessionError::InvalidState(_))
    ));
    registry.start(other_identity, DutyCycle::Low).unwrap();
    registry.start(beacon, DutyCycle::Low).unwrap();

    registry.stop(first).unwrap();
    registry.start(second, DutyCycle::Low).unwrap();
}

#[test]
fn test_set_for_handle() {
    let mut registry = registry(MockRadio::new());
    let a = registry
        .create(AdvertisingParameters::connectable(), flags_only())
        .unwrap();
    let b = registry
        .create(AdvertisingParameters::non_connectable(), flags_only())
        .unwrap();

    assert_ne!(a, b);
    assert_eq!(registry.set_for_handle(AdvHandle(0)), Some(a));
    assert_eq!(registry.set_for_handle(AdvHandle(1)), Some(b));
    assert_eq!(registry.set_for_handle(AdvHandle(9)), None);
}
