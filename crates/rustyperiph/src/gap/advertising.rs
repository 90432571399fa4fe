//! Advertising payload elements and advertising set parameters
//!
//! An advertising payload is a sequence of `length, type, data` structures.
//! Elements are kept typed until the registry hands the encoded bytes to the
//! radio.

use crate::error::{SessionError, SessionResult};
use crate::gap::constants::*;
use crate::gap::types::PeerAddress;
use bitflags::bitflags;
use byteorder::{LittleEndian, WriteBytesExt};

bitflags! {
    /// Flags AD type values
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct AdFlags: u8 {
        const LE_LIMITED = 0x01;
        const LE_GENERAL = 0x02;
        const NO_BREDR = 0x04;
    }
}

/// One typed fragment of an advertising payload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdvertisingElement {
    pub ad_type: u8,
    pub data: Vec<u8>,
}

impl AdvertisingElement {
    pub fn new(ad_type: u8, data: Vec<u8>) -> Self {
        Self { ad_type, data }
    }

    pub fn flags(flags: AdFlags) -> Self {
        Self::new(ADV_TYPE_FLAGS, vec![flags.bits()])
    }

    /// Complete list of 16-bit service UUIDs
    pub fn uuid16_all(uuids: &[u16]) -> Self {
        let mut data = Vec::with_capacity(uuids.len() * 2);
        for uuid in uuids {
            // Writing into a Vec cannot fail
            let _ = data.write_u16::<LittleEndian>(*uuid);
        }
        Self::new(ADV_TYPE_16BIT_SERVICE_UUID_COMPLETE, data)
    }

    /// Complete list of 128-bit service UUIDs, each in little-endian order
    pub fn uuid128_all(uuids: &[[u8; 16]]) -> Self {
        Self::new(ADV_TYPE_128BIT_SERVICE_UUID_COMPLETE, uuids.concat())
    }

    pub fn manufacturer_data(company_id: u16, payload: &[u8]) -> Self {
        let mut data = Vec::with_capacity(payload.len() + 2);
        let _ = data.write_u16::<LittleEndian>(company_id);
        data.extend_from_slice(payload);
        Self::new(ADV_TYPE_MANUFACTURER_SPECIFIC, data)
    }

    pub fn complete_name(name: &str) -> Self {
        Self::new(ADV_TYPE_COMPLETE_LOCAL_NAME, name.as_bytes().to_vec())
    }

    /// Encoded size including the length and type octets
    pub fn encoded_len(&self) -> usize {
        self.data.len() + 2
    }
}

/// Encode elements into a single payload no longer than `max` bytes
pub fn encode_payload(elements: &[AdvertisingElement], max: usize) -> SessionResult<Vec<u8>> {
    let len: usize = elements.iter().map(AdvertisingElement::encoded_len).sum();
    if len > max {
        return Err(SessionError::InvalidPayload { len, max });
    }

    let mut payload = Vec::with_capacity(len);
    for element in elements {
        // len <= max <= 251, so every element length fits in one octet
        payload.push((element.data.len() + 1) as u8);
        payload.push(element.ad_type);
        payload.extend_from_slice(&element.data);
    }

    Ok(payload)
}

/// Decode an encoded payload back into elements
///
/// Decoding stops at the first zero-length or truncated structure.
pub fn decode_payload(data: &[u8]) -> Vec<AdvertisingElement> {
    let mut result = Vec::new();
    let mut i = 0;

    while i < data.len() {
        let length = data[i] as usize;
        if length == 0 || i + length >= data.len() {
            break;
        }

        let ad_type = data[i + 1];
        let ad_data = data[i + 2..i + 1 + length].to_vec();

        result.push(AdvertisingElement::new(ad_type, ad_data));

        i += 1 + length;
    }

    result
}

/// Parameters of an advertising set
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdvertisingParameters {
    /// Minimum advertising interval (0.625 ms units)
    pub interval_min: u16,
    /// Maximum advertising interval (0.625 ms units)
    pub interval_max: u16,
    /// Whether the set accepts connections
    pub connectable: bool,
    /// Advertise with the identity address instead of a private address
    pub use_identity: bool,
    /// Append the device name to the payload
    pub use_name: bool,
    /// Local identity slot the set advertises from
    pub identity: u8,
    /// Only this peer may connect (directed advertising)
    pub directed_peer: Option<PeerAddress>,
}

impl Default for AdvertisingParameters {
    fn default() -> Self {
        Self {
            interval_min: GAP_ADV_FAST_INT_MIN_2,
            interval_max: GAP_ADV_FAST_INT_MAX_2,
            connectable: false,
            use_identity: false,
            use_name: false,
            identity: 0,
            directed_peer: None,
        }
    }
}

impl AdvertisingParameters {
    /// Connectable undirected advertising at the fast interval
    pub fn connectable() -> Self {
        Self {
            connectable: true,
            ..Self::default()
        }
    }

    /// Non-connectable advertising at the fast interval
    pub fn non_connectable() -> Self {
        Self::default()
    }

    /// Connectable advertising directed at `peer`
    pub fn directed(peer: PeerAddress) -> Self {
        Self {
            connectable: true,
            directed_peer: Some(peer),
            ..Self::default()
        }
    }

    pub fn with_identity(mut self, identity: u8) -> Self {
        self.identity = identity;
        self.use_identity = true;
        self
    }

    pub fn with_name(mut self) -> Self {
        self.use_name = true;
        self
    }

    pub fn with_interval(mut self, min: u16, max: u16) -> Self {
        self.interval_min = min;
        self.interval_max = max;
        self
    }

    pub fn is_directed(&self) -> bool {
        self.directed_peer.is_some()
    }

    pub fn validate(&self) -> SessionResult<()> {
        if self.interval_min > self.interval_max {
            return Err(SessionError::InvalidParameters(format!(
                "interval_min 0x{:04x} exceeds interval_max 0x{:04x}",
                self.interval_min, self.interval_max
            )));
        }

        if self.interval_min < ADV_INTERVAL_MIN || self.interval_max > ADV_INTERVAL_MAX {
            return Err(SessionError::InvalidParameters(format!(
                "interval 0x{:04x}..0x{:04x} out of range",
                self.interval_min, self.interval_max
            )));
        }

        if self.directed_peer.is_some() && !self.connectable {
            return Err(SessionError::InvalidParameters(
                "directed advertising must be connectable".into(),
            ));
        }

        Ok(())
    }
}
