/// Nearby Action advertisement payload
///
/// The bridge advertises a fixed-layout Nearby Action frame carrying
/// truncated identity digests so nearby requestors recognize who is
/// sharing which network. Construction is deterministic and pure; the
/// platform side wraps the payload in a manufacturer-data LE
/// advertisement under Apple's company identifier.
use sha2::{Digest, Sha256};

/// Bluetooth SIG company identifier the payload is advertised under
pub const APPLE_COMPANY_ID: u16 = 0x004C;

/// Length of the Nearby Action payload in bytes
pub const PAYLOAD_LEN: usize = 19;

/// Payload template: type 0x0F (Nearby Action), remaining length 0x11,
/// action flags 0xC0, action type 0x08 (Wi-Fi password sharing), then
/// the authentication tag, three contact slots and the SSID slot, all
/// zeroed until filled.
const TEMPLATE: [u8; PAYLOAD_LEN] = [
    0x0F, 0x11, // type, length
    0xC0, // action flags
    0x08, // action type
    0x00, 0x00, 0x00, // authentication tag
    0x00, 0x00, 0x00, // contact 1
    0x00, 0x00, 0x00, // contact 2
    0x00, 0x00, 0x00, // contact 3
    0x00, 0x00, 0x00, // SSID
];

/// Build the advertisement payload for a contact identity and SSID.
///
/// All three contact slots carry the same first three bytes of
/// `sha256(contact)`; the wire format repeats them and that repetition
/// is reproduced here verbatim. The SSID slot carries the first three
/// bytes of `sha256(ssid)`.
pub fn nearby_action_payload(contact: &str, ssid: &str) -> [u8; PAYLOAD_LEN] {
    let contact_hash = Sha256::digest(contact.as_bytes());
    let ssid_hash = Sha256::digest(ssid.as_bytes());

    let mut data = TEMPLATE;
    data[7..10].copy_from_slice(&contact_hash[..3]);
    data[10..13].copy_from_slice(&contact_hash[..3]);
    data[13..16].copy_from_slice(&contact_hash[..3]);
    data[16..19].copy_from_slice(&ssid_hash[..3]);
    data
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_payload_header_preserved() {
        let payload = nearby_action_payload("alice@example.com", "HomeNet");
        assert_eq!(payload.len(), PAYLOAD_LEN);
        assert_eq!(&payload[..7], &[0x0F, 0x11, 0xC0, 0x08, 0x00, 0x00, 0x00]);
    }

    #[test]
    fn test_contact_slots_repeat_digest_prefix() {
        let payload = nearby_action_payload("alice@example.com", "HomeNet");
        let expected = Sha256::digest(b"alice@example.com");

        assert_eq!(&payload[7..10], &expected[..3]);
        assert_eq!(&payload[10..13], &expected[..3]);
        assert_eq!(&payload[13..16], &expected[..3]);
    }

    #[test]
    fn test_ssid_slot() {
        let payload = nearby_action_payload("alice@example.com", "HomeNet");
        let expected = Sha256::digest(b"HomeNet");
        assert_eq!(&payload[16..19], &expected[..3]);
    }

    #[test]
    fn test_ssid_change_only_touches_ssid_slot() {
        let a = nearby_action_payload("alice@example.com", "HomeNet");
        let b = nearby_action_payload("alice@example.com", "CoffeeShop");
        assert_eq!(&a[..16], &b[..16]);
        assert_ne!(&a[16..19], &b[16..19]);
    }
}
