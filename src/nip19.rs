//! NIP-19 bech32 entity decoding.
//!
//! Only decoding is needed here. Bare entities (`note`, `npub`) carry the raw
//! 32 bytes as their payload, while shareable entities (`nevent`, `nprofile`)
//! carry a TLV stream:
//!
//! | type | meaning                                   |
//! |------|-------------------------------------------|
//! | `0`  | special: event id or pubkey (32 bytes)     |
//! | `1`  | relay URL hint (UTF-8)                     |
//! | `2`  | author pubkey (32 bytes, `nevent` only)    |
//! | `3`  | kind (u32, big endian, `nevent` only)      |
//!
//! Unknown TLV types are skipped as the NIP requires.

use thiserror::Error;

const TLV_SPECIAL: u8 = 0;
const TLV_RELAY: u8 = 1;
const TLV_AUTHOR: u8 = 2;
const TLV_KIND: u8 = 3;

/// Errors produced while decoding a NIP-19 string.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum Nip19Error {
    #[error("bech32 decoding error: {0}")]
    Bech32(String),
    #[error("expected {expected} bytes, got {got}")]
    InvalidLength { expected: usize, got: usize },
    #[error("malformed TLV entry")]
    MalformedTlv,
    #[error("missing required TLV entry of type {0}")]
    MissingTlv(u8),
}

/// Event reference decoded from an `nevent` string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventPointer {
    pub id: [u8; 32],
    pub relays: Vec<String>,
    pub author: Option<[u8; 32]>,
    pub kind: Option<u32>,
}

/// Profile reference decoded from an `nprofile` string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProfilePointer {
    pub pubkey: [u8; 32],
    pub relays: Vec<String>,
}

/// A decoded NIP-19 entity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Entity {
    /// `note1...`
    Note([u8; 32]),
    /// `npub1...`
    Pubkey([u8; 32]),
    /// `nevent1...`
    Event(EventPointer),
    /// `nprofile1...`
    Profile(ProfilePointer),
    /// Any other valid bech32 string (`naddr`, `nsec`, ...). Only the prefix is kept.
    Other(String),
}

/// Decode a bech32 NIP-19 string.
pub fn decode(s: &str) -> Result<Entity, Nip19Error> {
    let (hrp, data) = bech32::decode(s).map_err(|e| Nip19Error::Bech32(e.to_string()))?;
    match hrp.to_lowercase().as_str() {
        "note" => Ok(Entity::Note(to_array(&data)?)),
        "npub" => Ok(Entity::Pubkey(to_array(&data)?)),
        "nevent" => decode_nevent(&data).map(Entity::Event),
        "nprofile" => decode_nprofile(&data).map(Entity::Profile),
        other => Ok(Entity::Other(other.to_string())),
    }
}

fn decode_nevent(data: &[u8]) -> Result<EventPointer, Nip19Error> {
    let mut id = None;
    let mut relays = vec![];
    let mut author = None;
    let mut kind = None;
    for (t, v) in tlv_entries(data)? {
        match t {
            // the first special entry wins
            TLV_SPECIAL if id.is_none() => id = Some(to_array(v)?),
            TLV_RELAY => relays.push(String::from_utf8_lossy(v).into_owned()),
            TLV_AUTHOR if author.is_none() => author = Some(to_array(v)?),
            TLV_KIND if kind.is_none() => {
                let bytes: [u8; 4] = v.try_into().map_err(|_| Nip19Error::InvalidLength {
                    expected: 4,
                    got: v.len(),
                })?;
                kind = Some(u32::from_be_bytes(bytes));
            }
            _ => {}
        }
    }
    Ok(EventPointer {
        id: id.ok_or(Nip19Error::MissingTlv(TLV_SPECIAL))?,
        relays,
        author,
        kind,
    })
}

fn decode_nprofile(data: &[u8]) -> Result<ProfilePointer, Nip19Error> {
    let mut pubkey = None;
    let mut relays = vec![];
    for (t, v) in tlv_entries(data)? {
        match t {
            TLV_SPECIAL if pubkey.is_none() => pubkey = Some(to_array(v)?),
            TLV_RELAY => relays.push(String::from_utf8_lossy(v).into_owned()),
            _ => {}
        }
    }
    Ok(ProfilePointer {
        pubkey: pubkey.ok_or(Nip19Error::MissingTlv(TLV_SPECIAL))?,
        relays,
    })
}

/// Split a TLV byte stream into `(type, value)` pairs.
fn tlv_entries(mut data: &[u8]) -> Result<Vec<(u8, &[u8])>, Nip19Error> {
    let mut entries = vec![];
    while !data.is_empty() {
        let [t, len, rest @ ..] = data else {
            return Err(Nip19Error::MalformedTlv);
        };
        let len = *len as usize;
        if rest.len() < len {
            return Err(Nip19Error::MalformedTlv);
        }
        entries.push((*t, &rest[..len]));
        data = &rest[len..];
    }
    Ok(entries)
}

fn to_array(bytes: &[u8]) -> Result<[u8; 32], Nip19Error> {
    bytes.try_into().map_err(|_| Nip19Error::InvalidLength {
        expected: 32,
        got: bytes.len(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const EVENT_HEX: &str = "c824e1184d4f3660097d8299632ac723f5bfaea1eb569867f4924f2f0713a321";
    const NOTE: &str = "note1eqjwzxzdfumxqztas2vkx2k8y06mlt4padtfsel5jf8j7pcn5vsssd2g8m";
    const NEVENT: &str = "nevent1qqsvsf8prpx57dnqp97c9xtr9trj8adl46s7k45cvl6fyne0quf6xggprfmhxue69uhkuun9d3shjtnr94ehgetvd3shytnwv46qhq36uw";

    const PUBKEY_HEX: &str = "d1d1747115d16751a97c239f46ec1703292c3b7e9988b9ebdd4ec4705b15ed44";
    const NPUB: &str = "npub168ghgug469n4r2tuyw05dmqhqv5jcwm7nxytn67afmz8qkc4a4zqsu2dlc";
    const NPROFILE: &str = "nprofile1qqsdr5t5wy2aze63497z886xastsx2fv8dlfnz9ea0w5a3rstv2763qprfmhxue69uhkuun9d3shjtnr94ehgetvd3shytnwv46q3ujeza";

    #[test]
    fn decodes_note() {
        let Entity::Note(id) = decode(NOTE).unwrap() else {
            panic!("expected note");
        };
        assert_eq!(hex::encode(id), EVENT_HEX);
    }

    #[test]
    fn decodes_nevent_with_relay_hint() {
        let Entity::Event(ptr) = decode(NEVENT).unwrap() else {
            panic!("expected nevent");
        };
        assert_eq!(hex::encode(ptr.id), EVENT_HEX);
        assert_eq!(ptr.relays.len(), 1);
        assert!(ptr.relays[0].starts_with("wss://"));
    }

    #[test]
    fn decodes_npub_and_nprofile() {
        let Entity::Pubkey(pk) = decode(NPUB).unwrap() else {
            panic!("expected npub");
        };
        assert_eq!(hex::encode(pk), PUBKEY_HEX);

        let Entity::Profile(ptr) = decode(NPROFILE).unwrap() else {
            panic!("expected nprofile");
        };
        assert_eq!(hex::encode(ptr.pubkey), PUBKEY_HEX);
        assert_eq!(ptr.relays.len(), 1);
    }

    #[test]
    fn rejects_garbage_and_bad_checksum() {
        assert!(matches!(decode("deadbeef"), Err(Nip19Error::Bech32(_))));
        let mut tampered = NOTE.to_string();
        tampered.pop();
        tampered.push('q');
        assert!(decode(&tampered).is_err());
    }

    #[test]
    fn tlv_parsing() {
        let data = [0u8, 2, 0xaa, 0xbb, 1, 1, b'x'];
        let entries = tlv_entries(&data).unwrap();
        assert_eq!(entries, vec![(0, &[0xaa, 0xbb][..]), (1, &b"x"[..])]);
        assert_eq!(tlv_entries(&[0, 5, 1]), Err(Nip19Error::MalformedTlv));
        assert_eq!(tlv_entries(&[0]), Err(Nip19Error::MalformedTlv));
    }

    #[test]
    fn nevent_without_special_entry_is_rejected() {
        assert_eq!(
            decode_nevent(&[1, 1, b'x']),
            Err(Nip19Error::MissingTlv(TLV_SPECIAL))
        );
    }
}
