use bytes::{Buf, BufMut};
use commonware_codec::{EncodeSize, Error, Read, ReadExt, Write};
use std::collections::BTreeMap;

/// Upper bound on any string stored in ledger values (addresses, IDs, names).
pub const MAX_STRING_LEN: usize = 1024;

/// Upper bound on the number of entries in any map stored in ledger values.
pub const MAX_MAP_ENTRIES: usize = 65_536;

/// Helper to write a string as length-prefixed UTF-8 bytes.
pub fn write_string(s: &str, writer: &mut impl BufMut) {
    let bytes = s.as_bytes();
    (bytes.len() as u32).write(writer);
    writer.put_slice(bytes);
}

/// Helper to read a string from length-prefixed UTF-8 bytes.
pub fn read_string(reader: &mut impl Buf, max_len: usize) -> Result<String, Error> {
    let bytes = read_bytes(reader, max_len)?;
    String::from_utf8(bytes).map_err(|_| Error::Invalid("String", "invalid UTF-8"))
}

pub fn string_encode_size(s: &str) -> usize {
    4 + s.len()
}

/// Length-prefixed raw bytes (external token IDs, external transaction IDs).
pub fn write_bytes(bytes: &[u8], writer: &mut impl BufMut) {
    (bytes.len() as u32).write(writer);
    writer.put_slice(bytes);
}

pub fn read_bytes(reader: &mut impl Buf, max_len: usize) -> Result<Vec<u8>, Error> {
    let len = u32::read(reader)? as usize;
    if len > max_len {
        return Err(Error::Invalid("Bytes", "too long"));
    }
    if reader.remaining() < len {
        return Err(Error::EndOfBuffer);
    }
    let mut bytes = vec![0u8; len];
    reader.copy_to_slice(&mut bytes);
    Ok(bytes)
}

pub fn bytes_encode_size(bytes: &[u8]) -> usize {
    4 + bytes.len()
}

fn read_len(reader: &mut impl Buf) -> Result<usize, Error> {
    let len = u32::read(reader)? as usize;
    if len > MAX_MAP_ENTRIES {
        return Err(Error::Invalid("Map", "too many entries"));
    }
    Ok(len)
}

/// Writes a map with codec keys and values in key order.
pub fn write_map<K: Write, V: Write>(map: &BTreeMap<K, V>, writer: &mut impl BufMut) {
    (map.len() as u32).write(writer);
    for (key, value) in map {
        key.write(writer);
        value.write(writer);
    }
}

/// Reads a map written by [`write_map`], rejecting unsorted or duplicate keys so
/// every map has exactly one encoding.
pub fn read_map<K, V>(reader: &mut impl Buf) -> Result<BTreeMap<K, V>, Error>
where
    K: Read<Cfg = ()> + Ord,
    V: Read<Cfg = ()>,
{
    let len = read_len(reader)?;
    let mut map = BTreeMap::new();
    for _ in 0..len {
        let key = K::read(reader)?;
        let value = V::read(reader)?;
        if let Some((last, _)) = map.last_key_value() {
            if &key <= last {
                return Err(Error::Invalid("Map", "keys not strictly increasing"));
            }
        }
        map.insert(key, value);
    }
    Ok(map)
}

pub fn map_encode_size<K: EncodeSize, V: EncodeSize>(map: &BTreeMap<K, V>) -> usize {
    4 + map
        .iter()
        .map(|(k, v)| k.encode_size() + v.encode_size())
        .sum::<usize>()
}

/// Writes a map keyed by strings.
pub fn write_string_map<V: Write>(map: &BTreeMap<String, V>, writer: &mut impl BufMut) {
    (map.len() as u32).write(writer);
    for (key, value) in map {
        write_string(key, writer);
        value.write(writer);
    }
}

pub fn read_string_map<V: Read<Cfg = ()>>(
    reader: &mut impl Buf,
) -> Result<BTreeMap<String, V>, Error> {
    let len = read_len(reader)?;
    let mut map = BTreeMap::new();
    for _ in 0..len {
        let key = read_string(reader, MAX_STRING_LEN)?;
        let value = V::read(reader)?;
        if let Some((last, _)) = map.last_key_value() {
            if &key <= last {
                return Err(Error::Invalid("Map", "keys not strictly increasing"));
            }
        }
        map.insert(key, value);
    }
    Ok(map)
}

pub fn string_map_encode_size<V: EncodeSize>(map: &BTreeMap<String, V>) -> usize {
    4 + map
        .iter()
        .map(|(k, v)| string_encode_size(k) + v.encode_size())
        .sum::<usize>()
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::BytesMut;
    use proptest::prelude::*;
    use rand::{rngs::StdRng, RngCore, SeedableRng};

    #[test]
    fn read_string_rejects_too_long() {
        let mut buf = BytesMut::new();
        (5u32).write(&mut buf);
        buf.extend_from_slice(b"hello");

        let mut reader = buf.as_ref();
        let err = read_string(&mut reader, 4).expect_err("should reject too-long string");
        assert!(matches!(err, Error::Invalid("Bytes", "too long")));
    }

    #[test]
    fn read_string_rejects_invalid_utf8() {
        let mut buf = BytesMut::new();
        (2u32).write(&mut buf);
        buf.extend_from_slice(&[0xff, 0xff]);

        let mut reader = buf.as_ref();
        let err = read_string(&mut reader, 10).expect_err("should reject invalid UTF-8");
        assert!(matches!(err, Error::Invalid("String", "invalid UTF-8")));
    }

    #[test]
    fn string_map_rejects_unsorted_keys() {
        let mut buf = BytesMut::new();
        (2u32).write(&mut buf);
        write_string("b", &mut buf);
        1u64.write(&mut buf);
        write_string("a", &mut buf);
        2u64.write(&mut buf);

        let mut reader = buf.as_ref();
        let err = read_string_map::<u64>(&mut reader).expect_err("unsorted keys");
        assert!(matches!(err, Error::Invalid("Map", _)));
    }

    #[test]
    fn string_map_encode_size_matches_written_bytes() {
        let mut map = BTreeMap::new();
        map.insert("custodian-1".to_string(), 10u64);
        map.insert("custodian-2".to_string(), 20u64);

        let mut buf = BytesMut::new();
        write_string_map(&map, &mut buf);
        assert_eq!(buf.len(), string_map_encode_size(&map));

        let mut reader = buf.as_ref();
        assert_eq!(read_string_map::<u64>(&mut reader).expect("decode"), map);
    }

    #[test]
    fn read_helpers_survive_random_input() {
        let mut rng = StdRng::seed_from_u64(0x5eed_c0de);
        for _ in 0..500 {
            let len = (rng.next_u32() as usize) % 256;
            let mut buf = vec![0u8; len];
            rng.fill_bytes(&mut buf);

            let mut reader = buf.as_slice();
            if let Ok(s) = read_string(&mut reader, 64) {
                assert!(s.len() <= 64);
            }
            let mut reader = buf.as_slice();
            let _ = read_string_map::<u64>(&mut reader);
        }
    }

    proptest! {
        #[test]
        fn string_map_size_matches_bytes(
            map in prop::collection::btree_map("[a-z0-9-]{0,24}", any::<u64>(), 0..16)
        ) {
            let mut buf = BytesMut::new();
            write_string_map(&map, &mut buf);
            prop_assert_eq!(buf.len(), string_map_encode_size(&map));

            let mut reader = buf.as_ref();
            prop_assert_eq!(read_string_map::<u64>(&mut reader).unwrap(), map);
            prop_assert!(reader.is_empty());
        }
    }
}
