// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Binary framing that keeps entry metadata next to the payload.
//!
//! Layout: magic byte, version, flags, `cached_at` in milliseconds since the
//! Unix epoch, TTL in milliseconds, then the raw payload. Integers are big-endian.
//! Flags mark which of the two timestamps are meaningful.

use std::time::{Duration, SystemTime};

use bytes::{Buf, BufMut, Bytes, BytesMut};
use strata_tier::{CacheEntry, Error};

const MAGIC: u8 = 0x53;
const VERSION: u8 = 1;
const HAS_CACHED_AT: u8 = 0b01;
const HAS_TTL: u8 = 0b10;
const HEADER_LEN: usize = 3 + 8 + 8;

fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

pub(crate) fn encode(entry: &CacheEntry) -> Bytes {
    let mut flags = 0;
    let cached_at = entry.cached_at().map_or(0, |at| {
        flags |= HAS_CACHED_AT;
        millis(at.duration_since(SystemTime::UNIX_EPOCH).unwrap_or_default())
    });
    let ttl = entry.ttl().map_or(0, |ttl| {
        flags |= HAS_TTL;
        millis(ttl)
    });

    let mut buf = BytesMut::with_capacity(HEADER_LEN + entry.value().len());
    buf.put_u8(MAGIC);
    buf.put_u8(VERSION);
    buf.put_u8(flags);
    buf.put_u64(cached_at);
    buf.put_u64(ttl);
    buf.put_slice(entry.value());
    buf.freeze()
}

pub(crate) fn decode(mut bytes: Bytes) -> Result<CacheEntry, Error> {
    if bytes.len() < HEADER_LEN {
        return Err(Error::serialization(format!("stored value is {} bytes, shorter than the header", bytes.len())));
    }

    let magic = bytes.get_u8();
    let version = bytes.get_u8();
    if magic != MAGIC || version != VERSION {
        return Err(Error::serialization(format!("unrecognized envelope (magic {magic:#x}, version {version})")));
    }

    let flags = bytes.get_u8();
    let cached_at = bytes.get_u64();
    let ttl = bytes.get_u64();

    let cached_at = (flags & HAS_CACHED_AT != 0).then(|| SystemTime::UNIX_EPOCH + Duration::from_millis(cached_at));
    let ttl = (flags & HAS_TTL != 0).then(|| Duration::from_millis(ttl));

    Ok(match cached_at {
        Some(at) => CacheEntry::with_cached_at(bytes, at, ttl),
        None => {
            let mut entry = CacheEntry::new(bytes);
            if let Some(ttl) = ttl {
                entry.set_ttl(ttl);
            }
            entry
        }
    })
}

#[cfg(test)]
mod tests {
    use strata_tier::ErrorKind;

    use super::*;

    #[test]
    fn metadata_survives_framing() {
        let at = SystemTime::UNIX_EPOCH + Duration::from_millis(1_700_000_000_123);
        let entry = CacheEntry::with_cached_at("payload", at, Some(Duration::from_secs(300)));

        let decoded = decode(encode(&entry)).expect("decodes");
        assert_eq!(decoded, entry);
    }

    #[test]
    fn epoch_timestamp_is_not_confused_with_absence() {
        let entry = CacheEntry::with_cached_at("x", SystemTime::UNIX_EPOCH, None);
        let decoded = decode(encode(&entry)).expect("decodes");
        assert_eq!(decoded.cached_at(), Some(SystemTime::UNIX_EPOCH));
        assert_eq!(decoded.ttl(), None);
    }

    #[test]
    fn foreign_bytes_are_rejected() {
        let err = decode(Bytes::from_static(b"plain text value that is long")).expect_err("rejected");
        assert_eq!(err.kind(), ErrorKind::Serialization);

        let err = decode(Bytes::from_static(b"short")).expect_err("rejected");
        assert_eq!(err.kind(), ErrorKind::Serialization);
    }
}
