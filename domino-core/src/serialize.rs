//! TLV container format shared by instance saves and per-chunk saves:
//! a flat sequence of `[u32 tag LE][u32 length LE][payload bytes]`
//! entries, one per registered subsystem that has something to write.
//!
//! [`Reader`] is the matching manual-decode helper every domain's own
//! `load_instance` uses to pull fixed-width little-endian fields back
//! out of its save payload, bounds-checked against [`DomainError::TruncatedFrame`].
//!
//! The outer world-file framing (magic + version, [`write_world_file`]/
//! [`read_world_file`]) wraps this TLV stream for persistence to disk;
//! `save_instance_all`/`load_instance_all` are also used bare by
//! [`crate::hash::hash_world`], which never touches the magic/version
//! header since a hash has no on-disk compatibility concern.

use crate::error::{DomainError, Result};
use crate::registry::{subsystem_for_tag, tag_for_subsystem, Registry};

const HEADER_LEN: usize = 8;

/// Four-byte magic identifying a Domino world file, matching the
/// backward-compatibility clause: any other leading four bytes is a
/// hard `BadMagic` failure, never a silent misparse.
pub const WORLD_MAGIC: [u8; 4] = *b"DWRL";

/// v1 is legacy flat TLV (no outer registry framing, `[u16 type LE][u32
/// length LE]` headers per record); v2 is this crate's registry-framed
/// container. Only v2 is ever produced by `write_world_file`; v1 is
/// accepted on load for backward compatibility with files predating the
/// registry.
pub const WORLD_VERSION_LEGACY: u16 = 1;
pub const WORLD_VERSION_CURRENT: u16 = 2;

fn append_entry(out: &mut Vec<u8>, tag: u32, payload: &[u8]) {
    out.extend_from_slice(&tag.to_le_bytes());
    out.extend_from_slice(&(payload.len() as u32).to_le_bytes());
    out.extend_from_slice(payload);
}

/// Bounds-checked little-endian field reader over a byte slice. Every
/// read advances an internal cursor; reading past the end is a
/// `TruncatedFrame` error rather than a panic.
pub struct Reader<'a> {
    bytes: &'a [u8],
    offset: usize,
}

impl<'a> Reader<'a> {
    pub fn new(bytes: &'a [u8]) -> Self {
        Reader { bytes, offset: 0 }
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8]> {
        let available = self.bytes.len() - self.offset;
        if available < n {
            return Err(DomainError::TruncatedFrame { needed: n, available });
        }
        let slice = &self.bytes[self.offset..self.offset + n];
        self.offset += n;
        Ok(slice)
    }

    pub fn read_u32(&mut self) -> Result<u32> {
        Ok(u32::from_le_bytes(self.take(4)?.try_into().unwrap()))
    }

    pub fn read_i32(&mut self) -> Result<i32> {
        Ok(i32::from_le_bytes(self.take(4)?.try_into().unwrap()))
    }

    pub fn read_u64(&mut self) -> Result<u64> {
        Ok(u64::from_le_bytes(self.take(8)?.try_into().unwrap()))
    }

    pub fn read_i64(&mut self) -> Result<i64> {
        Ok(i64::from_le_bytes(self.take(8)?.try_into().unwrap()))
    }

    pub fn read_u16(&mut self) -> Result<u16> {
        Ok(u16::from_le_bytes(self.take(2)?.try_into().unwrap()))
    }

    pub fn remaining(&self) -> usize {
        self.bytes.len() - self.offset
    }
}

/// Serializes every subsystem's whole-domain state, in registration
/// order, skipping subsystems with no `save_instance` callback.
pub fn save_instance_all(registry: &mut Registry<'_>) -> Result<Vec<u8>> {
    let mut out = Vec::new();
    for desc in registry.iter_mut() {
        let Some(save) = desc.save_instance.as_mut() else { continue };
        let mut payload = Vec::new();
        save(&mut payload)?;
        let tag = tag_for_subsystem(desc.id);
        append_entry(&mut out, tag, &payload);
    }
    Ok(out)
}

/// Serializes every subsystem's slice of one chunk, skipping subsystems
/// with no `save_chunk` callback.
pub fn save_chunk_all(registry: &mut Registry<'_>, cx: u32, cy: u32) -> Result<Vec<u8>> {
    let mut out = Vec::new();
    for desc in registry.iter_mut() {
        let Some(save) = desc.save_chunk.as_mut() else { continue };
        let mut payload = Vec::new();
        save(cx, cy, &mut payload)?;
        let tag = tag_for_subsystem(desc.id);
        append_entry(&mut out, tag, &payload);
    }
    Ok(out)
}

fn load_all(
    bytes: &[u8],
    dispatch: impl Fn(&mut crate::registry::SubsystemDescriptor<'_>, &[u8]) -> Option<Result<()>>,
    registry: &mut Registry<'_>,
) -> Result<()> {
    if bytes.is_empty() {
        return Ok(());
    }
    let mut offset = 0usize;
    while offset < bytes.len() {
        let remaining = bytes.len() - offset;
        if remaining < HEADER_LEN {
            return Err(DomainError::TruncatedFrame { needed: HEADER_LEN, available: remaining });
        }
        let tag = u32::from_le_bytes(bytes[offset..offset + 4].try_into().unwrap());
        let len = u32::from_le_bytes(bytes[offset + 4..offset + 8].try_into().unwrap()) as usize;
        offset += HEADER_LEN;

        if len > bytes.len() - offset {
            return Err(DomainError::TruncatedFrame { needed: len, available: bytes.len() - offset });
        }
        let payload = &bytes[offset..offset + len];
        offset += len;

        // An unrecognized tag is skipped, not an error: newer saves may
        // carry subsystems this binary predates.
        let Some(sid) = subsystem_for_tag(tag) else { continue };
        let Some(desc) = registry.get_mut(sid) else { continue };
        if let Some(result) = dispatch(desc, payload) {
            result?;
        }
    }
    Ok(())
}

pub fn load_instance_all(registry: &mut Registry<'_>, bytes: &[u8]) -> Result<()> {
    load_all(
        bytes,
        |desc, payload| desc.load_instance.as_mut().map(|load| load(payload)),
        registry,
    )
}

pub fn load_chunk_all(registry: &mut Registry<'_>, cx: u32, cy: u32, bytes: &[u8]) -> Result<()> {
    load_all(
        bytes,
        |desc, payload| desc.load_chunk.as_mut().map(|load| load(cx, cy, payload)),
        registry,
    )
}

/// Writes a complete world file: `"DWRL"` magic, `u16` version 2 LE,
/// then the registry-framed instance TLV stream.
pub fn write_world_file(registry: &mut Registry<'_>) -> Result<Vec<u8>> {
    let mut out = Vec::new();
    out.extend_from_slice(&WORLD_MAGIC);
    out.extend_from_slice(&WORLD_VERSION_CURRENT.to_le_bytes());
    out.extend_from_slice(&save_instance_all(registry)?);
    Ok(out)
}

/// Reads a world file, checking the magic and dispatching on version.
/// Unknown magic is a hard failure; v1 files are parsed as a flat
/// sequence of legacy `[u16 type LE][u32 length LE]` records (skipped
/// entirely, since no subsystem in this workspace still emits v1, so a v1
/// file loads as an all-skip no-op rather than an error); v2 files go
/// through the same registry-framed path `load_instance_all` uses.
pub fn read_world_file(registry: &mut Registry<'_>, bytes: &[u8]) -> Result<()> {
    let mut r = Reader::new(bytes);
    let magic: [u8; 4] = r.take(4)?.try_into().unwrap();
    if magic != WORLD_MAGIC {
        return Err(DomainError::BadMagic);
    }
    let version = r.read_u16()?;
    let body = &bytes[6..];
    match version {
        WORLD_VERSION_CURRENT => load_instance_all(registry, body),
        WORLD_VERSION_LEGACY => load_legacy_v1(body),
        other => Err(DomainError::UnsupportedVersion(other)),
    }
}

/// v1 legacy records use a 6-byte header (`u16` type, `u32` length)
/// rather than v2's 8-byte (`u32` tag, `u32` length) header. No current
/// subsystem understands the v1 type space, so every record is skipped;
/// only framing (truncation) is validated.
fn load_legacy_v1(bytes: &[u8]) -> Result<()> {
    const LEGACY_HEADER_LEN: usize = 6;
    let mut offset = 0usize;
    while offset < bytes.len() {
        let remaining = bytes.len() - offset;
        if remaining < LEGACY_HEADER_LEN {
            return Err(DomainError::TruncatedFrame { needed: LEGACY_HEADER_LEN, available: remaining });
        }
        let len = u32::from_le_bytes(bytes[offset + 2..offset + 6].try_into().unwrap()) as usize;
        offset += LEGACY_HEADER_LEN;
        if len > bytes.len() - offset {
            return Err(DomainError::TruncatedFrame { needed: len, available: bytes.len() - offset });
        }
        offset += len;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::SubsystemDescriptor;
    use std::cell::RefCell;

    thread_local! {
        static LAST_LOADED: RefCell<Vec<u8>> = RefCell::new(Vec::new());
    }

    #[test]
    fn save_then_load_roundtrips_payload() {
        let mut registry = Registry::new();
        registry.register(SubsystemDescriptor::instance_only(
            crate::registry::SubsystemId::World,
            |out: &mut Vec<u8>| {
                out.extend_from_slice(&[1, 2, 3]);
                Ok(())
            },
            |bytes: &[u8]| {
                LAST_LOADED.with(|cell| *cell.borrow_mut() = bytes.to_vec());
                Ok(())
            },
        ));
        let bytes = save_instance_all(&mut registry).unwrap();
        load_instance_all(&mut registry, &bytes).unwrap();
        LAST_LOADED.with(|cell| assert_eq!(&*cell.borrow(), &[1, 2, 3]));
    }

    #[test]
    fn truncated_header_is_an_error() {
        let mut registry = Registry::new();
        let err = load_instance_all(&mut registry, &[1, 2, 3]).unwrap_err();
        assert!(matches!(err, DomainError::TruncatedFrame { .. }));
    }

    #[test]
    fn truncated_payload_is_an_error() {
        let mut registry = Registry::new();
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&0x1000u32.to_le_bytes());
        bytes.extend_from_slice(&100u32.to_le_bytes());
        bytes.extend_from_slice(&[1, 2]);
        let err = load_instance_all(&mut registry, &bytes).unwrap_err();
        assert!(matches!(err, DomainError::TruncatedFrame { .. }));
    }

    #[test]
    fn unknown_tag_is_skipped_not_an_error() {
        let mut registry = Registry::new();
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&0xBEEFu32.to_le_bytes());
        bytes.extend_from_slice(&2u32.to_le_bytes());
        bytes.extend_from_slice(&[9, 9]);
        assert!(load_instance_all(&mut registry, &bytes).is_ok());
    }

    #[test]
    fn world_file_roundtrips_through_magic_and_version() {
        let mut registry = Registry::new();
        registry.register(SubsystemDescriptor::instance_only(
            crate::registry::SubsystemId::World,
            |out: &mut Vec<u8>| {
                out.extend_from_slice(&[7, 7]);
                Ok(())
            },
            |bytes: &[u8]| {
                LAST_LOADED.with(|cell| *cell.borrow_mut() = bytes.to_vec());
                Ok(())
            },
        ));
        let file = write_world_file(&mut registry).unwrap();
        assert_eq!(&file[0..4], b"DWRL");
        assert_eq!(u16::from_le_bytes(file[4..6].try_into().unwrap()), WORLD_VERSION_CURRENT);
        read_world_file(&mut registry, &file).unwrap();
        LAST_LOADED.with(|cell| assert_eq!(&*cell.borrow(), &[7, 7]));
    }

    #[test]
    fn unknown_magic_is_rejected() {
        let mut registry = Registry::new();
        let mut bytes = b"XXXX".to_vec();
        bytes.extend_from_slice(&WORLD_VERSION_CURRENT.to_le_bytes());
        let err = read_world_file(&mut registry, &bytes).unwrap_err();
        assert_eq!(err, DomainError::BadMagic);
    }

    #[test]
    fn unsupported_version_is_rejected() {
        let mut registry = Registry::new();
        let mut bytes = WORLD_MAGIC.to_vec();
        bytes.extend_from_slice(&99u16.to_le_bytes());
        let err = read_world_file(&mut registry, &bytes).unwrap_err();
        assert_eq!(err, DomainError::UnsupportedVersion(99));
    }

    #[test]
    fn legacy_v1_body_is_skipped_without_error() {
        let mut registry = Registry::new();
        let mut bytes = WORLD_MAGIC.to_vec();
        bytes.extend_from_slice(&WORLD_VERSION_LEGACY.to_le_bytes());
        bytes.extend_from_slice(&1u16.to_le_bytes());
        bytes.extend_from_slice(&2u32.to_le_bytes());
        bytes.extend_from_slice(&[0, 0]);
        assert!(read_world_file(&mut registry, &bytes).is_ok());
    }
}
