//! Deterministic world hashing: FNV-1a64 over a canonical little-endian
//! byte encoding of world metadata, the serialized instance payload, and
//! each chunk's metadata plus serialized payload, chunks visited in
//! `(cx, cy)` sorted order so hash output never depends on storage order.

use crate::registry::Registry;

const FNV1A64_OFFSET: u64 = 0xcbf29ce484222325;
const FNV1A64_PRIME: u64 = 0x100000001b3;

pub type WorldHash = u64;

fn hash_bytes(mut h: u64, data: &[u8]) -> u64 {
    for &byte in data {
        h ^= byte as u64;
        h = h.wrapping_mul(FNV1A64_PRIME);
    }
    h
}

fn hash_u32(h: u64, v: u32) -> u64 {
    hash_bytes(h, &v.to_le_bytes())
}

fn hash_u64(h: u64, v: u64) -> u64 {
    hash_bytes(h, &v.to_le_bytes())
}

/// World-level metadata folded into the hash ahead of any subsystem
/// payload, so two worlds with identical state but different seeds or
/// version stamps never collide.
#[derive(Debug, Clone, Copy)]
pub struct WorldMeta {
    pub seed: u64,
    pub world_size_m: u32,
    pub vertical_min: i32,
    pub vertical_max: i32,
    pub core_version: u32,
    pub suite_version: u32,
    pub compat_profile_id: u32,
    pub tick_count: u32,
}

/// Addressing and identity fields for one chunk, independent of its
/// subsystem payload.
#[derive(Debug, Clone, Copy)]
pub struct ChunkMeta {
    pub chunk_id: u32,
    pub cx: i32,
    pub cy: i32,
    pub flags: u32,
}

/// Hashes a chunk's address/identity fields only, ignoring payload.
/// Useful as a cheap existence/identity fingerprint.
pub fn hash_chunk(chunk: &ChunkMeta) -> WorldHash {
    let mut h = FNV1A64_OFFSET;
    h = hash_u32(h, chunk.chunk_id);
    h = hash_u32(h, chunk.cx as u32);
    h = hash_u32(h, chunk.cy as u32);
    h = hash_u32(h, chunk.flags);
    h
}

fn hash_chunk_payload(registry: &mut Registry<'_>, chunk: &ChunkMeta) -> WorldHash {
    let mut h = hash_chunk(chunk);
    if let Ok(blob) = crate::serialize::save_chunk_all(registry, chunk.cx as u32, chunk.cy as u32) {
        h = hash_u32(h, blob.len() as u32);
        h = hash_bytes(h, &blob);
    }
    h
}

/// Hashes the whole world: metadata, the instance-level serialized
/// payload, then every chunk's identity+payload hash in coordinate order.
pub fn hash_world(registry: &mut Registry<'_>, meta: &WorldMeta, chunks: &[ChunkMeta]) -> WorldHash {
    let mut h = FNV1A64_OFFSET;

    h = hash_u64(h, meta.seed);
    h = hash_u32(h, meta.world_size_m);
    h = hash_u32(h, meta.vertical_min as u32);
    h = hash_u32(h, meta.vertical_max as u32);
    h = hash_u32(h, meta.core_version);
    h = hash_u32(h, meta.suite_version);
    h = hash_u32(h, meta.compat_profile_id);
    h = hash_u32(h, meta.tick_count);

    if let Ok(blob) = crate::serialize::save_instance_all(registry) {
        h = hash_u32(h, blob.len() as u32);
        h = hash_bytes(h, &blob);
    }

    let mut sorted: Vec<&ChunkMeta> = chunks.iter().collect();
    sorted.sort_by_key(|c| (c.cx, c.cy));
    for chunk in sorted {
        let ch = hash_chunk_payload(registry, chunk);
        h = hash_u64(h, ch);
    }

    h
}

#[cfg(test)]
mod tests {
    use super::*;

    fn meta() -> WorldMeta {
        WorldMeta {
            seed: 42,
            world_size_m: 1000,
            vertical_min: -64,
            vertical_max: 320,
            core_version: 1,
            suite_version: 1,
            compat_profile_id: 0,
            tick_count: 7,
        }
    }

    #[test]
    fn identical_inputs_hash_identically() {
        let mut registry = Registry::new();
        let chunks = [ChunkMeta { chunk_id: 1, cx: 0, cy: 0, flags: 0 }];
        let a = hash_world(&mut registry, &meta(), &chunks);
        let b = hash_world(&mut registry, &meta(), &chunks);
        assert_eq!(a, b);
    }

    #[test]
    fn chunk_order_does_not_affect_hash() {
        let mut registry = Registry::new();
        let chunks_fwd = [
            ChunkMeta { chunk_id: 1, cx: 0, cy: 0, flags: 0 },
            ChunkMeta { chunk_id: 2, cx: 1, cy: 0, flags: 0 },
        ];
        let chunks_rev = [
            ChunkMeta { chunk_id: 2, cx: 1, cy: 0, flags: 0 },
            ChunkMeta { chunk_id: 1, cx: 0, cy: 0, flags: 0 },
        ];
        assert_eq!(
            hash_world(&mut registry, &meta(), &chunks_fwd),
            hash_world(&mut registry, &meta(), &chunks_rev)
        );
    }

    #[test]
    fn different_tick_count_changes_hash() {
        let mut registry = Registry::new();
        let mut m2 = meta();
        m2.tick_count += 1;
        assert_ne!(
            hash_world(&mut registry, &meta(), &[]),
            hash_world(&mut registry, &m2, &[])
        );
    }

    #[test]
    fn chunk_identity_hash_is_stable() {
        let chunk = ChunkMeta { chunk_id: 5, cx: -3, cy: 9, flags: 0x1 };
        assert_eq!(hash_chunk(&chunk), hash_chunk(&chunk));
    }
}
