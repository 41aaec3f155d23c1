//! Deterministic named-RNG derivation.
//!
//! Every per-event random draw in Domino is seeded from a tuple of
//! `(world_seed, domain_id, process_id, tick, stream_name)` rather than
//! from a single process-wide generator, so that the outcome of any one
//! flow/link/recipe roll depends only on its own context and not on what
//! else has been drawn before it in the same tick.

use bitflags::bitflags;

const FNV1A32_OFFSET: u32 = 2_166_136_261;
const FNV1A32_PRIME: u32 = 16_777_619;

bitflags! {
    /// Which context components get folded into the seed.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct SeedMix: u8 {
        const DOMAIN  = 1 << 0;
        const PROCESS = 1 << 1;
        const TICK    = 1 << 2;
        const STREAM  = 1 << 3;
        const ALL = Self::DOMAIN.bits() | Self::PROCESS.bits() | Self::TICK.bits() | Self::STREAM.bits();
    }
}

/// FNV-1a 32-bit hash of a string: offset `2166136261`, prime `16777619`.
pub fn hash_str32(s: &str) -> u32 {
    let mut h = FNV1A32_OFFSET;
    for b in s.as_bytes() {
        h ^= *b as u32;
        h = h.wrapping_mul(FNV1A32_PRIME);
    }
    h
}

/// Fold a 64-bit value into 32 bits by XOR-ing its halves.
pub fn fold64(v: u64) -> u32 {
    ((v ^ (v >> 32)) & 0xFFFF_FFFF) as u32
}

/// `true` iff `name` starts with case-insensitive `"noise.stream."` and the
/// remainder is at least two non-empty `.`-separated segments drawn from
/// `[A-Za-z0-9_-]`.
pub fn stream_name_valid(name: &str) -> bool {
    const PREFIX: &str = "noise.stream.";
    if name.len() < PREFIX.len() {
        return false;
    }
    if !name[..PREFIX.len()].eq_ignore_ascii_case(PREFIX) {
        return false;
    }
    let rest = &name[PREFIX.len()..];
    let segments: Vec<&str> = rest.split('.').collect();
    if segments.len() < 2 {
        return false;
    }
    segments.iter().all(|seg| {
        !seg.is_empty()
            && seg
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
    })
}

/// Context a named stream is derived from.
#[derive(Debug, Clone, Copy)]
pub struct SeedContext<'a> {
    pub world_seed: u64,
    pub domain_id: u64,
    pub process_id: u64,
    pub tick: u64,
    pub stream: &'a str,
}

/// Derive a 32-bit seed from a context and a mix mask. Combination order is
/// fixed: domain, process, tick, stream — changing this order would change
/// every downstream draw, so it is not configurable.
pub fn seed_from_context(ctx: SeedContext<'_>, mix: SeedMix) -> u32 {
    debug_assert!(
        !mix.contains(SeedMix::STREAM) || stream_name_valid(ctx.stream),
        "invalid named-RNG stream: {}",
        ctx.stream
    );
    let mut seed = fold64(ctx.world_seed);
    if mix.contains(SeedMix::DOMAIN) {
        seed ^= fold64(ctx.domain_id);
    }
    if mix.contains(SeedMix::PROCESS) {
        seed ^= fold64(ctx.process_id);
    }
    if mix.contains(SeedMix::TICK) {
        seed ^= fold64(ctx.tick);
    }
    if mix.contains(SeedMix::STREAM) {
        seed ^= hash_str32(ctx.stream);
    }
    seed
}

/// A seeded RNG state. The step function is a 32-bit LCG (Numerical
/// Recipes constants). Determinism only requires internal
/// self-consistency, which a pure `u32`-wrapping LCG provides bit-exactly
/// across platforms.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RngState(u32);

const LCG_A: u32 = 1_664_525;
const LCG_C: u32 = 1_013_904_223;

impl RngState {
    pub fn from_context(ctx: SeedContext<'_>, mix: SeedMix) -> Self {
        RngState(seed_from_context(ctx, mix))
    }

    /// Sets the state directly from a raw seed. Still asserts stream
    /// validity in debug builds, matching `state_from_seed`.
    pub fn from_seed(seed: u32, stream: &str) -> Self {
        debug_assert!(stream_name_valid(stream), "invalid named-RNG stream: {stream}");
        RngState(seed)
    }

    pub fn next_u32(&mut self) -> u32 {
        self.0 = self.0.wrapping_mul(LCG_A).wrapping_add(LCG_C);
        self.0
    }

    /// `true` with probability `chance` (a Q16.16 ratio in `[0, 1]`): one
    /// draw compared against `chance` rescaled into the full `u32` range.
    pub fn roll(&mut self, chance: crate::fixed::Q16) -> bool {
        self.next_u32() <= ratio_to_u32(chance)
    }
}

/// Rescale a Q16.16 ratio in `[0, 1]` into the full `u32` range: `0`
/// below/at zero, `u32::MAX` at/above one, otherwise
/// `(ratio * u32::MAX) >> 16`.
fn ratio_to_u32(ratio: crate::fixed::Q16) -> u32 {
    let clamped = ratio.clamp_ratio();
    if clamped.raw() <= 0 {
        return 0;
    }
    if clamped >= crate::fixed::Q16::ONE {
        return u32::MAX;
    }
    (((clamped.raw() as u32 as u64) * (u32::MAX as u64)) >> 16) as u32
}

/// Convenience: seed from context and draw one failure roll in a single
/// call, matching the per-flow-per-tick reseeding pattern every resolver
/// uses (`noise.stream.<subsystem>.flow.failure`, etc).
pub fn roll_from_context(ctx: SeedContext<'_>, chance: crate::fixed::Q16) -> bool {
    let mut state = RngState::from_context(ctx, SeedMix::ALL);
    state.roll(chance)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixed::Q16;

    #[test]
    fn stream_name_boundary_cases() {
        assert!(stream_name_valid("noise.stream.a.b"));
        assert!(!stream_name_valid("noise.stream.a"));
        assert!(!stream_name_valid("noise.stream.a..b"));
        assert!(stream_name_valid("NOISE.STREAM.a.b"));
        assert!(!stream_name_valid("noise.stream.a.b@c"));
    }

    #[test]
    fn seed_changes_with_any_input() {
        let base = SeedContext {
            world_seed: 1,
            domain_id: 2,
            process_id: 3,
            tick: 4,
            stream: "noise.stream.x.y",
        };
        let s0 = seed_from_context(base, SeedMix::ALL);
        let mut tick_changed = base;
        tick_changed.tick = 5;
        assert_ne!(s0, seed_from_context(tick_changed, SeedMix::ALL));
        let mut domain_changed = base;
        domain_changed.domain_id = 99;
        assert_ne!(s0, seed_from_context(domain_changed, SeedMix::ALL));
    }

    #[test]
    fn rng_is_pure_function_of_seed_and_count() {
        let mut a = RngState::from_seed(42, "noise.stream.a.b");
        let mut b = RngState::from_seed(42, "noise.stream.a.b");
        for _ in 0..16 {
            assert_eq!(a.next_u32(), b.next_u32());
        }
    }

    #[test]
    fn roll_always_true_at_full_chance() {
        let mut s = RngState::from_seed(7, "noise.stream.a.b");
        assert!(s.roll(Q16::ONE));
    }

    #[test]
    fn roll_always_false_at_zero_chance() {
        let mut s = RngState::from_seed(7, "noise.stream.a.b");
        assert!(!s.roll(Q16::ZERO));
    }
}
