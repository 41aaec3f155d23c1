//! Cross-run determinism: identical inputs must produce bit-identical
//! results, independent of call order or process restart.

use domino_core::domain::{Budget, DomainState, Existence, Policy};
use domino_core::energy::{EnergyDomain, EnergyType, FlowDesc, StoreDesc, SurfaceDesc as EnergySurface};
use domino_core::fixed::{Q16, Q48};
use domino_core::fluid::{FlowDesc as FluidFlow, FluidDomain, PressureDesc, StoreDesc as FluidStore, SurfaceDesc as FluidSurface};
use domino_core::hash::{hash_world, ChunkMeta, WorldMeta};
use domino_core::registry::Registry;
use domino_core::rng::{roll_from_context, SeedContext};

fn energy_surface() -> EnergySurface {
    let mut surface = EnergySurface { domain_id: 7, world_seed: 42, ..EnergySurface::default() };
    surface
        .stores
        .push(StoreDesc { store_id: 1, energy_type: EnergyType::Electrical, amount: Q48::from_int(100), capacity: Q48::from_int(200), leakage_rate: Q16::ZERO, network_id: 1 });
    surface
        .stores
        .push(StoreDesc { store_id: 2, energy_type: EnergyType::Electrical, amount: Q48::from_int(10), capacity: Q48::from_int(200), leakage_rate: Q16::ZERO, network_id: 1 });
    surface.flows.push(FlowDesc {
        flow_id: 1,
        network_id: 1,
        source_store_id: 1,
        sink_store_id: 2,
        max_transfer_rate: Q48::from_int(5),
        efficiency: Q16::ONE,
        failure_mode_mask: domino_core::energy::FailureMode::empty(),
        failure_chance: Q16::ZERO,
    });
    surface
}

fn run_energy_resolve() -> domino_core::energy::ResolveResult {
    let mut domain = EnergyDomain::init(energy_surface());
    domain.policy = Policy::default();
    domain.state = DomainState { existence: Existence::Realized, archival: domain.state.archival };
    let mut budget = Budget::new(100_000);
    domain.resolve(1, 10, 1, &mut budget)
}

#[test]
fn energy_resolve_is_deterministic_across_runs() {
    let a = run_energy_resolve();
    let b = run_energy_resolve();
    assert_eq!(a.ok, b.ok);
    assert_eq!(a.flags, b.flags);
    assert_eq!(a.store_count, b.store_count);
    assert_eq!(a.flow_count, b.flow_count);
    assert_eq!(a.energy_transferred, b.energy_transferred);
    assert_eq!(a.energy_lost, b.energy_lost);
    assert_eq!(a.energy_remaining, b.energy_remaining);
}

fn fluid_surface() -> FluidSurface {
    let mut surface = FluidSurface { domain_id: 3, world_seed: 9, ..FluidSurface::default() };
    surface.stores.push(FluidStore {
        store_id: 1,
        volume: Q48::from_int(50),
        max_volume: Q48::from_int(100),
        temperature: Q48::ZERO,
        contamination: Q16::ZERO,
        leakage_rate: Q16::ZERO,
        network_id: 1,
    });
    surface.stores.push(FluidStore {
        store_id: 2,
        volume: Q48::from_int(5),
        max_volume: Q48::from_int(100),
        temperature: Q48::ZERO,
        contamination: Q16::ZERO,
        leakage_rate: Q16::ZERO,
        network_id: 1,
    });
    surface.flows.push(FluidFlow {
        flow_id: 1,
        network_id: 1,
        source_store_id: 1,
        sink_store_id: 2,
        max_transfer_rate: Q48::from_int(5),
        efficiency: Q16::ONE,
        energy_per_volume: Q48::ZERO,
        failure_mode_mask: domino_core::fluid::FailureMode::empty(),
        failure_chance: Q16::ZERO,
    });
    surface.pressures.push(PressureDesc {
        pressure_id: 1,
        store_id: 1,
        pressure_limit: Q48::from_int(1000),
        rupture_threshold: Q48::from_int(900),
        release_ratio: Q16::ZERO,
    });
    surface
}

#[test]
fn fluid_resolve_is_deterministic_across_runs() {
    let run = || {
        let mut domain = FluidDomain::init(fluid_surface());
        domain.policy = Policy::default();
        domain.state = DomainState { existence: Existence::Realized, archival: domain.state.archival };
        let mut budget = Budget::new(100_000);
        domain.resolve(1, 5, 1, &mut budget)
    };
    let a = run();
    let b = run();
    assert_eq!(a.ok, b.ok);
    assert_eq!(a.flags, b.flags);
    assert_eq!(a.volume_transferred, b.volume_transferred);
    assert_eq!(a.volume_leaked, b.volume_leaked);
    assert_eq!(a.volume_remaining, b.volume_remaining);
    assert_eq!(a.pressure_rupture_count, b.pressure_rupture_count);
}

#[test]
fn named_rng_rolls_are_reproducible_from_the_same_context() {
    let ctx = SeedContext { world_seed: 123, domain_id: 1, process_id: 7, tick: 10, stream: "noise.stream.energy.flow.failure" };
    let a = roll_from_context(ctx, Q16::from_f64(0.5));
    let b = roll_from_context(ctx, Q16::from_f64(0.5));
    assert_eq!(a, b);
}

#[test]
fn world_hash_is_independent_of_chunk_storage_order() {
    let mut registry = Registry::new();
    let meta = WorldMeta { seed: 1, world_size_m: 4096, vertical_min: -256, vertical_max: 256, core_version: 1, suite_version: 1, compat_profile_id: 1, tick_count: 10 };
    let chunks = vec![
        ChunkMeta { chunk_id: 1, cx: 2, cy: -1, flags: 0 },
        ChunkMeta { chunk_id: 2, cx: -1, cy: 3, flags: 0 },
        ChunkMeta { chunk_id: 3, cx: 0, cy: 0, flags: 0 },
    ];
    let mut shuffled = chunks.clone();
    shuffled.reverse();

    let h1 = hash_world(&mut registry, &meta, &chunks);
    let h2 = hash_world(&mut registry, &meta, &shuffled);
    assert_eq!(h1, h2);
}

#[test]
fn world_hash_changes_with_tick_count() {
    let mut registry = Registry::new();
    let base = WorldMeta { seed: 1, world_size_m: 4096, vertical_min: -256, vertical_max: 256, core_version: 1, suite_version: 1, compat_profile_id: 1, tick_count: 10 };
    let next = WorldMeta { tick_count: 11, ..base };
    assert_ne!(hash_world(&mut registry, &base, &[]), hash_world(&mut registry, &next, &[]));
}
