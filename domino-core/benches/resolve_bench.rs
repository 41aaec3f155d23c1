//! Throughput of one `resolve` call per field subsystem at a representative
//! store/flow count, the hot loop every tick drives.

use criterion::{criterion_group, criterion_main, Criterion};

use domino_core::domain::{Budget, DomainState, Existence, Policy};
use domino_core::energy::{EnergyDomain, EnergyType, FlowDesc as EnergyFlow, StoreDesc as EnergyStore, SurfaceDesc as EnergySurface};
use domino_core::fixed::{Q16, Q48};
use domino_core::fluid::{FlowDesc as FluidFlow, FluidDomain, PressureDesc, StoreDesc as FluidStore, SurfaceDesc as FluidSurface};

const STORE_COUNT: u32 = 64;
const FLOW_COUNT: u32 = 96;

fn energy_domain() -> EnergyDomain {
    let mut surface = EnergySurface { domain_id: 1, world_seed: 1, ..EnergySurface::default() };
    for i in 0..STORE_COUNT {
        surface.stores.push(EnergyStore {
            store_id: i,
            energy_type: EnergyType::Electrical,
            amount: Q48::from_int(500),
            capacity: Q48::from_int(1000),
            leakage_rate: Q16::ZERO,
            network_id: 1,
        });
    }
    for i in 0..FLOW_COUNT {
        surface.flows.push(EnergyFlow {
            flow_id: i,
            network_id: 1,
            source_store_id: i % STORE_COUNT,
            sink_store_id: (i + 1) % STORE_COUNT,
            max_transfer_rate: Q48::from_int(5),
            efficiency: Q16::ONE,
            failure_mode_mask: domino_core::energy::FailureMode::empty(),
            failure_chance: Q16::ZERO,
        });
    }
    let mut domain = EnergyDomain::init(surface);
    domain.policy = Policy::default();
    domain.state = DomainState { existence: Existence::Realized, archival: domain.state.archival };
    domain
}

fn fluid_domain() -> FluidDomain {
    let mut surface = FluidSurface { domain_id: 1, world_seed: 1, ..FluidSurface::default() };
    for i in 0..STORE_COUNT {
        surface.stores.push(FluidStore {
            store_id: i,
            volume: Q48::from_int(500),
            max_volume: Q48::from_int(1000),
            temperature: Q48::ZERO,
            contamination: Q16::ZERO,
            leakage_rate: Q16::ZERO,
            network_id: 1,
        });
        surface.pressures.push(PressureDesc {
            pressure_id: i,
            store_id: i,
            pressure_limit: Q48::from_int(2000),
            rupture_threshold: Q48::from_int(1800),
            release_ratio: Q16::ZERO,
        });
    }
    for i in 0..FLOW_COUNT {
        surface.flows.push(FluidFlow {
            flow_id: i,
            network_id: 1,
            source_store_id: i % STORE_COUNT,
            sink_store_id: (i + 1) % STORE_COUNT,
            max_transfer_rate: Q48::from_int(5),
            efficiency: Q16::ONE,
            energy_per_volume: Q48::ZERO,
            failure_mode_mask: domino_core::fluid::FailureMode::empty(),
            failure_chance: Q16::ZERO,
        });
    }
    let mut domain = FluidDomain::init(surface);
    domain.policy = Policy::default();
    domain.state = DomainState { existence: Existence::Realized, archival: domain.state.archival };
    domain
}

fn bench_energy_resolve(c: &mut Criterion) {
    let mut domain = energy_domain();
    let mut tick = 0u64;
    c.bench_function("energy_resolve_64_stores_96_flows", |b| {
        b.iter(|| {
            tick += 1;
            let mut budget = Budget::new(1_000_000);
            criterion::black_box(domain.resolve(1, tick, 1, &mut budget));
        })
    });
}

fn bench_fluid_resolve(c: &mut Criterion) {
    let mut domain = fluid_domain();
    let mut tick = 0u64;
    c.bench_function("fluid_resolve_64_stores_96_flows", |b| {
        b.iter(|| {
            tick += 1;
            let mut budget = Budget::new(1_000_000);
            criterion::black_box(domain.resolve(1, tick, 1, &mut budget));
        })
    });
}

criterion_group!(benches, bench_energy_resolve, bench_fluid_resolve);
criterion_main!(benches);
