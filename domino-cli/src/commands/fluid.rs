//! `domino fluid resolve` — adds pressure cells to the energy-style
//! store/flow pair.

use std::path::Path;

use domino_config::{Fixture, FixtureWriter};
use domino_core::domain::{Budget, DomainState, Existence, Policy};
use domino_core::fixed::{Q16, Q48};
use domino_core::fluid::{FailureMode, FlowDesc, FluidDomain, PressureDesc, StoreDesc, SurfaceDesc};

use crate::error::{CliError, Result};

fn load_surface(fixture: &Fixture) -> Result<SurfaceDesc> {
    let mut desc = SurfaceDesc {
        domain_id: fixture.u64("domain_id")?.unwrap_or(1),
        world_seed: fixture.u64("world_seed")?.unwrap_or(1),
        pressure_scale: fixture.q48("pressure_scale")?.unwrap_or(Q48::from_int(1)),
        stores: Default::default(),
        flows: Default::default(),
        pressures: Default::default(),
    };

    for i in 0.. {
        let Some(store_id) = fixture.u32(&format!("store.{i}.id"))? else { break };
        if desc.stores.is_full() {
            break;
        }
        desc.stores.push(StoreDesc {
            store_id,
            volume: fixture.q48(&format!("store.{i}.volume"))?.unwrap_or(Q48::ZERO),
            max_volume: fixture.q48(&format!("store.{i}.max_volume"))?.unwrap_or(Q48::ZERO),
            temperature: fixture.q48(&format!("store.{i}.temperature"))?.unwrap_or(Q48::ZERO),
            contamination: fixture.q16(&format!("store.{i}.contamination"))?.unwrap_or(Q16::ZERO),
            leakage_rate: fixture.q16(&format!("store.{i}.leakage_rate"))?.unwrap_or(Q16::ZERO),
            network_id: fixture.u32(&format!("store.{i}.network_id"))?.unwrap_or(1),
        });
    }

    for i in 0.. {
        let Some(flow_id) = fixture.u32(&format!("flow.{i}.id"))? else { break };
        if desc.flows.is_full() {
            break;
        }
        let failure_bits = fixture.u32(&format!("flow.{i}.failure_mode_mask"))?.unwrap_or(0);
        desc.flows.push(FlowDesc {
            flow_id,
            network_id: fixture.u32(&format!("flow.{i}.network_id"))?.unwrap_or(1),
            source_store_id: fixture.u32(&format!("flow.{i}.source_store_id"))?.unwrap_or(0),
            sink_store_id: fixture.u32(&format!("flow.{i}.sink_store_id"))?.unwrap_or(0),
            max_transfer_rate: fixture.q48(&format!("flow.{i}.max_transfer_rate"))?.unwrap_or(Q48::ZERO),
            efficiency: fixture.q16(&format!("flow.{i}.efficiency"))?.unwrap_or(Q16::ONE),
            energy_per_volume: fixture.q48(&format!("flow.{i}.energy_per_volume"))?.unwrap_or(Q48::ZERO),
            failure_mode_mask: FailureMode::from_bits_truncate(failure_bits),
            failure_chance: fixture.q16(&format!("flow.{i}.failure_chance"))?.unwrap_or(Q16::ZERO),
        });
    }

    for i in 0.. {
        let Some(pressure_id) = fixture.u32(&format!("pressure.{i}.id"))? else { break };
        if desc.pressures.is_full() {
            break;
        }
        desc.pressures.push(PressureDesc {
            pressure_id,
            store_id: fixture.u32(&format!("pressure.{i}.store_id"))?.unwrap_or(0),
            pressure_limit: fixture.q48(&format!("pressure.{i}.pressure_limit"))?.unwrap_or(Q48::ZERO),
            rupture_threshold: fixture.q48(&format!("pressure.{i}.rupture_threshold"))?.unwrap_or(Q48::ZERO),
            release_ratio: fixture.q16(&format!("pressure.{i}.release_ratio"))?.unwrap_or(Q16::ZERO),
        });
    }

    Ok(desc)
}

pub fn resolve(path: &Path) -> Result<String> {
    let text = std::fs::read_to_string(path).map_err(|e| CliError::Io { path: path.display().to_string(), source: e })?;
    let fixture = Fixture::parse(&path.display().to_string(), "DOMINIUM_FLUID_FIXTURE_V1", &text)?;

    let surface = load_surface(&fixture)?;
    let network_id = fixture.u32("network_id")?.unwrap_or(1);
    let tick = fixture.u64("tick")?.unwrap_or(0);
    let tick_delta = fixture.u64("tick_delta")?.unwrap_or(1);
    let budget_max = fixture.u32("budget")?.unwrap_or(100_000);

    let mut domain = FluidDomain::init(surface);
    domain.policy = Policy::default();
    domain.state = DomainState { existence: Existence::Realized, archival: domain.state.archival };
    let mut budget = Budget::new(budget_max);

    let result = domain.resolve(network_id, tick, tick_delta, &mut budget);
    if !result.ok {
        return Err(CliError::Refused(result.refusal_reason));
    }

    let mut writer = FixtureWriter::new("DOMINIUM_FLUID_RESOLVE_V1");
    writer
        .field("ok", 1)
        .field("flags", result.flags.bits())
        .field("store_count", result.store_count)
        .field("flow_count", result.flow_count)
        .field("pressure_count", result.pressure_count)
        .field("pressure_over_limit_count", result.pressure_over_limit_count)
        .field("pressure_rupture_count", result.pressure_rupture_count)
        .q48_field("volume_transferred", result.volume_transferred)
        .q48_field("volume_leaked", result.volume_leaked)
        .q48_field("volume_remaining", result.volume_remaining)
        .q48_field("energy_required", result.energy_required);
    Ok(writer.render())
}
