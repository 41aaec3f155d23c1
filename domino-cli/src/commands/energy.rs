//! `domino energy resolve` — loads an energy-domain fixture, runs one
//! `resolve` call, and prints the result in the CLI output grammar.

use std::path::Path;

use domino_config::{Fixture, FixtureWriter};
use domino_core::domain::{Budget, DomainState, Existence, Policy};
use domino_core::energy::{EnergyDomain, EnergyType, FailureMode, FlowDesc, StoreDesc, SurfaceDesc};
use domino_core::fixed::{Q16, Q48};

use crate::error::{CliError, Result};

fn energy_type_from_u32(v: u32) -> EnergyType {
    match v {
        1 => EnergyType::Electrical,
        2 => EnergyType::Chemical,
        3 => EnergyType::Mechanical,
        4 => EnergyType::Thermal,
        5 => EnergyType::Abstract,
        _ => EnergyType::Unset,
    }
}

fn load_surface(path: &Path, fixture: &Fixture) -> Result<SurfaceDesc> {
    let mut desc = SurfaceDesc {
        domain_id: fixture.u64("domain_id")?.unwrap_or(1),
        world_seed: fixture.u64("world_seed")?.unwrap_or(1),
        stores: Default::default(),
        flows: Default::default(),
        loss: Default::default(),
    };
    desc.loss.dissipation_fraction = fixture.q16("dissipation_fraction")?.unwrap_or(Q16::ZERO);

    for i in 0.. {
        let Some(store_id) = fixture.u32(&format!("store.{i}.id"))? else { break };
        if desc.stores.is_full() {
            tracing::warn!(i, "store index beyond capacity, ignored");
            break;
        }
        desc.stores.push(StoreDesc {
            store_id,
            energy_type: energy_type_from_u32(fixture.u32(&format!("store.{i}.energy_type"))?.unwrap_or(1)),
            amount: fixture.q48(&format!("store.{i}.amount"))?.unwrap_or(Q48::ZERO),
            capacity: fixture.q48(&format!("store.{i}.capacity"))?.unwrap_or(Q48::ZERO),
            leakage_rate: fixture.q16(&format!("store.{i}.leakage_rate"))?.unwrap_or(Q16::ZERO),
            network_id: fixture.u32(&format!("store.{i}.network_id"))?.unwrap_or(1),
        });
    }

    for i in 0.. {
        let Some(flow_id) = fixture.u32(&format!("flow.{i}.id"))? else { break };
        if desc.flows.is_full() {
            tracing::warn!(i, "flow index beyond capacity, ignored");
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
            failure_mode_mask: FailureMode::from_bits_truncate(failure_bits),
            failure_chance: fixture.q16(&format!("flow.{i}.failure_chance"))?.unwrap_or(Q16::ZERO),
        });
    }

    tracing::debug!(path = %path.display(), stores = desc.stores.len(), flows = desc.flows.len(), "loaded energy fixture");
    Ok(desc)
}

pub fn resolve(path: &Path) -> Result<String> {
    let text = std::fs::read_to_string(path).map_err(|e| CliError::Io { path: path.display().to_string(), source: e })?;
    let fixture = Fixture::parse(&path.display().to_string(), "DOMINIUM_ENERGY_FIXTURE_V1", &text)?;

    let surface = load_surface(path, &fixture)?;
    let network_id = fixture.u32("network_id")?.unwrap_or(1);
    let tick = fixture.u64("tick")?.unwrap_or(0);
    let tick_delta = fixture.u64("tick_delta")?.unwrap_or(1);
    let budget_max = fixture.u32("budget")?.unwrap_or(100_000);

    let mut domain = EnergyDomain::init(surface);
    domain.policy = Policy::default();
    domain.state = DomainState { existence: Existence::Realized, archival: domain.state.archival };
    let mut budget = Budget::new(budget_max);

    let result = domain.resolve(network_id, tick, tick_delta, &mut budget);
    if !result.ok {
        return Err(CliError::Refused(result.refusal_reason));
    }

    let mut writer = FixtureWriter::new("DOMINIUM_ENERGY_RESOLVE_V1");
    writer
        .field("ok", 1)
        .field("flags", result.flags.bits())
        .field("store_count", result.store_count)
        .field("flow_count", result.flow_count)
        .q48_field("energy_transferred", result.energy_transferred)
        .q48_field("energy_lost", result.energy_lost)
        .q48_field("energy_remaining", result.energy_remaining);
    Ok(writer.render())
}
