//! `domino heat resolve` — mirrors `commands::energy`, adding the
//! thermal-stress records heat carries that energy does not.

use std::path::Path;

use domino_config::{Fixture, FixtureWriter};
use domino_core::domain::{Budget, DomainState, Existence, Policy};
use domino_core::fixed::{Q16, Q48};
use domino_core::heat::{FailureMode, FlowDesc, HeatDomain, StoreDesc, StressDesc, SurfaceDesc};

use crate::error::{CliError, Result};

fn load_surface(fixture: &Fixture) -> Result<SurfaceDesc> {
    let mut desc = SurfaceDesc {
        domain_id: fixture.u64("domain_id")?.unwrap_or(1),
        world_seed: fixture.u64("world_seed")?.unwrap_or(1),
        temperature_scale: fixture.q48("temperature_scale")?.unwrap_or(Q48::from_int(1)),
        stores: Default::default(),
        flows: Default::default(),
        stresses: Default::default(),
    };

    for i in 0.. {
        let Some(store_id) = fixture.u32(&format!("store.{i}.id"))? else { break };
        if desc.stores.is_full() {
            break;
        }
        desc.stores.push(StoreDesc {
            store_id,
            amount: fixture.q48(&format!("store.{i}.amount"))?.unwrap_or(Q48::ZERO),
            capacity: fixture.q48(&format!("store.{i}.capacity"))?.unwrap_or(Q48::ZERO),
            ambient_exchange_rate: fixture.q16(&format!("store.{i}.ambient_exchange_rate"))?.unwrap_or(Q16::ZERO),
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
            failure_mode_mask: FailureMode::from_bits_truncate(failure_bits),
            failure_chance: fixture.q16(&format!("flow.{i}.failure_chance"))?.unwrap_or(Q16::ZERO),
        });
    }

    for i in 0.. {
        let Some(stress_id) = fixture.u32(&format!("stress.{i}.id"))? else { break };
        if desc.stresses.is_full() {
            break;
        }
        desc.stresses.push(StressDesc {
            stress_id,
            store_id: fixture.u32(&format!("stress.{i}.store_id"))?.unwrap_or(0),
            safe_min: fixture.q48(&format!("stress.{i}.safe_min"))?.unwrap_or(Q48::ZERO),
            safe_max: fixture.q48(&format!("stress.{i}.safe_max"))?.unwrap_or(Q48::ZERO),
            damage_rate: fixture.q16(&format!("stress.{i}.damage_rate"))?.unwrap_or(Q16::ZERO),
            efficiency_modifier: fixture.q16(&format!("stress.{i}.efficiency_modifier"))?.unwrap_or(Q16::ONE),
        });
    }

    Ok(desc)
}

pub fn resolve(path: &Path) -> Result<String> {
    let text = std::fs::read_to_string(path).map_err(|e| CliError::Io { path: path.display().to_string(), source: e })?;
    let fixture = Fixture::parse(&path.display().to_string(), "DOMINIUM_HEAT_FIXTURE_V1", &text)?;

    let surface = load_surface(&fixture)?;
    let network_id = fixture.u32("network_id")?.unwrap_or(1);
    let tick = fixture.u64("tick")?.unwrap_or(0);
    let tick_delta = fixture.u64("tick_delta")?.unwrap_or(1);
    let budget_max = fixture.u32("budget")?.unwrap_or(100_000);

    let mut domain = HeatDomain::init(surface);
    domain.policy = Policy::default();
    domain.state = DomainState { existence: Existence::Realized, archival: domain.state.archival };
    let mut budget = Budget::new(budget_max);

    let result = domain.resolve(network_id, tick, tick_delta, &mut budget);
    if !result.ok {
        return Err(CliError::Refused(result.refusal_reason));
    }

    let mut writer = FixtureWriter::new("DOMINIUM_HEAT_RESOLVE_V1");
    writer
        .field("ok", 1)
        .field("flags", result.flags.bits())
        .field("store_count", result.store_count)
        .field("flow_count", result.flow_count)
        .field("stress_count", result.stress_count)
        .field("stress_undercool_count", result.stress_undercool_count)
        .field("stress_overheat_count", result.stress_overheat_count)
        .field("stress_damage_count", result.stress_damage_count)
        .q48_field("heat_transferred", result.heat_transferred)
        .q48_field("heat_dissipated", result.heat_dissipated)
        .q48_field("heat_remaining", result.heat_remaining);
    Ok(writer.render())
}
