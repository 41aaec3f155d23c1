//! `domino information resolve` — links, nodes and in-flight data
//! packets, plus the capacity table links resolve bandwidth against.

use std::path::Path;

use domino_config::{Fixture, FixtureWriter};
use domino_core::domain::{Budget, DomainState, Existence, Policy};
use domino_core::fixed::{Q16, Q48};
use domino_core::information::{
    CapacityDesc, CongestionPolicy, DataDesc, DataType, InformationDomain, LatencyClass, LinkDesc, NodeDesc, SurfaceDesc,
};

use crate::error::{CliError, Result};

fn latency_class_from_u32(v: u32) -> LatencyClass {
    match v {
        1 => LatencyClass::Local,
        2 => LatencyClass::Regional,
        3 => LatencyClass::Orbital,
        4 => LatencyClass::Interplanetary,
        _ => LatencyClass::Immediate,
    }
}

fn congestion_policy_from_u32(v: u32) -> CongestionPolicy {
    match v {
        1 => CongestionPolicy::DropNewest,
        2 => CongestionPolicy::DropOldest,
        3 => CongestionPolicy::Degrade,
        _ => CongestionPolicy::Queue,
    }
}

fn data_type_from_u32(v: u32) -> DataType {
    match v {
        1 => DataType::Telemetry,
        2 => DataType::Message,
        3 => DataType::Storage,
        _ => DataType::Control,
    }
}

fn load_surface(fixture: &Fixture) -> Result<SurfaceDesc> {
    let mut desc = SurfaceDesc {
        domain_id: fixture.u64("domain_id")?.unwrap_or(1),
        world_seed: fixture.u64("world_seed")?.unwrap_or(1),
        capacities: Default::default(),
        nodes: Default::default(),
        links: Default::default(),
        data: Default::default(),
    };

    for i in 0.. {
        let Some(capacity_id) = fixture.u32(&format!("capacity.{i}.id"))? else { break };
        if desc.capacities.is_full() {
            break;
        }
        desc.capacities.push(CapacityDesc {
            capacity_id,
            bandwidth_limit: fixture.q48(&format!("capacity.{i}.bandwidth_limit"))?.unwrap_or(Q48::ZERO),
            latency_class: latency_class_from_u32(fixture.u32(&format!("capacity.{i}.latency_class"))?.unwrap_or(0)),
            congestion_policy: congestion_policy_from_u32(fixture.u32(&format!("capacity.{i}.congestion_policy"))?.unwrap_or(0)),
            error_rate: fixture.q16(&format!("capacity.{i}.error_rate"))?.unwrap_or(Q16::ZERO),
        });
    }

    for i in 0.. {
        let Some(node_id) = fixture.u32(&format!("node.{i}.id"))? else { break };
        if desc.nodes.is_full() {
            break;
        }
        desc.nodes.push(NodeDesc {
            node_id,
            network_id: fixture.u32(&format!("node.{i}.network_id"))?.unwrap_or(1),
            compute_capacity: fixture.q48(&format!("node.{i}.compute_capacity"))?.unwrap_or(Q48::ZERO),
            storage_capacity: fixture.q48(&format!("node.{i}.storage_capacity"))?.unwrap_or(Q48::ZERO),
            energy_per_unit: fixture.q48(&format!("node.{i}.energy_per_unit"))?.unwrap_or(Q48::ZERO),
            heat_per_unit: fixture.q48(&format!("node.{i}.heat_per_unit"))?.unwrap_or(Q48::ZERO),
        });
    }

    for i in 0.. {
        let Some(link_id) = fixture.u32(&format!("link.{i}.id"))? else { break };
        if desc.links.is_full() {
            break;
        }
        desc.links.push(LinkDesc {
            link_id,
            network_id: fixture.u32(&format!("link.{i}.network_id"))?.unwrap_or(1),
            node_a: fixture.u32(&format!("link.{i}.node_a"))?.unwrap_or(0),
            node_b: fixture.u32(&format!("link.{i}.node_b"))?.unwrap_or(0),
            capacity_id: fixture.u32(&format!("link.{i}.capacity_id"))?.unwrap_or(0),
        });
    }

    for i in 0.. {
        let Some(data_id) = fixture.u32(&format!("data.{i}.id"))? else { break };
        if desc.data.is_full() {
            break;
        }
        desc.data.push(DataDesc {
            data_id,
            network_id: fixture.u32(&format!("data.{i}.network_id"))?.unwrap_or(1),
            data_type: data_type_from_u32(fixture.u32(&format!("data.{i}.data_type"))?.unwrap_or(0)),
            source_node_id: fixture.u32(&format!("data.{i}.source_node_id"))?.unwrap_or(0),
            sink_node_id: fixture.u32(&format!("data.{i}.sink_node_id"))?.unwrap_or(0),
            data_size: fixture.q48(&format!("data.{i}.data_size"))?.unwrap_or(Q48::ZERO),
            send_tick: fixture.u64(&format!("data.{i}.send_tick"))?.unwrap_or(0),
        });
    }

    Ok(desc)
}

pub fn resolve(path: &Path) -> Result<String> {
    let text = std::fs::read_to_string(path).map_err(|e| CliError::Io { path: path.display().to_string(), source: e })?;
    let fixture = Fixture::parse(&path.display().to_string(), "DOMINIUM_INFORMATION_FIXTURE_V1", &text)?;

    let surface = load_surface(&fixture)?;
    let network_id = fixture.u32("network_id")?.unwrap_or(1);
    let tick = fixture.u64("tick")?.unwrap_or(0);
    let tick_delta = fixture.u64("tick_delta")?.unwrap_or(1);
    let budget_max = fixture.u32("budget")?.unwrap_or(100_000);

    let mut domain = InformationDomain::init(surface);
    domain.policy = Policy::default();
    domain.state = DomainState { existence: Existence::Realized, archival: domain.state.archival };
    let mut budget = Budget::new(budget_max);

    let result = domain.resolve(network_id, tick, tick_delta, &mut budget);
    if !result.ok {
        return Err(CliError::Refused(result.refusal_reason));
    }

    let mut writer = FixtureWriter::new("DOMINIUM_INFORMATION_RESOLVE_V1");
    writer
        .field("ok", 1)
        .field("flags", result.flags.bits())
        .field("delivered_count", result.delivered_count)
        .field("dropped_count", result.dropped_count)
        .field("queued_count", result.queued_count)
        .q48_field("energy_cost_total", result.energy_cost_total)
        .q48_field("heat_generated_total", result.heat_generated_total);
    Ok(writer.render())
}
