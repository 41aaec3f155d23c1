//! Information field resolver: links, data packets, latency-gated
//! delivery, congestion-policy gating on both compute and bandwidth,
//! and per-packet corruption.

use arrayvec::ArrayVec;
use bitflags::bitflags;

use crate::domain::{Budget, DomainState, Histogram, Policy, Refusal};
use crate::fixed::{Q16, Q48};
use crate::rng::{self, SeedContext};

pub const MAX_NODES: usize = 64;
pub const MAX_LINKS: usize = 128;
pub const MAX_DATA: usize = 256;
pub const MAX_CAPACITIES: usize = 64;
pub const MAX_CAPSULES: usize = 64;
pub const HIST_BINS: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum LatencyClass {
    Immediate = 0,
    Local = 1,
    Regional = 2,
    Orbital = 3,
    Interplanetary = 4,
}

fn latency_ticks(class: LatencyClass) -> u64 {
    match class {
        LatencyClass::Immediate => 1,
        LatencyClass::Local => 4,
        LatencyClass::Regional => 16,
        LatencyClass::Orbital => 64,
        LatencyClass::Interplanetary => 256,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum CongestionPolicy {
    Queue = 0,
    DropNewest = 1,
    DropOldest = 2,
    Degrade = 3,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum DataType {
    Control = 0,
    Telemetry = 1,
    Message = 2,
    Storage = 3,
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct LinkFlags: u32 {
        const OUTAGE    = 1 << 0;
        const CONGESTED = 1 << 1;
        const CORRUPT   = 1 << 2;
    }
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct DataFlags: u32 {
        const QUEUED    = 1 << 0;
        const DELIVERED = 1 << 1;
        const DROPPED   = 1 << 2;
        const CORRUPT   = 1 << 3;
        const STORED    = 1 << 4;
    }
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct ResolveFlags: u32 {
        const PARTIAL   = 1 << 0;
        const OUTAGE    = 1 << 1;
        const DROPPED   = 1 << 2;
        const CONGESTED = 1 << 3;
        const CORRUPT   = 1 << 4;
    }
}

#[derive(Debug, Clone, Copy)]
pub struct CapacityDesc {
    pub capacity_id: u32,
    pub bandwidth_limit: Q48,
    pub latency_class: LatencyClass,
    pub congestion_policy: CongestionPolicy,
    pub error_rate: Q16,
}

#[derive(Debug, Clone, Copy)]
pub struct NodeDesc {
    pub node_id: u32,
    pub network_id: u32,
    pub compute_capacity: Q48,
    pub storage_capacity: Q48,
    pub energy_per_unit: Q48,
    pub heat_per_unit: Q48,
}

#[derive(Debug, Clone, Copy)]
pub struct LinkDesc {
    pub link_id: u32,
    pub network_id: u32,
    pub node_a: u32,
    pub node_b: u32,
    pub capacity_id: u32,
}

#[derive(Debug, Clone, Copy)]
pub struct DataDesc {
    pub data_id: u32,
    pub network_id: u32,
    pub data_type: DataType,
    pub source_node_id: u32,
    pub sink_node_id: u32,
    pub data_size: Q48,
    pub send_tick: u64,
}

#[derive(Debug, Clone)]
pub struct SurfaceDesc {
    pub domain_id: u64,
    pub world_seed: u64,
    pub capacities: ArrayVec<CapacityDesc, MAX_CAPACITIES>,
    pub nodes: ArrayVec<NodeDesc, MAX_NODES>,
    pub links: ArrayVec<LinkDesc, MAX_LINKS>,
    pub data: ArrayVec<DataDesc, MAX_DATA>,
}

impl Default for SurfaceDesc {
    fn default() -> Self {
        SurfaceDesc {
            domain_id: 1,
            world_seed: 1,
            capacities: ArrayVec::new(),
            nodes: ArrayVec::new(),
            links: ArrayVec::new(),
            data: ArrayVec::new(),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Node {
    pub node_id: u32,
    pub network_id: u32,
    pub compute_capacity: Q48,
    pub storage_capacity: Q48,
    pub storage_used: Q48,
    pub energy_per_unit: Q48,
    pub heat_per_unit: Q48,
}

#[derive(Debug, Clone, Copy)]
pub struct Link {
    pub link_id: u32,
    pub network_id: u32,
    pub node_a: u32,
    pub node_b: u32,
    pub capacity_id: u32,
    pub flags: LinkFlags,
}

#[derive(Debug, Clone, Copy)]
pub struct Data {
    pub data_id: u32,
    pub network_id: u32,
    pub data_type: DataType,
    pub source_node_id: u32,
    pub sink_node_id: u32,
    pub data_size: Q48,
    pub send_tick: u64,
    pub data_uncertainty: Q16,
    pub flags: DataFlags,
}

#[derive(Debug, Clone, Default)]
pub struct ResolveResult {
    pub ok: bool,
    pub refusal_reason: Refusal,
    pub flags: ResolveFlags,
    pub delivered_count: u32,
    pub dropped_count: u32,
    pub queued_count: u32,
    pub energy_cost_total: Q48,
    pub heat_generated_total: Q48,
}

#[derive(Debug, Clone, Copy)]
pub struct MacroCapsule {
    pub capsule_id: u64,
    pub network_id: u32,
    pub data_count: u32,
    pub link_utilization_hist: Histogram<HIST_BINS>,
}

pub struct InformationDomain {
    pub policy: Policy,
    pub state: DomainState,
    pub surface: SurfaceDesc,
    pub capacities: ArrayVec<CapacityDesc, MAX_CAPACITIES>,
    pub nodes: ArrayVec<Node, MAX_NODES>,
    pub links: ArrayVec<Link, MAX_LINKS>,
    pub data: ArrayVec<Data, MAX_DATA>,
    pub capsules: ArrayVec<MacroCapsule, MAX_CAPSULES>,
}

impl InformationDomain {
    pub fn init(desc: SurfaceDesc) -> Self {
        let nodes = desc
            .nodes
            .iter()
            .map(|d| Node {
                node_id: d.node_id,
                network_id: d.network_id,
                compute_capacity: d.compute_capacity,
                storage_capacity: d.storage_capacity,
                storage_used: Q48::ZERO,
                energy_per_unit: d.energy_per_unit,
                heat_per_unit: d.heat_per_unit,
            })
            .collect();
        let links = desc
            .links
            .iter()
            .map(|d| Link {
                link_id: d.link_id,
                network_id: d.network_id,
                node_a: d.node_a,
                node_b: d.node_b,
                capacity_id: d.capacity_id,
                flags: LinkFlags::empty(),
            })
            .collect();
        let data = desc
            .data
            .iter()
            .map(|d| Data {
                data_id: d.data_id,
                network_id: d.network_id,
                data_type: d.data_type,
                source_node_id: d.source_node_id,
                sink_node_id: d.sink_node_id,
                data_size: d.data_size,
                send_tick: d.send_tick,
                data_uncertainty: Q16::ZERO,
                flags: DataFlags::empty(),
            })
            .collect();
        let capacities = desc.capacities.clone();
        InformationDomain {
            policy: Policy::default(),
            state: DomainState::default(),
            surface: desc,
            capacities,
            nodes,
            links,
            data,
            capsules: ArrayVec::new(),
        }
    }

    fn find_capacity(&self, capacity_id: u32) -> Option<&CapacityDesc> {
        self.capacities.iter().find(|c| c.capacity_id == capacity_id)
    }

    fn find_node_index(&self, node_id: u32) -> Option<usize> {
        self.nodes.iter().position(|n| n.node_id == node_id)
    }

    fn find_link_for_nodes(&self, source: u32, sink: u32, network_id: u32) -> Option<usize> {
        self.links.iter().position(|l| {
            l.network_id == network_id && ((l.node_a == source && l.node_b == sink) || (l.node_a == sink && l.node_b == source))
        })
    }

    fn network_collapsed(&self, network_id: u32) -> bool {
        self.capsules.iter().any(|c| c.network_id == network_id)
    }

    fn find_capsule(&self, network_id: u32) -> Option<&MacroCapsule> {
        self.capsules.iter().find(|c| c.network_id == network_id)
    }

    /// `network_id == 0` is forbidden here, matching the energy/heat/fluid
    /// redesign decision.
    pub fn resolve(
        &mut self,
        network_id: u32,
        tick: u64,
        tick_delta: u64,
        budget: &mut Budget,
    ) -> ResolveResult {
        let mut result = ResolveResult::default();
        if network_id == 0 {
            result.refusal_reason = Refusal::Internal;
            return result;
        }
        if !self.state.is_active() {
            result.refusal_reason = Refusal::DomainInactive;
            return result;
        }
        if !budget.consume(self.policy.cost_analytic) {
            result.refusal_reason = Refusal::Budget;
            return result;
        }
        if self.network_collapsed(network_id) {
            if let Some(capsule) = self.find_capsule(network_id) {
                result.delivered_count = capsule.data_count;
            }
            result.ok = true;
            result.flags = ResolveFlags::PARTIAL;
            return result;
        }

        let tick_delta = if tick_delta == 0 { 1 } else { tick_delta };
        let mut flags = ResolveFlags::empty();
        let mut link_bandwidth = [Q48::ZERO; MAX_LINKS];
        let mut compute_used = [Q48::ZERO; MAX_NODES];

        let cost_link = self.policy.cost_medium;
        for i in 0..self.links.len() {
            if self.links[i].network_id != network_id {
                continue;
            }
            if !budget.consume(cost_link) {
                flags |= ResolveFlags::PARTIAL;
                result.refusal_reason = Refusal::Budget;
                break;
            }
            self.links[i].flags = LinkFlags::empty();
            let mut bandwidth = Q48::ZERO;
            match self.find_capacity(self.links[i].capacity_id) {
                Some(cap) => {
                    bandwidth = cap.bandwidth_limit;
                    if tick_delta > 1 && bandwidth.raw() > 0 {
                        bandwidth = bandwidth.mul(Q48::from_int(tick_delta as i64));
                    }
                    if bandwidth.raw() <= 0 {
                        self.links[i].flags |= LinkFlags::OUTAGE;
                        flags |= ResolveFlags::OUTAGE;
                    }
                }
                None => {
                    self.links[i].flags |= LinkFlags::OUTAGE;
                    flags |= ResolveFlags::OUTAGE;
                }
            }
            link_bandwidth[i] = bandwidth;
        }

        let cost_data = self.policy.cost_coarse;
        let mut delivered = 0u32;
        let mut dropped = 0u32;
        let mut queued = 0u32;
        let mut energy_total = Q48::ZERO;
        let mut heat_total = Q48::ZERO;

        'data: for i in 0..self.data.len() {
            if self.data[i].network_id != network_id {
                continue;
            }
            if self.data[i].flags.intersects(DataFlags::DELIVERED | DataFlags::DROPPED) {
                continue;
            }
            if !budget.consume(cost_data) {
                flags |= ResolveFlags::PARTIAL;
                result.refusal_reason = Refusal::Budget;
                break;
            }
            if self.data[i].send_tick > tick {
                self.data[i].flags |= DataFlags::QUEUED;
                queued += 1;
                continue;
            }

            let link_idx = match self.find_link_for_nodes(self.data[i].source_node_id, self.data[i].sink_node_id, network_id) {
                Some(idx) => idx,
                None => {
                    self.data[i].flags.remove(DataFlags::QUEUED);
                    self.data[i].flags |= DataFlags::DROPPED;
                    dropped += 1;
                    flags |= ResolveFlags::DROPPED;
                    continue;
                }
            };
            let capacity_id = self.links[link_idx].capacity_id;
            let capacity = match self.find_capacity(capacity_id) {
                Some(c) => *c,
                None => {
                    self.data[i].flags.remove(DataFlags::QUEUED);
                    self.data[i].flags |= DataFlags::DROPPED;
                    dropped += 1;
                    flags |= ResolveFlags::DROPPED;
                    continue;
                }
            };

            let lat = latency_ticks(capacity.latency_class);
            if tick < self.data[i].send_tick + lat {
                self.data[i].flags |= DataFlags::QUEUED;
                queued += 1;
                continue;
            }

            let source_idx = match self.find_node_index(self.data[i].source_node_id) {
                Some(idx) => idx,
                None => {
                    self.data[i].flags.remove(DataFlags::QUEUED);
                    self.data[i].flags |= DataFlags::DROPPED;
                    dropped += 1;
                    flags |= ResolveFlags::DROPPED;
                    continue;
                }
            };
            let sink_idx = match self.find_node_index(self.data[i].sink_node_id) {
                Some(idx) => idx,
                None => {
                    self.data[i].flags.remove(DataFlags::QUEUED);
                    self.data[i].flags |= DataFlags::DROPPED;
                    dropped += 1;
                    flags |= ResolveFlags::DROPPED;
                    continue;
                }
            };

            let compute_cap = self.nodes[sink_idx].compute_capacity;
            if compute_cap.raw() > 0 {
                let compute_next = compute_used[sink_idx].add(self.data[i].data_size);
                if compute_next > compute_cap {
                    match capacity.congestion_policy {
                        CongestionPolicy::Queue => {
                            self.data[i].flags |= DataFlags::QUEUED;
                            queued += 1;
                            flags |= ResolveFlags::CONGESTED;
                            self.links[link_idx].flags |= LinkFlags::CONGESTED;
                            continue 'data;
                        }
                        CongestionPolicy::Degrade => {
                            self.data[i].flags |= DataFlags::CORRUPT;
                            flags |= ResolveFlags::CORRUPT;
                        }
                        _ => {
                            self.data[i].flags.remove(DataFlags::QUEUED);
                            self.data[i].flags |= DataFlags::DROPPED;
                            dropped += 1;
                            flags |= ResolveFlags::DROPPED;
                            self.links[link_idx].flags |= LinkFlags::CONGESTED;
                            continue 'data;
                        }
                    }
                } else {
                    compute_used[sink_idx] = compute_next;
                }
            }

            let bandwidth_remaining = link_bandwidth[link_idx];
            if bandwidth_remaining < self.data[i].data_size {
                match capacity.congestion_policy {
                    CongestionPolicy::Queue => {
                        self.data[i].flags |= DataFlags::QUEUED;
                        queued += 1;
                        flags |= ResolveFlags::CONGESTED;
                        self.links[link_idx].flags |= LinkFlags::CONGESTED;
                        continue;
                    }
                    CongestionPolicy::Degrade if bandwidth_remaining.raw() > 0 => {
                        self.data[i].flags |= DataFlags::CORRUPT;
                        flags |= ResolveFlags::CORRUPT;
                        link_bandwidth[link_idx] = Q48::ZERO;
                    }
                    _ => {
                        self.data[i].flags.remove(DataFlags::QUEUED);
                        self.data[i].flags |= DataFlags::DROPPED;
                        dropped += 1;
                        flags |= ResolveFlags::DROPPED;
                        self.links[link_idx].flags |= LinkFlags::CONGESTED;
                        continue;
                    }
                }
            } else {
                link_bandwidth[link_idx] = bandwidth_remaining.sub(self.data[i].data_size);
            }

            if capacity.error_rate.raw() > 0 {
                let link_id = self.links[link_idx].link_id as u64;
                let data_id = self.data[i].data_id as u64;
                let corrupt = rng::roll_from_context(
                    SeedContext {
                        world_seed: self.surface.world_seed,
                        domain_id: self.surface.domain_id,
                        process_id: link_id ^ data_id,
                        tick,
                        stream: "noise.stream.signal.data.error",
                    },
                    capacity.error_rate,
                );
                if corrupt {
                    self.data[i].flags |= DataFlags::CORRUPT;
                    if capacity.error_rate > self.data[i].data_uncertainty {
                        self.data[i].data_uncertainty = capacity.error_rate.clamp_ratio();
                    }
                    flags |= ResolveFlags::CORRUPT;
                    self.links[link_idx].flags |= LinkFlags::CORRUPT;
                }
            }

            if self.data[i].data_type == DataType::Storage {
                let storage_cap = self.nodes[sink_idx].storage_capacity;
                if storage_cap.raw() > 0 {
                    let storage_next = self.nodes[sink_idx].storage_used.add(self.data[i].data_size);
                    if storage_next > storage_cap {
                        if capacity.congestion_policy == CongestionPolicy::Queue {
                            self.data[i].flags |= DataFlags::QUEUED;
                            queued += 1;
                            flags |= ResolveFlags::CONGESTED;
                            continue;
                        }
                        self.data[i].flags.remove(DataFlags::QUEUED);
                        self.data[i].flags |= DataFlags::DROPPED;
                        dropped += 1;
                        flags |= ResolveFlags::DROPPED;
                        continue;
                    }
                    self.nodes[sink_idx].storage_used = storage_next;
                }
                self.data[i].flags.remove(DataFlags::QUEUED);
                self.data[i].flags |= DataFlags::STORED;
            } else {
                self.data[i].flags.remove(DataFlags::QUEUED);
                self.data[i].flags |= DataFlags::DELIVERED;
            }

            delivered += 1;
            let size = self.data[i].data_size;
            energy_total = energy_total.add(size.mul(self.nodes[source_idx].energy_per_unit));
            energy_total = energy_total.add(size.mul(self.nodes[sink_idx].energy_per_unit));
            heat_total = heat_total.add(size.mul(self.nodes[source_idx].heat_per_unit));
            heat_total = heat_total.add(size.mul(self.nodes[sink_idx].heat_per_unit));
        }

        result.ok = true;
        result.flags = flags;
        result.delivered_count = delivered;
        result.dropped_count = dropped;
        result.queued_count = queued;
        result.energy_cost_total = energy_total;
        result.heat_generated_total = heat_total;
        result
    }

    pub fn collapse_network(&mut self, network_id: u32) -> Result<(), &'static str> {
        if self.network_collapsed(network_id) {
            return Ok(());
        }
        if self.capsules.is_full() {
            return Err("capsule capacity exhausted");
        }
        let mut capsule = MacroCapsule {
            capsule_id: network_id as u64,
            network_id,
            data_count: 0,
            link_utilization_hist: Histogram::default(),
        };
        for data in self.data.iter().filter(|d| d.network_id == network_id) {
            if data.flags.contains(DataFlags::DELIVERED) {
                capsule.data_count += 1;
            }
        }
        self.capsules.push(capsule);
        Ok(())
    }

    pub fn expand_network(&mut self, network_id: u32) -> Result<(), i32> {
        match self.capsules.iter().position(|c| c.network_id == network_id) {
            Some(idx) => {
                self.capsules.swap_remove(idx);
                Ok(())
            }
            None => Err(-2),
        }
    }

    /// Live node storage usage by `node_id`, link flags by `link_id`,
    /// in-flight packet flags by `data_id`, then the collapsed-network
    /// capsules.
    pub fn save_instance(&self, out: &mut Vec<u8>) -> crate::error::Result<()> {
        out.extend_from_slice(&(self.nodes.len() as u32).to_le_bytes());
        for n in self.nodes.iter() {
            out.extend_from_slice(&n.node_id.to_le_bytes());
            out.extend_from_slice(&n.storage_used.raw().to_le_bytes());
        }
        out.extend_from_slice(&(self.links.len() as u32).to_le_bytes());
        for l in self.links.iter() {
            out.extend_from_slice(&l.link_id.to_le_bytes());
            out.extend_from_slice(&l.flags.bits().to_le_bytes());
        }
        out.extend_from_slice(&(self.data.len() as u32).to_le_bytes());
        for d in self.data.iter() {
            out.extend_from_slice(&d.data_id.to_le_bytes());
            out.extend_from_slice(&d.flags.bits().to_le_bytes());
        }
        out.extend_from_slice(&(self.capsules.len() as u32).to_le_bytes());
        for c in self.capsules.iter() {
            out.extend_from_slice(&c.capsule_id.to_le_bytes());
            out.extend_from_slice(&c.network_id.to_le_bytes());
            out.extend_from_slice(&c.data_count.to_le_bytes());
        }
        Ok(())
    }

    pub fn load_instance(&mut self, bytes: &[u8]) -> crate::error::Result<()> {
        let mut r = crate::serialize::Reader::new(bytes);
        let node_count = r.read_u32()?;
        for _ in 0..node_count {
            let node_id = r.read_u32()?;
            let storage_used = Q48(r.read_i64()?);
            if let Some(idx) = self.find_node_index(node_id) {
                self.nodes[idx].storage_used = storage_used;
            }
        }
        let link_count = r.read_u32()?;
        for _ in 0..link_count {
            let link_id = r.read_u32()?;
            let flags = LinkFlags::from_bits_truncate(r.read_u32()?);
            if let Some(idx) = self.links.iter().position(|l| l.link_id == link_id) {
                self.links[idx].flags = flags;
            }
        }
        let data_count = r.read_u32()?;
        for _ in 0..data_count {
            let data_id = r.read_u32()?;
            let flags = DataFlags::from_bits_truncate(r.read_u32()?);
            if let Some(idx) = self.data.iter().position(|d| d.data_id == data_id) {
                self.data[idx].flags = flags;
            }
        }
        let capsule_count = r.read_u32()?;
        self.capsules.clear();
        for _ in 0..capsule_count {
            let capsule = MacroCapsule {
                capsule_id: r.read_u64()?,
                network_id: r.read_u32()?,
                data_count: r.read_u32()?,
                link_utilization_hist: Histogram::default(),
            };
            if !self.capsules.is_full() {
                self.capsules.push(capsule);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Existence;

    fn base_domain() -> InformationDomain {
        let mut desc = SurfaceDesc::default();
        desc.capacities.push(CapacityDesc {
            capacity_id: 1,
            bandwidth_limit: Q48::from_int(100),
            latency_class: LatencyClass::Immediate,
            congestion_policy: CongestionPolicy::DropNewest,
            error_rate: Q16::ZERO,
        });
        desc.nodes.push(NodeDesc {
            node_id: 1,
            network_id: 1,
            compute_capacity: Q48::ZERO,
            storage_capacity: Q48::ZERO,
            energy_per_unit: Q48::ZERO,
            heat_per_unit: Q48::ZERO,
        });
        desc.nodes.push(NodeDesc {
            node_id: 2,
            network_id: 1,
            compute_capacity: Q48::ZERO,
            storage_capacity: Q48::ZERO,
            energy_per_unit: Q48::ZERO,
            heat_per_unit: Q48::ZERO,
        });
        desc.links.push(LinkDesc {
            link_id: 1,
            network_id: 1,
            node_a: 1,
            node_b: 2,
            capacity_id: 1,
        });
        let mut domain = InformationDomain::init(desc);
        domain.state.existence = Existence::Realized;
        domain
    }

    #[test]
    fn delivers_immediate_packet_same_tick() {
        let mut domain = base_domain();
        domain.data.push(Data {
            data_id: 1,
            network_id: 1,
            data_type: DataType::Message,
            source_node_id: 1,
            sink_node_id: 2,
            data_size: Q48::from_int(10),
            send_tick: 0,
            data_uncertainty: Q16::ZERO,
            flags: DataFlags::empty(),
        });
        let mut budget = Budget::new(1_000);
        let result = domain.resolve(1, 0, 1, &mut budget);
        assert_eq!(result.delivered_count, 1);
        assert!(domain.data[0].flags.contains(DataFlags::DELIVERED));
    }

    #[test]
    fn regional_latency_queues_before_arrival() {
        let mut domain = base_domain();
        domain.links[0].capacity_id = 1;
        domain.capacities[0].latency_class = LatencyClass::Regional;
        domain.data.push(Data {
            data_id: 1,
            network_id: 1,
            data_type: DataType::Message,
            source_node_id: 1,
            sink_node_id: 2,
            data_size: Q48::from_int(10),
            send_tick: 0,
            data_uncertainty: Q16::ZERO,
            flags: DataFlags::empty(),
        });
        let mut budget = Budget::new(1_000);
        let result = domain.resolve(1, 5, 1, &mut budget);
        assert_eq!(result.queued_count, 1);
        assert!(domain.data[0].flags.contains(DataFlags::QUEUED));
    }

    #[test]
    fn missing_link_drops_packet() {
        let mut domain = base_domain();
        domain.data.push(Data {
            data_id: 1,
            network_id: 1,
            data_type: DataType::Message,
            source_node_id: 1,
            sink_node_id: 99,
            data_size: Q48::from_int(10),
            send_tick: 0,
            data_uncertainty: Q16::ZERO,
            flags: DataFlags::empty(),
        });
        let mut budget = Budget::new(1_000);
        let result = domain.resolve(1, 0, 1, &mut budget);
        assert_eq!(result.dropped_count, 1);
        assert!(result.flags.contains(ResolveFlags::DROPPED));
    }

    #[test]
    fn zero_bandwidth_link_outage() {
        let mut domain = base_domain();
        domain.capacities[0].bandwidth_limit = Q48::ZERO;
        let mut budget = Budget::new(1_000);
        let result = domain.resolve(1, 0, 1, &mut budget);
        assert!(domain.links[0].flags.contains(LinkFlags::OUTAGE));
        assert!(result.flags.contains(ResolveFlags::OUTAGE));
    }
}
