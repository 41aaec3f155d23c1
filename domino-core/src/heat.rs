//! Heat field resolver: stores, flows, ambient exchange, and an
//! independent thermal-stress pass over derived temperature bands.
//!
//! Shares the energy resolver's skeleton but differs in failure
//! vocabulary (`BLOCKED` rather than separate brownout/blackout) and
//! adds a stress pass keyed off its own records, not the stores
//! directly.

use arrayvec::ArrayVec;
use bitflags::bitflags;

use crate::domain::{
    Budget, Confidence, DomainState, Histogram, Policy, QueryMeta, Refusal, Resolution,
};
use crate::fixed::{Q16, Q48};
use crate::rng::{self, SeedContext};

pub const MAX_STORES: usize = 64;
pub const MAX_FLOWS: usize = 128;
pub const MAX_STRESSES: usize = 64;
pub const MAX_CAPSULES: usize = 64;
pub const HIST_BINS: usize = 4;
const CASCADE_DIVISOR: i64 = 2;

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct FailureMode: u32 {
        const OVERLOAD = 1 << 0;
        const BLOCKED  = 1 << 1;
        const CASCADE  = 1 << 2;
        const LEAKAGE  = 1 << 3;
    }
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct StoreFlags: u32 {
        const UNKNOWN   = 1 << 0;
        const COLLAPSED = 1 << 1;
    }
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct FlowFlags: u32 {
        const UNKNOWN  = 1 << 0;
        const OVERLOAD = 1 << 1;
        const BLOCKED  = 1 << 2;
        const CASCADE  = 1 << 3;
        const LEAKAGE  = 1 << 4;
    }
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct StressFlags: u32 {
        const UNKNOWN          = 1 << 0;
        const UNDERCOOL        = 1 << 1;
        const OVERHEAT         = 1 << 2;
        const DAMAGE           = 1 << 3;
        const EFFICIENCY_LOSS  = 1 << 4;
        const SHUTDOWN         = 1 << 5;
    }
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct ResolveFlags: u32 {
        const PARTIAL   = 1 << 0;
        const OVERLOAD  = 1 << 1;
        const BLOCKED   = 1 << 2;
        const CASCADE   = 1 << 3;
        const LEAKAGE   = 1 << 4;
        const UNDERCOOL = 1 << 5;
        const OVERHEAT  = 1 << 6;
        const DAMAGE    = 1 << 7;
    }
}

#[derive(Debug, Clone, Copy)]
pub struct StoreDesc {
    pub store_id: u32,
    pub amount: Q48,
    pub capacity: Q48,
    pub ambient_exchange_rate: Q16,
    pub network_id: u32,
}

#[derive(Debug, Clone, Copy)]
pub struct FlowDesc {
    pub flow_id: u32,
    pub network_id: u32,
    pub source_store_id: u32,
    pub sink_store_id: u32,
    pub max_transfer_rate: Q48,
    pub efficiency: Q16,
    pub failure_mode_mask: FailureMode,
    pub failure_chance: Q16,
}

#[derive(Debug, Clone, Copy)]
pub struct StressDesc {
    pub stress_id: u32,
    pub store_id: u32,
    pub safe_min: Q48,
    pub safe_max: Q48,
    pub damage_rate: Q16,
    pub efficiency_modifier: Q16,
}

#[derive(Debug, Clone)]
pub struct SurfaceDesc {
    pub domain_id: u64,
    pub world_seed: u64,
    pub temperature_scale: Q48,
    pub stores: ArrayVec<StoreDesc, MAX_STORES>,
    pub flows: ArrayVec<FlowDesc, MAX_FLOWS>,
    pub stresses: ArrayVec<StressDesc, MAX_STRESSES>,
}

impl Default for SurfaceDesc {
    fn default() -> Self {
        SurfaceDesc {
            domain_id: 1,
            world_seed: 1,
            temperature_scale: Q48::from_int(1),
            stores: ArrayVec::new(),
            flows: ArrayVec::new(),
            stresses: ArrayVec::new(),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Store {
    pub store_id: u32,
    pub amount: Q48,
    pub capacity: Q48,
    pub ambient_exchange_rate: Q16,
    pub network_id: u32,
    pub flags: StoreFlags,
}

#[derive(Debug, Clone, Copy)]
pub struct Flow {
    pub flow_id: u32,
    pub network_id: u32,
    pub source_store_id: u32,
    pub sink_store_id: u32,
    pub max_transfer_rate: Q48,
    pub efficiency: Q16,
    pub failure_mode_mask: FailureMode,
    pub failure_chance: Q16,
    pub flags: FlowFlags,
}

#[derive(Debug, Clone, Copy)]
pub struct Stress {
    pub stress_id: u32,
    pub store_id: u32,
    pub safe_min: Q48,
    pub safe_max: Q48,
    pub damage_rate: Q16,
    pub efficiency_modifier: Q16,
    pub flags: StressFlags,
}

#[derive(Debug, Clone, Default)]
pub struct ResolveResult {
    pub ok: bool,
    pub refusal_reason: Refusal,
    pub flags: ResolveFlags,
    pub store_count: u32,
    pub flow_count: u32,
    pub stress_count: u32,
    pub stress_undercool_count: u32,
    pub stress_overheat_count: u32,
    pub stress_damage_count: u32,
    pub heat_transferred: Q48,
    pub heat_dissipated: Q48,
    pub heat_remaining: Q48,
}

#[derive(Debug, Clone, Copy)]
pub struct MacroCapsule {
    pub capsule_id: u64,
    pub network_id: u32,
    pub store_count: u32,
    pub flow_count: u32,
    pub heat_total: Q48,
    pub capacity_total: Q48,
    pub temperature_ratio_hist: Histogram<HIST_BINS>,
}

pub struct HeatDomain {
    pub policy: Policy,
    pub state: DomainState,
    pub surface: SurfaceDesc,
    pub stores: ArrayVec<Store, MAX_STORES>,
    pub flows: ArrayVec<Flow, MAX_FLOWS>,
    pub stresses: ArrayVec<Stress, MAX_STRESSES>,
    pub capsules: ArrayVec<MacroCapsule, MAX_CAPSULES>,
}

impl HeatDomain {
    pub fn init(desc: SurfaceDesc) -> Self {
        let stores = desc
            .stores
            .iter()
            .map(|d| Store {
                store_id: d.store_id,
                amount: d.amount,
                capacity: d.capacity,
                ambient_exchange_rate: d.ambient_exchange_rate,
                network_id: d.network_id,
                flags: StoreFlags::empty(),
            })
            .collect();
        let flows = desc
            .flows
            .iter()
            .map(|d| Flow {
                flow_id: d.flow_id,
                network_id: d.network_id,
                source_store_id: d.source_store_id,
                sink_store_id: d.sink_store_id,
                max_transfer_rate: d.max_transfer_rate,
                efficiency: d.efficiency,
                failure_mode_mask: d.failure_mode_mask,
                failure_chance: d.failure_chance,
                flags: FlowFlags::empty(),
            })
            .collect();
        let stresses = desc
            .stresses
            .iter()
            .map(|d| Stress {
                stress_id: d.stress_id,
                store_id: d.store_id,
                safe_min: d.safe_min,
                safe_max: d.safe_max,
                damage_rate: d.damage_rate,
                efficiency_modifier: d.efficiency_modifier,
                flags: StressFlags::empty(),
            })
            .collect();
        HeatDomain {
            policy: Policy::default(),
            state: DomainState::default(),
            surface: desc,
            stores,
            flows,
            stresses,
            capsules: ArrayVec::new(),
        }
    }

    fn find_store_index(&self, store_id: u32) -> Option<usize> {
        self.stores.iter().position(|s| s.store_id == store_id)
    }

    fn network_collapsed(&self, network_id: u32) -> bool {
        self.capsules.iter().any(|c| c.network_id == network_id)
    }

    fn find_capsule(&self, network_id: u32) -> Option<&MacroCapsule> {
        self.capsules.iter().find(|c| c.network_id == network_id)
    }

    fn temperature(&self, store: &Store) -> Q48 {
        if store.capacity.raw() <= 0 || store.amount.raw() <= 0 || self.surface.temperature_scale.raw() <= 0 {
            return Q48::ZERO;
        }
        let mut ratio = store.amount.div(store.capacity);
        if ratio.raw() < 0 {
            ratio = Q48::ZERO;
        }
        ratio.mul(self.surface.temperature_scale)
    }

    /// `network_id == 0` ("all networks") is forbidden for `resolve`, per
    /// the same redesign decision recorded for the energy domain.
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
                result.store_count = capsule.store_count;
                result.flow_count = capsule.flow_count;
                result.heat_remaining = capsule.heat_total;
            }
            result.ok = true;
            result.flags = ResolveFlags::PARTIAL;
            return result;
        }

        let mut heat_dissipated = Q48::ZERO;
        let mut heat_transferred = Q48::ZERO;
        let mut flags = ResolveFlags::empty();

        for store in self.stores.iter_mut().filter(|s| s.network_id == network_id) {
            if apply_exchange(store, tick_delta, &mut heat_dissipated) {
                flags |= ResolveFlags::LEAKAGE;
            }
        }

        let cost_flow = self.policy.cost_medium;
        let mut cascade_active = false;
        let mut flows_seen = 0u32;
        for i in 0..self.flows.len() {
            if self.flows[i].network_id != network_id {
                continue;
            }
            if !budget.consume(cost_flow) {
                flags |= ResolveFlags::PARTIAL;
                if result.refusal_reason == Refusal::None {
                    result.refusal_reason = Refusal::Budget;
                }
                break;
            }
            self.flows[i].flags = FlowFlags::empty();

            let source_id = self.flows[i].source_store_id;
            let sink_id = self.flows[i].sink_store_id;
            let (source_idx, sink_idx) = match (self.find_store_index(source_id), self.find_store_index(sink_id)) {
                (Some(a), Some(b)) => (a, b),
                _ => {
                    self.flows[i].flags |= FlowFlags::UNKNOWN;
                    flags |= ResolveFlags::PARTIAL;
                    continue;
                }
            };

            let mut max_rate = self.flows[i].max_transfer_rate;
            if cascade_active && max_rate.raw() > 0 {
                max_rate = Q48(max_rate.raw() / CASCADE_DIVISOR);
            }
            let available = self.stores[source_idx].amount;
            let mut sink_space = self.stores[sink_idx].capacity.sub(self.stores[sink_idx].amount);
            if sink_space.raw() < 0 {
                sink_space = Q48::ZERO;
            }
            let mut transfer = max_rate.min(available).min(sink_space);

            let mask = self.flows[i].failure_mode_mask;
            if available.raw() <= 0 && mask.contains(FailureMode::BLOCKED) {
                self.flows[i].flags |= FlowFlags::BLOCKED;
                flags |= ResolveFlags::BLOCKED;
            }
            if sink_space.raw() <= 0 && mask.contains(FailureMode::OVERLOAD) {
                self.flows[i].flags |= FlowFlags::OVERLOAD;
                flags |= ResolveFlags::OVERLOAD;
            }

            if self.flows[i].failure_chance.raw() > 0
                && rng::roll_from_context(
                    SeedContext {
                        world_seed: self.surface.world_seed,
                        domain_id: self.surface.domain_id,
                        process_id: self.flows[i].flow_id as u64,
                        tick,
                        stream: "noise.stream.heat.flow.failure",
                    },
                    self.flows[i].failure_chance,
                )
            {
                if mask.contains(FailureMode::BLOCKED) {
                    self.flows[i].flags |= FlowFlags::BLOCKED;
                    flags |= ResolveFlags::BLOCKED;
                }
                transfer = Q48::ZERO;
            }

            if transfer.raw() > 0 {
                let delivered = transfer.mul_ratio(self.flows[i].efficiency.clamp_ratio());
                let loss = transfer.sub(delivered);
                self.stores[source_idx].amount = self.stores[source_idx].amount.sub(transfer);
                self.stores[sink_idx].amount = self.stores[sink_idx].amount.add(delivered);
                heat_transferred = heat_transferred.add(delivered);
                if loss.raw() > 0 {
                    heat_dissipated = heat_dissipated.add(loss);
                    self.flows[i].flags |= FlowFlags::LEAKAGE;
                    flags |= ResolveFlags::LEAKAGE;
                }
            }

            let fl = self.flows[i].flags;
            if (fl.contains(FlowFlags::BLOCKED) || fl.contains(FlowFlags::OVERLOAD)) && mask.contains(FailureMode::CASCADE)
            {
                cascade_active = true;
                self.flows[i].flags |= FlowFlags::CASCADE;
                flags |= ResolveFlags::CASCADE;
            }
            flows_seen += 1;
        }

        let mut heat_remaining = Q48::ZERO;
        let mut stores_seen = 0u32;
        for store in self.stores.iter().filter(|s| s.network_id == network_id) {
            heat_remaining = heat_remaining.add(store.amount);
            stores_seen += 1;
        }

        let cost_stress = self.policy.cost_coarse;
        let mut stress_seen = 0u32;
        for i in 0..self.stresses.len() {
            let store_id = self.stresses[i].store_id;
            let store_idx = match self.find_store_index(store_id) {
                Some(idx) => idx,
                None => {
                    self.stresses[i].flags = StressFlags::UNKNOWN;
                    flags |= ResolveFlags::PARTIAL;
                    continue;
                }
            };
            if self.stores[store_idx].network_id != network_id {
                continue;
            }
            if !budget.consume(cost_stress) {
                flags |= ResolveFlags::PARTIAL;
                if result.refusal_reason == Refusal::None {
                    result.refusal_reason = Refusal::Budget;
                }
                break;
            }

            self.stresses[i].flags = StressFlags::empty();
            let temperature = self.temperature(&self.stores[store_idx]);
            let mut out_of_range = false;
            if temperature < self.stresses[i].safe_min {
                self.stresses[i].flags |= StressFlags::UNDERCOOL;
                result.stress_undercool_count += 1;
                flags |= ResolveFlags::UNDERCOOL;
                out_of_range = true;
            }
            if temperature > self.stresses[i].safe_max {
                self.stresses[i].flags |= StressFlags::OVERHEAT;
                result.stress_overheat_count += 1;
                flags |= ResolveFlags::OVERHEAT;
                out_of_range = true;
            }
            if out_of_range && self.stresses[i].damage_rate.raw() > 0 {
                self.stresses[i].flags |= StressFlags::DAMAGE;
                result.stress_damage_count += 1;
                flags |= ResolveFlags::DAMAGE;
            }
            let eff = self.stresses[i].efficiency_modifier.clamp_ratio();
            if out_of_range && eff < Q16::ONE {
                self.stresses[i].flags |= StressFlags::EFFICIENCY_LOSS;
                if eff.raw() <= 0 {
                    self.stresses[i].flags |= StressFlags::SHUTDOWN;
                }
            }
            stress_seen += 1;
        }

        result.ok = true;
        result.flags = flags;
        result.store_count = stores_seen;
        result.flow_count = flows_seen;
        result.stress_count = stress_seen;
        result.heat_transferred = heat_transferred;
        result.heat_dissipated = heat_dissipated;
        result.heat_remaining = heat_remaining;
        result
    }

    pub fn store_query(&self, store_id: u32, budget: &mut Budget) -> (Option<Store>, QueryMeta) {
        if !self.state.is_active() {
            return (None, QueryMeta::refused(Refusal::DomainInactive, *budget));
        }
        if !budget.consume(self.policy.cost_full) {
            return (None, QueryMeta::refused(Refusal::Budget, *budget));
        }
        match self.find_store_index(store_id) {
            Some(idx) => (
                Some(self.stores[idx]),
                QueryMeta::ok(Resolution::Exact, Confidence::Exact, self.policy.cost_full, *budget),
            ),
            None => (None, QueryMeta::refused(Refusal::Missing, *budget)),
        }
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
            store_count: 0,
            flow_count: 0,
            heat_total: Q48::ZERO,
            capacity_total: Q48::ZERO,
            temperature_ratio_hist: Histogram::default(),
        };
        for store in self.stores.iter().filter(|s| s.network_id == network_id) {
            capsule.store_count += 1;
            capsule.heat_total = capsule.heat_total.add(store.amount);
            capsule.capacity_total = capsule.capacity_total.add(store.capacity);
            let ratio = if store.capacity.raw() > 0 {
                store.amount.div(store.capacity).to_q16_saturating().clamp_ratio()
            } else {
                Q16::ZERO
            };
            capsule.temperature_ratio_hist.observe(ratio);
        }
        for flow in self.flows.iter().filter(|f| f.network_id == network_id) {
            capsule.flow_count += 1;
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

    /// Live store amounts/flags by `store_id`, stress damage state by
    /// `stress_id`, then the collapsed-network capsules. Static surface
    /// config is reloaded from the fixture, not re-saved here.
    pub fn save_instance(&self, out: &mut Vec<u8>) -> crate::error::Result<()> {
        out.extend_from_slice(&(self.stores.len() as u32).to_le_bytes());
        for s in self.stores.iter() {
            out.extend_from_slice(&s.store_id.to_le_bytes());
            out.extend_from_slice(&s.amount.raw().to_le_bytes());
            out.extend_from_slice(&s.flags.bits().to_le_bytes());
        }
        out.extend_from_slice(&(self.stresses.len() as u32).to_le_bytes());
        for st in self.stresses.iter() {
            out.extend_from_slice(&st.stress_id.to_le_bytes());
            out.extend_from_slice(&st.flags.bits().to_le_bytes());
        }
        out.extend_from_slice(&(self.capsules.len() as u32).to_le_bytes());
        for c in self.capsules.iter() {
            out.extend_from_slice(&c.capsule_id.to_le_bytes());
            out.extend_from_slice(&c.network_id.to_le_bytes());
            out.extend_from_slice(&c.store_count.to_le_bytes());
            out.extend_from_slice(&c.flow_count.to_le_bytes());
            out.extend_from_slice(&c.heat_total.raw().to_le_bytes());
            out.extend_from_slice(&c.capacity_total.raw().to_le_bytes());
        }
        Ok(())
    }

    pub fn load_instance(&mut self, bytes: &[u8]) -> crate::error::Result<()> {
        let mut r = crate::serialize::Reader::new(bytes);
        let store_count = r.read_u32()?;
        for _ in 0..store_count {
            let store_id = r.read_u32()?;
            let amount = Q48(r.read_i64()?);
            let flags = StoreFlags::from_bits_truncate(r.read_u32()?);
            if let Some(idx) = self.find_store_index(store_id) {
                self.stores[idx].amount = amount;
                self.stores[idx].flags = flags;
            }
        }
        let stress_count = r.read_u32()?;
        for _ in 0..stress_count {
            let stress_id = r.read_u32()?;
            let flags = StressFlags::from_bits_truncate(r.read_u32()?);
            if let Some(idx) = self.stresses.iter().position(|s| s.stress_id == stress_id) {
                self.stresses[idx].flags = flags;
            }
        }
        let capsule_count = r.read_u32()?;
        self.capsules.clear();
        for _ in 0..capsule_count {
            let capsule = MacroCapsule {
                capsule_id: r.read_u64()?,
                network_id: r.read_u32()?,
                store_count: r.read_u32()?,
                flow_count: r.read_u32()?,
                heat_total: Q48(r.read_i64()?),
                capacity_total: Q48(r.read_i64()?),
                temperature_ratio_hist: Histogram::default(),
            };
            if !self.capsules.is_full() {
                self.capsules.push(capsule);
            }
        }
        Ok(())
    }
}

fn apply_exchange(store: &mut Store, tick_delta: u64, io_loss_total: &mut Q48) -> bool {
    if tick_delta == 0 || store.ambient_exchange_rate.raw() <= 0 {
        return false;
    }
    let mut leak = store.amount.mul_ratio(store.ambient_exchange_rate.clamp_ratio());
    if tick_delta > 1 {
        leak = leak.mul(Q48::from_int(tick_delta as i64));
    }
    if leak.raw() <= 0 {
        return false;
    }
    if leak > store.amount {
        leak = store.amount;
    }
    store.amount = store.amount.sub(leak);
    *io_loss_total = io_loss_total.add(leak);
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Existence;

    fn domain_with_stress(safe_min: Q48, safe_max: Q48, damage_rate: Q16) -> HeatDomain {
        let mut desc = SurfaceDesc::default();
        desc.stores.push(StoreDesc {
            store_id: 1,
            amount: Q48::from_int(80),
            capacity: Q48::from_int(100),
            ambient_exchange_rate: Q16::ZERO,
            network_id: 1,
        });
        desc.stresses.push(StressDesc {
            stress_id: 1,
            store_id: 1,
            safe_min,
            safe_max,
            damage_rate,
            efficiency_modifier: Q16::ONE,
        });
        let mut domain = HeatDomain::init(desc);
        domain.state.existence = Existence::Realized;
        domain
    }

    #[test]
    fn overheat_flags_and_counts() {
        let mut domain = domain_with_stress(Q48::ZERO, Q48::from_int(50), Q16::ZERO);
        let mut budget = Budget::new(1_000);
        let result = domain.resolve(1, 0, 1, &mut budget);
        assert_eq!(result.stress_overheat_count, 1);
        assert!(domain.stresses[0].flags.contains(StressFlags::OVERHEAT));
        assert!(result.flags.contains(ResolveFlags::OVERHEAT));
    }

    #[test]
    fn undercool_with_damage_rate_flags_damage() {
        let mut domain = domain_with_stress(Q48::from_int(90), Q48::from_int(200), Q16::ONE);
        let mut budget = Budget::new(1_000);
        let result = domain.resolve(1, 0, 1, &mut budget);
        assert!(domain.stresses[0].flags.contains(StressFlags::UNDERCOOL));
        assert!(domain.stresses[0].flags.contains(StressFlags::DAMAGE));
        assert_eq!(result.stress_damage_count, 1);
    }

    #[test]
    fn missing_stress_store_is_unknown_and_partial() {
        let mut desc = SurfaceDesc::default();
        desc.stresses.push(StressDesc {
            stress_id: 1,
            store_id: 99,
            safe_min: Q48::ZERO,
            safe_max: Q48::from_int(100),
            damage_rate: Q16::ZERO,
            efficiency_modifier: Q16::ONE,
        });
        let mut domain = HeatDomain::init(desc);
        domain.state.existence = Existence::Realized;
        let mut budget = Budget::new(1_000);
        let result = domain.resolve(1, 0, 1, &mut budget);
        assert!(domain.stresses[0].flags.contains(StressFlags::UNKNOWN));
        assert!(result.flags.contains(ResolveFlags::PARTIAL));
    }

    #[test]
    fn resolve_forbids_network_zero() {
        let mut domain = HeatDomain::init(SurfaceDesc::default());
        let mut budget = Budget::new(10);
        let result = domain.resolve(0, 0, 1, &mut budget);
        assert_eq!(result.refusal_reason, Refusal::Internal);
    }
}
