//! Energy field resolver: stores, flows, leakage, efficiency, failure
//! modes, cascade propagation, histogram capsules.
//!
//! This is the reference skeleton every other field subsystem (heat,
//! fluid, information) follows.

use arrayvec::ArrayVec;
use bitflags::bitflags;

use crate::domain::{
    Budget, Confidence, DomainState, Histogram, Policy, QueryMeta, Refusal, Resolution,
};
use crate::fixed::{Q16, Q48};
use crate::rng::{self, SeedContext, SeedMix};

pub const MAX_STORES: usize = 64;
pub const MAX_FLOWS: usize = 128;
pub const MAX_CAPSULES: usize = 64;
pub const HIST_BINS: usize = 4;
const CASCADE_DIVISOR: i64 = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum EnergyType {
    Unset = 0,
    Electrical = 1,
    Chemical = 2,
    Mechanical = 3,
    Thermal = 4,
    Abstract = 5,
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct FailureMode: u32 {
        const OVERLOAD = 1 << 0;
        const BROWNOUT = 1 << 1;
        const BLACKOUT = 1 << 2;
        const CASCADE  = 1 << 3;
        const LEAKAGE  = 1 << 4;
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
        const UNKNOWN   = 1 << 0;
        const COLLAPSED = 1 << 1;
        const OVERLOAD  = 1 << 2;
        const BROWNOUT  = 1 << 3;
        const BLACKOUT  = 1 << 4;
        const CASCADE   = 1 << 5;
        const LEAKAGE   = 1 << 6;
    }
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct ResolveFlags: u32 {
        const PARTIAL  = 1 << 0;
        const OVERLOAD = 1 << 1;
        const BROWNOUT = 1 << 2;
        const BLACKOUT = 1 << 3;
        const CASCADE  = 1 << 4;
        const LEAKAGE  = 1 << 5;
    }
}

#[derive(Debug, Clone, Copy)]
pub struct StoreDesc {
    pub store_id: u32,
    pub energy_type: EnergyType,
    pub amount: Q48,
    pub capacity: Q48,
    pub leakage_rate: Q16,
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

#[derive(Debug, Clone, Copy, Default)]
pub struct LossDesc {
    pub dissipation_fraction: Q16,
}

#[derive(Debug, Clone)]
pub struct SurfaceDesc {
    pub domain_id: u64,
    pub world_seed: u64,
    pub stores: ArrayVec<StoreDesc, MAX_STORES>,
    pub flows: ArrayVec<FlowDesc, MAX_FLOWS>,
    pub loss: LossDesc,
}

impl Default for SurfaceDesc {
    fn default() -> Self {
        SurfaceDesc {
            domain_id: 1,
            world_seed: 1,
            stores: ArrayVec::new(),
            flows: ArrayVec::new(),
            loss: LossDesc::default(),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Store {
    pub store_id: u32,
    pub energy_type: EnergyType,
    pub amount: Q48,
    pub capacity: Q48,
    pub leakage_rate: Q16,
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
pub struct StoreSample {
    pub store_id: u32,
    pub amount: Q48,
    pub capacity: Q48,
    pub flags: StoreFlags,
    pub meta: QueryMeta,
}

#[derive(Debug, Clone, Default)]
pub struct ResolveResult {
    pub ok: bool,
    pub refusal_reason: Refusal,
    pub flags: ResolveFlags,
    pub store_count: u32,
    pub flow_count: u32,
    pub energy_transferred: Q48,
    pub energy_lost: Q48,
    pub energy_remaining: Q48,
}

#[derive(Debug, Clone, Copy)]
pub struct MacroCapsule {
    pub capsule_id: u64,
    pub network_id: u32,
    pub store_count: u32,
    pub flow_count: u32,
    pub energy_total: Q48,
    pub capacity_total: Q48,
    pub energy_ratio_hist: Histogram<HIST_BINS>,
    pub transfer_rate_total: Q48,
    pub loss_rate_total: Q48,
}

pub struct EnergyDomain {
    pub policy: Policy,
    pub state: DomainState,
    pub surface: SurfaceDesc,
    pub stores: ArrayVec<Store, MAX_STORES>,
    pub flows: ArrayVec<Flow, MAX_FLOWS>,
    pub capsules: ArrayVec<MacroCapsule, MAX_CAPSULES>,
}

impl EnergyDomain {
    pub fn init(desc: SurfaceDesc) -> Self {
        let stores = desc
            .stores
            .iter()
            .map(|d| Store {
                store_id: d.store_id,
                energy_type: d.energy_type,
                amount: d.amount,
                capacity: d.capacity,
                leakage_rate: d.leakage_rate,
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
        EnergyDomain {
            policy: Policy::default(),
            state: DomainState::default(),
            surface: desc,
            stores,
            flows,
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

    pub fn store_query(&self, store_id: u32, budget: &mut Budget) -> StoreSample {
        if !self.state.is_active() {
            return StoreSample {
                store_id,
                amount: Q48::ZERO,
                capacity: Q48::ZERO,
                flags: StoreFlags::empty(),
                meta: QueryMeta::refused(Refusal::DomainInactive, *budget),
            };
        }
        if !budget.consume(self.policy.cost_full) {
            return StoreSample {
                store_id,
                amount: Q48::ZERO,
                capacity: Q48::ZERO,
                flags: StoreFlags::empty(),
                meta: QueryMeta::refused(Refusal::Budget, *budget),
            };
        }
        match self.find_store_index(store_id) {
            Some(idx) => {
                let store = self.stores[idx];
                StoreSample {
                    store_id,
                    amount: store.amount,
                    capacity: store.capacity,
                    flags: store.flags,
                    meta: QueryMeta::ok(Resolution::Exact, Confidence::Exact, self.policy.cost_full, *budget),
                }
            }
            None => StoreSample {
                store_id,
                amount: Q48::ZERO,
                capacity: Q48::ZERO,
                flags: StoreFlags::empty(),
                meta: QueryMeta::refused(Refusal::Missing, *budget),
            },
        }
    }

    /// Per-tick resolve. `network_id == 0` ("all networks") is forbidden
    /// here per the resolved Open Question in `DESIGN.md`; use `*_query`
    /// aggregation for cross-network inspection instead.
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
                result.energy_remaining = capsule.energy_total;
            }
            result.ok = true;
            result.flags = ResolveFlags::PARTIAL;
            return result;
        }

        let mut energy_lost = Q48::ZERO;
        let mut energy_transferred = Q48::ZERO;
        let mut flags = ResolveFlags::empty();

        tracing::debug!(network_id, tick, "energy resolve: leakage pass");
        for store in self.stores.iter_mut().filter(|s| s.network_id == network_id) {
            if apply_leakage(store, tick_delta, &mut energy_lost) {
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
            if available.raw() <= 0 {
                if mask.contains(FailureMode::BLACKOUT) {
                    self.flows[i].flags |= FlowFlags::BLACKOUT;
                    flags |= ResolveFlags::BLACKOUT;
                }
            } else if available < max_rate {
                if mask.contains(FailureMode::BROWNOUT) {
                    self.flows[i].flags |= FlowFlags::BROWNOUT;
                    flags |= ResolveFlags::BROWNOUT;
                }
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
                        stream: "noise.stream.energy.flow.failure",
                    },
                    self.flows[i].failure_chance,
                )
            {
                if mask.contains(FailureMode::BLACKOUT) {
                    self.flows[i].flags |= FlowFlags::BLACKOUT;
                    flags |= ResolveFlags::BLACKOUT;
                }
                transfer = Q48::ZERO;
            }

            if transfer.raw() > 0 {
                let mut delivered = transfer.mul_ratio(self.flows[i].efficiency.clamp_ratio());
                let mut loss = transfer.sub(delivered);
                let dissipation = self.surface.loss.dissipation_fraction;
                if dissipation.raw() > 0 {
                    let extra = delivered.mul_ratio(dissipation.clamp_ratio());
                    delivered = delivered.sub(extra);
                    loss = loss.add(extra);
                }
                self.stores[source_idx].amount = self.stores[source_idx].amount.sub(transfer);
                self.stores[sink_idx].amount = self.stores[sink_idx].amount.add(delivered);
                energy_transferred = energy_transferred.add(delivered);
                if loss.raw() > 0 {
                    energy_lost = energy_lost.add(loss);
                    flags |= ResolveFlags::LEAKAGE;
                }
            }

            let fl = self.flows[i].flags;
            if (fl.contains(FlowFlags::BLACKOUT) || fl.contains(FlowFlags::BROWNOUT) || fl.contains(FlowFlags::OVERLOAD))
                && mask.contains(FailureMode::CASCADE)
            {
                cascade_active = true;
                self.flows[i].flags |= FlowFlags::CASCADE;
                flags |= ResolveFlags::CASCADE;
            }
            flows_seen += 1;
        }

        let mut energy_remaining = Q48::ZERO;
        let mut stores_seen = 0u32;
        for store in self.stores.iter().filter(|s| s.network_id == network_id) {
            energy_remaining = energy_remaining.add(store.amount);
            stores_seen += 1;
        }

        result.ok = true;
        result.flags = flags;
        result.store_count = stores_seen;
        result.flow_count = flows_seen;
        result.energy_transferred = energy_transferred;
        result.energy_lost = energy_lost;
        result.energy_remaining = energy_remaining;
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
            store_count: 0,
            flow_count: 0,
            energy_total: Q48::ZERO,
            capacity_total: Q48::ZERO,
            energy_ratio_hist: Histogram::default(),
            transfer_rate_total: Q48::ZERO,
            loss_rate_total: Q48::ZERO,
        };
        for store in self.stores.iter().filter(|s| s.network_id == network_id) {
            capsule.store_count += 1;
            capsule.energy_total = capsule.energy_total.add(store.amount);
            capsule.capacity_total = capsule.capacity_total.add(store.capacity);
            let ratio = if store.capacity.raw() > 0 {
                store.amount.div(store.capacity).to_q16_saturating().clamp_ratio()
            } else {
                Q16::ZERO
            };
            capsule.energy_ratio_hist.observe(ratio);
        }
        for flow in self.flows.iter().filter(|f| f.network_id == network_id) {
            capsule.flow_count += 1;
            capsule.transfer_rate_total = capsule.transfer_rate_total.add(flow.max_transfer_rate);
        }
        self.capsules.push(capsule);
        Ok(())
    }

    /// Swap-with-last removal: capsule slot identity after expand/collapse
    /// cycles is not meaningful, only the active set is.
    pub fn expand_network(&mut self, network_id: u32) -> Result<(), i32> {
        match self.capsules.iter().position(|c| c.network_id == network_id) {
            Some(idx) => {
                self.capsules.swap_remove(idx);
                Ok(())
            }
            None => Err(-2),
        }
    }

    /// Serializes the live, mutable state a reload needs to resume from:
    /// each store's amount and flags, indexed by `store_id` rather than
    /// array position, followed by the collapsed-network capsules. Static
    /// surface config (capacities, flow topology) is not re-saved; it is
    /// expected to come back from the same fixture on reload.
    pub fn save_instance(&self, out: &mut Vec<u8>) -> crate::error::Result<()> {
        out.extend_from_slice(&(self.stores.len() as u32).to_le_bytes());
        for s in self.stores.iter() {
            out.extend_from_slice(&s.store_id.to_le_bytes());
            out.extend_from_slice(&s.amount.raw().to_le_bytes());
            out.extend_from_slice(&s.flags.bits().to_le_bytes());
        }
        out.extend_from_slice(&(self.capsules.len() as u32).to_le_bytes());
        for c in self.capsules.iter() {
            out.extend_from_slice(&c.capsule_id.to_le_bytes());
            out.extend_from_slice(&c.network_id.to_le_bytes());
            out.extend_from_slice(&c.store_count.to_le_bytes());
            out.extend_from_slice(&c.flow_count.to_le_bytes());
            out.extend_from_slice(&c.energy_total.raw().to_le_bytes());
            out.extend_from_slice(&c.capacity_total.raw().to_le_bytes());
            out.extend_from_slice(&c.transfer_rate_total.raw().to_le_bytes());
            out.extend_from_slice(&c.loss_rate_total.raw().to_le_bytes());
        }
        Ok(())
    }

    /// Restores store amounts/flags by `store_id` lookup (stores already
    /// present from `init`) and replaces the capsule set wholesale.
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
        let capsule_count = r.read_u32()?;
        self.capsules.clear();
        for _ in 0..capsule_count {
            let capsule = MacroCapsule {
                capsule_id: r.read_u64()?,
                network_id: r.read_u32()?,
                store_count: r.read_u32()?,
                flow_count: r.read_u32()?,
                energy_total: Q48(r.read_i64()?),
                capacity_total: Q48(r.read_i64()?),
                energy_ratio_hist: Histogram::default(),
                transfer_rate_total: Q48(r.read_i64()?),
                loss_rate_total: Q48(r.read_i64()?),
            };
            if !self.capsules.is_full() {
                self.capsules.push(capsule);
            }
        }
        Ok(())
    }
}

fn apply_leakage(store: &mut Store, tick_delta: u64, io_loss_total: &mut Q48) -> bool {
    if tick_delta == 0 || store.leakage_rate.raw() <= 0 {
        return false;
    }
    let mut leak = store.amount.mul_ratio(store.leakage_rate.clamp_ratio());
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
