//! Fluid field resolver: volume-based stores, pressure-gated flows,
//! rupture release, and volume-weighted temperature/contamination mixing.

use arrayvec::ArrayVec;
use bitflags::bitflags;

use crate::domain::{
    Budget, Confidence, DomainState, Histogram, Policy, QueryMeta, Refusal, Resolution,
};
use crate::fixed::{Q16, Q48};
use crate::rng::{self, SeedContext};

pub const MAX_STORES: usize = 64;
pub const MAX_FLOWS: usize = 128;
pub const MAX_PRESSURES: usize = 64;
pub const MAX_CAPSULES: usize = 64;
pub const HIST_BINS: usize = 4;
const CASCADE_DIVISOR: i64 = 2;
/// Fallback release ratio (0.25) when neither the pressure cell nor the
/// domain surface supply one.
const DEFAULT_RUPTURE_RELEASE: Q16 = Q16(0x0000_4000);

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
        const UNKNOWN  = 1 << 0;
        const RUPTURED = 1 << 1;
    }
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct FlowFlags: u32 {
        const UNRESOLVED = 1 << 0;
        const OVERLOAD    = 1 << 1;
        const BLOCKED     = 1 << 2;
        const CASCADE     = 1 << 3;
        const LEAKAGE     = 1 << 4;
    }
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct PressureFlags: u32 {
        const UNRESOLVED = 1 << 0;
        const OVER_LIMIT = 1 << 1;
        const RUPTURED   = 1 << 2;
    }
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct ResolveFlags: u32 {
        const PARTIAL       = 1 << 0;
        const OVERLOAD      = 1 << 1;
        const BLOCKED       = 1 << 2;
        const CASCADE       = 1 << 3;
        const LEAKAGE       = 1 << 4;
        const PRESSURE_OVER = 1 << 5;
        const RUPTURE       = 1 << 6;
    }
}

#[derive(Debug, Clone, Copy)]
pub struct StoreDesc {
    pub store_id: u32,
    pub volume: Q48,
    pub max_volume: Q48,
    pub temperature: Q48,
    pub contamination: Q16,
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
    pub energy_per_volume: Q48,
    pub failure_mode_mask: FailureMode,
    pub failure_chance: Q16,
}

#[derive(Debug, Clone, Copy)]
pub struct PressureDesc {
    pub pressure_id: u32,
    pub store_id: u32,
    pub pressure_limit: Q48,
    pub rupture_threshold: Q48,
    pub release_ratio: Q16,
}

#[derive(Debug, Clone)]
pub struct SurfaceDesc {
    pub domain_id: u64,
    pub world_seed: u64,
    pub pressure_scale: Q48,
    pub stores: ArrayVec<StoreDesc, MAX_STORES>,
    pub flows: ArrayVec<FlowDesc, MAX_FLOWS>,
    pub pressures: ArrayVec<PressureDesc, MAX_PRESSURES>,
}

impl Default for SurfaceDesc {
    fn default() -> Self {
        SurfaceDesc {
            domain_id: 1,
            world_seed: 1,
            pressure_scale: Q48::from_int(1),
            stores: ArrayVec::new(),
            flows: ArrayVec::new(),
            pressures: ArrayVec::new(),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Store {
    pub store_id: u32,
    pub volume: Q48,
    pub max_volume: Q48,
    pub temperature: Q48,
    pub contamination: Q16,
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
    pub energy_per_volume: Q48,
    pub failure_mode_mask: FailureMode,
    pub failure_chance: Q16,
    pub flags: FlowFlags,
}

#[derive(Debug, Clone, Copy)]
pub struct Pressure {
    pub pressure_id: u32,
    pub store_id: u32,
    pub pressure_limit: Q48,
    pub rupture_threshold: Q48,
    /// Already defaulted to [`DEFAULT_RUPTURE_RELEASE`] at init time if the
    /// fixture supplied `<= 0`, so resolve only re-defaults it defensively.
    pub release_ratio: Q16,
    pub amount: Q48,
    pub flags: PressureFlags,
}

#[derive(Debug, Clone, Default)]
pub struct ResolveResult {
    pub ok: bool,
    pub refusal_reason: Refusal,
    pub flags: ResolveFlags,
    pub store_count: u32,
    pub flow_count: u32,
    pub pressure_count: u32,
    pub pressure_over_limit_count: u32,
    pub pressure_rupture_count: u32,
    pub volume_transferred: Q48,
    pub volume_leaked: Q48,
    pub volume_remaining: Q48,
    pub energy_required: Q48,
}

#[derive(Debug, Clone, Copy)]
pub struct MacroCapsule {
    pub capsule_id: u64,
    pub network_id: u32,
    pub store_count: u32,
    pub flow_count: u32,
    pub volume_total: Q48,
    pub capacity_total: Q48,
    pub leakage_rate_total: Q48,
    pub pressure_ratio_hist: Histogram<HIST_BINS>,
    pub contamination_ratio_hist: Histogram<HIST_BINS>,
}

pub struct FluidDomain {
    pub policy: Policy,
    pub state: DomainState,
    pub surface: SurfaceDesc,
    pub stores: ArrayVec<Store, MAX_STORES>,
    pub flows: ArrayVec<Flow, MAX_FLOWS>,
    pub pressures: ArrayVec<Pressure, MAX_PRESSURES>,
    pub capsules: ArrayVec<MacroCapsule, MAX_CAPSULES>,
}

impl FluidDomain {
    pub fn init(desc: SurfaceDesc) -> Self {
        let stores = desc
            .stores
            .iter()
            .map(|d| Store {
                store_id: d.store_id,
                volume: d.volume,
                max_volume: d.max_volume,
                temperature: d.temperature,
                contamination: d.contamination,
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
                energy_per_volume: d.energy_per_volume,
                failure_mode_mask: d.failure_mode_mask,
                failure_chance: d.failure_chance,
                flags: FlowFlags::empty(),
            })
            .collect();
        let pressures = desc
            .pressures
            .iter()
            .map(|d| {
                let release_ratio = if d.release_ratio.raw() > 0 {
                    d.release_ratio
                } else {
                    DEFAULT_RUPTURE_RELEASE
                };
                Pressure {
                    pressure_id: d.pressure_id,
                    store_id: d.store_id,
                    pressure_limit: d.pressure_limit,
                    rupture_threshold: d.rupture_threshold,
                    release_ratio,
                    amount: Q48::ZERO,
                    flags: PressureFlags::empty(),
                }
            })
            .collect();
        FluidDomain {
            policy: Policy::default(),
            state: DomainState::default(),
            surface: desc,
            stores,
            flows,
            pressures,
            capsules: ArrayVec::new(),
        }
    }

    fn find_store_index(&self, store_id: u32) -> Option<usize> {
        self.stores.iter().position(|s| s.store_id == store_id)
    }

    fn find_pressure_for_store(&self, store_id: u32) -> Option<usize> {
        self.pressures.iter().position(|p| p.store_id == store_id)
    }

    fn network_collapsed(&self, network_id: u32) -> bool {
        self.capsules.iter().any(|c| c.network_id == network_id)
    }

    fn find_capsule(&self, network_id: u32) -> Option<&MacroCapsule> {
        self.capsules.iter().find(|c| c.network_id == network_id)
    }

    /// `release_ratio > 0` if the pressure limit exceeds zero, falling
    /// back to the domain surface's pressure scale, then to volume ratio.
    fn pressure_amount(&self, store: &Store, pressure: &Pressure) -> Q48 {
        let base = if pressure.pressure_limit.raw() > 0 {
            pressure.pressure_limit
        } else {
            self.surface.pressure_scale
        };
        if base.raw() <= 0 || store.max_volume.raw() <= 0 {
            return Q48::ZERO;
        }
        let mut ratio = store.volume.div(store.max_volume);
        if ratio.raw() < 0 {
            ratio = Q48::ZERO;
        }
        ratio.mul(base)
    }

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
                result.volume_remaining = capsule.volume_total;
            }
            result.ok = true;
            result.flags = ResolveFlags::PARTIAL;
            return result;
        }

        let mut volume_leaked = Q48::ZERO;
        let mut volume_transferred = Q48::ZERO;
        let mut energy_required = Q48::ZERO;
        let mut flags = ResolveFlags::empty();

        for store in self.stores.iter_mut().filter(|s| s.network_id == network_id) {
            store.flags = StoreFlags::empty();
            if apply_leakage(store, tick_delta, &mut volume_leaked) {
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
                    self.flows[i].flags |= FlowFlags::UNRESOLVED;
                    flags |= ResolveFlags::PARTIAL;
                    continue;
                }
            };

            let mut max_rate = self.flows[i].max_transfer_rate;
            if cascade_active && max_rate.raw() > 0 {
                max_rate = Q48(max_rate.raw() / CASCADE_DIVISOR);
            }
            let available = self.stores[source_idx].volume;
            let mut sink_space = self.stores[sink_idx].max_volume.sub(self.stores[sink_idx].volume);
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

            let source_pressure = self
                .find_pressure_for_store(source_id)
                .map(|idx| self.pressure_amount(&self.stores[source_idx], &self.pressures[idx]))
                .unwrap_or(Q48::ZERO);
            let sink_pressure = self
                .find_pressure_for_store(sink_id)
                .map(|idx| self.pressure_amount(&self.stores[sink_idx], &self.pressures[idx]))
                .unwrap_or(Q48::ZERO);
            if source_pressure.raw() > 0 && sink_pressure.raw() > 0 && source_pressure < sink_pressure {
                transfer = Q48::ZERO;
                self.flows[i].flags |= FlowFlags::BLOCKED;
                flags |= ResolveFlags::BLOCKED;
            }

            let mut force_leak = false;
            if self.flows[i].failure_chance.raw() > 0
                && rng::roll_from_context(
                    SeedContext {
                        world_seed: self.surface.world_seed,
                        domain_id: self.surface.domain_id,
                        process_id: self.flows[i].flow_id as u64,
                        tick,
                        stream: "noise.stream.fluid.flow.failure",
                    },
                    self.flows[i].failure_chance,
                )
            {
                if mask.contains(FailureMode::BLOCKED) {
                    self.flows[i].flags |= FlowFlags::BLOCKED;
                    flags |= ResolveFlags::BLOCKED;
                    transfer = Q48::ZERO;
                } else if mask.contains(FailureMode::LEAKAGE) {
                    self.flows[i].flags |= FlowFlags::LEAKAGE;
                    flags |= ResolveFlags::LEAKAGE;
                    force_leak = true;
                }
            }

            if transfer.raw() > 0 {
                let (delivered, loss) = if force_leak {
                    (Q48::ZERO, transfer)
                } else {
                    let delivered = transfer.mul_ratio(self.flows[i].efficiency.clamp_ratio());
                    (delivered, transfer.sub(delivered))
                };
                self.stores[source_idx].volume = self.stores[source_idx].volume.sub(transfer);
                if delivered.raw() > 0 {
                    let sink_prev_volume = self.stores[sink_idx].volume;
                    let source_temperature = self.stores[source_idx].temperature;
                    let source_contamination = self.stores[source_idx].contamination;
                    self.stores[sink_idx].volume = self.stores[sink_idx].volume.add(delivered);
                    self.stores[sink_idx].temperature = mix_q48(
                        self.stores[sink_idx].temperature,
                        sink_prev_volume,
                        source_temperature,
                        delivered,
                    );
                    self.stores[sink_idx].contamination = mix_q16(
                        self.stores[sink_idx].contamination,
                        sink_prev_volume,
                        source_contamination,
                        delivered,
                    );
                }
                volume_transferred = volume_transferred.add(delivered);
                if loss.raw() > 0 {
                    volume_leaked = volume_leaked.add(loss);
                    self.flows[i].flags |= FlowFlags::LEAKAGE;
                    flags |= ResolveFlags::LEAKAGE;
                }
                if self.flows[i].energy_per_volume.raw() > 0 {
                    energy_required = energy_required.add(self.flows[i].energy_per_volume.mul(transfer));
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

        let cost_pressure = self.policy.cost_coarse;
        let mut pressures_seen = 0u32;
        for i in 0..self.pressures.len() {
            let store_id = self.pressures[i].store_id;
            let store_idx = match self.find_store_index(store_id) {
                Some(idx) => idx,
                None => {
                    self.pressures[i].flags = PressureFlags::UNRESOLVED;
                    flags |= ResolveFlags::PARTIAL;
                    continue;
                }
            };
            if self.stores[store_idx].network_id != network_id {
                continue;
            }
            if !budget.consume(cost_pressure) {
                flags |= ResolveFlags::PARTIAL;
                if result.refusal_reason == Refusal::None {
                    result.refusal_reason = Refusal::Budget;
                }
                break;
            }

            self.pressures[i].flags = PressureFlags::empty();
            let mut amount = self.pressure_amount(&self.stores[store_idx], &self.pressures[i]);
            if self.pressures[i].pressure_limit.raw() > 0 && amount > self.pressures[i].pressure_limit {
                self.pressures[i].flags |= PressureFlags::OVER_LIMIT;
                result.pressure_over_limit_count += 1;
                flags |= ResolveFlags::PRESSURE_OVER;
            }
            if self.pressures[i].rupture_threshold.raw() > 0 && amount > self.pressures[i].rupture_threshold {
                self.pressures[i].flags |= PressureFlags::RUPTURED;
                result.pressure_rupture_count += 1;
                flags |= ResolveFlags::RUPTURE;
                self.stores[store_idx].flags |= StoreFlags::RUPTURED;
                let release_ratio = if self.pressures[i].release_ratio.raw() > 0 {
                    self.pressures[i].release_ratio
                } else {
                    DEFAULT_RUPTURE_RELEASE
                };
                let leak = self.stores[store_idx].volume.mul_ratio(release_ratio.clamp_ratio());
                if leak.raw() > 0 {
                    self.stores[store_idx].volume = self.stores[store_idx].volume.sub(leak);
                    volume_leaked = volume_leaked.add(leak);
                    amount = self.pressure_amount(&self.stores[store_idx], &self.pressures[i]);
                }
            }
            self.pressures[i].amount = amount;
            pressures_seen += 1;
        }

        let mut volume_remaining = Q48::ZERO;
        let mut stores_seen = 0u32;
        for store in self.stores.iter().filter(|s| s.network_id == network_id) {
            volume_remaining = volume_remaining.add(store.volume);
            stores_seen += 1;
        }

        result.ok = true;
        result.flags = flags;
        result.store_count = stores_seen;
        result.flow_count = flows_seen;
        result.pressure_count = pressures_seen;
        result.volume_transferred = volume_transferred;
        result.volume_leaked = volume_leaked;
        result.volume_remaining = volume_remaining;
        result.energy_required = energy_required;
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
            volume_total: Q48::ZERO,
            capacity_total: Q48::ZERO,
            leakage_rate_total: Q48::ZERO,
            pressure_ratio_hist: Histogram::default(),
            contamination_ratio_hist: Histogram::default(),
        };
        for store in self.stores.iter().filter(|s| s.network_id == network_id) {
            capsule.store_count += 1;
            capsule.volume_total = capsule.volume_total.add(store.volume);
            capsule.capacity_total = capsule.capacity_total.add(store.max_volume);
            capsule.contamination_ratio_hist.observe(store.contamination.clamp_ratio());
            let leakage_rate = store.max_volume.mul_ratio(store.leakage_rate.clamp_ratio());
            capsule.leakage_rate_total = capsule.leakage_rate_total.add(leakage_rate);
            let ratio = if store.max_volume.raw() > 0 {
                store.volume.div(store.max_volume).to_q16_saturating().clamp_ratio()
            } else {
                Q16::ZERO
            };
            capsule.pressure_ratio_hist.observe(ratio);
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

    /// Live store volume/temperature/contamination/flags by `store_id`,
    /// pressure cell amount/flags by `pressure_id`, then the
    /// collapsed-network capsules.
    pub fn save_instance(&self, out: &mut Vec<u8>) -> crate::error::Result<()> {
        out.extend_from_slice(&(self.stores.len() as u32).to_le_bytes());
        for s in self.stores.iter() {
            out.extend_from_slice(&s.store_id.to_le_bytes());
            out.extend_from_slice(&s.volume.raw().to_le_bytes());
            out.extend_from_slice(&s.temperature.raw().to_le_bytes());
            out.extend_from_slice(&s.contamination.raw().to_le_bytes());
            out.extend_from_slice(&s.flags.bits().to_le_bytes());
        }
        out.extend_from_slice(&(self.pressures.len() as u32).to_le_bytes());
        for p in self.pressures.iter() {
            out.extend_from_slice(&p.pressure_id.to_le_bytes());
            out.extend_from_slice(&p.amount.raw().to_le_bytes());
            out.extend_from_slice(&p.flags.bits().to_le_bytes());
        }
        out.extend_from_slice(&(self.capsules.len() as u32).to_le_bytes());
        for c in self.capsules.iter() {
            out.extend_from_slice(&c.capsule_id.to_le_bytes());
            out.extend_from_slice(&c.network_id.to_le_bytes());
            out.extend_from_slice(&c.store_count.to_le_bytes());
            out.extend_from_slice(&c.flow_count.to_le_bytes());
            out.extend_from_slice(&c.volume_total.raw().to_le_bytes());
            out.extend_from_slice(&c.capacity_total.raw().to_le_bytes());
            out.extend_from_slice(&c.leakage_rate_total.raw().to_le_bytes());
        }
        Ok(())
    }

    pub fn load_instance(&mut self, bytes: &[u8]) -> crate::error::Result<()> {
        let mut r = crate::serialize::Reader::new(bytes);
        let store_count = r.read_u32()?;
        for _ in 0..store_count {
            let store_id = r.read_u32()?;
            let volume = Q48(r.read_i64()?);
            let temperature = Q48(r.read_i64()?);
            let contamination = Q16(r.read_i32()?);
            let flags = StoreFlags::from_bits_truncate(r.read_u32()?);
            if let Some(idx) = self.find_store_index(store_id) {
                self.stores[idx].volume = volume;
                self.stores[idx].temperature = temperature;
                self.stores[idx].contamination = contamination;
                self.stores[idx].flags = flags;
            }
        }
        let pressure_count = r.read_u32()?;
        for _ in 0..pressure_count {
            let pressure_id = r.read_u32()?;
            let amount = Q48(r.read_i64()?);
            let flags = PressureFlags::from_bits_truncate(r.read_u32()?);
            if let Some(idx) = self.pressures.iter().position(|p| p.pressure_id == pressure_id) {
                self.pressures[idx].amount = amount;
                self.pressures[idx].flags = flags;
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
                volume_total: Q48(r.read_i64()?),
                capacity_total: Q48(r.read_i64()?),
                leakage_rate_total: Q48(r.read_i64()?),
                pressure_ratio_hist: Histogram::default(),
                contamination_ratio_hist: Histogram::default(),
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
    let mut leak = store.volume.mul_ratio(store.leakage_rate.clamp_ratio());
    if tick_delta > 1 {
        leak = leak.mul(Q48::from_int(tick_delta as i64));
    }
    if leak.raw() <= 0 {
        return false;
    }
    if leak > store.volume {
        leak = store.volume;
    }
    store.volume = store.volume.sub(leak);
    *io_loss_total = io_loss_total.add(leak);
    true
}

/// Volume-weighted mix of a Q48 property, computed from the pre-transfer
/// sink volume so the incoming slug is weighted correctly.
fn mix_q48(base_value: Q48, base_volume: Q48, incoming_value: Q48, incoming_volume: Q48) -> Q48 {
    let total = base_volume.add(incoming_volume);
    if total.raw() <= 0 {
        return base_value;
    }
    base_value
        .mul(base_volume.div(total))
        .add(incoming_value.mul(incoming_volume.div(total)))
}

fn mix_q16(base_value: Q16, base_volume: Q48, incoming_value: Q16, incoming_volume: Q48) -> Q16 {
    let mixed = mix_q48(base_value.to_q48(), base_volume, incoming_value.to_q48(), incoming_volume);
    mixed.to_q16_saturating().clamp_ratio()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Existence;

    fn two_store_domain(rate: Q48, efficiency: Q16) -> FluidDomain {
        let mut desc = SurfaceDesc::default();
        desc.stores.push(StoreDesc {
            store_id: 1,
            volume: Q48::from_int(100),
            max_volume: Q48::from_int(100),
            temperature: Q48::from_int(20),
            contamination: Q16::ZERO,
            leakage_rate: Q16::ZERO,
            network_id: 1,
        });
        desc.stores.push(StoreDesc {
            store_id: 2,
            volume: Q48::ZERO,
            max_volume: Q48::from_int(100),
            temperature: Q48::from_int(5),
            contamination: Q16::ZERO,
            leakage_rate: Q16::ZERO,
            network_id: 1,
        });
        desc.flows.push(FlowDesc {
            flow_id: 1,
            network_id: 1,
            source_store_id: 1,
            sink_store_id: 2,
            max_transfer_rate: rate,
            efficiency,
            energy_per_volume: Q48::ZERO,
            failure_mode_mask: FailureMode::empty(),
            failure_chance: Q16::ZERO,
        });
        let mut domain = FluidDomain::init(desc);
        domain.state.existence = Existence::Realized;
        domain
    }

    #[test]
    fn transfer_mixes_temperature_by_volume() {
        let mut domain = two_store_domain(Q48::from_int(10), Q16::ONE);
        let mut budget = Budget::new(1_000);
        domain.resolve(1, 0, 1, &mut budget);
        assert_eq!(domain.stores[1].volume.to_int(), 10);
        assert_eq!(domain.stores[1].temperature.to_int(), 20);
    }

    #[test]
    fn rupture_releases_and_flags_store() {
        let mut desc = SurfaceDesc::default();
        desc.stores.push(StoreDesc {
            store_id: 1,
            volume: Q48::from_int(90),
            max_volume: Q48::from_int(100),
            temperature: Q48::ZERO,
            contamination: Q16::ZERO,
            leakage_rate: Q16::ZERO,
            network_id: 1,
        });
        desc.pressures.push(PressureDesc {
            pressure_id: 1,
            store_id: 1,
            pressure_limit: Q48::from_int(100),
            rupture_threshold: Q48::from_int(50),
            release_ratio: Q16::from_f64(0.1),
        });
        let mut domain = FluidDomain::init(desc);
        domain.state.existence = Existence::Realized;
        let mut budget = Budget::new(1_000);
        let result = domain.resolve(1, 0, 1, &mut budget);
        assert!(domain.pressures[0].flags.contains(PressureFlags::RUPTURED));
        assert!(domain.stores[0].flags.contains(StoreFlags::RUPTURED));
        assert_eq!(result.pressure_rupture_count, 1);
        assert!(domain.stores[0].volume < Q48::from_int(90));
    }

    #[test]
    fn flow_blocked_when_source_pressure_below_sink() {
        let mut desc = SurfaceDesc::default();
        desc.stores.push(StoreDesc {
            store_id: 1,
            volume: Q48::from_int(10),
            max_volume: Q48::from_int(100),
            temperature: Q48::ZERO,
            contamination: Q16::ZERO,
            leakage_rate: Q16::ZERO,
            network_id: 1,
        });
        desc.stores.push(StoreDesc {
            store_id: 2,
            volume: Q48::from_int(90),
            max_volume: Q48::from_int(100),
            temperature: Q48::ZERO,
            contamination: Q16::ZERO,
            leakage_rate: Q16::ZERO,
            network_id: 1,
        });
        desc.pressures.push(PressureDesc {
            pressure_id: 1,
            store_id: 1,
            pressure_limit: Q48::from_int(100),
            rupture_threshold: Q48::ZERO,
            release_ratio: Q16::ZERO,
        });
        desc.pressures.push(PressureDesc {
            pressure_id: 2,
            store_id: 2,
            pressure_limit: Q48::from_int(100),
            rupture_threshold: Q48::ZERO,
            release_ratio: Q16::ZERO,
        });
        desc.flows.push(FlowDesc {
            flow_id: 1,
            network_id: 1,
            source_store_id: 1,
            sink_store_id: 2,
            max_transfer_rate: Q48::from_int(5),
            efficiency: Q16::ONE,
            energy_per_volume: Q48::ZERO,
            failure_mode_mask: FailureMode::BLOCKED,
            failure_chance: Q16::ZERO,
        });
        let mut domain = FluidDomain::init(desc);
        domain.state.existence = Existence::Realized;
        let mut budget = Budget::new(1_000);
        domain.resolve(1, 0, 1, &mut budget);
        assert!(domain.flows[0].flags.contains(FlowFlags::BLOCKED));
        assert_eq!(domain.stores[0].volume.to_int(), 10);
    }
}
