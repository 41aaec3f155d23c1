//! Crafting/disassembly over an explicit, capacity-bounded inventory.
//!
//! Unlike the field resolvers this subsystem is process-only: `execute`
//! runs once per call rather than once per tick, and its two identifiers
//! (`process_id`, `event_id`) are content hashes of fixed strings, not
//! named-RNG draws — recipe execution has no randomness at all.

use arrayvec::ArrayVec;
use bitflags::bitflags;

use crate::domain::{Budget, DomainState, Policy, Refusal};
use crate::fixed::{Q16, Q16_UNKNOWN};
use crate::rng::hash_str32;

pub const MAX_RECIPES: usize = 64;
pub const MAX_INPUTS: usize = 16;
pub const MAX_OUTPUTS: usize = 16;
pub const MAX_BYPRODUCTS: usize = 8;
pub const MAX_TOOLS: usize = 16;
pub const MAX_INVENTORY: usize = 128;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum ItemKind {
    Material = 0,
    Part = 1,
    Assembly = 2,
    Tool = 3,
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct ItemFlags: u32 {
        const DAMAGEABLE = 1 << 0;
    }
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct RecipeFlags: u32 {
        const DISASSEMBLY        = 1 << 0;
        const REQUIRE_TEMP       = 1 << 1;
        const REQUIRE_HUMIDITY   = 1 << 2;
        const REQUIRE_ENVIRONMENT = 1 << 3;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum FailureMode {
    Refuse = 0,
    Waste = 1,
    Damage = 2,
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct ResultFlags: u32 {
        const LAW_BLOCK      = 1 << 0;
        const METALAW_BLOCK  = 1 << 1;
        const FAILURE        = 1 << 2;
        const WASTE          = 1 << 3;
        const DISASSEMBLY    = 1 << 4;
        const TOOL_DAMAGE    = 1 << 5;
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ItemReq {
    pub item_id: u32,
    pub kind: ItemKind,
    pub quantity: Q16,
}

#[derive(Debug, Clone, Copy)]
pub struct ItemStack {
    pub item_id: u32,
    pub kind: ItemKind,
    pub quantity: Q16,
    pub integrity: Q16,
    pub flags: ItemFlags,
}

#[derive(Debug, Clone, Copy)]
pub struct ToolRequirement {
    pub tool_id: u32,
    pub min_integrity: Q16,
}

#[derive(Debug, Clone, Copy)]
pub struct ToolInstance {
    pub tool_id: u32,
    pub integrity: Q16,
    pub wear: Q16,
}

#[derive(Debug, Clone, Copy)]
pub struct ConditionRange {
    pub min: Q16,
    pub max: Q16,
}

#[derive(Debug, Clone, Copy)]
pub struct Conditions {
    pub temperature: Q16,
    pub humidity: Q16,
    pub environment_id: u32,
}

#[derive(Debug, Clone)]
pub struct RecipeSpec {
    pub recipe_id: u32,
    pub inputs: ArrayVec<ItemReq, MAX_INPUTS>,
    pub outputs: ArrayVec<ItemReq, MAX_OUTPUTS>,
    pub byproducts: ArrayVec<ItemReq, MAX_BYPRODUCTS>,
    pub tools: ArrayVec<ToolRequirement, MAX_TOOLS>,
    pub temperature: ConditionRange,
    pub humidity: ConditionRange,
    pub environment_id: u32,
    pub output_integrity: Q16,
    pub recycle_loss: Q16,
    pub tool_wear: Q16,
    pub failure_mode: FailureMode,
    pub flags: RecipeFlags,
    /// Carried in the recipe format, never consumed by any resolver.
    pub maturity_tag: u32,
}

#[derive(Debug, Clone)]
pub struct SurfaceDesc {
    pub domain_id: u64,
    pub world_seed: u64,
    pub craft_cost_base: u32,
    pub craft_cost_per_input: u32,
    pub craft_cost_per_output: u32,
    pub craft_cost_per_tool: u32,
    pub inventory_capacity: u32,
    pub tool_capacity: u32,
    pub law_allow_crafting: bool,
    pub metalaw_allow_crafting: bool,
    pub recipes: ArrayVec<RecipeSpec, MAX_RECIPES>,
}

impl Default for SurfaceDesc {
    fn default() -> Self {
        SurfaceDesc {
            domain_id: 1,
            world_seed: 1,
            craft_cost_base: 1,
            craft_cost_per_input: 1,
            craft_cost_per_output: 1,
            craft_cost_per_tool: 1,
            inventory_capacity: MAX_INVENTORY as u32,
            tool_capacity: MAX_TOOLS as u32,
            law_allow_crafting: true,
            metalaw_allow_crafting: true,
            recipes: ArrayVec::new(),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct CraftResult {
    pub ok: bool,
    pub refusal_reason: Refusal,
    pub flags: ResultFlags,
    pub recipe_id: u32,
    pub inputs_consumed: u32,
    pub outputs_produced: u32,
    pub byproducts_produced: u32,
    pub tool_damage: u32,
    pub inventory_count: u32,
    pub tool_count: u32,
    pub process_id: u32,
    pub event_id: u32,
}

pub struct CraftDomain {
    pub policy: Policy,
    pub state: DomainState,
    pub surface: SurfaceDesc,
    pub inventory: ArrayVec<ItemStack, MAX_INVENTORY>,
    pub tools: ArrayVec<ToolInstance, MAX_TOOLS>,
}

impl CraftDomain {
    pub fn init(desc: SurfaceDesc, inventory: ArrayVec<ItemStack, MAX_INVENTORY>, tools: ArrayVec<ToolInstance, MAX_TOOLS>) -> Self {
        CraftDomain {
            policy: Policy::default(),
            state: DomainState::default(),
            surface: desc,
            inventory,
            tools,
        }
    }

    fn find_inventory(&self, item_id: u32, kind: ItemKind, min_quantity: Q16) -> Option<usize> {
        self.inventory
            .iter()
            .position(|s| s.item_id == item_id && s.kind == kind && s.quantity >= min_quantity)
    }

    fn find_tool(&self, tool_id: u32, min_integrity: Q16) -> Option<usize> {
        self.tools
            .iter()
            .position(|t| t.tool_id == tool_id && t.integrity >= min_integrity)
    }

    fn in_range(value: Q16, range: ConditionRange) -> bool {
        value >= range.min && value <= range.max
    }

    fn conditions_ok(recipe: &RecipeSpec, conditions: &Conditions) -> bool {
        if recipe.flags.contains(RecipeFlags::REQUIRE_TEMP) && !Self::in_range(conditions.temperature, recipe.temperature) {
            return false;
        }
        if recipe.flags.contains(RecipeFlags::REQUIRE_HUMIDITY) && !Self::in_range(conditions.humidity, recipe.humidity) {
            return false;
        }
        if recipe.flags.contains(RecipeFlags::REQUIRE_ENVIRONMENT) && conditions.environment_id != recipe.environment_id {
            return false;
        }
        true
    }

    fn cost_for_recipe(&self, recipe: &RecipeSpec) -> u32 {
        self.surface.craft_cost_base
            + recipe.inputs.len() as u32 * self.surface.craft_cost_per_input
            + recipe.outputs.len() as u32 * self.surface.craft_cost_per_output
            + recipe.tools.len() as u32 * self.surface.craft_cost_per_tool
    }

    /// Merges into an existing stack on `(item_id, kind)` match; for
    /// assemblies and tools, `integrity` must match exactly too, since
    /// two items of differing wear are not interchangeable units.
    /// Materials and parts ignore integrity on merge.
    fn inventory_add(&mut self, item_id: u32, kind: ItemKind, quantity: Q16, integrity: Q16, flags: ItemFlags) -> bool {
        let gate_on_integrity = matches!(kind, ItemKind::Assembly | ItemKind::Tool);
        let existing = self.inventory.iter().position(|s| {
            s.item_id == item_id && s.kind == kind && (!gate_on_integrity || s.integrity == integrity)
        });
        if let Some(idx) = existing {
            self.inventory[idx].quantity = self.inventory[idx].quantity.add(quantity);
            return true;
        }
        if self.inventory.is_full() {
            return false;
        }
        self.inventory.push(ItemStack { item_id, kind, quantity, integrity, flags });
        true
    }

    /// `quantity * (1 - recycle_loss)`, never negative.
    fn apply_loss(quantity: Q16, recycle_loss: Q16) -> Q16 {
        let kept = Q16::ONE.sub(recycle_loss.clamp_ratio());
        quantity.mul(kept).max(Q16::ZERO)
    }

    pub fn execute(
        &mut self,
        recipe_index: usize,
        conditions: &Conditions,
        _tick: u64,
        budget: &mut Budget,
    ) -> CraftResult {
        let mut result = CraftResult::default();
        if recipe_index >= self.surface.recipes.len() {
            result.refusal_reason = Refusal::Internal;
            return result;
        }
        if !self.state.is_active() {
            result.refusal_reason = Refusal::DomainInactive;
            return result;
        }
        if !self.surface.law_allow_crafting {
            result.flags |= ResultFlags::LAW_BLOCK;
            result.refusal_reason = Refusal::Policy;
            return result;
        }
        if !self.surface.metalaw_allow_crafting {
            result.flags |= ResultFlags::METALAW_BLOCK;
            result.refusal_reason = Refusal::Policy;
            return result;
        }

        let recipe = self.surface.recipes[recipe_index].clone();
        let conditions_ok = Self::conditions_ok(&recipe, conditions);
        let mut tools_ok = true;
        for req in recipe.tools.iter() {
            if self.find_tool(req.tool_id, req.min_integrity).is_none() {
                tools_ok = false;
                break;
            }
        }

        let mut allow_failure = false;
        if !conditions_ok || !tools_ok {
            if recipe.failure_mode == FailureMode::Refuse {
                result.refusal_reason = Refusal::Policy;
                return result;
            }
            allow_failure = true;
        }

        for req in recipe.inputs.iter() {
            if self.find_inventory(req.item_id, req.kind, req.quantity).is_none() {
                result.refusal_reason = Refusal::Policy;
                return result;
            }
        }

        let cost = self.cost_for_recipe(&recipe);
        if !budget.consume(cost) {
            result.refusal_reason = Refusal::Budget;
            return result;
        }

        let process_id = hash_str32("process.craft.execute");
        let event_id = hash_str32(if recipe.flags.contains(RecipeFlags::DISASSEMBLY) {
            "event.craft.disassemble"
        } else {
            "event.craft.execute"
        });

        for req in recipe.inputs.iter() {
            let idx = match self.find_inventory(req.item_id, req.kind, req.quantity) {
                Some(idx) => idx,
                None => {
                    result.refusal_reason = Refusal::Internal;
                    return result;
                }
            };
            self.inventory[idx].quantity = self.inventory[idx].quantity.sub(req.quantity);
            if self.inventory[idx].quantity.raw() <= 0 {
                self.inventory.swap_remove(idx);
            }
            result.inputs_consumed += 1;
        }

        if allow_failure {
            result.flags |= ResultFlags::FAILURE;
            if recipe.failure_mode == FailureMode::Waste || recipe.failure_mode == FailureMode::Damage {
                result.flags |= ResultFlags::WASTE;
            }
        } else {
            for out in recipe.outputs.iter() {
                let mut quantity = out.quantity;
                if recipe.flags.contains(RecipeFlags::DISASSEMBLY) {
                    quantity = Self::apply_loss(quantity, recipe.recycle_loss);
                }
                if quantity.raw() > 0 {
                    let flags = if matches!(out.kind, ItemKind::Assembly | ItemKind::Tool) {
                        ItemFlags::DAMAGEABLE
                    } else {
                        ItemFlags::empty()
                    };
                    if !self.inventory_add(out.item_id, out.kind, quantity, recipe.output_integrity, flags) {
                        result.refusal_reason = Refusal::Internal;
                        return result;
                    }
                    result.outputs_produced += 1;
                }
            }
        }

        for byp in recipe.byproducts.iter() {
            if byp.quantity.raw() > 0 {
                if !self.inventory_add(byp.item_id, byp.kind, byp.quantity, Q16::ZERO, ItemFlags::empty()) {
                    result.refusal_reason = Refusal::Internal;
                    return result;
                }
                result.byproducts_produced += 1;
            }
        }

        if !allow_failure || recipe.failure_mode == FailureMode::Damage {
            for req in recipe.tools.iter() {
                if let Some(idx) = self.find_tool(req.tool_id, req.min_integrity) {
                    if recipe.tool_wear.raw() > 0 {
                        self.tools[idx].integrity = self.tools[idx].integrity.sub(recipe.tool_wear).max(Q16::ZERO);
                        result.tool_damage += 1;
                        result.flags |= ResultFlags::TOOL_DAMAGE;
                    }
                }
            }
        }

        result.ok = true;
        result.recipe_id = recipe.recipe_id;
        result.inventory_count = self.inventory.len() as u32;
        result.tool_count = self.tools.len() as u32;
        result.process_id = process_id;
        result.event_id = event_id;
        if recipe.flags.contains(RecipeFlags::DISASSEMBLY) {
            result.flags |= ResultFlags::DISASSEMBLY;
        }
        result
    }

    /// The inventory and tool arrays wholesale. Unlike the field
    /// domains, crafting has no static/live split: both are mutated
    /// directly by `execute` and there is no separate fixture-authored
    /// surface state to fall back to on reload.
    pub fn save_instance(&self, out: &mut Vec<u8>) -> crate::error::Result<()> {
        out.extend_from_slice(&(self.inventory.len() as u32).to_le_bytes());
        for item in self.inventory.iter() {
            out.extend_from_slice(&item.item_id.to_le_bytes());
            out.extend_from_slice(&(item.kind as u32).to_le_bytes());
            out.extend_from_slice(&item.quantity.raw().to_le_bytes());
            out.extend_from_slice(&item.integrity.raw().to_le_bytes());
            out.extend_from_slice(&item.flags.bits().to_le_bytes());
        }
        out.extend_from_slice(&(self.tools.len() as u32).to_le_bytes());
        for tool in self.tools.iter() {
            out.extend_from_slice(&tool.tool_id.to_le_bytes());
            out.extend_from_slice(&tool.integrity.raw().to_le_bytes());
            out.extend_from_slice(&tool.wear.raw().to_le_bytes());
        }
        Ok(())
    }

    pub fn load_instance(&mut self, bytes: &[u8]) -> crate::error::Result<()> {
        let mut r = crate::serialize::Reader::new(bytes);
        let item_count = r.read_u32()?;
        self.inventory.clear();
        for _ in 0..item_count {
            let item_id = r.read_u32()?;
            let kind = match r.read_u32()? {
                0 => ItemKind::Material,
                1 => ItemKind::Part,
                2 => ItemKind::Assembly,
                _ => ItemKind::Tool,
            };
            let quantity = Q16(r.read_i32()?);
            let integrity = Q16(r.read_i32()?);
            let flags = ItemFlags::from_bits_truncate(r.read_u32()?);
            if !self.inventory.is_full() {
                self.inventory.push(ItemStack { item_id, kind, quantity, integrity, flags });
            }
        }
        let tool_count = r.read_u32()?;
        self.tools.clear();
        for _ in 0..tool_count {
            let tool_id = r.read_u32()?;
            let integrity = Q16(r.read_i32()?);
            let wear = Q16(r.read_i32()?);
            if !self.tools.is_full() {
                self.tools.push(ToolInstance { tool_id, integrity, wear });
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Existence;

    fn domain_with_recipe(failure_mode: FailureMode) -> CraftDomain {
        let mut desc = SurfaceDesc::default();
        let mut recipe = RecipeSpec {
            recipe_id: 1,
            inputs: ArrayVec::new(),
            outputs: ArrayVec::new(),
            byproducts: ArrayVec::new(),
            tools: ArrayVec::new(),
            temperature: ConditionRange { min: Q16::ZERO, max: Q16::ONE },
            humidity: ConditionRange { min: Q16::ZERO, max: Q16::ONE },
            environment_id: 0,
            output_integrity: Q16::ONE,
            recycle_loss: Q16::ZERO,
            tool_wear: Q16::ZERO,
            failure_mode,
            flags: RecipeFlags::empty(),
            maturity_tag: 0,
        };
        recipe.inputs.push(ItemReq { item_id: 1, kind: ItemKind::Material, quantity: Q16::from_int(1) });
        recipe.outputs.push(ItemReq { item_id: 2, kind: ItemKind::Part, quantity: Q16::from_int(1) });
        desc.recipes.push(recipe);
        let mut inventory = ArrayVec::new();
        inventory.push(ItemStack {
            item_id: 1,
            kind: ItemKind::Material,
            quantity: Q16::from_int(5),
            integrity: Q16::ONE,
            flags: ItemFlags::empty(),
        });
        let mut domain = CraftDomain::init(desc, inventory, ArrayVec::new());
        domain.state.existence = Existence::Realized;
        domain
    }

    #[test]
    fn execute_consumes_input_and_produces_output() {
        let mut domain = domain_with_recipe(FailureMode::Refuse);
        let conditions = Conditions { temperature: Q16::from_f64(0.5), humidity: Q16::from_f64(0.5), environment_id: 0 };
        let mut budget = Budget::new(100);
        let result = domain.execute(0, &conditions, 0, &mut budget);
        assert!(result.ok);
        assert_eq!(result.outputs_produced, 1);
        assert_eq!(domain.inventory.iter().find(|s| s.item_id == 1).map(|s| s.quantity.to_int()), Some(4));
        assert_eq!(domain.inventory.iter().find(|s| s.item_id == 2).map(|s| s.quantity.to_int()), Some(1));
    }

    #[test]
    fn missing_input_refuses_with_policy() {
        let mut domain = domain_with_recipe(FailureMode::Refuse);
        domain.inventory.clear();
        let conditions = Conditions { temperature: Q16::from_f64(0.5), humidity: Q16::from_f64(0.5), environment_id: 0 };
        let mut budget = Budget::new(100);
        let result = domain.execute(0, &conditions, 0, &mut budget);
        assert!(!result.ok);
        assert_eq!(result.refusal_reason, Refusal::Policy);
    }

    #[test]
    fn law_block_short_circuits_before_inventory_check() {
        let mut domain = domain_with_recipe(FailureMode::Refuse);
        domain.surface.law_allow_crafting = false;
        let conditions = Conditions { temperature: Q16::from_f64(0.5), humidity: Q16::from_f64(0.5), environment_id: 0 };
        let mut budget = Budget::new(100);
        let result = domain.execute(0, &conditions, 0, &mut budget);
        assert!(result.flags.contains(ResultFlags::LAW_BLOCK));
        assert_eq!(result.refusal_reason, Refusal::Policy);
    }

    #[test]
    fn disassembly_recipe_applies_recycle_loss_and_sets_flag() {
        let mut desc = SurfaceDesc::default();
        let mut recipe = RecipeSpec {
            recipe_id: 1,
            inputs: ArrayVec::new(),
            outputs: ArrayVec::new(),
            byproducts: ArrayVec::new(),
            tools: ArrayVec::new(),
            temperature: ConditionRange { min: Q16::ZERO, max: Q16::ONE },
            humidity: ConditionRange { min: Q16::ZERO, max: Q16::ONE },
            environment_id: 0,
            output_integrity: Q16::ONE,
            recycle_loss: Q16::from_f64(0.5),
            tool_wear: Q16::ZERO,
            failure_mode: FailureMode::Refuse,
            flags: RecipeFlags::DISASSEMBLY,
            maturity_tag: 0,
        };
        recipe.inputs.push(ItemReq { item_id: 2, kind: ItemKind::Part, quantity: Q16::from_int(1) });
        recipe.outputs.push(ItemReq { item_id: 1, kind: ItemKind::Material, quantity: Q16::from_int(2) });
        desc.recipes.push(recipe);
        let mut inventory = ArrayVec::new();
        inventory.push(ItemStack {
            item_id: 2,
            kind: ItemKind::Part,
            quantity: Q16::from_int(1),
            integrity: Q16::ONE,
            flags: ItemFlags::empty(),
        });
        let mut domain = CraftDomain::init(desc, inventory, ArrayVec::new());
        domain.state.existence = Existence::Realized;
        let conditions = Conditions { temperature: Q16_UNKNOWN, humidity: Q16_UNKNOWN, environment_id: 0 };
        let mut budget = Budget::new(100);
        let result = domain.execute(0, &conditions, 0, &mut budget);
        assert!(result.flags.contains(ResultFlags::DISASSEMBLY));
        assert_eq!(domain.inventory.iter().find(|s| s.item_id == 1).map(|s| s.quantity.to_int()), Some(1));
    }

    fn domain_with_temp_gated_recipe() -> CraftDomain {
        let mut desc = SurfaceDesc::default();
        let mut recipe = RecipeSpec {
            recipe_id: 1,
            inputs: ArrayVec::new(),
            outputs: ArrayVec::new(),
            byproducts: ArrayVec::new(),
            tools: ArrayVec::new(),
            temperature: ConditionRange { min: Q16::from_f64(0.25), max: Q16::from_f64(0.75) },
            humidity: ConditionRange { min: Q16::ZERO, max: Q16::ONE },
            environment_id: 0,
            output_integrity: Q16::ONE,
            recycle_loss: Q16::ZERO,
            tool_wear: Q16::ZERO,
            failure_mode: FailureMode::Refuse,
            flags: RecipeFlags::REQUIRE_TEMP,
            maturity_tag: 0,
        };
        recipe.inputs.push(ItemReq { item_id: 1, kind: ItemKind::Material, quantity: Q16::from_int(1) });
        recipe.outputs.push(ItemReq { item_id: 2, kind: ItemKind::Part, quantity: Q16::from_int(1) });
        desc.recipes.push(recipe);
        let mut inventory = ArrayVec::new();
        inventory.push(ItemStack {
            item_id: 1,
            kind: ItemKind::Material,
            quantity: Q16::from_int(5),
            integrity: Q16::ONE,
            flags: ItemFlags::empty(),
        });
        let mut domain = CraftDomain::init(desc, inventory, ArrayVec::new());
        domain.state.existence = Existence::Realized;
        domain
    }

    #[test]
    fn temperature_in_range_allows_execution() {
        let mut domain = domain_with_temp_gated_recipe();
        let conditions = Conditions { temperature: Q16::from_f64(0.5), humidity: Q16::from_f64(0.5), environment_id: 0 };
        let mut budget = Budget::new(100);
        let result = domain.execute(0, &conditions, 0, &mut budget);
        assert!(result.ok);
    }

    #[test]
    fn temperature_out_of_range_refuses() {
        let mut domain = domain_with_temp_gated_recipe();
        let conditions = Conditions { temperature: Q16::from_f64(0.9), humidity: Q16::from_f64(0.5), environment_id: 0 };
        let mut budget = Budget::new(100);
        let result = domain.execute(0, &conditions, 0, &mut budget);
        assert!(!result.ok);
        assert_eq!(result.refusal_reason, Refusal::Policy);
    }

    #[test]
    fn unknown_temperature_refuses_rather_than_bypassing_the_gate() {
        let mut domain = domain_with_temp_gated_recipe();
        let conditions = Conditions { temperature: Q16_UNKNOWN, humidity: Q16::from_f64(0.5), environment_id: 0 };
        let mut budget = Budget::new(100);
        let result = domain.execute(0, &conditions, 0, &mut budget);
        assert!(!result.ok);
        assert_eq!(result.refusal_reason, Refusal::Policy);
    }

    #[test]
    fn assembly_outputs_with_differing_integrity_do_not_merge() {
        let mut desc = SurfaceDesc::default();
        let mut recipe_a = RecipeSpec {
            recipe_id: 1,
            inputs: ArrayVec::new(),
            outputs: ArrayVec::new(),
            byproducts: ArrayVec::new(),
            tools: ArrayVec::new(),
            temperature: ConditionRange { min: Q16::ZERO, max: Q16::ONE },
            humidity: ConditionRange { min: Q16::ZERO, max: Q16::ONE },
            environment_id: 0,
            output_integrity: Q16::ONE,
            recycle_loss: Q16::ZERO,
            tool_wear: Q16::ZERO,
            failure_mode: FailureMode::Refuse,
            flags: RecipeFlags::empty(),
            maturity_tag: 0,
        };
        recipe_a.inputs.push(ItemReq { item_id: 1, kind: ItemKind::Material, quantity: Q16::from_int(1) });
        recipe_a.outputs.push(ItemReq { item_id: 9, kind: ItemKind::Assembly, quantity: Q16::from_int(1) });
        let mut recipe_b = recipe_a.clone();
        recipe_b.recipe_id = 2;
        recipe_b.output_integrity = Q16::from_f64(0.5);
        desc.recipes.push(recipe_a);
        desc.recipes.push(recipe_b);
        let mut inventory = ArrayVec::new();
        inventory.push(ItemStack {
            item_id: 1,
            kind: ItemKind::Material,
            quantity: Q16::from_int(5),
            integrity: Q16::ONE,
            flags: ItemFlags::empty(),
        });
        let mut domain = CraftDomain::init(desc, inventory, ArrayVec::new());
        domain.state.existence = Existence::Realized;
        let conditions = Conditions { temperature: Q16::from_f64(0.5), humidity: Q16::from_f64(0.5), environment_id: 0 };
        let mut budget = Budget::new(100);
        domain.execute(0, &conditions, 0, &mut budget);
        domain.execute(1, &conditions, 0, &mut budget);
        let stacks: Vec<_> = domain.inventory.iter().filter(|s| s.item_id == 9).collect();
        assert_eq!(stacks.len(), 2);
    }

    #[test]
    fn material_outputs_with_differing_integrity_still_merge() {
        let mut desc = SurfaceDesc::default();
        let mut recipe_a = RecipeSpec {
            recipe_id: 1,
            inputs: ArrayVec::new(),
            outputs: ArrayVec::new(),
            byproducts: ArrayVec::new(),
            tools: ArrayVec::new(),
            temperature: ConditionRange { min: Q16::ZERO, max: Q16::ONE },
            humidity: ConditionRange { min: Q16::ZERO, max: Q16::ONE },
            environment_id: 0,
            output_integrity: Q16::ONE,
            recycle_loss: Q16::ZERO,
            tool_wear: Q16::ZERO,
            failure_mode: FailureMode::Refuse,
            flags: RecipeFlags::empty(),
            maturity_tag: 0,
        };
        recipe_a.inputs.push(ItemReq { item_id: 1, kind: ItemKind::Material, quantity: Q16::from_int(1) });
        recipe_a.outputs.push(ItemReq { item_id: 9, kind: ItemKind::Material, quantity: Q16::from_int(1) });
        let mut recipe_b = recipe_a.clone();
        recipe_b.recipe_id = 2;
        recipe_b.output_integrity = Q16::from_f64(0.5);
        desc.recipes.push(recipe_a);
        desc.recipes.push(recipe_b);
        let mut inventory = ArrayVec::new();
        inventory.push(ItemStack {
            item_id: 1,
            kind: ItemKind::Material,
            quantity: Q16::from_int(5),
            integrity: Q16::ONE,
            flags: ItemFlags::empty(),
        });
        let mut domain = CraftDomain::init(desc, inventory, ArrayVec::new());
        domain.state.existence = Existence::Realized;
        let conditions = Conditions { temperature: Q16::from_f64(0.5), humidity: Q16::from_f64(0.5), environment_id: 0 };
        let mut budget = Budget::new(100);
        domain.execute(0, &conditions, 0, &mut budget);
        domain.execute(1, &conditions, 0, &mut budget);
        let stacks: Vec<_> = domain.inventory.iter().filter(|s| s.item_id == 9).collect();
        assert_eq!(stacks.len(), 1);
        assert_eq!(stacks[0].quantity.to_int(), 2);
    }
}
