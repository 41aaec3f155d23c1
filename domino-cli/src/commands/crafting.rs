//! `domino crafting execute` — unlike the four field resolvers this
//! subsystem runs one process against an explicit inventory rather than
//! ticking a network, so the fixture carries the whole surface plus the
//! starting inventory and the conditions to execute under.

use std::path::Path;

use domino_config::{Fixture, FixtureWriter};
use domino_core::crafting::{
    CraftDomain, Conditions, ConditionRange, FailureMode, ItemKind, ItemReq, ItemStack, RecipeFlags, RecipeSpec, SurfaceDesc,
    ToolInstance, ToolRequirement,
};
use domino_core::domain::Budget;
use domino_core::fixed::{Q16, Q16_UNKNOWN};

use crate::error::{CliError, Result};

fn item_kind_from_u32(v: u32) -> ItemKind {
    match v {
        1 => ItemKind::Part,
        2 => ItemKind::Assembly,
        3 => ItemKind::Tool,
        _ => ItemKind::Material,
    }
}

fn failure_mode_from_u32(v: u32) -> FailureMode {
    match v {
        1 => FailureMode::Waste,
        2 => FailureMode::Damage,
        _ => FailureMode::Refuse,
    }
}

fn bool_field(fixture: &Fixture, key: &str, default: bool) -> Result<bool> {
    Ok(fixture.u32(key)?.map(|v| v != 0).unwrap_or(default))
}

fn load_item_req(fixture: &Fixture, prefix: &str) -> Result<Option<ItemReq>> {
    let Some(item_id) = fixture.u32(&format!("{prefix}.id"))? else { return Ok(None) };
    Ok(Some(ItemReq {
        item_id,
        kind: item_kind_from_u32(fixture.u32(&format!("{prefix}.kind"))?.unwrap_or(0)),
        quantity: fixture.q16(&format!("{prefix}.quantity"))?.unwrap_or(Q16::ZERO),
    }))
}

fn load_recipe(fixture: &Fixture, i: usize) -> Result<Option<RecipeSpec>> {
    let Some(recipe_id) = fixture.u32(&format!("recipe.{i}.id"))? else { return Ok(None) };

    let mut spec = RecipeSpec {
        recipe_id,
        inputs: Default::default(),
        outputs: Default::default(),
        byproducts: Default::default(),
        tools: Default::default(),
        temperature: ConditionRange {
            min: fixture.q16(&format!("recipe.{i}.temperature_min"))?.unwrap_or(Q16_UNKNOWN),
            max: fixture.q16(&format!("recipe.{i}.temperature_max"))?.unwrap_or(Q16_UNKNOWN),
        },
        humidity: ConditionRange {
            min: fixture.q16(&format!("recipe.{i}.humidity_min"))?.unwrap_or(Q16_UNKNOWN),
            max: fixture.q16(&format!("recipe.{i}.humidity_max"))?.unwrap_or(Q16_UNKNOWN),
        },
        environment_id: fixture.u32(&format!("recipe.{i}.environment_id"))?.unwrap_or(0),
        output_integrity: fixture.q16(&format!("recipe.{i}.output_integrity"))?.unwrap_or(Q16::ONE),
        recycle_loss: fixture.q16(&format!("recipe.{i}.recycle_loss"))?.unwrap_or(Q16::ZERO),
        tool_wear: fixture.q16(&format!("recipe.{i}.tool_wear"))?.unwrap_or(Q16::ZERO),
        failure_mode: failure_mode_from_u32(fixture.u32(&format!("recipe.{i}.failure_mode"))?.unwrap_or(0)),
        flags: RecipeFlags::from_bits_truncate(fixture.u32(&format!("recipe.{i}.flags"))?.unwrap_or(0)),
        maturity_tag: fixture.u32(&format!("recipe.{i}.maturity_tag"))?.unwrap_or(0),
    };

    for j in 0.. {
        let Some(req) = load_item_req(fixture, &format!("recipe.{i}.input.{j}"))? else { break };
        if spec.inputs.is_full() {
            break;
        }
        spec.inputs.push(req);
    }
    for j in 0.. {
        let Some(req) = load_item_req(fixture, &format!("recipe.{i}.output.{j}"))? else { break };
        if spec.outputs.is_full() {
            break;
        }
        spec.outputs.push(req);
    }
    for j in 0.. {
        let Some(req) = load_item_req(fixture, &format!("recipe.{i}.byproduct.{j}"))? else { break };
        if spec.byproducts.is_full() {
            break;
        }
        spec.byproducts.push(req);
    }
    for j in 0.. {
        let Some(tool_id) = fixture.u32(&format!("recipe.{i}.tool.{j}.id"))? else { break };
        if spec.tools.is_full() {
            break;
        }
        spec.tools.push(ToolRequirement {
            tool_id,
            min_integrity: fixture.q16(&format!("recipe.{i}.tool.{j}.min_integrity"))?.unwrap_or(Q16::ZERO),
        });
    }

    Ok(Some(spec))
}

pub fn execute(path: &Path) -> Result<String> {
    let text = std::fs::read_to_string(path).map_err(|e| CliError::Io { path: path.display().to_string(), source: e })?;
    let fixture = Fixture::parse(&path.display().to_string(), "DOMINIUM_CRAFTING_FIXTURE_V1", &text)?;

    let mut surface = SurfaceDesc {
        domain_id: fixture.u64("domain_id")?.unwrap_or(1),
        world_seed: fixture.u64("world_seed")?.unwrap_or(1),
        craft_cost_base: fixture.u32("craft_cost_base")?.unwrap_or(1),
        craft_cost_per_input: fixture.u32("craft_cost_per_input")?.unwrap_or(1),
        craft_cost_per_output: fixture.u32("craft_cost_per_output")?.unwrap_or(1),
        craft_cost_per_tool: fixture.u32("craft_cost_per_tool")?.unwrap_or(1),
        inventory_capacity: fixture.u32("inventory_capacity")?.unwrap_or(domino_core::crafting::MAX_INVENTORY as u32),
        tool_capacity: fixture.u32("tool_capacity")?.unwrap_or(domino_core::crafting::MAX_TOOLS as u32),
        law_allow_crafting: bool_field(&fixture, "law_allow_crafting", true)?,
        metalaw_allow_crafting: bool_field(&fixture, "metalaw_allow_crafting", true)?,
        recipes: Default::default(),
    };

    for i in 0.. {
        let Some(recipe) = load_recipe(&fixture, i)? else { break };
        if surface.recipes.is_full() {
            break;
        }
        surface.recipes.push(recipe);
    }

    let mut inventory = arrayvec::ArrayVec::new();
    for i in 0.. {
        let Some(item_id) = fixture.u32(&format!("inventory.{i}.id"))? else { break };
        if inventory.is_full() {
            break;
        }
        inventory.push(ItemStack {
            item_id,
            kind: item_kind_from_u32(fixture.u32(&format!("inventory.{i}.kind"))?.unwrap_or(0)),
            quantity: fixture.q16(&format!("inventory.{i}.quantity"))?.unwrap_or(Q16::ZERO),
            integrity: fixture.q16(&format!("inventory.{i}.integrity"))?.unwrap_or(Q16::ONE),
            flags: Default::default(),
        });
    }

    let mut tools = arrayvec::ArrayVec::new();
    for i in 0.. {
        let Some(tool_id) = fixture.u32(&format!("toolinst.{i}.id"))? else { break };
        if tools.is_full() {
            break;
        }
        tools.push(ToolInstance {
            tool_id,
            integrity: fixture.q16(&format!("toolinst.{i}.integrity"))?.unwrap_or(Q16::ONE),
            wear: fixture.q16(&format!("toolinst.{i}.wear"))?.unwrap_or(Q16::ZERO),
        });
    }

    let recipe_id = fixture.u32("recipe_id")?.unwrap_or(0);
    let tick = fixture.u64("tick")?.unwrap_or(0);
    let budget_max = fixture.u32("budget")?.unwrap_or(100_000);
    let conditions = Conditions {
        temperature: fixture.q16("conditions.temperature")?.unwrap_or(Q16_UNKNOWN),
        humidity: fixture.q16("conditions.humidity")?.unwrap_or(Q16_UNKNOWN),
        environment_id: fixture.u32("conditions.environment_id")?.unwrap_or(0),
    };

    let mut domain = CraftDomain::init(surface, inventory, tools);
    let Some(recipe_index) = domain.surface.recipes.iter().position(|r| r.recipe_id == recipe_id) else {
        return Err(CliError::Refused(domino_core::domain::Refusal::Internal));
    };
    let mut budget = Budget::new(budget_max);

    let result = domain.execute(recipe_index, &conditions, tick, &mut budget);
    if !result.ok {
        return Err(CliError::Refused(result.refusal_reason));
    }

    let mut writer = FixtureWriter::new("DOMINIUM_CRAFTING_EXECUTE_V1");
    writer
        .field("ok", 1)
        .field("flags", result.flags.bits())
        .field("recipe_id", result.recipe_id)
        .field("inputs_consumed", result.inputs_consumed)
        .field("outputs_produced", result.outputs_produced)
        .field("byproducts_produced", result.byproducts_produced)
        .field("tool_damage", result.tool_damage)
        .field("inventory_count", result.inventory_count)
        .field("tool_count", result.tool_count)
        .field("process_id", result.process_id)
        .field("event_id", result.event_id);
    Ok(writer.render())
}
