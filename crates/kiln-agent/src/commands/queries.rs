//! Commands that only read the world.

use std::sync::Arc;

use kiln_core::Weather;

use super::{Command, FnCommand};
use crate::context::AgentContext;

fn pad(text: String) -> String {
    format!("\n{}\n", text)
}

fn stats(ctx: &AgentContext) -> String {
    let world = &ctx.world;
    let pos = world.position();
    let mut res = String::from("STATS");
    res.push_str(&format!(
        "\n- Position: x: {:.2}, y: {:.2}, z: {:.2}",
        pos.x, pos.y, pos.z
    ));
    res.push_str(&format!("\n- Gamemode: {}", world.game_mode()));
    res.push_str(&format!("\n- Health: {} / 20", world.health().round()));
    res.push_str(&format!("\n- Hunger: {} / 20", world.food().round()));
    res.push_str(&format!("\n- Biome: {}", world.biome()));

    let weather = match world.weather() {
        Weather::Clear => "Clear",
        Weather::Rain => "Rain",
        Weather::Thunder => "Thunderstorm",
    };
    res.push_str(&format!("\n- Weather: {}", weather));

    let time = match world.time_of_day() {
        t if t < 6000 => "Morning",
        t if t < 12000 => "Afternoon",
        _ => "Night",
    };
    res.push_str(&format!("\n- Time: {}", time));

    let players = world.nearby_player_names();
    if !players.is_empty() {
        res.push_str(&format!("\n- Other Players: {}", players.join(", ")));
    }
    pad(res)
}

fn inventory(ctx: &AgentContext) -> String {
    let mut res = String::from("INVENTORY");
    let mut empty = true;
    for (item, count) in ctx.world.inventory_counts() {
        if count > 0 {
            res.push_str(&format!("\n- {}: {}", item, count));
            empty = false;
        }
    }
    if empty {
        res.push_str(": none");
    } else if ctx.world.game_mode() == "creative" {
        res.push_str("\n(You have infinite items in creative mode)");
    }
    pad(res)
}

/// `TITLE\n- a\n- b` or `TITLE: none`.
fn listing(title: &str, items: impl IntoIterator<Item = String>) -> String {
    let mut res = title.to_string();
    let mut empty = true;
    for item in items {
        res.push_str(&format!("\n- {}", item));
        empty = false;
    }
    if empty {
        res.push_str(": none");
    }
    pad(res)
}

/// Every built-in query command.
pub fn query_commands() -> Vec<Arc<dyn Command>> {
    vec![
        Arc::new(FnCommand::new(
            "!stats",
            "Get your bot's location, health, hunger, and time of day.",
            |ctx, _| async move { Some(stats(&ctx)) },
        )),
        Arc::new(FnCommand::new(
            "!inventory",
            "Get your bot's inventory.",
            |ctx, _| async move { Some(inventory(&ctx)) },
        )),
        Arc::new(FnCommand::new(
            "!nearbyBlocks",
            "Get the blocks near the bot.",
            |ctx, _| async move {
                Some(listing("NEARBY_BLOCKS", ctx.world.nearby_block_types()))
            },
        )),
        Arc::new(FnCommand::new(
            "!craftable",
            "Get the craftable items with the bot's inventory.",
            |ctx, _| async move {
                Some(listing("CRAFTABLE_ITEMS", ctx.world.craftable_items()))
            },
        )),
        Arc::new(FnCommand::new(
            "!entities",
            "Get the nearby players and entities.",
            |ctx, _| async move {
                let players = ctx
                    .world
                    .nearby_player_names()
                    .into_iter()
                    .map(|p| format!("player: {}", p));
                let mobs = ctx
                    .world
                    .nearby_entity_types()
                    .into_iter()
                    .map(|m| format!("mob: {}", m));
                Some(listing("NEARBY_ENTITIES", players.chain(mobs)))
            },
        )),
        Arc::new(FnCommand::new(
            "!modes",
            "Get all available modes and see which are on/off.",
            |ctx, _| async move { Some(ctx.modes.describe_all()) },
        )),
    ]
}
