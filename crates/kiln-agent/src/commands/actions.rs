//! Commands that act on the world.
//!
//! Everything that moves the body is submitted to the executor, so a
//! command can be preempted by a reactive mode and never runs alongside
//! another action.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use kiln_core::SkillResult;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use super::{Command, FnCommand, ParamKind};
use crate::context::AgentContext;

/// Items the agent refuses to hand out.
const PROTECTED_ITEMS: &[&str] = &["netherite_sword"];

/// Upper bound on blocks gathered by one `!collectAllBlocks` round.
const COLLECT_ALL_BATCH: u32 = 64;

/// Submit a one-shot action and turn its outcome into reportable text.
async fn run_action<F, Fut>(ctx: &AgentContext, timeout: Option<Duration>, action: F) -> Option<String>
where
    F: FnOnce(CancellationToken) -> Fut + Send + 'static,
    Fut: Future<Output = SkillResult> + Send + 'static,
{
    ctx.executor.run(action, timeout).await.into_report()
}

fn on_off(on: bool) -> &'static str {
    if on {
        "on"
    } else {
        "off"
    }
}

/// Every built-in action command.
pub fn action_commands() -> Vec<Arc<dyn Command>> {
    vec![
        Arc::new(FnCommand::new(
            "!stop",
            "Force stop all actions and commands that are currently executing.",
            |ctx, _| async move {
                ctx.executor.stop().await;
                ctx.executor.cancel_resume();
                Some("Agent stopped.".to_string())
            },
        )),
        Arc::new(FnCommand::new(
            "!restart",
            "Restart the agent process.",
            |ctx, _| async move {
                if let Err(e) = ctx.history.persist().await {
                    warn!(error = %e, "Failed to persist history before restart");
                }
                ctx.request_restart();
                None
            },
        )),
        Arc::new(FnCommand::new(
            "!clearChat",
            "Clear the chat history.",
            |ctx, _| async move {
                ctx.history.clear().await;
                Some(format!(
                    "{}'s chat history was cleared, starting new conversation from scratch.",
                    ctx.name
                ))
            },
        )),
        Arc::new(
            FnCommand::new(
                "!setMode",
                "Set a mode to on or off. A mode is an automatic behavior that constantly checks and responds to the environment.",
                |ctx, args| async move {
                    let name = args.str(0);
                    let on = args.boolean(1);
                    if !ctx.modes.exists(name) {
                        return Some(format!(
                            "Mode {} does not exist. {}",
                            name,
                            ctx.modes.describe_all()
                        ));
                    }
                    if ctx.modes.is_on(name) == on {
                        return Some(format!("Mode {} is already {}.", name, on_off(on)));
                    }
                    ctx.modes.set_on(name, on);
                    Some(format!("Mode {} is now {}.", name, on_off(on)))
                },
            )
            .param("mode_name", ParamKind::String, "The name of the mode to toggle.")
            .param("on", ParamKind::Bool, "Whether to enable the mode."),
        ),
        Arc::new(
            FnCommand::new("!goToPlayer", "Go to the given player.", |ctx, args| async move {
                let skills = ctx.skills.clone();
                let player = args.str(0).to_string();
                let closeness = args.number(1);
                run_action(&ctx, None, move |cancel| async move {
                    skills.go_to_player(&player, closeness, &cancel).await
                })
                .await
            })
            .param("player_name", ParamKind::String, "The name of the player to go to.")
            .param("closeness", ParamKind::Number, "How close to get to the player."),
        ),
        Arc::new(
            FnCommand::new(
                "!followPlayer",
                "Endlessly follow the given player. Will defend that player if self_defense mode is on.",
                |ctx, args| async move {
                    let skills = ctx.skills.clone();
                    let player = args.str(0).to_string();
                    let distance = args.number(1);
                    ctx.executor
                        .run_resumable(
                            move |cancel| {
                                let skills = skills.clone();
                                let player = player.clone();
                                async move { skills.follow_player(&player, distance, &cancel).await }
                            },
                            "followPlayer",
                            None,
                        )
                        .await
                        .into_report()
                },
            )
            .param("player_name", ParamKind::String, "The name of the player to follow.")
            .param("follow_dist", ParamKind::Number, "The distance to follow from."),
        ),
        Arc::new(
            FnCommand::new(
                "!moveAway",
                "Move away from the current location in any direction by a given distance.",
                |ctx, args| async move {
                    let skills = ctx.skills.clone();
                    let distance = args.number(0);
                    run_action(&ctx, None, move |cancel| async move {
                        skills.move_away(distance, &cancel).await
                    })
                    .await
                },
            )
            .param("distance", ParamKind::Number, "The distance to move away."),
        ),
        Arc::new(
            FnCommand::new(
                "!givePlayer",
                "Give the specified item to the given player.",
                |ctx, args| async move {
                    let player = args.str(0).to_string();
                    let item = args.str(1).to_string();
                    let count = args.count(2);
                    if PROTECTED_ITEMS.contains(&item.as_str()) {
                        return Some(format!(
                            "Cannot give away {}, it is too important to lose. Tell the player.",
                            item
                        ));
                    }
                    let skills = ctx.skills.clone();
                    run_action(&ctx, None, move |cancel| async move {
                        skills.give_to_player(&item, &player, count, &cancel).await
                    })
                    .await
                },
            )
            .param("player_name", ParamKind::String, "The name of the player to give the item to.")
            .param("item_name", ParamKind::String, "The name of the item to give.")
            .param("num", ParamKind::Number, "The number of items to give."),
        ),
        Arc::new(
            FnCommand::new(
                "!collectBlocks",
                "Collect the nearest blocks of a given type.",
                |ctx, args| async move {
                    let skills = ctx.skills.clone();
                    let block = args.str(0).to_string();
                    let count = args.count(1);
                    let timeout = ctx.config.executor.code_timeout();
                    run_action(&ctx, timeout, move |cancel| async move {
                        skills.collect_block(&block, count, &cancel).await
                    })
                    .await
                },
            )
            .param("type", ParamKind::String, "The block type to collect.")
            .param("num", ParamKind::Number, "The number of blocks to collect."),
        ),
        Arc::new(
            FnCommand::new(
                "!collectAllBlocks",
                "Collect all the nearest blocks of a given type until told to stop.",
                |ctx, args| async move {
                    let skills = ctx.skills.clone();
                    let executor = Arc::downgrade(&ctx.executor);
                    let block = args.str(0).to_string();
                    let timeout = ctx.config.executor.code_timeout();
                    ctx.executor
                        .run_resumable(
                            move |cancel| {
                                let skills = skills.clone();
                                let executor = executor.clone();
                                let block = block.clone();
                                async move {
                                    let result =
                                        skills.collect_block(&block, COLLECT_ALL_BATCH, &cancel).await;
                                    // Nothing left to collect: do not offer this again.
                                    if result.is_err() {
                                        if let Some(executor) = executor.upgrade() {
                                            executor.cancel_resume();
                                        }
                                    }
                                    result
                                }
                            },
                            "collectAllBlocks",
                            timeout,
                        )
                        .await
                        .into_report()
                },
            )
            .param("type", ParamKind::String, "The block type to collect."),
        ),
        Arc::new(
            FnCommand::new(
                "!craftRecipe",
                "Craft the given recipe a given number of times.",
                |ctx, args| async move {
                    let skills = ctx.skills.clone();
                    let recipe = args.str(0).to_string();
                    let count = args.count(1);
                    run_action(&ctx, None, move |cancel| async move {
                        skills.craft_recipe(&recipe, count, &cancel).await
                    })
                    .await
                },
            )
            .param("recipe_name", ParamKind::String, "The name of the output item to craft.")
            .param(
                "num",
                ParamKind::Number,
                "The number of times to craft the recipe. This is NOT the number of output items, as it may craft many more items depending on the recipe.",
            ),
        ),
        Arc::new(
            FnCommand::new(
                "!smeltItem",
                "Smelt the given item the given number of times.",
                |ctx, args| async move {
                    let skills = ctx.skills.clone();
                    let item = args.str(0).to_string();
                    let count = args.count(1);
                    run_action(&ctx, None, move |cancel| async move {
                        skills.smelt_item(&item, count, &cancel).await
                    })
                    .await
                },
            )
            .param("item_name", ParamKind::String, "The name of the input item to smelt.")
            .param("num", ParamKind::Number, "The number of times to smelt the item."),
        ),
        Arc::new(
            FnCommand::new(
                "!placeHere",
                "Place a given block in the current location. Do NOT use to build structures, only use for single blocks/torches.",
                |ctx, args| async move {
                    let skills = ctx.skills.clone();
                    let block = args.str(0).to_string();
                    let at = ctx.world.position();
                    run_action(&ctx, None, move |cancel| async move {
                        skills.place_block(&block, at, &cancel).await
                    })
                    .await
                },
            )
            .param("type", ParamKind::String, "The block type to place."),
        ),
        Arc::new(
            FnCommand::new(
                "!attack",
                "Attack and kill the nearest entity of a given type.",
                |ctx, args| async move {
                    let skills = ctx.skills.clone();
                    let kind = args.str(0).to_string();
                    run_action(&ctx, None, move |cancel| async move {
                        skills.attack_nearest(&kind, true, &cancel).await
                    })
                    .await
                },
            )
            .param("type", ParamKind::String, "The type of entity to attack."),
        ),
        Arc::new(FnCommand::new(
            "!goToBed",
            "Go to the nearest bed and sleep.",
            |ctx, _| async move {
                let skills = ctx.skills.clone();
                run_action(&ctx, None, move |cancel| async move {
                    skills.go_to_bed(&cancel).await
                })
                .await
            },
        )),
        Arc::new(
            FnCommand::new(
                "!activate",
                "Activate the nearest object of a given type.",
                |ctx, args| async move {
                    let skills = ctx.skills.clone();
                    let block = args.str(0).to_string();
                    run_action(&ctx, None, move |cancel| async move {
                        skills.activate_nearest_block(&block, &cancel).await
                    })
                    .await
                },
            )
            .param("type", ParamKind::String, "The type of object to activate."),
        ),
        Arc::new(FnCommand::new(
            "!stay",
            "Stay in the current location no matter what. Pauses all modes.",
            |ctx, _| async move {
                let skills = ctx.skills.clone();
                let modes = ctx.modes.clone();
                run_action(&ctx, None, move |cancel| async move {
                    for mode in modes.iter() {
                        modes.pause(mode.name());
                    }
                    skills.stay(&cancel).await
                })
                .await
            },
        )),
        Arc::new(
            FnCommand::new("!tpa", "Request a teleport to a player.", |ctx, args| async move {
                ctx.body.chat(&format!("/tpa {}", args.str(0)));
                None
            })
            .param("player", ParamKind::String, "The player to teleport to."),
        ),
        Arc::new(FnCommand::new(
            "!tpaccept",
            "Accept a pending teleport request. Takes no arguments.",
            |ctx, _| async move {
                ctx.body.chat("/tpaccept");
                None
            },
        )),
        Arc::new(FnCommand::new(
            "!storeItems",
            "Store the inventory in the nearest chest or shulker box.",
            |ctx, _| async move {
                let skills = ctx.skills.clone();
                run_action(&ctx, None, move |cancel| async move {
                    skills.store_items_in_nearest_container(&cancel).await
                })
                .await
            },
        )),
    ]
}
