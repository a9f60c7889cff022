//! Commands that change what the agent is doing.

use super::{Args, Command, CommandContext, CommandParam, CommandRegistry, ParamKind};
use crate::action::{place_here_action, run_skill, skill_action};
use crate::executor::{ActionFn, ResumableTask, action_fn};
use crate::syntax::ArgValue;
use async_trait::async_trait;
use blockmind_core::error::CommandError;
use blockmind_core::world::Skill;
use std::sync::Arc;
use tracing::{info, warn};

/// Reply to `!newAction` when code writing is disabled.
pub const CODING_DISABLED: &str = "newAction Failed! Agent is not allowed to write code. Notify the user.";

pub fn register(registry: &mut CommandRegistry) {
    registry.register(Box::new(NewAction));
    registry.register(Box::new(Stop));
    registry.register(Box::new(Restart));
    registry.register(Box::new(ClearChat));
    registry.register(Box::new(SetMode));
    for command in skill_commands() {
        registry.register(Box::new(command));
    }
}

struct NewAction;

#[async_trait]
impl Command for NewAction {
    fn name(&self) -> &str {
        "!newAction"
    }

    fn description(&self) -> &str {
        "Perform new and unknown custom behaviors that are not available as a command by writing code."
    }

    async fn perform(&self, ctx: &CommandContext, _args: &[ArgValue]) -> Result<Option<String>, CommandError> {
        if !ctx.allow_insecure_coding {
            return Ok(Some(CODING_DISABLED.to_string()));
        }
        Ok(ctx.executor.generate_code().await)
    }
}

struct Stop;

#[async_trait]
impl Command for Stop {
    fn name(&self) -> &str {
        "!stop"
    }

    fn description(&self) -> &str {
        "Force stop all actions and commands that are currently executing."
    }

    async fn perform(&self, ctx: &CommandContext, _args: &[ArgValue]) -> Result<Option<String>, CommandError> {
        ctx.executor.stop().await;
        ctx.executor.clear();
        ctx.executor.cancel_resume();
        Ok(Some("Agent stopped.".to_string()))
    }
}

struct Restart;

#[async_trait]
impl Command for Restart {
    fn name(&self) -> &str {
        "!restart"
    }

    fn description(&self) -> &str {
        "Restart the agent process."
    }

    async fn perform(&self, ctx: &CommandContext, _args: &[ArgValue]) -> Result<Option<String>, CommandError> {
        info!(agent = %ctx.agent_name, "Restart requested");
        ctx.terminator.terminate("restart requested");
        Ok(None)
    }
}

struct ClearChat;

#[async_trait]
impl Command for ClearChat {
    fn name(&self) -> &str {
        "!clearChat"
    }

    fn description(&self) -> &str {
        "Clear the chat history."
    }

    async fn perform(&self, ctx: &CommandContext, _args: &[ArgValue]) -> Result<Option<String>, CommandError> {
        ctx.history.lock().await.clear();
        Ok(Some(format!(
            "{}'s chat history was cleared, starting new conversation from scratch.",
            ctx.agent_name
        )))
    }
}

struct SetMode;

const SET_MODE_PARAMS: &[CommandParam] = &[
    CommandParam::new("mode_name", ParamKind::String, "The name of the mode to enable."),
    CommandParam::new("on", ParamKind::Bool, "Whether to enable or disable the mode."),
];

#[async_trait]
impl Command for SetMode {
    fn name(&self) -> &str {
        "!setMode"
    }

    fn description(&self) -> &str {
        "Set a mode to on or off. A mode is an automatic behavior that constantly checks and responds to the environment."
    }

    fn params(&self) -> &[CommandParam] {
        SET_MODE_PARAMS
    }

    async fn perform(&self, ctx: &CommandContext, args: &[ArgValue]) -> Result<Option<String>, CommandError> {
        let args = Args::new(self.name(), args);
        let name = args.string(0)?;
        let on = args.flag(1)?;
        let state = if on { "on" } else { "off" };

        let mut modes = ctx.modes.lock().await;
        let reply = match modes.is_on(&name) {
            None => format!("Mode {name} does not exist.\n{}", modes.describe()),
            Some(current) if current == on => format!("Mode {name} is already {state}."),
            Some(_) => {
                modes.set_on(&name, on);
                info!(mode = %name, on, "Mode switched");
                format!("Mode {name} is now {state}.")
            }
        };
        Ok(Some(reply))
    }
}

type Build = fn(&CommandContext, &Args<'_>) -> Result<ActionFn, CommandError>;

/// A command that runs one skill through the executor.
struct SkillCommand {
    name: &'static str,
    description: &'static str,
    params: &'static [CommandParam],
    /// 0 disables the watchdog
    timeout_minutes: u64,
    /// Remembered as a resumable task under this name
    resume: Option<&'static str>,
    build: Build,
}

#[async_trait]
impl Command for SkillCommand {
    fn name(&self) -> &str {
        self.name
    }

    fn description(&self) -> &str {
        self.description
    }

    fn params(&self) -> &[CommandParam] {
        self.params
    }

    async fn perform(&self, ctx: &CommandContext, args: &[ArgValue]) -> Result<Option<String>, CommandError> {
        let func = (self.build)(ctx, &Args::new(self.name, args))?;
        let result = match self.resume {
            Some(name) => {
                let task = ResumableTask::new(name, func, self.timeout_minutes);
                ctx.executor.execute_resume(Some(task)).await
            }
            None => ctx.executor.execute(func, self.timeout_minutes).await,
        };
        if result.interrupted && !result.timed_out {
            return Ok(None);
        }
        Ok(Some(result.message).filter(|m| !m.is_empty()))
    }
}

const GO_TO_PLAYER_PARAMS: &[CommandParam] = &[
    CommandParam::new("player_name", ParamKind::String, "The name of the player to go to."),
    CommandParam::new("closeness", ParamKind::Number, "How close to get to the player."),
];
const FOLLOW_PLAYER_PARAMS: &[CommandParam] = &[
    CommandParam::new("player_name", ParamKind::String, "The name of the player to follow."),
    CommandParam::new("follow_dist", ParamKind::Number, "The distance to follow from."),
];
const MOVE_AWAY_PARAMS: &[CommandParam] = &[CommandParam::new(
    "distance",
    ParamKind::Number,
    "The distance to move away.",
)];
const GIVE_PLAYER_PARAMS: &[CommandParam] = &[
    CommandParam::new("player_name", ParamKind::String, "The name of the player to give the item to."),
    CommandParam::new("item_name", ParamKind::String, "The name of the item to give."),
    CommandParam::new("num", ParamKind::Number, "The number of items to give."),
];
const COLLECT_BLOCKS_PARAMS: &[CommandParam] = &[
    CommandParam::new("type", ParamKind::String, "The block type to collect."),
    CommandParam::new("num", ParamKind::Number, "The number of blocks to collect."),
];
const COLLECT_ALL_BLOCKS_PARAMS: &[CommandParam] = &[CommandParam::new(
    "type",
    ParamKind::String,
    "The block type to collect.",
)];
const CRAFT_RECIPE_PARAMS: &[CommandParam] = &[
    CommandParam::new("recipe_name", ParamKind::String, "The name of the output item to craft."),
    CommandParam::new(
        "num",
        ParamKind::Number,
        "The number of times to craft the recipe. This is NOT the number of output items, as it may craft many more items depending on the recipe.",
    ),
];
const SMELT_ITEM_PARAMS: &[CommandParam] = &[
    CommandParam::new("item_name", ParamKind::String, "The name of the input item to smelt."),
    CommandParam::new("num", ParamKind::Number, "The number of times to smelt the item."),
];
const PLACE_HERE_PARAMS: &[CommandParam] = &[CommandParam::new(
    "type",
    ParamKind::String,
    "The block type to place.",
)];
const ATTACK_PARAMS: &[CommandParam] = &[CommandParam::new(
    "type",
    ParamKind::String,
    "The type of entity to attack.",
)];

fn skill_commands() -> Vec<SkillCommand> {
    vec![
        SkillCommand {
            name: "!goToPlayer",
            description: "Go to the given player.",
            params: GO_TO_PLAYER_PARAMS,
            timeout_minutes: 0,
            resume: None,
            build: |_, a| {
                Ok(skill_action(Skill::GoToPlayer {
                    player: a.string(0)?,
                    closeness: a.number(1)?,
                }))
            },
        },
        SkillCommand {
            name: "!followPlayer",
            description: "Endlessly follow the given player. Will defend that player if self_defense mode is on.",
            params: FOLLOW_PLAYER_PARAMS,
            timeout_minutes: 0,
            resume: Some("followPlayer"),
            build: |_, a| {
                Ok(skill_action(Skill::FollowPlayer {
                    player: a.string(0)?,
                    distance: a.number(1)?,
                }))
            },
        },
        SkillCommand {
            name: "!moveAway",
            description: "Move away from the current location in any direction by a given distance.",
            params: MOVE_AWAY_PARAMS,
            timeout_minutes: 0,
            resume: None,
            build: |_, a| Ok(skill_action(Skill::MoveAway { distance: a.number(0)? })),
        },
        SkillCommand {
            name: "!givePlayer",
            description: "Give the specified item to the given player.",
            params: GIVE_PLAYER_PARAMS,
            timeout_minutes: 0,
            resume: None,
            build: |_, a| {
                Ok(skill_action(Skill::GivePlayer {
                    player: a.string(0)?,
                    item: a.string(1)?,
                    num: a.count(2)?,
                }))
            },
        },
        SkillCommand {
            name: "!collectBlocks",
            description: "Collect the nearest blocks of a given type.",
            params: COLLECT_BLOCKS_PARAMS,
            timeout_minutes: 10,
            resume: None,
            build: |_, a| {
                Ok(skill_action(Skill::CollectBlocks {
                    block: a.string(0)?,
                    num: a.count(1)?,
                }))
            },
        },
        SkillCommand {
            name: "!collectAllBlocks",
            description: "Collect all the nearest blocks of a given type until told to stop.",
            params: COLLECT_ALL_BLOCKS_PARAMS,
            timeout_minutes: 10,
            resume: Some("collectAllBlocks"),
            build: collect_all_blocks,
        },
        SkillCommand {
            name: "!craftRecipe",
            description: "Craft the given recipe a given number of times.",
            params: CRAFT_RECIPE_PARAMS,
            timeout_minutes: 0,
            resume: None,
            build: |_, a| {
                Ok(skill_action(Skill::CraftRecipe {
                    recipe: a.string(0)?,
                    num: a.count(1)?,
                }))
            },
        },
        SkillCommand {
            name: "!smeltItem",
            description: "Smelt the given item the given number of times.",
            params: SMELT_ITEM_PARAMS,
            timeout_minutes: 0,
            resume: None,
            build: |_, a| {
                Ok(skill_action(Skill::SmeltItem {
                    item: a.string(0)?,
                    num: a.count(1)?,
                }))
            },
        },
        SkillCommand {
            name: "!placeHere",
            description: "Place a given block in the current location. Do NOT use to build structures, only use for single blocks/torches.",
            params: PLACE_HERE_PARAMS,
            timeout_minutes: 0,
            resume: None,
            build: |_, a| Ok(place_here_action(a.string(0)?)),
        },
        SkillCommand {
            name: "!attack",
            description: "Attack and kill the nearest entity of a given type.",
            params: ATTACK_PARAMS,
            timeout_minutes: 0,
            resume: None,
            build: |_, a| Ok(skill_action(Skill::AttackNearest { mob: a.string(0)? })),
        },
        SkillCommand {
            name: "!goToBed",
            description: "Go to the nearest bed and sleep.",
            params: &[],
            timeout_minutes: 0,
            resume: None,
            build: |_, _| Ok(skill_action(Skill::GoToBed)),
        },
        SkillCommand {
            name: "!stay",
            description: "Stay in the current location no matter what. Pauses all modes.",
            params: &[],
            timeout_minutes: 0,
            resume: None,
            build: stay,
        },
    ]
}

/// Collect one block per run. A failed run drops the resumable task so the
/// agent stops retrying.
fn collect_all_blocks(ctx: &CommandContext, a: &Args<'_>) -> Result<ActionFn, CommandError> {
    let block = a.string(0)?;
    let executor = Arc::downgrade(&ctx.executor);
    Ok(action_fn(move |actx| {
        let block = block.clone();
        let executor = executor.clone();
        async move {
            let collected = run_skill(&actx, Skill::CollectBlocks { block, num: 1 }).await?;
            if !collected {
                warn!("Nothing left to collect, cancelling resume");
                if let Some(executor) = executor.upgrade() {
                    executor.cancel_resume();
                }
            }
            Ok(())
        }
    }))
}

fn stay(ctx: &CommandContext, _a: &Args<'_>) -> Result<ActionFn, CommandError> {
    let modes = ctx.modes.clone();
    let stay = skill_action(Skill::Stay);
    Ok(action_fn(move |actx| {
        let modes = modes.clone();
        let stay = stay.clone();
        async move {
            modes.lock().await.pause_all();
            stay(actx).await
        }
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::{MockWorld, RigOptions, SequentialMockProvider, TestRig, make_text_response};
    use blockmind_core::message::Turn;

    fn rig() -> TestRig {
        TestRig::new(SequentialMockProvider::new(vec![]), MockWorld::new("andy"))
    }

    async fn wait_until_executing(rig: &TestRig) {
        while !rig.executor.is_executing() {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test]
    async fn wrapped_skill_reports_its_output() {
        let rig = rig();
        let reply = rig
            .commands
            .execute(&rig.ctx, "!collectBlocks(\"oak_log\", 3)")
            .await
            .unwrap();
        assert_eq!(reply.as_deref(), Some("Code output:\nCollected 3 oak_log.\n"));
        assert_eq!(rig.world.skills(), vec![Skill::CollectBlocks { block: "oak_log".into(), num: 3 }]);
    }

    #[tokio::test]
    async fn bare_words_are_accepted_for_strings() {
        let rig = rig();
        rig.commands
            .execute(&rig.ctx, "!goToPlayer(steve, 2)")
            .await
            .unwrap();
        assert_eq!(
            rig.world.skills(),
            vec![Skill::GoToPlayer { player: "steve".into(), closeness: 2.0 }]
        );
    }

    #[tokio::test]
    async fn skill_errors_are_folded_into_the_message() {
        let rig = TestRig::new(SequentialMockProvider::new(vec![]), MockWorld::new("andy").failing());
        let reply = rig.commands.execute(&rig.ctx, "!goToBed").await.unwrap().unwrap();
        assert!(reply.contains("!!Code threw exception!!"));
        assert!(reply.contains("scripted failure"));
    }

    #[tokio::test(start_paused = true)]
    async fn stop_interrupts_and_forgets_the_resumable_task() {
        let rig = rig();
        let commands = rig.commands.clone();
        let ctx = rig.ctx.clone();
        let following = tokio::spawn(async move { commands.execute(&ctx, "!followPlayer(\"steve\", 4)").await });
        wait_until_executing(&rig).await;
        assert_eq!(rig.executor.resume_name().as_deref(), Some("followPlayer"));

        let reply = rig.commands.execute(&rig.ctx, "!stop").await.unwrap();

        assert_eq!(reply.as_deref(), Some("Agent stopped."));
        assert_eq!(following.await.unwrap().unwrap(), None);
        assert_eq!(rig.executor.resume_name(), None);
        assert!(rig.executor.is_idle());
    }

    #[tokio::test(start_paused = true)]
    async fn stay_pauses_every_mode() {
        let rig = rig();
        let commands = rig.commands.clone();
        let ctx = rig.ctx.clone();
        let staying = tokio::spawn(async move { commands.execute(&ctx, "!stay").await });
        wait_until_executing(&rig).await;
        while !rig.world.skills().contains(&Skill::Stay) {
            tokio::task::yield_now().await;
        }

        assert!(rig.modes.lock().await.modes().iter().all(|m| m.is_paused()));

        rig.executor.stop().await;
        assert_eq!(staying.await.unwrap().unwrap(), None);
    }

    #[tokio::test]
    async fn collect_all_blocks_is_remembered_for_resume() {
        let rig = rig();
        let reply = rig.commands.execute(&rig.ctx, "!collectAllBlocks(\"oak_log\")").await.unwrap();
        assert_eq!(reply.as_deref(), Some("Code output:\nCollected 1 oak_log.\n"));
        assert_eq!(rig.executor.resume_name().as_deref(), Some("collectAllBlocks"));
    }

    #[tokio::test]
    async fn set_mode_reports_each_outcome() {
        let rig = rig();
        let run = |text: &'static str| {
            let commands = rig.commands.clone();
            let ctx = rig.ctx.clone();
            async move { commands.execute(&ctx, text).await.unwrap().unwrap() }
        };

        assert_eq!(run("!setMode(\"hunting\", false)").await, "Mode hunting is now off.");
        assert_eq!(run("!setMode(hunting, false)").await, "Mode hunting is already off.");
        let unknown = run("!setMode(\"flying\", true)").await;
        assert!(unknown.starts_with("Mode flying does not exist.\nAvailable Modes:"));
        assert_eq!(rig.modes.lock().await.is_on("hunting"), Some(false));
    }

    #[tokio::test]
    async fn clear_chat_empties_history() {
        let rig = rig();
        rig.history.lock().await.add("steve", "hello").await;
        let reply = rig.commands.execute(&rig.ctx, "!clearChat").await.unwrap();
        assert_eq!(
            reply.as_deref(),
            Some("andy's chat history was cleared, starting new conversation from scratch.")
        );
        assert!(rig.history.lock().await.is_empty());
    }

    #[tokio::test]
    async fn restart_goes_through_the_terminator() {
        let rig = rig();
        assert_eq!(rig.commands.execute(&rig.ctx, "!restart").await.unwrap(), None);
        assert_eq!(rig.terminator.reasons(), vec!["restart requested".to_string()]);
    }

    #[tokio::test]
    async fn new_action_is_refused_unless_coding_is_allowed() {
        let rig = rig();
        let reply = rig.commands.execute(&rig.ctx, "!newAction").await.unwrap();
        assert_eq!(reply.as_deref(), Some(CODING_DISABLED));
        assert_eq!(rig.provider.call_count(), 0);
    }

    #[tokio::test]
    async fn new_action_runs_the_code_loop() {
        let rig = TestRig::with_options(
            SequentialMockProvider::new(vec![
                make_text_response("```\nchat('building')\n```"),
                make_text_response("Built it."),
            ]),
            MockWorld::new("andy"),
            RigOptions {
                allow_insecure_coding: true,
                ..RigOptions::default()
            },
        );

        let reply = rig.commands.execute(&rig.ctx, "!newAction").await.unwrap();

        assert_eq!(reply, None);
        assert_eq!(rig.world.chats(), vec!["building".to_string(), "Built it.".to_string()]);
        assert_eq!(rig.history.lock().await.turns().last(), Some(&Turn::assistant("Built it.")));
    }
}
