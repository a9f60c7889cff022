//! Action scripts.
//!
//! The model writes actions as a short script of template calls inside a
//! code fence. Staging parses the script into [`ActionStep`]s, persists it
//! under a fresh sequence id, and hands back a [`StagedAction`] whose entry
//! point runs the steps with a cancellation check between each one.

use crate::executor::{ActionContext, ActionFn, action_fn};
use crate::syntax::{self, ArgValue};
use blockmind_core::error::StagingError;
use blockmind_core::world::{Position, Skill};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tracing::{debug, info};

/// Fixed entry point name recorded in every artifact.
pub const ENTRY_POINT: &str = "main";

/// Logged when a running script observes cancellation.
pub const INTERRUPTED_NOTE: &str = "Code interrupted.";

/// One statement of an action script.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "step", rename_all = "snake_case")]
pub enum ActionStep {
    Chat { text: String },
    Log { text: String },
    Wait { seconds: f64 },
    PlaceHere { block: String },
    Skill { skill: Skill },
}

struct Template {
    name: &'static str,
    signature: &'static str,
    description: &'static str,
}

const TEMPLATES: &[Template] = &[
    Template { name: "chat", signature: "chat(text: string)", description: "Send a chat message." },
    Template { name: "log", signature: "log(text: string)", description: "Write a line to the code output you will see afterwards." },
    Template { name: "wait", signature: "wait(seconds: number)", description: "Do nothing for the given time." },
    Template { name: "goToPlayer", signature: "goToPlayer(player: string, closeness: number)", description: "Navigate to the given player." },
    Template { name: "followPlayer", signature: "followPlayer(player: string, distance: number)", description: "Follow the given player until interrupted." },
    Template { name: "moveAway", signature: "moveAway(distance: number)", description: "Move away from the current location in any direction." },
    Template { name: "givePlayer", signature: "givePlayer(player: string, item: string, num: number)", description: "Give items to the given player." },
    Template { name: "collectBlocks", signature: "collectBlocks(type: string, num: number)", description: "Collect the nearest blocks of the given type." },
    Template { name: "craftRecipe", signature: "craftRecipe(recipe: string, num: number)", description: "Craft the given recipe a number of times." },
    Template { name: "smeltItem", signature: "smeltItem(item: string, num: number)", description: "Smelt the given item a number of times." },
    Template { name: "placeHere", signature: "placeHere(type: string)", description: "Place a block at the current location." },
    Template { name: "attackNearest", signature: "attackNearest(type: string)", description: "Attack and kill the nearest entity of the given type." },
    Template { name: "goToBed", signature: "goToBed()", description: "Go to the nearest bed and sleep." },
    Template { name: "stay", signature: "stay()", description: "Stay in the current location until interrupted." },
    Template { name: "defendSelf", signature: "defendSelf(range: number)", description: "Fight hostile mobs within the given range." },
    Template { name: "pickupNearbyItems", signature: "pickupNearbyItems()", description: "Pick up dropped items nearby." },
];

/// Documentation for `$CODE_DOCS`.
pub fn code_docs() -> String {
    let mut docs = String::from(
        "\n*ACTION SCRIPT DOCS\nWrite one call per line inside a ``` codeblock. Strings are quoted, numbers are plain.\n",
    );
    for t in TEMPLATES {
        docs.push_str(&format!("{}\n{}\n", t.signature, t.description));
    }
    docs.push_str("*\n");
    docs
}

struct Args<'a> {
    call: &'a str,
    values: &'a [ArgValue],
}

impl Args<'_> {
    fn expect_count(&self, min: usize, max: usize) -> Result<(), String> {
        let n = self.values.len();
        if n < min || n > max {
            let expected = if min == max { min.to_string() } else { format!("{min} to {max}") };
            return Err(format!("{} expects {expected} arguments, got {n}", self.call));
        }
        Ok(())
    }

    fn string(&self, i: usize) -> Result<String, String> {
        match self.values.get(i) {
            Some(ArgValue::Str(s)) => Ok(s.clone()),
            Some(other) => Err(format!("{} argument {} must be a quoted string, got {other}", self.call, i + 1)),
            None => Err(format!("{} is missing argument {}", self.call, i + 1)),
        }
    }

    fn number(&self, i: usize, default: Option<f64>) -> Result<f64, String> {
        match (self.values.get(i), default) {
            (Some(ArgValue::Num(n)), _) => Ok(*n),
            (Some(other), _) => Err(format!("{} argument {} must be a number, got {other}", self.call, i + 1)),
            (None, Some(d)) => Ok(d),
            (None, None) => Err(format!("{} is missing argument {}", self.call, i + 1)),
        }
    }

    fn count(&self, i: usize) -> Result<u32, String> {
        let n = self.number(i, Some(1.0))?;
        if n < 0.0 || n.fract() != 0.0 {
            return Err(format!("{} argument {} must be a whole number, got {n}", self.call, i + 1));
        }
        Ok(n as u32)
    }
}

fn build_step(name: &str, values: &[ArgValue]) -> Result<ActionStep, String> {
    let a = Args { call: name, values };
    let skill = |skill: Skill| -> Result<ActionStep, String> { Ok(ActionStep::Skill { skill }) };
    match name {
        "chat" => {
            a.expect_count(1, 1)?;
            Ok(ActionStep::Chat { text: a.string(0)? })
        }
        "log" => {
            a.expect_count(1, 1)?;
            Ok(ActionStep::Log { text: a.string(0)? })
        }
        "wait" => {
            a.expect_count(1, 1)?;
            Ok(ActionStep::Wait { seconds: a.number(0, None)?.max(0.0) })
        }
        "goToPlayer" => {
            a.expect_count(1, 2)?;
            skill(Skill::GoToPlayer { player: a.string(0)?, closeness: a.number(1, Some(3.0))? })
        }
        "followPlayer" => {
            a.expect_count(1, 2)?;
            skill(Skill::FollowPlayer { player: a.string(0)?, distance: a.number(1, Some(4.0))? })
        }
        "moveAway" => {
            a.expect_count(1, 1)?;
            skill(Skill::MoveAway { distance: a.number(0, None)? })
        }
        "givePlayer" => {
            a.expect_count(2, 3)?;
            skill(Skill::GivePlayer { player: a.string(0)?, item: a.string(1)?, num: a.count(2)? })
        }
        "collectBlocks" => {
            a.expect_count(1, 2)?;
            skill(Skill::CollectBlocks { block: a.string(0)?, num: a.count(1)? })
        }
        "craftRecipe" => {
            a.expect_count(1, 2)?;
            skill(Skill::CraftRecipe { recipe: a.string(0)?, num: a.count(1)? })
        }
        "smeltItem" => {
            a.expect_count(1, 2)?;
            skill(Skill::SmeltItem { item: a.string(0)?, num: a.count(1)? })
        }
        "placeHere" => {
            a.expect_count(1, 1)?;
            Ok(ActionStep::PlaceHere { block: a.string(0)? })
        }
        "attackNearest" => {
            a.expect_count(1, 1)?;
            skill(Skill::AttackNearest { mob: a.string(0)? })
        }
        "goToBed" => {
            a.expect_count(0, 0)?;
            skill(Skill::GoToBed)
        }
        "stay" => {
            a.expect_count(0, 0)?;
            skill(Skill::Stay)
        }
        "defendSelf" => {
            a.expect_count(0, 1)?;
            skill(Skill::DefendSelf { range: a.number(0, Some(8.0))? })
        }
        "pickupNearbyItems" => {
            a.expect_count(0, 0)?;
            skill(Skill::PickupNearbyItems)
        }
        other => Err(format!("unknown template '{other}'")),
    }
}

/// Tags the model sometimes writes on the same line as the code.
const INLINE_TAGS: [&str; 3] = ["javascript", "Javascript", "js"];

/// Drop a leading language tag such as `js` or `javascript`.
pub fn sanitize_code(code: &str) -> &str {
    let code = code.trim();
    match code.split_once('\n') {
        Some((first, rest)) if is_language_tag(first) => rest.trim(),
        None if is_language_tag(code) => "",
        _ => strip_inline_tag(code),
    }
}

fn strip_inline_tag(code: &str) -> &str {
    INLINE_TAGS
        .iter()
        .filter_map(|tag| code.strip_prefix(tag))
        .find(|rest| rest.starts_with(char::is_whitespace))
        .map_or(code, str::trim)
}

fn is_language_tag(line: &str) -> bool {
    let line = line.trim();
    !line.is_empty() && line.chars().all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}

/// Parse a script into steps. Statement numbers in errors are 1-based.
pub fn parse_script(source: &str) -> Result<Vec<ActionStep>, StagingError> {
    let statements = syntax::split_statements(source)
        .map_err(|reason| StagingError::Parse { statement: 0, reason })?;
    if statements.is_empty() {
        return Err(StagingError::Parse { statement: 0, reason: "script has no statements".into() });
    }

    statements
        .iter()
        .enumerate()
        .map(|(i, statement)| {
            let statement = statement.strip_prefix("await ").unwrap_or(statement);
            syntax::parse_call(statement)
                .and_then(|(name, args)| build_step(&name, &args))
                .map_err(|reason| StagingError::Parse { statement: i + 1, reason })
        })
        .collect()
}

/// On-disk form of a staged action.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionArtifact {
    pub id: u64,
    pub entry: String,
    pub source: String,
    pub steps: Vec<ActionStep>,
    pub created_at: DateTime<Utc>,
}

/// A parsed, persisted action ready to run.
#[derive(Debug, Clone)]
pub struct StagedAction {
    id: u64,
    path: PathBuf,
    steps: Arc<Vec<ActionStep>>,
}

impl StagedAction {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn steps(&self) -> &[ActionStep] {
        &self.steps
    }

    /// The action's entry point.
    pub fn entry(&self) -> ActionFn {
        let steps = self.steps.clone();
        action_fn(move |ctx| run_steps(steps.clone(), ctx))
    }
}

async fn run_steps(steps: Arc<Vec<ActionStep>>, ctx: ActionContext) -> anyhow::Result<()> {
    for step in steps.iter() {
        if ctx.is_interrupted() {
            ctx.log(INTERRUPTED_NOTE);
            return Ok(());
        }
        run_step(step, &ctx).await?;
    }
    if ctx.is_interrupted() {
        ctx.log(INTERRUPTED_NOTE);
    }
    Ok(())
}

async fn run_step(step: &ActionStep, ctx: &ActionContext) -> anyhow::Result<()> {
    match step {
        ActionStep::Chat { text } => ctx.chat(text).await?,
        ActionStep::Log { text } => ctx.log(text),
        ActionStep::Wait { seconds } => {
            let token = ctx.token();
            tokio::select! {
                _ = tokio::time::sleep(Duration::try_from_secs_f64(*seconds).unwrap_or(Duration::ZERO)) => {}
                _ = token.cancelled() => {}
            }
        }
        ActionStep::PlaceHere { block } => {
            let position = ctx.world().position().await;
            run_skill(ctx, Skill::PlaceBlock { block: block.clone(), position }).await?;
        }
        ActionStep::Skill { skill } => {
            run_skill(ctx, skill.clone()).await?;
        }
    }
    Ok(())
}

/// Run one skill and log its outcome message.
pub async fn run_skill(ctx: &ActionContext, skill: Skill) -> anyhow::Result<bool> {
    let name = skill.name();
    let outcome = ctx.world().run_skill(skill, &ctx.token()).await?;
    debug!(skill = name, success = outcome.success, "Skill finished");
    if let Some(message) = &outcome.message {
        ctx.log(message);
    }
    Ok(outcome.success)
}

/// An action that runs a single skill.
pub fn skill_action(skill: Skill) -> ActionFn {
    action_fn(move |ctx| {
        let skill = skill.clone();
        async move {
            run_skill(&ctx, skill).await?;
            Ok(())
        }
    })
}

/// Place `block` at the current position once the action starts.
pub fn place_here_action(block: String) -> ActionFn {
    action_fn(move |ctx| {
        let block = block.clone();
        async move {
            let position: Position = ctx.world().position().await;
            run_skill(&ctx, Skill::PlaceBlock { block, position }).await?;
            Ok(())
        }
    })
}

/// Parses and persists action scripts under sequence ids.
pub struct ActionStager {
    dir: PathBuf,
    counter: AtomicU64,
}

impl ActionStager {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            counter: AtomicU64::new(0),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub async fn stage(&self, code: &str) -> Result<StagedAction, StagingError> {
        let source = sanitize_code(code);
        let steps = parse_script(source)?;

        let id = self.counter.fetch_add(1, Ordering::SeqCst);
        let path = self.dir.join(format!("{id}.json"));
        let artifact = ActionArtifact {
            id,
            entry: ENTRY_POINT.to_string(),
            source: source.to_string(),
            steps,
            created_at: Utc::now(),
        };

        let write_error = |reason: String| StagingError::Write { path: path.clone(), reason };
        let json = serde_json::to_string_pretty(&artifact).map_err(|e| write_error(e.to_string()))?;
        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| write_error(e.to_string()))?;
        tokio::fs::write(&path, json)
            .await
            .map_err(|e| write_error(e.to_string()))?;

        info!(id, steps = artifact.steps.len(), path = %path.display(), "Action staged");
        Ok(StagedAction {
            id,
            path,
            steps: Arc::new(artifact.steps),
        })
    }
}
