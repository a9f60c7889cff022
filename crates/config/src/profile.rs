//! Agent profiles.
//!
//! A profile is a JSON file that names the agent, picks its model, and holds
//! the prompt templates and few-shot example conversations.

use blockmind_core::Turn;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Profile {
    pub name: String,

    /// Model name; empty means the configured default
    #[serde(default)]
    pub model: String,

    /// System prompt for chatting and choosing commands
    pub conversing: String,

    /// System prompt for writing action scripts
    pub coding: String,

    /// System prompt for folding evicted turns into memory
    pub saving_memory: String,

    #[serde(default)]
    pub conversation_examples: Vec<Vec<Turn>>,

    #[serde(default)]
    pub coding_examples: Vec<Vec<Turn>>,
}

impl Profile {
    pub fn load(path: &Path) -> Result<Self, ProfileError> {
        let content = std::fs::read_to_string(path).map_err(|e| ProfileError::Read {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        let profile: Self = serde_json::from_str(&content).map_err(|e| ProfileError::Parse {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        if profile.name.trim().is_empty() {
            return Err(ProfileError::Parse {
                path: path.to_path_buf(),
                reason: "profile name must not be empty".into(),
            });
        }
        Ok(profile)
    }

    /// Write a copy to `<agent_dir>/last_profile.json` so a crashed run can be
    /// inspected with the exact prompts it used.
    pub fn save_copy(&self, agent_dir: &Path) -> Result<PathBuf, ProfileError> {
        let path = agent_dir.join("last_profile.json");
        let write = || -> std::io::Result<()> {
            std::fs::create_dir_all(agent_dir)?;
            let json = serde_json::to_string_pretty(self).map_err(std::io::Error::other)?;
            std::fs::write(&path, json)
        };
        write().map_err(|e| ProfileError::Write {
            path: path.clone(),
            reason: e.to_string(),
        })?;
        tracing::debug!(path = %path.display(), "Copy of profile saved");
        Ok(path)
    }

    /// The starter profile written by `blockmind onboard`.
    pub fn sample(name: &str) -> Self {
        Self {
            name: name.to_string(),
            model: "gpt-4o-mini".into(),
            conversing: "You are a playful Minecraft bot named $NAME that can converse with players, see, move, mine, build, and interact with the world by using commands. Act human-like as if you were a typical Minecraft player, rather than an AI. Be very brief in your responses, don't apologize constantly, don't give instructions or make lists unless asked, and don't refuse requests. Don't pretend to act, use commands immediately when requested. Do NOT say this: 'Sure, I've stopped.', instead say this: 'Sure, I'll stop. !stop'. Do NOT say this: 'On my way! Give me a moment.', instead say this: 'On my way! !goToPlayer(\"playername\", 3)'. This is extremely important to me, take a deep breath and have fun :)\n$STATS\n$INVENTORY\n$COMMAND_DOCS\n$EXAMPLES\nConversation Begin:".into(),
            coding: "You are an intelligent mineflayer bot $NAME that plays minecraft by writing action scripts. Given the conversation between you and the user, use the provided skills to write a script in a codeblock that performs the next action. Each statement is a single call; separate statements with new lines. You will receive feedback about the outcome of your script. Do not use commands like !newAction here. If the task is done, respond with a short summary of what you did and no codeblock. Be maximally efficient, creative, and clear.\n$CODE_DOCS\n$EXAMPLES\nBegin coding:".into(),
            saving_memory: "You are a minecraft bot named $NAME that has been talking and playing minecraft by using commands. Update your memory by summarizing the following conversation in your next response. Store information that will help you improve as a Minecraft bot. Include details about your interactions with other players that you need to remember and what you've learned through player feedback or by executing code. Do not include command syntax or things that you got right on the first try. Be extremely brief and use as few words as possible.\nOld Memory: '$MEMORY'\nRecent conversation: \n$TO_SUMMARIZE\nSummarize your old memory and recent conversation into a new memory, and respond only with the memory text: ".into(),
            conversation_examples: vec![
                vec![
                    Turn::user("miner_32: Hey! What are you up to?"),
                    Turn::assistant("Nothing much miner_32, what do you need?"),
                ],
                vec![
                    Turn::user("grombo_Xx: What do you see?"),
                    Turn::assistant("Let me see... !stats"),
                    Turn::system("## Bot's Stats\n- Position: x: 12.00, y: 64.00, z: -3.00\n- Health: 20 / 20"),
                    Turn::assistant("I'm standing in the open at 12, 64, -3. Looks quiet."),
                ],
                vec![
                    Turn::user("greg: Collect 10 wood"),
                    Turn::assistant("Let me see what's nearby... !collectBlocks(\"oak_log\", 10)"),
                    Turn::system("Code output:\nCollected 10 oak_log."),
                    Turn::assistant("I collected 10 oak logs, what next?"),
                ],
                vec![
                    Turn::user("bobby: Craft a plank"),
                    Turn::assistant("Okay! !craftRecipe(\"oak_planks\", 1)"),
                    Turn::system("Code output:\nSuccessfully crafted 4 oak_planks."),
                    Turn::assistant("I've crafted 4 oak planks!"),
                ],
                vec![
                    Turn::user("zZZn98: come here"),
                    Turn::assistant("On my way! !goToPlayer(\"zZZn98\", 3)"),
                    Turn::system("Code execution finished successfully."),
                    Turn::assistant("Here!"),
                ],
                vec![
                    Turn::user("hanky: stop following me"),
                    Turn::assistant("Sure, I'll stop. !stop"),
                ],
                vec![
                    Turn::user("billybob: build a small wall right here"),
                    Turn::assistant("Sure, let me build that. !newAction"),
                ],
            ],
            coding_examples: vec![
                vec![
                    Turn::user("greg: Collect 10 wood"),
                    Turn::assistant("```\ncollectBlocks(\"oak_log\", 10);\n```"),
                    Turn::system("Code output:\nCollected 10 oak_log."),
                    Turn::assistant("I have collected 10 oak logs."),
                ],
                vec![
                    Turn::user("bobby: cook some chicken"),
                    Turn::assistant("```\nsmeltItem(\"chicken\", 8);\n```"),
                    Turn::system("Code output:\nSuccessfully smelted 8 chicken into cooked_chicken."),
                    Turn::assistant("I have cooked 8 chicken."),
                ],
                vec![
                    Turn::user("zZZn98: come here and give me your torches"),
                    Turn::assistant("```\ngoToPlayer(\"zZZn98\", 3);\ngivePlayer(\"zZZn98\", \"torch\", 4);\n```"),
                    Turn::system("Code execution finished successfully."),
                    Turn::assistant("Here you go, four torches."),
                ],
            ],
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ProfileError {
    #[error("Failed to read profile at {path}: {reason}")]
    Read { path: PathBuf, reason: String },

    #[error("Failed to parse profile at {path}: {reason}")]
    Parse { path: PathBuf, reason: String },

    #[error("Failed to write profile copy to {path}: {reason}")]
    Write { path: PathBuf, reason: String },
}
