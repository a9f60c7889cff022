//! The task executor ("coder").
//!
//! Runs one action at a time under a cooperative cancellation contract:
//! every action gets a fresh [`CancellationToken`], `stop()` cancels it and
//! asks the world to abort whatever it is doing, and an optional watchdog
//! turns a long-running action into a timeout. An action that cannot be
//! stopped within a bounded window tears the process down through the
//! [`Terminator`].
//!
//! The executor also drives the code-writing loop behind `!newAction` and
//! remembers a resumable task that is restarted whenever the agent goes idle.

use crate::action::ActionStager;
use crate::history::History;
use crate::prompter::Prompter;
use blockmind_config::ExecutorConfig;
use blockmind_core::error::{StagingError, WorldError};
use blockmind_core::event::{AgentEvent, EventBus};
use blockmind_core::lifecycle::Terminator;
use blockmind_core::message::Turn;
use blockmind_core::world::World;
use chrono::Utc;
use futures::future::BoxFuture;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex as StdMutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::{Instant, sleep};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Returned by the code loop when the model keeps answering without code.
pub const NO_CODE_FAILURE: &str = "Action failed, agent would not write code.";

const NO_CODE_PROMPT: &str = "Error: no code provided. Write code in codeblock in your response. ``` // example ```";

const NEW_ACTION: &str = "!newAction";

/// A runnable action body.
pub type ActionFn = Arc<dyn Fn(ActionContext) -> BoxFuture<'static, anyhow::Result<()>> + Send + Sync>;

/// Box an async closure as an [`ActionFn`].
pub fn action_fn<F, Fut>(f: F) -> ActionFn
where
    F: Fn(ActionContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
{
    Arc::new(move |ctx| Box::pin(f(ctx)))
}

fn lock<T>(mutex: &StdMutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// What a running action can see: the world, its cancellation token, and
/// the output buffer reported back to the model.
#[derive(Clone)]
pub struct ActionContext {
    world: Arc<dyn World>,
    token: CancellationToken,
    output: Arc<StdMutex<String>>,
}

impl ActionContext {
    pub fn world(&self) -> &dyn World {
        self.world.as_ref()
    }

    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    pub fn is_interrupted(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Append a line to the action's output.
    pub fn log(&self, text: &str) {
        let mut output = lock(&self.output);
        output.push_str(text);
        output.push('\n');
    }

    pub async fn chat(&self, text: &str) -> Result<(), WorldError> {
        self.world.chat(text).await
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecutionResult {
    pub success: bool,
    /// Output reported to the model; empty when there is nothing to say
    pub message: String,
    pub interrupted: bool,
    pub timed_out: bool,
}

impl ExecutionResult {
    /// Nothing ran.
    pub fn noop() -> Self {
        Self::default()
    }

    fn interrupted() -> Self {
        Self {
            success: true,
            interrupted: true,
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutorState {
    Idle,
    Executing,
    StoppingOnInterrupt,
    Generating,
}

/// A task restarted whenever the agent becomes idle, e.g. following a player.
#[derive(Clone)]
pub struct ResumableTask {
    pub name: String,
    pub func: ActionFn,
    /// 0 disables the watchdog
    pub timeout_minutes: u64,
}

impl ResumableTask {
    pub fn new(name: impl Into<String>, func: ActionFn, timeout_minutes: u64) -> Self {
        Self {
            name: name.into(),
            func,
            timeout_minutes,
        }
    }
}

impl std::fmt::Debug for ResumableTask {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResumableTask")
            .field("name", &self.name)
            .field("timeout_minutes", &self.timeout_minutes)
            .finish_non_exhaustive()
    }
}

enum RunEnd {
    Finished(anyhow::Result<()>),
    /// The watchdog gave up on a wedged action and dropped it.
    Abandoned,
}

pub struct Executor {
    agent_name: String,
    world: Arc<dyn World>,
    prompter: Arc<Prompter>,
    history: Arc<Mutex<History>>,
    stager: ActionStager,
    events: Arc<EventBus>,
    terminator: Arc<dyn Terminator>,
    settings: ExecutorConfig,

    executing: AtomicBool,
    generating: AtomicBool,
    stopping: AtomicBool,
    timed_out: AtomicBool,
    interruptible: AtomicBool,

    cancel: StdMutex<CancellationToken>,
    generation_cancel: StdMutex<CancellationToken>,
    output: Arc<StdMutex<String>>,
    resume: StdMutex<Option<ResumableTask>>,
}

impl Executor {
    pub fn new(
        agent_name: impl Into<String>,
        world: Arc<dyn World>,
        prompter: Arc<Prompter>,
        history: Arc<Mutex<History>>,
        events: Arc<EventBus>,
        terminator: Arc<dyn Terminator>,
    ) -> Self {
        let agent_name = agent_name.into();
        let stager = ActionStager::new(
            std::path::PathBuf::from("bots")
                .join(&agent_name)
                .join("action-code"),
        );
        Self {
            agent_name,
            world,
            prompter,
            history,
            stager,
            events,
            terminator,
            settings: ExecutorConfig::default(),
            executing: AtomicBool::new(false),
            generating: AtomicBool::new(false),
            stopping: AtomicBool::new(false),
            timed_out: AtomicBool::new(false),
            interruptible: AtomicBool::new(false),
            cancel: StdMutex::new(CancellationToken::new()),
            generation_cancel: StdMutex::new(CancellationToken::new()),
            output: Arc::new(StdMutex::new(String::new())),
            resume: StdMutex::new(None),
        }
    }

    pub fn with_stager(mut self, stager: ActionStager) -> Self {
        self.stager = stager;
        self
    }

    pub fn with_settings(mut self, settings: ExecutorConfig) -> Self {
        self.settings = settings;
        self
    }

    pub fn settings(&self) -> &ExecutorConfig {
        &self.settings
    }

    pub fn is_executing(&self) -> bool {
        self.executing.load(Ordering::SeqCst)
    }

    pub fn is_generating(&self) -> bool {
        self.generating.load(Ordering::SeqCst)
    }

    /// No action running and no code being written.
    pub fn is_idle(&self) -> bool {
        !self.is_executing() && !self.is_generating()
    }

    /// Whether the running action is a resumed task that behaviors may preempt.
    pub fn is_interruptible(&self) -> bool {
        self.interruptible.load(Ordering::SeqCst)
    }

    pub fn is_interrupt_requested(&self) -> bool {
        lock(&self.cancel).is_cancelled()
    }

    pub fn resume_name(&self) -> Option<String> {
        lock(&self.resume).as_ref().map(|t| t.name.clone())
    }

    pub fn state(&self) -> ExecutorState {
        if self.is_executing() {
            if self.stopping.load(Ordering::SeqCst) {
                ExecutorState::StoppingOnInterrupt
            } else {
                ExecutorState::Executing
            }
        } else if self.is_generating() {
            ExecutorState::Generating
        } else {
            ExecutorState::Idle
        }
    }

    /// Reset the output buffer, the interrupt token and the timeout flag.
    pub fn clear(&self) {
        lock(&self.output).clear();
        *lock(&self.cancel) = CancellationToken::new();
        self.timed_out.store(false, Ordering::SeqCst);
    }

    pub fn cancel_resume(&self) {
        if let Some(task) = lock(&self.resume).take() {
            debug!(task = %task.name, "Resumable task cancelled");
        }
    }

    /// Run `func`, stopping whatever ran before. `timeout_minutes == 0`
    /// disables the watchdog.
    pub async fn execute(&self, func: ActionFn, timeout_minutes: u64) -> ExecutionResult {
        loop {
            self.stop_execution().await;
            if self
                .executing
                .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
                .is_ok()
            {
                break;
            }
        }
        self.clear();

        let token = lock(&self.cancel).clone();
        let ctx = ActionContext {
            world: self.world.clone(),
            token: token.clone(),
            output: self.output.clone(),
        };
        debug!(timeout_minutes, "Executing action");

        let end = self.run_with_watchdog(func(ctx), timeout_minutes).await;

        let interrupted = token.is_cancelled();
        let timed_out = self.timed_out.load(Ordering::SeqCst);
        let result = match end {
            RunEnd::Finished(Ok(())) => ExecutionResult {
                success: true,
                message: self.format_output(interrupted, timed_out),
                interrupted,
                timed_out,
            },
            RunEnd::Finished(Err(e)) => {
                warn!(error = %e, "Action threw an error");
                self.cancel_resume();
                self.halt_world().await;
                ExecutionResult {
                    success: false,
                    message: format!(
                        "{}!!Code threw exception!!  Error: {e}",
                        self.format_output(interrupted, timed_out)
                    ),
                    interrupted,
                    timed_out: false,
                }
            }
            RunEnd::Abandoned => ExecutionResult {
                success: false,
                message: self.format_output(interrupted, timed_out),
                interrupted,
                timed_out,
            },
        };

        self.clear();
        self.executing.store(false, Ordering::SeqCst);

        self.events.publish(AgentEvent::ActionFinished {
            success: result.success,
            interrupted: result.interrupted,
            timed_out: result.timed_out,
            timestamp: Utc::now(),
        });
        if !result.interrupted && !self.is_generating() {
            self.events.publish(AgentEvent::idle());
        }
        result
    }

    async fn run_with_watchdog(
        &self,
        mut run: BoxFuture<'static, anyhow::Result<()>>,
        timeout_minutes: u64,
    ) -> RunEnd {
        if timeout_minutes == 0 {
            return RunEnd::Finished(run.await);
        }

        tokio::select! {
            res = &mut run => return RunEnd::Finished(res),
            _ = sleep(Duration::from_secs(timeout_minutes * 60)) => {}
        }

        warn!(timeout_minutes, "Action timed out, attempting force stop");
        self.timed_out.store(true, Ordering::SeqCst);
        lock(&self.output).push_str(&format!(
            "\nAction performed for {timeout_minutes} minutes and then timed out and stopped. You may want to continue or do something else."
        ));
        self.request_stop().await;

        tokio::select! {
            res = &mut run => {
                info!("Timed out action stopped");
                RunEnd::Finished(res)
            }
            _ = sleep(Duration::from_secs(self.settings.watchdog_grace_secs)) => {
                self.escalate().await;
                RunEnd::Abandoned
            }
        }
    }

    /// The watchdog could not stop the action: record why and terminate.
    async fn escalate(&self) {
        error!("Failed to stop timed out action, killing process");
        lock(&self.output)
            .push_str("\nForce stop failed! Process was killed and will be restarted. Goodbye world.");
        if let Err(e) = self.world.chat("Goodbye world.").await {
            warn!(error = %e, "Could not say goodbye");
        }
        let output = self.format_output(true, true);
        {
            let mut history = self.history.lock().await;
            history.add("system", &output).await;
            if let Err(e) = history.save().await {
                warn!(error = %e, "Failed to save history before termination");
            }
        }
        self.terminator.terminate("timed out action could not be stopped");
    }

    fn format_output(&self, interrupted: bool, timed_out: bool) -> String {
        if interrupted && !timed_out {
            return String::new();
        }
        format_output(&lock(&self.output), self.settings.max_output_chars)
    }

    /// Cancel the current action's token and abort in-flight world activity.
    async fn request_stop(&self) {
        lock(&self.cancel).cancel();
        self.halt_world().await;
    }

    async fn halt_world(&self) {
        self.world.stop_collection().await;
        self.world.stop_movement().await;
        self.world.stop_combat().await;
    }

    /// Stop the running action and any code generation in progress.
    pub async fn stop(&self) {
        lock(&self.generation_cancel).cancel();
        self.stop_execution().await;
    }

    /// Block until no action is executing, terminating the process if that
    /// takes longer than the stop ceiling.
    async fn stop_execution(&self) {
        if !self.is_executing() {
            return;
        }
        let start = Instant::now();
        let ceiling = Duration::from_secs(self.settings.stop_ceiling_secs);
        let poll = Duration::from_millis(self.settings.stop_poll_ms);

        self.stopping.store(true, Ordering::SeqCst);
        while self.is_executing() {
            self.request_stop().await;
            debug!("Waiting for action to finish executing...");
            sleep(poll).await;
            if start.elapsed() > ceiling {
                error!(ceiling_secs = self.settings.stop_ceiling_secs, "Action did not stop, killing process");
                self.terminator.terminate("failed to stop executing action");
                break;
            }
        }
        self.stopping.store(false, Ordering::SeqCst);
    }

    /// Remember `task` (if given) and run the remembered task when idle.
    ///
    /// Without a remembered task, or while busy, this does nothing.
    pub async fn execute_resume(&self, task: Option<ResumableTask>) -> ExecutionResult {
        if let Some(task) = task {
            *lock(&self.resume) = Some(task);
        }
        let Some(task) = lock(&self.resume).clone() else {
            return ExecutionResult::noop();
        };
        if !self.is_idle() {
            return ExecutionResult::noop();
        }

        info!(task = %task.name, "Resuming task");
        self.interruptible.store(true, Ordering::SeqCst);
        let result = self.execute(task.func.clone(), task.timeout_minutes).await;
        self.interruptible.store(false, Ordering::SeqCst);
        result
    }

    /// Let the model write and run action scripts until it is satisfied.
    ///
    /// Returns the message to report back, if any.
    pub async fn generate_code(&self) -> Option<String> {
        Some(self.generate().await.message).filter(|m| !m.is_empty())
    }

    /// The full outcome of the code-writing loop. Running out of iterations
    /// is reported as a timeout.
    pub async fn generate(&self) -> ExecutionResult {
        let token = CancellationToken::new();
        *lock(&self.generation_cancel) = token.clone();

        self.stop_execution().await;
        self.generating.store(true, Ordering::SeqCst);
        let result = self.generate_code_loop(&token).await;
        self.generating.store(false, Ordering::SeqCst);

        if !result.interrupted {
            self.events.publish(AgentEvent::idle());
        }
        result
    }

    async fn generate_code_loop(&self, token: &CancellationToken) -> ExecutionResult {
        let mut messages = self.history.lock().await.turns();
        let mut code_return: Option<ExecutionResult> = None;
        let mut failures = 0;

        for _ in 0..self.settings.max_code_iterations {
            if token.is_cancelled() {
                return ExecutionResult::interrupted();
            }
            let reply = self.prompter.prompt_coding(&messages).await;
            if token.is_cancelled() {
                return ExecutionResult::interrupted();
            }

            let Some(code) = extract_code(&reply) else {
                if let Some(idx) = reply.find(NEW_ACTION) {
                    messages.push(Turn::assistant(&reply[..idx]));
                    continue;
                }
                if let Some(previous) = &code_return {
                    {
                        let mut history = self.history.lock().await;
                        history.add("system", &previous.message).await;
                        history.add(&self.agent_name, &reply).await;
                    }
                    if let Err(e) = self.world.chat(&reply).await {
                        warn!(error = %e, "Failed to send chat");
                    }
                    return ExecutionResult {
                        success: true,
                        ..ExecutionResult::default()
                    };
                }
                if failures >= 1 {
                    return ExecutionResult {
                        success: false,
                        message: NO_CODE_FAILURE.to_string(),
                        ..ExecutionResult::default()
                    };
                }
                messages.push(Turn::system(NO_CODE_PROMPT));
                failures += 1;
                continue;
            };

            let staged = match self.stager.stage(code).await {
                Ok(staged) => staged,
                Err(e @ StagingError::Parse { .. }) => {
                    info!(error = %e, "Generated script did not parse");
                    messages.push(Turn::assistant(&reply));
                    messages.push(Turn::system(format!("Failed to parse action script: {e}")));
                    continue;
                }
                Err(e) => {
                    error!(error = %e, "Failed to stage code");
                    self.history
                        .lock()
                        .await
                        .add("system", "Failed to stage code, something is wrong.")
                        .await;
                    return ExecutionResult::noop();
                }
            };

            let result = self
                .execute(staged.entry(), self.settings.default_timeout_minutes)
                .await;
            if result.interrupted && !result.timed_out {
                return ExecutionResult {
                    success: false,
                    interrupted: true,
                    ..ExecutionResult::default()
                };
            }
            info!(action = staged.id(), success = result.success, "Code generation step finished");

            messages.push(Turn::assistant(&reply));
            messages.push(Turn::system(&result.message));
            code_return = Some(result);
        }

        ExecutionResult {
            timed_out: true,
            ..ExecutionResult::default()
        }
    }

    #[cfg(test)]
    pub(crate) fn pending_output(&self) -> String {
        lock(&self.output).clone()
    }
}

/// The text between the first and last code fence.
fn extract_code(reply: &str) -> Option<&str> {
    let start = reply.find("```")?;
    let end = reply.rfind("```").filter(|&end| end > start);
    Some(match end {
        Some(end) => &reply[start + 3..end],
        None => &reply[start + 3..],
    })
}

/// Render action output for the model, shortening it to `max_chars` with a
/// head and a tail.
pub fn format_output(output: &str, max_chars: usize) -> String {
    let len = output.chars().count();
    if len <= max_chars {
        return format!("Code output:\n{output}");
    }
    let half = max_chars / 2;
    let head: String = output.chars().take(half).collect();
    let tail: String = output.chars().skip(len - half).collect();
    format!(
        "Code output is very long ({len} chars) and has been shortened.\nFirst outputs:\n{head}\n...skipping many lines.\nFinal outputs:\n{tail}"
    )
}
