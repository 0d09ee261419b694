use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::task::JoinHandle;

use crate::actions::ActionVocabulary;
use crate::agent_engine::context::ConversationWindow;
use crate::agent_engine::history::{HistoryEntry, SessionHistory};
use crate::agent_engine::loop_control::RecoveryPolicy;
use crate::agent_engine::state::{AgentState, AgentStatus};
use crate::config::{AgentConfig, CaptureMode};
use crate::errors::{PilotError, PilotResult};
use crate::llm::prompt;
use crate::llm::provider::{DecisionService, InferenceRequest};
use crate::supervisor::ConnectionSupervisor;

/// Timing and context knobs of the loop, resolved from `[agent]`.
#[derive(Debug, Clone)]
pub struct AgentSettings {
    pub instruction: String,
    pub action_delay: Duration,
    pub screenshot_delay: Duration,
    pub capture_mode: CaptureMode,
    pub max_turns: usize,
    pub history_images: usize,
    pub error_backoff: Duration,
    pub reconnect_backoff: Duration,
    pub record_history: bool,
}

impl From<&AgentConfig> for AgentSettings {
    fn from(config: &AgentConfig) -> Self {
        Self {
            instruction: config.instruction.clone(),
            action_delay: Duration::from_millis(config.action_delay_ms),
            screenshot_delay: Duration::from_millis(config.screenshot_delay_ms),
            capture_mode: config.capture_mode,
            max_turns: config.max_turns,
            history_images: config.history_images,
            error_backoff: Duration::from_millis(config.error_backoff_ms),
            reconnect_backoff: Duration::from_millis(config.reconnect_backoff_ms),
            record_history: config.record_history,
        }
    }
}

impl Default for AgentSettings {
    fn default() -> Self {
        Self::from(&AgentConfig::default())
    }
}

/// Observe → decide → act loop over the supervised surface.
pub struct AgentLoop {
    supervisor: Arc<ConnectionSupervisor>,
    decision: Arc<dyn DecisionService>,
    settings: AgentSettings,
    running: AtomicBool,
    /// Also serializes `start` calls.
    task: Mutex<Option<JoinHandle<()>>>,
    iterations: AtomicU64,
    last_error: StdMutex<Option<String>>,
}

impl AgentLoop {
    pub fn new(
        supervisor: Arc<ConnectionSupervisor>,
        decision: Arc<dyn DecisionService>,
        settings: AgentSettings,
    ) -> Self {
        Self {
            supervisor,
            decision,
            settings,
            running: AtomicBool::new(false),
            task: Mutex::new(None),
            iterations: AtomicU64::new(0),
            last_error: StdMutex::new(None),
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Connect and spawn the loop. A no-op while already running.
    pub async fn start(self: &Arc<Self>) -> PilotResult<()> {
        let mut task = self.task.lock().await;
        if self.is_running() {
            return Ok(());
        }

        // A previous run may still be finishing its last iteration.
        if let Some(previous) = task.take() {
            if let Err(e) = previous.await {
                tracing::warn!(error = %e, "previous agent loop ended abnormally");
            }
        }

        if let Err(e) = self.supervisor.acquire().await {
            tracing::error!(error = %e, "agent start failed: surface unavailable");
            self.set_last_error(Some(e.to_string()));
            return Err(e);
        }

        self.running.store(true, Ordering::SeqCst);
        self.iterations.store(0, Ordering::SeqCst);
        self.set_last_error(None);
        *task = Some(tokio::spawn(Arc::clone(self).run()));
        tracing::info!(
            surface = ?self.supervisor.kind(),
            decision_service = %self.decision.name(),
            "agent loop started"
        );
        Ok(())
    }

    /// Start after `delay`, retrying every `retry` until the loop is running.
    pub async fn autostart(self: Arc<Self>, delay: Duration, retry: Duration) {
        tokio::time::sleep(delay).await;
        loop {
            if self.is_running() {
                return;
            }
            match self.start().await {
                Ok(()) => {
                    tracing::info!("agent autostarted");
                    return;
                }
                Err(e) => tracing::warn!(
                    error = %e,
                    retry_ms = retry.as_millis() as u64,
                    "autostart failed, retrying"
                ),
            }
            tokio::time::sleep(retry).await;
        }
    }

    /// Ask the loop to stop after the current step. Returns whether it was running.
    pub fn stop(&self) -> bool {
        let was_running = self.running.swap(false, Ordering::SeqCst);
        if was_running {
            tracing::info!("agent stop requested");
        }
        was_running
    }

    /// Wait for a stopped loop to release the surface.
    pub async fn join(&self) {
        let handle = self.task.lock().await.take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                tracing::warn!(error = %e, "agent loop ended abnormally");
            }
        }
    }

    pub fn status(&self) -> AgentStatus {
        let running = self.is_running();
        AgentStatus {
            state: if running {
                AgentState::Running
            } else {
                AgentState::Stopped
            },
            running,
            surface: self.supervisor.kind(),
            iterations: self.iterations.load(Ordering::SeqCst),
            last_error: self.last_error_snapshot(),
        }
    }

    fn set_last_error(&self, error: Option<String>) {
        let mut slot = self.last_error.lock().unwrap_or_else(|p| p.into_inner());
        *slot = error;
    }

    fn last_error_snapshot(&self) -> Option<String> {
        self.last_error
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .clone()
    }

    async fn run(self: Arc<Self>) {
        let vocab = self.supervisor.vocabulary();
        let schema = vocab.json_schema();
        let mut window = ConversationWindow::new(
            prompt::system_prompt(&vocab, &self.settings.instruction),
            self.settings.max_turns,
            self.settings.history_images,
        );
        let mut policy =
            RecoveryPolicy::new(self.settings.error_backoff, self.settings.reconnect_backoff);
        let history = self.settings.record_history.then(SessionHistory::new);
        if let Some(history) = &history {
            tracing::info!(session = %history.session_id, path = %history.path().display(), "recording session history");
        }

        let mut iteration = 0u64;
        while self.is_running() {
            iteration += 1;
            self.iterations.store(iteration, Ordering::SeqCst);
            let mut entry = HistoryEntry::new(iteration);

            match self.step(&vocab, &schema, &mut window, &mut entry).await {
                Ok(Some(executed)) => {
                    tracing::info!(iteration, actions = executed, "iteration complete");
                }
                Ok(None) => {}
                Err(e) => {
                    tracing::warn!(iteration, error = %e, "iteration failed");
                    entry.error = Some(e.to_string());
                    self.set_last_error(Some(e.to_string()));

                    tokio::time::sleep(policy.error_backoff()).await;
                    if self.is_running() && !self.supervisor.is_connected().await {
                        self.reconnect(&mut window, &mut policy).await;
                    }
                }
            }

            if let Some(history) = &history {
                if let Err(e) = history.append(&entry) {
                    tracing::debug!(error = %e, "history append failed");
                }
            }
        }

        self.supervisor.release().await;
        tracing::info!(iterations = iteration, "agent loop stopped");
    }

    /// One observe/decide/act pass. `Ok(None)` means the loop was stopped
    /// before anything was executed.
    async fn step(
        &self,
        vocab: &ActionVocabulary,
        schema: &serde_json::Value,
        window: &mut ConversationWindow,
        entry: &mut HistoryEntry,
    ) -> PilotResult<Option<usize>> {
        tokio::time::sleep(self.settings.screenshot_delay).await;
        if !self.is_running() {
            return Ok(None);
        }

        let frame = match self.settings.capture_mode {
            CaptureMode::Live => self.supervisor.capture_for_agent().await?,
            CaptureMode::Cached => self
                .supervisor
                .latest_frame()
                .ok_or_else(|| PilotError::Capture("no cached frame yet".into()))?,
        };

        let request = InferenceRequest {
            image_png: frame.png.clone(),
            context: window.messages(),
            response_schema: schema.clone(),
        };
        let content = self.decision.infer(request).await?;
        entry.decision = Some(content.clone());

        let response = vocab.parse_response(&content)?;
        window.record(frame.png.clone(), content);
        entry.actions = response.actions.clone();

        if !self.is_running() {
            return Ok(None);
        }

        tracing::debug!(
            frame_sequence = frame.sequence,
            actions = response.actions.len(),
            "executing decision"
        );
        for (i, action) in response.actions.iter().enumerate() {
            if i > 0 {
                tokio::time::sleep(self.settings.action_delay).await;
            }
            self.supervisor.execute(action).await?;
        }
        Ok(Some(response.actions.len()))
    }

    async fn reconnect(&self, window: &mut ConversationWindow, policy: &mut RecoveryPolicy) {
        tracing::info!("surface disconnected, reconnecting");
        match self.supervisor.acquire().await {
            Ok(_) => {
                policy.record_reconnect_success();
                window.reset();
                tracing::info!("surface reconnected, conversation reset");
            }
            Err(e) => {
                tracing::warn!(error = %e, "reconnect failed");
                if let Some(pause) = policy.record_reconnect_failure() {
                    tokio::time::sleep(pause).await;
                }
            }
        }
    }
}
