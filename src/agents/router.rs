//! Per-task agent router: an isolation facade over one backend instance.

use crate::agents::backend::{AgentBackend, BackendFactory, Chunk, ChunkKind, ChunkStream};
use crate::config::Settings;
use crate::error::Result;
use futures::StreamExt as _;
use tokio_util::sync::CancellationToken;

/// Provider credentials and backend selection for one agent run.
#[derive(Debug, Clone)]
pub struct AgentSettings {
    pub agent_backend: String,
    pub llm_provider: String,
    pub anthropic_api_key: Option<String>,
    pub anthropic_model: String,
    pub openai_api_key: Option<String>,
    pub openai_model: String,
    pub ollama_host: String,
    pub ollama_model: String,
    /// Task execution is headless; there is no terminal to authorize tools,
    /// so permission prompts are always bypassed.
    pub bypass_permissions: bool,
}

impl AgentSettings {
    /// Clone provider credentials from the base settings, overriding the
    /// backend for the agent that will run.
    pub fn for_task(base: &Settings, backend: &str) -> Self {
        Self {
            agent_backend: backend.to_string(),
            llm_provider: base.llm_provider.clone(),
            anthropic_api_key: base.anthropic_api_key.clone(),
            anthropic_model: base.anthropic_model.clone(),
            openai_api_key: base.openai_api_key.clone(),
            openai_model: base.openai_model.clone(),
            ollama_host: base.ollama_host.clone(),
            ollama_model: base.ollama_model.clone(),
            bypass_permissions: true,
        }
    }
}

/// Exactly one router exists per executing task. Dropping the router (or
/// calling [`AgentRouter::stop`]) cancels the in-flight run.
pub struct AgentRouter {
    backend: Box<dyn AgentBackend>,
    cancel: CancellationToken,
}

impl std::fmt::Debug for AgentRouter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AgentRouter").finish_non_exhaustive()
    }
}

impl AgentRouter {
    pub fn new(settings: &AgentSettings, factory: &dyn BackendFactory) -> Result<Self> {
        let backend = factory.create(settings)?;
        Ok(Self {
            backend,
            cancel: CancellationToken::new(),
        })
    }

    /// Run a prompt and return the chunk stream.
    ///
    /// The stream terminates at the first `done` or `error` chunk, or as
    /// soon as the router is stopped.
    pub async fn run(&self, prompt: &str) -> Result<ChunkStream> {
        let inner = self.backend.run(prompt).await?;
        let cancel = self.cancel.clone();

        let stream = async_stream::stream! {
            let mut inner = inner;
            loop {
                let chunk = tokio::select! {
                    _ = cancel.cancelled() => break,
                    chunk = inner.next() => match chunk {
                        Some(chunk) => chunk,
                        None => break,
                    },
                };

                let terminal = matches!(chunk.kind, ChunkKind::Done | ChunkKind::Error);
                yield chunk;
                if terminal {
                    break;
                }
            }
        };

        Ok(Box::pin(stream) as ChunkStream)
    }

    /// Cancel the in-flight run. Idempotent.
    pub async fn stop(&self) {
        self.cancel.cancel();
        self.backend.stop().await;
    }

    pub fn is_stopped(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agents::backend::testing::scripted_registry;
    use std::time::Duration;

    fn settings() -> AgentSettings {
        AgentSettings::for_task(&Settings::for_dir("/tmp/pocketpaw-router-test"), "native")
    }

    #[tokio::test]
    async fn stream_ends_at_first_done() {
        let registry = scripted_registry(
            vec![
                Chunk::message("part one"),
                Chunk::done(),
                Chunk::message("never seen"),
            ],
            Duration::ZERO,
        );
        let router = AgentRouter::new(&settings(), &registry).expect("router builds");

        let stream = router.run("prompt").await.expect("run starts");
        let chunks: Vec<Chunk> = stream.collect().await;

        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].kind, ChunkKind::Message);
        assert_eq!(chunks[1].kind, ChunkKind::Done);
    }

    #[tokio::test]
    async fn stream_ends_at_first_error() {
        let registry = scripted_registry(
            vec![Chunk::error("backend exploded"), Chunk::message("unreachable")],
            Duration::ZERO,
        );
        let router = AgentRouter::new(&settings(), &registry).expect("router builds");

        let chunks: Vec<Chunk> = router.run("prompt").await.expect("run starts").collect().await;
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].kind, ChunkKind::Error);
    }

    #[tokio::test]
    async fn stop_terminates_a_slow_stream() {
        let registry = scripted_registry(
            vec![Chunk::message("slow"), Chunk::done()],
            Duration::from_secs(30),
        );
        let router = AgentRouter::new(&settings(), &registry).expect("router builds");

        let mut stream = router.run("prompt").await.expect("run starts");
        router.stop().await;
        router.stop().await; // idempotent

        let next = tokio::time::timeout(Duration::from_secs(1), stream.next())
            .await
            .expect("cancelled stream should finish promptly");
        assert!(next.is_none());
        assert!(router.is_stopped());
    }

    #[tokio::test]
    async fn unknown_backend_is_an_error() {
        let registry = scripted_registry(vec![Chunk::done()], Duration::ZERO);
        let mut bad = settings();
        bad.agent_backend = "no_such_backend".into();
        let error = AgentRouter::new(&bad, &registry).expect_err("unknown backend must fail");
        assert!(error.to_string().contains("unknown agent backend"));
    }

    #[test]
    fn task_settings_force_bypass_permissions() {
        let base = Settings::for_dir("/tmp/pocketpaw-router-test");
        assert!(!base.bypass_permissions);
        let task = AgentSettings::for_task(&base, "native");
        assert!(task.bypass_permissions);
        assert_eq!(task.agent_backend, "native");
    }
}
