//! Three-agent classification session.
//!
//! A session binds one provider to each role and runs a fixed round-robin
//! exchange of exactly three turns: Critic answers the task, Checker answers
//! the transcript so far, ReEval answers the transcript so far. The last
//! message is the session's answer. There is no branching and no early stop;
//! the first failing call aborts the session.

use std::sync::Arc;
use std::time::{Duration, Instant};

use reqwest::Client;

use super::error::{SessionError, SessionResult};
use super::roles::AgentRole;
use crate::error::LlmError;
use crate::llm::chat::{build_http_client, ChatCompletionClient, REQUEST_TIMEOUT_SECS};
use crate::llm::pool::AgentConfig;
use crate::llm::{GenerationRequest, LlmProvider, Message};

/// Builds a provider for a pool entry.
pub trait ProviderFactory: Send + Sync {
    fn build(&self, config: &AgentConfig) -> Result<Arc<dyn LlmProvider>, LlmError>;
}

/// Builds [`ChatCompletionClient`]s sharing one HTTP connection pool.
pub struct HttpProviderFactory {
    http_client: Client,
}

impl HttpProviderFactory {
    pub fn new(timeout: Duration) -> Result<Self, LlmError> {
        Ok(Self {
            http_client: build_http_client(timeout)?,
        })
    }

    /// Factory with the default request timeout.
    pub fn with_default_timeout() -> Result<Self, LlmError> {
        Self::new(Duration::from_secs(REQUEST_TIMEOUT_SECS))
    }
}

impl ProviderFactory for HttpProviderFactory {
    fn build(&self, config: &AgentConfig) -> Result<Arc<dyn LlmProvider>, LlmError> {
        Ok(Arc::new(ChatCompletionClient::for_agent(
            self.http_client.clone(),
            config,
        )))
    }
}

/// One agent selected for each role.
#[derive(Debug, Clone)]
pub struct Team {
    pub critic: AgentConfig,
    pub checker: AgentConfig,
    pub re_eval: AgentConfig,
}

impl Team {
    pub fn get(&self, role: AgentRole) -> &AgentConfig {
        match role {
            AgentRole::Critic => &self.critic,
            AgentRole::Checker => &self.checker,
            AgentRole::ReEval => &self.re_eval,
        }
    }

    /// Members in speaking order.
    pub fn members(&self) -> [&AgentConfig; 3] {
        [&self.critic, &self.checker, &self.re_eval]
    }
}

/// Sampling options applied to every turn.
#[derive(Debug, Clone, Copy, Default)]
pub struct SessionSettings {
    pub temperature: Option<f64>,
    pub max_tokens: Option<u32>,
}

/// One message of the exchange.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Turn {
    pub role: AgentRole,
    pub agent: String,
    pub content: String,
}

struct Participant {
    role: AgentRole,
    config: AgentConfig,
    provider: Arc<dyn LlmProvider>,
}

/// A configured three-agent exchange for one row.
pub struct ClassificationSession {
    participants: Vec<Participant>,
    settings: SessionSettings,
}

impl ClassificationSession {
    /// Binds a provider to every team member.
    pub fn new(
        factory: &dyn ProviderFactory,
        team: &Team,
        settings: SessionSettings,
    ) -> SessionResult<Self> {
        let mut participants = Vec::with_capacity(3);
        for role in AgentRole::all() {
            let config = team.get(role).clone();
            let provider = factory.build(&config).map_err(|source| SessionError::Setup {
                agent: config.name.clone(),
                source,
            })?;
            participants.push(Participant {
                role,
                config,
                provider,
            });
        }

        Ok(Self {
            participants,
            settings,
        })
    }

    /// Runs the exchange and returns the final participant's message.
    pub async fn run(&self, task: &str) -> SessionResult<String> {
        let transcript = self.run_transcript(task).await?;
        Ok(transcript
            .last()
            .map(|turn| turn.content.trim().to_string())
            .unwrap_or_default())
    }

    /// Runs the exchange and returns every turn.
    pub async fn run_transcript(&self, task: &str) -> SessionResult<Vec<Turn>> {
        let mut transcript: Vec<Turn> = Vec::with_capacity(self.participants.len());

        for participant in &self.participants {
            let request = self.request_for(participant, task, &transcript);
            let started = Instant::now();

            let response = participant
                .provider
                .generate(request)
                .await
                .map_err(|source| SessionError::Agent {
                    role: participant.role,
                    agent: participant.config.name.clone(),
                    model: participant.config.model.clone(),
                    source,
                })?;

            tracing::debug!(
                role = %participant.role,
                agent = %participant.config.name,
                elapsed_ms = started.elapsed().as_millis() as u64,
                "Agent responded"
            );

            transcript.push(Turn {
                role: participant.role,
                agent: participant.config.name.clone(),
                content: response.content,
            });
        }

        Ok(transcript)
    }

    /// System prompt, the task, then every earlier turn as a user message
    /// tagged with its speaker.
    fn request_for(
        &self,
        participant: &Participant,
        task: &str,
        transcript: &[Turn],
    ) -> GenerationRequest {
        let mut messages = Vec::with_capacity(transcript.len() + 2);
        messages.push(Message::system(participant.role.system_prompt()));
        messages.push(Message::user(task.trim()));
        for turn in transcript {
            messages.push(Message::user(format!(
                "[{}]: {}",
                turn.role.participant_name(),
                turn.content
            )));
        }

        let mut request = GenerationRequest::new(messages);
        if let Some(temperature) = self.settings.temperature {
            request = request.with_temperature(temperature);
        }
        if let Some(max_tokens) = self.settings.max_tokens {
            request = request.with_max_tokens(max_tokens);
        }
        request
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::pool::{Credential, ModelCapabilities};
    use crate::llm::GenerationResponse;
    use async_trait::async_trait;
    use std::sync::Mutex;

    /// Echoes a fixed answer and records the requests it saw.
    struct RecordingProvider {
        answer: String,
        fail: bool,
        seen: Arc<Mutex<Vec<GenerationRequest>>>,
    }

    #[async_trait]
    impl LlmProvider for RecordingProvider {
        async fn generate(
            &self,
            request: GenerationRequest,
        ) -> Result<GenerationResponse, LlmError> {
            self.seen.lock().expect("lock").push(request);
            if self.fail {
                return Err(LlmError::RateLimited("quota exceeded".to_string()));
            }
            Ok(GenerationResponse {
                model: "test".to_string(),
                content: self.answer.clone(),
                usage: None,
            })
        }
    }

    struct RecordingFactory {
        failing_agent: Option<String>,
        seen: Arc<Mutex<Vec<GenerationRequest>>>,
    }

    impl ProviderFactory for RecordingFactory {
        fn build(&self, config: &AgentConfig) -> Result<Arc<dyn LlmProvider>, LlmError> {
            Ok(Arc::new(RecordingProvider {
                answer: format!("  answer from {}  ", config.name),
                fail: self.failing_agent.as_deref() == Some(config.name.as_str()),
                seen: Arc::clone(&self.seen),
            }))
        }
    }

    fn config(role: AgentRole, name: &str) -> AgentConfig {
        AgentConfig {
            role,
            name: name.to_string(),
            model: format!("model-{}", name),
            credential: Credential::inline("key"),
            endpoint: "http://localhost".to_string(),
            capabilities: ModelCapabilities::default(),
        }
    }

    fn team() -> Team {
        Team {
            critic: config(AgentRole::Critic, "c"),
            checker: config(AgentRole::Checker, "k"),
            re_eval: config(AgentRole::ReEval, "r"),
        }
    }

    #[tokio::test]
    async fn test_three_sequential_turns() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let factory = RecordingFactory {
            failing_agent: None,
            seen: Arc::clone(&seen),
        };
        let session =
            ClassificationSession::new(&factory, &team(), SessionSettings::default()).expect("session");

        let transcript = session.run_transcript("classify this").await.expect("run");
        let speakers: Vec<AgentRole> = transcript.iter().map(|t| t.role).collect();
        assert_eq!(
            speakers,
            vec![AgentRole::Critic, AgentRole::Checker, AgentRole::ReEval]
        );

        let requests = seen.lock().expect("lock");
        assert_eq!(requests.len(), 3);
        // Each speaker sees the system prompt, the task, and all earlier turns.
        assert_eq!(requests[0].messages.len(), 2);
        assert_eq!(requests[1].messages.len(), 3);
        assert_eq!(requests[2].messages.len(), 4);
        assert_eq!(requests[0].messages[0].content, AgentRole::Critic.system_prompt());
        assert_eq!(requests[2].messages[1], Message::user("classify this"));
        assert!(requests[2].messages[2].content.starts_with("[Critic_Agent]: "));
        assert!(requests[2].messages[3].content.starts_with("[Checker_Agent]: "));
    }

    #[tokio::test]
    async fn test_run_returns_final_message_trimmed() {
        let factory = RecordingFactory {
            failing_agent: None,
            seen: Arc::new(Mutex::new(Vec::new())),
        };
        let session =
            ClassificationSession::new(&factory, &team(), SessionSettings::default()).expect("session");
        assert_eq!(session.run("task").await.expect("run"), "answer from r");
    }

    #[tokio::test]
    async fn test_failure_aborts_and_names_agent() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let factory = RecordingFactory {
            failing_agent: Some("k".to_string()),
            seen: Arc::clone(&seen),
        };
        let session =
            ClassificationSession::new(&factory, &team(), SessionSettings::default()).expect("session");

        let err = session.run("task").await.unwrap_err();
        assert!(err.is_rate_limited());
        let key = err.implicated_agent().expect("identified");
        assert_eq!(key.role, AgentRole::Checker);
        assert_eq!(key.name, "k");
        // ReEval never ran.
        assert_eq!(seen.lock().expect("lock").len(), 2);
    }

    #[tokio::test]
    async fn test_settings_applied_to_requests() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let factory = RecordingFactory {
            failing_agent: None,
            seen: Arc::clone(&seen),
        };
        let settings = SessionSettings {
            temperature: Some(0.0),
            max_tokens: Some(256),
        };
        let session = ClassificationSession::new(&factory, &team(), settings).expect("session");
        session.run("task").await.expect("run");

        for request in seen.lock().expect("lock").iter() {
            assert_eq!(request.temperature, Some(0.0));
            assert_eq!(request.max_tokens, Some(256));
        }
    }
}
