//! The top-level query orchestrator: one instance per conversation session.

use crate::codegen::{CodeGenerator, CodegenAnswer};
use crate::context;
use crate::data::TableStore;
use crate::error::LlmError;
use crate::history::ConversationHistory;
use crate::intent::{self, Intent};
use crate::llm::LlmBackend;
use crate::prompts;
use crate::viz::Chart;
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use tracing::warn;

pub const LLM_UNAVAILABLE_MESSAGE: &str =
    "LLM is not available. Please ensure the LlamaStack server is running and configured correctly.";

#[derive(Debug, Clone, Serialize)]
pub enum QueryAnswer {
    Text(String),
    CodeGen(CodegenAnswer),
}

impl fmt::Display for QueryAnswer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QueryAnswer::Text(s) => write!(f, "{s}"),
            QueryAnswer::CodeGen(answer) => write!(f, "{answer}"),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ConversationSummary {
    pub message_count: usize,
    pub session_duration: String,
    pub session_start: String,
    pub model: String,
}

/// Routes a question through classification, context building, code
/// generation and the narrative fallback, then records the exchange.
/// Owns the session's conversation memory and the availability probe
/// result; never share one agent across sessions.
pub struct QueryAgent {
    store: TableStore,
    backend: Arc<dyn LlmBackend>,
    codegen: CodeGenerator,
    history: ConversationHistory,
    llm_available: bool,
    model: String,
}

impl QueryAgent {
    /// Probes the backend once; an unavailable backend short-circuits every
    /// later query to a fixed message.
    pub async fn new(
        store: TableStore,
        backend: Arc<dyn LlmBackend>,
        model: impl Into<String>,
    ) -> Self {
        let llm_available = backend.probe().await;
        if !llm_available {
            warn!("LLM backend unavailable; queries will be refused");
        }
        let codegen = CodeGenerator::new(Arc::clone(&backend), store.clone());
        Self {
            store,
            backend,
            codegen,
            history: ConversationHistory::default(),
            llm_available,
            model: model.into(),
        }
    }

    pub fn llm_available(&self) -> bool {
        self.llm_available
    }

    #[tracing::instrument(skip_all, fields(question = %question))]
    pub async fn query(
        &mut self,
        question: &str,
        use_code_gen: Option<bool>,
    ) -> (QueryAnswer, Option<Chart>) {
        if !self.llm_available {
            return (QueryAnswer::Text(LLM_UNAVAILABLE_MESSAGE.into()), None);
        }

        if use_code_gen.unwrap_or(true) {
            match self.codegen.query_with_code_generation(question).await {
                Ok((answer, chart)) => {
                    if answer.success {
                        self.history.push_exchange(question, &answer.analysis);
                    }
                    return (QueryAnswer::CodeGen(answer), chart);
                }
                Err(err) => {
                    warn!(error = %err, "code generation failed, falling back to narrative path");
                }
            }
        }

        (QueryAnswer::Text(self.query_with_llm(question).await), None)
    }

    /// Narrative-only path: classify, summarize, complete with history.
    async fn query_with_llm(&mut self, question: &str) -> String {
        let intent = intent::classify(question);
        let data_summary = context::build_data_summary(&self.store, intent);
        let system = match prompts::intent_system_message(intent) {
            Some(s) => s.to_string(),
            None => prompts::build_system_prompt(&context::build_context(&self.store)),
        };
        let user = format!("Question: {question}\n\nAvailable Data Summary:\n{data_summary}");
        let messages = self.history.build_messages(Some(&system), &user);

        match self.backend.chat_completion(&messages, 0.3, 1500).await {
            Ok(response) => {
                self.history.push_exchange(question, &response);
                format!("**Query Type:** {intent}\n\n{response}")
            }
            Err(err) => self.fallback_answer(intent, &err),
        }
    }

    /// Last resort: deterministic summary assembled from the store alone.
    /// Not recorded in history.
    fn fallback_answer(&self, intent: Intent, err: &LlmError) -> String {
        let mut out = format!("Error with LLM query: {err}\n\nFalling back to simple analysis...\n\n");
        let summary = context::build_data_summary(&self.store, intent);
        if summary.is_empty() {
            out.push_str("No datasets are loaded.");
        } else {
            out.push_str(&summary);
        }
        if intent == Intent::Anomaly {
            let anomalies = context::detect_anomalies(&self.store, 1.5);
            if !anomalies.is_empty() {
                out.push_str("\n**Detected Anomalies:**\n");
                for a in anomalies {
                    out.push_str(&format!("- {}\n", a.message));
                }
            }
        }
        out
    }

    pub fn clear_conversation(&mut self) {
        self.history.clear();
    }

    pub fn undo_last_query(&mut self) -> bool {
        self.history.undo_last_exchange()
    }

    pub fn conversation_summary(&self) -> Option<ConversationSummary> {
        if !self.llm_available {
            return None;
        }
        let s = self.history.summary();
        Some(ConversationSummary {
            message_count: s.message_count,
            session_duration: format_duration(s.session_duration),
            session_start: s.session_start.format("%Y-%m-%d %H:%M:%S").to_string(),
            model: self.model.clone(),
        })
    }
}

fn format_duration(d: chrono::Duration) -> String {
    let secs = d.num_seconds().max(0);
    format!("{:02}:{:02}:{:02}", secs / 3600, (secs % 3600) / 60, secs % 60)
}
