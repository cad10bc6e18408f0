//! End-to-end pipeline scenarios with a scripted LLM backend.

use async_trait::async_trait;
use insight_core::agent::{QueryAgent, QueryAnswer, LLM_UNAVAILABLE_MESSAGE};
use insight_core::data::{DataTable, TableStore, Value};
use insight_core::error::LlmError;
use insight_core::history::ChatMessage;
use insight_core::llm::LlmBackend;
use insight_core::viz::ChartKind;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// Canned-reply backend; `None` entries simulate a backend error.
struct ScriptedLlm {
    replies: Mutex<VecDeque<Option<String>>>,
    calls: AtomicUsize,
    available: bool,
}

impl ScriptedLlm {
    fn new(available: bool, replies: Vec<Option<String>>) -> Self {
        Self {
            replies: Mutex::new(replies.into()),
            calls: AtomicUsize::new(0),
            available,
        }
    }

    fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl LlmBackend for ScriptedLlm {
    async fn chat_completion(
        &self,
        _messages: &[ChatMessage],
        _temperature: f32,
        _max_tokens: u32,
    ) -> Result<String, LlmError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match self.replies.lock().unwrap().pop_front() {
            Some(Some(reply)) => Ok(reply),
            _ => Err(LlmError::Malformed("script exhausted".into())),
        }
    }

    async fn probe(&self) -> bool {
        self.available
    }
}

fn retail_store() -> TableStore {
    let tx = DataTable {
        columns: vec![
            "Date".into(),
            "StoreID".into(),
            "TotalPrice".into(),
        ],
        rows: vec![
            vec![Value::Text("2024-01-02".into()), Value::Text("A".into()), Value::Float(35000.0)],
            vec![Value::Text("2024-01-03".into()), Value::Text("A".into()), Value::Float(25000.0)],
            vec![Value::Text("2024-01-03".into()), Value::Text("B".into()), Value::Float(30000.0)],
        ],
    };
    TableStore {
        store_transactions: Some(Arc::new(tx)),
        ..Default::default()
    }
}

const REVENUE_SQL_REPLY: &str = "```sql\nCREATE TABLE result AS\nSELECT StoreID, sum(TotalPrice) AS revenue\nFROM store_transactions\nGROUP BY StoreID\nHAVING revenue > 50000\nORDER BY revenue DESC;\n```";

#[tokio::test]
async fn revenue_threshold_question_selects_only_store_a() {
    let backend = Arc::new(ScriptedLlm::new(
        true,
        vec![
            Some(REVENUE_SQL_REPLY.into()),
            Some("Store A clears the $50,000 bar with $60,000 in revenue.".into()),
        ],
    ));
    let mut agent = QueryAgent::new(retail_store(), Arc::clone(&backend) as _, "test-model").await;

    let (answer, chart) = agent
        .query("Which stores have revenue above $50,000?", None)
        .await;

    let bundle = match answer {
        QueryAnswer::CodeGen(bundle) => bundle,
        other => panic!("expected codegen answer, got {other:?}"),
    };
    assert!(bundle.success);
    assert_eq!(bundle.result_type, "series");
    assert!(bundle.analysis.contains("Store A"));
    assert!(bundle.code.contains("HAVING revenue > 50000"));

    // One qualifying store: a short, untruncated bar chart.
    let chart = chart.expect("chart selected");
    assert_eq!(chart.kind, ChartKind::Bar);
    let values = chart.spec["data"]["values"].as_array().unwrap();
    assert_eq!(values.len(), 1);
    assert_eq!(values[0]["category"], "A");
    assert_eq!(values[0]["revenue"], 60000.0);

    // generation + analysis, nothing else
    assert_eq!(backend.call_count(), 2);
}

#[tokio::test]
async fn failed_probe_short_circuits_with_zero_llm_calls() {
    let backend = Arc::new(ScriptedLlm::new(false, vec![]));
    let mut agent = QueryAgent::new(retail_store(), Arc::clone(&backend) as _, "test-model").await;

    let (answer, chart) = agent.query("How are sales?", None).await;
    assert_eq!(answer.to_string(), LLM_UNAVAILABLE_MESSAGE);
    assert!(chart.is_none());
    assert_eq!(backend.call_count(), 0);
}

#[tokio::test]
async fn undo_after_two_queries_leaves_one_exchange() {
    let backend = Arc::new(ScriptedLlm::new(
        true,
        vec![
            Some(REVENUE_SQL_REPLY.into()),
            Some("First analysis.".into()),
            Some(REVENUE_SQL_REPLY.into()),
            Some("Second analysis.".into()),
        ],
    ));
    let mut agent = QueryAgent::new(retail_store(), Arc::clone(&backend) as _, "test-model").await;

    let (first, _) = agent.query("Which stores are above $50,000?", None).await;
    let (second, _) = agent.query("And after that?", None).await;
    assert!(matches!(first, QueryAnswer::CodeGen(ref b) if b.success));
    assert!(matches!(second, QueryAnswer::CodeGen(ref b) if b.success));
    assert_eq!(agent.conversation_summary().unwrap().message_count, 4);

    assert!(agent.undo_last_query());
    assert_eq!(agent.conversation_summary().unwrap().message_count, 2);

    agent.clear_conversation();
    assert_eq!(agent.conversation_summary().unwrap().message_count, 0);
    assert!(!agent.undo_last_query());
}

#[tokio::test]
async fn execution_failure_surfaces_program_and_error() {
    // The model answers with SQL that never defines `result`.
    let backend = Arc::new(ScriptedLlm::new(
        true,
        vec![Some("```sql\nSELECT 1;\n```".into())],
    ));
    let mut agent = QueryAgent::new(retail_store(), Arc::clone(&backend) as _, "test-model").await;

    let (answer, chart) = agent.query("What is one?", None).await;
    let bundle = match answer {
        QueryAnswer::CodeGen(bundle) => bundle,
        other => panic!("expected codegen answer, got {other:?}"),
    };
    assert!(!bundle.success);
    assert!(bundle.analysis.contains("SELECT 1"));
    assert!(bundle.analysis.contains("result"));
    assert!(chart.is_none());
    // No analysis call after a failed execution.
    assert_eq!(backend.call_count(), 1);
    // Failed exchanges are not recorded.
    assert_eq!(agent.conversation_summary().unwrap().message_count, 0);
}
