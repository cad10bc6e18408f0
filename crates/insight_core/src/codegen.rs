//! LLM-driven SQL generation, execution, and result analysis.

use crate::data::TableStore;
use crate::error::LlmError;
use crate::exec::{self, ExecutionOutcome, DEFAULT_EXEC_TIMEOUT};
use crate::history::ChatMessage;
use crate::llm::LlmBackend;
use crate::viz::{self, Chart};
use regex::Regex;
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

/// A program authored by the model for one query. Never persisted.
#[derive(Debug, Clone, PartialEq)]
pub struct GeneratedProgram {
    pub source: String,
    /// Whether the source came out of a fenced code block (as opposed to
    /// the raw reply).
    pub fenced: bool,
}

/// The answer bundle for the code-generation path.
#[derive(Debug, Clone, Serialize)]
pub struct CodegenAnswer {
    pub success: bool,
    pub analysis: String,
    pub code: String,
    pub result_type: String,
}

impl CodegenAnswer {
    fn failed(code: String, error: &str) -> Self {
        Self {
            success: false,
            analysis: format!(
                "I generated SQL to answer your question, but execution failed:\n\n\
                 **Generated Code:**\n```sql\n{code}\n```\n\n\
                 **Error:**\n{error}\n\n\
                 Please try rephrasing your question."
            ),
            code,
            result_type: "failure".into(),
        }
    }
}

impl fmt::Display for CodegenAnswer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if !self.success {
            return write!(f, "**Code Generation Approach**\n\n{}", self.analysis);
        }
        write!(
            f,
            "**Dynamic Code Execution**\n\n{}\n\n\
             <details>\n<summary>View Generated Code</summary>\n\n\
             ```sql\n{}\n```\n\n\
             **Result Type:** {}\n</details>",
            self.analysis, self.code, self.result_type,
        )
    }
}

const SQL_SYSTEM_PROMPT: &str = "You are an expert SQL data analyst. Generate DuckDB SQL to answer questions about retail data.\n\
\n\
**Available Tables:**\n\
- `store_transactions`: Columns = Date, StoreID, Location, Product, Quantity, UnitPrice, TotalPrice, PaymentType\n\
- `product_sales`: Columns = Date, Region, Product, Quantity, UnitPrice, TotalPrice, UnitCost, Discount\n\
- `inventory_data`: Columns = ProductID, ProductName, QuantityInStock, ReorderPoint, UnitCost\n\
- `customer_data`: Columns = CustomerID, Product, PurchaseDate, TotalPrice, ReviewRating\n\
\n\
**Join Keys:**\n\
- store_transactions.Product = inventory_data.ProductName\n\
- product_sales.Product = inventory_data.ProductName\n\
\n\
**Rules:**\n\
1. Revenue questions need no join: revenue is sum(TotalPrice).\n\
2. Cost questions require a join against inventory_data to obtain UnitCost (cost = Quantity * UnitCost).\n\
3. Profit or margin questions require that join plus the margin formula: (revenue - cost) / revenue * 100.\n\
4. Materialize the final answer as exactly one relation named `result` (CREATE TABLE result AS ...), never more.\n\
5. One statement per semicolon; do not put semicolons inside string literals.\n\
6. Handle missing data gracefully (COALESCE where needed).\n\
\n\
**Output Format:**\n\
Return ONLY the SQL, no explanations before or after.\n\
\n\
**Example:**\n\
Question: \"Which stores have revenue above $50,000?\"\n\
Code:\n\
```sql\n\
CREATE TABLE result AS\n\
SELECT StoreID, sum(TotalPrice) AS revenue\n\
FROM store_transactions\n\
GROUP BY StoreID\n\
HAVING revenue > 50000\n\
ORDER BY revenue DESC;\n\
```";

const ANALYSIS_SYSTEM_PROMPT: &str = "You are a retail analytics expert. Analyze data query results and provide clear insights for C-suite executives.\n\
\n\
**Your Response Should Include:**\n\
1. Direct answer to the question\n\
2. Key insights and patterns\n\
3. Specific numbers and percentages\n\
4. Business implications\n\
5. Recommendations (if applicable)\n\
\n\
Be concise, data-driven, and executive-friendly.";

pub struct CodeGenerator {
    llm: Arc<dyn LlmBackend>,
    store: TableStore,
    exec_timeout: Duration,
}

impl CodeGenerator {
    pub fn new(llm: Arc<dyn LlmBackend>, store: TableStore) -> Self {
        Self { llm, store, exec_timeout: DEFAULT_EXEC_TIMEOUT }
    }

    /// Ask the model for a SQL program answering the question.
    pub async fn generate_code(
        &self,
        question: &str,
        data_context: &str,
    ) -> Result<GeneratedProgram, LlmError> {
        let messages = vec![
            ChatMessage::system(SQL_SYSTEM_PROMPT),
            ChatMessage::user(format!(
                "Question: {question}\n\n\
                 Data Context:\n{data_context}\n\n\
                 Generate DuckDB SQL to answer this question using the available tables."
            )),
        ];
        let response = self.llm.chat_completion(&messages, 0.1, 800).await?;
        Ok(extract_code(&response))
    }

    pub fn execute_code(&self, program: &GeneratedProgram) -> ExecutionOutcome {
        exec::execute_program(&self.store, &program.source, self.exec_timeout)
    }

    /// Second LLM pass: turn the raw result into an executive narrative.
    pub async fn analyze_results(
        &self,
        question: &str,
        program: &GeneratedProgram,
        outcome: &ExecutionOutcome,
    ) -> Result<String, LlmError> {
        let formatted = exec::format_result(outcome);
        let messages = vec![
            ChatMessage::system(ANALYSIS_SYSTEM_PROMPT),
            ChatMessage::user(format!(
                "Original Question: {question}\n\n\
                 Code Executed:\n```sql\n{}\n```\n\n\
                 Results:\n{formatted}\n\n\
                 Provide a clear analysis and answer.",
                program.source,
            )),
        ];
        self.llm.chat_completion(&messages, 0.3, 1000).await
    }

    /// Full pipeline: generate, execute, analyze, visualize. Transport
    /// failures bubble as `LlmError`; execution failures come back as an
    /// unsuccessful bundle inviting a rephrase.
    pub async fn query_with_code_generation(
        &self,
        question: &str,
    ) -> Result<(CodegenAnswer, Option<Chart>), LlmError> {
        let data_context = self.build_data_context();
        let program = self.generate_code(question, &data_context).await?;
        let outcome = self.execute_code(&program);
        match &outcome {
            ExecutionOutcome::Failure { error, .. } => {
                info!(error = %error, "generated program failed");
                Ok((CodegenAnswer::failed(program.source, error), None))
            }
            ExecutionOutcome::Success { type_name, .. } => {
                let analysis = self.analyze_results(question, &program, &outcome).await?;
                let chart = viz::select_chart(&outcome);
                Ok((
                    CodegenAnswer {
                        success: true,
                        analysis,
                        code: program.source,
                        result_type: type_name.clone(),
                    },
                    chart,
                ))
            }
        }
    }

    /// Minimal per-dataset facts for the generation prompt.
    fn build_data_context(&self) -> String {
        let mut lines = Vec::new();
        if let Some(tx) = &self.store.store_transactions {
            let range = tx
                .column_index("Date")
                .and_then(|idx| date_range_line(tx, idx))
                .unwrap_or_default();
            lines.push(format!("store_transactions: {} rows{range}", tx.row_count()));
        }
        if let Some(sales) = &self.store.product_sales {
            let regions = sales
                .column_index("Region")
                .map(|idx| {
                    let mut seen = std::collections::HashSet::new();
                    let mut out = Vec::new();
                    for v in sales.column(idx) {
                        let s = v.to_string();
                        if !s.is_empty() && seen.insert(s.clone()) {
                            out.push(s);
                        }
                    }
                    out.join(", ")
                })
                .unwrap_or_default();
            lines.push(format!(
                "product_sales: {} rows, regions: {regions}",
                sales.row_count()
            ));
        }
        if let Some(inv) = &self.store.inventory_data {
            lines.push(format!("inventory_data: {} products", inv.row_count()));
        }
        if let Some(customers) = &self.store.customer_data {
            lines.push(format!("customer_data: {} transactions", customers.row_count()));
        }
        lines.join("\n")
    }
}

/// Pull the program body out of the model's reply: a ```sql fence first, a
/// bare fence next, the raw reply verbatim last.
pub fn extract_code(response: &str) -> GeneratedProgram {
    let sql_fence = Regex::new(r"(?s)```sql\s*\n(.*?)```").unwrap();
    if let Some(caps) = sql_fence.captures(response) {
        return GeneratedProgram {
            source: caps[1].trim().to_string(),
            fenced: true,
        };
    }
    let bare_fence = Regex::new(r"(?s)```\s*\n(.*?)```").unwrap();
    if let Some(caps) = bare_fence.captures(response) {
        return GeneratedProgram {
            source: caps[1].trim().to_string(),
            fenced: true,
        };
    }
    GeneratedProgram {
        source: response.trim().to_string(),
        fenced: false,
    }
}

fn date_range_line(table: &crate::data::DataTable, idx: usize) -> Option<String> {
    let mut min: Option<String> = None;
    let mut max: Option<String> = None;
    for v in table.column(idx) {
        if v.is_null() {
            continue;
        }
        let s = v.to_string();
        if min.as_ref().map(|m| s < *m).unwrap_or(true) {
            min = Some(s.clone());
        }
        if max.as_ref().map(|m| s > *m).unwrap_or(true) {
            max = Some(s);
        }
    }
    Some(format!(", date range: {} to {}", min?, max?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{DataTable, Value};

    #[test]
    fn extracts_sql_tagged_fence_first() {
        let reply = "Here you go:\n```sql\nCREATE TABLE result AS SELECT 1;\n```\nthanks";
        let program = extract_code(reply);
        assert!(program.fenced);
        assert_eq!(program.source, "CREATE TABLE result AS SELECT 1;");
    }

    #[test]
    fn falls_back_to_bare_fence() {
        let reply = "```\nSELECT 2;\n```";
        let program = extract_code(reply);
        assert!(program.fenced);
        assert_eq!(program.source, "SELECT 2;");
    }

    #[test]
    fn unfenced_reply_is_taken_verbatim() {
        let program = extract_code("  SELECT 3;  ");
        assert!(!program.fenced);
        assert_eq!(program.source, "SELECT 3;");
    }

    #[test]
    fn failure_bundle_surfaces_code_and_error() {
        let answer = CodegenAnswer::failed("SELECT 1".into(), "boom");
        assert!(!answer.success);
        assert!(answer.analysis.contains("SELECT 1"));
        assert!(answer.analysis.contains("boom"));
        assert_eq!(answer.result_type, "failure");
        assert!(answer.to_string().starts_with("**Code Generation Approach**"));
    }

    #[test]
    fn data_context_lists_loaded_datasets() {
        let tx = DataTable {
            columns: vec!["Date".into(), "StoreID".into(), "TotalPrice".into()],
            rows: vec![vec![
                Value::Text("2024-01-02".into()),
                Value::Text("S1".into()),
                Value::Float(10.0),
            ]],
        };
        let store = TableStore {
            store_transactions: Some(Arc::new(tx)),
            ..Default::default()
        };
        struct NoLlm;
        #[async_trait::async_trait]
        impl LlmBackend for NoLlm {
            async fn chat_completion(
                &self,
                _messages: &[ChatMessage],
                _temperature: f32,
                _max_tokens: u32,
            ) -> Result<String, LlmError> {
                Err(LlmError::Malformed("unused".into()))
            }
        }
        let generator = CodeGenerator::new(Arc::new(NoLlm), store);
        let ctx = generator.build_data_context();
        assert!(ctx.contains("store_transactions: 1 rows"));
        assert!(ctx.contains("date range: 2024-01-02 to 2024-01-02"));
        assert!(!ctx.contains("product_sales"));
    }
}
