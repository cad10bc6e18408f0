//! Prompt assembly for the narrative analysis path.

use crate::context::ContextSummary;
use crate::history::ChatMessage;
use crate::intent::Intent;

const PERFORMANCE_SYSTEM: &str = "You are analyzing performance metrics for a retail chain.\n\
Focus on: revenue trends, sales volumes, transaction counts, growth rates.\n\
Provide specific numbers, percentages, and clear comparisons.";

const COMPARISON_SYSTEM: &str = "You are comparing business metrics across different dimensions.\n\
Focus on: period-over-period comparisons, regional differences, product category comparisons.\n\
Highlight significant differences and provide context.";

const ANOMALY_SYSTEM: &str = "You are identifying and explaining anomalies in retail business data.\n\
Focus on: outliers, unusual patterns, underperformance, overperformance.\n\
Provide statistical context (standard deviations, percentiles) when relevant.";

const DRILLDOWN_SYSTEM: &str = "You are conducting a deep-dive analysis to understand root causes.\n\
Focus on: cost drivers, revenue components, operational factors.\n\
Break down complex metrics into understandable components.";

/// The per-intent system message used on the history-aware path. General
/// questions get the full data-context system prompt instead.
pub fn intent_system_message(intent: Intent) -> Option<&'static str> {
    match intent {
        Intent::Performance => Some(PERFORMANCE_SYSTEM),
        Intent::Comparison => Some(COMPARISON_SYSTEM),
        Intent::Anomaly => Some(ANOMALY_SYSTEM),
        Intent::Drilldown => Some(DRILLDOWN_SYSTEM),
        Intent::General => None,
    }
}

pub fn build_system_prompt(ctx: &ContextSummary) -> String {
    let total_stores = ctx
        .total_stores
        .map(|n| n.to_string())
        .unwrap_or_else(|| "N/A".into());
    let total_products = ctx
        .total_products
        .map(|n| n.to_string())
        .unwrap_or_else(|| "N/A".into());
    let regions = if ctx.regions.is_empty() {
        String::new()
    } else {
        ctx.regions.join(", ")
    };
    let date_range = ctx
        .date_range
        .as_ref()
        .map(|(min, max)| format!("{min} to {max}"))
        .unwrap_or_else(|| "N/A".into());

    format!(
        "You are an expert retail analytics assistant helping C-suite executives analyze business data.\n\
         \n\
         **Available Data Context:**\n\
         - Total Stores: {total_stores}\n\
         - Total Products: {total_products}\n\
         - Regions: {regions}\n\
         - Date Range: {date_range}\n\
         - Available Metrics: Revenue, Costs, Profit Margins, Inventory, Customer Satisfaction\n\
         \n\
         **Data Columns Available:**\n\
         - Store Transactions: Date, StoreID, Location, Product, Quantity, UnitPrice, TotalPrice, PaymentType\n\
         - Product Sales by Region: Date, Region, Product, Quantity, UnitPrice, TotalPrice, UnitCost, Discount\n\
         - Inventory: ProductID, ProductName, QuantityInStock, ReorderPoint, UnitCost\n\
         - Customer Data: CustomerID, Product, PurchaseDate, TotalPrice, ReviewRating\n\
         \n\
         **Your Role:**\n\
         1. Understand the executive's question\n\
         2. Determine what data analysis is needed\n\
         3. Provide clear, actionable insights\n\
         4. Use business language appropriate for C-suite executives\n\
         \n\
         **Response Format:**\n\
         - Be concise and data-driven\n\
         - Include specific numbers and percentages\n\
         - Highlight key insights and recommendations\n\
         - Use markdown formatting for clarity"
    )
}

pub fn build_performance_query_prompt(question: &str, data_summary: &str) -> Vec<ChatMessage> {
    vec![
        ChatMessage::system(PERFORMANCE_SYSTEM),
        ChatMessage::user(format!(
            "Question: {question}\n\n\
             Available Data Summary:\n{data_summary}\n\n\
             Please analyze the performance data and provide:\n\
             1. Key performance metrics\n\
             2. Trends (up/down, percentage changes)\n\
             3. Top performers\n\
             4. Areas of concern\n\
             5. Executive summary"
        )),
    ]
}

pub fn build_comparison_query_prompt(question: &str, data_summary: &str) -> Vec<ChatMessage> {
    vec![
        ChatMessage::system(COMPARISON_SYSTEM),
        ChatMessage::user(format!(
            "Question: {question}\n\n\
             Available Data Summary:\n{data_summary}\n\n\
             Please provide a comparison analysis including:\n\
             1. What is being compared (timeframes, regions, stores, etc.)\n\
             2. Percentage differences and absolute values\n\
             3. Winners and losers\n\
             4. Factors driving differences\n\
             5. Actionable recommendations"
        )),
    ]
}

pub fn build_anomaly_query_prompt(question: &str, data_summary: &str) -> Vec<ChatMessage> {
    vec![
        ChatMessage::system(ANOMALY_SYSTEM),
        ChatMessage::user(format!(
            "Question: {question}\n\n\
             Available Data Summary:\n{data_summary}\n\n\
             Please identify and analyze anomalies:\n\
             1. Which entities (stores/products/regions) are outliers?\n\
             2. How significant is the deviation? (percentage, z-scores)\n\
             3. Possible root causes\n\
             4. Is this a concern or opportunity?\n\
             5. Recommended actions"
        )),
    ]
}

pub fn build_drilldown_query_prompt(question: &str, data_summary: &str) -> Vec<ChatMessage> {
    vec![
        ChatMessage::system(DRILLDOWN_SYSTEM),
        ChatMessage::user(format!(
            "Question: {question}\n\n\
             Available Data Summary:\n{data_summary}\n\n\
             Please provide a drill-down analysis:\n\
             1. What are the main components/drivers?\n\
             2. Breakdown by relevant dimensions (products, time, location)\n\
             3. Which factors contribute most?\n\
             4. Root cause analysis\n\
             5. Specific recommendations to address issues"
        )),
    ]
}

/// One-off prompt pair for a classified question, used when history is not
/// in play.
pub fn build_query_prompt(intent: Intent, question: &str, data_summary: &str, ctx: &ContextSummary) -> Vec<ChatMessage> {
    match intent {
        Intent::Performance => build_performance_query_prompt(question, data_summary),
        Intent::Comparison => build_comparison_query_prompt(question, data_summary),
        Intent::Anomaly => build_anomaly_query_prompt(question, data_summary),
        Intent::Drilldown => build_drilldown_query_prompt(question, data_summary),
        Intent::General => vec![
            ChatMessage::system(build_system_prompt(ctx)),
            ChatMessage::user(format!(
                "Question: {question}\n\nData Summary:\n{data_summary}"
            )),
        ],
    }
}
