use serde::Serialize;
use uuid::Uuid;

use crate::models::news::{FetchStatus, SourceUsed, SymbolNewsResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SummarizationStatus {
    Success,
    Failed,
    /// No model call was made (no news, or no data to summarize).
    Skipped,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum DeliveryStatus {
    Sent,
    Failed,
    Skipped,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SymbolOutcome {
    pub symbol: String,
    pub fetch_status: FetchStatus,
    pub source_used: SourceUsed,
    pub news_count: usize,
    pub summarization_status: SummarizationStatus,
    pub error: Option<String>,
}

impl SymbolOutcome {
    /// A symbol counts as succeeded when its news was fetched and its
    /// summary did not fail.
    pub fn succeeded(&self) -> bool {
        self.fetch_status == FetchStatus::Success
            && self.summarization_status != SummarizationStatus::Failed
    }
}

/// End-of-run accounting, mutated by each stage the orchestrator drives.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub run_id: Uuid,
    pub outcomes: Vec<SymbolOutcome>,
    pub delivery_status: DeliveryStatus,
    pub delivery_error: Option<String>,
    pub success_count: usize,
    pub failure_count: usize,
    pub deadline_exceeded: bool,
}

impl RunReport {
    pub fn new(run_id: Uuid) -> Self {
        Self {
            run_id,
            outcomes: Vec::new(),
            delivery_status: DeliveryStatus::Skipped,
            delivery_error: None,
            success_count: 0,
            failure_count: 0,
            deadline_exceeded: false,
        }
    }

    pub fn record_fetch(&mut self, result: &SymbolNewsResult) {
        self.outcomes.push(SymbolOutcome {
            symbol: result.symbol.clone(),
            fetch_status: result.fetch_status,
            source_used: result.source_used,
            news_count: result.items.len(),
            summarization_status: SummarizationStatus::Skipped,
            error: result.error.clone(),
        });
        self.recount();
    }

    pub fn record_summary(&mut self, symbol: &str, status: SummarizationStatus, error: Option<String>) {
        if let Some(outcome) = self.outcomes.iter_mut().find(|o| o.symbol == symbol) {
            outcome.summarization_status = status;
            if outcome.error.is_none() {
                outcome.error = error;
            }
        }
        self.recount();
    }

    pub fn record_delivery(&mut self, status: DeliveryStatus, error: Option<String>) {
        self.delivery_status = status;
        self.delivery_error = error;
    }

    pub fn outcome(&self, symbol: &str) -> Option<&SymbolOutcome> {
        self.outcomes.iter().find(|o| o.symbol == symbol)
    }

    /// The run is considered successful unless delivery was attempted and failed.
    pub fn is_success(&self) -> bool {
        self.delivery_status != DeliveryStatus::Failed
    }

    pub fn exit_code(&self) -> i32 {
        if self.is_success() {
            0
        } else {
            1
        }
    }

    fn recount(&mut self) {
        self.success_count = self.outcomes.iter().filter(|o| o.succeeded()).count();
        self.failure_count = self.outcomes.len() - self.success_count;
    }
}
