pub mod digest;
pub mod news;
pub mod run_report;

pub use digest::{DigestEntry, DigestReport, StockSnapshot};
pub use news::{DateRange, FetchStatus, NewsBatch, NewsItem, SourceUsed, SymbolNewsResult};
pub use run_report::{DeliveryStatus, RunReport, SummarizationStatus, SymbolOutcome};
