pub mod aggregation_service;
pub mod digest_service;
pub mod email_template;
pub mod news_service;
pub mod notification_service;
pub mod rate_limiter;
pub mod report_service;
pub mod summary_service;
