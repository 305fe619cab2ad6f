pub mod anthropic;
pub mod finnhub;
pub mod news_provider;
pub mod quote_provider;
pub mod smtp;
pub mod yahoo;
