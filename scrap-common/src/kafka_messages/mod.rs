//! Messages this service produces to Kafka.
pub mod dead_letter;
pub mod scrap_processed;
