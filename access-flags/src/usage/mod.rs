pub mod quota;
pub mod usage_models;
pub mod usage_stats;
pub mod usage_store;
