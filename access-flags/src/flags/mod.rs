pub mod flag_decision;
pub mod flag_models;
pub mod flag_request;
pub mod flag_resolver;
pub mod flag_service;
pub mod flag_store;
pub mod flags_cache;
