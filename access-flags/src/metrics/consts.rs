// Decision counters
pub const ACCESS_DECISIONS_COUNTER: &str = "access_flags_decisions_total";
pub const QUOTA_CHECKS_COUNTER: &str = "access_flags_quota_checks_total";

// Flag snapshot cache
pub const FLAG_CACHE_HIT_COUNTER: &str = "access_flags_flag_cache_hit_total";
pub const FLAG_CACHE_ERRORS_COUNTER: &str = "access_flags_flag_cache_errors_total";
pub const DB_FLAG_READS_COUNTER: &str = "access_flags_db_flag_reads_total";

// Usage events
pub const USAGE_EVENTS_RECORDED_COUNTER: &str = "access_flags_usage_events_recorded_total";
pub const USAGE_STORE_ERRORS_COUNTER: &str = "access_flags_usage_store_errors_total";
pub const USAGE_ROWS_SKIPPED_COUNTER: &str = "access_flags_usage_rows_skipped_total";

// Timing
pub const ACCESS_CHECK_TIME: &str = "access_flags_check_time_ms";
