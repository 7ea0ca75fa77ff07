pub mod log;
pub mod trace_log;
