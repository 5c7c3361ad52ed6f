pub mod poller;
pub mod reconciler;
pub mod report_log;
pub mod state_file;
pub mod status;
