pub mod audit;
pub mod backlog;
pub mod breakers;
pub mod capabilities;
pub mod config;
pub mod coverage;
pub mod discovery;
pub mod dispatch;
pub mod errors;
pub mod init;
pub mod lifecycle;
pub mod logging;
pub mod loopsmith_config;
pub mod orchestrator;
pub mod phase;
pub mod policy;
pub mod task;
pub mod ui;
pub mod util;
pub mod worker;
