pub mod gitlab;
pub mod notifier;
pub mod pipeline_poller;
