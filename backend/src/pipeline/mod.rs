pub mod dispatcher;
pub mod job;

pub use dispatcher::BackgroundDispatcher;
pub use job::JobRunner;
