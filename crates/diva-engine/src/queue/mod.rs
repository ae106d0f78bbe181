pub mod dispatcher;
pub mod processing;

pub use dispatcher::Dispatcher;
pub use processing::{ProcessingQueue, Queues};
