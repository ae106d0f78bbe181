pub mod collection;
#[allow(clippy::module_inception)]
pub mod process;
pub mod request;

pub use collection::{output_collection_name, Collection, CollectionResponse, ProcessLink};
pub use process::{Process, ProcessStatus};
pub use request::{DataElement, ExecutionRequest, ExecutionType};
