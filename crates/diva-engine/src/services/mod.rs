pub mod descriptor;
pub mod registry;

pub use descriptor::{
    AlgorithmDescriptor, DeclaredParam, ExceptionRecord, ExecutableType, ExecutionStatistics,
    ServiceState, ServiceStatus, ServicesFile,
};
pub use registry::ServicesRegistry;
