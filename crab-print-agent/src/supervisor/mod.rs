//! Service Supervisor: pipeline crash recovery and OS service registration

pub mod pipeline;
pub mod restart;
pub mod service;

pub use pipeline::Supervisor;
pub use restart::{RestartPolicy, RestartTracker};
pub use service::{
    CommandOutput, CommandRunner, ServiceBackend, ServiceError, ServiceResult, ServiceSpec,
    ServiceStatus, SystemCommandRunner, SystemdBackend, TaskSchedulerBackend, platform_backend,
    service_name,
};
