//! Adapters behind the application ports: the kubectl CLI, the tool
//! installer, the manifest renderer and the stage log sink.

pub mod kubectl;
pub mod loader;
pub mod log_persister;
pub mod tool_registry;

pub use kubectl::KubectlCli;
pub use loader::RenderingLoader;
pub use log_persister::TracingLogPersister;
pub use tool_registry::BinToolRegistry;
