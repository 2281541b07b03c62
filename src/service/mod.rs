pub mod dispatcher;

pub use dispatcher::{MAX_SERVICES, OperationHandler, ServiceDispatcher, ServiceRegistration};
