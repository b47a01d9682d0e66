pub mod backend;
pub mod controller;
pub mod registry;
pub mod runner;
pub mod types;

pub use backend::{CommandSpec, DockerOsra, RecognitionBackend};
pub use controller::{StreamController, StreamEvent, SuccessPayload};
pub use registry::{RegistrationGuard, TaskRegistry};
pub use runner::{ExitKind, RecognitionRunner};
pub use types::{Outcome, Recognition, Task};
