mod descriptor;
mod record;
mod state;
mod traits;

pub use descriptor::Descriptor;
pub use record::RegistryRecord;
pub use state::RegistryState;
pub use traits::{InstanceEnvironment, RegistryStore, StoreFuture};
