//! Mock implementations of the engine's external collaborators
//!
//! The provider and merger here never touch the network or spawn processes; they
//! write small files into the destination directory so cleanup can be asserted.

pub mod mock_merger;
pub mod mock_provider;

#[allow(unused_imports)]
pub use mock_merger::{MergeMode, MockMerger};
#[allow(unused_imports)]
pub use mock_provider::{FailureMode, MockProvider, MockProviderConfig};
