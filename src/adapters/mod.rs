pub mod memory;

pub use memory::{InMemoryIdentityGateway, InMemoryStore, RecordingChannel};
