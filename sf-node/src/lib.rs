mod address_book;
mod builder;
mod config;
mod connection;
mod dial;
mod error;
mod executor;
mod node;
mod registry;
mod resource;
mod transport;

pub use address_book::{AddressBook, MemoryAddressBook, PERMANENT_ADDR_TTL};
pub use builder::Builder;
pub use config::DialConfig;
pub use connection::Connection;
pub use dial::{
	DialRequest, DialResponse,
	history::FailureRecord,
	rank::{AddressRanker, Candidate, DefaultRanker},
};
pub use error::{AggregateDialError, AttemptError, DialError};
pub use executor::{Executor, TokioExecutor};
pub use node::Node;
pub use registry::{ConnectionRegistry, Publish};
pub use resource::{
	LimitedResourceManager, Reservation, ResourceError, ResourceManager, ResourceScope, UnlimitedResourceManager, Usage,
};
pub use transport::TransportRegistry;
