pub mod broker;
pub mod connection;
pub mod error;
pub mod fanout;
pub mod presence;
pub mod registry;

pub use broker::Broker;
pub use error::BrokerError;
pub use fanout::RoomFanout;
pub use presence::Presence;
pub use registry::Registry;
