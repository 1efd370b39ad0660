pub mod connection;
pub mod dispatcher;
pub mod registry;
pub mod relay;
