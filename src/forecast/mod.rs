pub mod gateway;
pub mod met;
pub mod select;
pub mod types;

pub use gateway::MetGateway;
pub use select::DailyTemperatureSelector;
