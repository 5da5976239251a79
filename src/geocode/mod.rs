pub mod gateway;
pub mod nominatim;
pub mod types;

pub use gateway::GeocoderGateway;
pub use types::GeoPlace;
