pub mod buffer_surface;
pub mod pl_parser;
pub mod simulated_gateway;

pub use buffer_surface::{BufferSurface, SurfaceError};
pub use pl_parser::KeywordPlParser;
pub use simulated_gateway::{SimulatedGateway, SimulatedGatewayConfig};
