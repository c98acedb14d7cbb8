pub mod gateway;
pub mod parse;
pub mod rate_limit;

pub use gateway::{ClassificationGateway, ClassifyError, ClassifyRequest, GatewayAdapter};
pub use parse::{parse_classification, Classification};
