// Market data domain
pub mod market;

// Feature schema and prediction types
pub mod ml;

// Port interfaces
pub mod ports;

// Domain-specific error types
pub mod errors;
