pub mod cancel;
pub mod service;
