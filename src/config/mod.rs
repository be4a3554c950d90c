pub mod settings;

pub use settings::{RouterConfig, Settings};
