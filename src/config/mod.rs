mod settings;

pub use settings::{ForgeSeed, Settings};
