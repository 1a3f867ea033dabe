mod models;
mod name;
mod source;
mod status;

pub use models::*;
pub use name::{normalize_name, slugify};
pub use source::ForgeSource;
pub use status::{gitlab_status, travis_status};
