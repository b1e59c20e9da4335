pub mod errors;
pub mod model;
pub mod settings;

pub use errors::HgError;
pub use model::RepositoryModel;
pub use settings::{ConfigSource, Settings, SettingsWatcher};
