pub mod image;
pub mod notifier;
pub mod platform;
pub mod plugin;
pub mod report;
pub mod resolver;
pub mod sink;
pub mod sources;
pub mod walker;

// Re-exports for easy access
pub use image::{Image, Layer};
pub use notifier::Notifier;
pub use platform::Platform;
pub use plugin::{FileLocation, FileSpec, PluginPlatform};
pub use resolver::ResolvedSet;
pub use sink::OutputArchive;
pub use sources::LocalImage;
pub use walker::{EntryWarning, ExtractOptions, Extraction, LayerWalker};
