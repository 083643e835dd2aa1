pub mod metadata;
pub mod record;

pub use metadata::{Decision, LocalMetadata, RemoteMetadata, Version};
pub use record::MetadataRecord;
