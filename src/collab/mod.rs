pub mod coalescer;
pub mod permissions;
pub mod presence;
pub mod registry;
pub mod room;
pub mod room_directory;

pub use registry::{RegistryStats, RoomRegistry};
pub use room::{CollabConfig, LoadDocumentFn, RoomCommand, SaveDocumentFn};
