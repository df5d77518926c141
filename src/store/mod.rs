pub mod match_registry;
pub mod snapshot_writer;

pub use match_registry::MatchRegistry;
pub use snapshot_writer::SnapshotWriter;
