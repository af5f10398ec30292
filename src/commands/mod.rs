mod config_cmd;
mod entry;
mod sync_cmd;

pub use config_cmd::ConfigCommand;
pub use entry::EntryCommand;
pub use sync_cmd::SyncCommand;
