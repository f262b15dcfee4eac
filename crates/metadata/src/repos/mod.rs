//! Repository traits for metadata operations.

pub mod devices;
pub mod download_tokens;
pub mod meetings;

pub use devices::DeviceRepo;
pub use download_tokens::DownloadTokenRepo;
pub use meetings::MeetingRepo;
