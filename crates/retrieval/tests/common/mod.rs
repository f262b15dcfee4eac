pub mod fixtures;
pub mod mocks;

#[allow(unused_imports)]
pub use fixtures::{archive_key, archive_text, zip_archive};
#[allow(unused_imports)]
pub use mocks::MemoryStore;
