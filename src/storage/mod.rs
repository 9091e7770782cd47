pub mod account_store;
pub mod uploads;

pub use account_store::{
    validate_identifier, Account, AccountStore, FsAccountStore, MemoryAccountStore,
    STORAGE_VERSION,
};
pub use uploads::UploadArchive;
