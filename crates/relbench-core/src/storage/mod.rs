pub mod run_key;
pub mod schema;
pub mod store;

pub use run_key::{allocate_run_key, is_valid_run_key, RUN_KEY_ALPHABET, RUN_KEY_LEN};
pub use store::{Prediction, RunManifest, RunRecord, Store, MAX_KEY_ATTEMPTS};
