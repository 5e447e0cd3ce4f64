pub mod error;

pub use error::{AuthError, Error, MediaError, Result, StoreError};
