pub mod advisory;
pub mod error;
pub mod fingerprint;
pub mod insight;
pub mod traits;
pub mod types;
pub mod window;

pub use advisory::*;
pub use error::*;
pub use fingerprint::{canonical_json, indicator_fingerprint, payload_hash};
pub use insight::*;
pub use traits::*;
pub use types::*;
pub use window::DailyWindow;
