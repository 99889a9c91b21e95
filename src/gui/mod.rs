//! Small terminal interfaces shared by the binaries.

mod device_selector;
mod error;
mod fold_until_stop;
mod terminal;

pub use device_selector::device_selector;
pub use error::MonitorError;
pub use fold_until_stop::fold_until_stop;
