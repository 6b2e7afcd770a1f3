//! This crate defines [the on-disk report artifact format](format/index.html) as well as
//! the OS error codes ([Mach exceptions and Darwin signals](mac_errors/index.html),
//! [Linux signals](linux_errors/index.html)) that fatal issues are classified with, and the
//! [Android tombstone](tombstone/index.html) messages native crashes arrive in.
//!
//! You probably don't want to use this crate directly, the `fatal-issue-processor` crate
//! builds reports and writes them using the types defined here.

pub mod format;
pub mod linux_errors;
pub mod mac_errors;
pub mod tombstone;

pub use linux_errors::SignalLinux;
pub use mac_errors::{ExceptionCodeMac, SignalMac};
