//! Standard exit codes (BSD sysexits.h compatible)

/// Successful termination
pub const OK: i32 = 0;

/// Command line usage error, invalid count
pub const USAGE: i32 = 64;

/// Data format error (directory is not a Django project)
pub const DATAERR: i32 = 65;

/// Cannot open input (project directory not found)
pub const NOINPUT: i32 = 66;

/// Addressee unknown (service user not found)
pub const NOUSER: i32 = 67;

/// Service unavailable (init system reload or unit failure)
pub const UNAVAILABLE: i32 = 69;

/// Internal software error (build step failed)
pub const SOFTWARE: i32 = 70;

/// Input/output error
pub const IOERR: i32 = 74;

/// Permission denied
pub const NOPERM: i32 = 77;

/// Configuration error
pub const CONFIG: i32 = 78;
