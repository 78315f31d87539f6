//! RPC Error Types
//!
//! Maps jobs errors to JSON-RPC error codes.

use jsonrpsee::types::ErrorObjectOwned;
use relay_core::{ErrorKind, JobsError};

/// RPC Error Codes
pub mod code {
    pub const VALIDATION_ERROR: i32 = 4000;
    pub const NOT_FOUND: i32 = 4001;
    pub const CONFLICT: i32 = 4002;
    pub const INTERNAL_ERROR: i32 = 5000;
    pub const SYSTEM_ERROR: i32 = 5002;
}

/// Convert JobsError to JSON-RPC ErrorObject
pub fn to_rpc_error(err: JobsError) -> ErrorObjectOwned {
    let code = match err.kind() {
        ErrorKind::NotFound | ErrorKind::DriverUnregistered => code::NOT_FOUND,
        ErrorKind::AlreadyDeclared => code::CONFLICT,
        // the broker refused; the request itself was fine
        ErrorKind::Construction if err.is_driver_failure() => code::SYSTEM_ERROR,
        ErrorKind::Construction => code::VALIDATION_ERROR,
        ErrorKind::Push | ErrorKind::Stop | ErrorKind::Execution => code::SYSTEM_ERROR,
        ErrorKind::Disabled | ErrorKind::AckNack => code::INTERNAL_ERROR,
    };
    ErrorObjectOwned::owned(code, err.to_string(), None::<()>)
}

/// Request rejected before reaching the jobs service
pub fn validation(msg: impl Into<String>) -> ErrorObjectOwned {
    ErrorObjectOwned::owned(code::VALIDATION_ERROR, msg.into(), None::<()>)
}
