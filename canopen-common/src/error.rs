//! Flat error enumeration shared across the stack
//!
//! Every public entry point in the core returns one of these codes (or a more specific
//! [`crate::sdo::AbortCode`] at the SDO boundary). Configuration errors detected during `init` are
//! additionally latched into `Node::error` so they survive past the call that produced them.

use snafu::Snafu;

/// The unified error type returned by dictionary, PDO, NMT, SYNC and timer operations
#[derive(Clone, Copy, Debug, PartialEq, Eq, Snafu)]
#[repr(u8)]
pub enum CanopenError {
    /// No error; used as the "clean" value of the latched node error register
    None,
    /// A caller passed an argument that violates a documented precondition
    BadArg,
    /// No dictionary entry exists for the requested (index, sub)
    NotFound,
    /// A type's read callback failed
    ObjRead,
    /// A type's write callback failed
    ObjWrite,
    /// The declared width did not match the accessor used (read_u8 on a u32, etc)
    ObjSize,
    /// The value is outside the permitted range for the object
    ObjRange,
    /// The requested access is not permitted (missing read/write flag, PDO active, etc)
    ObjAcc,
    /// PDO mapping references an object that is not PDO-mappable for the direction requested
    ObjMapType,
    /// PDO mapping length is invalid (zero, not byte aligned, or overflows the PDO)
    ObjMapLen,
    /// A write conflicts with existing configuration (e.g. re-registering a heartbeat consumer)
    ObjIncompatible,
    /// A type's `init` callback failed
    TypeInit,
    /// A type's `read` vtable entry failed in a way not covered by ObjRead
    TypeRead,
    /// A type's `write` vtable entry failed in a way not covered by ObjWrite
    TypeWrite,
    /// A type's control/reset vtable entry failed
    TypeCtrl,
    /// TPDO communication object configuration is invalid
    TpdoCom,
    /// TPDO mapping configuration is invalid
    TpdoMap,
    /// RPDO communication object configuration is invalid
    RpdoCom,
    /// RPDO mapping configuration is invalid
    RpdoMap,
    /// The timer wheel's action pool is exhausted
    TmrCreate,
    /// `timer.delete` was called with an id that is not currently scheduled
    TmrDelete,
    /// The timer wheel's slot pool is exhausted
    TmrInsert,
    /// The NMT command or requested mode is not valid in the current context
    NmtMode,
    /// The timer's minimum resolvable period exceeds the requested SYNC cycle
    SyncRes,
    /// Object 0x1001 (error register) configuration is invalid
    Cfg1001,
    /// Object 0x1003 (pre-defined error field) configuration is invalid
    Cfg1003,
    /// Object 0x1005 (SYNC COB-ID) configuration is invalid
    Cfg1005,
    /// Object 0x1006 (SYNC cycle period) configuration is invalid
    Cfg1006,
    /// Object 0x1014 (EMCY COB-ID) configuration is invalid
    Cfg1014,
    /// Object 0x1016 (heartbeat consumer) configuration is invalid
    Cfg1016,
    /// Object 0x1017 (heartbeat producer) configuration is invalid
    Cfg1017,
    /// Object 0x1018 (identity) configuration is invalid
    Cfg1018,
    /// A parameter group index is out of range
    ParaIdx,
    /// Restoring default parameters failed
    ParaRestore,
    /// The embedder's non-volatile storage read callback failed
    NvmRead,
    /// The embedder's non-volatile storage write callback failed
    NvmWrite,
    /// Loading persisted LSS values failed
    LssLoad,
    /// The SDO server is already servicing a transfer
    SdoBusy,
    /// The SDO server has no valid node-id yet and cannot be addressed
    SdoOff,
    /// An SDO transfer was aborted by the peer
    SdoAbort,
    /// An SDO request arrived with no valid response possible (e.g. stub client handler)
    SdoSilent,
    /// Emergency history / identification root error
    EmcyRoot,
}

impl Default for CanopenError {
    fn default() -> Self {
        CanopenError::None
    }
}

/// A `Result` alias using [`CanopenError`]
pub type CoResult<T> = Result<T, CanopenError>;
