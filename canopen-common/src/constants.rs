//! Reserved object dictionary indices and well-known values (CiA 301 section 7.5)

/// Reserved communication profile object indices
pub mod object_ids {
    /// Device type
    pub const DEVICE_TYPE: u16 = 0x1000;
    /// Error register
    pub const ERROR_REGISTER: u16 = 0x1001;
    /// Pre-defined error field (EMCY history)
    pub const PREDEFINED_ERROR_FIELD: u16 = 0x1003;
    /// Device name
    pub const DEVICE_NAME: u16 = 0x1008;
    /// Hardware version
    pub const HARDWARE_VERSION: u16 = 0x1009;
    /// Software version
    pub const SOFTWARE_VERSION: u16 = 0x100A;
    /// SYNC COB-ID
    pub const SYNC_COB_ID: u16 = 0x1005;
    /// SYNC communication cycle period, in microseconds
    pub const SYNC_CYCLE_PERIOD: u16 = 0x1006;
    /// Store parameters command
    pub const STORE_PARAMETERS: u16 = 0x1010;
    /// Restore default parameters command
    pub const RESTORE_PARAMETERS: u16 = 0x1011;
    /// Emergency COB-ID
    pub const EMCY_COB_ID: u16 = 0x1014;
    /// Consumer heartbeat time array
    pub const HEARTBEAT_CONSUMER_TIME: u16 = 0x1016;
    /// Producer heartbeat time
    pub const HEARTBEAT_PRODUCER_TIME: u16 = 0x1017;
    /// Identity object
    pub const IDENTITY: u16 = 0x1018;
    /// First SDO server parameter object (0x1200 + n for additional servers)
    pub const SDO_SERVER_PARAM_BASE: u16 = 0x1200;
    /// First SDO client parameter object (0x1280 + n)
    pub const SDO_CLIENT_PARAM_BASE: u16 = 0x1280;
    /// First RPDO communication parameter object (0x1400 + n)
    pub const RPDO_COMM_BASE: u16 = 0x1400;
    /// First RPDO mapping parameter object (0x1600 + n)
    pub const RPDO_MAPPING_BASE: u16 = 0x1600;
    /// First TPDO communication parameter object (0x1800 + n)
    pub const TPDO_COMM_BASE: u16 = 0x1800;
    /// First TPDO mapping parameter object (0x1A00 + n)
    pub const TPDO_MAPPING_BASE: u16 = 0x1A00;
    /// Vendor-specific area start, used here for the auto-start flag
    pub const AUTO_START: u16 = 0x5000;
}

/// Special values used to access standard objects
pub mod values {
    /// Magic value written to sub 1 of [`object_ids::STORE_PARAMETERS`] to trigger a save ("save" in ASCII)
    pub const SAVE_CMD: u32 = 0x7365_7661;
    /// Magic value written to [`object_ids::RESTORE_PARAMETERS`] to trigger a restore ("load" in ASCII)
    pub const LOAD_CMD: u32 = 0x6461_6f6c;
    /// The resolvable timer tick period of the timer wheel, in microseconds
    pub const TIMER_RESOLUTION_US: u32 = 100;
    /// Maximum number of PDOs of each direction supported by a node (CiA 301 default PDO set)
    pub const MAX_PDOS_PER_DIRECTION: usize = 4;
    /// Maximum number of mapped entries in a single PDO
    pub const MAX_PDO_MAP_ENTRIES: usize = 8;
}
