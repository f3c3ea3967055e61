//! SDO request/response messages, expedited transfer only
//!
//! Segmented and block transfer are explicitly out of scope; every value exchanged over SDO in
//! this crate fits in the 4 data bytes of an expedited transfer.

use int_enum::IntEnum;

use crate::can::{CanFrame, CanId};

#[derive(Clone, Copy, Debug, PartialEq)]
#[repr(u8)]
enum ServerCommand {
    Upload = 2,
    Download = 3,
    Abort = 4,
}

impl TryFrom<u8> for ServerCommand {
    type Error = ();

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            2 => Ok(Self::Upload),
            3 => Ok(Self::Download),
            4 => Ok(Self::Abort),
            _ => Err(()),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
#[repr(u8)]
enum ClientCommand {
    InitiateDownload = 1,
    InitiateUpload = 2,
    Abort = 4,
}

impl TryFrom<u8> for ClientCommand {
    type Error = ();

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(Self::InitiateDownload),
            2 => Ok(Self::InitiateUpload),
            4 => Ok(Self::Abort),
            _ => Err(()),
        }
    }
}

/// SDO abort code (CiA 301 table 23), the subset reachable by an expedited-only server
#[derive(Clone, Copy, Debug, PartialEq, IntEnum)]
#[repr(u32)]
pub enum AbortCode {
    /// SDO protocol timed out
    SdoTimeout = 0x0504_0000,
    /// Client/server command specifier not valid or unknown
    InvalidCommandSpecifier = 0x0504_0001,
    /// Unsupported access to an object
    UnsupportedAccess = 0x0601_0000,
    /// Attempt to read a write only object
    WriteOnly = 0x0601_0001,
    /// Attempt to write a read only object
    ReadOnly = 0x0601_0002,
    /// Object does not exist in the dictionary
    NoSuchObject = 0x0602_0000,
    /// Object cannot be mapped to the PDO
    UnnallowedPdo = 0x0604_0041,
    /// The number and length of objects would exceed PDO length
    PdoTooLong = 0x0604_0042,
    /// General parameter incompatibility
    IncompatibleParameter = 0x0604_0043,
    /// Access failed due to hardware error
    HardwareError = 0x0606_0000,
    /// Data type does not match, length of service parameter does not match
    DataTypeMismatch = 0x0607_0010,
    /// Data type does not match, length of service parameter too high
    DataTypeMismatchLengthHigh = 0x0607_0012,
    /// Data type does not match, length of service parameter too low
    DataTypeMismatchLengthLow = 0x0607_0013,
    /// Sub-index does not exist
    NoSuchSubIndex = 0x0609_0011,
    /// Invalid value for parameter (download only)
    InvalidValue = 0x0609_0030,
    /// Value of parameter too high (download only)
    ValueTooHigh = 0x0609_0031,
    /// Value of parameter too low (download only)
    ValueTooLow = 0x0609_0032,
    /// Resource isn't available
    ResourceNotAvailable = 0x060A_0023,
    /// General error
    GeneralError = 0x0800_0000,
    /// Data cannot be transferred or stored to the application
    CantStore = 0x0800_0020,
    /// Data cannot be transferred or stored to the application because of local control
    CantStoreLocalControl = 0x0800_0021,
    /// Data cannot be transferred or stored to the application because of the device state
    CantStoreDeviceState = 0x0800_0022,
    /// No object dictionary is present
    NoObjectDict = 0x0800_0023,
    /// No data available
    NoData = 0x0800_0024,
}

/// An expedited SDO request, client to server
#[derive(Clone, Copy, Debug)]
pub enum SdoRequest {
    /// Begin (and complete, since only expedited transfer is supported) a download
    InitiateDownload {
        /// Number of unused bytes in data, 0..=3
        n: u8,
        /// size-valid flag
        s: bool,
        /// Object index
        index: u16,
        /// Object sub-index
        sub: u8,
        /// The value to write, left-aligned
        data: [u8; 4],
    },
    /// Begin (and implicitly complete) an upload
    InitiateUpload {
        /// The requested object index
        index: u16,
        /// The requested sub object
        sub: u8,
    },
    /// Abort an ongoing transaction
    Abort {
        /// The object index of the active transaction
        index: u16,
        /// The sub object of the active transaction
        sub: u8,
        /// The abort reason
        abort_code: u32,
    },
}

impl SdoRequest {
    /// Create an abort message
    pub fn abort(index: u16, sub: u8, abort_code: AbortCode) -> Self {
        SdoRequest::Abort { index, sub, abort_code: abort_code as u32 }
    }

    /// Create an expedited download request
    pub fn expedited_download(index: u16, sub: u8, data: &[u8]) -> Self {
        assert!(data.len() <= 4, "expedited SDO download is limited to 4 bytes");
        let mut msg_data = [0; 4];
        msg_data[0..data.len()].copy_from_slice(data);
        SdoRequest::InitiateDownload { n: (4 - data.len()) as u8, s: true, index, sub, data: msg_data }
    }

    /// Create an `InitiateUpload` request
    pub fn initiate_upload(index: u16, sub: u8) -> Self {
        SdoRequest::InitiateUpload { index, sub }
    }

    /// Encode to the 8-byte message payload
    pub fn to_bytes(self) -> [u8; 8] {
        let mut payload = [0; 8];
        match self {
            SdoRequest::InitiateDownload { n, s, index, sub, data } => {
                payload[0] = ((ClientCommand::InitiateDownload as u8) << 5) | (n << 2) | (1 << 1) | s as u8;
                payload[1] = (index & 0xff) as u8;
                payload[2] = (index >> 8) as u8;
                payload[3] = sub;
                payload[4..8].copy_from_slice(&data);
            }
            SdoRequest::InitiateUpload { index, sub } => {
                payload[0] = (ClientCommand::InitiateUpload as u8) << 5;
                payload[1] = (index & 0xff) as u8;
                payload[2] = (index >> 8) as u8;
                payload[3] = sub;
            }
            SdoRequest::Abort { index, sub, abort_code } => {
                payload[0] = (ClientCommand::Abort as u8) << 5;
                payload[1] = (index & 0xff) as u8;
                payload[2] = (index >> 8) as u8;
                payload[3] = sub;
                payload[4..8].copy_from_slice(&abort_code.to_le_bytes());
            }
        }
        payload
    }

    /// Encode as a CAN frame addressed to `id`
    pub fn to_can_frame(self, id: CanId) -> CanFrame {
        CanFrame::new(id, &self.to_bytes())
    }
}

impl TryFrom<&[u8]> for SdoRequest {
    type Error = AbortCode;

    fn try_from(value: &[u8]) -> Result<Self, Self::Error> {
        if value.len() < 8 {
            return Err(AbortCode::DataTypeMismatchLengthLow);
        }
        let ccs = value[0] >> 5;
        let ccs: ClientCommand = ccs.try_into().map_err(|_| AbortCode::InvalidCommandSpecifier)?;
        match ccs {
            ClientCommand::InitiateDownload => {
                let e = (value[0] & (1 << 1)) != 0;
                if !e {
                    // Segmented download was requested; this server only implements expedited.
                    return Err(AbortCode::UnsupportedAccess);
                }
                let n = (value[0] >> 2) & 0x3;
                let s = (value[0] & (1 << 0)) != 0;
                let index = value[1] as u16 | ((value[2] as u16) << 8);
                let sub = value[3];
                let data = value[4..8].try_into().unwrap();
                Ok(SdoRequest::InitiateDownload { n, s, index, sub, data })
            }
            ClientCommand::InitiateUpload => {
                let index = value[1] as u16 | ((value[2] as u16) << 8);
                let sub = value[3];
                Ok(SdoRequest::InitiateUpload { index, sub })
            }
            ClientCommand::Abort => {
                let index = value[1] as u16 | ((value[2] as u16) << 8);
                let sub = value[3];
                let abort_code = u32::from_le_bytes(value[4..8].try_into().unwrap());
                Ok(SdoRequest::Abort { index, sub, abort_code })
            }
        }
    }
}

/// An expedited SDO response, server to client
#[derive(Copy, Clone, Debug, PartialEq)]
pub enum SdoResponse {
    /// Response to an [`SdoRequest::InitiateUpload`]
    ConfirmUpload {
        /// Number of unused bytes in data, 0..=3
        n: u8,
        /// size-valid flag
        s: bool,
        /// The index of the object uploaded
        index: u16,
        /// The sub object uploaded
        sub: u8,
        /// The value read, left-aligned
        data: [u8; 4],
    },
    /// Response to an [`SdoRequest::InitiateDownload`]
    ConfirmDownload {
        /// The index of the object written
        index: u16,
        /// The sub object written
        sub: u8,
    },
    /// Sent by server to abort an ongoing transaction
    Abort {
        /// Object index of the active transfer
        index: u16,
        /// Sub object of the active transfer
        sub: u8,
        /// Abort reason
        abort_code: u32,
    },
}

impl SdoResponse {
    /// Create a `ConfirmUpload` response for an expedited upload
    pub fn expedited_upload(index: u16, sub: u8, data: &[u8]) -> SdoResponse {
        assert!(data.len() <= 4, "expedited SDO upload is limited to 4 bytes");
        let mut msg_data = [0; 4];
        msg_data[0..data.len()].copy_from_slice(data);
        SdoResponse::ConfirmUpload { n: (4 - data.len()) as u8, s: true, index, sub, data: msg_data }
    }

    /// Create a `ConfirmDownload` response
    pub fn download_acknowledge(index: u16, sub: u8) -> SdoResponse {
        SdoResponse::ConfirmDownload { index, sub }
    }

    /// Create an abort response
    pub fn abort(index: u16, sub: u8, abort_code: AbortCode) -> SdoResponse {
        SdoResponse::Abort { index, sub, abort_code: abort_code as u32 }
    }

    /// Encode to the 8-byte message payload
    pub fn to_bytes(self) -> [u8; 8] {
        let mut payload = [0; 8];
        match self {
            SdoResponse::ConfirmUpload { n, s, index, sub, data } => {
                payload[0] = ((ServerCommand::Upload as u8) << 5) | ((n & 0x3) << 2) | (1 << 1) | s as u8;
                payload[1] = (index & 0xff) as u8;
                payload[2] = (index >> 8) as u8;
                payload[3] = sub;
                payload[4..8].copy_from_slice(&data);
            }
            SdoResponse::ConfirmDownload { index, sub } => {
                payload[0] = (ServerCommand::Download as u8) << 5;
                payload[1] = (index & 0xff) as u8;
                payload[2] = (index >> 8) as u8;
                payload[3] = sub;
            }
            SdoResponse::Abort { index, sub, abort_code } => {
                payload[0] = (ServerCommand::Abort as u8) << 5;
                payload[1] = (index & 0xff) as u8;
                payload[2] = (index >> 8) as u8;
                payload[3] = sub;
                payload[4..8].copy_from_slice(&abort_code.to_le_bytes());
            }
        }
        payload
    }

    /// Encode as a CAN frame addressed to `id`
    pub fn to_can_frame(self, id: CanId) -> CanFrame {
        CanFrame::new(id, &self.to_bytes())
    }
}

impl TryFrom<&CanFrame> for SdoResponse {
    type Error = ();

    fn try_from(frame: &CanFrame) -> Result<Self, Self::Error> {
        let data = frame.data();
        if data.len() < 8 {
            return Err(());
        }
        let scs = data[0] >> 5;
        let command: ServerCommand = scs.try_into()?;
        match command {
            ServerCommand::Upload => {
                let n = (data[0] >> 2) & 0x3;
                let s = (data[0] & (1 << 0)) != 0;
                let index = u16::from_le_bytes(data[1..3].try_into().unwrap());
                let sub = data[3];
                let value: [u8; 4] = data[4..8].try_into().unwrap();
                Ok(SdoResponse::ConfirmUpload { n, s, index, sub, data: value })
            }
            ServerCommand::Download => {
                let index = u16::from_le_bytes(data[1..3].try_into().unwrap());
                let sub = data[3];
                Ok(SdoResponse::ConfirmDownload { index, sub })
            }
            ServerCommand::Abort => {
                let index = u16::from_le_bytes(data[1..3].try_into().unwrap());
                let sub = data[3];
                let abort_code = u32::from_le_bytes(data[4..8].try_into().unwrap());
                Ok(SdoResponse::Abort { index, sub, abort_code })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn expedited_download_round_trips() {
        let req = SdoRequest::expedited_download(0x2000, 1, &[1, 2, 3, 4]);
        let bytes = req.to_bytes();
        let decoded = SdoRequest::try_from(&bytes[..]).unwrap();
        match decoded {
            SdoRequest::InitiateDownload { index, sub, data, s, .. } => {
                assert_eq!(index, 0x2000);
                assert_eq!(sub, 1);
                assert_eq!(data, [1, 2, 3, 4]);
                assert!(s);
            }
            _ => panic!("wrong variant"),
        }
    }

    #[test]
    fn segmented_download_request_is_rejected() {
        let mut bytes = [0u8; 8];
        bytes[0] = (ClientCommand::InitiateDownload as u8) << 5; // e=0
        let err = SdoRequest::try_from(&bytes[..]).unwrap_err();
        assert_eq!(err, AbortCode::UnsupportedAccess);
    }

    #[test]
    fn expedited_upload_response_round_trips() {
        let resp = SdoResponse::expedited_upload(0x1018, 1, &[0xaa, 0xbb]);
        let frame = resp.to_can_frame(CanId::new(0x581));
        let decoded = SdoResponse::try_from(&frame).unwrap();
        assert_eq!(decoded, resp);
    }
}
