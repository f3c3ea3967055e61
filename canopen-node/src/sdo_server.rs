//! Expedited-only SDO server
//!
//! Segmented and block transfer are out of scope (see [`canopen_common::sdo`]); every request this
//! server can answer fits in one 8-byte frame, so there is no transaction state to track across
//! frames beyond "is the server currently disabled".

use canopen_common::can::CanFrame;
use canopen_common::can::CanId;
use canopen_common::sdo::{AbortCode, SdoRequest, SdoResponse};
use canopen_common::AtomicCell;

use crate::dictionary::{AsyncTriggerHook, Dictionary};

/// One SDO server channel: a request/response COB-id pair plus an enable flag
#[allow(missing_debug_implementations)]
pub struct SdoServer {
    request_cob_id: AtomicCell<CanId>,
    response_cob_id: AtomicCell<CanId>,
    enabled: AtomicCell<bool>,
}

impl Default for SdoServer {
    fn default() -> Self {
        Self::new(CanId::new(0x600), CanId::new(0x580))
    }
}

impl SdoServer {
    pub const fn new(request_cob_id: CanId, response_cob_id: CanId) -> Self {
        Self {
            request_cob_id: AtomicCell::new(request_cob_id),
            response_cob_id: AtomicCell::new(response_cob_id),
            enabled: AtomicCell::new(true),
        }
    }

    pub fn request_cob_id(&self) -> CanId {
        self.request_cob_id.load()
    }

    pub fn set_request_cob_id(&self, id: CanId) {
        self.request_cob_id.store(id);
    }

    pub fn response_cob_id(&self) -> CanId {
        self.response_cob_id.load()
    }

    pub fn set_response_cob_id(&self, id: CanId) {
        self.response_cob_id.store(id);
    }

    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled);
    }

    pub fn enabled(&self) -> bool {
        self.enabled.load()
    }

    /// True if `id` is this server's request channel and the server is enabled
    pub fn matches(&self, id: CanId) -> bool {
        self.enabled.load() && id == self.request_cob_id.load()
    }

    /// Handle one request frame, returning the response frame to send
    pub fn handle(&self, dict: &Dictionary, trigger: &dyn AsyncTriggerHook, data: &[u8]) -> CanFrame {
        let response = match SdoRequest::try_from(data) {
            Ok(request) => self.dispatch(dict, trigger, request),
            Err(abort_code) => SdoResponse::abort(0, 0, abort_code),
        };
        response.to_can_frame(self.response_cob_id.load())
    }

    fn dispatch(&self, dict: &Dictionary, trigger: &dyn AsyncTriggerHook, request: SdoRequest) -> SdoResponse {
        match request {
            SdoRequest::InitiateUpload { index, sub } => match self.read(dict, index, sub) {
                Ok(resp) => resp,
                Err(abort_code) => SdoResponse::abort(index, sub, abort_code),
            },
            SdoRequest::InitiateDownload { n, s, index, sub, data } => {
                match self.write(dict, trigger, index, sub, n, s, data) {
                    Ok(()) => SdoResponse::download_acknowledge(index, sub),
                    Err(abort_code) => SdoResponse::abort(index, sub, abort_code),
                }
            }
            SdoRequest::Abort { index, sub, .. } => {
                // A client-initiated abort has no response of its own; the server just drops the
                // state associated with the transaction. Since this server never keeps
                // cross-frame state, there's nothing to drop -- reflect it back so an embedder
                // watching the bus sees the exchange complete.
                SdoResponse::abort(index, sub, AbortCode::GeneralError)
            }
        }
    }

    fn read(&self, dict: &Dictionary, index: u16, sub: u8) -> Result<SdoResponse, AbortCode> {
        let obj = dict.find(index).ok_or(AbortCode::NoSuchObject)?;
        let size = obj.current_size(sub)?;
        if size > 4 {
            return Err(AbortCode::DataTypeMismatchLengthHigh);
        }
        let mut buf = [0u8; 4];
        let n = obj.read(sub, 0, &mut buf[..size])?;
        Ok(SdoResponse::expedited_upload(index, sub, &buf[..n]))
    }

    #[allow(clippy::too_many_arguments)]
    fn write(
        &self,
        dict: &Dictionary,
        trigger: &dyn AsyncTriggerHook,
        index: u16,
        sub: u8,
        n: u8,
        s: bool,
        data: [u8; 4],
    ) -> Result<(), AbortCode> {
        if !s {
            return Err(AbortCode::InvalidValue);
        }
        let len = 4 - n as usize;
        dict.write_buffer(trigger, index, sub, &data[..len])
            .map_err(|_| AbortCode::GeneralError)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dictionary::NullTrigger;
    use crate::object_dict::ScalarField;
    use canopen_common::node_id::NodeId;
    use canopen_common::objects::{AccessType, DataType, ObjectCode, ObjectData, ODEntry, ObjectRawAccess, PdoMapping, SubInfo};

    struct TestVar(ScalarField<u32>);

    impl ObjectRawAccess for TestVar {
        fn read(&self, _sub: u8, offset: usize, buf: &mut [u8]) -> Result<usize, AbortCode> {
            crate::object_dict::SubObjectAccess::read(&self.0, offset, buf)
        }
        fn write(&self, _sub: u8, data: &[u8]) -> Result<(), AbortCode> {
            crate::object_dict::SubObjectAccess::write(&self.0, data)
        }
        fn sub_info(&self, _sub: u8) -> Result<SubInfo, AbortCode> {
            Ok(SubInfo {
                size: 4,
                data_type: DataType::UInt32,
                access_type: AccessType::Rw,
                pdo_mapping: PdoMapping::None,
                persist: false,
            })
        }
        fn object_code(&self) -> ObjectCode {
            ObjectCode::Var
        }
    }

    #[test]
    fn upload_then_download_round_trips() {
        let var = TestVar(ScalarField::new(0x1234_5678));
        let table = [ODEntry { index: 0x2000, data: ObjectData::Storage(&var) }];
        let dict = Dictionary::new(&table, NodeId::Unconfigured);
        let server = SdoServer::default();

        let upload_req = SdoRequest::initiate_upload(0x2000, 0);
        let resp_frame = server.handle(&dict, &NullTrigger, &upload_req.to_bytes());
        let resp = SdoResponse::try_from(&resp_frame).unwrap();
        match resp {
            SdoResponse::ConfirmUpload { index, sub, data, .. } => {
                assert_eq!(index, 0x2000);
                assert_eq!(sub, 0);
                assert_eq!(u32::from_le_bytes(data), 0x1234_5678);
            }
            _ => panic!("expected ConfirmUpload"),
        }

        let download_req = SdoRequest::expedited_download(0x2000, 0, &0xdead_beefu32.to_le_bytes());
        let resp_frame = server.handle(&dict, &NullTrigger, &download_req.to_bytes());
        let resp = SdoResponse::try_from(&resp_frame).unwrap();
        assert_eq!(resp, SdoResponse::download_acknowledge(0x2000, 0));
        assert_eq!(var.0.load(), 0xdead_beef);
    }

    #[test]
    fn upload_of_missing_object_aborts() {
        let table: [ODEntry; 0] = [];
        let dict = Dictionary::new(&table, NodeId::Unconfigured);
        let server = SdoServer::default();
        let req = SdoRequest::initiate_upload(0x3000, 0);
        let resp_frame = server.handle(&dict, &NullTrigger, &req.to_bytes());
        let resp = SdoResponse::try_from(&resp_frame).unwrap();
        assert_eq!(
            resp,
            SdoResponse::abort(0x3000, 0, AbortCode::NoSuchObject)
        );
    }

    #[test]
    fn disabled_server_does_not_match() {
        let server = SdoServer::default();
        server.set_enabled(false);
        assert!(!server.matches(CanId::new(0x601)));
    }
}
