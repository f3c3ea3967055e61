//! Slave-side LSS responder (CiA 305): switching into configuration state and assigning a node-id
//!
//! Only the two exchanges a minimal responder needs are handled here: switch-global (enter/leave
//! configuration state, unaddressed) and configure-node-id. A node boots with whatever node-id its
//! dictionary was built with; if that's [`NodeId::Unconfigured`], LSS is how a master assigns one
//! before the node can do anything past bootup.

use canopen_common::can::CanFrame;
use canopen_common::lss::{LssConfigureNodeIdResponse, LssRequest};
use canopen_common::node_id::NodeId;
use canopen_common::AtomicCell;

/// Whether the responder is accepting configuration commands
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LssMode {
    Waiting,
    Configuring,
}

/// LSS slave state: the current mode and the node-id assigned so far
#[allow(missing_debug_implementations)]
pub struct LssSlave {
    mode: AtomicCell<LssMode>,
    node_id: AtomicCell<NodeId>,
}

impl LssSlave {
    pub const fn new(node_id: NodeId) -> Self {
        Self {
            mode: AtomicCell::new(LssMode::Waiting),
            node_id: AtomicCell::new(node_id),
        }
    }

    pub fn mode(&self) -> LssMode {
        self.mode.load()
    }

    pub fn node_id(&self) -> NodeId {
        self.node_id.load()
    }

    /// Process a decoded LSS request, returning a response frame if one is due
    pub fn process_request(&self, request: LssRequest) -> Option<CanFrame> {
        match request {
            LssRequest::SwitchGlobal { mode } => {
                self.mode.store(if mode == 1 { LssMode::Configuring } else { LssMode::Waiting });
                None
            }
            LssRequest::ConfigureNodeId { node_id } => {
                if self.mode.load() != LssMode::Configuring {
                    return None;
                }
                let response = match NodeId::new(node_id) {
                    Ok(id) => {
                        self.node_id.store(id);
                        LssConfigureNodeIdResponse { error_code: 0 }
                    }
                    Err(_) => LssConfigureNodeIdResponse { error_code: 1 },
                };
                Some(response.to_frame())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn configure_node_id_requires_configuring_mode() {
        let lss = LssSlave::new(NodeId::Unconfigured);
        let resp = lss.process_request(LssRequest::ConfigureNodeId { node_id: 5 });
        assert!(resp.is_none());
        assert_eq!(lss.node_id(), NodeId::Unconfigured);
    }

    #[test]
    fn switch_global_then_configure_assigns_node_id() {
        let lss = LssSlave::new(NodeId::Unconfigured);
        lss.process_request(LssRequest::SwitchGlobal { mode: 1 });
        assert_eq!(lss.mode(), LssMode::Configuring);
        let resp_frame = lss.process_request(LssRequest::ConfigureNodeId { node_id: 5 }).unwrap();
        assert_eq!(resp_frame.data()[1], 0);
        assert_eq!(lss.node_id(), NodeId::new(5).unwrap());
    }

    #[test]
    fn configure_node_id_out_of_range_reports_error() {
        let lss = LssSlave::new(NodeId::Unconfigured);
        lss.process_request(LssRequest::SwitchGlobal { mode: 1 });
        let resp_frame = lss.process_request(LssRequest::ConfigureNodeId { node_id: 200 }).unwrap();
        assert_eq!(resp_frame.data()[1], 1);
        assert_eq!(lss.node_id(), NodeId::Unconfigured);
    }
}
