//! Device topology: master serial devices and their pseudo-terminal
//! virtuals.

use crate::config::{SerialConfig, virtual_path};
use crate::link::{MasterLink, VirtualLink};

/// A virtual device node exposed on behalf of a master.
pub struct VirtualNode {
    pub path: String,
    /// Whether this virtual may write back to the master.
    pub writer: bool,
    pub link: Option<VirtualLink>,
}

/// A physical serial device and the virtuals exposed for it.
pub struct MasterNode {
    pub path: String,
    pub baudrate: u32,
    pub link: Option<MasterLink>,
    pub virtuals: Vec<VirtualNode>,
}

impl MasterNode {
    pub fn writer(&self) -> Option<&VirtualNode> {
        self.virtuals.iter().find(|v| v.writer)
    }
}

/// All configured devices. Links start out unconnected; the server opens
/// them on its reconnect pass.
pub struct SerialState {
    pub masters: Vec<MasterNode>,
}

impl SerialState {
    pub fn from_config(config: &SerialConfig) -> Self {
        let masters = config
            .devices
            .iter()
            .map(|(path, table)| MasterNode {
                path: path.clone(),
                baudrate: table.baudrate,
                link: None,
                virtuals: table
                    .virtuals
                    .iter()
                    .map(|suffix| VirtualNode {
                        path: virtual_path(path, suffix),
                        writer: table.writer.as_deref() == Some(suffix.as_str()),
                        link: None,
                    })
                    .collect(),
            })
            .collect();

        Self { masters }
    }

    pub fn master_count(&self) -> usize {
        self.masters.len()
    }

    pub fn virtual_count(&self) -> usize {
        self.masters.iter().map(|m| m.virtuals.len()).sum()
    }
}
