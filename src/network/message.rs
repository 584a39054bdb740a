// Wire format: a 12-byte NUL-padded ASCII command tag followed by the
// bincode encoding of the command's payload struct. One message per TCP
// connection, read to EOF.

use crate::error::Result;
use crate::utils::serialize;
use serde::{Deserialize, Serialize};

pub const COMMAND_LENGTH: usize = 12;

/// What an inventory or data request refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpType {
    Block,
    Tx,
}

impl OpType {
    pub fn as_str(&self) -> &'static str {
        match self {
            OpType::Block => "block",
            OpType::Tx => "tx",
        }
    }

    /// Kinds arrive as free-form strings from the wire.
    pub fn from_kind(kind: &str) -> Option<OpType> {
        match kind {
            "block" => Some(OpType::Block),
            "tx" => Some(OpType::Tx),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, bincode::Encode, bincode::Decode)]
pub struct Version {
    pub version: usize,
    pub best_height: usize,
    pub addr_from: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, bincode::Encode, bincode::Decode)]
pub struct Addr {
    pub addr_list: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, bincode::Encode, bincode::Decode)]
pub struct GetBlocks {
    pub addr_from: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, bincode::Encode, bincode::Decode)]
pub struct GetData {
    pub addr_from: String,
    pub kind: String,
    pub id: Vec<u8>,
}

#[derive(Debug, Clone, Serialize, Deserialize, bincode::Encode, bincode::Decode)]
pub struct Inv {
    pub addr_from: String,
    pub kind: String,
    pub items: Vec<Vec<u8>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, bincode::Encode, bincode::Decode)]
pub struct BlockMessage {
    pub addr_from: String,
    pub block: Vec<u8>,
}

#[derive(Debug, Clone, Serialize, Deserialize, bincode::Encode, bincode::Decode)]
pub struct TxMessage {
    pub addr_from: String,
    pub transaction: Vec<u8>,
}

/// NUL-pads a command tag to its fixed width. Tags are compile-time
/// constants, all shorter than the frame field.
pub fn command_to_bytes(command: &str) -> [u8; COMMAND_LENGTH] {
    debug_assert!(command.len() <= COMMAND_LENGTH);
    let mut bytes = [0u8; COMMAND_LENGTH];
    bytes[..command.len()].copy_from_slice(command.as_bytes());
    bytes
}

/// Strips the NUL padding back off.
pub fn bytes_to_command(bytes: &[u8]) -> String {
    bytes
        .iter()
        .take_while(|b| **b != 0x00)
        .map(|b| *b as char)
        .collect()
}

/// Assembles a full request: tag plus encoded payload.
pub fn frame<T: Serialize + bincode::Encode>(command: &str, payload: &T) -> Result<Vec<u8>> {
    let mut request = command_to_bytes(command).to_vec();
    request.extend(serialize(payload)?);
    Ok(request)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::deserialize;

    #[test]
    fn test_command_tag_roundtrip() {
        let bytes = command_to_bytes("getblocks");
        assert_eq!(bytes.len(), COMMAND_LENGTH);
        assert_eq!(&bytes[9..], &[0u8, 0u8, 0u8]);
        assert_eq!(bytes_to_command(&bytes), "getblocks");
    }

    #[test]
    fn test_frame_layout() {
        let payload = Version {
            version: 1,
            best_height: 7,
            addr_from: "localhost:5001".to_string(),
        };
        let request = frame("version", &payload).unwrap();

        assert_eq!(bytes_to_command(&request[..COMMAND_LENGTH]), "version");
        let decoded: Version = deserialize(&request[COMMAND_LENGTH..]).unwrap();
        assert_eq!(decoded.best_height, 7);
        assert_eq!(decoded.addr_from, "localhost:5001");
    }

    #[test]
    fn test_op_type_kinds() {
        assert_eq!(OpType::from_kind("block"), Some(OpType::Block));
        assert_eq!(OpType::from_kind("tx"), Some(OpType::Tx));
        assert_eq!(OpType::from_kind("headers"), None);
        assert_eq!(OpType::Block.as_str(), "block");
        assert_eq!(OpType::Tx.as_str(), "tx");
    }
}
