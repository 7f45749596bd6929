//! Registry and round contract bindings.
//!
//! Event layouts and the `applyToRound` calls are declared with `sol!`; this
//! module converts between those bindings and the crate's own types.

use alloy_primitives::{Address, Bytes, B256, U256};
use alloy_sol_types::{SolCall, SolEvent};

use crate::errors::{ClientError, Result};
use crate::events::{Log, MetaPtr};

mod bindings {
    alloy_sol_types::sol! {
        struct MetaPtr {
            uint256 protocol;
            string pointer;
        }

        event ProjectCreated(uint256 indexed project_id, address indexed owner);
        event MetadataUpdated(uint256 indexed project_id, MetaPtr meta_ptr);

        // Rounds deployed before registry ids existed take an address.
        interface ILegacyRound {
            function applyToRound(address project_id, MetaPtr new_application_meta_ptr) external;
        }

        interface IRound {
            function applyToRound(bytes32 project_id, MetaPtr new_application_meta_ptr) external;
        }
    }
}

pub use bindings::{ILegacyRound, IRound, MetadataUpdated, ProjectCreated};

impl From<&MetaPtr> for bindings::MetaPtr {
    fn from(meta_ptr: &MetaPtr) -> Self {
        Self {
            protocol: U256::from(meta_ptr.protocol),
            pointer: meta_ptr.pointer.clone(),
        }
    }
}

impl TryFrom<bindings::MetaPtr> for MetaPtr {
    type Error = ClientError;

    fn try_from(meta_ptr: bindings::MetaPtr) -> Result<Self> {
        let protocol = u64::try_from(meta_ptr.protocol).map_err(|_| {
            ClientError::EventParse(format!("meta pointer protocol {} out of range", meta_ptr.protocol))
        })?;
        Ok(Self {
            protocol,
            pointer: meta_ptr.pointer,
        })
    }
}

/// An indexed `address` argument, left-padded to a topic.
pub fn address_topic(address: Address) -> B256 {
    address.into_word()
}

/// An indexed `uint256` argument.
pub fn id_topic(id: U256) -> B256 {
    B256::from(id.to_be_bytes::<32>())
}

/// Every 32-byte topic is a valid `uint256`.
pub fn topic_id(topic: &B256) -> U256 {
    U256::from_be_bytes(topic.0)
}

/// The pointer carried by a `MetadataUpdated` log.
pub fn decode_meta_ptr(log: &Log) -> Result<MetaPtr> {
    let event = MetadataUpdated::decode_raw_log(log.topics.iter().copied(), &log.data, true)?;
    MetaPtr::try_from(event.meta_ptr)
}

/// First argument of `applyToRound`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProjectArg {
    /// Legacy `address` parameter; the deployed rounds take no real project id.
    Address(Address),
    /// `bytes32` project identifier.
    Id(B256),
}

/// Calldata for the `applyToRound` overload matching `project`.
pub fn encode_apply_to_round(project: &ProjectArg, meta_ptr: &MetaPtr) -> Bytes {
    let new_application_meta_ptr = bindings::MetaPtr::from(meta_ptr);
    let calldata = match project {
        ProjectArg::Address(project_id) => ILegacyRound::applyToRoundCall {
            project_id: *project_id,
            new_application_meta_ptr,
        }
        .abi_encode(),
        ProjectArg::Id(project_id) => IRound::applyToRoundCall {
            project_id: *project_id,
            new_application_meta_ptr,
        }
        .abi_encode(),
    };
    Bytes::from(calldata)
}
