#![forbid(unsafe_code)]
#![cfg_attr(docsrs, feature(doc_cfg))]
#![doc = include_str!("../README.md")]

mod id;
mod state;
mod value;

pub use id::{BatchId, EdgeId, MessageId, NodeId, WorkflowId};
pub use state::GlobalState;
pub use value::{DataValue, TypedValue};
