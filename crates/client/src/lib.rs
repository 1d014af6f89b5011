//! Controller interfaces the agent drives the chains through.
//!
//! Two planes: the consumer chain carries randomness commitments and
//! finality votes; the Babylon control plane carries provider registration
//! and account-level queries. Transport implementations live with the
//! daemon that embeds the agent; the service logic and its tests only see
//! these traits.

pub mod error;
pub mod http;
pub mod retry;
pub mod traits;
pub mod types;

pub use error::{ClientError, ClientResult};
pub use http::JsonRpcClient;
pub use traits::{BabylonController, ConsumerController};
pub use types::FinalitySigItem;
