use fp_primitives::Buf32;
use tokio::sync::mpsc;

use crate::error::InstanceError;

/// An error severe enough to pause a provider, surfaced to the app
/// supervisor over an unbounded channel.
#[derive(Debug)]
pub struct CriticalError {
    pub btc_pk: Buf32,
    pub err: InstanceError,
}

pub type CriticalSender = mpsc::UnboundedSender<CriticalError>;
pub type CriticalReceiver = mpsc::UnboundedReceiver<CriticalError>;

pub fn critical_channel() -> (CriticalSender, CriticalReceiver) {
    mpsc::unbounded_channel()
}
