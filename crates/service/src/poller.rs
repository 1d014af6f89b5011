use std::sync::Arc;

use fp_client::{ClientError, ClientResult, ConsumerController};
use fp_primitives::BlockInfo;
use tracing::trace;

/// Lazy, monotonically-advancing feed of consumer chain blocks.
///
/// The poller never yields a height twice and never yields out of order;
/// it is restartable from any height by constructing a new one.
pub struct ChainPoller {
    consumer: Arc<dyn ConsumerController>,
    next_height: u64,
    batch_size: u32,
}

impl ChainPoller {
    pub fn new(consumer: Arc<dyn ConsumerController>, start_height: u64, batch_size: u32) -> Self {
        Self {
            consumer,
            next_height: start_height,
            batch_size: batch_size.max(1),
        }
    }

    pub fn next_height(&self) -> u64 {
        self.next_height
    }

    /// Fetches the next in-order batch of blocks up to the current tip.
    /// Returns an empty batch when the chain has nothing new.
    pub async fn poll(&mut self) -> ClientResult<Vec<BlockInfo>> {
        let tip = self.consumer.query_latest_block_height().await?;
        if tip < self.next_height {
            return Ok(Vec::new());
        }

        let end = tip.min(self.next_height + (self.batch_size as u64 - 1));
        let blocks = self
            .consumer
            .query_blocks(self.next_height, end, self.batch_size)
            .await?;

        // The controller contract is ascending in-range heights; anything
        // else would make the vote pipeline skip or repeat heights.
        let mut expect_above = self.next_height;
        for block in &blocks {
            if block.height < expect_above || block.height > end {
                return Err(ClientError::Rejected(format!(
                    "block feed out of order at height {}",
                    block.height
                )));
            }
            expect_above = block.height + 1;
        }

        if let Some(last) = blocks.last() {
            trace!(from = self.next_height, to = last.height, "polled blocks");
            self.next_height = last.height + 1;
        }
        Ok(blocks)
    }
}
