//! Receiving side of the chunked array channel.

use std::time::Duration;

use tokio::io::{AsyncRead, AsyncWrite};

use imgwire_core::chunk::partition;
use imgwire_core::image::{Storage, VoxelBuffer};
use imgwire_core::wire::WireError;

use crate::error::Result;
use crate::transport::{ConnectionWaiter, PairSocket};

/// Fill `buffer` from the chunks that follow on `socket`.
///
/// The frame before the first chunk must have carried MORE. Each chunk
/// must hold exactly the bytes the partition assigns to it.
pub async fn receive_buffer<S>(
    socket: &mut PairSocket<S>,
    waiter: &ConnectionWaiter,
    buffer: &mut VoxelBuffer,
    timeout: Duration,
) -> Result<usize>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let width = buffer.voxel_type().width();
    let chunks = partition(buffer.len(), width, false);

    for chunk in &chunks {
        let frame = waiter.wait_for_more(socket, timeout).await?;
        let expected = chunk.byte_len(width);
        if frame.payload.len() != expected {
            return Err(WireError::ChunkLengthMismatch {
                expected,
                actual: frame.payload.len(),
            }
            .into());
        }
        buffer.decode_into(chunk.offset, &frame.payload)?;
    }

    tracing::debug!(
        voxel_type = %buffer.voxel_type(),
        elements = buffer.len(),
        chunks = chunks.len(),
        "buffer received"
    );
    Ok(chunks.len())
}

/// Fill every buffer of `storage`, in order.
pub async fn receive_storage<S>(
    socket: &mut PairSocket<S>,
    waiter: &ConnectionWaiter,
    storage: &mut Storage,
    timeout: Duration,
) -> Result<usize>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let mut total = 0;
    for buffer in storage.buffers_mut() {
        total += receive_buffer(socket, waiter, buffer, timeout).await?;
    }
    Ok(total)
}
