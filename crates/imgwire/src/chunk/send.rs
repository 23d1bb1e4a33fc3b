//! Sending side of the chunked array channel.

use bytes::BytesMut;
use tokio::io::{AsyncRead, AsyncWrite};

use imgwire_core::chunk::partition;
use imgwire_core::image::{Storage, VoxelBuffer};

use crate::error::Result;
use crate::transport::PairSocket;

/// Send one buffer. The last chunk carries `more_coming`.
///
/// Returns the number of chunks written.
pub async fn send_buffer<S>(
    socket: &mut PairSocket<S>,
    buffer: &VoxelBuffer,
    more_coming: bool,
) -> Result<usize>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let width = buffer.voxel_type().width();
    let chunks = partition(buffer.len(), width, more_coming);

    // Reused for every chunk of this buffer.
    let mut scratch = BytesMut::with_capacity(chunks[0].byte_len(width));
    for chunk in &chunks {
        scratch.clear();
        buffer.encode_range(chunk.range(), &mut scratch);
        socket.send(&scratch, chunk.more).await?;
    }

    tracing::debug!(
        voxel_type = %buffer.voxel_type(),
        elements = buffer.len(),
        chunks = chunks.len(),
        "buffer sent"
    );
    Ok(chunks.len())
}

/// Send every buffer of `storage` in order. Planes before the last always
/// signal MORE; the last plane's last chunk carries `more_coming`.
pub async fn send_storage<S>(
    socket: &mut PairSocket<S>,
    storage: &Storage,
    more_coming: bool,
) -> Result<usize>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let buffers = storage.buffers();
    let mut total = 0;
    for (i, buffer) in buffers.iter().enumerate() {
        let last = i + 1 == buffers.len();
        total += send_buffer(socket, buffer, !last || more_coming).await?;
    }
    Ok(total)
}
