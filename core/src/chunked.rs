//! HTTP/1.1 chunked transfer decoding over a fully buffered body.
//!
//! The client only calls the decoder once the zero-size terminator has been
//! seen (or the peer has closed), so this works on a complete slice rather
//! than incrementally.

/// Why a chunked body could not be decoded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum ChunkedError {
    /// Input ended before the `\r\n` closing a size line.
    #[error("chunk size line is not terminated")]
    UnterminatedSizeLine,

    #[error("chunk size line is empty")]
    EmptySizeLine,

    /// The size line does not start with a hex digit.
    #[error("chunk size is not hexadecimal")]
    InvalidSize,

    /// Fewer bytes remain than the size line announced.
    #[error("chunk data is truncated")]
    TruncatedChunk,

    /// Chunk data is not followed by `\r\n`.
    #[error("chunk data is not followed by CRLF")]
    MissingChunkCrlf,

    #[error("decode buffer allocation failed")]
    Allocation,
}

const INITIAL_CAPACITY: usize = 1024;

/// Decode `input` (the bytes from body start onward) into the payload.
///
/// Decoding stops at the zero-size chunk. A `\r\n` right after it is
/// consumed if present; its absence is tolerated. Anything after that is
/// ignored.
pub fn decode_chunked(input: &[u8]) -> Result<Vec<u8>, ChunkedError> {
    let mut out = Vec::new();
    out.try_reserve_exact(INITIAL_CAPACITY)
        .map_err(|_| ChunkedError::Allocation)?;

    let mut pos = 0;
    while pos < input.len() {
        let line_len = find_crlf(&input[pos..]).ok_or(ChunkedError::UnterminatedSizeLine)?;
        if line_len == 0 {
            return Err(ChunkedError::EmptySizeLine);
        }
        let size = parse_hex_prefix(&input[pos..pos + line_len]).ok_or(ChunkedError::InvalidSize)?;
        pos += line_len + 2;

        if size == 0 {
            if input[pos..].starts_with(b"\r\n") {
                pos += 2;
            }
            tracing::trace!(consumed = pos, decoded = out.len(), "chunked terminator reached");
            break;
        }

        let end = pos
            .checked_add(size)
            .filter(|&end| end <= input.len())
            .ok_or(ChunkedError::TruncatedChunk)?;

        reserve_doubling(&mut out, size)?;
        out.extend_from_slice(&input[pos..end]);
        pos = end;

        if !input[pos..].starts_with(b"\r\n") {
            return Err(ChunkedError::MissingChunkCrlf);
        }
        pos += 2;
    }

    out.shrink_to_fit();
    Ok(out)
}

/// Encode `payload` as chunks of at most `chunk_size` bytes followed by the
/// zero-size terminator.
pub fn encode_chunked(payload: &[u8], chunk_size: usize) -> Vec<u8> {
    let mut out = Vec::with_capacity(payload.len() + 16);
    for chunk in payload.chunks(chunk_size.max(1)) {
        out.extend_from_slice(format!("{:x}\r\n", chunk.len()).as_bytes());
        out.extend_from_slice(chunk);
        out.extend_from_slice(b"\r\n");
    }
    out.extend_from_slice(b"0\r\n\r\n");
    out
}

fn find_crlf(data: &[u8]) -> Option<usize> {
    data.windows(2).position(|w| w == b"\r\n")
}

/// Leading hex digits after optional whitespace; extensions such as
/// `;name=value` are ignored.
fn parse_hex_prefix(line: &[u8]) -> Option<usize> {
    let digits = line
        .iter()
        .skip_while(|b| b.is_ascii_whitespace())
        .map_while(|&b| (b as char).to_digit(16));

    let mut value: usize = 0;
    let mut seen = false;
    for digit in digits {
        seen = true;
        value = value.checked_mul(16)?.checked_add(digit as usize)?;
    }
    seen.then_some(value)
}

fn reserve_doubling(out: &mut Vec<u8>, extra: usize) -> Result<(), ChunkedError> {
    let needed = out.len().checked_add(extra).ok_or(ChunkedError::Allocation)?;
    if needed <= out.capacity() {
        return Ok(());
    }
    let mut target = out.capacity().max(INITIAL_CAPACITY);
    while target < needed {
        target = target.saturating_mul(2);
    }
    out.try_reserve_exact(target - out.len())
        .map_err(|_| ChunkedError::Allocation)
}
