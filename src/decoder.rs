//! RESP-2 reply decoding.
//!
//! Parses wire protocol replies into [`Value`]s. Decoding is
//! buffer-oriented: [`decode`] returns [`RedisError::Incomplete`] when the
//! buffer does not yet hold a full reply, and the transport reads more
//! bytes and retries.

use std::io::Cursor;

use bytes::Buf;

use crate::error::{RedisError, RedisResult};
use crate::value::Value;

/// Decode one reply from the buffer.
///
/// Returns the parsed value and the number of bytes consumed.
pub fn decode(buf: &[u8]) -> RedisResult<(Value, usize)> {
    let mut cursor = Cursor::new(buf);
    let value = decode_value(&mut cursor)?;
    Ok((value, cursor.position() as usize))
}

fn decode_value(cursor: &mut Cursor<&[u8]>) -> RedisResult<Value> {
    if !cursor.has_remaining() {
        return Err(RedisError::Incomplete);
    }

    let type_byte = cursor.get_u8();

    match type_byte {
        // Simple string: +OK\r\n
        b'+' => {
            let line = read_line(cursor)?;
            Ok(Value::String(text(line)?.to_string()))
        }

        // Error: -ERR message\r\n. A value, not a failure.
        b'-' => {
            let line = read_line(cursor)?;
            Ok(Value::Error(text(line)?.to_string()))
        }

        // Integer: :1000\r\n
        b':' => {
            let line = read_line(cursor)?;
            Ok(Value::Number(parse_int(line)? as f64))
        }

        // Bulk string: $5\r\nhello\r\n; $-1\r\n is null.
        b'$' => {
            let len = parse_int(read_line(cursor)?)?;
            if len < 0 {
                return Ok(Value::Null);
            }

            let len = len as usize;
            if cursor.remaining() < len + 2 {
                return Err(RedisError::Incomplete);
            }

            let mut data = vec![0u8; len];
            cursor.copy_to_slice(&mut data);
            cursor.advance(2); // trailing CRLF

            Ok(Value::Bulk(data))
        }

        // Array: *2\r\n...; a negative count clamps to empty.
        b'*' => {
            let count = parse_int(read_line(cursor)?)?.max(0) as usize;

            let mut items = Vec::with_capacity(count);
            for _ in 0..count {
                items.push(decode_value(cursor)?);
            }
            Ok(Value::Array(items))
        }

        other => Err(RedisError::BadType(other)),
    }
}

/// Read up to CRLF, consuming the terminator but returning the line
/// without it.
fn read_line<'a>(cursor: &mut Cursor<&'a [u8]>) -> RedisResult<&'a [u8]> {
    let start = cursor.position() as usize;
    let buf = *cursor.get_ref();

    let mut end = start;
    while end + 1 < buf.len() {
        if buf[end] == b'\r' && buf[end + 1] == b'\n' {
            cursor.set_position((end + 2) as u64);
            return Ok(&buf[start..end]);
        }
        end += 1;
    }

    Err(RedisError::Incomplete)
}

fn parse_int(line: &[u8]) -> RedisResult<i64> {
    std::str::from_utf8(line)
        .ok()
        .and_then(|s| s.parse().ok())
        .ok_or_else(|| RedisError::BadInteger(line.to_vec()))
}

fn text(line: &[u8]) -> RedisResult<&str> {
    std::str::from_utf8(line)
        .map_err(|_| RedisError::Protocol("non-UTF-8 text line".into()))
}
