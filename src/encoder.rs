//! RESP-2 request encoding.
//!
//! A query goes on the wire as an array of bulk strings:
//! `*N\r\n` followed by `$L\r\n<bytes>\r\n` per argument.

use bytes::BytesMut;

use crate::cmd::Query;

/// Encode a query to RESP-2 bytes.
pub fn encode(query: &Query) -> BytesMut {
    let mut buf = BytesMut::with_capacity(256);
    encode_query(query, &mut buf);
    buf
}

/// Encode a query into the provided buffer.
pub fn encode_query(query: &Query, buf: &mut BytesMut) {
    encode_array_header(buf, query.len());
    for arg in query.iter() {
        encode_bulk_string(buf, arg);
    }
}

/// Encode an array header: *<count>\r\n
fn encode_array_header(buf: &mut BytesMut, count: usize) {
    buf.extend_from_slice(b"*");
    buf.extend_from_slice(count.to_string().as_bytes());
    buf.extend_from_slice(b"\r\n");
}

/// Encode a bulk string: $<len>\r\n<data>\r\n
fn encode_bulk_string(buf: &mut BytesMut, data: &[u8]) {
    buf.extend_from_slice(b"$");
    buf.extend_from_slice(data.len().to_string().as_bytes());
    buf.extend_from_slice(b"\r\n");
    buf.extend_from_slice(data);
    buf.extend_from_slice(b"\r\n");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decoder;
    use crate::value::Value;

    #[test]
    fn test_encode_get() {
        let bytes = encode(&Query::cmd("GET").arg("mykey"));
        let expected = b"*2\r\n$3\r\nGET\r\n$5\r\nmykey\r\n";
        assert_eq!(&bytes[..], &expected[..]);
    }

    #[test]
    fn test_encode_ping() {
        let bytes = encode(&Query::cmd("PING"));
        let expected = b"*1\r\n$4\r\nPING\r\n";
        assert_eq!(&bytes[..], &expected[..]);
    }

    #[test]
    fn test_encode_binary_payload() {
        let bytes = encode(&Query::cmd("SET").arg("k").arg(b"a\r\nb\0c".to_vec()));
        let expected = b"*3\r\n$3\r\nSET\r\n$1\r\nk\r\n$6\r\na\r\nb\0c\r\n";
        assert_eq!(&bytes[..], &expected[..]);
    }

    #[test]
    fn test_round_trip_through_decoder() {
        // Length-prefixed framing must survive NULs and CRLF in payloads.
        let args: Vec<&[u8]> = vec![b"ECHO", b"\r\n", b"\0\0", b"plain"];
        let query: Query = args.clone().into_iter().collect();
        let bytes = encode(&query);

        let (value, consumed) = decoder::decode(&bytes).unwrap();
        assert_eq!(consumed, bytes.len());
        let expected = Value::Array(args.into_iter().map(|a| Value::Bulk(a.to_vec())).collect());
        assert_eq!(value, expected);
    }
}
