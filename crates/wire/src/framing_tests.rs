// SPDX-License-Identifier: MIT

//! Wire format tests: length-prefix framing and JSON encoding.

use super::*;

#[test]
fn encode_returns_json_without_length_prefix() {
    let value = serde_json::json!({"ok": true});
    let encoded = encode(&value).expect("encode failed");

    let json_str = std::str::from_utf8(&encoded).expect("should be valid UTF-8");
    assert!(json_str.starts_with('{'), "should be JSON object: {}", json_str);
}

#[tokio::test]
async fn read_write_message_roundtrip() {
    let original = b"hello world";

    let mut buffer = Vec::new();
    write_message(&mut buffer, original).await.expect("write failed");

    assert_eq!(buffer.len(), 4 + original.len());

    let mut cursor = std::io::Cursor::new(buffer);
    let read_back = read_message(&mut cursor).await.expect("read failed");

    assert_eq!(read_back, original);
}

#[tokio::test]
async fn write_message_adds_length_prefix() {
    let data = b"test data";

    let mut buffer = Vec::new();
    write_message(&mut buffer, data).await.expect("write failed");

    let len = u32::from_be_bytes([buffer[0], buffer[1], buffer[2], buffer[3]]) as usize;

    assert_eq!(len, data.len());
    assert_eq!(&buffer[4..], data);
}

#[tokio::test]
async fn read_message_on_empty_stream_is_connection_closed() {
    let mut cursor = std::io::Cursor::new(Vec::<u8>::new());
    let err = read_message(&mut cursor).await.unwrap_err();
    assert!(matches!(err, ProtocolError::ConnectionClosed));
}

#[tokio::test]
async fn read_message_with_partial_header_is_connection_closed() {
    let mut cursor = std::io::Cursor::new(vec![0u8, 1u8]);
    let err = read_message(&mut cursor).await.unwrap_err();
    assert!(matches!(err, ProtocolError::ConnectionClosed));
}

#[tokio::test]
async fn read_message_with_truncated_body_is_connection_closed() {
    // Claims a 10-byte body but only provides 3.
    let mut buf = 10u32.to_be_bytes().to_vec();
    buf.extend_from_slice(b"abc");
    let mut cursor = std::io::Cursor::new(buf);
    let err = read_message(&mut cursor).await.unwrap_err();
    assert!(matches!(err, ProtocolError::ConnectionClosed));
}

#[tokio::test]
async fn read_framed_times_out_on_empty_stream() {
    let (_client, mut server) = tokio::io::duplex(64);
    let result: Result<serde_json::Value, _> =
        read_framed(&mut server, std::time::Duration::from_millis(20)).await;
    assert!(matches!(result.unwrap_err(), ProtocolError::Timeout));
}

#[tokio::test]
async fn write_then_read_framed_roundtrip() {
    let mut buffer = Vec::new();
    let value = serde_json::json!({"kind": "ping", "n": 7});
    write_framed(&mut buffer, &value, std::time::Duration::from_secs(1)).await.expect("write");

    let mut cursor = std::io::Cursor::new(buffer);
    let decoded: serde_json::Value =
        read_framed(&mut cursor, std::time::Duration::from_secs(1)).await.expect("read");
    assert_eq!(decoded, value);
}
