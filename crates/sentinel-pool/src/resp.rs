//! Minimal RESP2 encoding and incremental reply parsing.

use bytes::{BufMut, BytesMut};
use common::{Error, Result};

/// Largest bulk string accepted from a peer
pub const MAX_BULK_LEN: i64 = 512 * 1024 * 1024;

/// Largest array accepted from a peer
pub const MAX_ARRAY_LEN: i64 = 1024 * 1024;

/// Elements reserved up front, whatever the announced array length
const ARRAY_PREALLOC: usize = 64;

/// A decoded RESP reply
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RespValue {
    Simple(String),
    Error(String),
    Integer(i64),
    Bulk(Option<Vec<u8>>),
    Array(Option<Vec<RespValue>>),
}

impl RespValue {
    /// Text content of a simple or bulk string reply
    pub fn as_text(&self) -> Option<String> {
        match self {
            RespValue::Simple(s) => Some(s.clone()),
            RespValue::Bulk(Some(data)) => Some(String::from_utf8_lossy(data).into_owned()),
            _ => None,
        }
    }

    /// Turn an error reply into `Err`, pass anything else through
    pub fn into_result(self) -> Result<RespValue> {
        match self {
            RespValue::Error(msg) => Err(Error::server(msg)),
            other => Ok(other),
        }
    }

    /// Interpret the reply as an array of strings; `Ok(None)` for nil replies
    pub fn into_string_array(self) -> Result<Option<Vec<String>>> {
        match self.into_result()? {
            RespValue::Array(None) | RespValue::Bulk(None) => Ok(None),
            RespValue::Array(Some(items)) => items
                .iter()
                .map(|item| {
                    item.as_text()
                        .ok_or_else(|| Error::protocol(format!("expected string element, got {:?}", item)))
                })
                .collect::<Result<Vec<_>>>()
                .map(Some),
            other => Err(Error::protocol(format!("expected array reply, got {:?}", other))),
        }
    }
}

/// Encode a command as an array of bulk strings
pub fn encode_command(args: &[&str], buf: &mut BytesMut) {
    buf.put_slice(format!("*{}\r\n", args.len()).as_bytes());
    for arg in args {
        buf.put_slice(format!("${}\r\n", arg.len()).as_bytes());
        buf.put_slice(arg.as_bytes());
        buf.put_slice(b"\r\n");
    }
}

/// Parse one reply from the front of `buffer`.
///
/// Returns `Ok(None)` when more data is needed, otherwise the value and the
/// number of bytes it occupied.
pub fn parse_reply(buffer: &[u8]) -> Result<Option<(RespValue, usize)>> {
    let Some(&kind) = buffer.first() else {
        return Ok(None);
    };
    let Some((line, mut pos)) = read_line(&buffer[1..]) else {
        return Ok(None);
    };
    pos += 1;

    let value = match kind {
        b'+' => RespValue::Simple(line_text(line)?),
        b'-' => RespValue::Error(line_text(line)?),
        b':' => RespValue::Integer(parse_int(line)?),
        b'$' => {
            let len = parse_int(line)?;
            if len > MAX_BULK_LEN {
                return Err(Error::protocol(format!("bulk length {} exceeds limit", len)));
            }
            if len < 0 {
                RespValue::Bulk(None)
            } else {
                let len = len as usize;
                if buffer.len() < pos + len + 2 {
                    return Ok(None);
                }
                if &buffer[pos + len..pos + len + 2] != b"\r\n" {
                    return Err(Error::protocol("bulk string not terminated by CRLF"));
                }
                let data = buffer[pos..pos + len].to_vec();
                pos += len + 2;
                RespValue::Bulk(Some(data))
            }
        }
        b'*' => {
            let len = parse_int(line)?;
            if len > MAX_ARRAY_LEN {
                return Err(Error::protocol(format!("array length {} exceeds limit", len)));
            }
            if len < 0 {
                RespValue::Array(None)
            } else {
                let mut items = Vec::with_capacity((len as usize).min(ARRAY_PREALLOC));
                for _ in 0..len {
                    match parse_reply(&buffer[pos..])? {
                        Some((item, used)) => {
                            items.push(item);
                            pos += used;
                        }
                        None => return Ok(None),
                    }
                }
                RespValue::Array(Some(items))
            }
        }
        other => {
            return Err(Error::protocol(format!(
                "unexpected reply type byte 0x{:02x}",
                other
            )));
        }
    };

    Ok(Some((value, pos)))
}

/// Split off a CRLF-terminated line, returning it and the bytes consumed
fn read_line(buffer: &[u8]) -> Option<(&[u8], usize)> {
    let end = buffer.windows(2).position(|w| w == b"\r\n")?;
    Some((&buffer[..end], end + 2))
}

fn line_text(line: &[u8]) -> Result<String> {
    String::from_utf8(line.to_vec()).map_err(|e| Error::protocol(format!("invalid UTF-8: {}", e)))
}

fn parse_int(line: &[u8]) -> Result<i64> {
    std::str::from_utf8(line)
        .ok()
        .and_then(|s| s.parse::<i64>().ok())
        .ok_or_else(|| Error::protocol(format!("invalid integer '{}'", String::from_utf8_lossy(line))))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_command() {
        let mut buf = BytesMut::new();
        encode_command(&["SENTINEL", "get-master-addr-by-name", "mymaster"], &mut buf);
        assert_eq!(
            &buf[..],
            b"*3\r\n$8\r\nSENTINEL\r\n$23\r\nget-master-addr-by-name\r\n$8\r\nmymaster\r\n"
        );
    }

    #[test]
    fn test_parse_simple_types() {
        assert_eq!(
            parse_reply(b"+OK\r\n").unwrap(),
            Some((RespValue::Simple("OK".into()), 5))
        );
        assert_eq!(
            parse_reply(b"-ERR no such master\r\n").unwrap(),
            Some((RespValue::Error("ERR no such master".into()), 21))
        );
        assert_eq!(
            parse_reply(b":42\r\n").unwrap(),
            Some((RespValue::Integer(42), 5))
        );
        assert_eq!(
            parse_reply(b"$-1\r\n").unwrap(),
            Some((RespValue::Bulk(None), 5))
        );
        assert_eq!(
            parse_reply(b"*-1\r\n").unwrap(),
            Some((RespValue::Array(None), 5))
        );
    }

    #[test]
    fn test_parse_address_reply() {
        let raw = b"*2\r\n$8\r\n10.0.0.1\r\n$4\r\n6380\r\n";
        let (value, used) = parse_reply(raw).unwrap().unwrap();
        assert_eq!(used, raw.len());
        assert_eq!(
            value.into_string_array().unwrap(),
            Some(vec!["10.0.0.1".to_string(), "6380".to_string()])
        );
    }

    #[test]
    fn test_parse_incomplete() {
        assert_eq!(parse_reply(b"").unwrap(), None);
        assert_eq!(parse_reply(b"+OK").unwrap(), None);
        assert_eq!(parse_reply(b"$5\r\nhel").unwrap(), None);
        assert_eq!(parse_reply(b"*2\r\n$1\r\na\r\n").unwrap(), None);
    }

    #[test]
    fn test_parse_leaves_trailing_data() {
        let raw = b"+OK\r\n:1\r\n";
        let (value, used) = parse_reply(raw).unwrap().unwrap();
        assert_eq!(value, RespValue::Simple("OK".into()));
        assert_eq!(parse_reply(&raw[used..]).unwrap(), Some((RespValue::Integer(1), 4)));
    }

    #[test]
    fn test_parse_invalid() {
        assert!(parse_reply(b"?what\r\n").is_err());
        assert!(parse_reply(b":abc\r\n").is_err());
        assert!(parse_reply(b"$2\r\nabcd\r\n").is_err());
    }

    #[test]
    fn test_parse_rejects_oversized_lengths() {
        assert!(parse_reply(b"*4611686018427387904\r\n").is_err());
        assert!(parse_reply(b"$9223372036854775807\r\n").is_err());

        // A large but legal header only waits for more data.
        assert_eq!(parse_reply(b"*1048576\r\n").unwrap(), None);
    }

    #[test]
    fn test_into_string_array_errors() {
        assert!(RespValue::Error("ERR".into()).into_string_array().is_err());
        assert!(RespValue::Integer(1).into_string_array().is_err());
        assert_eq!(RespValue::Array(None).into_string_array().unwrap(), None);
    }
}
