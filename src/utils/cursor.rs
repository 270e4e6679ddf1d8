use base64::{engine::general_purpose::STANDARD, Engine as _};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// 游标中携带的排序列值
///
/// 时间类型统一序列化为RFC3339文本，保证游标在进程重启、
/// 多实例之间都可以无损往返。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CursorValue {
    Int(i64),
    Timestamp(DateTime<Utc>),
    Text(String),
}

#[derive(Debug, Serialize, Deserialize)]
struct CursorPayload {
    value: CursorValue,
    id: i64,
}

/// 编码游标：排序列值 + 同值时的ID决胜键
pub fn encode_cursor(value: CursorValue, id: i64) -> String {
    let payload = CursorPayload { value, id };
    match serde_json::to_vec(&payload) {
        Ok(json) => STANDARD.encode(json),
        Err(_) => String::new(),
    }
}

/// 解码游标
///
/// 任何格式错误（截断、篡改、非base64、非JSON）都返回None，
/// 调用方按"无游标"处理，从头开始分页，绝不向用户抛错。
pub fn decode_cursor(cursor: &str) -> Option<(CursorValue, i64)> {
    let raw = STANDARD.decode(cursor).ok()?;
    let payload: CursorPayload = serde_json::from_slice(&raw).ok()?;
    Some((payload.value, payload.id))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_timestamp_round_trip() {
        let ts = Utc.with_ymd_and_hms(2024, 3, 15, 8, 30, 45).unwrap();
        let cursor = encode_cursor(CursorValue::Timestamp(ts), 42);
        assert_eq!(
            decode_cursor(&cursor),
            Some((CursorValue::Timestamp(ts), 42))
        );
    }

    #[test]
    fn test_int_round_trip() {
        let cursor = encode_cursor(CursorValue::Int(12345), 12345);
        assert_eq!(decode_cursor(&cursor), Some((CursorValue::Int(12345), 12345)));
    }

    #[test]
    fn test_text_round_trip() {
        let cursor = encode_cursor(CursorValue::Text("hello".to_string()), 7);
        assert_eq!(
            decode_cursor(&cursor),
            Some((CursorValue::Text("hello".to_string()), 7))
        );
    }

    #[test]
    fn test_garbage_input_is_tolerated() {
        assert_eq!(decode_cursor(""), None);
        assert_eq!(decode_cursor("not-base64!!!"), None);
        // 合法base64但不是JSON
        assert_eq!(decode_cursor(&STANDARD.encode("hello world")), None);
        // 合法JSON但缺少字段
        assert_eq!(decode_cursor(&STANDARD.encode(r#"{"value": 1}"#)), None);
    }

    #[test]
    fn test_tampered_cursor_is_tolerated() {
        let mut cursor = encode_cursor(CursorValue::Int(99), 99);
        cursor.truncate(cursor.len() / 2);
        assert_eq!(decode_cursor(&cursor), None);
    }
}
