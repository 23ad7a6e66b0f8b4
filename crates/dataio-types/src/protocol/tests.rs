use serde_json::json;

use super::{channel_id, decode_field_id, encode_field_id, ChangeAction, ChangeNotice};

#[test]
fn test_set_notice_wire_shape() {
    let notice = ChangeNotice::set("16f33ab9c2", "CWxhbmc=");
    let value = serde_json::to_value(&notice).unwrap();
    assert_eq!(
        value,
        json!({ "origin": "16f33ab9c2", "action": "set", "key": "CWxhbmc=" })
    );
}

#[test]
fn test_clear_notice_omits_key() {
    let notice = ChangeNotice::clear("16f33ab9c2");
    let value = serde_json::to_value(&notice).unwrap();
    assert_eq!(value, json!({ "origin": "16f33ab9c2", "action": "clear" }));
}

#[test]
fn test_decode_roundtrip() {
    let notice = ChangeNotice::set("a1b2", "Zm9v");
    let back = ChangeNotice::decode(&notice.encode().unwrap()).unwrap();
    assert_eq!(back, notice);
}

#[test]
fn test_decode_clear_without_key_field() {
    let payload = br#"{"origin":"a1b2","action":"clear"}"#;
    let notice = ChangeNotice::decode(payload).unwrap();
    assert_eq!(notice.action, ChangeAction::Clear);
    assert!(notice.key.is_none());
}

#[test]
fn test_decode_rejects_unknown_action() {
    let payload = br#"{"origin":"a1b2","action":"rename","key":"Zm9v"}"#;
    assert!(ChangeNotice::decode(payload).is_err());
}

#[test]
fn test_decode_rejects_garbage() {
    assert!(ChangeNotice::decode(b"not json at all").is_err());
}

#[test]
fn test_field_id_roundtrip() {
    let field = vec![0u8, 159, 146, 150];
    let rendered = encode_field_id(&field);
    assert_eq!(decode_field_id(&rendered).unwrap(), field);
}

#[test]
fn test_field_id_rejects_bad_base64() {
    assert!(decode_field_id("not base64 !!!").is_err());
}

#[test]
fn test_channel_id_format() {
    assert_eq!(channel_id("amethyst", 0, "settings"), "amethyst.0.data.settings");
    assert_eq!(channel_id("amethyst", 3, "blacklist"), "amethyst.3.data.blacklist");
}
