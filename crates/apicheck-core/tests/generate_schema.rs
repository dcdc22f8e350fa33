//! The published transcript schema accepts what `write_transcript` persists.

use apicheck_core::schema::generate_schema;
use serde_json::Value;

fn schema() -> Value {
    serde_json::from_str(&generate_schema().unwrap()).unwrap()
}

#[test]
fn schema_is_titled_after_the_record() {
    let schema = schema();
    assert_eq!(schema["title"].as_str(), Some("TranscriptRecord"));
    let required: Vec<&str> = schema["required"]
        .as_array()
        .unwrap()
        .iter()
        .filter_map(Value::as_str)
        .collect();
    for field in ["test", "index", "recorded_at"] {
        assert!(required.contains(&field), "{field} missing from {required:?}");
    }
}

#[test]
fn every_item_kind_is_described() {
    let text = generate_schema().unwrap();
    for kind in ["\"text\"", "\"http\"", "\"sql\""] {
        assert!(text.contains(kind), "{kind} not in schema");
    }
    assert!(text.contains("RequestSnapshot"));
    assert!(text.contains("ResponseSnapshot"));
}
