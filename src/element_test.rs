use super::*;

fn stroke() -> WhiteboardElement {
    WhiteboardElement::drawing(vec![Point::new(10.0, 40.0), Point::new(30.0, 20.0)], "#ff0000", 2.0)
}

#[test]
fn generated_ids_are_timestamp_plus_suffix() {
    let id = generate_element_id();
    let (ts, suffix) = id.split_once('-').expect("id should contain a dash");
    assert!(ts.parse::<i64>().expect("timestamp prefix") > 0);
    assert_eq!(suffix.len(), ID_SUFFIX_LEN);
    assert!(suffix.chars().all(|c| c.is_ascii_digit() || c.is_ascii_lowercase()));
    assert_ne!(generate_element_id(), generate_element_id());
}

#[test]
fn drawing_anchors_at_path_bounding_box() {
    let el = stroke();
    assert_eq!(el.kind, ElementKind::Drawing);
    assert!((el.x - 10.0).abs() < f64::EPSILON);
    assert!((el.y - 20.0).abs() < f64::EPSILON);
    assert_eq!(el.stroke_width, Some(2.0));
    assert!(el.validate().is_ok());
}

#[test]
fn sticky_note_defaults_extent() {
    let el = WhiteboardElement::sticky_note(5.0, 6.0, "hello", "#ffeb3b");
    assert_eq!(el.width, Some(DEFAULT_STICKY_WIDTH));
    assert_eq!(el.height, Some(DEFAULT_STICKY_HEIGHT));
    assert!(el.path.is_none());
    assert!(el.validate().is_ok());
}

#[test]
fn validate_rejects_path_on_text_and_missing_path_on_drawing() {
    let mut text = WhiteboardElement::text(0.0, 0.0, "hi", "#000000");
    text.path = Some(vec![Point::new(0.0, 0.0)]);
    assert!(matches!(text.validate(), Err(ElementError::UnexpectedPath { kind: ElementKind::Text, .. })));

    let mut drawing = stroke();
    drawing.path = None;
    assert!(matches!(drawing.validate(), Err(ElementError::MissingPath { .. })));

    let mut note = WhiteboardElement::sticky_note(0.0, 0.0, "x", "#000000");
    note.width = None;
    assert!(matches!(note.validate(), Err(ElementError::MissingExtent { .. })));
}

#[test]
fn normalize_fills_sticky_defaults_and_strips_foreign_fields() {
    let mut note = WhiteboardElement::sticky_note(0.0, 0.0, "x", "#000000");
    note.width = None;
    note.height = None;
    note.stroke_width = Some(3.0);
    let note = note.normalize();
    assert_eq!(note.width, Some(DEFAULT_STICKY_WIDTH));
    assert_eq!(note.height, Some(DEFAULT_STICKY_HEIGHT));
    assert!(note.stroke_width.is_none());

    let text = WhiteboardElement::text(0.0, 0.0, "t", "#000000").with_size(1.0, 1.0).normalize();
    assert!(text.width.is_none());
    assert!(text.height.is_none());
}

#[test]
fn moved_to_translates_path_and_keeps_id() {
    let el = stroke();
    let moved = el.moved_to(110.0, 120.0);
    assert_eq!(moved.id, el.id);
    let path = moved.path.expect("drawing keeps its path");
    assert_eq!(path[0], Point::new(110.0, 140.0));
    assert_eq!(path[1], Point::new(130.0, 120.0));
}

#[test]
fn serializes_with_browser_field_names() {
    let mut el = WhiteboardElement::sticky_note(1.0, 2.0, "note", "#ffeb3b");
    el.participant_id = Some("p1".into());
    let json = serde_json::to_value(&el).expect("serialize");
    assert_eq!(json["type"], "sticky-note");
    assert_eq!(json["participantId"], "p1");
    assert!(json.get("path").is_none());
    assert!(json.get("strokeWidth").is_none());
}

#[test]
fn deserializes_browser_payload_without_optional_fields() {
    let raw = r##"{"id":"1-abc","type":"drawing","x":0,"y":0,"color":"#000",
        "strokeWidth":2,"path":[{"x":0,"y":0},{"x":1,"y":1}]}"##;
    let el: WhiteboardElement = serde_json::from_str(raw).expect("deserialize");
    assert_eq!(el.kind, ElementKind::Drawing);
    assert_eq!(el.timestamp, 0);
    assert!(!el.is_attributed());
    assert_eq!(el.path.map(|p| p.len()), Some(2));
}

#[test]
fn merge_by_id_preserves_order_and_appends_new() {
    let a = WhiteboardElement::text(0.0, 0.0, "a", "#000000");
    let b = WhiteboardElement::text(0.0, 0.0, "b", "#000000");
    let c = WhiteboardElement::text(0.0, 0.0, "c", "#000000");

    let mut b_moved = b.moved_to(50.0, 50.0);
    b_moved.timestamp = b.timestamp + 1;

    let merged = merge_by_id(&[a.clone(), b.clone()], &[c.clone(), b_moved.clone()]);
    let ids: Vec<&str> = merged.iter().map(|e| e.id.as_str()).collect();
    assert_eq!(ids, vec![a.id.as_str(), b.id.as_str(), c.id.as_str()]);
    assert!((merged[1].x - 50.0).abs() < f64::EPSILON);
}

#[test]
fn merge_by_id_keeps_newer_base_copy() {
    let mut base = WhiteboardElement::text(0.0, 0.0, "new", "#000000");
    base.timestamp = 200;
    let mut stale = base.clone();
    stale.content = Some("old".into());
    stale.timestamp = 100;

    let merged = merge_by_id(std::slice::from_ref(&base), &[stale]);
    assert_eq!(merged.len(), 1);
    assert_eq!(merged[0].content.as_deref(), Some("new"));
}
