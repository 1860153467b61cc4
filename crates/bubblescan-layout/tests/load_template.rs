use bubblescan_layout::{
    CoordinateResolver, LayoutTemplate, PageFrame, RawLayoutTemplate, TemplateError,
};
use std::io::Write;

const TWO_COLUMN: &str = r#"{
    "version": "2.0",
    "page": { "width_mm": 210.0, "height_mm": 297.0 },
    "option_radius_mm": 2.5,
    "fiducials": {
        "top_left": [12.5, 12.5], "top_right": [197.5, 12.5],
        "bottom_left": [12.5, 284.5], "bottom_right": [197.5, 284.5],
        "size_mm": 15.0
    },
    "exact_registration": true,
    "questions": {
        "1":  { "options": [ { "label": "A", "x": 33.0,  "y": 149.0 }, { "label": "B", "x": 41.0,  "y": 149.0 } ] },
        "10": { "options": [ { "label": "A", "x": 123.0, "y": 149.0 }, { "label": "B", "x": 131.0, "y": 149.0 } ] },
        "2":  { "options": [ { "label": "A", "x": 33.0,  "y": 154.5 }, { "label": "B", "x": 41.0,  "y": 154.5 } ] }
    }
}"#;

#[test]
fn loads_template_from_disk_in_numeric_order() {
    let mut file = tempfile::NamedTempFile::new().expect("tempfile");
    file.write_all(TWO_COLUMN.as_bytes()).expect("write");

    let template = LayoutTemplate::load_json(file.path()).expect("load");
    let ids: Vec<u32> = template.questions().iter().map(|q| q.id).collect();
    assert_eq!(ids, vec![1, 2, 10]);
    assert!(template.exact_registration());
    assert_eq!(template.option_count(), 6);

    let extent = template.option_extent_mm();
    assert_eq!(extent, PageFrame::from_rect(33.0, 149.0, 131.0, 154.5));
}

#[test]
fn raw_template_round_trips_through_json() {
    let raw: RawLayoutTemplate = serde_json::from_str(TWO_COLUMN).expect("parse");
    let json = serde_json::to_string(&raw).expect("serialize");
    let again: RawLayoutTemplate = serde_json::from_str(&json).expect("reparse");
    assert_eq!(raw, again);
}

#[test]
fn registration_without_fiducials_is_rejected() {
    let mut raw: RawLayoutTemplate = serde_json::from_str(TWO_COLUMN).expect("parse");
    raw.fiducials = None;
    assert!(matches!(
        LayoutTemplate::from_raw(raw),
        Err(TemplateError::RegistrationWithoutFiducials)
    ));
}

#[test]
fn missing_file_is_an_io_error() {
    let dir = tempfile::tempdir().expect("tempdir");
    let err = LayoutTemplate::load_json(dir.path().join("absent.json")).unwrap_err();
    assert!(matches!(err, TemplateError::Io(_)));
}

#[test]
fn stale_template_still_resolves_self_consistently() {
    // A template whose grid origin is off by 36 mm still maps relative to the
    // detected frame; only the absolute position is wrong.
    let stale = TWO_COLUMN.replace("149.0", "113.0");
    let template = LayoutTemplate::from_json_str(&stale).expect("template");
    let fid = template.fiducials().expect("fiducials").frame();
    let image = PageFrame::from_rect(50.0, 50.0, 790.0, 1138.0);
    let res = CoordinateResolver::new(&template)
        .resolve_frame(&image, &fid)
        .expect("resolve");
    let a1 = &res.questions[0].regions[0];
    assert!((a1.center.y - 113.0 * 4.0).abs() < 1e-2);
}
