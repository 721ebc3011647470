use byteorder::{BigEndian, LittleEndian, WriteBytesExt};
use gisstream::shp::{ShpReader, ShpReaderOptions};
use gisstream::{Event, Feature, Geometry, GisInputStream};
use std::io::Cursor;

fn push_f64(buf: &mut Vec<u8>, v: f64) {
    buf.write_f64::<LittleEndian>(v).unwrap();
}

fn push_i32(buf: &mut Vec<u8>, v: i32) {
    buf.write_i32::<LittleEndian>(v).unwrap();
}

/// Assembles a complete `.shp` byte image from record bodies.
fn shp_file(shape_type: i32, bodies: &[Vec<u8>]) -> Vec<u8> {
    let total: usize = 100 + bodies.iter().map(|b| 8 + b.len()).sum::<usize>();
    let mut buf = Vec::with_capacity(total);
    buf.write_i32::<BigEndian>(9994).unwrap();
    for _ in 0..5 {
        buf.write_i32::<BigEndian>(0).unwrap();
    }
    buf.write_i32::<BigEndian>((total / 2) as i32).unwrap();
    buf.write_i32::<LittleEndian>(1000).unwrap();
    buf.write_i32::<LittleEndian>(shape_type).unwrap();
    for _ in 0..8 {
        push_f64(&mut buf, 0.0);
    }
    for (i, body) in bodies.iter().enumerate() {
        buf.write_i32::<BigEndian>((i + 1) as i32).unwrap();
        buf.write_i32::<BigEndian>((body.len() / 2) as i32).unwrap();
        buf.extend_from_slice(body);
    }
    buf
}

fn polygon_body(rings: &[&[(f64, f64)]]) -> Vec<u8> {
    let mut body = Vec::new();
    push_i32(&mut body, 5);
    for _ in 0..4 {
        push_f64(&mut body, 0.0);
    }
    let num_points: usize = rings.iter().map(|r| r.len()).sum();
    push_i32(&mut body, rings.len() as i32);
    push_i32(&mut body, num_points as i32);
    let mut ofs = 0;
    for ring in rings {
        push_i32(&mut body, ofs as i32);
        ofs += ring.len();
    }
    for ring in rings {
        for &(x, y) in *ring {
            push_f64(&mut body, x);
            push_f64(&mut body, y);
        }
    }
    body
}

fn point_body(x: f64, y: f64) -> Vec<u8> {
    let mut body = Vec::new();
    push_i32(&mut body, 1);
    push_f64(&mut body, x);
    push_f64(&mut body, y);
    body
}

fn null_body() -> Vec<u8> {
    let mut body = Vec::new();
    push_i32(&mut body, 0);
    body
}

fn read_features(bytes: Vec<u8>) -> Vec<Feature> {
    let _ = env_logger::builder().is_test(true).try_init();
    let mut reader = ShpReader::new(Cursor::new(bytes)).unwrap();
    let mut features = Vec::new();
    while let Some(event) = reader.read().unwrap() {
        match event {
            Event::Feature(f) => features.push(*f),
            other => panic!("unexpected event {other:?}"),
        }
    }
    features
}

// Clockwise square in lon/lat space.
fn cw_square(x: f64, y: f64, s: f64) -> Vec<(f64, f64)> {
    vec![(x, y), (x, y + s), (x + s, y + s), (x + s, y), (x, y)]
}

fn ccw_square(x: f64, y: f64, s: f64) -> Vec<(f64, f64)> {
    let mut ring = cw_square(x, y, s);
    ring.reverse();
    ring
}

#[test]
fn polygon_with_hole_stays_single_polygon() {
    let outer = cw_square(0.0, 0.0, 10.0);
    let inner = ccw_square(2.0, 2.0, 2.0);
    let bytes = shp_file(5, &[polygon_body(&[&outer, &inner])]);
    let features = read_features(bytes);
    assert_eq!(features.len(), 1);
    match features[0].geometry.as_ref().unwrap() {
        Geometry::Polygon(p) => {
            assert!(p.outer.is_clockwise());
            assert_eq!(p.inners.len(), 1);
            assert!(!p.inners[0].is_clockwise());
            let outer_bounds = gisstream::GeoBounds::from_points(&p.outer.points).unwrap();
            let inner_bounds = gisstream::GeoBounds::from_points(&p.inners[0].points).unwrap();
            assert!(outer_bounds.contains_bounds(&inner_bounds));
        }
        other => panic!("expected polygon, got {other:?}"),
    }
}

#[test]
fn two_outer_rings_become_multipolygons() {
    let a = cw_square(0.0, 0.0, 5.0);
    let b = cw_square(20.0, 20.0, 5.0);
    let bytes = shp_file(5, &[polygon_body(&[&a, &b])]);
    let features = read_features(bytes);
    assert_eq!(features.len(), 1);
    match features[0].geometry.as_ref().unwrap() {
        Geometry::MultiPolygons(mp) => {
            assert_eq!(mp.polygons.len(), 2);
            assert!(mp.polygons.iter().all(|p| p.inners.is_empty()));
        }
        other => panic!("expected multipolygons, got {other:?}"),
    }
}

#[test]
fn point_records_stream_as_features() {
    let bytes = shp_file(1, &[point_body(10.0, 20.0), point_body(-30.0, 40.0)]);
    let features = read_features(bytes);
    assert_eq!(features.len(), 2);
    match features[1].geometry.as_ref().unwrap() {
        Geometry::Point(p) => {
            assert_eq!(p.center.lon(), -30.0);
            assert_eq!(p.center.lat(), 40.0);
        }
        other => panic!("expected point, got {other:?}"),
    }
}

#[test]
fn null_record_yields_feature_without_geometry() {
    let bytes = shp_file(1, &[point_body(1.0, 2.0), null_body(), point_body(3.0, 4.0)]);
    let features = read_features(bytes);
    assert_eq!(features.len(), 3);
    assert!(features[0].geometry.is_some());
    assert!(features[1].geometry.is_none());
    assert!(features[2].geometry.is_some());
}

#[test]
fn empty_file_without_dbf_produces_nothing() {
    let bytes = shp_file(5, &[]);
    let mut reader = ShpReader::new(Cursor::new(bytes)).unwrap();
    assert!(reader.read().unwrap().is_none());
    assert!(reader.schemas().is_empty());
}

#[test]
fn invalid_signature_is_fatal() {
    let mut bytes = shp_file(1, &[]);
    bytes[0..4].copy_from_slice(&42i32.to_be_bytes());
    assert!(ShpReader::new(Cursor::new(bytes)).is_err());
}

#[test]
fn invalid_version_is_fatal() {
    let mut bytes = shp_file(1, &[]);
    bytes[28..32].copy_from_slice(&999i32.to_le_bytes());
    assert!(ShpReader::new(Cursor::new(bytes)).is_err());
}

#[test]
fn record_type_mismatch_is_fatal() {
    // A point record inside a polygon file.
    let bytes = shp_file(5, &[point_body(1.0, 2.0)]);
    let mut reader = ShpReader::new(Cursor::new(bytes)).unwrap();
    assert!(reader.read().is_err());
}

#[test]
fn out_of_range_record_is_skipped() {
    let bytes = shp_file(1, &[point_body(200.0, 0.0), point_body(5.0, 6.0)]);
    let features = read_features(bytes);
    assert_eq!(features.len(), 1);
    match features[0].geometry.as_ref().unwrap() {
        Geometry::Point(p) => assert_eq!(p.center.lon(), 5.0),
        other => panic!("expected point, got {other:?}"),
    }
}

#[test]
fn polyline_z_with_truncated_z_section_still_emits() {
    // PolylineZ with three points but a Z section holding range + one
    // value only.
    let mut body = Vec::new();
    push_i32(&mut body, 13);
    for _ in 0..4 {
        push_f64(&mut body, 0.0);
    }
    push_i32(&mut body, 1);
    push_i32(&mut body, 3);
    push_i32(&mut body, 0);
    for &(x, y) in &[(0.0, 0.0), (1.0, 1.0), (2.0, 0.0)] {
        push_f64(&mut body, x);
        push_f64(&mut body, y);
    }
    push_f64(&mut body, 0.0);
    push_f64(&mut body, 9.0);
    push_f64(&mut body, 9.0);
    let bytes = shp_file(13, &[body]);
    let features = read_features(bytes);
    match features[0].geometry.as_ref().unwrap() {
        Geometry::Line(line) => {
            assert_eq!(line.points.len(), 3);
            assert_eq!(line.points[0].elevation(), Some(9.0));
            assert_eq!(line.points[2].elevation(), Some(0.0));
        }
        other => panic!("expected line, got {other:?}"),
    }
}

#[test]
fn shm_sidecar_styles_come_before_features() {
    let dir = tempfile::tempdir().unwrap();
    let shp_path = dir.path().join("pts.shp");
    std::fs::write(&shp_path, shp_file(1, &[point_body(1.0, 2.0)])).unwrap();
    std::fs::write(
        dir.path().join("pts.shm"),
        "<Style id=\"shp\"><LineStyle><color>ff0000ff</color></LineStyle></Style>",
    )
    .unwrap();

    let mut reader = ShpReader::from_path(&shp_path, &ShpReaderOptions::default()).unwrap();
    let mut events = Vec::new();
    while let Some(event) = reader.read().unwrap() {
        events.push(event);
    }
    assert_eq!(events.len(), 2);
    match &events[0] {
        Event::Style(style) => {
            assert_eq!(style.id.as_deref(), Some("shp"));
            assert!(style.line.as_ref().unwrap().color.is_some());
        }
        other => panic!("expected style first, got {other:?}"),
    }
    assert!(matches!(events[1], Event::Feature(_)));
}

#[test]
fn broken_shm_sidecar_is_ignored() {
    let dir = tempfile::tempdir().unwrap();
    let shp_path = dir.path().join("pts.shp");
    std::fs::write(&shp_path, shp_file(1, &[point_body(1.0, 2.0)])).unwrap();
    std::fs::write(dir.path().join("pts.shm"), "<Style><Unclosed></Style>").unwrap();

    let mut reader = ShpReader::from_path(&shp_path, &ShpReaderOptions::default()).unwrap();
    let mut events = Vec::new();
    while let Some(event) = reader.read().unwrap() {
        events.push(event);
    }
    assert_eq!(events.len(), 1);
    assert!(matches!(events[0], Event::Feature(_)));
}

#[test]
fn read_after_close_fails() {
    let bytes = shp_file(1, &[point_body(1.0, 2.0)]);
    let mut reader = ShpReader::new(Cursor::new(bytes)).unwrap();
    reader.close();
    assert!(reader.read().is_err());
}

#[test]
fn pushback_returns_event_first() {
    let bytes = shp_file(1, &[point_body(1.0, 2.0)]);
    let mut reader = ShpReader::new(Cursor::new(bytes)).unwrap();
    let first = reader.read().unwrap().unwrap();
    reader.pushback(first.clone());
    assert_eq!(reader.read().unwrap().unwrap(), first);
    assert!(reader.read().unwrap().is_none());
}
