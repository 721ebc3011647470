use gisstream::kml::{KmlReader, KmlReaderOptions, KmlWriter};
use gisstream::{
    ContainerType, Event, Feature, Geometry, GisInputStream, GisOutputStream, Value,
};

fn reader_for(doc: &str) -> KmlReader<&[u8]> {
    let _ = env_logger::builder().is_test(true).try_init();
    KmlReader::from_reader(doc.as_bytes(), &KmlReaderOptions::default()).unwrap()
}

fn read_all(doc: &str) -> Vec<Event> {
    let mut reader = reader_for(doc);
    let mut events = Vec::new();
    while let Some(event) = reader.read().unwrap() {
        events.push(event);
    }
    events
}

fn features(events: &[Event]) -> Vec<&Feature> {
    events
        .iter()
        .filter_map(|e| match e {
            Event::Feature(f) => Some(f.as_ref()),
            _ => None,
        })
        .collect()
}

#[test]
fn placemark_with_point() {
    let events = read_all(
        "<kml><Placemark><name>A</name><Point><coordinates>10,20,30</coordinates></Point></Placemark></kml>",
    );
    assert!(matches!(events[0], Event::DocumentStart(_)));
    let feats = features(&events);
    assert_eq!(feats.len(), 1);
    assert_eq!(feats[0].name.as_deref(), Some("A"));
    match feats[0].geometry.as_ref().unwrap() {
        Geometry::Point(p) => {
            assert_eq!(p.center.lon(), 10.0);
            assert_eq!(p.center.lat(), 20.0);
            assert_eq!(p.center.elevation(), Some(30.0));
        }
        other => panic!("expected point, got {other:?}"),
    }
}

#[test]
fn empty_document_produces_balanced_container() {
    let events = read_all("<kml><Document/></kml>");
    assert_eq!(events.len(), 3);
    assert!(matches!(events[0], Event::DocumentStart(_)));
    match &events[1] {
        Event::ContainerStart(c) => assert_eq!(c.container_type, ContainerType::Document),
        other => panic!("expected container start, got {other:?}"),
    }
    assert!(matches!(events[2], Event::ContainerEnd(_)));
}

#[test]
fn container_start_carries_name() {
    let events = read_all(
        "<kml><Folder><name>mine</name><Placemark><name>P</name></Placemark></Folder></kml>",
    );
    match &events[1] {
        Event::ContainerStart(c) => {
            assert_eq!(c.container_type, ContainerType::Folder);
            assert_eq!(c.name.as_deref(), Some("mine"));
        }
        other => panic!("expected container start, got {other:?}"),
    }
    assert!(matches!(events[2], Event::Feature(_)));
    assert!(matches!(events[3], Event::ContainerEnd(_)));
}

#[test]
fn degenerate_polygon_outer_coerces_to_line() {
    let events = read_all(
        "<kml><Placemark><Polygon><outerBoundaryIs><LinearRing><coordinates>0,0 1,0</coordinates></LinearRing></outerBoundaryIs></Polygon></Placemark></kml>",
    );
    let feats = features(&events);
    match feats[0].geometry.as_ref().unwrap() {
        Geometry::Line(line) => {
            assert_eq!(line.points.len(), 2);
            assert_eq!(line.points[0].lon(), 0.0);
            assert_eq!(line.points[1].lon(), 1.0);
        }
        other => panic!("expected line, got {other:?}"),
    }
}

#[test]
fn linear_ring_coercion_by_point_count() {
    let ring4 = read_all(
        "<kml><Placemark><LinearRing><coordinates>0,0 1,0 1,1 0,0</coordinates></LinearRing></Placemark></kml>",
    );
    assert!(matches!(
        features(&ring4)[0].geometry,
        Some(Geometry::LinearRing(_))
    ));

    let ring3 = read_all(
        "<kml><Placemark><LinearRing><coordinates>0,0 1,0 1,1</coordinates></LinearRing></Placemark></kml>",
    );
    assert!(matches!(features(&ring3)[0].geometry, Some(Geometry::Line(_))));

    let ring1 = read_all(
        "<kml><Placemark><LinearRing><coordinates>0,0</coordinates></LinearRing></Placemark></kml>",
    );
    assert!(matches!(features(&ring1)[0].geometry, Some(Geometry::Point(_))));
}

#[test]
fn single_point_linestring_coerces_to_point() {
    let events = read_all(
        "<kml><Placemark><LineString><coordinates>4,5</coordinates></LineString></Placemark></kml>",
    );
    assert!(matches!(
        features(&events)[0].geometry,
        Some(Geometry::Point(_))
    ));
}

#[test]
fn coordinate_recovery_between_tuples() {
    let events = read_all(
        "<kml><Placemark><LineString><coordinates>1,2,3,4,5,6</coordinates></LineString></Placemark></kml>",
    );
    match features(&events)[0].geometry.as_ref().unwrap() {
        Geometry::Line(line) => {
            assert_eq!(line.points.len(), 2);
            let p0 = &line.points[0];
            let p1 = &line.points[1];
            assert_eq!((p0.lon(), p0.lat(), p0.elevation()), (1.0, 2.0, Some(3.0)));
            assert_eq!((p1.lon(), p1.lat(), p1.elevation()), (4.0, 5.0, Some(6.0)));
        }
        other => panic!("expected line, got {other:?}"),
    }
}

#[test]
fn inline_style_emitted_before_its_feature() {
    let events = read_all(
        r##"<kml><Document><Placemark><name>P</name>
            <Style id="s1"><LineStyle><color>7f0000ff</color><width>2</width></LineStyle></Style>
            </Placemark></Document></kml>"##,
    );
    let style_pos = events
        .iter()
        .position(|e| matches!(e, Event::Style(_)))
        .unwrap();
    let feature_pos = events
        .iter()
        .position(|e| matches!(e, Event::Feature(_)))
        .unwrap();
    assert!(style_pos < feature_pos);
    match &events[style_pos] {
        Event::Style(s) => {
            assert_eq!(s.id.as_deref(), Some("s1"));
            let line = s.line.as_ref().unwrap();
            assert_eq!(line.width, Some(2.0));
            let color = line.color.unwrap();
            assert_eq!((color.alpha, color.red), (0x7f, 0xff));
        }
        _ => unreachable!(),
    }
    match &events[feature_pos] {
        Event::Feature(f) => assert_eq!(f.style_url.as_deref(), Some("#s1")),
        _ => unreachable!(),
    }
}

#[test]
fn timestamp_without_seconds_is_lenient() {
    let events = read_all(
        "<kml><Placemark><TimeStamp><when>2009-03-14T18:10</when></TimeStamp></Placemark></kml>",
    );
    let feature = features(&events)[0];
    let expected = "2009-03-14T18:10:00Z";
    assert_eq!(
        feature
            .start_time
            .unwrap()
            .format("%Y-%m-%dT%H:%M:%SZ")
            .to_string(),
        expected
    );
    assert_eq!(feature.start_time, feature.end_time);
}

#[test]
fn schema_types_extended_data() {
    let events = read_all(
        r##"<kml><Document>
            <Schema name="S" id="S1">
              <SimpleField type="int" name="count"/>
              <SimpleField type="double" name="ratio"/>
              <SimpleField type="string" name="label"/>
            </Schema>
            <Placemark>
              <ExtendedData><SchemaData schemaUrl="#S1">
                <SimpleData name="count">7</SimpleData>
                <SimpleData name="ratio">0.5</SimpleData>
                <SimpleData name="label">ok</SimpleData>
              </SchemaData></ExtendedData>
            </Placemark>
          </Document></kml>"##,
    );
    let schema_pos = events
        .iter()
        .position(|e| matches!(e, Event::Schema(_)))
        .unwrap();
    let feature_pos = events
        .iter()
        .position(|e| matches!(e, Event::Feature(_)))
        .unwrap();
    assert!(schema_pos < feature_pos);
    let feature = features(&events)[0];
    assert_eq!(feature.schema_uri(), Some("#S1"));
    assert_eq!(feature.row.get("count"), Some(&Value::Int(7)));
    assert_eq!(feature.row.get("ratio"), Some(&Value::Double(0.5)));
    assert_eq!(feature.row.get("label"), Some(&Value::String("ok".into())));
}

#[test]
fn untyped_extended_data_stays_string() {
    let events = read_all(
        r#"<kml><Placemark><ExtendedData>
            <Data name="holeNumber"><value>1</value></Data>
          </ExtendedData></Placemark></kml>"#,
    );
    let feature = features(&events)[0];
    assert_eq!(
        feature.row.get("holeNumber"),
        Some(&Value::String("1".into()))
    );
}

#[test]
fn schema_parent_aliases_unknown_element() {
    let events = read_all(
        r#"<kml><Document>
            <Schema name="trail" parent="Placemark"/>
            <trail><name>T</name><Point><coordinates>1,1</coordinates></Point></trail>
          </Document></kml>"#,
    );
    let feats = features(&events);
    assert_eq!(feats.len(), 1);
    assert_eq!(feats[0].name.as_deref(), Some("T"));
    assert!(feats[0].geometry.is_some());
}

#[test]
fn multi_geometry_of_points_becomes_multipoint() {
    let events = read_all(
        "<kml><Placemark><MultiGeometry>
            <Point><coordinates>1,1</coordinates></Point>
            <Point><coordinates>2,2</coordinates></Point>
          </MultiGeometry></Placemark></kml>",
    );
    match features(&events)[0].geometry.as_ref().unwrap() {
        Geometry::MultiPoint(mp) => assert_eq!(mp.points.len(), 2),
        other => panic!("expected multipoint, got {other:?}"),
    }
}

#[test]
fn mixed_multi_geometry_becomes_bag() {
    let events = read_all(
        "<kml><Placemark><MultiGeometry>
            <Point><coordinates>1,1</coordinates></Point>
            <LineString><coordinates>0,0 1,1</coordinates></LineString>
          </MultiGeometry></Placemark></kml>",
    );
    assert!(matches!(
        features(&events)[0].geometry,
        Some(Geometry::GeometryBag(_))
    ));
}

#[test]
fn single_child_multi_geometry_unwraps() {
    let events = read_all(
        "<kml><Placemark><MultiGeometry>
            <Point><coordinates>1,1</coordinates></Point>
          </MultiGeometry></Placemark></kml>",
    );
    assert!(matches!(
        features(&events)[0].geometry,
        Some(Geometry::Point(_))
    ));
}

#[test]
fn empty_multi_geometry_yields_no_geometry() {
    let events = read_all("<kml><Placemark><MultiGeometry></MultiGeometry></Placemark></kml>");
    assert!(features(&events)[0].geometry.is_none());
}

#[test]
fn gx_altitude_mode_folds_into_kml_attribute() {
    let events = read_all(
        r#"<kml xmlns="http://www.opengis.net/kml/2.2" xmlns:gx="http://www.google.com/kml/ext/2.2">
          <Placemark><Point>
            <gx:altitudeMode>relativeToGround</gx:altitudeMode>
            <coordinates>1,1</coordinates>
          </Point></Placemark></kml>"#,
    );
    match features(&events)[0].geometry.as_ref().unwrap() {
        Geometry::Point(p) => {
            assert_eq!(
                p.attrs.altitude_mode,
                Some(gisstream::AltitudeMode::RelativeToGround)
            );
        }
        other => panic!("expected point, got {other:?}"),
    }
}

#[test]
fn kml_altitude_mode_wins_over_gx() {
    let events = read_all(
        r#"<kml xmlns="http://www.opengis.net/kml/2.2" xmlns:gx="http://www.google.com/kml/ext/2.2">
          <Placemark><Point>
            <altitudeMode>absolute</altitudeMode>
            <gx:altitudeMode>relativeToGround</gx:altitudeMode>
            <coordinates>1,1</coordinates>
          </Point></Placemark></kml>"#,
    );
    match features(&events)[0].geometry.as_ref().unwrap() {
        Geometry::Point(p) => {
            assert_eq!(p.attrs.altitude_mode, Some(gisstream::AltitudeMode::Absolute));
        }
        other => panic!("expected point, got {other:?}"),
    }
}

#[test]
fn foreign_namespace_elements_preserved_on_feature() {
    let events = read_all(
        r#"<kml xmlns="http://www.opengis.net/kml/2.2" xmlns:atom="http://www.w3.org/2005/Atom">
          <Placemark>
            <atom:author><atom:name>J</atom:name></atom:author>
            <name>P</name>
          </Placemark></kml>"#,
    );
    let feature = features(&events)[0];
    assert_eq!(feature.elements.len(), 1);
    let author = &feature.elements[0];
    assert_eq!(author.prefix.as_deref(), Some("atom"));
    assert_eq!(author.name, "author");
    assert_eq!(author.children[0].text, "J");
}

#[test]
fn declared_xal_namespace_is_preserved() {
    let events = read_all(
        r#"<kml xmlns="http://www.opengis.net/kml/2.2" xmlns:xal="urn:oasis:names:tc:ciq:xsdschema:xAL:2.0">
          <Placemark>
            <xal:AddressDetails><xal:Country><xal:CountryName>France</xal:CountryName></xal:Country></xal:AddressDetails>
            <name>P</name>
          </Placemark></kml>"#,
    );
    let feature = features(&events)[0];
    assert_eq!(feature.elements.len(), 1);
    let address = &feature.elements[0];
    assert_eq!(address.prefix.as_deref(), Some("xal"));
    assert_eq!(address.name, "AddressDetails");
    assert_eq!(
        address.namespace.as_deref(),
        Some("urn:oasis:names:tc:ciq:xsdschema:xAL:2.0")
    );
    assert_eq!(address.children[0].children[0].text, "France");
}

#[test]
fn unknown_namespace_is_skipped() {
    let events = read_all(
        r#"<kml xmlns="http://www.opengis.net/kml/2.2" xmlns:v="http://vendor.example.com/ns">
          <Placemark><v:secret><v:inner>x</v:inner></v:secret><name>P</name></Placemark></kml>"#,
    );
    let feature = features(&events)[0];
    assert!(feature.elements.is_empty());
    assert_eq!(feature.name.as_deref(), Some("P"));
}

#[test]
fn bad_coordinates_are_dropped_but_feature_survives() {
    let events = read_all(
        "<kml><Placemark><LineString><coordinates>0,95 1,1 2,2</coordinates></LineString></Placemark></kml>",
    );
    match features(&events)[0].geometry.as_ref().unwrap() {
        Geometry::Line(line) => assert_eq!(line.points.len(), 2),
        other => panic!("expected line, got {other:?}"),
    }
}

#[test]
fn malformed_xml_is_fatal() {
    let mut reader = reader_for("<kml><Placemark><name>A</name></Wrong></kml>");
    let mut result = Ok(None::<Event>);
    loop {
        match reader.read() {
            Ok(None) => break,
            Ok(Some(_)) => continue,
            Err(e) => {
                result = Err(e);
                break;
            }
        }
    }
    assert!(result.is_err());
}

#[test]
fn schema_accepter_suppresses_schema_and_features() {
    let doc = r##"<kml><Document>
        <Schema name="secret" id="secret"><SimpleField type="int" name="x"/></Schema>
        <Placemark><ExtendedData><SchemaData schemaUrl="#secret">
          <SimpleData name="x">1</SimpleData>
        </SchemaData></ExtendedData></Placemark>
        <Placemark><name>open</name></Placemark>
      </Document></kml>"##;
    let mut reader = reader_for(doc);
    reader.set_schema_accepter(Box::new(|s| s.name.as_deref() != Some("secret")));
    let mut events = Vec::new();
    while let Some(event) = reader.read().unwrap() {
        events.push(event);
    }
    assert!(!events.iter().any(|e| matches!(e, Event::Schema(_))));
    let feats = features(&events);
    assert_eq!(feats.len(), 1);
    assert_eq!(feats[0].name.as_deref(), Some("open"));
}

#[test]
fn pushback_returns_event_first() {
    let mut reader = reader_for("<kml><Placemark><name>A</name></Placemark></kml>");
    let first = reader.read().unwrap().unwrap();
    reader.pushback(first.clone());
    let again = reader.read().unwrap().unwrap();
    assert_eq!(first, again);
}

#[test]
fn read_after_close_fails() {
    let mut reader = reader_for("<kml><Placemark/></kml>");
    reader.close();
    assert!(reader.read().is_err());
}

#[test]
fn network_link_surfaces_href() {
    let events = read_all(
        "<kml><NetworkLink><name>NL</name><Link><href>http://example.com/x.kml</href></Link></NetworkLink></kml>",
    );
    let feature = features(&events)[0];
    assert_eq!(feature.kind, gisstream::FeatureKind::NetworkLink);
    assert_eq!(feature.link.as_deref(), Some("http://example.com/x.kml"));
}

// --- round trip ---

fn render(events: &[Event]) -> String {
    let mut sink = Vec::new();
    {
        let mut writer = KmlWriter::new(&mut sink);
        for event in events {
            writer.write(event).unwrap();
        }
        writer.close().unwrap();
    }
    String::from_utf8(sink).unwrap()
}

#[test]
fn round_trip_preserves_logical_content() {
    let doc = r##"<kml xmlns="http://www.opengis.net/kml/2.2"><Document>
        <name>doc</name>
        <Schema name="S" id="S1"><SimpleField type="int" name="count"/></Schema>
        <Style id="s1"><PolyStyle><color>7f00ff00</color><fill>1</fill></PolyStyle></Style>
        <Placemark>
          <name>A</name>
          <styleUrl>#s1</styleUrl>
          <TimeStamp><when>2009-03-14T18:10:00Z</when></TimeStamp>
          <ExtendedData><SchemaData schemaUrl="#S1">
            <SimpleData name="count">7</SimpleData>
          </SchemaData></ExtendedData>
          <Polygon><outerBoundaryIs><LinearRing>
            <coordinates>0,0 0,2 2,2 2,0 0,0</coordinates>
          </LinearRing></outerBoundaryIs></Polygon>
        </Placemark>
      </Document></kml>"##;

    let first = read_all(doc);
    let rendered = render(&first);
    let second = read_all(&rendered);

    let f1 = features(&first);
    let f2 = features(&second);
    assert_eq!(f1.len(), f2.len());
    assert_eq!(f1[0], f2[0]);

    let s1: Vec<_> = first
        .iter()
        .filter(|e| matches!(e, Event::Schema(_) | Event::Style(_)))
        .collect();
    let s2: Vec<_> = second
        .iter()
        .filter(|e| matches!(e, Event::Schema(_) | Event::Style(_)))
        .collect();
    assert_eq!(s1, s2);

    let shape = |events: &[Event]| -> Vec<&'static str> {
        events
            .iter()
            .map(|e| match e {
                Event::DocumentStart(_) => "doc",
                Event::ContainerStart(_) => "cs",
                Event::ContainerEnd(_) => "ce",
                Event::Schema(_) => "schema",
                Event::Style(_) => "style",
                Event::Feature(_) => "feature",
                _ => "other",
            })
            .collect()
    };
    assert_eq!(shape(&first), shape(&second));
}

#[test]
fn round_trip_point_coordinates_are_exact() {
    let doc = "<kml><Placemark><Point><coordinates>10.123456789,-20.987654321,42.5</coordinates></Point></Placemark></kml>";
    let first = read_all(doc);
    let second = read_all(&render(&first));
    let p1 = match features(&first)[0].geometry.as_ref().unwrap() {
        Geometry::Point(p) => p.center,
        _ => unreachable!(),
    };
    let p2 = match features(&second)[0].geometry.as_ref().unwrap() {
        Geometry::Point(p) => p.center,
        _ => unreachable!(),
    };
    assert!((p1.lon() - p2.lon()).abs() < 1e-9);
    assert!((p1.lat() - p2.lat()).abs() < 1e-9);
    assert_eq!(p1.elevation(), p2.elevation());
}

#[test]
fn round_trip_polygon_with_hole() {
    let doc = "<kml><Placemark><Polygon>
        <outerBoundaryIs><LinearRing><coordinates>0,0 0,10 10,10 10,0 0,0</coordinates></LinearRing></outerBoundaryIs>
        <innerBoundaryIs><LinearRing><coordinates>2,2 4,2 4,4 2,4 2,2</coordinates></LinearRing></innerBoundaryIs>
      </Polygon></Placemark></kml>";
    let first = read_all(doc);
    let second = read_all(&render(&first));
    assert_eq!(features(&first)[0].geometry, features(&second)[0].geometry);
}
