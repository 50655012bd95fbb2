use std::io::BufRead;

use log::{debug, trace};
use quick_xml::Reader;
use quick_xml::escape::resolve_predefined_entity;
use quick_xml::events::Event;

use crate::builder::{Attributes, Frame, Node};
use crate::dispatch::{Action, Context, dispatch};
use crate::error::{ParseError, Result};
use crate::gpx_types::Document;
use crate::options::ParseOptions;

/// An element that has been opened but not yet closed.
struct OpenElement {
    /// Qualified name, compared against the end tag.
    name: Vec<u8>,
    frame: Frame,
}

/// Parse a GPX document from a buffered byte stream.
///
/// Wrap unbuffered sources (files, sockets) in `std::io::BufReader`.
pub fn parse<R: BufRead>(source: R) -> Result<Document> {
    parse_with_options(source, &ParseOptions::default())
}

/// Parse a GPX XML string into a Document.
pub fn parse_str(xml: &str) -> Result<Document> {
    parse(xml.as_bytes())
}

pub fn parse_with_options<R: BufRead>(source: R, options: &ParseOptions) -> Result<Document> {
    let mut reader = Reader::from_reader(source);
    let config = reader.config_mut();
    config.expand_empty_elements = true;
    // The frame stack reports mismatched end tags itself.
    config.check_end_names = false;

    let mut buf = Vec::new();
    let result = read_document(&mut reader, &mut buf, options);
    match &result {
        Err(ParseError::MalformedMarkup { .. }) => {}
        _ => drain(&mut reader, &mut buf),
    }
    result
}

/// Walk the event stream, keeping one frame per open element.
fn read_document<R: BufRead>(
    reader: &mut Reader<R>,
    buf: &mut Vec<u8>,
    options: &ParseOptions,
) -> Result<Document> {
    let mut stack: Vec<OpenElement> = Vec::new();

    loop {
        buf.clear();
        let position = reader.buffer_position();
        let event = reader
            .read_event_into(buf)
            .map_err(|e| ParseError::markup(reader.error_position(), e))?;

        match event {
            Event::Start(start) => {
                let context = stack.last().map_or(Context::Root, |open| open.frame.context());
                let local_name = start.local_name();
                let frame = match dispatch(context, local_name.as_ref()) {
                    Action::Open(kind) if options.admits(kind) => {
                        let attributes = Attributes::read(&start, position)?;
                        Frame::open(kind, &attributes)?
                    }
                    Action::Record(field) => Frame::scalar(field),
                    _ => {
                        trace!(
                            "skipping <{}> in {context:?}",
                            String::from_utf8_lossy(local_name.as_ref())
                        );
                        Frame::Skip
                    }
                };
                stack.push(OpenElement {
                    name: start.name().as_ref().to_vec(),
                    frame,
                });
            }
            Event::End(end) => {
                let found: &[u8] = end.name().0;
                let Some(open) = stack.pop() else {
                    return Err(ParseError::UnexpectedClosingElement {
                        expected: None,
                        found: String::from_utf8_lossy(found).into_owned(),
                    });
                };
                if open.name.as_slice() != found {
                    return Err(ParseError::UnexpectedClosingElement {
                        expected: Some(String::from_utf8_lossy(&open.name).into_owned()),
                        found: String::from_utf8_lossy(found).into_owned(),
                    });
                }

                let Some(node) = open.frame.finish()? else {
                    continue;
                };
                match stack.last_mut() {
                    Some(parent) => {
                        if let Node::Segment(segment) = &node {
                            if options.skip_empty_segments && segment.points.is_empty() {
                                debug!("dropping empty track segment");
                                continue;
                            }
                        }
                        parent.frame.attach(node)?;
                    }
                    None => {
                        if let Node::Document(document) = node {
                            debug!(
                                "parsed GPX document: {} waypoints, {} routes, {} tracks",
                                document.waypoints.len(),
                                document.routes.len(),
                                document.tracks.len()
                            );
                            return Ok(document);
                        }
                    }
                }
            }
            Event::Text(e) => {
                let text = e.decode().map_err(|err| ParseError::markup(position, err))?;
                if let Some(open) = stack.last_mut() {
                    open.frame.push_text(&text);
                }
            }
            Event::CData(e) => {
                let text = e.decode().map_err(|err| ParseError::markup(position, err))?;
                if let Some(open) = stack.last_mut() {
                    open.frame.push_text(&text);
                }
            }
            Event::GeneralRef(e) => {
                // Character references (&#60; &#x3C;) first, then the five predefined entities
                let ch = e
                    .resolve_char_ref()
                    .map_err(|err| ParseError::markup(position, err))?;
                let name = e.decode().map_err(|err| ParseError::markup(position, err))?;
                let entity = resolve_predefined_entity(&name);
                if ch.is_none() && entity.is_none() {
                    return Err(ParseError::markup(
                        position,
                        format!("unrecognized entity '{name}'"),
                    ));
                }
                if let Some(open) = stack.last_mut() {
                    match ch {
                        Some(ch) => open.frame.push_char(ch),
                        None => open.frame.push_text(entity.unwrap_or_default()),
                    }
                }
            }
            Event::Eof => {
                let element = stack.last().map_or_else(
                    || "gpx".to_string(),
                    |open| String::from_utf8_lossy(&open.name).into_owned(),
                );
                return Err(ParseError::TruncatedDocument { element });
            }
            _ => {}
        }
    }
}

/// Consume whatever input is left so the source ends up fully read.
fn drain<R: BufRead>(reader: &mut Reader<R>, buf: &mut Vec<u8>) {
    loop {
        buf.clear();
        match reader.read_event_into(buf) {
            Ok(Event::Eof) => break,
            Err(e) => {
                debug!("stopped draining input: {e}");
                break;
            }
            Ok(_) => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gpx_types::Fix;

    #[test]
    fn test_minimal_waypoint() {
        let xml = r#"<?xml version="1.0"?>
<gpx version="1.1">
  <wpt lat="35.6762" lon="139.6503"/>
</gpx>"#;
        let data = parse_str(xml).unwrap();
        assert_eq!(data.version.as_deref(), Some("1.1"));
        assert_eq!(data.waypoints.len(), 1);
        assert!((data.waypoints[0].lat - 35.6762).abs() < 1e-10);
        assert!((data.waypoints[0].lon - 139.6503).abs() < 1e-10);
        assert!(data.waypoints[0].ele.is_none());
        assert!(data.waypoints[0].extensions.is_none());
    }

    #[test]
    fn test_waypoint_with_children() {
        let xml = r#"<?xml version="1.0"?>
<gpx version="1.1">
  <wpt lat="35.6762" lon="139.6503">
    <ele>40.5</ele>
    <time>2025-01-01T00:00:00Z</time>
    <name>Tokyo Tower</name>
    <desc>A famous landmark</desc>
    <cmt>Comment</cmt>
    <src>GPS</src>
    <sym>Flag</sym>
    <type>POI</type>
    <fix>3d</fix>
    <sat>8</sat>
    <hdop>1.2</hdop>
  </wpt>
</gpx>"#;
        let data = parse_str(xml).unwrap();
        let pt = &data.waypoints[0];
        assert!((pt.ele.unwrap() - 40.5).abs() < 1e-10);
        assert_eq!(
            pt.time.unwrap().to_utc_string(),
            "2025-01-01T00:00:00Z"
        );
        assert_eq!(pt.name.as_deref(), Some("Tokyo Tower"));
        assert_eq!(pt.desc.as_deref(), Some("A famous landmark"));
        assert_eq!(pt.cmt.as_deref(), Some("Comment"));
        assert_eq!(pt.src.as_deref(), Some("GPS"));
        assert_eq!(pt.sym.as_deref(), Some("Flag"));
        assert_eq!(pt.point_type.as_deref(), Some("POI"));
        assert_eq!(pt.fix, Some(Fix::ThreeD));
        assert_eq!(pt.sat, Some(8));
        assert_eq!(pt.hdop, Some(1.2));
        assert!(pt.vdop.is_none());
    }

    #[test]
    fn test_simple_route() {
        let xml = r#"<?xml version="1.0"?>
<gpx version="1.1">
  <rte>
    <name>Test Route</name>
    <number>4</number>
    <rtept lat="35.0" lon="139.0"/>
    <rtept lat="36.0" lon="140.0"/>
    <rtept lat="37.0" lon="141.0"/>
  </rte>
</gpx>"#;
        let data = parse_str(xml).unwrap();
        assert_eq!(data.routes.len(), 1);
        assert_eq!(data.routes[0].name.as_deref(), Some("Test Route"));
        assert_eq!(data.routes[0].number, Some(4));
        assert_eq!(data.routes[0].points.len(), 3);
        assert_eq!(data.routes[0].points[2].lat, 37.0);
    }

    #[test]
    fn test_simple_track() {
        let xml = r#"<?xml version="1.0"?>
<gpx version="1.1">
  <trk>
    <name>Morning Run</name>
    <trkseg>
      <trkpt lat="35.0" lon="139.0"><ele>10.0</ele></trkpt>
      <trkpt lat="35.001" lon="139.001"><ele>11.0</ele></trkpt>
      <trkpt lat="35.002" lon="139.002"><ele>12.0</ele></trkpt>
    </trkseg>
  </trk>
</gpx>"#;
        let data = parse_str(xml).unwrap();
        assert_eq!(data.tracks.len(), 1);
        assert_eq!(data.tracks[0].name.as_deref(), Some("Morning Run"));
        assert_eq!(data.tracks[0].segments.len(), 1);
        let elevations: Vec<f64> = data.tracks[0].segments[0]
            .points
            .iter()
            .map(|p| p.ele.unwrap())
            .collect();
        assert_eq!(elevations, vec![10.0, 11.0, 12.0]);
    }

    #[test]
    fn test_multi_segment_track() {
        let xml = r#"<?xml version="1.0"?>
<gpx version="1.1">
  <trk>
    <trkseg>
      <trkpt lat="35.0" lon="139.0"/>
      <trkpt lat="35.001" lon="139.001"/>
    </trkseg>
    <trkseg>
      <trkpt lat="36.0" lon="140.0"/>
      <trkpt lat="36.001" lon="140.001"/>
    </trkseg>
  </trk>
</gpx>"#;
        let data = parse_str(xml).unwrap();
        assert_eq!(data.tracks[0].segments.len(), 2);
        assert_eq!(data.tracks[0].segments[0].points.len(), 2);
        assert_eq!(data.tracks[0].segments[1].points.len(), 2);
    }

    #[test]
    fn test_empty_gpx() {
        let xml = r#"<?xml version="1.0"?><gpx version="1.1"></gpx>"#;
        let data = parse_str(xml).unwrap();
        assert!(data.metadata.is_none());
        assert!(data.waypoints.is_empty());
        assert!(data.routes.is_empty());
        assert!(data.tracks.is_empty());
    }

    #[test]
    fn test_empty_segment_kept_by_default() {
        let xml = r#"<?xml version="1.0"?>
<gpx version="1.1">
  <trk>
    <trkseg></trkseg>
    <trkseg>
      <trkpt lat="35.0" lon="139.0"/>
    </trkseg>
  </trk>
</gpx>"#;
        let data = parse_str(xml).unwrap();
        assert_eq!(data.tracks[0].segments.len(), 2);
        assert!(data.tracks[0].segments[0].points.is_empty());

        let opts = ParseOptions {
            skip_empty_segments: true,
            ..Default::default()
        };
        let data = parse_with_options(xml.as_bytes(), &opts).unwrap();
        assert_eq!(data.tracks[0].segments.len(), 1);
        assert_eq!(data.tracks[0].segments[0].points.len(), 1);
    }

    #[test]
    fn test_garmin_extensions() {
        let xml = r#"<?xml version="1.0"?>
<gpx version="1.1">
  <trk>
    <trkseg>
      <trkpt lat="35.0" lon="139.0">
        <extensions>
          <gpxtpx:TrackPointExtension xmlns:gpxtpx="http://www.garmin.com/xmlschemas/TrackPointExtension/v1">
            <gpxtpx:hr>150</gpxtpx:hr>
            <gpxtpx:cad>82</gpxtpx:cad>
            <gpxtpx:atemp>21.5</gpxtpx:atemp>
            <gpxtpx:depth>3</gpxtpx:depth>
          </gpxtpx:TrackPointExtension>
        </extensions>
      </trkpt>
    </trkseg>
  </trk>
</gpx>"#;
        let data = parse_str(xml).unwrap();
        let ext = data.tracks[0].segments[0].points[0]
            .extensions
            .as_ref()
            .unwrap();
        assert_eq!(ext.heart_rate, Some(150));
        assert_eq!(ext.cadence, Some(82));
        assert_eq!(ext.temperature, Some(21.5));
        assert!(ext.speed.is_none());
    }

    #[test]
    fn test_with_namespace() {
        let xml = r#"<?xml version="1.0"?>
<gpx xmlns="http://www.topografix.com/GPX/1/1" version="1.1" creator="test">
  <wpt lat="35.0" lon="139.0"><name>Test</name></wpt>
</gpx>"#;
        let data = parse_str(xml).unwrap();
        assert_eq!(data.creator.as_deref(), Some("test"));
        assert_eq!(data.waypoints.len(), 1);
        assert_eq!(data.waypoints[0].name.as_deref(), Some("Test"));
    }

    #[test]
    fn test_prefixed_elements() {
        let xml = r#"<?xml version="1.0"?>
<g:gpx xmlns:g="http://www.topografix.com/GPX/1/1" version="1.1">
  <g:wpt lat="35.0" lon="139.0"><g:name>Test</g:name></g:wpt>
</g:gpx>"#;
        let data = parse_str(xml).unwrap();
        assert_eq!(data.waypoints[0].name.as_deref(), Some("Test"));
    }

    #[test]
    fn test_cdata() {
        let xml = r#"<?xml version="1.0"?>
<gpx version="1.1">
  <wpt lat="35.0" lon="139.0">
    <name><![CDATA[Test & Name]]></name>
  </wpt>
</gpx>"#;
        let data = parse_str(xml).unwrap();
        assert_eq!(data.waypoints[0].name.as_deref(), Some("Test & Name"));
    }

    #[test]
    fn test_xml_entities() {
        let xml = r#"<?xml version="1.0"?>
<gpx version="1.1">
  <wpt lat="35.0" lon="139.0">
    <name>Caf&#233; &amp; Bar &lt;1&gt;</name>
  </wpt>
</gpx>"#;
        let data = parse_str(xml).unwrap();
        assert_eq!(data.waypoints[0].name.as_deref(), Some("Café & Bar <1>"));
    }

    #[test]
    fn test_unknown_entity_in_text_fails() {
        let xml = r#"<gpx><wpt lat="1" lon="2"><name>A&nbsp;B</name></wpt></gpx>"#;
        let err = parse_str(xml).unwrap_err();
        assert!(
            matches!(&err, ParseError::MalformedMarkup { message, .. } if message.contains("nbsp")),
            "unexpected error: {err:?}"
        );
    }

    #[test]
    fn test_invalid_char_ref_in_text_fails() {
        let xml = r#"<gpx><wpt lat="1" lon="2"><name>A&#0;B</name></wpt></gpx>"#;
        assert!(matches!(
            parse_str(xml).unwrap_err(),
            ParseError::MalformedMarkup { .. }
        ));
    }

    #[test]
    fn test_invalid_utf8_in_text_fails() {
        let mut xml = br#"<gpx><wpt lat="1" lon="2"><name>A"#.to_vec();
        xml.push(0xFF);
        xml.extend_from_slice(b"B</name></wpt></gpx>");
        assert!(matches!(
            parse(xml.as_slice()).unwrap_err(),
            ParseError::MalformedMarkup { .. }
        ));
    }

    #[test]
    fn test_invalid_utf8_in_cdata_fails() {
        let mut xml = br#"<gpx><wpt lat="1" lon="2"><desc><![CDATA[A"#.to_vec();
        xml.push(0xFF);
        xml.extend_from_slice(b"]]></desc></wpt></gpx>");
        assert!(matches!(
            parse(xml.as_slice()).unwrap_err(),
            ParseError::MalformedMarkup { .. }
        ));
    }

    #[test]
    fn test_invalid_utf8_in_attribute_fails() {
        let mut xml = br#"<gpx><metadata><link href="A"#.to_vec();
        xml.push(0xFF);
        xml.extend_from_slice(b"\"/></metadata></gpx>");
        assert!(matches!(
            parse(xml.as_slice()).unwrap_err(),
            ParseError::MalformedMarkup { .. }
        ));
    }

    #[test]
    fn test_non_ascii_offset_is_invalid_time() {
        let xml = "<gpx><wpt lat=\"1\" lon=\"2\"><time>2019-04-04T07:00:00+1\u{e9}1</time></wpt></gpx>";
        assert_eq!(
            parse_str(xml).unwrap_err(),
            ParseError::InvalidScalar {
                field: "time",
                value: "2019-04-04T07:00:00+1\u{e9}1".to_string()
            }
        );
    }

    #[test]
    fn test_escaped_attribute() {
        let xml = r#"<?xml version="1.0"?>
<gpx version="1.1">
  <wpt lat="35.0" lon="139.0">
    <link href="https://example.com/?a=1&amp;b=2"/>
  </wpt>
</gpx>"#;
        let data = parse_str(xml).unwrap();
        let link = data.waypoints[0].link.as_ref().unwrap();
        assert_eq!(link.href, "https://example.com/?a=1&b=2");
        assert!(link.text.is_none());
    }

    #[test]
    fn test_link_element() {
        let xml = r#"<?xml version="1.0"?>
<gpx version="1.1">
  <wpt lat="35.0" lon="139.0">
    <link href="https://example.com">
      <text>Example</text>
      <type>text/html</type>
    </link>
  </wpt>
</gpx>"#;
        let data = parse_str(xml).unwrap();
        let link = data.waypoints[0].link.as_ref().unwrap();
        assert_eq!(link.href, "https://example.com");
        assert_eq!(link.text.as_deref(), Some("Example"));
        assert_eq!(link.link_type.as_deref(), Some("text/html"));
    }

    #[test]
    fn test_missing_lat_lon_fails() {
        let xml = r#"<?xml version="1.0"?>
<gpx version="1.1">
  <wpt lat="35.0" lon="139.0"><name>Good</name></wpt>
  <wpt><name>Bad - no coords</name></wpt>
</gpx>"#;
        let err = parse_str(xml).unwrap_err();
        assert_eq!(
            err,
            ParseError::MissingRequiredField {
                element: "wpt",
                field: "lat"
            }
        );
    }

    #[test]
    fn test_invalid_lat_fails() {
        let xml = r#"<gpx><trk><trkseg><trkpt lat="north" lon="1"/></trkseg></trk></gpx>"#;
        assert_eq!(
            parse_str(xml).unwrap_err(),
            ParseError::InvalidScalar {
                field: "lat",
                value: "north".to_string()
            }
        );
    }

    #[test]
    fn test_link_without_href_fails() {
        let xml = r#"<gpx><metadata><link><text>x</text></link></metadata></gpx>"#;
        assert_eq!(
            parse_str(xml).unwrap_err(),
            ParseError::MissingRequiredField {
                element: "link",
                field: "href"
            }
        );
    }

    #[test]
    fn test_email_without_domain_fails() {
        let xml = r#"<gpx><metadata><author><email id="x"/></author></metadata></gpx>"#;
        assert_eq!(
            parse_str(xml).unwrap_err(),
            ParseError::MissingRequiredField {
                element: "email",
                field: "domain"
            }
        );
    }

    #[test]
    fn test_email_without_id_fails() {
        let xml = r#"<gpx><metadata><author><email domain="example.org"/></author></metadata></gpx>"#;
        assert_eq!(
            parse_str(xml).unwrap_err(),
            ParseError::MissingRequiredField {
                element: "email",
                field: "id"
            }
        );
    }

    #[test]
    fn test_bounds_missing_extent_fails() {
        let xml = r#"<gpx><metadata><bounds minlat="1" minlon="2" maxlat="3"/></metadata></gpx>"#;
        assert_eq!(
            parse_str(xml).unwrap_err(),
            ParseError::MissingRequiredField {
                element: "bounds",
                field: "maxlon"
            }
        );
    }

    #[test]
    fn test_bounds_invalid_extent_fails() {
        let xml =
            r#"<gpx><metadata><bounds minlat="1" minlon="east" maxlat="3" maxlon="4"/></metadata></gpx>"#;
        assert_eq!(
            parse_str(xml).unwrap_err(),
            ParseError::InvalidScalar {
                field: "minlon",
                value: "east".to_string()
            }
        );
    }

    #[test]
    fn test_gpx10_elements_ignored() {
        let xml = r#"<?xml version="1.0"?>
<gpx xmlns="http://www.topografix.com/GPX/1/0" version="1.0">
  <trk>
    <trkseg>
      <trkpt lat="35.0" lon="139.0">
        <speed>5.5</speed>
        <course>180.0</course>
      </trkpt>
      <trkpt lat="35.001" lon="139.001"/>
    </trkseg>
  </trk>
</gpx>"#;
        let data = parse_str(xml).unwrap();
        assert_eq!(data.tracks[0].segments[0].points.len(), 2);
        assert!(data.tracks[0].segments[0].points[0].extensions.is_none());
    }

    #[test]
    fn test_unknown_subtree_with_known_names_is_skipped() {
        let xml = r#"<gpx>
  <wpt lat="1" lon="2">
    <vendor><name>not mine</name><wpt lat="9" lon="9"/></vendor>
    <name>mine</name>
  </wpt>
</gpx>"#;
        let data = parse_str(xml).unwrap();
        assert_eq!(data.waypoints.len(), 1);
        assert_eq!(data.waypoints[0].name.as_deref(), Some("mine"));
    }

    #[test]
    fn test_type_filter_skips_subtrees() {
        let xml = r#"<gpx>
  <wpt lat="1" lon="2"/>
  <rte><rtept lat="1" lon="2"/></rte>
  <trk><trkseg><trkpt lat="bad" lon="2"/></trkseg></trk>
</gpx>"#;
        let opts = ParseOptions {
            types: Some(vec![crate::options::GpxElementType::Route]),
            ..Default::default()
        };
        let data = parse_with_options(xml.as_bytes(), &opts).unwrap();
        assert!(data.waypoints.is_empty());
        assert_eq!(data.routes.len(), 1);
        assert!(data.tracks.is_empty());
    }

    #[test]
    fn test_mismatched_end_tag() {
        let xml = r#"<gpx><trk><trkseg><trkpt lat="1" lon="2"></trkseg></trk></gpx>"#;
        assert_eq!(
            parse_str(xml).unwrap_err(),
            ParseError::UnexpectedClosingElement {
                expected: Some("trkpt".to_string()),
                found: "trkseg".to_string()
            }
        );
    }

    #[test]
    fn test_unclosed_document() {
        let xml = r#"<gpx><trk><trkseg><trkpt lat="1" lon="2"/>"#;
        assert_eq!(
            parse_str(xml).unwrap_err(),
            ParseError::TruncatedDocument {
                element: "trkseg".to_string()
            }
        );
    }

    #[test]
    fn test_empty_input() {
        assert_eq!(
            parse_str("").unwrap_err(),
            ParseError::TruncatedDocument {
                element: "gpx".to_string()
            }
        );
    }
}
