//! Mutable accumulators for elements that are still open.
//!
//! A `Frame` lives on the parser's stack from an element's start tag to its
//! end tag. On the end tag it is finished into a `Node`, which is then
//! attached to the frame below it. Nothing in here escapes the parser.

use log::trace;
use quick_xml::events::BytesStart;

use crate::dispatch::{Context, Field};
use crate::error::{ParseError, Result};
use crate::gpx_types::*;
use crate::scalar::{parse_decimal, parse_enum, parse_integer, parse_timestamp};

/// Attributes of a start tag, keyed by local name and unescaped.
pub(crate) struct Attributes(Vec<(Vec<u8>, String)>);

impl Attributes {
    pub(crate) fn read(start: &BytesStart<'_>, position: u64) -> Result<Self> {
        let mut attributes = Vec::new();
        for attr_result in start.attributes() {
            let attr = attr_result.map_err(|e| ParseError::markup(position, e))?;
            let value = attr
                .decode_and_unescape_value(start.decoder())
                .map_err(|e| ParseError::markup(position, e))?
                .into_owned();
            attributes.push((attr.key.local_name().as_ref().to_vec(), value));
        }
        Ok(Self(attributes))
    }

    fn text(&self, name: &str) -> Option<String> {
        self.0
            .iter()
            .find(|(key, _)| key.as_slice() == name.as_bytes())
            .map(|(_, value)| value.clone())
    }

    fn decimal(&self, name: &'static str) -> Result<Option<f64>> {
        self.text(name)
            .map(|value| parse_decimal(name, &value))
            .transpose()
    }
}

/// A finished child value on its way to its parent frame.
#[derive(Debug)]
pub(crate) enum Node {
    Document(Document),
    Metadata(Metadata),
    Author(Author),
    Email(Email),
    Copyright(Copyright),
    Link(Link),
    Bounds(Bounds),
    Point(Waypoint),
    Route(Route),
    Track(Track),
    Segment(TrackSegment),
    Extensions(Extensions),
    SegmentExtension(SegmentExtension),
    Scalar(Field, String),
}

/// An element under construction.
pub(crate) enum Frame {
    Document(DocumentBuilder),
    Metadata(MetadataBuilder),
    Author(AuthorBuilder),
    Email(EmailBuilder),
    Copyright(CopyrightBuilder),
    Link(LinkBuilder),
    Bounds(BoundsBuilder),
    Point(PointBuilder),
    Route(RouteBuilder),
    Track(TrackBuilder),
    Segment(SegmentBuilder),
    Extensions(Extensions),
    SegmentExtension(SegmentExtension),
    Scalar(Field, String),
    Skip,
}

impl Frame {
    /// Start a builder for `context`, reading whatever attributes it needs.
    pub(crate) fn open(context: Context, attributes: &Attributes) -> Result<Self> {
        let frame = match context {
            Context::Document => Frame::Document(DocumentBuilder {
                version: attributes.text("version"),
                creator: attributes.text("creator"),
                ..Default::default()
            }),
            Context::Metadata => Frame::Metadata(MetadataBuilder::default()),
            Context::Author => Frame::Author(AuthorBuilder::default()),
            Context::Email => Frame::Email(EmailBuilder {
                id: attributes.text("id"),
                domain: attributes.text("domain"),
            }),
            Context::Copyright => Frame::Copyright(CopyrightBuilder {
                author: attributes.text("author"),
                ..Default::default()
            }),
            Context::Link => Frame::Link(LinkBuilder {
                href: attributes.text("href"),
                ..Default::default()
            }),
            Context::Bounds => Frame::Bounds(BoundsBuilder {
                min_lat: attributes.decimal("minlat")?,
                min_lon: attributes.decimal("minlon")?,
                max_lat: attributes.decimal("maxlat")?,
                max_lon: attributes.decimal("maxlon")?,
            }),
            Context::Waypoint | Context::RoutePoint | Context::TrackPoint => {
                Frame::Point(PointBuilder::new(
                    context,
                    attributes.decimal("lat")?,
                    attributes.decimal("lon")?,
                ))
            }
            Context::Route => Frame::Route(RouteBuilder::default()),
            Context::Track => Frame::Track(TrackBuilder::default()),
            Context::Segment => Frame::Segment(SegmentBuilder::default()),
            Context::PointExtensions => Frame::Extensions(Extensions::default()),
            Context::SegmentExtensions => Frame::SegmentExtension(SegmentExtension::default()),
            Context::Root | Context::Scalar | Context::Skip => Frame::Skip,
        };
        Ok(frame)
    }

    pub(crate) fn scalar(field: Field) -> Self {
        Frame::Scalar(field, String::new())
    }

    pub(crate) fn context(&self) -> Context {
        match self {
            Frame::Document(_) => Context::Document,
            Frame::Metadata(_) => Context::Metadata,
            Frame::Author(_) => Context::Author,
            Frame::Email(_) => Context::Email,
            Frame::Copyright(_) => Context::Copyright,
            Frame::Link(_) => Context::Link,
            Frame::Bounds(_) => Context::Bounds,
            Frame::Point(point) => point.role,
            Frame::Route(_) => Context::Route,
            Frame::Track(_) => Context::Track,
            Frame::Segment(_) => Context::Segment,
            Frame::Extensions(_) => Context::PointExtensions,
            Frame::SegmentExtension(_) => Context::SegmentExtensions,
            Frame::Scalar(..) => Context::Scalar,
            Frame::Skip => Context::Skip,
        }
    }

    /// Append character data. Only scalar leaves keep text.
    pub(crate) fn push_text(&mut self, text: &str) {
        if let Frame::Scalar(_, buffer) = self {
            buffer.push_str(text);
        }
    }

    pub(crate) fn push_char(&mut self, ch: char) {
        if let Frame::Scalar(_, buffer) = self {
            buffer.push(ch);
        }
    }

    /// Freeze the frame into its value. Skipped subtrees produce nothing.
    pub(crate) fn finish(self) -> Result<Option<Node>> {
        let node = match self {
            Frame::Document(b) => Node::Document(b.build()),
            Frame::Metadata(b) => Node::Metadata(b.build()),
            Frame::Author(b) => Node::Author(b.build()),
            Frame::Email(b) => Node::Email(b.build()?),
            Frame::Copyright(b) => Node::Copyright(b.build()?),
            Frame::Link(b) => Node::Link(b.build()?),
            Frame::Bounds(b) => Node::Bounds(b.build()?),
            Frame::Point(b) => Node::Point(b.build()?),
            Frame::Route(b) => Node::Route(b.build()),
            Frame::Track(b) => Node::Track(b.build()),
            Frame::Segment(b) => Node::Segment(b.build()),
            Frame::Extensions(ext) => Node::Extensions(ext),
            Frame::SegmentExtension(ext) => Node::SegmentExtension(ext),
            Frame::Scalar(field, text) => Node::Scalar(field, text),
            Frame::Skip => return Ok(None),
        };
        Ok(Some(node))
    }

    /// Hand a finished child to this frame.
    pub(crate) fn attach(&mut self, node: Node) -> Result<()> {
        match (self, node) {
            (Frame::Document(b), Node::Metadata(m)) => b.metadata = Some(m),
            (Frame::Document(b), Node::Point(p)) => b.waypoints.push(p),
            (Frame::Document(b), Node::Route(r)) => b.routes.push(r),
            (Frame::Document(b), Node::Track(t)) => b.tracks.push(t),

            (Frame::Metadata(b), Node::Scalar(field, text)) => b.set(field, text)?,
            (Frame::Metadata(b), Node::Author(a)) => b.author = Some(a),
            (Frame::Metadata(b), Node::Copyright(c)) => b.copyright = Some(c),
            (Frame::Metadata(b), Node::Link(l)) => b.link = Some(l),
            (Frame::Metadata(b), Node::Bounds(bounds)) => b.bounds = Some(bounds),

            (Frame::Author(b), Node::Scalar(Field::Name, text)) => b.name = Some(text),
            (Frame::Author(b), Node::Email(e)) => b.email = Some(e),
            (Frame::Author(b), Node::Link(l)) => b.link = Some(l),

            (Frame::Copyright(b), Node::Scalar(Field::Year, text)) => {
                b.year = Some(parse_integer(Field::Year.tag(), &text)?)
            }
            (Frame::Copyright(b), Node::Scalar(Field::License, text)) => b.license = Some(text),

            (Frame::Link(b), Node::Scalar(Field::Text, text)) => b.text = Some(text),
            (Frame::Link(b), Node::Scalar(Field::Type, text)) => b.link_type = Some(text),

            (Frame::Point(b), Node::Scalar(field, text)) => b.set(field, text)?,
            (Frame::Point(b), Node::Link(l)) => b.link = Some(l),
            (Frame::Point(b), Node::Extensions(ext)) => b.extensions = Some(ext),

            (Frame::Route(b), Node::Scalar(field, text)) => b.info.set(field, text)?,
            (Frame::Route(b), Node::Link(l)) => b.info.link = Some(l),
            (Frame::Route(b), Node::Point(p)) => b.points.push(p),

            (Frame::Track(b), Node::Scalar(field, text)) => b.info.set(field, text)?,
            (Frame::Track(b), Node::Link(l)) => b.info.link = Some(l),
            (Frame::Track(b), Node::Segment(s)) => b.segments.push(s),

            (Frame::Segment(b), Node::Point(p)) => b.points.push(p),
            (Frame::Segment(b), Node::SegmentExtension(ext)) => b.extension = Some(ext),

            (Frame::Extensions(ext), Node::Scalar(field, text)) => set_extension(ext, field, &text)?,
            (Frame::Extensions(ext), Node::Extensions(nested)) => merge_extensions(ext, nested),

            (Frame::SegmentExtension(ext), Node::Scalar(Field::StartTime, text)) => {
                ext.start_time = Some(parse_timestamp(Field::StartTime.tag(), &text)?)
            }
            (Frame::SegmentExtension(ext), Node::Scalar(Field::EndTime, text)) => {
                ext.end_time = Some(parse_timestamp(Field::EndTime.tag(), &text)?)
            }

            (frame, node) => trace!("{:?} has no slot for {node:?}", frame.context()),
        }
        Ok(())
    }
}

#[derive(Default)]
pub(crate) struct DocumentBuilder {
    version: Option<String>,
    creator: Option<String>,
    metadata: Option<Metadata>,
    waypoints: Vec<Waypoint>,
    routes: Vec<Route>,
    tracks: Vec<Track>,
}

impl DocumentBuilder {
    fn build(self) -> Document {
        Document {
            version: self.version,
            creator: self.creator,
            metadata: self.metadata,
            waypoints: self.waypoints,
            routes: self.routes,
            tracks: self.tracks,
        }
    }
}

#[derive(Default)]
pub(crate) struct MetadataBuilder {
    name: Option<String>,
    desc: Option<String>,
    author: Option<Author>,
    copyright: Option<Copyright>,
    link: Option<Link>,
    time: Option<GpxTime>,
    keywords: Option<String>,
    bounds: Option<Bounds>,
}

impl MetadataBuilder {
    fn set(&mut self, field: Field, text: String) -> Result<()> {
        match field {
            Field::Name => self.name = Some(text),
            Field::Description => self.desc = Some(text),
            Field::Keywords => self.keywords = Some(text),
            Field::Time => self.time = Some(parse_timestamp(field.tag(), &text)?),
            _ => {}
        }
        Ok(())
    }

    fn build(self) -> Metadata {
        Metadata {
            name: self.name,
            desc: self.desc,
            author: self.author,
            copyright: self.copyright,
            link: self.link,
            time: self.time,
            keywords: self.keywords,
            bounds: self.bounds,
        }
    }
}

#[derive(Default)]
pub(crate) struct AuthorBuilder {
    name: Option<String>,
    email: Option<Email>,
    link: Option<Link>,
}

impl AuthorBuilder {
    fn build(self) -> Author {
        Author {
            name: self.name,
            email: self.email,
            link: self.link,
        }
    }
}

pub(crate) struct EmailBuilder {
    id: Option<String>,
    domain: Option<String>,
}

impl EmailBuilder {
    fn build(self) -> Result<Email> {
        Ok(Email {
            id: self.id.ok_or(ParseError::missing("email", "id"))?,
            domain: self.domain.ok_or(ParseError::missing("email", "domain"))?,
        })
    }
}

#[derive(Default)]
pub(crate) struct CopyrightBuilder {
    author: Option<String>,
    year: Option<i32>,
    license: Option<String>,
}

impl CopyrightBuilder {
    fn build(self) -> Result<Copyright> {
        Ok(Copyright {
            author: self.author.ok_or(ParseError::missing("copyright", "author"))?,
            year: self.year,
            license: self.license,
        })
    }
}

#[derive(Default)]
pub(crate) struct LinkBuilder {
    href: Option<String>,
    text: Option<String>,
    link_type: Option<String>,
}

impl LinkBuilder {
    fn build(self) -> Result<Link> {
        Ok(Link {
            href: self.href.ok_or(ParseError::missing("link", "href"))?,
            text: self.text,
            link_type: self.link_type,
        })
    }
}

pub(crate) struct BoundsBuilder {
    min_lat: Option<f64>,
    min_lon: Option<f64>,
    max_lat: Option<f64>,
    max_lon: Option<f64>,
}

impl BoundsBuilder {
    fn build(self) -> Result<Bounds> {
        Ok(Bounds {
            min_lat: self.min_lat.ok_or(ParseError::missing("bounds", "minlat"))?,
            min_lon: self.min_lon.ok_or(ParseError::missing("bounds", "minlon"))?,
            max_lat: self.max_lat.ok_or(ParseError::missing("bounds", "maxlat"))?,
            max_lon: self.max_lon.ok_or(ParseError::missing("bounds", "maxlon"))?,
        })
    }
}

/// Shared builder for `<wpt>`, `<rtept>` and `<trkpt>`.
pub(crate) struct PointBuilder {
    role: Context,
    lat: Option<f64>,
    lon: Option<f64>,
    ele: Option<f64>,
    time: Option<GpxTime>,
    name: Option<String>,
    cmt: Option<String>,
    desc: Option<String>,
    src: Option<String>,
    link: Option<Link>,
    sym: Option<String>,
    point_type: Option<String>,
    fix: Option<Fix>,
    sat: Option<u32>,
    hdop: Option<f64>,
    vdop: Option<f64>,
    pdop: Option<f64>,
    extensions: Option<Extensions>,
}

impl PointBuilder {
    fn new(role: Context, lat: Option<f64>, lon: Option<f64>) -> Self {
        Self {
            role,
            lat,
            lon,
            ele: None,
            time: None,
            name: None,
            cmt: None,
            desc: None,
            src: None,
            link: None,
            sym: None,
            point_type: None,
            fix: None,
            sat: None,
            hdop: None,
            vdop: None,
            pdop: None,
            extensions: None,
        }
    }

    fn element(&self) -> &'static str {
        match self.role {
            Context::RoutePoint => "rtept",
            Context::TrackPoint => "trkpt",
            _ => "wpt",
        }
    }

    fn set(&mut self, field: Field, text: String) -> Result<()> {
        let tag = field.tag();
        match field {
            Field::Elevation => self.ele = Some(parse_decimal(tag, &text)?),
            Field::Time => self.time = Some(parse_timestamp(tag, &text)?),
            Field::Name => self.name = Some(text),
            Field::Comment => self.cmt = Some(text),
            Field::Description => self.desc = Some(text),
            Field::Source => self.src = Some(text),
            Field::Symbol => self.sym = Some(text),
            Field::Type => self.point_type = Some(text),
            Field::Fix => self.fix = Some(parse_enum(tag, &text)?),
            Field::Satellites => self.sat = Some(parse_integer(tag, &text)?),
            Field::Hdop => self.hdop = Some(parse_decimal(tag, &text)?),
            Field::Vdop => self.vdop = Some(parse_decimal(tag, &text)?),
            Field::Pdop => self.pdop = Some(parse_decimal(tag, &text)?),
            _ => {}
        }
        Ok(())
    }

    fn build(self) -> Result<Waypoint> {
        let element = self.element();
        Ok(Waypoint {
            lat: self.lat.ok_or(ParseError::missing(element, "lat"))?,
            lon: self.lon.ok_or(ParseError::missing(element, "lon"))?,
            ele: self.ele,
            time: self.time,
            name: self.name,
            cmt: self.cmt,
            desc: self.desc,
            src: self.src,
            link: self.link,
            sym: self.sym,
            point_type: self.point_type,
            fix: self.fix,
            sat: self.sat,
            hdop: self.hdop,
            vdop: self.vdop,
            pdop: self.pdop,
            extensions: self.extensions,
        })
    }
}

/// Descriptive fields common to routes and tracks.
#[derive(Default)]
pub(crate) struct Description {
    name: Option<String>,
    cmt: Option<String>,
    desc: Option<String>,
    src: Option<String>,
    link: Option<Link>,
    number: Option<u32>,
    kind: Option<String>,
}

impl Description {
    fn set(&mut self, field: Field, text: String) -> Result<()> {
        match field {
            Field::Name => self.name = Some(text),
            Field::Comment => self.cmt = Some(text),
            Field::Description => self.desc = Some(text),
            Field::Source => self.src = Some(text),
            Field::Type => self.kind = Some(text),
            Field::Number => self.number = Some(parse_integer(field.tag(), &text)?),
            _ => {}
        }
        Ok(())
    }
}

#[derive(Default)]
pub(crate) struct RouteBuilder {
    info: Description,
    points: Vec<RoutePoint>,
}

impl RouteBuilder {
    fn build(self) -> Route {
        let info = self.info;
        Route {
            name: info.name,
            cmt: info.cmt,
            desc: info.desc,
            src: info.src,
            link: info.link,
            number: info.number,
            route_type: info.kind,
            points: self.points,
        }
    }
}

#[derive(Default)]
pub(crate) struct TrackBuilder {
    info: Description,
    segments: Vec<TrackSegment>,
}

impl TrackBuilder {
    fn build(self) -> Track {
        let info = self.info;
        Track {
            name: info.name,
            cmt: info.cmt,
            desc: info.desc,
            src: info.src,
            link: info.link,
            number: info.number,
            track_type: info.kind,
            segments: self.segments,
        }
    }
}

#[derive(Default)]
pub(crate) struct SegmentBuilder {
    points: Vec<TrackPoint>,
    extension: Option<SegmentExtension>,
}

impl SegmentBuilder {
    fn build(self) -> TrackSegment {
        TrackSegment {
            points: self.points,
            extension: self.extension,
        }
    }
}

fn set_extension(ext: &mut Extensions, field: Field, text: &str) -> Result<()> {
    let tag = field.tag();
    match field {
        Field::Speed => ext.speed = Some(parse_decimal(tag, text)?),
        Field::Course => ext.course = Some(parse_decimal(tag, text)?),
        Field::HeartRate => ext.heart_rate = Some(parse_integer(tag, text)?),
        Field::Cadence => ext.cadence = Some(parse_integer(tag, text)?),
        Field::Temperature => ext.temperature = Some(parse_decimal(tag, text)?),
        _ => {}
    }
    Ok(())
}

/// Fold a nested vendor container into its enclosing `<extensions>`.
fn merge_extensions(ext: &mut Extensions, nested: Extensions) {
    ext.speed = nested.speed.or(ext.speed);
    ext.course = nested.course.or(ext.course);
    ext.heart_rate = nested.heart_rate.or(ext.heart_rate);
    ext.cadence = nested.cadence.or(ext.cadence);
    ext.temperature = nested.temperature.or(ext.temperature);
}
