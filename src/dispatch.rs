//! Static table deciding what each element means in the context it appears in.
//!
//! The same local name can mean different things depending on its parent
//! (`name` under `<metadata>`, `<author>` or `<trk>`), so lookups are keyed by
//! the pair of enclosing context and local name. Namespace prefixes are
//! ignored; vendor extension elements are matched by local name only.

/// The kind of element currently on top of the parser's stack.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Context {
    /// Nothing opened yet; only `<gpx>` is meaningful here.
    Root,
    Document,
    Metadata,
    Author,
    Email,
    Copyright,
    Link,
    Bounds,
    Waypoint,
    RoutePoint,
    TrackPoint,
    Route,
    Track,
    Segment,
    PointExtensions,
    SegmentExtensions,
    /// A text leaf such as `<name>` or `<ele>`.
    Scalar,
    /// An unknown subtree being discarded.
    Skip,
}

/// A text leaf recorded by a builder.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Field {
    Name,
    Description,
    Comment,
    Source,
    Symbol,
    Type,
    Time,
    Keywords,
    Elevation,
    Fix,
    Satellites,
    Hdop,
    Vdop,
    Pdop,
    Number,
    Year,
    License,
    Text,
    Speed,
    Course,
    HeartRate,
    Cadence,
    Temperature,
    StartTime,
    EndTime,
}

impl Field {
    /// Tag name used in error reports.
    pub fn tag(self) -> &'static str {
        match self {
            Field::Name => "name",
            Field::Description => "desc",
            Field::Comment => "cmt",
            Field::Source => "src",
            Field::Symbol => "sym",
            Field::Type => "type",
            Field::Time => "time",
            Field::Keywords => "keywords",
            Field::Elevation => "ele",
            Field::Fix => "fix",
            Field::Satellites => "sat",
            Field::Hdop => "hdop",
            Field::Vdop => "vdop",
            Field::Pdop => "pdop",
            Field::Number => "number",
            Field::Year => "year",
            Field::License => "license",
            Field::Text => "text",
            Field::Speed => "speed",
            Field::Course => "course",
            Field::HeartRate => "hr",
            Field::Cadence => "cad",
            Field::Temperature => "atemp",
            Field::StartTime => "startTime",
            Field::EndTime => "endTime",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    /// Open a builder for a nested element.
    Open(Context),
    /// Collect the element's text into a scalar field of the parent.
    Record(Field),
    /// Discard the element and everything inside it.
    Skip,
}

/// Look up what `local_name` means inside `context`.
pub fn dispatch(context: Context, local_name: &[u8]) -> Action {
    use Action::{Open, Record, Skip};

    match context {
        Context::Root => match local_name {
            b"gpx" => Open(Context::Document),
            _ => Skip,
        },
        Context::Document => match local_name {
            b"metadata" => Open(Context::Metadata),
            b"wpt" => Open(Context::Waypoint),
            b"rte" => Open(Context::Route),
            b"trk" => Open(Context::Track),
            _ => Skip,
        },
        Context::Metadata => match local_name {
            b"name" => Record(Field::Name),
            b"desc" => Record(Field::Description),
            b"time" => Record(Field::Time),
            b"keywords" => Record(Field::Keywords),
            b"author" => Open(Context::Author),
            b"copyright" => Open(Context::Copyright),
            b"link" => Open(Context::Link),
            b"bounds" => Open(Context::Bounds),
            _ => Skip,
        },
        Context::Author => match local_name {
            b"name" => Record(Field::Name),
            b"email" => Open(Context::Email),
            b"link" => Open(Context::Link),
            _ => Skip,
        },
        Context::Copyright => match local_name {
            b"year" => Record(Field::Year),
            b"license" => Record(Field::License),
            _ => Skip,
        },
        Context::Link => match local_name {
            b"text" => Record(Field::Text),
            b"type" => Record(Field::Type),
            _ => Skip,
        },
        Context::Waypoint | Context::RoutePoint | Context::TrackPoint => match local_name {
            b"ele" => Record(Field::Elevation),
            b"time" => Record(Field::Time),
            b"name" => Record(Field::Name),
            b"cmt" => Record(Field::Comment),
            b"desc" => Record(Field::Description),
            b"src" => Record(Field::Source),
            b"sym" => Record(Field::Symbol),
            b"type" => Record(Field::Type),
            b"fix" => Record(Field::Fix),
            b"sat" => Record(Field::Satellites),
            b"hdop" => Record(Field::Hdop),
            b"vdop" => Record(Field::Vdop),
            b"pdop" => Record(Field::Pdop),
            b"link" => Open(Context::Link),
            b"extensions" => Open(Context::PointExtensions),
            _ => Skip,
        },
        Context::Route => match local_name {
            b"rtept" => Open(Context::RoutePoint),
            b"link" => Open(Context::Link),
            _ => describe(local_name).map_or(Skip, Record),
        },
        Context::Track => match local_name {
            b"trkseg" => Open(Context::Segment),
            b"link" => Open(Context::Link),
            _ => describe(local_name).map_or(Skip, Record),
        },
        Context::Segment => match local_name {
            b"trkpt" => Open(Context::TrackPoint),
            b"extensions" => Open(Context::SegmentExtensions),
            _ => Skip,
        },
        Context::PointExtensions => match local_name {
            b"speed" => Record(Field::Speed),
            b"course" => Record(Field::Course),
            b"hr" => Record(Field::HeartRate),
            b"cad" => Record(Field::Cadence),
            b"atemp" => Record(Field::Temperature),
            // Garmin wraps its fields in one more container.
            b"TrackPointExtension" => Open(Context::PointExtensions),
            _ => Skip,
        },
        Context::SegmentExtensions => match local_name {
            b"startTime" => Record(Field::StartTime),
            b"endTime" => Record(Field::EndTime),
            _ => Skip,
        },
        Context::Email | Context::Bounds | Context::Scalar | Context::Skip => Skip,
    }
}

/// Descriptive leaves shared by `<rte>` and `<trk>`.
fn describe(local_name: &[u8]) -> Option<Field> {
    match local_name {
        b"name" => Some(Field::Name),
        b"cmt" => Some(Field::Comment),
        b"desc" => Some(Field::Description),
        b"src" => Some(Field::Source),
        b"number" => Some(Field::Number),
        b"type" => Some(Field::Type),
        _ => None,
    }
}
