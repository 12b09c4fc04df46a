// Drop ingest
// Drag-and-drop negotiation state machine and file list decoding

use crate::board::LoadRequest;
use crate::error::BoardError;
use log::{debug, info, warn};
use std::ffi::OsString;
use std::os::unix::ffi::OsStringExt;
use std::path::PathBuf;

/// Oldest negotiation version understood without warning
pub const SUPPORTED_VERSION: u32 = 3;

/// Accepted payload types, most preferred first
pub const PREFERRED_TYPES: [&str; 6] = [
    "text/plain",
    "text/uri-list",
    "UTF8_STRING",
    "STRING",
    "TEXT",
    "text/plain;charset=utf-8",
];

const FILE_SCHEME: &str = "file://";

/// Identifies one drag source for the lifetime of a gesture
pub type SourceId = u64;

/// Type list carried by an enter message
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TypeList {
    Inline(Vec<String>),
    /// Too long to inline; must be fetched from the source
    OutOfBand,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DropEnter {
    pub source: SourceId,
    pub version: u32,
    pub types: TypeList,
}

/// Action proposed by the source on each position update
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropAction {
    Copy,
    Move,
    Link,
    Ask,
    Other,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DropStatus {
    Accept { mime: String },
    Reject,
}

/// Messages the engine sends back to the drag source
pub trait DropTransport {
    fn fetch_type_list(&mut self, source: SourceId) -> Vec<String>;
    fn send_status(&mut self, source: SourceId, status: DropStatus);
    fn request_payload(&mut self, source: SourceId, mime: &str, timestamp: u32);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropPhase {
    Idle,
    TypeOffered,
    TypeMatched,
    DropPending,
}

/// One in-flight gesture
#[derive(Debug, Clone)]
struct DropNegotiation {
    source: SourceId,
    matched: Option<String>,
    pending: bool,
}

#[derive(Debug, Default)]
pub struct DropIngest {
    current: Option<DropNegotiation>,
}

impl DropIngest {
    pub fn phase(&self) -> DropPhase {
        match &self.current {
            None => DropPhase::Idle,
            Some(n) if n.pending => DropPhase::DropPending,
            Some(n) if n.matched.is_some() => DropPhase::TypeMatched,
            Some(_) => DropPhase::TypeOffered,
        }
    }

    /// Matched payload type of the current gesture
    pub fn matched_type(&self) -> Option<&str> {
        self.current.as_ref()?.matched.as_deref()
    }

    /// Start a gesture, matching the offered types against [`PREFERRED_TYPES`]
    pub fn enter(&mut self, enter: DropEnter, transport: &mut dyn DropTransport) {
        if let Some(previous) = self.current.take() {
            warn!(
                "Drag from source {} replaced source {} without a leave",
                enter.source, previous.source
            );
        }
        if enter.version < SUPPORTED_VERSION {
            let err = BoardError::UnsupportedProtocolVersion {
                found: enter.version,
                supported: SUPPORTED_VERSION,
            };
            warn!("{}", err);
        }

        let types = match enter.types {
            TypeList::Inline(types) => types,
            TypeList::OutOfBand => transport.fetch_type_list(enter.source),
        };
        let matched = match_type(&types).map(str::to_string);
        debug!("Drag offers {:?}, matched {:?}", types, matched);

        self.current = Some(DropNegotiation {
            source: enter.source,
            matched,
            pending: false,
        });
    }

    /// Answer a position update; only a copy of a matched type is accepted
    pub fn position(
        &mut self,
        source: SourceId,
        action: DropAction,
        transport: &mut dyn DropTransport,
    ) -> bool {
        let status = match &self.current {
            Some(n) if n.source == source && action == DropAction::Copy => n
                .matched
                .clone()
                .map_or(DropStatus::Reject, |mime| DropStatus::Accept { mime }),
            _ => DropStatus::Reject,
        };
        let accepted = status != DropStatus::Reject;
        transport.send_status(source, status);
        accepted
    }

    /// The user released over the window; request the payload if a type matched
    pub fn perform_drop(
        &mut self,
        source: SourceId,
        timestamp: u32,
        transport: &mut dyn DropTransport,
    ) -> bool {
        let Some(negotiation) = self.current.as_mut() else {
            debug!("Drop from source {} without a gesture", source);
            return false;
        };
        if negotiation.source != source {
            warn!(
                "Drop from source {} while negotiating with {}",
                source, negotiation.source
            );
            return false;
        }
        let Some(mime) = negotiation.matched.clone() else {
            self.current = None;
            return false;
        };
        negotiation.pending = true;
        transport.request_payload(source, &mime, timestamp);
        true
    }

    /// Payload arrived; ends the gesture and yields one load per local file
    pub fn deliver(&mut self, payload: &[u8]) -> Vec<LoadRequest> {
        match self.current.take() {
            Some(n) if n.pending => parse_file_list(payload),
            other => {
                warn!("Ignoring drop payload with no pending drop");
                self.current = other;
                Vec::new()
            }
        }
    }

    /// Abandon the gesture
    pub fn leave(&mut self) {
        if self.current.take().is_some() {
            debug!("Drag left the window");
        }
    }
}

/// First preferred type the source offers
pub fn match_type(offered: &[String]) -> Option<&'static str> {
    PREFERRED_TYPES
        .iter()
        .copied()
        .find(|preferred| offered.iter().any(|t| t == preferred))
}

/// Decode a newline separated list of `file://` URIs into load requests at the origin
pub fn parse_file_list(payload: &[u8]) -> Vec<LoadRequest> {
    payload
        .split(|&b| b == b'\r' || b == b'\n')
        .filter(|line| !line.is_empty())
        .filter_map(file_uri_path)
        .map(|path| {
            info!("Dropped {}", path.display());
            LoadRequest::new(path)
        })
        .collect()
}

fn file_uri_path(line: &[u8]) -> Option<PathBuf> {
    let rest = line.strip_prefix(FILE_SCHEME.as_bytes())?;
    let rest = rest.strip_prefix(b"localhost").unwrap_or(rest);
    match percent_decode(rest) {
        Some(bytes) => Some(PathBuf::from(OsString::from_vec(bytes))),
        None => {
            warn!(
                "Skipping dropped URI with a malformed escape: {}",
                String::from_utf8_lossy(line)
            );
            None
        }
    }
}

/// Decode `%XX` escapes; `None` if an escape is truncated or not hex
pub fn percent_decode(input: &[u8]) -> Option<Vec<u8>> {
    let mut out = Vec::with_capacity(input.len());
    let mut bytes = input.iter();
    while let Some(&b) = bytes.next() {
        if b != b'%' {
            out.push(b);
            continue;
        }
        let hi = hex_value(*bytes.next()?)?;
        let lo = hex_value(*bytes.next()?)?;
        out.push(hi << 4 | lo);
    }
    Some(out)
}

fn hex_value(b: u8) -> Option<u8> {
    match b {
        b'0'..=b'9' => Some(b - b'0'),
        b'a'..=b'f' => Some(b - b'a' + 10),
        b'A'..=b'F' => Some(b - b'A' + 10),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::os::unix::ffi::OsStrExt;
    use std::path::Path;

    #[derive(Default)]
    struct RecordingTransport {
        out_of_band: Vec<String>,
        statuses: Vec<(SourceId, DropStatus)>,
        requests: Vec<(SourceId, String, u32)>,
    }

    impl DropTransport for RecordingTransport {
        fn fetch_type_list(&mut self, _source: SourceId) -> Vec<String> {
            self.out_of_band.clone()
        }

        fn send_status(&mut self, source: SourceId, status: DropStatus) {
            self.statuses.push((source, status));
        }

        fn request_payload(&mut self, source: SourceId, mime: &str, timestamp: u32) {
            self.requests.push((source, mime.to_string(), timestamp));
        }
    }

    fn inline(source: SourceId, types: &[&str]) -> DropEnter {
        DropEnter {
            source,
            version: SUPPORTED_VERSION,
            types: TypeList::Inline(types.iter().map(|t| t.to_string()).collect()),
        }
    }

    #[test]
    fn uri_list_drop_loads_each_file_at_origin() {
        let mut transport = RecordingTransport::default();
        let mut ingest = DropIngest::default();

        ingest.enter(inline(7, &["text/uri-list"]), &mut transport);
        assert_eq!(ingest.phase(), DropPhase::TypeMatched);
        assert!(ingest.position(7, DropAction::Copy, &mut transport));
        assert_eq!(
            transport.statuses,
            [(
                7,
                DropStatus::Accept {
                    mime: "text/uri-list".to_string()
                }
            )]
        );

        assert!(ingest.perform_drop(7, 1234, &mut transport));
        assert_eq!(transport.requests, [(7, "text/uri-list".to_string(), 1234)]);
        assert_eq!(ingest.phase(), DropPhase::DropPending);

        let loads = ingest.deliver(b"file:///tmp/a.png\r\nfile:///tmp/b.png\r\n");
        let paths: Vec<_> = loads.iter().map(|r| r.path.as_path()).collect();
        assert_eq!(paths, [Path::new("/tmp/a.png"), Path::new("/tmp/b.png")]);
        assert!(loads
            .iter()
            .all(|r| r.anchor == (0, 0) && r.scale == 1.0));
        assert_eq!(ingest.phase(), DropPhase::Idle);
    }

    #[test]
    fn preference_order_beats_offer_order() {
        let offered = ["text/uri-list".to_string(), "text/plain".to_string()];
        assert_eq!(match_type(&offered), Some("text/plain"));
        assert_eq!(match_type(&["image/png".to_string()]), None);
    }

    #[test]
    fn out_of_band_types_are_fetched() {
        let mut transport = RecordingTransport {
            out_of_band: vec!["application/x-foo".into(), "UTF8_STRING".into()],
            ..Default::default()
        };
        let mut ingest = DropIngest::default();

        ingest.enter(
            DropEnter {
                source: 1,
                version: 5,
                types: TypeList::OutOfBand,
            },
            &mut transport,
        );

        assert_eq!(ingest.matched_type(), Some("UTF8_STRING"));
    }

    #[test]
    fn only_copy_of_a_matched_type_is_accepted() {
        let mut transport = RecordingTransport::default();
        let mut ingest = DropIngest::default();

        ingest.enter(inline(1, &["text/plain"]), &mut transport);
        assert!(!ingest.position(1, DropAction::Move, &mut transport));
        assert!(!ingest.position(2, DropAction::Copy, &mut transport));

        ingest.enter(inline(3, &["image/png"]), &mut transport);
        assert_eq!(ingest.phase(), DropPhase::TypeOffered);
        assert!(!ingest.position(3, DropAction::Copy, &mut transport));
        assert!(!ingest.perform_drop(3, 0, &mut transport));
        assert!(transport.requests.is_empty());
        assert!(transport
            .statuses
            .iter()
            .all(|(_, status)| *status == DropStatus::Reject));
    }

    #[test]
    fn old_versions_still_negotiate() {
        let mut transport = RecordingTransport::default();
        let mut ingest = DropIngest::default();

        ingest.enter(
            DropEnter {
                version: 2,
                ..inline(1, &["text/plain"])
            },
            &mut transport,
        );

        assert!(ingest.position(1, DropAction::Copy, &mut transport));
    }

    #[test]
    fn leave_abandons_the_gesture() {
        let mut transport = RecordingTransport::default();
        let mut ingest = DropIngest::default();

        ingest.enter(inline(1, &["text/plain"]), &mut transport);
        ingest.position(1, DropAction::Copy, &mut transport);
        ingest.leave();

        assert_eq!(ingest.phase(), DropPhase::Idle);
        assert!(!ingest.perform_drop(1, 0, &mut transport));
        assert!(ingest.deliver(b"file:///tmp/a.png").is_empty());
    }

    #[test]
    fn payload_lines_are_filtered_and_decoded() {
        let loads = parse_file_list(
            b"file:///tmp/my%20img.png\n\nhttp://example.com/x.png\nfile://localhost/srv/b.jpg\r\nfile:///bad%2\nfile:///bad%zz.png",
        );
        let paths: Vec<_> = loads.iter().map(|r| r.path.clone()).collect();
        assert_eq!(
            paths,
            [
                PathBuf::from("/tmp/my img.png"),
                PathBuf::from("/srv/b.jpg")
            ]
        );
    }

    #[test]
    fn non_utf8_paths_survive_decoding() {
        let loads = parse_file_list(b"file:///tmp/%FF.png");
        assert_eq!(loads.len(), 1);
        assert_eq!(
            loads[0].path.as_os_str().as_bytes(),
            b"/tmp/\xff.png"
        );
    }
}
