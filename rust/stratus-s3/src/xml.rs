//! Event-driven reading of XML response bodies.
//!
//! Bodies are fed through a [`quick_xml::Reader`] and reduced to three
//! callbacks on an [`ElementHandler`]: element start, element text and
//! element end. Each callback receives the path of local element names from
//! the root, so handlers match on paths like `["Error", "Code"]` and never
//! deal with namespaces or attributes.

use std::borrow::Cow;

use quick_xml::Reader;
use quick_xml::events::Event;

use crate::S3Error;

/// Receiver of XML events.
pub trait ElementHandler {
    /// An element opened. `path` ends with its name.
    fn start(&mut self, _path: &[String]) {}

    /// Text content of the innermost element in `path`.
    fn text(&mut self, path: &[String], text: &str);

    /// An element closed. `path` still ends with its name.
    fn end(&mut self, _path: &[String]) {}
}

/// Feed `body` through `handler`.
pub fn parse<H: ElementHandler>(body: &[u8], handler: &mut H) -> Result<(), S3Error> {
    let mut reader = Reader::from_reader(body);
    reader.config_mut().trim_text(true);

    let mut path: Vec<String> = Vec::new();
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(element)) => {
                path.push(String::from_utf8_lossy(element.local_name().as_ref()).into_owned());
                handler.start(&path);
            }
            Ok(Event::Empty(element)) => {
                path.push(String::from_utf8_lossy(element.local_name().as_ref()).into_owned());
                handler.start(&path);
                handler.end(&path);
                path.pop();
            }
            Ok(Event::End(_)) => {
                handler.end(&path);
                path.pop();
            }
            Ok(Event::Text(text)) => {
                let text = text
                    .unescape()
                    .map_err(|error| S3Error::Malformed(format!("Invalid XML text: {}", error)))?;
                if !path.is_empty() {
                    handler.text(&path, &text);
                }
            }
            Ok(Event::CData(data)) => {
                let data = data.into_inner();
                if !path.is_empty() {
                    handler.text(&path, &String::from_utf8_lossy(&data));
                }
            }
            Ok(Event::Eof) => break,
            Ok(_) => {}
            Err(error) => {
                return Err(S3Error::Malformed(format!(
                    "Invalid XML at position {}: {}",
                    reader.error_position(),
                    error
                )));
            }
        }
        buf.clear();
    }

    if !path.is_empty() {
        return Err(S3Error::Malformed(format!(
            "Unexpected end of XML inside <{}>",
            path.join("/")
        )));
    }

    Ok(())
}

/// Name of the root element of `body`, if it has one.
pub fn root_element(body: &[u8]) -> Option<String> {
    let mut reader = Reader::from_reader(body);
    let mut buf = Vec::new();
    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(element)) | Ok(Event::Empty(element)) => {
                return Some(String::from_utf8_lossy(element.local_name().as_ref()).into_owned());
            }
            Ok(Event::Eof) | Err(_) => return None,
            Ok(_) => {}
        }
        buf.clear();
    }
}

/// Whether `path` is exactly `expected`.
pub(crate) fn at(path: &[String], expected: &[&str]) -> bool {
    path.len() == expected.len() && path.iter().zip(expected).all(|(a, b)| a == b)
}

/// Text content of the element at `path`, or `None` when the document has
/// no such element.
pub(crate) fn text_at(body: &[u8], path: &[&str]) -> Result<Option<String>, S3Error> {
    struct Text<'a> {
        path: &'a [&'a str],
        seen: bool,
        value: String,
    }

    impl ElementHandler for Text<'_> {
        fn start(&mut self, path: &[String]) {
            if at(path, self.path) {
                self.seen = true;
            }
        }

        fn text(&mut self, path: &[String], text: &str) {
            if at(path, self.path) {
                self.value.push_str(text);
            }
        }
    }

    let mut handler = Text {
        path,
        seen: false,
        value: String::new(),
    };
    parse(body, &mut handler)?;
    Ok(handler.seen.then_some(handler.value))
}

/// Escape text for inclusion in a request body.
pub(crate) fn escape(text: &str) -> Cow<'_, str> {
    quick_xml::escape::escape(text)
}

/// The `<Error>` document the store returns with failed requests.
///
/// Parsing never fails: tags that are missing or a body that is not XML at
/// all leave the fields empty.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ErrorBody {
    /// `Code`
    pub code: String,
    /// `Message`
    pub message: String,
    /// `Endpoint`, present on redirects
    pub endpoint: String,
    /// `Region`, present on region mismatches
    pub region: String,
}

impl ErrorBody {
    /// Extract what can be extracted from `body`.
    pub fn parse(body: &[u8]) -> Self {
        let mut error = ErrorBody::default();
        // A body that breaks off midway still yields the fields read so far.
        let _ = parse(body, &mut error);
        error
    }
}

impl ElementHandler for ErrorBody {
    fn text(&mut self, path: &[String], text: &str) {
        if path.len() != 2 || path[0] != "Error" {
            return;
        }
        match path[1].as_str() {
            "Code" => self.code.push_str(text),
            "Message" => self.message.push_str(text),
            "Endpoint" => self.endpoint.push_str(text),
            "Region" => self.region.push_str(text),
            _ => {}
        }
    }
}
