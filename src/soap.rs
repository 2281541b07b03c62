//! Just enough SOAP for the services behind the dispatcher.
//!
//! Request bodies are read with `quick_xml`; these helpers locate elements by
//! local name (ignoring namespace prefixes), read attributes, and render
//! response envelopes and SOAP 1.2 faults. There is no schema validation.

use std::borrow::Cow;

use quick_xml::Reader;
use quick_xml::escape;
use quick_xml::events::{BytesStart, Event};

use crate::error::Error;
use crate::http::request::Request;

pub const SOAP_CONTENT_TYPE: &str = "application/soap+xml; charset=utf-8";

const ENVELOPE_OPEN: &str = concat!(
    r#"<?xml version="1.0" encoding="UTF-8"?>"#,
    r#"<SOAP-ENV:Envelope xmlns:SOAP-ENV="http://www.w3.org/2003/05/soap-envelope""#,
    r#" xmlns:tt="http://www.onvif.org/ver10/schema""#,
    r#" xmlns:tptz="http://www.onvif.org/ver20/ptz/wsdl""#,
    r#" xmlns:ter="http://www.onvif.org/ver10/error">"#,
    "<SOAP-ENV:Body>"
);
const ENVELOPE_CLOSE: &str = "</SOAP-ENV:Body></SOAP-ENV:Envelope>";

/// Reader positioned just past the first start tag whose local name is
/// `name`, together with that tag.
struct Located<'a> {
    reader: Reader<&'a [u8]>,
    tag: BytesStart<'a>,
    empty: bool,
}

fn locate<'a>(xml: &'a str, name: &str) -> Option<Located<'a>> {
    let mut reader = Reader::from_str(xml);
    loop {
        match reader.read_event().ok()? {
            Event::Start(tag) if tag.local_name().as_ref() == name.as_bytes() => {
                return Some(Located { reader, tag, empty: false });
            }
            Event::Empty(tag) if tag.local_name().as_ref() == name.as_bytes() => {
                return Some(Located { reader, tag, empty: true });
            }
            Event::Eof => return None,
            _ => {}
        }
    }
}

/// Raw content between the first `<…:name>` and its closing tag.
///
/// Self-closing elements yield an empty string.
pub fn element_inner<'a>(xml: &'a str, name: &str) -> Option<&'a str> {
    let Located { mut reader, empty, .. } = locate(xml, name)?;
    if empty {
        return Some("");
    }

    let content_start = reader.buffer_position() as usize;
    let mut depth = 0usize;
    loop {
        let before = reader.buffer_position() as usize;
        match reader.read_event().ok()? {
            Event::Start(_) => depth += 1,
            Event::End(_) if depth == 0 => return xml.get(content_start..before),
            Event::End(_) => depth -= 1,
            Event::Eof => return None,
            _ => {}
        }
    }
}

/// Trimmed, unescaped text of the first element called `name`.
///
/// Character data of nested elements is included; comments are skipped.
pub fn element_text(xml: &str, name: &str) -> Option<String> {
    let Located { mut reader, empty, .. } = locate(xml, name)?;
    if empty {
        return Some(String::new());
    }

    let mut text = String::new();
    let mut depth = 0usize;
    loop {
        match reader.read_event().ok()? {
            Event::Text(t) => text.push_str(&t.unescape().ok()?),
            Event::CData(c) => text.push_str(std::str::from_utf8(&c).ok()?),
            Event::Start(_) => depth += 1,
            Event::End(_) if depth == 0 => return Some(text.trim().to_string()),
            Event::End(_) => depth -= 1,
            Event::Eof => return None,
            _ => {}
        }
    }
}

/// Value of attribute `attr` on the first element called `name`.
pub fn element_attr(xml: &str, name: &str, attr: &str) -> Option<String> {
    let Located { tag, .. } = locate(xml, name)?;
    tag.attributes()
        .flatten()
        .find(|a| a.key.local_name().as_ref() == attr.as_bytes())
        .and_then(|a| a.unescape_value().ok())
        .map(Cow::into_owned)
}

/// Works out the operation a SOAP request asks for.
///
/// Tried in order: the `SOAPAction` header, the `action` parameter of
/// `Content-Type`, then the first element inside the envelope `Body`.
/// Only the last path segment of an action URI is kept.
pub fn extract_action(request: &Request) -> Option<String> {
    if let Some(action) = request
        .header("SOAPAction")
        .and_then(|v| action_name(v.trim().trim_matches('"')))
    {
        return Some(action);
    }

    if let Some(action) = request.header("Content-Type").and_then(|ct| {
        ct.split(';').skip(1).find_map(|param| {
            let (k, v) = param.split_once('=')?;
            if k.trim().eq_ignore_ascii_case("action") {
                action_name(v.trim().trim_matches('"'))
            } else {
                None
            }
        })
    }) {
        return Some(action);
    }

    let body = std::str::from_utf8(&request.body).ok()?;
    let Located { mut reader, empty, .. } = locate(body, "Body")?;
    if empty {
        return None;
    }
    loop {
        match reader.read_event().ok()? {
            Event::Start(tag) | Event::Empty(tag) => {
                return std::str::from_utf8(tag.local_name().as_ref())
                    .ok()
                    .map(str::to_string);
            }
            Event::End(_) | Event::Eof => return None,
            _ => {}
        }
    }
}

fn action_name(uri: &str) -> Option<String> {
    let name = uri.rsplit(['/', '#']).next()?.trim();
    (!name.is_empty()).then(|| name.to_string())
}

/// Wraps `body` in a SOAP 1.2 envelope.
pub fn envelope(body: &str) -> String {
    let mut out = String::with_capacity(ENVELOPE_OPEN.len() + body.len() + ENVELOPE_CLOSE.len());
    out.push_str(ENVELOPE_OPEN);
    out.push_str(body);
    out.push_str(ENVELOPE_CLOSE);
    out
}

/// SOAP 1.2 fault with the given code (`Sender` or `Receiver`), optional
/// ONVIF subcode and reason text.
pub fn fault(code: &str, subcode: Option<&str>, reason: &str) -> String {
    let subcode = subcode
        .map(|s| {
            format!(
                "<SOAP-ENV:Subcode><SOAP-ENV:Value>{}</SOAP-ENV:Value></SOAP-ENV:Subcode>",
                xml_escape(s)
            )
        })
        .unwrap_or_default();
    envelope(&format!(
        concat!(
            "<SOAP-ENV:Fault>",
            "<SOAP-ENV:Code><SOAP-ENV:Value>SOAP-ENV:{}</SOAP-ENV:Value>{}</SOAP-ENV:Code>",
            "<SOAP-ENV:Reason><SOAP-ENV:Text xml:lang=\"en\">{}</SOAP-ENV:Text></SOAP-ENV:Reason>",
            "</SOAP-ENV:Fault>"
        ),
        code,
        subcode,
        xml_escape(reason)
    ))
}

/// Fault envelope for a service error. Internal details never leak.
pub fn error_fault(error: &Error) -> String {
    let (code, subcode) = match error {
        Error::InvalidArgument(_) | Error::ParseFailure(_) => ("Sender", Some("ter:InvalidArgVal")),
        Error::NotFound(_) | Error::Duplicate(_) => ("Sender", Some("ter:NoEntity")),
        Error::Unsupported(_) => ("Sender", Some("ter:ActionNotSupported")),
        Error::AuthenticationFailed => ("Sender", Some("ter:NotAuthorized")),
        Error::ResourceExhausted(_) => ("Receiver", Some("ter:MaxReached")),
        Error::Internal(_) => ("Receiver", None),
    };
    fault(code, subcode, &error.public_message())
}

pub fn xml_escape(s: &str) -> String {
    escape::escape(s).into_owned()
}

/// Resolves predefined and numeric character references. Input with a
/// malformed reference is returned unchanged.
pub fn xml_unescape(s: &str) -> String {
    escape::unescape(s)
        .map(Cow::into_owned)
        .unwrap_or_else(|_| s.to_string())
}

/// Parses an xs:duration such as `PT10S`, `PT1M30.5S` or `-PT5S` into
/// milliseconds. Years and months are not accepted.
pub fn parse_duration_ms(value: &str) -> Option<i64> {
    let value = value.trim();
    let (negative, value) = match value.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, value),
    };
    let value = value.strip_prefix('P')?;
    let (date, time) = match value.split_once('T') {
        Some((d, t)) => (d, Some(t)),
        None => (value, None),
    };

    let mut total = 0f64;
    if !date.is_empty() {
        let days = date.strip_suffix('D')?;
        total += days.parse::<f64>().ok()? * 86_400_000.0;
    }

    if let Some(time) = time {
        if time.is_empty() {
            return None;
        }
        let mut number = String::new();
        for c in time.chars() {
            match c {
                '0'..='9' | '.' => number.push(c),
                'H' | 'M' | 'S' => {
                    let n: f64 = number.parse().ok()?;
                    total += n * match c {
                        'H' => 3_600_000.0,
                        'M' => 60_000.0,
                        _ => 1_000.0,
                    };
                    number.clear();
                }
                _ => return None,
            }
        }
        if !number.is_empty() {
            return None;
        }
    }

    if !total.is_finite() || total > i64::MAX as f64 {
        return None;
    }
    let ms = total.floor() as i64;
    Some(if negative { -ms } else { ms })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nested_same_name_elements() {
        let xml = "<a:X><a:X>inner</a:X></a:X><b>t</b>";
        assert_eq!(element_inner(xml, "X"), Some("<a:X>inner</a:X>"));
        assert_eq!(element_text(xml, "b").as_deref(), Some("t"));
    }

    #[test]
    fn attribute_with_gt_in_quotes() {
        let xml = r#"<tt:PanTilt x="0.5" note="a>b" y='-0.25'/>"#;
        assert_eq!(element_attr(xml, "PanTilt", "y").as_deref(), Some("-0.25"));
        assert_eq!(element_attr(xml, "PanTilt", "note").as_deref(), Some("a>b"));
        assert_eq!(element_inner(xml, "PanTilt"), Some(""));
    }

    #[test]
    fn character_references_and_comments() {
        let xml = "<tt:Name>Caf&#233; &#x41;</tt:Name><tptz:ProfileToken>Profile<!-- x -->1</tptz:ProfileToken>";
        assert_eq!(element_text(xml, "Name").as_deref(), Some("Café A"));
        assert_eq!(element_text(xml, "ProfileToken").as_deref(), Some("Profile1"));
        assert_eq!(xml_unescape("Caf&#233;"), "Café");
    }

    #[test]
    fn mismatched_end_tag_is_not_found() {
        assert_eq!(element_text("<a><b>x</c></a>", "b"), None);
    }

    #[test]
    fn durations() {
        assert_eq!(parse_duration_ms("PT10S"), Some(10_000));
        assert_eq!(parse_duration_ms("PT1M0.5S"), Some(60_500));
        assert_eq!(parse_duration_ms("-PT5S"), Some(-5_000));
        assert_eq!(parse_duration_ms("P1D"), Some(86_400_000));
        assert_eq!(parse_duration_ms("10"), None);
        assert_eq!(parse_duration_ms("PT"), None);
        assert_eq!(parse_duration_ms("PT5"), None);
    }
}
