use onvif_server::http::parser::{ParseError, RequestParser, parse_http_request};
use onvif_server::http::request::{Method, Request, RequestTarget, Version};
use onvif_server::http::response::StatusCode;

const SOAP_POST: &[u8] = b"POST /onvif/ptz_service HTTP/1.1\r\nHost: cam.local\r\nContent-Type: application/soap+xml; charset=utf-8\r\nContent-Length: 5\r\n\r\nhello";

fn assert_same_request(a: &Request, b: &Request) {
    assert_eq!(a.method, b.method);
    assert_eq!(a.target, b.target);
    assert_eq!(a.version, b.version);
    assert_eq!(a.headers, b.headers);
    assert_eq!(a.trailers, b.trailers);
    assert_eq!(a.body, b.body);
    assert_eq!(a.content_length, b.content_length);
}

#[test]
fn test_parse_simple_get_request() {
    let req = b"GET / HTTP/1.1\r\nHost: example.com\r\n\r\n";
    let (parsed, consumed) = parse_http_request(req).unwrap();

    assert_eq!(parsed.method, Method::GET);
    assert_eq!(parsed.path(), "/");
    assert_eq!(parsed.version, Version::Http11);
    assert_eq!(parsed.headers.get("Host").unwrap(), "example.com");
    assert_eq!(consumed, req.len());
}

#[test]
fn test_parse_post_request_with_body() {
    let (parsed, consumed) = parse_http_request(SOAP_POST).unwrap();

    assert_eq!(parsed.method, Method::POST);
    assert_eq!(parsed.path(), "/onvif/ptz_service");
    assert_eq!(parsed.body, b"hello".to_vec());
    assert_eq!(parsed.content_length, Some(5));
    assert_eq!(consumed, SOAP_POST.len());
}

#[test]
fn test_parse_multiple_headers() {
    let req = b"GET /path HTTP/1.1\r\nHost: example.com\r\nUser-Agent: test-client\r\nAccept: */*\r\n\r\n";
    let (parsed, _) = parse_http_request(req).unwrap();

    assert_eq!(parsed.headers.get("host").unwrap(), "example.com");
    assert_eq!(parsed.headers.get("User-Agent").unwrap(), "test-client");
    assert_eq!(parsed.headers.get("Accept").unwrap(), "*/*");
}

#[test]
fn test_parse_request_with_path_and_query_string() {
    let req = b"GET /search?q=rust HTTP/1.1\r\nHost: example.com\r\n\r\n";
    let (parsed, _) = parse_http_request(req).unwrap();

    assert_eq!(parsed.target.as_str(), "/search?q=rust");
    assert_eq!(parsed.path(), "/search");
}

#[test]
fn test_parse_absolute_form_target() {
    let req = b"GET http://cam.local:8080/onvif/device_service HTTP/1.1\r\nHost: cam.local\r\n\r\n";
    let (parsed, _) = parse_http_request(req).unwrap();

    assert!(matches!(parsed.target, RequestTarget::Absolute { .. }));
    assert_eq!(parsed.path(), "/onvif/device_service");
}

#[test]
fn test_parse_rejects_other_target_forms() {
    let asterisk = parse_http_request(b"GET * HTTP/1.1\r\nHost: cam\r\n\r\n");
    assert_eq!(asterisk.unwrap_err(), ParseError::InvalidTarget);

    let relative = parse_http_request(b"GET onvif/device HTTP/1.1\r\nHost: cam\r\n\r\n");
    assert_eq!(relative.unwrap_err(), ParseError::InvalidTarget);

    let ftp = parse_http_request(b"GET ftp://cam/x HTTP/1.1\r\nHost: cam\r\n\r\n");
    assert_eq!(ftp.unwrap_err(), ParseError::InvalidTarget);
}

#[test]
fn test_parse_incomplete_request_missing_blank_line() {
    let req = b"GET / HTTP/1.1\r\nHost: example.com\r\n";
    let result = parse_http_request(req);

    assert!(matches!(result, Err(ParseError::Incomplete)));
}

#[test]
fn test_parse_incomplete_request_partial_body() {
    let req = b"POST /api HTTP/1.1\r\nHost: cam\r\nContent-Type: text/xml\r\nContent-Length: 10\r\n\r\nhello";
    let result = parse_http_request(req);

    assert!(matches!(result, Err(ParseError::Incomplete)));
}

#[test]
fn test_split_reads_parse_like_a_single_read() {
    let (whole, _) = parse_http_request(SOAP_POST).unwrap();

    for split in 1..SOAP_POST.len() {
        let mut parser = RequestParser::new();
        assert_eq!(
            parser.parse(&SOAP_POST[..split]).unwrap_err(),
            ParseError::Incomplete,
            "split at {}",
            split
        );
        let (parsed, consumed) = parser.parse(SOAP_POST).unwrap();
        assert_same_request(&whole, &parsed);
        assert_eq!(consumed, SOAP_POST.len());
    }
}

#[test]
fn test_split_chunked_reads_parse_like_a_single_read() {
    let req: &[u8] = b"POST /onvif/ptz_service HTTP/1.1\r\nHost: cam\r\nContent-Type: text/xml\r\nTransfer-Encoding: chunked\r\n\r\n4\r\nWiki\r\n5\r\npedia\r\n0\r\nX-Check: 1\r\n\r\n";
    let (whole, _) = parse_http_request(req).unwrap();
    assert_eq!(whole.body, b"Wikipedia");

    let mut parser = RequestParser::new();
    let mut result = Err(ParseError::Incomplete);
    for end in 1..=req.len() {
        result = parser.parse(&req[..end]);
        if end < req.len() {
            assert_eq!(result.as_ref().unwrap_err(), &ParseError::Incomplete);
        }
    }
    let (parsed, consumed) = result.unwrap();
    assert_same_request(&whole, &parsed);
    assert_eq!(consumed, req.len());
}

#[test]
fn test_chunked_body_exposes_trailers() {
    let req = b"POST /onvif/ptz_service HTTP/1.1\r\nHost: cam\r\nContent-Type: text/xml\r\nTransfer-Encoding: chunked\r\n\r\n4\r\nWiki\r\n5\r\npedia\r\n0\r\nSOAPAction: urn:GetNodes\r\n\r\n";
    let (parsed, _) = parse_http_request(req).unwrap();

    assert_eq!(parsed.body, b"Wikipedia");
    assert_eq!(parsed.content_length, None);
    assert!(parsed.headers.get("SOAPAction").is_none());
    assert_eq!(parsed.header("SOAPAction"), None);
    assert_eq!(parsed.trailer("SOAPAction"), Some("urn:GetNodes"));
}

#[test]
fn test_trailer_cannot_supply_soap_action() {
    let body = "<s:Envelope xmlns:s=\"http://www.w3.org/2003/05/soap-envelope\"><s:Body><GetPresets/></s:Body></s:Envelope>";
    let req = format!(
        "POST /onvif/ptz_service HTTP/1.1\r\nHost: cam\r\nContent-Type: application/soap+xml\r\nTransfer-Encoding: chunked\r\n\r\n{:x}\r\n{}\r\n0\r\nSOAPAction: urn:SetHomePosition\r\n\r\n",
        body.len(),
        body
    );
    let (parsed, _) = parse_http_request(req.as_bytes()).unwrap();

    assert_eq!(onvif_server::soap::extract_action(&parsed).as_deref(), Some("GetPresets"));
}

#[test]
fn test_host_header_must_appear_exactly_once() {
    let missing = parse_http_request(b"GET / HTTP/1.1\r\nAccept: */*\r\n\r\n").unwrap_err();
    assert_eq!(missing, ParseError::MissingHost);
    assert_eq!(missing.status(), StatusCode::BadRequest);

    let twice = parse_http_request(b"GET / HTTP/1.1\r\nHost: a\r\nhost: b\r\n\r\n").unwrap_err();
    assert_eq!(twice, ParseError::DuplicateHost);
    assert_eq!(twice.status(), StatusCode::BadRequest);
}

#[test]
fn test_other_methods_are_not_allowed() {
    for method in ["PUT", "DELETE", "OPTIONS", "HEAD", "PATCH"] {
        let req = format!("{} / HTTP/1.1\r\nHost: cam\r\n\r\n", method);
        let err = parse_http_request(req.as_bytes()).unwrap_err();
        assert_eq!(err, ParseError::MethodNotAllowed(method.to_string()));
        assert_eq!(err.status(), StatusCode::MethodNotAllowed);
    }
}

#[test]
fn test_token_length_limits() {
    let target = format!("GET /{} HTTP/1.1\r\n", "a".repeat(300));
    assert_eq!(
        parse_http_request(target.as_bytes()).unwrap_err(),
        ParseError::LengthExceeded("request-target")
    );

    let version = b"GET / HTTP/1.1111111111111\r\n";
    assert_eq!(
        parse_http_request(version).unwrap_err(),
        ParseError::LengthExceeded("version")
    );
}

#[test]
fn test_unknown_version_rejected() {
    let err = parse_http_request(b"GET / HTTP/2.0\r\nHost: cam\r\n\r\n").unwrap_err();
    assert_eq!(err, ParseError::InvalidVersion);
}

#[test]
fn test_content_length_limits() {
    let too_big = b"POST /onvif/ptz_service HTTP/1.1\r\nHost: cam\r\nContent-Type: text/xml\r\nContent-Length: 300000\r\n\r\n";
    let err = parse_http_request(too_big).unwrap_err();
    assert_eq!(err, ParseError::ContentTooLarge);
    assert_eq!(err.status(), StatusCode::BadRequest);

    let negative = b"POST / HTTP/1.1\r\nHost: cam\r\nContent-Type: text/xml\r\nContent-Length: -1\r\n\r\n";
    assert_eq!(parse_http_request(negative).unwrap_err(), ParseError::InvalidContentLength);

    let conflicting = b"POST / HTTP/1.1\r\nHost: cam\r\nContent-Type: text/xml\r\nContent-Length: 1\r\nContent-Length: 2\r\n\r\nab";
    assert_eq!(parse_http_request(conflicting).unwrap_err(), ParseError::InvalidContentLength);

    let repeated = b"POST / HTTP/1.1\r\nHost: cam\r\nContent-Type: text/xml\r\nContent-Length: 2\r\nContent-Length: 2\r\n\r\nab";
    assert_eq!(parse_http_request(repeated).unwrap().0.body, b"ab");

    let padded = b"POST / HTTP/1.1\r\nHost: cam\r\nContent-Type: text/xml\r\nContent-Length: 0000000001\r\n\r\na";
    let (parsed, _) = parse_http_request(padded).unwrap();
    assert_eq!(parsed.content_length, Some(1));
    assert_eq!(parsed.body, b"a");

    let zeros = b"POST / HTTP/1.1\r\nHost: cam\r\nContent-Length: 0000000000000\r\n\r\n";
    assert!(parse_http_request(zeros).unwrap().0.body.is_empty());

    let padded_too_big = b"POST / HTTP/1.1\r\nHost: cam\r\nContent-Type: text/xml\r\nContent-Length: 00001234567890\r\n\r\n";
    assert_eq!(parse_http_request(padded_too_big).unwrap_err(), ParseError::ContentTooLarge);
}

#[test]
fn test_transfer_encoding_rules() {
    let both = b"POST / HTTP/1.1\r\nHost: cam\r\nContent-Type: text/xml\r\nContent-Length: 3\r\nTransfer-Encoding: chunked\r\n\r\n";
    assert_eq!(parse_http_request(both).unwrap_err(), ParseError::ConflictingFraming);

    let stacked = b"POST / HTTP/1.1\r\nHost: cam\r\nContent-Type: text/xml\r\nTransfer-Encoding: gzip, chunked\r\n\r\n";
    let err = parse_http_request(stacked).unwrap_err();
    assert_eq!(err, ParseError::InvalidTransferEncoding);
    assert_eq!(err.status(), StatusCode::BadRequest);

    let after_chunked = b"POST / HTTP/1.1\r\nHost: cam\r\nContent-Type: text/xml\r\nTransfer-Encoding: chunked\r\nTransfer-Encoding: gzip\r\n\r\n";
    assert_eq!(parse_http_request(after_chunked).unwrap_err(), ParseError::InvalidTransferEncoding);

    let unknown = b"POST / HTTP/1.1\r\nHost: cam\r\nContent-Type: text/xml\r\nTransfer-Encoding: snappy\r\n\r\n";
    let err = parse_http_request(unknown).unwrap_err();
    assert_eq!(err, ParseError::UnsupportedTransferCoding("snappy".to_string()));
    assert_eq!(err.status(), StatusCode::NotImplemented);
}

#[test]
fn test_body_content_type_rules() {
    let missing = b"POST / HTTP/1.1\r\nHost: cam\r\nContent-Length: 2\r\n\r\nhi";
    let err = parse_http_request(missing).unwrap_err();
    assert_eq!(err, ParseError::MissingContentType);
    assert_eq!(err.status(), StatusCode::BadRequest);

    let garbage = b"POST / HTTP/1.1\r\nHost: cam\r\nContent-Type: not a type\r\nContent-Length: 2\r\n\r\nhi";
    assert_eq!(parse_http_request(garbage).unwrap_err(), ParseError::MissingContentType);

    let json = b"POST / HTTP/1.1\r\nHost: cam\r\nContent-Type: application/json\r\nContent-Length: 2\r\n\r\nhi";
    let err = parse_http_request(json).unwrap_err();
    assert_eq!(err, ParseError::UnsupportedMediaType("application/json".to_string()));
    assert_eq!(err.status(), StatusCode::UnsupportedMediaType);

    let text_xml = b"POST / HTTP/1.1\r\nHost: cam\r\nContent-Type: Text/XML\r\nContent-Length: 2\r\n\r\nhi";
    assert!(parse_http_request(text_xml).is_ok());

    // no body, no Content-Type needed
    let empty = b"POST / HTTP/1.1\r\nHost: cam\r\nContent-Length: 0\r\n\r\n";
    assert!(parse_http_request(empty).is_ok());
}

#[test]
fn test_header_limits() {
    let mut req = String::from("GET / HTTP/1.1\r\nHost: cam\r\n");
    for i in 0..64 {
        req.push_str(&format!("X-{}: v\r\n", i));
    }
    req.push_str("\r\n");
    assert_eq!(parse_http_request(req.as_bytes()).unwrap_err(), ParseError::TooManyHeaders);

    let long = format!("GET / HTTP/1.1\r\nHost: cam\r\nX-Long: {}\r\n\r\n", "v".repeat(9000));
    assert_eq!(
        parse_http_request(long.as_bytes()).unwrap_err(),
        ParseError::LengthExceeded("header line")
    );
}

#[test]
fn test_pipelined_requests_are_parsed_in_order() {
    let req = b"GET /a HTTP/1.1\r\nHost: cam\r\n\r\nGET /b HTTP/1.1\r\nHost: cam\r\n\r\n";

    let (first, consumed) = parse_http_request(req).unwrap();
    assert_eq!(first.path(), "/a");

    let (second, rest) = parse_http_request(&req[consumed..]).unwrap();
    assert_eq!(second.path(), "/b");
    assert_eq!(consumed + rest, req.len());
}

#[test]
fn test_leading_empty_lines_are_skipped() {
    let req = b"\r\n\r\nGET / HTTP/1.1\r\nHost: cam\r\n\r\n";
    let (parsed, consumed) = parse_http_request(req).unwrap();
    assert_eq!(parsed.path(), "/");
    assert_eq!(consumed, req.len());
}
