use fetchdns::cache::DEFAULT_TTL;
use fetchdns::error::ExtractError;
use fetchdns::extract::Extractor;
use std::time::Duration;

#[test]
fn test_empty_source_is_identity() {
    let extractor = Extractor::new();
    assert_eq!(extractor.extract("", "10.0.0.2").unwrap(), "10.0.0.2");
    assert_eq!(extractor.cached_programs(), 0);
}

#[test]
fn test_json_field_access() {
    let extractor = Extractor::new();
    let body = r#"{"ip_address":"10.0.0.5","ttl":3600}"#;

    assert_eq!(
        extractor.extract("fromJSON(body).ip_address", body).unwrap(),
        "10.0.0.5"
    );
    assert_eq!(extractor.extract("fromJSON(body).ttl", body).unwrap(), "3600");
}

#[test]
fn test_json_nested_and_array_access() {
    let extractor = Extractor::new();
    let body = r#"{"results":[{"addr":"10.0.0.7"},{"addr":"10.0.0.8"}]}"#;

    assert_eq!(
        extractor
            .extract("fromJSON(body).results[0].addr", body)
            .unwrap(),
        "10.0.0.7"
    );
    assert_eq!(
        extractor
            .extract("fromJSON(body).results[1].addr", body)
            .unwrap(),
        "10.0.0.8"
    );
}

#[test]
fn test_json_object_indexed_by_string() {
    let extractor = Extractor::new();
    let body = r#"{"ip-address":"10.0.0.9"}"#;

    // Field names that are not identifiers go through bracket indexing
    assert_eq!(
        extractor
            .extract(r#"fromJSON(body)["ip-address"]"#, body)
            .unwrap(),
        "10.0.0.9"
    );
}

#[test]
fn test_json_null_renders_empty() {
    let extractor = Extractor::new();
    let body = r#"{"ip_address":null}"#;

    assert_eq!(extractor.extract("fromJSON(body).ip_address", body).unwrap(), "");
}

#[test]
fn test_split_and_index() {
    let extractor = Extractor::new();

    assert_eq!(
        extractor.extract(r#"split(body, "/")[0]"#, "10.0.0.2/32").unwrap(),
        "10.0.0.2"
    );
    assert_eq!(
        extractor.extract(r#"split(body, "/")[1]"#, "10.0.0.2/32").unwrap(),
        "32"
    );
}

#[test]
fn test_string_helpers() {
    let extractor = Extractor::new();

    assert_eq!(extractor.extract("upper(body)", "abc").unwrap(), "ABC");
    assert_eq!(extractor.extract("lower(body)", "ABC").unwrap(), "abc");
    assert_eq!(extractor.extract("trim(body)", "  10.0.0.2\n").unwrap(), "10.0.0.2");
    assert_eq!(
        extractor.extract("trim(lower(body))", " MiXeD \n").unwrap(),
        "mixed"
    );
}

#[test]
fn test_xml_field_access() {
    let extractor = Extractor::new();
    let body = "<record><ip>10.0.0.4</ip><ttl>120</ttl></record>";

    assert_eq!(
        extractor.extract("fromXML(body).record.ip", body).unwrap(),
        "10.0.0.4"
    );
    assert_eq!(
        extractor.extract("fromXML(body).record.ttl", body).unwrap(),
        "120"
    );
}

#[test]
fn test_xml_namespace_prefix_stripped() {
    let extractor = Extractor::new();
    let body = r#"<ns:record xmlns:ns="urn:x"><ns:ip>10.0.0.4</ns:ip></ns:record>"#;

    assert_eq!(
        extractor.extract("fromXML(body).record.ip", body).unwrap(),
        "10.0.0.4"
    );
}

#[test]
fn test_parse_error_unknown_function() {
    let extractor = Extractor::new();
    let err = extractor.extract("getHostByName(body)", "x").unwrap_err();
    assert!(matches!(err, ExtractError::Parse { .. }));
    // Failed compilations are not cached
    assert_eq!(extractor.cached_programs(), 0);
}

#[test]
fn test_parse_error_unknown_variable() {
    let extractor = Extractor::new();
    let err = extractor.extract("env", "x").unwrap_err();
    assert!(matches!(err, ExtractError::Parse { .. }));
}

#[test]
fn test_parse_error_trailing_tokens() {
    let extractor = Extractor::new();
    let err = extractor.extract("body body", "x").unwrap_err();
    assert!(matches!(err, ExtractError::Parse { .. }));
}

#[test]
fn test_parse_error_unterminated_string() {
    let extractor = Extractor::new();
    let err = extractor.extract(r#"split(body, "/"#, "x").unwrap_err();
    assert!(matches!(err, ExtractError::Parse { .. }));
}

#[test]
fn test_eval_error_invalid_json() {
    let extractor = Extractor::new();
    let err = extractor.extract("fromJSON(body).ip", "not json").unwrap_err();
    assert!(matches!(err, ExtractError::Eval { .. }));
    // The program itself compiled fine and stays cached
    assert_eq!(extractor.cached_programs(), 1);
}

#[test]
fn test_eval_error_missing_field() {
    let extractor = Extractor::new();
    let err = extractor
        .extract("fromJSON(body).missing", r#"{"ip":"10.0.0.2"}"#)
        .unwrap_err();
    assert!(matches!(err, ExtractError::Eval { .. }));
}

#[test]
fn test_eval_error_index_out_of_bounds() {
    let extractor = Extractor::new();
    let err = extractor
        .extract(r#"split(body, ".")[9]"#, "10.0.0.2")
        .unwrap_err();
    assert!(matches!(err, ExtractError::Eval { .. }));
}

#[test]
fn test_eval_error_list_is_not_a_scalar() {
    let extractor = Extractor::new();
    let err = extractor.extract(r#"split(body, ".")"#, "10.0.0.2").unwrap_err();
    assert!(matches!(err, ExtractError::Eval { .. }));
}

#[test]
fn test_failed_source_does_not_poison_cache() {
    let extractor = Extractor::new();
    assert!(extractor.extract("fromJSON(body.", "x").is_err());

    // A corrected program for the same lookup compiles and runs
    assert_eq!(
        extractor
            .extract("fromJSON(body).ip", r#"{"ip":"10.0.0.2"}"#)
            .unwrap(),
        "10.0.0.2"
    );
}

#[test]
fn test_identical_sources_compile_once() {
    let extractor = Extractor::new();
    let body = r#"{"ip":"10.0.0.2"}"#;

    for _ in 0..5 {
        extractor.extract("fromJSON(body).ip", body).unwrap();
    }
    assert_eq!(extractor.cached_programs(), 1);
}

#[test]
fn test_extract_ttl_happy_path() {
    let extractor = Extractor::new();
    let body = r#"{"ip_address":"10.0.0.5","ttl":3600}"#;

    let ttl = extractor.extract_ttl(Some("fromJSON(body).ttl"), body);
    assert_eq!(ttl, Duration::from_secs(3600));
}

#[test]
fn test_extract_ttl_defaults_without_source() {
    let extractor = Extractor::new();
    assert_eq!(extractor.extract_ttl(None, "anything"), DEFAULT_TTL);
    assert_eq!(extractor.extract_ttl(Some(""), "anything"), DEFAULT_TTL);
}

#[test]
fn test_extract_ttl_defaults_on_non_numeric_result() {
    let extractor = Extractor::new();
    let ttl = extractor.extract_ttl(Some("fromJSON(body).ttl"), r#"{"ttl":"soon"}"#);
    assert_eq!(ttl, DEFAULT_TTL);
}

#[test]
fn test_extract_ttl_defaults_on_eval_failure() {
    let extractor = Extractor::new();
    let ttl = extractor.extract_ttl(Some("fromJSON(body).ttl"), "not json");
    assert_eq!(ttl, DEFAULT_TTL);
}

#[test]
fn test_extract_ttl_rejects_negative() {
    let extractor = Extractor::new();
    let ttl = extractor.extract_ttl(Some("fromJSON(body).ttl"), r#"{"ttl":-5}"#);
    assert_eq!(ttl, DEFAULT_TTL);
}
