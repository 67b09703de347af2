#![cfg(feature = "submit")]

mod common;

use std::time::Duration;

use mockito::Matcher;
use sifen::submit::{AuthorityClient, AuthorityStatus, RelayClient, SifenClient, SubmissionError};

use common::{lookup_response, signed_document, submit_response};

const TIMEOUT: Duration = Duration::from_secs(5);

fn sifen_client(server: &mockito::Server) -> SifenClient {
    SifenClient::with_endpoints(
        format!("{}/de/ws/sync/recibe.wsdl", server.url()),
        format!("{}/de/ws/consultas/consulta.wsdl", server.url()),
        TIMEOUT,
        None,
    )
    .unwrap()
}

// ── Direct SOAP ─────────────────────────────────────────────────────────────

#[tokio::test]
async fn soap_submit_approved() {
    let doc = signed_document("123456789");
    let cdc = doc.control_code().to_string();

    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("POST", "/de/ws/sync/recibe.wsdl")
        .match_header("content-type", "application/soap+xml; charset=utf-8")
        .match_body(Matcher::AllOf(vec![
            Matcher::Regex("<rEnviDe xmlns=\"http://ekuatia.set.gov.py/sifen/xsd\">".into()),
            Matcher::Regex(format!("<xDE><rDE .*Id=\"{cdc}\"")),
            Matcher::Regex("<dCarQR>https://ekuatia.set.gov.py/consultas-test/qr\\?".into()),
        ]))
        .with_status(200)
        .with_body(submit_response(&cdc, "Aprobado", "0260", "Autorización del DE satisfactoria", Some("48931")))
        .create_async()
        .await;

    let result = sifen_client(&server).submit(&doc).await.unwrap();
    mock.assert_async().await;

    assert!(result.is_accepted());
    assert_eq!(result.control_code.as_ref(), Some(doc.control_code()));
    assert_eq!(result.protocol_number.as_deref(), Some("48931"));
    assert_eq!(result.code.as_deref(), Some("0260"));
}

#[tokio::test]
async fn soap_submit_rejected() {
    let doc = signed_document("123456789");
    let cdc = doc.control_code().to_string();

    let mut server = mockito::Server::new_async().await;
    server
        .mock("POST", "/de/ws/sync/recibe.wsdl")
        .with_status(200)
        .with_body(submit_response(&cdc, "Rechazado", "1264", "RUC del receptor inexistente", None))
        .create_async()
        .await;

    let result = sifen_client(&server).submit(&doc).await.unwrap();
    assert_eq!(result.status, AuthorityStatus::Rejected);
    assert_eq!(result.message.as_deref(), Some("RUC del receptor inexistente"));
}

#[tokio::test]
async fn soap_server_error_is_transport() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("POST", "/de/ws/sync/recibe.wsdl")
        .with_status(503)
        .with_body("Service Unavailable")
        .create_async()
        .await;

    let err = sifen_client(&server).submit(&signed_document("123456789")).await.unwrap_err();
    assert!(matches!(err, SubmissionError::Transport(_)), "{err:?}");
}

#[tokio::test]
async fn soap_html_body_is_ambiguous() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("POST", "/de/ws/sync/recibe.wsdl")
        .with_status(200)
        .with_body("<html><body>Mantenimiento</body></html>")
        .create_async()
        .await;

    let err = sifen_client(&server).submit(&signed_document("123456789")).await.unwrap_err();
    assert!(matches!(err, SubmissionError::Ambiguous { .. }), "{err:?}");
}

#[tokio::test]
async fn connection_refused_is_transport() {
    let client = SifenClient::with_endpoints(
        "http://127.0.0.1:9/recibe",
        "http://127.0.0.1:9/consulta",
        Duration::from_secs(2),
        None,
    )
    .unwrap();
    let err = client.submit(&signed_document("123456789")).await.unwrap_err();
    assert!(matches!(err, SubmissionError::Transport(_)));
}

#[tokio::test]
async fn soap_lookup_found_and_missing() {
    let doc = signed_document("123456789");
    let cdc = doc.control_code().to_string();

    let mut server = mockito::Server::new_async().await;
    let found = server
        .mock("POST", "/de/ws/consultas/consulta.wsdl")
        .match_body(Matcher::Regex(format!("<dCDC>{cdc}</dCDC>")))
        .with_status(200)
        .with_body(lookup_response(
            "0422",
            "CDC encontrado",
            &format!("<ns2:xContenDE><ns2:Id>{cdc}</ns2:Id><ns2:dProtAut>48931</ns2:dProtAut></ns2:xContenDE>"),
        ))
        .create_async()
        .await;

    let result = sifen_client(&server).lookup(doc.control_code()).await.unwrap().unwrap();
    found.assert_async().await;
    assert!(result.is_accepted());
    assert_eq!(result.protocol_number.as_deref(), Some("48931"));

    server.reset();
    server
        .mock("POST", "/de/ws/consultas/consulta.wsdl")
        .with_status(200)
        .with_body(lookup_response("0420", "CDC inexistente", ""))
        .create_async()
        .await;
    assert!(sifen_client(&server).lookup(doc.control_code()).await.unwrap().is_none());
}

// ── Relay ───────────────────────────────────────────────────────────────────

#[tokio::test]
async fn relay_submit_sends_bearer_and_json() {
    let doc = signed_document("123456789");
    let cdc = doc.control_code().to_string();

    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("POST", "/v1/documents")
        .match_header("authorization", "Bearer sk-test")
        .match_body(Matcher::PartialJson(serde_json::json!({ "control_code": cdc })))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(format!(
            r#"{{"success":true,"data":{{"estado":"Aprobado","cdc":"{cdc}","protocolo":"77120","qr":"https://ekuatia.set.gov.py/consultas-test/qr?nVersion=150"}}}}"#
        ))
        .create_async()
        .await;

    let client = RelayClient::new(format!("{}/v1/", server.url()), "sk-test", TIMEOUT).unwrap();
    let result = client.submit(&doc).await.unwrap();
    mock.assert_async().await;

    assert!(result.is_accepted());
    assert_eq!(result.protocol_number.as_deref(), Some("77120"));
    assert!(result.verification_url.unwrap().contains("nVersion=150"));
}

#[tokio::test]
async fn relay_rate_limit_is_transport() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("POST", "/documents")
        .with_status(429)
        .create_async()
        .await;

    let client = RelayClient::new(server.url(), "sk-test", TIMEOUT).unwrap();
    let err = client.submit(&signed_document("123456789")).await.unwrap_err();
    assert!(matches!(err, SubmissionError::Transport(_)));
}

#[tokio::test]
async fn relay_bad_credentials_are_ambiguous() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("POST", "/documents")
        .with_status(401)
        .with_body(r#"{"error":"invalid api key"}"#)
        .create_async()
        .await;

    let client = RelayClient::new(server.url(), "wrong", TIMEOUT).unwrap();
    let err = client.submit(&signed_document("123456789")).await.unwrap_err();
    assert!(matches!(err, SubmissionError::Ambiguous { .. }));
}

#[tokio::test]
async fn relay_lookup() {
    let doc = signed_document("123456789");
    let cdc = doc.control_code().to_string();

    let mut server = mockito::Server::new_async().await;
    server
        .mock("GET", format!("/documents/{cdc}").as_str())
        .match_header("authorization", "Bearer sk-test")
        .with_status(200)
        .with_body(format!(r#"{{"status":"rejected","cdc":"{cdc}","code":"1001","message":"CDC duplicado"}}"#))
        .create_async()
        .await;

    let client = RelayClient::new(server.url(), "sk-test", TIMEOUT).unwrap();
    let result = client.lookup(doc.control_code()).await.unwrap().unwrap();
    assert_eq!(result.status, AuthorityStatus::Rejected);
    assert_eq!(result.code.as_deref(), Some("1001"));

    server.reset();
    server
        .mock("GET", format!("/documents/{cdc}").as_str())
        .with_status(404)
        .create_async()
        .await;
    assert!(client.lookup(doc.control_code()).await.unwrap().is_none());
}
