//! HTTP contract tests for the station REST client.
//!
//! These tests verify that the client:
//! 1. Calls the expected method and path for every operation
//! 2. Sends query parameters, bodies and the bearer token
//! 3. Classifies non-2xx answers and malformed payloads

use std::time::Duration;

use fuelwatch_alerts::{ActivityEntry, AlertBackend, AlertsError, StationClient};
use fuelwatch_core::{AlertLevel, SucursalId, UserId};
use serde_json::json;
use wiremock::{
    Mock, MockServer, ResponseTemplate,
    matchers::{body_json, body_partial_json, header, method, path, query_param},
};

fn client(server: &MockServer) -> StationClient {
    StationClient::new(server.uri(), Duration::from_secs(5)).unwrap()
}

fn user() -> UserId {
    UserId::parse("17").unwrap()
}

#[tokio::test]
async fn test_unread_count() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/notificaciones/usuario/17/count"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "count": 5 })))
        .expect(1)
        .mount(&server)
        .await;

    assert_eq!(client(&server).unread_count(&user()).await.unwrap(), 5);
}

#[tokio::test]
async fn test_unread_count_accepts_numeric_string() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/notificaciones/usuario/17/count"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "count": "3" })))
        .mount(&server)
        .await;

    assert_eq!(client(&server).unread_count(&user()).await.unwrap(), 3);
}

#[tokio::test]
async fn test_reserved_characters_in_user_id_stay_in_one_segment() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/notificaciones/usuario/5"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "count": 99 })))
        .expect(0)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/notificaciones/usuario/5%23x/count"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "count": 2 })))
        .expect(1)
        .mount(&server)
        .await;

    let odd = UserId::parse("5#x").unwrap();
    assert_eq!(client(&server).unread_count(&odd).await.unwrap(), 2);
}

#[tokio::test]
async fn test_pending_alerts() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/alertas/usuario/17/pendientes"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "alertas_pendientes": [{
                "id": 4,
                "nivel": "BAJO",
                "tanque_nombre": "Magna 1",
                "stock_actual": "1800.5",
                "capacidad_max": 10000,
                "porcentaje_stock": 18.0,
                "sucursal_nombre": "Centro",
                "fecha": "2024-03-01 08:30:00"
            }]
        })))
        .mount(&server)
        .await;

    let alerts = client(&server).pending_alerts(&user()).await.unwrap();
    assert_eq!(alerts.len(), 1);
    assert_eq!(alerts[0].nivel, AlertLevel::Bajo);
    assert_eq!(alerts[0].stock_actual, 1800.5);
    assert!(alerts[0].fecha.is_some());
}

#[tokio::test]
async fn test_pending_alerts_not_an_array_is_malformed() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/alertas/usuario/17/pendientes"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({ "alertas_pendientes": "not-an-array" })),
        )
        .mount(&server)
        .await;

    let err = client(&server).pending_alerts(&user()).await.unwrap_err();
    assert!(err.is_malformed(), "got {err:?}");
}

#[tokio::test]
async fn test_mark_read_endpoints() {
    let server = MockServer::start().await;
    Mock::given(method("PUT"))
        .and(path("/notificaciones/marcar-leida/9"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("PUT"))
        .and(path("/notificaciones/usuario/17/marcar-todas-leidas"))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    let client = client(&server);
    client.mark_notification_read(9).await.unwrap();
    client.mark_all_notifications_read(&user()).await.unwrap();
}

#[tokio::test]
async fn test_verify_stocks_sends_user_id() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/alertas/verificar-manual"))
        .and(body_json(json!({ "usuarioId": "17" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "tanques_criticos": 2,
            "mensaje": "Verificación completada"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let report = client(&server).verify_stocks(&user()).await.unwrap();
    assert_eq!(report.tanques_criticos, 2);
    assert_eq!(report.extra["mensaje"], "Verificación completada");
}

#[tokio::test]
async fn test_alerts_by_level_query() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/alertas"))
        .and(query_param("nivel", "CRÍTICO"))
        .and(query_param("sucursal_id", "3"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            { "id": 1, "nivel": "CRÍTICO", "tanque_nombre": "Diesel", "porcentaje_stock": 4.2 },
            { "id": 2, "nivel": "URGENTE", "tanque_nombre": "Premium", "porcentaje_stock": 2 }
        ])))
        .expect(1)
        .mount(&server)
        .await;

    let branch = SucursalId::parse("3").unwrap();
    let alerts = client(&server)
        .alerts_by_level(AlertLevel::Critico, Some(&branch))
        .await
        .unwrap();
    assert_eq!(alerts.len(), 2);
    assert!(alerts[0].is_critical_low());
    assert_eq!(alerts[1].nivel, AlertLevel::Other);
}

#[tokio::test]
async fn test_notification_feed_and_object_payload() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/notificaciones/simple/17"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            { "id": 1, "titulo": "Stock crítico", "descripcion": "Diesel al 4%", "visto": false },
            { "id": 2, "titulo": "Stock bajo", "descripcion": "Magna al 15%", "visto": true,
              "fecha_notificacion": "2024-03-01T08:30:00Z" }
        ])))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/notificaciones/simple/17"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "error": "oops" })))
        .mount(&server)
        .await;

    let client = client(&server);
    let feed = client.notification_feed(&user()).await.unwrap();
    assert_eq!(feed.len(), 2);
    assert!(feed[1].fecha_notificacion.is_some());

    let err = client.notification_feed(&user()).await.unwrap_err();
    assert!(err.is_malformed());
}

#[tokio::test]
async fn test_link_existing_notifications() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/notificaciones/vincular-existentes"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({ "message": "5 notificaciones vinculadas" })),
        )
        .mount(&server)
        .await;

    let report = client(&server).link_existing_notifications().await.unwrap();
    assert_eq!(report.message, "5 notificaciones vinculadas");
}

#[tokio::test]
async fn test_statistics_resolve_delete() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/alertas/estadisticas"))
        .and(query_param("sucursal_id", "2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "total": 12, "criticas": 3, "bajas": 9, "hoy": 1, "semana": 6,
            "promedio_porcentaje": "14.5"
        })))
        .mount(&server)
        .await;
    Mock::given(method("PUT"))
        .and(path("/alertas/8/resolver"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("DELETE"))
        .and(path("/alertas/8"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let client = client(&server);
    let branch = SucursalId::parse("2").unwrap();
    let stats = client.alert_statistics(Some(&branch)).await.unwrap();
    assert_eq!(stats.total, 12);
    assert_eq!(stats.criticas, 3);
    assert_eq!(stats.promedio_porcentaje, 14.5);

    client.resolve_alert(8).await.unwrap();
    client.delete_alert(8).await.unwrap();
}

#[tokio::test]
async fn test_activity_log_post() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/bitacora"))
        .and(body_partial_json(json!({
            "usuario_id": "17",
            "accion": "verificar_stock",
            "modulo": "alertas"
        })))
        .respond_with(ResponseTemplate::new(201))
        .expect(1)
        .mount(&server)
        .await;

    client(&server)
        .record_activity(&ActivityEntry::new("verificar_stock", "manual").for_user(&user()))
        .await
        .unwrap();
}

#[tokio::test]
async fn test_bearer_token_attached() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/notificaciones/usuario/17/count"))
        .and(header("authorization", "Bearer s3cret"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "count": 1 })))
        .expect(1)
        .mount(&server)
        .await;

    let client = client(&server).with_bearer_token("s3cret");
    assert_eq!(client.unread_count(&user()).await.unwrap(), 1);
}

#[tokio::test]
async fn test_non_2xx_is_status_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/notificaciones/usuario/17/count"))
        .respond_with(ResponseTemplate::new(500).set_body_string("database unavailable"))
        .mount(&server)
        .await;

    let err = client(&server).unread_count(&user()).await.unwrap_err();
    match &err {
        AlertsError::Status { status, body } => {
            assert_eq!(*status, 500);
            assert_eq!(body, "database unavailable");
        }
        other => panic!("expected a status error, got {other:?}"),
    }
    assert!(err.is_server_error());
    assert!(err.friendly_message().contains("500"));
}

#[tokio::test]
async fn test_slow_server_times_out() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/notificaciones/usuario/17/count"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({ "count": 1 }))
                .set_delay(Duration::from_secs(3)),
        )
        .mount(&server)
        .await;

    let client = StationClient::new(server.uri(), Duration::from_secs(1)).unwrap();
    let err = client.unread_count(&user()).await.unwrap_err();
    assert!(matches!(err, AlertsError::Timeout(1)), "got {err:?}");
}
