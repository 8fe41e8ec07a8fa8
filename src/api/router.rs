//! Route table. Public routes are merged with the protected set, which
//! sits behind the token middleware; cross-cutting layers (timing,
//! tracing, CORS) wrap the whole router.

use axum::routing::{get, patch, post, put};
use axum::{middleware::from_fn, middleware::from_fn_with_state, Router};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use super::endpoints::{
    appointments, auth, consultations, dashboard, doctors, health, medical_files, notifications,
    patients, pharmacists, prescriptions,
};
use super::middleware::{auth::require_auth, timing::response_time};
use super::types::ApiContext;

pub fn build_router(ctx: ApiContext) -> Router {
    let public = Router::new()
        .route("/health", get(health::check))
        .route("/auth/register", post(auth::register))
        .route("/auth/login", post(auth::login))
        .route("/auth/logout", post(auth::logout))
        .route("/auth/forgot-password", post(auth::forgot_password))
        .route("/auth/reset-password", post(auth::reset_password))
        .route("/auth/verify-email", post(auth::verify_email));

    let protected = Router::new()
        .route("/auth/me", get(auth::me))
        .route("/auth/profile", put(auth::update_profile))
        .route("/auth/change-password", post(auth::change_password))
        .route("/auth/resend-verification", post(auth::resend_verification))
        // patient-facing surface
        .route(
            "/patients/profile",
            get(patients::get_profile).put(patients::update_profile),
        )
        .route("/patients/medical-file", get(patients::medical_file))
        .route(
            "/patients/appointments",
            get(appointments::list).post(appointments::create),
        )
        .route(
            "/patients/appointments/:id",
            put(appointments::update).delete(appointments::cancel_own),
        )
        .route(
            "/patients/medications",
            get(patients::list_medications).post(patients::add_medication),
        )
        .route(
            "/patients/medications/:id",
            put(patients::update_medication).delete(patients::remove_medication),
        )
        .route(
            "/patients/consultations",
            get(consultations::list).post(consultations::create),
        )
        .route(
            "/patients/consultations/:id",
            put(patients::reply_consultation),
        )
        .route("/patients/prescriptions", get(patients::list_prescriptions))
        .route(
            "/patients/prescriptions/active",
            get(patients::active_prescriptions),
        )
        .route(
            "/patients/messages",
            get(patients::list_messages).post(patients::send_message),
        )
        .route("/patients/doctors", get(patients::list_doctors))
        .route("/patients/doctors/:id", get(patients::get_doctor))
        .route("/patients/pharmacists", get(patients::list_pharmacists))
        .route("/patients/pharmacists/:id", get(patients::get_pharmacist))
        .route("/patients/dashboard/summary", get(dashboard::patient))
        // provider directories and self-service profiles
        .route("/doctors", get(doctors::list))
        .route(
            "/doctors/profile",
            get(doctors::get_profile).patch(doctors::update_profile),
        )
        .route("/doctors/patients", get(doctors::list_patients))
        .route("/doctors/:id", get(doctors::get))
        .route("/pharmacists", get(pharmacists::list))
        .route(
            "/pharmacists/profile",
            get(pharmacists::get_profile).patch(pharmacists::update_profile),
        )
        .route("/pharmacists/:id", get(pharmacists::get))
        // shared resources
        .route(
            "/appointments",
            get(appointments::list).post(appointments::create),
        )
        .route(
            "/appointments/:id",
            get(appointments::get).patch(appointments::update),
        )
        .route("/appointments/:id/status", patch(appointments::set_status))
        .route("/notifications", get(notifications::list))
        .route("/notifications/:id/read", patch(notifications::mark_read))
        .route("/notifications/read-all", patch(notifications::mark_all_read))
        .route("/medical-files/:id", get(medical_files::get))
        .route(
            "/medical-files/:id/emergency-contact",
            patch(medical_files::update_emergency_contact),
        )
        .route(
            "/medical-files/:id/insurance",
            patch(medical_files::update_insurance),
        )
        .route("/medical-files/:id/vitals", post(medical_files::record_vitals))
        .route(
            "/consultations",
            get(consultations::list).post(consultations::create),
        )
        .route(
            "/consultations/:id",
            get(consultations::get).patch(consultations::update),
        )
        .route(
            "/prescriptions",
            get(prescriptions::list).post(prescriptions::create),
        )
        .route(
            "/prescriptions/:id",
            get(prescriptions::get).patch(prescriptions::update),
        )
        .route("/api/dashboard/patient", get(dashboard::patient))
        .route("/api/dashboard/doctor", get(dashboard::doctor))
        .route("/api/dashboard/admin", get(dashboard::admin))
        .layer(from_fn_with_state(ctx.clone(), require_auth));

    public
        .merge(protected)
        .layer(from_fn(response_time))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(ctx)
}

#[cfg(test)]
mod tests {
    use axum::body::Body;
    use axum::http::{header, Request, StatusCode};
    use http_body_util::BodyExt;
    use serde_json::{json, Value};
    use tower::ServiceExt;

    use super::*;
    use crate::config::ServerConfig;
    use crate::db::open_memory_database;

    fn test_ctx() -> ApiContext {
        ApiContext::new(open_memory_database().unwrap(), ServerConfig::for_tests())
    }

    async fn body_json(response: axum::response::Response) -> Value {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    async fn register(router: &Router, role: &str, email: &str) -> String {
        let response = router
            .clone()
            .oneshot(
                Request::post("/auth/register")
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from(
                        json!({
                            "email": email,
                            "password": "hunter2hunter2",
                            "name": "Jamie Rivera",
                            "role": role,
                            "birth_date": "1990-04-01",
                            "specialty": "cardiology",
                            "pharmacy_name": "Central Pharmacy",
                        })
                        .to_string(),
                    ))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);
        body_json(response).await["token"].as_str().unwrap().to_string()
    }

    fn authed(method: &str, uri: &str, token: &str) -> Request<Body> {
        Request::builder()
            .method(method)
            .uri(uri)
            .header(header::AUTHORIZATION, format!("Bearer {token}"))
            .body(Body::empty())
            .unwrap()
    }

    #[tokio::test]
    async fn health_is_public() {
        let router = build_router(test_ctx());
        let response = router
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert!(response.headers().contains_key("x-response-time"));
        let body = body_json(response).await;
        assert_eq!(body["status"], "ok");
    }

    #[tokio::test]
    async fn register_login_me_round_trip() {
        let router = build_router(test_ctx());
        register(&router, "patient", "jamie@example.com").await;

        let response = router
            .clone()
            .oneshot(
                Request::post("/auth/login")
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from(
                        json!({ "email": "jamie@example.com", "password": "hunter2hunter2" })
                            .to_string(),
                    ))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let token = body_json(response).await["token"]
            .as_str()
            .unwrap()
            .to_string();

        let response = router
            .oneshot(authed("GET", "/auth/me", &token))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["email"], "jamie@example.com");
    }

    #[tokio::test]
    async fn protected_routes_reject_missing_token() {
        let router = build_router(test_ctx());
        let response = router
            .oneshot(
                Request::get("/api/dashboard/patient")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(
            response.headers().get("x-error-type").unwrap(),
            "unauthorized"
        );
    }

    #[tokio::test]
    async fn patient_dashboard_serves_with_data_source_header() {
        let router = build_router(test_ctx());
        let token = register(&router, "patient", "dash@example.com").await;
        let response = router
            .oneshot(authed("GET", "/api/dashboard/patient", &token))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers().get("x-data-source").unwrap(), "sqlite");
        let body = body_json(response).await;
        assert_eq!(body["health_stats"]["blood_type"], "N/A");
    }

    #[tokio::test]
    async fn wrong_role_is_forbidden() {
        let router = build_router(test_ctx());
        let token = register(&router, "patient", "nope@example.com").await;
        let response = router
            .oneshot(authed("GET", "/api/dashboard/admin", &token))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        assert_eq!(response.headers().get("x-error-type").unwrap(), "forbidden");
    }

    #[tokio::test]
    async fn appointment_listing_is_scoped_and_paginated() {
        let router = build_router(test_ctx());
        let patient = register(&router, "patient", "p1@example.com").await;
        register(&router, "doctor", "d1@example.com").await;

        let response = router
            .oneshot(authed("GET", "/appointments?page=1&limit=5", &patient))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["pagination"]["total"], 0);
        assert_eq!(body["pagination"]["limit"], 5);
        assert!(body["data"].as_array().unwrap().is_empty());
    }

    #[tokio::test]
    async fn patient_books_appointment_with_doctor() {
        let router = build_router(test_ctx());
        let patient = register(&router, "patient", "book@example.com").await;
        let doctor = register(&router, "doctor", "doc@example.com").await;

        // find the doctor through the directory
        let response = router
            .clone()
            .oneshot(authed("GET", "/doctors", &patient))
            .await
            .unwrap();
        let doctors = body_json(response).await;
        let doctor_id = doctors[0]["id"].as_str().unwrap().to_string();

        let response = router
            .clone()
            .oneshot(
                Request::post("/appointments")
                    .header(header::AUTHORIZATION, format!("Bearer {patient}"))
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from(
                        json!({
                            "doctor_id": doctor_id,
                            "date": "2031-05-20",
                            "time": "10:30",
                            "type": "checkup",
                        })
                        .to_string(),
                    ))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);
        let created = body_json(response).await;
        assert_eq!(created["status"], "requested");

        // the doctor sees the request in their scoped listing
        let response = router
            .oneshot(authed("GET", "/appointments", &doctor))
            .await
            .unwrap();
        let body = body_json(response).await;
        assert_eq!(body["pagination"]["total"], 1);
    }

    #[tokio::test]
    async fn register_rejects_missing_fields_with_details() {
        let router = build_router(test_ctx());
        let response = router
            .oneshot(
                Request::post("/auth/register")
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from(json!({ "email": "x@example.com" }).to_string()))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = body_json(response).await;
        assert_eq!(body["error"], "validation");
        let missing = body["details"]["missing"].as_array().unwrap();
        assert!(missing.iter().any(|f| f == "password"));
    }
}
