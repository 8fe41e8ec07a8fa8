//! Role dashboards assembled from focused repository queries.
//!
//! Widgets degrade independently: a failing query is logged and its
//! widget served as an empty default, so one broken table never blanks
//! the whole dashboard.

use chrono::NaiveDate;
use rusqlite::Connection;
use serde::Serialize;
use uuid::Uuid;

use crate::db::repository as repo;
use crate::db::DatabaseError;
use crate::models::appointment::AppointmentCard;
use crate::models::prescription::Prescription;
use crate::models::user::UserSummary;
use crate::transform::{format_date, parse_blood_pressure};

fn widget<T: Default>(name: &str, result: Result<T, DatabaseError>) -> T {
    result.unwrap_or_else(|e| {
        tracing::warn!(widget = name, error = %e, "dashboard widget failed, serving default");
        T::default()
    })
}

#[derive(Debug, Clone, Serialize)]
pub struct CountEntry {
    pub label: String,
    pub count: i64,
}

fn counts(pairs: Vec<(String, i64)>) -> Vec<CountEntry> {
    pairs
        .into_iter()
        .map(|(label, count)| CountEntry { label, count })
        .collect()
}

#[derive(Debug, Clone, Serialize)]
pub struct HealthStats {
    pub blood_type: String,
    pub blood_pressure: String,
    pub heart_rate: String,
    pub weight: String,
    pub last_checkup: String,
    pub doctor_count: i64,
}

impl Default for HealthStats {
    fn default() -> Self {
        Self {
            blood_type: "N/A".into(),
            blood_pressure: "N/A".into(),
            heart_rate: "N/A".into(),
            weight: "N/A".into(),
            last_checkup: "N/A".into(),
            doctor_count: 0,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct BpReading {
    pub date: String,
    pub systolic: u32,
    pub diastolic: u32,
}

#[derive(Debug, Serialize)]
pub struct PatientDashboard {
    pub upcoming_appointments: Vec<AppointmentCard>,
    pub active_prescriptions: Vec<Prescription>,
    pub health_stats: HealthStats,
    pub blood_pressure_history: Vec<BpReading>,
}

fn patient_health_stats(
    conn: &Connection,
    patient_id: &Uuid,
) -> Result<HealthStats, DatabaseError> {
    let mut stats = HealthStats::default();
    stats.doctor_count = repo::count_doctors_for_patient(conn, patient_id)?;
    if let Some(checkup) = repo::last_completed_for_patient(conn, patient_id)? {
        stats.last_checkup = format_date(checkup);
    }
    if let Some(file) = repo::file_by_patient(conn, patient_id)? {
        if let Some(blood_type) = file.blood_type {
            stats.blood_type = blood_type;
        }
        if let Some(vitals) = repo::latest_vitals(conn, &file.id)? {
            if let Some(bp) = vitals.blood_pressure {
                stats.blood_pressure = bp;
            }
            if let Some(hr) = vitals.heart_rate {
                stats.heart_rate = format!("{hr} bpm");
            }
            if let Some(weight) = vitals.weight {
                stats.weight = format!("{weight} kg");
            }
        }
    }
    Ok(stats)
}

fn patient_bp_history(
    conn: &Connection,
    patient_id: &Uuid,
    limit: u32,
) -> Result<Vec<BpReading>, DatabaseError> {
    let Some(file) = repo::file_by_patient(conn, patient_id)? else {
        return Ok(Vec::new());
    };
    let readings = repo::recent_blood_pressure(conn, &file.id, limit)?;
    Ok(readings
        .into_iter()
        .map(|(recorded_at, raw)| {
            let (systolic, diastolic) = parse_blood_pressure(&raw);
            BpReading {
                date: format_date(recorded_at.date()),
                systolic,
                diastolic,
            }
        })
        .collect())
}

pub fn patient_dashboard(
    conn: &Connection,
    patient_id: &Uuid,
    today: NaiveDate,
) -> PatientDashboard {
    PatientDashboard {
        upcoming_appointments: widget(
            "upcoming_appointments",
            repo::upcoming_for_patient(conn, patient_id, today, 3),
        ),
        active_prescriptions: widget(
            "active_prescriptions",
            repo::active_for_patient(conn, patient_id, today, 3),
        ),
        health_stats: widget("health_stats", patient_health_stats(conn, patient_id)),
        blood_pressure_history: widget(
            "blood_pressure_history",
            patient_bp_history(conn, patient_id, 6),
        ),
    }
}

#[derive(Debug, Serialize)]
pub struct DoctorDashboard {
    pub todays_appointments: Vec<AppointmentCard>,
    pub upcoming_appointments: Vec<AppointmentCard>,
    pub patient_count: i64,
    pub pending_requests: Vec<AppointmentCard>,
    pub pending_request_count: i64,
    pub recent_file_access: Vec<repo::AccessView>,
    pub appointment_types: Vec<CountEntry>,
}

pub fn doctor_dashboard(
    conn: &Connection,
    doctor_id: &Uuid,
    doctor_user_id: &Uuid,
    today: NaiveDate,
) -> DoctorDashboard {
    DoctorDashboard {
        todays_appointments: widget(
            "todays_appointments",
            repo::todays_for_doctor(conn, doctor_id, today, 5),
        ),
        upcoming_appointments: widget(
            "upcoming_appointments",
            repo::future_for_doctor(conn, doctor_id, today, 5),
        ),
        patient_count: widget("patient_count", repo::count_patients_for_doctor(conn, doctor_id)),
        pending_requests: widget(
            "pending_requests",
            repo::pending_requests_for_doctor(conn, doctor_id, 5),
        ),
        pending_request_count: widget(
            "pending_request_count",
            repo::count_pending_requests_for_doctor(conn, doctor_id),
        ),
        recent_file_access: widget(
            "recent_file_access",
            repo::recent_access_for_user(conn, doctor_user_id, 5),
        ),
        appointment_types: widget(
            "appointment_types",
            repo::type_histogram_for_doctor(conn, doctor_id).map(counts),
        ),
    }
}

#[derive(Debug, Serialize)]
pub struct AdminDashboard {
    pub users_by_role: Vec<CountEntry>,
    pub recent_users: Vec<UserSummary>,
    pub appointment_status: Vec<CountEntry>,
    pub prescription_status: Vec<CountEntry>,
    pub recent_appointments: Vec<AppointmentCard>,
    pub activity: Vec<repo::ActivityEntry>,
    pub registrations: Vec<repo::RegistrationPoint>,
}

pub fn admin_dashboard(conn: &Connection) -> AdminDashboard {
    AdminDashboard {
        users_by_role: widget("users_by_role", repo::count_users_by_role(conn).map(counts)),
        recent_users: widget("recent_users", repo::recent_users(conn, 5)),
        appointment_status: widget(
            "appointment_status",
            repo::appointment_status_counts(conn).map(counts),
        ),
        prescription_status: widget(
            "prescription_status",
            repo::prescription_status_counts(conn).map(counts),
        ),
        recent_appointments: widget("recent_appointments", repo::recent_appointments(conn, 5)),
        activity: widget("activity", repo::activity_feed(conn, 10)),
        registrations: widget("registrations", repo::registration_series(conn, 6)),
    }
}
