//! S.A.F.E — a multi-role healthcare backend over an embedded SQLite
//! store: accounts and role profiles, appointments, prescriptions,
//! medical files, consultations, messaging, notifications and
//! per-role dashboards behind a token-authenticated REST API.

pub mod api;
pub mod auth;
pub mod config;
pub mod dashboard;
pub mod db;
pub mod models;
pub mod scope;
pub mod transform;
