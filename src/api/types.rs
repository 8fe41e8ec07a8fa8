//! Shared API state and request/response shapes.

use std::sync::{Arc, Mutex, MutexGuard};

use rusqlite::Connection;
use serde::{Deserialize, Serialize};

use crate::auth::token::AuthClaims;
use crate::config::ServerConfig;
use crate::models::enums::Role;

use super::error::ApiError;

/// State shared by every handler: the single SQLite connection behind a
/// mutex, and the server configuration.
#[derive(Clone)]
pub struct ApiContext {
    db: Arc<Mutex<Connection>>,
    pub config: Arc<ServerConfig>,
}

impl ApiContext {
    pub fn new(db: Connection, config: ServerConfig) -> Self {
        Self {
            db: Arc::new(Mutex::new(db)),
            config: Arc::new(config),
        }
    }

    /// A poisoned mutex only means another handler panicked mid-request;
    /// the connection itself is still usable.
    pub fn conn(&self) -> MutexGuard<'_, Connection> {
        self.db.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

const DEFAULT_PAGE_SIZE: u32 = 10;
const MAX_PAGE_SIZE: u32 = 100;

/// `?page=&limit=` query parameters, 1-based.
#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct PageQuery {
    pub page: Option<u32>,
    pub limit: Option<u32>,
}

impl PageQuery {
    pub fn page(&self) -> u32 {
        self.page.unwrap_or(1).max(1)
    }

    pub fn limit(&self) -> u32 {
        self.limit.unwrap_or(DEFAULT_PAGE_SIZE).clamp(1, MAX_PAGE_SIZE)
    }

    pub fn offset(&self) -> u32 {
        (self.page() - 1) * self.limit()
    }
}

#[derive(Debug, Serialize)]
pub struct Pagination {
    pub total: i64,
    pub page: u32,
    pub limit: u32,
    pub pages: i64,
}

#[derive(Debug, Serialize)]
pub struct Paginated<T> {
    pub data: Vec<T>,
    pub pagination: Pagination,
}

pub fn paginate<T>(data: Vec<T>, total: i64, query: &PageQuery) -> Paginated<T> {
    let limit = query.limit();
    Paginated {
        data,
        pagination: Pagination {
            total,
            page: query.page(),
            limit,
            pages: (total + i64::from(limit) - 1) / i64::from(limit),
        },
    }
}

pub fn require_role(claims: &AuthClaims, allowed: &[Role]) -> Result<(), ApiError> {
    if allowed.contains(&claims.role) {
        return Ok(());
    }
    Err(ApiError::Forbidden(format!(
        "role {} may not access this resource",
        claims.role.as_str()
    )))
}
