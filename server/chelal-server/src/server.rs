use crate::auth::JwtService;
use crate::config::AppConfig;
use crate::services::{AuditService, NotificationService};
use anyhow::{Context, Result};
use database_layer::DatabasePool;
use sqlx::PgPool;
use std::sync::Arc;
use tracing::info;

/// Shared application state handed to every handler
#[derive(Clone)]
pub struct ChelalServer {
    pub config: Arc<AppConfig>,
    pub db_pool: PgPool,
    pub jwt: JwtService,
}

impl ChelalServer {
    /// Connect to the database and build the server state.
    pub async fn new(config: AppConfig) -> Result<Self> {
        let pool = DatabasePool::connect(&config.pool_settings())
            .await
            .context("Failed to connect to the database")?;
        Ok(Self::new_with_pool(config, pool.into_inner()))
    }

    /// Build the state around an existing pool. Tests pass a lazy pool here.
    pub fn new_with_pool(config: AppConfig, db_pool: PgPool) -> Self {
        let jwt = JwtService::new(&config.auth);
        info!(
            low_stock_threshold = config.pharmacy.low_stock_threshold,
            "Server state initialised"
        );
        Self {
            config: Arc::new(config),
            db_pool,
            jwt,
        }
    }

    pub fn audit(&self) -> AuditService {
        AuditService::new(self.db_pool.clone())
    }

    pub fn notifications(&self) -> NotificationService {
        NotificationService::new(self.db_pool.clone())
    }
}
