use std::sync::Arc;

use anyhow::Context;
use sqlx::postgres::PgPoolOptions;

use crate::activities::{
    logger::ActivityLogger,
    repo::{ActivityRepo, PgActivityRepo},
};
use crate::auth::{
    jwt::JwtKeys,
    repo::{PgUserRepo, UserRepo},
};
use crate::config::AppConfig;
use crate::images::{
    generator::{HttpImageGenerator, ImageGenerator},
    repo::{ImageRepo, PgImageRepo},
};
use crate::storage::{Storage, StorageClient};

/// Everything a handler may touch. Cheap to clone; all collaborators sit behind `Arc`.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub jwt: JwtKeys,
    pub users: Arc<dyn UserRepo>,
    pub images: Arc<dyn ImageRepo>,
    pub activities: Arc<dyn ActivityRepo>,
    pub activity_log: ActivityLogger,
    pub storage: Arc<dyn StorageClient>,
    pub generator: Arc<dyn ImageGenerator>,
}

/// Collaborators handed to [`AppState::from_parts`].
pub struct Backends {
    pub users: Arc<dyn UserRepo>,
    pub images: Arc<dyn ImageRepo>,
    pub activities: Arc<dyn ActivityRepo>,
    pub storage: Arc<dyn StorageClient>,
    pub generator: Arc<dyn ImageGenerator>,
}

impl AppState {
    pub async fn init(config: AppConfig) -> anyhow::Result<Self> {
        let db = PgPoolOptions::new()
            .max_connections(10)
            .connect(&config.database_url)
            .await
            .context("connect to database")?;

        sqlx::migrate!("./migrations")
            .run(&db)
            .await
            .context("run database migrations")?;

        let storage = Arc::new(Storage::new(&config.storage).await?) as Arc<dyn StorageClient>;
        let generator =
            Arc::new(HttpImageGenerator::new(&config.generator)?) as Arc<dyn ImageGenerator>;

        let backends = Backends {
            users: Arc::new(PgUserRepo::new(db.clone())),
            images: Arc::new(PgImageRepo::new(db.clone())),
            activities: Arc::new(PgActivityRepo::new(db)),
            storage,
            generator,
        };
        Ok(Self::from_parts(Arc::new(config), backends))
    }

    pub fn from_parts(config: Arc<AppConfig>, backends: Backends) -> Self {
        let Backends {
            users,
            images,
            activities,
            storage,
            generator,
        } = backends;
        Self {
            jwt: JwtKeys::new(&config.jwt),
            activity_log: ActivityLogger::new(activities.clone()),
            config,
            users,
            images,
            activities,
            storage,
            generator,
        }
    }
}
