//! In-memory backends and a router harness for handler tests.

use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, Mutex,
    },
    time::Duration,
};

use anyhow::anyhow;
use async_trait::async_trait;
use axum::http::{header::AUTHORIZATION, HeaderName, HeaderValue};
use axum_test::TestServer;
use bytes::Bytes;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::activities::repo::{
    Activity, ActivityAction, ActivityEntry, ActivityImage, ActivityRepo, NewActivity,
};
use crate::app::build_app;
use crate::auth::{
    claims::Role,
    password::hash_password,
    repo::{CreateUserError, UserRepo},
    repo_types::{NewUser, ProfileChanges, User},
};
use crate::config::{AppConfig, GeneratorConfig, JwtConfig, StorageConfig};
use crate::images::{
    generator::{GeneratedImage, ImageGenerator},
    repo::{Image, ImageRepo, NewImage},
    services::generation_key,
};
use crate::state::{AppState, Backends};
use crate::storage::{join_public_url, StorageClient};

pub const TEST_COST: u32 = 4;
const PUBLIC_BASE: &str = "http://storage.test/public";

/// Newest first; rows created in the same instant keep reverse insertion order.
fn newest_first<T: Clone>(rows: &[T], created_at: impl Fn(&T) -> OffsetDateTime) -> Vec<T> {
    let mut out: Vec<T> = rows.iter().rev().cloned().collect();
    out.sort_by(|a, b| created_at(b).cmp(&created_at(a)));
    out
}

fn page<T>(rows: Vec<T>, limit: i64, offset: i64) -> Vec<T> {
    rows.into_iter()
        .skip(offset.max(0) as usize)
        .take(limit.max(0) as usize)
        .collect()
}

#[derive(Default)]
pub struct MemoryUsers {
    rows: Mutex<Vec<User>>,
}

impl MemoryUsers {
    pub fn set_role(&self, id: Uuid, role: Role) {
        let mut rows = self.rows.lock().unwrap();
        if let Some(u) = rows.iter_mut().find(|u| u.id == id) {
            u.role = role.as_str().to_string();
        }
    }

    pub fn backdate(&self, id: Uuid, created_at: OffsetDateTime) {
        let mut rows = self.rows.lock().unwrap();
        if let Some(u) = rows.iter_mut().find(|u| u.id == id) {
            u.created_at = created_at;
        }
    }

    fn matching(&self, search: Option<&str>) -> Vec<User> {
        let needle = search.map(|s| s.to_lowercase());
        let rows = self.rows.lock().unwrap();
        let hits: Vec<User> = rows
            .iter()
            .filter(|u| match &needle {
                Some(n) => {
                    u.full_name.to_lowercase().contains(n) || u.email.to_lowercase().contains(n)
                }
                None => true,
            })
            .cloned()
            .collect();
        newest_first(&hits, |u| u.created_at)
    }
}

#[async_trait]
impl UserRepo for MemoryUsers {
    async fn find_by_email(&self, email: &str) -> anyhow::Result<Option<User>> {
        let rows = self.rows.lock().unwrap();
        Ok(rows.iter().find(|u| u.email == email).cloned())
    }

    async fn find_by_id(&self, id: Uuid) -> anyhow::Result<Option<User>> {
        let rows = self.rows.lock().unwrap();
        Ok(rows.iter().find(|u| u.id == id).cloned())
    }

    async fn create(&self, new_user: NewUser) -> Result<User, CreateUserError> {
        let mut rows = self.rows.lock().unwrap();
        if rows.iter().any(|u| u.email == new_user.email) {
            return Err(CreateUserError::Duplicate);
        }
        let now = OffsetDateTime::now_utc();
        let user = User {
            id: Uuid::new_v4(),
            full_name: new_user.full_name,
            email: new_user.email,
            password_hash: new_user.password_hash,
            bio: None,
            avatar_url: None,
            role: Role::User.as_str().to_string(),
            created_at: now,
            updated_at: now,
        };
        rows.push(user.clone());
        Ok(user)
    }

    async fn update_profile(
        &self,
        id: Uuid,
        changes: ProfileChanges,
    ) -> anyhow::Result<Option<User>> {
        let mut rows = self.rows.lock().unwrap();
        let Some(u) = rows.iter_mut().find(|u| u.id == id) else {
            return Ok(None);
        };
        if let Some(name) = changes.full_name {
            u.full_name = name;
        }
        if let Some(bio) = changes.bio {
            u.bio = Some(bio);
        }
        if let Some(url) = changes.avatar_url {
            u.avatar_url = Some(url);
        }
        u.updated_at = OffsetDateTime::now_utc();
        Ok(Some(u.clone()))
    }

    async fn update_password(&self, id: Uuid, password_hash: &str) -> anyhow::Result<()> {
        let mut rows = self.rows.lock().unwrap();
        if let Some(u) = rows.iter_mut().find(|u| u.id == id) {
            u.password_hash = password_hash.to_string();
        }
        Ok(())
    }

    async fn list(
        &self,
        search: Option<&str>,
        limit: i64,
        offset: i64,
    ) -> anyhow::Result<Vec<User>> {
        Ok(page(self.matching(search), limit, offset))
    }

    async fn count(&self, search: Option<&str>) -> anyhow::Result<i64> {
        Ok(self.matching(search).len() as i64)
    }

    async fn count_created_since(&self, since: OffsetDateTime) -> anyhow::Result<i64> {
        let rows = self.rows.lock().unwrap();
        Ok(rows.iter().filter(|u| u.created_at >= since).count() as i64)
    }

    async fn delete(&self, id: Uuid) -> anyhow::Result<bool> {
        let mut rows = self.rows.lock().unwrap();
        let before = rows.len();
        rows.retain(|u| u.id != id);
        Ok(rows.len() < before)
    }
}

#[derive(Default)]
pub struct MemoryImages {
    rows: Mutex<Vec<Image>>,
}

impl MemoryImages {
    pub fn backdate(&self, id: Uuid, created_at: OffsetDateTime) {
        let mut rows = self.rows.lock().unwrap();
        if let Some(i) = rows.iter_mut().find(|i| i.id == id) {
            i.created_at = created_at;
        }
    }

    fn get(&self, id: Uuid) -> Option<Image> {
        self.rows.lock().unwrap().iter().find(|i| i.id == id).cloned()
    }
}

#[async_trait]
impl ImageRepo for MemoryImages {
    async fn insert(&self, image: NewImage) -> anyhow::Result<Image> {
        let row = Image {
            id: Uuid::new_v4(),
            user_id: image.user_id,
            prompt: image.prompt,
            image_url: image.image_url,
            storage_path: image.storage_path,
            created_at: OffsetDateTime::now_utc(),
        };
        self.rows.lock().unwrap().push(row.clone());
        Ok(row)
    }

    async fn list_by_user(&self, user_id: Uuid) -> anyhow::Result<Vec<Image>> {
        let rows = self.rows.lock().unwrap();
        let own: Vec<Image> = rows.iter().filter(|i| i.user_id == user_id).cloned().collect();
        Ok(newest_first(&own, |i| i.created_at))
    }

    async fn find_owned(&self, id: Uuid, user_id: Uuid) -> anyhow::Result<Option<Image>> {
        Ok(self.get(id).filter(|i| i.user_id == user_id))
    }

    async fn delete(&self, id: Uuid) -> anyhow::Result<bool> {
        let mut rows = self.rows.lock().unwrap();
        let before = rows.len();
        rows.retain(|i| i.id != id);
        Ok(rows.len() < before)
    }

    async fn delete_by_user(&self, user_id: Uuid) -> anyhow::Result<u64> {
        let mut rows = self.rows.lock().unwrap();
        let before = rows.len();
        rows.retain(|i| i.user_id != user_id);
        Ok((before - rows.len()) as u64)
    }

    async fn count(&self) -> anyhow::Result<i64> {
        Ok(self.rows.lock().unwrap().len() as i64)
    }

    async fn count_created_since(&self, since: OffsetDateTime) -> anyhow::Result<i64> {
        let rows = self.rows.lock().unwrap();
        Ok(rows.iter().filter(|i| i.created_at >= since).count() as i64)
    }
}

/// Append-only activity store. Joins against `images` when one is attached.
#[derive(Default)]
pub struct MemoryActivities {
    rows: Mutex<Vec<Activity>>,
    images: Option<Arc<MemoryImages>>,
    failing: AtomicBool,
}

impl MemoryActivities {
    pub fn with_images(images: Arc<MemoryImages>) -> Self {
        Self {
            images: Some(images),
            ..Default::default()
        }
    }

    /// Makes every call fail, as if the table were missing.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn snapshot(&self) -> Vec<Activity> {
        self.rows.lock().unwrap().clone()
    }


    fn check(&self) -> anyhow::Result<()> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(anyhow!("relation \"activities\" does not exist"));
        }
        Ok(())
    }

    fn matching(&self, user_id: Uuid, action: Option<ActivityAction>) -> Vec<Activity> {
        let rows = self.rows.lock().unwrap();
        let hits: Vec<Activity> = rows
            .iter()
            .filter(|a| a.user_id == user_id)
            .filter(|a| action.map_or(true, |act| a.action == act.as_str()))
            .cloned()
            .collect();
        newest_first(&hits, |a| a.created_at)
    }
}

#[async_trait]
impl ActivityRepo for MemoryActivities {
    async fn insert(&self, entry: NewActivity) -> anyhow::Result<Activity> {
        self.check()?;
        let row = Activity {
            id: Uuid::new_v4(),
            user_id: entry.user_id,
            action: entry.action.as_str().to_string(),
            image_id: entry.image_id,
            additional_data: entry.additional_data,
            created_at: OffsetDateTime::now_utc(),
        };
        self.rows.lock().unwrap().push(row.clone());
        Ok(row)
    }

    async fn list(
        &self,
        user_id: Uuid,
        action: Option<ActivityAction>,
        limit: i64,
        offset: i64,
    ) -> anyhow::Result<Vec<ActivityEntry>> {
        self.check()?;
        let rows = page(self.matching(user_id, action), limit, offset);
        Ok(rows
            .into_iter()
            .map(|activity| {
                let image = activity
                    .image_id
                    .and_then(|id| self.images.as_ref().and_then(|imgs| imgs.get(id)))
                    .map(|i| ActivityImage {
                        id: i.id,
                        prompt: i.prompt,
                        image_url: i.image_url,
                    });
                ActivityEntry { activity, image }
            })
            .collect())
    }

    async fn count(&self, user_id: Uuid, action: Option<ActivityAction>) -> anyhow::Result<i64> {
        self.check()?;
        Ok(self.matching(user_id, action).len() as i64)
    }
}

#[derive(Default)]
pub struct MemoryStorage {
    objects: Mutex<HashMap<(String, String), Bytes>>,
    pub fail_deletes: AtomicBool,
}

impl MemoryStorage {
    pub fn contains(&self, bucket: &str, key: &str) -> bool {
        self.objects
            .lock()
            .unwrap()
            .contains_key(&(bucket.to_string(), key.to_string()))
    }

    pub fn len(&self) -> usize {
        self.objects.lock().unwrap().len()
    }
}

#[async_trait]
impl StorageClient for MemoryStorage {
    async fn put_object(
        &self,
        bucket: &str,
        key: &str,
        body: Bytes,
        _content_type: &str,
    ) -> anyhow::Result<()> {
        let mut objects = self.objects.lock().unwrap();
        let slot = (bucket.to_string(), key.to_string());
        if objects.contains_key(&slot) {
            return Err(anyhow!("object {}/{} already exists", bucket, key));
        }
        objects.insert(slot, body);
        Ok(())
    }

    async fn delete_object(&self, bucket: &str, key: &str) -> anyhow::Result<()> {
        if self.fail_deletes.load(Ordering::SeqCst) {
            return Err(anyhow!("storage unavailable"));
        }
        self.objects
            .lock()
            .unwrap()
            .remove(&(bucket.to_string(), key.to_string()));
        Ok(())
    }

    fn public_url(&self, bucket: &str, key: &str) -> String {
        join_public_url(PUBLIC_BASE, bucket, key)
    }
}

/// Returns a tiny PNG for every prompt and remembers what it was asked.
#[derive(Default)]
pub struct StubGenerator {
    pub fail: AtomicBool,
    prompts: Mutex<Vec<String>>,
}

impl StubGenerator {
    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }
}

#[async_trait]
impl ImageGenerator for StubGenerator {
    async fn generate(&self, prompt: &str) -> anyhow::Result<GeneratedImage> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(anyhow!("generator offline"));
        }
        self.prompts.lock().unwrap().push(prompt.to_string());
        Ok(GeneratedImage {
            body: Bytes::from_static(&[0x89, b'P', b'N', b'G', 0x0d, 0x0a, 0x1a, 0x0a]),
            content_type: "image/png".to_string(),
        })
    }
}

pub fn bearer(token: &str) -> (HeaderName, HeaderValue) {
    (
        AUTHORIZATION,
        HeaderValue::from_str(&format!("Bearer {}", token)).unwrap(),
    )
}

pub fn test_config(admin_email: Option<&str>) -> AppConfig {
    AppConfig {
        database_url: "postgres://unused".into(),
        jwt: JwtConfig {
            secret: "test-secret".into(),
            issuer: "dreamcanvas".into(),
            audience: "dreamcanvas-users".into(),
            ttl_minutes: 60 * 24,
        },
        storage: StorageConfig {
            endpoint: "http://storage.test".into(),
            region: "us-east-1".into(),
            access_key: "test".into(),
            secret_key: "test".into(),
            public_url: PUBLIC_BASE.into(),
            images_bucket: "images".into(),
            avatars_bucket: "avatars".into(),
        },
        generator: GeneratorConfig {
            base_url: "http://generator.test".into(),
            timeout_secs: 5,
        },
        bcrypt_cost: TEST_COST,
        admin_email: admin_email.map(|e| e.to_string()),
        host: "127.0.0.1".into(),
        port: 0,
        max_body_bytes: 10 * 1024 * 1024,
    }
}

/// Full application state over in-memory backends, with handles kept for assertions.
pub struct TestContext {
    pub state: AppState,
    pub users: Arc<MemoryUsers>,
    pub images: Arc<MemoryImages>,
    pub activities: Arc<MemoryActivities>,
    pub storage: Arc<MemoryStorage>,
    pub generator: Arc<StubGenerator>,
}

impl TestContext {
    pub fn new() -> Self {
        Self::with_admin_email(None)
    }

    pub fn with_admin_email(admin_email: Option<&str>) -> Self {
        let users = Arc::new(MemoryUsers::default());
        let images = Arc::new(MemoryImages::default());
        let activities = Arc::new(MemoryActivities::with_images(images.clone()));
        let storage = Arc::new(MemoryStorage::default());
        let generator = Arc::new(StubGenerator::default());

        let state = AppState::from_parts(
            Arc::new(test_config(admin_email)),
            Backends {
                users: users.clone(),
                images: images.clone(),
                activities: activities.clone(),
                storage: storage.clone(),
                generator: generator.clone(),
            },
        );
        Self {
            state,
            users,
            images,
            activities,
            storage,
            generator,
        }
    }

    pub fn server(&self) -> TestServer {
        TestServer::new(build_app(self.state.clone())).unwrap()
    }

    pub async fn seed_user(&self, name: &str, email: &str, password: &str, role: Role) -> User {
        let user = self
            .users
            .create(NewUser {
                full_name: name.to_string(),
                email: email.to_string(),
                password_hash: hash_password(password, TEST_COST).unwrap(),
            })
            .await
            .unwrap();
        self.users.set_role(user.id, role);
        self.users.find_by_id(user.id).await.unwrap().unwrap()
    }

    /// Inserts an image row and puts its object in the images bucket.
    pub async fn seed_image(&self, user_id: Uuid, prompt: &str) -> Image {
        let key = generation_key(user_id, OffsetDateTime::now_utc(), "png");
        self.storage
            .put_object("images", &key, Bytes::from_static(b"png"), "image/png")
            .await
            .unwrap();
        self.images
            .insert(NewImage {
                user_id,
                prompt: prompt.to_string(),
                image_url: self.storage.public_url("images", &key),
                storage_path: key,
            })
            .await
            .unwrap()
    }

    pub fn token_for(&self, user: &User) -> String {
        self.state.jwt.sign(user.id, &user.email, user.role()).unwrap()
    }

    /// Waits for detached activity writes to land.
    pub async fn wait_for_activities(&self, n: usize) -> Vec<Activity> {
        for _ in 0..200 {
            let rows = self.activities.snapshot();
            if rows.len() >= n {
                return rows;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        self.activities.snapshot()
    }
}
