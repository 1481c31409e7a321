//! Test helpers: build an app over in-memory backends and hand-encode
//! multipart bodies.
//!
//! Run with: `cargo test -p estate-api --test photos_test`

#![allow(dead_code)]

use axum_test::TestServer;
use bytes::Bytes;
use estate_api::setup::routes;
use estate_api::AppState;
use estate_catalog::{MemoryPhotoCatalog, PhotoCatalog};
use estate_core::Config;
use estate_storage::{MemoryStorage, Storage};
use std::sync::Arc;

pub const BOUNDARY: &str = "----estate-test-7MA4YWxkTrZu0gW";

/// API path prefix for tests.
pub fn api_path(path: &str) -> String {
    format!("{}{}", estate_api::constants::API_PREFIX, path)
}

pub fn photos_path(entity_id: &str) -> String {
    api_path(&format!("/properties/{}/photos", entity_id))
}

/// Test application: server plus direct handles on both backends.
pub struct TestApp {
    pub server: TestServer,
    pub storage: MemoryStorage,
    pub catalog: MemoryPhotoCatalog,
}

impl TestApp {
    pub fn client(&self) -> &TestServer {
        &self.server
    }

    /// Store an object and list it in the catalog, as a previous sync would.
    pub async fn seed(&self, entity_id: &str, keys: &[&str]) {
        for key in keys {
            self.storage
                .put(key, Bytes::from_static(b"existing"), "image/jpeg")
                .await
                .expect("Failed to seed storage");
        }
        let keys: Vec<String> = keys.iter().map(|k| k.to_string()).collect();
        self.catalog
            .set_photo_keys(entity_id, &keys)
            .await
            .expect("Failed to seed catalog");
    }
}

pub fn create_test_config(extra: &[(&str, &str)]) -> Config {
    let mut vars: Vec<(String, String)> = vec![
        ("STORAGE_BACKEND".to_string(), "memory".to_string()),
        ("CATALOG_BACKEND".to_string(), "memory".to_string()),
        ("PHOTO_KEY_PREFIX".to_string(), "properties".to_string()),
        ("MAX_REQUEST_SIZE_MB".to_string(), "1".to_string()),
    ];
    for (key, value) in extra {
        vars.retain(|(k, _)| k != key);
        vars.push((key.to_string(), value.to_string()));
    }

    Config::from_lookup(|key| {
        vars.iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.clone())
    })
    .expect("Invalid test configuration")
}

pub fn setup_test_app() -> TestApp {
    setup_test_app_with(&[])
}

pub fn setup_test_app_with(extra: &[(&str, &str)]) -> TestApp {
    let config = create_test_config(extra);
    let storage = MemoryStorage::new();
    let catalog = MemoryPhotoCatalog::new();

    let state = Arc::new(AppState::new(
        &config,
        Arc::new(storage.clone()),
        Arc::new(catalog.clone()),
    ));
    let app = routes::setup_routes(&config, state).expect("Failed to build routes");
    let server = TestServer::new(app.into_make_service()).expect("Failed to create test server");

    TestApp {
        server,
        storage,
        catalog,
    }
}

/// Hand-built `multipart/form-data` body.
#[derive(Default)]
pub struct FormBody {
    body: Vec<u8>,
}

impl FormBody {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn content_type() -> String {
        format!("multipart/form-data; boundary={}", BOUNDARY)
    }

    pub fn field(mut self, name: &str, value: &str) -> Self {
        self.body.extend_from_slice(
            format!(
                "--{}\r\nContent-Disposition: form-data; name=\"{}\"\r\n\r\n{}\r\n",
                BOUNDARY, name, value
            )
            .as_bytes(),
        );
        self
    }

    pub fn file(mut self, name: &str, file_name: &str, content_type: &str, data: &[u8]) -> Self {
        self.body.extend_from_slice(
            format!(
                "--{}\r\nContent-Disposition: form-data; name=\"{}\"; filename=\"{}\"\r\nContent-Type: {}\r\n\r\n",
                BOUNDARY, name, file_name, content_type
            )
            .as_bytes(),
        );
        self.body.extend_from_slice(data);
        self.body.extend_from_slice(b"\r\n");
        self
    }

    pub fn build(mut self) -> Bytes {
        self.body
            .extend_from_slice(format!("--{}--\r\n", BOUNDARY).as_bytes());
        Bytes::from(self.body)
    }
}

/// A few bytes that start like a JPEG; content is never inspected.
pub fn jpeg_bytes() -> Vec<u8> {
    let mut data = vec![0xFF, 0xD8, 0xFF, 0xE0, 0x00, 0x10, b'J', b'F', b'I', b'F', 0x00];
    data.extend(std::iter::repeat(0x42).take(256));
    data.extend_from_slice(&[0xFF, 0xD9]);
    data
}
