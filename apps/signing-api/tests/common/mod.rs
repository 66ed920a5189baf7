//! Shared fixtures for signing-api integration tests

#![allow(dead_code)]

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use base64::{engine::general_purpose::STANDARD, Engine};
use chrono::Utc;
use lopdf::{dictionary, Document, Object, ObjectId, Stream};
use signing_api::models::DocumentStatus;
use signing_api::{db, AppState, Config, SignatureRecordCoordinator, StorageMode};
use sqlx::SqlitePool;
use tempfile::TempDir;

pub const WORKER: &str = "worker-1";
pub const WORKER_NAME: &str = "Ana Lima";
pub const ADMIN: &str = "admin-1";

/// A migrated database and artifact root in a scratch directory
pub struct Harness {
    _dir: TempDir,
    pub root: PathBuf,
    pub pool: SqlitePool,
    pub state: Arc<AppState>,
}

impl Harness {
    pub async fn new(mode: StorageMode) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("docs");
        std::fs::create_dir_all(&root).unwrap();

        let database_url = format!("sqlite:{}", dir.path().join("signing.db").display());
        let pool = db::connect(&database_url, 5).await.unwrap();

        let config = Config {
            database_url,
            max_connections: 5,
            storage_mode: mode,
            artifact_root: root.clone(),
            strategy_timeout: Some(Duration::from_secs(15)),
            port: 0,
        };
        let state = Arc::new(AppState::from_pool(config, pool.clone()));

        sqlx::query("INSERT INTO workers (id, display_name) VALUES (?, ?)")
            .bind(WORKER)
            .bind(WORKER_NAME)
            .execute(&pool)
            .await
            .unwrap();

        Self {
            _dir: dir,
            root,
            pool,
            state,
        }
    }

    pub fn coordinator(&self) -> &SignatureRecordCoordinator {
        &self.state.coordinator
    }

    /// Store an original through the active backend and return its locator
    pub async fn store_original(&self, bytes: &[u8]) -> String {
        self.state
            .artifacts
            .save("original.pdf", bytes)
            .await
            .unwrap()
            .locator
    }

    pub async fn seed_document(&self, id: &str, title: &str, original_ref: &str) {
        self.seed_document_with_status(id, title, original_ref, DocumentStatus::Pending)
            .await;
    }

    pub async fn seed_document_with_status(
        &self,
        id: &str,
        title: &str,
        original_ref: &str,
        status: DocumentStatus,
    ) {
        let now = Utc::now().to_rfc3339();
        sqlx::query(
            r#"
            INSERT INTO documents (id, title, description, original_artifact_ref, status,
                                   owner_admin_id, assigned_worker_id, created_at, updated_at)
            VALUES (?, ?, NULL, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(id)
        .bind(title)
        .bind(original_ref)
        .bind(status.as_str())
        .bind(ADMIN)
        .bind(WORKER)
        .bind(&now)
        .bind(&now)
        .execute(&self.pool)
        .await
        .unwrap();
    }

    pub async fn status(&self, id: &str) -> DocumentStatus {
        self.state
            .records
            .document_status(id)
            .await
            .unwrap()
            .unwrap()
    }

    pub async fn count(&self, table: &str) -> i64 {
        let (n,): (i64,) = sqlx::query_as(&format!("SELECT COUNT(*) FROM {}", table))
            .fetch_one(&self.pool)
            .await
            .unwrap();
        n
    }

    /// Signed outputs on disk, not counting originals stored by [`store_original`](Self::store_original)
    pub fn signed_files(&self) -> usize {
        std::fs::read_dir(self.root.join("uploads/signed"))
            .map(|entries| {
                entries
                    .filter_map(Result::ok)
                    .filter(|e| !e.file_name().to_string_lossy().ends_with("-original.pdf"))
                    .count()
            })
            .unwrap_or(0)
    }
}

/// Letter-size PDF with `pages` pages of text
pub fn pdf_with_pages(pages: usize) -> Vec<u8> {
    let mut doc = Document::with_version("1.7");
    let pages_id = doc.new_object_id();
    let font_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Helvetica",
    });
    let mut kids = Vec::new();
    for n in 0..pages {
        let content = format!("BT /F1 12 Tf 72 720 Td (Clause {}) Tj ET", n + 1);
        let content_id = doc.add_object(Stream::new(dictionary! {}, content.into_bytes()));
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Contents" => content_id,
            "Resources" => dictionary! {
                "Font" => dictionary! { "F1" => font_id },
            },
        });
        kids.push(Object::Reference(page_id));
    }
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => pages as i64,
            "MediaBox" => vec![0.into(), 0.into(), 612.into(), 792.into()],
        }),
    );
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);
    to_bytes(doc)
}

/// Well-formed file whose Encrypt dictionary names an unknown security handler
pub fn encrypted_pdf() -> Vec<u8> {
    let bytes = pdf_with_pages(1);
    let mut doc = Document::load_mem(&bytes).unwrap();
    let encrypt_id = doc.add_object(dictionary! {
        "Filter" => "AcmeVault",
        "V" => 7,
        "R" => 9,
    });
    doc.trailer.set("Encrypt", encrypt_id);
    doc.trailer.set(
        "ID",
        vec![
            Object::String(b"0123456789abcdef".to_vec(), lopdf::StringFormat::Hexadecimal),
            Object::String(b"0123456789abcdef".to_vec(), lopdf::StringFormat::Hexadecimal),
        ],
    );
    to_bytes(doc)
}

/// Standard-handler RC4 (R2, 40-bit) file that opens with the empty user password
pub fn openable_encrypted_pdf() -> Vec<u8> {
    let bytes = pdf_with_pages(1);
    let mut doc = Document::load_mem(&bytes).unwrap();
    let encrypt_id = doc.add_object(dictionary! {
        "Filter" => "Standard",
        "V" => 1,
        "R" => 2,
        "Length" => 40,
        "O" => Object::String(vec![0x4f; 32], lopdf::StringFormat::Hexadecimal),
        "P" => -4,
    });
    doc.trailer.set("Encrypt", encrypt_id);
    doc.trailer.set(
        "ID",
        vec![
            Object::String(b"fedcba9876543210".to_vec(), lopdf::StringFormat::Hexadecimal),
            Object::String(b"fedcba9876543210".to_vec(), lopdf::StringFormat::Hexadecimal),
        ],
    );

    let key = lopdf::encryption::get_encryption_key(&doc, "", false).unwrap();
    let ids: Vec<ObjectId> = doc.objects.keys().copied().filter(|id| *id != encrypt_id).collect();
    for id in ids {
        // RC4 is symmetric
        let Ok(sealed) = lopdf::encryption::decrypt_object(&key, id, doc.get_object(id).unwrap()) else {
            continue;
        };
        match doc.get_object_mut(id).unwrap() {
            Object::Stream(stream) => stream.set_content(sealed),
            Object::String(content, _) => *content = sealed,
            _ => {}
        }
    }
    to_bytes(doc)
}

fn to_bytes(mut doc: Document) -> Vec<u8> {
    let mut buffer = Vec::new();
    doc.save_to(&mut buffer).unwrap();
    buffer
}

/// 1x1 opaque PNG as a data URI
pub fn png_data_uri() -> String {
    let mut out = Vec::new();
    {
        let mut encoder = png::Encoder::new(&mut out, 1, 1);
        encoder.set_color(png::ColorType::Rgb);
        encoder.set_depth(png::BitDepth::Eight);
        let mut writer = encoder.write_header().unwrap();
        writer.write_image_data(&[0x10, 0x20, 0x30]).unwrap();
        writer.finish().unwrap();
    }
    format!("data:image/png;base64,{}", STANDARD.encode(out))
}

/// Content of every page as lossy UTF-8, for substring checks
pub fn page_text(bytes: &[u8]) -> String {
    String::from_utf8_lossy(&decompressed_content(bytes)).into_owned()
}

/// Concatenated, decompressed content of every page
pub fn decompressed_content(bytes: &[u8]) -> Vec<u8> {
    let doc = Document::load_mem(bytes).unwrap();
    let mut out = Vec::new();
    for (_, page_id) in doc.get_pages() {
        out.extend(doc.get_page_content(page_id).unwrap());
        out.push(b'\n');
    }
    out
}
