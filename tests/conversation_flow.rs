//! End-to-end conversation flows against a mock transport and
//! converter: document → name → roll number → delivered PDF, plus the
//! rejection, cancellation, and failure paths, each asserting that no
//! transient artifact survives the session.

#![allow(clippy::unwrap_used)]

use async_trait::async_trait;
use footer_bot::bot::resilient::RetryingMessenger;
use footer_bot::bot::transport::Transport;
use footer_bot::cleanup::CleanupManager;
use footer_bot::conversation::{messages, ConversationMachine};
use footer_bot::error::{ConvertError, TransportError};
use footer_bot::pipeline::convert::Converter;
use footer_bot::pipeline::DocumentPipeline;
use footer_bot::session::{SessionState, SessionStore};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use zip::write::SimpleFileOptions;
use zip::ZipWriter;

const USER: i64 = 7;
const CHAT: i64 = 70;

#[derive(Debug, Clone, PartialEq)]
enum Sent {
    Text(String),
    Document { display_name: String },
}

/// Records outbound traffic; optionally refuses document delivery.
#[derive(Default)]
struct RecordingTransport {
    sent: Mutex<Vec<Sent>>,
    fail_documents: bool,
}

impl RecordingTransport {
    async fn texts(&self) -> Vec<String> {
        self.sent
            .lock()
            .await
            .iter()
            .filter_map(|s| match s {
                Sent::Text(text) => Some(text.clone()),
                Sent::Document { .. } => None,
            })
            .collect()
    }

    async fn last_text(&self) -> String {
        self.texts().await.last().cloned().unwrap_or_default()
    }

    async fn documents(&self) -> Vec<String> {
        self.sent
            .lock()
            .await
            .iter()
            .filter_map(|s| match s {
                Sent::Document { display_name } => Some(display_name.clone()),
                Sent::Text(_) => None,
            })
            .collect()
    }

    async fn sent_count(&self) -> usize {
        self.sent.lock().await.len()
    }
}

#[async_trait]
impl Transport for RecordingTransport {
    async fn send_text(&self, _chat_id: i64, text: &str) -> Result<(), TransportError> {
        self.sent.lock().await.push(Sent::Text(text.to_string()));
        Ok(())
    }

    async fn send_document(
        &self,
        _chat_id: i64,
        path: &Path,
        display_name: &str,
    ) -> Result<(), TransportError> {
        if self.fail_documents {
            return Err(TransportError::Transient("connection reset".into()));
        }
        // The artifact must still exist at delivery time
        assert!(path.exists(), "document missing at delivery: {path:?}");
        self.sent.lock().await.push(Sent::Document {
            display_name: display_name.to_string(),
        });
        Ok(())
    }
}

/// Converts by copying the input with the target extension.
struct CopyConverter;

#[async_trait]
impl Converter for CopyConverter {
    async fn convert(&self, input: &Path, outdir: &Path) -> Result<PathBuf, ConvertError> {
        let stem = input.file_stem().unwrap().to_string_lossy().into_owned();
        let output = outdir.join(format!("{stem}.pdf"));
        tokio::fs::copy(input, &output).await?;
        Ok(output)
    }
}

/// Always fails, as a crashed LibreOffice would.
struct FailingConverter;

#[async_trait]
impl Converter for FailingConverter {
    async fn convert(&self, _input: &Path, outdir: &Path) -> Result<PathBuf, ConvertError> {
        Err(ConvertError::MissingOutput(outdir.join("never.pdf")))
    }
}

/// Sleeps before converting, to hold a session in `Processing`.
struct SlowConverter(Duration);

#[async_trait]
impl Converter for SlowConverter {
    async fn convert(&self, input: &Path, outdir: &Path) -> Result<PathBuf, ConvertError> {
        tokio::time::sleep(self.0).await;
        CopyConverter.convert(input, outdir).await
    }
}

/// Writes a partial output file and then fails, like a converter
/// killed on timeout.
struct PartialOutputConverter;

#[async_trait]
impl Converter for PartialOutputConverter {
    async fn convert(&self, input: &Path, outdir: &Path) -> Result<PathBuf, ConvertError> {
        let stem = input.file_stem().unwrap().to_string_lossy().into_owned();
        tokio::fs::write(outdir.join(format!("{stem}.pdf")), b"partial").await?;
        Err(ConvertError::Timeout(Duration::from_millis(1)))
    }
}

fn machine_with<C: Converter>(
    converter: C,
    transport: Arc<RecordingTransport>,
    work_dir: &Path,
) -> (
    ConversationMachine<RecordingTransport, C>,
    Arc<SessionStore>,
) {
    let store = Arc::new(SessionStore::new());
    let cleanup = Arc::new(CleanupManager::new(store.clone(), work_dir.to_path_buf()));
    let messenger = RetryingMessenger::with_policy(transport, 3, Duration::from_millis(1));
    let pipeline = DocumentPipeline::new(Arc::new(converter), work_dir.to_path_buf());
    let engine = ConversationMachine::new(
        store.clone(),
        messenger,
        pipeline,
        cleanup,
        work_dir.to_path_buf(),
    );
    (engine, store)
}

fn minimal_docx() -> Vec<u8> {
    let types = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?><Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types"><Default Extension="xml" ContentType="application/xml"/><Override PartName="/word/document.xml" ContentType="application/vnd.openxmlformats-officedocument.wordprocessingml.document.main+xml"/></Types>"#;
    let rels = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?><Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships"><Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/styles" Target="styles.xml"/></Relationships>"#;
    let document = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?><w:document xmlns:w="http://schemas.openxmlformats.org/wordprocessingml/2006/main" xmlns:r="http://schemas.openxmlformats.org/officeDocument/2006/relationships"><w:body><w:p><w:r><w:t>Report body</w:t></w:r></w:p><w:sectPr><w:pgSz w:w="11906" w:h="16838"/><w:pgMar w:top="1440" w:bottom="1440" w:footer="708"/></w:sectPr></w:body></w:document>"#;

    let mut buf = std::io::Cursor::new(Vec::new());
    let mut zip = ZipWriter::new(&mut buf);
    let options = SimpleFileOptions::default();
    for (name, content) in [
        ("[Content_Types].xml", types),
        ("word/_rels/document.xml.rels", rels),
        ("word/document.xml", document),
    ] {
        zip.start_file(name, options).unwrap();
        zip.write_all(content.as_bytes()).unwrap();
    }
    zip.finish().unwrap();
    buf.into_inner()
}

fn files_in(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = std::fs::read_dir(dir)
        .unwrap()
        .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    names
}

#[tokio::test]
async fn test_end_to_end_docx_to_pdf() {
    let dir = tempfile::tempdir().unwrap();
    let transport = Arc::new(RecordingTransport::default());
    let (engine, store) = machine_with(CopyConverter, transport.clone(), dir.path());

    engine
        .on_document(USER, CHAT, "alice_tg", "report.docx", minimal_docx())
        .await;
    assert_eq!(transport.last_text().await, messages::PROMPT_NAME);
    assert!(files_in(dir.path()).contains(&"alice_tg_report.docx".to_string()));

    engine.on_text(USER, CHAT, "Alice").await;
    assert_eq!(transport.last_text().await, messages::PROMPT_ROLL);

    engine.on_text(USER, CHAT, "42").await;
    assert_eq!(transport.documents().await, vec!["Alice_42.pdf".to_string()]);
    assert_eq!(
        transport.last_text().await,
        "✅ Document processed successfully!"
    );

    assert!(store.is_empty().await);
    assert!(files_in(dir.path()).is_empty(), "no artifacts may survive");
}

#[tokio::test]
async fn test_unsupported_extension_rejected_without_session() {
    let dir = tempfile::tempdir().unwrap();
    let transport = Arc::new(RecordingTransport::default());
    let (engine, store) = machine_with(CopyConverter, transport.clone(), dir.path());

    engine
        .on_document(USER, CHAT, "alice_tg", "notes.txt", b"plain text".to_vec())
        .await;

    assert_eq!(transport.last_text().await, messages::UNSUPPORTED);
    assert!(store.is_empty().await);
    assert!(files_in(dir.path()).is_empty());
}

#[tokio::test]
async fn test_start_shows_usage() {
    let dir = tempfile::tempdir().unwrap();
    let transport = Arc::new(RecordingTransport::default());
    let (engine, _store) = machine_with(CopyConverter, transport.clone(), dir.path());

    engine.on_start(CHAT).await;
    assert_eq!(transport.last_text().await, messages::WELCOME);
}

#[tokio::test]
async fn test_empty_inputs_reprompt_without_transition() {
    let dir = tempfile::tempdir().unwrap();
    let transport = Arc::new(RecordingTransport::default());
    let (engine, _store) = machine_with(CopyConverter, transport.clone(), dir.path());

    engine
        .on_document(USER, CHAT, "u", "report.docx", minimal_docx())
        .await;

    engine.on_text(USER, CHAT, "   ").await;
    assert_eq!(transport.last_text().await, messages::REPROMPT_NAME);

    // Still awaiting the name, so a valid one advances the flow
    engine.on_text(USER, CHAT, "Bob").await;
    assert_eq!(transport.last_text().await, messages::PROMPT_ROLL);

    engine.on_text(USER, CHAT, "").await;
    assert_eq!(transport.last_text().await, messages::REPROMPT_ROLL);
}

#[tokio::test]
async fn test_text_without_session_is_ignored() {
    let dir = tempfile::tempdir().unwrap();
    let transport = Arc::new(RecordingTransport::default());
    let (engine, _store) = machine_with(CopyConverter, transport.clone(), dir.path());

    engine.on_text(USER, CHAT, "Alice").await;
    assert_eq!(transport.sent_count().await, 0);
}

#[tokio::test]
async fn test_cancel_mid_flow_deletes_source_and_closes_session() {
    let dir = tempfile::tempdir().unwrap();
    let transport = Arc::new(RecordingTransport::default());
    let (engine, store) = machine_with(CopyConverter, transport.clone(), dir.path());

    engine
        .on_document(USER, CHAT, "u", "report.docx", minimal_docx())
        .await;
    engine.on_cancel(USER, CHAT).await;

    assert_eq!(transport.last_text().await, messages::CANCELLED);
    assert!(store.is_empty().await);
    assert!(files_in(dir.path()).is_empty());

    // Later text must not be treated as a name
    let before = transport.sent_count().await;
    engine.on_text(USER, CHAT, "Alice").await;
    assert_eq!(transport.sent_count().await, before);
}

#[tokio::test]
async fn test_conversion_failure_reports_generic_message_and_cleans_up() {
    let dir = tempfile::tempdir().unwrap();
    let transport = Arc::new(RecordingTransport::default());
    let (engine, store) = machine_with(FailingConverter, transport.clone(), dir.path());

    engine
        .on_document(USER, CHAT, "u", "report.docx", minimal_docx())
        .await;
    engine.on_text(USER, CHAT, "Alice").await;
    engine.on_text(USER, CHAT, "42").await;

    assert!(transport.documents().await.is_empty());
    assert_eq!(
        transport.last_text().await,
        "❌ An error occurred while processing your document. Please try again."
    );
    assert!(store.is_empty().await);
    assert!(files_in(dir.path()).is_empty());
}

#[tokio::test]
async fn test_delivery_failure_is_reported_and_still_cleaned_up() {
    let dir = tempfile::tempdir().unwrap();
    let transport = Arc::new(RecordingTransport {
        fail_documents: true,
        ..RecordingTransport::default()
    });
    let (engine, store) = machine_with(CopyConverter, transport.clone(), dir.path());

    engine
        .on_document(USER, CHAT, "u", "report.docx", minimal_docx())
        .await;
    engine.on_text(USER, CHAT, "Alice").await;
    engine.on_text(USER, CHAT, "42").await;

    assert_eq!(
        transport.last_text().await,
        "⚠️ The converted document could not be delivered. Please send it again."
    );
    assert!(store.is_empty().await);
    assert!(files_in(dir.path()).is_empty());
}

#[tokio::test]
async fn test_partial_converter_output_is_released_on_failure() {
    let dir = tempfile::tempdir().unwrap();
    let transport = Arc::new(RecordingTransport::default());
    let (engine, store) = machine_with(PartialOutputConverter, transport.clone(), dir.path());

    engine
        .on_document(USER, CHAT, "u", "report.docx", minimal_docx())
        .await;
    engine.on_text(USER, CHAT, "Alice").await;
    engine.on_text(USER, CHAT, "42").await;

    assert!(transport.documents().await.is_empty());
    assert_eq!(
        transport.last_text().await,
        "❌ An error occurred while processing your document. Please try again."
    );
    assert!(store.is_empty().await);
    // The half-written Alice_42.pdf must not survive the session
    assert!(files_in(dir.path()).is_empty());
}

#[tokio::test]
async fn test_cancel_and_resubmit_during_processing_keeps_replacement() {
    let dir = tempfile::tempdir().unwrap();
    let transport = Arc::new(RecordingTransport::default());
    let (engine, store) = machine_with(
        SlowConverter(Duration::from_millis(300)),
        transport.clone(),
        dir.path(),
    );
    let engine = Arc::new(engine);

    engine
        .on_document(USER, CHAT, "u", "first.docx", minimal_docx())
        .await;
    engine.on_text(USER, CHAT, "Alice").await;
    let pipeline = tokio::spawn({
        let engine = engine.clone();
        async move { engine.on_text(USER, CHAT, "42").await }
    });

    // Cancel and start over while the first pipeline is still converting
    tokio::time::sleep(Duration::from_millis(100)).await;
    engine.on_cancel(USER, CHAT).await;
    engine
        .on_document(USER, CHAT, "u", "second.docx", minimal_docx())
        .await;
    pipeline.await.unwrap();

    // The old pipeline's teardown must not remove the new session
    assert!(store.get(USER).await.is_some());
    assert!(files_in(dir.path()).contains(&"u_second.docx".to_string()));

    // And the replacement conversation still runs to completion
    engine.on_text(USER, CHAT, "Bob").await;
    engine.on_text(USER, CHAT, "7").await;
    assert!(transport
        .documents()
        .await
        .contains(&"Bob_7.pdf".to_string()));
    assert!(store.is_empty().await);
    assert!(files_in(dir.path()).is_empty());
}

#[tokio::test]
async fn test_reap_releases_abandoned_sessions_but_skips_processing() {
    let dir = tempfile::tempdir().unwrap();
    let transport = Arc::new(RecordingTransport::default());
    let (engine, store) = machine_with(CopyConverter, transport.clone(), dir.path());

    engine
        .on_document(USER, CHAT, "u", "report.docx", minimal_docx())
        .await;
    engine
        .on_document(8, 80, "v", "other.docx", minimal_docx())
        .await;
    store.get(8).await.unwrap().lock().await.state = SessionState::Processing;

    engine.reap_stale(Duration::ZERO).await;

    assert!(store.get(USER).await.is_none());
    assert!(store.get(8).await.is_some());
    assert_eq!(files_in(dir.path()), vec!["v_other.docx".to_string()]);
}

#[tokio::test]
async fn test_resubmission_replaces_pending_session() {
    let dir = tempfile::tempdir().unwrap();
    let transport = Arc::new(RecordingTransport::default());
    let (engine, store) = machine_with(CopyConverter, transport.clone(), dir.path());

    engine
        .on_document(USER, CHAT, "u", "first.docx", minimal_docx())
        .await;
    engine
        .on_document(USER, CHAT, "u", "second.docx", minimal_docx())
        .await;

    let files = files_in(dir.path());
    assert_eq!(files, vec!["u_second.docx".to_string()]);
    assert_eq!(store.len().await, 1);

    // The replacement conversation runs to completion
    engine.on_text(USER, CHAT, "Alice").await;
    engine.on_text(USER, CHAT, "42").await;
    assert_eq!(transport.documents().await, vec!["Alice_42.pdf".to_string()]);
    assert!(files_in(dir.path()).is_empty());
}
