//! End-to-end tests for the ingestion and answer pipelines.
//!
//! The model runtime and OCR engine are replaced with in-process fakes that
//! count their calls, so the tests can assert not only what ended up in the
//! index but also which collaborators were (not) consulted.

use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime};

use anyhow::{bail, Result};
use async_trait::async_trait;
use tempfile::TempDir;

use askdocs::answer::AnswerGenerator;
use askdocs::embedding::{ChatModel, Embedder};
use askdocs::error::QueryError;
use askdocs::extract::{Extractor, OcrEngine};
use askdocs::index::{InMemoryIndex, SqliteIndex, VectorIndex};
use askdocs::ingest::{DocumentFilter, IngestPipeline, IngestSettings};
use askdocs::models::IngestOutcome;
use askdocs::retrieve::Retriever;
use askdocs::state::StateStore;
use askdocs::watch::{process_events, run_until_stopped, WatchSettings};

// ─── Fakes ──────────────────────────────────────────────────────────

/// Letter-frequency embedding. Fails for any text containing `fail_marker`.
struct FakeEmbedder {
    calls: AtomicUsize,
    fail_marker: Option<String>,
}

impl FakeEmbedder {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicUsize::new(0),
            fail_marker: None,
        })
    }

    fn failing_on(marker: &str) -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicUsize::new(0),
            fail_marker: Some(marker.to_string()),
        })
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Embedder for FakeEmbedder {
    fn model_name(&self) -> &str {
        "fake-embed"
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(marker) = &self.fail_marker {
            if text.contains(marker.as_str()) {
                bail!("embedding service overloaded");
            }
        }
        let mut v = vec![0.0f32; 27];
        for c in text.chars() {
            match c.to_ascii_lowercase() {
                l @ 'a'..='z' => v[(l as u8 - b'a') as usize] += 1.0,
                _ => v[26] += 1.0,
            }
        }
        Ok(v)
    }
}

/// Records every prompt; replies with `reply` or fails when it is `None`.
struct FakeChat {
    reply: Option<String>,
    prompts: Mutex<Vec<String>>,
}

impl FakeChat {
    fn replying(reply: &str) -> Arc<Self> {
        Arc::new(Self {
            reply: Some(reply.to_string()),
            prompts: Mutex::new(Vec::new()),
        })
    }

    fn broken() -> Arc<Self> {
        Arc::new(Self {
            reply: None,
            prompts: Mutex::new(Vec::new()),
        })
    }
}

#[async_trait]
impl ChatModel for FakeChat {
    fn model_name(&self) -> &str {
        "fake-chat"
    }

    async fn chat(&self, prompt: &str) -> Result<String> {
        self.prompts.lock().unwrap().push(prompt.to_string());
        match &self.reply {
            Some(r) => Ok(r.clone()),
            None => bail!("model crashed"),
        }
    }
}

/// Raises a stop flag on its first embedding, as a Ctrl-C mid-document would.
struct InterruptingEmbedder {
    inner: Arc<FakeEmbedder>,
    stop: tokio::sync::watch::Sender<bool>,
}

#[async_trait]
impl Embedder for InterruptingEmbedder {
    fn model_name(&self) -> &str {
        "fake-embed"
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let _ = self.stop.send(true);
        self.inner.embed(text).await
    }
}

/// Counts calls; writes `rendition` as the OCR output, or fails without one.
struct CountingOcr {
    calls: AtomicUsize,
    rendition: Option<Vec<u8>>,
}

#[async_trait]
impl OcrEngine for CountingOcr {
    async fn recognize(&self, _input: &Path, output: &Path) -> Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match &self.rendition {
            Some(bytes) => Ok(fs::write(output, bytes)?),
            None => bail!("no OCR engine in tests"),
        }
    }
}

// ─── Helpers ────────────────────────────────────────────────────────

struct Harness {
    tmp: TempDir,
    docs: PathBuf,
    index: Arc<dyn VectorIndex>,
    embedder: Arc<FakeEmbedder>,
    ocr: Arc<CountingOcr>,
    pipeline: IngestPipeline,
}

fn settings() -> IngestSettings {
    IngestSettings {
        chunk_size: 800,
        chunk_overlap: 100,
        chunk_delay: Duration::ZERO,
    }
}

fn harness_with(index: Arc<dyn VectorIndex>, embedder: Arc<FakeEmbedder>, tmp: TempDir) -> Harness {
    let docs = tmp.path().join("docs");
    fs::create_dir_all(&docs).unwrap();
    let ocr = Arc::new(CountingOcr {
        calls: AtomicUsize::new(0),
        rendition: None,
    });
    let extractor =
        Extractor::new(Some(ocr.clone() as Arc<dyn OcrEngine>)).with_scratch_dir(tmp.path());
    let pipeline = IngestPipeline::new(
        index.clone(),
        embedder.clone(),
        extractor,
        StateStore::new(tmp.path().join("db").join("ingest_state.json")),
        settings(),
    );
    Harness {
        tmp,
        docs,
        index,
        embedder,
        ocr,
        pipeline,
    }
}

fn harness() -> Harness {
    harness_with(
        Arc::new(InMemoryIndex::new()),
        FakeEmbedder::new(),
        TempDir::new().unwrap(),
    )
}

fn write_doc(dir: &Path, name: &str, text: &str) -> PathBuf {
    let path = dir.join(name);
    fs::write(&path, text).unwrap();
    path
}

fn bump_mtime(path: &Path, secs: u64) {
    let current = fs::metadata(path).unwrap().modified().unwrap();
    fs::File::options()
        .write(true)
        .open(path)
        .unwrap()
        .set_modified(current + Duration::from_secs(secs))
        .unwrap();
}

fn prose(sentences: usize) -> String {
    (0..sentences)
        .map(|i| format!("Sentence {} describes the maintenance schedule of the boiler.", i))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Single-page PDF with `phrase` in its text layer.
fn text_pdf(phrase: &str) -> Vec<u8> {
    let content = format!("BT /F1 12 Tf 100 700 Td ({}) Tj ET", phrase);
    let objects = [
        "<< /Type /Catalog /Pages 2 0 R >>".to_string(),
        "<< /Type /Pages /Kids [3 0 R] /Count 1 >>".to_string(),
        "<< /Type /Page /Parent 2 0 R /MediaBox [0 0 612 792] /Contents 4 0 R /Resources << /Font << /F1 5 0 R >> >> >>".to_string(),
        format!("<< /Length {} >> stream\n{}\nendstream", content.len(), content),
        "<< /Type /Font /Subtype /Type1 /BaseFont /Helvetica >>".to_string(),
    ];

    let mut out = b"%PDF-1.4\n".to_vec();
    let mut offsets = Vec::new();
    for (i, body) in objects.iter().enumerate() {
        offsets.push(out.len());
        out.extend_from_slice(format!("{} 0 obj {} endobj\n", i + 1, body).as_bytes());
    }
    let xref = out.len();
    out.extend_from_slice(format!("xref\n0 {}\n", objects.len() + 1).as_bytes());
    out.extend_from_slice(b"0000000000 65535 f \n");
    for offset in offsets {
        out.extend_from_slice(format!("{:010} 00000 n \n", offset).as_bytes());
    }
    out.extend_from_slice(
        format!(
            "trailer << /Size {} /Root 1 0 R >>\nstartxref\n{}\n%%EOF\n",
            objects.len() + 1,
            xref
        )
        .as_bytes(),
    );
    out
}

fn mtime_secs(path: &Path) -> f64 {
    fs::metadata(path)
        .unwrap()
        .modified()
        .unwrap()
        .duration_since(SystemTime::UNIX_EPOCH)
        .unwrap()
        .as_secs_f64()
}

// ─── Ingestion ──────────────────────────────────────────────────────

#[tokio::test]
async fn nine_hundred_chars_become_two_chunks() {
    let h = harness();
    let path = write_doc(&h.docs, "doc.txt", &"A".repeat(900));

    let outcome = h.pipeline.ingest(&path).await.unwrap();
    let IngestOutcome::Ingested(report) = outcome else {
        panic!("expected ingest, got {:?}", outcome);
    };
    assert_eq!(report.chunks, 2);
    assert_eq!(report.added, 2);
    assert_eq!(report.failed, 0);

    assert_eq!(h.index.count().await.unwrap(), 2);
    let hits = h.index.query(&h.embedder.embed("A").await.unwrap(), 10).await.unwrap();
    let mut by_index: Vec<_> = hits.iter().map(|m| (m.metadata.chunk_index, m)).collect();
    by_index.sort_by_key(|(i, _)| *i);

    assert_eq!(by_index[0].1.id, "doc::chunk_0");
    assert_eq!(by_index[0].1.text.chars().count(), 800);
    assert_eq!(by_index[1].1.id, "doc::chunk_1");
    assert_eq!(by_index[1].1.text.chars().count(), 200);
    assert!(hits.iter().all(|m| m.metadata.filename == "doc.txt"));
    assert!(hits.iter().all(|m| m.metadata.timestamp > 0.0));
}

#[tokio::test]
async fn unchanged_document_is_a_no_op() {
    let h = harness();
    let path = write_doc(&h.docs, "manual.txt", &prose(40));

    h.pipeline.ingest(&path).await.unwrap();
    let count = h.index.count().await.unwrap();
    let calls = h.embedder.calls();
    let recorded = h.pipeline.state().last_ingested("manual.txt").unwrap();

    let outcome = h.pipeline.ingest(&path).await.unwrap();
    assert_eq!(outcome, IngestOutcome::UpToDate);
    assert_eq!(h.index.count().await.unwrap(), count);
    assert_eq!(h.embedder.calls(), calls);
    assert_eq!(h.pipeline.state().last_ingested("manual.txt").unwrap(), recorded);
    assert_eq!(recorded, Some(mtime_secs(&path)));
}

#[tokio::test]
async fn older_or_equal_timestamp_skips_extraction() {
    let h = harness();
    let path = write_doc(&h.docs, "scan.pdf", "not really a pdf");
    h.pipeline
        .state()
        .record("scan.pdf", mtime_secs(&path))
        .await
        .unwrap();

    let outcome = h.pipeline.ingest(&path).await.unwrap();
    assert_eq!(outcome, IngestOutcome::UpToDate);
    assert_eq!(h.ocr.calls.load(Ordering::SeqCst), 0);
    assert_eq!(h.embedder.calls(), 0);
}

#[tokio::test]
async fn touched_document_reuses_existing_chunks() {
    let h = harness();
    let path = write_doc(&h.docs, "manual.txt", &prose(40));

    h.pipeline.ingest(&path).await.unwrap();
    let count = h.index.count().await.unwrap();
    let calls = h.embedder.calls();

    bump_mtime(&path, 10);
    let outcome = h.pipeline.ingest(&path).await.unwrap();
    let IngestOutcome::Ingested(report) = outcome else {
        panic!("touched file should be reprocessed");
    };
    assert_eq!(report.added, 0);
    assert_eq!(report.existing, report.chunks);
    assert_eq!(h.embedder.calls(), calls);
    assert_eq!(h.index.count().await.unwrap(), count);
    assert_eq!(
        h.pipeline.state().last_ingested("manual.txt").unwrap(),
        Some(mtime_secs(&path))
    );
}

#[tokio::test]
async fn failed_chunk_is_skipped_and_document_marked_done() {
    let h = harness_with(
        Arc::new(InMemoryIndex::new()),
        FakeEmbedder::failing_on("ZZZ"),
        TempDir::new().unwrap(),
    );
    // Only the second window (chars 700..890) reaches the marker.
    let text = format!("{}{}", "a".repeat(800), "ZZZ".repeat(30));
    let path = write_doc(&h.docs, "partial.txt", &text);

    let IngestOutcome::Ingested(report) = h.pipeline.ingest(&path).await.unwrap() else {
        panic!("expected ingest");
    };
    assert_eq!(report.chunks, 2);
    assert_eq!(report.added, 1);
    assert_eq!(report.failed, 1);
    assert_eq!(h.index.count().await.unwrap(), 1);
    assert!(h.index.contains("partial::chunk_0").await.unwrap());

    // The failed chunk is not retried while the file is unchanged.
    assert_eq!(h.pipeline.ingest(&path).await.unwrap(), IngestOutcome::UpToDate);
    assert_eq!(h.index.count().await.unwrap(), 1);
}

#[tokio::test]
async fn unreadable_document_leaves_state_untouched() {
    let h = harness();
    let path = write_doc(&h.docs, "scan.pdf", "image-only scan without text layer");

    let outcome = h.pipeline.ingest(&path).await.unwrap();
    assert_eq!(outcome, IngestOutcome::Unreadable);
    assert_eq!(h.ocr.calls.load(Ordering::SeqCst), 1);
    assert_eq!(h.pipeline.state().last_ingested("scan.pdf").unwrap(), None);
    assert_eq!(h.index.count().await.unwrap(), 0);
    assert_eq!(h.embedder.calls(), 0);
}

#[tokio::test]
async fn scanned_pdf_is_indexed_through_ocr() {
    let tmp = TempDir::new().unwrap();
    let docs = tmp.path().join("docs");
    let scratch = tmp.path().join("scratch");
    fs::create_dir_all(&docs).unwrap();
    fs::create_dir_all(&scratch).unwrap();
    let path = write_doc(&docs, "scan.pdf", "image-only scan without text layer");

    let ocr = Arc::new(CountingOcr {
        calls: AtomicUsize::new(0),
        rendition: Some(text_pdf("The boiler is serviced every spring")),
    });
    let index: Arc<dyn VectorIndex> = Arc::new(InMemoryIndex::new());
    let pipeline = IngestPipeline::new(
        index.clone(),
        FakeEmbedder::new(),
        Extractor::new(Some(ocr.clone() as Arc<dyn OcrEngine>)).with_scratch_dir(&scratch),
        StateStore::new(tmp.path().join("db").join("ingest_state.json")),
        settings(),
    );

    let IngestOutcome::Ingested(report) = pipeline.ingest(&path).await.unwrap() else {
        panic!("scanned PDF should be ingested via OCR");
    };
    assert_eq!(report.added, 1);
    assert_eq!(ocr.calls.load(Ordering::SeqCst), 1);
    assert_eq!(fs::read_dir(&scratch).unwrap().count(), 0);

    let hits = index.query(&[1.0; 27], 10).await.unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].id, "scan::chunk_0");
    assert_eq!(hits[0].metadata.filename, "scan.pdf");
    assert!(hits[0].text.contains("The boiler is serviced every spring"));
    assert_eq!(
        pipeline.state().last_ingested("scan.pdf").unwrap(),
        Some(mtime_secs(&path))
    );
}

#[tokio::test]
async fn documents_sharing_a_stem_share_chunk_ids() {
    let h = harness();
    let txt = write_doc(&h.docs, "report.txt", &prose(5));
    let md = write_doc(&h.docs, "report.md", &prose(5));

    h.pipeline.ingest(&txt).await.unwrap();
    let calls = h.embedder.calls();

    let IngestOutcome::Ingested(report) = h.pipeline.ingest(&md).await.unwrap() else {
        panic!("expected ingest");
    };
    assert_eq!(report.added, 0);
    assert_eq!(report.existing, report.chunks);
    assert_eq!(h.embedder.calls(), calls);
    assert_eq!(h.index.filenames().await.unwrap(), vec!["report.txt"]);
}

#[tokio::test]
async fn missing_file_is_a_document_error() {
    let h = harness();
    let err = h
        .pipeline
        .ingest(&h.docs.join("never-existed.pdf"))
        .await
        .unwrap_err();
    assert!(!err.is_fatal());
}

#[tokio::test]
async fn concurrent_ingest_of_same_document_adds_no_duplicates() {
    let h = harness();
    let path = write_doc(&h.docs, "shared.txt", &prose(60));

    let (a, b) = tokio::join!(h.pipeline.ingest(&path), h.pipeline.ingest(&path));
    a.unwrap();
    b.unwrap();

    let expected = askdocs::chunk::chunk_text(&prose(60), 800, 100).len();
    assert_eq!(h.index.count().await.unwrap(), expected);
}

#[tokio::test]
async fn sqlite_index_and_state_survive_restart() {
    let tmp = TempDir::new().unwrap();
    let index_path = tmp.path().join("db").join("index.sqlite");

    let doc_path;
    let count;
    {
        let index = Arc::new(SqliteIndex::open(&index_path, "documents").await.unwrap());
        let h = harness_with(index.clone(), FakeEmbedder::new(), tmp);
        doc_path = write_doc(&h.docs, "manual.txt", &prose(40));
        h.pipeline.ingest(&doc_path).await.unwrap();
        count = h.index.count().await.unwrap();
        assert!(count > 0);
        index.close().await;

        let reopened = Arc::new(SqliteIndex::open(&index_path, "documents").await.unwrap());
        let embedder = FakeEmbedder::new();
        let again = harness_with(reopened, embedder.clone(), h.tmp);
        assert_eq!(
            again.pipeline.ingest(&doc_path).await.unwrap(),
            IngestOutcome::UpToDate
        );
        assert_eq!(again.index.count().await.unwrap(), count);
        assert_eq!(embedder.calls(), 0);
    }
}

// ─── Scan, prune, watch ─────────────────────────────────────────────

#[tokio::test]
async fn scan_ingests_matching_files_and_skips_the_rest() {
    let h = harness();
    write_doc(&h.docs, "b.txt", &prose(5));
    write_doc(&h.docs, "a.txt", &prose(5));
    write_doc(&h.docs, "ignored.md", &prose(5));
    write_doc(&h.docs, "empty.txt", "   ");

    let filter = DocumentFilter::new(&h.docs, &["*.txt".to_string()], false).unwrap();
    let summary = h.pipeline.scan(&filter).await.unwrap();
    assert_eq!(summary.seen, 3);
    assert_eq!(summary.ingested, 2);
    assert_eq!(summary.unreadable, 1);
    assert_eq!(summary.failed, 0);

    let again = h.pipeline.scan(&filter).await.unwrap();
    assert_eq!(again.up_to_date, 2);
    assert_eq!(again.chunks_added, 0);
}

#[tokio::test]
async fn prune_removes_chunks_of_deleted_files() {
    let h = harness();
    let keep = write_doc(&h.docs, "keep.txt", &prose(5));
    let gone = write_doc(&h.docs, "gone.txt", &prose(5));
    h.pipeline.ingest(&keep).await.unwrap();
    h.pipeline.ingest(&gone).await.unwrap();
    fs::remove_file(&gone).unwrap();

    let filter = DocumentFilter::new(&h.docs, &["*.txt".to_string()], false).unwrap();
    let summary = h.pipeline.prune(&filter).await.unwrap();
    assert_eq!(summary.documents_removed, 1);
    assert!(summary.chunks_removed >= 1);
    assert_eq!(summary.state_entries_removed, 1);

    assert_eq!(h.index.filenames().await.unwrap(), vec!["keep.txt"]);
    assert_eq!(h.pipeline.state().last_ingested("gone.txt").unwrap(), None);
    assert!(h.pipeline.state().last_ingested("keep.txt").unwrap().is_some());
}

#[tokio::test]
async fn watch_loop_ingests_matching_events_until_channel_closes() {
    let h = harness();
    let doc = write_doc(&h.docs, "new.txt", &prose(5));
    let other = write_doc(&h.docs, "photo.png", "binary");

    let filter = DocumentFilter::new(&h.docs, &["*.txt".to_string()], false).unwrap();
    let settings = WatchSettings {
        debounce: Duration::from_millis(10),
        settle_poll: Duration::from_millis(10),
        settle_timeout: Duration::from_secs(2),
    };

    let (tx, rx) = tokio::sync::mpsc::channel(8);
    tx.send(other).await.unwrap();
    tx.send(doc).await.unwrap();
    tx.send(h.docs.join("deleted.txt")).await.unwrap();
    drop(tx);

    process_events(&h.pipeline, &filter, &settings, rx, std::future::pending()).await;

    assert_eq!(h.index.filenames().await.unwrap(), vec!["new.txt"]);
}

#[tokio::test]
async fn shutdown_during_initial_scan_finishes_current_document_only() {
    let tmp = TempDir::new().unwrap();
    let docs = tmp.path().join("docs");
    fs::create_dir_all(&docs).unwrap();
    for name in ["a.txt", "b.txt", "c.txt"] {
        write_doc(&docs, name, &prose(40));
    }

    let (stop_tx, stop_rx) = tokio::sync::watch::channel(false);
    let index: Arc<dyn VectorIndex> = Arc::new(InMemoryIndex::new());
    let pipeline = IngestPipeline::new(
        index.clone(),
        Arc::new(InterruptingEmbedder {
            inner: FakeEmbedder::new(),
            stop: stop_tx,
        }),
        Extractor::new(None),
        StateStore::new(tmp.path().join("db").join("ingest_state.json")),
        settings(),
    );
    let filter = DocumentFilter::new(&docs, &["*.txt".to_string()], false).unwrap();
    let settings = WatchSettings {
        debounce: Duration::from_millis(10),
        settle_poll: Duration::from_millis(10),
        settle_timeout: Duration::from_secs(1),
    };
    let (_events_tx, events) = tokio::sync::mpsc::channel::<PathBuf>(8);

    let summary = tokio::time::timeout(
        Duration::from_secs(5),
        run_until_stopped(&pipeline, &filter, &settings, events, stop_rx),
    )
    .await
    .expect("scan should stop once the flag is raised")
    .unwrap();

    assert_eq!(summary.seen, 1);
    assert_eq!(summary.ingested, 1);
    assert_eq!(summary.remaining, 2);

    // The document in flight was completed, not cut short.
    let expected = askdocs::chunk::chunk_text(&prose(40), 800, 100).len();
    assert_eq!(index.count().await.unwrap(), expected);
    assert_eq!(index.filenames().await.unwrap(), vec!["a.txt"]);
    assert!(pipeline.state().last_ingested("a.txt").unwrap().is_some());
    assert_eq!(pipeline.state().last_ingested("b.txt").unwrap(), None);
    assert_eq!(pipeline.state().last_ingested("c.txt").unwrap(), None);
}

#[tokio::test]
async fn watch_loop_stops_on_shutdown() {
    let h = harness();
    let filter = DocumentFilter::new(&h.docs, &["*.txt".to_string()], false).unwrap();
    let settings = WatchSettings {
        debounce: Duration::from_millis(10),
        settle_poll: Duration::from_millis(10),
        settle_timeout: Duration::from_secs(1),
    };
    let (_tx, rx) = tokio::sync::mpsc::channel::<PathBuf>(8);

    tokio::time::timeout(
        Duration::from_secs(5),
        process_events(&h.pipeline, &filter, &settings, rx, async {}),
    )
    .await
    .expect("loop should exit once shutdown resolves");
}

// ─── Retrieval and answers ──────────────────────────────────────────

#[tokio::test]
async fn retrieval_only_returns_indexed_document() {
    let h = harness();
    let path = write_doc(&h.docs, "doc1.txt", &prose(80));
    h.pipeline.ingest(&path).await.unwrap();

    let retriever = Retriever::new(h.index.clone(), h.embedder.clone());
    let result = retriever.retrieve("unrelated topic", 4).await.unwrap();

    assert!(!result.is_empty());
    assert!(result.len() <= 4);
    assert!(result.metadatas().iter().all(|m| m.filename == "doc1.txt"));
    assert_eq!(result.texts().len(), result.metadatas().len());

    let scores: Vec<f32> = result.chunks().iter().map(|c| c.score).collect();
    assert!(scores.windows(2).all(|w| w[0] >= w[1]));
}

#[tokio::test]
async fn empty_index_retrieval_is_empty_not_error() {
    let embedder = FakeEmbedder::new();
    let retriever = Retriever::new(Arc::new(InMemoryIndex::new()), embedder.clone());

    let result = retriever.retrieve("anything", 4).await.unwrap();
    assert!(result.is_empty());
    assert!(result.texts().is_empty());
    assert!(result.metadatas().is_empty());
    assert_eq!(embedder.calls(), 0);
}

#[tokio::test]
async fn query_embedding_failure_is_reported() {
    let h = harness();
    let path = write_doc(&h.docs, "doc1.txt", &prose(5));
    h.pipeline.ingest(&path).await.unwrap();

    let retriever = Retriever::new(h.index.clone(), FakeEmbedder::failing_on("boom"));
    let err = retriever.retrieve("boom?", 4).await.unwrap_err();
    assert!(matches!(err, QueryError::Embedding(_)));
}

#[tokio::test]
async fn answer_is_grounded_in_retrieved_context() {
    let h = harness();
    let path = write_doc(&h.docs, "doc1.txt", &prose(10));
    h.pipeline.ingest(&path).await.unwrap();

    let chat = FakeChat::replying("  Every spring.  \n");
    let generator = AnswerGenerator::new(
        Retriever::new(h.index.clone(), h.embedder.clone()),
        chat.clone(),
        4,
        4000,
    );

    let answer = generator.answer("When is the boiler serviced?").await.unwrap();
    assert_eq!(answer.text, "Every spring.");
    assert!(!answer.sources.is_empty());

    let prompts = chat.prompts.lock().unwrap();
    assert_eq!(prompts.len(), 1);
    assert!(prompts[0].starts_with("You are a helpful assistant."));
    assert!(prompts[0].contains("maintenance schedule of the boiler"));
    assert!(prompts[0].ends_with("Question: When is the boiler serviced?\nAnswer:"));
}

#[tokio::test]
async fn answer_without_context_is_no_context() {
    let chat = FakeChat::replying("should not be called");
    let generator = AnswerGenerator::new(
        Retriever::new(Arc::new(InMemoryIndex::new()), FakeEmbedder::new()),
        chat.clone(),
        4,
        4000,
    );

    let err = generator.answer("anything?").await.unwrap_err();
    assert!(matches!(err, QueryError::NoContext));
    assert!(chat.prompts.lock().unwrap().is_empty());
}

#[tokio::test]
async fn oversized_chunks_mean_no_context() {
    let h = harness();
    let path = write_doc(&h.docs, "doc1.txt", &prose(10));
    h.pipeline.ingest(&path).await.unwrap();

    let generator = AnswerGenerator::new(
        Retriever::new(h.index.clone(), h.embedder.clone()),
        FakeChat::replying("unused"),
        4,
        10,
    );
    assert!(matches!(
        generator.answer("boiler?").await,
        Err(QueryError::NoContext)
    ));
}

#[tokio::test]
async fn chat_failure_is_a_generation_error() {
    let h = harness();
    let path = write_doc(&h.docs, "doc1.txt", &prose(10));
    h.pipeline.ingest(&path).await.unwrap();

    let generator = AnswerGenerator::new(
        Retriever::new(h.index.clone(), h.embedder.clone()),
        FakeChat::broken(),
        4,
        4000,
    );
    let err = generator.answer("boiler?").await.unwrap_err();
    assert!(matches!(err, QueryError::Generation(_)));
    assert!(!err.is_fatal());
}

#[tokio::test]
async fn sources_come_from_every_ingested_document() {
    let h = harness();
    for name in ["one.txt", "two.txt"] {
        let path = write_doc(&h.docs, name, &prose(3));
        h.pipeline.ingest(&path).await.unwrap();
    }

    let retriever = Retriever::new(h.index.clone(), h.embedder.clone());
    let result = retriever.retrieve("boiler", 10).await.unwrap();
    let files: BTreeSet<&str> = result
        .metadatas()
        .iter()
        .map(|m| m.filename.as_str())
        .collect();
    assert_eq!(files, BTreeSet::from(["one.txt", "two.txt"]));
}
