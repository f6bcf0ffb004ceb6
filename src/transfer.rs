//! Import and export of parameter records as flat text files.
//!
//! Export file layout, one line each:
//!
//! ```text
//! # cryptnos-export v1 2026-10-16T12:00:00+00:00
//! <blob>
//! <blob>
//! # end 2
//! ```
//!
//! Every blob is self-contained (see [`crate::codec`]). Header and trailer
//! are optional on import and blank lines are ignored. Any other line,
//! including one starting with `#`, is a record and counts as a failure
//! when it does not decode.

use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::sync::mpsc;
use std::thread::{self, JoinHandle};

use chrono::Local;

use crate::codec::RecordCipher;
use crate::config::Settings;
use crate::crypto;
use crate::error::{CryptnosError, Result};
use crate::params::SiteParameters;
use crate::progress::{CancelFlag, Progress, Reporter, TransferState};
use crate::storage::Storage;
use crate::store::{ParamStore, SharedStore};

pub const EXPORT_VERSION: u32 = 1;
const HEADER_PREFIX: &str = "# cryptnos-export";
const TRAILER_PREFIX: &str = "# end";

/// Tracks and announces the state of one transfer run.
#[derive(Debug)]
struct Run<'a> {
    state: TransferState,
    reporter: &'a Reporter,
}

impl<'a> Run<'a> {
    fn start(reporter: &'a Reporter) -> Self {
        reporter.send(Progress::State(TransferState::Idle));
        Self {
            state: TransferState::Idle,
            reporter,
        }
    }

    fn enter(&mut self, next: TransferState) {
        debug_assert!(
            self.state.can_advance_to(next),
            "{:?} -> {:?}",
            self.state,
            next
        );
        self.state = next;
        self.reporter.send(Progress::State(next));
    }

    /// Marks the run failed on error and passes the result through.
    fn guard<T>(&mut self, result: Result<T>) -> Result<T> {
        if result.is_err() {
            self.enter(TransferState::Failed);
        }
        result
    }
}

fn check_cancel(cancel: &CancelFlag) -> Result<()> {
    if cancel.is_cancelled() {
        return Err(CryptnosError::Cancelled);
    }
    Ok(())
}

// --------------------------------------------------
// EXPORT
// --------------------------------------------------

/// Writes `records` as an export document, encrypting each with `cipher`.
/// Returns the number of records written.
pub fn export_records<W: Write>(
    mut writer: W,
    records: &[SiteParameters],
    cipher: &RecordCipher,
    reporter: &Reporter,
    cancel: &CancelFlag,
) -> Result<usize> {
    run_export(records, cipher, reporter, cancel, |document| {
        writer
            .write_all(document)
            .and_then(|_| writer.flush())
            .map_err(|e| CryptnosError::StoreIo(format!("failed to write export: {e}")))
    })
}

/// Exports into `path`, replacing any existing file atomically.
pub fn export_to_file(
    path: &Path,
    records: &[SiteParameters],
    cipher: &RecordCipher,
    reporter: &Reporter,
    cancel: &CancelFlag,
) -> Result<usize> {
    run_export(records, cipher, reporter, cancel, |document| {
        Storage::new(path.to_path_buf()).save(document)
    })
}

/// Builds the document in memory, then hands it to `sink`. The run is only
/// `Done` once the sink succeeded.
fn run_export(
    records: &[SiteParameters],
    cipher: &RecordCipher,
    reporter: &Reporter,
    cancel: &CancelFlag,
    sink: impl FnOnce(&[u8]) -> Result<()>,
) -> Result<usize> {
    let mut run = Run::start(reporter);
    run.enter(TransferState::DecodingRecords);

    let mut document = Vec::new();
    let result = write_document(&mut document, records, cipher, reporter, cancel);
    let count = run.guard(result)?;

    run.enter(TransferState::WritingToStore);
    run.guard(sink(&document))?;

    run.enter(TransferState::Done);
    tracing::info!(records = count, "exported records");
    Ok(count)
}

fn write_document(
    document: &mut Vec<u8>,
    records: &[SiteParameters],
    cipher: &RecordCipher,
    reporter: &Reporter,
    cancel: &CancelFlag,
) -> Result<usize> {
    let io = |e: std::io::Error| CryptnosError::StoreIo(format!("failed to write export: {e}"));

    writeln!(
        document,
        "{HEADER_PREFIX} v{EXPORT_VERSION} {}",
        Local::now().to_rfc3339()
    )
    .map_err(io)?;

    let total = records.len();
    for (i, params) in records.iter().enumerate() {
        check_cancel(cancel)?;
        let encoded = cipher.encode(params)?;
        writeln!(document, "{}", encoded.blob).map_err(io)?;
        reporter.send(Progress::Record { index: i + 1, total });
    }

    writeln!(document, "{TRAILER_PREFIX} {total}").map_err(io)?;
    Ok(total)
}

// --------------------------------------------------
// IMPORT
// --------------------------------------------------

/// A record line that could not be decoded.
#[derive(Debug)]
pub struct LineFailure {
    /// 1-based line number in the import file.
    pub line: usize,
    pub error: CryptnosError,
}

/// Decoded records waiting for the caller to choose what to commit.
#[derive(Debug)]
pub struct ImportSession {
    records: Vec<SiteParameters>,
    failures: Vec<LineFailure>,
    state: TransferState,
}

/// Which decoded records to write and how to treat existing sites.
#[derive(Debug, Clone, Default)]
pub struct CommitOptions {
    /// Only commit these sites; `None` commits everything.
    pub sites: Option<Vec<String>>,
    /// Replace records whose site is already stored.
    pub overwrite: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommitReport {
    pub written: usize,
    pub replaced: usize,
    /// Sites left alone because they already existed.
    pub skipped: Vec<String>,
}

impl ImportSession {
    pub fn records(&self) -> &[SiteParameters] {
        &self.records
    }

    pub fn failures(&self) -> &[LineFailure] {
        &self.failures
    }

    pub fn failed_count(&self) -> usize {
        self.failures.len()
    }

    pub fn state(&self) -> TransferState {
        self.state
    }

    /// Sites in this import that already exist in `store`.
    pub fn collisions<S: ParamStore>(&self, store: &S, settings: &Settings) -> Result<Vec<String>> {
        let mut out = Vec::new();
        for params in &self.records {
            if store.contains(&crypto::site_key(params.site(), settings)?)? {
                out.push(params.site().to_string());
            }
        }
        Ok(out)
    }

    /// Writes the selected records into `store`, encrypted with `cipher`.
    ///
    /// Records are written one at a time; on error or cancellation the
    /// records already written stay in the store.
    pub fn commit<S: ParamStore>(
        &mut self,
        store: &mut S,
        cipher: &RecordCipher,
        options: &CommitOptions,
        reporter: &Reporter,
        cancel: &CancelFlag,
    ) -> Result<CommitReport> {
        if self.state != TransferState::AwaitingUserSelection {
            return Err(CryptnosError::invalid("import session already committed"));
        }

        self.state = TransferState::WritingToStore;
        reporter.send(Progress::State(TransferState::WritingToStore));

        let result = self.write_selected(store, cipher, options, reporter, cancel);
        self.state = if result.is_ok() {
            TransferState::Done
        } else {
            TransferState::Failed
        };
        reporter.send(Progress::State(self.state));

        if let Ok(report) = &result {
            tracing::info!(
                written = report.written,
                replaced = report.replaced,
                skipped = report.skipped.len(),
                "committed imported records"
            );
        }
        result
    }

    fn write_selected<S: ParamStore>(
        &self,
        store: &mut S,
        cipher: &RecordCipher,
        options: &CommitOptions,
        reporter: &Reporter,
        cancel: &CancelFlag,
    ) -> Result<CommitReport> {
        let selected: Vec<&SiteParameters> = self
            .records
            .iter()
            .filter(|p| match &options.sites {
                Some(sites) => sites.iter().any(|s| s == p.site()),
                None => true,
            })
            .collect();

        let mut report = CommitReport::default();
        let total = selected.len();
        for (i, params) in selected.into_iter().enumerate() {
            check_cancel(cancel)?;

            let encoded = cipher.encode(params)?;
            let exists = store.contains(&encoded.site_key)?;
            if exists && !options.overwrite {
                tracing::debug!("skipping existing site");
                report.skipped.push(params.site().to_string());
            } else {
                store.put(&encoded.site_key, &encoded.blob)?;
                report.written += 1;
                if exists {
                    report.replaced += 1;
                }
            }
            reporter.send(Progress::Record { index: i + 1, total });
        }
        Ok(report)
    }
}

/// Decodes an export document with `cipher`.
///
/// Undecodable lines are collected as failures. The run only fails when no
/// record could be recovered at all.
pub fn read_import<R: BufRead>(
    reader: R,
    cipher: &RecordCipher,
    reporter: &Reporter,
    cancel: &CancelFlag,
) -> Result<ImportSession> {
    let mut run = Run::start(reporter);
    run.enter(TransferState::ReadingFile);

    let lines = run.guard(collect_lines(reader))?;
    run.enter(TransferState::DecodingRecords);

    let result = decode_lines(lines, cipher, reporter, cancel);
    let (records, failures) = run.guard(result)?;

    if records.is_empty() {
        let err = if failures.is_empty() {
            CryptnosError::corrupt("import file contains no records")
        } else if failures
            .iter()
            .all(|f| matches!(f.error, CryptnosError::AuthenticationFailed))
        {
            CryptnosError::AuthenticationFailed
        } else {
            CryptnosError::PartialImportFailure {
                imported: 0,
                failed: failures.len(),
            }
        };
        return run.guard(Err(err));
    }

    run.enter(TransferState::AwaitingUserSelection);
    tracing::info!(
        records = records.len(),
        failed = failures.len(),
        "decoded import file"
    );

    Ok(ImportSession {
        records,
        failures,
        state: TransferState::AwaitingUserSelection,
    })
}

/// Reads and decodes the export file at `path`.
pub fn import_from_file(
    path: &Path,
    cipher: &RecordCipher,
    reporter: &Reporter,
    cancel: &CancelFlag,
) -> Result<ImportSession> {
    let file = std::fs::File::open(path).map_err(|e| {
        reporter.send(Progress::State(TransferState::Failed));
        CryptnosError::StoreIo(format!("failed to open '{}': {e}", path.display()))
    })?;
    read_import(BufReader::new(file), cipher, reporter, cancel)
}

/// Splits the input into numbered lines. A line that is not UTF-8 becomes
/// a `CorruptData` entry instead of failing the read.
fn collect_lines<R: BufRead>(reader: R) -> Result<Vec<(usize, Result<String>)>> {
    reader
        .split(b'\n')
        .enumerate()
        .map(|(i, raw)| {
            let raw = raw
                .map_err(|e| CryptnosError::StoreIo(format!("failed to read import file: {e}")))?;
            let text = String::from_utf8(raw)
                .map_err(|_| CryptnosError::corrupt("line is not valid UTF-8"));
            Ok((i + 1, text))
        })
        .collect()
}

fn decode_lines(
    lines: Vec<(usize, Result<String>)>,
    cipher: &RecordCipher,
    reporter: &Reporter,
    cancel: &CancelFlag,
) -> Result<(Vec<SiteParameters>, Vec<LineFailure>)> {
    let mut trailer_count = None;
    let mut body = Vec::new();

    for (number, line) in lines {
        let line = match line {
            Ok(text) => text.trim().to_string(),
            Err(error) => {
                body.push((number, Err(error)));
                continue;
            }
        };
        if line.is_empty() {
            continue;
        }
        if let Some(rest) = line.strip_prefix(HEADER_PREFIX) {
            check_header(rest)?;
        } else if let Some(rest) = line.strip_prefix(TRAILER_PREFIX) {
            trailer_count = rest.trim().parse::<usize>().ok();
        } else {
            body.push((number, Ok(line)));
        }
    }

    let mut records = Vec::new();
    let mut failures = Vec::new();
    let total = body.len();

    for (i, (number, line)) in body.into_iter().enumerate() {
        check_cancel(cancel)?;
        match line.and_then(|text| cipher.decode(&text)) {
            Ok(params) => records.push(params),
            Err(error) => {
                tracing::warn!(line = number, %error, "skipping undecodable import line");
                failures.push(LineFailure {
                    line: number,
                    error,
                });
            }
        }
        reporter.send(Progress::Record { index: i + 1, total });
    }

    if let Some(expected) = trailer_count {
        if expected != total {
            tracing::warn!(expected, found = total, "import trailer count mismatch");
        }
    }

    Ok((records, failures))
}

fn check_header(rest: &str) -> Result<()> {
    let version = rest
        .split_whitespace()
        .next()
        .and_then(|v| v.strip_prefix('v'))
        .and_then(|v| v.parse::<u32>().ok())
        .ok_or_else(|| CryptnosError::corrupt("malformed export header"))?;

    if version != EXPORT_VERSION {
        return Err(CryptnosError::corrupt(format!(
            "unsupported export version {version}"
        )));
    }
    Ok(())
}

// --------------------------------------------------
// BACKGROUND RUNS
// --------------------------------------------------

/// Handle to a transfer running on a worker thread.
#[derive(Debug)]
pub struct Background<T> {
    pub handle: JoinHandle<Result<T>>,
    pub progress: mpsc::Receiver<Progress>,
    pub cancel: CancelFlag,
}

impl<T> Background<T> {
    /// Waits for the worker and returns its result.
    pub fn wait(self) -> Result<T> {
        self.handle
            .join()
            .map_err(|_| CryptnosError::StoreIo("transfer worker panicked".into()))?
    }
}

fn spawn_worker<T, F>(cancel: CancelFlag, work: F) -> Background<T>
where
    T: Send + 'static,
    F: FnOnce(Reporter, CancelFlag) -> Result<T> + Send + 'static,
{
    let (tx, rx) = mpsc::channel();
    let worker_cancel = cancel.clone();
    let handle = thread::spawn(move || work(Reporter::new(tx), worker_cancel));
    Background {
        handle,
        progress: rx,
        cancel,
    }
}

pub fn spawn_export(
    path: PathBuf,
    records: Vec<SiteParameters>,
    cipher: RecordCipher,
    cancel: CancelFlag,
) -> Background<usize> {
    spawn_worker(cancel, move |reporter, cancel| {
        export_to_file(&path, &records, &cipher, &reporter, &cancel)
    })
}

pub fn spawn_import(path: PathBuf, cipher: RecordCipher, cancel: CancelFlag) -> Background<ImportSession> {
    spawn_worker(cancel, move |reporter, cancel| {
        import_from_file(&path, &cipher, &reporter, &cancel)
    })
}

/// Commits an import session from a worker; writes are serialized through
/// the shared store's lock.
pub fn spawn_commit<S>(
    mut session: ImportSession,
    mut store: SharedStore<S>,
    cipher: RecordCipher,
    options: CommitOptions,
    cancel: CancelFlag,
) -> Background<CommitReport>
where
    S: ParamStore + Send + 'static,
{
    spawn_worker(cancel, move |reporter, cancel| {
        session.commit(&mut store, &cipher, &options, &reporter, &cancel)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hash::HashAlgorithm;
    use crate::password::CharTypes;
    use crate::store::MemoryStore;
    use std::io::Cursor;
    use tempfile::tempdir;

    fn cipher(passphrase: &str) -> RecordCipher {
        RecordCipher::new(passphrase, &Settings::for_tests()).unwrap()
    }

    fn record(site: &str) -> SiteParameters {
        SiteParameters::new(
            site,
            HashAlgorithm::Sha256,
            3,
            CharTypes::Alphanumeric,
            0,
            &Settings::for_tests(),
        )
        .unwrap()
    }

    fn export_text(records: &[SiteParameters], cipher: &RecordCipher) -> String {
        let mut buf = Vec::new();
        export_records(&mut buf, records, cipher, &Reporter::silent(), &CancelFlag::new()).unwrap();
        String::from_utf8(buf).unwrap()
    }

    fn import_text(text: &str, cipher: &RecordCipher) -> Result<ImportSession> {
        read_import(Cursor::new(text), cipher, &Reporter::silent(), &CancelFlag::new())
    }

    #[test]
    fn export_layout_has_header_records_and_trailer() {
        let c = cipher("pw");
        let text = export_text(&[record("a.com"), record("b.com")], &c);
        let lines: Vec<&str> = text.lines().collect();

        assert_eq!(lines.len(), 4);
        assert!(lines[0].starts_with("# cryptnos-export v1 "));
        assert_eq!(lines[3], "# end 2");
        assert!(!text.contains("a.com"));
    }

    #[test]
    fn failed_export_write_ends_in_failed_state() {
        let dir = tempdir().unwrap();
        let blocker = dir.path().join("blocker");
        std::fs::write(&blocker, b"x").unwrap();
        let (tx, rx) = mpsc::channel();

        let result = export_to_file(
            &blocker.join("out.txt"),
            &[record("a.com")],
            &cipher("pw"),
            &Reporter::new(tx),
            &CancelFlag::new(),
        );
        let states: Vec<TransferState> = rx
            .try_iter()
            .filter_map(|p| match p {
                Progress::State(s) => Some(s),
                _ => None,
            })
            .collect();

        assert!(matches!(result, Err(CryptnosError::StoreIo(_))));
        assert_eq!(
            states,
            vec![
                TransferState::Idle,
                TransferState::DecodingRecords,
                TransferState::WritingToStore,
                TransferState::Failed,
            ]
        );
    }

    #[test]
    fn export_then_import_recovers_records() {
        let c = cipher("pw");
        let records = vec![record("a.com"), record("b.com"), record("c.com")];
        let text = export_text(&records, &c);

        let session = import_text(&text, &c).unwrap();
        assert_eq!(session.records(), records.as_slice());
        assert_eq!(session.failed_count(), 0);
        assert_eq!(session.state(), TransferState::AwaitingUserSelection);
    }

    #[test]
    fn five_good_lines_and_one_corrupt_line() {
        let c = cipher("pw");
        let records: Vec<_> = (1..=5).map(|i| record(&format!("site{i}.com"))).collect();
        let text = export_text(&records, &c);

        let mut lines: Vec<String> = text.lines().map(str::to_string).collect();
        lines.insert(3, "this line is garbage".to_string());
        let damaged = lines.join("\n");

        let session = import_text(&damaged, &c).unwrap();
        assert_eq!(session.records().len(), 5);
        assert_eq!(session.failed_count(), 1);
        assert_eq!(session.failures()[0].line, 4);
        assert!(matches!(session.failures()[0].error, CryptnosError::CorruptData(_)));
    }

    #[test]
    fn non_utf8_line_fails_alone() {
        let c = cipher("pw");
        let a = c.encode(&record("a.com")).unwrap().blob;
        let b = c.encode(&record("b.com")).unwrap().blob;

        let mut data = format!("{a}\n").into_bytes();
        data.extend_from_slice(b"\xFF\xFE\n");
        data.extend_from_slice(format!("{b}\n").as_bytes());

        let session = read_import(Cursor::new(data), &c, &Reporter::silent(), &CancelFlag::new()).unwrap();
        assert_eq!(session.records().len(), 2);
        assert_eq!(session.failed_count(), 1);
        assert_eq!(session.failures()[0].line, 2);
        assert!(matches!(session.failures()[0].error, CryptnosError::CorruptData(_)));
    }

    #[test]
    fn unknown_comment_line_counts_as_failure() {
        let c = cipher("pw");
        let blob = c.encode(&record("a.com")).unwrap().blob;
        let text = format!("# a note\n{blob}\n");

        let session = import_text(&text, &c).unwrap();
        assert_eq!(session.records().len(), 1);
        assert_eq!(session.failed_count(), 1);
        assert_eq!(session.failures()[0].line, 1);
    }

    #[test]
    fn blank_lines_and_missing_header_are_tolerated() {
        let c = cipher("pw");
        let blob = c.encode(&record("a.com")).unwrap().blob;
        let text = format!("\n{blob}\n\n\n");

        let session = import_text(&text, &c).unwrap();
        assert_eq!(session.records().len(), 1);
    }

    #[test]
    fn wrong_passphrase_for_whole_file_is_authentication_failure() {
        let text = export_text(&[record("a.com"), record("b.com")], &cipher("right"));
        assert!(matches!(
            import_text(&text, &cipher("wrong")),
            Err(CryptnosError::AuthenticationFailed)
        ));
    }

    #[test]
    fn all_lines_corrupt_is_partial_failure_with_zero_imported() {
        let text = "garbage one\ngarbage two\n";
        match import_text(text, &cipher("pw")) {
            Err(CryptnosError::PartialImportFailure { imported, failed }) => {
                assert_eq!(imported, 0);
                assert_eq!(failed, 2);
            }
            other => panic!("expected PartialImportFailure, got: {other:?}"),
        }
    }

    #[test]
    fn empty_file_is_corrupt() {
        assert!(matches!(
            import_text("\n\n", &cipher("pw")),
            Err(CryptnosError::CorruptData(_))
        ));
    }

    #[test]
    fn future_export_version_is_rejected() {
        let c = cipher("pw");
        let blob = c.encode(&record("a.com")).unwrap().blob;
        let text = format!("# cryptnos-export v9 2030-01-01\n{blob}\n");
        assert!(matches!(import_text(&text, &c), Err(CryptnosError::CorruptData(_))));
    }

    #[test]
    fn import_reports_state_transitions() {
        let c = cipher("pw");
        let text = export_text(&[record("a.com")], &c);
        let (tx, rx) = mpsc::channel();

        read_import(Cursor::new(text), &c, &Reporter::new(tx), &CancelFlag::new()).unwrap();
        let states: Vec<TransferState> = rx
            .try_iter()
            .filter_map(|p| match p {
                Progress::State(s) => Some(s),
                _ => None,
            })
            .collect();

        assert_eq!(
            states,
            vec![
                TransferState::Idle,
                TransferState::ReadingFile,
                TransferState::DecodingRecords,
                TransferState::AwaitingUserSelection,
            ]
        );
    }

    #[test]
    fn commit_respects_selection_and_collisions() {
        let file_cipher = cipher("file pw");
        let store_cipher = cipher("store pw");
        let text = export_text(&[record("a.com"), record("b.com"), record("c.com")], &file_cipher);
        let mut session = import_text(&text, &file_cipher).unwrap();

        let mut store = MemoryStore::new();
        let existing = store_cipher.encode(&record("b.com")).unwrap();
        store.put(&existing.site_key, &existing.blob).unwrap();

        assert_eq!(session.collisions(&store, store_cipher.settings()).unwrap(), vec!["b.com"]);

        let options = CommitOptions {
            sites: Some(vec!["a.com".into(), "b.com".into()]),
            overwrite: false,
        };
        let report = session
            .commit(&mut store, &store_cipher, &options, &Reporter::silent(), &CancelFlag::new())
            .unwrap();

        assert_eq!(report.written, 1);
        assert_eq!(report.replaced, 0);
        assert_eq!(report.skipped, vec!["b.com"]);
        assert_eq!(store.count().unwrap(), 2);
        assert_eq!(session.state(), TransferState::Done);

        let a_key = store_cipher.site_key("a.com").unwrap();
        let blob = store.get(&a_key).unwrap().unwrap();
        assert_eq!(store_cipher.decode(&blob).unwrap(), record("a.com"));
    }

    #[test]
    fn commit_twice_is_rejected() {
        let c = cipher("pw");
        let text = export_text(&[record("a.com")], &c);
        let mut session = import_text(&text, &c).unwrap();
        let mut store = MemoryStore::new();
        let options = CommitOptions::default();

        session
            .commit(&mut store, &c, &options, &Reporter::silent(), &CancelFlag::new())
            .unwrap();
        assert!(session
            .commit(&mut store, &c, &options, &Reporter::silent(), &CancelFlag::new())
            .is_err());
    }

    #[test]
    fn overwrite_replaces_existing() {
        let c = cipher("pw");
        let text = export_text(&[record("a.com")], &c);
        let mut session = import_text(&text, &c).unwrap();

        let mut store = MemoryStore::new();
        let key = c.site_key("a.com").unwrap();
        store.put(&key, "old blob").unwrap();

        let options = CommitOptions {
            sites: None,
            overwrite: true,
        };
        let report = session
            .commit(&mut store, &c, &options, &Reporter::silent(), &CancelFlag::new())
            .unwrap();

        assert_eq!(report.replaced, 1);
        assert_ne!(store.get(&key).unwrap().unwrap(), "old blob");
    }

    #[test]
    fn cancelled_run_fails_before_decoding() {
        let c = cipher("pw");
        let text = export_text(&[record("a.com")], &c);
        let cancel = CancelFlag::new();
        cancel.cancel();

        assert!(matches!(
            read_import(Cursor::new(text), &c, &Reporter::silent(), &cancel),
            Err(CryptnosError::Cancelled)
        ));
    }

    #[test]
    fn background_export_import_commit() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("export.txt");
        let records = vec![record("a.com"), record("b.com")];

        let export = spawn_export(path.clone(), records.clone(), cipher("pw"), CancelFlag::new());
        assert_eq!(export.wait().unwrap(), 2);

        let import = spawn_import(path, cipher("pw"), CancelFlag::new());
        let progress = import.progress.iter().collect::<Vec<_>>();
        let session = import.handle.join().unwrap().unwrap();
        assert!(progress.contains(&Progress::Record { index: 2, total: 2 }));

        let shared = SharedStore::new(MemoryStore::new());
        let commit = spawn_commit(
            session,
            shared.clone(),
            cipher("pw"),
            CommitOptions::default(),
            CancelFlag::new(),
        );
        let report = commit.wait().unwrap();

        assert_eq!(report.written, 2);
        assert_eq!(shared.count().unwrap(), 2);
    }

    #[test]
    fn missing_import_file_is_store_io() {
        let dir = tempdir().unwrap();
        let result = import_from_file(
            &dir.path().join("nope.txt"),
            &cipher("pw"),
            &Reporter::silent(),
            &CancelFlag::new(),
        );
        assert!(matches!(result, Err(CryptnosError::StoreIo(_))));
    }
}
