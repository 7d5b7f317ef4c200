use flate2::Compression as GzLevel;
use flate2::write::GzEncoder;
use lookup_loader::load::reader::{ParseOutcome, RecordReader, Rejection};
use lookup_loader::load::{IstexJsonReader, LoadObserver, PmcIdsReader, PmidTsvReader};
use lookup_loader::{
    BulkLoader, CancelToken, LinkedIds, LoadError, LoadOptions, LookupConfig, LookupStore,
    MappingSource, Scheme, run_load,
};
use std::io::{Cursor, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use tempfile::TempDir;

const SAMPLE: &str = "12345\t10.1000/xyz\tISTEX-0001\n67890\t10.2000/abc\tISTEX-0002\n";

fn open_store(dir: &TempDir) -> LookupStore {
    LookupStore::open(dir.path().join("lookup")).unwrap()
}

fn write_plain(dir: &TempDir, name: &str, contents: &str) -> PathBuf {
    let path = dir.path().join(name);
    std::fs::write(&path, contents).unwrap();
    path
}

fn write_gzip(dir: &TempDir, name: &str, contents: &str) -> PathBuf {
    let path = dir.path().join(name);
    let file = std::fs::File::create(&path).unwrap();
    let mut encoder = GzEncoder::new(file, GzLevel::default());
    encoder.write_all(contents.as_bytes()).unwrap();
    encoder.finish().unwrap();
    path
}

fn dump_index(store: &LookupStore, index: &str, keys: &[&str]) -> Vec<Option<Vec<u8>>> {
    keys.iter()
        .map(|key| store.get(index, key.as_bytes()).unwrap())
        .collect()
}

#[test]
fn loads_pmid_mapping_one_record_per_batch() {
    let dir = TempDir::new().unwrap();
    let store = open_store(&dir);
    let loader = BulkLoader::new(&store, LoadOptions::sequential(1));

    let stats = loader
        .load(Cursor::new(SAMPLE.as_bytes()), &PmidTsvReader)
        .unwrap();

    assert_eq!(stats.counts(), (2, 0));
    assert_eq!(stats.batches_committed, 2);
    assert_eq!(store.size("pmid_to_ids").unwrap(), 2);
    assert_eq!(
        store.get_linked("pmid_to_ids", "12345").unwrap(),
        Some(LinkedIds {
            doi: Some("10.1000/xyz".to_string()),
            istex_id: Some("ISTEX-0001".to_string()),
            ..Default::default()
        })
    );
    assert_eq!(
        store.get_str("doi_to_pmid", "10.2000/abc").unwrap(),
        Some("67890".to_string())
    );
    assert_eq!(
        store.get_str("istex_to_pmid", "ISTEX-0002").unwrap(),
        Some("67890".to_string())
    );
}

#[test]
fn empty_primary_is_skipped_everywhere() {
    let dir = TempDir::new().unwrap();
    let store = open_store(&dir);
    let loader = BulkLoader::new(&store, LoadOptions::sequential(10));

    let input = format!("{SAMPLE}\t10.3000/zzz\tISTEX-0003\n");
    let stats = loader
        .load(Cursor::new(input.into_bytes()), &PmidTsvReader)
        .unwrap();

    assert_eq!(stats.counts(), (2, 1));
    assert_eq!(store.size("pmid_to_ids").unwrap(), 2);
    assert_eq!(store.get_str("doi_to_pmid", "10.3000/zzz").unwrap(), None);
    assert_eq!(store.get_str("istex_to_pmid", "ISTEX-0003").unwrap(), None);
}

#[test]
fn empty_input_commits_nothing() {
    let dir = TempDir::new().unwrap();
    let store = open_store(&dir);
    let path = write_plain(&dir, "empty.tsv", "");

    let stats = BulkLoader::new(&store, LoadOptions::default())
        .load_path(&path, &PmidTsvReader)
        .unwrap();

    assert_eq!(stats.counts(), (0, 0));
    assert_eq!(stats.batches_committed, 0);
    assert_eq!(store.size("pmid_to_ids").unwrap(), 0);
}

#[test]
fn good_lines_then_bad_lines() {
    let dir = TempDir::new().unwrap();
    let store = open_store(&dir);

    let mut input = String::new();
    for n in 1..=25 {
        input.push_str(&format!("{n}\t10.9/{n}\tI-{n}\n"));
    }
    input.push_str("not-a-pmid\t10.9/x\tI-x\n");
    input.push_str("only one field\n");
    input.push_str("1\t2\t3\t4\n");

    let stats = BulkLoader::new(&store, LoadOptions::sequential(4))
        .load(Cursor::new(input.into_bytes()), &PmidTsvReader)
        .unwrap();

    assert_eq!(stats.counts(), (25, 3));
    assert_eq!(store.size("pmid_to_ids").unwrap(), 25);
}

#[test]
fn loading_twice_is_idempotent() {
    let dir = TempDir::new().unwrap();
    let store = open_store(&dir);
    let path = write_plain(&dir, "pmid.tsv", SAMPLE);
    let loader = BulkLoader::new(&store, LoadOptions::sequential(1));
    let keys = ["12345", "67890"];

    loader.load_path(&path, &PmidTsvReader).unwrap();
    let first = dump_index(&store, "pmid_to_ids", &keys);
    loader.load_path(&path, &PmidTsvReader).unwrap();

    assert_eq!(store.size("pmid_to_ids").unwrap(), 2);
    assert_eq!(store.size("doi_to_pmid").unwrap(), 2);
    assert_eq!(dump_index(&store, "pmid_to_ids", &keys), first);
}

#[test]
fn gzip_and_plain_inputs_match() {
    let dir = TempDir::new().unwrap();
    let plain = write_plain(&dir, "pmid.tsv", SAMPLE);
    let gzip = write_gzip(&dir, "pmid.tsv.gz", SAMPLE);

    let plain_store = LookupStore::open(dir.path().join("plain")).unwrap();
    let gzip_store = LookupStore::open(dir.path().join("gzip")).unwrap();
    BulkLoader::new(&plain_store, LoadOptions::default())
        .load_path(&plain, &PmidTsvReader)
        .unwrap();
    BulkLoader::new(&gzip_store, LoadOptions::default())
        .load_path(&gzip, &PmidTsvReader)
        .unwrap();

    assert_eq!(plain_store.index_names(), gzip_store.index_names());
    for (index, keys) in [
        ("pmid_to_ids", ["12345", "67890"]),
        ("doi_to_pmid", ["10.1000/xyz", "10.2000/abc"]),
        ("istex_to_pmid", ["ISTEX-0001", "ISTEX-0002"]),
    ] {
        assert_eq!(
            dump_index(&plain_store, index, &keys),
            dump_index(&gzip_store, index, &keys)
        );
    }
}

#[test]
fn missing_input_fails_before_writing() {
    let dir = TempDir::new().unwrap();
    let store = open_store(&dir);

    let err = BulkLoader::new(&store, LoadOptions::default())
        .load_path(dir.path().join("absent.tsv"), &PmidTsvReader)
        .unwrap_err();

    assert_eq!(err.stage(), "open input");
    assert!(store.index_names().is_empty());
}

#[test]
fn corrupt_gzip_is_reported() {
    let dir = TempDir::new().unwrap();
    let store = open_store(&dir);
    let path = write_plain(&dir, "broken.tsv.gz", "definitely not gzip");

    let err = BulkLoader::new(&store, LoadOptions::default())
        .load_path(&path, &PmidTsvReader)
        .unwrap_err();

    assert_eq!(err.stage(), "decompress input");
}

/// Trips the cancel token while parsing a given line.
struct CancelOnLine {
    inner: PmidTsvReader,
    cancel: CancelToken,
    trip_at: u64,
    seen: AtomicU64,
}

impl RecordReader for CancelOnLine {
    fn name(&self) -> &'static str {
        "cancel-on-line"
    }

    fn primary_scheme(&self) -> Scheme {
        self.inner.primary_scheme()
    }

    fn parse_line(&self, line: &str) -> ParseOutcome {
        if self.seen.fetch_add(1, Ordering::SeqCst) + 1 == self.trip_at {
            self.cancel.cancel();
        }
        self.inner.parse_line(line)
    }
}

#[test]
fn interrupt_mid_batch_keeps_only_committed_batches() {
    let dir = TempDir::new().unwrap();
    let store = open_store(&dir);
    let cancel = CancelToken::new();
    let reader = CancelOnLine {
        inner: PmidTsvReader,
        cancel: cancel.clone(),
        trip_at: 5,
        seen: AtomicU64::new(0),
    };

    let input: String = (1..=9).map(|n| format!("{n}\t10.7/{n}\tI-{n}\n")).collect();
    let err = BulkLoader::new(&store, LoadOptions::sequential(3))
        .with_cancel(cancel)
        .load(Cursor::new(input.into_bytes()), &reader)
        .unwrap_err();

    let stats = err.cancelled_stats().unwrap();
    assert_eq!(stats.loaded, 3);
    assert_eq!(stats.batches_committed, 1);
    assert_eq!(store.size("pmid_to_ids").unwrap(), 3);
    assert_eq!(store.get_str("doi_to_pmid", "10.7/4").unwrap(), None);
}

/// Cancels the load when the first rejected line is reported.
struct CancelOnSkip(CancelToken);

impl LoadObserver for CancelOnSkip {
    fn record_skipped(&self, _line: u64, _rejection: &Rejection, _skipped_so_far: u64) {
        self.0.cancel();
    }
}

#[test]
fn interrupt_mid_batch_in_pipelined_mode() {
    let dir = TempDir::new().unwrap();
    let store = open_store(&dir);
    let cancel = CancelToken::new();

    let input: String = (1..=9)
        .map(|n| match n {
            5 => "bad line\n".to_string(),
            n => format!("{n}\t10.7/{n}\tI-{n}\n"),
        })
        .collect();
    let err = BulkLoader::new(&store, LoadOptions::pipelined(3, 2, 2))
        .with_observer(CancelOnSkip(cancel.clone()))
        .with_cancel(cancel)
        .load(Cursor::new(input.into_bytes()), &PmidTsvReader)
        .unwrap_err();

    assert_eq!(err.stage(), "cancelled");
    let stats = err.cancelled_stats().unwrap();
    assert_eq!(stats.counts(), (3, 1));
    assert_eq!(store.size("pmid_to_ids").unwrap(), 3);
    assert_eq!(store.get_str("doi_to_pmid", "10.7/4").unwrap(), None);
}

fn truncated_gzip(dir: &TempDir, lines: u64) -> PathBuf {
    let contents: String = (1..=lines)
        .map(|n| format!("{n}\t10.4/{n:08}\tISTEX-{n:08}\n"))
        .collect();
    let mut encoder = GzEncoder::new(Vec::new(), GzLevel::default());
    encoder.write_all(contents.as_bytes()).unwrap();
    let mut compressed = encoder.finish().unwrap();
    compressed.truncate(compressed.len() * 3 / 4);

    let path = dir.path().join("truncated.tsv.gz");
    std::fs::write(&path, compressed).unwrap();
    path
}

#[test]
fn truncated_gzip_keeps_committed_batches() {
    let dir = TempDir::new().unwrap();
    let path = truncated_gzip(&dir, 20_000);

    for (name, options) in [
        ("sequential", LoadOptions::sequential(1000)),
        ("pipelined", LoadOptions::pipelined(1000, 2, 2)),
    ] {
        let store = LookupStore::open(dir.path().join(name)).unwrap();
        let err = BulkLoader::new(&store, options)
            .load_path(&path, &PmidTsvReader)
            .unwrap_err();

        assert_eq!(err.stage(), "read input", "{name}");
        assert!(matches!(err, LoadError::Read { line, .. } if line > 1), "{name}");

        let size = store.size("pmid_to_ids").unwrap();
        assert!(size > 0, "{name}");
        assert!(size < 20_000, "{name}");
        assert_eq!(size % 1000, 0, "{name}: partial batch was committed");
        assert_eq!(store.size("doi_to_pmid").unwrap(), size, "{name}");
    }
}

#[test]
fn pipelined_keeps_last_write_on_duplicates() {
    let input = "1\t10.1/first\tI-1\n2\t10.1/b\tI-2\n1\t10.1/second\tI-3\n";
    let dir = TempDir::new().unwrap();

    let sequential = LookupStore::open(dir.path().join("seq")).unwrap();
    BulkLoader::new(&sequential, LoadOptions::sequential(2))
        .load(Cursor::new(input.as_bytes()), &PmidTsvReader)
        .unwrap();

    let pipelined = LookupStore::open(dir.path().join("pipe")).unwrap();
    let stats = BulkLoader::new(&pipelined, LoadOptions::pipelined(2, 1, 2))
        .load(Cursor::new(input.as_bytes()), &PmidTsvReader)
        .unwrap();

    assert_eq!(stats.counts(), (3, 0));
    assert_eq!(pipelined.size("pmid_to_ids").unwrap(), 2);
    let linked = pipelined.get_linked("pmid_to_ids", "1").unwrap().unwrap();
    assert_eq!(linked.doi.as_deref(), Some("10.1/second"));
    assert_eq!(
        linked,
        sequential.get_linked("pmid_to_ids", "1").unwrap().unwrap()
    );
}

#[test]
fn loads_pmc_ids_csv() {
    let dir = TempDir::new().unwrap();
    let store = open_store(&dir);
    let input = "Journal Title,ISSN,eISSN,Year,Volume,Issue,Page,DOI,PMCID,PMID,Manuscript Id,Release Date\n\
                 Breast Cancer Res,1465-5411,1465-542X,2000,3,1,55,10.1186/BCR271,PMC13900,11250746,,live\n\
                 Some Journal,1,2,2001,1,1,1,10.1/none,PMC1,,,live\n";

    let stats = BulkLoader::new(&store, LoadOptions::default())
        .load(Cursor::new(input.as_bytes()), &PmcIdsReader)
        .unwrap();

    assert_eq!(stats.counts(), (1, 1));
    assert_eq!(stats.ignored, 1);
    assert_eq!(
        store.get_str("pmcid_to_pmid", "PMC13900").unwrap(),
        Some("11250746".to_string())
    );
    assert_eq!(
        store.get_str("doi_to_pmid", "10.1186/bcr271").unwrap(),
        Some("11250746".to_string())
    );
}

#[test]
fn loads_istex_json_lines() {
    let dir = TempDir::new().unwrap();
    let store = open_store(&dir);
    let input = concat!(
        r#"{"istexId":"ISTEX-A","doi":["10.5/A"],"ark":["ark:/67375/1"],"pmid":["111"]}"#,
        "\n",
        r#"{"doi":["10.5/B"]}"#,
        "\n",
        "{not json\n",
    );

    let stats = BulkLoader::new(&store, LoadOptions::pipelined(8, 2, 2))
        .load(Cursor::new(input.as_bytes()), &IstexJsonReader)
        .unwrap();

    assert_eq!(stats.counts(), (1, 2));
    let linked = store.get_linked("istex_to_ids", "ISTEX-A").unwrap().unwrap();
    assert_eq!(linked.pmid.as_deref(), Some("111"));
    assert_eq!(linked.ark.as_deref(), Some("ark:/67375/1"));
    assert_eq!(
        store.get_str("doi_to_istex", "10.5/a").unwrap(),
        Some("ISTEX-A".to_string())
    );
}

fn test_config(store_path: &Path) -> LookupConfig {
    let mut config = LookupConfig::from_lookup(|_| None).unwrap();
    config.store_path = store_path.to_path_buf();
    config.batch_size = 1;
    config
}

#[test]
fn run_load_uses_configured_store() {
    let dir = TempDir::new().unwrap();
    let input = write_gzip(&dir, "pmid.tsv.gz", SAMPLE);
    let store_path = dir.path().join("configured");

    let stats = run_load(
        &test_config(&store_path),
        MappingSource::Pmid,
        &input,
        CancelToken::new(),
    )
    .unwrap();
    assert_eq!(stats.counts(), (2, 0));

    let store = LookupStore::open(&store_path).unwrap();
    assert_eq!(store.size("pmid_to_ids").unwrap(), 2);
}

#[test]
fn run_load_rejects_zero_batch_size() {
    let dir = TempDir::new().unwrap();
    let input = write_plain(&dir, "pmid.tsv", SAMPLE);
    let mut config = test_config(&dir.path().join("store"));
    config.batch_size = 0;

    let err = run_load(&config, MappingSource::Pmid, &input, CancelToken::new()).unwrap_err();
    assert!(matches!(err, LoadError::InvalidOptions(_)));
}
