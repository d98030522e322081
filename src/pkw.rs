use log::{debug, info, warn};

use protocol_count::builder::{submit, Submission};
use protocol_count::geo::{find_nearest_wards, haversine_distance};
use protocol_count::images::{authorize_image, image_urls, Sha256Signer, UploadToken};
use protocol_count::store::{
    ActorIdentity, Anonymous, KnownActor, MemoryProtocolStore, MemoryWardStore, ProtocolStore,
};
use protocol_count::verification::Verifier;
use protocol_count::*;
use snafu::{prelude::*, Snafu};

use std::collections::HashMap;
use std::fs;
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use std::str::FromStr;

use chrono::{NaiveDate, Utc};
use fs2::FileExt;
use serde_json::json;
use serde_json::Value as JSValue;
use text_diff::print_diff;

use crate::args::{Args, Command};
use crate::pkw::config_reader::*;
use crate::pkw::io_json::{BallotResultJs, ProtocolRecord, WardRecord};

pub mod config_reader;
pub mod io_common;
pub mod io_csv;
pub mod io_json;
pub mod io_xlsx;

#[derive(Debug, Snafu)]
pub enum PkwError {
    #[snafu(display("Error opening file {path}"))]
    OpeningJson {
        source: std::io::Error,
        path: String,
    },
    #[snafu(display("Error reading or writing JSON {path}"))]
    ParsingJson {
        source: serde_json::Error,
        path: String,
    },
    #[snafu(display("Error writing file {path}"))]
    WritingFile {
        source: std::io::Error,
        path: String,
    },
    #[snafu(display("Error locking {path}"))]
    LockingStore {
        source: std::io::Error,
        path: String,
    },
    #[snafu(display("Error opening file {path}"))]
    CsvOpen { source: csv::Error, path: String },
    #[snafu(display(""))]
    CsvLineParse { source: csv::Error },
    #[snafu(display("Line {lineno} is too short"))]
    CsvLineTooShort { lineno: usize },
    #[snafu(display("Error opening file {path}"))]
    OpeningExcel {
        source: calamine::XlsxError,
        path: String,
    },
    #[snafu(display("The workbook has no worksheet or no header"))]
    EmptyExcel {},
    #[snafu(display("Line {lineno}: unexpected cell {content}"))]
    ExcelWrongCellType { lineno: usize, content: String },
    #[snafu(display("Line {lineno}: invalid ward: {content}"))]
    WardWrongValue { lineno: usize, content: String },
    #[snafu(display("The configuration file has no parent directory"))]
    MissingParentDir {},
    #[snafu(display("Missing setting {setting} in the configuration"))]
    MissingSetting { setting: String },
    #[snafu(display("Invalid date {date}, expected YYYY-MM-DD"))]
    InvalidDate {
        source: chrono::ParseError,
        date: String,
    },
    #[snafu(display("{source}"))]
    Counting { source: CountingError },

    #[snafu(whatever, display("{message}"))]
    Whatever {
        message: String,
        #[snafu(source(from(Box<dyn std::error::Error>, Some)))]
        source: Option<Box<dyn std::error::Error>>,
    },
}

pub type PkwResult<T> = Result<T, PkwError>;

/// The protocol store of a workspace, with the revisions that were read from disk.
#[derive(Debug)]
pub struct ProtocolFile {
    pub store: MemoryProtocolStore,
    loaded: HashMap<ProtocolId, u64>,
}

/// The configuration, with its paths resolved against the directory of the
/// configuration file.
#[derive(Debug, Clone)]
pub struct Workspace {
    pub config: PkwConfig,
    root: PathBuf,
}

impl Workspace {
    pub fn open(config_path: &str) -> PkwResult<Workspace> {
        let config = read_config(config_path)?;
        info!("config: {:?}", config);
        let root = Path::new(config_path)
            .parent()
            .context(MissingParentDirSnafu {})?
            .to_path_buf();
        Ok(Workspace { config, root })
    }

    fn resolve(&self, lpath: &str) -> String {
        self.root.join(lpath).display().to_string()
    }

    pub fn protocols_path(&self) -> String {
        self.resolve(&self.config.storage.protocols_path)
    }

    pub fn load_protocols(&self) -> PkwResult<ProtocolFile> {
        let protocols = io_json::read_protocols(&self.protocols_path())?;
        let loaded = protocols.iter().map(|p| (p.id, p.revision)).collect();
        let store = MemoryProtocolStore::from_protocols(protocols).context(CountingSnafu {})?;
        Ok(ProtocolFile { store, loaded })
    }

    // Held until the returned file is dropped.
    fn lock_protocols(&self) -> PkwResult<File> {
        let path = format!("{}.lock", self.protocols_path());
        let lock = OpenOptions::new()
            .create(true)
            .write(true)
            .open(&path)
            .context(LockingStoreSnafu { path: path.as_str() })?;
        lock.lock_exclusive()
            .context(LockingStoreSnafu { path: path.as_str() })?;
        Ok(lock)
    }

    /// Writes back the protocols created or changed since the file was loaded.
    ///
    /// The file on disk is re-read under an exclusive lock. A changed protocol is only
    /// written if nobody saved it in the meantime, otherwise the save fails with
    /// `Conflict` and nothing is written. The other records are kept as found on disk.
    pub fn save_protocols(&self, file: &ProtocolFile) -> PkwResult<()> {
        let path = self.protocols_path();
        let _lock = self.lock_protocols()?;
        let on_disk = MemoryProtocolStore::from_protocols(io_json::read_protocols(&path)?)
            .context(CountingSnafu {})?;
        let mut changes = 0;
        for p in file.store.snapshot() {
            match file.loaded.get(&p.id) {
                Some(revision) if *revision == p.revision => {}
                Some(revision) => {
                    on_disk
                        .compare_and_swap(p, *revision)
                        .context(CountingSnafu {})?;
                    changes += 1;
                }
                None => {
                    on_disk.insert(p).context(CountingSnafu {})?;
                    changes += 1;
                }
            }
        }
        debug!("save_protocols: {} changed protocols", changes);
        io_json::write_protocols(&path, &on_disk.snapshot())
    }

    pub fn load_wards(&self) -> PkwResult<MemoryWardStore> {
        let storage = &self.config.storage;
        let lpath = storage.wards_path.clone().context(MissingSettingSnafu {
            setting: "storage.wardsPath",
        })?;
        let path = self.resolve(&lpath);
        info!("Attempting to read ward file {:?}", path);
        let wards = match storage.wards_provider().as_deref() {
            Some("csv") => io_csv::read_csv_wards(&path)?,
            Some("xlsx") => {
                io_xlsx::read_excel_wards(&path, storage.excel_worksheet_name.as_deref())?
            }
            Some("json") => io_json::read_json_wards(&path)?,
            x => whatever!("Provider not implemented {:?}", x),
        };
        Ok(MemoryWardStore::new(wards))
    }

    pub fn image_settings(&self) -> PkwResult<ImageSettings> {
        self.config
            .images
            .clone()
            .context(MissingSettingSnafu { setting: "images" })
    }
}

fn parse_date(date: &str) -> PkwResult<NaiveDate> {
    NaiveDate::parse_from_str(date.trim(), "%Y-%m-%d").context(InvalidDateSnafu { date })
}

fn parse_id(id: &str) -> PkwResult<ProtocolId> {
    ProtocolId::from_str(id).context(CountingSnafu {})
}

fn build_summary_js(ballot: &Ballot, tally: &BallotTally) -> JSValue {
    let wards: Vec<JSValue> = tally
        .wards
        .iter()
        .map(|w| {
            json!({
                "communityCode": w.ward.community_code,
                "wardNo": w.ward.no,
                "submissions": w.submissions,
                "selected": w.selected.to_string(),
                "result": BallotResultJs::from(&w.result),
            })
        })
        .collect();
    let contested: Vec<String> = tally.contested_wards.iter().map(|w| w.to_string()).collect();
    json!({
        "ballot": {"votingDate": ballot.voting_date.to_string(), "no": ballot.no},
        "protocols": tally.protocol_count,
        "total": BallotResultJs::from(&tally.total),
        "wards": wards,
        "contestedWards": contested,
    })
}

pub fn read_summary(path: &str) -> PkwResult<JSValue> {
    let contents = fs::read_to_string(path).context(OpeningJsonSnafu { path })?;
    debug!("read content: {:?}", contents);
    let js: JSValue = serde_json::from_str(contents.as_str()).context(ParsingJsonSnafu { path })?;
    Ok(js)
}

fn to_pretty(js: &JSValue) -> PkwResult<String> {
    serde_json::to_string_pretty(js).context(ParsingJsonSnafu { path: "<output>" })
}

/// Tallies a ballot. If a reference summary is given, fails when the tally differs.
pub fn run_sum(
    config_path: &str,
    date: &str,
    ballot_no: u32,
    check_summary_path: Option<&str>,
) -> PkwResult<JSValue> {
    let ws = Workspace::open(config_path)?;
    let rules = ws.config.counting_rules()?;
    let ballot = Ballot {
        voting_date: parse_date(date)?,
        no: ballot_no,
    };
    let store = ws.load_protocols()?.store;
    let tally = count_ballot(&store, &ballot, &rules).context(CountingSnafu {})?;
    let result_js = build_summary_js(&ballot, &tally);

    // The reference summary, if provided for comparison
    if let Some(summary_p) = check_summary_path {
        let summary_ref = read_summary(summary_p)?;
        let pretty_js_summary_ref = to_pretty(&summary_ref)?;
        let pretty_js_stats = to_pretty(&result_js)?;
        if pretty_js_summary_ref != pretty_js_stats {
            warn!("Found differences with the reference string");
            print_diff(
                pretty_js_summary_ref.as_str(),
                pretty_js_stats.as_ref(),
                "\n",
            );
            whatever!("Difference detected between calculated summary and reference summary")
        }
    }
    Ok(result_js)
}

pub fn run_verify(
    config_path: &str,
    id: &str,
    actor: &str,
    decision: &str,
) -> PkwResult<Protocol> {
    let ws = Workspace::open(config_path)?;
    let verifier: Verifier = ws.config.verifier()?;
    let id = parse_id(id)?;
    let decision = Decision::from_str(decision).context(CountingSnafu {})?;
    let mut attempt = 1;
    loop {
        let file = ws.load_protocols()?;
        let protocol = verifier
            .verify(&file.store, &id, actor, decision)
            .context(CountingSnafu {})?;
        match ws.save_protocols(&file) {
            Err(PkwError::Counting {
                source: CountingError::Conflict { .. },
            }) if attempt < verifier.max_attempts => {
                warn!(
                    "run_verify: protocol {} was saved by another process, attempt {}/{}",
                    id, attempt, verifier.max_attempts
                );
                attempt += 1;
            }
            Err(e) => return Err(e),
            Ok(()) => return Ok(protocol),
        }
    }
}

/// The nearest wards, with their distance to the point in meters.
pub fn run_nearest(
    config_path: &str,
    date: &str,
    latitude: f64,
    longitude: f64,
    radius: Option<f64>,
    min_count: Option<usize>,
) -> PkwResult<Vec<(Ward, f64)>> {
    let ws = Workspace::open(config_path)?;
    let voting_date = parse_date(date)?;
    let point = GeoPoint::new(latitude, longitude).context(CountingSnafu {})?;
    let radius = radius.unwrap_or_else(|| ws.config.radius());
    let min_count = min_count.unwrap_or_else(|| ws.config.min_count());
    let wards = ws.load_wards()?;
    let nearest = find_nearest_wards(&wards, voting_date, &point, radius, min_count)
        .context(CountingSnafu {})?;
    Ok(nearest
        .into_iter()
        .map(|w| {
            let d = w
                .location
                .map(|l| haversine_distance(&point, &l))
                .unwrap_or(f64::NAN);
            (w, d)
        })
        .collect())
}

pub fn run_pending(config_path: &str, count: Option<usize>) -> PkwResult<Vec<Protocol>> {
    let ws = Workspace::open(config_path)?;
    let file = ws.load_protocols()?;
    Ok(file
        .store
        .find_not_verified(count.unwrap_or(DEFAULT_PENDING_COUNT)))
}

fn find_protocol(store: &MemoryProtocolStore, id: &ProtocolId) -> PkwResult<Protocol> {
    store
        .find_by_id(id)
        .context(NotFoundSnafu {
            entity: "protocol",
            key: id.to_string(),
        })
        .context(CountingSnafu {})
}

fn signer(settings: &ImageSettings) -> Sha256Signer {
    Sha256Signer {
        api_key: settings.api_key.clone(),
        api_secret: settings.api_secret.clone(),
    }
}

/// Stores a new protocol. With `authorize_picture`, also reserves its first picture and
/// returns the upload token.
pub fn run_submit(
    config_path: &str,
    input: &str,
    actor: Option<&str>,
    authorize_picture: bool,
) -> PkwResult<(Protocol, Option<UploadToken>)> {
    let ws = Workspace::open(config_path)?;
    let settings = if authorize_picture {
        Some(ws.image_settings()?)
    } else {
        None
    };
    let submission: Submission = io_json::read_submission(input)?;
    let identity: Box<dyn ActorIdentity> = match actor {
        Some(a) => Box::new(KnownActor(a.to_string())),
        None => Box::new(Anonymous),
    };
    let file = ws.load_protocols()?;
    let protocol =
        submit(&file.store, submission, identity.as_ref()).context(CountingSnafu {})?;
    let token = match settings {
        Some(s) => Some(
            authorize_image(&file.store, &protocol.id, &signer(&s), Utc::now())
                .context(CountingSnafu {})?,
        ),
        None => None,
    };
    ws.save_protocols(&file)?;
    let protocol = find_protocol(&file.store, &protocol.id)?;
    Ok((protocol, token))
}

pub fn run_show(config_path: &str, id: &str) -> PkwResult<Protocol> {
    let ws = Workspace::open(config_path)?;
    let id = parse_id(id)?;
    let file = ws.load_protocols()?;
    find_protocol(&file.store, &id)
}

pub fn run_authorize_image(config_path: &str, id: &str) -> PkwResult<UploadToken> {
    let ws = Workspace::open(config_path)?;
    let settings = ws.image_settings()?;
    let id = parse_id(id)?;
    let file = ws.load_protocols()?;
    let token = authorize_image(&file.store, &id, &signer(&settings), Utc::now())
        .context(CountingSnafu {})?;
    ws.save_protocols(&file)?;
    Ok(token)
}

pub fn run_images(config_path: &str, id: &str) -> PkwResult<Vec<String>> {
    let ws = Workspace::open(config_path)?;
    let settings = ws.image_settings()?;
    let id = parse_id(id)?;
    let file = ws.load_protocols()?;
    let protocol = find_protocol(&file.store, &id)?;
    Ok(image_urls(
        &protocol,
        &settings.base_url(),
        &settings.cloud_name,
    ))
}

fn write_output(js: &JSValue, out: Option<&str>) -> PkwResult<()> {
    let pretty = to_pretty(js)?;
    match out {
        None | Some("") | Some("stdout") => println!("{}", pretty),
        Some(path) => {
            fs::write(path, pretty).context(WritingFileSnafu { path })?;
            info!("Summary written to {}", path);
        }
    }
    Ok(())
}

fn token_js(token: &UploadToken) -> JSValue {
    json!({
        "apiKey": token.api_key,
        "publicId": token.public_id.to_string(),
        "timestamp": token.timestamp,
        "signature": token.signature,
    })
}

fn protocols_js(protocols: &[Protocol]) -> JSValue {
    json!(protocols
        .iter()
        .map(ProtocolRecord::from)
        .collect::<Vec<_>>())
}

/// Runs one command of the command line.
pub fn run(args: &Args) -> PkwResult<()> {
    let config = args.config.as_str();
    match &args.command {
        Command::Sum {
            date,
            ballot,
            out,
            reference,
        } => {
            let js = run_sum(config, date, *ballot, reference.as_deref())?;
            write_output(&js, out.as_deref())
        }
        Command::Verify {
            id,
            actor,
            decision,
        } => {
            let p = run_verify(config, id, actor, decision)?;
            write_output(&protocols_js(&[p]), None)
        }
        Command::Nearest {
            date,
            latitude,
            longitude,
            radius,
            min_count,
        } => {
            let wards = run_nearest(config, date, *latitude, *longitude, *radius, *min_count)?;
            let js: Vec<JSValue> = wards
                .iter()
                .map(|(w, d)| json!({"ward": WardRecord::from(w), "distance": d}))
                .collect();
            write_output(&json!(js), None)
        }
        Command::Pending { count } => {
            let ps = run_pending(config, *count)?;
            write_output(&protocols_js(&ps), None)
        }
        Command::Submit {
            input,
            actor,
            authorize_picture,
        } => {
            let (p, token) = run_submit(config, input, actor.as_deref(), *authorize_picture)?;
            write_output(
                &json!({
                    "protocol": ProtocolRecord::from(&p),
                    "pictureUploadToken": token.as_ref().map(token_js),
                }),
                None,
            )
        }
        Command::Show { id } => {
            let p = run_show(config, id)?;
            write_output(&json!(ProtocolRecord::from(&p)), None)
        }
        Command::AuthorizeImage { id } => {
            let token = run_authorize_image(config, id)?;
            write_output(&token_js(&token), None)
        }
        Command::Images { id } => {
            let urls = run_images(config, id)?;
            write_output(&json!(urls), None)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use protocol_count::verification::verify;
    use uuid::Uuid;

    const P1: &str = "00000000-0000-4000-8000-000000000001";
    const P3: &str = "00000000-0000-4000-8000-000000000003";

    fn init() {
        let _ = env_logger::builder().is_test(true).try_init();
    }

    fn fixture(name: &str) -> String {
        format!("{}/testdata/{}", env!("CARGO_MANIFEST_DIR"), name)
    }

    // A private copy of the fixtures, for the commands that write the store.
    fn scratch_config() -> String {
        let dir = std::env::temp_dir().join(format!("ctrlpkw-{}", Uuid::new_v4()));
        fs::create_dir_all(&dir).unwrap();
        for name in ["config.json", "protocols.json", "wards.csv"] {
            fs::copy(fixture(name), dir.join(name)).unwrap();
        }
        dir.join("config.json").display().to_string()
    }

    #[test]
    fn sum_matches_reference() {
        init();
        let js = run_sum(
            &fixture("config.json"),
            "2015-05-10",
            1,
            Some(&fixture("ballot_2015-05-10_1_expected_summary.json")),
        )
        .unwrap();
        assert_eq!(js["protocols"], json!(4));
        assert_eq!(js["total"]["votesCountPerOption"], json!([520, 470]));
    }

    #[test]
    fn sum_latest_first() {
        init();
        let js = run_sum(&fixture("config_latest_first.json"), "2015-05-10", 1, None).unwrap();
        // The unapproved but more recent protocol wins in ward 146501/12.
        assert_eq!(
            js["wards"][0]["selected"],
            json!("00000000-0000-4000-8000-000000000002")
        );
        assert_eq!(js["total"]["votesCountPerOption"], json!([530, 460]));
    }

    #[test]
    fn sum_detects_differences() {
        init();
        let res = run_sum(
            &fixture("config.json"),
            "2015-05-24",
            1,
            Some(&fixture("ballot_2015-05-10_1_expected_summary.json")),
        );
        assert!(matches!(res, Err(PkwError::Whatever { .. })));
    }

    #[test]
    fn sum_unknown_ballot_is_zero() {
        let js = run_sum(&fixture("config.json"), "2020-07-12", 2, None).unwrap();
        assert_eq!(js["protocols"], json!(0));
        assert_eq!(js["total"]["votesValidCount"], json!(0));
        assert_eq!(js["wards"], json!([]));
    }

    #[test]
    fn sum_bad_date() {
        let res = run_sum(&fixture("config.json"), "10/05/2015", 1, None);
        assert!(matches!(res, Err(PkwError::InvalidDate { .. })));
    }

    #[test]
    fn verify_is_persisted() {
        init();
        let config = scratch_config();
        let p = run_verify(&config, P3, "bob", "approval").unwrap();
        assert!(p.approvals.contains("bob"));
        let p = run_verify(&config, P3, "carol", "DEPRECATION").unwrap();
        assert!(p.approvals.contains("bob"));
        assert!(p.deprecations.contains("carol"));
        assert!(!p.verified);

        let ws = Workspace::open(&config).unwrap();
        let stored = ws
            .load_protocols()
            .unwrap()
            .store
            .find_by_id(&parse_id(P3).unwrap())
            .unwrap();
        assert_eq!(stored, p);
        assert_eq!(stored.revision, 2);
    }

    #[test]
    fn verify_unknown_protocol() {
        let config = scratch_config();
        let res = run_verify(
            &config,
            "00000000-0000-4000-8000-0000000000ff",
            "bob",
            "approval",
        );
        assert!(matches!(
            res,
            Err(PkwError::Counting {
                source: CountingError::NotFound { .. }
            })
        ));
    }

    #[test]
    fn verify_bad_decision() {
        let config = scratch_config();
        assert!(run_verify(&config, P3, "bob", "maybe").is_err());
    }

    #[test]
    fn nearest_returns_wards_in_the_same_building() {
        init();
        let wards = run_nearest(&fixture("config.json"), "2015-05-10", 52.216, 20.968, None, None)
            .unwrap();
        let ids: Vec<WardId> = wards.iter().map(|(w, _)| w.id()).collect();
        assert_eq!(
            ids,
            vec![WardId::new("146502", 101), WardId::new("146502", 102)]
        );
        assert!(wards.iter().all(|(_, d)| *d < 1000.0));
    }

    #[test]
    fn nearest_from_json_wards() {
        let wards = run_nearest(
            &fixture("config_latest_first.json"),
            "2015-05-10",
            52.2297,
            21.0122,
            Some(0.0),
            Some(1),
        )
        .unwrap();
        assert_eq!(wards.len(), 1);
        assert_eq!(wards[0].0.id(), WardId::new("146502", 200));
    }

    #[test]
    fn nearest_rejects_bad_arguments() {
        let config = fixture("config.json");
        assert!(run_nearest(&config, "2015-05-10", 95.0, 20.0, None, None).is_err());
        assert!(run_nearest(&config, "2015-05-10", 52.0, 20.0, Some(-1.0), None).is_err());
        assert!(run_nearest(&config, "2015-05-10", 52.0, 20.0, None, Some(0)).is_err());
    }

    #[test]
    fn pending_oldest_first() {
        let ps = run_pending(&fixture("config.json"), Some(2)).unwrap();
        let ids: Vec<String> = ps.iter().map(|p| p.id.to_string()).collect();
        assert_eq!(ids, vec![P1.to_string(), P3.to_string()]);
        let ps = run_pending(&fixture("config.json"), None).unwrap();
        assert_eq!(ps.len(), 4);
    }

    #[test]
    fn submit_adds_protocol() {
        init();
        let config = scratch_config();
        let (p, token) = run_submit(&config, &fixture("submission.json"), Some("dave"), false)
            .unwrap();
        assert_eq!(token, None);
        assert!(p.approvals.contains("dave"));
        assert_eq!(p.ward, WardId::new("146502", 102));

        let js = run_sum(&config, "2015-05-10", 1, None).unwrap();
        assert_eq!(js["protocols"], json!(5));
        assert_eq!(js["total"]["votesCountPerOption"], json!([580, 510]));
    }

    #[test]
    fn invalid_submission_leaves_store_untouched() {
        let config = scratch_config();
        let before = fs::read_to_string(Workspace::open(&config).unwrap().protocols_path()).unwrap();
        let res = run_submit(&config, &fixture("invalid_submission.json"), None, false);
        assert!(matches!(
            res,
            Err(PkwError::Counting {
                source: CountingError::InvalidArgument { .. }
            })
        ));
        let after = fs::read_to_string(Workspace::open(&config).unwrap().protocols_path()).unwrap();
        assert_eq!(before, after);
    }

    #[test]
    fn images_are_authorized_then_listed() {
        init();
        let config = scratch_config();
        assert_eq!(run_images(&config, P1).unwrap(), Vec::<String>::new());
        let token = run_authorize_image(&config, P1).unwrap();
        assert_eq!(token.api_key, "key");
        assert_eq!(token.signature.len(), 64);
        let urls = run_images(&config, P1).unwrap();
        assert_eq!(
            urls,
            vec![format!(
                "http://res.cloudinary.com/demo/image/upload/{}",
                token.public_id
            )]
        );
    }

    #[test]
    fn submit_with_picture_authorization() {
        init();
        let config = scratch_config();
        let (p, token) = run_submit(&config, &fixture("submission.json"), None, true).unwrap();
        let token = token.unwrap();
        assert_eq!(p.image_ids.iter().cloned().collect::<Vec<_>>(), vec![token.public_id]);
        assert_eq!(token.api_key, "key");

        let shown = run_show(&config, &p.id.to_string()).unwrap();
        assert_eq!(shown, p);
        assert_eq!(run_images(&config, &p.id.to_string()).unwrap().len(), 1);
    }

    #[test]
    fn submit_with_picture_needs_settings() {
        let scratch = PathBuf::from(scratch_config());
        let config = scratch.with_file_name("config_latest_first.json");
        fs::copy(fixture("config_latest_first.json"), &config).unwrap();
        let config = config.display().to_string();
        let res = run_submit(&config, &fixture("submission.json"), None, true);
        assert!(matches!(res, Err(PkwError::MissingSetting { .. })));
        // Nothing was stored.
        assert_eq!(run_pending(&config, Some(10)).unwrap().len(), 4);
    }

    #[test]
    fn show_protocol() {
        let p = run_show(&fixture("config.json"), P1).unwrap();
        assert_eq!(p.ward, WardId::new("146501", 12));
        assert!(p.approvals.contains("alice"));
        assert_eq!(p.votes_count_per_option, vec![400, 390]);

        let res = run_show(&fixture("config.json"), "00000000-0000-4000-8000-0000000000ff");
        assert!(matches!(
            res,
            Err(PkwError::Counting {
                source: CountingError::NotFound { .. }
            })
        ));
        assert!(run_show(&fixture("config.json"), "not-a-uuid").is_err());
    }

    #[test]
    fn overlapping_saves_do_not_lose_decisions() {
        init();
        let config = scratch_config();
        let ws = Workspace::open(&config).unwrap();
        let id = parse_id(P3).unwrap();
        let first = ws.load_protocols().unwrap();
        let second = ws.load_protocols().unwrap();

        verify(&first.store, &id, "alice", Decision::Approval).unwrap();
        ws.save_protocols(&first).unwrap();
        verify(&second.store, &id, "bob", Decision::Approval).unwrap();
        let res = ws.save_protocols(&second);
        assert!(matches!(
            res,
            Err(PkwError::Counting {
                source: CountingError::Conflict { .. }
            })
        ));

        let stored = find_protocol(&ws.load_protocols().unwrap().store, &id).unwrap();
        assert_eq!(
            stored.approvals.iter().cloned().collect::<Vec<_>>(),
            vec!["alice".to_string()]
        );
        assert_eq!(stored.revision, 1);

        // Going through the command retries on a fresh copy.
        let p = run_verify(&config, P3, "bob", "approval").unwrap();
        assert!(p.approvals.contains("alice") && p.approvals.contains("bob"));
    }

    #[test]
    fn overlapping_saves_of_different_protocols_merge() {
        let config = scratch_config();
        let ws = Workspace::open(&config).unwrap();
        let first = ws.load_protocols().unwrap();
        let second = ws.load_protocols().unwrap();

        verify(&first.store, &parse_id(P3).unwrap(), "alice", Decision::Approval).unwrap();
        ws.save_protocols(&first).unwrap();
        verify(&second.store, &parse_id(P1).unwrap(), "bob", Decision::Deprecation).unwrap();
        ws.save_protocols(&second).unwrap();

        let store = ws.load_protocols().unwrap().store;
        let p3 = find_protocol(&store, &parse_id(P3).unwrap()).unwrap();
        let p1 = find_protocol(&store, &parse_id(P1).unwrap()).unwrap();
        assert!(p3.approvals.contains("alice"));
        assert!(p1.deprecations.contains("bob"));
        assert_eq!(store.len(), 5);
    }

    #[test]
    fn duplicate_ids_on_disk_are_rejected() {
        let config = scratch_config();
        let ws = Workspace::open(&config).unwrap();
        let mut protocols = io_json::read_protocols(&ws.protocols_path()).unwrap();
        protocols.push(protocols[0].clone());
        io_json::write_protocols(&ws.protocols_path(), &protocols).unwrap();
        let res = ws.load_protocols();
        assert!(matches!(
            res,
            Err(PkwError::Counting {
                source: CountingError::InvalidArgument { .. }
            })
        ));
    }

    #[test]
    fn images_need_settings() {
        let res = run_images(&fixture("config_latest_first.json"), P1);
        assert!(matches!(res, Err(PkwError::MissingSetting { .. })));
    }
}
