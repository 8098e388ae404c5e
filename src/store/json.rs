use std::collections::HashMap;
use std::fs::{self, File};
use std::hash::Hash;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, info};

use crate::error::AppError;
use crate::models::driver::Driver;
use crate::models::request::ServiceRequest;
use crate::models::signup::PendingSignup;
use crate::store::{DriverSnapshot, Persistence, RequestSnapshot, SignupSnapshot};

const DRIVERS_FILE: &str = "drivers.json";
const REQUESTS_FILE: &str = "requests.json";
const SIGNUPS_FILE: &str = "signups.json";

/// One pretty-printed JSON array per store under a data directory.
#[derive(Debug, Clone)]
pub struct JsonFilePersistence {
    dir: PathBuf,
}

impl JsonFilePersistence {
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self, AppError> {
        let dir = dir.into();
        fs::create_dir_all(&dir).map_err(|err| {
            AppError::Persistence(format!("cannot create {}: {err}", dir.display()))
        })?;
        info!(data_dir = %dir.display(), "json store opened");
        Ok(Self { dir })
    }

    fn load<K, V>(&self, file: &str, key: impl Fn(&V) -> K) -> Result<HashMap<K, V>, AppError>
    where
        K: Eq + Hash,
        V: DeserializeOwned,
    {
        let path = self.dir.join(file);
        let raw = match fs::read(&path) {
            Ok(raw) => raw,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(HashMap::new()),
            Err(err) => {
                return Err(AppError::Persistence(format!(
                    "cannot read {}: {err}",
                    path.display()
                )));
            }
        };

        let records: Vec<V> = serde_json::from_slice(&raw).map_err(|err| {
            AppError::Persistence(format!("corrupt snapshot {}: {err}", path.display()))
        })?;

        Ok(records
            .into_iter()
            .map(|record| (key(&record), record))
            .collect())
    }

    fn save<K, V>(&self, file: &str, snapshot: &HashMap<K, V>) -> Result<(), AppError>
    where
        K: Ord,
        V: Serialize,
    {
        let mut entries: Vec<(&K, &V)> = snapshot.iter().collect();
        entries.sort_by(|a, b| a.0.cmp(b.0));
        let records: Vec<&V> = entries.into_iter().map(|(_, record)| record).collect();

        let body = serde_json::to_vec_pretty(&records)
            .map_err(|err| AppError::Persistence(format!("cannot encode {file}: {err}")))?;

        let path = self.dir.join(file);
        write_atomically(&path, &body)?;
        debug!(file, records = records.len(), "snapshot saved");
        Ok(())
    }
}

fn write_atomically(path: &Path, body: &[u8]) -> Result<(), AppError> {
    let tmp = path.with_extension("json.tmp");
    let written = File::create(&tmp).and_then(|mut file| {
        file.write_all(body)?;
        file.sync_all()
    });

    written
        .and_then(|()| fs::rename(&tmp, path))
        .map_err(|err| AppError::Persistence(format!("cannot write {}: {err}", path.display())))
}

impl Persistence for JsonFilePersistence {
    fn load_drivers(&self) -> Result<DriverSnapshot, AppError> {
        self.load(DRIVERS_FILE, |driver: &Driver| driver.code.clone())
    }

    fn save_drivers(&self, drivers: &DriverSnapshot) -> Result<(), AppError> {
        self.save(DRIVERS_FILE, drivers)
    }

    fn load_requests(&self) -> Result<RequestSnapshot, AppError> {
        self.load(REQUESTS_FILE, |request: &ServiceRequest| request.id)
    }

    fn save_requests(&self, requests: &RequestSnapshot) -> Result<(), AppError> {
        self.save(REQUESTS_FILE, requests)
    }

    fn load_signups(&self) -> Result<SignupSnapshot, AppError> {
        self.load(SIGNUPS_FILE, |signup: &PendingSignup| signup.phone.clone())
    }

    fn save_signups(&self, signups: &SignupSnapshot) -> Result<(), AppError> {
        self.save(SIGNUPS_FILE, signups)
    }
}
