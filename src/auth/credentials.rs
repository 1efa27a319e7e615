use std::collections::BTreeMap;
use std::fmt;
use std::fs::File;
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use rand::RngCore;
use sha1::Sha1;
use sha2::{Digest, Sha256};
use thiserror::Error;

use super::Verifier;

const HEADER: [&str; 4] = ["id", "algo", "salt", "digest"];
const RESERVED_ID: &str = "id";

const DEFAULT_ITERATIONS: u32 = 4096;
const DEFAULT_SIZE: usize = 16;
const DEFAULT_BCRYPT_COST: u32 = 12;
const SALT_LEN: usize = 16;

#[derive(Debug, Error)]
pub enum CredentialError {
    #[error("io error: {0}")]
    Io(#[from] io::Error),
    #[error("malformed credentials file: {0}")]
    Csv(#[from] csv::Error),
    #[error("invalid credentials for {id}: {reason}")]
    Invalid { id: String, reason: String },
    #[error("invalid algorithm {0}")]
    Algorithm(String),
    #[error("bcrypt error: {0}")]
    Bcrypt(#[from] bcrypt::BcryptError),
}

type Result<T> = std::result::Result<T, CredentialError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pbkdf2Hash {
    Sha256,
    Sha1,
}

impl Pbkdf2Hash {
    pub fn name(self) -> &'static str {
        match self {
            Pbkdf2Hash::Sha256 => "SHA-256",
            Pbkdf2Hash::Sha1 => "SHA-1",
        }
    }

    fn parse(value: &str) -> Option<Self> {
        match value {
            "SHA-256" => Some(Pbkdf2Hash::Sha256),
            "SHA-1" => Some(Pbkdf2Hash::Sha1),
            _ => None,
        }
    }

    fn derive(self, password: &str, salt: &[u8], iterations: u32, size: usize) -> Vec<u8> {
        let mut out = vec![0u8; size];
        match self {
            Pbkdf2Hash::Sha256 => {
                pbkdf2::pbkdf2_hmac::<Sha256>(password.as_bytes(), salt, iterations, &mut out)
            }
            Pbkdf2Hash::Sha1 => {
                pbkdf2::pbkdf2_hmac::<Sha1>(password.as_bytes(), salt, iterations, &mut out)
            }
        }
        out
    }
}

/// Hashing scheme requested for a new password,
/// written `plain`, `pbkdf2[,iters[,size[,hash]]]` or `bcrypt[,cost]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Algorithm {
    Plain,
    Pbkdf2 {
        iterations: u32,
        size: usize,
        hash: Pbkdf2Hash,
    },
    Bcrypt {
        cost: u32,
    },
}

impl Algorithm {
    pub fn parse(value: &str) -> Result<Self> {
        let invalid = || CredentialError::Algorithm(value.to_string());
        let parts: Vec<&str> = value.split(',').collect();
        match parts[0] {
            "plain" if parts.len() == 1 => Ok(Algorithm::Plain),
            "pbkdf2" if parts.len() <= 4 => {
                let iterations = match parts.get(1) {
                    Some(value) => value.parse::<u32>().ok().filter(|n| *n > 0).ok_or_else(invalid)?,
                    None => DEFAULT_ITERATIONS,
                };
                let size = match parts.get(2) {
                    Some(value) => value
                        .parse::<usize>()
                        .ok()
                        .filter(|n| (8..=32).contains(n))
                        .ok_or_else(invalid)?,
                    None => DEFAULT_SIZE,
                };
                let hash = match parts.get(3) {
                    Some(value) => Pbkdf2Hash::parse(value).ok_or_else(invalid)?,
                    None => Pbkdf2Hash::Sha256,
                };
                Ok(Algorithm::Pbkdf2 {
                    iterations,
                    size,
                    hash,
                })
            }
            "bcrypt" if parts.len() <= 2 => {
                let cost = match parts.get(1) {
                    Some(value) => value
                        .parse::<u32>()
                        .ok()
                        .filter(|n| (4..=31).contains(n))
                        .ok_or_else(invalid)?,
                    None => DEFAULT_BCRYPT_COST,
                };
                Ok(Algorithm::Bcrypt { cost })
            }
            _ => Err(invalid()),
        }
    }
}

/// Stored proof for one identity.
#[derive(Clone, PartialEq, Eq)]
pub enum Challenge {
    Plain {
        secret: String,
        digest: [u8; 32],
    },
    Pbkdf2 {
        iterations: u32,
        size: usize,
        hash: Pbkdf2Hash,
        salt: Vec<u8>,
        digest: Vec<u8>,
    },
    Bcrypt {
        hash: String,
    },
}

impl fmt::Debug for Challenge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Challenge::Plain { .. } => f.write_str("Challenge::Plain"),
            Challenge::Pbkdf2 {
                iterations,
                size,
                hash,
                ..
            } => write!(f, "Challenge::Pbkdf2({iterations}, {size}, {})", hash.name()),
            Challenge::Bcrypt { .. } => f.write_str("Challenge::Bcrypt"),
        }
    }
}

impl Challenge {
    pub fn create(algorithm: Algorithm, password: &str) -> Result<Self> {
        Ok(match algorithm {
            Algorithm::Plain => Challenge::Plain {
                secret: password.to_string(),
                digest: Sha256::digest(password.as_bytes()).into(),
            },
            Algorithm::Pbkdf2 {
                iterations,
                size,
                hash,
            } => {
                let mut salt = vec![0u8; SALT_LEN];
                rand::thread_rng().fill_bytes(&mut salt);
                let digest = hash.derive(password, &salt, iterations, size);
                Challenge::Pbkdf2 {
                    iterations,
                    size,
                    hash,
                    salt,
                    digest,
                }
            }
            Algorithm::Bcrypt { cost } => Challenge::Bcrypt {
                hash: bcrypt::hash(password, cost)?,
            },
        })
    }

    pub fn verify(&self, password: &str) -> bool {
        match self {
            Challenge::Plain { digest, .. } => {
                let candidate: [u8; 32] = Sha256::digest(password.as_bytes()).into();
                &candidate == digest
            }
            Challenge::Pbkdf2 {
                iterations,
                size,
                hash,
                salt,
                digest,
            } => hash.derive(password, salt, *iterations, *size) == *digest,
            Challenge::Bcrypt { hash } => bcrypt::verify(password, hash).unwrap_or(false),
        }
    }

    fn from_record(id: &str, params: &str, salt: &str, secret: &str) -> Result<Self> {
        let invalid = |reason: String| CredentialError::Invalid {
            id: id.to_string(),
            reason,
        };
        let parts: Vec<&str> = params.split(',').collect();
        match parts[0] {
            "plain" => {
                if parts.len() > 1 {
                    return Err(invalid(format!("unexpected plain parameters {params}")));
                }
                Ok(Challenge::Plain {
                    secret: secret.to_string(),
                    digest: Sha256::digest(secret.as_bytes()).into(),
                })
            }
            "pbkdf2" => {
                if parts.len() != 4 {
                    return Err(invalid(format!("expected pbkdf2,iters,size,hash, got {params}")));
                }
                let iterations: u32 = parts[1]
                    .parse::<u32>()
                    .ok()
                    .filter(|n| *n > 0)
                    .ok_or_else(|| invalid(format!("invalid iterations {}", parts[1])))?;
                let size: usize = parts[2]
                    .parse::<usize>()
                    .ok()
                    .filter(|n| (8..=32).contains(n))
                    .ok_or_else(|| invalid(format!("invalid size {}", parts[2])))?;
                let hash = Pbkdf2Hash::parse(parts[3])
                    .ok_or_else(|| invalid(format!("invalid hash {}", parts[3])))?;
                let salt = URL_SAFE_NO_PAD
                    .decode(salt)
                    .map_err(|err| invalid(format!("could not decode salt: {err}")))?;
                let digest = URL_SAFE_NO_PAD
                    .decode(secret)
                    .map_err(|err| invalid(format!("could not decode digest: {err}")))?;
                Ok(Challenge::Pbkdf2 {
                    iterations,
                    size,
                    hash,
                    salt,
                    digest,
                })
            }
            "bcrypt" => {
                if parts.len() > 1 {
                    return Err(invalid(format!("unexpected bcrypt parameters {params}")));
                }
                Ok(Challenge::Bcrypt {
                    hash: secret.to_string(),
                })
            }
            other => Err(invalid(format!("unknown algorithm {other}"))),
        }
    }

    fn to_record(&self, id: &str) -> [String; 4] {
        match self {
            Challenge::Plain { secret, .. } => {
                [id.to_string(), "plain".to_string(), String::new(), secret.clone()]
            }
            Challenge::Pbkdf2 {
                iterations,
                size,
                hash,
                salt,
                digest,
            } => [
                id.to_string(),
                format!("pbkdf2,{iterations},{size},{}", hash.name()),
                URL_SAFE_NO_PAD.encode(salt),
                URL_SAFE_NO_PAD.encode(digest),
            ],
            Challenge::Bcrypt { hash } => {
                [id.to_string(), "bcrypt".to_string(), String::new(), hash.clone()]
            }
        }
    }
}

/// Tab-separated credentials file: `id  algo  salt  digest`, header first.
#[derive(Debug, Clone)]
pub struct CredentialFile {
    path: PathBuf,
    credentials: BTreeMap<String, Challenge>,
}

impl CredentialFile {
    pub fn load(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let file = File::open(&path)?;
        let credentials = parse(file)?;
        Ok(Self { path, credentials })
    }

    /// Loads `path`, creating an empty file with just the header if missing.
    pub fn load_or_create(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        if !path.exists() {
            let empty = Self {
                path: path.clone(),
                credentials: BTreeMap::new(),
            };
            empty.save()?;
            return Ok(empty);
        }
        Self::load(path)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn len(&self) -> usize {
        self.credentials.len()
    }

    pub fn is_empty(&self) -> bool {
        self.credentials.is_empty()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.credentials.contains_key(id)
    }

    /// Adds or replaces `id`. Returns true if it replaced an existing entry.
    pub fn set(&mut self, id: &str, challenge: Challenge) -> Result<bool> {
        if id.is_empty() || id == RESERVED_ID || id.contains(['\t', '\n', '\r']) {
            return Err(CredentialError::Invalid {
                id: id.to_string(),
                reason: "reserved or malformed identity".to_string(),
            });
        }
        Ok(self.credentials.insert(id.to_string(), challenge).is_some())
    }

    /// Rewrites the file, entries sorted by id.
    pub fn save(&self) -> Result<()> {
        let dir = match self.path.parent() {
            Some(dir) if !dir.as_os_str().is_empty() => dir.to_path_buf(),
            _ => PathBuf::from("."),
        };
        let mut temp = tempfile::NamedTempFile::new_in(&dir)?;
        {
            let mut writer = csv::WriterBuilder::new()
                .delimiter(b'\t')
                .from_writer(temp.as_file_mut());
            writer.write_record(HEADER)?;
            for (id, challenge) in &self.credentials {
                writer.write_record(challenge.to_record(id))?;
            }
            writer.flush()?;
        }
        temp.as_file_mut().flush()?;
        temp.persist(&self.path).map_err(|err| err.error)?;
        Ok(())
    }
}

impl Verifier for CredentialFile {
    fn verify(&self, identity: &str, secret: &str) -> bool {
        self.credentials
            .get(identity)
            .map(|challenge| challenge.verify(secret))
            .unwrap_or(false)
    }
}

fn parse(reader: impl Read) -> Result<BTreeMap<String, Challenge>> {
    let mut csv = csv::ReaderBuilder::new()
        .delimiter(b'\t')
        .has_headers(true)
        .flexible(true)
        .from_reader(reader);

    let mut credentials = BTreeMap::new();
    for record in csv.records() {
        let record = record?;
        if record.is_empty() || (record.len() == 1 && record[0].is_empty()) {
            continue;
        }
        if record.len() != 4 {
            return Err(CredentialError::Invalid {
                id: record[0].to_string(),
                reason: format!("expected 4 fields, found {}", record.len()),
            });
        }
        let challenge = Challenge::from_record(&record[0], &record[1], &record[2], &record[3])?;
        credentials.insert(record[0].to_string(), challenge);
    }
    Ok(credentials)
}

/// Random password of four dash-separated groups, e.g. `aB3d-x_Yz-...`.
pub fn generate_password() -> String {
    let mut bytes = [0u8; 12];
    rand::thread_rng().fill_bytes(&mut bytes);
    let encoded = URL_SAFE_NO_PAD.encode(bytes);
    encoded
        .as_bytes()
        .chunks(4)
        .map(|chunk| String::from_utf8_lossy(chunk).into_owned())
        .collect::<Vec<_>>()
        .join("-")
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn algorithm_specs() {
        assert_eq!(Algorithm::parse("plain").unwrap(), Algorithm::Plain);
        assert_eq!(
            Algorithm::parse("pbkdf2").unwrap(),
            Algorithm::Pbkdf2 {
                iterations: 4096,
                size: 16,
                hash: Pbkdf2Hash::Sha256
            }
        );
        assert_eq!(
            Algorithm::parse("pbkdf2,1000,20,SHA-1").unwrap(),
            Algorithm::Pbkdf2 {
                iterations: 1000,
                size: 20,
                hash: Pbkdf2Hash::Sha1
            }
        );
        assert_eq!(
            Algorithm::parse("bcrypt,5").unwrap(),
            Algorithm::Bcrypt { cost: 5 }
        );
        for bad in ["md5", "plain,1", "pbkdf2,0", "pbkdf2,10,64", "pbkdf2,10,16,MD5", "bcrypt,2"] {
            assert!(Algorithm::parse(bad).is_err(), "{bad}");
        }
    }

    #[test]
    fn each_algorithm_verifies() {
        for algorithm in [
            Algorithm::Plain,
            Algorithm::parse("pbkdf2,10,16,SHA-256").unwrap(),
            Algorithm::parse("pbkdf2,10,20,SHA-1").unwrap(),
            Algorithm::Bcrypt { cost: 4 },
        ] {
            let challenge = Challenge::create(algorithm, "hunter2").expect("challenge");
            assert!(challenge.verify("hunter2"), "{algorithm:?}");
            assert!(!challenge.verify("hunter3"), "{algorithm:?}");
        }
    }

    #[test]
    fn save_and_reload() {
        let dir = tempdir().expect("tempdir");
        let path = dir.path().join("credentials.tsv");
        let mut file = CredentialFile::load_or_create(&path).expect("create");
        assert!(file.is_empty());

        file.set("alice", Challenge::create(Algorithm::Plain, "pw-a").unwrap())
            .expect("set alice");
        file.set(
            "bob",
            Challenge::create(Algorithm::parse("pbkdf2,10").unwrap(), "pw-b").unwrap(),
        )
        .expect("set bob");
        assert!(file
            .set("alice", Challenge::create(Algorithm::Plain, "pw-a2").unwrap())
            .expect("replace"));
        file.save().expect("save");

        let text = std::fs::read_to_string(&path).expect("read");
        assert!(text.starts_with("id\talgo\tsalt\tdigest\n"));

        let reloaded = CredentialFile::load(&path).expect("reload");
        assert_eq!(reloaded.len(), 2);
        assert!(reloaded.verify("alice", "pw-a2"));
        assert!(!reloaded.verify("alice", "pw-a"));
        assert!(reloaded.verify("bob", "pw-b"));
        assert!(!reloaded.verify("carol", "anything"));
    }

    #[test]
    fn reserved_identity_rejected() {
        let dir = tempdir().expect("tempdir");
        let mut file = CredentialFile::load_or_create(dir.path().join("c.tsv")).expect("create");
        let challenge = Challenge::create(Algorithm::Plain, "x").unwrap();
        assert!(file.set("id", challenge).is_err());
    }

    #[test]
    fn parse_skips_blank_lines_and_rejects_short_rows() {
        let good = "id\talgo\tsalt\tdigest\n\nalice\tplain\t\tsecret\n";
        let creds = parse(good.as_bytes()).expect("parse");
        assert!(creds["alice"].verify("secret"));

        let bad = "id\talgo\tsalt\tdigest\nalice\tplain\n";
        assert!(matches!(
            parse(bad.as_bytes()),
            Err(CredentialError::Invalid { .. })
        ));
    }

    #[test]
    fn generated_passwords_have_four_groups() {
        let password = generate_password();
        let groups: Vec<&str> = password.split('-').collect();
        assert_eq!(groups.len(), 4);
        assert!(groups.iter().all(|g| g.len() == 4));
    }
}
