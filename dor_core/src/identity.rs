/*! Persistent relay identity: UUID and X25519 key pair.

The material lives in three files inside a per-relay directory (mode 0700):
`relay.uuid` (canonical UUID text, 0644), `relay.priv` (32 raw scalar
bytes, 0600) and `relay.pub` (32 raw derived-key bytes, 0644). Missing
files are minted on load; a public key file that disagrees with the one
derived from the private key is silently repaired. Minting uses exclusive
creation so concurrent loads over the same directory converge on the first
writer's material.
*/

use std::fmt;
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::Path;

use thiserror::Error;
use uuid::Uuid;

use dor_crypto::{derive_public_key, random_array, KEY_SIZE};

/// File holding the UUID in RFC 4122 canonical text form.
pub const UUID_FILE: &str = "relay.uuid";
/// File holding the raw X25519 private scalar.
pub const SECRET_KEY_FILE: &str = "relay.priv";
/// File holding the raw derived public key.
pub const PUBLIC_KEY_FILE: &str = "relay.pub";

/// Error of [`load_private_identity`].
#[derive(Debug, Error)]
pub enum IdentityError {
    #[error("failed to create identity dir: {0}")]
    CreateDir(std::io::Error),
    #[error("invalid UUID format")]
    InvalidUuid,
    #[error("invalid key size: expected {expected} bytes, got {got}", expected = KEY_SIZE)]
    InvalidKeySize { got: usize },
    #[error("identity file error: {0}")]
    Io(#[from] std::io::Error),
}

/// Long-term identity of a relay. Immutable after load and freely
/// shareable read-only between handler tasks.
#[derive(Clone, Eq, PartialEq)]
pub struct PrivateIdentity {
    /// UUID the relay is addressed by inside wrapped-key slots.
    pub uuid: Uuid,
    /// X25519 private scalar.
    pub priv_key: [u8; KEY_SIZE],
    /// Public key derived from `priv_key`.
    pub pub_key: [u8; KEY_SIZE],
}

impl fmt::Debug for PrivateIdentity {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("PrivateIdentity")
            .field("uuid", &self.uuid)
            .field("pub_key", &hex::encode(&self.pub_key[..6]))
            .finish_non_exhaustive()
    }
}

fn create_identity_dir(dir: &Path) -> std::io::Result<()> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::DirBuilderExt;
        fs::DirBuilder::new().recursive(true).mode(0o700).create(dir)
    }
    #[cfg(not(unix))]
    fs::create_dir_all(dir)
}

/// Publish a fully written file under `path` with exclusive creation and an
/// explicit mode, so a concurrent loader can never observe a partial write.
/// `Ok(false)` means another loader won the race and the caller should read
/// the file back.
fn write_exclusive(path: &Path, contents: &[u8], mode: u32) -> std::io::Result<bool> {
    let tmp = path.with_extension(format!("tmp.{}", hex::encode(random_array::<8>())));

    let mut options = fs::OpenOptions::new();
    options.write(true).create_new(true);

    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(mode);
    }
    #[cfg(not(unix))]
    let _ = mode;

    let mut file = options.open(&tmp)?;
    if let Err(e) = file.write_all(contents) {
        let _ = fs::remove_file(&tmp);
        return Err(e);
    }
    drop(file);

    let result = match fs::hard_link(&tmp, path) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == ErrorKind::AlreadyExists => Ok(false),
        Err(e) => Err(e),
    };
    let _ = fs::remove_file(&tmp);
    result
}

/// Write a file in place with an explicit creation mode. Overwrites existing
/// contents; the mode only applies when the file is created.
fn write_with_mode(path: &Path, contents: &[u8], mode: u32) -> std::io::Result<()> {
    let mut options = fs::OpenOptions::new();
    options.write(true).create(true).truncate(true);

    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(mode);
    }
    #[cfg(not(unix))]
    let _ = mode;

    let mut file = options.open(path)?;
    file.write_all(contents)
}

fn load_uuid(path: &Path) -> Result<Uuid, IdentityError> {
    let raw = fs::read_to_string(path)?;
    Uuid::parse_str(raw.trim()).map_err(|_| IdentityError::InvalidUuid)
}

fn load_key32(path: &Path) -> Result<[u8; KEY_SIZE], IdentityError> {
    let raw = fs::read(path)?;
    <[u8; KEY_SIZE]>::try_from(raw.as_slice())
        .map_err(|_| IdentityError::InvalidKeySize { got: raw.len() })
}

/// Load the relay identity from `dir`, minting any missing piece.
pub fn load_private_identity(dir: &Path) -> Result<PrivateIdentity, IdentityError> {
    create_identity_dir(dir).map_err(IdentityError::CreateDir)?;

    let uuid_path = dir.join(UUID_FILE);
    let uuid = if uuid_path.exists() {
        let uuid = load_uuid(&uuid_path)?;
        debug!("identity loaded (UUID: {})", uuid);
        uuid
    } else {
        let minted = Uuid::new_v4();
        if write_exclusive(&uuid_path, minted.to_string().as_bytes(), 0o644)? {
            info!("new identity generated (UUID: {})", minted);
            minted
        } else {
            load_uuid(&uuid_path)?
        }
    };

    let priv_path = dir.join(SECRET_KEY_FILE);
    let priv_key = if priv_path.exists() {
        let key = load_key32(&priv_path)?;
        debug!("private key loaded from disk");
        key
    } else {
        let minted: [u8; KEY_SIZE] = random_array();
        if write_exclusive(&priv_path, &minted, 0o600)? {
            info!("new private key generated");
            minted
        } else {
            load_key32(&priv_path)?
        }
    };

    let pub_key = derive_public_key(priv_key);
    let pub_path = dir.join(PUBLIC_KEY_FILE);
    match fs::read(&pub_path) {
        Ok(stored) => {
            if stored != pub_key {
                warn!(
                    "public key mismatch detected on disk, overwriting {}",
                    pub_path.display()
                );
                write_with_mode(&pub_path, &pub_key, 0o644)?;
            } else {
                debug!("public key verified and loaded (PK: {}...)", hex::encode(&pub_key[..6]));
            }
        }
        Err(e) if e.kind() == ErrorKind::NotFound => {
            write_with_mode(&pub_path, &pub_key, 0o644)?;
            info!("public key derived and saved (PK: {}...)", hex::encode(&pub_key[..6]));
        }
        Err(e) => return Err(e.into()),
    }

    Ok(PrivateIdentity {
        uuid,
        priv_key,
        pub_key,
    })
}
