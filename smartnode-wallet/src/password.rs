//! Password providers
//!
//! The wallet never stores or prompts for its password. It asks a provider
//! every time it needs to encrypt or decrypt.

use std::fmt;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use zeroize::Zeroizing;

use crate::error::{Error, Result};

/// Supplies the wallet password
pub trait PasswordProvider: Send + Sync + fmt::Debug {
    fn get_password(&self) -> Result<Zeroizing<String>>;
}

/// Reads the password from a file, trimming a trailing newline
#[derive(Debug, Clone)]
pub struct FilePasswordProvider {
    path: PathBuf,
}

impl FilePasswordProvider {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl PasswordProvider for FilePasswordProvider {
    fn get_password(&self) -> Result<Zeroizing<String>> {
        let contents = match fs::read_to_string(&self.path) {
            Ok(contents) => Zeroizing::new(contents),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(Error::Password(format!(
                    "password file {} not found",
                    self.path.display()
                )));
            }
            Err(e) => return Err(e.into()),
        };

        let password = contents.trim_end_matches(['\r', '\n']);
        if password.is_empty() {
            return Err(Error::Password("password is empty".to_string()));
        }
        Ok(Zeroizing::new(password.to_string()))
    }
}

/// A fixed in-memory password
#[derive(Clone)]
pub struct StaticPassword(Zeroizing<String>);

impl StaticPassword {
    pub fn new(password: impl Into<String>) -> Self {
        Self(Zeroizing::new(password.into()))
    }
}

impl fmt::Debug for StaticPassword {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("StaticPassword([REDACTED])")
    }
}

impl PasswordProvider for StaticPassword {
    fn get_password(&self) -> Result<Zeroizing<String>> {
        Ok(self.0.clone())
    }
}
