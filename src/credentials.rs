//! Credential pool: `username,password` pairs assigned to workers.

use std::path::Path;

use crate::error::Error;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

/// Ordered credential list, read-only after load. Selection is a
/// deterministic round-robin over worker ids, so reruns assign the same
/// credential to the same worker.
#[derive(Debug)]
pub struct CredentialPool {
    entries: Vec<Credentials>,
}

impl CredentialPool {
    /// Load a line-delimited credentials file. Blank lines and `#` comments
    /// are skipped; any remaining line must be `username,password` with both
    /// halves non-empty after trimming.
    pub fn load(path: &Path) -> Result<Self, Error> {
        let data = std::fs::read_to_string(path).map_err(|source| Error::CredentialsRead {
            path: path.to_owned(),
            source,
        })?;

        let mut entries = Vec::new();
        for (idx, raw) in data.lines().enumerate() {
            let line = raw.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let parse_err = |reason: String| Error::CredentialsParse {
                path: path.to_owned(),
                line: idx + 1,
                reason,
            };

            let mut parts = line.splitn(2, ',');
            let username = parts.next().unwrap_or("").trim();
            let password = parts.next().map(str::trim).ok_or_else(|| {
                parse_err(format!("expected 'username,password', got {line:?}"))
            })?;
            if username.is_empty() || password.is_empty() {
                return Err(parse_err("empty username or password".to_owned()));
            }
            entries.push(Credentials {
                username: username.to_owned(),
                password: password.to_owned(),
            });
        }

        if entries.is_empty() {
            return Err(Error::CredentialsParse {
                path: path.to_owned(),
                line: 0,
                reason: "no credentials found".to_owned(),
            });
        }

        Ok(CredentialPool { entries })
    }

    /// Credential for a worker. Plain `id mod N` over 1-based worker ids:
    /// worker 1 maps to entry index 1 when more than one credential is
    /// loaded. Existing credential files depend on this assignment.
    pub fn for_user(&self, user_id: u64) -> &Credentials {
        &self.entries[user_id as usize % self.entries.len()]
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn load_str(text: &str) -> Result<CredentialPool, Error> {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(text.as_bytes()).unwrap();
        CredentialPool::load(file.path())
    }

    #[test]
    fn loads_and_trims_entries() {
        let pool = load_str("# test users\n\n a@x , pw1 \nb@x,pw2\n").unwrap();
        assert_eq!(pool.len(), 2);
        assert_eq!(pool.for_user(0).username, "a@x");
        assert_eq!(pool.for_user(0).password, "pw1");
    }

    #[test]
    fn round_robin_is_id_modulo_len() {
        let pool = load_str("a@x,pw1\nb@x,pw2\n").unwrap();
        // 1-based ids: workers 1 and 3 share entry index 1, workers 2 and 4
        // share entry index 0.
        assert_eq!(pool.for_user(1).username, "b@x");
        assert_eq!(pool.for_user(2).username, "a@x");
        assert_eq!(pool.for_user(3).username, "b@x");
        assert_eq!(pool.for_user(4).username, "a@x");
    }

    #[test]
    fn missing_password_half_is_fatal() {
        let err = load_str("justausername\n").unwrap_err();
        assert!(matches!(err, Error::CredentialsParse { line: 1, .. }));
    }

    #[test]
    fn empty_half_is_fatal() {
        let err = load_str("a@x,pw\n,pw2\n").unwrap_err();
        assert!(matches!(err, Error::CredentialsParse { line: 2, .. }));
    }

    #[test]
    fn comment_only_file_is_fatal() {
        let err = load_str("# nothing here\n").unwrap_err();
        assert!(matches!(err, Error::CredentialsParse { line: 0, .. }));
    }
}
