//! Config fingerprint and the host-local file layout derived from it.
//!
//! Every distinct (credential, daemon config) pair gets its own daemon, lease
//! and socket. The daemon binary itself is shared by all fingerprints.

use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

const FINGERPRINT_LEN: usize = 16;
pub const SOCK_NAME: &str = "measure_dogstatsd";
pub const BINARY_NAME: &str = "measure-dogstatsd";

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Fingerprint(String);

impl Fingerprint {
    /// Digest of the key-sorted config entries followed by the credential.
    pub fn compute<'a, I>(credential: &str, config: I) -> Self
    where
        I: IntoIterator<Item = (&'a String, &'a String)>,
    {
        let sorted: BTreeMap<&str, &str> = config
            .into_iter()
            .map(|(k, v)| (k.as_str(), v.as_str()))
            .collect();

        let mut payload: Vec<serde_json::Value> = sorted
            .into_iter()
            .map(|(k, v)| serde_json::json!([k, v]))
            .collect();
        payload.push(serde_json::Value::from(credential));

        let encoded = serde_json::Value::Array(payload).to_string();
        let digest = hex::encode(Sha256::digest(encoded.as_bytes()));
        Self(digest[..FINGERPRINT_LEN].to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Shared files for one fingerprint on this host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LeasePaths {
    pub lease: PathBuf,
    pub socket: PathBuf,
    pub binary: PathBuf,
}

impl LeasePaths {
    pub fn new(root: &Path, fingerprint: &Fingerprint) -> Self {
        Self {
            lease: root.join(format!("{SOCK_NAME}-{fingerprint}.pid")),
            socket: root.join(format!("{SOCK_NAME}-{fingerprint}.sock")),
            binary: root.join(BINARY_NAME),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_order_independent() {
        let a = vec![
            ("DD_SITE".to_string(), "datadoghq.eu".to_string()),
            ("DD_ENV".to_string(), "prod".to_string()),
            ("DD_TAGS".to_string(), "a:b".to_string()),
        ];
        let mut b = a.clone();
        b.reverse();

        let fa = Fingerprint::compute("key", a.iter().map(|(k, v)| (k, v)));
        let fb = Fingerprint::compute("key", b.iter().map(|(k, v)| (k, v)));
        assert_eq!(fa, fb);
    }

    #[test]
    fn test_changes_with_credential_or_entry() {
        let base = config(&[("DD_SITE", "datadoghq.eu"), ("DD_ENV", "prod")]);
        let changed = config(&[("DD_SITE", "datadoghq.eu"), ("DD_ENV", "dev")]);
        let extra = config(&[
            ("DD_SITE", "datadoghq.eu"),
            ("DD_ENV", "prod"),
            ("DD_X", ""),
        ]);

        let reference = Fingerprint::compute("key", &base);
        assert_ne!(reference, Fingerprint::compute("other-key", &base));
        assert_ne!(reference, Fingerprint::compute("key", &changed));
        assert_ne!(reference, Fingerprint::compute("key", &extra));
    }

    #[test]
    fn test_fixed_length_hex() {
        let fp = Fingerprint::compute("", &HashMap::<String, String>::new());
        assert_eq!(fp.as_str().len(), 16);
        assert!(fp.as_str().chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_paths_share_binary() {
        let root = Path::new("/tmp");
        let empty = HashMap::<String, String>::new();
        let a = LeasePaths::new(root, &Fingerprint::compute("a", &empty));
        let b = LeasePaths::new(root, &Fingerprint::compute("b", &empty));

        assert_ne!(a.lease, b.lease);
        assert_ne!(a.socket, b.socket);
        assert_eq!(a.binary, b.binary);
        assert_eq!(a.binary, Path::new("/tmp/measure-dogstatsd"));
        assert!(a.lease.to_string_lossy().ends_with(".pid"));
        assert!(a.socket.to_string_lossy().ends_with(".sock"));
    }
}
