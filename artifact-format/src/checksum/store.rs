use std::collections::BTreeMap;

use super::Error;

/// Maps archive-relative paths to hex SHA-256 digests, serializable as
/// `sha256sum`-style lines (`"<hex>  <path>\n"`). Entries are kept in
/// insertion order in the raw byte buffer so the serialized manifest has a
/// deterministic, caller-controlled ordering (version, then header, then
/// each payload's data archive, matching spec.md §3.1).
#[derive(Default, Clone)]
pub struct ChecksumStore {
    digests: BTreeMap<String, String>,
    raw: Vec<u8>,
    order: Vec<String>,
}

impl ChecksumStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, path: impl Into<String>, hex_digest: impl Into<String>) -> super::Result<()> {
        let path = path.into();
        if self.digests.contains_key(&path) {
            return Err(Error::AlreadyExists(path));
        }
        let digest = hex_digest.into();
        self.raw.extend_from_slice(digest.as_bytes());
        self.raw.extend_from_slice(b"  ");
        self.raw.extend_from_slice(path.as_bytes());
        self.raw.push(b'\n');
        self.order.push(path.clone());
        self.digests.insert(path, digest);
        Ok(())
    }

    pub fn get(&self, path: &str) -> super::Result<&str> {
        self.digests.get(path).map(|s| s.as_str()).ok_or_else(|| Error::NotFound(path.to_string()))
    }

    pub fn contains(&self, path: &str) -> bool {
        self.digests.contains_key(path)
    }

    pub fn get_raw(&self) -> &[u8] {
        &self.raw
    }

    pub fn paths(&self) -> impl Iterator<Item = &str> {
        self.order.iter().map(|s| s.as_str())
    }

    /// Parse a `sha256sum`-style buffer, detecting duplicate keys and
    /// malformed lines (every line must be `<64-hex><TWO SPACES><path>\n`).
    pub fn read_raw(bytes: &[u8]) -> super::Result<Self> {
        let text = std::str::from_utf8(bytes).map_err(|_| Error::MalformedLine("<non-utf8 manifest>".to_string()))?;
        let mut store = ChecksumStore::new();

        for line in text.lines() {
            if line.is_empty() {
                continue;
            }
            let (digest, path) = line.split_once("  ").ok_or_else(|| Error::MalformedLine(line.to_string()))?;
            if digest.len() != 64 || !digest.bytes().all(|b| b.is_ascii_hexdigit()) {
                return Err(Error::MalformedLine(line.to_string()));
            }
            if path.is_empty() {
                return Err(Error::MalformedLine(line.to_string()));
            }
            store.add(path.to_string(), digest.to_ascii_lowercase())?;
        }

        Ok(store)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DIGEST: &str = "3a6eb0790f39ac87c94f3856b2dd2c5d110e6811602261a9a923d3bb23adc8b7";

    #[test]
    fn add_and_get_round_trip() {
        let mut store = ChecksumStore::new();
        store.add("version", DIGEST).unwrap();
        assert_eq!(store.get("version").unwrap(), DIGEST);
        assert_eq!(store.get_raw(), format!("{DIGEST}  version\n").as_bytes());
    }

    #[test]
    fn duplicate_add_is_an_error() {
        let mut store = ChecksumStore::new();
        store.add("version", DIGEST).unwrap();
        assert!(matches!(store.add("version", DIGEST), Err(Error::AlreadyExists(path)) if path == "version"));
    }

    #[test]
    fn missing_get_is_an_error() {
        let store = ChecksumStore::new();
        assert!(matches!(store.get("version"), Err(Error::NotFound(path)) if path == "version"));
    }

    #[test]
    fn read_raw_round_trips_multiple_entries() {
        let mut store = ChecksumStore::new();
        store.add("version", DIGEST).unwrap();
        store.add("header.tar.gz", DIGEST).unwrap();

        let parsed = ChecksumStore::read_raw(store.get_raw()).unwrap();
        assert_eq!(parsed.get("version").unwrap(), DIGEST);
        assert_eq!(parsed.get("header.tar.gz").unwrap(), DIGEST);
    }

    #[test]
    fn read_raw_rejects_duplicate_paths() {
        let buf = format!("{DIGEST}  version\n{DIGEST}  version\n");
        let err = ChecksumStore::read_raw(buf.as_bytes()).unwrap_err();
        assert!(matches!(err, Error::AlreadyExists(path) if path == "version"));
    }

    #[test]
    fn read_raw_rejects_malformed_lines() {
        let err = ChecksumStore::read_raw(b"not-a-valid-line").unwrap_err();
        assert!(matches!(err, Error::MalformedLine(_)));
    }

    #[test]
    fn read_raw_rejects_single_space_separator() {
        let buf = format!("{DIGEST} version\n");
        let err = ChecksumStore::read_raw(buf.as_bytes()).unwrap_err();
        assert!(matches!(err, Error::MalformedLine(_)));
    }
}
