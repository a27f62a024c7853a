use std::collections::VecDeque;
use std::fmt::{Display, Formatter};

/// Per-entry accounting overhead from RFC 7541 §4.1.
pub const ENTRY_OVERHEAD: usize = 32;
pub const DEFAULT_MAX_SIZE: usize = 4096;
/// First index addressing the dynamic table.
pub const DYNAMIC_OFFSET: usize = STATIC_TABLE.len() + 1;

/// RFC 7541 Appendix A. Index `i` lives at `STATIC_TABLE[i - 1]`.
pub static STATIC_TABLE: [(&str, &str); 61] = [
    (":authority", ""),
    (":method", "GET"),
    (":method", "POST"),
    (":path", "/"),
    (":path", "/index.html"),
    (":scheme", "http"),
    (":scheme", "https"),
    (":status", "200"),
    (":status", "204"),
    (":status", "206"),
    (":status", "304"),
    (":status", "400"),
    (":status", "404"),
    (":status", "500"),
    ("accept-charset", ""),
    ("accept-encoding", "gzip, deflate"),
    ("accept-language", ""),
    ("accept-ranges", ""),
    ("accept", ""),
    ("access-control-allow-origin", ""),
    ("age", ""),
    ("allow", ""),
    ("authorization", ""),
    ("cache-control", ""),
    ("content-disposition", ""),
    ("content-encoding", ""),
    ("content-language", ""),
    ("content-length", ""),
    ("content-location", ""),
    ("content-range", ""),
    ("content-type", ""),
    ("cookie", ""),
    ("date", ""),
    ("etag", ""),
    ("expect", ""),
    ("expires", ""),
    ("from", ""),
    ("host", ""),
    ("if-match", ""),
    ("if-modified-since", ""),
    ("if-none-match", ""),
    ("if-range", ""),
    ("if-unmodified-since", ""),
    ("last-modified", ""),
    ("link", ""),
    ("location", ""),
    ("max-forwards", ""),
    ("proxy-authenticate", ""),
    ("proxy-authorization", ""),
    ("range", ""),
    ("referer", ""),
    ("refresh", ""),
    ("retry-after", ""),
    ("server", ""),
    ("set-cookie", ""),
    ("strict-transport-security", ""),
    ("transfer-encoding", ""),
    ("user-agent", ""),
    ("vary", ""),
    ("via", ""),
    ("www-authenticate", ""),
];

pub fn entry_size(name: &str, value: &str) -> usize {
    name.len() + value.len() + ENTRY_OVERHEAD
}

/// Result of a `find_pair` lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Match {
    pub index: usize,
    pub exact: bool,
}

/// The static table plus one direction's FIFO of indexed header fields.
/// The newest entry is addressed by `DYNAMIC_OFFSET`.
#[derive(Debug, Clone)]
pub struct DynamicTable {
    entries: VecDeque<(String, String)>,
    size: usize,
    max_size: usize,
}

impl Default for DynamicTable {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_SIZE)
    }
}

impl DynamicTable {
    pub fn new(max_size: usize) -> Self {
        Self {
            entries: VecDeque::new(),
            size: 0,
            max_size,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn max_size(&self) -> usize {
        self.max_size
    }

    /// Inserts a new most-recent entry, evicting the oldest ones until it fits.
    /// An entry larger than the whole table empties it and is not inserted.
    pub fn update(&mut self, name: &str, value: &str) {
        let size = entry_size(name, value);
        while self.size + size > self.max_size && !self.entries.is_empty() {
            self.evict();
        }
        if size > self.max_size {
            return;
        }
        self.size += size;
        self.entries.push_front((name.to_string(), value.to_string()));
    }

    pub fn set_max_size(&mut self, max_size: usize) {
        self.max_size = max_size;
        while self.size > self.max_size {
            self.evict();
        }
    }

    fn evict(&mut self) {
        if let Some((name, value)) = self.entries.pop_back() {
            self.size -= entry_size(&name, &value);
        }
    }

    pub fn find_index(&self, name: &str) -> Option<usize> {
        STATIC_TABLE
            .iter()
            .position(|(n, _)| *n == name)
            .map(|i| i + 1)
            .or_else(|| {
                self.entries
                    .iter()
                    .position(|(n, _)| n == name)
                    .map(|i| i + DYNAMIC_OFFSET)
            })
    }

    /// Prefers an entry matching both name and value; otherwise reports the
    /// first name-only match, static table first.
    pub fn find_pair(&self, name: &str, value: &str) -> Option<Match> {
        let mut found: Option<Match> = None;
        let candidates = STATIC_TABLE
            .iter()
            .map(|(n, v)| (*n, *v))
            .enumerate()
            .map(|(i, pair)| (i + 1, pair))
            .chain(
                self.entries
                    .iter()
                    .enumerate()
                    .map(|(i, (n, v))| (i + DYNAMIC_OFFSET, (n.as_str(), v.as_str()))),
            );
        for (index, (n, v)) in candidates {
            if n != name {
                continue;
            }
            if v == value {
                return Some(Match { index, exact: true });
            }
            found.get_or_insert(Match {
                index,
                exact: false,
            });
        }

        found
    }

    /// Resolves an index in either address space. Index 0 and indices past the
    /// newest-to-oldest range of the dynamic table resolve to nothing.
    pub fn get_pair(&self, index: usize) -> Option<(&str, &str)> {
        match index {
            0 => None,
            i if i < DYNAMIC_OFFSET => STATIC_TABLE.get(i - 1).map(|(n, v)| (*n, *v)),
            i => self
                .entries
                .get(i - DYNAMIC_OFFSET)
                .map(|(n, v)| (n.as_str(), v.as_str())),
        }
    }

    pub fn get_name(&self, index: usize) -> Option<&str> {
        self.get_pair(index).map(|(name, _)| name)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(n, v)| (n.as_str(), v.as_str()))
    }
}

impl Display for DynamicTable {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        writeln!(
            f,
            "DynamicTable {{ max_size: {}, size: {} }}",
            self.max_size, self.size
        )?;
        for (i, (name, value)) in self.iter().enumerate() {
            writeln!(f, "\t{}: {name}: {value}", i + DYNAMIC_OFFSET)?;
        }

        Ok(())
    }
}
